//! Read-only access to records owned by other workflows.
//!
//! Procurements, production batches and menus are maintained elsewhere; the
//! ledger only reads them at these seams.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use mealledger_core::{MenuId, ProcurementId, ProductionId, TenantId};
use mealledger_procurement::ProcurementReceipt;
use mealledger_production::{Menu, ProductionBatch};

use crate::ledger_store::LedgerStoreError;

#[async_trait]
pub trait ProcurementSource: Send + Sync {
    async fn load_procurement(
        &self,
        tenant_id: TenantId,
        procurement_id: ProcurementId,
    ) -> Result<Option<ProcurementReceipt>, LedgerStoreError>;
}

#[async_trait]
pub trait ProductionSource: Send + Sync {
    async fn load_batch(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<Option<ProductionBatch>, LedgerStoreError>;
}

#[async_trait]
pub trait MenuSource: Send + Sync {
    async fn load_menu(
        &self,
        tenant_id: TenantId,
        menu_id: MenuId,
    ) -> Result<Option<Menu>, LedgerStoreError>;
}

/// In-memory stand-in for the procurement, production and menu workflows.
#[derive(Debug, Default)]
pub struct InMemorySources {
    procurements: RwLock<HashMap<(TenantId, ProcurementId), ProcurementReceipt>>,
    batches: RwLock<HashMap<(TenantId, ProductionId), ProductionBatch>>,
    menus: RwLock<HashMap<(TenantId, MenuId), Menu>>,
}

impl InMemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_procurement(&self, procurement: ProcurementReceipt) {
        self.procurements
            .write()
            .await
            .insert((procurement.tenant_id, procurement.id), procurement);
    }

    pub async fn put_batch(&self, batch: ProductionBatch) {
        self.batches
            .write()
            .await
            .insert((batch.tenant_id, batch.id), batch);
    }

    pub async fn put_menu(&self, menu: Menu) {
        self.menus.write().await.insert((menu.tenant_id, menu.id), menu);
    }
}

#[async_trait]
impl ProcurementSource for InMemorySources {
    async fn load_procurement(
        &self,
        tenant_id: TenantId,
        procurement_id: ProcurementId,
    ) -> Result<Option<ProcurementReceipt>, LedgerStoreError> {
        Ok(self
            .procurements
            .read()
            .await
            .get(&(tenant_id, procurement_id))
            .cloned())
    }
}

#[async_trait]
impl ProductionSource for InMemorySources {
    async fn load_batch(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<Option<ProductionBatch>, LedgerStoreError> {
        Ok(self
            .batches
            .read()
            .await
            .get(&(tenant_id, production_id))
            .cloned())
    }
}

#[async_trait]
impl MenuSource for InMemorySources {
    async fn load_menu(
        &self,
        tenant_id: TenantId,
        menu_id: MenuId,
    ) -> Result<Option<Menu>, LedgerStoreError> {
        Ok(self.menus.read().await.get(&(tenant_id, menu_id)).cloned())
    }
}
