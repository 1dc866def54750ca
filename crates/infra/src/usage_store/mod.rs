//! Production stock usage rows.

pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use mealledger_core::{ProductionId, TenantId};
use mealledger_production::ProductionStockUsage;

use crate::ledger_store::LedgerStoreError;

pub use postgres::PostgresUsageStore;

/// Usage rows keyed by production batch.
///
/// `(production, item)` is unique: `insert_usages` writes a whole batch of
/// rows or none of them, failing with `AlreadyExists` on any repeat.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn insert_usages(&self, usages: &[ProductionStockUsage]) -> Result<(), LedgerStoreError>;

    async fn list_usages(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<Vec<ProductionStockUsage>, LedgerStoreError>;

    /// Remove every row of a batch. Returns the number removed.
    async fn delete_usages(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<u64, LedgerStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    rows: RwLock<HashMap<(TenantId, ProductionId), Vec<ProductionStockUsage>>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn insert_usages(&self, usages: &[ProductionStockUsage]) -> Result<(), LedgerStoreError> {
        let mut rows = self.rows.write().await;

        for (idx, usage) in usages.iter().enumerate() {
            let existing = rows.get(&(usage.tenant_id, usage.production_id));
            let repeated = existing
                .into_iter()
                .flatten()
                .chain(usages[..idx].iter())
                .any(|row| {
                    row.tenant_id == usage.tenant_id
                        && row.production_id == usage.production_id
                        && row.item_id == usage.item_id
                });
            if repeated {
                return Err(LedgerStoreError::AlreadyExists(format!(
                    "usage of item {} in production {}",
                    usage.item_id, usage.production_id
                )));
            }
        }

        for usage in usages {
            rows.entry((usage.tenant_id, usage.production_id))
                .or_default()
                .push(usage.clone());
        }
        Ok(())
    }

    async fn list_usages(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<Vec<ProductionStockUsage>, LedgerStoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(tenant_id, production_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_usages(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<u64, LedgerStoreError> {
        let mut rows = self.rows.write().await;
        Ok(rows
            .remove(&(tenant_id, production_id))
            .map(|removed| removed.len() as u64)
            .unwrap_or(0))
    }
}
