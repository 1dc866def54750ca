//! Business audit trail, kept apart from the costing ledger.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use mealledger_core::{ActorId, TenantId};

use crate::ledger_store::LedgerStoreError;

pub use postgres::PostgresAuditLog;

/// One audit entry: who did what to which record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub actor: ActorId,
    /// Dotted action name, e.g. `procurement.received`.
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: JsonValue,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        tenant_id: TenantId,
        actor: ActorId,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: Uuid,
        details: JsonValue,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            actor,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id,
            details,
            recorded_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), LedgerStoreError>;

    /// Records for one entity, oldest first.
    async fn list_for_entity(
        &self,
        tenant_id: TenantId,
        entity_id: Uuid,
    ) -> Result<Vec<AuditRecord>, LedgerStoreError>;
}

/// Append after ledger entries are already committed.
///
/// A failure here is logged and swallowed: the movements stand regardless.
pub(crate) async fn append_after_commit(audit: &dyn AuditLog, record: AuditRecord) {
    let action = record.action.clone();
    let entity_id = record.entity_id;
    if let Err(e) = audit.append(record).await {
        warn!(%action, %entity_id, error = %e, "audit append failed after ledger commit");
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), LedgerStoreError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list_for_entity(
        &self,
        tenant_id: TenantId,
        entity_id: Uuid,
    ) -> Result<Vec<AuditRecord>, LedgerStoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
