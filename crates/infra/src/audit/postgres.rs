use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use mealledger_core::{ActorId, TenantId};

use super::{AuditLog, AuditRecord};
use crate::db::map_sqlx_error;
use crate::ledger_store::LedgerStoreError;

#[derive(Debug, Clone)]
pub struct PostgresAuditLog {
    pool: Arc<PgPool>,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    #[instrument(skip(self, record), fields(action = %record.action, entity_id = %record.entity_id), err)]
    async fn append(&self, record: AuditRecord) -> Result<(), LedgerStoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                audit_id, tenant_id, actor_id, action, entity_type, entity_id, details, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.tenant_id.as_uuid())
        .bind(record.actor.as_uuid())
        .bind(&record.action)
        .bind(&record.entity_type)
        .bind(record.entity_id)
        .bind(&record.details)
        .bind(record.recorded_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_audit", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, entity_id = %entity_id), err)]
    async fn list_for_entity(
        &self,
        tenant_id: TenantId,
        entity_id: Uuid,
    ) -> Result<Vec<AuditRecord>, LedgerStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT audit_id, tenant_id, actor_id, action, entity_type, entity_id, details, recorded_at
            FROM audit_log
            WHERE tenant_id = $1 AND entity_id = $2
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(entity_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_audit", e))?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| LedgerStoreError::Decode(e.to_string());
                Ok(AuditRecord {
                    id: row.try_get("audit_id").map_err(decode)?,
                    tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode)?),
                    actor: ActorId::from_uuid(row.try_get("actor_id").map_err(decode)?),
                    action: row.try_get("action").map_err(decode)?,
                    entity_type: row.try_get("entity_type").map_err(decode)?,
                    entity_id: row.try_get("entity_id").map_err(decode)?,
                    details: row.try_get("details").map_err(decode)?,
                    recorded_at: row.try_get("recorded_at").map_err(decode)?,
                })
            })
            .collect()
    }
}
