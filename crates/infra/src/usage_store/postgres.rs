use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::instrument;

use mealledger_core::{ActorId, InventoryItemId, ProductionId, TenantId, UsageId};
use mealledger_production::ProductionStockUsage;

use super::UsageStore;
use crate::db::{is_unique_violation, map_sqlx_error};
use crate::ledger_store::LedgerStoreError;

const UNIQUE_USAGE: &str = "production_stock_usage_unique_item";

#[derive(Debug, Clone)]
pub struct PostgresUsageStore {
    pool: Arc<PgPool>,
}

impl PostgresUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl UsageStore for PostgresUsageStore {
    #[instrument(skip(self, usages), fields(row_count = usages.len()), err)]
    async fn insert_usages(&self, usages: &[ProductionStockUsage]) -> Result<(), LedgerStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for usage in usages {
            sqlx::query(
                r#"
                INSERT INTO production_stock_usage (
                    usage_id, tenant_id, production_id, item_id, item_name, unit,
                    quantity_used, unit_cost_at_use, recorded_by, recorded_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(usage.id.as_uuid())
            .bind(usage.tenant_id.as_uuid())
            .bind(usage.production_id.as_uuid())
            .bind(usage.item_id.as_uuid())
            .bind(&usage.item_name)
            .bind(&usage.unit)
            .bind(usage.quantity_used)
            .bind(usage.unit_cost_at_use)
            .bind(usage.recorded_by.as_uuid())
            .bind(usage.recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, Some(UNIQUE_USAGE)) {
                    LedgerStoreError::AlreadyExists(format!(
                        "usage of item {} in production {}",
                        usage.item_id, usage.production_id
                    ))
                } else {
                    map_sqlx_error("insert_usage", e)
                }
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, production_id = %production_id), err)]
    async fn list_usages(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<Vec<ProductionStockUsage>, LedgerStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT usage_id, tenant_id, production_id, item_id, item_name, unit,
                   quantity_used, unit_cost_at_use, recorded_by, recorded_at
            FROM production_stock_usage
            WHERE tenant_id = $1 AND production_id = $2
            ORDER BY recorded_at, item_name
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(production_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_usages", e))?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| LedgerStoreError::Decode(e.to_string());
                Ok(ProductionStockUsage {
                    id: UsageId::from_uuid(row.try_get("usage_id").map_err(decode)?),
                    tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode)?),
                    production_id: ProductionId::from_uuid(
                        row.try_get("production_id").map_err(decode)?,
                    ),
                    item_id: InventoryItemId::from_uuid(row.try_get("item_id").map_err(decode)?),
                    item_name: row.try_get("item_name").map_err(decode)?,
                    unit: row.try_get("unit").map_err(decode)?,
                    quantity_used: row.try_get("quantity_used").map_err(decode)?,
                    unit_cost_at_use: row.try_get("unit_cost_at_use").map_err(decode)?,
                    recorded_by: ActorId::from_uuid(row.try_get("recorded_by").map_err(decode)?),
                    recorded_at: row.try_get("recorded_at").map_err(decode)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, production_id = %production_id), err)]
    async fn delete_usages(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<u64, LedgerStoreError> {
        let result = sqlx::query(
            "DELETE FROM production_stock_usage WHERE tenant_id = $1 AND production_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(production_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_usages", e))?;

        Ok(result.rows_affected())
    }
}
