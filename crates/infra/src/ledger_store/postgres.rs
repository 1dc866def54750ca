//! Postgres-backed stock ledger.
//!
//! The item row is the lock: `commit()` reads it `FOR UPDATE` inside a
//! transaction, checks its version, appends movements and rewrites the row
//! before committing. Two receipts for the same item therefore serialize on
//! that row, while different items proceed independently.
//!
//! A partial unique index on `(tenant_id, item_id, reference_type,
//! reference_id)` for procurement and production references backs the
//! duplicate check, so even a race that slips past it fails with
//! `DuplicateReference`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use mealledger_core::{
    ActorId, AggregateRoot, ExpectedVersion, InventoryItemId, MovementId, TenantId,
};
use mealledger_inventory::{
    InventoryItem, ItemSnapshot, MovementKind, MovementReference, StockMovement,
};

use super::query::{MovementFilter, MovementPage, Pagination};
use super::r#trait::{LedgerStoreError, StockLedgerStore, validate_commit};
use crate::db::{is_unique_violation, map_sqlx_error};

const UNIQUE_REFERENCE_INDEX: &str = "stock_movements_unique_ref";
const ITEMS_PKEY: &str = "inventory_items_pkey";

const MOVEMENT_COLUMNS: &str = r#"
    movement_id, tenant_id, item_id, sequence_number, kind, quantity, unit_cost,
    total_cost, stock_before, stock_after, average_cost_before, average_cost_after,
    reference_type, reference_id, note, actor_id, occurred_at
"#;

const ITEM_COLUMNS: &str = r#"
    tenant_id, item_id, name, unit, current_stock, average_cost, last_cost,
    min_stock, max_stock, version
"#;

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StockLedgerStore for PostgresLedgerStore {
    #[instrument(skip(self, item), fields(tenant_id = %item.tenant_id(), item_id = %item.id_typed()), err)]
    async fn register_item(&self, item: &InventoryItem) -> Result<(), LedgerStoreError> {
        if item.version() != 0 {
            return Err(LedgerStoreError::InvalidCommit(format!(
                "item {} must be registered before any movement",
                item.id_typed()
            )));
        }

        let s = item.snapshot();
        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                tenant_id, item_id, name, unit, current_stock, average_cost,
                last_cost, min_stock, max_stock, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0)
            "#,
        )
        .bind(s.tenant_id.as_uuid())
        .bind(s.id.as_uuid())
        .bind(&s.name)
        .bind(&s.unit)
        .bind(s.current_stock)
        .bind(s.average_cost)
        .bind(s.last_cost)
        .bind(s.min_stock)
        .bind(s.max_stock)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, Some(ITEMS_PKEY)) {
                LedgerStoreError::AlreadyExists(format!("item {}", s.id))
            } else {
                map_sqlx_error("register_item", e)
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    async fn load_item(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, LedgerStoreError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE tenant_id = $1 AND item_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(item_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_item", e))?;

        row.map(|r| decode_item(&r)).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_items(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, LedgerStoreError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE tenant_id = $1 ORDER BY name, item_id"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.iter().map(decode_item).collect()
    }

    #[instrument(
        skip(self, item, movements),
        fields(
            tenant_id = %tenant_id,
            item_id = %item.id_typed(),
            movement_count = movements.len(),
            expected_version = ?expected_version
        ),
        err
    )]
    async fn commit(
        &self,
        tenant_id: TenantId,
        item: &InventoryItem,
        movements: &[StockMovement],
        expected_version: ExpectedVersion,
    ) -> Result<(), LedgerStoreError> {
        validate_commit(tenant_id, item, movements, expected_version)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = lock_item_version(&mut tx, tenant_id, item.id_typed()).await?;
        if let Err(e) = expected_version.check(current) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerStoreError::Concurrency(e.to_string()));
        }

        for movement in movements {
            if let Some(reference) = movement.reference.filter(MovementReference::is_unique_per_item)
            {
                if reference_exists(&mut tx, tenant_id, item.id_typed(), reference).await? {
                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e))?;
                    return Err(LedgerStoreError::DuplicateReference {
                        item_id: item.id_typed(),
                        reference,
                    });
                }
            }
            insert_movement(&mut tx, movement).await?;
        }

        let s = item.snapshot();
        sqlx::query(
            r#"
            UPDATE inventory_items
            SET current_stock = $3,
                average_cost = $4,
                last_cost = $5,
                version = $6,
                updated_at = now()
            WHERE tenant_id = $1 AND item_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(s.id.as_uuid())
        .bind(s.current_stock)
        .bind(s.average_cost)
        .bind(s.last_cost)
        .bind(s.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    async fn load_ledger(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Vec<StockMovement>, LedgerStoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE tenant_id = $1 AND item_id = $2 ORDER BY sequence_number ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(item_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_ledger", e))?;

        rows.iter().map(decode_movement).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, reference = %reference), err)]
    async fn find_by_reference(
        &self,
        tenant_id: TenantId,
        reference: MovementReference,
    ) -> Result<Vec<StockMovement>, LedgerStoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE tenant_id = $1 AND reference_type = $2 AND reference_id = $3 \
             ORDER BY occurred_at, item_id, sequence_number"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(reference.reference_type())
            .bind(reference.reference_id())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_reference", e))?;

        rows.iter().map(decode_movement).collect()
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id, limit = pagination.limit, offset = pagination.offset), err)]
    async fn query_movements(
        &self,
        tenant_id: TenantId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerStoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM stock_movements");
        push_filter(&mut count, tenant_id, &filter);
        let total: i64 = count
            .build()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?
            .try_get("total")
            .map_err(|e| LedgerStoreError::Decode(e.to_string()))?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {MOVEMENT_COLUMNS} FROM stock_movements"));
        push_filter(&mut select, tenant_id, &filter);
        select
            .push(" ORDER BY occurred_at, item_id, sequence_number LIMIT ")
            .push_bind(i64::from(pagination.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(pagination.offset));

        let rows = select
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_movements", e))?;
        let movements = rows
            .iter()
            .map(decode_movement)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MovementPage::new(movements, total.max(0) as u64, pagination))
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, tenant_id: TenantId, filter: &MovementFilter) {
    builder.push(" WHERE tenant_id = ").push_bind(*tenant_id.as_uuid());
    if let Some(item_id) = filter.item_id {
        builder.push(" AND item_id = ").push_bind(*item_id.as_uuid());
    }
    if let Some(kind) = filter.kind {
        builder.push(" AND kind = ").push_bind(kind.as_str());
    }
    if let Some(reference) = filter.reference {
        builder
            .push(" AND reference_type = ")
            .push_bind(reference.reference_type())
            .push(" AND reference_id = ")
            .push_bind(reference.reference_id());
    }
    if let Some(after) = filter.occurred_after {
        builder.push(" AND occurred_at >= ").push_bind(after);
    }
    if let Some(before) = filter.occurred_before {
        builder.push(" AND occurred_at < ").push_bind(before);
    }
}

/// Lock the item row for the rest of the transaction and return its version.
async fn lock_item_version(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    item_id: InventoryItemId,
) -> Result<u64, LedgerStoreError> {
    let row = sqlx::query(
        r#"
        SELECT version
        FROM inventory_items
        WHERE tenant_id = $1 AND item_id = $2
        FOR UPDATE
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(item_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_item", e))?
    .ok_or_else(|| LedgerStoreError::NotFound(format!("item {item_id}")))?;

    let version: i64 = row
        .try_get("version")
        .map_err(|e| LedgerStoreError::Decode(format!("failed to read version: {e}")))?;
    Ok(version as u64)
}

async fn reference_exists(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    item_id: InventoryItemId,
    reference: MovementReference,
) -> Result<bool, LedgerStoreError> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM stock_movements
            WHERE tenant_id = $1 AND item_id = $2
              AND reference_type = $3 AND reference_id = $4
        ) AS taken
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(item_id.as_uuid())
    .bind(reference.reference_type())
    .bind(reference.reference_id())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("reference_exists", e))?;

    row.try_get("taken")
        .map_err(|e| LedgerStoreError::Decode(format!("failed to read taken: {e}")))
}

async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    m: &StockMovement,
) -> Result<(), LedgerStoreError> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            movement_id, tenant_id, item_id, sequence_number, kind, quantity,
            unit_cost, total_cost, stock_before, stock_after, average_cost_before,
            average_cost_after, reference_type, reference_id, note, actor_id, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(m.id.as_uuid())
    .bind(m.tenant_id.as_uuid())
    .bind(m.item_id.as_uuid())
    .bind(m.sequence as i64)
    .bind(m.kind.as_str())
    .bind(m.quantity)
    .bind(m.unit_cost)
    .bind(m.total_cost)
    .bind(m.stock_before)
    .bind(m.stock_after)
    .bind(m.average_cost_before)
    .bind(m.average_cost_after)
    .bind(m.reference.map(|r| r.reference_type()))
    .bind(m.reference.map(|r| r.reference_id()))
    .bind(m.note.as_deref())
    .bind(m.actor.as_uuid())
    .bind(m.occurred_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| match m.reference {
        Some(reference) if is_unique_violation(&e, Some(UNIQUE_REFERENCE_INDEX)) => {
            LedgerStoreError::DuplicateReference {
                item_id: m.item_id,
                reference,
            }
        }
        _ => map_sqlx_error("insert_movement", e),
    })?;

    Ok(())
}

fn decode_err(e: sqlx::Error) -> LedgerStoreError {
    LedgerStoreError::Decode(e.to_string())
}

fn decode_item(row: &sqlx::postgres::PgRow) -> Result<InventoryItem, LedgerStoreError> {
    let version: i64 = row.try_get("version").map_err(decode_err)?;
    Ok(InventoryItem::from_snapshot(ItemSnapshot {
        id: InventoryItemId::from_uuid(row.try_get("item_id").map_err(decode_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        unit: row.try_get("unit").map_err(decode_err)?,
        current_stock: row.try_get("current_stock").map_err(decode_err)?,
        average_cost: row.try_get("average_cost").map_err(decode_err)?,
        last_cost: row.try_get("last_cost").map_err(decode_err)?,
        min_stock: row.try_get("min_stock").map_err(decode_err)?,
        max_stock: row.try_get("max_stock").map_err(decode_err)?,
        version: version as u64,
    }))
}

fn decode_movement(row: &sqlx::postgres::PgRow) -> Result<StockMovement, LedgerStoreError> {
    let kind: String = row.try_get("kind").map_err(decode_err)?;
    let kind: MovementKind = kind
        .parse()
        .map_err(|e: mealledger_core::DomainError| LedgerStoreError::Decode(e.to_string()))?;

    let reference_type: Option<String> = row.try_get("reference_type").map_err(decode_err)?;
    let reference_id: Option<Uuid> = row.try_get("reference_id").map_err(decode_err)?;
    let reference = match (reference_type, reference_id) {
        (Some(t), Some(id)) => Some(
            MovementReference::from_parts(&t, id)
                .map_err(|e| LedgerStoreError::Decode(e.to_string()))?,
        ),
        _ => None,
    };

    let sequence: i64 = row.try_get("sequence_number").map_err(decode_err)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(decode_err)?;
    let quantity: Decimal = row.try_get("quantity").map_err(decode_err)?;

    Ok(StockMovement {
        id: MovementId::from_uuid(row.try_get("movement_id").map_err(decode_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode_err)?),
        item_id: InventoryItemId::from_uuid(row.try_get("item_id").map_err(decode_err)?),
        sequence: sequence as u64,
        kind,
        quantity,
        unit_cost: row.try_get("unit_cost").map_err(decode_err)?,
        total_cost: row.try_get("total_cost").map_err(decode_err)?,
        stock_before: row.try_get("stock_before").map_err(decode_err)?,
        stock_after: row.try_get("stock_after").map_err(decode_err)?,
        average_cost_before: row.try_get("average_cost_before").map_err(decode_err)?,
        average_cost_after: row.try_get("average_cost_after").map_err(decode_err)?,
        reference,
        note: row.try_get("note").map_err(decode_err)?,
        actor: ActorId::from_uuid(row.try_get("actor_id").map_err(decode_err)?),
        occurred_at,
    })
}
