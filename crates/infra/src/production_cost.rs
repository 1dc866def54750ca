//! Production costing: planning estimates and actual batch cost.
//!
//! Actual cost is rebuilt from usage rows on every call. Each row carries the
//! unit cost copied at the time of use, so a batch's cost stays fixed while
//! average costs keep moving.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};

use mealledger_core::{ActorId, InventoryItemId, MenuId, MovementId, ProductionId, TenantId, UsageId};
use mealledger_inventory::{
    InventoryItem, IssueStock, MovementContext, MovementKind, MovementReference, StockCommand,
};
use mealledger_production::{
    CostBreakdownLine, EstimatedCost, ProductionBatch, ProductionCost, ProductionStockUsage,
    UsageLine, cost_breakdown, ensure_distinct_items, estimate_cost, summarize_cost,
};

use crate::audit::{AuditLog, AuditRecord, append_after_commit};
use crate::command_dispatcher::StockCommandDispatcher;
use crate::error::LedgerError;
use crate::ledger_store::LedgerStoreError;
use crate::sources::{MenuSource, ProductionSource};
use crate::usage_store::UsageStore;

pub struct ProductionCostService {
    batches: Arc<dyn ProductionSource>,
    menus: Arc<dyn MenuSource>,
    usages: Arc<dyn UsageStore>,
    dispatcher: StockCommandDispatcher,
    audit: Arc<dyn AuditLog>,
    consume_stock: bool,
}

impl ProductionCostService {
    pub fn new(
        batches: Arc<dyn ProductionSource>,
        menus: Arc<dyn MenuSource>,
        usages: Arc<dyn UsageStore>,
        dispatcher: StockCommandDispatcher,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            batches,
            menus,
            usages,
            dispatcher,
            audit,
            consume_stock: false,
        }
    }

    /// Also post an `OUT` movement per recorded usage line.
    pub fn with_stock_consumption(mut self, consume_stock: bool) -> Self {
        self.consume_stock = consume_stock;
        self
    }

    /// Price a menu at today's average costs.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, menu_id = %menu_id), err)]
    pub async fn calculate_estimated_cost(
        &self,
        tenant_id: TenantId,
        menu_id: MenuId,
        portion_count: u32,
    ) -> Result<EstimatedCost, LedgerError> {
        let menu = self
            .menus
            .load_menu(tenant_id, menu_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("menu {menu_id}")))?;

        let item_ids: Vec<InventoryItemId> = menu.ingredients.iter().map(|i| i.item_id).collect();
        let items = self.load_items(tenant_id, &item_ids).await?;
        let unit_costs: HashMap<InventoryItemId, Decimal> = items
            .iter()
            .map(|(id, item)| (*id, item.average_cost()))
            .collect();

        Ok(estimate_cost(&menu, portion_count, &unit_costs)?)
    }

    /// Record what a batch consumed, freezing each item's current average
    /// cost into the usage row.
    ///
    /// An item may be recorded once per batch. With stock consumption on,
    /// every item is checked for sufficient stock before anything is written,
    /// and the rows are committed before their `OUT` movements. If posting
    /// stops partway the rows stay and the error is `PartiallyPosted`;
    /// repeating the same call posts only the movements still missing.
    #[instrument(
        skip(self, lines),
        fields(tenant_id = %tenant_id, production_id = %production_id, lines = lines.len()),
        err
    )]
    pub async fn record_stock_usage(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        actor: ActorId,
        lines: Vec<UsageLine>,
    ) -> Result<Vec<ProductionStockUsage>, LedgerError> {
        let batch = self.load_batch(tenant_id, production_id).await?;
        if batch.is_finalized() {
            return Err(LedgerError::Validation(format!(
                "production {production_id} is completed; its usage can no longer change"
            )));
        }

        ensure_distinct_items(&lines)?;

        let existing = self.usages.list_usages(tenant_id, production_id).await?;
        let consumed = self.consumed_items(tenant_id, production_id, &existing).await?;
        // An earlier call stored rows but stopped before taking all their
        // stock out; repeating it finishes the job instead of failing.
        let resuming =
            self.consume_stock && existing.iter().any(|row| !consumed.contains(&row.item_id));

        let mut pending = Vec::new();
        let mut fresh = Vec::new();
        for line in &lines {
            match existing.iter().find(|row| row.item_id == line.item_id) {
                None => fresh.push(line),
                Some(row) if resuming && row.quantity_used == line.quantity_used => {
                    if !consumed.contains(&row.item_id) {
                        pending.push(row.clone());
                    }
                }
                Some(_) => {
                    return Err(LedgerError::Validation(format!(
                        "usage of item {} is already recorded for production {production_id}",
                        line.item_id
                    )));
                }
            }
        }

        let item_ids: Vec<InventoryItemId> = lines.iter().map(|l| l.item_id).collect();
        let items = self.load_items(tenant_id, &item_ids).await?;

        if self.consume_stock {
            let wanted = fresh
                .iter()
                .map(|line| (line.item_id, line.quantity_used))
                .chain(pending.iter().map(|row| (row.item_id, row.quantity_used)));
            for (item_id, quantity) in wanted {
                let stock = items[&item_id].current_stock();
                if stock < quantity {
                    return Err(LedgerError::insufficient_stock(item_id, stock, quantity));
                }
            }
        }

        let recorded_at = Utc::now();
        let rows: Vec<ProductionStockUsage> = fresh
            .iter()
            .map(|line| {
                let item = &items[&line.item_id];
                ProductionStockUsage {
                    id: UsageId::new(),
                    tenant_id,
                    production_id,
                    item_id: line.item_id,
                    item_name: item.name().to_string(),
                    unit: item.unit().to_string(),
                    quantity_used: line.quantity_used,
                    unit_cost_at_use: item.average_cost(),
                    recorded_by: actor,
                    recorded_at,
                }
            })
            .collect();

        if !rows.is_empty() {
            self.usages.insert_usages(&rows).await.map_err(|e| match e {
                LedgerStoreError::AlreadyExists(msg) => {
                    LedgerError::Validation(format!("usage already recorded: {msg}"))
                }
                other => other.into(),
            })?;
        }

        if self.consume_stock {
            let to_consume: Vec<&ProductionStockUsage> = pending.iter().chain(rows.iter()).collect();
            if let Err(e) = self
                .consume(tenant_id, production_id, actor, &to_consume, recorded_at)
                .await
            {
                if !rows.is_empty() {
                    self.record(tenant_id, production_id, actor, &rows, pending.len())
                        .await;
                }
                return Err(e);
            }
        }

        if !rows.is_empty() || !pending.is_empty() {
            self.record(tenant_id, production_id, actor, &rows, pending.len())
                .await;
        }

        info!(
            recorded = rows.len(),
            resumed = pending.len(),
            "production usage recorded"
        );
        pending.extend(rows);
        Ok(pending)
    }

    /// Items this batch has already taken out of stock.
    async fn consumed_items(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        existing: &[ProductionStockUsage],
    ) -> Result<HashSet<InventoryItemId>, LedgerError> {
        if !self.consume_stock || existing.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(self
            .dispatcher
            .store()
            .find_by_reference(tenant_id, MovementReference::Production(production_id))
            .await?
            .into_iter()
            .map(|m| m.item_id)
            .collect())
    }

    /// Post one `OUT` per row. The rows are already stored, so any failure
    /// comes back as `PartiallyPosted`.
    async fn consume(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        actor: ActorId,
        rows: &[&ProductionStockUsage],
        occurred_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut posted = Vec::new();
        for row in rows {
            let command = StockCommand::Issue(IssueStock {
                context: MovementContext {
                    tenant_id,
                    item_id: row.item_id,
                    movement_id: MovementId::new(),
                    reference: Some(MovementReference::Production(production_id)),
                    note: Some(format!("Consumed by production {production_id}")),
                    actor,
                    occurred_at,
                },
                kind: MovementKind::Out,
                quantity: row.quantity_used,
            });

            match self.dispatcher.dispatch(tenant_id, row.item_id, command).await {
                Ok(_) => posted.push(row.item_id),
                // A concurrent call for the same batch consumed it first.
                Err(LedgerError::Store(LedgerStoreError::DuplicateReference { item_id, .. })) => {
                    info!(%item_id, "production usage consumed concurrently for item, skipping");
                }
                Err(e) => {
                    warn!(
                        item_id = %row.item_id,
                        consumed = posted.len(),
                        error = %e,
                        "stock consumption stopped; usage rows are kept for retry"
                    );
                    return Err(LedgerError::PartiallyPosted {
                        posted,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(())
    }

    async fn record(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        actor: ActorId,
        rows: &[ProductionStockUsage],
        resumed: usize,
    ) {
        append_after_commit(
            self.audit.as_ref(),
            AuditRecord::new(
                tenant_id,
                actor,
                "production.usage_recorded",
                "production",
                *production_id.as_uuid(),
                json!({
                    "consumed_stock": self.consume_stock,
                    "resumed": resumed,
                    "usages": rows,
                }),
            ),
        )
        .await;
    }

    /// Actual cost of a batch from its usage rows.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, production_id = %production_id), err)]
    pub async fn calculate_production_cost(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<ProductionCost, LedgerError> {
        let batch = self.load_batch(tenant_id, production_id).await?;
        let usages = self.usages.list_usages(tenant_id, production_id).await?;
        Ok(summarize_cost(production_id, &usages, batch.costing_portions())?)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, production_id = %production_id), err)]
    pub async fn get_cost_breakdown(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<Vec<CostBreakdownLine>, LedgerError> {
        self.load_batch(tenant_id, production_id).await?;
        let usages = self.usages.list_usages(tenant_id, production_id).await?;
        Ok(cost_breakdown(&usages)?)
    }

    /// Drop every usage row of a batch that is not completed yet.
    ///
    /// Stock movements posted for the usage are left alone; take stock back
    /// in with an adjustment if needed.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, production_id = %production_id), err)]
    pub async fn delete_stock_usage(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        actor: ActorId,
    ) -> Result<u64, LedgerError> {
        let batch = self.load_batch(tenant_id, production_id).await?;
        if batch.is_finalized() {
            return Err(LedgerError::Validation(format!(
                "production {production_id} is completed; its usage cannot be deleted"
            )));
        }

        let removed = self.usages.delete_usages(tenant_id, production_id).await?;
        if removed > 0 {
            append_after_commit(
                self.audit.as_ref(),
                AuditRecord::new(
                    tenant_id,
                    actor,
                    "production.usage_deleted",
                    "production",
                    *production_id.as_uuid(),
                    json!({ "removed": removed }),
                ),
            )
            .await;
        }
        Ok(removed)
    }

    async fn load_batch(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<ProductionBatch, LedgerError> {
        self.batches
            .load_batch(tenant_id, production_id)
            .await?
            .filter(|b| b.tenant_id == tenant_id)
            .ok_or_else(|| LedgerError::NotFound(format!("production {production_id}")))
    }

    /// Load every item or report all the missing ones.
    async fn load_items(
        &self,
        tenant_id: TenantId,
        item_ids: &[InventoryItemId],
    ) -> Result<HashMap<InventoryItemId, InventoryItem>, LedgerError> {
        let store = self.dispatcher.store();
        let mut items = HashMap::new();
        let mut missing = Vec::new();

        for &item_id in item_ids {
            if items.contains_key(&item_id) || missing.contains(&item_id) {
                continue;
            }
            match store.load_item(tenant_id, item_id).await? {
                Some(item) => {
                    items.insert(item_id, item);
                }
                None => missing.push(item_id),
            }
        }

        if !missing.is_empty() {
            return Err(LedgerError::UnknownItems { item_ids: missing });
        }
        Ok(items)
    }
}
