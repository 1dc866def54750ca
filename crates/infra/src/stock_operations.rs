//! Manual stock operations: item registration, count corrections and
//! write-offs. They share the dispatcher's write path with receipts, so
//! every change lands in the ledger.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use mealledger_core::{ActorId, InventoryItemId, MovementId, TenantId};
use mealledger_inventory::{
    AdjustStock, InventoryItem, IssueStock, MovementContext, MovementKind, MovementReference,
    StockCommand, StockMovement,
};

use crate::audit::{AuditLog, AuditRecord, append_after_commit};
use crate::command_dispatcher::StockCommandDispatcher;
use crate::error::LedgerError;

pub struct StockOperations {
    dispatcher: StockCommandDispatcher,
    audit: Arc<dyn AuditLog>,
}

impl StockOperations {
    pub fn new(dispatcher: StockCommandDispatcher, audit: Arc<dyn AuditLog>) -> Self {
        Self { dispatcher, audit }
    }

    /// Start tracking a new item with an empty ledger.
    #[instrument(skip(self, item), fields(tenant_id = %item.tenant_id(), item_id = %item.id_typed()), err)]
    pub async fn register_item(&self, item: &InventoryItem) -> Result<(), LedgerError> {
        if item.current_stock() != Decimal::ZERO {
            return Err(LedgerError::Validation(
                "new items start from zero stock; receive or adjust to add stock".into(),
            ));
        }
        self.dispatcher.store().register_item(item).await?;
        Ok(())
    }

    /// Signed correction after a physical count.
    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    pub async fn adjust_stock(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        actor: ActorId,
        delta: Decimal,
        reason: &str,
    ) -> Result<StockMovement, LedgerError> {
        let command = StockCommand::Adjust(AdjustStock {
            context: self.context(
                tenant_id,
                item_id,
                actor,
                MovementReference::Adjustment(Uuid::now_v7()),
                reason,
            ),
            delta,
        });
        self.run(tenant_id, item_id, actor, command, "stock.adjusted", reason)
            .await
    }

    /// Remove expired or damaged stock at its average cost.
    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, item_id = %item_id, kind = %kind), err)]
    pub async fn write_off(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        actor: ActorId,
        kind: MovementKind,
        quantity: Decimal,
        reason: &str,
    ) -> Result<StockMovement, LedgerError> {
        if !matches!(kind, MovementKind::Expired | MovementKind::Damaged) {
            return Err(LedgerError::Validation(format!(
                "{kind} is not a write-off; use EXPIRED or DAMAGED"
            )));
        }

        let command = StockCommand::Issue(IssueStock {
            context: self.context(
                tenant_id,
                item_id,
                actor,
                MovementReference::Adjustment(Uuid::now_v7()),
                reason,
            ),
            kind,
            quantity,
        });
        self.run(tenant_id, item_id, actor, command, "stock.written_off", reason)
            .await
    }

    fn context(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        actor: ActorId,
        reference: MovementReference,
        reason: &str,
    ) -> MovementContext {
        MovementContext {
            tenant_id,
            item_id,
            movement_id: MovementId::new(),
            reference: Some(reference),
            note: Some(reason.to_string()),
            actor,
            occurred_at: Utc::now(),
        }
    }

    async fn run(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        actor: ActorId,
        command: StockCommand,
        action: &str,
        reason: &str,
    ) -> Result<StockMovement, LedgerError> {
        let dispatched = self.dispatcher.dispatch(tenant_id, item_id, command).await?;
        let movement = dispatched
            .movements
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::Invariant("command produced no movement".into()))?;

        append_after_commit(
            self.audit.as_ref(),
            AuditRecord::new(
                tenant_id,
                actor,
                action,
                "inventory_item",
                *item_id.as_uuid(),
                json!({
                    "reason": reason,
                    "movement_id": movement.id,
                    "kind": movement.kind,
                    "quantity": movement.quantity,
                    "stock_before": movement.stock_before,
                    "stock_after": movement.stock_after,
                }),
            ),
        )
        .await;

        Ok(movement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use crate::command_dispatcher::DEFAULT_MAX_COMMIT_ATTEMPTS;
    use crate::ledger_store::{InMemoryLedgerStore, StockLedgerStore};
    use rust_decimal_macros::dec;

    async fn setup() -> (StockOperations, Arc<InMemoryAuditLog>, TenantId, InventoryItemId) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let ops = StockOperations::new(
            StockCommandDispatcher::new(store, DEFAULT_MAX_COMMIT_ATTEMPTS),
            audit.clone(),
        );
        let tenant_id = TenantId::new();
        let item_id = InventoryItemId::new();
        ops.register_item(&InventoryItem::new(tenant_id, item_id, "Wortel", "kg").unwrap())
            .await
            .unwrap();
        (ops, audit, tenant_id, item_id)
    }

    #[tokio::test]
    async fn adjustment_and_write_off_go_through_the_ledger() {
        let (ops, audit, tenant_id, item_id) = setup().await;
        let actor = ActorId::new();

        let up = ops
            .adjust_stock(tenant_id, item_id, actor, dec!(8), "opening count")
            .await
            .unwrap();
        assert_eq!(up.kind, MovementKind::Adjustment);
        assert_eq!(up.stock_after, dec!(8));

        let off = ops
            .write_off(tenant_id, item_id, actor, MovementKind::Expired, dec!(3), "spoiled")
            .await
            .unwrap();
        assert_eq!(off.quantity, dec!(-3));
        assert_eq!(off.stock_after, dec!(5));

        let ledger = ops
            .dispatcher
            .store()
            .load_ledger(tenant_id, item_id)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 2);

        let trail = audit.list_for_entity(tenant_id, *item_id.as_uuid()).await.unwrap();
        let actions: Vec<&str> = trail.iter().map(|r| r.action.as_str()).collect();
        assert_eq!(actions, vec!["stock.adjusted", "stock.written_off"]);
    }

    #[tokio::test]
    async fn write_off_rejects_other_kinds_and_overdraws() {
        let (ops, _, tenant_id, item_id) = setup().await;
        let actor = ActorId::new();

        let err = ops
            .write_off(tenant_id, item_id, actor, MovementKind::Out, dec!(1), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = ops
            .write_off(tenant_id, item_id, actor, MovementKind::Damaged, dec!(1), "dropped")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { .. }));
    }

    #[tokio::test]
    async fn negative_adjustment_cannot_go_below_zero() {
        let (ops, _, tenant_id, item_id) = setup().await;
        let err = ops
            .adjust_stock(tenant_id, item_id, ActorId::new(), dec!(-1), "recount")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { .. }));
    }
}
