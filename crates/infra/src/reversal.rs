//! Compensating entries for cancelled procurements.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use mealledger_core::{ActorId, InventoryItemId, MovementId, ProcurementId, TenantId};
use mealledger_inventory::{
    MovementContext, MovementKind, MovementReference, ReverseReceipt, StockCommand, StockMovement,
};

use crate::audit::{AuditLog, AuditRecord, append_after_commit};
use crate::command_dispatcher::StockCommandDispatcher;
use crate::error::LedgerError;
use crate::ledger_store::LedgerStoreError;

/// One compensating `OUT` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalPosting {
    pub item_id: InventoryItemId,
    pub movement_id: MovementId,
    pub original_movement_id: MovementId,
    /// Negative: the original quantity taken back out.
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
}

pub struct ReversalProcessor {
    dispatcher: StockCommandDispatcher,
    audit: Arc<dyn AuditLog>,
}

impl ReversalProcessor {
    pub fn new(dispatcher: StockCommandDispatcher, audit: Arc<dyn AuditLog>) -> Self {
        Self { dispatcher, audit }
    }

    /// Take back out every quantity a procurement brought in.
    ///
    /// Each `IN` movement referencing the procurement gets one `OUT` entry of
    /// the same magnitude at the original unit cost. The average cost of the
    /// item is left as it is. Items already reversed are skipped, so calling
    /// this twice is harmless.
    ///
    /// Stock is checked for every item before the first write: if any item no
    /// longer holds the quantity it received, nothing is reversed.
    #[instrument(
        skip(self, reason),
        fields(tenant_id = %tenant_id, procurement_id = %procurement_id),
        err
    )]
    pub async fn reverse_procurement_movements(
        &self,
        tenant_id: TenantId,
        procurement_id: ProcurementId,
        actor: ActorId,
        reason: &str,
    ) -> Result<Vec<ReversalPosting>, LedgerError> {
        let store = self.dispatcher.store();

        let originals: Vec<StockMovement> = store
            .find_by_reference(tenant_id, MovementReference::Procurement(procurement_id))
            .await?
            .into_iter()
            .filter(|m| m.kind == MovementKind::In)
            .collect();

        if originals.is_empty() {
            info!("no receipt movements to reverse");
            return Ok(Vec::new());
        }

        let reversal = MovementReference::ProcurementReversal(procurement_id);
        let reversed: HashSet<InventoryItemId> = store
            .find_by_reference(tenant_id, reversal)
            .await?
            .into_iter()
            .map(|m| m.item_id)
            .collect();

        let pending: Vec<StockMovement> = originals
            .into_iter()
            .filter(|m| {
                let done = reversed.contains(&m.item_id);
                if done {
                    info!(item_id = %m.item_id, "receipt already reversed for item, skipping");
                }
                !done
            })
            .collect();

        if pending.is_empty() {
            return Ok(Vec::new());
        }

        for original in &pending {
            let item = store
                .load_item(tenant_id, original.item_id)
                .await?
                .ok_or_else(|| LedgerError::NotFound(format!("item {}", original.item_id)))?;
            if item.current_stock() < original.quantity {
                return Err(LedgerError::insufficient_stock(
                    original.item_id,
                    item.current_stock(),
                    original.quantity,
                ));
            }
        }

        let mut postings = Vec::with_capacity(pending.len());
        for original in pending {
            let movement_id = MovementId::new();
            let command = StockCommand::Reverse(ReverseReceipt {
                context: MovementContext {
                    tenant_id,
                    item_id: original.item_id,
                    movement_id,
                    reference: Some(reversal),
                    note: Some(reason.to_string()),
                    actor,
                    occurred_at: Utc::now(),
                },
                original: original.clone(),
            });

            match self.dispatcher.dispatch(tenant_id, original.item_id, command).await {
                Ok(dispatched) => postings.push(ReversalPosting {
                    item_id: original.item_id,
                    movement_id,
                    original_movement_id: original.id,
                    quantity: -original.quantity,
                    unit_cost: original.unit_cost,
                    stock_before: dispatched.before.current_stock(),
                    stock_after: dispatched.after.current_stock(),
                }),
                Err(LedgerError::Store(LedgerStoreError::DuplicateReference { item_id, .. })) => {
                    info!(%item_id, "receipt reversed concurrently for item, skipping");
                }
                Err(e) if postings.is_empty() => return Err(e),
                Err(e) => {
                    self.record(tenant_id, procurement_id, actor, reason, &postings)
                        .await;
                    return Err(LedgerError::PartiallyPosted {
                        posted: postings.iter().map(|p| p.item_id).collect(),
                        source: Box::new(e),
                    });
                }
            }
        }

        if !postings.is_empty() {
            self.record(tenant_id, procurement_id, actor, reason, &postings)
                .await;
        }

        info!(reversed = postings.len(), "procurement receipt reversed");
        Ok(postings)
    }

    async fn record(
        &self,
        tenant_id: TenantId,
        procurement_id: ProcurementId,
        actor: ActorId,
        reason: &str,
        postings: &[ReversalPosting],
    ) {
        let record = AuditRecord::new(
            tenant_id,
            actor,
            "procurement.reversed",
            "procurement",
            *procurement_id.as_uuid(),
            json!({
                "reason": reason,
                "postings": postings,
            }),
        );
        append_after_commit(self.audit.as_ref(), record).await;
    }
}
