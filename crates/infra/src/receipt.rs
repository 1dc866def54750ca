//! Posting procurement receipts into the stock ledger.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use mealledger_core::{ActorId, InventoryItemId, MovementId, ProcurementId, TenantId};
use mealledger_inventory::{MovementContext, MovementKind, MovementReference, ReceiveStock, StockCommand};
use mealledger_procurement::{PostingError, PostingLine, ProcurementReceipt};

use crate::audit::{AuditLog, AuditRecord, append_after_commit};
use crate::command_dispatcher::StockCommandDispatcher;
use crate::error::LedgerError;
use crate::ledger_store::LedgerStoreError;
use crate::sources::ProcurementSource;

/// One item's stock change caused by a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPosting {
    pub item_id: InventoryItemId,
    pub movement_id: MovementId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub average_cost_after: Decimal,
}

pub struct ReceiptProcessor {
    procurements: Arc<dyn ProcurementSource>,
    dispatcher: StockCommandDispatcher,
    audit: Arc<dyn AuditLog>,
}

impl ReceiptProcessor {
    pub fn new(
        procurements: Arc<dyn ProcurementSource>,
        dispatcher: StockCommandDispatcher,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            procurements,
            dispatcher,
            audit,
        }
    }

    /// Post every accepted, received line of a procurement as an `IN`
    /// movement, blending its price into the item's average cost.
    ///
    /// Safe to call repeatedly: items that already carry a movement for this
    /// procurement are skipped, so the second call returns an empty list.
    /// Validation happens before any write; a receipt with an unlinked line
    /// or an unknown item posts nothing.
    #[instrument(
        skip(self, notes),
        fields(tenant_id = %tenant_id, procurement_id = %procurement_id),
        err
    )]
    pub async fn receive_procurement(
        &self,
        tenant_id: TenantId,
        procurement_id: ProcurementId,
        actor: ActorId,
        notes: Option<&str>,
    ) -> Result<Vec<ReceiptPosting>, LedgerError> {
        let procurement = self
            .procurements
            .load_procurement(tenant_id, procurement_id)
            .await?
            .filter(|p| p.tenant_id == tenant_id)
            .ok_or_else(|| LedgerError::NotFound(format!("procurement {procurement_id}")))?;

        if !procurement.status.is_receivable() {
            return Err(LedgerError::NotReceivable {
                procurement_id,
                status: procurement.status,
            });
        }

        let lines = procurement.posting_lines().map_err(|e| match e {
            PostingError::Unlinked(lines) => LedgerError::UnlinkedLineItems {
                procurement_id,
                lines,
            },
            PostingError::Amount(err) => err.into(),
        })?;

        let store = self.dispatcher.store();
        let mut unknown = Vec::new();
        for line in &lines {
            if store.load_item(tenant_id, line.item_id).await?.is_none() {
                unknown.push(line.item_id);
            }
        }
        if !unknown.is_empty() {
            return Err(LedgerError::UnknownItems { item_ids: unknown });
        }

        let reference = MovementReference::Procurement(procurement_id);
        let already_posted: HashSet<InventoryItemId> = store
            .find_by_reference(tenant_id, reference)
            .await?
            .into_iter()
            .map(|m| m.item_id)
            .collect();

        let note = notes
            .map(str::to_string)
            .unwrap_or_else(|| format!("Receipt from {}", procurement.supplier_name));

        let mut postings = Vec::with_capacity(lines.len());
        for line in &lines {
            if already_posted.contains(&line.item_id) {
                info!(item_id = %line.item_id, "procurement already posted for item, skipping");
                continue;
            }

            match self.post_line(tenant_id, line, reference, &note, actor).await {
                Ok(Some(posting)) => postings.push(posting),
                Ok(None) => {}
                Err(e) if postings.is_empty() => return Err(e),
                Err(e) => {
                    self.record(&procurement, actor, notes, &postings).await;
                    return Err(LedgerError::PartiallyPosted {
                        posted: postings.iter().map(|p| p.item_id).collect(),
                        source: Box::new(e),
                    });
                }
            }
        }

        if !postings.is_empty() {
            self.record(&procurement, actor, notes, &postings).await;
        }

        info!(posted = postings.len(), "procurement receipt processed");
        Ok(postings)
    }

    async fn post_line(
        &self,
        tenant_id: TenantId,
        line: &PostingLine,
        reference: MovementReference,
        note: &str,
        actor: ActorId,
    ) -> Result<Option<ReceiptPosting>, LedgerError> {
        let movement_id = MovementId::new();
        let command = StockCommand::Receive(ReceiveStock {
            context: MovementContext {
                tenant_id,
                item_id: line.item_id,
                movement_id,
                reference: Some(reference),
                note: Some(note.to_string()),
                actor,
                occurred_at: Utc::now(),
            },
            kind: MovementKind::In,
            quantity: line.quantity,
            unit_cost: line.unit_price,
        });

        match self.dispatcher.dispatch(tenant_id, line.item_id, command).await {
            Ok(dispatched) => Ok(Some(ReceiptPosting {
                item_id: line.item_id,
                movement_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                stock_before: dispatched.before.current_stock(),
                stock_after: dispatched.after.current_stock(),
                average_cost_after: dispatched.after.average_cost(),
            })),
            // A concurrent receipt of the same procurement won the race.
            Err(LedgerError::Store(LedgerStoreError::DuplicateReference { item_id, .. })) => {
                info!(%item_id, "procurement posted concurrently for item, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn record(
        &self,
        procurement: &ProcurementReceipt,
        actor: ActorId,
        notes: Option<&str>,
        postings: &[ReceiptPosting],
    ) {
        let record = AuditRecord::new(
            procurement.tenant_id,
            actor,
            "procurement.received",
            "procurement",
            *procurement.id.as_uuid(),
            json!({
                "supplier": procurement.supplier_name,
                "status": procurement.status,
                "notes": notes,
                "postings": postings,
            }),
        );
        append_after_commit(self.audit.as_ref(), record).await;
    }
}
