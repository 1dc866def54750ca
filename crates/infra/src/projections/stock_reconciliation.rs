//! Reconciliation of cached item figures against their ledgers.
//!
//! For every item the ledger is replayed from zero. The replay must follow
//! an unbroken chain and land exactly on the cached stock, average cost and
//! version.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use mealledger_core::{AggregateRoot, InventoryItemId, TenantId};
use mealledger_inventory::{InventoryItem, StockMovement};

use crate::ledger_store::{LedgerStoreError, StockLedgerStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// The ledger itself is inconsistent and cannot be replayed.
    ChainBroken {
        item_id: InventoryItemId,
        name: String,
        reason: String,
    },
    /// The ledger replays cleanly but disagrees with the cached figures.
    ProjectionMismatch {
        item_id: InventoryItemId,
        name: String,
        cached_stock: Decimal,
        ledger_stock: Decimal,
        cached_average_cost: Decimal,
        ledger_average_cost: Decimal,
        cached_version: u64,
        ledger_version: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub tenant_id: TenantId,
    pub items_checked: usize,
    pub movements_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Compare one item with its ledger. `None` means they agree.
pub fn reconcile_item(item: &InventoryItem, ledger: &[StockMovement]) -> Option<Discrepancy> {
    let replayed = match item.replay(ledger) {
        Ok(replayed) => replayed,
        Err(e) => {
            return Some(Discrepancy::ChainBroken {
                item_id: item.id_typed(),
                name: item.name().to_string(),
                reason: e.to_string(),
            });
        }
    };

    let agrees = replayed.current_stock() == item.current_stock()
        && replayed.average_cost() == item.average_cost()
        && replayed.version() == item.version();
    if agrees {
        return None;
    }

    Some(Discrepancy::ProjectionMismatch {
        item_id: item.id_typed(),
        name: item.name().to_string(),
        cached_stock: item.current_stock(),
        ledger_stock: replayed.current_stock(),
        cached_average_cost: item.average_cost(),
        ledger_average_cost: replayed.average_cost(),
        cached_version: item.version(),
        ledger_version: replayed.version(),
    })
}

#[instrument(skip(store), fields(tenant_id = %tenant_id), err)]
pub async fn reconcile_tenant(
    store: &dyn StockLedgerStore,
    tenant_id: TenantId,
) -> Result<ReconciliationReport, LedgerStoreError> {
    let items = store.list_items(tenant_id).await?;

    let mut movements_checked = 0;
    let mut discrepancies = Vec::new();
    for item in &items {
        let ledger = store.load_ledger(tenant_id, item.id_typed()).await?;
        movements_checked += ledger.len();
        if let Some(discrepancy) = reconcile_item(item, &ledger) {
            warn!(item_id = %item.id_typed(), ?discrepancy, "stock projection disagrees with ledger");
            discrepancies.push(discrepancy);
        }
    }

    Ok(ReconciliationReport {
        tenant_id,
        items_checked: items.len(),
        movements_checked,
        discrepancies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mealledger_core::{ActorId, Aggregate, MovementId};
    use mealledger_inventory::{
        IssueStock, MovementContext, MovementKind, ReceiveStock, StockCommand,
    };
    use rust_decimal_macros::dec;

    fn context(item: &InventoryItem) -> MovementContext {
        MovementContext {
            tenant_id: item.tenant_id(),
            item_id: item.id_typed(),
            movement_id: MovementId::new(),
            reference: None,
            note: None,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        }
    }

    fn run(item: &mut InventoryItem, ledger: &mut Vec<StockMovement>, cmd: StockCommand) {
        for movement in item.handle(&cmd).unwrap() {
            item.apply(&movement);
            ledger.push(movement);
        }
    }

    fn item_with_ledger() -> (InventoryItem, Vec<StockMovement>) {
        let mut item =
            InventoryItem::new(TenantId::new(), InventoryItemId::new(), "Ayam", "kg").unwrap();
        let mut ledger = Vec::new();
        for (quantity, cost) in [(dec!(40), dec!(35000)), (dec!(20), dec!(38000))] {
            let cmd = StockCommand::Receive(ReceiveStock {
                context: context(&item),
                kind: MovementKind::In,
                quantity,
                unit_cost: cost,
            });
            run(&mut item, &mut ledger, cmd);
        }
        let cmd = StockCommand::Issue(IssueStock {
            context: context(&item),
            kind: MovementKind::Out,
            quantity: dec!(15),
        });
        run(&mut item, &mut ledger, cmd);
        (item, ledger)
    }

    #[test]
    fn consistent_item_reconciles() {
        let (item, ledger) = item_with_ledger();
        assert_eq!(reconcile_item(&item, &ledger), None);
    }

    #[test]
    fn drifted_cache_is_reported() {
        let (item, ledger) = item_with_ledger();
        let mut snapshot = item.snapshot();
        snapshot.current_stock = dec!(50);
        let drifted = InventoryItem::from_snapshot(snapshot);

        match reconcile_item(&drifted, &ledger) {
            Some(Discrepancy::ProjectionMismatch {
                cached_stock,
                ledger_stock,
                ..
            }) => {
                assert_eq!(cached_stock, dec!(50));
                assert_eq!(ledger_stock, dec!(45));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_entry_breaks_the_chain() {
        let (item, mut ledger) = item_with_ledger();
        ledger.remove(1);
        assert!(matches!(
            reconcile_item(&item, &ledger),
            Some(Discrepancy::ChainBroken { .. })
        ));
    }
}
