use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use mealledger_core::{AggregateRoot, ExpectedVersion, InventoryItemId, TenantId};
use mealledger_inventory::{InventoryItem, MovementReference, StockMovement};

use super::query::{MovementFilter, MovementPage, Pagination};
use super::r#trait::{LedgerStoreError, StockLedgerStore, validate_commit};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct ItemKey {
    tenant_id: TenantId,
    item_id: InventoryItemId,
}

#[derive(Debug, Clone)]
struct ItemRecord {
    item: InventoryItem,
    ledger: Vec<StockMovement>,
}

/// In-memory stock ledger.
///
/// Intended for tests/dev. A single write guard makes every commit atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    items: RwLock<HashMap<ItemKey, ItemRecord>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockLedgerStore for InMemoryLedgerStore {
    async fn register_item(&self, item: &InventoryItem) -> Result<(), LedgerStoreError> {
        if item.version() != 0 {
            return Err(LedgerStoreError::InvalidCommit(format!(
                "item {} must be registered before any movement",
                item.id_typed()
            )));
        }

        let key = ItemKey {
            tenant_id: item.tenant_id(),
            item_id: item.id_typed(),
        };
        let mut items = self.items.write().await;
        if items.contains_key(&key) {
            return Err(LedgerStoreError::AlreadyExists(format!(
                "item {}",
                item.id_typed()
            )));
        }
        items.insert(
            key,
            ItemRecord {
                item: item.clone(),
                ledger: Vec::new(),
            },
        );
        Ok(())
    }

    async fn load_item(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, LedgerStoreError> {
        let items = self.items.read().await;
        Ok(items
            .get(&ItemKey { tenant_id, item_id })
            .map(|record| record.item.clone()))
    }

    async fn list_items(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, LedgerStoreError> {
        let items = self.items.read().await;
        let mut listed: Vec<InventoryItem> = items
            .iter()
            .filter(|(key, _)| key.tenant_id == tenant_id)
            .map(|(_, record)| record.item.clone())
            .collect();
        listed.sort_by(|a, b| a.name().cmp(b.name()).then(a.id_typed().cmp(&b.id_typed())));
        Ok(listed)
    }

    async fn commit(
        &self,
        tenant_id: TenantId,
        item: &InventoryItem,
        movements: &[StockMovement],
        expected_version: ExpectedVersion,
    ) -> Result<(), LedgerStoreError> {
        validate_commit(tenant_id, item, movements, expected_version)?;

        let key = ItemKey {
            tenant_id,
            item_id: item.id_typed(),
        };
        let mut items = self.items.write().await;
        let record = items
            .get_mut(&key)
            .ok_or_else(|| LedgerStoreError::NotFound(format!("item {}", item.id_typed())))?;

        let current = record.item.version();
        expected_version
            .check(current)
            .map_err(|e| LedgerStoreError::Concurrency(e.to_string()))?;

        for (idx, movement) in movements.iter().enumerate() {
            if movement.sequence != current + 1 + idx as u64 {
                return Err(LedgerStoreError::InvalidCommit(format!(
                    "movement {} has sequence {}, expected {}",
                    movement.id,
                    movement.sequence,
                    current + 1 + idx as u64
                )));
            }
            if let Some(reference) = movement.reference.filter(MovementReference::is_unique_per_item)
            {
                let taken = record
                    .ledger
                    .iter()
                    .chain(movements[..idx].iter())
                    .any(|existing| existing.reference == Some(reference));
                if taken {
                    return Err(LedgerStoreError::DuplicateReference {
                        item_id: item.id_typed(),
                        reference,
                    });
                }
            }
        }

        record.ledger.extend_from_slice(movements);
        record.item = item.clone();
        Ok(())
    }

    async fn load_ledger(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Vec<StockMovement>, LedgerStoreError> {
        let items = self.items.read().await;
        Ok(items
            .get(&ItemKey { tenant_id, item_id })
            .map(|record| record.ledger.clone())
            .unwrap_or_default())
    }

    async fn find_by_reference(
        &self,
        tenant_id: TenantId,
        reference: MovementReference,
    ) -> Result<Vec<StockMovement>, LedgerStoreError> {
        let items = self.items.read().await;
        let mut found: Vec<StockMovement> = items
            .iter()
            .filter(|(key, _)| key.tenant_id == tenant_id)
            .flat_map(|(_, record)| record.ledger.iter())
            .filter(|m| m.reference == Some(reference))
            .cloned()
            .collect();
        found.sort_by_key(|m| (m.occurred_at, m.item_id, m.sequence));
        Ok(found)
    }

    async fn query_movements(
        &self,
        tenant_id: TenantId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerStoreError> {
        let items = self.items.read().await;
        let mut matched: Vec<&StockMovement> = items
            .iter()
            .filter(|(key, _)| key.tenant_id == tenant_id)
            .flat_map(|(_, record)| record.ledger.iter())
            .filter(|m| filter.matches(m))
            .collect();
        matched.sort_by_key(|m| (m.occurred_at, m.item_id, m.sequence));

        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect();
        Ok(MovementPage::new(page, total, pagination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mealledger_core::{ActorId, Aggregate, MovementId, ProcurementId};
    use mealledger_inventory::{MovementContext, MovementKind, ReceiveStock, StockCommand};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn receive(item: &InventoryItem, reference: Option<MovementReference>) -> (InventoryItem, Vec<StockMovement>) {
        let cmd = StockCommand::Receive(ReceiveStock {
            context: MovementContext {
                tenant_id: item.tenant_id(),
                item_id: item.id_typed(),
                movement_id: MovementId::new(),
                reference,
                note: None,
                actor: ActorId::new(),
                occurred_at: Utc::now(),
            },
            kind: MovementKind::In,
            quantity: dec!(10),
            unit_cost: dec!(100),
        });
        let movements = item.handle(&cmd).unwrap();
        let mut next = item.clone();
        for m in &movements {
            next.apply(m);
        }
        (next, movements)
    }

    async fn registered() -> (InMemoryLedgerStore, InventoryItem) {
        let store = InMemoryLedgerStore::new();
        let item = InventoryItem::new(TenantId::new(), InventoryItemId::new(), "Gula", "kg").unwrap();
        store.register_item(&item).await.unwrap();
        (store, item)
    }

    #[tokio::test]
    async fn commit_appends_and_updates_projection() {
        let (store, item) = registered().await;
        let (next, movements) = receive(&item, None);

        store
            .commit(item.tenant_id(), &next, &movements, ExpectedVersion::Exact(0))
            .await
            .unwrap();

        let loaded = store.load_item(item.tenant_id(), item.id_typed()).await.unwrap().unwrap();
        assert_eq!(loaded.current_stock(), dec!(10));
        assert_eq!(loaded.version(), 1);
        let ledger = store.load_ledger(item.tenant_id(), item.id_typed()).await.unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn stale_version_is_a_concurrency_error() {
        let (store, item) = registered().await;
        let (next, movements) = receive(&item, None);
        store
            .commit(item.tenant_id(), &next, &movements, ExpectedVersion::Exact(0))
            .await
            .unwrap();

        // Decided against version 0, which is no longer current.
        let (stale, stale_movements) = receive(&item, None);
        let err = store
            .commit(item.tenant_id(), &stale, &stale_movements, ExpectedVersion::Exact(0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerStoreError::Concurrency(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unique_reference_is_rejected_twice_for_one_item() {
        let (store, item) = registered().await;
        let reference = Some(MovementReference::Procurement(ProcurementId::new()));

        let (next, movements) = receive(&item, reference);
        store
            .commit(item.tenant_id(), &next, &movements, ExpectedVersion::Exact(0))
            .await
            .unwrap();

        let (again, again_movements) = receive(&next, reference);
        let err = store
            .commit(item.tenant_id(), &again, &again_movements, ExpectedVersion::Exact(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerStoreError::DuplicateReference { .. }));

        let ledger = store.load_ledger(item.tenant_id(), item.id_typed()).await.unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn reads_are_tenant_scoped() {
        let (store, item) = registered().await;
        let other = TenantId::new();
        assert!(store.load_item(other, item.id_typed()).await.unwrap().is_none());
        assert!(store.list_items(other).await.unwrap().is_empty());

        let (next, movements) = receive(&item, None);
        let err = store
            .commit(other, &next, &movements, ExpectedVersion::Exact(0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerStoreError::TenantIsolation(_)));
    }

    #[tokio::test]
    async fn registering_twice_fails() {
        let (store, item) = registered().await;
        assert!(matches!(
            store.register_item(&item).await,
            Err(LedgerStoreError::AlreadyExists(_))
        ));
    }

    proptest! {
        #[test]
        fn paging_visits_every_movement_once(count in 1usize..25, limit in 1u32..10) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let (store, mut item) = registered().await;
                for _ in 0..count {
                    let (next, movements) = receive(&item, None);
                    store
                        .commit(item.tenant_id(), &next, &movements, ExpectedVersion::Exact(item.version()))
                        .await
                        .unwrap();
                    item = next;
                }

                let mut seen = Vec::new();
                let mut offset = 0;
                loop {
                    let page = store
                        .query_movements(
                            item.tenant_id(),
                            MovementFilter::for_item(item.id_typed()),
                            Pagination::new(Some(limit), Some(offset)),
                        )
                        .await
                        .unwrap();
                    assert_eq!(page.total, count as u64);
                    seen.extend(page.movements.iter().map(|m| m.sequence));
                    if !page.has_more {
                        break;
                    }
                    offset += limit;
                }

                let expected: Vec<u64> = (1..=count as u64).collect();
                assert_eq!(seen, expected);
            });
        }
    }
}
