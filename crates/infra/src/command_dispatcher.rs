//! Stock command execution pipeline.
//!
//! Every stock change goes through [`StockCommandDispatcher::dispatch`]:
//!
//! ```text
//! StockCommand
//!   ↓
//! 1. Load the item projection (tenant-scoped)
//!   ↓
//! 2. Decide movements (pure, `InventoryItem::handle`)
//!   ↓
//! 3. Fold them into the projection (`InventoryItem::apply`)
//!   ↓
//! 4. Commit movements + projection atomically, expecting the loaded version
//!   ↓
//! 5. On a version conflict, reload and decide again (bounded)
//! ```
//!
//! Decisions are always re-made against fresh state, so a retried receipt
//! blends its price into whatever average the concurrent writer left.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use mealledger_core::{Aggregate, AggregateRoot, ExpectedVersion, InventoryItemId, TenantId};
use mealledger_inventory::{InventoryItem, StockCommand, StockMovement};

use crate::error::LedgerError;
use crate::ledger_store::{LedgerStoreError, StockLedgerStore};

pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Result of a committed command.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// Projection before the command.
    pub before: InventoryItem,
    /// Projection after the command.
    pub after: InventoryItem,
    pub movements: Vec<StockMovement>,
}

#[derive(Clone)]
pub struct StockCommandDispatcher {
    store: Arc<dyn StockLedgerStore>,
    max_attempts: u32,
}

impl StockCommandDispatcher {
    pub fn new(store: Arc<dyn StockLedgerStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn StockLedgerStore> {
        &self.store
    }

    /// Execute one command against one item.
    ///
    /// Domain rejections (validation, insufficient stock) are returned
    /// as-is and never retried. Version conflicts are retried up to the
    /// configured number of attempts, then surface as
    /// [`LedgerError::Concurrency`].
    #[instrument(skip(self, command), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    pub async fn dispatch(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        command: StockCommand,
    ) -> Result<Dispatched, LedgerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let before = self
                .store
                .load_item(tenant_id, item_id)
                .await?
                .ok_or_else(|| LedgerError::NotFound(format!("item {item_id}")))?;

            let movements = before
                .handle(&command)
                .map_err(|e| LedgerError::from_domain(item_id, e))?;

            let mut after = before.clone();
            for movement in &movements {
                after.apply(movement);
            }

            match self
                .store
                .commit(
                    tenant_id,
                    &after,
                    &movements,
                    ExpectedVersion::Exact(before.version()),
                )
                .await
            {
                Ok(()) => {
                    debug!(
                        attempt,
                        version = after.version(),
                        stock = %after.current_stock(),
                        average_cost = %after.average_cost(),
                        "stock command committed"
                    );
                    return Ok(Dispatched {
                        before,
                        after,
                        movements,
                    });
                }
                Err(LedgerStoreError::Concurrency(msg)) if attempt < self.max_attempts => {
                    warn!(attempt, %msg, "version conflict, retrying stock command");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use mealledger_core::{ActorId, MovementId};
    use mealledger_inventory::{IssueStock, MovementContext, MovementKind, MovementReference, ReceiveStock};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::ledger_store::{InMemoryLedgerStore, MovementFilter, MovementPage, Pagination};

    fn context(tenant_id: TenantId, item_id: InventoryItemId) -> MovementContext {
        MovementContext {
            tenant_id,
            item_id,
            movement_id: MovementId::new(),
            reference: None,
            note: None,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        }
    }

    /// Store that reports a conflict on the first `conflicts` commits.
    struct Contended {
        inner: InMemoryLedgerStore,
        conflicts: AtomicU32,
    }

    #[async_trait]
    impl StockLedgerStore for Contended {
        async fn register_item(&self, item: &InventoryItem) -> Result<(), LedgerStoreError> {
            self.inner.register_item(item).await
        }
        async fn load_item(
            &self,
            tenant_id: TenantId,
            item_id: InventoryItemId,
        ) -> Result<Option<InventoryItem>, LedgerStoreError> {
            self.inner.load_item(tenant_id, item_id).await
        }
        async fn list_items(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, LedgerStoreError> {
            self.inner.list_items(tenant_id).await
        }
        async fn commit(
            &self,
            tenant_id: TenantId,
            item: &InventoryItem,
            movements: &[StockMovement],
            expected_version: ExpectedVersion,
        ) -> Result<(), LedgerStoreError> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(LedgerStoreError::Concurrency("simulated".into()));
            }
            self.inner.commit(tenant_id, item, movements, expected_version).await
        }
        async fn load_ledger(
            &self,
            tenant_id: TenantId,
            item_id: InventoryItemId,
        ) -> Result<Vec<StockMovement>, LedgerStoreError> {
            self.inner.load_ledger(tenant_id, item_id).await
        }
        async fn find_by_reference(
            &self,
            tenant_id: TenantId,
            reference: MovementReference,
        ) -> Result<Vec<StockMovement>, LedgerStoreError> {
            self.inner.find_by_reference(tenant_id, reference).await
        }
        async fn query_movements(
            &self,
            tenant_id: TenantId,
            filter: MovementFilter,
            pagination: Pagination,
        ) -> Result<MovementPage, LedgerStoreError> {
            self.inner.query_movements(tenant_id, filter, pagination).await
        }
    }

    async fn setup(conflicts: u32) -> (StockCommandDispatcher, TenantId, InventoryItemId) {
        let store = Contended {
            inner: InMemoryLedgerStore::new(),
            conflicts: AtomicU32::new(conflicts),
        };
        let tenant_id = TenantId::new();
        let item_id = InventoryItemId::new();
        let item = InventoryItem::new(tenant_id, item_id, "Minyak goreng", "liter").unwrap();
        store.register_item(&item).await.unwrap();
        (
            StockCommandDispatcher::new(Arc::new(store), DEFAULT_MAX_COMMIT_ATTEMPTS),
            tenant_id,
            item_id,
        )
    }

    fn receive(tenant_id: TenantId, item_id: InventoryItemId) -> StockCommand {
        StockCommand::Receive(ReceiveStock {
            context: context(tenant_id, item_id),
            kind: MovementKind::In,
            quantity: dec!(12),
            unit_cost: dec!(18000),
        })
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_commit() {
        let (dispatcher, tenant_id, item_id) = setup(2).await;
        let dispatched = dispatcher
            .dispatch(tenant_id, item_id, receive(tenant_id, item_id))
            .await
            .unwrap();
        assert_eq!(dispatched.after.current_stock(), dec!(12));
        assert_eq!(dispatched.before.current_stock(), dec!(0));
        assert_eq!(dispatched.movements.len(), 1);
    }

    #[tokio::test]
    async fn conflicts_beyond_budget_surface_as_retryable() {
        let (dispatcher, tenant_id, item_id) = setup(DEFAULT_MAX_COMMIT_ATTEMPTS).await;
        let err = dispatcher
            .dispatch(tenant_id, item_id, receive(tenant_id, item_id))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Concurrency(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn domain_rejections_name_the_item() {
        let (dispatcher, tenant_id, item_id) = setup(0).await;
        let cmd = StockCommand::Issue(IssueStock {
            context: context(tenant_id, item_id),
            kind: MovementKind::Out,
            quantity: dec!(1),
        });
        let err = dispatcher.dispatch(tenant_id, item_id, cmd).await.unwrap_err();
        match err {
            LedgerError::InsufficientStock {
                item_id: id,
                shortfall,
                ..
            } => {
                assert_eq!(id, item_id);
                assert_eq!(shortfall, dec!(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let (dispatcher, tenant_id, _) = setup(0).await;
        let missing = InventoryItemId::new();
        let err = dispatcher
            .dispatch(tenant_id, missing, receive(tenant_id, missing))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }
}
