use async_trait::async_trait;
use thiserror::Error;

use mealledger_core::{AggregateRoot, ExpectedVersion, InventoryItemId, TenantId};
use mealledger_inventory::{InventoryItem, MovementReference, StockMovement};

use super::query::{MovementFilter, MovementPage, Pagination};

/// Storage-layer error.
///
/// Infrastructure failures (concurrency, isolation, backend) as opposed to
/// domain failures (validation, invariants).
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("item {item_id} already has a movement referencing {reference}")]
    DuplicateReference {
        item_id: InventoryItemId,
        reference: MovementReference,
    },

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("failed to decode stored row: {0}")]
    Decode(String),
}

impl LedgerStoreError {
    /// Failures a caller may retry without changing its input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerStoreError::Concurrency(_) | LedgerStoreError::Backend(_)
        )
    }
}

/// Append-only, tenant-scoped stock ledger plus the cached item projection.
///
/// ## Commit semantics
///
/// `commit()` is the only write path for stock. In one atomic unit it must:
/// - lock the item row and check its stored version against `expected_version`
/// - reject a movement whose reference is unique per item and already present
///   for that item ([`MovementReference::is_unique_per_item`])
/// - append the movements
/// - overwrite the cached projection with `item`
///
/// Either everything is written or nothing is.
///
/// ## Reads
///
/// Every read is scoped by `tenant_id`. Ledgers come back ordered by
/// sequence number.
#[async_trait]
pub trait StockLedgerStore: Send + Sync {
    /// Register a new item (version 0, no movements).
    async fn register_item(&self, item: &InventoryItem) -> Result<(), LedgerStoreError>;

    async fn load_item(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, LedgerStoreError>;

    async fn list_items(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, LedgerStoreError>;

    /// Append `movements` and store `item` as the new projection.
    async fn commit(
        &self,
        tenant_id: TenantId,
        item: &InventoryItem,
        movements: &[StockMovement],
        expected_version: ExpectedVersion,
    ) -> Result<(), LedgerStoreError>;

    /// One item's full ledger, ordered by sequence.
    async fn load_ledger(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Vec<StockMovement>, LedgerStoreError>;

    /// Every movement carrying `reference`, across items.
    async fn find_by_reference(
        &self,
        tenant_id: TenantId,
        reference: MovementReference,
    ) -> Result<Vec<StockMovement>, LedgerStoreError>;

    /// Filtered, paginated view ordered by `occurred_at` then sequence.
    async fn query_movements(
        &self,
        tenant_id: TenantId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerStoreError>;
}

/// Checks shared by every backend before anything is written.
pub(crate) fn validate_commit(
    tenant_id: TenantId,
    item: &InventoryItem,
    movements: &[StockMovement],
    expected_version: ExpectedVersion,
) -> Result<(), LedgerStoreError> {
    if item.tenant_id() != tenant_id {
        return Err(LedgerStoreError::TenantIsolation(format!(
            "item {} does not belong to tenant {}",
            item.id_typed(),
            tenant_id
        )));
    }

    for (idx, m) in movements.iter().enumerate() {
        if m.tenant_id != tenant_id {
            return Err(LedgerStoreError::TenantIsolation(format!(
                "batch contains another tenant_id (index {idx})"
            )));
        }
        if m.item_id != item.id_typed() {
            return Err(LedgerStoreError::InvalidCommit(format!(
                "batch contains another item_id (index {idx})"
            )));
        }
        m.verify()
            .map_err(|e| LedgerStoreError::InvalidCommit(e.to_string()))?;
    }

    if let ExpectedVersion::Exact(expected) = expected_version {
        let advanced = expected + movements.len() as u64;
        if advanced != item.version() {
            return Err(LedgerStoreError::InvalidCommit(format!(
                "item version {} does not follow {} movement(s) from {}",
                item.version(),
                movements.len(),
                expected
            )));
        }
    }

    Ok(())
}
