//! Errors surfaced by the ledger services to their callers.

use rust_decimal::Decimal;
use thiserror::Error;

use mealledger_core::{DomainError, InventoryItemId, ProcurementId};
use mealledger_procurement::{ProcurementStatus, UnlinkedLine};

use crate::ledger_store::LedgerStoreError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("procurement {procurement_id} is {status}, not in a received status")]
    NotReceivable {
        procurement_id: ProcurementId,
        status: ProcurementStatus,
    },

    #[error(
        "procurement {procurement_id} has line items without an inventory link: {}",
        join(.lines)
    )]
    UnlinkedLineItems {
        procurement_id: ProcurementId,
        lines: Vec<UnlinkedLine>,
    },

    #[error("unknown inventory items: {}", join(.item_ids))]
    UnknownItems { item_ids: Vec<InventoryItemId> },

    #[error(
        "insufficient stock for item {item_id}: available {available}, required {required}, short by {shortfall}"
    )]
    InsufficientStock {
        item_id: InventoryItemId,
        available: Decimal,
        required: Decimal,
        shortfall: Decimal,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// Some items were committed before a later item failed.
    #[error("stopped after posting {} item(s): {source}", .posted.len())]
    PartiallyPosted {
        posted: Vec<InventoryItemId>,
        #[source]
        source: Box<LedgerError>,
    },

    #[error(transparent)]
    Store(LedgerStoreError),
}

fn join<T: core::fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl LedgerError {
    /// Whether repeating the same call may succeed.
    ///
    /// Every posting path skips work already committed, so a retry after a
    /// retryable failure never double-posts.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Concurrency(_) => true,
            LedgerError::Store(e) => e.is_retryable(),
            LedgerError::PartiallyPosted { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Attach the item a domain decision was made for.
    pub fn from_domain(item_id: InventoryItemId, err: DomainError) -> Self {
        match err {
            DomainError::InsufficientStock {
                available,
                required,
            } => LedgerError::insufficient_stock(item_id, available, required),
            other => other.into(),
        }
    }

    pub fn insufficient_stock(item_id: InventoryItemId, available: Decimal, required: Decimal) -> Self {
        LedgerError::InsufficientStock {
            item_id,
            available,
            required,
            shortfall: required - available,
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => LedgerError::Validation(msg),
            DomainError::InvariantViolation(msg) => LedgerError::Invariant(msg),
            DomainError::NotFound(msg) => LedgerError::NotFound(msg),
            DomainError::Conflict(msg) => LedgerError::Concurrency(msg),
            DomainError::InsufficientStock {
                available,
                required,
            } => LedgerError::Validation(format!(
                "insufficient stock: available {available}, required {required}"
            )),
        }
    }
}

impl From<LedgerStoreError> for LedgerError {
    fn from(value: LedgerStoreError) -> Self {
        match value {
            LedgerStoreError::Concurrency(msg) => LedgerError::Concurrency(msg),
            LedgerStoreError::NotFound(msg) => LedgerError::NotFound(msg),
            other => LedgerError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn unlinked_lines_are_named_in_message() {
        let err = LedgerError::UnlinkedLineItems {
            procurement_id: ProcurementId::new(),
            lines: vec![
                UnlinkedLine {
                    line_no: 2,
                    description: "Tempe".to_string(),
                },
                UnlinkedLine {
                    line_no: 5,
                    description: "Kangkung".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("line 2 (Tempe), line 5 (Kangkung)"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn insufficient_stock_carries_item_and_shortfall() {
        let item_id = InventoryItemId::new();
        let err = LedgerError::from_domain(item_id, DomainError::insufficient_stock(dec!(30), dec!(50)));
        match err {
            LedgerError::InsufficientStock {
                item_id: id,
                shortfall,
                ..
            } => {
                assert_eq!(id, item_id);
                assert_eq!(shortfall, dec!(20));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn store_failures_keep_retryability() {
        let err: LedgerError = LedgerStoreError::Concurrency("stale".into()).into();
        assert!(matches!(err, LedgerError::Concurrency(_)));
        assert!(err.is_retryable());

        let err: LedgerError = LedgerStoreError::Backend("connection reset".into()).into();
        assert!(err.is_retryable());

        let err: LedgerError = LedgerStoreError::Decode("bad kind".into()).into();
        assert!(!err.is_retryable());

        let partial = LedgerError::PartiallyPosted {
            posted: vec![InventoryItemId::new()],
            source: Box::new(LedgerError::Concurrency("stale".into())),
        };
        assert!(partial.is_retryable());
    }
}
