//! Movement query types for reporting collaborators.
//!
//! All queries are tenant-scoped and paginated by default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mealledger_core::InventoryItemId;
use mealledger_inventory::{MovementKind, MovementReference, StockMovement};

/// Pagination parameters for movement queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    /// 0-based.
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub item_id: Option<InventoryItemId>,
    pub kind: Option<MovementKind>,
    pub reference: Option<MovementReference>,
    /// Inclusive.
    pub occurred_after: Option<DateTime<Utc>>,
    /// Exclusive.
    pub occurred_before: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn for_item(item_id: InventoryItemId) -> Self {
        Self {
            item_id: Some(item_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, movement: &StockMovement) -> bool {
        self.item_id.is_none_or(|id| movement.item_id == id)
            && self.kind.is_none_or(|k| movement.kind == k)
            && self.reference.is_none_or(|r| movement.reference == Some(r))
            && self
                .occurred_after
                .is_none_or(|after| movement.occurred_at >= after)
            && self
                .occurred_before
                .is_none_or(|before| movement.occurred_at < before)
    }
}

/// One page of a movement query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    pub movements: Vec<StockMovement>,
    /// Matches across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl MovementPage {
    pub fn new(movements: Vec<StockMovement>, total: u64, pagination: Pagination) -> Self {
        let has_more = u64::from(pagination.offset) + (movements.len() as u64) < total;
        Self {
            movements,
            total,
            pagination,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_caps_limit() {
        let p = Pagination::new(Some(5000), None);
        assert_eq!(p.limit, Pagination::MAX_LIMIT);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn page_reports_remaining_rows() {
        let page = MovementPage::new(vec![], 10, Pagination::new(Some(5), Some(10)));
        assert!(!page.has_more);

        let page = MovementPage::new(vec![], 10, Pagination::new(Some(5), Some(0)));
        assert!(page.has_more);
    }
}
