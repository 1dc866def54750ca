use serde::{Deserialize, Serialize};

use mealledger_core::{MenuId, ProductionId, TenantId};

/// Production batch status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductionStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

/// Production batch record, owned by the production workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionBatch {
    pub id: ProductionId,
    pub tenant_id: TenantId,
    pub menu_id: MenuId,
    pub status: ProductionStatus,
    pub planned_portions: u32,
    pub actual_portions: Option<u32>,
}

impl ProductionBatch {
    /// A completed batch's usage is frozen.
    pub fn is_finalized(&self) -> bool {
        self.status == ProductionStatus::Completed
    }

    /// Portions to divide cost by: actual when known, planned otherwise.
    pub fn costing_portions(&self) -> u32 {
        self.actual_portions.unwrap_or(self.planned_portions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actual_portions_take_precedence_over_planned() {
        let mut batch = ProductionBatch {
            id: ProductionId::new(),
            tenant_id: TenantId::new(),
            menu_id: MenuId::new(),
            status: ProductionStatus::InProgress,
            planned_portions: 200,
            actual_portions: None,
        };
        assert_eq!(batch.costing_portions(), 200);
        assert!(!batch.is_finalized());

        batch.actual_portions = Some(185);
        batch.status = ProductionStatus::Completed;
        assert_eq!(batch.costing_portions(), 185);
        assert!(batch.is_finalized());
    }
}
