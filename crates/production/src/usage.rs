use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mealledger_core::{
    ActorId, DomainError, DomainResult, InventoryItemId, ProductionId, TenantId, UsageId,
    mul_amount,
};

/// One requested consumption line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLine {
    pub item_id: InventoryItemId,
    pub quantity_used: Decimal,
}

/// "This batch consumed `quantity_used` of this item."
///
/// `unit_cost_at_use` is a copy of the item's average cost when the row was
/// recorded. Later cost changes never reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionStockUsage {
    pub id: UsageId,
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub item_id: InventoryItemId,
    pub item_name: String,
    pub unit: String,
    pub quantity_used: Decimal,
    pub unit_cost_at_use: Decimal,
    pub recorded_by: ActorId,
    pub recorded_at: DateTime<Utc>,
}

impl ProductionStockUsage {
    pub fn total_cost(&self) -> DomainResult<Decimal> {
        mul_amount(self.quantity_used, self.unit_cost_at_use)
    }
}

/// Reject empty, non-positive or repeated lines in one request.
pub fn ensure_distinct_items(lines: &[UsageLine]) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("no usage lines given"));
    }

    let mut seen = HashSet::new();
    for line in lines {
        if line.quantity_used <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "quantity used for item {} must be positive",
                line.item_id
            )));
        }
        if !seen.insert(line.item_id) {
            return Err(DomainError::validation(format!(
                "item {} appears more than once",
                line.item_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn repeated_items_are_rejected() {
        let item = InventoryItemId::new();
        let lines = vec![
            UsageLine { item_id: item, quantity_used: dec!(1) },
            UsageLine { item_id: item, quantity_used: dec!(2) },
        ];
        assert!(matches!(
            ensure_distinct_items(&lines),
            Err(DomainError::Validation(msg)) if msg.contains("more than once")
        ));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let lines = vec![UsageLine {
            item_id: InventoryItemId::new(),
            quantity_used: dec!(0),
        }];
        assert!(ensure_distinct_items(&lines).is_err());
        assert!(ensure_distinct_items(&[]).is_err());
    }
}
