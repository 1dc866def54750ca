//! Inventory valuation: stock × average cost per item.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use mealledger_core::{DomainError, DomainResult, InventoryItemId, TenantId, sum_amounts};
use mealledger_inventory::{InventoryItem, StockLevel};

use crate::error::LedgerError;
use crate::ledger_store::StockLedgerStore;

/// Valuation of one item at its current average cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemValuation {
    pub item_id: InventoryItemId,
    pub name: String,
    pub unit: String,
    pub current_stock: Decimal,
    pub average_cost: Decimal,
    pub stock_value: Decimal,
    pub stock_level: StockLevel,
}

impl TryFrom<&InventoryItem> for ItemValuation {
    type Error = DomainError;

    fn try_from(item: &InventoryItem) -> Result<Self, Self::Error> {
        Ok(Self {
            item_id: item.id_typed(),
            name: item.name().to_string(),
            unit: item.unit().to_string(),
            current_stock: item.current_stock(),
            average_cost: item.average_cost(),
            stock_value: item.stock_value()?,
            stock_level: item.stock_level(),
        })
    }
}

/// Tenant-wide valuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationSummary {
    pub tenant_id: TenantId,
    pub total_items: usize,
    pub total_value: Decimal,
    pub items: Vec<ItemValuation>,
    pub out_of_stock: Vec<InventoryItemId>,
    pub below_minimum: Vec<InventoryItemId>,
    pub above_maximum: Vec<InventoryItemId>,
}

/// Items are listed by descending value, then by name.
pub fn summarize_valuation(
    tenant_id: TenantId,
    items: &[InventoryItem],
) -> DomainResult<ValuationSummary> {
    let mut valuations = items
        .iter()
        .map(ItemValuation::try_from)
        .collect::<DomainResult<Vec<_>>>()?;
    valuations.sort_by(|a, b| {
        b.stock_value
            .cmp(&a.stock_value)
            .then_with(|| a.name.cmp(&b.name))
    });

    let with_level = |level: StockLevel| -> Vec<InventoryItemId> {
        valuations
            .iter()
            .filter(|v| v.stock_level == level)
            .map(|v| v.item_id)
            .collect()
    };

    Ok(ValuationSummary {
        tenant_id,
        total_items: valuations.len(),
        total_value: sum_amounts(valuations.iter().map(|v| v.stock_value))?,
        out_of_stock: with_level(StockLevel::OutOfStock),
        below_minimum: with_level(StockLevel::BelowMinimum),
        above_maximum: with_level(StockLevel::AboveMaximum),
        items: valuations,
    })
}

#[instrument(skip(store), fields(tenant_id = %tenant_id), err)]
pub async fn inventory_valuation(
    store: &dyn StockLedgerStore,
    tenant_id: TenantId,
) -> Result<ValuationSummary, LedgerError> {
    let items = store.list_items(tenant_id).await?;
    Ok(summarize_valuation(tenant_id, &items)?)
}
