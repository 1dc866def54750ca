//! Cost figures derived from menus and usage rows.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mealledger_core::{
    DomainError, DomainResult, InventoryItemId, MenuId, ProductionId, div_amount, mul_amount,
    round_cost, round_percent, sum_amounts,
};

use crate::menu::Menu;
use crate::usage::ProductionStockUsage;

/// Actual cost of a production batch, recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionCost {
    pub production_id: ProductionId,
    pub total_cost: Decimal,
    pub cost_per_portion: Decimal,
    pub portion_count: u32,
    pub usage_record_count: usize,
}

/// One ingredient's share of a batch's cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdownLine {
    pub item_id: InventoryItemId,
    pub item_name: String,
    pub unit: String,
    pub quantity_used: Decimal,
    pub unit_cost_at_use: Decimal,
    pub total_cost: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatedCostLine {
    pub item_id: InventoryItemId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
}

/// Planning estimate at current costs. Not frozen; two calls may differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatedCost {
    pub menu_id: MenuId,
    pub portion_count: u32,
    pub total_cost: Decimal,
    pub cost_per_portion: Decimal,
    pub lines: Vec<EstimatedCostLine>,
}

fn per_portion(total: Decimal, portions: u32) -> Decimal {
    if portions == 0 {
        Decimal::ZERO
    } else {
        // Dividing by a whole count of at least one cannot overflow.
        round_cost(total / Decimal::from(portions))
    }
}

fn usage_costs(usages: &[ProductionStockUsage]) -> DomainResult<Vec<Decimal>> {
    usages.iter().map(ProductionStockUsage::total_cost).collect()
}

/// Sum usage rows at their recorded cost and spread over `portion_count`.
pub fn summarize_cost(
    production_id: ProductionId,
    usages: &[ProductionStockUsage],
    portion_count: u32,
) -> DomainResult<ProductionCost> {
    let total_cost = sum_amounts(usage_costs(usages)?)?;

    Ok(ProductionCost {
        production_id,
        total_cost,
        cost_per_portion: per_portion(total_cost, portion_count),
        portion_count,
        usage_record_count: usages.len(),
    })
}

/// Per-ingredient contribution, most expensive first.
pub fn cost_breakdown(usages: &[ProductionStockUsage]) -> DomainResult<Vec<CostBreakdownLine>> {
    let costs = usage_costs(usages)?;
    let total = sum_amounts(costs.iter().copied())?;

    let mut lines = Vec::with_capacity(usages.len());
    for (usage, cost) in usages.iter().zip(costs) {
        let percentage = if total.is_zero() {
            Decimal::ZERO
        } else {
            round_percent(mul_amount(div_amount(cost, total)?, Decimal::ONE_HUNDRED)?)
        };
        lines.push(CostBreakdownLine {
            item_id: usage.item_id,
            item_name: usage.item_name.clone(),
            unit: usage.unit.clone(),
            quantity_used: usage.quantity_used,
            unit_cost_at_use: usage.unit_cost_at_use,
            total_cost: cost,
            percentage,
        });
    }

    lines.sort_by(|a, b| {
        b.total_cost
            .cmp(&a.total_cost)
            .then_with(|| a.item_name.cmp(&b.item_name))
    });
    Ok(lines)
}

/// Price a menu's scaled requirements at the given unit costs.
pub fn estimate_cost(
    menu: &Menu,
    portion_count: u32,
    unit_costs: &HashMap<InventoryItemId, Decimal>,
) -> DomainResult<EstimatedCost> {
    let mut lines = Vec::new();
    for requirement in menu.requirements(portion_count)? {
        let unit_cost = unit_costs
            .get(&requirement.item_id)
            .copied()
            .ok_or_else(|| DomainError::not_found(format!("item {}", requirement.item_id)))?;
        lines.push(EstimatedCostLine {
            item_id: requirement.item_id,
            quantity: requirement.quantity,
            unit_cost,
            total_cost: mul_amount(requirement.quantity, unit_cost)?,
        });
    }

    let total_cost = sum_amounts(lines.iter().map(|l| l.total_cost))?;
    Ok(EstimatedCost {
        menu_id: menu.id,
        portion_count,
        total_cost,
        cost_per_portion: per_portion(total_cost, portion_count),
        lines,
    })
}
