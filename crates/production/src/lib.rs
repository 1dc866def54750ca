//! Production batches, their ingredient usage and cost reconstruction.
//!
//! Actual batch cost and its breakdown come only from usage rows carrying the
//! unit cost at the moment of use, so they stay fixed once recorded.
//! Planning estimates are the exception: `estimate_cost` prices a menu at
//! whatever unit costs the caller passes in, normally today's averages.

pub mod batch;
pub mod cost;
pub mod menu;
pub mod usage;

pub use batch::{ProductionBatch, ProductionStatus};
pub use cost::{
    CostBreakdownLine, EstimatedCost, EstimatedCostLine, ProductionCost, cost_breakdown,
    estimate_cost, summarize_cost,
};
pub use menu::{IngredientRequirement, Menu, MenuIngredient};
pub use usage::{ProductionStockUsage, UsageLine, ensure_distinct_items};
