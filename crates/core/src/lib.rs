//! `mealledger-core` — shared domain building blocks for the stock ledger.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, aggregate traits and decimal helpers.

pub mod aggregate;
pub mod decimal;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use decimal::{
    COST_SCALE, PERCENT_SCALE, add_amount, div_amount, mul_amount, round_cost, round_percent,
    sum_amounts,
};
pub use error::{DomainError, DomainResult};
pub use id::{
    ActorId, InventoryItemId, MenuId, MovementId, ProcurementId, ProductionId, TenantId, UsageId,
};
