//! Inventory stock ledger domain.
//!
//! Pure, deterministic rules for items, ledger entries and weighted-average
//! costing. No IO and no storage; adapters live in `mealledger-infra`.

pub mod costing;
pub mod item;
pub mod movement;

pub use costing::weighted_average_cost;
pub use item::{
    AdjustStock, InventoryItem, IssueStock, ItemSnapshot, MovementContext, ReceiveStock,
    ReverseReceipt, StockCommand, StockLevel,
};
pub use movement::{MovementKind, MovementReference, StockMovement, verify_ledger_chain};
