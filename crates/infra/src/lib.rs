//! Infrastructure layer: ledger storage, posting processors, costing
//! services, schema and configuration.

pub mod audit;
pub mod command_dispatcher;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger_store;
pub mod production_cost;
pub mod projections;
pub mod receipt;
pub mod reversal;
pub mod sources;
pub mod stock_operations;
pub mod usage_store;


pub use command_dispatcher::{Dispatched, StockCommandDispatcher};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use production_cost::ProductionCostService;
pub use receipt::{ReceiptPosting, ReceiptProcessor};
pub use reversal::{ReversalPosting, ReversalProcessor};
pub use stock_operations::StockOperations;
