//! Read-side views computed from the ledger on demand.
//!
//! Nothing here is cached: every call reads the store and recomputes.

pub mod stock_reconciliation;
pub mod valuation;

pub use stock_reconciliation::{Discrepancy, ReconciliationReport, reconcile_tenant};
pub use valuation::{ItemValuation, ValuationSummary, inventory_valuation, summarize_valuation};
