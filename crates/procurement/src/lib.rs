//! Procurement receipts as seen by the stock ledger.
//!
//! The procurement workflow itself lives elsewhere; this crate holds the
//! record shape the ledger reads, the status lifecycle, and the rules that
//! decide which lines may be posted to stock.

pub mod receipt;

pub use receipt::{
    PostingError, PostingLine, ProcurementLine, ProcurementReceipt, ProcurementStatus,
    UnlinkedLine,
};
