//! Stock ledger storage boundary.
//!
//! Append-only, tenant-scoped movements plus the cached item projection they
//! maintain, with in-memory and Postgres backends.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use query::{MovementFilter, MovementPage, Pagination};
pub use r#trait::{LedgerStoreError, StockLedgerStore};
