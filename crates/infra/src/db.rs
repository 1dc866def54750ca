//! Postgres wiring: connection pool, schema migration and error mapping.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | LedgerStoreError |
//! |------------|-----------------|------------------|
//! | Database (unique violation) | `23505` | `Concurrency` |
//! | Database (foreign key violation) | `23503` | `InvalidCommit` |
//! | Database (check constraint violation) | `23514` | `InvalidCommit` |
//! | Database (other) | any other | `Backend` |
//! | RowNotFound | n/a | `NotFound` |
//! | PoolClosed, IO, TLS, ... | n/a | `Backend` |
//!
//! Callers that know which unique constraint they may hit (duplicate
//! procurement reference, duplicate item) check [`is_unique_violation`]
//! first and map to a more precise variant.

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::ledger_store::LedgerStoreError;

const SCHEMA: &str = include_str!("../migrations/0001_stock_ledger.sql");

pub async fn connect_database(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Apply the ledger schema. Idempotent.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    info!("applying stock ledger schema");
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to apply stock ledger schema")?;
    info!("stock ledger schema is up to date");
    Ok(())
}

/// Map SQLx errors to `LedgerStoreError`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => LedgerStoreError::Concurrency(msg),
                Some("23503") | Some("23514") => LedgerStoreError::InvalidCommit(msg),
                _ => LedgerStoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => {
            LedgerStoreError::NotFound(format!("unexpected row not found in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            LedgerStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => LedgerStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

/// Unique constraint violation, optionally on a specific constraint.
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: Option<&str>) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return constraint.is_none() || db_err.constraint() == constraint;
        }
    }
    false
}
