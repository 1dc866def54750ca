use anyhow::{Context, Result};

use crate::command_dispatcher::DEFAULT_MAX_COMMIT_ATTEMPTS;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Postgres URL. Without one the ledger runs on in-memory stores.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub max_commit_attempts: u32,
    /// Post an `OUT` movement for every recorded production usage line.
    pub consume_stock_on_usage: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
            consume_stock_on_usage: false,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS must be a number, got '{raw}'"))?,
            None => defaults.max_connections,
        };

        let max_commit_attempts: u32 = match lookup("LEDGER_MAX_COMMIT_ATTEMPTS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("LEDGER_MAX_COMMIT_ATTEMPTS must be a number, got '{raw}'"))?,
            None => defaults.max_commit_attempts,
        };
        if max_commit_attempts == 0 {
            anyhow::bail!("LEDGER_MAX_COMMIT_ATTEMPTS must be at least 1");
        }

        let consume_stock_on_usage = match lookup("LEDGER_CONSUME_STOCK_ON_USAGE") {
            Some(raw) => parse_flag(&raw)
                .with_context(|| format!("LEDGER_CONSUME_STOCK_ON_USAGE must be a boolean, got '{raw}'"))?,
            None => defaults.consume_stock_on_usage,
        };

        Ok(Self {
            database_url,
            max_connections,
            max_commit_attempts,
            consume_stock_on_usage,
        })
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("unrecognized flag value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<LedgerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_in_memory() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, LedgerConfig::default());
        assert_eq!(cfg.max_commit_attempts, 3);
    }

    #[test]
    fn reads_every_setting() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://ledger@localhost/meals"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("LEDGER_MAX_COMMIT_ATTEMPTS", "5"),
            ("LEDGER_CONSUME_STOCK_ON_USAGE", "true"),
        ])
        .unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://ledger@localhost/meals"));
        assert_eq!(cfg.max_connections, 4);
        assert_eq!(cfg.max_commit_attempts, 5);
        assert!(cfg.consume_stock_on_usage);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("DATABASE_MAX_CONNECTIONS", "many")]).is_err());
        assert!(config(&[("LEDGER_MAX_COMMIT_ATTEMPTS", "0")]).is_err());
        let err = config(&[("LEDGER_CONSUME_STOCK_ON_USAGE", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("LEDGER_CONSUME_STOCK_ON_USAGE"));
    }
}
