//! Process-wide tracing setup.

pub mod tracing;

pub use crate::tracing::{LogFormat, init, init_from_env};
