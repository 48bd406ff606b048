//! Observability: structured logging setup and expiration counters.
//!
//! - Structured logging with configurable formats (pretty, compact, JSON)
//! - Counters for expired records, swallowed errors and passes

pub mod metrics;
#[cfg(feature = "server")]
mod tracing_init;

#[cfg(feature = "server")]
pub use tracing_init::*;
