//! Policy registry and the expiration scan.
//!
//! ```text
//! add_post_type ──> PolicyRegistry ──snapshot──> ExpirationEngine ──> ContentStore
//!                                                     │
//!                                      predicate / query hooks
//! ```
//!
//! [`Expirer`] is the entry point for hosts. The engine and registry are
//! exposed for hosts that wire their own scheduling.

mod engine;
mod expirer;
mod policy;
mod predicate;
mod query;
mod registry;

pub use engine::{
    DEFAULT_INTERVAL_SECS, DEFAULT_PAGE_SIZE, EngineSettings, ExpirationEngine,
    ExpirationRunResult, MIN_INTERVAL_SECS,
};
pub use expirer::{Expirer, ExpirerBuilder};
pub use policy::{
    ComputePatch, DEFAULT_ACTION, DEFAULT_EXPIRE_AFTER_SECS, ExpirationAction, ExpirationPolicy,
    ExpireAfter, PolicyError, PolicyInput, UpdateArgs,
};
pub use predicate::{DefaultPredicate, ExpirationPredicate};
pub use query::{DefaultQuery, QueryBuilder};
pub use registry::{PolicyRegistry, RegisterOutcome};

/// Job name the expiration pass is scheduled under.
pub const CRON_JOB_NAME: &str = "expiring_posts_check";
