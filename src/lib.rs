//! Policy-driven expiration of content records.
//!
//! A host content system registers which record types expire, after how long,
//! and what happens to them once they do (draft, trash, delete or a field
//! update). A background scan pages through the host's store, applies the
//! configured action to every record that has aged past its threshold, and
//! re-arms a one-shot timer for the next pass.
//!
//! ```text
//! ┌──────────────┐   fires   ┌──────────────────┐  pages/mutates  ┌──────────────┐
//! │ TaskScheduler│──────────>│ ExpirationEngine │────────────────>│ ContentStore │
//! └──────────────┘<──────────└──────────────────┘                 └──────────────┘
//!        re-arm next pass            │ emits
//!                                    v
//!                              ┌───────────┐
//!                              │ EventSink │
//!                              └───────────┘
//! ```
//!
//! The store, scheduler and event sink are traits so the host can plug in its
//! own implementations. [`store::MemoryStore`], [`scheduler::LocalScheduler`]
//! and [`events::EventBus`] are provided for tests and standalone use.

pub mod clock;
pub mod config;
pub mod events;
pub mod expiration;
pub mod observability;
pub mod scheduler;
pub mod store;

pub use expiration::{
    CRON_JOB_NAME, ExpirationAction, ExpirationEngine, ExpirationPolicy, ExpirationRunResult,
    Expirer, PolicyError, PolicyInput, PolicyRegistry, RegisterOutcome, UpdateArgs,
};
