//! One-shot delayed task scheduling.
//!
//! The expiration engine re-arms itself through a [`TaskScheduler`]: every
//! pass ends by scheduling exactly one future run unless one is already
//! pending. Hosts with their own job system implement the trait; this module
//! ships a tokio-backed [`LocalScheduler`] and a [`ManualScheduler`] that only
//! fires when told to.

mod error;
mod local;
mod manual;
mod traits;

pub use error::{SchedulerError, SchedulerResult};
pub use local::LocalScheduler;
pub use manual::ManualScheduler;
pub use traits::{JobHandler, TaskScheduler};
