use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::SchedulerResult;

/// Callback invoked when a one-shot job fires.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job_name: &str);
}

/// One-shot delayed task scheduler.
///
/// At most one run may be pending per job name. Delivery is at-least-once;
/// handlers must tolerate being invoked again for the same logical run.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Whether a run is pending for `job_name`.
    async fn has_pending(&self, job_name: &str) -> bool;

    /// Arrange for the handler of `job_name` to be invoked once at or after `fire_at`.
    ///
    /// Fails with `AlreadyPending` if a run is already pending for that name.
    async fn schedule_once(&self, job_name: &str, fire_at: DateTime<Utc>) -> SchedulerResult<()>;

    /// Set the callback for `job_name`, replacing any previous one.
    fn register_handler(&self, job_name: &str, handler: Arc<dyn JobHandler>);

    /// Drop the pending run for `job_name`. Returns whether one existed.
    async fn cancel(&self, job_name: &str) -> bool;
}
