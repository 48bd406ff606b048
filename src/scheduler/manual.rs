use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{
    error::{SchedulerError, SchedulerResult},
    traits::{JobHandler, TaskScheduler},
};

/// Scheduler that never fires on its own.
///
/// Runs are recorded and stay pending until [`ManualScheduler::fire`] is
/// called. Used by tests and by the `simulate` command, where a single pass
/// is run and the next fire time is only reported.
#[derive(Default)]
pub struct ManualScheduler {
    pending: DashMap<String, DateTime<Utc>>,
    history: Mutex<Vec<(String, DateTime<Utc>)>>,
    handlers: DashMap<String, Arc<dyn JobHandler>>,
    reject_schedules: AtomicBool,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire time of the pending run for `job_name`, if any.
    pub fn pending_at(&self, job_name: &str) -> Option<DateTime<Utc>> {
        self.pending.get(job_name).map(|entry| *entry.value())
    }

    /// Every successful `schedule_once` call, in order.
    pub fn history(&self) -> Vec<(String, DateTime<Utc>)> {
        self.history.lock().clone()
    }

    /// Make subsequent `schedule_once` calls fail with an internal error.
    pub fn reject_schedules(&self, reject: bool) {
        self.reject_schedules.store(reject, Ordering::SeqCst);
    }

    /// Clear the pending marker for `job_name` and invoke its handler.
    ///
    /// Fires even when nothing is pending, which mimics a duplicate delivery.
    pub async fn fire(&self, job_name: &str) -> SchedulerResult<()> {
        self.pending.remove(job_name);
        let handler = self
            .handlers
            .get(job_name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SchedulerError::NoHandler(job_name.to_string()))?;
        handler.run(job_name).await;
        Ok(())
    }
}

#[async_trait]
impl TaskScheduler for ManualScheduler {
    async fn has_pending(&self, job_name: &str) -> bool {
        self.pending.contains_key(job_name)
    }

    async fn schedule_once(&self, job_name: &str, fire_at: DateTime<Utc>) -> SchedulerResult<()> {
        if self.reject_schedules.load(Ordering::SeqCst) {
            return Err(SchedulerError::Internal(format!(
                "scheduling '{job_name}' rejected"
            )));
        }
        if self.pending.contains_key(job_name) {
            return Err(SchedulerError::AlreadyPending(job_name.to_string()));
        }
        self.pending.insert(job_name.to_string(), fire_at);
        self.history.lock().push((job_name.to_string(), fire_at));
        Ok(())
    }

    fn register_handler(&self, job_name: &str, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_name.to_string(), handler);
    }

    async fn cancel(&self, job_name: &str) -> bool {
        self.pending.remove(job_name).is_some()
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("history", &self.history())
            .finish()
    }
}
