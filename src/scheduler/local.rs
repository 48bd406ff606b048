use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{
    error::{SchedulerError, SchedulerResult},
    traits::{JobHandler, TaskScheduler},
};
use crate::clock::{Clock, SystemClock};

struct PendingJob {
    token: Uuid,
    fire_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

struct Inner {
    pending: DashMap<String, PendingJob>,
    handlers: DashMap<String, Arc<dyn JobHandler>>,
    clock: Arc<dyn Clock>,
}

/// Tokio-backed scheduler.
///
/// Each scheduled run is a spawned task that sleeps until its fire time,
/// clears its pending marker and then invokes the job's handler. Clearing the
/// marker first lets the handler schedule the next run of the same job.
#[derive(Clone)]
pub struct LocalScheduler {
    inner: Arc<Inner>,
}

impl Default for LocalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// The clock is only used to turn fire times into sleep durations.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: DashMap::new(),
                handlers: DashMap::new(),
                clock,
            }),
        }
    }

    /// Pending job names and their fire times.
    pub fn pending_jobs(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut jobs: Vec<_> = self
            .inner
            .pending
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().fire_at))
            .collect();
        jobs.sort();
        jobs
    }

    /// Abort every pending run.
    pub fn shutdown(&self) {
        let names: Vec<String> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for name in names {
            if let Some((_, job)) = self.inner.pending.remove(&name) {
                job.handle.abort();
            }
        }
        tracing::debug!("Local scheduler shut down");
    }
}

impl Inner {
    async fn fire(&self, job_name: &str, token: Uuid) {
        // A cancelled or replaced run no longer owns the marker
        if self
            .pending
            .remove_if(job_name, |_, job| job.token == token)
            .is_none()
        {
            return;
        }

        let handler = self
            .handlers
            .get(job_name)
            .map(|entry| Arc::clone(entry.value()));

        match handler {
            Some(handler) => {
                tracing::debug!(job = job_name, "Running scheduled job");
                handler.run(job_name).await;
            }
            None => {
                tracing::warn!(
                    job = job_name,
                    error = %SchedulerError::NoHandler(job_name.to_string()),
                    "Scheduled job fired without a handler"
                );
            }
        }
    }
}

#[async_trait]
impl TaskScheduler for LocalScheduler {
    async fn has_pending(&self, job_name: &str) -> bool {
        self.inner.pending.contains_key(job_name)
    }

    async fn schedule_once(&self, job_name: &str, fire_at: DateTime<Utc>) -> SchedulerResult<()> {
        match self.inner.pending.entry(job_name.to_string()) {
            Entry::Occupied(_) => Err(SchedulerError::AlreadyPending(job_name.to_string())),
            Entry::Vacant(slot) => {
                let token = Uuid::new_v4();
                let delay = (fire_at - self.inner.clock.now())
                    .to_std()
                    .unwrap_or_default();

                let inner = Arc::clone(&self.inner);
                let name = job_name.to_string();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.fire(&name, token).await;
                });

                slot.insert(PendingJob {
                    token,
                    fire_at,
                    handle,
                });

                tracing::debug!(
                    job = job_name,
                    fire_at = %fire_at,
                    delay_secs = delay.as_secs(),
                    "Scheduled one-shot job"
                );
                Ok(())
            }
        }
    }

    fn register_handler(&self, job_name: &str, handler: Arc<dyn JobHandler>) {
        self.inner.handlers.insert(job_name.to_string(), handler);
    }

    async fn cancel(&self, job_name: &str) -> bool {
        match self.inner.pending.remove(job_name) {
            Some((_, job)) => {
                job.handle.abort();
                tracing::debug!(job = job_name, "Cancelled pending job");
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for LocalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("pending", &self.pending_jobs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration as StdDuration,
    };

    use chrono::Duration;

    use super::*;

    #[derive(Default)]
    struct CountingHandler {
        runs: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn run(&self, _job_name: &str) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Re-arms itself from inside the handler, like the expiration engine does.
    struct RearmingHandler {
        scheduler: LocalScheduler,
        runs: AtomicU32,
        rearm_ok: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for RearmingHandler {
        async fn run(&self, job_name: &str) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            assert!(!self.scheduler.has_pending(job_name).await);
            if self
                .scheduler
                .schedule_once(job_name, Utc::now() + Duration::hours(1))
                .await
                .is_ok()
            {
                self.rearm_ok.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_fires_once_and_clears_marker() {
        let scheduler = LocalScheduler::new();
        let handler = Arc::new(CountingHandler::default());
        scheduler.register_handler("job", handler.clone());

        scheduler
            .schedule_once("job", Utc::now() + Duration::seconds(60))
            .await
            .unwrap();
        assert!(scheduler.has_pending("job").await);

        tokio::time::sleep(StdDuration::from_secs(61)).await;

        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.has_pending("job").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_schedule_rejected_while_pending() {
        let scheduler = LocalScheduler::new();
        let fire_at = Utc::now() + Duration::seconds(60);

        scheduler.schedule_once("job", fire_at).await.unwrap();
        let err = scheduler.schedule_once("job", fire_at).await.unwrap_err();
        assert!(matches!(err, SchedulerError::AlreadyPending(name) if name == "job"));
        assert_eq!(scheduler.pending_jobs().len(), 1);

        // Other job names are independent
        scheduler.schedule_once("other", fire_at).await.unwrap();
        assert_eq!(scheduler.pending_jobs().len(), 2);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_run() {
        let scheduler = LocalScheduler::new();
        let handler = Arc::new(CountingHandler::default());
        scheduler.register_handler("job", handler.clone());

        scheduler
            .schedule_once("job", Utc::now() + Duration::seconds(5))
            .await
            .unwrap();
        assert!(scheduler.cancel("job").await);
        assert!(!scheduler.cancel("job").await);

        tokio::time::sleep(StdDuration::from_secs(10)).await;
        assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_can_rearm_same_job() {
        let scheduler = LocalScheduler::new();
        let handler = Arc::new(RearmingHandler {
            scheduler: scheduler.clone(),
            runs: AtomicU32::new(0),
            rearm_ok: AtomicU32::new(0),
        });
        scheduler.register_handler("job", handler.clone());

        scheduler.schedule_once("job", Utc::now()).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(10)).await;

        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(handler.rearm_ok.load(Ordering::SeqCst), 1);
        assert!(scheduler.has_pending("job").await);
        scheduler.shutdown();
        assert!(scheduler.pending_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_handler_clears_marker() {
        let scheduler = LocalScheduler::new();
        scheduler.schedule_once("orphan", Utc::now()).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        assert!(!scheduler.has_pending("orphan").await);
    }
}
