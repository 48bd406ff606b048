//! Expiration engine: one full scan pass across all registered policies.
//!
//! A pass snapshots the registry, pages through the store for each record
//! type, applies the policy action to every record the predicate accepts and
//! finally re-arms the one-shot timer. Per-record and per-page failures are
//! logged and counted but never abort the pass, so the timer is always
//! re-armed.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    CRON_JOB_NAME,
    policy::{ExpirationAction, ExpirationPolicy},
    predicate::{DefaultPredicate, ExpirationPredicate},
    query::{DefaultQuery, QueryBuilder},
    registry::PolicyRegistry,
};
use crate::{
    clock::{Clock, SystemClock},
    events::{EventSink, ExpirationEvent, NoopSink},
    observability::metrics,
    scheduler::{JobHandler, SchedulerError, TaskScheduler},
    store::{ContentStore, RecordId, RecordStatus, StoreResult},
};

/// Hard floor for the interval between passes.
pub const MIN_INTERVAL_SECS: u64 = 60;

/// Interval between passes when not configured.
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// Identifiers requested per store page when not configured.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Tunables for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub page_size: u32,
    /// Configured interval; floored to [`MIN_INTERVAL_SECS`] when scheduling.
    pub interval_secs: u64,
    /// Evaluate and log matches without mutating anything.
    pub dry_run: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            interval_secs: DEFAULT_INTERVAL_SECS,
            dry_run: false,
        }
    }
}

impl EngineSettings {
    /// Effective interval between passes.
    pub fn interval(&self) -> Duration {
        let secs = self.interval_secs.max(MIN_INTERVAL_SECS);
        i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}

/// Results from a single expiration pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpirationRunResult {
    pub pass_id: Uuid,
    /// The `now` every threshold in this pass was computed from.
    pub started_at: DateTime<Utc>,
    pub drafted: u64,
    pub trashed: u64,
    pub deleted: u64,
    pub updated: u64,
    /// Records fetched and handed to the predicate.
    pub candidates: u64,
    /// Candidates the predicate rejected.
    pub skipped_not_expired: u64,
    /// Listed records that could not be fetched.
    pub missing: u64,
    /// Expired records whose action failed.
    pub failed: u64,
    /// Dry run only: records that would have expired.
    pub would_expire: u64,
    /// Non-empty pages processed across all record types.
    pub pages: u64,
    pub duration_ms: u64,
    /// Stopped early by the cancellation token; the timer was not re-armed.
    pub cancelled: bool,
    /// Fire time of the run this pass scheduled, if it scheduled one.
    pub next_run: Option<DateTime<Utc>>,
}

impl ExpirationRunResult {
    /// Total number of records expired across all actions.
    pub fn expired(&self) -> u64 {
        self.drafted + self.trashed + self.deleted + self.updated
    }

    /// Check if any records were expired.
    pub fn has_expirations(&self) -> bool {
        self.expired() > 0
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.missing > 0
    }

    fn count(&mut self, action: ExpirationAction) {
        match action {
            ExpirationAction::Draft => self.drafted += 1,
            ExpirationAction::Trash => self.trashed += 1,
            ExpirationAction::Delete => self.deleted += 1,
            ExpirationAction::Update => self.updated += 1,
        }
    }
}

/// Executes expiration passes and keeps the next one scheduled.
pub struct ExpirationEngine {
    registry: PolicyRegistry,
    store: Arc<dyn ContentStore>,
    scheduler: Arc<dyn TaskScheduler>,
    events: Arc<dyn EventSink>,
    predicate: Arc<dyn ExpirationPredicate>,
    query: Arc<dyn QueryBuilder>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    job_name: String,
    in_flight: Mutex<()>,
    cancel: CancellationToken,
}

impl ExpirationEngine {
    /// Engine with default hooks, settings and job name.
    pub fn new(
        registry: PolicyRegistry,
        store: Arc<dyn ContentStore>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        Self {
            registry,
            store,
            scheduler,
            events: Arc::new(NoopSink),
            predicate: Arc::new(DefaultPredicate),
            query: Arc::new(DefaultQuery),
            clock: Arc::new(SystemClock),
            settings: EngineSettings::default(),
            job_name: CRON_JOB_NAME.to_string(),
            in_flight: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replace the expiration predicate. The default is not consulted afterwards.
    pub fn with_predicate(mut self, predicate: Arc<dyn ExpirationPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_query_builder(mut self, query: Arc<dyn QueryBuilder>) -> Self {
        self.query = query;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = job_name.into();
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one pass over every registered policy.
    ///
    /// Returns `None` without touching the store when another pass is
    /// already in flight.
    pub async fn run_expiration_check(&self) -> Option<ExpirationRunResult> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!(
                job = %self.job_name,
                "Expiration pass already in flight, skipping"
            );
            return None;
        };

        let started = Instant::now();
        let now = self.clock.now();
        let mut result = ExpirationRunResult {
            pass_id: Uuid::new_v4(),
            started_at: now,
            ..Default::default()
        };

        let policies = self.registry.snapshot();
        let dry_run_msg = if self.settings.dry_run {
            " (DRY RUN)"
        } else {
            ""
        };

        tracing::debug!(
            pass_id = %result.pass_id,
            policies = policies.len(),
            page_size = self.settings.page_size,
            dry_run = self.settings.dry_run,
            "Starting expiration pass{}",
            dry_run_msg
        );

        for (record_type, policy) in &policies {
            self.expire_record_type(record_type, policy, now, &mut result)
                .await;
            if result.cancelled {
                break;
            }
        }
        result.cancelled |= self.cancel.is_cancelled();

        result.duration_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        metrics::record_expiration_run(result.cancelled);

        if result.cancelled {
            tracing::info!(
                pass_id = %result.pass_id,
                expired = result.expired(),
                "Expiration pass cancelled, not re-arming"
            );
            return Some(result);
        }

        if result.has_expirations() || result.has_failures() || result.would_expire > 0 {
            tracing::info!(
                pass_id = %result.pass_id,
                drafted = result.drafted,
                trashed = result.trashed,
                deleted = result.deleted,
                updated = result.updated,
                would_expire = result.would_expire,
                missing = result.missing,
                failed = result.failed,
                duration_ms = result.duration_ms,
                "Expiration pass complete{}",
                dry_run_msg
            );
        } else {
            tracing::debug!(
                pass_id = %result.pass_id,
                candidates = result.candidates,
                "Expiration pass complete, no records expired"
            );
        }

        self.events.emit(ExpirationEvent::PassCompleted {
            pass_id: result.pass_id,
            timestamp: now,
            expired: result.expired(),
            failed: result.failed,
            duration_ms: result.duration_ms,
        });

        result.next_run = self.schedule_next_run().await;
        Some(result)
    }

    /// Run a pass on behalf of the scheduler.
    ///
    /// The job's marker is already gone when this fires, so a pass that is
    /// in flight may have seen it pending and skipped re-arming. A contended
    /// fire arms the next run itself.
    pub async fn run_scheduled(&self) -> Option<ExpirationRunResult> {
        let result = self.run_expiration_check().await;
        if result.is_none() && !self.cancel.is_cancelled() {
            self.schedule_next_run().await;
        }
        result
    }

    /// Arm the next pass unless one is already pending.
    ///
    /// Returns the fire time of the run scheduled by this call.
    pub async fn schedule_next_run(&self) -> Option<DateTime<Utc>> {
        if self.scheduler.has_pending(&self.job_name).await {
            tracing::debug!(job = %self.job_name, "Next expiration pass already scheduled");
            return None;
        }

        let Some(fire_at) = self.clock.now().checked_add_signed(self.settings.interval()) else {
            tracing::error!(
                job = %self.job_name,
                interval_secs = self.settings.interval_secs,
                "Expiration interval overflows the clock, next pass not scheduled"
            );
            metrics::record_expiration_error("schedule");
            return None;
        };

        match self.scheduler.schedule_once(&self.job_name, fire_at).await {
            Ok(()) => {
                tracing::debug!(job = %self.job_name, fire_at = %fire_at, "Scheduled next expiration pass");
                Some(fire_at)
            }
            // Lost a race with another caller; that run serves as ours
            Err(SchedulerError::AlreadyPending(_)) => None,
            Err(e) => {
                tracing::error!(job = %self.job_name, error = %e, "Failed to schedule next expiration pass");
                metrics::record_expiration_error("schedule");
                None
            }
        }
    }

    async fn expire_record_type(
        &self,
        record_type: &str,
        policy: &ExpirationPolicy,
        now: DateTime<Utc>,
        result: &mut ExpirationRunResult,
    ) {
        let Some(threshold) = now.checked_sub_signed(policy.expire_after()) else {
            tracing::warn!(
                record_type,
                expire_after_secs = policy.expire_after_secs,
                "Expiration threshold precedes the earliest representable time, skipping"
            );
            return;
        };

        let page_size = self.settings.page_size.max(1);
        let mut page: u32 = 1;

        loop {
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                return;
            }

            let query = self
                .query
                .build(record_type, policy, threshold, page, page_size);

            let ids = match self.store.list_ids(&query).await {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::error!(
                        record_type,
                        page,
                        error = %e,
                        "Failed to list expired records, skipping record type for this pass"
                    );
                    metrics::record_expiration_error("list");
                    return;
                }
            };

            if ids.is_empty() {
                return;
            }
            result.pages += 1;

            for id in ids {
                self.expire_record(id, record_type, policy, threshold, result)
                    .await;
            }

            page = match page.checked_add(1) {
                Some(next) => next,
                None => return,
            };
        }
    }

    async fn expire_record(
        &self,
        id: RecordId,
        record_type: &str,
        policy: &ExpirationPolicy,
        threshold: DateTime<Utc>,
        result: &mut ExpirationRunResult,
    ) {
        let record = match self.store.fetch(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(record_id = %id, record_type, "Listed record no longer exists, skipping");
                result.missing += 1;
                return;
            }
            Err(e) => {
                tracing::warn!(record_id = %id, record_type, error = %e, "Failed to fetch record, skipping");
                metrics::record_expiration_error("fetch");
                result.missing += 1;
                return;
            }
        };

        result.candidates += 1;
        if !self.predicate.is_expired(&record, threshold) {
            result.skipped_not_expired += 1;
            return;
        }

        if self.settings.dry_run {
            tracing::info!(
                record_id = %id,
                record_type,
                action = %policy.action,
                threshold = %threshold,
                "DRY RUN: Would {} record {}",
                policy.action,
                id
            );
            result.would_expire += 1;
            return;
        }

        if let Err(e) = self.apply_action(id, &record, policy).await {
            tracing::error!(
                record_id = %id,
                record_type,
                action = %policy.action,
                error = %e,
                "Failed to expire record"
            );
            metrics::record_expiration_error("mutate");
            result.failed += 1;
            return;
        }

        result.count(policy.action);
        metrics::record_expiration(record_type, policy.action.as_str());
        tracing::debug!(record_id = %id, record_type, action = %policy.action, "Expired record");

        self.events.emit(ExpirationEvent::RecordExpired {
            pass_id: result.pass_id,
            timestamp: result.started_at,
            record_id: id,
            record_type: record_type.to_string(),
            action: policy.action,
            record: Some(record),
        });
    }

    async fn apply_action(
        &self,
        id: RecordId,
        record: &crate::store::Record,
        policy: &ExpirationPolicy,
    ) -> StoreResult<()> {
        match policy.action {
            ExpirationAction::Draft => self.store.set_status(id, RecordStatus::Draft).await,
            ExpirationAction::Trash => self.store.set_status(id, RecordStatus::Trashed).await,
            ExpirationAction::Delete => self.store.hard_delete(id).await,
            ExpirationAction::Update => {
                let patch = policy
                    .update_args
                    .as_ref()
                    .map(|args| args.patch_for(record))
                    .unwrap_or_default();
                self.store.update_fields(id, &patch).await
            }
        }
    }
}

#[async_trait]
impl JobHandler for ExpirationEngine {
    async fn run(&self, _job_name: &str) {
        self.run_scheduled().await;
    }
}

impl std::fmt::Debug for ExpirationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirationEngine")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("job_name", &self.job_name)
            .finish()
    }
}
