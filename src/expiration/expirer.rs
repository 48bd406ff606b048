//! Host-facing facade wiring the registry, engine and scheduler together.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{
    CRON_JOB_NAME,
    engine::{EngineSettings, ExpirationEngine, ExpirationRunResult},
    policy::{ExpirationPolicy, PolicyError, PolicyInput},
    predicate::ExpirationPredicate,
    query::QueryBuilder,
    registry::{PolicyRegistry, RegisterOutcome},
};
use crate::{
    clock::Clock,
    config::ExpirationConfig,
    events::EventSink,
    scheduler::{JobHandler, TaskScheduler},
    store::ContentStore,
};

/// Scheduler callback holding the engine weakly, so the scheduler keeps no
/// engine alive after the `Expirer` is dropped.
struct ScheduledPass {
    engine: Weak<ExpirationEngine>,
}

#[async_trait]
impl JobHandler for ScheduledPass {
    async fn run(&self, job_name: &str) {
        match self.engine.upgrade() {
            Some(engine) => {
                engine.run_scheduled().await;
            }
            None => tracing::debug!(job = job_name, "Expirer dropped, ignoring scheduled pass"),
        }
    }
}

/// Registry, engine and scheduler for one host process.
///
/// # Example
///
/// ```ignore
/// let expirer = Expirer::builder(store, scheduler).build();
/// expirer.add_post_type("post", PolicyInput::new().with_action("trash"))?;
/// expirer.start().await;
/// ```
pub struct Expirer {
    registry: PolicyRegistry,
    store: Arc<dyn ContentStore>,
    scheduler: Arc<dyn TaskScheduler>,
    engine: Arc<ExpirationEngine>,
    enabled: bool,
}

impl Expirer {
    pub fn builder(
        store: Arc<dyn ContentStore>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> ExpirerBuilder {
        ExpirerBuilder::new(store, scheduler)
    }

    /// Register an expiration policy for a record type.
    ///
    /// Types the store does not know are skipped with a warning and
    /// reported as [`RegisterOutcome::UnknownType`]; this is not an error so
    /// hosts can register before every type has been declared.
    pub fn add_post_type(
        &self,
        record_type: &str,
        input: PolicyInput,
    ) -> Result<RegisterOutcome, PolicyError> {
        if !self.store.has_record_type(record_type) {
            tracing::warn!(
                record_type,
                "Ignoring expiration policy for unknown record type"
            );
            return Ok(RegisterOutcome::UnknownType);
        }

        let outcome = self.registry.register(record_type, input)?;
        if let Some(policy) = self.registry.get(record_type) {
            tracing::debug!(
                record_type,
                action = %policy.action,
                expire_after_secs = policy.expire_after_secs,
                replaced = outcome == RegisterOutcome::Replaced,
                "Registered expiration policy"
            );
        }
        Ok(outcome)
    }

    /// Stop expiring a record type. Returns whether it was registered.
    pub fn remove_post_type(&self, record_type: &str) -> bool {
        self.registry.unregister(record_type)
    }

    pub fn clear_post_types(&self) {
        self.registry.clear();
    }

    pub fn get_post_type(&self, record_type: &str) -> Option<ExpirationPolicy> {
        self.registry.get(record_type)
    }

    /// Registered policies in insertion order.
    pub fn post_types(&self) -> Vec<(String, ExpirationPolicy)> {
        self.registry.snapshot()
    }

    /// Register every policy in the config section, stopping at the first
    /// invalid one.
    pub fn register_from_config(
        &self,
        config: &ExpirationConfig,
    ) -> Result<Vec<(String, RegisterOutcome)>, PolicyError> {
        config
            .policies
            .iter()
            .map(|(record_type, policy)| {
                self.add_post_type(record_type, policy.to_input())
                    .map(|outcome| (record_type.clone(), outcome))
            })
            .collect()
    }

    /// Run one pass now. Returns `None` if a pass is already in flight.
    pub async fn run_expiration_check(&self) -> Option<ExpirationRunResult> {
        self.engine.run_expiration_check().await
    }

    /// Arm the next pass unless one is already pending.
    pub async fn schedule_next_run(&self) -> Option<DateTime<Utc>> {
        self.engine.schedule_next_run().await
    }

    /// Register the scheduled pass with the scheduler and arm the first run.
    ///
    /// Returns the fire time of the first run when one was scheduled.
    pub async fn start(&self) -> Option<DateTime<Utc>> {
        if !self.enabled {
            tracing::info!("Expiration scheduler disabled by configuration");
            return None;
        }

        let settings = self.engine.settings();
        let dry_run_msg = if settings.dry_run { " (DRY RUN)" } else { "" };
        tracing::info!(
            job = self.engine.job_name(),
            interval_secs = settings.interval().num_seconds(),
            page_size = settings.page_size,
            policies = self.registry.len(),
            dry_run = settings.dry_run,
            "Starting expiration scheduler{}",
            dry_run_msg
        );

        self.scheduler.register_handler(
            self.engine.job_name(),
            Arc::new(ScheduledPass {
                engine: Arc::downgrade(&self.engine),
            }),
        );
        self.engine.schedule_next_run().await
    }

    /// Cancel any pass in progress and drop the pending run.
    ///
    /// The cancellation is permanent for this engine.
    pub async fn stop(&self) {
        self.engine.cancellation_token().cancel();
        if self.scheduler.cancel(self.engine.job_name()).await {
            tracing::info!(job = self.engine.job_name(), "Expiration scheduler stopped");
        }
    }

    pub fn engine(&self) -> &Arc<ExpirationEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for Expirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expirer")
            .field("engine", &self.engine)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Builder for [`Expirer`]. Every hook defaults to the documented behaviour.
pub struct ExpirerBuilder {
    store: Arc<dyn ContentStore>,
    scheduler: Arc<dyn TaskScheduler>,
    registry: PolicyRegistry,
    settings: EngineSettings,
    enabled: bool,
    events: Option<Arc<dyn EventSink>>,
    predicate: Option<Arc<dyn ExpirationPredicate>>,
    query: Option<Arc<dyn QueryBuilder>>,
    clock: Option<Arc<dyn Clock>>,
    cancel: Option<CancellationToken>,
    job_name: String,
}

impl ExpirerBuilder {
    fn new(store: Arc<dyn ContentStore>, scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self {
            store,
            scheduler,
            registry: PolicyRegistry::new(),
            settings: EngineSettings::default(),
            enabled: true,
            events: None,
            predicate: None,
            query: None,
            clock: None,
            cancel: None,
            job_name: CRON_JOB_NAME.to_string(),
        }
    }

    /// Take `enabled`, interval, page size and dry run from a config section.
    /// Policies are registered separately with [`Expirer::register_from_config`].
    pub fn config(mut self, config: &ExpirationConfig) -> Self {
        self.settings = config.settings();
        self.enabled = config.enabled;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.settings.page_size = page_size;
        self
    }

    pub fn interval_secs(mut self, interval_secs: u64) -> Self {
        self.settings.interval_secs = interval_secs;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.settings.dry_run = dry_run;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Share an existing registry.
    pub fn registry(mut self, registry: PolicyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn predicate(mut self, predicate: Arc<dyn ExpirationPredicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn query_builder(mut self, query: Arc<dyn QueryBuilder>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = job_name.into();
        self
    }

    pub fn build(self) -> Expirer {
        let mut engine = ExpirationEngine::new(
            self.registry.clone(),
            self.store.clone(),
            self.scheduler.clone(),
        )
        .with_settings(self.settings)
        .with_job_name(self.job_name);

        if let Some(events) = self.events {
            engine = engine.with_event_sink(events);
        }
        if let Some(predicate) = self.predicate {
            engine = engine.with_predicate(predicate);
        }
        if let Some(query) = self.query {
            engine = engine.with_query_builder(query);
        }
        if let Some(clock) = self.clock {
            engine = engine.with_clock(clock);
        }
        if let Some(cancel) = self.cancel {
            engine = engine.with_cancellation_token(cancel);
        }

        Expirer {
            registry: self.registry,
            store: self.store,
            scheduler: self.scheduler,
            engine: Arc::new(engine),
            enabled: self.enabled,
        }
    }
}
