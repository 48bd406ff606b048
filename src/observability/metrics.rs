//! Counters for the expiration engine.
//!
//! Recorded through the `metrics` facade when the `prometheus` feature is
//! enabled; the host installs whatever recorder/exporter it uses. Without the
//! feature every function is a no-op.

#[cfg(feature = "prometheus")]
use metrics::counter;

/// Record one expired record.
///
/// # Arguments
/// * `record_type` - The record type the policy is registered for
/// * `action` - The action applied (e.g., "draft", "trash", "delete", "update")
pub fn record_expiration(record_type: &str, action: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "expiration_records_total",
            "record_type" => record_type.to_string(),
            "action" => action.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (record_type, action);
    }
}

/// Record a swallowed failure during a pass.
///
/// `stage` is one of "list", "fetch", "mutate" or "schedule".
pub fn record_expiration_error(stage: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "expiration_errors_total",
            "stage" => stage.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = stage;
    }
}

/// Record a finished pass.
pub fn record_expiration_run(cancelled: bool) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "expiration_runs_total",
            "cancelled" => cancelled.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = cancelled;
    }
}
