//! Expiration policy types and the registration-time defaulting/validation step.

use std::{fmt, str::FromStr, sync::Arc};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{FieldPatch, Record};

/// Default age threshold applied when a policy omits `expire_after` (365 days).
pub const DEFAULT_EXPIRE_AFTER_SECS: u64 = 31_536_000;

/// Default action applied when a policy omits `action`.
pub const DEFAULT_ACTION: ExpirationAction = ExpirationAction::Draft;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const YEAR: u64 = 365 * DAY;

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Invalid expiration policy for '{record_type}': {reason}")]
    InvalidPolicy { record_type: String, reason: String },
}

impl PolicyError {
    fn invalid(record_type: &str, reason: impl Into<String>) -> Self {
        PolicyError::InvalidPolicy {
            record_type: record_type.to_string(),
            reason: reason.into(),
        }
    }
}

/// What happens to a record once it expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationAction {
    /// Move to a non-public draft state; content retained.
    Draft,
    /// Move to the reversible trashed state.
    Trash,
    /// Remove permanently.
    Delete,
    /// Apply a field patch.
    Update,
}

impl ExpirationAction {
    pub const ALL: [ExpirationAction; 4] = [
        ExpirationAction::Draft,
        ExpirationAction::Trash,
        ExpirationAction::Delete,
        ExpirationAction::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpirationAction::Draft => "draft",
            ExpirationAction::Trash => "trash",
            ExpirationAction::Delete => "delete",
            ExpirationAction::Update => "update",
        }
    }
}

impl fmt::Display for ExpirationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpirationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| {
                format!("unknown action '{s}' (expected one of: draft, trash, delete, update)")
            })
    }
}

/// Age threshold as supplied by a caller or a config file.
///
/// Integers are seconds. Strings may be bare digits or a number followed by a
/// unit (`45s`, `90m`, `12h`, `30d`, `2w`, `1y`, also long forms such as
/// `30 days`). Anything fractional or unparseable is rejected at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpireAfter {
    Seconds(i64),
    Fractional(f64),
    Text(String),
}

impl ExpireAfter {
    /// Resolve to a positive number of seconds.
    pub fn to_seconds(&self) -> Result<u64, String> {
        let secs = match self {
            ExpireAfter::Seconds(secs) => u64::try_from(*secs)
                .map_err(|_| format!("expire_after must be positive, got {secs}"))?,
            ExpireAfter::Fractional(value) => {
                return Err(format!(
                    "expire_after must be a whole number of seconds, got {value}"
                ));
            }
            ExpireAfter::Text(text) => parse_duration_text(text)?,
        };

        if secs == 0 {
            return Err("expire_after must be positive, got 0".to_string());
        }
        // chrono caps durations at i64::MAX milliseconds
        if secs > i64::MAX as u64 || Duration::try_seconds(secs as i64).is_none() {
            return Err(format!("expire_after of {secs} seconds is out of range"));
        }

        Ok(secs)
    }
}

impl From<i64> for ExpireAfter {
    fn from(secs: i64) -> Self {
        ExpireAfter::Seconds(secs)
    }
}

impl From<f64> for ExpireAfter {
    fn from(value: f64) -> Self {
        ExpireAfter::Fractional(value)
    }
}

impl From<&str> for ExpireAfter {
    fn from(text: &str) -> Self {
        ExpireAfter::Text(text.to_string())
    }
}

impl From<String> for ExpireAfter {
    fn from(text: String) -> Self {
        ExpireAfter::Text(text)
    }
}

impl From<Duration> for ExpireAfter {
    fn from(duration: Duration) -> Self {
        ExpireAfter::Seconds(duration.num_seconds())
    }
}

fn parse_duration_text(text: &str) -> Result<u64, String> {
    let trimmed = text.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    if digits.is_empty() {
        return Err(format!("expire_after '{text}' is not a duration"));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("expire_after '{text}' is out of range"))?;

    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "week" | "weeks" => WEEK,
        "y" | "year" | "years" => YEAR,
        other => return Err(format!("expire_after '{text}' has unknown unit '{other}'")),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("expire_after '{text}' is out of range"))
}

/// Per-record patch function for update policies.
pub type ComputePatch = dyn Fn(&Record) -> FieldPatch + Send + Sync;

/// Arguments for the `update` action.
#[derive(Clone)]
pub enum UpdateArgs {
    /// The same patch for every expired record.
    Fields(FieldPatch),
    /// A patch computed from each record at expiry time.
    Computed(Arc<ComputePatch>),
}

impl UpdateArgs {
    pub fn fields(patch: FieldPatch) -> Self {
        UpdateArgs::Fields(patch)
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Record) -> FieldPatch + Send + Sync + 'static,
    {
        UpdateArgs::Computed(Arc::new(f))
    }

    /// Produce the patch for one record.
    pub fn patch_for(&self, record: &Record) -> FieldPatch {
        match self {
            UpdateArgs::Fields(patch) => patch.clone(),
            UpdateArgs::Computed(f) => f(record),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            UpdateArgs::Fields(patch) => patch.is_empty(),
            UpdateArgs::Computed(_) => false,
        }
    }
}

impl fmt::Debug for UpdateArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateArgs::Fields(patch) => f.debug_tuple("Fields").field(patch).finish(),
            UpdateArgs::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

impl PartialEq for UpdateArgs {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (UpdateArgs::Fields(a), UpdateArgs::Fields(b)) => a == b,
            (UpdateArgs::Computed(a), UpdateArgs::Computed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A validated, fully-defaulted expiration policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpirationPolicy {
    pub action: ExpirationAction,
    /// Age threshold in seconds. Always positive.
    pub expire_after_secs: u64,
    /// Present exactly when `action` is `Update`.
    pub update_args: Option<UpdateArgs>,
}

impl ExpirationPolicy {
    pub fn expire_after(&self) -> Duration {
        Duration::seconds(self.expire_after_secs as i64)
    }
}

/// Caller-supplied policy fields; anything omitted is defaulted on registration.
#[derive(Debug, Clone, Default)]
pub struct PolicyInput {
    pub action: Option<String>,
    pub expire_after: Option<ExpireAfter>,
    pub update_args: Option<UpdateArgs>,
}

impl PolicyInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: impl fmt::Display) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn with_expire_after(mut self, expire_after: impl Into<ExpireAfter>) -> Self {
        self.expire_after = Some(expire_after.into());
        self
    }

    pub fn with_update_fields(mut self, patch: FieldPatch) -> Self {
        self.update_args = Some(UpdateArgs::Fields(patch));
        self
    }

    pub fn with_update_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> FieldPatch + Send + Sync + 'static,
    {
        self.update_args = Some(UpdateArgs::computed(f));
        self
    }

    /// Fill defaults and validate.
    pub fn resolve(self, record_type: &str) -> Result<ExpirationPolicy, PolicyError> {
        let action = match self.action.as_deref() {
            Some(raw) => raw
                .parse::<ExpirationAction>()
                .map_err(|reason| PolicyError::invalid(record_type, reason))?,
            None => DEFAULT_ACTION,
        };

        let expire_after_secs = match &self.expire_after {
            Some(expire_after) => expire_after
                .to_seconds()
                .map_err(|reason| PolicyError::invalid(record_type, reason))?,
            None => DEFAULT_EXPIRE_AFTER_SECS,
        };

        let update_args = match (action, self.update_args) {
            (ExpirationAction::Update, Some(args)) if !args.is_empty() => Some(args),
            (ExpirationAction::Update, _) => {
                return Err(PolicyError::invalid(
                    record_type,
                    "the update action requires non-empty update arguments",
                ));
            }
            (_, Some(_)) => {
                return Err(PolicyError::invalid(
                    record_type,
                    format!("update arguments are only valid for the update action, not {action}"),
                ));
            }
            (_, None) => None,
        };

        Ok(ExpirationPolicy {
            action,
            expire_after_secs,
            update_args,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn patch(key: &str, value: serde_json::Value) -> FieldPatch {
        let mut patch = FieldPatch::new();
        patch.insert(key.to_string(), value);
        patch
    }

    #[test]
    fn test_defaults_applied() {
        let policy = PolicyInput::new().resolve("post").unwrap();
        assert_eq!(policy.action, ExpirationAction::Draft);
        assert_eq!(policy.expire_after_secs, DEFAULT_EXPIRE_AFTER_SECS);
        assert!(policy.update_args.is_none());
    }

    #[test]
    fn test_partial_input_keeps_supplied_fields() {
        let policy = PolicyInput::new()
            .with_action(ExpirationAction::Trash)
            .resolve("post")
            .unwrap();
        assert_eq!(policy.action, ExpirationAction::Trash);
        assert_eq!(policy.expire_after_secs, DEFAULT_EXPIRE_AFTER_SECS);

        let policy = PolicyInput::new()
            .with_expire_after(86_400i64)
            .resolve("post")
            .unwrap();
        assert_eq!(policy.action, ExpirationAction::Draft);
        assert_eq!(policy.expire_after_secs, 86_400);
    }

    #[rstest]
    #[case("draft", ExpirationAction::Draft)]
    #[case("trash", ExpirationAction::Trash)]
    #[case("delete", ExpirationAction::Delete)]
    #[case("update", ExpirationAction::Update)]
    #[case(" Trash ", ExpirationAction::Trash)]
    #[case("DELETE", ExpirationAction::Delete)]
    fn test_action_parsing(#[case] raw: &str, #[case] expected: ExpirationAction) {
        assert_eq!(raw.parse::<ExpirationAction>().unwrap(), expected);
    }

    #[rstest]
    #[case("invalid-action")]
    #[case("")]
    #[case("publish")]
    #[case("archive")]
    fn test_invalid_action_rejected(#[case] raw: &str) {
        let err = PolicyInput::new().with_action(raw).resolve("post").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPolicy { ref record_type, .. } if record_type == "post"));
    }

    #[rstest]
    #[case(ExpireAfter::Seconds(0))]
    #[case(ExpireAfter::Seconds(-5))]
    #[case(ExpireAfter::Fractional(1.5))]
    #[case(ExpireAfter::Fractional(60.0))]
    #[case(ExpireAfter::Text("unknown".to_string()))]
    #[case(ExpireAfter::Text("0d".to_string()))]
    #[case(ExpireAfter::Text("10 fortnights".to_string()))]
    #[case(ExpireAfter::Text("1.5h".to_string()))]
    #[case(ExpireAfter::Text("".to_string()))]
    #[case(ExpireAfter::Text("99999999999999999999".to_string()))]
    #[case(ExpireAfter::Seconds(i64::MAX))]
    fn test_invalid_expire_after_rejected(#[case] expire_after: ExpireAfter) {
        let result = PolicyInput::new()
            .with_expire_after(expire_after)
            .resolve("post");
        assert!(matches!(result, Err(PolicyError::InvalidPolicy { .. })));
    }

    #[rstest]
    #[case("45", 45)]
    #[case("45s", 45)]
    #[case("90m", 90 * MINUTE)]
    #[case("12h", 12 * HOUR)]
    #[case("30d", 30 * DAY)]
    #[case("30 days", 30 * DAY)]
    #[case("2w", 2 * WEEK)]
    #[case("1y", 31_536_000)]
    #[case(" 1 Hour ", HOUR)]
    fn test_duration_text(#[case] text: &str, #[case] expected: u64) {
        assert_eq!(ExpireAfter::from(text).to_seconds().unwrap(), expected);
    }

    #[test]
    fn test_update_requires_args() {
        let missing = PolicyInput::new().with_action("update").resolve("post");
        assert!(matches!(missing, Err(PolicyError::InvalidPolicy { .. })));

        let empty = PolicyInput::new()
            .with_action("update")
            .with_update_fields(FieldPatch::new())
            .resolve("post");
        assert!(matches!(empty, Err(PolicyError::InvalidPolicy { .. })));

        let ok = PolicyInput::new()
            .with_action("update")
            .with_update_fields(patch("featured", json!(false)))
            .resolve("post")
            .unwrap();
        assert_eq!(
            ok.update_args,
            Some(UpdateArgs::Fields(patch("featured", json!(false))))
        );
    }

    #[test]
    fn test_update_args_rejected_for_other_actions() {
        let result = PolicyInput::new()
            .with_action("trash")
            .with_update_fields(patch("featured", json!(false)))
            .resolve("post");
        assert!(matches!(result, Err(PolicyError::InvalidPolicy { .. })));
    }

    #[test]
    fn test_computed_update_args() {
        let policy = PolicyInput::new()
            .with_action("update")
            .with_update_fn(|record| patch("archived_id", json!(record.id.0)))
            .resolve("post")
            .unwrap();

        let record = Record {
            id: crate::store::RecordId(9),
            record_type: "post".to_string(),
            status: Default::default(),
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
            fields: FieldPatch::new(),
        };
        let args = policy.update_args.as_ref().unwrap();
        assert_eq!(args.patch_for(&record), patch("archived_id", json!(9)));
        assert_eq!(format!("{args:?}"), "Computed(<fn>)");
    }

    #[test]
    fn test_expire_after_deserializes_untagged() {
        #[derive(Deserialize)]
        struct Wrapper {
            value: ExpireAfter,
        }

        let int: Wrapper = toml::from_str("value = 3600").unwrap();
        assert_eq!(int.value, ExpireAfter::Seconds(3600));

        let text: Wrapper = toml::from_str("value = \"30d\"").unwrap();
        assert_eq!(text.value, ExpireAfter::Text("30d".to_string()));

        let float: Wrapper = toml::from_str("value = 1.5").unwrap();
        assert_eq!(float.value, ExpireAfter::Fractional(1.5));
    }
}
