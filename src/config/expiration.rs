//! Expiration engine configuration.
//!
//! # Example
//!
//! ```toml
//! [expiration]
//! enabled = true
//! interval_secs = 3600
//! page_size = 1000
//! dry_run = false
//!
//! [expiration.policies.post]
//! action = "trash"
//! expire_after = "30d"
//!
//! [expiration.policies.event]
//! action = "update"
//! expire_after = 86400
//! update_fields = { featured = false }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    expiration::{
        DEFAULT_INTERVAL_SECS, DEFAULT_PAGE_SIZE, EngineSettings, ExpirationPolicy, ExpireAfter,
        MIN_INTERVAL_SECS, PolicyError, PolicyInput,
    },
    store::FieldPatch,
};

/// Expiration engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpirationConfig {
    /// Whether the scheduled scan is armed on startup.
    /// Manual passes still run when disabled.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between passes. Values below 60 are raised to 60.
    /// Default: 3600
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Record identifiers requested per store page.
    /// Default: 1000
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Log what would expire without changing anything.
    #[serde(default)]
    pub dry_run: bool,

    /// Policies keyed by record type.
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyConfig>,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            page_size: default_page_size(),
            dry_run: false,
            policies: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl ExpirationConfig {
    /// Engine tunables from this section.
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            page_size: self.page_size,
            interval_secs: self.interval_secs,
            dry_run: self.dry_run,
        }
    }

    /// Resolve every configured policy, in record type order.
    pub fn resolve_policies(&self) -> Result<Vec<(String, ExpirationPolicy)>, PolicyError> {
        self.policies
            .iter()
            .map(|(record_type, policy)| {
                policy
                    .to_input()
                    .resolve(record_type)
                    .map(|resolved| (record_type.clone(), resolved))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("expiration.page_size must be greater than 0".into());
        }

        if self.interval_secs < MIN_INTERVAL_SECS {
            tracing::warn!(
                interval_secs = self.interval_secs,
                min_interval_secs = MIN_INTERVAL_SECS,
                "expiration.interval_secs is below the minimum and will be raised"
            );
        }

        if self.dry_run && self.enabled {
            tracing::info!("Expiration is configured in DRY RUN mode - no records will be changed");
        }

        self.resolve_policies().map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// A single policy as written in the config file.
///
/// Omitted fields take the registration defaults (draft after 365 days).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default)]
    pub action: Option<String>,

    /// Seconds, or a string such as "30d".
    #[serde(default)]
    pub expire_after: Option<ExpireAfter>,

    /// Field patch for the update action.
    #[serde(default)]
    pub update_fields: Option<FieldPatch>,
}

impl PolicyConfig {
    pub fn to_input(&self) -> PolicyInput {
        let mut input = PolicyInput::new();
        input.action = self.action.clone();
        input.expire_after = self.expire_after.clone();
        if let Some(fields) = &self.update_fields {
            input = input.with_update_fields(fields.clone());
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::expiration::ExpirationAction;

    #[test]
    fn test_default_config() {
        let config = ExpirationConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval_secs, 3600);
        assert_eq!(config.page_size, 1000);
        assert!(!config.dry_run);
        assert!(config.policies.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            enabled = true
            interval_secs = 900
            page_size = 250
            dry_run = true

            [policies.post]
            action = "trash"
            expire_after = "30d"

            [policies.event]
            action = "update"
            expire_after = 86400
            update_fields = { featured = false, label = "archived" }

            [policies.page]
        "#;
        let config: ExpirationConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.interval_secs, 900);
        assert_eq!(config.page_size, 250);
        assert!(config.dry_run);
        assert!(config.validate().is_ok());

        let policies: BTreeMap<_, _> = config.resolve_policies().unwrap().into_iter().collect();
        assert_eq!(policies["post"].action, ExpirationAction::Trash);
        assert_eq!(policies["post"].expire_after_secs, 30 * 86_400);
        assert_eq!(policies["page"].action, ExpirationAction::Draft);
        assert_eq!(policies["page"].expire_after_secs, 31_536_000);

        let update = policies["event"].update_args.as_ref().unwrap();
        let record = crate::store::Record {
            id: crate::store::RecordId(1),
            record_type: "event".into(),
            status: Default::default(),
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
            fields: FieldPatch::new(),
        };
        let patch = update.patch_for(&record);
        assert_eq!(patch.get("featured"), Some(&json!(false)));
        assert_eq!(patch.get("label"), Some(&json!("archived")));
    }

    #[test]
    fn test_settings_from_config() {
        let config = ExpirationConfig {
            interval_secs: 30,
            page_size: 10,
            dry_run: true,
            ..Default::default()
        };
        let settings = config.settings();
        assert_eq!(settings.page_size, 10);
        assert_eq!(settings.interval().num_seconds(), 60);
        assert!(settings.dry_run);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let config = ExpirationConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("page_size"));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let toml = r#"
            [policies.post]
            action = "archive"
        "#;
        let config: ExpirationConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("post"), "{err}");
    }

    #[test]
    fn test_fractional_expire_after_rejected() {
        let toml = r#"
            [policies.post]
            expire_after = 1.5
        "#;
        let config: ExpirationConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_update_fields_without_update_action_rejected() {
        let toml = r#"
            [policies.post]
            action = "draft"
            update_fields = { featured = false }
        "#;
        let config: ExpirationConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
            [policies.post]
            expire = 10
        "#;
        assert!(toml::from_str::<ExpirationConfig>(toml).is_err());
    }
}
