//! Configuration for the expiration service.
//!
//! Configured via a TOML file, with support for environment variable
//! interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [expiration]
//! interval_secs = 3600
//!
//! [expiration.policies.post]
//! action = "trash"
//! expire_after = "${POST_TTL}"
//!
//! [observability.logging]
//! format = "json"
//! ```

mod expiration;
mod observability;

use std::path::Path;

pub use expiration::*;
pub use observability::*;
use serde::{Deserialize, Serialize};

/// Root configuration.
///
/// Every section is optional; an empty file is a valid configuration with
/// no policies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpirerConfig {
    /// Engine settings and per-type policies.
    #[serde(default)]
    pub expiration: ExpirationConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl ExpirerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: ExpirerConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.expiration.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

/// Commented starter configuration written by `expiring-posts init`.
pub fn default_config_toml() -> &'static str {
    r#"# expiring-posts configuration
#
# Values of the form ${VAR_NAME} are replaced with environment variables.

[expiration]
# Arm the scheduled scan on startup.
enabled = true
# Seconds between passes (minimum 60).
interval_secs = 3600
# Record identifiers requested per store page.
page_size = 1000
# Log what would expire without changing anything.
dry_run = false

# One table per record type. Omitted fields default to
# action = "draft" and expire_after = "365d".
#
# action: draft | trash | delete | update
# expire_after: seconds, or a number with a unit (s, m, h, d, w, y)

[expiration.policies.post]
action = "draft"
expire_after = "365d"

# [expiration.policies.event]
# action = "update"
# expire_after = 86400
# update_fields = { featured = false }

[observability.logging]
# trace | debug | info | warn | error
level = "info"
# pretty | compact | json
format = "compact"
# filter = "expiring_posts=debug"
"#
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        // Only expand variables that appear before any comment
        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
