// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes. Collects all errors rather than failing fast.

use crate::model::CarameloConfig;

/// A single configuration problem, rendered to the operator at startup.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &CarameloConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::new(format!(
            "agent.log_level `{}` is not one of {LOG_LEVELS:?}",
            config.agent.log_level
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::new("storage.database_path must not be empty"));
    }

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::new("server.host must not be empty"));
    }

    if !config.server.webhook_path.starts_with('/') {
        errors.push(ConfigError::new(format!(
            "server.webhook_path `{}` must start with `/`",
            config.server.webhook_path
        )));
    }

    if let Some(url) = &config.waha.api_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ConfigError::new(format!(
                "waha.api_url `{url}` must be an http(s) URL"
            )));
        }
    }

    if config.followup.poll_interval_secs == 0 {
        errors.push(ConfigError::new(
            "followup.poll_interval_secs must be at least 1",
        ));
    }

    if config.followup.reminder_poll_interval_secs == 0 {
        errors.push(ConfigError::new(
            "followup.reminder_poll_interval_secs must be at least 1",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Render collected configuration errors to stderr.
pub fn render_errors(errors: &[ConfigError]) {
    eprintln!("caramelo: invalid configuration");
    for err in errors {
        eprintln!("  - {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&CarameloConfig::default()).is_ok());
    }

    #[test]
    fn bad_log_level_fails() {
        let mut config = CarameloConfig::default();
        config.agent.log_level = "verbose".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("log_level")));
    }

    #[test]
    fn relative_webhook_path_fails() {
        let mut config = CarameloConfig::default();
        config.server.webhook_path = "webhook".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("webhook_path")));
    }

    #[test]
    fn non_http_gateway_url_fails() {
        let mut config = CarameloConfig::default();
        config.waha.api_url = Some("ftp://waha.local".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("api_url")));
    }

    #[test]
    fn zero_poll_interval_fails() {
        let mut config = CarameloConfig::default();
        config.followup.poll_interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
