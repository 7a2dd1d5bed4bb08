//! Coordinator Configuration
//!
//! Limits and logging threshold for a `QueryCoordinator`.

use serde::{Deserialize, Serialize};

use super::errors::{LiveError, LiveResult};
use crate::observability::{Logger, Severity};

/// Query coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Maximum number of registered queries (default: 1024)
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    /// Stop evaluating queries whose error is already latched (default: true)
    #[serde(default = "default_skip_evaluation_after_error")]
    pub skip_evaluation_after_error: bool,

    /// Lowest severity written by the logger (default: INFO)
    #[serde(default = "default_log_level")]
    pub log_level: Severity,
}

fn default_max_queries() -> usize {
    1024
}

fn default_skip_evaluation_after_error() -> bool {
    true
}

fn default_log_level() -> Severity {
    Severity::Info
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_queries: default_max_queries(),
            skip_evaluation_after_error: default_skip_evaluation_after_error(),
            log_level: default_log_level(),
        }
    }
}

impl CoordinatorConfig {
    /// Create a config with the given registry limit
    pub fn with_max_queries(max_queries: usize) -> Self {
        Self {
            max_queries,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON config; missing keys take their defaults
    pub fn from_json_str(json: &str) -> LiveResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LiveError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LiveResult<()> {
        if self.max_queries == 0 {
            return Err(LiveError::InvalidConfig(
                "max_queries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Install `log_level` as the process-wide logger threshold
    pub fn apply_logging(&self) {
        Logger::set_min_severity(self.log_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_queries, 1024);
        assert!(config.skip_evaluation_after_error);
        assert_eq!(config.log_level, Severity::Info);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = CoordinatorConfig::from_json_str(r#"{"log_level": "TRACE"}"#).unwrap();
        assert_eq!(config.log_level, Severity::Trace);
        assert_eq!(config.max_queries, 1024);
    }

    #[test]
    fn test_zero_max_queries_rejected() {
        let err = CoordinatorConfig::from_json_str(r#"{"max_queries": 0}"#).unwrap_err();
        assert_eq!(err.code(), "AERO_LIVE_INVALID_CONFIG");
        assert!(CoordinatorConfig::with_max_queries(0).validate().is_err());
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            CoordinatorConfig::from_json_str("{"),
            Err(LiveError::InvalidConfig(_))
        ));
    }
}
