// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as unique pool ports, known log levels, and non-empty
//! paths.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::BerthConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BerthConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.broker.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "broker.log_level `{}` is not one of {}",
                config.broker.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.storage.state_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.state_path must not be empty".to_string(),
        });
    }

    if config.pool.instances.is_empty() {
        errors.push(ConfigError::Validation {
            message: "pool.instances must list at least one worker slot".to_string(),
        });
    }

    let mut seen_ports = HashSet::new();
    for spec in &config.pool.instances {
        if spec.port == 0 {
            errors.push(ConfigError::Validation {
                message: "pool.instances ports must be nonzero".to_string(),
            });
        }
        if !seen_ports.insert(spec.port) {
            errors.push(ConfigError::Validation {
                message: format!("pool.instances port {} is listed more than once", spec.port),
            });
        }
        if spec.container_name.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!(
                    "pool.instances entry for port {} has an empty container_name",
                    spec.port
                ),
            });
        }
    }

    if config.pool.cleanup_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "pool.cleanup_interval_secs must be at least 1".to_string(),
        });
    }

    if config.sync.max_queue_len == 0 {
        errors.push(ConfigError::Validation {
            message: "sync.max_queue_len must be at least 1".to_string(),
        });
    }

    let base_url = config.bridge.base_url.trim();
    if base_url.is_empty() {
        errors.push(ConfigError::Validation {
            message: "bridge.base_url must not be empty".to_string(),
        });
    } else if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        errors.push(ConfigError::Validation {
            message: format!("bridge.base_url `{base_url}` must start with http:// or https://"),
        });
    }

    if config.bridge.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "bridge.request_timeout_secs must be at least 1".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceSpec;

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&BerthConfig::default()).is_ok());
    }

    #[test]
    fn duplicate_ports_are_rejected() {
        let mut config = BerthConfig::default();
        config.pool.instances = vec![
            InstanceSpec {
                port: 3001,
                container_name: "wa-1".into(),
            },
            InstanceSpec {
                port: 3001,
                container_name: "wa-2".into(),
            },
        ];
        let errors = validate_config(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| e.to_string().contains("listed more than once"))
        );
    }

    #[test]
    fn bad_log_level_and_empty_pool_collect_together() {
        let mut config = BerthConfig::default();
        config.broker.log_level = "loud".into();
        config.pool.instances.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn zero_queue_cap_is_rejected() {
        let mut config = BerthConfig::default();
        config.sync.max_queue_len = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn base_url_must_be_http() {
        let mut config = BerthConfig::default();
        config.bridge.base_url = "ftp://router".into();
        assert!(validate_config(&config).is_err());
    }
}
