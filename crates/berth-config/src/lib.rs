// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Berth session broker.
//!
//! TOML files merge with environment overrides through Figment; unknown
//! keys are rejected by the serde model and come back as miette diagnostics
//! with typo suggestions. Semantic checks run after a successful parse and
//! report every violation at once.
//!
//! # Usage
//!
//! ```no_run
//! let config = berth_config::load_and_validate().expect("config errors");
//! println!("broker: {}", config.broker.name);
//! ```

use std::path::{Path, PathBuf};

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{BerthConfig, BridgeConfig, InstanceSpec};

/// Load from the XDG hierarchy plus env overrides, then validate.
///
/// Figment failures come back as render-ready diagnostics, semantic
/// failures as `Validation` errors; both paths report every problem found
/// rather than stopping at the first.
pub fn load_and_validate() -> Result<BerthConfig, Vec<ConfigError>> {
    validated(loader::load_config(), collect_toml_sources)
}

/// Parse an inline TOML string (defaults and env overrides still apply).
pub fn load_and_validate_str(toml_content: &str) -> Result<BerthConfig, Vec<ConfigError>> {
    validated(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// Load from an explicit file, bypassing the hierarchy.
pub fn load_and_validate_path(path: &Path) -> Result<BerthConfig, Vec<ConfigError>> {
    validated(loader::load_config_from_path(path), || {
        std::fs::read_to_string(path)
            .map(|content| vec![(path.display().to_string(), content)])
            .unwrap_or_default()
    })
}

/// Shared tail of the load entry points. Sources are collected lazily so
/// the happy path never rereads config files.
fn validated(
    loaded: Result<BerthConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<BerthConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Contents of every TOML file the loader may have merged, keyed by path,
/// for span lookup in error reports. Ordered the way the loader merges.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![PathBuf::from("/etc/berth/berth.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("berth/berth.toml"));
    }
    candidates.push(
        std::env::current_dir()
            .map(|dir| dir.join("berth.toml"))
            .unwrap_or_else(|_| PathBuf::from("berth.toml")),
    );

    candidates
        .into_iter()
        .filter_map(|path| {
            std::fs::read_to_string(&path)
                .ok()
                .map(|content| (path.display().to_string(), content))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_validate_str_happy_path() {
        let config = load_and_validate_str("[broker]\nlog_level = \"warn\"\n").unwrap();
        assert_eq!(config.broker.log_level, "warn");
    }

    #[test]
    fn load_and_validate_str_surfaces_typos_with_suggestion() {
        let errors = load_and_validate_str("[storage]\ndatabase_pth = \"x.db\"\n").unwrap_err();
        let rendered = errors[0].to_string();
        assert!(rendered.contains("database_pth"), "got: {rendered}");
    }

    #[test]
    fn load_and_validate_str_runs_semantic_checks() {
        let errors = load_and_validate_str("[sync]\nmax_queue_len = 0\n").unwrap_err();
        assert!(errors[0].to_string().contains("max_queue_len"));
    }

    #[test]
    fn load_and_validate_path_reports_typos_in_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("berth.toml");
        std::fs::write(&path, "[broker]\nnmae = \"x\"\n").unwrap();

        let errors = load_and_validate_path(&path).unwrap_err();
        assert!(errors[0].to_string().contains("nmae"));
    }
}
