// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge.
//!
//! Turns Figment deserialization failures into miette diagnostics that
//! carry source spans, the valid keys for the section, and Jaro-Winkler
//! "did you mean?" suggestions for typos.

#![allow(unused_assignments)] // the Diagnostic derive expands to an assignment this lint flags

use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// A configuration failure, rendered through miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key the config model does not know about.
    #[error("unrecognized configuration key `{key}`")]
    #[diagnostic(
        code(berth::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// The key as written in the file.
        key: String,
        /// Closest valid key, when one scores above the similarity floor.
        suggestion: Option<String>,
        /// Comma-separated valid keys for the section.
        valid_keys: String,
        /// Where the key sits in its source file.
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        /// Contents of that source file, for the snippet display.
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value whose type does not match the model.
    #[error("key `{key}` has the wrong type: {detail}")]
    #[diagnostic(code(berth::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        /// Dotted path of the offending key.
        key: String,
        /// What was found and what the model wanted.
        detail: String,
        /// The expected type, echoed in the help line.
        expected: String,
    },

    /// A key the model requires but no source supplied.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(berth::config::missing_key),
        help("add `{key} = <value>` to your berth.toml")
    )]
    MissingKey {
        /// The missing key name.
        key: String,
    },

    /// A value that deserialized fine but failed a semantic check.
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(berth::config::validation))]
    Validation {
        /// What the check rejected.
        message: String,
    },

    /// Anything figment reports that fits no other variant.
    #[error("configuration error: {0}")]
    #[diagnostic(code(berth::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    if let Some(candidate) = suggestion {
        format!("did you mean `{candidate}`? Valid keys: {valid_keys}")
    } else {
        format!("valid keys: {valid_keys}")
    }
}

/// Convert a `figment::Error` into a list of `ConfigError` diagnostics.
///
/// One figment error can hold several underlying failures; each becomes its
/// own diagnostic, so a file with three typos reports all three at once.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| classify(error, toml_sources))
        .collect()
}

fn classify(error: figment::Error, toml_sources: &[(String, String)]) -> ConfigError {
    use figment::error::Kind;

    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let candidates: Vec<&str> = expected.to_vec();
            let (span, src) = locate_in_sources(&error, field, toml_sources);
            ConfigError::UnknownKey {
                key: field.clone(),
                suggestion: closest_key(field, &candidates),
                valid_keys: candidates.join(", "),
                span,
                src,
            }
        }
        Kind::MissingField(field) => ConfigError::MissingKey {
            key: field.clone().into_owned(),
        },
        Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
            key: error.path.join("."),
            detail: format!("found {actual}, expected {expected}"),
            expected: expected.to_string(),
        },
        _ => ConfigError::Other(error.to_string()),
    }
}

/// Resolve the span and snippet for a key error, when the failing file is
/// one of the TOML sources that were actually read.
fn locate_in_sources(
    error: &figment::error::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let path = match error.metadata.as_ref().and_then(|m| m.source.as_ref()) {
        Some(figment::Source::File(file)) => file.display().to_string(),
        _ => return (None, None),
    };

    if let Some((name, content)) = toml_sources.iter().find(|(source, _)| *source == path)
        && let Some(offset) = key_offset(content, &error.path, field)
    {
        let span = SourceSpan::new(offset.into(), field.len());
        return (Some(span), Some(NamedSource::new(name, content.clone())));
    }

    (None, None)
}

/// Byte offset of `field` in `content`, scoped to the `[section]` named by
/// the first element of `path`. A top-level key searches the whole file.
pub fn key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let start = match path.first() {
        Some(section) => {
            let header = format!("[{section}]");
            content.find(&header)? + header.len()
        }
        None => 0,
    };

    let mut pos = start;
    for line in content[start..].split_inclusive('\n') {
        let key = line.trim_start();
        // A key occupies the start of its line and ends at '=' or whitespace.
        if let Some(rest) = key.strip_prefix(field)
            && rest.starts_with(['=', ' ', '\t'])
        {
            return Some(pos + (line.len() - key.len()));
        }
        pos += line.len();
    }

    None
}

/// Jaro-Winkler floor below which no suggestion is offered. 0.75 still
/// catches `database_pth` -> `database_path` while staying quiet on keys
/// that resemble nothing.
const MIN_SIMILARITY: f64 = 0.75;

/// Closest valid key by Jaro-Winkler similarity, if any clears the floor.
pub fn closest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > MIN_SIMILARITY)
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, key)| key.to_string())
}

/// Render config errors to stderr through miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    let mut out = String::new();
    for error in errors {
        if handler.render_report(&mut out, error as &dyn Diagnostic).is_err() {
            out.push_str(&format!("error: {error}\n"));
        }
    }
    eprint!("{out}");
}
