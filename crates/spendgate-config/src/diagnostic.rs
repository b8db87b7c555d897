// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with fuzzy match suggestions.
//!
//! Unknown keys get a "did you mean?" hint based on Jaro-Winkler similarity
//! and, when the offending file can be located, a labelled source span.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a suggestion. Catches transpositions
/// such as `profit_magrin` while ignoring unrelated keys.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(spendgate::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Closest valid key, if any is close enough.
        suggestion: Option<String>,
        /// Comma-separated valid keys for the section.
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(spendgate::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(spendgate::config::missing_key),
        help("add `{key} = <value>` to your spendgate.toml")
    )]
    MissingKey { key: String },

    /// A value deserialized but violates a semantic constraint.
    #[error("validation error: {message}")]
    #[diagnostic(code(spendgate::config::validation))]
    Validation { message: String },

    /// Catch-all for other configuration errors.
    #[error("configuration error: {0}")]
    #[diagnostic(code(spendgate::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert a `figment::Error` (which may hold several errors) into
/// diagnostics. `toml_sources` pairs file paths with their contents.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                let (span, src) = locate_key(&error, field, toml_sources);
                ConfigError::UnknownKey {
                    key: field.clone(),
                    suggestion: suggest_key(field, expected),
                    valid_keys: expected.join(", "),
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
        })
        .collect()
}

fn locate_key(
    error: &figment::error::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some(figment::Source::File(path)) = error.metadata.as_ref().and_then(|m| m.source.as_ref())
    else {
        return (None, None);
    };
    let path = path.display().to_string();
    let Some((_, content)) = toml_sources.iter().find(|(p, _)| *p == path) else {
        return (None, None);
    };
    match find_key_offset(content, &error.path, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(path, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` in TOML `content`, searching after the table
/// header named by `path` (e.g. `["pricing", "power_surcharge"]` looks
/// after `[pricing.power_surcharge]`). Top-level fields search from the
/// start.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let start = if path.is_empty() {
        0
    } else {
        let header = format!("[{}]", path.join("."));
        content.find(&header)? + header.len()
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix(field) {
            if rest.starts_with([' ', '\t', '=']) {
                return Some(offset + (line.len() - trimmed.len()));
            }
        }
        offset += line.len();
    }
    None
}

/// Suggest the most similar valid key above [`SUGGESTION_THRESHOLD`].
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render diagnostics to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_key() {
        let valid = &["profit_margin", "byok_routing_fee_per_mtok", "default_power_mode"];
        assert_eq!(
            suggest_key("profit_magrin", valid),
            Some("profit_margin".to_string())
        );
    }

    #[test]
    fn suggests_threshold_typo() {
        let valid = &["warning_threshold", "lookup_timeout_ms", "serialize_per_user"];
        assert_eq!(
            suggest_key("warning_treshold", valid),
            Some("warning_threshold".to_string())
        );
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        let valid = &["warning_threshold", "lookup_timeout_ms"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn find_key_offset_in_nested_section() {
        let content = "[pricing]\nprofit_margin = 1.5\n\n[pricing.power_surcharge]\n  fsat = 1.0\n";
        let path = vec!["pricing".to_string(), "power_surcharge".to_string()];
        let offset = find_key_offset(content, &path, "fsat").unwrap();
        assert_eq!(&content[offset..offset + 4], "fsat");
    }

    #[test]
    fn find_key_offset_requires_separator() {
        let content = "[budget]\nwarning_threshold_x = 1\n";
        let path = vec!["budget".to_string()];
        assert_eq!(find_key_offset(content, &path, "warning_threshold"), None);
    }
}
