// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostic error types and rendering for configuration failures.
//!
//! Converts figment extraction errors and validation failures into miette
//! diagnostics so startup failures point at the offending key.

use miette::Diagnostic;
use thiserror::Error;

/// A single configuration error, renderable as a miette diagnostic.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// Error surfaced by figment during file/env merging or extraction.
    #[error("{message}")]
    #[diagnostic(code(leadgate::config::parse))]
    Parse {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Semantic validation failure after successful deserialization.
    #[error("{message}")]
    #[diagnostic(code(leadgate::config::validation))]
    Validation { message: String },
}

/// Convert a figment error (which may aggregate several failures) into
/// individual [`ConfigError`]s.
pub fn figment_to_config_errors(err: figment::Error) -> Vec<ConfigError> {
    err.into_iter()
        .map(|e| {
            let path = e.path.join(".");
            let help = if path.is_empty() {
                None
            } else {
                Some(format!("check the `{path}` key in your leadgate.toml"))
            };
            ConfigError::Parse {
                message: e.to_string(),
                help,
            }
        })
        .collect()
}

/// Render all collected errors to stderr as miette reports.
pub fn render_errors(errors: &[ConfigError]) {
    for err in errors {
        let report = miette::Report::msg(format!("{err}"));
        eprintln!("{report:?}");
        if let ConfigError::Parse {
            help: Some(help), ..
        } = err
        {
            eprintln!("  help: {help}");
        }
    }
    eprintln!(
        "leadgate: {} configuration error(s), refusing to start",
        errors.len()
    );
}
