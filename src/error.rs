//! Error types for scanning, catalog loading, and batch resolution.
//!
//! Only [`ParseError`] aborts a pipeline run. Everything the pipeline can
//! recover from is reported as a [`crate::core::types::Diagnostic`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal scanner failure: the template cannot be split into balanced statements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at {line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Failure while reading or compiling a module catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("catalog JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported catalog format '{0}' (expected .yaml, .yml, .json or .toml)")]
    UnknownFormat(String),

    #[error("catalog entry {index} ({resource_type}): {message}")]
    InvalidEntry {
        index: usize,
        resource_type: String,
        message: String,
    },
}

/// Crate-level error for callers that drive the pipeline end to end.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("template '{name}' timed out after {seconds}s")]
    Timeout { name: String, seconds: f64 },

    #[error("resolver task failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ar000_parse_error_display() {
        let e = ParseError::new(3, 14, "unclosed '{'");
        assert_eq!(e.to_string(), "parse error at 3:14: unclosed '{'");
    }

    #[test]
    fn test_ar000_catalog_entry_display() {
        let e = CatalogError::InvalidEntry {
            index: 2,
            resource_type: "Microsoft.Web/sites".to_string(),
            message: "module locator is empty".to_string(),
        };
        assert!(e.to_string().contains("entry 2"));
        assert!(e.to_string().contains("Microsoft.Web/sites"));
    }

    #[test]
    fn test_ar000_error_from_parse() {
        let e: Error = ParseError::new(1, 1, "boom").into();
        assert!(matches!(e, Error::Parse(_)));
        assert!(e.to_string().contains("boom"));
    }
}
