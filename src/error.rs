//! Error taxonomy for a graph extraction run.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors produced while building the knowledge graph.
///
/// `ParseFailure` and `Io` are per-file: the pipeline records them and keeps
/// going. `ScopeImbalance` is an internal invariant violation and aborts the
/// run. An unresolvable module path is not an error at all, see
/// [`crate::resolver::Resolution::Unresolved`].
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to parse {path}: {message}")]
    ParseFailure { path: String, message: String },

    #[error("scope stack imbalance in {path} (lines {start_line}-{end_line}): {detail}")]
    ScopeImbalance {
        path: String,
        start_line: usize,
        end_line: usize,
        detail: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write graph output at {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GraphError {
    /// True for errors that must abort the whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ScopeImbalance { .. } | Self::Output { .. } | Self::Config(_)
        )
    }

    pub(crate) fn parse_failure(path: &str, message: impl Into<String>) -> Self {
        Self::ParseFailure {
            path: path.to_owned(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Two Definitions that derived the same qualified name.
///
/// Both Definitions are kept in the graph and flagged; this record is what the
/// run summary reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifiedNameCollision {
    pub qualified_name: String,
    pub path: String,
    pub first_line: usize,
    pub second_line: usize,
}

impl std::fmt::Display for QualifiedNameCollision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "qualified name collision: {} ({} lines {} and {})",
            self.qualified_name, self.path, self.first_line, self.second_line
        )
    }
}
