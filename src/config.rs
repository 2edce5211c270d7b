use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::GraphError;
use crate::parser::ExtractOptions;

/// File name of the optional project configuration.
pub const CONFIG_FILE: &str = "codewise-graph.toml";

/// Default output directory name, created under the project root.
pub const DEFAULT_OUTPUT_DIR: &str = ".codewise-graph";

/// Configuration loaded from `codewise-graph.toml` at the project root.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GraphConfig {
    /// Additional path patterns to exclude (beyond .gitignore and the
    /// built-in dependency/build directories).
    pub exclude: Option<Vec<String>>,
    /// Include glob matched against project-relative paths.
    pub pattern: Option<String>,
    /// Output root. Relative paths are taken from the project root.
    pub output_dir: Option<PathBuf>,
    /// Max blank lines between a leading comment and its Definition.
    pub comment_window: Option<usize>,
    /// Treat any syntax error as a parse failure.
    pub strict_syntax: Option<bool>,
    /// Worker pool size; 0 or absent means one per core.
    pub threads: Option<usize>,
    /// Alias prefix -> root directory.
    pub aliases: BTreeMap<String, String>,
}

impl GraphConfig {
    /// Load configuration from `codewise-graph.toml` in the given root directory.
    ///
    /// Returns a default configuration if the file does not exist or cannot
    /// be read or parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!("{err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                warn!("failed to read {CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, GraphError> {
        toml::from_str(contents).map_err(|e| GraphError::Config(format!("{CONFIG_FILE}: {e}")))
    }

    /// Absolute output root for a project.
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.join(DEFAULT_OUTPUT_DIR),
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        let defaults = ExtractOptions::default();
        ExtractOptions {
            comment_window: self.comment_window.unwrap_or(defaults.comment_window),
            strict_syntax: self.strict_syntax.unwrap_or(defaults.strict_syntax),
        }
    }

    /// Validate values that the type system cannot.
    pub fn validate(&self) -> Result<(), GraphError> {
        if let Some(pattern) = &self.pattern {
            glob::Pattern::new(pattern)
                .map_err(|e| GraphError::Config(format!("invalid pattern {pattern:?}: {e}")))?;
        }
        for pattern in self.exclude.iter().flatten() {
            glob::Pattern::new(pattern)
                .map_err(|e| GraphError::Config(format!("invalid exclude pattern {pattern:?}: {e}")))?;
        }
        Ok(())
    }
}
