use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use codewise_graph::config::GraphConfig;

/// Builds a knowledge graph of a TypeScript/JavaScript component codebase.
///
/// Every function, class, component and exported variable becomes one JSON
/// record with its source, comments, and forward and backward dependencies.
#[derive(Parser, Debug)]
#[command(
    name = "codewise-graph",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    /// Debug logging for this tool.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract, link and write the graph of a project.
    Index(IndexArgs),

    /// Resolve one module specifier the way the indexer would.
    Resolve {
        /// Project root.
        path: PathBuf,

        /// Importing file, relative to the project root.
        from: String,

        /// Module specifier as written in the import.
        specifier: String,

        /// Extra alias, `PREFIX=ROOT` (repeatable).
        #[arg(long = "alias", value_parser = parse_alias)]
        aliases: Vec<(String, String)>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Path to the project root to index.
    pub path: PathBuf,

    /// Output directory, relative to the current directory
    /// (default: `<PATH>/.codewise-graph`).
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Only index files whose project-relative path matches this glob.
    #[arg(long)]
    pub pattern: Option<String>,

    /// Extra alias, `PREFIX=ROOT` (repeatable). Overrides the config file.
    #[arg(long = "alias", value_parser = parse_alias)]
    pub aliases: Vec<(String, String)>,

    /// Worker threads (default: one per core).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Index files with recoverable syntax errors instead of skipping them.
    #[arg(long)]
    pub lenient: bool,

    /// Print the run summary as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,
}

impl IndexArgs {
    /// Apply command-line overrides on top of the project configuration.
    pub fn apply(&self, config: &mut GraphConfig) {
        if let Some(out) = &self.out {
            // Relative to where the command runs, not to the project root.
            config.output_dir = Some(std::path::absolute(out).unwrap_or_else(|_| out.clone()));
        }
        if let Some(pattern) = &self.pattern {
            config.pattern = Some(pattern.clone());
        }
        if let Some(threads) = self.threads {
            config.threads = Some(threads);
        }
        if self.lenient {
            config.strict_syntax = Some(false);
        }
        for (prefix, root) in &self.aliases {
            config.aliases.insert(prefix.clone(), root.clone());
        }
    }
}

/// `PREFIX=ROOT` -> (`PREFIX`, `ROOT`).
pub fn parse_alias(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((prefix, root)) if !prefix.is_empty() && !root.is_empty() => {
            Ok((prefix.to_owned(), root.to_owned()))
        }
        _ => Err(format!("expected PREFIX=ROOT, got {raw:?}")),
    }
}
