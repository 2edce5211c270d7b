//! One full graph run: discover, extract in parallel, link, emit.
//!
//! Linking only starts once every file's extraction has finished, and
//! emission only starts once linking has.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::GraphConfig;
use crate::emit::{EmitStats, FileFailure, ProjectSummary, emit, prepare_output_dir};
use crate::error::{GraphError, QualifiedNameCollision, Result};
use crate::graph::DefinitionKey;
use crate::linker::link;
use crate::parser::{ExtractOptions, ExtractedFile, extract_file};
use crate::resolver::{AliasTable, ModuleResolver};
use crate::walker::{DiscoveredFile, walk_project};

/// Result of extracting every discovered file.
pub struct ProjectExtraction {
    /// Successfully extracted files, sorted by path.
    pub files: Vec<ExtractedFile>,
    pub failures: Vec<FileFailure>,
}

/// What a completed run produced.
#[derive(Debug)]
pub struct RunReport {
    pub summary: ProjectSummary,
    pub emitted: EmitStats,
    pub output_dir: PathBuf,
    pub elapsed_secs: f64,
}

/// Resolver for a project root: configured aliases, then tsconfig paths,
/// then workspace packages.
pub fn build_resolver(root: &Path, config: &GraphConfig) -> ModuleResolver {
    ModuleResolver::new(root, AliasTable::for_project(root, &config.aliases))
}

/// Extract every discovered file. Per-file failures are collected; a scope
/// imbalance in any file aborts with that error.
pub fn extract_project(
    discovered: &[DiscoveredFile],
    resolver: &ModuleResolver,
    options: &ExtractOptions,
) -> Result<ProjectExtraction> {
    let results: Vec<(&DiscoveredFile, Result<ExtractedFile>)> = discovered
        .par_iter()
        .map(|entry| (entry, extract_one(entry, resolver, options)))
        .collect();

    let mut files = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (entry, result) in results {
        match result {
            Ok(file) => files.push(file),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(path = %entry.rel_path, "skipping file: {err}");
                failures.push(FileFailure {
                    path: entry.rel_path.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    files.sort_by(|a, b| a.file.path.cmp(&b.file.path));
    Ok(ProjectExtraction { files, failures })
}

fn extract_one(entry: &DiscoveredFile, resolver: &ModuleResolver, options: &ExtractOptions) -> Result<ExtractedFile> {
    let bytes = std::fs::read(&entry.abs_path).map_err(|source| GraphError::Io {
        path: entry.abs_path.clone(),
        source,
    })?;
    extract_file(&entry.rel_path, entry.abs_path.clone(), bytes, resolver, options)
}

/// Find Definitions sharing a qualified name. Every Definition involved is
/// returned in the flag set; each repeat is reported against the first one.
pub fn detect_collisions(files: &[ExtractedFile]) -> (Vec<QualifiedNameCollision>, HashSet<DefinitionKey>) {
    let mut seen: HashMap<&str, (DefinitionKey, usize)> = HashMap::new();
    let mut collisions = Vec::new();
    let mut flagged = HashSet::new();

    for (file_idx, file) in files.iter().enumerate() {
        for (def_idx, def) in file.definitions.iter().enumerate() {
            let key = DefinitionKey {
                file: file_idx,
                index: def_idx,
            };
            match seen.get(def.qualified_name()) {
                Some(&(first, first_line)) => {
                    flagged.insert(first);
                    flagged.insert(key);
                    collisions.push(QualifiedNameCollision {
                        qualified_name: def.qualified_name().to_owned(),
                        path: file.file.path.clone(),
                        first_line,
                        second_line: def.span.start_line,
                    });
                }
                None => {
                    seen.insert(def.qualified_name(), (key, def.span.start_line));
                }
            }
        }
    }

    for collision in &collisions {
        warn!("{collision}");
    }
    (collisions, flagged)
}

/// Run the whole pipeline for `root` and write the graph.
///
/// # Errors
/// Only run-level failures: an unreadable root, an invalid configuration, a
/// scope imbalance, or an output directory that cannot be written.
pub fn run(root: &Path, config: &GraphConfig) -> Result<RunReport> {
    let start = Instant::now();
    config.validate()?;

    let root = root.canonicalize().map_err(|source| GraphError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let output_dir = config.output_dir(&root);

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = config.threads.filter(|&n| n > 0) {
        builder = builder.num_threads(threads);
    }
    let pool = builder
        .build()
        .map_err(|e| GraphError::Config(format!("cannot start worker pool: {e}")))?;

    pool.install(|| -> Result<RunReport> {
        let discovered = walk_project(&root, config, Some(&output_dir));
        info!(files = discovered.len(), root = %root.display(), "discovered source files");

        let resolver = build_resolver(&root, config);
        let extraction = extract_project(&discovered, &resolver, &config.extract_options())?;
        info!(
            extracted = extraction.files.len(),
            failed = extraction.failures.len(),
            "extraction finished"
        );

        let (collisions, flagged) = detect_collisions(&extraction.files);
        let linked = link(&extraction.files);
        info!(
            linked = linked.stats.linked,
            same_file = linked.stats.same_file,
            file_level = linked.stats.file_level,
            external = linked.stats.external,
            unresolved = linked.stats.unresolved,
            "linking finished"
        );

        let summary = ProjectSummary::build(&extraction.files, &extraction.failures, &collisions, linked.stats);
        prepare_output_dir(&output_dir)?;
        let emitted = emit(&output_dir, &extraction.files, &linked, &flagged, &summary)?;

        Ok(RunReport {
            summary,
            emitted,
            output_dir: output_dir.clone(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, src: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, src).unwrap();
    }

    #[test]
    fn test_failures_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/ok.ts", "export function ok() {}\n");
        write(dir.path(), "src/broken.ts", "export function broken( {\n");

        let report = run(dir.path(), &GraphConfig::default()).unwrap();
        assert_eq!(report.summary.successful_files, 1);
        assert_eq!(report.summary.failed_files, 1);
        assert_eq!(report.summary.errors[0].path, "src/broken.ts");
        assert!(report.output_dir.join("src/ok/top-level/ok.json").is_file());
        assert!(report.output_dir.join("project-summary.json").is_file());
    }

    #[test]
    fn test_collisions_flag_both_definitions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lib/dup.js", "function twice() {}\nfunction twice() {}\n");
        let config = GraphConfig::default();
        let resolver = build_resolver(dir.path(), &config);
        let discovered = walk_project(dir.path(), &config, None);
        let extraction = extract_project(&discovered, &resolver, &config.extract_options()).unwrap();

        let (collisions, flagged) = detect_collisions(&extraction.files);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].qualified_name, "lib/dup.js::twice");
        assert_eq!((collisions[0].first_line, collisions[0].second_line), (1, 2));
        assert_eq!(flagged.len(), 2);
    }

    #[test]
    fn test_rerun_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export function a() {}\n");
        let config = GraphConfig::default();
        let first = run(dir.path(), &config).unwrap();
        assert!(first.output_dir.join("src/a/top-level/a.json").is_file());

        fs::remove_file(dir.path().join("src/a.ts")).unwrap();
        write(dir.path(), "src/b.ts", "export function b() {}\n");
        let second = run(dir.path(), &config).unwrap();
        assert!(!second.output_dir.join("src/a").exists());
        assert!(second.output_dir.join("src/b/top-level/b.json").is_file());
    }

    #[test]
    fn test_thread_count_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "export const a = () => 1;\n");
        let config = GraphConfig {
            threads: Some(1),
            ..GraphConfig::default()
        };
        let report = run(dir.path(), &config).unwrap();
        assert_eq!(report.summary.total_definitions, 1);
    }
}
