//! Two-tier emission of the linked graph as JSON records.
//!
//! Layout under the output root:
//!
//! ```text
//! project-summary.json
//! <rel-dir>/<stem>/file.json
//! <rel-dir>/<stem>/top-level/<derivedName>.json
//! <rel-dir>/<stem>/nested/<derivedName>.json
//! ```
//!
//! The top-level/nested split only routes files; every record is
//! self-contained.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{GraphError, QualifiedNameCollision, Result};
use crate::graph::DefinitionKey;
use crate::graph::edge::{BackwardEdge, EdgeKind, EdgeTarget, ForwardEdge};
use crate::graph::node::{AssociatedComment, Definition, DefinitionKind, ExportKind, KindDetails, SourceFile};
use crate::linker::{LinkStats, LinkTarget, LinkedProject};
use crate::parser::ExtractedFile;
use crate::parser::imports::{ExportRecord, ImportRecord};
use crate::resolver::slash_path;

pub const SUMMARY_FILE: &str = "project-summary.json";
pub const FILE_RECORD: &str = "file.json";
pub const TOP_LEVEL_DIR: &str = "top-level";
pub const NESTED_DIR: &str = "nested";

// ---------------------------------------------------------------------------
// Record shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata<'a> {
    /// Absolute path on disk.
    pub file_path: String,
    /// Project-relative path, the prefix of every qualified name in the file.
    pub file_id: &'a str,
    pub extension: &'a str,
    pub dialect: &'static str,
    pub line_count: usize,
    pub import_count: usize,
    pub export_count: usize,
}

impl<'a> FileMetadata<'a> {
    fn new(file: &'a ExtractedFile) -> Self {
        Self {
            file_path: file.file.abs_path.display().to_string(),
            file_id: &file.file.path,
            extension: &file.file.extension,
            dialect: file.file.dialect.label(),
            line_count: file.file.line_count(),
            import_count: file.imports.len(),
            export_count: file.exports.len(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionInfo<'a> {
    pub name: &'a str,
    pub qualified_name: &'a str,
    pub kind: DefinitionKind,
    pub scope_path: Option<&'a str>,
    pub is_top_level: bool,
    pub start_line: usize,
    pub end_line: usize,
    pub code_text: &'a str,
    pub is_exported: bool,
    pub export_kind: ExportKind,
    pub associated_comments: &'a [AssociatedComment],
    pub description: Option<&'a str>,
    pub kind_details: &'a KindDetails,
    /// Another Definition of the run derived the same qualified name.
    pub collision: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardReference<'a> {
    pub kind: EdgeKind,
    pub symbol: &'a str,
    /// Import source as written; absent for same-file targets.
    pub source: Option<&'a str>,
    pub resolved_path: Option<&'a str>,
    pub is_external: bool,
    pub line: usize,
    pub target: &'a LinkTarget,
}

impl<'a> ForwardReference<'a> {
    fn new(edge: &'a ForwardEdge, file: &'a SourceFile, target: &'a LinkTarget) -> Self {
        let (source, resolved_path) = match &edge.target {
            EdgeTarget::Module { source, resolution, .. } => (Some(source.as_str()), resolution.resolved_path()),
            EdgeTarget::Local { .. } => (None, Some(file.path.as_str())),
        };
        Self {
            kind: edge.kind,
            symbol: edge.target.symbol(),
            source,
            resolved_path,
            is_external: edge.target.is_external(),
            line: edge.line,
            target,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyInfo<'a> {
    pub forward_references: Vec<ForwardReference<'a>>,
    pub backward_references: &'a [BackwardEdge],
    pub used_imports: &'a [String],
}

/// One graph node as written to disk.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRecord<'a> {
    pub file_metadata: FileMetadata<'a>,
    pub definition_info: DefinitionInfo<'a>,
    pub dependency_info: DependencyInfo<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionSummary<'a> {
    name: &'a str,
    qualified_name: &'a str,
    kind: DefinitionKind,
    is_top_level: bool,
    start_line: usize,
    end_line: usize,
    export_kind: ExportKind,
    /// Path of the Definition's record, relative to the output root.
    record: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileRecord<'a> {
    file_metadata: FileMetadata<'a>,
    file_definitions: Vec<DefinitionSummary<'a>>,
    imports: &'a [ImportRecord],
    exports: &'a [ExportRecord],
}

// ---------------------------------------------------------------------------
// Project summary
// ---------------------------------------------------------------------------

/// A file that was discovered but did not make it into the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBreakdown {
    pub path: String,
    pub extension: String,
    pub definitions: usize,
    pub top_level: usize,
    pub nested: usize,
    pub imports: usize,
    pub exports: usize,
    pub per_kind: BTreeMap<DefinitionKind, usize>,
}

/// The per-run summary record.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub total_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub total_definitions: usize,
    pub top_level_definitions: usize,
    pub nested_definitions: usize,
    /// Discovered files by extension, failed ones included.
    pub per_extension: BTreeMap<String, usize>,
    pub per_kind: BTreeMap<DefinitionKind, usize>,
    pub files: Vec<FileBreakdown>,
    pub errors: Vec<FileFailure>,
    pub collisions: Vec<QualifiedNameCollision>,
    pub links: LinkStats,
}

impl ProjectSummary {
    pub fn build(
        files: &[ExtractedFile],
        failures: &[FileFailure],
        collisions: &[QualifiedNameCollision],
        links: LinkStats,
    ) -> Self {
        let mut summary = Self {
            total_files: files.len() + failures.len(),
            successful_files: files.len(),
            failed_files: failures.len(),
            errors: failures.to_vec(),
            collisions: collisions.to_vec(),
            links,
            ..Self::default()
        };

        for failure in failures {
            let ext = Path::new(&failure.path)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            *summary.per_extension.entry(ext.to_owned()).or_default() += 1;
        }

        for file in files {
            *summary
                .per_extension
                .entry(file.file.extension.clone())
                .or_default() += 1;

            let mut breakdown = FileBreakdown {
                path: file.file.path.clone(),
                extension: file.file.extension.clone(),
                definitions: file.definitions.len(),
                imports: file.imports.len(),
                exports: file.exports.len(),
                ..FileBreakdown::default()
            };
            for def in &file.definitions {
                if def.is_top_level() {
                    breakdown.top_level += 1;
                } else {
                    breakdown.nested += 1;
                }
                *breakdown.per_kind.entry(def.kind).or_default() += 1;
                *summary.per_kind.entry(def.kind).or_default() += 1;
            }
            summary.total_definitions += breakdown.definitions;
            summary.top_level_definitions += breakdown.top_level;
            summary.nested_definitions += breakdown.nested;
            summary.files.push(breakdown);
        }

        summary.files.sort_by(|a, b| a.path.cmp(&b.path));
        summary.errors.sort_by(|a, b| a.path.cmp(&b.path));
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed_files > 0
    }
}

// ---------------------------------------------------------------------------
// Path derivation
// ---------------------------------------------------------------------------

/// Replace characters that are unsafe in file names.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '$' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_start_matches('.') {
        "" => "_".to_owned(),
        trimmed => trimmed.to_owned(),
    }
}

/// `scopePath.name`, or `name` at top level.
fn derived_name(def: &Definition) -> String {
    match def.scope_path() {
        Some(scope) => format!("{scope}.{}", def.name),
        None => def.name.clone(),
    }
}

/// Append `-2`, `-3`, ... to every path that repeats an earlier one, in
/// input order.
fn number_duplicates(paths: &mut [PathBuf], extension: Option<&str>) {
    let mut used: HashSet<PathBuf> = HashSet::new();
    for path in paths.iter_mut() {
        if used.insert(path.clone()) {
            continue;
        }
        let base = match extension {
            Some(_) => path.with_extension(""),
            None => path.clone(),
        };
        let base = base.to_string_lossy().into_owned();
        let mut ordinal = 2;
        loop {
            let candidate = PathBuf::from(match extension {
                Some(ext) => format!("{base}-{ordinal}.{ext}"),
                None => format!("{base}-{ordinal}"),
            });
            if used.insert(candidate.clone()) {
                *path = candidate;
                break;
            }
            ordinal += 1;
        }
    }
}

/// Per-file record directory, relative to the output root.
///
/// The sanitized stem is used unless another file ends up with the same
/// directory, in which case the full file name with `.` replaced by `_` is
/// used. Anything still shared gets a numeric suffix.
fn file_dirs(files: &[ExtractedFile]) -> Vec<PathBuf> {
    let parent = |file: &ExtractedFile| -> PathBuf {
        file.file
            .dir()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(sanitize_file_name)
            .collect()
    };
    let by_name = |file: &ExtractedFile| -> PathBuf {
        let name = file.file.path.rsplit('/').next().unwrap_or(&file.file.path);
        parent(file).join(sanitize_file_name(&name.replace('.', "_")))
    };

    let mut dirs: Vec<PathBuf> = files
        .iter()
        .map(|file| parent(file).join(sanitize_file_name(file.file.stem())))
        .collect();
    let mut uses_stem = vec![true; files.len()];
    // A stem dir can clash with another file's full-name dir, so repeat
    // until no stem-named dir is shared.
    loop {
        let mut counts: HashMap<&Path, usize> = HashMap::new();
        for dir in &dirs {
            *counts.entry(dir.as_path()).or_default() += 1;
        }
        let shared: Vec<usize> = (0..files.len())
            .filter(|&i| uses_stem[i] && counts[dirs[i].as_path()] > 1)
            .collect();
        if shared.is_empty() {
            break;
        }
        for i in shared {
            dirs[i] = by_name(&files[i]);
            uses_stem[i] = false;
        }
    }
    number_duplicates(&mut dirs, None);
    dirs
}

/// Record path of every Definition of `file`, relative to the output root.
///
/// Clashing names get an `@L<line>` suffix; clashes on the same line get a
/// further ordinal.
fn definition_paths(file: &ExtractedFile, file_dir: &Path) -> Vec<PathBuf> {
    let names: Vec<(bool, String)> = file
        .definitions
        .iter()
        .map(|def| (def.is_top_level(), sanitize_file_name(&derived_name(def))))
        .collect();
    let mut counts: HashMap<(bool, &str), usize> = HashMap::new();
    for (top, name) in &names {
        *counts.entry((*top, name.as_str())).or_default() += 1;
    }

    let mut paths: Vec<PathBuf> = file
        .definitions
        .iter()
        .zip(&names)
        .map(|(def, (top, name))| {
            let tier = if *top { TOP_LEVEL_DIR } else { NESTED_DIR };
            let stem = if counts[&(*top, name.as_str())] > 1 {
                format!("{name}@L{}", def.span.start_line)
            } else {
                name.clone()
            };
            file_dir.join(tier).join(format!("{stem}.json"))
        })
        .collect();
    number_duplicates(&mut paths, Some("json"));
    paths
}

/// Fail if two records would be written to the same path.
fn ensure_unique(out_dir: &Path, paths: &[&Path]) -> Result<()> {
    let mut seen = HashSet::new();
    for path in paths {
        if !seen.insert(*path) {
            return Err(output_error(
                &out_dir.join(path),
                std::io::Error::other("two records map to the same path"),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Make `out_dir` an empty directory.
///
/// A non-empty directory is only cleared when it holds a previous run's
/// summary; anything else is refused.
pub fn prepare_output_dir(out_dir: &Path) -> Result<()> {
    if out_dir.exists() {
        let non_empty = fs::read_dir(out_dir)
            .map_err(|source| output_error(out_dir, source))?
            .next()
            .is_some();
        if non_empty && !out_dir.join(SUMMARY_FILE).is_file() {
            return Err(output_error(
                out_dir,
                std::io::Error::other("directory is not empty and holds no previous graph output"),
            ));
        }
        fs::remove_dir_all(out_dir).map_err(|source| output_error(out_dir, source))?;
    }
    fs::create_dir_all(out_dir).map_err(|source| output_error(out_dir, source))
}

fn output_error(path: &Path, source: std::io::Error) -> GraphError {
    GraphError::Output {
        path: path.to_path_buf(),
        source,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| output_error(parent, source))?;
    }
    let mut bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| output_error(path, std::io::Error::other(e)))?;
    bytes.push(b'\n');
    fs::write(path, bytes).map_err(|source| output_error(path, source))
}

/// Counts of what [`emit`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitStats {
    pub definition_records: usize,
    pub file_records: usize,
}

/// Write every record of the linked project plus the project summary.
///
/// `out_dir` must already be prepared with [`prepare_output_dir`].
/// `collided` holds the Definitions flagged with a qualified-name collision.
pub fn emit(
    out_dir: &Path,
    files: &[ExtractedFile],
    linked: &LinkedProject,
    collided: &HashSet<DefinitionKey>,
    summary: &ProjectSummary,
) -> Result<EmitStats> {
    let dirs = file_dirs(files);
    let record_paths: Vec<Vec<PathBuf>> = files
        .iter()
        .zip(&dirs)
        .map(|(file, dir)| definition_paths(file, dir))
        .collect();
    let file_records: Vec<PathBuf> = dirs.iter().map(|dir| dir.join(FILE_RECORD)).collect();
    let all: Vec<&Path> = record_paths
        .iter()
        .flatten()
        .chain(&file_records)
        .map(PathBuf::as_path)
        .collect();
    ensure_unique(out_dir, &all)?;

    let written: Vec<usize> = files
        .par_iter()
        .enumerate()
        .map(|(file_idx, file)| -> Result<usize> {
            let paths = &record_paths[file_idx];

            for (def_idx, def) in file.definitions.iter().enumerate() {
                let key = DefinitionKey {
                    file: file_idx,
                    index: def_idx,
                };
                let record = definition_record(file, key, linked, collided.contains(&key));
                write_json(&out_dir.join(&paths[def_idx]), &record)?;
                debug!(qualified_name = def.qualified_name(), "wrote record");
            }

            let file_record = FileRecord {
                file_metadata: FileMetadata::new(file),
                file_definitions: file
                    .definitions
                    .iter()
                    .zip(paths)
                    .map(|(def, path)| DefinitionSummary {
                        name: &def.name,
                        qualified_name: def.qualified_name(),
                        kind: def.kind,
                        is_top_level: def.is_top_level(),
                        start_line: def.span.start_line,
                        end_line: def.span.end_line,
                        export_kind: def.export,
                        record: slash_path(path),
                    })
                    .collect(),
                imports: &file.imports,
                exports: &file.exports,
            };
            write_json(&out_dir.join(&file_records[file_idx]), &file_record)?;
            Ok(file.definitions.len())
        })
        .collect::<Result<_>>()?;

    write_json(&out_dir.join(SUMMARY_FILE), summary)?;

    let stats = EmitStats {
        definition_records: written.iter().sum(),
        file_records: written.len(),
    };
    info!(
        records = stats.definition_records,
        files = stats.file_records,
        out = %out_dir.display(),
        "graph written"
    );
    Ok(stats)
}

/// Build the record of one Definition.
pub fn definition_record<'a>(
    file: &'a ExtractedFile,
    key: DefinitionKey,
    linked: &'a LinkedProject,
    collision: bool,
) -> DefinitionRecord<'a> {
    let DefinitionKey {
        file: file_idx,
        index: def_idx,
    } = key;
    let def = &file.definitions[def_idx];
    let refs = &file.references[def_idx];
    let targets = linked.targets(file_idx, def_idx);

    DefinitionRecord {
        file_metadata: FileMetadata::new(file),
        definition_info: DefinitionInfo {
            name: &def.name,
            qualified_name: def.qualified_name(),
            kind: def.kind,
            scope_path: def.scope_path(),
            is_top_level: def.is_top_level(),
            start_line: def.span.start_line,
            end_line: def.span.end_line,
            code_text: &def.code_text,
            is_exported: def.is_exported(),
            export_kind: def.export,
            associated_comments: &def.comments,
            description: def.description.as_deref(),
            kind_details: &def.details,
            collision,
        },
        dependency_info: DependencyInfo {
            forward_references: refs
                .forward
                .iter()
                .zip(targets)
                .map(|(edge, target)| ForwardReference::new(edge, &file.file, target))
                .collect(),
            backward_references: linked.backward(file_idx, def_idx),
            used_imports: &refs.used_imports,
        },
    }
}
