//! Global linking: joins every file's forward edges into one project graph
//! and derives the backward edge list of each Definition.
//!
//! Runs once, after every file has been extracted. Symbol resolution reads
//! only immutable per-file tables and is done in parallel; graph writes are
//! serial.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::graph::edge::{BackwardEdge, EdgeTarget, ForwardEdge};
use crate::graph::node::ExportKind;
use crate::graph::{DefinitionKey, GraphEdge, KnowledgeGraph};
use crate::parser::ExtractedFile;
use crate::parser::imports::{ExportRecordKind, SpecifierKind};
use crate::resolver::Resolution;

/// Maximum number of re-export hops followed for a single symbol.
const MAX_REEXPORT_DEPTH: usize = 8;

/// Where a forward edge landed after linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum LinkTarget {
    /// A specific Definition; it carries the mirror backward edge.
    #[serde(rename_all = "camelCase")]
    Definition { qualified_name: String, file: String },
    /// A project file, but no single Definition could be picked.
    #[serde(rename_all = "camelCase")]
    FileLevel { file: String },
    External,
    Unresolved,
}

impl LinkTarget {
    pub fn qualified_name(&self) -> Option<&str> {
        match self {
            Self::Definition { qualified_name, .. } => Some(qualified_name),
            _ => None,
        }
    }
}

/// Counts of forward edges by link outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStats {
    /// Cross-file edges attached to a specific Definition.
    pub linked: usize,
    pub same_file: usize,
    pub file_level: usize,
    pub external: usize,
    pub unresolved: usize,
}

impl LinkStats {
    pub fn total(&self) -> usize {
        self.linked + self.same_file + self.file_level + self.external + self.unresolved
    }
}

/// The fully linked project.
///
/// `targets[file][definition][edge]` is parallel to the forward edges of each
/// Definition; `backward[file][definition]` is sorted by source qualified
/// name, then line.
pub struct LinkedProject {
    pub graph: KnowledgeGraph,
    targets: Vec<Vec<Vec<LinkTarget>>>,
    backward: Vec<Vec<Vec<BackwardEdge>>>,
    pub stats: LinkStats,
}

impl LinkedProject {
    pub fn targets(&self, file: usize, definition: usize) -> &[LinkTarget] {
        self.targets
            .get(file)
            .and_then(|defs| defs.get(definition))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn backward(&self, file: usize, definition: usize) -> &[BackwardEdge] {
        self.backward
            .get(file)
            .and_then(|defs| defs.get(definition))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// How an exported name maps to something resolvable.
#[derive(Debug, Clone)]
enum ExportBinding {
    /// A name bound inside the exporting module.
    Local(String),
    /// `export { a as b } from './m'`: symbol `a` of another project file.
    Forward { path: String, symbol: String },
    /// `export * as ns from './m'` or a re-export that left the project.
    Opaque,
}

#[derive(Debug, Default)]
struct ExportTable {
    names: HashMap<String, ExportBinding>,
    /// Resolved paths of `export * from` sources, in source order.
    star_sources: Vec<String>,
}

impl ExportTable {
    fn build(file: &ExtractedFile) -> Self {
        let mut table = Self::default();
        for record in &file.exports {
            let resolved = record
                .resolution
                .as_ref()
                .and_then(Resolution::resolved_path)
                .map(str::to_owned);
            match record.kind {
                ExportRecordKind::ReExportAll => {
                    if let Some(path) = resolved {
                        table.star_sources.push(path);
                    }
                }
                ExportRecordKind::ReExport => {
                    for name in &record.names {
                        let binding = match &resolved {
                            Some(path) if name.local != "*" => ExportBinding::Forward {
                                path: path.clone(),
                                symbol: name.local.clone(),
                            },
                            _ => ExportBinding::Opaque,
                        };
                        table.names.entry(name.exported.clone()).or_insert(binding);
                    }
                }
                ExportRecordKind::Named | ExportRecordKind::Default | ExportRecordKind::Declaration => {
                    for name in &record.names {
                        table
                            .names
                            .entry(name.exported.clone())
                            .or_insert_with(|| ExportBinding::Local(name.local.clone()));
                    }
                }
            }
        }
        table
    }
}

/// Read-only view shared by the parallel resolution workers.
struct SymbolIndex<'a> {
    files: &'a [ExtractedFile],
    by_path: HashMap<&'a str, usize>,
    exports: Vec<ExportTable>,
}

impl<'a> SymbolIndex<'a> {
    fn new(files: &'a [ExtractedFile]) -> Self {
        let by_path = files
            .iter()
            .enumerate()
            .map(|(idx, f)| (f.file.path.as_str(), idx))
            .collect();
        let exports = files.par_iter().map(ExportTable::build).collect();
        Self {
            files,
            by_path,
            exports,
        }
    }

    fn link(&self, file: usize, edge: &ForwardEdge) -> (LinkTarget, Option<DefinitionKey>) {
        match &edge.target {
            EdgeTarget::Local {
                qualified_name,
                definition,
                ..
            } => {
                let key = DefinitionKey {
                    file,
                    index: *definition,
                };
                let target = LinkTarget::Definition {
                    qualified_name: qualified_name.clone(),
                    file: self.files[file].file.path.clone(),
                };
                (target, Some(key))
            }
            EdgeTarget::Module {
                resolution, symbol, ..
            } => match resolution {
                Resolution::External => (LinkTarget::External, None),
                Resolution::Unresolved => (LinkTarget::Unresolved, None),
                Resolution::Resolved(path) => {
                    let Some(&target_file) = self.by_path.get(path.as_str()) else {
                        // Non-source file, or a file that failed extraction.
                        return (LinkTarget::FileLevel { file: path.clone() }, None);
                    };
                    let mut visited = HashSet::new();
                    match self.lookup(target_file, symbol, 0, &mut visited) {
                        Some(key) => (self.definition_target(key), Some(key)),
                        None => (LinkTarget::FileLevel { file: path.clone() }, None),
                    }
                }
            },
        }
    }

    fn definition_target(&self, key: DefinitionKey) -> LinkTarget {
        let file = &self.files[key.file];
        LinkTarget::Definition {
            qualified_name: file.definitions[key.index].qualified_name().to_owned(),
            file: file.file.path.clone(),
        }
    }

    /// Find the Definition that `symbol` of `file` stands for.
    fn lookup(
        &self,
        file: usize,
        symbol: &str,
        depth: usize,
        visited: &mut HashSet<(usize, String)>,
    ) -> Option<DefinitionKey> {
        if symbol == "*" || depth > MAX_REEXPORT_DEPTH {
            return None;
        }
        if !visited.insert((file, symbol.to_owned())) {
            return None;
        }

        if let Some(binding) = self.exports[file].names.get(symbol) {
            if let Some(key) = self.follow(file, binding, depth, visited) {
                return Some(key);
            }
        }

        if symbol == "default" {
            return self.unique_default(file);
        }

        if let Some(index) = self.top_level(file, symbol) {
            return Some(DefinitionKey { file, index });
        }

        for source in &self.exports[file].star_sources {
            let Some(&next) = self.by_path.get(source.as_str()) else {
                continue;
            };
            if let Some(key) = self.lookup(next, symbol, depth + 1, visited) {
                return Some(key);
            }
        }
        None
    }

    fn follow(
        &self,
        file: usize,
        binding: &ExportBinding,
        depth: usize,
        visited: &mut HashSet<(usize, String)>,
    ) -> Option<DefinitionKey> {
        match binding {
            ExportBinding::Opaque => None,
            ExportBinding::Forward { path, symbol } => {
                let next = *self.by_path.get(path.as_str())?;
                self.lookup(next, symbol, depth + 1, visited)
            }
            ExportBinding::Local(local) => {
                if let Some(index) = self.top_level(file, local) {
                    return Some(DefinitionKey { file, index });
                }
                // `import { X } from './x'; export { X };`
                let (path, symbol) = self.import_binding(file, local)?;
                let next = *self.by_path.get(path)?;
                self.lookup(next, &symbol, depth + 1, visited)
            }
        }
    }

    fn top_level(&self, file: usize, name: &str) -> Option<usize> {
        self.files[file]
            .definitions
            .iter()
            .position(|d| d.is_top_level() && d.name == name)
    }

    /// The only top-level default-exported Definition of `file`, if exactly one exists.
    fn unique_default(&self, file: usize) -> Option<DefinitionKey> {
        let mut defaults = self.files[file]
            .definitions
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_top_level() && d.export == ExportKind::Default);
        match (defaults.next(), defaults.next()) {
            (Some((index, _)), None) => Some(DefinitionKey { file, index }),
            _ => None,
        }
    }

    /// Resolved path and imported symbol behind local import binding `local`.
    fn import_binding(&self, file: usize, local: &str) -> Option<(&str, String)> {
        self.files[file].imports.iter().find_map(|record| {
            let spec = record.specifiers.iter().find(|s| s.local == local)?;
            let path = record.resolved_path()?;
            let symbol = match spec.kind {
                SpecifierKind::Default => "default".to_owned(),
                SpecifierKind::Named => spec.imported.clone(),
                SpecifierKind::Namespace => "*".to_owned(),
            };
            Some((path, symbol))
        })
    }
}

/// Link every extracted file into a [`LinkedProject`].
///
/// Deterministic: the same input always yields identical targets and
/// identical, identically ordered backward edge lists.
pub fn link(files: &[ExtractedFile]) -> LinkedProject {
    let index = SymbolIndex::new(files);

    let mut graph = KnowledgeGraph::new();
    for (file_idx, file) in files.iter().enumerate() {
        for def_idx in 0..file.definitions.len() {
            graph.add_definition(DefinitionKey {
                file: file_idx,
                index: def_idx,
            });
        }
    }

    // Parallel read-only resolution.
    let resolved: Vec<Vec<Vec<(LinkTarget, Option<DefinitionKey>)>>> = files
        .par_iter()
        .enumerate()
        .map(|(file_idx, file)| {
            file.references
                .iter()
                .map(|refs| {
                    refs.forward
                        .iter()
                        .map(|edge| index.link(file_idx, edge))
                        .collect()
                })
                .collect()
        })
        .collect();

    // Serial graph writes.
    let mut stats = LinkStats::default();
    let mut targets = Vec::with_capacity(files.len());
    for (file_idx, per_file) in resolved.into_iter().enumerate() {
        let mut file_targets = Vec::with_capacity(per_file.len());
        for (def_idx, per_def) in per_file.into_iter().enumerate() {
            let source = DefinitionKey {
                file: file_idx,
                index: def_idx,
            };
            let edges = &files[file_idx].references[def_idx].forward;
            let mut def_targets = Vec::with_capacity(per_def.len());
            for ((target, key), edge) in per_def.into_iter().zip(edges) {
                match (&target, key) {
                    (_, Some(key)) => {
                        let weight = GraphEdge {
                            kind: edge.kind,
                            line: edge.line,
                        };
                        if graph.add_dependency(source, key, weight) {
                            if key.file == file_idx {
                                stats.same_file += 1;
                            } else {
                                stats.linked += 1;
                            }
                        }
                    }
                    (LinkTarget::FileLevel { .. }, None) => stats.file_level += 1,
                    (LinkTarget::External, None) => stats.external += 1,
                    (LinkTarget::Unresolved, None) => stats.unresolved += 1,
                    (LinkTarget::Definition { .. }, None) => {}
                }
                def_targets.push(target);
            }
            file_targets.push(def_targets);
        }
        targets.push(file_targets);
    }

    let backward = files
        .iter()
        .enumerate()
        .map(|(file_idx, file)| {
            (0..file.definitions.len())
                .map(|def_idx| {
                    backward_edges(
                        &graph,
                        files,
                        DefinitionKey {
                            file: file_idx,
                            index: def_idx,
                        },
                    )
                })
                .collect()
        })
        .collect();

    debug!(
        definitions = graph.definition_count(),
        edges = graph.edge_count(),
        linked = stats.linked,
        file_level = stats.file_level,
        "linked project graph"
    );

    LinkedProject {
        graph,
        targets,
        backward,
        stats,
    }
}

fn backward_edges(graph: &KnowledgeGraph, files: &[ExtractedFile], target: DefinitionKey) -> Vec<BackwardEdge> {
    let mut edges: Vec<BackwardEdge> = graph
        .dependents(target)
        .into_iter()
        .map(|(source, weight)| {
            let file = &files[source.file];
            BackwardEdge {
                source_qualified_name: file.definitions[source.index].qualified_name().to_owned(),
                source_file: file.file.path.clone(),
                line: weight.line,
                kind: weight.kind,
            }
        })
        .collect();
    edges.sort();
    edges.dedup();
    edges
}
