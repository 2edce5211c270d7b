use std::sync::OnceLock;

use serde::Serialize;
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator, Tree};

use crate::language::Grammar;
use crate::parser::languages::language_for_grammar;
use crate::parser::{find_child_of_kind, has_child_token, line_of, node_text};
use crate::resolver::Resolution;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// How a module was imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStyle {
    /// `import { X } from './module'`
    Esm,
    /// `const X = require('./module')`, `import X = require('./module')`
    Require,
    /// `import('./module')`
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecifierKind {
    Default,
    Named,
    Namespace,
}

/// One binding introduced by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSpecifier {
    pub kind: SpecifierKind,
    /// Name on the exporting side: `default`, `*`, or the exported name.
    pub imported: String,
    /// Local binding name in this file.
    pub local: String,
}

impl ImportSpecifier {
    fn new(kind: SpecifierKind, imported: &str, local: &str) -> Self {
        Self {
            kind,
            imported: imported.to_owned(),
            local: local.to_owned(),
        }
    }
}

/// An import statement (or `require` / `import()` call) of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    /// Module specifier as written, e.g. `"react"` or `"./utils"`.
    pub source: String,
    pub resolution: Resolution,
    pub specifiers: Vec<ImportSpecifier>,
    pub style: ImportStyle,
    /// `import type { ... }`
    pub type_only: bool,
    pub line: usize,
}

impl ImportRecord {
    pub fn resolved_path(&self) -> Option<&str> {
        self.resolution.resolved_path()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportRecordKind {
    /// `export { a, b as c }`
    Named,
    /// `export default X`
    Default,
    /// `export { a } from './module'`, `export * as ns from './module'`
    ReExport,
    /// `export * from './module'`
    ReExportAll,
    /// `export function f() {}`, `export const a = 1`
    Declaration,
}

/// `local` as seen inside the module, `exported` as seen by importers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportName {
    pub local: String,
    pub exported: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub kind: ExportRecordKind,
    /// Empty for `export * from` and anonymous default exports.
    pub names: Vec<ExportName>,
    /// Source module for re-exports.
    pub source: Option<String>,
    pub resolution: Option<Resolution>,
    pub line: usize,
}

// ---------------------------------------------------------------------------
// Queries, compiled once per grammar
// ---------------------------------------------------------------------------

/// ESM static imports.
const IMPORT_QUERY: &str = r#"
    (import_statement) @import
"#;

/// Identifier calls with a string first argument. Predicates are not applied
/// by the streaming iterator, so `require` is filtered in code.
const REQUIRE_QUERY: &str = r#"
    (call_expression
      function: (identifier) @fn
      arguments: (arguments . (string (string_fragment) @module_path))) @call
"#;

const DYNAMIC_IMPORT_QUERY: &str = r#"
    (call_expression
      function: (import)
      arguments: (arguments . (string (string_fragment) @module_path))) @dynamic_import
"#;

const EXPORT_QUERY: &str = r#"
    (export_statement) @export_stmt
"#;

struct ModuleQueries {
    import: Query,
    require: Query,
    dynamic: Query,
    export: Query,
}

impl ModuleQueries {
    fn compile(grammar: Grammar) -> Self {
        let language = language_for_grammar(grammar);
        Self {
            import: Query::new(&language, IMPORT_QUERY).expect("invalid import query"),
            require: Query::new(&language, REQUIRE_QUERY).expect("invalid require query"),
            dynamic: Query::new(&language, DYNAMIC_IMPORT_QUERY)
                .expect("invalid dynamic import query"),
            export: Query::new(&language, EXPORT_QUERY).expect("invalid export query"),
        }
    }
}

static TS_QUERIES: OnceLock<ModuleQueries> = OnceLock::new();
static TSX_QUERIES: OnceLock<ModuleQueries> = OnceLock::new();
static JS_QUERIES: OnceLock<ModuleQueries> = OnceLock::new();

fn queries(grammar: Grammar) -> &'static ModuleQueries {
    let cell = match grammar {
        Grammar::TypeScript => &TS_QUERIES,
        Grammar::Tsx => &TSX_QUERIES,
        Grammar::JavaScript => &JS_QUERIES,
    };
    cell.get_or_init(|| ModuleQueries::compile(grammar))
}

// ---------------------------------------------------------------------------
// Helper utilities
// ---------------------------------------------------------------------------

/// Content of a `string` node without its quotes.
fn string_content(node: Node, source: &[u8]) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let text = node_text(node, source);
    let inner = text
        .strip_prefix(['"', '\''])
        .and_then(|t| t.strip_suffix(['"', '\'']))?;
    Some(inner.to_owned())
}

// ---------------------------------------------------------------------------
// Import extraction
// ---------------------------------------------------------------------------

/// Extract every import of a file, in source order.
///
/// `resolve` is the Module Path Resolver bound to the current file.
pub fn extract_imports(
    tree: &Tree,
    source: &[u8],
    grammar: Grammar,
    resolve: &impl Fn(&str) -> Resolution,
) -> Vec<ImportRecord> {
    let q = queries(grammar);
    let mut imports = Vec::new();

    // --- ESM static imports (and TS `import x = require(...)`) ---
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&q.import, tree.root_node(), source);
    while let Some(m) = matches.next() {
        for capture in m.captures {
            if let Some(record) = esm_import(capture.node, source, resolve) {
                imports.push(record);
            }
        }
    }

    // --- CommonJS require() ---
    let fn_idx = q.require.capture_index_for_name("fn");
    let path_idx = q.require.capture_index_for_name("module_path");
    let call_idx = q.require.capture_index_for_name("call");
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&q.require, tree.root_node(), source);
    while let Some(m) = matches.next() {
        let mut fn_name = None;
        let mut module_path = None;
        let mut call = None;
        for capture in m.captures {
            if Some(capture.index) == fn_idx {
                fn_name = Some(node_text(capture.node, source));
            } else if Some(capture.index) == path_idx {
                module_path = Some(node_text(capture.node, source));
            } else if Some(capture.index) == call_idx {
                call = Some(capture.node);
            }
        }
        if fn_name != Some("require") {
            continue;
        }
        if let (Some(path), Some(call)) = (module_path, call) {
            imports.push(ImportRecord {
                source: path.to_owned(),
                resolution: resolve(path),
                specifiers: require_bindings(call, source),
                style: ImportStyle::Require,
                type_only: false,
                line: line_of(call),
            });
        }
    }

    // --- Dynamic import() ---
    let path_idx = q.dynamic.capture_index_for_name("module_path");
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&q.dynamic, tree.root_node(), source);
    while let Some(m) = matches.next() {
        for capture in m.captures {
            if Some(capture.index) == path_idx {
                let path = node_text(capture.node, source);
                imports.push(ImportRecord {
                    source: path.to_owned(),
                    resolution: resolve(path),
                    specifiers: Vec::new(),
                    style: ImportStyle::Dynamic,
                    type_only: false,
                    line: line_of(capture.node),
                });
            }
        }
    }

    imports.sort_by_key(|r| r.line);
    imports
}

fn esm_import(
    node: Node,
    source: &[u8],
    resolve: &impl Fn(&str) -> Resolution,
) -> Option<ImportRecord> {
    let type_only = has_child_token(node, "type");

    // `import fs = require('fs')`
    if let Some(clause) = find_child_of_kind(node, "import_require_clause") {
        let local = find_child_of_kind(clause, "identifier").map(|n| node_text(n, source))?;
        let path = clause
            .child_by_field_name("source")
            .and_then(|s| string_content(s, source))?;
        return Some(ImportRecord {
            resolution: resolve(&path),
            source: path,
            specifiers: vec![ImportSpecifier::new(SpecifierKind::Namespace, "*", local)],
            style: ImportStyle::Require,
            type_only,
            line: line_of(node),
        });
    }

    let path = node
        .child_by_field_name("source")
        .and_then(|s| string_content(s, source))?;
    let specifiers = find_child_of_kind(node, "import_clause")
        .map(|clause| import_clause_specifiers(clause, source))
        .unwrap_or_default();

    Some(ImportRecord {
        resolution: resolve(&path),
        source: path,
        specifiers,
        style: ImportStyle::Esm,
        type_only,
        line: line_of(node),
    })
}

/// Specifiers of an `import_clause`:
///
/// - `import React from 'react'` -> default
/// - `import { a, b as c } from './m'` -> named
/// - `import * as ns from './m'` -> namespace
/// - `import React, { useState } from 'react'` -> both
fn import_clause_specifiers(clause: Node, source: &[u8]) -> Vec<ImportSpecifier> {
    let mut specifiers = Vec::new();
    let mut cursor = clause.walk();
    for child in clause.children(&mut cursor) {
        match child.kind() {
            "identifier" => {
                let local = node_text(child, source);
                specifiers.push(ImportSpecifier::new(SpecifierKind::Default, "default", local));
            }
            "namespace_import" => {
                if let Some(id) = find_child_of_kind(child, "identifier") {
                    let local = node_text(id, source);
                    specifiers.push(ImportSpecifier::new(SpecifierKind::Namespace, "*", local));
                }
            }
            "named_imports" => {
                let mut inner = child.walk();
                for spec in child.children(&mut inner) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    // `{ foo as bar }`: name = foo (exported), alias = bar (local).
                    let Some(name) = spec.child_by_field_name("name") else {
                        continue;
                    };
                    let imported = module_export_name(name, source);
                    let local = spec
                        .child_by_field_name("alias")
                        .map(|a| node_text(a, source).to_owned())
                        .unwrap_or_else(|| imported.clone());
                    specifiers.push(ImportSpecifier::new(SpecifierKind::Named, &imported, &local));
                }
            }
            _ => {}
        }
    }
    specifiers
}

/// Names in import/export clauses may be string literals (`{ "a-b" as ab }`).
fn module_export_name(node: Node, source: &[u8]) -> String {
    string_content(node, source).unwrap_or_else(|| node_text(node, source).to_owned())
}

/// Bindings of `require(...)` from its declarator:
///
/// - `const fs = require('fs')` -> namespace `fs`
/// - `const { readFile, join: j } = require('x')` -> named `readFile`, `join as j`
/// - bare `require('x')` -> none
fn require_bindings(call: Node, source: &[u8]) -> Vec<ImportSpecifier> {
    let Some(parent) = call.parent() else {
        return Vec::new();
    };
    if parent.kind() != "variable_declarator" {
        return Vec::new();
    }
    let Some(name) = parent.child_by_field_name("name") else {
        return Vec::new();
    };

    match name.kind() {
        "identifier" => vec![ImportSpecifier::new(
            SpecifierKind::Namespace,
            "*",
            node_text(name, source),
        )],
        "object_pattern" => {
            let mut specifiers = Vec::new();
            let mut cursor = name.walk();
            for prop in name.children(&mut cursor) {
                match prop.kind() {
                    "shorthand_property_identifier_pattern" => {
                        let n = node_text(prop, source);
                        specifiers.push(ImportSpecifier::new(SpecifierKind::Named, n, n));
                    }
                    "pair_pattern" => {
                        let key = prop.child_by_field_name("key").map(|k| node_text(k, source));
                        let value = prop
                            .child_by_field_name("value")
                            .filter(|v| v.kind() == "identifier")
                            .map(|v| node_text(v, source));
                        if let (Some(key), Some(value)) = (key, value) {
                            specifiers.push(ImportSpecifier::new(SpecifierKind::Named, key, value));
                        }
                    }
                    _ => {}
                }
            }
            specifiers
        }
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Export extraction
// ---------------------------------------------------------------------------

/// Extract every top-level export statement of a file, in source order.
pub fn extract_exports(
    tree: &Tree,
    source: &[u8],
    grammar: Grammar,
    resolve: &impl Fn(&str) -> Resolution,
) -> Vec<ExportRecord> {
    let q = queries(grammar);
    let mut exports = Vec::new();

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&q.export, tree.root_node(), source);
    while let Some(m) = matches.next() {
        for capture in m.captures {
            let node = capture.node;
            // Exports inside `declare module` / namespaces do not belong to this module.
            if node.parent().map(|p| p.kind()) != Some("program") {
                continue;
            }
            if let Some(record) = classify_export(node, source, resolve) {
                exports.push(record);
            }
        }
    }

    exports.sort_by_key(|r| r.line);
    exports
}

fn classify_export(
    node: Node,
    source: &[u8],
    resolve: &impl Fn(&str) -> Resolution,
) -> Option<ExportRecord> {
    let line = line_of(node);
    let from = node
        .child_by_field_name("source")
        .and_then(|s| string_content(s, source));
    let resolution = from.as_deref().map(resolve);

    let record = |kind, names| ExportRecord {
        kind,
        names,
        source: from.clone(),
        resolution: resolution.clone(),
        line,
    };

    // `export * as ns from './m'`
    if let Some(ns) = find_child_of_kind(node, "namespace_export") {
        let exported = find_child_of_kind(ns, "identifier")
            .or_else(|| find_child_of_kind(ns, "string"))
            .map(|n| module_export_name(n, source))?;
        let names = vec![ExportName {
            local: "*".to_owned(),
            exported,
        }];
        return Some(record(ExportRecordKind::ReExport, names));
    }

    // `export * from './m'`
    if has_child_token(node, "*") {
        return Some(record(ExportRecordKind::ReExportAll, Vec::new()));
    }

    if let Some(clause) = find_child_of_kind(node, "export_clause") {
        let names = export_clause_names(clause, source);
        let kind = if from.is_some() {
            ExportRecordKind::ReExport
        } else {
            ExportRecordKind::Named
        };
        return Some(record(kind, names));
    }

    if has_child_token(node, "default") {
        let local = node
            .child_by_field_name("declaration")
            .and_then(|d| d.child_by_field_name("name"))
            .or_else(|| {
                node.child_by_field_name("value")
                    .filter(|v| v.kind() == "identifier")
            })
            .map(|n| node_text(n, source).to_owned());
        let names = local
            .map(|local| {
                vec![ExportName {
                    local,
                    exported: "default".to_owned(),
                }]
            })
            .unwrap_or_default();
        return Some(record(ExportRecordKind::Default, names));
    }

    let declaration = node.child_by_field_name("declaration")?;
    let names = declared_names(declaration, source)
        .into_iter()
        .map(|name| ExportName {
            local: name.clone(),
            exported: name,
        })
        .collect();
    Some(record(ExportRecordKind::Declaration, names))
}

/// `{ a, b as c }` -> (a, a), (b, c)
fn export_clause_names(clause: Node, source: &[u8]) -> Vec<ExportName> {
    let mut names = Vec::new();
    let mut cursor = clause.walk();
    for spec in clause.children(&mut cursor) {
        if spec.kind() != "export_specifier" {
            continue;
        }
        let Some(name) = spec.child_by_field_name("name") else {
            continue;
        };
        let local = module_export_name(name, source);
        let exported = spec
            .child_by_field_name("alias")
            .map(|a| module_export_name(a, source))
            .unwrap_or_else(|| local.clone());
        names.push(ExportName { local, exported });
    }
    names
}

/// Names bound by an exported declaration. Types and interfaces are included:
/// they are exported names even though they never become Definitions.
fn declared_names(declaration: Node, source: &[u8]) -> Vec<String> {
    match declaration.kind() {
        "lexical_declaration" | "variable_declaration" => {
            let mut names = Vec::new();
            let mut cursor = declaration.walk();
            for declarator in declaration.children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                if let Some(name) = declarator
                    .child_by_field_name("name")
                    .filter(|n| n.kind() == "identifier")
                {
                    names.push(node_text(name, source).to_owned());
                }
            }
            names
        }
        _ => declaration
            .child_by_field_name("name")
            .map(|n| vec![node_text(n, source).to_owned()])
            .unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
