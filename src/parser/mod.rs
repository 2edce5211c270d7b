pub mod comments;
pub mod definitions;
pub mod imports;
pub mod languages;
pub mod references;
pub mod scope;

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Tree};

use crate::error::GraphError;
use crate::graph::node::{Definition, SourceFile};
use crate::language::{Dialect, Grammar};
use crate::resolver::ModuleResolver;

use comments::collect_comments;
use definitions::{WalkContext, extract_definitions};
use imports::{ExportRecord, ImportRecord, extract_exports, extract_imports};
use languages::language_for_grammar;
use references::{DefinitionReferences, build_references};

// Thread-local Parser instances: one per rayon worker thread, zero lock contention.
thread_local! {
    static PARSER_TS: RefCell<Parser> = RefCell::new(new_parser(Grammar::TypeScript));
    static PARSER_TSX: RefCell<Parser> = RefCell::new(new_parser(Grammar::Tsx));
    static PARSER_JS: RefCell<Parser> = RefCell::new(new_parser(Grammar::JavaScript));
}

fn new_parser(grammar: Grammar) -> Parser {
    let mut parser = Parser::new();
    parser
        .set_language(&language_for_grammar(grammar))
        .expect("bundled grammar is ABI-compatible");
    parser
}

/// Parse `source` with the thread-local parser for `grammar`.
pub fn parse_source(grammar: Grammar, source: &[u8]) -> Option<Tree> {
    let cell = match grammar {
        Grammar::TypeScript => &PARSER_TS,
        Grammar::Tsx => &PARSER_TSX,
        Grammar::JavaScript => &PARSER_JS,
    };
    cell.with(|p| p.borrow_mut().parse(source, None))
}

/// Knobs of single-file extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Max blank lines between a leading comment and its Definition.
    pub comment_window: usize,
    /// Treat any syntax error as a parse failure.
    pub strict_syntax: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            comment_window: 2,
            strict_syntax: true,
        }
    }
}

/// Everything extracted from one source file before global linking.
///
/// `references` is parallel to `definitions`. The syntax tree is not retained.
#[derive(Debug)]
pub struct ExtractedFile {
    pub file: SourceFile,
    pub definitions: Vec<Definition>,
    pub references: Vec<DefinitionReferences>,
    pub imports: Vec<ImportRecord>,
    pub exports: Vec<ExportRecord>,
}

/// Extract a single file: structure, scopes, imports/exports and forward
/// references.
///
/// `rel_path` is the project-relative path with `/` separators and doubles as
/// the file id.
///
/// # Errors
/// - [`GraphError::ParseFailure`] for unsupported extensions, non-UTF-8
///   content, or (with `strict_syntax`) a tree containing syntax errors
/// - [`GraphError::ScopeImbalance`] when the walk leaves the scope stack
///   unbalanced
pub fn extract_file(
    rel_path: &str,
    abs_path: PathBuf,
    bytes: Vec<u8>,
    resolver: &ModuleResolver,
    options: &ExtractOptions,
) -> Result<ExtractedFile, GraphError> {
    let extension = Path::new(rel_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_owned();
    let dialect = Dialect::from_extension(&extension).ok_or_else(|| {
        GraphError::parse_failure(rel_path, format!("unsupported extension {extension:?}"))
    })?;
    let text = String::from_utf8(bytes)
        .map_err(|e| GraphError::parse_failure(rel_path, format!("content is not valid UTF-8: {e}")))?;
    let source = text.as_bytes();

    let grammar = dialect.grammar();
    let tree = parse_source(grammar, source)
        .ok_or_else(|| GraphError::parse_failure(rel_path, "parser returned no tree"))?;

    let root = tree.root_node();
    if root.has_error() {
        let location = first_error(root)
            .map(|n| {
                let pos = n.start_position();
                format!("syntax error at {}:{}", pos.row + 1, pos.column + 1)
            })
            .unwrap_or_else(|| "syntax error".to_owned());
        if options.strict_syntax {
            return Err(GraphError::parse_failure(rel_path, location));
        }
        warn!(path = rel_path, %location, "continuing past recoverable syntax error");
    }

    let lines: Vec<String> = text.lines().map(str::to_owned).collect();
    let comments = collect_comments(&tree, source);

    let resolve = |specifier: &str| resolver.resolve(specifier, rel_path);
    let imports = extract_imports(&tree, source, grammar, &resolve);
    let exports = extract_exports(&tree, source, grammar, &resolve);

    let ctx = WalkContext {
        file_id: rel_path,
        source,
        lines: &lines,
        comments: &comments,
        comment_window: options.comment_window,
        exports: &exports,
    };
    let walked = extract_definitions(&tree, &ctx)?;
    let references = build_references(&walked.definitions, &walked.usages, &imports);

    debug!(
        path = rel_path,
        definitions = walked.definitions.len(),
        imports = imports.len(),
        exports = exports.len(),
        "extracted"
    );

    Ok(ExtractedFile {
        file: SourceFile {
            path: rel_path.to_owned(),
            abs_path,
            extension,
            dialect,
            lines,
            comments,
        },
        definitions: walked.definitions,
        references,
        imports,
        exports,
    })
}

/// First ERROR or MISSING node in document order.
fn first_error(root: Node) -> Option<Node> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

// ---------------------------------------------------------------------------
// Syntax helpers shared by the extractors
// ---------------------------------------------------------------------------

pub(crate) fn node_text<'s>(node: Node, source: &'s [u8]) -> &'s str {
    node.utf8_text(source).unwrap_or("")
}

/// 1-based start line of `node`.
pub(crate) fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

pub(crate) fn find_child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}

/// True when a direct child has kind `token` (keywords such as `default`,
/// `async`, `static` are anonymous nodes named after their text).
pub(crate) fn has_child_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::DefinitionKind;
    use crate::resolver::AliasTable;
    use std::fs;

    fn resolver_for(dir: &tempfile::TempDir) -> ModuleResolver {
        ModuleResolver::new(dir.path(), AliasTable::default())
    }

    fn extract(dir: &tempfile::TempDir, rel: &str, src: &str, options: ExtractOptions) -> Result<ExtractedFile, GraphError> {
        extract_file(
            rel,
            dir.path().join(rel),
            src.as_bytes().to_vec(),
            &resolver_for(dir),
            &options,
        )
    }

    #[test]
    fn test_extract_resolves_relative_imports() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/Button.tsx"), "export default function Button() {}").unwrap();

        let src = "import Button from './Button';\nexport const App = () => <Button />;\n";
        let file = extract(&dir, "src/App.tsx", src, ExtractOptions::default()).unwrap();
        assert_eq!(file.file.line_count(), 2);
        assert_eq!(file.imports[0].resolved_path(), Some("src/Button.tsx"));
        assert_eq!(file.definitions[0].kind, DefinitionKind::Component);
        assert_eq!(file.references[0].forward.len(), 1);
    }

    #[test]
    fn test_syntax_error_strict_and_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let src = "export function ok() {}\nfunction broken( {\n";
        let err = extract(&dir, "src/bad.ts", src, ExtractOptions::default()).unwrap_err();
        match err {
            GraphError::ParseFailure { path, message } => {
                assert_eq!(path, "src/bad.ts");
                assert!(message.starts_with("syntax error"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let lenient = ExtractOptions {
            strict_syntax: false,
            ..ExtractOptions::default()
        };
        assert!(extract(&dir, "src/bad.ts", src, lenient).is_ok());
    }

    #[test]
    fn test_unsupported_and_non_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract(&dir, "README.md", "# hi", ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, GraphError::ParseFailure { .. }));

        let err = extract_file(
            "src/a.ts",
            dir.path().join("src/a.ts"),
            vec![0xff, 0xfe, 0x00],
            &resolver_for(&dir),
            &ExtractOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_typed_markup_grammars_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        // Angle-bracket assertions only parse with the TypeScript grammar.
        let ts = "export const n = <number>value;\n";
        assert!(extract(&dir, "src/a.ts", ts, ExtractOptions::default()).is_ok());
        let jsx = "export const App = () => <div />;\n";
        assert!(extract(&dir, "src/a.js", jsx, ExtractOptions::default()).is_ok());
    }
}
