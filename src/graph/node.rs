use std::path::PathBuf;

use serde::Serialize;

use crate::language::Dialect;
use crate::parser::scope::qualified_name;

/// The kind of a Definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    /// A capitalized function or class whose body contains markup.
    Component,
    /// A function declaration or identifier-bound function expression.
    Function,
    /// A class declaration or identifier-bound class expression.
    Class,
    /// An exported variable that is not a function or class.
    Variable,
}

impl DefinitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Function => "function",
            Self::Class => "class",
            Self::Variable => "variable",
        }
    }
}

/// How a Definition is exported from its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    #[default]
    None,
    Default,
    Named,
}

/// Inclusive 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
}

impl Span {
    pub fn contains(&self, other: &Span) -> bool {
        other.start_line >= self.start_line && other.end_line <= self.end_line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
    /// `// ...`
    Line,
    /// `/* ... */`
    Block,
    /// `/** ... */`
    Doc,
}

/// A raw comment from a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "type")]
    pub kind: CommentKind,
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl Comment {
    pub fn span(&self) -> Span {
        Span {
            start_line: self.start_line,
            end_line: self.end_line,
        }
    }
}

/// Where a comment sits relative to the Definition it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentPlacement {
    Inside,
    Leading,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatedComment {
    pub placement: CommentPlacement,
    #[serde(flatten)]
    pub comment: Comment,
}

/// A parsed source file. Created once per discovered file, immutable afterwards.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Project-relative path with `/` separators. Doubles as the file id in
    /// qualified names.
    pub path: String,
    /// Absolute path on disk.
    pub abs_path: PathBuf,
    /// Extension without the dot.
    pub extension: String,
    pub dialect: Dialect,
    pub lines: Vec<String>,
    pub comments: Vec<Comment>,
}

impl SourceFile {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Verbatim source text for the inclusive line range of `span`.
    pub fn slice(&self, span: Span) -> String {
        slice_lines(&self.lines, span)
    }

    /// The file name without its extension, e.g. `Button` for `src/Button.tsx`.
    pub fn stem(&self) -> &str {
        let file_name = self.path.rsplit('/').next().unwrap_or(&self.path);
        match file_name.rfind('.') {
            Some(idx) if idx > 0 => &file_name[..idx],
            _ => file_name,
        }
    }

    /// The directory part of the project-relative path (empty at the root).
    pub fn dir(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }
}

/// Join the lines of the inclusive 1-based range `span`.
pub fn slice_lines(lines: &[String], span: Span) -> String {
    let start = span.start_line.saturating_sub(1).min(lines.len());
    let end = span.end_line.min(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n")
}

/// Shape of a single function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamShape {
    /// Binding name for simple parameters; `None` for destructuring patterns.
    pub name: Option<String>,
    /// `identifier`, `object`, `array` or `other`.
    pub pattern: String,
    pub has_default: bool,
    pub is_rest: bool,
    pub is_optional: bool,
    pub type_annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDetails {
    pub params: Vec<ParamShape>,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_arrow: bool,
    pub returns_markup: bool,
    /// Callee wrapping the function, e.g. `memo` in `memo(() => ...)`.
    pub wrapped_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodInfo {
    pub name: String,
    /// `method`, `getter`, `setter` or `constructor`.
    pub kind: String,
    pub is_static: bool,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetails {
    pub superclass: Option<String>,
    pub implements: Vec<String>,
    pub methods: Vec<MethodInfo>,
    pub properties: Vec<String>,
    pub returns_markup: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDetails {
    /// `const`, `let` or `var`.
    pub declaration_kind: String,
    /// Syntax kind of the initializer, e.g. `object`, `call_expression`.
    pub value_kind: Option<String>,
    pub type_annotation: Option<String>,
}

/// Kind-specific payload of a Definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KindDetails {
    Function(FunctionDetails),
    Class(ClassDetails),
    Variable(VariableDetails),
}

/// Everything the extractor knows about a Definition before its identity is
/// derived.
#[derive(Debug, Clone)]
pub struct DefinitionParts {
    pub name: String,
    pub kind: DefinitionKind,
    pub span: Span,
    pub code_text: String,
    pub export: ExportKind,
    pub comments: Vec<AssociatedComment>,
    pub description: Option<String>,
    pub details: KindDetails,
}

/// The unit of the knowledge graph.
///
/// Identity (`qualified_name`, `scope_path`) is derived once in [`Definition::new`]
/// and only readable afterwards.
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    qualified_name: String,
    scope_path: Option<String>,
    pub kind: DefinitionKind,
    pub span: Span,
    pub code_text: String,
    pub export: ExportKind,
    pub comments: Vec<AssociatedComment>,
    pub description: Option<String>,
    pub details: KindDetails,
}

impl Definition {
    pub fn new(file_id: &str, scope_path: Option<String>, parts: DefinitionParts) -> Self {
        let qualified_name = qualified_name(file_id, scope_path.as_deref(), &parts.name);
        Self {
            name: parts.name,
            qualified_name,
            scope_path,
            kind: parts.kind,
            span: parts.span,
            code_text: parts.code_text,
            export: parts.export,
            comments: parts.comments,
            description: parts.description,
            details: parts.details,
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn scope_path(&self) -> Option<&str> {
        self.scope_path.as_deref()
    }

    pub fn is_top_level(&self) -> bool {
        self.scope_path.is_none()
    }

    pub fn is_exported(&self) -> bool {
        self.export != ExportKind::None
    }

    /// Scope chain this Definition opens for its own children: its scope path
    /// segments followed by its own name.
    pub fn inner_scope(&self) -> Vec<&str> {
        let mut chain: Vec<&str> = self
            .scope_path
            .as_deref()
            .map(|p| p.split('.').collect())
            .unwrap_or_default();
        chain.push(&self.name);
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(name: &str) -> DefinitionParts {
        DefinitionParts {
            name: name.to_owned(),
            kind: DefinitionKind::Function,
            span: Span {
                start_line: 1,
                end_line: 3,
            },
            code_text: String::new(),
            export: ExportKind::None,
            comments: Vec::new(),
            description: None,
            details: KindDetails::Function(FunctionDetails::default()),
        }
    }

    #[test]
    fn test_top_level_definition_identity() {
        let def = Definition::new("src/util.ts", None, parts("format"));
        assert_eq!(def.qualified_name(), "src/util.ts::format");
        assert!(def.is_top_level());
        assert_eq!(def.inner_scope(), vec!["format"]);
    }

    #[test]
    fn test_nested_definition_identity() {
        let def = Definition::new("src/App.tsx", Some("App.useThing".into()), parts("inner"));
        assert_eq!(def.qualified_name(), "src/App.tsx::App.useThing.inner");
        assert!(!def.is_top_level());
        assert_eq!(def.inner_scope(), vec!["App", "useThing", "inner"]);
    }

    #[test]
    fn test_source_file_slice_and_stem() {
        let file = SourceFile {
            path: "src/components/Button.tsx".into(),
            abs_path: PathBuf::from("/p/src/components/Button.tsx"),
            extension: "tsx".into(),
            dialect: Dialect::from_extension("tsx").unwrap(),
            lines: vec!["a".into(), "b".into(), "c".into()],
            comments: Vec::new(),
        };
        assert_eq!(
            file.slice(Span {
                start_line: 2,
                end_line: 3
            }),
            "b\nc"
        );
        assert_eq!(file.stem(), "Button");
        assert_eq!(file.dir(), "src/components");
    }
}
