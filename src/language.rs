use std::path::Path;

use serde::Serialize;

/// Source extensions that are discovered and parsed.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Which tree-sitter grammar a file is parsed with.
///
/// Uses a plain enum (not trait objects): cheap to copy and pattern-matched at
/// dispatch boundaries (parser selection, per-grammar query caches).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    TypeScript,
    Tsx,
    JavaScript,
}

/// The syntax dialect of a source file.
///
/// - `typed`: type annotations are allowed (`.ts`, `.tsx`, `.mts`, `.cts`)
/// - `markup`: JSX markup is allowed (`.tsx` and every JavaScript extension,
///   since the JavaScript grammar always accepts JSX)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dialect {
    pub typed: bool,
    pub markup: bool,
}

impl Dialect {
    /// Dialect for a file extension (without the dot), or `None` if unsupported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "ts" | "mts" | "cts" => Some(Self {
                typed: true,
                markup: false,
            }),
            "tsx" => Some(Self {
                typed: true,
                markup: true,
            }),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self {
                typed: false,
                markup: true,
            }),
            _ => None,
        }
    }

    /// Dialect for a path, based on its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// The grammar used to parse this dialect.
    ///
    /// The TypeScript grammar cannot parse JSX and the TSX grammar breaks
    /// angle-bracket type assertions (`<T>expr`), so the two must not be mixed.
    pub fn grammar(self) -> Grammar {
        match (self.typed, self.markup) {
            (true, true) => Grammar::Tsx,
            (true, false) => Grammar::TypeScript,
            (false, _) => Grammar::JavaScript,
        }
    }

    /// Short human-readable label, used in the run summary.
    pub fn label(self) -> &'static str {
        match self.grammar() {
            Grammar::TypeScript => "typescript",
            Grammar::Tsx => "tsx",
            Grammar::JavaScript => "javascript",
        }
    }
}

/// Returns true if `ext` is one of the parsed source extensions.
pub fn is_source_extension(ext: &str) -> bool {
    SOURCE_EXTENSIONS.contains(&ext)
}
