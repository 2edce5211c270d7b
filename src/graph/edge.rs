use serde::Serialize;

use crate::resolver::Resolution;

/// The kind of a dependency edge between Definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// The Definition references an imported binding.
    Import,
    /// The Definition calls the target.
    FunctionCall,
    /// The Definition renders the target as a markup element.
    MarkupElement,
}

impl EdgeKind {
    /// Priority when one symbol is used in several ways by the same Definition:
    /// markup beats call beats plain reference.
    pub fn priority(self) -> u8 {
        match self {
            Self::Import => 0,
            Self::FunctionCall => 1,
            Self::MarkupElement => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::FunctionCall => "function_call",
            Self::MarkupElement => "markup_element",
        }
    }
}

/// What a forward edge points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeTarget {
    /// A symbol of another module, reached through an import binding.
    Module {
        /// The import source string as written.
        source: String,
        resolution: Resolution,
        /// `default`, `*`, or the imported (or namespace member) name.
        symbol: String,
    },
    /// A Definition in the same file.
    Local {
        symbol: String,
        qualified_name: String,
        /// Index of the target in the file's Definition list.
        definition: usize,
    },
}

impl EdgeTarget {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Module { symbol, .. } | Self::Local { symbol, .. } => symbol,
        }
    }

    /// The import source, or the qualified name of a same-file target.
    pub fn identity(&self) -> &str {
        match self {
            Self::Module { source, .. } => source,
            Self::Local { qualified_name, .. } => qualified_name,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::Module {
                resolution: Resolution::External,
                ..
            }
        )
    }

    pub fn resolved_path(&self) -> Option<&str> {
        match self {
            Self::Module { resolution, .. } => resolution.resolved_path(),
            Self::Local { .. } => None,
        }
    }
}

/// A dependency observed inside a Definition's body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardEdge {
    /// Index of the owning Definition in its file's Definition list.
    pub from: usize,
    /// Qualified name of the owning Definition.
    pub from_qualified_name: String,
    pub kind: EdgeKind,
    pub target: EdgeTarget,
    /// 1-based line of the usage that produced this edge.
    pub line: usize,
}

/// Mirror of a [`ForwardEdge`], attached to the target Definition by the
/// global linker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackwardEdge {
    /// Qualified name of the Definition that uses the target.
    pub source_qualified_name: String,
    /// File of the using Definition.
    pub source_file: String,
    pub line: usize,
    pub kind: EdgeKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_kind_priority_order() {
        assert!(EdgeKind::MarkupElement.priority() > EdgeKind::FunctionCall.priority());
        assert!(EdgeKind::FunctionCall.priority() > EdgeKind::Import.priority());
    }

    #[test]
    fn test_external_target_flag() {
        let target = EdgeTarget::Module {
            source: "react".into(),
            resolution: Resolution::External,
            symbol: "useState".into(),
        };
        assert!(target.is_external());
        assert_eq!(target.resolved_path(), None);

        let unresolved = EdgeTarget::Module {
            source: "@/missing".into(),
            resolution: Resolution::Unresolved,
            symbol: "default".into(),
        };
        assert!(!unresolved.is_external());
        assert_eq!(unresolved.identity(), "@/missing");
    }
}
