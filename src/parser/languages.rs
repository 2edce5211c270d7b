use tree_sitter::Language;

use crate::language::Grammar;

/// Return the tree-sitter [`Language`] for a grammar.
///
/// - [`Grammar::TypeScript`] -> `LANGUAGE_TYPESCRIPT`
/// - [`Grammar::Tsx`]        -> `LANGUAGE_TSX`
/// - [`Grammar::JavaScript`] -> `tree_sitter_javascript::LANGUAGE` (accepts JSX)
pub fn language_for_grammar(grammar: Grammar) -> Language {
    match grammar {
        Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Grammar::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        Grammar::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
    }
}
