//! Forward-reference building: turns the usages of each Definition into
//! de-duplicated forward edges.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::graph::edge::{EdgeKind, EdgeTarget, ForwardEdge};
use crate::graph::node::Definition;
use crate::parser::definitions::{Usage, UsageKind};
use crate::parser::imports::{ImportRecord, ImportSpecifier, SpecifierKind};

/// Forward side of one Definition's dependency info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionReferences {
    #[serde(skip)]
    pub forward: Vec<ForwardEdge>,
    /// Local import bindings referenced by the Definition, sorted.
    pub used_imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EdgeKey {
    Module { source: String, symbol: String },
    Local(usize),
}

fn edge_kind(usage: UsageKind) -> EdgeKind {
    match usage {
        UsageKind::Markup => EdgeKind::MarkupElement,
        UsageKind::Call => EdgeKind::FunctionCall,
        UsageKind::Reference => EdgeKind::Import,
    }
}

/// Build forward edges for every Definition of a file.
///
/// `usages[i]` belongs to `definitions[i]`. The result is parallel to
/// `definitions`.
pub fn build_references(
    definitions: &[Definition],
    usages: &[Vec<Usage>],
    imports: &[ImportRecord],
) -> Vec<DefinitionReferences> {
    let mut bindings: HashMap<&str, (&ImportRecord, &ImportSpecifier)> = HashMap::new();
    for record in imports {
        for specifier in &record.specifiers {
            bindings
                .entry(specifier.local.as_str())
                .or_insert((record, specifier));
        }
    }

    definitions
        .iter()
        .enumerate()
        .map(|(index, def)| {
            let def_usages = usages.get(index).map(Vec::as_slice).unwrap_or(&[]);
            references_for(index, def, def_usages, definitions, &bindings)
        })
        .collect()
}

fn references_for(
    index: usize,
    def: &Definition,
    usages: &[Usage],
    definitions: &[Definition],
    bindings: &HashMap<&str, (&ImportRecord, &ImportSpecifier)>,
) -> DefinitionReferences {
    // key -> (kind, first line of that kind, target)
    let mut edges: HashMap<EdgeKey, (EdgeKind, usize, EdgeTarget)> = HashMap::new();
    let mut used_imports = BTreeSet::new();

    let mut add = |key: EdgeKey, kind: EdgeKind, line: usize, target: EdgeTarget| {
        match edges.get_mut(&key) {
            Some(existing) if kind.priority() > existing.0.priority() => {
                *existing = (kind, line, target);
            }
            Some(existing) if kind == existing.0 => {
                existing.1 = existing.1.min(line);
            }
            Some(_) => {}
            None => {
                edges.insert(key, (kind, line, target));
            }
        }
    };

    for usage in usages {
        let kind = edge_kind(usage.kind);

        if usage.kind != UsageKind::Reference && usage.member.is_none() {
            if let Some(target) = visible_definition(def, &usage.name, definitions) {
                if target != index {
                    let target_def = &definitions[target];
                    add(
                        EdgeKey::Local(target),
                        kind,
                        usage.line,
                        EdgeTarget::Local {
                            symbol: usage.name.clone(),
                            qualified_name: target_def.qualified_name().to_owned(),
                            definition: target,
                        },
                    );
                }
                continue;
            }
        }

        let Some((record, specifier)) = bindings.get(usage.name.as_str()) else {
            continue;
        };
        used_imports.insert(usage.name.clone());
        let symbol = match specifier.kind {
            SpecifierKind::Default => "default".to_owned(),
            SpecifierKind::Named => specifier.imported.clone(),
            SpecifierKind::Namespace => usage.member.clone().unwrap_or_else(|| "*".to_owned()),
        };
        add(
            EdgeKey::Module {
                source: record.source.clone(),
                symbol: symbol.clone(),
            },
            kind,
            usage.line,
            EdgeTarget::Module {
                source: record.source.clone(),
                resolution: record.resolution.clone(),
                symbol,
            },
        );
    }

    let mut forward: Vec<ForwardEdge> = edges
        .into_values()
        .map(|(kind, line, target)| ForwardEdge {
            from: index,
            from_qualified_name: def.qualified_name().to_owned(),
            kind,
            target,
            line,
        })
        .collect();
    forward.sort_by(|a, b| {
        (a.line, a.kind, a.target.symbol(), a.target.identity()).cmp(&(
            b.line,
            b.kind,
            b.target.symbol(),
            b.target.identity(),
        ))
    });

    DefinitionReferences {
        forward,
        used_imports: used_imports.into_iter().collect(),
    }
}

/// The same-file Definition named `name` that is lexically visible from
/// inside `from`: its enclosing scope must be an ancestor of (or equal to)
/// the scope `from` opens. The deepest one wins; the first on ties.
fn visible_definition(from: &Definition, name: &str, definitions: &[Definition]) -> Option<usize> {
    let chain = from.inner_scope();
    let mut best: Option<(usize, usize)> = None;
    for (index, candidate) in definitions.iter().enumerate() {
        if candidate.name != name {
            continue;
        }
        let scope: Vec<&str> = candidate
            .scope_path()
            .map(|p| p.split('.').collect())
            .unwrap_or_default();
        if scope.len() > chain.len() || scope[..] != chain[..scope.len()] {
            continue;
        }
        if best.is_none_or(|(_, depth)| scope.len() > depth) {
            best = Some((index, scope.len()));
        }
    }
    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Grammar;
    use crate::parser::comments::collect_comments;
    use crate::parser::definitions::{WalkContext, extract_definitions};
    use crate::parser::imports::{extract_exports, extract_imports};
    use crate::parser::parse_source;
    use crate::resolver::Resolution;

    fn fake_resolve(spec: &str) -> Resolution {
        match spec {
            s if s.starts_with("./") => Resolution::Resolved(format!("src/{}.tsx", &s[2..])),
            s if s.starts_with("@/") => Resolution::Unresolved,
            _ => Resolution::External,
        }
    }

    fn build(src: &str) -> (Vec<Definition>, Vec<DefinitionReferences>) {
        let grammar = Grammar::Tsx;
        let tree = parse_source(grammar, src.as_bytes()).unwrap();
        let lines: Vec<String> = src.lines().map(String::from).collect();
        let comments = collect_comments(&tree, src.as_bytes());
        let imports = extract_imports(&tree, src.as_bytes(), grammar, &fake_resolve);
        let exports = extract_exports(&tree, src.as_bytes(), grammar, &fake_resolve);
        let ctx = WalkContext {
            file_id: "src/b.tsx",
            source: src.as_bytes(),
            lines: &lines,
            comments: &comments,
            comment_window: 2,
            exports: &exports,
        };
        let out = extract_definitions(&tree, &ctx).unwrap();
        let refs = build_references(&out.definitions, &out.usages, &imports);
        (out.definitions, refs)
    }

    fn summary(refs: &DefinitionReferences) -> Vec<(EdgeKind, String)> {
        refs.forward
            .iter()
            .map(|e| (e.kind, e.target.symbol().to_owned()))
            .collect()
    }

    #[test]
    fn test_default_import_markup_edge() {
        let src = "import Foo from './a';\nexport function Page() {\n  return <Foo />;\n}\n";
        let (_, refs) = build(src);
        assert_eq!(refs[0].forward.len(), 1);
        let edge = &refs[0].forward[0];
        assert_eq!(edge.kind, EdgeKind::MarkupElement);
        assert_eq!(edge.line, 3);
        assert_eq!(edge.from_qualified_name, "src/b.tsx::Page");
        assert_eq!(edge.target.resolved_path(), Some("src/a.tsx"));
        assert_eq!(edge.target.symbol(), "default");
        assert_eq!(refs[0].used_imports, vec!["Foo"]);
    }

    #[test]
    fn test_same_line_default_imports_are_ordered_by_source() {
        let src = "import D from './d';\nimport B from './b';\nimport A from './a';\nimport C from './c';\nexport function Page() {\n  return <><A /><B /><C /><D /></>;\n}\n";
        for _ in 0..8 {
            let (_, refs) = build(src);
            let sources: Vec<&str> = refs[0].forward.iter().map(|e| e.target.identity()).collect();
            assert_eq!(sources, vec!["./a", "./b", "./c", "./d"]);
        }
    }

    #[test]
    fn test_unused_import_has_no_edge() {
        let src = "import { format, parse } from './dates';\nexport function show(d) {\n  return format(d);\n}\n";
        let (_, refs) = build(src);
        assert_eq!(summary(&refs[0]), vec![(EdgeKind::FunctionCall, "format".to_owned())]);
        assert_eq!(refs[0].used_imports, vec!["format"]);
    }

    #[test]
    fn test_dedup_with_priority() {
        let src = r#"import { Button } from './Button';
export function Toolbar() {
  const b = Button;
  Button();
  return <Button />;
}
"#;
        let (_, refs) = build(src);
        assert_eq!(refs[0].forward.len(), 1);
        assert_eq!(refs[0].forward[0].kind, EdgeKind::MarkupElement);
        assert_eq!(refs[0].forward[0].line, 5);
    }

    #[test]
    fn test_external_and_unresolved_are_kept() {
        let src = "import { useState } from 'react';\nimport Missing from '@/nowhere/Thing';\nexport function Box() {\n  useState(0);\n  return <Missing />;\n}\n";
        let (_, refs) = build(src);
        let forward = &refs[0].forward;
        assert_eq!(forward.len(), 2);
        assert!(forward[0].target.is_external());
        assert!(!forward[1].target.is_external());
        assert_eq!(forward[1].target.resolved_path(), None);
    }

    #[test]
    fn test_namespace_members_become_symbols() {
        let src = "import * as api from './api';\nexport function load() {\n  api.get();\n  api.get();\n  return api;\n}\n";
        let (_, refs) = build(src);
        assert_eq!(
            summary(&refs[0]),
            vec![
                (EdgeKind::FunctionCall, "get".to_owned()),
                (EdgeKind::Import, "*".to_owned())
            ]
        );
    }

    #[test]
    fn test_same_file_markup_and_call_edges() {
        let src = r#"function Row() {
  return <tr />;
}
function helper() {
  return 1;
}
export function Table() {
  helper();
  return <Row />;
}
"#;
        let (defs, refs) = build(src);
        let table = defs.iter().position(|d| d.name == "Table").unwrap();
        let forward = &refs[table].forward;
        assert_eq!(forward.len(), 2);
        assert!(matches!(
            &forward[0].target,
            EdgeTarget::Local { qualified_name, .. } if qualified_name == "src/b.tsx::helper"
        ));
        assert_eq!(forward[1].kind, EdgeKind::MarkupElement);
        assert!(refs[table].used_imports.is_empty());
    }

    #[test]
    fn test_deepest_visible_definition_and_self_reference() {
        let src = r#"function helper() {
  return helper();
}
function outer() {
  function helper() {
    return 2;
  }
  return helper();
}
"#;
        let (defs, refs) = build(src);
        // Recursion is not an edge.
        assert!(refs[0].forward.is_empty());

        let outer = defs.iter().position(|d| d.name == "outer").unwrap();
        match &refs[outer].forward[0].target {
            EdgeTarget::Local { qualified_name, .. } => {
                assert_eq!(qualified_name, "src/b.tsx::outer.helper")
            }
            other => panic!("unexpected target {other:?}"),
        }
    }
}
