use std::sync::OnceLock;

use regex::Regex;
use tree_sitter::{Node, Tree};

use crate::graph::node::{AssociatedComment, Comment, CommentKind, CommentPlacement, Span};

/// Collect every comment node of the tree in source order.
pub fn collect_comments(tree: &Tree, source: &[u8]) -> Vec<Comment> {
    let mut comments = Vec::new();
    let mut stack = vec![tree.root_node()];
    while let Some(node) = stack.pop() {
        if node.kind() == "comment" {
            if let Ok(text) = node.utf8_text(source) {
                comments.push(Comment {
                    kind: classify(text),
                    text: text.to_owned(),
                    start_line: node.start_position().row + 1,
                    end_line: node.end_position().row + 1,
                });
            }
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    comments.sort_by_key(|c| (c.start_line, c.end_line));
    comments
}

fn classify(text: &str) -> CommentKind {
    if text.starts_with("/**") && text != "/**/" {
        CommentKind::Doc
    } else if text.starts_with("/*") {
        CommentKind::Block
    } else {
        CommentKind::Line
    }
}

/// Comments attached to a Definition spanning `span`, leading ones first.
///
/// A leading comment must start on a comment-only line and be separated from
/// the span (or from the next leading comment) by blank lines only, at most
/// `window` of them in total.
pub fn associate(
    comments: &[Comment],
    lines: &[String],
    span: Span,
    window: usize,
) -> Vec<AssociatedComment> {
    let mut leading = Vec::new();
    let mut cursor = span.start_line;
    let mut blank_budget = window;

    for comment in comments.iter().rev().filter(|c| c.end_line < span.start_line) {
        if comment.end_line >= cursor {
            // Shares a line with a comment already taken, e.g. `/* a */ /* b */`.
            continue;
        }
        let gap = (comment.end_line + 1)..cursor;
        let gap_is_blank = gap
            .clone()
            .all(|n| lines.get(n - 1).is_none_or(|l| l.trim().is_empty()));
        if !gap_is_blank || gap.len() > blank_budget || !starts_own_line(comment, lines) {
            break;
        }
        blank_budget -= gap.len();
        leading.push(AssociatedComment {
            placement: CommentPlacement::Leading,
            comment: comment.clone(),
        });
        cursor = comment.start_line;
    }
    leading.reverse();

    let inside = comments
        .iter()
        .filter(|c| span.contains(&c.span()))
        .map(|c| AssociatedComment {
            placement: CommentPlacement::Inside,
            comment: c.clone(),
        });

    leading.into_iter().chain(inside).collect()
}

fn starts_own_line(comment: &Comment, lines: &[String]) -> bool {
    lines
        .get(comment.start_line - 1)
        .map(|l| {
            let l = l.trim_start();
            l.starts_with("//") || l.starts_with("/*")
        })
        .unwrap_or(false)
}

/// Human-readable description from the leading comments directly above a
/// Definition (the contiguous group nearest to it). JSDoc tag lines are
/// dropped.
pub fn describe(associated: &[AssociatedComment]) -> Option<String> {
    let leading: Vec<&Comment> = associated
        .iter()
        .filter(|c| c.placement == CommentPlacement::Leading)
        .map(|c| &c.comment)
        .collect();
    let nearest = leading.last()?;

    // Contiguous run of line comments above the nearest one.
    let mut group = vec![*nearest];
    if nearest.kind == CommentKind::Line {
        for comment in leading.iter().rev().skip(1) {
            let top = group[group.len() - 1];
            if comment.kind != CommentKind::Line || comment.end_line + 1 != top.start_line {
                break;
            }
            group.push(comment);
        }
    }
    group.reverse();

    let text: Vec<String> = group
        .iter()
        .flat_map(|c| clean_comment(&c.text))
        .collect();
    let text = text.join("\n").trim().to_owned();
    if text.is_empty() { None } else { Some(text) }
}

/// Strip comment markers and JSDoc tags, one output line per content line.
fn clean_comment(text: &str) -> Vec<String> {
    static MARKERS: OnceLock<Regex> = OnceLock::new();
    static CLOSE: OnceLock<Regex> = OnceLock::new();
    let markers =
        MARKERS.get_or_init(|| Regex::new(r"^\s*(?:/\*+|\*+/|\*|//+)\s?").expect("valid regex"));
    let close = CLOSE.get_or_init(|| Regex::new(r"\s*\*+/\s*$").expect("valid regex"));

    let mut out = Vec::new();
    for line in text.lines() {
        let line = close.replace(line, "");
        let line = markers.replace(&line, "");
        let line = line.trim_end();
        if line.trim_start().starts_with('@') {
            break;
        }
        out.push(line.to_owned());
    }
    while out.first().is_some_and(|l| l.trim().is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    out
}
