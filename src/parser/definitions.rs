//! Structural extraction: one walk over the tree emitting Definitions, their
//! scopes, and the usages observed inside each of them.

use std::collections::HashMap;

use tree_sitter::{Node, Tree};

use crate::error::GraphError;
use crate::graph::node::{
    ClassDetails, Comment, Definition, DefinitionKind, DefinitionParts, ExportKind,
    FunctionDetails, KindDetails, MethodInfo, ParamShape, Span, VariableDetails, slice_lines,
};
use crate::parser::comments::{associate, describe};
use crate::parser::imports::{ExportRecord, ExportRecordKind};
use crate::parser::scope::ScopeStack;
use crate::parser::{find_child_of_kind, has_child_token, line_of, node_text};

/// How an identifier is used inside a Definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageKind {
    Reference,
    Call,
    Markup,
}

/// One identifier use, attributed to the innermost enclosing Definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usage {
    pub name: String,
    /// Accessed member for `ns.member` / `<ns.Member />`.
    pub member: Option<String>,
    pub kind: UsageKind,
    pub line: usize,
}

/// Inputs shared by the whole walk of one file.
pub struct WalkContext<'a> {
    pub file_id: &'a str,
    pub source: &'a [u8],
    pub lines: &'a [String],
    pub comments: &'a [Comment],
    pub comment_window: usize,
    pub exports: &'a [ExportRecord],
}

/// Definitions in pre-order, and per Definition the usages inside its body
/// (excluding those of nested Definitions).
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub definitions: Vec<Definition>,
    pub usages: Vec<Vec<Usage>>,
}

/// Walk the tree and extract Definitions.
///
/// Fails only with [`GraphError::ScopeImbalance`]; the scope stack must be
/// empty again when the walk returns.
pub fn extract_definitions(tree: &Tree, ctx: &WalkContext) -> Result<WalkOutput, GraphError> {
    let mut walker = Walker {
        ctx,
        exported: exported_locals(ctx.exports),
        out: WalkOutput::default(),
    };
    let mut scope = ScopeStack::new(ctx.file_id);
    walker.visit(tree.root_node(), &mut scope)?;
    scope.finish(ctx.lines.len())?;
    Ok(walker.out)
}

/// Top-level names exported by a separate statement (`export { a }`,
/// `export default a`).
fn exported_locals(exports: &[ExportRecord]) -> HashMap<String, ExportKind> {
    let mut map = HashMap::new();
    for record in exports.iter().filter(|r| r.source.is_none()) {
        if !matches!(record.kind, ExportRecordKind::Named | ExportRecordKind::Default) {
            continue;
        }
        for name in &record.names {
            let kind = if name.exported == "default" {
                ExportKind::Default
            } else {
                ExportKind::Named
            };
            let entry = map.entry(name.local.clone()).or_insert(kind);
            if kind == ExportKind::Default {
                *entry = kind;
            }
        }
    }
    map
}

/// A node that produces a Definition.
struct Candidate<'t> {
    parts: DefinitionParts,
    /// Node whose children are walked inside the new scope.
    visit_root: Node<'t>,
    /// The declaration name, which is not a usage.
    skip: Option<usize>,
}

struct Walker<'a, 'c> {
    ctx: &'c WalkContext<'a>,
    exported: HashMap<String, ExportKind>,
    out: WalkOutput,
}

impl<'a, 'c> Walker<'a, 'c> {
    fn visit<'t>(&mut self, node: Node<'t>, scope: &mut ScopeStack) -> Result<(), GraphError> {
        if let Some(candidate) = self.candidate(node, scope.depth()) {
            return self.enter(candidate, scope);
        }

        let source = self.ctx.source;
        let mut skip = None;
        match node.kind() {
            "comment" | "jsx_closing_element" => return Ok(()),
            "identifier" => {
                if !is_declaration_name(node) {
                    self.record(scope, node_text(node, source), None, UsageKind::Reference, node);
                }
                return Ok(());
            }
            "shorthand_property_identifier" | "type_identifier" => {
                if !is_declaration_name(node) {
                    self.record(scope, node_text(node, source), None, UsageKind::Reference, node);
                }
                return Ok(());
            }
            "member_expression" => {
                if let Some((object, property)) = simple_member(node, source) {
                    self.record(scope, object, Some(property), UsageKind::Reference, node);
                    return Ok(());
                }
            }
            "call_expression" => {
                if let Some(callee) = node.child_by_field_name("function") {
                    if callee.kind() == "identifier" {
                        self.record(scope, node_text(callee, source), None, UsageKind::Call, node);
                        skip = Some(callee.id());
                    } else if let Some((object, property)) = simple_member(callee, source) {
                        self.record(scope, object, Some(property), UsageKind::Call, node);
                        skip = Some(callee.id());
                    }
                }
            }
            "jsx_opening_element" | "jsx_self_closing_element" => {
                if let Some(name) = node.child_by_field_name("name") {
                    if let Some((element, member)) = markup_name(name, source) {
                        self.record(scope, element, member, UsageKind::Markup, node);
                    }
                    skip = Some(name.id());
                }
            }
            _ => {}
        }

        self.visit_children(node, skip, scope)
    }

    fn visit_children(
        &mut self,
        node: Node,
        skip: Option<usize>,
        scope: &mut ScopeStack,
    ) -> Result<(), GraphError> {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            if Some(child.id()) == skip {
                continue;
            }
            self.visit(child, scope)?;
        }
        Ok(())
    }

    /// Record the Definition, push it, walk its body, and always pop before
    /// returning a child error.
    fn enter(&mut self, candidate: Candidate, scope: &mut ScopeStack) -> Result<(), GraphError> {
        let index = self.out.definitions.len();
        let Span {
            start_line,
            end_line,
        } = candidate.parts.span;
        let name = candidate.parts.name.clone();

        self.out
            .definitions
            .push(Definition::new(self.ctx.file_id, scope.path(), candidate.parts));
        self.out.usages.push(Vec::new());

        scope.push(&name, index);
        let walked = self.visit_children(candidate.visit_root, candidate.skip, scope);
        let popped = scope.pop(index, start_line, end_line);
        walked?;
        popped
    }

    fn record(
        &mut self,
        scope: &ScopeStack,
        name: &str,
        member: Option<&str>,
        kind: UsageKind,
        node: Node,
    ) {
        let Some(index) = scope.current_definition() else {
            return;
        };
        if name.is_empty() {
            return;
        }
        self.out.usages[index].push(Usage {
            name: name.to_owned(),
            member: member.map(str::to_owned),
            kind,
            line: line_of(node),
        });
    }

    // -----------------------------------------------------------------------
    // Definition candidates
    // -----------------------------------------------------------------------

    fn candidate<'t>(&self, node: Node<'t>, depth: usize) -> Option<Candidate<'t>> {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                let name_node = node.child_by_field_name("name")?;
                let name = node_text(name_node, self.ctx.source).to_owned();
                let statement = export_statement_of(node);
                let span = span_of(statement.unwrap_or(node));
                let details = function_details(node, self.ctx.source, None);
                let kind = function_kind(&name, &details);
                let export = self.export_kind(statement, &name, depth);
                Some(Candidate {
                    parts: self.parts(name, kind, span, export, KindDetails::Function(details)),
                    visit_root: node,
                    skip: Some(name_node.id()),
                })
            }
            "class_declaration" | "abstract_class_declaration" => {
                let name_node = node.child_by_field_name("name")?;
                let name = node_text(name_node, self.ctx.source).to_owned();
                let statement = export_statement_of(node);
                let span = span_of(statement.unwrap_or(node));
                let details = class_details(node, self.ctx.source);
                let kind = class_kind(&name, &details);
                let export = self.export_kind(statement, &name, depth);
                Some(Candidate {
                    parts: self.parts(name, kind, span, export, KindDetails::Class(details)),
                    visit_root: node,
                    skip: Some(name_node.id()),
                })
            }
            "variable_declarator" => self.declarator_candidate(node, depth),
            _ => None,
        }
    }

    fn declarator_candidate<'t>(&self, node: Node<'t>, depth: usize) -> Option<Candidate<'t>> {
        let source = self.ctx.source;
        let name_node = node.child_by_field_name("name")?;
        if name_node.kind() != "identifier" {
            // Destructuring declarators bind several names; none becomes a Definition.
            return None;
        }
        let name = node_text(name_node, source).to_owned();
        let declaration = node.parent()?;
        let statement = export_statement_of(declaration);
        let span = declarator_span(node, declaration, statement);
        let export = self.export_kind(statement, &name, depth);
        let value = node.child_by_field_name("value");

        let (kind, details) = match value.map(|v| (v, v.kind())) {
            Some((v, k)) if is_function_value(k) => {
                let details = function_details(v, source, None);
                (function_kind(&name, &details), KindDetails::Function(details))
            }
            Some((v, "class")) => {
                let details = class_details(v, source);
                (class_kind(&name, &details), KindDetails::Class(details))
            }
            Some((v, "call_expression")) if find_wrapped(v, source).is_some() => {
                let (wrapper, inner) = find_wrapped(v, source)?;
                let details = function_details(inner, source, Some(wrapper));
                (function_kind(&name, &details), KindDetails::Function(details))
            }
            _ if export != ExportKind::None => {
                let details = variable_details(node, declaration, source);
                (DefinitionKind::Variable, KindDetails::Variable(details))
            }
            _ => return None,
        };

        Some(Candidate {
            parts: self.parts(name, kind, span, export, details),
            visit_root: node,
            skip: Some(name_node.id()),
        })
    }

    fn parts(
        &self,
        name: String,
        kind: DefinitionKind,
        span: Span,
        export: ExportKind,
        details: KindDetails,
    ) -> DefinitionParts {
        let comments = associate(self.ctx.comments, self.ctx.lines, span, self.ctx.comment_window);
        let description = describe(&comments);
        DefinitionParts {
            name,
            kind,
            span,
            code_text: slice_lines(self.ctx.lines, span),
            export,
            comments,
            description,
            details,
        }
    }

    fn export_kind(&self, statement: Option<Node>, name: &str, depth: usize) -> ExportKind {
        if depth > 0 {
            return ExportKind::None;
        }
        if let Some(statement) = statement {
            return if has_child_token(statement, "default") {
                ExportKind::Default
            } else {
                ExportKind::Named
            };
        }
        self.exported.get(name).copied().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Markup heuristic
// ---------------------------------------------------------------------------

/// Markup heuristic: does the subtree of `node` contain a markup element,
/// self-closing element or fragment, or a `createElement(...)` call?
///
/// This is a structural search, not data-flow analysis:
/// - false positive: a capitalized helper that only builds markup inside a
///   nested callback it never returns (`function Table() { rows.map(r => <tr/>) }`
///   without a return) is still a component;
/// - false negative: a component that returns markup produced elsewhere
///   (`const Page = () => renderLayout()`) or uses `h()` / template literals
///   is classified as a plain function.
pub fn looks_like_component(node: Node, source: &[u8]) -> bool {
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        match n.kind() {
            "jsx_element" | "jsx_self_closing_element" | "jsx_fragment" => return true,
            "call_expression" => {
                let callee = n
                    .child_by_field_name("function")
                    .map(|c| node_text(c, source))
                    .unwrap_or("");
                if callee == "createElement" || callee.ends_with(".createElement") {
                    return true;
                }
            }
            _ => {}
        }
        let mut cursor = n.walk();
        stack.extend(n.children(&mut cursor));
    }
    false
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn function_kind(name: &str, details: &FunctionDetails) -> DefinitionKind {
    if starts_uppercase(name) && details.returns_markup {
        DefinitionKind::Component
    } else {
        DefinitionKind::Function
    }
}

fn class_kind(name: &str, details: &ClassDetails) -> DefinitionKind {
    if starts_uppercase(name) && details.returns_markup {
        DefinitionKind::Component
    } else {
        DefinitionKind::Class
    }
}

// ---------------------------------------------------------------------------
// Syntax helpers
// ---------------------------------------------------------------------------

fn is_function_value(kind: &str) -> bool {
    matches!(
        kind,
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

/// `memo(() => ...)`, `forwardRef(function (props, ref) {...})`,
/// `memo(forwardRef(...))`: the outermost callee and the wrapped function.
fn find_wrapped<'t>(call: Node<'t>, source: &[u8]) -> Option<(String, Node<'t>)> {
    let callee = call.child_by_field_name("function")?;
    if !matches!(callee.kind(), "identifier" | "member_expression") {
        return None;
    }
    let args = call.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    let first = args
        .named_children(&mut cursor)
        .find(|c| c.kind() != "comment")?;
    let wrapper = node_text(callee, source).to_owned();
    if is_function_value(first.kind()) {
        return Some((wrapper, first));
    }
    if first.kind() == "call_expression" {
        return find_wrapped(first, source).map(|(_, inner)| (wrapper, inner));
    }
    None
}

fn export_statement_of(node: Node) -> Option<Node> {
    node.parent().filter(|p| p.kind() == "export_statement")
}

fn span_of(node: Node) -> Span {
    Span {
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
    }
}

/// The whole statement for a lone declarator, the declarator alone when the
/// declaration binds several names.
fn declarator_span(declarator: Node, declaration: Node, statement: Option<Node>) -> Span {
    let mut cursor = declaration.walk();
    let declarators = declaration
        .children(&mut cursor)
        .filter(|c| c.kind() == "variable_declarator")
        .count();
    if declarators == 1 {
        span_of(statement.unwrap_or(declaration))
    } else {
        span_of(declarator)
    }
}

/// `ns.member` where `ns` is a plain identifier.
fn simple_member<'s>(node: Node, source: &'s [u8]) -> Option<(&'s str, &'s str)> {
    if node.kind() != "member_expression" {
        return None;
    }
    let object = node.child_by_field_name("object")?;
    let property = node.child_by_field_name("property")?;
    if object.kind() != "identifier" {
        return None;
    }
    Some((node_text(object, source), node_text(property, source)))
}

/// Element name of a markup tag. Lowercase names are intrinsic elements and
/// are not usages.
fn markup_name<'s>(name: Node, source: &'s [u8]) -> Option<(&'s str, Option<&'s str>)> {
    match name.kind() {
        "identifier" => {
            let text = node_text(name, source);
            starts_uppercase(text).then_some((text, None))
        }
        "member_expression" | "nested_identifier" => {
            if let Some((object, property)) = simple_member(name, source) {
                return Some((object, Some(property)));
            }
            let (object, rest) = node_text(name, source).split_once('.')?;
            let member = rest.split('.').next().unwrap_or(rest);
            Some((object, Some(member)))
        }
        _ => None,
    }
}

/// True when the identifier introduces a binding rather than using one.
fn is_declaration_name(node: Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    let is_field = |field: &str| {
        parent
            .child_by_field_name(field)
            .is_some_and(|n| n.id() == node.id())
    };
    match parent.kind() {
        "variable_declarator"
        | "function_declaration"
        | "generator_function_declaration"
        | "function_expression"
        | "function"
        | "generator_function"
        | "class_declaration"
        | "abstract_class_declaration"
        | "class"
        | "interface_declaration"
        | "type_alias_declaration"
        | "enum_declaration"
        | "type_parameter" => is_field("name"),
        "required_parameter" | "optional_parameter" => is_field("pattern"),
        "arrow_function" => is_field("parameter"),
        "assignment_pattern" => is_field("left"),
        "pair_pattern" => is_field("value"),
        "catch_clause" => is_field("parameter"),
        "formal_parameters"
        | "rest_pattern"
        | "array_pattern"
        | "import_specifier"
        | "import_clause"
        | "namespace_import"
        | "import_require_clause"
        | "export_specifier"
        | "labeled_statement" => true,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Kind details
// ---------------------------------------------------------------------------

fn function_details(function: Node, source: &[u8], wrapped_by: Option<String>) -> FunctionDetails {
    let mut params = Vec::new();
    if let Some(list) = function.child_by_field_name("parameters") {
        let mut cursor = list.walk();
        for param in list.named_children(&mut cursor) {
            if param.kind() != "comment" {
                params.push(param_shape(param, source));
            }
        }
    } else if let Some(single) = function.child_by_field_name("parameter") {
        // `x => ...`
        params.push(pattern_shape(single, source));
    }

    let body = function.child_by_field_name("body").unwrap_or(function);
    FunctionDetails {
        params,
        is_async: has_child_token(function, "async"),
        is_generator: function.kind().starts_with("generator") || has_child_token(function, "*"),
        is_arrow: function.kind() == "arrow_function",
        returns_markup: looks_like_component(body, source),
        wrapped_by,
    }
}

fn param_shape(param: Node, source: &[u8]) -> ParamShape {
    match param.kind() {
        "required_parameter" | "optional_parameter" => {
            let mut shape = param
                .child_by_field_name("pattern")
                .map(|p| pattern_shape(p, source))
                .unwrap_or_else(|| other_shape(None));
            shape.is_optional = param.kind() == "optional_parameter";
            shape.has_default = param.child_by_field_name("value").is_some();
            shape.type_annotation = param
                .child_by_field_name("type")
                .map(|t| annotation_text(t, source));
            shape
        }
        "assignment_pattern" => {
            let mut shape = param
                .child_by_field_name("left")
                .map(|p| pattern_shape(p, source))
                .unwrap_or_else(|| other_shape(None));
            shape.has_default = true;
            shape
        }
        _ => pattern_shape(param, source),
    }
}

fn pattern_shape(pattern: Node, source: &[u8]) -> ParamShape {
    match pattern.kind() {
        "identifier" => ParamShape {
            name: Some(node_text(pattern, source).to_owned()),
            pattern: "identifier".to_owned(),
            ..other_shape(None)
        },
        "object_pattern" => ParamShape {
            pattern: "object".to_owned(),
            ..other_shape(None)
        },
        "array_pattern" => ParamShape {
            pattern: "array".to_owned(),
            ..other_shape(None)
        },
        "rest_pattern" => {
            let mut cursor = pattern.walk();
            let inner = pattern.named_children(&mut cursor).next();
            let mut shape = inner
                .map(|i| pattern_shape(i, source))
                .unwrap_or_else(|| other_shape(None));
            shape.is_rest = true;
            shape
        }
        "this" => other_shape(Some("this".to_owned())),
        _ => other_shape(None),
    }
}

fn other_shape(name: Option<String>) -> ParamShape {
    ParamShape {
        name,
        pattern: "other".to_owned(),
        has_default: false,
        is_rest: false,
        is_optional: false,
        type_annotation: None,
    }
}

/// `: Props` -> `Props`
fn annotation_text(annotation: Node, source: &[u8]) -> String {
    node_text(annotation, source)
        .trim_start_matches(':')
        .trim()
        .to_owned()
}

fn class_details(class: Node, source: &[u8]) -> ClassDetails {
    let mut details = ClassDetails::default();

    if let Some(heritage) = find_child_of_kind(class, "class_heritage") {
        let mut cursor = heritage.walk();
        for clause in heritage.named_children(&mut cursor) {
            match clause.kind() {
                "extends_clause" => {
                    details.superclass = clause
                        .child_by_field_name("value")
                        .or_else(|| clause.named_child(0))
                        .map(|v| node_text(v, source).to_owned());
                }
                "implements_clause" => {
                    let mut inner = clause.walk();
                    details.implements = clause
                        .named_children(&mut inner)
                        .map(|t| node_text(t, source).to_owned())
                        .collect();
                }
                "comment" => {}
                // JavaScript: `class_heritage` holds the superclass expression directly.
                _ if details.superclass.is_none() => {
                    details.superclass = Some(node_text(clause, source).to_owned());
                }
                _ => {}
            }
        }
    }

    if let Some(body) = class.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            match member.kind() {
                "method_definition" | "abstract_method_signature" => {
                    if let Some(info) = method_info(member, source) {
                        details.methods.push(info);
                    }
                }
                "field_definition" | "public_field_definition" => {
                    let name = member
                        .child_by_field_name("name")
                        .or_else(|| member.child_by_field_name("property"));
                    if let Some(name) = name {
                        details.properties.push(node_text(name, source).to_owned());
                    }
                }
                _ => {}
            }
        }
        details.returns_markup = looks_like_component(body, source);
    }

    details
}

fn method_info(method: Node, source: &[u8]) -> Option<MethodInfo> {
    let name = node_text(method.child_by_field_name("name")?, source).to_owned();
    let kind = if name == "constructor" {
        "constructor"
    } else if has_child_token(method, "get") {
        "getter"
    } else if has_child_token(method, "set") {
        "setter"
    } else {
        "method"
    };
    Some(MethodInfo {
        kind: kind.to_owned(),
        is_static: has_child_token(method, "static"),
        is_async: has_child_token(method, "async"),
        name,
    })
}

fn variable_details(declarator: Node, declaration: Node, source: &[u8]) -> VariableDetails {
    let declaration_kind = match declaration.kind() {
        "variable_declaration" => "var".to_owned(),
        _ => declaration
            .child(0)
            .map(|k| node_text(k, source).to_owned())
            .unwrap_or_else(|| "const".to_owned()),
    };
    VariableDetails {
        declaration_kind,
        value_kind: declarator
            .child_by_field_name("value")
            .map(|v| v.kind().to_owned()),
        type_annotation: declarator
            .child_by_field_name("type")
            .map(|t| annotation_text(t, source)),
    }
}
