//! Structural facts about a TSX page: its import statements, its top-level
//! component functions and where an identifier is first referenced.
//!
//! Everything here works on byte spans taken from the tree-sitter CST, so
//! formatting, comments and multi-line signatures survive untouched.

use crate::ts::parser::ParsedSource;
use tree_sitter::Node;

/// Node kinds that open a function scope with a `{ ... }` body.
const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "arrow_function",
    "method_definition",
];

/// One `import ... from '...'` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    pub byte_start: usize,
    pub byte_end: usize,
    /// Module specifier without quotes
    pub module: String,
    /// Quote character used around the module specifier
    pub quote: char,
    /// `import type { ... }`
    pub type_only: bool,
    /// Default import identifier and the offset just after it
    pub default_import: Option<(String, usize)>,
    /// `import * as X`
    pub namespace: bool,
    pub named: Option<NamedImports>,
}

/// The `{ ... }` list of an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedImports {
    /// Offset just after `{`
    pub open_end: usize,
    /// Offset of `}`
    pub close_start: usize,
    /// End of the last specifier, if the list is not empty
    pub last_specifier_end: Option<usize>,
    /// Local names bound by the list (alias when present)
    pub local_names: Vec<String>,
}

impl ImportStatement {
    /// True if this statement binds `name` in the module scope.
    pub fn binds(&self, name: &str) -> bool {
        let named = self
            .named
            .as_ref()
            .is_some_and(|named| named.local_names.iter().any(|local| local == name));
        named
            || self
                .default_import
                .as_ref()
                .is_some_and(|(default, _)| default == name)
    }
}

/// A function-like construct whose body is a statement block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionScope {
    pub name: Option<String>,
    pub byte_start: usize,
    pub byte_end: usize,
    /// Offset of the body's opening `{`
    pub body_open: usize,
    /// Offset of the first statement inside the body, if any
    pub first_statement: Option<usize>,
    pub export: Export,
}

/// How a top-level function leaves the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Export {
    None,
    Named,
    Default,
}

/// All import statements, in source order.
pub fn imports(parsed: &ParsedSource<'_>) -> Vec<ImportStatement> {
    let root = parsed.root_node();
    let mut cursor = root.walk();
    root.named_children(&mut cursor)
        .filter(|node| node.kind() == "import_statement")
        .filter_map(|node| import_statement(parsed, node))
        .collect()
}

fn import_statement(parsed: &ParsedSource<'_>, node: Node<'_>) -> Option<ImportStatement> {
    let source_node = node.child_by_field_name("source").or_else(|| {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).find(|c| c.kind() == "string");
        found
    })?;
    let literal = parsed.node_text(source_node);
    let quote = literal.chars().next()?;
    let module = literal
        .get(1..literal.len().saturating_sub(1))
        .unwrap_or_default()
        .to_string();

    let mut type_only = false;
    let mut clause = None;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "type" if !child.is_named() => type_only = true,
            "import_clause" => clause = Some(child),
            _ => {}
        }
    }

    let mut default_import = None;
    let mut namespace = false;
    let mut named = None;
    if let Some(clause) = clause {
        let mut cursor = clause.walk();
        for part in clause.named_children(&mut cursor) {
            match part.kind() {
                "identifier" => {
                    default_import = Some((parsed.node_text(part).to_string(), part.end_byte()))
                }
                "namespace_import" => namespace = true,
                "named_imports" => named = Some(named_imports(parsed, part)),
                _ => {}
            }
        }
    }

    Some(ImportStatement {
        byte_start: node.start_byte(),
        byte_end: node.end_byte(),
        module,
        quote,
        type_only,
        default_import,
        namespace,
        named,
    })
}

fn named_imports(parsed: &ParsedSource<'_>, node: Node<'_>) -> NamedImports {
    let mut local_names = Vec::new();
    let mut last_specifier_end = None;

    let mut cursor = node.walk();
    for spec in node.named_children(&mut cursor) {
        if spec.kind() != "import_specifier" {
            continue;
        }
        last_specifier_end = Some(spec.end_byte());
        let local = spec
            .child_by_field_name("alias")
            .or_else(|| spec.child_by_field_name("name"));
        if let Some(local) = local {
            local_names.push(parsed.node_text(local).to_string());
        }
    }

    NamedImports {
        open_end: node.start_byte() + 1,
        close_start: node.end_byte().saturating_sub(1),
        last_specifier_end,
        local_names,
    }
}

/// Top-level component functions, in source order.
///
/// Covers `function Foo() {}`, `export (default) function Foo() {}` and
/// `const Foo = (...) => {}` / `const Foo = function () {}`, exported or not.
pub fn components(parsed: &ParsedSource<'_>) -> Vec<FunctionScope> {
    let root = parsed.root_node();
    let mut found = Vec::new();
    let mut default_names = Vec::new();
    let mut cursor = root.walk();
    for item in root.named_children(&mut cursor) {
        collect_components(parsed, item, Export::None, &mut found, &mut default_names);
    }
    // `export default Page;` after the declaration
    for scope in &mut found {
        if scope
            .name
            .as_ref()
            .is_some_and(|name| default_names.contains(name))
        {
            scope.export = Export::Default;
        }
    }
    found
}

fn collect_components(
    parsed: &ParsedSource<'_>,
    node: Node<'_>,
    export: Export,
    found: &mut Vec<FunctionScope>,
    default_names: &mut Vec<String>,
) {
    match node.kind() {
        "export_statement" => {
            let mut cursor = node.walk();
            let is_default = node.children(&mut cursor).any(|c| c.kind() == "default");
            let export = if is_default {
                Export::Default
            } else {
                Export::Named
            };
            if is_default {
                if let Some(value) = node.child_by_field_name("value") {
                    if value.kind() == "identifier" {
                        default_names.push(parsed.node_text(value).to_string());
                    }
                }
            }
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_components(parsed, child, export, found, default_names);
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            for declarator in node.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let name = declarator
                    .child_by_field_name("name")
                    .map(|n| parsed.node_text(n).to_string());
                if let Some(value) = declarator.child_by_field_name("value") {
                    if let Some(mut scope) = function_scope(parsed, value) {
                        scope.name = scope.name.or(name);
                        scope.export = export;
                        found.push(scope);
                    }
                }
            }
        }
        _ => {
            if let Some(mut scope) = function_scope(parsed, node) {
                scope.export = export;
                found.push(scope);
            }
        }
    }
}

fn function_scope(parsed: &ParsedSource<'_>, node: Node<'_>) -> Option<FunctionScope> {
    if !FUNCTION_KINDS.contains(&node.kind()) {
        return None;
    }
    let body = node.child_by_field_name("body")?;
    if body.kind() != "statement_block" {
        return None;
    }
    let first_statement = {
        let mut cursor = body.walk();
        let first = body.named_children(&mut cursor).next();
        first.map(|stmt| stmt.start_byte())
    };
    Some(FunctionScope {
        name: node
            .child_by_field_name("name")
            .map(|n| parsed.node_text(n).to_string()),
        byte_start: node.start_byte(),
        byte_end: node.end_byte(),
        body_open: body.start_byte(),
        first_statement,
        export: Export::None,
    })
}

/// True if `ident` is declared by a variable declarator anywhere in the file,
/// including through destructuring (`const { navigate } = useRouter()`).
pub fn declares(parsed: &ParsedSource<'_>, ident: &str) -> bool {
    let mut stack = vec![parsed.root_node()];
    while let Some(node) = stack.pop() {
        if node.kind() == "variable_declarator" {
            if let Some(name) = node.child_by_field_name("name") {
                if pattern_binds(parsed, name, ident) {
                    return true;
                }
            }
        }
        let mut cursor = node.walk();
        stack.extend(node.named_children(&mut cursor));
    }
    false
}

fn pattern_binds(parsed: &ParsedSource<'_>, pattern: Node<'_>, ident: &str) -> bool {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            parsed.node_text(pattern) == ident
        }
        // `{ key: value }` binds value, never key
        "pair_pattern" => pattern
            .child_by_field_name("value")
            .is_some_and(|value| pattern_binds(parsed, value, ident)),
        _ => {
            let mut cursor = pattern.walk();
            let children: Vec<_> = pattern.named_children(&mut cursor).collect();
            children
                .into_iter()
                .any(|child| pattern_binds(parsed, child, ident))
        }
    }
}

/// The first identifier reference to `ident` outside import statements.
pub fn first_reference(parsed: &ParsedSource<'_>, ident: &str) -> Option<usize> {
    first_reference_node(parsed, ident).map(|node| node.start_byte())
}

fn first_reference_node<'t>(parsed: &'t ParsedSource<'_>, ident: &str) -> Option<Node<'t>> {
    let root = parsed.root_node();
    let mut cursor = root.walk();
    let top_level: Vec<_> = root.named_children(&mut cursor).collect();

    for item in top_level {
        if item.kind() == "import_statement" {
            continue;
        }
        // Depth-first, pre-order: the first hit is the earliest in the source.
        let mut stack = vec![item];
        while let Some(node) = stack.pop() {
            if node.kind() == "identifier" && parsed.node_text(node) == ident {
                return Some(node);
            }
            let mut cursor = node.walk();
            let children: Vec<_> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    None
}

/// The component-level function that should host a binding for `ident`.
///
/// This is the outermost function enclosing the first reference to `ident`
/// (hooks must be called at component scope, not inside callbacks). Without a
/// reference it falls back to the default export, then to the first exported
/// function, and only then to the first top-level function.
pub fn host_function(parsed: &ParsedSource<'_>, ident: &str) -> Option<FunctionScope> {
    if let Some(reference) = first_reference_node(parsed, ident) {
        let mut outermost = None;
        let mut current = reference.parent();
        while let Some(node) = current {
            if let Some(scope) = function_scope(parsed, node) {
                outermost = Some(scope);
            }
            current = node.parent();
        }
        if outermost.is_some() {
            return outermost;
        }
    }
    let found = components(parsed);
    let pick = found
        .iter()
        .position(|c| c.export == Export::Default)
        .or_else(|| found.iter().position(|c| c.export == Export::Named))
        .unwrap_or(0);
    found.into_iter().nth(pick)
}
