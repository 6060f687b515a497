//! C syntax backend built on tree-sitter.
//!
//! Lowers a tree-sitter C tree into a [`SyntaxTree`]. Argument type spellings
//! are resolved from the declarations visible at the call site (parameters,
//! block locals, file-scope variables) and from function return types. This is
//! not a type checker: expressions it cannot resolve are spelled `int`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;
use tree_sitter::{Node, Parser};

use super::syntax::{SyntaxNode, SyntaxProvider, SyntaxTree};
use crate::error::{DriverSynthError, SynthResult};
use crate::interface::Parameter;

/// Spelling for expressions whose type cannot be resolved.
const UNRESOLVED_TYPE: &str = "int";

#[derive(Debug, Default, Clone, Copy)]
pub struct CSyntaxProvider;

impl CSyntaxProvider {
    pub fn new() -> Self {
        Self
    }

    /// Parse C source text.
    pub fn parse_source(&self, source: &str) -> Result<SyntaxTree, String> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_c::LANGUAGE.into())
            .map_err(|e| format!("failed to load C grammar: {}", e))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| "parser produced no tree".to_string())?;

        let root = tree.root_node();
        if root.has_error() {
            debug!("source contains syntax errors, using recovered tree");
        }

        let mut lowering = Lowering::new(source);
        lowering.collect_file_scope(root);
        Ok(SyntaxTree::new(lowering.lower(root)))
    }
}

impl SyntaxProvider for CSyntaxProvider {
    fn parse_file(&self, path: &Path) -> SynthResult<SyntaxTree> {
        let bytes = fs::read(path).map_err(|e| DriverSynthError::parse(path, e.to_string()))?;
        let source = String::from_utf8_lossy(&bytes);
        self.parse_source(&source)
            .map_err(|message| DriverSynthError::parse(path, message))
    }
}

/// What a declarator introduces.
enum Declared {
    Variable { name: String, type_name: String },
    Function { name: String, return_type: String },
}

struct Lowering<'s> {
    source: &'s [u8],
    /// Variable name -> type spelling, innermost scope last. Index 0 is file scope.
    scopes: Vec<HashMap<String, String>>,
    /// Function name -> return type spelling.
    functions: HashMap<String, String>,
}

impl<'s> Lowering<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source: source.as_bytes(),
            scopes: vec![HashMap::new()],
            functions: HashMap::new(),
        }
    }

    fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.source).unwrap_or("")
    }

    /// Register file-scope variables and every function signature up front so
    /// calls to functions defined later in the file still resolve.
    fn collect_file_scope(&mut self, node: Node<'_>) {
        for child in named_children(node) {
            match child.kind() {
                "function_definition" => {
                    let base = self.base_type(child);
                    if let Some(Declared::Function { name, return_type }) = child
                        .child_by_field_name("declarator")
                        .and_then(|d| self.declared(&base, d))
                    {
                        self.functions.insert(name, return_type);
                    }
                }
                "declaration" => self.declare(child, 0),
                kind if kind.starts_with("preproc_")
                    || kind == "linkage_specification"
                    || kind == "declaration_list" =>
                {
                    self.collect_file_scope(child)
                }
                _ => {}
            }
        }
    }

    fn lower(&mut self, node: Node<'_>) -> SyntaxNode {
        let line = line_of(node);
        match node.kind() {
            "function_definition" => self.lower_function(node, line),
            "call_expression" => self.lower_call(node, line),
            "compound_statement" | "for_statement" => {
                self.scopes.push(HashMap::new());
                let children = self.lower_children(node);
                self.scopes.pop();
                SyntaxNode::other(line, children)
            }
            "declaration" => {
                if self.scopes.len() > 1 {
                    self.declare(node, self.scopes.len() - 1);
                }
                SyntaxNode::other(line, self.lower_children(node))
            }
            _ => SyntaxNode::other(line, self.lower_children(node)),
        }
    }

    fn lower_children(&mut self, node: Node<'_>) -> Vec<SyntaxNode> {
        named_children(node)
            .into_iter()
            .map(|child| self.lower(child))
            .collect()
    }

    fn lower_function(&mut self, node: Node<'_>, line: u32) -> SyntaxNode {
        let base = self.base_type(node);
        let declarator = node.child_by_field_name("declarator");
        let name = match declarator.and_then(|d| self.declared(&base, d)) {
            Some(Declared::Function { name, .. }) => name,
            _ => return SyntaxNode::other(line, self.lower_children(node)),
        };

        let mut params = HashMap::new();
        if let Some(parameters) = declarator
            .and_then(find_function_declarator)
            .and_then(|f| f.child_by_field_name("parameters"))
        {
            for param in named_children(parameters) {
                if param.kind() != "parameter_declaration" {
                    continue;
                }
                let param_base = self.base_type(param);
                if let Some(Declared::Variable { name, type_name }) = param
                    .child_by_field_name("declarator")
                    .and_then(|d| self.declared(&param_base, d))
                {
                    params.insert(name, type_name);
                }
            }
        }

        self.scopes.push(params);
        let children = node
            .child_by_field_name("body")
            .map(|body| vec![self.lower(body)])
            .unwrap_or_default();
        self.scopes.pop();

        SyntaxNode::function(name, line, children)
    }

    fn lower_call(&mut self, node: Node<'_>, line: u32) -> SyntaxNode {
        let function = node.child_by_field_name("function");
        let callee = function
            .filter(|f| f.kind() == "identifier")
            .map(|f| self.text(f));

        let mut children = Vec::new();
        if let Some(f) = function.filter(|f| f.kind() != "identifier") {
            children.push(self.lower(f));
        }

        let mut arguments = Vec::new();
        if let Some(args) = node.child_by_field_name("arguments") {
            for arg in named_children(args) {
                if arg.kind() == "comment" {
                    continue;
                }
                arguments.push(Parameter::new(self.expr_type(arg), self.arg_name(arg)));
                children.push(self.lower(arg));
            }
        }

        SyntaxNode::call(callee, arguments, line, children)
    }

    /// Register every declarator of a `declaration` node into `scope`.
    fn declare(&mut self, node: Node<'_>, scope: usize) {
        let base = self.base_type(node);
        let declarators: Vec<Node<'_>> = {
            let mut cursor = node.walk();
            node.children_by_field_name("declarator", &mut cursor)
                .collect()
        };
        for declarator in declarators {
            match self.declared(&base, declarator) {
                Some(Declared::Variable { name, type_name }) => {
                    self.scopes[scope].insert(name, type_name);
                }
                Some(Declared::Function { name, return_type }) => {
                    self.functions.entry(name).or_insert(return_type);
                }
                None => {}
            }
        }
    }

    /// Qualifiers plus the `type` field, e.g. `const char`.
    fn base_type(&self, node: Node<'_>) -> String {
        let mut parts: Vec<String> = named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "type_qualifier")
            .map(|c| self.text(c).to_string())
            .collect();
        if let Some(ty) = node.child_by_field_name("type") {
            parts.push(collapse_whitespace(self.text(ty)));
        }
        parts.join(" ")
    }

    fn declared(&self, base: &str, declarator: Node<'_>) -> Option<Declared> {
        let mut stars = 0usize;
        let mut node = declarator;
        loop {
            match node.kind() {
                "identifier" | "field_identifier" => {
                    return Some(Declared::Variable {
                        name: self.text(node).to_string(),
                        type_name: with_pointers(base, stars),
                    });
                }
                "pointer_declarator" | "array_declarator" => {
                    stars += 1;
                    node = node.child_by_field_name("declarator")?;
                }
                "init_declarator" => node = node.child_by_field_name("declarator")?,
                "parenthesized_declarator" | "attributed_declarator" => {
                    node = node.named_child(0)?
                }
                "function_declarator" => {
                    let inner = node.child_by_field_name("declarator")?;
                    let return_type = with_pointers(base, stars);
                    if inner.kind() == "identifier" {
                        return Some(Declared::Function {
                            name: self.text(inner).to_string(),
                            return_type,
                        });
                    }
                    return Some(Declared::Variable {
                        name: self.declarator_name(inner)?,
                        type_name: format!("{} (*)()", return_type),
                    });
                }
                _ => return None,
            }
        }
    }

    fn declarator_name(&self, node: Node<'_>) -> Option<String> {
        if node.kind() == "identifier" {
            return Some(self.text(node).to_string());
        }
        named_children(node)
            .into_iter()
            .find_map(|child| self.declarator_name(child))
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .or_else(|| {
                self.functions
                    .get(name)
                    .map(|ret| format!("{} (*)()", ret))
            })
    }

    fn field_type(&self, node: Node<'_>, field: &str) -> String {
        node.child_by_field_name(field)
            .map(|n| self.expr_type(n))
            .unwrap_or_else(|| UNRESOLVED_TYPE.to_string())
    }

    fn operator(&self, node: Node<'_>) -> &'s str {
        node.child_by_field_name("operator")
            .map(|op| self.text(op))
            .unwrap_or("")
    }

    fn expr_type(&self, node: Node<'_>) -> String {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                if name == "NULL" {
                    return "void *".to_string();
                }
                self.lookup(name)
                    .unwrap_or_else(|| UNRESOLVED_TYPE.to_string())
            }
            "string_literal" | "concatenated_string" | "raw_string_literal" => {
                "char *".to_string()
            }
            "char_literal" => "char".to_string(),
            "number_literal" => number_type(self.text(node)).to_string(),
            "true" | "false" => "_Bool".to_string(),
            "null" => "void *".to_string(),
            "sizeof_expression" | "alignof_expression" | "offsetof_expression" => {
                "unsigned long".to_string()
            }
            "parenthesized_expression" => node
                .named_child(0)
                .map(|inner| self.expr_type(inner))
                .unwrap_or_else(|| UNRESOLVED_TYPE.to_string()),
            "cast_expression" => node
                .child_by_field_name("type")
                .map(|ty| collapse_whitespace(self.text(ty)))
                .unwrap_or_else(|| UNRESOLVED_TYPE.to_string()),
            "pointer_expression" => {
                let inner = self.field_type(node, "argument");
                if self.operator(node) == "&" {
                    add_pointer(&inner)
                } else {
                    remove_pointer(&inner)
                }
            }
            "subscript_expression" => remove_pointer(&self.field_type(node, "argument")),
            "call_expression" => node
                .child_by_field_name("function")
                .filter(|f| f.kind() == "identifier")
                .and_then(|f| self.functions.get(self.text(f)).cloned())
                .unwrap_or_else(|| UNRESOLVED_TYPE.to_string()),
            "binary_expression" => match self.operator(node) {
                "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||" => "int".to_string(),
                _ => self.field_type(node, "left"),
            },
            "unary_expression" => match self.operator(node) {
                "!" => "int".to_string(),
                _ => self.field_type(node, "argument"),
            },
            "update_expression" => self.field_type(node, "argument"),
            "assignment_expression" => self.field_type(node, "left"),
            "conditional_expression" => self.field_type(node, "consequence"),
            "comma_expression" => self.field_type(node, "right"),
            _ => UNRESOLVED_TYPE.to_string(),
        }
    }

    fn arg_name(&self, node: Node<'_>) -> String {
        collapse_whitespace(self.text(node))
    }
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn find_function_declarator(node: Node<'_>) -> Option<Node<'_>> {
    if node.kind() == "function_declarator" {
        return Some(node);
    }
    node.child_by_field_name("declarator")
        .or_else(|| node.named_child(0))
        .and_then(find_function_declarator)
}

fn line_of(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn with_pointers(base: &str, depth: usize) -> String {
    if depth == 0 {
        base.to_string()
    } else {
        format!("{} {}", base, "*".repeat(depth))
    }
}

fn add_pointer(type_name: &str) -> String {
    if type_name.ends_with('*') {
        format!("{}*", type_name)
    } else {
        format!("{} *", type_name)
    }
}

fn remove_pointer(type_name: &str) -> String {
    match type_name.strip_suffix('*') {
        Some(rest) => rest.trim_end().to_string(),
        None => type_name.to_string(),
    }
}

fn number_type(literal: &str) -> &'static str {
    let lower = literal.to_ascii_lowercase();
    let is_hex = lower.starts_with("0x");
    if !is_hex && (lower.contains('.') || lower.contains('e')) {
        return if lower.ends_with('f') { "float" } else { "double" };
    }
    let suffix: String = lower
        .chars()
        .rev()
        .take_while(|c| *c == 'u' || *c == 'l')
        .collect();
    let unsigned = suffix.contains('u');
    match (unsigned, suffix.matches('l').count()) {
        (false, 0) => "int",
        (true, 0) => "unsigned int",
        (false, 1) => "long",
        (true, 1) => "unsigned long",
        (false, _) => "long long",
        (true, _) => "unsigned long long",
    }
}
