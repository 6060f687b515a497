//! Language-neutral syntax tree consumed by the extractor.

use std::path::Path;

use crate::error::SynthResult;
use crate::interface::Parameter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxKind {
    /// A function definition (with a body).
    Function { name: String },
    /// A call expression. `callee` is `None` when the callee is not a plain name.
    Call {
        callee: Option<String>,
        arguments: Vec<Parameter>,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    /// 1-based source line.
    pub line: u32,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: SyntaxKind, line: u32, children: Vec<SyntaxNode>) -> Self {
        Self {
            kind,
            line,
            children,
        }
    }

    pub fn function(name: impl Into<String>, line: u32, children: Vec<SyntaxNode>) -> Self {
        Self::new(SyntaxKind::Function { name: name.into() }, line, children)
    }

    pub fn call(
        callee: Option<&str>,
        arguments: Vec<Parameter>,
        line: u32,
        children: Vec<SyntaxNode>,
    ) -> Self {
        Self::new(
            SyntaxKind::Call {
                callee: callee.map(str::to_string),
                arguments,
            },
            line,
            children,
        )
    }

    pub fn other(line: u32, children: Vec<SyntaxNode>) -> Self {
        Self::new(SyntaxKind::Other, line, children)
    }

    pub fn function_name(&self) -> Option<&str> {
        match &self.kind {
            SyntaxKind::Function { name } => Some(name),
            _ => None,
        }
    }
}

/// A parsed translation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    pub root: SyntaxNode,
}

impl SyntaxTree {
    pub fn new(root: SyntaxNode) -> Self {
        Self { root }
    }

    /// First function definition named `name`, searching in pre-order so that
    /// definitions nested in preprocessor blocks are found too.
    pub fn find_function(&self, name: &str) -> Option<&SyntaxNode> {
        fn walk<'a>(node: &'a SyntaxNode, name: &str) -> Option<&'a SyntaxNode> {
            if node.function_name() == Some(name) {
                return Some(node);
            }
            node.children.iter().find_map(|child| walk(child, name))
        }
        walk(&self.root, name)
    }
}

/// Capability that turns a source file into a [`SyntaxTree`].
pub trait SyntaxProvider {
    fn parse_file(&self, path: &Path) -> SynthResult<SyntaxTree>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_function_descends_into_nested_nodes() {
        let tree = SyntaxTree::new(SyntaxNode::other(
            1,
            vec![SyntaxNode::other(
                2,
                vec![SyntaxNode::function("run", 3, vec![])],
            )],
        ));
        assert_eq!(tree.find_function("run").map(|n| n.line), Some(3));
        assert!(tree.find_function("main").is_none());
    }
}
