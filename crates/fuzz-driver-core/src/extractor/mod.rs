//! Interface extraction from a target's entry function.
//!
//! The extractor walks the body of the entry function in pre-order and turns
//! every call expression into an [`InterfaceRecord`], deduplicated by
//! [`CallSignature`]. Recurring signatures only grow `seen_lines`.
//!
//! ## Delegation unwrap
//!
//! Entry points such as
//!
//! ```c
//! int main(int argc, char **argv) { return real_main(argc, argv); }
//! ```
//!
//! yield exactly one interface. In that case extraction restarts from the
//! callee's body (when it is defined in the same file) and the forwarding
//! record is dropped. The unwrap is applied once.

mod c_backend;
mod syntax;

pub use c_backend::CSyntaxProvider;
pub use syntax::{SyntaxKind, SyntaxNode, SyntaxProvider, SyntaxTree};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{DriverSynthError, SynthResult};
use crate::interface::{CallSignature, InterfaceRecord, Parameter, ANONYMOUS_CALLEE};

/// Extracts call-site interfaces using a pluggable [`SyntaxProvider`].
pub struct InterfaceExtractor<P> {
    provider: P,
}

impl InterfaceExtractor<CSyntaxProvider> {
    /// Extractor backed by the tree-sitter C grammar.
    pub fn for_c() -> Self {
        Self::new(CSyntaxProvider::new())
    }
}

impl<P: SyntaxProvider> InterfaceExtractor<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Parse `source_file` and extract the interfaces reachable from `entry`.
    pub fn extract(&self, source_file: &Path, entry: &str) -> SynthResult<Vec<InterfaceRecord>> {
        let tree = self.provider.parse_file(source_file)?;
        let records =
            extract_from_tree(&tree, entry).ok_or_else(|| DriverSynthError::EntryNotFound {
                path: PathBuf::from(source_file),
                entry: entry.to_string(),
            })?;
        if records.is_empty() {
            warn!(entry, file = %source_file.display(), "entry function contains no calls");
        }
        Ok(records)
    }
}

/// Extract interfaces from an already parsed tree. Returns `None` when no
/// function named `entry` exists.
pub fn extract_from_tree(tree: &SyntaxTree, entry: &str) -> Option<Vec<InterfaceRecord>> {
    let entry_node = tree.find_function(entry)?;
    let mut collector = CallCollector::default();
    collector.visit(entry_node);

    if let [only] = collector.records.as_slice() {
        if !only.is_anonymous() && only.function_name != entry {
            if let Some(delegate) = tree.find_function(&only.function_name) {
                debug!(
                    entry,
                    delegate = %only.function_name,
                    "entry forwards to a single function, extracting from its body"
                );
                let mut inner = CallCollector::default();
                inner.visit(delegate);
                return Some(inner.records);
            }
        }
    }

    Some(collector.records)
}

/// Owned accumulator for one traversal: the records in discovery order and an
/// index from signature to record position.
#[derive(Default)]
struct CallCollector {
    records: Vec<InterfaceRecord>,
    index: HashMap<CallSignature, usize>,
}

impl CallCollector {
    fn visit(&mut self, node: &SyntaxNode) {
        for child in &node.children {
            if let SyntaxKind::Call { callee, arguments } = &child.kind {
                let name = callee.as_deref().unwrap_or(ANONYMOUS_CALLEE);
                self.record(name, arguments, child.line);
            }
            self.visit(child);
        }
    }

    fn record(&mut self, name: &str, arguments: &[Parameter], line: u32) {
        let signature = CallSignature::new(name, arguments);
        match self.index.get(&signature) {
            Some(&slot) => self.records[slot].seen_lines.push(line),
            None => {
                self.index.insert(signature, self.records.len());
                self.records
                    .push(InterfaceRecord::new(name, arguments.to_vec(), line));
            }
        }
    }
}

/// Source lines around `line` (1-based), `radius` lines on each side.
pub fn context_excerpt(source: &str, line: u32, radius: usize) -> Vec<(u32, &str)> {
    let target = line as usize;
    let start = target.saturating_sub(radius + 1);
    let end = target.saturating_add(radius);
    source
        .lines()
        .enumerate()
        .skip(start)
        .take(end.saturating_sub(start))
        .map(|(idx, text)| (idx as u32 + 1, text))
        .collect()
}
