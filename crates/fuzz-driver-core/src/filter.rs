//! Removal of uninteresting interfaces.
//!
//! Two sources of noise are dropped: well-known library calls (a fixed
//! denylist, optionally extended by configuration) and functions that the
//! target file itself defines as `static` or decorates with a `*_ATTR_*`
//! macro. The latter are found with a lexical scan, not the syntax tree.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DriverSynthError, SynthResult};
use crate::interface::InterfaceRecord;

/// Standard I/O, memory and string primitives plus process-control calls that
/// never make useful fuzzing targets.
pub const EXCLUDED_FUNCTIONS: &[&str] = &[
    "printf", "fprintf", "sprintf", "snprintf", "vfprintf", "puts", "fputs", "putchar",
    "fputc", "perror", "fopen", "fclose", "fflush", "malloc", "calloc", "realloc", "free",
    "memcpy", "memmove", "memset", "memcmp", "strcmp", "strncmp", "strcpy", "strncpy",
    "strcat", "strncat", "strlen", "strdup", "strchr", "strrchr", "strstr", "exit", "abort",
    "atoi", "getenv",
];

/// A line opening with `static` or a `FOO_ATTR_BAR` decoration.
static LOCAL_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:static\b|[A-Za-z0-9_]*_ATTR_[A-Za-z0-9_]*\b)")
        .expect("local definition pattern is valid")
});

/// `name(` anywhere in a declaration head.
static CALL_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("call-like pattern is valid")
});

/// Names excluded from the interface list for one target file.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    excluded: BTreeSet<String>,
    local_definitions: BTreeSet<String>,
}

impl FilterConfig {
    /// Build the filter for `source`, extending the fixed denylist with `extra`.
    pub fn for_source<S: AsRef<str>>(source: &str, extra: &[S]) -> Self {
        let excluded = EXCLUDED_FUNCTIONS
            .iter()
            .map(|name| name.to_string())
            .chain(extra.iter().map(|name| name.as_ref().to_string()))
            .collect();
        Self {
            excluded,
            local_definitions: local_definitions(source),
        }
    }

    pub fn is_excluded(&self, function_name: &str) -> bool {
        self.excluded.contains(function_name) || self.local_definitions.contains(function_name)
    }

    pub fn local_definitions(&self) -> &BTreeSet<String> {
        &self.local_definitions
    }

    /// Keep records whose function is not excluded, preserving order.
    pub fn apply(&self, records: &[InterfaceRecord]) -> Vec<InterfaceRecord> {
        records
            .iter()
            .filter(|record| !self.is_excluded(&record.function_name))
            .cloned()
            .collect()
    }
}

/// Filter `records` against the fixed denylist, `extra` and the static/macro
/// definitions of `source_file`. The file is read once.
pub fn filter_interfaces<S: AsRef<str>>(
    records: &[InterfaceRecord],
    source_file: &Path,
    extra: &[S],
) -> SynthResult<Vec<InterfaceRecord>> {
    let bytes =
        fs::read(source_file).map_err(|e| DriverSynthError::parse(source_file, e.to_string()))?;
    let source = String::from_utf8_lossy(&bytes);
    Ok(FilterConfig::for_source(&source, extra).apply(records))
}

/// Names of functions the source defines or declares as `static` or with an
/// `*_ATTR_*` decoration.
pub fn local_definitions(source: &str) -> BTreeSet<String> {
    LOCAL_DEFINITION
        .find_iter(source)
        .filter_map(|m| declared_name(&source[m.start()..]))
        .collect()
}

fn is_attribute(name: &str) -> bool {
    name == "__attribute__" || name.contains("_ATTR_")
}

/// The function name of a declaration head: the first `name(` that is not an
/// attribute, looking no further than the first `;`, `{`, `}` or `=`.
fn declared_name(decl: &str) -> Option<String> {
    let end = decl.find([';', '{', '}', '=']).unwrap_or(decl.len());
    let mut rest = &decl[..end];
    loop {
        let caps = CALL_LIKE.captures(rest)?;
        let name = caps.get(1)?.as_str();
        if !is_attribute(name) {
            return Some(name.to_string());
        }
        let open = caps.get(0)?.end() - 1;
        rest = skip_parenthesized(&rest[open..])?;
    }
}

/// Text after the parenthesized group that `text` starts with.
fn skip_parenthesized(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[idx + 1..]);
                }
            }
            _ => {}
        }
    }
    None
}
