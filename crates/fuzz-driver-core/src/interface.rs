//! Interface records extracted from call sites.

use serde::{Deserialize, Serialize};

/// Name recorded for calls whose callee cannot be named statically
/// (calls through function-pointer expressions).
pub const ANONYMOUS_CALLEE: &str = "(anonymous function)";

/// One argument at a call site: its type spelling and the expression text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
}

impl Parameter {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
        }
    }
}

/// Identity key of an interface: callee name plus ordered parameter types.
///
/// Parameter names do not participate, so `f(a, b)` and `f(x, y)` with the
/// same argument types are the same interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSignature {
    pub function_name: String,
    pub parameter_types: Vec<String>,
}

impl CallSignature {
    pub fn new(function_name: impl Into<String>, parameters: &[Parameter]) -> Self {
        Self {
            function_name: function_name.into(),
            parameter_types: parameters.iter().map(|p| p.type_name.clone()).collect(),
        }
    }
}

/// A deduplicated interface together with every line it was seen on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub function_name: String,
    pub parameters: Vec<Parameter>,
    /// Source lines of every call site, in traversal order. Never empty.
    pub seen_lines: Vec<u32>,
}

impl InterfaceRecord {
    pub fn new(function_name: impl Into<String>, parameters: Vec<Parameter>, line: u32) -> Self {
        Self {
            function_name: function_name.into(),
            parameters,
            seen_lines: vec![line],
        }
    }

    pub fn signature(&self) -> CallSignature {
        CallSignature::new(self.function_name.clone(), &self.parameters)
    }

    pub fn is_anonymous(&self) -> bool {
        self.function_name == ANONYMOUS_CALLEE
    }

    /// `name(type a, type b)` rendering used in prompts and reports.
    pub fn display_signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.type_name, p.name).trim().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.function_name, params)
    }
}
