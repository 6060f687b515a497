//! Prompt composition for each refinement state.
//!
//! [`PromptContext`] has one variant per state that needs a prompt. Rendering
//! is an exhaustive match, and every variant ends with the same source-only
//! directive, which the candidate synthesizer relies on when it extracts the
//! code block from the response.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::artifacts::ArtifactLayout;
use crate::error::{DriverSynthError, SynthResult};
use crate::extractor::context_excerpt;
use crate::interface::InterfaceRecord;

/// Closing directive shared by every prompt.
pub const SOURCE_ONLY_DIRECTIVE: &str = "Respond with the complete C/C++ source code of the driver \
inside a single ```c fenced code block. Do not include explanations, notes or any other prose.";

/// Call-site excerpts shown with each interface in the initial prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSiteContext {
    /// Full text of the target source.
    pub source: String,
    /// Lines shown before and after each call.
    pub radius: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitialContext {
    pub interfaces: Vec<InterfaceRecord>,
    pub project_name: String,
    pub target_name: String,
    pub template_source: String,
    pub call_sites: Option<CallSiteContext>,
}

impl InitialContext {
    /// Build the context, reading the driver template verbatim from `template_path`.
    pub fn load(
        interfaces: Vec<InterfaceRecord>,
        project_name: &str,
        target_name: &str,
        template_path: &Path,
    ) -> SynthResult<Self> {
        let template_source =
            fs::read_to_string(template_path).map_err(|_| DriverSynthError::TemplateNotFound {
                path: template_path.to_path_buf(),
            })?;
        Ok(Self {
            interfaces,
            project_name: project_name.to_string(),
            target_name: target_name.to_string(),
            template_source,
            call_sites: None,
        })
    }

    pub fn with_call_sites(mut self, source: String, radius: usize) -> Self {
        self.call_sites = Some(CallSiteContext { source, radius });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileErrorContext {
    pub prior_driver_source: String,
    pub error_log_text: String,
}

impl CompileErrorContext {
    /// Load the persisted candidate and error log.
    pub fn from_artifacts(layout: &ArtifactLayout) -> SynthResult<Self> {
        Ok(Self {
            prior_driver_source: read_artifact(&layout.candidate_path())?,
            error_log_text: read_artifact(&layout.error_log_path())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowCoverageContext {
    pub prior_driver_source: String,
    pub coverage_report_text: String,
}

impl LowCoverageContext {
    /// Load the persisted candidate and coverage report.
    pub fn from_artifacts(layout: &ArtifactLayout) -> SynthResult<Self> {
        Ok(Self {
            prior_driver_source: read_artifact(&layout.candidate_path())?,
            coverage_report_text: read_artifact(&layout.coverage_report_path())?,
        })
    }
}

fn read_artifact(path: &Path) -> SynthResult<String> {
    fs::read_to_string(path).map_err(|_| DriverSynthError::ArtifactNotFound {
        path: path.to_path_buf(),
    })
}

/// Input for exactly one prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptContext {
    Initial(InitialContext),
    CompileError(CompileErrorContext),
    LowCoverage(LowCoverageContext),
}

impl PromptContext {
    pub fn render(&self) -> String {
        match self {
            PromptContext::Initial(ctx) => render_initial(ctx),
            PromptContext::CompileError(ctx) => render_compile_error(ctx),
            PromptContext::LowCoverage(ctx) => render_low_coverage(ctx),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PromptContext::Initial(_) => "initial",
            PromptContext::CompileError(_) => "compile_error",
            PromptContext::LowCoverage(_) => "low_coverage",
        }
    }
}

fn render_initial(ctx: &InitialContext) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are a code assistant specializing in fuzz testing. Write a LibFuzzer fuzz driver \
         for the `{}` target of the `{}` project.",
        ctx.target_name, ctx.project_name
    );
    out.push('\n');

    if ctx.interfaces.is_empty() {
        out.push_str("No call-site interfaces were extracted; exercise the target's public API.\n\n");
    } else {
        out.push_str("The target's entry point calls the following functions:\n\n");
    }

    for interface in &ctx.interfaces {
        let _ = writeln!(out, "### Function: {}", interface.function_name);
        out.push_str("Parameters:\n");
        if interface.parameters.is_empty() {
            out.push_str("- (none)\n");
        }
        for param in &interface.parameters {
            let _ = writeln!(out, "- {} {}", param.type_name, param.name);
        }
        let lines = interface
            .seen_lines
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "Seen on lines: {}", lines);

        if let Some(sites) = &ctx.call_sites {
            out.push_str("Context:\n");
            for &line in &interface.seen_lines {
                let _ = writeln!(out, "Line {}:", line);
                for (number, text) in context_excerpt(&sites.source, line, sites.radius) {
                    let marker = if number == line { "->" } else { "  " };
                    let _ = writeln!(out, "{} {:>5}: {}", marker, number, text);
                }
            }
        }
        out.push('\n');
    }

    out.push_str("Use this driver as a structural template:\n");
    push_fenced(&mut out, "c", &ctx.template_source);

    out.push_str(
        "Requirements:\n\
         1. Implement the LibFuzzer entry point \
         `int LLVMFuzzerTestOneInput(const uint8_t *data, size_t size)`.\n\
         2. Derive parameter values from the fuzzer input and call each function listed above.\n\
         3. Handle empty, truncated and malformed input gracefully.\n\
         4. Release every resource acquired during an iteration before returning 0.\n\n",
    );
    out.push_str(SOURCE_ONLY_DIRECTIVE);
    out.push('\n');
    out
}

fn render_compile_error(ctx: &CompileErrorContext) -> String {
    let mut out = String::new();
    out.push_str("The following LibFuzzer fuzz driver failed to build or run.\n\n");
    out.push_str("Driver source:\n");
    push_fenced(&mut out, "c", &ctx.prior_driver_source);
    out.push_str("Diagnostics:\n");
    push_fenced(&mut out, "", &ctx.error_log_text);
    out.push_str(
        "Fix every problem reported above and return the corrected driver only. \
         Keep the LLVMFuzzerTestOneInput entry point.\n\n",
    );
    out.push_str(SOURCE_ONLY_DIRECTIVE);
    out.push('\n');
    out
}

fn render_low_coverage(ctx: &LowCoverageContext) -> String {
    let mut out = String::new();
    out.push_str(
        "The following LibFuzzer fuzz driver builds and runs, but its code coverage is too low.\n\n",
    );
    out.push_str("Driver source:\n");
    push_fenced(&mut out, "c", &ctx.prior_driver_source);
    out.push_str("Coverage report:\n");
    push_fenced(&mut out, "", &ctx.coverage_report_text);
    out.push_str(
        "Rewrite the driver so that it reaches the uncovered functions, regions and branches \
         shown above and increases coverage. Keep the LLVMFuzzerTestOneInput entry point.\n\n",
    );
    out.push_str(SOURCE_ONLY_DIRECTIVE);
    out.push('\n');
    out
}

/// Embed `text` unchanged in a fenced block. The closing fence always starts
/// its own line.
fn push_fenced(out: &mut String, lang: &str, text: &str) {
    out.push_str("```");
    out.push_str(lang);
    out.push('\n');
    out.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("```\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::Parameter;

    fn initial() -> InitialContext {
        InitialContext {
            interfaces: vec![InterfaceRecord {
                function_name: "xmlReadFile".to_string(),
                parameters: vec![
                    Parameter::new("const char *", "filename"),
                    Parameter::new("int", "options"),
                ],
                seen_lines: vec![3],
            }],
            project_name: "libxml2".to_string(),
            target_name: "xmllint".to_string(),
            template_source: "int LLVMFuzzerTestOneInput(const uint8_t *d, size_t n) { return 0; }\n"
                .to_string(),
            call_sites: None,
        }
    }

    #[test]
    fn test_initial_prompt_lists_interfaces() {
        let text = PromptContext::Initial(initial()).render();
        assert!(text.contains("`xmllint` target of the `libxml2` project"));
        assert!(text.contains("### Function: xmlReadFile"));
        assert!(text.contains("- const char * filename"));
        assert!(text.contains("Seen on lines: 3"));
        assert!(text.contains("LLVMFuzzerTestOneInput"));
        assert!(text.trim_end().ends_with(SOURCE_ONLY_DIRECTIVE));
        assert!(!text.contains("Context:"));
    }

    #[test]
    fn test_initial_prompt_marks_call_line() {
        let source = "a();\nb();\nxmlReadFile(name, 0);\nc();\n".to_string();
        let text = PromptContext::Initial(initial().with_call_sites(source, 1)).render();
        assert!(text.contains("Line 3:"));
        assert!(text.contains("->     3: xmlReadFile(name, 0);"));
        assert!(text.contains("       2: b();"));
    }

    #[test]
    fn test_compile_error_prompt_is_verbatim() {
        let ctx = CompileErrorContext {
            prior_driver_source: "int main() { oops }".to_string(),
            error_log_text: "raw.c:1:14: error: use of undeclared identifier 'oops'".to_string(),
        };
        let text = PromptContext::CompileError(ctx).render();
        assert!(text.contains("int main() { oops }"));
        assert!(text.contains("raw.c:1:14: error: use of undeclared identifier 'oops'"));
        assert!(text.trim_end().ends_with(SOURCE_ONLY_DIRECTIVE));
    }

    #[test]
    fn test_low_coverage_prompt_includes_report() {
        let ctx = LowCoverageContext {
            prior_driver_source: "driver".to_string(),
            coverage_report_text: "TOTAL 10 5 50.00%".to_string(),
        };
        let prompt = PromptContext::LowCoverage(ctx);
        assert_eq!(prompt.kind(), "low_coverage");
        let text = prompt.render();
        assert!(text.contains("TOTAL 10 5 50.00%"));
        assert!(text.contains("increases coverage"));
    }

    #[test]
    fn test_template_and_log_are_embedded_unchanged() {
        let mut ctx = initial();
        ctx.template_source = "/* model */\nint x;\n\n\n".to_string();
        let text = PromptContext::Initial(ctx).render();
        assert!(text.contains("```c\n/* model */\nint x;\n\n\n```\n"));

        let ctx = CompileErrorContext {
            prior_driver_source: "int y;".to_string(),
            error_log_text: "  warning: trailing  \n\n".to_string(),
        };
        let text = PromptContext::CompileError(ctx).render();
        assert!(text.contains("```c\nint y;\n```\n"));
        assert!(text.contains("```\n  warning: trailing  \n\n```\n"));
    }

    #[test]
    fn test_missing_template_is_reported() {
        let err = InitialContext::load(vec![], "p", "t", Path::new("/nonexistent/model.c"))
            .unwrap_err();
        assert_eq!(err.kind(), "template_not_found");
    }

    #[test]
    fn test_missing_artifacts_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        let err = CompileErrorContext::from_artifacts(&layout).unwrap_err();
        assert_eq!(err.kind(), "artifact_not_found");
        let err = LowCoverageContext::from_artifacts(&layout).unwrap_err();
        assert_eq!(err.kind(), "artifact_not_found");
    }
}
