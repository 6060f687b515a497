//! Post-processing of generated text into a compilable candidate driver.
//!
//! [`synthesize`] runs a fixed pipeline of pure text steps:
//!
//! 1. extract the first fenced code block (or fall back to the whole text)
//! 2. inject missing standard and project headers
//! 3. append an entry-point stub when `LLVMFuzzerTestOneInput` is absent
//! 4. prepend the error-handling scaffold unless it is already there
//! 5. normalize blank lines and function-opening braces
//!
//! Every step checks for its own output before acting, so running the
//! pipeline on an already synthesized driver returns it unchanged.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Symbol LibFuzzer calls for every input.
pub const ENTRY_SYMBOL: &str = "LLVMFuzzerTestOneInput";

/// Standard headers injected when missing, in this order.
pub const STANDARD_HEADERS: &[&str] = &["stdint.h", "stddef.h", "stdlib.h", "string.h"];

const SCAFFOLD_GUARD: &str = "#define CHECK_NULL(";

const SCAFFOLD: &str = "\
#define CHECK_NULL(ptr) if ((ptr) == NULL) { return 0; }
#define CLEANUP_AND_RETURN(code) { cleanup(); return code; }
static void cleanup(void) {
}
";

const ENTRY_STUB: &str = "\
#ifdef __cplusplus
extern \"C\"
#endif
int LLVMFuzzerTestOneInput(const uint8_t *data, size_t size) {
    (void)data;
    (void)size;
    return 0;
}
";

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[^\n`]*\n\s*([\s\S]*?)\s*```").expect("fence pattern is valid")
});

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("blank-line pattern is valid"));

static BRACE_ON_OWN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\)\s*\n\s*\{").expect("brace pattern is valid"));

static ENTRY_OPENING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"LLVMFuzzerTestOneInput\s*\([^)]*\)\s*\{").expect("entry pattern is valid")
});

/// One applied transformation, recorded in the order it ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TransformStep {
    ExtractFencedBlock,
    UseWholeResponse,
    InjectHeaders { headers: Vec<String> },
    AppendEntryStub,
    InjectScaffold,
    Normalize,
    ApplyStrategy { strategy: FuzzStrategy },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// Project headers, included as `#include "name"` when absent.
    pub project_headers: Vec<String>,
}

impl SynthesisOptions {
    pub fn with_project_headers<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            project_headers: headers.into_iter().map(Into::into).collect(),
        }
    }
}

/// A synthesized driver and how it was derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateDriver {
    pub source: String,
    #[serde(skip)]
    pub raw_response: String,
    pub steps: Vec<TransformStep>,
}

/// Turn a raw completion into a candidate driver. Returns `None` when the
/// text is empty or its fenced block holds no code.
pub fn synthesize(raw_response: &str, options: &SynthesisOptions) -> Option<CandidateDriver> {
    if raw_response.is_empty() {
        return None;
    }
    let mut steps = Vec::new();

    let (code, step) = extract_code(raw_response);
    if step == TransformStep::ExtractFencedBlock && code.trim().is_empty() {
        return None;
    }
    steps.push(step);

    let (code, injected) = inject_headers(&code, &options.project_headers);
    if !injected.is_empty() {
        steps.push(TransformStep::InjectHeaders { headers: injected });
    }

    let code = match ensure_entry_point(&code) {
        Some(with_stub) => {
            steps.push(TransformStep::AppendEntryStub);
            with_stub
        }
        None => code,
    };

    let code = match inject_scaffold(&code) {
        Some(with_scaffold) => {
            steps.push(TransformStep::InjectScaffold);
            with_scaffold
        }
        None => code,
    };

    let source = normalize(&code);
    if source != code {
        steps.push(TransformStep::Normalize);
    }

    Some(CandidateDriver {
        source,
        raw_response: raw_response.to_string(),
        steps,
    })
}

/// First fenced block, or the whole response when there is none.
pub fn extract_code(raw_response: &str) -> (String, TransformStep) {
    match FENCED_BLOCK
        .captures(raw_response)
        .and_then(|caps| caps.get(1))
    {
        Some(block) => (block.as_str().to_string(), TransformStep::ExtractFencedBlock),
        None => (raw_response.to_string(), TransformStep::UseWholeResponse),
    }
}

/// Prepend every missing standard header followed by every missing project
/// header. Returns the new text and the headers that were added.
pub fn inject_headers(code: &str, project_headers: &[String]) -> (String, Vec<String>) {
    let mut block = String::new();
    let mut injected = Vec::new();

    for header in STANDARD_HEADERS {
        if !has_include(code, header) {
            block.push_str(&format!("#include <{}>\n", header));
            injected.push(header.to_string());
        }
    }
    for header in project_headers {
        if !has_include(code, header) {
            block.push_str(&format!("#include \"{}\"\n", header));
            injected.push(header.clone());
        }
    }

    if block.is_empty() {
        (code.to_string(), injected)
    } else {
        (format!("{}\n{}", block, code), injected)
    }
}

fn has_include(code: &str, header: &str) -> bool {
    let angled = format!("<{}>", header);
    let quoted = format!("\"{}\"", header);
    code.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("#include") && (line.contains(&angled) || line.contains(&quoted))
    })
}

/// Append the entry-point stub if the symbol does not occur anywhere.
pub fn ensure_entry_point(code: &str) -> Option<String> {
    if code.contains(ENTRY_SYMBOL) {
        None
    } else {
        Some(format!("{}\n\n{}", code.trim_end(), ENTRY_STUB))
    }
}

/// Prepend the CHECK_NULL / CLEANUP_AND_RETURN scaffold if it is absent.
pub fn inject_scaffold(code: &str) -> Option<String> {
    if code.contains(SCAFFOLD_GUARD) {
        None
    } else {
        Some(format!("{}\n{}", SCAFFOLD, code))
    }
}

/// Collapse blank-line runs and move function-opening braces onto the
/// signature line. Output always ends with exactly one newline.
pub fn normalize(code: &str) -> String {
    let collapsed = BLANK_RUN.replace_all(code, "\n\n");
    let braced = BRACE_ON_OWN_LINE.replace_all(&collapsed, ") {");
    format!("{}\n", braced.trim())
}

/// Fuzzing strategies applied to variants after the base driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzStrategy {
    BitFlip,
    StructureAware,
    Dictionary,
}

impl FuzzStrategy {
    pub const ALL: [FuzzStrategy; 3] = [
        FuzzStrategy::BitFlip,
        FuzzStrategy::StructureAware,
        FuzzStrategy::Dictionary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FuzzStrategy::BitFlip => "bit_flip",
            FuzzStrategy::StructureAware => "structure_aware",
            FuzzStrategy::Dictionary => "dictionary",
        }
    }

    fn snippet(self) -> &'static str {
        match self {
            FuzzStrategy::BitFlip => {
                "    /* bit-flip mutation of the first four bytes */
    if (size >= 4) {
        uint32_t *word = (uint32_t *)data;
        *word = *word ^ 0xFFFFFFFF;
    }
"
            }
            FuzzStrategy::StructureAware => {
                "    /* structure-aware input: magic, length, type, payload */
    struct FuzzInput {
        uint32_t magic;
        uint16_t length;
        uint8_t type;
        uint8_t payload[];
    };
    if (size >= sizeof(struct FuzzInput)) {
        const struct FuzzInput *input = (const struct FuzzInput *)data;
        if (input->magic == 0x46555A5A) {
            (void)input->length;
            (void)input->type;
        }
    }
"
            }
            FuzzStrategy::Dictionary => {
                "    /* overwrite the input prefix with interesting byte patterns */
    static const uint8_t dict[] = {
        0xFF, 0x00, 0x55, 0xAA,
        0x7F, 0xFF, 0xFF, 0xFF
    };
    if (size >= sizeof(dict)) {
        memcpy((void *)data, dict, sizeof(dict));
    }
"
            }
        }
    }

    /// Insert this strategy right after the entry point's opening brace.
    /// Returns `None` when no entry-point definition is found.
    pub fn apply(self, source: &str) -> Option<String> {
        let opening = ENTRY_OPENING.find(source)?;
        let mut out = String::with_capacity(source.len() + 512);
        out.push_str(&source[..opening.end()]);
        out.push('\n');
        out.push_str(self.snippet());
        out.push_str(&source[opening.end()..]);
        Some(out)
    }
}

/// The base candidate followed by up to `count - 1` strategy variants.
/// At most `1 + FuzzStrategy::ALL.len()` drivers are returned.
pub fn synthesize_variants(
    raw_response: &str,
    count: usize,
    options: &SynthesisOptions,
) -> Vec<CandidateDriver> {
    if count == 0 {
        return Vec::new();
    }
    let Some(base) = synthesize(raw_response, options) else {
        return Vec::new();
    };

    let mut variants = Vec::with_capacity(count.min(FuzzStrategy::ALL.len() + 1));
    for strategy in FuzzStrategy::ALL.iter().take(count - 1) {
        if let Some(source) = strategy.apply(&base.source) {
            let mut steps = base.steps.clone();
            steps.push(TransformStep::ApplyStrategy {
                strategy: *strategy,
            });
            variants.push(CandidateDriver {
                source,
                raw_response: base.raw_response.clone(),
                steps,
            });
        }
    }
    variants.insert(0, base);
    variants
}
