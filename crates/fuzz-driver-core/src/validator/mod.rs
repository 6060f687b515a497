//! Compile, run and measure a candidate driver.
//!
//! Validation is a sequential pipeline that stops at the first failing stage:
//!
//! | Stage | Failure outcome |
//! |-------|-----------------|
//! | candidate exists and is non-empty | `CompilationError` |
//! | compile command exits 0 | `CompilationError` |
//! | fuzz binary exits 0 within its budget | `RuntimeError` |
//! | profile merge, `show` and `report` succeed | `CoverageGenerationFailed` |
//! | `TOTAL` row parses | `CoverageExtractionFailed` |
//! | score reaches the threshold | `LowCoverage` |
//!
//! The error log is truncated at the start of every call. The coverage
//! artifact is rewritten whenever coverage generation succeeds.

mod coverage;
mod process;

pub use coverage::{parse_coverage_summary, CoverageParseError, PERCENT_FIELDS, TOTAL_MARKER};
pub use process::{ProcessOutput, ProcessSpec};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifacts::{write_artifact, ArtifactLayout};
use crate::error::SynthResult;

/// Default acceptance threshold, in percent.
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 80.0;

/// Classification of one validation pass. Every variant carries the text
/// that explains it: a diagnostic log or a coverage report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid { coverage: f64, report: String },
    CompilationError { log: String },
    RuntimeError { log: String },
    CoverageGenerationFailed { log: String },
    CoverageExtractionFailed { log: String },
    LowCoverage { coverage: f64, report: String },
}

impl ValidationOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Valid { .. } => "valid",
            Self::CompilationError { .. } => "compilation_error",
            Self::RuntimeError { .. } => "runtime_error",
            Self::CoverageGenerationFailed { .. } => "coverage_generation_failed",
            Self::CoverageExtractionFailed { .. } => "coverage_extraction_failed",
            Self::LowCoverage { .. } => "low_coverage",
        }
    }

    /// The log or report text attached to this outcome.
    pub fn artifact(&self) -> &str {
        match self {
            Self::Valid { report, .. } | Self::LowCoverage { report, .. } => report,
            Self::CompilationError { log }
            | Self::RuntimeError { log }
            | Self::CoverageGenerationFailed { log }
            | Self::CoverageExtractionFailed { log } => log,
        }
    }

    pub fn coverage(&self) -> Option<f64> {
        match self {
            Self::Valid { coverage, .. } | Self::LowCoverage { coverage, .. } => Some(*coverage),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Capability that classifies a persisted candidate.
pub trait CandidateValidator {
    fn validate(&self, candidate: &Path) -> SynthResult<ValidationOutcome>;
}

impl<T: CandidateValidator + ?Sized> CandidateValidator for &T {
    fn validate(&self, candidate: &Path) -> SynthResult<ValidationOutcome> {
        (**self).validate(candidate)
    }
}

/// External tools and budgets used by [`DriverValidator`].
#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    /// Compiler argv. `{driver}`, `{binary}` and `{target}` are substituted.
    pub compile_command: Vec<String>,
    pub target_file: PathBuf,
    pub binary_path: PathBuf,
    pub threshold: f64,
    pub profdata_tool: String,
    pub cov_tool: String,
    pub fuzz_seconds: u64,
    pub grace_seconds: u64,
    pub fuzz_args: Vec<String>,
}

impl ValidatorSettings {
    fn compile_spec(&self, driver: &Path) -> ProcessSpec {
        let driver = driver.to_string_lossy();
        let binary = self.binary_path.to_string_lossy();
        let target = self.target_file.to_string_lossy();
        ProcessSpec::new(self.compile_command.iter().map(|arg| {
            arg.replace("{driver}", &driver)
                .replace("{binary}", &binary)
                .replace("{target}", &target)
        }))
    }
}

/// The real compile/run/coverage pipeline.
#[derive(Debug, Clone)]
pub struct DriverValidator {
    settings: ValidatorSettings,
    layout: ArtifactLayout,
}

impl DriverValidator {
    pub fn new(settings: ValidatorSettings, layout: ArtifactLayout) -> Self {
        Self { settings, layout }
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    fn fail_with_log(
        &self,
        log: String,
        outcome: fn(String) -> ValidationOutcome,
    ) -> SynthResult<ValidationOutcome> {
        write_artifact(&self.layout.error_log_path(), &log)?;
        Ok(outcome(log))
    }

    fn compile(&self, candidate: &Path) -> SynthResult<Option<ValidationOutcome>> {
        let spec = self.settings.compile_spec(candidate);
        debug!(command = %spec.display(), "compiling candidate");
        let log = match spec.run() {
            Ok(output) if output.success() => return Ok(None),
            Ok(output) => output.combined(),
            Err(e) => format!("failed to run compiler `{}`: {}", spec.display(), e),
        };
        self.fail_with_log(log, |log| ValidationOutcome::CompilationError { log })
            .map(Some)
    }

    fn execute(&self) -> SynthResult<Option<ValidationOutcome>> {
        let profraw = self.layout.profraw_path();
        let _ = fs::remove_file(&profraw);

        let mut argv = vec![
            self.settings.binary_path.to_string_lossy().into_owned(),
            format!("-max_total_time={}", self.settings.fuzz_seconds),
        ];
        argv.extend(self.settings.fuzz_args.iter().cloned());
        let budget = Duration::from_secs(self.settings.fuzz_seconds + self.settings.grace_seconds);
        let spec = ProcessSpec::new(argv)
            .env("LLVM_PROFILE_FILE", &profraw)
            .timeout(budget);

        debug!(command = %spec.display(), budget_secs = budget.as_secs(), "running fuzz binary");
        let log = match spec.run() {
            Ok(output) if output.success() => return Ok(None),
            Ok(output) => format!(
                "fuzz binary failed ({})\n{}",
                output.describe_exit(),
                output.combined()
            ),
            Err(e) => format!("failed to run fuzz binary `{}`: {}", spec.display(), e),
        };
        self.fail_with_log(log, |log| ValidationOutcome::RuntimeError { log })
            .map(Some)
    }

    /// Merge the raw profile and collect the `show` and `report` outputs.
    fn generate_coverage(&self) -> Result<(String, String), String> {
        let profraw = self.layout.profraw_path();
        let profdata = self.layout.profdata_path();
        let binary = self.settings.binary_path.to_string_lossy().into_owned();
        let instr_profile = format!("-instr-profile={}", profdata.to_string_lossy());

        let merge = ProcessSpec::new([
            self.settings.profdata_tool.clone(),
            "merge".to_string(),
            "-sparse".to_string(),
            profraw.to_string_lossy().into_owned(),
            "-o".to_string(),
            profdata.to_string_lossy().into_owned(),
        ]);
        run_tool(&merge)?;

        let show = ProcessSpec::new([
            self.settings.cov_tool.clone(),
            "show".to_string(),
            binary.clone(),
            instr_profile.clone(),
        ]);
        let detail = run_tool(&show)?;

        let report = ProcessSpec::new([
            self.settings.cov_tool.clone(),
            "report".to_string(),
            binary,
            instr_profile,
        ]);
        let summary = run_tool(&report)?;

        Ok((detail, summary))
    }
}

fn run_tool(spec: &ProcessSpec) -> Result<String, String> {
    match spec.run() {
        Ok(output) if output.success() => Ok(output.stdout_text()),
        Ok(output) => Err(format!(
            "`{}` failed ({})\n{}",
            spec.display(),
            output.describe_exit(),
            output.combined()
        )),
        Err(e) => Err(format!("failed to run `{}`: {}", spec.display(), e)),
    }
}

impl CandidateValidator for DriverValidator {
    fn validate(&self, candidate: &Path) -> SynthResult<ValidationOutcome> {
        self.layout.ensure_dirs()?;
        write_artifact(&self.layout.error_log_path(), "")?;

        match fs::read_to_string(candidate) {
            Ok(source) if !source.trim().is_empty() => {}
            Ok(_) => {
                let log = format!("candidate driver is empty: {}", candidate.display());
                return self.fail_with_log(log, |log| ValidationOutcome::CompilationError { log });
            }
            Err(e) => {
                let log = format!("candidate driver unreadable: {}: {}", candidate.display(), e);
                return self.fail_with_log(log, |log| ValidationOutcome::CompilationError { log });
            }
        }

        if let Some(outcome) = self.compile(candidate)? {
            info!(outcome = outcome.kind(), "candidate rejected");
            return Ok(outcome);
        }
        if let Some(outcome) = self.execute()? {
            info!(outcome = outcome.kind(), "candidate rejected");
            return Ok(outcome);
        }

        let (detail, summary) = match self.generate_coverage() {
            Ok(reports) => reports,
            Err(log) => {
                warn!("coverage generation failed");
                return self.fail_with_log(log, |log| {
                    ValidationOutcome::CoverageGenerationFailed { log }
                });
            }
        };
        let report = format!("{}\n{}", detail.trim_end(), summary);
        write_artifact(&self.layout.coverage_report_path(), &report)?;

        let coverage = match parse_coverage_summary(&summary) {
            Ok(score) => score,
            Err(e) => {
                warn!(error = %e, "coverage summary did not parse");
                let log = format!("{}\n\n{}", e, summary);
                return self.fail_with_log(log, |log| {
                    ValidationOutcome::CoverageExtractionFailed { log }
                });
            }
        };

        let outcome = if coverage >= self.settings.threshold {
            ValidationOutcome::Valid { coverage, report }
        } else {
            ValidationOutcome::LowCoverage { coverage, report }
        };
        info!(
            outcome = outcome.kind(),
            coverage,
            threshold = self.settings.threshold,
            "candidate measured"
        );
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::process::Command;

    const TOTAL_92_5: &str = "TOTAL 40 4 90.00% 20 3 85.00% 200 10 95.00% 10 0 100.00%";
    const TOTAL_50: &str = "TOTAL 40 20 50.00% 20 10 50.00% 200 100 50.00% 10 5 50.00%";

    /// Install an executable script. The file is created by `cp` so that no
    /// writable descriptor to it stays open in this process.
    fn install_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let src = dir.join(format!("{}.src", name));
        fs::write(&src, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).unwrap();
        let dest = dir.join(name);
        let status = Command::new("cp").arg(&src).arg(&dest).status().unwrap();
        assert!(status.success());
        dest
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        layout: ArtifactLayout,
        candidate: PathBuf,
        settings: ValidatorSettings,
    }

    fn fixture(fuzzer_body: &str, total_row: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("tools");
        fs::create_dir_all(&tools).unwrap();

        let fuzzer = install_script(&tools, "fuzzer", fuzzer_body);
        let profdata = install_script(&tools, "llvm-profdata", "exit 0");
        let cov = install_script(
            &tools,
            "llvm-cov",
            &format!(
                "if [ \"$1\" = show ]; then echo '    1|  5|int parse(void) {{'; else echo 'Filename Regions'; echo '{}'; fi",
                total_row
            ),
        );

        let layout = ArtifactLayout::new(dir.path().join("out"));
        layout.ensure_dirs().unwrap();
        let candidate = layout.candidate_path();
        fs::write(&candidate, "int LLVMFuzzerTestOneInput(void) { return 0; }\n").unwrap();

        let settings = ValidatorSettings {
            compile_command: vec![
                "cp".to_string(),
                fuzzer.to_string_lossy().into_owned(),
                "{binary}".to_string(),
            ],
            target_file: dir.path().join("target.c"),
            binary_path: layout.default_binary_path(),
            threshold: DEFAULT_COVERAGE_THRESHOLD,
            profdata_tool: profdata.to_string_lossy().into_owned(),
            cov_tool: cov.to_string_lossy().into_owned(),
            fuzz_seconds: 1,
            grace_seconds: 5,
            fuzz_args: vec![],
        };
        Fixture {
            _dir: dir,
            layout,
            candidate,
            settings,
        }
    }

    fn validator(fx: &Fixture) -> DriverValidator {
        DriverValidator::new(fx.settings.clone(), fx.layout.clone())
    }

    #[test]
    fn test_valid_candidate() {
        let fx = fixture("echo 'INFO: Done 100 runs'", TOTAL_92_5);
        let outcome = validator(&fx).validate(&fx.candidate).unwrap();
        assert_eq!(outcome.kind(), "valid");
        assert_eq!(outcome.coverage(), Some(92.5));

        let report = fs::read_to_string(fx.layout.coverage_report_path()).unwrap();
        assert!(report.contains("int parse(void)"));
        assert!(report.contains(TOTAL_92_5));
        assert_eq!(fs::read_to_string(fx.layout.error_log_path()).unwrap(), "");
    }

    #[test]
    fn test_low_coverage() {
        let fx = fixture("exit 0", TOTAL_50);
        let outcome = validator(&fx).validate(&fx.candidate).unwrap();
        assert!(matches!(
            outcome,
            ValidationOutcome::LowCoverage { coverage, .. } if coverage == 50.0
        ));
        assert!(outcome.artifact().contains(TOTAL_50));
    }

    #[test]
    fn test_compile_failure_log_is_verbatim() {
        let mut fx = fixture("exit 0", TOTAL_92_5);
        let diagnostic = "raw.c:3:5: error: unknown type name 'xmlDocPtr'";
        fx.settings.compile_command = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("echo \"{}\" >&2; exit 1", diagnostic),
        ];
        let outcome = validator(&fx).validate(&fx.candidate).unwrap();
        assert_eq!(outcome.kind(), "compilation_error");
        let log = fs::read_to_string(fx.layout.error_log_path()).unwrap();
        assert!(log.contains(diagnostic));
        assert_eq!(outcome.artifact(), log);
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let mut fx = fixture("exit 0", TOTAL_92_5);
        fx.settings.compile_command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo \"$0 $1\"; exit 1".to_string(),
            "{driver}".to_string(),
            "{target}".to_string(),
        ];
        let outcome = validator(&fx).validate(&fx.candidate).unwrap();
        assert!(outcome.artifact().contains("candidate_fuzz_drivers/raw.c"));
        assert!(outcome.artifact().contains("target.c"));
    }

    #[test]
    fn test_empty_candidate_is_compilation_error() {
        let fx = fixture("exit 0", TOTAL_92_5);
        fs::write(&fx.candidate, "  \n").unwrap();
        let outcome = validator(&fx).validate(&fx.candidate).unwrap();
        assert_eq!(outcome.kind(), "compilation_error");

        fs::remove_file(&fx.candidate).unwrap();
        let outcome = validator(&fx).validate(&fx.candidate).unwrap();
        assert_eq!(outcome.kind(), "compilation_error");
    }

    #[test]
    fn test_runtime_failure() {
        let fx = fixture("echo '==1==ERROR: AddressSanitizer: heap-buffer-overflow'; exit 1", TOTAL_92_5);
        let outcome = validator(&fx).validate(&fx.candidate).unwrap();
        assert_eq!(outcome.kind(), "runtime_error");
        assert!(outcome.artifact().contains("heap-buffer-overflow"));
        assert!(outcome.artifact().contains("exit code 1"));
    }

    #[test]
    fn test_coverage_tool_failure() {
        let mut fx = fixture("exit 0", TOTAL_92_5);
        fx.settings.profdata_tool = fx
            ._dir
            .path()
            .join("missing-profdata")
            .to_string_lossy()
            .into_owned();
        let outcome = validator(&fx).validate(&fx.candidate).unwrap();
        assert_eq!(outcome.kind(), "coverage_generation_failed");
    }

    #[test]
    fn test_malformed_summary() {
        let fx = fixture("exit 0", "TOTAL 1 2 3");
        let outcome = validator(&fx).validate(&fx.candidate).unwrap();
        assert_eq!(outcome.kind(), "coverage_extraction_failed");
        assert!(fs::read_to_string(fx.layout.error_log_path())
            .unwrap()
            .contains("found 0"));
    }

    #[test]
    fn test_error_log_truncated_between_passes() {
        let mut fx = fixture("exit 0", TOTAL_92_5);
        let good = fx.settings.compile_command.clone();
        fx.settings.compile_command = vec!["sh".into(), "-c".into(), "echo broken; exit 1".into()];
        validator(&fx).validate(&fx.candidate).unwrap();
        assert!(!fs::read_to_string(fx.layout.error_log_path()).unwrap().is_empty());

        fx.settings.compile_command = good;
        let outcome = validator(&fx).validate(&fx.candidate).unwrap();
        assert!(outcome.is_valid());
        assert_eq!(fs::read_to_string(fx.layout.error_log_path()).unwrap(), "");
    }
}
