//! The bounded generate → validate → re-prompt loop.
//!
//! Every iteration builds a [`PromptContext`] from the current
//! [`RefinementState`], asks the [`TextGenerator`] for a driver, post-processes
//! it, persists it and validates it. All rejections share one iteration
//! budget. Generation failures end the run immediately.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::artifacts::{write_artifact, ArtifactLayout};
use crate::candidate::{synthesize, CandidateDriver, SynthesisOptions, TransformStep};
use crate::error::{DriverSynthError, SynthResult};
use crate::generation::TextGenerator;
use crate::prompt::{CompileErrorContext, InitialContext, LowCoverageContext, PromptContext};
use crate::validator::{CandidateValidator, ValidationOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementState {
    Init,
    CompileErr,
    LowCov,
    Success,
    Exhausted,
}

impl RefinementState {
    /// State selected by a validation outcome.
    pub fn after(outcome: &ValidationOutcome) -> Self {
        match outcome {
            ValidationOutcome::Valid { .. } => Self::Success,
            ValidationOutcome::CompilationError { .. }
            | ValidationOutcome::RuntimeError { .. }
            | ValidationOutcome::CoverageGenerationFailed { .. }
            | ValidationOutcome::CoverageExtractionFailed { .. } => Self::CompileErr,
            ValidationOutcome::LowCoverage { .. } => Self::LowCov,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Exhausted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::CompileErr => "compile_err",
            Self::LowCov => "low_cov",
            Self::Success => "success",
            Self::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub layout: ArtifactLayout,
    pub synthesis: SynthesisOptions,
}

/// One iteration as recorded in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub state: RefinementState,
    pub outcome: String,
    pub coverage: Option<f64>,
    pub candidate_sha256: String,
    pub steps: Vec<TransformStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Exhausted,
}

/// Result of a completed run. Written to `run_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub generator: String,
    pub max_iterations: u32,
    pub iterations: Vec<IterationRecord>,
    /// Accepted driver location on success.
    pub validated_driver: Option<PathBuf>,
    /// Last candidate left in place on exhaustion.
    pub last_candidate: Option<PathBuf>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }
}

pub struct RefinementLoop<'a, G: ?Sized, V: ?Sized> {
    generator: &'a G,
    validator: &'a V,
    settings: LoopSettings,
}

impl<'a, G, V> RefinementLoop<'a, G, V>
where
    G: TextGenerator + ?Sized,
    V: CandidateValidator + ?Sized,
{
    pub fn new(generator: &'a G, validator: &'a V, settings: LoopSettings) -> Self {
        Self {
            generator,
            validator,
            settings,
        }
    }

    /// Drive the loop from `Init` until `Success` or the budget is spent.
    pub fn run(&self, initial: InitialContext) -> SynthResult<RunReport> {
        let started_at = Utc::now();
        let layout = &self.settings.layout;
        layout.ensure_dirs()?;

        let mut state = RefinementState::Init;
        let mut last: Option<(CandidateDriver, ValidationOutcome)> = None;
        let mut iterations = Vec::new();

        for iteration in 1..=self.settings.max_iterations {
            let context = match (state, &last) {
                (RefinementState::Init, _) | (_, None) => PromptContext::Initial(initial.clone()),
                (RefinementState::CompileErr, Some((candidate, outcome))) => {
                    PromptContext::CompileError(CompileErrorContext {
                        prior_driver_source: candidate.source.clone(),
                        error_log_text: outcome.artifact().to_string(),
                    })
                }
                (RefinementState::LowCov, Some((candidate, outcome))) => {
                    PromptContext::LowCoverage(LowCoverageContext {
                        prior_driver_source: candidate.source.clone(),
                        coverage_report_text: outcome.artifact().to_string(),
                    })
                }
                (RefinementState::Success | RefinementState::Exhausted, Some(_)) => break,
            };

            info!(
                iteration,
                state = state.as_str(),
                prompt = context.kind(),
                "requesting driver"
            );
            let candidate = self.generate(&context)?;

            let candidate_path = layout.candidate_path();
            write_artifact(&candidate_path, &candidate.source)?;
            let outcome = self.validator.validate(&candidate_path)?;

            state = RefinementState::after(&outcome);
            info!(
                iteration,
                outcome = outcome.kind(),
                coverage = outcome.coverage(),
                next = state.as_str(),
                "iteration finished"
            );
            iterations.push(IterationRecord {
                iteration,
                state: match &context {
                    PromptContext::Initial(_) => RefinementState::Init,
                    PromptContext::CompileError(_) => RefinementState::CompileErr,
                    PromptContext::LowCoverage(_) => RefinementState::LowCov,
                },
                outcome: outcome.kind().to_string(),
                coverage: outcome.coverage(),
                candidate_sha256: hex::encode(Sha256::digest(candidate.source.as_bytes())),
                steps: candidate.steps.clone(),
            });
            last = Some((candidate, outcome));

            if state == RefinementState::Success {
                break;
            }
        }

        let report = if state == RefinementState::Success {
            let validated = layout.validated_path();
            let source = last
                .as_ref()
                .map(|(candidate, _)| candidate.source.as_str())
                .unwrap_or_default();
            write_artifact(&validated, source)?;
            info!(path = %validated.display(), "driver accepted");
            self.report(RunStatus::Success, started_at, iterations, Some(validated), None)
        } else {
            warn!(
                max_iterations = self.settings.max_iterations,
                "iteration budget exhausted"
            );
            let last_candidate = last.as_ref().map(|_| layout.candidate_path());
            self.report(RunStatus::Exhausted, started_at, iterations, None, last_candidate)
        };

        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| DriverSynthError::artifact_write(&layout.summary_path(), e.into()))?;
        write_artifact(&layout.summary_path(), &json)?;
        Ok(report)
    }

    fn generate(&self, context: &PromptContext) -> SynthResult<CandidateDriver> {
        let prompt = context.render();
        let response = self
            .generator
            .generate(&prompt)
            .map_err(|e| DriverSynthError::generation(format!("{:#}", e)))?;
        if response.trim().is_empty() {
            return Err(DriverSynthError::generation("empty completion"));
        }
        synthesize(&response, &self.settings.synthesis)
            .ok_or_else(|| DriverSynthError::generation("completion contains no usable code"))
    }

    fn report(
        &self,
        status: RunStatus,
        started_at: DateTime<Utc>,
        iterations: Vec<IterationRecord>,
        validated_driver: Option<PathBuf>,
        last_candidate: Option<PathBuf>,
    ) -> RunReport {
        RunReport {
            status,
            started_at,
            finished_at: Utc::now(),
            generator: self.generator.name().to_string(),
            max_iterations: self.settings.max_iterations,
            iterations,
            validated_driver,
            last_candidate,
        }
    }
}

/// Remove a previous run's accepted driver so a stale copy is never reported.
pub fn clear_validated(layout: &ArtifactLayout) -> SynthResult<()> {
    let path = layout.validated_path();
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DriverSynthError::artifact_write(&path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::Path;

    const DRIVER: &str = "```c\nint LLVMFuzzerTestOneInput(const uint8_t *data, size_t size) {\n    return 0;\n}\n```";

    /// Replays canned completions and records every prompt it receives.
    struct ScriptedGenerator {
        responses: RefCell<Vec<anyhow::Result<String>>>,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<anyhow::Result<String>>) -> Self {
            Self {
                responses: RefCell::new(responses.into_iter().rev().collect()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn repeating(text: &str, times: usize) -> Self {
            Self::new((0..times).map(|_| Ok(text.to_string())).collect())
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.responses
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct ScriptedValidator {
        outcomes: RefCell<Vec<ValidationOutcome>>,
        calls: RefCell<u32>,
    }

    impl ScriptedValidator {
        fn new(outcomes: Vec<ValidationOutcome>) -> Self {
            Self {
                outcomes: RefCell::new(outcomes.into_iter().rev().collect()),
                calls: RefCell::new(0),
            }
        }
    }

    impl CandidateValidator for ScriptedValidator {
        fn validate(&self, candidate: &Path) -> SynthResult<ValidationOutcome> {
            assert!(candidate.exists());
            *self.calls.borrow_mut() += 1;
            Ok(self
                .outcomes
                .borrow_mut()
                .pop()
                .unwrap_or(ValidationOutcome::CompilationError {
                    log: "error: still broken".to_string(),
                }))
        }
    }

    fn initial() -> InitialContext {
        InitialContext {
            interfaces: vec![],
            project_name: "libpng".to_string(),
            target_name: "readpng".to_string(),
            template_source: "int LLVMFuzzerTestOneInput(const uint8_t *d, size_t n);".to_string(),
            call_sites: None,
        }
    }

    fn settings(dir: &Path, max_iterations: u32) -> LoopSettings {
        LoopSettings {
            max_iterations,
            layout: ArtifactLayout::new(dir),
            synthesis: SynthesisOptions::default(),
        }
    }

    #[test]
    fn test_outcome_transitions() {
        let log = || "x".to_string();
        assert_eq!(
            RefinementState::after(&ValidationOutcome::Valid {
                coverage: 90.0,
                report: log()
            }),
            RefinementState::Success
        );
        for outcome in [
            ValidationOutcome::CompilationError { log: log() },
            ValidationOutcome::RuntimeError { log: log() },
            ValidationOutcome::CoverageGenerationFailed { log: log() },
            ValidationOutcome::CoverageExtractionFailed { log: log() },
        ] {
            assert_eq!(RefinementState::after(&outcome), RefinementState::CompileErr);
        }
        assert_eq!(
            RefinementState::after(&ValidationOutcome::LowCoverage {
                coverage: 10.0,
                report: log()
            }),
            RefinementState::LowCov
        );
    }

    #[test]
    fn test_exhausts_after_budget_without_low_cov_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::repeating(DRIVER, 10);
        let validator = ScriptedValidator::new(vec![]);
        let report = RefinementLoop::new(&generator, &validator, settings(dir.path(), 3))
            .run(initial())
            .unwrap();

        assert_eq!(report.status, RunStatus::Exhausted);
        assert_eq!(generator.prompts.borrow().len(), 3);
        assert_eq!(*validator.calls.borrow(), 3);
        let states: Vec<_> = report.iterations.iter().map(|it| it.state).collect();
        assert_eq!(
            states,
            vec![
                RefinementState::Init,
                RefinementState::CompileErr,
                RefinementState::CompileErr
            ]
        );
        assert!(generator
            .prompts
            .borrow()
            .iter()
            .all(|p| !p.contains("coverage is too low")));
        assert!(generator.prompts.borrow()[1].contains("error: still broken"));
        assert!(!ArtifactLayout::new(dir.path()).validated_path().exists());
        assert!(report.last_candidate.is_some());
    }

    #[test]
    fn test_low_coverage_then_valid() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::repeating(DRIVER, 5);
        let validator = ScriptedValidator::new(vec![
            ValidationOutcome::LowCoverage {
                coverage: 40.0,
                report: "TOTAL 40.00% 40.00% 40.00% 40.00%".to_string(),
            },
            ValidationOutcome::Valid {
                coverage: 85.0,
                report: "TOTAL 85.00% 85.00% 85.00% 85.00%".to_string(),
            },
        ]);
        let report = RefinementLoop::new(&generator, &validator, settings(dir.path(), 10))
            .run(initial())
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.iterations.len(), 2);
        assert_eq!(report.iterations[1].state, RefinementState::LowCov);
        assert_eq!(report.iterations[1].coverage, Some(85.0));
        assert!(generator.prompts.borrow()[1].contains("TOTAL 40.00%"));

        let layout = ArtifactLayout::new(dir.path());
        let accepted = fs::read_to_string(layout.validated_path()).unwrap();
        assert!(accepted.contains("LLVMFuzzerTestOneInput"));
        assert_eq!(report.validated_driver, Some(layout.validated_path()));

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(layout.summary_path()).unwrap()).unwrap();
        assert_eq!(summary["status"], "success");
        assert_eq!(summary["iterations"][0]["outcome"], "low_coverage");
        assert_eq!(
            summary["iterations"][0]["candidate_sha256"]
                .as_str()
                .unwrap()
                .len(),
            64
        );
    }

    #[test]
    fn test_empty_completion_is_generation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::new(vec![Ok("   \n".to_string())]);
        let validator = ScriptedValidator::new(vec![]);
        let err = RefinementLoop::new(&generator, &validator, settings(dir.path(), 3))
            .run(initial())
            .unwrap_err();
        assert_eq!(err.kind(), "generation_failed");
        assert_eq!(*validator.calls.borrow(), 0);
    }

    #[test]
    fn test_generator_error_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::new(vec![
            Ok(DRIVER.to_string()),
            Err(anyhow::anyhow!("429 rate limited")),
        ]);
        let validator = ScriptedValidator::new(vec![]);
        let err = RefinementLoop::new(&generator, &validator, settings(dir.path(), 5))
            .run(initial())
            .unwrap_err();
        assert!(err.to_string().contains("429 rate limited"));
        assert_eq!(generator.prompts.borrow().len(), 2);
    }

    #[test]
    fn test_clear_validated_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        clear_validated(&layout).unwrap();
        write_artifact(&layout.validated_path(), "old").unwrap();
        clear_validated(&layout).unwrap();
        assert!(!layout.validated_path().exists());
    }
}
