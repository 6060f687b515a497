//! Error taxonomy for driver synthesis.
//!
//! | Kind | Raised by | Effect |
//! |------|-----------|--------|
//! | `Parse` / `EntryNotFound` | extractor, filter | aborts the run |
//! | `TemplateNotFound` / `ArtifactNotFound` | prompt composer | aborts the iteration that needs it |
//! | `GenerationFailed` | orchestrator | aborts the run |
//! | `ArtifactWrite` | validator, orchestrator | aborts the run |
//!
//! Rejected candidates are not errors: they are reported as
//! [`ValidationOutcome`](crate::validator::ValidationOutcome) values and fed back
//! into the refinement loop.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum DriverSynthError {
    /// The target source could not be read or turned into a syntax tree.
    Parse { path: PathBuf, message: String },

    /// No function with the requested entry name exists in the target.
    EntryNotFound { path: PathBuf, entry: String },

    /// The driver template configured for the initial prompt is missing.
    TemplateNotFound { path: PathBuf },

    /// A persisted artifact (prior driver, error log, coverage report) is missing.
    ArtifactNotFound { path: PathBuf },

    /// The text-generation service failed or produced no usable code.
    GenerationFailed { message: String },

    /// A fixed-path artifact could not be written.
    ArtifactWrite { path: PathBuf, source: io::Error },
}

impl DriverSynthError {
    pub fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            message: message.into(),
        }
    }

    pub fn artifact_write(path: &Path, source: io::Error) -> Self {
        Self::ArtifactWrite {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::EntryNotFound { .. } => "entry_not_found",
            Self::TemplateNotFound { .. } => "template_not_found",
            Self::ArtifactNotFound { .. } => "artifact_not_found",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::ArtifactWrite { .. } => "artifact_write",
        }
    }
}

impl fmt::Display for DriverSynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { path, message } => {
                write!(f, "failed to parse {}: {}", path.display(), message)
            }
            Self::EntryNotFound { path, entry } => write!(
                f,
                "entry function `{}` not found in {}",
                entry,
                path.display()
            ),
            Self::TemplateNotFound { path } => {
                write!(f, "driver template not found: {}", path.display())
            }
            Self::ArtifactNotFound { path } => {
                write!(f, "artifact not found: {}", path.display())
            }
            Self::GenerationFailed { message } => write!(f, "generation failed: {}", message),
            Self::ArtifactWrite { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for DriverSynthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ArtifactWrite { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type SynthResult<T> = std::result::Result<T, DriverSynthError>;
