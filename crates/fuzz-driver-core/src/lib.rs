//! Fuzz Driver Synthesis Core
//!
//! The feedback loop that turns a C target into a validated LibFuzzer driver:
//!
//! - [`extractor`]: call-site interfaces reachable from an entry function
//! - [`filter`]: removal of library and file-local functions
//! - [`prompt`]: prompt rendering for each refinement state
//! - [`candidate`]: post-processing of generated text into a driver
//! - [`validator`]: compile, run and coverage classification
//! - [`orchestrator`]: the bounded refinement state machine
//!
//! # Example
//!
//! ```ignore
//! use fuzz_driver_core::extractor::InterfaceExtractor;
//! use fuzz_driver_core::filter::filter_interfaces;
//!
//! let records = InterfaceExtractor::for_c().extract(path, "main")?;
//! let records = filter_interfaces(&records, path, &[] as &[&str])?;
//! ```

#![allow(clippy::result_large_err)]

pub mod artifacts;
pub mod candidate;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod generation;
pub mod interface;
pub mod orchestrator;
pub mod prompt;
pub mod validator;

pub use artifacts::ArtifactLayout;
pub use candidate::{synthesize, synthesize_variants, CandidateDriver, SynthesisOptions};
pub use error::{DriverSynthError, SynthResult};
pub use generation::TextGenerator;
pub use interface::{CallSignature, InterfaceRecord, Parameter};
pub use orchestrator::{RefinementLoop, RefinementState, RunReport, RunStatus};
pub use validator::{CandidateValidator, DriverValidator, ValidationOutcome};
