//! Fuzz Driver Synthesis
//!
//! Configuration and logging for the `fuzz-driver-synth` CLI. The synthesis
//! loop itself lives in [`fuzz_driver_core`], text-generation transports in
//! [`fuzz_driver_llm`].

pub mod config;
pub mod logging;

pub use config::{CoverageConfig, LlmConfig, SynthConfig};
