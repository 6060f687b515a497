//! CLI subcommand implementations for fuzz-driver-synth

pub mod extract;
pub mod output;
pub mod prompt;
pub mod run;
pub mod synthesize;
pub mod validate;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use fuzz_driver_core::extractor::InterfaceExtractor;
use fuzz_driver_core::filter::filter_interfaces;
use fuzz_driver_core::prompt::InitialContext;
use fuzz_driver_core::InterfaceRecord;
use fuzz_driver_synth::SynthConfig;

/// Options shared by every config-driven subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Run configuration (YAML or JSON)
    #[arg(long, short)]
    pub config: PathBuf,

    /// Override the configured working directory
    #[arg(long)]
    pub work_dir: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self, max_iterations: Option<u32>) -> Result<SynthConfig> {
        dotenv::dotenv().ok();
        let mut config = SynthConfig::load_from_path(&self.config)?;
        config.apply_overrides(max_iterations, self.work_dir.clone())?;
        Ok(config)
    }
}

/// Extract and filter the interfaces reachable from the configured entry.
pub fn extract_interfaces(config: &SynthConfig) -> Result<Vec<InterfaceRecord>> {
    let records =
        InterfaceExtractor::for_c().extract(&config.target_file, &config.entry_function)?;
    let extracted = records.len();
    let records = filter_interfaces(
        &records,
        &config.target_file,
        config.excluded_functions.as_slice(),
    )?;
    info!(
        file = %config.target_file.display(),
        entry = %config.entry_function,
        extracted,
        kept = records.len(),
        "interfaces extracted"
    );
    Ok(records)
}

/// Initial prompt input: interfaces, template and call-site excerpts.
pub fn initial_context(
    config: &SynthConfig,
    records: Vec<InterfaceRecord>,
) -> Result<InitialContext> {
    let context = InitialContext::load(
        records,
        &config.project_name,
        &config.target_name,
        &config.template_path,
    )?;
    if config.context_lines == 0 {
        return Ok(context);
    }
    let bytes = fs::read(&config.target_file)
        .with_context(|| format!("Failed to read {}", config.target_file.display()))?;
    let source = String::from_utf8_lossy(&bytes).into_owned();
    Ok(context.with_call_sites(source, config.context_lines))
}
