//! `validate`: classify a candidate driver without generating anything.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use fuzz_driver_core::{CandidateValidator, DriverValidator};

use super::{output, ConfigArgs};

#[derive(Args, Debug)]
pub struct ValidateCmd {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Driver to validate (defaults to the persisted candidate)
    #[arg(long)]
    pub candidate: Option<PathBuf>,
}

impl ValidateCmd {
    pub fn execute(&self, json: bool) -> Result<()> {
        let config = self.config.load(None)?;
        let layout = config.layout();
        let candidate = self
            .candidate
            .clone()
            .unwrap_or_else(|| layout.candidate_path());

        let validator = DriverValidator::new(config.validator_settings(), layout);
        let outcome = validator.validate(&candidate)?;

        if json {
            output::print_json(&outcome)?;
        } else {
            print!("{}", output::format_outcome(&outcome, &candidate));
        }

        if !outcome.is_valid() {
            bail!("candidate rejected: {}", outcome.kind());
        }
        Ok(())
    }
}
