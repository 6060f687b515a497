//! `run`: the full extract → generate → validate loop.

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use fuzz_driver_core::orchestrator::clear_validated;
use fuzz_driver_core::{DriverValidator, RefinementLoop};

use super::{extract_interfaces, initial_context, output, ConfigArgs};

#[derive(Args, Debug)]
pub struct RunCmd {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Override the configured iteration budget
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

impl RunCmd {
    pub fn execute(&self, json: bool, verbose: bool) -> Result<()> {
        let config = self.config.load(self.max_iterations)?;
        let layout = config.layout();

        let records = extract_interfaces(&config)?;
        let initial = initial_context(&config, records)?;
        let generator = config.llm.build()?;
        let validator = DriverValidator::new(config.validator_settings(), layout.clone());

        clear_validated(&layout)?;
        info!(
            project = %config.project_name,
            target = %config.target_name,
            generator = generator.name(),
            max_iterations = config.max_iterations,
            "starting driver synthesis"
        );
        let report =
            RefinementLoop::new(generator.as_ref(), &validator, config.loop_settings())
                .run(initial)?;

        if json {
            output::print_json(&report)?;
        } else {
            print!(
                "{}",
                output::format_run_report(&report, &layout.summary_path(), verbose)
            );
        }

        if !report.succeeded() {
            bail!(
                "no valid driver after {} iteration(s); artifacts left in {}",
                report.iterations.len(),
                layout.work_dir().display()
            );
        }
        Ok(())
    }
}
