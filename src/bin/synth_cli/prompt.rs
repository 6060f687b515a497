//! `prompt`: render the prompt for a refinement state from persisted inputs.

use anyhow::Result;
use clap::{Args, ValueEnum};

use fuzz_driver_core::prompt::{CompileErrorContext, LowCoverageContext, PromptContext};

use super::{extract_interfaces, initial_context, output, ConfigArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PromptState {
    /// Initial generation from extracted interfaces
    Init,
    /// Repair of the persisted candidate using the error log
    CompileErr,
    /// Coverage improvement using the persisted coverage report
    LowCov,
}

#[derive(Args, Debug)]
pub struct PromptCmd {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Refinement state to render
    #[arg(long, value_enum, default_value = "init")]
    pub state: PromptState,
}

impl PromptCmd {
    pub fn execute(&self, json: bool) -> Result<()> {
        let config = self.config.load(None)?;
        let layout = config.layout();

        let context = match self.state {
            PromptState::Init => {
                let records = extract_interfaces(&config)?;
                PromptContext::Initial(initial_context(&config, records)?)
            }
            PromptState::CompileErr => {
                PromptContext::CompileError(CompileErrorContext::from_artifacts(&layout)?)
            }
            PromptState::LowCov => {
                PromptContext::LowCoverage(LowCoverageContext::from_artifacts(&layout)?)
            }
        };

        let text = context.render();
        if json {
            output::print_json(&serde_json::json!({
                "state": context.kind(),
                "prompt": text,
            }))?;
        } else {
            print!("{}", text);
        }
        Ok(())
    }
}
