//! fuzz-driver-synth: LLM-driven LibFuzzer driver synthesis
//!
//! Extracts the call-site interfaces of a C target, asks a text-generation
//! service for a driver, and refines it against compiler, runtime and
//! coverage feedback until it is accepted or the iteration budget runs out.
//!
//! ## Commands
//!
//! - **run**: the full refinement loop
//! - **extract**: list the interfaces reachable from an entry function
//! - **prompt**: render the prompt for a refinement state
//! - **synthesize**: post-process a saved completion (with strategy variants)
//! - **validate**: compile, run and measure a candidate driver
//!
//! ## Example Usage
//!
//! ```bash
//! # Synthesize a driver for the configured target
//! fuzz-driver-synth run --config synth.yaml
//!
//! # Inspect what the initial prompt will contain
//! fuzz-driver-synth extract --file xmllint.c --entry main
//!
//! # Rebuild the repair prompt from the last failed iteration
//! fuzz-driver-synth prompt --config synth.yaml --state compile-err
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod synth_cli;

use synth_cli::{
    extract::ExtractCmd, prompt::PromptCmd, run::RunCmd, synthesize::SynthesizeCmd,
    validate::ValidateCmd,
};

#[derive(Parser)]
#[command(
    name = "fuzz-driver-synth",
    author,
    version,
    about = "LLM-driven fuzz driver synthesis",
    long_about = "Synthesizes LibFuzzer drivers for C targets by combining interface extraction,\n\
                  LLM code generation and a compile/run/coverage feedback loop."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (debug logging, per-iteration details)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the extract → generate → validate refinement loop
    Run(RunCmd),

    /// List interfaces reachable from an entry function
    Extract(ExtractCmd),

    /// Render the prompt for a refinement state
    Prompt(PromptCmd),

    /// Turn a raw completion into driver source
    Synthesize(SynthesizeCmd),

    /// Compile, run and measure a candidate driver
    Validate(ValidateCmd),
}

fn main() -> Result<()> {
    let Cli {
        command,
        json,
        verbose,
    } = Cli::parse();
    fuzz_driver_synth::logging::init_logging(verbose);

    match command {
        Commands::Run(cmd) => cmd.execute(json, verbose),
        Commands::Extract(cmd) => cmd.execute(json),
        Commands::Prompt(cmd) => cmd.execute(json),
        Commands::Synthesize(cmd) => cmd.execute(json),
        Commands::Validate(cmd) => cmd.execute(json),
    }
}
