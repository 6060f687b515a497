//! `extract`: report the interfaces reachable from an entry function.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use fuzz_driver_core::extractor::InterfaceExtractor;
use fuzz_driver_core::filter::FilterConfig;
use fuzz_driver_synth::SynthConfig;

use super::output;

#[derive(Args, Debug)]
pub struct ExtractCmd {
    /// Take file, entry, exclusions and context width from a run configuration
    #[arg(long, short, conflicts_with = "file")]
    pub config: Option<PathBuf>,

    /// C source file to analyze
    #[arg(long, required_unless_present = "config")]
    pub file: Option<PathBuf>,

    /// Entry function to start from
    #[arg(long, default_value = "main")]
    pub entry: String,

    /// Additional function names to exclude
    #[arg(long = "exclude")]
    pub excluded: Vec<String>,

    /// Source lines shown around each call site
    #[arg(long, default_value_t = 5)]
    pub context_lines: usize,

    /// Report every call, skipping the interface filter
    #[arg(long)]
    pub no_filter: bool,
}

struct ExtractTarget {
    file: PathBuf,
    entry: String,
    excluded: Vec<String>,
    context_lines: usize,
}

impl ExtractCmd {
    fn target(&self) -> Result<ExtractTarget> {
        if let Some(path) = &self.config {
            let config = SynthConfig::load_from_path(path)?;
            return Ok(ExtractTarget {
                file: config.target_file,
                entry: config.entry_function,
                excluded: config.excluded_functions,
                context_lines: config.context_lines,
            });
        }
        Ok(ExtractTarget {
            file: self
                .file
                .clone()
                .context("either --config or --file is required")?,
            entry: self.entry.clone(),
            excluded: self.excluded.clone(),
            context_lines: self.context_lines,
        })
    }

    pub fn execute(&self, json: bool) -> Result<()> {
        let target = self.target()?;
        let records = InterfaceExtractor::for_c().extract(&target.file, &target.entry)?;

        let bytes = fs::read(&target.file)
            .with_context(|| format!("Failed to read {}", target.file.display()))?;
        let source = String::from_utf8_lossy(&bytes);

        let records = if self.no_filter {
            records
        } else {
            FilterConfig::for_source(&source, target.excluded.as_slice()).apply(&records)
        };

        if json {
            output::print_json(&records)?;
        } else {
            let excerpts = (target.context_lines > 0).then_some(&*source);
            print!(
                "{}",
                output::format_interfaces(&records, excerpts, target.context_lines)
            );
        }
        Ok(())
    }
}
