//! `synthesize`: post-process a saved completion into driver sources.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::json;

use fuzz_driver_core::artifacts::write_artifact;
use fuzz_driver_core::candidate::{synthesize_variants, TransformStep};
use fuzz_driver_core::SynthesisOptions;

use super::output;

#[derive(Args, Debug)]
pub struct SynthesizeCmd {
    /// File holding the raw completion (`-` for stdin)
    #[arg(long, short, default_value = "-")]
    pub input: String,

    /// Number of drivers to produce: the base driver plus strategy variants
    #[arg(long, default_value_t = 1)]
    pub variants: usize,

    /// Project header to include (repeatable)
    #[arg(long = "header")]
    pub headers: Vec<String>,

    /// Write `variant_<n>.c` files here instead of printing
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

impl SynthesizeCmd {
    fn read_input(&self) -> Result<String> {
        if self.input == "-" {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read completion from stdin")?;
            Ok(raw)
        } else {
            fs::read_to_string(&self.input)
                .with_context(|| format!("Failed to read completion {}", self.input))
        }
    }

    pub fn execute(&self, json: bool) -> Result<()> {
        if self.variants == 0 {
            bail!("--variants must be at least 1");
        }
        let raw = self.read_input()?;
        let options = SynthesisOptions::with_project_headers(self.headers.iter().cloned());
        let drivers = synthesize_variants(&raw, self.variants, &options);
        if drivers.is_empty() {
            bail!("completion contains no usable code");
        }

        let mut written = Vec::new();
        if let Some(dir) = &self.out_dir {
            for (idx, driver) in drivers.iter().enumerate() {
                let path = dir.join(format!("variant_{}.c", idx + 1));
                write_artifact(&path, &driver.source)?;
                written.push(path);
            }
        }

        if json {
            let items: Vec<_> = drivers
                .iter()
                .enumerate()
                .map(|(idx, driver)| {
                    json!({
                        "variant": idx + 1,
                        "path": written.get(idx),
                        "steps": driver.steps,
                        "source": driver.source,
                    })
                })
                .collect();
            return output::print_json(&items);
        }

        if written.is_empty() {
            for (idx, driver) in drivers.iter().enumerate() {
                if drivers.len() > 1 {
                    println!("/* variant {}: {} */", idx + 1, strategy_label(&driver.steps));
                }
                print!("{}", driver.source);
            }
        } else {
            for path in &written {
                println!("Wrote {}", path.display());
            }
        }
        Ok(())
    }
}

fn strategy_label(steps: &[TransformStep]) -> &'static str {
    match steps.last() {
        Some(TransformStep::ApplyStrategy { strategy }) => strategy.name(),
        _ => "base",
    }
}
