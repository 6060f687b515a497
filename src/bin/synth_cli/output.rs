//! Output formatting for fuzz-driver-synth
//!
//! Human-readable and JSON renderings of interfaces, validation outcomes and
//! run reports.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use fuzz_driver_core::extractor::context_excerpt;
use fuzz_driver_core::{InterfaceRecord, RunReport, ValidationOutcome};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Interfaces with their parameters, call lines and optional excerpts.
pub fn format_interfaces(records: &[InterfaceRecord], source: Option<&str>, radius: usize) -> String {
    let mut out = String::new();
    if records.is_empty() {
        out.push_str("No interfaces found\n");
        return out;
    }

    out.push_str(&format!("\x1b[1mInterfaces ({}):\x1b[0m\n\n", records.len()));
    for record in records {
        out.push_str(&format!("  \x1b[36m{}\x1b[0m\n", record.display_signature()));
        let lines = record
            .seen_lines
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("    lines: {}\n", lines));

        if let Some(source) = source {
            for &line in &record.seen_lines {
                for (number, text) in context_excerpt(source, line, radius) {
                    let marker = if number == line { "->" } else { "  " };
                    out.push_str(&format!("    {} {:>5}: {}\n", marker, number, text));
                }
                out.push('\n');
            }
        }
    }
    out
}

pub fn format_outcome(outcome: &ValidationOutcome, candidate: &Path) -> String {
    let mut out = String::new();
    match outcome.coverage() {
        Some(coverage) if outcome.is_valid() => out.push_str(&format!(
            "\x1b[32m✓ Valid driver ({:.2}% coverage)\x1b[0m\n",
            coverage
        )),
        Some(coverage) => out.push_str(&format!(
            "\x1b[33m✗ Low coverage ({:.2}%)\x1b[0m\n",
            coverage
        )),
        None => out.push_str(&format!("\x1b[31m✗ {}\x1b[0m\n", outcome.kind())),
    }
    out.push_str(&format!("Candidate: {}\n", candidate.display()));
    let artifact = outcome.artifact().trim_end();
    if !artifact.is_empty() {
        out.push('\n');
        out.push_str(artifact);
        out.push('\n');
    }
    out
}

pub fn format_run_report(report: &RunReport, summary_path: &Path, verbose: bool) -> String {
    let mut out = String::new();
    match &report.validated_driver {
        Some(path) if report.succeeded() => out.push_str(&format!(
            "\x1b[32m✓ Driver accepted after {} iteration(s)\x1b[0m\nValidated driver: {}\n",
            report.iterations.len(),
            path.display()
        )),
        _ => {
            out.push_str(&format!(
                "\x1b[31m✗ No valid driver after {} iteration(s)\x1b[0m\n",
                report.iterations.len()
            ));
            if let Some(path) = &report.last_candidate {
                out.push_str(&format!("Last candidate: {}\n", path.display()));
            }
        }
    }

    if verbose {
        out.push('\n');
        for it in &report.iterations {
            let coverage = it
                .coverage
                .map(|c| format!(" ({:.2}%)", c))
                .unwrap_or_default();
            out.push_str(&format!(
                "  [{}] {} -> {}{}\n",
                it.iteration,
                it.state.as_str(),
                it.outcome,
                coverage
            ));
        }
    }
    out.push_str(&format!("Summary: {}\n", summary_path.display()));
    out
}
