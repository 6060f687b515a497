//! Completion from a local command: prompt on stdin, completion on stdout.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use fuzz_driver_core::TextGenerator;

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    argv: Vec<String>,
    label: String,
}

impl CommandGenerator {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        let label = argv
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        Ok(Self { argv, label })
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl TextGenerator for CommandGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        debug!(command = %self.argv.join(" "), prompt_len = prompt.len(), "running generator command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn generator `{}`", program))?;

        let mut stdin = child.stdin.take().context("stdin pipe")?;
        let mut stdout = child.stdout.take().context("stdout pipe")?;
        let mut stderr = child.stderr.take().context("stderr pipe")?;

        let input = prompt.to_string();
        let writer = thread::spawn(move || {
            // The command may exit without reading all of its input.
            let _ = stdin.write_all(input.as_bytes());
        });
        let stderr_handle = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            buf
        });

        let mut out = Vec::new();
        stdout
            .read_to_end(&mut out)
            .context("read generator output")?;
        let status = child.wait().context("wait for generator")?;
        let _ = writer.join();
        let err = stderr_handle.join().unwrap_or_default();

        if !status.success() {
            bail!(
                "generator `{}` failed ({}): {}",
                program,
                status,
                String::from_utf8_lossy(&err).trim()
            );
        }
        String::from_utf8(out).context("generator output is not UTF-8")
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandGenerator {
        CommandGenerator::new(vec!["sh".into(), "-c".into(), script.into()]).unwrap()
    }

    #[test]
    fn test_prompt_is_piped_through() {
        let generator = sh("printf '```c\\n'; cat; printf '```\\n'");
        let out = generator.generate("int x;\n").unwrap();
        assert_eq!(out, "```c\nint x;\n```\n");
        assert_eq!(generator.name(), "sh");
    }

    #[test]
    fn test_large_prompt_does_not_deadlock() {
        let prompt = "x".repeat(1 << 20);
        let out = sh("wc -c").generate(&prompt).unwrap();
        assert_eq!(out.trim(), (1 << 20).to_string());
    }

    #[test]
    fn test_non_zero_exit_is_error() {
        let err = sh("echo quota exceeded >&2; exit 2")
            .generate("prompt")
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandGenerator::new(vec![]).is_err());
    }
}
