//! Run configuration loaded from YAML or JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use fuzz_driver_core::candidate::SynthesisOptions;
use fuzz_driver_core::orchestrator::LoopSettings;
use fuzz_driver_core::validator::{ValidatorSettings, DEFAULT_COVERAGE_THRESHOLD};
use fuzz_driver_core::{ArtifactLayout, TextGenerator};
use fuzz_driver_llm::openai::{API_KEY_ENV, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use fuzz_driver_llm::{CommandGenerator, OpenAiClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    pub project_name: String,
    pub target_name: String,
    #[serde(default = "default_entry_function")]
    pub entry_function: String,
    pub target_file: PathBuf,
    pub template_path: PathBuf,
    /// Compiler argv; `{driver}`, `{binary}` and `{target}` are substituted.
    #[serde(default)]
    pub compile_command: Vec<String>,
    #[serde(default)]
    pub binary_path: Option<PathBuf>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default)]
    pub required_headers: Vec<String>,
    #[serde(default)]
    pub excluded_functions: Vec<String>,
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
    #[serde(default)]
    pub coverage: CoverageConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_profdata_tool")]
    pub profdata_tool: String,
    #[serde(default = "default_cov_tool")]
    pub cov_tool: String,
    #[serde(default = "default_fuzz_seconds")]
    pub fuzz_seconds: u64,
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: u64,
    #[serde(default)]
    pub fuzz_args: Vec<String>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            profdata_tool: default_profdata_tool(),
            cov_tool: default_cov_tool(),
            fuzz_seconds: default_fuzz_seconds(),
            grace_seconds: default_grace_seconds(),
            fuzz_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum LlmConfig {
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default = "default_model")]
        model: String,
        #[serde(default = "default_endpoint")]
        endpoint: String,
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        #[serde(default)]
        temperature: Option<f64>,
    },
    Command { argv: Vec<String> },
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::OpenAi {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            temperature: None,
        }
    }
}

impl LlmConfig {
    pub fn build(&self) -> Result<Box<dyn TextGenerator>> {
        match self {
            Self::OpenAi {
                model,
                endpoint,
                api_key_env,
                temperature,
            } => Ok(Box::new(
                OpenAiClient::new(endpoint, model)
                    .with_api_key(std::env::var(api_key_env).ok())
                    .with_temperature(*temperature),
            )),
            Self::Command { argv } => Ok(Box::new(CommandGenerator::new(argv.clone())?)),
        }
    }
}

impl SynthConfig {
    /// Read, resolve relative paths against the file's directory, and validate.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut config = if ext == "yaml" || ext == "yml" {
            serde_yaml::from_str::<Self>(&raw)
                .with_context(|| format!("Invalid YAML config in {}", path.display()))?
        } else {
            serde_json::from_str::<Self>(&raw)
                .with_context(|| format!("Invalid JSON config in {}", path.display()))?
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.target_file);
        resolve(&mut self.template_path);
        resolve(&mut self.work_dir);
        if let Some(binary) = self.binary_path.as_mut() {
            resolve(binary);
        }
    }

    /// Apply command-line overrides and re-validate.
    pub fn apply_overrides(
        &mut self,
        max_iterations: Option<u32>,
        work_dir: Option<PathBuf>,
    ) -> Result<()> {
        if let Some(max) = max_iterations {
            self.max_iterations = max;
        }
        if let Some(dir) = work_dir {
            self.work_dir = dir;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();
        self.collect_validation_issues(&mut issues);
        if issues.is_empty() {
            return Ok(());
        }

        let formatted = issues
            .into_iter()
            .enumerate()
            .map(|(idx, issue)| format!("  {}. {}", idx + 1, issue))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Config validation failed:\n{formatted}");
    }

    fn collect_validation_issues(&self, issues: &mut Vec<String>) {
        for (field, value) in [
            ("project_name", &self.project_name),
            ("target_name", &self.target_name),
            ("entry_function", &self.entry_function),
        ] {
            if value.trim().is_empty() {
                issues.push(format!("{field} cannot be empty"));
            }
        }
        if self.compile_command.is_empty() {
            issues.push("compile_command must contain at least the compiler".to_string());
        }
        if self.max_iterations == 0 {
            issues.push("max_iterations must be at least 1".to_string());
        }
        if !(0.0..=100.0).contains(&self.coverage.threshold) {
            issues.push(format!(
                "coverage.threshold must be between 0 and 100 (got {})",
                self.coverage.threshold
            ));
        }
        if self.coverage.fuzz_seconds == 0 {
            issues.push("coverage.fuzz_seconds must be at least 1".to_string());
        }
        if self.coverage.profdata_tool.trim().is_empty() {
            issues.push("coverage.profdata_tool cannot be empty".to_string());
        }
        if self.coverage.cov_tool.trim().is_empty() {
            issues.push("coverage.cov_tool cannot be empty".to_string());
        }
        match &self.llm {
            LlmConfig::OpenAi { model, .. } if model.trim().is_empty() => {
                issues.push("llm.model cannot be empty".to_string());
            }
            LlmConfig::Command { argv } if argv.is_empty() => {
                issues.push("llm.argv must contain the generator command".to_string());
            }
            _ => {}
        }
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.work_dir)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.binary_path
            .clone()
            .unwrap_or_else(|| self.layout().default_binary_path())
    }

    pub fn synthesis_options(&self) -> SynthesisOptions {
        SynthesisOptions::with_project_headers(self.required_headers.iter().cloned())
    }

    pub fn validator_settings(&self) -> ValidatorSettings {
        ValidatorSettings {
            compile_command: self.compile_command.clone(),
            target_file: self.target_file.clone(),
            binary_path: self.binary_path(),
            threshold: self.coverage.threshold,
            profdata_tool: self.coverage.profdata_tool.clone(),
            cov_tool: self.coverage.cov_tool.clone(),
            fuzz_seconds: self.coverage.fuzz_seconds,
            grace_seconds: self.coverage.grace_seconds,
            fuzz_args: self.coverage.fuzz_args.clone(),
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            max_iterations: self.max_iterations,
            layout: self.layout(),
            synthesis: self.synthesis_options(),
        }
    }
}

fn default_entry_function() -> String {
    "main".to_string()
}

fn default_max_iterations() -> u32 {
    10
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_context_lines() -> usize {
    5
}

fn default_threshold() -> f64 {
    DEFAULT_COVERAGE_THRESHOLD
}

fn default_profdata_tool() -> String {
    "llvm-profdata".to_string()
}

fn default_cov_tool() -> String {
    "llvm-cov".to_string()
}

fn default_fuzz_seconds() -> u64 {
    10
}

fn default_grace_seconds() -> u64 {
    5
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_api_key_env() -> String {
    API_KEY_ENV.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
project_name: libxml2
target_name: xmllint
target_file: src/xmllint.c
template_path: templates/driver.c
compile_command: [clang, -fsanitize=fuzzer, "{driver}", "{target}", -o, "{binary}"]
required_headers: [libxml/parser.h]
llm:
  provider: command
  argv: [./local-model, --quiet]
"#;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_yaml_defaults_and_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "synth.yaml", YAML);
        let config = SynthConfig::load_from_path(&path).unwrap();

        assert_eq!(config.entry_function, "main");
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.context_lines, 5);
        assert_eq!(config.coverage.threshold, 80.0);
        assert_eq!(config.coverage.cov_tool, "llvm-cov");
        assert_eq!(config.target_file, dir.path().join("src/xmllint.c"));
        assert_eq!(config.work_dir, dir.path().join("outputs"));
        assert_eq!(
            config.binary_path(),
            dir.path().join("outputs/temp/fuzz_driver")
        );
        assert!(matches!(&config.llm, LlmConfig::Command { argv } if argv[0] == "./local-model"));
        assert_eq!(
            config.synthesis_options().project_headers,
            vec!["libxml/parser.h"]
        );
    }

    #[test]
    fn test_json_config_with_openai_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "synth.json",
            r#"{
                "project_name": "libpng",
                "target_name": "readpng",
                "target_file": "/abs/readpng.c",
                "template_path": "t.c",
                "compile_command": ["clang"],
                "max_iterations": 3,
                "llm": {"provider": "openai", "temperature": 0.1}
            }"#,
        );
        let config = SynthConfig::load_from_path(&path).unwrap();
        assert_eq!(config.target_file, PathBuf::from("/abs/readpng.c"));
        assert_eq!(config.max_iterations, 3);
        match &config.llm {
            LlmConfig::OpenAi {
                model,
                endpoint,
                temperature,
                ..
            } => {
                assert_eq!(model, "gpt-4");
                assert_eq!(endpoint, DEFAULT_ENDPOINT);
                assert_eq!(*temperature, Some(0.1));
            }
            other => panic!("unexpected provider: {:?}", other),
        }
    }

    #[test]
    fn test_validation_lists_every_issue() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "bad.yaml",
            r#"
project_name: ""
target_name: t
target_file: a.c
template_path: t.c
max_iterations: 0
coverage:
  threshold: 150
"#,
        );
        let err = SynthConfig::load_from_path(&path).unwrap_err().to_string();
        assert!(err.contains("Config validation failed"));
        assert!(err.contains("1. project_name cannot be empty"));
        assert!(err.contains("compile_command"));
        assert!(err.contains("max_iterations must be at least 1"));
        assert!(err.contains("coverage.threshold"));
    }

    #[test]
    fn test_overrides_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "synth.yml", YAML);
        let mut config = SynthConfig::load_from_path(&path).unwrap();
        config
            .apply_overrides(Some(2), Some(PathBuf::from("/tmp/elsewhere")))
            .unwrap();
        assert_eq!(config.loop_settings().max_iterations, 2);
        assert_eq!(config.layout().work_dir(), Path::new("/tmp/elsewhere"));
        assert!(config.apply_overrides(Some(0), None).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "synth.yaml",
            &YAML.replace("provider: command", "provider: carrier-pigeon"),
        );
        let err = SynthConfig::load_from_path(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid YAML config"));
    }
}
