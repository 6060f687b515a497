//! Fixed artifact locations under a run's working directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DriverSynthError, SynthResult};

const TEMP_DIR: &str = "temp";
const CANDIDATE_DIR: &str = "candidate_fuzz_drivers";
const ERROR_LOG_DIR: &str = "error_logs";
const COVERAGE_REPORT_DIR: &str = "coverage_reports";
const PROFILE_DIR: &str = "coverage";
const VALIDATED_DIR: &str = "validated_fuzz_drivers";

/// Every path a run reads or writes, derived from one working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    work_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn temp(&self) -> PathBuf {
        self.work_dir.join(TEMP_DIR)
    }

    pub fn candidate_dir(&self) -> PathBuf {
        self.temp().join(CANDIDATE_DIR)
    }

    /// Working copy of the current candidate driver.
    pub fn candidate_path(&self) -> PathBuf {
        self.candidate_dir().join("raw.c")
    }

    pub fn variant_path(&self, index: usize) -> PathBuf {
        self.candidate_dir().join(format!("variant_{}.c", index))
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.temp().join(ERROR_LOG_DIR).join("raw_error_log.txt")
    }

    pub fn coverage_report_path(&self) -> PathBuf {
        self.temp()
            .join(COVERAGE_REPORT_DIR)
            .join("raw_coverage_report.txt")
    }

    pub fn profraw_path(&self) -> PathBuf {
        self.temp().join(PROFILE_DIR).join("default.profraw")
    }

    pub fn profdata_path(&self) -> PathBuf {
        self.temp().join(PROFILE_DIR).join("default.profdata")
    }

    pub fn default_binary_path(&self) -> PathBuf {
        self.temp().join("fuzz_driver")
    }

    /// Stable location of the accepted driver.
    pub fn validated_path(&self) -> PathBuf {
        self.work_dir.join(VALIDATED_DIR).join("valid_driver.c")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.work_dir.join("run_summary.json")
    }

    /// Create every directory the layout writes into.
    pub fn ensure_dirs(&self) -> SynthResult<()> {
        let dirs = [
            self.candidate_dir(),
            self.temp().join(ERROR_LOG_DIR),
            self.temp().join(COVERAGE_REPORT_DIR),
            self.temp().join(PROFILE_DIR),
            self.work_dir.join(VALIDATED_DIR),
        ];
        for dir in &dirs {
            fs::create_dir_all(dir).map_err(|e| DriverSynthError::artifact_write(dir, e))?;
        }
        Ok(())
    }
}

/// Overwrite `path` with `contents`, creating parent directories.
pub fn write_artifact(path: &Path, contents: &str) -> SynthResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DriverSynthError::artifact_write(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| DriverSynthError::artifact_write(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_rooted_in_work_dir() {
        let layout = ArtifactLayout::new("/tmp/run");
        assert_eq!(
            layout.candidate_path(),
            PathBuf::from("/tmp/run/temp/candidate_fuzz_drivers/raw.c")
        );
        assert_eq!(
            layout.error_log_path(),
            PathBuf::from("/tmp/run/temp/error_logs/raw_error_log.txt")
        );
        assert_eq!(
            layout.validated_path(),
            PathBuf::from("/tmp/run/validated_fuzz_drivers/valid_driver.c")
        );
        assert_eq!(
            layout.variant_path(2),
            PathBuf::from("/tmp/run/temp/candidate_fuzz_drivers/variant_2.c")
        );
    }

    #[test]
    fn test_ensure_dirs_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path().join("out"));
        layout.ensure_dirs().unwrap();
        assert!(layout.candidate_dir().is_dir());
        assert!(layout.profraw_path().parent().unwrap().is_dir());

        write_artifact(&layout.error_log_path(), "first").unwrap();
        write_artifact(&layout.error_log_path(), "second").unwrap();
        assert_eq!(
            fs::read_to_string(layout.error_log_path()).unwrap(),
            "second"
        );
    }
}
