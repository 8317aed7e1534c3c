use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scheduler::BakeReport;
use serde::{Deserialize, Serialize};

/// What the last run did, kept in `state.toml` next to the config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub last_output_dir: Option<PathBuf>,
    pub last_outcome: Option<String>,
    pub last_elapsed_seconds: Option<f64>,
    pub last_files: Vec<PathBuf>,
    pub last_failures: usize,
    pub runs: u64,
}

impl AppState {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read state file at {}", path.display()))?;
            let state: Self = toml::from_str(&contents)
                .with_context(|| format!("failed to parse state file at {}", path.display()))?;
            Ok(state)
        } else {
            Ok(Self::default())
        }
    }

    pub fn record(&mut self, output_dir: Option<PathBuf>, report: &BakeReport) {
        self.runs += 1;
        self.last_output_dir = output_dir;
        self.last_outcome = Some(report.outcome.to_string());
        self.last_elapsed_seconds = Some(report.elapsed_seconds);
        self.last_files = report.files.clone();
        self.last_failures = report.failures.len();
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("state path has no parent: {}", path.display()))?;
        fs::create_dir_all(dir).with_context(|| {
            format!(
                "failed to prepare directory for state file at {}",
                dir.display()
            )
        })?;
        let serialized = toml::to_string_pretty(self)
            .with_context(|| "failed to serialize state file to TOML".to_string())?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write state file to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler::{BakeFailure, JobStatus};
    use tempfile::TempDir;

    #[test]
    fn records_and_reloads_last_run() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/state.toml");
        assert_eq!(AppState::load_or_default(&path).unwrap(), AppState::default());

        let report = BakeReport {
            outcome: JobStatus::Done,
            elapsed_seconds: 1.5,
            steps_completed: 2,
            total_steps: 2,
            files: vec![PathBuf::from("/out/Normal.png")],
            failures: vec![BakeFailure {
                object: "Crate".into(),
                channel: "Normal".into(),
                error: "bake failed: timeout".into(),
            }],
        };
        let mut state = AppState::default();
        state.record(Some(PathBuf::from("/out")), &report);
        state.persist(&path).unwrap();

        let loaded = AppState::load_or_default(&path).unwrap();
        assert_eq!(loaded.runs, 1);
        assert_eq!(loaded.last_outcome.as_deref(), Some("done"));
        assert_eq!(loaded.last_files, [PathBuf::from("/out/Normal.png")]);
        assert_eq!(loaded.last_failures, 1);
    }
}
