use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::job::{BakeFailure, JobStatus};

/// Read-only view of a job, taken between steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub status: JobStatus,
    /// `None` once every channel is baked, or when the job has stopped.
    pub current_channel: Option<String>,
    pub channel_ordinal: usize,
    pub channel_count: usize,
    /// `None` while the channel's image is waiting to be saved.
    pub current_object: Option<String>,
    pub object_ordinal: usize,
    pub object_count: usize,
    pub elapsed_seconds: f64,
    pub fraction_complete: f64,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> String {
        format!("{:.0}%", self.fraction_complete * 100.0)
    }

    /// Text for the viewport overlay, top line first.
    pub fn overlay_lines(&self) -> Vec<String> {
        let Some(channel) = &self.current_channel else {
            return vec!["Finishing up...".to_string()];
        };
        let mut lines = vec![
            format!("Baking... [{}]", self.percent()),
            format!(
                "Map: {channel} ({}/{})",
                self.channel_ordinal, self.channel_count
            ),
        ];
        if let Some(object) = &self.current_object {
            lines.push(format!(
                "Object: {object} ({}/{})",
                self.object_ordinal, self.object_count
            ));
        }
        lines.push(format!("Elapsed Time: {:.1}s", self.elapsed_seconds));
        lines
    }

    /// One-line status bar text.
    pub fn status_line(&self) -> String {
        match self.status {
            JobStatus::Done => format!("Baking complete in {:.2} seconds.", self.elapsed_seconds),
            JobStatus::Cancelled => "Baking cancelled.".to_string(),
            JobStatus::Idle | JobStatus::Running => {
                match (&self.current_channel, &self.current_object) {
                    (Some(channel), Some(object)) => {
                        format!("Baking {channel} for {object}... {}", self.percent())
                    }
                    _ => format!("Baking... [{}]", self.percent()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BakeReport {
    pub outcome: JobStatus,
    pub elapsed_seconds: f64,
    pub steps_completed: usize,
    pub total_steps: usize,
    pub files: Vec<PathBuf>,
    pub failures: Vec<BakeFailure>,
}

impl BakeReport {
    pub fn is_cancelled(&self) -> bool {
        self.outcome == JobStatus::Cancelled
    }
}

impl fmt::Display for BakeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cancelled() {
            f.write_str("Baking cancelled.")?;
        } else {
            write!(f, "Baking complete in {:.2} seconds.", self.elapsed_seconds)?;
        }
        if !self.failures.is_empty() {
            write!(f, "\n{} bake(s) failed:", self.failures.len())?;
            for failure in &self.failures {
                write!(
                    f,
                    "\n  {} / {}: {}",
                    failure.object, failure.channel, failure.error
                )?;
            }
        }
        Ok(())
    }
}
