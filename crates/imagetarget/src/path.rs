//! Resolves configured output directories into absolute paths before images
//! are written.
//!
//! A leading `//` anchors the path at the project file's directory (falling
//! back to the working directory for unsaved projects), `~` expands to the home
//! directory, and any other relative path joins the working directory. `..`
//! components are folded lexically so logs show the directory that is created.
use std::path::{Component, Path, PathBuf};

use directories_next::BaseDirs;
use tracing::debug;

use crate::TargetError;

#[derive(Debug, Clone)]
pub struct OutputDirResolver {
    cwd: PathBuf,
    project_dir: Option<PathBuf>,
}

impl OutputDirResolver {
    pub fn new<P: Into<PathBuf>>(cwd: P) -> Self {
        Self {
            cwd: cwd.into(),
            project_dir: None,
        }
    }

    pub fn with_project_file(mut self, project: Option<&Path>) -> Self {
        self.project_dir = project.and_then(|path| {
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.cwd.join(path)
            };
            absolute.parent().map(Path::to_path_buf)
        });
        self
    }

    pub fn resolve(&self, raw: &str) -> Result<PathBuf, TargetError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TargetError::Directory(raw.to_string()));
        }

        let joined = if let Some(rest) = trimmed.strip_prefix("//") {
            let base = self.project_dir.as_deref().unwrap_or(&self.cwd);
            base.join(rest)
        } else if trimmed == "~" || trimmed.starts_with("~/") {
            let base_dirs =
                BaseDirs::new().ok_or_else(|| TargetError::Directory(raw.to_string()))?;
            let rest = trimmed.trim_start_matches('~').trim_start_matches('/');
            base_dirs.home_dir().join(rest)
        } else {
            let path = PathBuf::from(trimmed);
            if path.is_absolute() {
                path
            } else {
                self.cwd.join(path)
            }
        };

        let normalized = normalize(&joined);
        debug!(original = %raw, resolved = %normalized.display(), "resolved output directory");
        Ok(normalized)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
