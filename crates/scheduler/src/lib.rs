mod engine;
mod job;
mod progress;
mod session;

pub use engine::{BakeEngine, BakeEngineError, BakeMode, BakeRequest, UvFillEngine};
pub use job::{BakeFailure, BakeJob, JobSettings, JobStatus};
pub use progress::{BakeReport, ProgressSnapshot};
pub use session::{mesh_selection, resolve_channels, BakeSession};

use imagetarget::TargetError;
use shadergraph::{PatchError, SceneError};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("no objects or no channels selected")]
    EmptySelection,
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("object '{0}' is not in the scene")]
    UnknownObject(String),
    #[error("material '{0}' disappeared while patched")]
    MissingMaterial(String),
    #[error("no running bake job (status: {0})")]
    NotRunning(JobStatus),
    #[error("a bake job is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}
