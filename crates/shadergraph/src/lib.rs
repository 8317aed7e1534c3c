mod channel;
mod graph;
mod patch;
mod scene;
mod scene_file;

pub use channel::{default_channels, lookup, BakeKind, ChannelSpec, FallbackPolicy, CHANNELS};
pub use graph::{
    GraphError, InputSocket, Link, Node, NodeId, NodeKind, NodeSummary, ShaderGraph, SocketRef,
    SocketValue, Topology,
};
pub use patch::{
    patch, reinstate, restore, ChannelInput, PatchError, PatchOutcome, PatchRecord,
    SelectionRecord, SkipReason,
};
pub use scene::{Material, MaterialSlot, ObjectKind, Scene, SceneObject};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("failed to parse scene description: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read scene file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scene description: {0}")]
    Invalid(String),
    #[error("scene has no object named '{0}'")]
    UnknownObject(String),
}
