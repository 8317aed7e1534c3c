//! Owns the per-channel image buffers a bake run writes into, from allocation
//! through naming, on-disk persistence, and disposal.
//!
//! Types:
//!
//! - `ImageTarget` is a named RGBA float buffer with a colour space tag and the
//!   file path it was last written to.
//! - `ImageTargetManager` tracks every live target for a run so cancellation can
//!   release them all without touching disk.
//! - `NamingConvention`, `FileFormat`, and `ColorSpace` are the serde-friendly
//!   enums shared with the configuration crate.
//! - `OutputDirResolver` turns configured output directories into absolute
//!   paths.
mod format;
mod naming;
mod path;
mod target;

pub use format::{ColorSpace, FileFormat};
pub use naming::{batch_label, compose_image_name, NamingConvention, UNSAVED_BATCH_LABEL};
pub use path::OutputDirResolver;
pub use target::{ImageTarget, ImageTargetManager, UvRect};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("cannot allocate {width}x{height} image '{name}'")]
    Allocation {
        name: String,
        width: u32,
        height: u32,
    },
    #[error("failed to write image to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode image '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("image target '{0}' is not allocated")]
    UnknownTarget(String),
    #[error("cannot resolve output directory '{0}'")]
    Directory(String),
}
