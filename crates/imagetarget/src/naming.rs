use std::path::Path;

use serde::{Deserialize, Serialize};

/// Label used when the project has never been saved.
pub const UNSAVED_BATCH_LABEL: &str = "untitled";

/// Where the batch label goes relative to the channel id in an image name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    Prefix,
    #[default]
    Suffix,
    Both,
    MapOnly,
}

impl NamingConvention {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "prefix" => Ok(Self::Prefix),
            "suffix" => Ok(Self::Suffix),
            "both" | "prefix_suffix" => Ok(Self::Both),
            "map_only" | "map" => Ok(Self::MapOnly),
            other => Err(format!(
                "unknown naming convention '{other}'; expected prefix, suffix, both, or map_only"
            )),
        }
    }
}

pub fn compose_image_name(channel_id: &str, batch_label: &str, naming: NamingConvention) -> String {
    match naming {
        NamingConvention::Prefix => format!("{batch_label}_{channel_id}"),
        NamingConvention::Suffix => format!("{channel_id}_{batch_label}"),
        NamingConvention::Both => format!("{batch_label}_{channel_id}_{batch_label}"),
        NamingConvention::MapOnly => channel_id.to_string(),
    }
}

/// Derives the batch label from the project file, e.g. `crate_set.blend` ->
/// `crate_set`.
pub fn batch_label(project: Option<&Path>) -> String {
    project
        .and_then(|path| path.file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| UNSAVED_BATCH_LABEL.to_string())
}
