use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use imagetarget::{FileFormat, NamingConvention};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use shadergraph::ChannelSpec;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_OUTPUT_DIR: &str = "//../FIN/TEXTURES/";
pub const DEFAULT_RESOLUTION: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BakeConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Channel ids or keys, baked in this order.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    #[serde(default = "default_resolution")]
    pub width: u32,
    #[serde(default = "default_resolution")]
    pub height: u32,
    #[serde(default)]
    pub naming: NamingConvention,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub format: FileFormat,
    /// Pause the driver takes between two steps.
    #[serde(
        default = "default_tick_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub tick_interval: Duration,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            channels: default_channels(),
            width: default_resolution(),
            height: default_resolution(),
            naming: NamingConvention::default(),
            output_dir: default_output_dir(),
            format: FileFormat::default(),
            tick_interval: default_tick_interval(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_channels() -> Vec<String> {
    shadergraph::default_channels()
        .map(|spec| spec.id.to_string())
        .collect()
}

fn default_resolution() -> u32 {
    DEFAULT_RESOLUTION
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(50)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of milliseconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_millis(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v / 1000.0))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

/// Parses a `WIDTHxHEIGHT` resolution such as `2048x1024`.
pub fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let normalized = raw.trim().to_ascii_lowercase();
    let (width, height) = normalized
        .split_once('x')
        .ok_or_else(|| format!("invalid size '{raw}'; expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in size '{raw}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in size '{raw}'"))?;
    if width == 0 || height == 0 {
        return Err(format!("size '{raw}' must be greater than zero"));
    }
    Ok((width, height))
}

impl BakeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BakeConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Loads `path` when it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolves the configured names against the channel registry, keeping
    /// the configured order.
    pub fn channel_specs(&self) -> Result<Vec<&'static ChannelSpec>, ConfigError> {
        let mut specs: Vec<&'static ChannelSpec> = Vec::with_capacity(self.channels.len());
        for name in &self.channels {
            let spec = shadergraph::lookup(name)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown channel '{name}'")))?;
            if specs.iter().any(|seen| seen.id == spec.id) {
                return Err(ConfigError::Invalid(format!(
                    "channel '{}' is listed more than once",
                    spec.id
                )));
            }
            specs.push(spec);
        }
        Ok(specs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        if self.channels.is_empty() {
            return Err(ConfigError::Invalid(
                "config must select at least one channel".into(),
            ));
        }
        self.channel_specs()?;

        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "resolution {}x{} must be greater than zero",
                self.width, self.height
            )));
        }

        if self.output_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("output_dir may not be empty".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
version = 1
channels = ["Base Color", "roughness", "Normal"]
width = 2048
height = 1024
naming = "map_only"
output_dir = "//textures/"
format = "bmp"
tick_interval = "10ms"
"#;

    #[test]
    fn parses_sample_config() {
        let config = BakeConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.width, 2048);
        assert_eq!(config.height, 1024);
        assert_eq!(config.naming, NamingConvention::MapOnly);
        assert_eq!(config.format, FileFormat::Bmp);
        assert_eq!(config.tick_interval, Duration::from_millis(10));
        let ids: Vec<_> = config
            .channel_specs()
            .unwrap()
            .iter()
            .map(|spec| spec.id)
            .collect();
        assert_eq!(ids, ["Base Color", "Roughness", "Normal"]);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = BakeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BakeConfig::default());
        assert_eq!(config.width, 4096);
        assert_eq!(config.naming, NamingConvention::Suffix);
        assert_eq!(config.output_dir, "//../FIN/TEXTURES/");
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert!(!config.channels.iter().any(|name| name == "Alpha"));
        assert_eq!(config.channels.len(), 5);
    }

    #[test]
    fn numeric_tick_interval_is_milliseconds() {
        let config = BakeConfig::from_toml_str("tick_interval = 250").unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(250));
    }

    #[test]
    fn rejects_invalid_documents() {
        for input in [
            "version = 2",
            "channels = []",
            "channels = [\"Emission\"]",
            "channels = [\"Metallic\", \"metallic\"]",
            "width = 0",
            "output_dir = \"  \"",
        ] {
            let err = BakeConfig::from_toml_str(input).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{input}: {err}");
        }
        assert!(matches!(
            BakeConfig::from_toml_str("naming = \"sideways\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("512x256"), Ok((512, 256)));
        assert_eq!(parse_size(" 1024X1024 "), Ok((1024, 1024)));
        assert!(parse_size("0x512").is_err());
        assert!(parse_size("512").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bake.toml");
        assert_eq!(BakeConfig::load_or_default(&path).unwrap(), BakeConfig::default());

        fs::write(&path, "width = 64\nheight = 32\n").unwrap();
        let config = BakeConfig::load_or_default(&path).unwrap();
        assert_eq!((config.width, config.height), (64, 32));
    }
}
