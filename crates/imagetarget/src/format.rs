use image::ImageFormat;
use serde::{Deserialize, Serialize};

/// How pixel values stored in a target are interpreted when encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    /// Scene-linear colour; written with the sRGB transfer curve applied.
    LinearColor,
    /// Raw data such as roughness or normals; written unchanged.
    NonColorData,
}

impl ColorSpace {
    pub fn encode(self, value: f32) -> u8 {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        let encoded = match self {
            ColorSpace::LinearColor => linear_to_srgb(value),
            ColorSpace::NonColorData => value,
        };
        (encoded * 255.0).round() as u8
    }
}

impl std::fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorSpace::LinearColor => f.write_str("sRGB"),
            ColorSpace::NonColorData => f.write_str("Non-Color"),
        }
    }
}

fn linear_to_srgb(value: f32) -> f32 {
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// Lossless raster formats a target can be persisted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Png,
    Bmp,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Png => "png",
            FileFormat::Bmp => "bmp",
        }
    }

    pub(crate) fn image_format(self) -> ImageFormat {
        match self {
            FileFormat::Png => ImageFormat::Png,
            FileFormat::Bmp => ImageFormat::Bmp,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Ok(FileFormat::Png),
            "bmp" => Ok(FileFormat::Bmp),
            other => Err(format!(
                "unsupported image format '{other}'; expected png or bmp"
            )),
        }
    }
}
