use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::format::{ColorSpace, FileFormat};
use crate::path::OutputDirResolver;
use crate::TargetError;

/// Rectangle in UV space, `v` pointing up as in texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct UvRect {
    pub u_min: f32,
    pub v_min: f32,
    pub u_max: f32,
    pub v_max: f32,
}

impl UvRect {
    pub const FULL: UvRect = UvRect {
        u_min: 0.0,
        v_min: 0.0,
        u_max: 1.0,
        v_max: 1.0,
    };

    pub fn new(u_min: f32, v_min: f32, u_max: f32, v_max: f32) -> Self {
        Self {
            u_min,
            v_min,
            u_max,
            v_max,
        }
    }
}

impl Default for UvRect {
    fn default() -> Self {
        Self::FULL
    }
}

impl From<[f32; 4]> for UvRect {
    fn from(raw: [f32; 4]) -> Self {
        Self::new(raw[0], raw[1], raw[2], raw[3])
    }
}

impl From<UvRect> for [f32; 4] {
    fn from(rect: UvRect) -> Self {
        [rect.u_min, rect.v_min, rect.u_max, rect.v_max]
    }
}

/// A named float RGBA buffer that one channel of a bake run accumulates into.
#[derive(Debug, Clone)]
pub struct ImageTarget {
    name: String,
    width: u32,
    height: u32,
    color_space: ColorSpace,
    pixels: Vec<[f32; 4]>,
    file_path: Option<PathBuf>,
}

const CLEAR_PIXEL: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

impl ImageTarget {
    fn allocate(
        name: &str,
        width: u32,
        height: u32,
        color_space: ColorSpace,
    ) -> Result<Self, TargetError> {
        let allocation_error = || TargetError::Allocation {
            name: name.to_string(),
            width,
            height,
        };
        if width == 0 || height == 0 {
            return Err(allocation_error());
        }
        let count = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(allocation_error)?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(count)
            .map_err(|_| allocation_error())?;
        pixels.resize(count, CLEAR_PIXEL);

        Ok(Self {
            name: name.to_string(),
            width,
            height,
            color_space,
            pixels,
            file_path: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Pixel at `(x, y)` with `y = 0` as the top row.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Writes `color` into every pixel covered by `region`, returning how many
    /// pixels were touched.
    pub fn fill_region(&mut self, region: UvRect, color: [f32; 4]) -> usize {
        let (x0, x1) = span(region.u_min, region.u_max, self.width);
        let (v0, v1) = span(region.v_min, region.v_max, self.height);
        // UV rows grow upward; the buffer is stored top row first.
        let (y0, y1) = (self.height as usize - v1, self.height as usize - v0);
        let width = self.width as usize;
        for y in y0..y1 {
            let row = &mut self.pixels[y * width..(y + 1) * width];
            row[x0..x1].fill(color);
        }
        (x1 - x0) * (y1 - y0)
    }

    fn to_rgba8(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 4);
        for [r, g, b, a] in &self.pixels {
            bytes.push(self.color_space.encode(*r));
            bytes.push(self.color_space.encode(*g));
            bytes.push(self.color_space.encode(*b));
            bytes.push(ColorSpace::NonColorData.encode(*a));
        }
        bytes
    }
}

fn span(min: f32, max: f32, extent: u32) -> (usize, usize) {
    let extent_f = extent as f32;
    let lo = (min.min(max) * extent_f).floor().clamp(0.0, extent_f) as usize;
    let hi = (min.max(max) * extent_f).ceil().clamp(0.0, extent_f) as usize;
    (lo, hi)
}

/// Tracks every image target allocated during a run.
#[derive(Debug)]
pub struct ImageTargetManager {
    resolver: OutputDirResolver,
    targets: BTreeMap<String, ImageTarget>,
}

impl ImageTargetManager {
    pub fn new(resolver: OutputDirResolver) -> Self {
        Self {
            resolver,
            targets: BTreeMap::new(),
        }
    }

    /// Allocates a target, or returns the live one already registered under
    /// `name`.
    pub fn create_target(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        color_space: ColorSpace,
    ) -> Result<&mut ImageTarget, TargetError> {
        if !self.targets.contains_key(name) {
            let target = ImageTarget::allocate(name, width, height, color_space)?;
            debug!(name, width, height, %color_space, "allocated image target");
            self.targets.insert(name.to_string(), target);
        }
        self.targets
            .get_mut(name)
            .ok_or_else(|| TargetError::UnknownTarget(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&ImageTarget> {
        self.targets.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ImageTarget> {
        self.targets.get_mut(name)
    }

    pub fn live_count(&self) -> usize {
        self.targets.len()
    }

    /// Writes `<directory>/<name>.<ext>` and records the path on the target.
    /// The buffer stays allocated; call `dispose` afterwards.
    pub fn persist(
        &mut self,
        name: &str,
        directory: &str,
        format: FileFormat,
    ) -> Result<PathBuf, TargetError> {
        let dir = self.resolver.resolve(directory)?;
        let target = self
            .targets
            .get_mut(name)
            .ok_or_else(|| TargetError::UnknownTarget(name.to_string()))?;

        fs::create_dir_all(&dir).map_err(|source| TargetError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(format!("{}.{}", target.name, format.extension()));
        let image = RgbaImage::from_raw(target.width, target.height, target.to_rgba8())
            .ok_or_else(|| TargetError::Allocation {
                name: target.name.clone(),
                width: target.width,
                height: target.height,
            })?;
        image
            .save_with_format(&path, format.image_format())
            .map_err(|err| match err {
                image::ImageError::IoError(source) => TargetError::Io {
                    path: path.clone(),
                    source,
                },
                source => TargetError::Encode {
                    name: target.name.clone(),
                    source,
                },
            })?;

        info!(name, path = %path.display(), "saved baked image");
        target.file_path = Some(path.clone());
        Ok(path)
    }

    /// Releases a target's buffer. Unknown or already-disposed names are
    /// ignored.
    pub fn dispose(&mut self, name: &str) -> bool {
        let removed = self.targets.remove(name).is_some();
        if removed {
            debug!(name, "disposed image target");
        }
        removed
    }

    pub fn dispose_all(&mut self) -> usize {
        let count = self.targets.len();
        self.targets.clear();
        if count > 0 {
            debug!(count, "disposed all image targets");
        }
        count
    }
}
