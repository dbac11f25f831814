//! Oriented FAST and rotated BRIEF descriptors.
//!
//! Keypoints are FAST-9 corners found on a downscaled image pyramid. Each keypoint gets
//! an orientation from the intensity centroid of its patch, and a 256-bit descriptor
//! from a fixed set of point-pair comparisons rotated by that orientation.

use std::borrow::Cow;

use image::GrayImage;
use image::imageops::{self, FilterType};
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::{DescriptorKind, DescriptorMatrix, Descriptors, ORB_DESCRIPTOR_BYTES};

const DESCRIPTOR_BITS: usize = ORB_DESCRIPTOR_BYTES * u8::BITS as usize;

/// The sampling pattern must be identical between catalog build and scanning.
const PATTERN_SEED: u64 = 42;

pub const MAX_LEVELS: usize = 32;
pub const MAX_PATCH_SIZE: u32 = 255;
pub const MAX_EDGE_THRESHOLD: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("frame is empty")]
    EmptyFrame,
    #[error("invalid ORB configuration: {0}")]
    InvalidConfig(String),
}

pub trait DescriptorExtractor: Send + Sync {
    /// Returns one row per detected keypoint; zero rows when nothing was found.
    fn detect_and_compute(&self, frame: &GrayImage) -> Result<Descriptors, ExtractError>;

    /// Element kind of the rows `detect_and_compute` returns.
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Binary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbConfig {
    pub n_features: usize,
    pub scale_factor: f32,
    pub n_levels: usize,
    pub edge_threshold: u32,
    pub fast_threshold: u8,
    pub patch_size: u32,
    pub blur_sigma: f32,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            n_features: 500,
            scale_factor: 1.2,
            n_levels: 8,
            edge_threshold: 31,
            fast_threshold: 20,
            patch_size: 31,
            blur_sigma: 2.0,
        }
    }
}

impl OrbConfig {
    pub fn validate(&self) -> Result<(), ExtractError> {
        let invalid = |msg: &str| Err(ExtractError::InvalidConfig(msg.to_string()));
        if self.n_levels == 0 || self.n_levels > MAX_LEVELS {
            return invalid("n_levels must be between 1 and 32");
        }
        if self.scale_factor.is_nan() || self.scale_factor <= 1.0 {
            return invalid("scale_factor must be greater than 1");
        }
        if self.patch_size < 5 || self.patch_size > MAX_PATCH_SIZE || self.patch_size % 2 == 0 {
            return invalid("patch_size must be odd and between 5 and 255");
        }
        if self.edge_threshold <= self.patch_size / 2 || self.edge_threshold > MAX_EDGE_THRESHOLD {
            return invalid("edge_threshold must exceed half the patch size and be at most 1024");
        }
        if self.blur_sigma.is_nan() || self.blur_sigma <= 0.0 {
            return invalid("blur_sigma must be positive");
        }
        Ok(())
    }

    /// Number of features each pyramid level may keep. Finer levels get more.
    fn level_quotas(&self) -> Vec<usize> {
        let factor = 1.0 / self.scale_factor;
        let mut desired =
            self.n_features as f32 * (1.0 - factor) / (1.0 - factor.powi(self.n_levels as i32));
        let mut quotas = Vec::with_capacity(self.n_levels);
        let mut assigned = 0usize;
        for _ in 0..self.n_levels - 1 {
            let q = (desired.round() as usize).min(self.n_features - assigned);
            quotas.push(q);
            assigned += q;
            desired *= factor;
        }
        quotas.push(self.n_features - assigned);
        quotas
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Position in full-resolution frame coordinates.
    pub x: f32,
    pub y: f32,
    pub level: usize,
    /// Radians.
    pub angle: f32,
    pub response: f32,
}

pub struct OrbExtractor {
    config: OrbConfig,
    pattern: Vec<[i32; 4]>,
}

impl OrbExtractor {
    pub fn new(config: OrbConfig) -> Result<Self, ExtractError> {
        config.validate()?;
        let pattern = sampling_pattern(config.patch_size);
        Ok(Self { config, pattern })
    }

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    pub fn extract(
        &self,
        frame: &GrayImage,
    ) -> Result<(Vec<Keypoint>, DescriptorMatrix<u8>), ExtractError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(ExtractError::EmptyFrame);
        }
        let border = self.config.edge_threshold;
        let radius = (self.config.patch_size / 2) as i32;
        let mut keypoints = Vec::new();
        let mut rows: Vec<[u8; ORB_DESCRIPTOR_BYTES]> = Vec::new();

        for (level, quota) in self.config.level_quotas().into_iter().enumerate() {
            if quota == 0 {
                continue;
            }
            let scale = self.config.scale_factor.powi(level as i32);
            let w = (frame.width() as f32 / scale).round() as u32;
            let h = (frame.height() as f32 / scale).round() as u32;
            if w <= 2 * border || h <= 2 * border {
                break;
            }
            let level_img: Cow<'_, GrayImage> = if level == 0 {
                Cow::Borrowed(frame)
            } else {
                Cow::Owned(imageops::resize(frame, w, h, FilterType::Triangle))
            };

            let mut corners: Vec<_> = corners_fast9(&*level_img, self.config.fast_threshold)
                .into_iter()
                .filter(|c| c.x >= border && c.y >= border && c.x < w - border && c.y < h - border)
                .collect();
            corners.sort_by(|a, b| b.score.total_cmp(&a.score));
            corners.truncate(quota);
            if corners.is_empty() {
                continue;
            }

            let blurred = gaussian_blur_f32(&*level_img, self.config.blur_sigma);
            for c in corners {
                let angle = intensity_centroid_angle(&level_img, c.x as i32, c.y as i32, radius);
                rows.push(self.describe(&blurred, c.x as i32, c.y as i32, angle));
                keypoints.push(Keypoint {
                    x: c.x as f32 * scale,
                    y: c.y as f32 * scale,
                    level,
                    angle,
                    response: c.score,
                });
            }
        }
        log::trace!("extracted {} keypoints", keypoints.len());
        Ok((keypoints, DescriptorMatrix::from_array_rows(&rows)))
    }

    fn describe(&self, blurred: &GrayImage, x: i32, y: i32, angle: f32) -> [u8; ORB_DESCRIPTOR_BYTES] {
        let (s, c) = angle.sin_cos();
        let rotate = |px: i32, py: i32| -> (i32, i32) {
            let (px, py) = (px as f32, py as f32);
            ((px * c - py * s).round() as i32, (px * s + py * c).round() as i32)
        };
        let mut out = [0u8; ORB_DESCRIPTOR_BYTES];
        for (i, [ax, ay, bx, by]) in self.pattern.iter().copied().enumerate() {
            let (ax, ay) = rotate(ax, ay);
            let (bx, by) = rotate(bx, by);
            if pixel_clamped(blurred, x + ax, y + ay) < pixel_clamped(blurred, x + bx, y + by) {
                out[i / 8] |= 1 << (i % 8);
            }
        }
        out
    }
}

impl DescriptorExtractor for OrbExtractor {
    fn detect_and_compute(&self, frame: &GrayImage) -> Result<Descriptors, ExtractError> {
        self.extract(frame).map(|(_, d)| Descriptors::Binary(d))
    }
}

/// Point pairs uniformly distributed over the patch, reproducible across runs.
fn sampling_pattern(patch_size: u32) -> Vec<[i32; 4]> {
    let r = (patch_size / 2) as i32 - 2;
    let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
    (0..DESCRIPTOR_BITS)
        .map(|_| {
            [
                rng.random_range(-r..=r),
                rng.random_range(-r..=r),
                rng.random_range(-r..=r),
                rng.random_range(-r..=r),
            ]
        })
        .collect()
}

fn pixel_clamped(img: &GrayImage, x: i32, y: i32) -> u8 {
    let x = x.clamp(0, img.width() as i32 - 1) as u32;
    let y = y.clamp(0, img.height() as i32 - 1) as u32;
    img.get_pixel(x, y).0[0]
}

fn intensity_centroid_angle(img: &GrayImage, x: i32, y: i32, radius: i32) -> f32 {
    let mut m01 = 0i64;
    let mut m10 = 0i64;
    for dy in -radius..=radius {
        let span = ((radius * radius - dy * dy) as f32).sqrt() as i32;
        for dx in -span..=span {
            let v = pixel_clamped(img, x + dx, y + dy) as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}
