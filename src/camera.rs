use std::fmt;
use std::path::{Path, PathBuf};

use glob::glob;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageReader};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no camera matches {constraints}")]
    NoDevice { constraints: String },
    #[error("camera unavailable: {preferred}; fallback: {fallback}")]
    Unavailable {
        preferred: Box<CaptureError>,
        fallback: Box<CaptureError>,
    },
    #[error("failed to read frame {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Supplies one grayscale frame per poll tick.
pub trait FrameSource: Send {
    /// `Ok(None)` once the source has nothing more to give.
    fn read_frame(&mut self) -> Result<Option<GrayImage>, CaptureError>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Rear camera.
    Environment,
    /// Front camera.
    User,
}

impl FacingMode {
    fn dir_name(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub facing: Option<FacingMode>,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl CaptureConstraints {
    /// Rear camera at 1280x720.
    pub fn preferred() -> Self {
        Self {
            facing: Some(FacingMode::Environment),
            ideal_width: Some(1280),
            ideal_height: Some(720),
        }
    }

    /// Any camera, any resolution.
    pub fn relaxed() -> Self {
        Self::default()
    }
}

impl fmt::Display for CaptureConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.facing {
            Some(facing) => write!(f, "facing={}", facing.dir_name())?,
            None => write!(f, "facing=any")?,
        }
        if let (Some(w), Some(h)) = (self.ideal_width, self.ideal_height) {
            write!(f, " ideal={}x{}", w, h)?;
        }
        Ok(())
    }
}

fn img_filter(rp: glob::GlobResult) -> Option<PathBuf> {
    if let Ok(p) = rp {
        for ext in &[".png", ".jpg", ".jpeg"] {
            if p.as_os_str().to_string_lossy().to_lowercase().ends_with(ext) {
                return Some(p);
            }
        }
    }
    None
}

/// Sorted image paths under `root`, searched recursively.
pub fn list_images(root: &Path) -> Vec<PathBuf> {
    let pattern = format!("{}/**/*", root.display());
    let mut paths: Vec<PathBuf> = match glob(&pattern) {
        Ok(paths) => paths.filter_map(img_filter).collect(),
        Err(e) => {
            log::warn!("bad image pattern {}: {}", pattern, e);
            Vec::new()
        }
    };
    paths.sort();
    paths
}

/// A folder of still images standing in for a camera device.
///
/// A facing constraint selects the `environment/` or `user/` subfolder of the root.
pub struct ImageFolderCamera {
    root: PathBuf,
    paths: Vec<PathBuf>,
    cursor: usize,
    repeat: bool,
    ideal: Option<(u32, u32)>,
}

impl ImageFolderCamera {
    pub fn open(
        root: &Path,
        constraints: &CaptureConstraints,
        repeat: bool,
    ) -> Result<Self, CaptureError> {
        let dir = match constraints.facing {
            Some(facing) => root.join(facing.dir_name()),
            None => root.to_path_buf(),
        };
        let paths = if dir.is_dir() {
            list_images(&dir)
        } else {
            Vec::new()
        };
        if paths.is_empty() {
            return Err(CaptureError::NoDevice {
                constraints: format!("{} under {}", constraints, root.display()),
            });
        }
        log::debug!("camera {} has {} frames", dir.display(), paths.len());
        Ok(Self {
            root: dir,
            paths,
            cursor: 0,
            repeat,
            ideal: constraints.ideal_width.zip(constraints.ideal_height),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageFolderCamera {
    fn read_frame(&mut self) -> Result<Option<GrayImage>, CaptureError> {
        if self.cursor >= self.paths.len() {
            if !self.repeat {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = &self.paths[self.cursor];
        self.cursor += 1;
        let read_err = |source: image::ImageError| CaptureError::Read {
            path: path.clone(),
            source,
        };
        let img = ImageReader::open(path)
            .map_err(|e| read_err(image::ImageError::IoError(e)))?
            .decode()
            .map_err(read_err)?;
        let gray = img.to_luma8();
        Ok(Some(match self.ideal {
            Some((w, h)) => fit_within(gray, w, h),
            None => gray,
        }))
    }

    fn describe(&self) -> String {
        format!("{} ({} frames)", self.root.display(), self.paths.len())
    }
}

/// Downscales to fit inside `max_w x max_h`, keeping the aspect ratio. Never upscales.
pub fn fit_within(img: GrayImage, max_w: u32, max_h: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if (w <= max_w && h <= max_h) || w == 0 || h == 0 {
        return img;
    }
    let scale = (max_w as f32 / w as f32).min(max_h as f32 / h as f32);
    let nw = ((w as f32 * scale).round() as u32).max(1);
    let nh = ((h as f32 * scale).round() as u32).max(1);
    imageops::resize(&img, nw, nh, FilterType::Triangle)
}

pub struct AcquiredCamera {
    pub source: Box<dyn FrameSource>,
    pub fallback: bool,
}

/// Opens a camera with the preferred constraints, retrying once with relaxed ones.
pub fn acquire_camera<F>(mut open: F) -> Result<AcquiredCamera, CaptureError>
where
    F: FnMut(&CaptureConstraints) -> Result<Box<dyn FrameSource>, CaptureError>,
{
    let preferred = match open(&CaptureConstraints::preferred()) {
        Ok(source) => {
            return Ok(AcquiredCamera {
                source,
                fallback: false,
            });
        }
        Err(e) => e,
    };
    log::warn!("rear camera not available, falling back: {}", preferred);
    match open(&CaptureConstraints::relaxed()) {
        Ok(source) => Ok(AcquiredCamera {
            source,
            fallback: true,
        }),
        Err(fallback) => Err(CaptureError::Unavailable {
            preferred: Box::new(preferred),
            fallback: Box::new(fallback),
        }),
    }
}
