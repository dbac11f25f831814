//! Builds the feature catalog JSON from poster reference images.
//!
//! Expected layout, one poster per folder or per file:
//!
//! ```text
//! posters/
//!   poster_a/front.jpg
//!   poster_a/angled.jpg
//!   poster_b.png
//! ```

use std::path::{Path, PathBuf};

use image::ImageReader;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::camera::list_images;
use crate::descriptor::Descriptors;
use crate::io::{IoError, object_to_json};
use crate::orb::DescriptorExtractor;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("no poster images found under {0}")]
    NoImages(PathBuf),
    #[error(transparent)]
    Io(#[from] IoError),
}

/// Poster id and its reference image paths, sorted by id.
pub fn collect_poster_images(root: &Path) -> Result<Vec<(String, Vec<PathBuf>)>, BuildError> {
    if !root.is_dir() {
        return Err(BuildError::NotADirectory(root.to_path_buf()));
    }
    let mut posters: Vec<(String, Vec<PathBuf>)> = Vec::new();
    for path in list_images(root) {
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let mut components = relative.components();
        let first = components.next();
        let id = if components.next().is_some() {
            // root/<poster>/.../image
            first.map(|c| c.as_os_str().to_string_lossy().into_owned())
        } else {
            // root/<poster>.ext
            path.file_stem().map(|s| s.to_string_lossy().into_owned())
        };
        let Some(id) = id else {
            continue;
        };
        match posters.iter_mut().find(|(p, _)| *p == id) {
            Some((_, paths)) => paths.push(path),
            None => posters.push((id, vec![path])),
        }
    }
    if posters.is_empty() {
        return Err(BuildError::NoImages(root.to_path_buf()));
    }
    posters.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(posters)
}

fn describe_image(extractor: &dyn DescriptorExtractor, path: &Path) -> Option<Descriptors> {
    let img = match ImageReader::open(path).map(|r| r.decode()) {
        Ok(Ok(img)) => img,
        Ok(Err(e)) => {
            log::warn!("skipping {}: {}", path.display(), e);
            return None;
        }
        Err(e) => {
            log::warn!("skipping {}: {}", path.display(), e);
            return None;
        }
    };
    match extractor.detect_and_compute(&img.to_luma8()) {
        Ok(d) if d.is_empty() => {
            log::warn!("skipping {}: no features detected", path.display());
            None
        }
        Ok(d) => Some(d),
        Err(e) => {
            log::warn!("skipping {}: {}", path.display(), e);
            None
        }
    }
}

/// Extracts one reference matrix per image, in parallel.
pub fn build_catalog(
    root: &Path,
    extractor: &dyn DescriptorExtractor,
) -> Result<Map<String, Value>, BuildError> {
    let posters = collect_poster_images(root)?;
    let jobs: Vec<(usize, &PathBuf)> = posters
        .iter()
        .enumerate()
        .flat_map(|(i, (_, paths))| paths.iter().map(move |p| (i, p)))
        .collect();
    log::info!("extracting {} images of {} posters", jobs.len(), posters.len());

    let described: Vec<(usize, Option<Descriptors>)> = jobs
        .par_iter()
        .progress_count(jobs.len() as u64)
        .map(|(i, path)| (*i, describe_image(extractor, path)))
        .collect();

    let mut catalog = Map::new();
    for (i, (id, _)) in posters.iter().enumerate() {
        let matrices: Vec<Value> = described
            .iter()
            .filter(|(p, _)| *p == i)
            .filter_map(|(_, d)| d.as_ref().map(Descriptors::to_json_rows))
            .collect();
        if matrices.is_empty() {
            log::warn!("poster {} has no usable reference images", id);
            continue;
        }
        catalog.insert(id.clone(), Value::Array(matrices));
    }
    Ok(catalog)
}

pub fn write_catalog(
    root: &Path,
    extractor: &dyn DescriptorExtractor,
    output: &Path,
) -> Result<usize, BuildError> {
    let catalog = build_catalog(root, extractor)?;
    object_to_json(output, &catalog)?;
    log::info!("wrote {} posters to {}", catalog.len(), output.display());
    Ok(catalog.len())
}
