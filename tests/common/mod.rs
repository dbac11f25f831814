#![allow(dead_code)]

use image::{GrayImage, Luma};
use poster_scan::camera::{CaptureError, FrameSource};
use poster_scan::descriptor::{DescriptorMatrix, Descriptors};
use poster_scan::matcher::{DMatch, DescriptorMatcher, MatchError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Random gray 8px blocks; plenty of FAST corners at the block junctions and no two
/// images alike.
pub fn textured_image(seed: u64, width: u32, height: u32) -> GrayImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let block = 8;
    let cols = width.div_ceil(block);
    let rows = height.div_ceil(block);
    let values: Vec<u8> = (0..cols * rows)
        .map(|_| rng.random_range(0..=255u8))
        .collect();
    GrayImage::from_fn(width, height, |x, y| {
        Luma([values[((y / block) * cols + x / block) as usize]])
    })
}

pub fn binary(rows: &[Vec<u8>]) -> Descriptors {
    Descriptors::Binary(DescriptorMatrix::from_rows(rows).unwrap())
}

/// A single 32-byte row with every byte set to `value`.
pub fn single_row(value: u8) -> Descriptors {
    binary(&[vec![value; 32]])
}

/// Returns canned distances chosen by the first byte of the train matrix.
pub struct CannedMatcher {
    pub by_first_byte: Vec<(u8, Vec<f32>)>,
}

impl DescriptorMatcher for CannedMatcher {
    fn match_descriptors(
        &self,
        _query: &Descriptors,
        train: &Descriptors,
    ) -> Result<Vec<DMatch>, MatchError> {
        let key = match train {
            Descriptors::Binary(m) => m.row(0).map(|r| r[0]).unwrap_or(0),
            Descriptors::Float(_) => 0,
        };
        let distances = self
            .by_first_byte
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, d)| d.clone())
            .unwrap_or_default();
        Ok(distances
            .into_iter()
            .enumerate()
            .map(|(i, distance)| DMatch {
                query_idx: i,
                train_idx: i,
                distance,
            })
            .collect())
    }
}

/// Hands out the queued frames, then reports exhaustion.
pub struct QueuedFrames {
    frames: Vec<GrayImage>,
}

impl QueuedFrames {
    pub fn new(mut frames: Vec<GrayImage>) -> Self {
        frames.reverse();
        Self { frames }
    }
}

impl FrameSource for QueuedFrames {
    fn read_frame(&mut self) -> Result<Option<GrayImage>, CaptureError> {
        Ok(self.frames.pop())
    }

    fn describe(&self) -> String {
        "queued frames".to_string()
    }
}
