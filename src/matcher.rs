use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::{DescriptorKind, DescriptorMatrix, Descriptors};

/// A single correspondence between a query row and a train row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    /// Bit differences between packed binary rows.
    #[default]
    Hamming,
    /// Euclidean distance.
    L2,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("cannot match {query:?} descriptors against {train:?} descriptors")]
    KindMismatch {
        query: DescriptorKind,
        train: DescriptorKind,
    },
    #[error("query rows are {query} wide but train rows are {train} wide")]
    WidthMismatch { query: usize, train: usize },
    #[error("{norm:?} norm is not defined for {kind:?} descriptors")]
    UnsupportedNorm { norm: Norm, kind: DescriptorKind },
}

pub trait DescriptorMatcher: Send + Sync {
    fn match_descriptors(
        &self,
        query: &Descriptors,
        train: &Descriptors,
    ) -> Result<Vec<DMatch>, MatchError>;
}

/// Exhaustive nearest-neighbour matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BruteForceMatcher {
    pub norm: Norm,
    pub cross_check: bool,
}

impl Default for BruteForceMatcher {
    fn default() -> Self {
        Self {
            norm: Norm::Hamming,
            cross_check: true,
        }
    }
}

impl BruteForceMatcher {
    pub fn new(norm: Norm, cross_check: bool) -> Self {
        Self { norm, cross_check }
    }

    /// Whether `query` rows can be matched against `train` rows under this norm.
    pub fn supports(&self, query: DescriptorKind, train: DescriptorKind) -> bool {
        matches!(
            (query, train, self.norm),
            (DescriptorKind::Binary, DescriptorKind::Binary, _)
                | (DescriptorKind::Float, DescriptorKind::Float, Norm::L2)
        )
    }
}

impl DescriptorMatcher for BruteForceMatcher {
    fn match_descriptors(
        &self,
        query: &Descriptors,
        train: &Descriptors,
    ) -> Result<Vec<DMatch>, MatchError> {
        if query.cols() != train.cols() {
            return Err(MatchError::WidthMismatch {
                query: query.cols(),
                train: train.cols(),
            });
        }
        let distances = match (query, train, self.norm) {
            (Descriptors::Binary(q), Descriptors::Binary(t), Norm::Hamming) => {
                distance_table(q, t, hamming_distance)
            }
            (Descriptors::Binary(q), Descriptors::Binary(t), Norm::L2) => {
                distance_table(q, t, l2_distance_u8)
            }
            (Descriptors::Float(q), Descriptors::Float(t), Norm::L2) => {
                distance_table(q, t, l2_distance_f32)
            }
            (Descriptors::Float(_), Descriptors::Float(_), Norm::Hamming) => {
                return Err(MatchError::UnsupportedNorm {
                    norm: Norm::Hamming,
                    kind: DescriptorKind::Float,
                });
            }
            _ => {
                return Err(MatchError::KindMismatch {
                    query: query.kind(),
                    train: train.kind(),
                });
            }
        };
        Ok(select_matches(&distances, train.rows(), self.cross_check))
    }
}

/// Row-major `query.rows() x train.rows()` distances.
fn distance_table<T, F>(query: &DescriptorMatrix<T>, train: &DescriptorMatrix<T>, dist: F) -> Vec<f32>
where
    T: Copy + Sync,
    F: Fn(&[T], &[T]) -> f32 + Sync,
{
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }
    let train_rows: Vec<&[T]> = train.iter_rows().collect();
    let query_rows: Vec<&[T]> = query.iter_rows().collect();
    query_rows
        .par_iter()
        .flat_map_iter(|q| train_rows.iter().map(|t| dist(*q, *t)).collect::<Vec<_>>())
        .collect()
}

/// Index of the smallest value; the lowest index wins ties.
fn argmin<I: Iterator<Item = f32>>(values: I) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, v) in values.enumerate() {
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

fn select_matches(distances: &[f32], train_rows: usize, cross_check: bool) -> Vec<DMatch> {
    if distances.is_empty() || train_rows == 0 {
        return Vec::new();
    }
    let query_rows = distances.len() / train_rows;
    let row = |q: usize| &distances[q * train_rows..(q + 1) * train_rows];

    let best_train: Vec<Option<(usize, f32)>> =
        (0..query_rows).map(|q| argmin(row(q).iter().copied())).collect();
    let best_query: Vec<Option<usize>> = if cross_check {
        (0..train_rows)
            .map(|t| argmin((0..query_rows).map(|q| row(q)[t])).map(|(q, _)| q))
            .collect()
    } else {
        Vec::new()
    };

    best_train
        .iter()
        .enumerate()
        .filter_map(|(q, best)| {
            let (t, distance) = (*best)?;
            if cross_check && best_query[t] != Some(q) {
                return None;
            }
            Some(DMatch {
                query_idx: q,
                train_idx: t,
                distance,
            })
        })
        .collect()
}

#[inline]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x ^ y).count_ones())
        .sum::<u32>() as f32
}

fn l2_distance_u8(a: &[u8], b: &[u8]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f32 - y as f32;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

fn l2_distance_f32(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
