//! Candidate selection against the feature catalog.
//!
//! Every (poster, reference) pair is scored by matching the query against the reference
//! and summing the smallest [`TOP_K_DISTANCES`] match distances. Pairs with fewer matches
//! sum what they have, so a sparse match can score lower than a dense one. The lowest
//! score over the whole catalog wins; on equal scores the poster seen first wins.

use serde::Serialize;
use thiserror::Error;

use crate::box_mapping::BoxMapping;
use crate::catalog::{FeatureCatalog, Reference};
use crate::descriptor::{Descriptors, MatrixError};
use crate::matcher::{DMatch, DescriptorMatcher, MatchError};

pub const TOP_K_DISTANCES: usize = 10;
pub const DEFAULT_RECOGNITION_CUTOFF: f32 = 500.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("query has no descriptors")]
    InsufficientFeatures,
    #[error("poster {poster_id} reference {reference_index} is malformed: {source}")]
    MalformedEntry {
        poster_id: String,
        reference_index: usize,
        #[source]
        source: MatrixError,
    },
    #[error("matching poster {poster_id} reference {reference_index} failed: {source}")]
    Match {
        poster_id: String,
        reference_index: usize,
        #[source]
        source: MatchError,
    },
}

/// Sorts ascending and sums at most the first [`TOP_K_DISTANCES`].
pub fn aggregate_distances(mut distances: Vec<f32>) -> f32 {
    distances.sort_by(f32::total_cmp);
    distances.iter().take(TOP_K_DISTANCES).sum()
}

pub fn pair_score(matches: &[DMatch]) -> f32 {
    aggregate_distances(matches.iter().map(|m| m.distance).collect())
}

/// Optional absolute cutoff. A score is accepted only when strictly below it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThresholdPolicy {
    pub cutoff: Option<f32>,
}

impl ThresholdPolicy {
    pub fn disabled() -> Self {
        Self { cutoff: None }
    }

    pub fn below(cutoff: f32) -> Self {
        Self {
            cutoff: Some(cutoff),
        }
    }

    pub fn accepts(&self, score: f32) -> bool {
        self.cutoff.is_none_or(|c| score < c)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub poster_id: String,
    pub reference_index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ScanOutcome {
    Recognized {
        poster_id: String,
        score: f32,
        box_label: String,
    },
    /// The best candidate did not pass the threshold.
    NotRecognized { poster_id: String, score: f32 },
    NoMatch,
}

impl ScanOutcome {
    pub fn poster_id(&self) -> Option<&str> {
        match self {
            ScanOutcome::Recognized { poster_id, .. } => Some(poster_id),
            _ => None,
        }
    }
}

pub struct CandidateScorer<'a> {
    matcher: &'a dyn DescriptorMatcher,
    threshold: ThresholdPolicy,
}

impl<'a> CandidateScorer<'a> {
    pub fn new(matcher: &'a dyn DescriptorMatcher, threshold: ThresholdPolicy) -> Self {
        Self { matcher, threshold }
    }

    /// Lowest-scoring (poster, reference) pair, or `None` for a catalog without references.
    ///
    /// The first malformed or unmatchable reference aborts the whole evaluation. A pair
    /// whose score is not finite never wins.
    pub fn best_candidate(
        &self,
        query: &Descriptors,
        catalog: &FeatureCatalog,
    ) -> Result<Option<Candidate>, ScoreError> {
        if query.is_empty() {
            return Err(ScoreError::InsufficientFeatures);
        }
        let mut best: Option<Candidate> = None;
        for poster in catalog {
            for (reference_index, reference) in poster.references.iter().enumerate() {
                let train = match reference {
                    Reference::Valid(d) => d,
                    Reference::Malformed(source) => {
                        return Err(ScoreError::MalformedEntry {
                            poster_id: poster.id.clone(),
                            reference_index,
                            source: source.clone(),
                        });
                    }
                };
                let matches = self
                    .matcher
                    .match_descriptors(query, train)
                    .map_err(|source| ScoreError::Match {
                        poster_id: poster.id.clone(),
                        reference_index,
                        source,
                    })?;
                let score = pair_score(&matches);
                if !score.is_finite() {
                    log::warn!(
                        "{}[{}]: non-finite score {}, skipped",
                        poster.id,
                        reference_index,
                        score
                    );
                    continue;
                }
                log::trace!(
                    "{}[{}]: {} matches, score {}",
                    poster.id,
                    reference_index,
                    matches.len(),
                    score
                );
                if best.as_ref().is_none_or(|b| score < b.score) {
                    best = Some(Candidate {
                        poster_id: poster.id.clone(),
                        reference_index,
                        score,
                    });
                }
            }
        }
        Ok(best)
    }

    pub fn evaluate(
        &self,
        query: &Descriptors,
        catalog: &FeatureCatalog,
        boxes: &BoxMapping,
    ) -> Result<ScanOutcome, ScoreError> {
        let outcome = match self.best_candidate(query, catalog)? {
            None => ScanOutcome::NoMatch,
            Some(c) if self.threshold.accepts(c.score) => ScanOutcome::Recognized {
                box_label: boxes.label_for(&c.poster_id).to_string(),
                poster_id: c.poster_id,
                score: c.score,
            },
            Some(c) => ScanOutcome::NotRecognized {
                poster_id: c.poster_id,
                score: c.score,
            },
        };
        Ok(outcome)
    }
}
