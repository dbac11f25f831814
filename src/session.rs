use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::box_mapping::{BoxMapping, BoxMappingConfig};
use crate::camera::{CaptureError, FrameSource};
use crate::catalog::{CatalogError, CatalogLocation, CatalogMode, FeatureCatalog, Reference};
use crate::descriptor::DescriptorKind;
use crate::io::{IoError, object_from_json};
use crate::matcher::{BruteForceMatcher, DescriptorMatcher, Norm};
use crate::orb::{DescriptorExtractor, ExtractError, OrbConfig, OrbExtractor};
use crate::presentation::{Status, StatusSink};
use crate::scan_loop::CyclePolicy;
use crate::scorer::{CandidateScorer, ScanOutcome, ScoreError, ThresholdPolicy};

pub const DEFAULT_CATALOG: &str = "poster_features.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// File path or http(s) URL of the feature catalog.
    pub catalog: String,
    pub catalog_mode: CatalogMode,
    pub interval_ms: u64,
    /// Scores at or above this are reported as not recognized.
    pub recognition_cutoff: Option<f32>,
    pub cycle_policy: CyclePolicy,
    pub boxes: BoxMappingConfig,
    pub orb: OrbConfig,
    pub norm: Norm,
    pub cross_check: bool,
    pub max_cycles: Option<u64>,
    pub repeat_frames: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            catalog: DEFAULT_CATALOG.to_string(),
            catalog_mode: CatalogMode::Lenient,
            interval_ms: 1000,
            recognition_cutoff: None,
            cycle_policy: CyclePolicy::Overlapping,
            boxes: BoxMappingConfig::default(),
            orb: OrbConfig::default(),
            norm: Norm::Hamming,
            cross_check: true,
            max_cycles: None,
            repeat_frames: false,
        }
    }
}

impl ScannerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, IoError> {
        object_from_json(path)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn threshold(&self) -> ThresholdPolicy {
        ThresholdPolicy {
            cutoff: self.recognition_cutoff,
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("could not load features: {0}")]
    Catalog(#[from] CatalogError),
    #[error("could not initialize extractor: {0}")]
    Extractor(#[from] ExtractError),
    #[error("scan interval must be positive")]
    ZeroInterval,
    #[error(
        "poster {poster_id} reference {index} holds {train:?} descriptors, which cannot be matched against {query:?} frame descriptors with the {norm:?} norm"
    )]
    IncompatibleCatalog {
        poster_id: String,
        index: usize,
        query: DescriptorKind,
        train: DescriptorKind,
        norm: Norm,
    },
}

/// Failures that end a single scan cycle. The next tick starts fresh.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("no features detected")]
    NoFeatures,
    #[error(transparent)]
    Score(#[from] ScoreError),
}

#[derive(Debug)]
pub enum CycleReport {
    Scanned(ScanOutcome),
    /// The frame source has no more frames.
    Exhausted,
    Failed(CycleError),
}

/// Every valid reference must be matchable against frame descriptors, otherwise each
/// cycle would fail on it.
fn check_compatible(
    catalog: &FeatureCatalog,
    matcher: &BruteForceMatcher,
    query: DescriptorKind,
) -> Result<(), StartupError> {
    for poster in catalog {
        for (index, reference) in poster.references.iter().enumerate() {
            let Reference::Valid(descriptors) = reference else {
                continue;
            };
            if !matcher.supports(query, descriptors.kind()) {
                return Err(StartupError::IncompatibleCatalog {
                    poster_id: poster.id.clone(),
                    index,
                    query,
                    train: descriptors.kind(),
                    norm: matcher.norm,
                });
            }
        }
    }
    Ok(())
}

/// Everything a scan needs, built once at startup and shared read-only by all cycles.
pub struct Session {
    catalog: FeatureCatalog,
    boxes: BoxMapping,
    extractor: Box<dyn DescriptorExtractor>,
    matcher: Box<dyn DescriptorMatcher>,
    threshold: ThresholdPolicy,
}

impl Session {
    pub fn new(
        catalog: FeatureCatalog,
        boxes: BoxMapping,
        extractor: Box<dyn DescriptorExtractor>,
        matcher: Box<dyn DescriptorMatcher>,
        threshold: ThresholdPolicy,
    ) -> Self {
        Self {
            catalog,
            boxes,
            extractor,
            matcher,
            threshold,
        }
    }

    /// Loads the catalog and builds the collaborators. Scanning must not start until
    /// this has returned `Ok`; an error is terminal for the session.
    pub async fn initialize(
        config: &ScannerConfig,
        sink: &mut dyn StatusSink,
    ) -> Result<Self, StartupError> {
        sink.show(&Status::Loading);
        match Self::build(config).await {
            Ok(session) => {
                sink.show(&Status::Ready);
                Ok(session)
            }
            Err(e) => {
                log::error!("startup failed: {}", e);
                sink.show(&Status::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn build(config: &ScannerConfig) -> Result<Self, StartupError> {
        if config.interval_ms == 0 {
            return Err(StartupError::ZeroInterval);
        }
        let extractor = OrbExtractor::new(config.orb.clone())?;
        let location = CatalogLocation::parse(&config.catalog);
        let catalog = FeatureCatalog::load(&location, config.catalog_mode).await?;
        let matcher = BruteForceMatcher::new(config.norm, config.cross_check);
        check_compatible(&catalog, &matcher, extractor.kind())?;
        Ok(Self::new(
            catalog,
            BoxMapping::from_config(&config.boxes),
            Box::new(extractor),
            Box::new(matcher),
            config.threshold(),
        ))
    }

    pub fn catalog(&self) -> &FeatureCatalog {
        &self.catalog
    }

    pub fn boxes(&self) -> &BoxMapping {
        &self.boxes
    }

    /// Extracts descriptors from one frame and scores them against the catalog.
    pub fn identify(&self, frame: &GrayImage) -> Result<ScanOutcome, CycleError> {
        let query = self.extractor.detect_and_compute(frame)?;
        if query.is_empty() {
            return Err(CycleError::NoFeatures);
        }
        let scorer = CandidateScorer::new(self.matcher.as_ref(), self.threshold);
        Ok(scorer.evaluate(&query, &self.catalog, &self.boxes)?)
    }

    /// One scan cycle: read a frame, identify it, show the result.
    ///
    /// The source is locked only while reading and the sink only while showing.
    pub fn run_cycle(
        &self,
        source: &Mutex<Box<dyn FrameSource>>,
        sink: &Mutex<Box<dyn StatusSink>>,
    ) -> CycleReport {
        let frame = source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read_frame();
        let report = match frame {
            Ok(None) => CycleReport::Exhausted,
            Ok(Some(frame)) => match self.identify(&frame) {
                Ok(outcome) => CycleReport::Scanned(outcome),
                Err(e) => CycleReport::Failed(e),
            },
            Err(e) => CycleReport::Failed(e.into()),
        };

        let status = match &report {
            CycleReport::Exhausted => return report,
            CycleReport::Scanned(outcome) => {
                log::info!("{}", Status::Outcome(outcome.clone()));
                Status::Outcome(outcome.clone())
            }
            CycleReport::Failed(CycleError::NoFeatures) => Status::NoFeatures,
            CycleReport::Failed(e) => {
                log::warn!("scan cycle failed: {}", e);
                Status::CycleFailed(e.to_string())
            }
        };
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .show(&status);
        report
    }
}
