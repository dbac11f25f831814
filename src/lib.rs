pub mod box_mapping;
pub mod camera;
pub mod catalog;
pub mod catalog_builder;
pub mod descriptor;
pub mod io;
pub mod matcher;
pub mod orb;
pub mod presentation;
pub mod scan_loop;
pub mod scorer;
pub mod session;

pub use box_mapping::{BoxMapping, BoxMappingConfig};
pub use catalog::{CatalogLocation, CatalogMode, FeatureCatalog};
pub use descriptor::{DescriptorMatrix, Descriptors};
pub use matcher::{BruteForceMatcher, DescriptorMatcher, Norm};
pub use orb::{DescriptorExtractor, OrbConfig, OrbExtractor};
pub use scorer::{CandidateScorer, ScanOutcome, ThresholdPolicy};
pub use session::{ScannerConfig, Session};
