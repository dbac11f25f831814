mod common;

use common::textured_image;
use image::GrayImage;
use poster_scan::box_mapping::BoxMapping;
use poster_scan::catalog::FeatureCatalog;
use poster_scan::descriptor::{DescriptorKind, ORB_DESCRIPTOR_BYTES};
use poster_scan::matcher::BruteForceMatcher;
use poster_scan::orb::{
    DescriptorExtractor, ExtractError, MAX_EDGE_THRESHOLD, MAX_LEVELS, MAX_PATCH_SIZE, OrbConfig,
    OrbExtractor,
};
use poster_scan::scorer::{CandidateScorer, ScanOutcome, ThresholdPolicy};

#[test]
fn test_extracts_32_byte_rows() {
    let extractor = OrbExtractor::new(OrbConfig::default()).unwrap();
    let frame = textured_image(1, 320, 240);
    let (keypoints, matrix) = extractor.extract(&frame).unwrap();
    assert!(matrix.rows() > 0, "textured frame should have corners");
    assert_eq!(matrix.cols(), ORB_DESCRIPTOR_BYTES);
    assert_eq!(keypoints.len(), matrix.rows());
    assert!(keypoints.len() <= extractor.config().n_features);
    for kp in &keypoints {
        assert!(kp.x >= 0.0 && kp.x < 320.0 + 1.0);
        assert!(kp.y >= 0.0 && kp.y < 240.0 + 1.0);
        assert!(kp.level < extractor.config().n_levels);
        assert!(kp.angle.is_finite());
    }

    let descriptors = extractor.detect_and_compute(&frame).unwrap();
    assert_eq!(descriptors.kind(), DescriptorKind::Binary);
    assert_eq!(descriptors.rows(), matrix.rows());
}

#[test]
fn test_extraction_is_deterministic() {
    let frame = textured_image(5, 256, 256);
    let a = OrbExtractor::new(OrbConfig::default()).unwrap();
    let b = OrbExtractor::new(OrbConfig::default()).unwrap();
    assert_eq!(
        a.detect_and_compute(&frame).unwrap(),
        b.detect_and_compute(&frame).unwrap()
    );
}

#[test]
fn test_feature_budget() {
    let config = OrbConfig {
        n_features: 40,
        ..Default::default()
    };
    let extractor = OrbExtractor::new(config).unwrap();
    let descriptors = extractor
        .detect_and_compute(&textured_image(2, 400, 300))
        .unwrap();
    assert!(descriptors.rows() <= 40);
}

#[test]
fn test_featureless_frames() {
    let extractor = OrbExtractor::new(OrbConfig::default()).unwrap();

    let blank = GrayImage::from_pixel(320, 240, image::Luma([128]));
    assert!(extractor.detect_and_compute(&blank).unwrap().is_empty());

    // smaller than the border on both sides
    let tiny = textured_image(3, 40, 40);
    let descriptors = extractor.detect_and_compute(&tiny).unwrap();
    assert!(descriptors.is_empty());
    assert_eq!(descriptors.cols(), ORB_DESCRIPTOR_BYTES);

    assert_eq!(
        extractor.detect_and_compute(&GrayImage::new(0, 0)),
        Err(ExtractError::EmptyFrame)
    );
}

#[test]
fn test_invalid_config() {
    let bad = [
        OrbConfig {
            n_levels: 0,
            ..Default::default()
        },
        OrbConfig {
            scale_factor: 1.0,
            ..Default::default()
        },
        OrbConfig {
            n_levels: 1_000_000_000,
            ..Default::default()
        },
        OrbConfig {
            patch_size: 30,
            ..Default::default()
        },
        OrbConfig {
            patch_size: 200_001,
            edge_threshold: 200_000,
            ..Default::default()
        },
        OrbConfig {
            edge_threshold: u32::MAX,
            ..Default::default()
        },
        OrbConfig {
            edge_threshold: 10,
            ..Default::default()
        },
        OrbConfig {
            blur_sigma: 0.0,
            ..Default::default()
        },
    ];
    for config in bad {
        assert!(
            matches!(
                OrbExtractor::new(config.clone()),
                Err(ExtractError::InvalidConfig(_))
            ),
            "{:?} should be rejected",
            config
        );
    }
}

#[test]
fn test_config_upper_limits_are_accepted() {
    let config = OrbConfig {
        n_levels: MAX_LEVELS,
        patch_size: MAX_PATCH_SIZE,
        edge_threshold: MAX_EDGE_THRESHOLD,
        ..Default::default()
    };
    let extractor = OrbExtractor::new(config).unwrap();
    // every level is smaller than the border, so nothing is found
    assert!(extractor
        .detect_and_compute(&textured_image(4, 320, 240))
        .unwrap()
        .is_empty());
}

#[test]
fn test_config_from_partial_json() {
    let config: OrbConfig = serde_json::from_str(r#"{"n_features": 1000}"#).unwrap();
    assert_eq!(config.n_features, 1000);
    assert_eq!(config.n_levels, 8);
    assert_eq!(config.scale_factor, 1.2);
}

#[test]
fn test_frame_matches_its_own_reference() {
    let extractor = OrbExtractor::new(OrbConfig::default()).unwrap();
    let poster_a = textured_image(10, 320, 240);
    let poster_b = textured_image(11, 320, 240);
    let catalog = FeatureCatalog::from_posters([
        ("A", vec![extractor.detect_and_compute(&poster_a).unwrap()]),
        ("B", vec![extractor.detect_and_compute(&poster_b).unwrap()]),
    ]);

    let query = extractor.detect_and_compute(&poster_a).unwrap();
    let matcher = BruteForceMatcher::default();
    let scorer = CandidateScorer::new(&matcher, ThresholdPolicy::below(500.0));
    let outcome = scorer
        .evaluate(&query, &catalog, &BoxMapping::default())
        .unwrap();
    assert_eq!(
        outcome,
        ScanOutcome::Recognized {
            poster_id: "A".to_string(),
            score: 0.0,
            box_label: "3".to_string(),
        }
    );
}
