mod common;

use common::textured_image;
use image::{GrayImage, ImageFormat, Luma};
use poster_scan::box_mapping::BoxMapping;
use poster_scan::catalog::{CatalogMode, FeatureCatalog};
use poster_scan::catalog_builder::{
    BuildError, build_catalog, collect_poster_images, write_catalog,
};
use poster_scan::matcher::BruteForceMatcher;
use poster_scan::orb::{OrbConfig, OrbExtractor};
use poster_scan::scorer::ThresholdPolicy;
use poster_scan::session::Session;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn save(img: &GrayImage, path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    img.save_with_format(path, ImageFormat::Png).unwrap();
}

/// alpha: two views, beta: a single file, gamma: featureless only.
fn poster_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    save(&textured_image(100, 320, 240), &dir.path().join("alpha/front.png"));
    save(&textured_image(101, 320, 240), &dir.path().join("alpha/side.png"));
    save(&textured_image(102, 320, 240), &dir.path().join("beta.png"));
    save(
        &GrayImage::from_pixel(320, 240, Luma([40])),
        &dir.path().join("gamma/plain.png"),
    );
    fs::write(dir.path().join("README.txt"), "ignored").unwrap();
    dir
}

#[test]
fn test_collect_poster_images() {
    let dir = poster_tree();
    let posters = collect_poster_images(dir.path()).unwrap();
    let summary: Vec<(&str, usize)> = posters
        .iter()
        .map(|(id, paths)| (id.as_str(), paths.len()))
        .collect();
    assert_eq!(summary, vec![("alpha", 2), ("beta", 1), ("gamma", 1)]);
}

#[test]
fn test_bad_roots() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        collect_poster_images(dir.path()),
        Err(BuildError::NoImages(_))
    ));
    let file = dir.path().join("file.txt");
    fs::write(&file, "x").unwrap();
    assert!(matches!(
        collect_poster_images(&file),
        Err(BuildError::NotADirectory(_))
    ));
}

#[test]
fn test_build_skips_featureless_posters() {
    let dir = poster_tree();
    let extractor = OrbExtractor::new(OrbConfig::default()).unwrap();
    let catalog = build_catalog(dir.path(), &extractor).unwrap();
    let ids: Vec<&String> = catalog.keys().collect();
    assert_eq!(ids, vec!["alpha", "beta"]);
    assert_eq!(catalog["alpha"].as_array().unwrap().len(), 2);
    let first_row = &catalog["beta"][0][0];
    assert_eq!(first_row.as_array().unwrap().len(), 32);
}

#[test]
fn test_written_catalog_recognizes_its_posters() {
    let dir = poster_tree();
    let out = TempDir::new().unwrap();
    let output = out.path().join("poster_features.json");
    let extractor = OrbExtractor::new(OrbConfig::default()).unwrap();
    assert_eq!(write_catalog(dir.path(), &extractor, &output).unwrap(), 2);

    let text = fs::read_to_string(&output).unwrap();
    let catalog = FeatureCatalog::from_json_str(&text, CatalogMode::Strict).unwrap();
    assert_eq!(catalog.poster_ids().collect::<Vec<_>>(), vec!["alpha", "beta"]);
    assert_eq!(catalog.reference_count(), 3);

    let session = Session::new(
        catalog,
        BoxMapping::table([("alpha", "A1"), ("beta", "B7")]),
        Box::new(extractor),
        Box::new(BruteForceMatcher::default()),
        ThresholdPolicy::below(500.0),
    );
    for (seed, poster) in [(100, "alpha"), (101, "alpha"), (102, "beta")] {
        let outcome = session.identify(&textured_image(seed, 320, 240)).unwrap();
        assert_eq!(outcome.poster_id(), Some(poster), "seed {}", seed);
    }
}
