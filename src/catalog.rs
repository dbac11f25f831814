//! The poster feature catalog.
//!
//! The catalog is a JSON object mapping each poster id to a list of reference
//! descriptor matrices:
//!
//! ```json
//! { "poster_a": [ [[12, 200, ...], ...], ... ], "poster_b": [ ... ] }
//! ```
//!
//! Poster order is the document order of the keys. The scorer walks the catalog in
//! this order, so it decides which poster wins a tie.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::descriptor::{DescriptorMatrix, Descriptors, MatrixError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch catalog {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog has an unexpected shape: {0}")]
    Shape(String),
    #[error("poster {poster_id} reference {index} is malformed: {source}")]
    MalformedEntry {
        poster_id: String,
        index: usize,
        #[source]
        source: MatrixError,
    },
}

/// How matrix-level defects (empty, ragged, bad values) are treated on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogMode {
    /// Keep the defect in the catalog; it fails the scan cycle that reaches it.
    #[default]
    Lenient,
    /// Refuse to load the catalog.
    Strict,
}

/// Where the catalog JSON lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLocation {
    Path(PathBuf),
    Url(String),
}

impl CatalogLocation {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            CatalogLocation::Url(location.to_string())
        } else {
            CatalogLocation::Path(PathBuf::from(location))
        }
    }
}

impl fmt::Display for CatalogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogLocation::Path(p) => write!(f, "{}", p.display()),
            CatalogLocation::Url(u) => f.write_str(u),
        }
    }
}

/// One reference matrix of a poster.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Valid(Descriptors),
    Malformed(MatrixError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PosterEntry {
    pub id: String,
    pub references: Vec<Reference>,
}

/// Poster id to reference descriptors, in load order. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCatalog {
    posters: Vec<PosterEntry>,
}

impl FeatureCatalog {
    /// Builds a catalog from already-validated descriptors. A repeated id replaces the
    /// earlier references but keeps the earlier position.
    pub fn from_posters<I, S>(posters: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Descriptors>)>,
        S: Into<String>,
    {
        let mut catalog = FeatureCatalog::default();
        for (id, refs) in posters {
            catalog.insert(PosterEntry {
                id: id.into(),
                references: refs.into_iter().map(Reference::Valid).collect(),
            });
        }
        catalog
    }

    fn insert(&mut self, entry: PosterEntry) {
        match self.posters.iter_mut().find(|p| p.id == entry.id) {
            Some(existing) => existing.references = entry.references,
            None => self.posters.push(entry),
        }
    }

    pub fn from_json_str(json: &str, mode: CatalogMode) -> Result<Self, CatalogError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value, mode)
    }

    pub fn from_value(value: &Value, mode: CatalogMode) -> Result<Self, CatalogError> {
        let object = value
            .as_object()
            .ok_or_else(|| CatalogError::Shape("root is not an object".to_string()))?;
        let mut catalog = FeatureCatalog::default();
        for (poster_id, matrices) in object {
            let matrices = matrices.as_array().ok_or_else(|| {
                CatalogError::Shape(format!("poster {} is not a list of matrices", poster_id))
            })?;
            let mut references = Vec::with_capacity(matrices.len());
            for (index, matrix) in matrices.iter().enumerate() {
                let reference = match parse_matrix(poster_id, index, matrix)? {
                    Ok(descriptors) => Reference::Valid(descriptors),
                    Err(source) if mode == CatalogMode::Strict => {
                        return Err(CatalogError::MalformedEntry {
                            poster_id: poster_id.clone(),
                            index,
                            source,
                        });
                    }
                    Err(source) => {
                        log::warn!("poster {} reference {} is malformed: {}", poster_id, index, source);
                        Reference::Malformed(source)
                    }
                };
                references.push(reference);
            }
            catalog.insert(PosterEntry {
                id: poster_id.clone(),
                references,
            });
        }
        Ok(catalog)
    }

    /// Fetches and parses the catalog once. There is no retry.
    pub async fn load(location: &CatalogLocation, mode: CatalogMode) -> Result<Self, CatalogError> {
        let text = match location {
            CatalogLocation::Path(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| CatalogError::Read {
                        path: path.clone(),
                        source,
                    })?
            }
            CatalogLocation::Url(url) => fetch_text(url).await?,
        };
        let catalog = Self::from_json_str(&text, mode)?;
        log::info!(
            "loaded {} posters ({} references, {} malformed) from {}",
            catalog.len(),
            catalog.reference_count(),
            catalog.malformed_count(),
            location
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.posters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posters.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PosterEntry> {
        self.posters.iter()
    }

    pub fn get(&self, poster_id: &str) -> Option<&PosterEntry> {
        self.posters.iter().find(|p| p.id == poster_id)
    }

    pub fn contains(&self, poster_id: &str) -> bool {
        self.get(poster_id).is_some()
    }

    pub fn poster_ids(&self) -> impl Iterator<Item = &str> {
        self.posters.iter().map(|p| p.id.as_str())
    }

    pub fn reference_count(&self) -> usize {
        self.posters.iter().map(|p| p.references.len()).sum()
    }

    pub fn malformed_count(&self) -> usize {
        self.posters
            .iter()
            .flat_map(|p| &p.references)
            .filter(|r| matches!(r, Reference::Malformed(_)))
            .count()
    }
}

impl<'a> IntoIterator for &'a FeatureCatalog {
    type Item = &'a PosterEntry;
    type IntoIter = std::slice::Iter<'a, PosterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

async fn fetch_text(url: &str) -> Result<String, CatalogError> {
    let wrap = |source| CatalogError::Fetch {
        url: url.to_string(),
        source,
    };
    let response = reqwest::get(url).await.map_err(wrap)?;
    let response = response.error_for_status().map_err(wrap)?;
    response.text().await.map_err(wrap)
}

/// Outer error: the JSON does not have the catalog shape at all.
/// Inner error: the matrix is shaped right but unusable.
fn parse_matrix(
    poster_id: &str,
    index: usize,
    matrix: &Value,
) -> Result<Result<Descriptors, MatrixError>, CatalogError> {
    let rows = matrix.as_array().ok_or_else(|| {
        CatalogError::Shape(format!("poster {} reference {} is not a matrix", poster_id, index))
    })?;
    let mut values: Vec<Vec<f64>> = Vec::with_capacity(rows.len());
    for (r, row) in rows.iter().enumerate() {
        let row = row.as_array().ok_or_else(|| {
            CatalogError::Shape(format!(
                "poster {} reference {} row {} is not a list",
                poster_id, index, r
            ))
        })?;
        let mut parsed = Vec::with_capacity(row.len());
        for (c, v) in row.iter().enumerate() {
            match v.as_f64() {
                // stored as f32 later, so the value must survive that cast
                Some(x) if x >= 0.0 && (x as f32).is_finite() => parsed.push(x),
                _ => {
                    return Ok(Err(MatrixError::InvalidValue {
                        row: r,
                        col: c,
                        value: v.to_string(),
                    }));
                }
            }
        }
        values.push(parsed);
    }

    let binary = values
        .iter()
        .flatten()
        .all(|x| x.fract() == 0.0 && *x <= u8::MAX as f64);
    let descriptors = if binary {
        let rows: Vec<Vec<u8>> = values
            .iter()
            .map(|r| r.iter().map(|x| *x as u8).collect())
            .collect();
        DescriptorMatrix::from_rows(&rows).map(Descriptors::Binary)
    } else {
        let rows: Vec<Vec<f32>> = values
            .iter()
            .map(|r| r.iter().map(|x| *x as f32).collect())
            .collect();
        DescriptorMatrix::from_rows(&rows).map(Descriptors::Float)
    };
    Ok(descriptors)
}
