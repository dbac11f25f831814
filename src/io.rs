use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error on {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Serializes an object to a pretty-printed JSON file.
pub fn object_to_json<T: Serialize>(output_path: &Path, object: &T) -> Result<(), IoError> {
    let j = serde_json::to_string_pretty(object).map_err(|source| IoError::Json {
        path: output_path.to_path_buf(),
        source,
    })?;
    let file_err = |source: std::io::Error| IoError::File {
        path: output_path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::create(output_path).map_err(file_err)?;
    file.write_all(j.as_bytes()).map_err(file_err)?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: &Path) -> Result<T, IoError> {
    let contents = std::fs::read_to_string(file_path).map_err(|source| IoError::File {
        path: file_path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| IoError::Json {
        path: file_path.to_path_buf(),
        source,
    })
}
