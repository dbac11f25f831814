use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::io::{IoError, object_from_json};

pub const DEFAULT_BOX_LABEL: &str = "3";
pub const UNKNOWN_BOX_LABEL: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoxMappingConfig {
    /// Every poster goes into the same box.
    Uniform { label: String },
    /// Explicit poster to box table.
    Table {
        labels: HashMap<String, String>,
        #[serde(default = "unknown_label")]
        unknown_label: String,
    },
}

fn unknown_label() -> String {
    UNKNOWN_BOX_LABEL.to_string()
}

impl Default for BoxMappingConfig {
    fn default() -> Self {
        Self::Uniform {
            label: DEFAULT_BOX_LABEL.to_string(),
        }
    }
}

impl BoxMappingConfig {
    /// Reads a plain `{ "posterId": "label" }` JSON object as a table mapping.
    pub fn table_from_json(path: &Path) -> Result<Self, IoError> {
        let labels: HashMap<String, String> = object_from_json(path)?;
        Ok(Self::Table {
            labels,
            unknown_label: unknown_label(),
        })
    }
}

/// Resolves the storage box label shown next to a recognized poster.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxMapping {
    config: BoxMappingConfig,
}

impl BoxMapping {
    pub fn from_config(config: &BoxMappingConfig) -> BoxMapping {
        BoxMapping {
            config: config.clone(),
        }
    }

    pub fn uniform(label: impl Into<String>) -> BoxMapping {
        Self::from_config(&BoxMappingConfig::Uniform {
            label: label.into(),
        })
    }

    pub fn table<I, K, V>(labels: I) -> BoxMapping
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_config(&BoxMappingConfig::Table {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            unknown_label: unknown_label(),
        })
    }

    pub fn label_for(&self, poster_id: &str) -> &str {
        match &self.config {
            BoxMappingConfig::Uniform { label } => label,
            BoxMappingConfig::Table {
                labels,
                unknown_label,
            } => labels.get(poster_id).unwrap_or(unknown_label),
        }
    }
}

impl Default for BoxMapping {
    fn default() -> Self {
        Self::from_config(&BoxMappingConfig::default())
    }
}
