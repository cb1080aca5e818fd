//! Index configuration and column field types.
//!
//! Configuration is a plain serde struct so it can be loaded from JSON or any
//! other format the surrounding engine uses for index parameters.

use serde::{Deserialize, Serialize};

use crate::error::{GeoCellError, Result};

/// Index type string for the H3 cell index.
pub const H3_INDEX_TYPE: &str = "H3";

/// Finest H3 resolution accepted by the index.
pub const MAX_RESOLUTION: u8 = 15;

/// Default H3 resolution when the configuration does not set one.
pub const DEFAULT_RESOLUTION: u8 = 9;

/// Column element type as declared by the segment schema.
///
/// The geospatial index and the GIS filter operator only accept
/// [`FieldType::Geospatial`]; everything else is rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int64,
    Float64,
    Varchar,
    /// Opaque WKB byte field.
    #[default]
    Geospatial,
}

impl FieldType {
    pub(crate) fn code(self) -> u8 {
        match self {
            FieldType::Bool => 0,
            FieldType::Int64 => 1,
            FieldType::Float64 => 2,
            FieldType::Varchar => 3,
            FieldType::Geospatial => 4,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(FieldType::Bool),
            1 => Ok(FieldType::Int64),
            2 => Ok(FieldType::Float64),
            3 => Ok(FieldType::Varchar),
            4 => Ok(FieldType::Geospatial),
            other => Err(GeoCellError::CorruptIndex(format!(
                "unknown field type code {other}"
            ))),
        }
    }
}

/// Configuration for building and loading a geospatial scalar index.
///
/// # Example
///
/// ```rust
/// use geocell::IndexConfig;
///
/// let json = r#"{
///     "index_type": "H3",
///     "resolution": 7,
///     "insert_files": ["segment/101/0"]
/// }"#;
/// let config: IndexConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(config.resolution, 7);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index kind selector; only `"H3"` is recognized here.
    #[serde(default = "IndexConfig::default_index_type")]
    pub index_type: String,

    /// Maximum H3 resolution for representative cells, in [0, 15].
    #[serde(default = "IndexConfig::default_resolution")]
    pub resolution: u8,

    /// Blob paths holding raw column data, read at build time.
    #[serde(default)]
    pub insert_files: Vec<String>,

    /// Blob paths holding a serialized index, read at load time.
    #[serde(default)]
    pub index_files: Vec<String>,

    /// Declared element type of the indexed column.
    #[serde(default)]
    pub field_type: FieldType,
}

impl IndexConfig {
    fn default_index_type() -> String {
        H3_INDEX_TYPE.to_string()
    }

    const fn default_resolution() -> u8 {
        DEFAULT_RESOLUTION
    }

    /// Set the maximum resolution, keeping the rest of the defaults.
    pub fn with_resolution(resolution: u8) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }

    /// Set the blob paths read at build time.
    pub fn insert_files(mut self, paths: Vec<String>) -> Self {
        self.insert_files = paths;
        self
    }

    /// Set the blob paths read at load time.
    pub fn index_files(mut self, paths: Vec<String>) -> Self {
        self.index_files = paths;
        self
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_type: Self::default_index_type(),
            resolution: Self::default_resolution(),
            insert_files: Vec::new(),
            index_files: Vec::new(),
            field_type: FieldType::default(),
        }
    }
}
