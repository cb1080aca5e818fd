//! Error types for the geospatial index.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, GeoCellError>;

/// Errors raised by the geometry handle, the cell digester, and the index.
#[derive(Debug, Error)]
pub enum GeoCellError {
    /// WKB failed to decode, or the decoded form is degenerate.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Geometry kind outside Point, LineString, Polygon.
    #[error("geometry kind {0} is not supported by the cell index")]
    UnsupportedGeometry(&'static str),

    /// Serialized index stream is truncated or internally inconsistent.
    #[error("corrupt index data: {0}")]
    CorruptIndex(String),

    /// Query issued before the index was built or loaded.
    #[error("index has not been built")]
    NotBuilt,

    /// Build issued on an index that is already built or loaded.
    #[error("index has already been built")]
    AlreadyBuilt,

    /// Operation the index cannot serve, such as a range query.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Reverse lookup past the indexed row count.
    #[error("offset {offset} out of range for {rows} rows")]
    OutOfRange { offset: usize, rows: usize },

    /// Bad resolution, wrong field type, or missing configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O failure from the file-manager collaborator.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
