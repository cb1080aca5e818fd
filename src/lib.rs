//! Geospatial scalar index for vector database segments.
//!
//! A segment's geospatial column holds one WKB geometry per row. This crate
//! evaluates the seven binary spatial predicates (`Equals`, `Touches`,
//! `Overlaps`, `Crosses`, `Contains`, `Intersects`, `Within`) into
//! row-aligned bitmaps, and maintains an H3 cell-based secondary index that
//! prunes candidates before the exact predicates run.
//!
//! ```rust
//! use bytes::Bytes;
//! use geo::Point;
//! use geocell::{GeoCellIndex, Geometry, GisOp};
//!
//! let wkb = |x, y| -> Bytes {
//!     Geometry::from_geo(geo::Geometry::Point(Point::new(x, y)))
//!         .unwrap()
//!         .wkb_bytes()
//! };
//!
//! let mut index = GeoCellIndex::in_memory(9)?;
//! index.build(&[wkb(-74.0060, 40.7128), wkb(2.3522, 48.8566)])?;
//!
//! let hits = index.exec_geo_relations(&[wkb(-74.0060, 40.7128)], GisOp::Equals)?;
//! assert!(hits[0] && !hits[1]);
//! # Ok::<(), geocell::GeoCellError>(())
//! ```

pub mod config;
pub mod digest;
pub mod error;
pub mod format;
pub mod geometry;
pub mod index;
pub mod operator;
pub mod storage;

pub use config::{FieldType, IndexConfig, DEFAULT_RESOLUTION, H3_INDEX_TYPE, MAX_RESOLUTION};
pub use error::{GeoCellError, Result};
pub use format::BinarySet;
pub use geometry::Geometry;
pub use index::{GeoCellIndex, RowBitmap, ScalarGeoIndex, SegmentGeoIndex};
pub use operator::{GisFilterOperator, GisOp, OpType};
pub use storage::{FieldBatch, FileManager, LocalFileManager};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
