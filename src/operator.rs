//! Scalar filter operator for spatial predicates.
//!
//! The query engine plugs a geospatial column into this operator. In data
//! mode the operator decodes each row's WKB on the fly and applies the
//! predicate directly; in index mode it delegates to the segment's cell
//! index, which prunes candidates before the exact predicate runs.

use bitvec::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::FieldType;
use crate::error::{GeoCellError, Result};
use crate::geometry::Geometry;
use crate::index::{RowBitmap, SegmentGeoIndex};

/// Binary spatial predicates the operator can evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GisOp {
    Equals,
    Touches,
    Overlaps,
    Crosses,
    Contains,
    Intersects,
    Within,
}

impl GisOp {
    /// The predicate as a function of (row geometry, query geometry).
    pub(crate) fn predicate(self) -> fn(&Geometry, &Geometry) -> bool {
        match self {
            GisOp::Equals => Geometry::equals,
            GisOp::Touches => Geometry::touches,
            GisOp::Overlaps => Geometry::overlaps,
            GisOp::Crosses => Geometry::crosses,
            GisOp::Contains => Geometry::contains,
            GisOp::Intersects => Geometry::intersects,
            GisOp::Within => Geometry::within,
        }
    }
}

/// Ordered comparison operators of the surrounding expression engine.
///
/// Geospatial values are unordered, so the index rejects every one of these;
/// the enum exists so range requests arrive typed rather than stringly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

/// Spatial predicate filter over one geospatial column.
pub struct GisFilterOperator {
    query: Geometry,
    op: GisOp,
}

impl GisFilterOperator {
    /// Construct the operator for a column of the given type.
    ///
    /// Non-geospatial columns are a programmer error surfaced at construction.
    pub fn new(field_type: FieldType, query_wkb: &[u8], op: GisOp) -> Result<Self> {
        if field_type != FieldType::Geospatial {
            return Err(GeoCellError::InvalidConfig(format!(
                "GIS filter requires a geospatial column, got {field_type:?}"
            )));
        }
        Ok(Self {
            query: Geometry::from_wkb(query_wkb)?,
            op,
        })
    }

    pub fn op(&self) -> GisOp {
        self.op
    }

    /// Data mode: decode every non-empty row and apply the predicate.
    ///
    /// Empty rows are nulls and stay clear. The bitmap is aligned with the
    /// batch, so a row that fails to decode fails the whole batch.
    pub fn eval_batch(&self, values: &[Bytes]) -> Result<RowBitmap> {
        let predicate = self.op.predicate();
        let mut bits = bitvec![0; values.len()];
        for (row, value) in values.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let geometry = Geometry::from_wkb(value)?;
            if predicate(&geometry, &self.query) {
                bits.set(row, true);
            }
        }
        Ok(bits)
    }

    /// Index mode: candidate pruning plus exact predicate on the index.
    pub fn eval_index(&self, index: &SegmentGeoIndex) -> Result<RowBitmap> {
        index.exec_geo_relations(&[self.query.wkb_bytes()], self.op)
    }
}
