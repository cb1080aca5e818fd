//! Owned geometry handle over a WKB payload.
//!
//! A [`Geometry`] couples the decoded shape with its canonical little-endian
//! WKB serialization. The decoded form drives predicate evaluation and cell
//! digestion; the byte buffer is what the index stores and serves back
//! through reverse lookup.

use bytes::Bytes;
use geo::Relate;
use geozero::wkb::Wkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};

use crate::error::{GeoCellError, Result};

/// A decoded geometry and its canonical WKB bytes.
///
/// The handle is a single owner: cloning clones both the decoded form and the
/// byte buffer, moving transfers ownership without reallocation, and the WKB
/// view borrows from the owned buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    geom: geo::Geometry<f64>,
    wkb: Bytes,
}

impl Geometry {
    /// Decode a geometry from WKB bytes.
    ///
    /// The stored buffer is the byte-exact little-endian re-export of the
    /// decoded form, independent of the input byte order.
    pub fn from_wkb(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(GeoCellError::InvalidGeometry(
                "empty WKB payload".to_string(),
            ));
        }
        let geom = Wkb(data)
            .to_geo()
            .map_err(|e| GeoCellError::InvalidGeometry(e.to_string()))?;
        Self::from_geo(geom)
    }

    /// Wrap an already decoded geometry, exporting its canonical WKB.
    pub fn from_geo(geom: geo::Geometry<f64>) -> Result<Self> {
        let wkb = geom
            .to_wkb(CoordDimensions::xy())
            .map_err(|e| GeoCellError::InvalidGeometry(e.to_string()))?;
        Ok(Self {
            geom,
            wkb: Bytes::from(wkb),
        })
    }

    /// Borrow the decoded geometry.
    pub fn geo(&self) -> &geo::Geometry<f64> {
        &self.geom
    }

    /// Borrow the canonical WKB bytes.
    pub fn wkb(&self) -> &[u8] {
        &self.wkb
    }

    /// Canonical WKB as a shared buffer.
    pub fn wkb_bytes(&self) -> Bytes {
        self.wkb.clone()
    }

    /// Length of the canonical WKB serialization.
    pub fn size(&self) -> usize {
        self.wkb.len()
    }

    /// WKT-style name of the geometry kind.
    pub fn kind(&self) -> &'static str {
        kind_name(&self.geom)
    }

    /// Point sets are identical.
    pub fn equals(&self, other: &Geometry) -> bool {
        self.geom.relate(&other.geom).is_equal_topo()
    }

    /// Boundaries intersect while interiors stay disjoint.
    pub fn touches(&self, other: &Geometry) -> bool {
        self.geom.relate(&other.geom).is_touches()
    }

    /// Same dimension, interiors intersect, neither contains the other.
    pub fn overlaps(&self, other: &Geometry) -> bool {
        self.geom.relate(&other.geom).is_overlaps()
    }

    /// Interiors intersect with dimension below the higher-dimensional side.
    pub fn crosses(&self, other: &Geometry) -> bool {
        self.geom.relate(&other.geom).is_crosses()
    }

    /// This geometry's point set is a superset of the other's and their
    /// interiors intersect.
    pub fn contains(&self, other: &Geometry) -> bool {
        self.geom.relate(&other.geom).is_contains()
    }

    /// Point sets share at least one point.
    pub fn intersects(&self, other: &Geometry) -> bool {
        self.geom.relate(&other.geom).is_intersects()
    }

    /// This geometry lies inside the other.
    pub fn within(&self, other: &Geometry) -> bool {
        self.geom.relate(&other.geom).is_within()
    }
}

pub(crate) fn kind_name(geom: &geo::Geometry<f64>) -> &'static str {
    match geom {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon, Point};

    fn point(x: f64, y: f64) -> Geometry {
        Geometry::from_geo(geo::Geometry::Point(Point::new(x, y))).unwrap()
    }

    fn square(min: f64, max: f64) -> Geometry {
        let poly = polygon![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
            (x: min, y: min),
        ];
        Geometry::from_geo(geo::Geometry::Polygon(poly)).unwrap()
    }

    #[test]
    fn test_wkb_round_trip_is_canonical() {
        let original = point(3.0, 4.0);
        let reparsed = Geometry::from_wkb(original.wkb()).unwrap();
        assert_eq!(original.wkb(), reparsed.wkb());
        assert_eq!(original, reparsed);
        assert_eq!(original.size(), original.wkb().len());
    }

    #[test]
    fn test_empty_and_garbage_input_rejected() {
        assert!(matches!(
            Geometry::from_wkb(&[]),
            Err(GeoCellError::InvalidGeometry(_))
        ));
        assert!(matches!(
            Geometry::from_wkb(&[0xDE, 0xAD, 0xBE, 0xEF]),
            Err(GeoCellError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_equals() {
        let a = point(3.0, 4.0);
        let b = point(3.0, 4.0);
        let c = point(3.0, 5.0);
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_contains_and_within() {
        let outer = square(0.0, 3.0);
        let inner = square(1.0, 2.0);
        assert!(outer.contains(&inner));
        assert!(inner.within(&outer));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&point(1.5, 1.5)));
    }

    #[test]
    fn test_touches() {
        let left = square(0.0, 1.0);
        let right = Geometry::from_geo(geo::Geometry::Polygon(polygon![
            (x: 1.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 1.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 0.0),
        ]))
        .unwrap();
        assert!(left.touches(&right));
        assert!(!left.overlaps(&right));
    }

    #[test]
    fn test_overlaps() {
        let a = square(0.0, 2.0);
        let b = Geometry::from_geo(geo::Geometry::Polygon(polygon![
            (x: 1.0, y: 1.0),
            (x: 3.0, y: 1.0),
            (x: 3.0, y: 3.0),
            (x: 1.0, y: 3.0),
            (x: 1.0, y: 1.0),
        ]))
        .unwrap();
        assert!(a.overlaps(&b));
        assert!(a.intersects(&b));
        assert!(!a.contains(&b));
    }

    #[test]
    fn test_crosses() {
        let a = Geometry::from_geo(geo::Geometry::LineString(line_string![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
        ]))
        .unwrap();
        let b = Geometry::from_geo(geo::Geometry::LineString(line_string![
            (x: 0.0, y: 2.0),
            (x: 2.0, y: 0.0),
        ]))
        .unwrap();
        assert!(a.crosses(&b));
        assert!(a.intersects(&b));
    }

    #[test]
    fn test_predicates_are_pure() {
        let a = point(1.0, 1.0);
        let b = square(0.0, 2.0);
        let before = a.wkb_bytes();
        let _ = a.within(&b);
        let _ = b.contains(&a);
        assert_eq!(a.wkb_bytes(), before);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(point(0.0, 0.0).kind(), "Point");
        assert_eq!(square(0.0, 1.0).kind(), "Polygon");
    }
}
