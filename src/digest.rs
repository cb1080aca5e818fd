//! Representative-cell digestion.
//!
//! Every indexed shape is summarized by a single H3 cell: the root of the
//! smallest cell subtree, at or below the configured maximum resolution, that
//! covers the whole shape. Points map straight to a cell; line strings and
//! polygons start from a covering cell set at the maximum resolution and walk
//! the hierarchy upward until one cell remains.

use geo::Coord;
use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::{CellIndex, LatLng, Resolution};
use rustc_hash::FxHashSet;

use crate::error::{GeoCellError, Result};
use crate::geometry::kind_name;

/// Compute the representative cell of a decoded geometry.
///
/// The result is deterministic for fixed input bytes and resolution, and by
/// construction covers the input shape, so candidate pruning may restrict
/// itself to the representative, its ancestors, and its descendants.
///
/// Kinds outside Point, LineString, and Polygon fail with
/// [`GeoCellError::UnsupportedGeometry`].
pub fn representative_cell(
    geom: &geo::Geometry<f64>,
    resolution: Resolution,
) -> Result<CellIndex> {
    match geom {
        geo::Geometry::Point(point) => cell_of_coord(point.0, resolution),
        geo::Geometry::LineString(line) => {
            let mut cells = FxHashSet::default();
            for coord in line.coords() {
                cells.insert(cell_of_coord(*coord, resolution)?);
            }
            if cells.is_empty() {
                return Err(GeoCellError::InvalidGeometry(
                    "line string has no vertices".to_string(),
                ));
            }
            reduce_to_single(cells, resolution)
        }
        geo::Geometry::Polygon(polygon) => {
            let mut tiler = TilerBuilder::new(resolution)
                .containment_mode(ContainmentMode::Covers)
                .build();
            tiler
                .add(polygon.clone())
                .map_err(|e| GeoCellError::InvalidGeometry(e.to_string()))?;
            let cells: FxHashSet<CellIndex> = tiler.into_coverage().collect();
            if cells.is_empty() {
                return Err(GeoCellError::InvalidGeometry(
                    "polygon produced no covering cells".to_string(),
                ));
            }
            reduce_to_single(cells, resolution)
        }
        other => Err(GeoCellError::UnsupportedGeometry(kind_name(other))),
    }
}

fn cell_of_coord(coord: Coord<f64>, resolution: Resolution) -> Result<CellIndex> {
    let latlng = LatLng::new(coord.y, coord.x)
        .map_err(|e| GeoCellError::InvalidGeometry(e.to_string()))?;
    Ok(latlng.to_cell(resolution))
}

/// Replace every cell with its parent one resolution down until a single
/// cell remains.
///
/// Bounded below by resolution 0: a shape whose covering cells never collapse
/// spans more than one base cell and has no single covering cell.
fn reduce_to_single(mut cells: FxHashSet<CellIndex>, resolution: Resolution) -> Result<CellIndex> {
    let mut level = u8::from(resolution);
    while cells.len() > 1 {
        if level == 0 {
            return Err(GeoCellError::InvalidGeometry(
                "geometry spans multiple H3 base cells".to_string(),
            ));
        }
        level -= 1;
        let coarser = Resolution::try_from(level)
            .map_err(|e| GeoCellError::InvalidGeometry(e.to_string()))?;
        let mut reduced = FxHashSet::default();
        for cell in cells {
            let parent = cell.parent(coarser).ok_or_else(|| {
                GeoCellError::InvalidGeometry(format!(
                    "cell {cell} has no parent at resolution {coarser}"
                ))
            })?;
            reduced.insert(parent);
        }
        cells = reduced;
    }
    cells.into_iter().next().ok_or_else(|| {
        GeoCellError::InvalidGeometry("no cells left after reduction".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon, MultiPoint, Point};

    const RES: Resolution = Resolution::Nine;

    #[test]
    fn test_point_maps_to_max_resolution_cell() {
        let geom = geo::Geometry::Point(Point::new(3.0, 4.0));
        let cell = representative_cell(&geom, RES).unwrap();
        assert_eq!(cell.resolution(), RES);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let geom = geo::Geometry::LineString(line_string![
            (x: 3.0, y: 4.0),
            (x: 4.0, y: 4.0),
            (x: 4.0, y: 5.0),
            (x: 3.0, y: 5.0),
        ]);
        let a = representative_cell(&geom, RES).unwrap();
        let b = representative_cell(&geom, RES).unwrap();
        assert_eq!(a, b);
        assert!(a.resolution() <= RES);
    }

    #[test]
    fn test_line_string_reduces_below_vertex_resolution() {
        // Vertices a degree apart cannot share a resolution-9 cell.
        let geom = geo::Geometry::LineString(line_string![
            (x: 3.0, y: 4.0),
            (x: 4.0, y: 5.0),
        ]);
        let cell = representative_cell(&geom, RES).unwrap();
        assert!(cell.resolution() < RES);
    }

    #[test]
    fn test_single_vertex_line_matches_point() {
        let line = geo::Geometry::LineString(line_string![(x: 3.0, y: 4.0)]);
        let point = geo::Geometry::Point(Point::new(3.0, 4.0));
        assert_eq!(
            representative_cell(&line, RES).unwrap(),
            representative_cell(&point, RES).unwrap()
        );
    }

    #[test]
    fn test_polygon_covering_reduces_to_one_cell() {
        let geom = geo::Geometry::Polygon(polygon![
            (x: 3.0, y: 4.0),
            (x: 4.0, y: 4.0),
            (x: 4.0, y: 5.0),
            (x: 3.0, y: 5.0),
            (x: 3.0, y: 4.0),
        ]);
        let cell = representative_cell(&geom, RES).unwrap();
        assert!(cell.resolution() <= RES);
    }

    #[test]
    fn test_unsupported_kind_rejected() {
        let geom = geo::Geometry::MultiPoint(MultiPoint::from(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
        ]));
        assert!(matches!(
            representative_cell(&geom, RES),
            Err(GeoCellError::UnsupportedGeometry("MultiPoint"))
        ));
    }

    #[test]
    fn test_non_finite_coordinate_rejected() {
        let geom = geo::Geometry::Point(Point::new(0.0, f64::NAN));
        assert!(matches!(
            representative_cell(&geom, RES),
            Err(GeoCellError::InvalidGeometry(_))
        ));
    }
}
