//! Boundary selection: reduce the traced contours (or the raw projected
//! points) to a single outer ring.
//!
//! This is step 5 in the pipeline. [`BoundaryStrategy::LargestContour`]
//! keeps the contour enclosing the most area; [`BoundaryStrategy::ConvexHull`]
//! skips contour tracing entirely and wraps every projected point. The
//! hull is never concave, so it is a cheap approximation for rooms that
//! are close to convex.

use geo::{Area, ConvexHull, LineString, MultiPoint, Polygon};
use serde::{Deserialize, Serialize};

use crate::ring;
use crate::types::{Contour, PipelineError, Point};

/// Selects how the outer boundary is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryStrategy {
    /// The traced contour with the largest enclosed area.
    #[default]
    LargestContour,

    /// The convex hull of all projected points.
    ConvexHull,
}

impl BoundaryStrategy {
    /// Returns `true` if this strategy consumes traced contours.
    #[must_use]
    pub const fn needs_contours(self) -> bool {
        matches!(self, Self::LargestContour)
    }
}

/// Unsigned area enclosed by a ring of points.
#[must_use]
pub fn enclosed_area(points: &[Point]) -> f64 {
    let exterior: LineString<f64> = points.iter().map(|p| (p.x, p.y)).collect();
    Polygon::new(exterior, vec![]).unsigned_area()
}

/// Pick the contour with the largest enclosed area.
///
/// Contours with fewer than 3 vertices are ignored, and ties go to the
/// first contour encountered.
///
/// # Errors
///
/// Returns [`PipelineError::NoBoundaryFound`] if no contour qualifies.
pub fn largest_contour(
    contours: impl IntoIterator<Item = Contour>,
    min_vertices: usize,
) -> Result<Contour, PipelineError> {
    let mut best: Option<(f64, Contour)> = None;
    let mut candidates = 0_usize;
    for contour in contours {
        if contour.len() < 3 {
            continue;
        }
        candidates += 1;
        let area = enclosed_area(contour.points());
        if best.as_ref().is_none_or(|(best_area, _)| area > *best_area) {
            best = Some((area, contour));
        }
    }

    let Some((area, contour)) = best else {
        return Err(PipelineError::NoBoundaryFound { min_vertices });
    };
    tracing::info!(candidates, area, vertices = contour.len(), "selected largest contour");
    Ok(contour)
}

/// Convex hull of `points` as a closed counter-clockwise ring without
/// collinear vertices.
///
/// # Errors
///
/// Returns [`PipelineError::DegeneratePolygon`] if the points are all
/// collinear or fewer than 3 are distinct.
pub fn convex_hull(points: &[Point]) -> Result<Contour, PipelineError> {
    let multi: MultiPoint<f64> = points.iter().map(|p| (p.x, p.y)).collect();
    let hull = multi.convex_hull();
    let ring: Vec<Point> = hull
        .exterior()
        .coords()
        .map(|c| Point::new(c.x, c.y))
        .collect();

    let mut open = drop_collinear(&ring::open_ring(&ring, 0.0));
    if open.len() < 3 {
        return Err(PipelineError::DegeneratePolygon {
            distinct: open.len(),
        });
    }
    if ring::signed_area(&open) < 0.0 {
        open.reverse();
    }
    tracing::info!(
        points = points.len(),
        vertices = open.len(),
        area = ring::signed_area(&open),
        "computed convex hull"
    );
    Ok(Contour::new(ring::close(open)))
}

/// Remove vertices lying on the straight line between their neighbours.
fn drop_collinear(open: &[Point]) -> Vec<Point> {
    let n = open.len();
    if n < 3 {
        return open.to_vec();
    }
    let scale = open
        .iter()
        .map(|p| p.x.abs().max(p.y.abs()))
        .fold(1.0_f64, f64::max);
    let eps = 1e-12 * scale * scale;
    (0..n)
        .filter(|&i| {
            let prev = open[(i + n - 1) % n];
            let here = open[i];
            let next = open[(i + 1) % n];
            let cross = (here.x - prev.x)
                .mul_add(next.y - prev.y, -((here.y - prev.y) * (next.x - prev.x)));
            cross.abs() > eps
        })
        .map(|i| open[i])
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ring(coords: &[(f64, f64)]) -> Contour {
        let mut pts: Vec<Point> = coords.iter().map(|&(x, y)| Point::new(x, y)).collect();
        pts.push(pts[0]);
        Contour::new(pts)
    }

    #[test]
    fn largest_contour_wins() {
        let small = ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let big = ring(&[(0.0, 0.0), (3.0, 0.0), (3.0, 3.0), (0.0, 3.0)]);
        let chosen = largest_contour(vec![small, big.clone()], 3).unwrap();
        assert_eq!(chosen, big);
    }

    #[test]
    fn ties_go_to_first() {
        let a = ring(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);
        let b = ring(&[(5.0, 5.0), (7.0, 5.0), (7.0, 7.0), (5.0, 7.0)]);
        let chosen = largest_contour(vec![a.clone(), b], 3).unwrap();
        assert_eq!(chosen, a);
    }

    #[test]
    fn no_contours_is_no_boundary() {
        let err = largest_contour(Vec::new(), 10).unwrap_err();
        assert_eq!(err, PipelineError::NoBoundaryFound { min_vertices: 10 });
    }

    #[test]
    fn two_point_contours_do_not_qualify() {
        let line = Contour::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]);
        assert!(largest_contour(vec![line], 0).is_err());
    }

    #[test]
    fn orientation_does_not_affect_area() {
        let mut cw = ring(&[(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 0.0)]).into_points();
        assert!((enclosed_area(&cw) - 4.0).abs() < 1e-12);
        cw.reverse();
        assert!((enclosed_area(&cw) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn hull_of_triangle_is_its_corners() {
        let mut pts = vec![Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(0.0, 3.0)];
        // Border and interior samples.
        pts.extend([
            Point::new(2.0, 0.0),
            Point::new(0.0, 1.5),
            Point::new(2.0, 1.5),
            Point::new(1.0, 1.0),
            Point::new(0.5, 0.5),
        ]);
        let hull = convex_hull(&pts).unwrap();
        assert_eq!(hull.len(), 4);
        assert!(hull.is_closed(0.0));
        assert!((hull.signed_area() - 6.0).abs() < 1e-9);
        for corner in [Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(0.0, 3.0)] {
            assert!(hull.points().iter().any(|p| p.approx_eq(corner, 1e-9)));
        }
    }

    #[test]
    fn collinear_points_have_no_hull() {
        let pts: Vec<Point> = (0..5).map(|i| Point::new(f64::from(i), 0.0)).collect();
        assert!(matches!(
            convex_hull(&pts),
            Err(PipelineError::DegeneratePolygon { .. })
        ));
    }
}
