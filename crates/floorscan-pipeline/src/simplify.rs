//! Boundary simplification using the Ramer-Douglas-Peucker algorithm.
//!
//! Traced contours carry one vertex per grid cell along every wall.
//! Simplification removes vertices within a distance tolerance of the
//! line between their kept neighbours, leaving roughly one vertex per
//! corner.
//!
//! This is step 6a in the pipeline, between boundary selection and axis
//! snapping.

use serde::{Deserialize, Serialize};

use crate::ring;
use crate::types::{Contour, PipelineError, Point};

/// How many times the topology guard halves the tolerance before giving
/// up and keeping the input ring.
const MAX_RETRIES: u32 = 4;

/// Selects which simplifier to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimplifierKind {
    /// Ring-aware RDP that never introduces a self-intersection.
    ///
    /// If the simplified ring crosses itself where the input did not,
    /// the tolerance is halved and the ring simplified again. After a
    /// few attempts the input ring is kept as is.
    #[default]
    TopologyPreserving,

    /// Keep every vertex.
    Disabled,
}

/// Trait for boundary simplification strategies.
///
/// Input: a ring, closed or not. Output: a closed ring with at least 3
/// distinct vertices.
pub trait Simplifier {
    /// Simplify `contour` under `tolerance` metres.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegeneratePolygon`] if the input has
    /// fewer than 3 distinct vertices.
    fn simplify(&self, contour: &Contour, tolerance: f64) -> Result<Contour, PipelineError>;
}

impl Simplifier for SimplifierKind {
    fn simplify(&self, contour: &Contour, tolerance: f64) -> Result<Contour, PipelineError> {
        let open = ring::open_ring(contour.points(), 0.0);
        if open.len() < 3 {
            return Err(PipelineError::DegeneratePolygon {
                distinct: open.len(),
            });
        }

        let simplified = match *self {
            Self::Disabled => open,
            Self::TopologyPreserving => simplify_preserving_topology(open, tolerance),
        };
        Ok(Contour::new(ring::close(simplified)))
    }
}

fn simplify_preserving_topology(open: Vec<Point>, tolerance: f64) -> Vec<Point> {
    let mut tolerance = tolerance;
    let mut input_intersects: Option<bool> = None;

    for attempt in 0..=MAX_RETRIES {
        let candidate = simplify_ring(&open, tolerance);
        if candidate.len() >= 3 {
            if !ring::is_self_intersecting(&candidate) {
                tracing::debug!(
                    before = open.len(),
                    after = candidate.len(),
                    tolerance,
                    "simplified boundary"
                );
                return candidate;
            }
            // A ring that already crossed itself cannot be made worse.
            if *input_intersects.get_or_insert_with(|| ring::is_self_intersecting(&open)) {
                return candidate;
            }
        }
        tracing::debug!(attempt, tolerance, "simplified ring rejected, retrying");
        tolerance /= 2.0;
    }

    tracing::warn!(
        vertices = open.len(),
        "could not simplify boundary without self-intersection, keeping it unsimplified"
    );
    open
}

/// RDP on an open ring.
///
/// The ring is split at its first vertex and the vertex farthest from
/// it; both halves are simplified as polylines and joined. The first
/// vertex is then dropped too if it lies within `tolerance` of the line
/// between its kept neighbours.
fn simplify_ring(open: &[Point], tolerance: f64) -> Vec<Point> {
    let n = open.len();
    if n < 4 {
        return open.to_vec();
    }

    let far = (1..n)
        .max_by(|&a, &b| {
            open[0]
                .distance_squared(open[a])
                .total_cmp(&open[0].distance_squared(open[b]))
        })
        .unwrap_or(n / 2);

    // Walk the ring once with the start repeated at the end, so the two
    // halves are `0..=far` and `far..=n`.
    let mut walk = open.to_vec();
    walk.push(open[0]);

    let mut kept = vec![false; walk.len()];
    kept[0] = true;
    kept[far] = true;
    kept[n] = true;
    rdp_recurse(&walk, 0, far, tolerance, &mut kept);
    rdp_recurse(&walk, far, n, tolerance, &mut kept);

    let mut simplified: Vec<Point> = walk[..n]
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect();

    let m = simplified.len();
    if m > 3 && perpendicular_distance(simplified[0], simplified[m - 1], simplified[1]) <= tolerance
    {
        simplified.remove(0);
    }
    simplified
}

/// Recursive step of the Ramer-Douglas-Peucker algorithm.
///
/// Finds the point between `start` and `end` that is farthest from the
/// line segment between them. If that distance exceeds `tolerance`, the
/// point is kept and both sub-segments are processed recursively.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;

    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Perpendicular distance from point `p` to the line defined by `a` and `b`.
///
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Axis-aligned rectangle sampled every `step` along its edges,
    /// counter-clockwise from the origin, not closed.
    fn sampled_rectangle(w: f64, h: f64, step: f64) -> Vec<Point> {
        let mut pts = Vec::new();
        let along = |len: f64| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let n = (len / step).round() as u32;
            (0..n).map(move |i| f64::from(i) * step)
        };
        pts.extend(along(w).map(|t| Point::new(t, 0.0)));
        pts.extend(along(h).map(|t| Point::new(w, t)));
        pts.extend(along(w).map(|t| Point::new(w - t, h)));
        pts.extend(along(h).map(|t| Point::new(0.0, h - t)));
        pts
    }

    fn contour(points: Vec<Point>) -> Contour {
        Contour::new(ring::close(points))
    }

    #[test]
    fn sampled_rectangle_collapses_to_corners() {
        let c = contour(sampled_rectangle(4.0, 3.0, 0.05));
        let s = SimplifierKind::TopologyPreserving.simplify(&c, 0.1).unwrap();
        assert_eq!(s.len(), 5);
        assert!(s.is_closed(0.0));
        assert!((s.signed_area() - 12.0).abs() < 1e-9);
        for corner in [
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 3.0),
            Point::new(0.0, 3.0),
        ] {
            assert!(s.points().iter().any(|p| p.approx_eq(corner, 1e-9)));
        }
    }

    #[test]
    fn noise_within_tolerance_is_removed() {
        let mut pts = sampled_rectangle(2.0, 2.0, 0.1);
        for (i, p) in pts.iter_mut().enumerate() {
            if i % 2 == 1 {
                p.x += 0.02;
            }
        }
        let s = SimplifierKind::TopologyPreserving
            .simplify(&contour(pts), 0.1)
            .unwrap();
        assert!(s.len() <= 6, "got {} vertices", s.len());
    }

    #[test]
    fn zero_tolerance_keeps_non_collinear_vertices() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.1),
            Point::new(2.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 2.0),
        ];
        let s = SimplifierKind::TopologyPreserving
            .simplify(&contour(pts), 0.0)
            .unwrap();
        assert_eq!(s.len(), 6);
    }

    #[test]
    fn disabled_only_closes() {
        let pts = sampled_rectangle(1.0, 1.0, 0.25);
        let s = SimplifierKind::Disabled
            .simplify(&Contour::new(pts.clone()), 0.1)
            .unwrap();
        assert_eq!(s.len(), pts.len() + 1);
    }

    #[test]
    fn degenerate_input_is_rejected() {
        let c = Contour::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 0.0),
        ]);
        assert_eq!(
            SimplifierKind::TopologyPreserving.simplify(&c, 0.1),
            Err(PipelineError::DegeneratePolygon { distinct: 2 })
        );
    }

    #[test]
    fn never_drops_below_a_triangle() {
        // A sliver thinner than the tolerance.
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(5.0, 0.05),
        ];
        let s = SimplifierKind::TopologyPreserving
            .simplify(&contour(pts), 0.1)
            .unwrap();
        assert!(s.len() >= 4);
    }

    #[test]
    fn comb_stays_simple() {
        // Teeth slightly deeper than the tolerance along the top edge.
        let mut pts = vec![Point::new(0.0, 0.0), Point::new(6.0, 0.0), Point::new(6.0, 2.0)];
        for i in (0..6).rev() {
            let x = f64::from(i);
            pts.push(Point::new(x + 0.8, 2.0));
            pts.push(Point::new(x + 0.6, 1.85));
            pts.push(Point::new(x + 0.4, 2.0));
        }
        pts.push(Point::new(0.0, 2.0));
        let s = SimplifierKind::TopologyPreserving
            .simplify(&contour(pts), 0.1)
            .unwrap();
        let open = ring::open_ring(s.points(), 0.0);
        assert!(!ring::is_self_intersecting(&open));
    }

    #[test]
    fn perpendicular_distance_to_degenerate_line() {
        let d = perpendicular_distance(Point::new(3.0, 4.0), Point::new(0.0, 0.0), Point::new(0.0, 0.0));
        assert!((d - 5.0).abs() < f64::EPSILON);
    }
}
