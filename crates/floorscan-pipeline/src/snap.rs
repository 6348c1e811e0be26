//! Axis snapping: force near-horizontal and near-vertical boundary edges
//! to be exactly axis-aligned.
//!
//! This is step 6b in the pipeline, after simplification.
//!
//! # Sequential snapping
//!
//! [`AxisSnapperKind::Sequential`] walks the ring once. For each edge
//! whose direction is within the threshold of an axis, the trailing
//! vertex's off-axis coordinate is overwritten with the leading vertex's
//! (already snapped) coordinate. Each vertex therefore depends on the
//! previous snapped vertex, not on the original polygon, and small drift
//! can accumulate around a loop with many near-threshold angles.
//!
//! The closing edge (last vertex back to the first) is snapped by moving
//! the first vertex, but only when the first edge was snapped to the
//! other axis. Moving it along the first edge then keeps that edge
//! aligned, and a second pass finds nothing left to change.

use serde::{Deserialize, Serialize};

use crate::ring;
use crate::types::{Contour, PipelineError, Point};

/// Selects which axis snapping strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AxisSnapperKind {
    /// Order-dependent, one vertex at a time.
    #[default]
    Sequential,

    /// Every maximal run of near-horizontal edges is moved onto the mean
    /// height of its vertices (near-vertical runs likewise onto their
    /// mean x). Does not drift, but the result depends on the whole
    /// ring rather than on each vertex's predecessor.
    LeastSquares,
}

/// Trait for axis snapping strategies.
///
/// Input: a ring, closed or not. Output: a closed ring with no
/// consecutive duplicates and no vertices in the middle of a straight
/// axis-aligned run.
pub trait AxisSnapper {
    /// Snap edges within `threshold_degrees` of an axis.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegeneratePolygon`] if the ring has, or
    /// is snapped down to, fewer than 3 distinct vertices.
    fn snap(&self, contour: &Contour, threshold_degrees: f64) -> Result<Contour, PipelineError>;
}

impl AxisSnapper for AxisSnapperKind {
    fn snap(&self, contour: &Contour, threshold_degrees: f64) -> Result<Contour, PipelineError> {
        let open = ring::open_ring(contour.points(), 0.0);
        if open.len() < 3 {
            return Err(PipelineError::DegeneratePolygon {
                distinct: open.len(),
            });
        }

        let snapped = match *self {
            Self::Sequential => snap_sequential(open, threshold_degrees),
            Self::LeastSquares => snap_least_squares(open, threshold_degrees),
        };

        let cleaned = drop_axis_collinear(&ring::open_ring(&snapped, 0.0));
        if cleaned.len() < 3 {
            return Err(PipelineError::DegeneratePolygon {
                distinct: cleaned.len(),
            });
        }
        Ok(Contour::new(ring::close(cleaned)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Which axis the edge `from -> to` is within `threshold` degrees of.
///
/// Zero-length edges have no direction and are never snapped.
fn classify(from: Point, to: Point, threshold: f64) -> Option<Axis> {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    let angle = dy.atan2(dx).to_degrees().abs();
    if angle < threshold || angle > 180.0 - threshold {
        Some(Axis::Horizontal)
    } else if (angle - 90.0).abs() < threshold {
        Some(Axis::Vertical)
    } else {
        None
    }
}

fn snap_sequential(mut open: Vec<Point>, threshold: f64) -> Vec<Point> {
    let n = open.len();
    let mut first_edge = None;
    for i in 1..n {
        let prev = open[i - 1];
        let axis = classify(prev, open[i], threshold);
        match axis {
            Some(Axis::Horizontal) => open[i].y = prev.y,
            Some(Axis::Vertical) => open[i].x = prev.x,
            None => {}
        }
        if i == 1 {
            first_edge = axis;
        }
    }

    match (classify(open[n - 1], open[0], threshold), first_edge) {
        (Some(Axis::Horizontal), Some(Axis::Vertical)) => open[0].y = open[n - 1].y,
        (Some(Axis::Vertical), Some(Axis::Horizontal)) => open[0].x = open[n - 1].x,
        _ => {}
    }
    open
}

fn snap_least_squares(mut open: Vec<Point>, threshold: f64) -> Vec<Point> {
    let n = open.len();
    let axes: Vec<Option<Axis>> = (0..n)
        .map(|i| classify(open[i], open[(i + 1) % n], threshold))
        .collect();

    for axis in [Axis::Horizontal, Axis::Vertical] {
        // Start scanning just after an edge of another kind, so no run
        // wraps past the scan start.
        let Some(start) = (0..n).find(|&i| axes[i] != Some(axis)) else {
            continue;
        };
        let mut run: Vec<usize> = Vec::new();
        for step in 1..=n {
            let edge = (start + step) % n;
            if axes[edge] == Some(axis) {
                if run.is_empty() {
                    run.push(edge);
                }
                run.push((edge + 1) % n);
            } else if !run.is_empty() {
                align_run(&mut open, &run, axis);
                run.clear();
            }
        }
    }
    open
}

/// Move the vertices at `indices` onto their mean coordinate across `axis`.
fn align_run(open: &mut [Point], indices: &[usize], axis: Axis) {
    #[allow(clippy::cast_precision_loss)]
    let count = indices.len() as f64;
    match axis {
        Axis::Horizontal => {
            let mean = indices.iter().map(|&i| open[i].y).sum::<f64>() / count;
            for &i in indices {
                open[i].y = mean;
            }
        }
        Axis::Vertical => {
            let mean = indices.iter().map(|&i| open[i].x).sum::<f64>() / count;
            for &i in indices {
                open[i].x = mean;
            }
        }
    }
}

/// Remove vertices in the middle of an exactly horizontal or exactly
/// vertical run.
fn drop_axis_collinear(open: &[Point]) -> Vec<Point> {
    let n = open.len();
    if n < 4 {
        return open.to_vec();
    }
    let mut kept: Vec<Point> = open.to_vec();
    loop {
        let m = kept.len();
        let Some(i) = (0..m).find(|&i| {
            let prev = kept[(i + m - 1) % m];
            let here = kept[i];
            let next = kept[(i + 1) % m];
            (prev.y == here.y && here.y == next.y) || (prev.x == here.x && here.x == next.x)
        }) else {
            return kept;
        };
        if m <= 3 {
            return kept;
        }
        kept.remove(i);
    }
}
