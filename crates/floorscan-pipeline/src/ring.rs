//! Helpers for closed vertex rings.
//!
//! A ring is "open" when its closing edge is implicit and "closed" when
//! the first vertex is repeated as the last one.

use geo::{Intersects, Line};

use crate::types::Point;

/// Shoelace area with sign: positive for counter-clockwise rings.
///
/// Works on open and closed rings alike; the closing duplicate adds a
/// zero-length term.
#[must_use]
pub fn signed_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        twice += a.x.mul_add(b.y, -(b.x * a.y));
    }
    twice / 2.0
}

/// Remove consecutive duplicates (within `tolerance`) and any trailing
/// vertices that repeat the first one, returning an open ring.
#[must_use]
pub fn open_ring(points: &[Point], tolerance: f64) -> Vec<Point> {
    let mut open: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if open.last().is_none_or(|last| !last.approx_eq(p, tolerance)) {
            open.push(p);
        }
    }
    while open.len() > 1 && open[open.len() - 1].approx_eq(open[0], tolerance) {
        open.pop();
    }
    open
}

/// Close an open ring by appending an exact copy of its first vertex.
#[must_use]
pub fn close(mut open: Vec<Point>) -> Vec<Point> {
    if let Some(&first) = open.first()
        && open.last() != Some(&first)
    {
        open.push(first);
    }
    open
}

/// Returns `true` if any two non-adjacent edges of the open ring touch.
#[must_use]
pub fn is_self_intersecting(open: &[Point]) -> bool {
    let n = open.len();
    if n < 4 {
        return false;
    }
    let edge = |i: usize| {
        let a = open[i];
        let b = open[(i + 1) % n];
        Line::new((a.x, a.y), (b.x, b.y))
    };
    for i in 0..n {
        let a = edge(i);
        // Skip the neighbours i-1 and i+1, which share a vertex with i.
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if a.intersects(&edge(j)) {
                return true;
            }
        }
    }
    false
}
