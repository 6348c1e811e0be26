//! Contour tracing: extract boundary curves from the cleaned grid.
//!
//! This is step 4 in the pipeline. The [`ContourTracer`] trait allows
//! pluggable tracing algorithms and [`ContourTracerKind`] selects one at
//! runtime. Both algorithms map grid coordinates back to world
//! coordinates through the rasterizer's [`GridTransform`].
//!
//! Tracing returns a lazy [`Contours`] iterator. It is finite and not
//! restartable; tracing the grid again starts from scratch.

use std::collections::HashMap;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::raster::{GridTransform, OccupancyGrid};
use crate::types::{Contour, PipelineConfig, Point};

/// Selects which contour tracing algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContourTracerKind {
    /// Marching squares at the 0.5 occupancy level on the grid padded by
    /// one empty cell.
    ///
    /// Loops are oriented with the occupied region on the right, so outer
    /// boundaries are clockwise (negative signed area) and holes
    /// counter-clockwise. Saddle cells keep the two occupied corners
    /// apart.
    #[default]
    MarchingSquares,

    /// Suzuki-Abe border following via `imageproc::contours::find_contours`.
    ///
    /// Vertices sit on the centres of the boundary cells, so the traced
    /// outline lies half a cell inside the marching squares one.
    BorderFollowing,
}

/// Which raw contours survive tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContourFilter {
    /// Contours with fewer vertices (closing vertex included) are noise.
    pub min_vertices: usize,
    /// Keep boundaries of empty regions enclosed by occupied cells.
    pub keep_holes: bool,
}

impl From<&PipelineConfig> for ContourFilter {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_vertices: config.min_contour_vertices,
            keep_holes: config.keep_holes,
        }
    }
}

/// Trait for contour tracing strategies.
///
/// Input: a binary occupancy grid. Output: the closed contours of the
/// occupied region, in world coordinates.
pub trait ContourTracer {
    /// Trace contours in the given grid.
    fn trace(&self, grid: &OccupancyGrid, filter: ContourFilter) -> Contours;
}

impl ContourTracer for ContourTracerKind {
    fn trace(&self, grid: &OccupancyGrid, filter: ContourFilter) -> Contours {
        let source = match *self {
            Self::MarchingSquares => Source::Marching(MarchingLoops::new(grid.image())),
            Self::BorderFollowing => {
                Source::Traced(trace_border_following(grid, filter).into_iter())
            }
        };
        Contours {
            source,
            transform: *grid.transform(),
            filter,
        }
    }
}

/// Lazy sequence of traced contours.
pub struct Contours {
    source: Source,
    transform: GridTransform,
    filter: ContourFilter,
}

enum Source {
    Marching(MarchingLoops),
    Traced(std::vec::IntoIter<Contour>),
}

impl Iterator for Contours {
    type Item = Contour;

    fn next(&mut self) -> Option<Contour> {
        match &mut self.source {
            Source::Traced(contours) => contours.next(),
            Source::Marching(loops) => loop {
                let ring = loops.next_loop()?;
                if ring.len() < self.filter.min_vertices {
                    tracing::debug!(vertices = ring.len(), "dropped short contour");
                    continue;
                }
                // Grid rows run along +y, so orientation carries over to
                // world coordinates unchanged.
                let contour = Contour::new(
                    ring.into_iter()
                        .map(|(row, col)| self.transform.grid_to_world(row - 1.0, col - 1.0))
                        .collect(),
                );
                if !self.filter.keep_holes && contour.signed_area() > 0.0 {
                    tracing::debug!(vertices = contour.len(), "dropped hole contour");
                    continue;
                }
                return Some(contour);
            },
        }
    }
}

/// A grid edge between two neighbouring cell centres of the padded grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeKey {
    /// Between `(row, col)` and `(row, col + 1)`.
    Horizontal(u32, u32),
    /// Between `(row, col)` and `(row + 1, col)`.
    Vertical(u32, u32),
}

impl EdgeKey {
    /// Crossing point of the 0.5 level, as padded `(row, col)`.
    ///
    /// Corner values are 0 or 1, so linear interpolation always lands on
    /// the midpoint.
    fn crossing(self) -> (f64, f64) {
        match self {
            Self::Horizontal(r, c) => (f64::from(r), f64::from(c) + 0.5),
            Self::Vertical(r, c) => (f64::from(r) + 0.5, f64::from(c)),
        }
    }
}

/// Segments of every marching square, linked into loops on demand.
struct MarchingLoops {
    /// `(from, to)` in row-major square order.
    segments: Vec<(EdgeKey, EdgeKey)>,
    /// Segment index by its `from` edge.
    by_start: HashMap<EdgeKey, usize>,
    visited: Vec<bool>,
    cursor: usize,
}

impl MarchingLoops {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = image.dimensions();
        // Padded grid of (h + 2) x (w + 2) cells with an empty border.
        let at = |row: u32, col: u32| -> bool {
            row >= 1
                && col >= 1
                && row <= h
                && col <= w
                && image.get_pixel(col - 1, row - 1).0[0] > 0
        };

        let mut segments = Vec::new();
        for r in 0..=h {
            for c in 0..=w {
                // Corners of the square in world orientation: `a` south-west,
                // `b` south-east, `cc` north-east, `d` north-west.
                let a = at(r, c);
                let b = at(r, c + 1);
                let cc = at(r + 1, c + 1);
                let d = at(r + 1, c);

                let south = EdgeKey::Horizontal(r, c);
                let north = EdgeKey::Horizontal(r + 1, c);
                let west = EdgeKey::Vertical(r, c);
                let east = EdgeKey::Vertical(r, c + 1);

                // Each segment keeps the occupied corners on its right.
                match (a, b, cc, d) {
                    (false, false, false, false) | (true, true, true, true) => {}
                    (true, false, false, false) => segments.push((west, south)),
                    (false, true, false, false) => segments.push((south, east)),
                    (false, false, true, false) => segments.push((east, north)),
                    (false, false, false, true) => segments.push((north, west)),
                    (false, true, true, true) => segments.push((south, west)),
                    (true, false, true, true) => segments.push((east, south)),
                    (true, true, false, true) => segments.push((north, east)),
                    (true, true, true, false) => segments.push((west, north)),
                    (true, true, false, false) => segments.push((west, east)),
                    (false, true, true, false) => segments.push((south, north)),
                    (false, false, true, true) => segments.push((east, west)),
                    (true, false, false, true) => segments.push((north, south)),
                    (true, false, true, false) => {
                        segments.push((west, south));
                        segments.push((east, north));
                    }
                    (false, true, false, true) => {
                        segments.push((south, east));
                        segments.push((north, west));
                    }
                }
            }
        }

        let by_start = segments
            .iter()
            .enumerate()
            .map(|(i, &(from, _))| (from, i))
            .collect();
        let visited = vec![false; segments.len()];
        Self {
            segments,
            by_start,
            visited,
            cursor: 0,
        }
    }

    /// Link the next unvisited segment into a closed loop of padded
    /// `(row, col)` vertices, first vertex repeated last.
    fn next_loop(&mut self) -> Option<Vec<(f64, f64)>> {
        while self.cursor < self.segments.len() && self.visited[self.cursor] {
            self.cursor += 1;
        }
        let start = self.cursor;
        if start >= self.segments.len() {
            return None;
        }

        let mut ring = Vec::new();
        let mut i = start;
        loop {
            self.visited[i] = true;
            let (from, to) = self.segments[i];
            ring.push(from.crossing());
            match self.by_start.get(&to) {
                Some(&next) if !self.visited[next] => i = next,
                _ => break,
            }
        }
        if let Some(&first) = ring.first() {
            ring.push(first);
        }
        Some(ring)
    }
}

/// Suzuki-Abe border following via `imageproc::contours::find_contours`.
///
/// Converts contour points (cell indices) into world [`Point`]s and
/// closes each contour.
fn trace_border_following(grid: &OccupancyGrid, filter: ContourFilter) -> Vec<Contour> {
    let contours: Vec<imageproc::contours::Contour<u32>> =
        imageproc::contours::find_contours(grid.image());
    let transform = grid.transform();

    contours
        .into_iter()
        .filter(|c| {
            filter.keep_holes || !matches!(c.border_type, imageproc::contours::BorderType::Hole)
        })
        .map(|c| {
            let mut points: Vec<Point> = c
                .points
                .into_iter()
                .map(|p| transform.grid_to_world(f64::from(p.y), f64::from(p.x)))
                .collect();
            if let Some(&first) = points.first() {
                points.push(first);
            }
            Contour::new(points)
        })
        .filter(|c| c.len() >= filter.min_vertices)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Luma;

    use super::*;
    use crate::raster::OCCUPIED;

    fn unit_transform(rows: u32, cols: u32) -> GridTransform {
        // Cell centres land on integer world coordinates.
        GridTransform {
            origin: Point::new(-0.5, -0.5),
            cell_size: 1.0,
            rows,
            cols,
        }
    }

    fn grid(rows: u32, cols: u32, occupied: &[(u32, u32)]) -> OccupancyGrid {
        let mut image = GrayImage::new(cols, rows);
        for &(r, c) in occupied {
            image.put_pixel(c, r, Luma([OCCUPIED]));
        }
        OccupancyGrid::from_image(image, unit_transform(rows, cols)).unwrap()
    }

    fn block(rows: u32, cols: u32, r0: u32, c0: u32, r1: u32, c1: u32) -> OccupancyGrid {
        let cells: Vec<(u32, u32)> = (r0..r1)
            .flat_map(|r| (c0..c1).map(move |c| (r, c)))
            .collect();
        grid(rows, cols, &cells)
    }

    const ALL: ContourFilter = ContourFilter {
        min_vertices: 0,
        keep_holes: true,
    };

    #[test]
    fn default_is_marching_squares() {
        assert_eq!(
            ContourTracerKind::default(),
            ContourTracerKind::MarchingSquares
        );
    }

    #[test]
    fn empty_grid_produces_no_contours() {
        let g = grid(10, 10, &[]);
        assert_eq!(ContourTracerKind::MarchingSquares.trace(&g, ALL).count(), 0);
        assert_eq!(ContourTracerKind::BorderFollowing.trace(&g, ALL).count(), 0);
    }

    #[test]
    fn single_cell_is_a_clockwise_diamond() {
        let g = grid(3, 3, &[(1, 1)]);
        let contours: Vec<Contour> = ContourTracerKind::MarchingSquares.trace(&g, ALL).collect();
        assert_eq!(contours.len(), 1);
        let c = &contours[0];
        assert_eq!(c.len(), 5);
        assert!(c.is_closed(1e-12));
        assert!((c.signed_area() + 0.5).abs() < 1e-12);
        for p in c.points() {
            assert!(((p.x - 1.0).abs() + (p.y - 1.0).abs() - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn full_grid_closes_thanks_to_padding() {
        let g = block(4, 6, 0, 0, 4, 6);
        let contours: Vec<Contour> = ContourTracerKind::MarchingSquares.trace(&g, ALL).collect();
        assert_eq!(contours.len(), 1);
        assert!(contours[0].is_closed(1e-12));
        // 6x4 cells with the four corners chamfered by 0.125 each
        assert!((contours[0].signed_area() + 23.5).abs() < 1e-9);
    }

    #[test]
    fn ring_yields_outer_and_hole() {
        let mut cells = Vec::new();
        for r in 1..6 {
            for c in 1..6 {
                if !(r == 3 && c == 3) {
                    cells.push((r, c));
                }
            }
        }
        let g = grid(7, 7, &cells);
        let all: Vec<Contour> = ContourTracerKind::MarchingSquares.trace(&g, ALL).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all.iter().filter(|c| c.signed_area() < 0.0).count(), 1);
        assert_eq!(all.iter().filter(|c| c.signed_area() > 0.0).count(), 1);

        let outer_only = ContourFilter {
            min_vertices: 0,
            keep_holes: false,
        };
        let kept: Vec<Contour> = ContourTracerKind::MarchingSquares.trace(&g, outer_only).collect();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].signed_area() < 0.0);
    }

    #[test]
    fn saddle_keeps_diagonal_cells_apart() {
        let g = grid(4, 4, &[(1, 1), (2, 2)]);
        assert_eq!(ContourTracerKind::MarchingSquares.trace(&g, ALL).count(), 2);
    }

    #[test]
    fn short_contours_are_filtered() {
        let g = grid(8, 8, &[(1, 1)]);
        let filter = ContourFilter {
            min_vertices: 10,
            keep_holes: false,
        };
        assert_eq!(ContourTracerKind::MarchingSquares.trace(&g, filter).count(), 0);
    }

    #[test]
    fn contours_map_into_world_coordinates() {
        let mut image = GrayImage::new(3, 3);
        image.put_pixel(1, 1, Luma([OCCUPIED]));
        let transform = GridTransform {
            origin: Point::new(10.0, 20.0),
            cell_size: 0.5,
            rows: 3,
            cols: 3,
        };
        let g = OccupancyGrid::from_image(image, transform).unwrap();
        let c = ContourTracerKind::MarchingSquares.trace(&g, ALL).next().unwrap();
        let center = transform.cell_center(1, 1);
        for p in c.points() {
            assert!(p.distance(center) <= 0.25 + 1e-12);
        }
        assert!((c.signed_area() + 0.125).abs() < 1e-12);
    }

    #[test]
    fn border_following_finds_block_outline() {
        let g = block(20, 20, 5, 5, 15, 15);
        let contours: Vec<Contour> = ContourTracerKind::BorderFollowing.trace(&g, ALL).collect();
        assert_eq!(contours.len(), 1);
        assert!(contours[0].is_closed(1e-12));
        assert!((contours[0].signed_area().abs() - 81.0).abs() < 1e-9);
    }

    #[test]
    fn contours_is_lazy_and_finite() {
        let g = grid(9, 9, &[(1, 1), (4, 4), (7, 7)]);
        let mut contours = ContourTracerKind::MarchingSquares.trace(&g, ALL);
        assert!(contours.next().is_some());
        assert_eq!(contours.count(), 2);
    }
}
