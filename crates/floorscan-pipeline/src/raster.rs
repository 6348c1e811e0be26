//! Planar rasterization of projected points into an occupancy grid.
//!
//! This is step 2 in the pipeline. The grid is an 8-bit single-channel
//! image (`0` empty, `255` occupied) so later steps can use `imageproc`
//! directly. Image column `c` runs along +x and image row `r` along +y,
//! so row 0 is the southern edge of the scene.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::types::{PipelineConfig, PipelineError, Point};

/// Pixel value of an occupied cell.
pub const OCCUPIED: u8 = 255;

/// Affine map between world coordinates and grid cells.
///
/// Cell `(row, col)` covers `[x0 + col·g, x0 + (col+1)·g) ×
/// [y0 + row·g, y0 + (row+1)·g)` where `(x0, y0)` is the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridTransform {
    /// World position of the south-west corner of cell `(0, 0)`.
    pub origin: Point,
    /// Cell edge length in metres.
    pub cell_size: f64,
    pub rows: u32,
    pub cols: u32,
}

impl GridTransform {
    /// Cover `points` with a padded grid of `cell_size` cells.
    ///
    /// The bounding box is grown on every side by
    /// `max(padding_fraction · larger extent, PipelineConfig::MIN_PADDING)`
    /// and each axis gets `ceil(extent / g) + 1` cells.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `cell_size` is not
    /// positive, or if the grid would be too large to address.
    pub fn covering(
        points: &[Point],
        cell_size: f64,
        padding_fraction: f64,
    ) -> Result<Self, PipelineError> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "cell_size must be > 0, got {cell_size}"
            )));
        }

        let (mut min, mut max) = points.iter().fold(
            (
                Point::new(f64::INFINITY, f64::INFINITY),
                Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            ),
            |(lo, hi), p| {
                (
                    Point::new(lo.x.min(p.x), lo.y.min(p.y)),
                    Point::new(hi.x.max(p.x), hi.y.max(p.y)),
                )
            },
        );
        if points.is_empty() {
            min = Point::new(0.0, 0.0);
            max = min;
        }

        let extent = (max.x - min.x).max(max.y - min.y);
        let padding = (padding_fraction * extent).max(PipelineConfig::MIN_PADDING);
        min = Point::new(min.x - padding, min.y - padding);
        max = Point::new(max.x + padding, max.y + padding);

        let cells = |span: f64| -> Result<u32, PipelineError> {
            let n = (span / cell_size).ceil() + 1.0;
            if n > f64::from(u32::MAX) || !n.is_finite() {
                return Err(PipelineError::InvalidConfig(format!(
                    "cell_size {cell_size} gives a grid with {n} cells per axis"
                )));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Ok(n as u32)
        };

        Ok(Self {
            origin: min,
            cell_size,
            rows: cells(max.y - min.y)?,
            cols: cells(max.x - min.x)?,
        })
    }

    /// The cell containing `p`, or `None` if `p` lies outside the grid.
    ///
    /// Offsets from the origin are truncated, not rounded. A point on
    /// the far edge of the grid is clamped into the last cell.
    #[must_use]
    pub fn world_to_cell(&self, p: Point) -> Option<(u32, u32)> {
        let axis = |offset: f64, cells: u32| -> Option<u32> {
            if !(offset >= 0.0 && offset <= f64::from(cells) * self.cell_size) {
                return None;
            }
            let idx = (offset / self.cell_size).floor();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Some((idx as u32).min(cells - 1))
        };
        Some((
            axis(p.y - self.origin.y, self.rows)?,
            axis(p.x - self.origin.x, self.cols)?,
        ))
    }

    /// World position of the centre of cell `(row, col)`.
    #[must_use]
    pub fn cell_center(&self, row: u32, col: u32) -> Point {
        self.grid_to_world(f64::from(row), f64::from(col))
    }

    /// Continuous grid-to-world map. Integer coordinates are cell
    /// centres; contour vertices fall between them.
    #[must_use]
    pub fn grid_to_world(&self, row: f64, col: f64) -> Point {
        Point::new(
            (col + 0.5).mul_add(self.cell_size, self.origin.x),
            (row + 0.5).mul_add(self.cell_size, self.origin.y),
        )
    }

    /// World extent covered by the grid, as `(width, height)` in metres.
    #[must_use]
    pub fn world_size(&self) -> (f64, f64) {
        (
            f64::from(self.cols) * self.cell_size,
            f64::from(self.rows) * self.cell_size,
        )
    }
}

/// A binary occupancy grid and the transform that places it in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    image: GrayImage,
    transform: GridTransform,
}

impl OccupancyGrid {
    /// Wrap an image whose dimensions match `transform`.
    ///
    /// Returns `None` on a size mismatch.
    #[must_use]
    pub fn from_image(image: GrayImage, transform: GridTransform) -> Option<Self> {
        (image.width() == transform.cols && image.height() == transform.rows)
            .then_some(Self { image, transform })
    }

    /// The raw cell image: width = columns, height = rows.
    #[must_use]
    pub const fn image(&self) -> &GrayImage {
        &self.image
    }

    #[must_use]
    pub const fn transform(&self) -> &GridTransform {
        &self.transform
    }

    #[must_use]
    pub fn is_occupied(&self, row: u32, col: u32) -> bool {
        self.image
            .get_pixel_checked(col, row)
            .is_some_and(|px| px.0[0] > 0)
    }

    /// Number of occupied cells.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.image.pixels().filter(|px| px.0[0] > 0).count()
    }

    /// Same transform, different cells. Callers pass an image derived
    /// from this grid's own, so the dimensions already agree.
    #[must_use = "returns a new grid; the original is unchanged"]
    pub(crate) fn with_image(&self, image: GrayImage) -> Self {
        Self {
            image,
            transform: self.transform,
        }
    }
}

/// Rasterize projected points at the given cell size.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `cell_size <= 0`.
pub fn rasterize(
    points: &[Point],
    cell_size: f64,
    padding_fraction: f64,
) -> Result<OccupancyGrid, PipelineError> {
    let transform = GridTransform::covering(points, cell_size, padding_fraction)?;
    let mut image = GrayImage::new(transform.cols, transform.rows);

    let mut dropped = 0_usize;
    for &p in points {
        match transform.world_to_cell(p) {
            Some((row, col)) => image.put_pixel(col, row, Luma([OCCUPIED])),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::warn!(dropped, "points fell outside the occupancy grid");
    }

    let grid = OccupancyGrid { image, transform };
    tracing::info!(
        rows = transform.rows,
        cols = transform.cols,
        occupied = grid.occupied_count(),
        "rasterized occupancy grid"
    );
    Ok(grid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square_ring(side: f64, step: f64) -> Vec<Point> {
        let mut pts = Vec::new();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = (side / step).round() as u32;
        for i in 0..=n {
            let t = f64::from(i) * step;
            pts.push(Point::new(t, 0.0));
            pts.push(Point::new(t, side));
            pts.push(Point::new(0.0, t));
            pts.push(Point::new(side, t));
        }
        pts
    }

    #[test]
    fn grid_dimensions_include_padding() {
        let pts = square_ring(4.0, 0.05);
        let grid = rasterize(&pts, 0.1, 0.05).unwrap();
        // extent 4 + 2·0.2 padding = 4.4 → ceil(44) + 1, give or take
        // one cell of float rounding
        assert!((45..=46).contains(&grid.transform().cols));
        assert_eq!(grid.transform().rows, grid.transform().cols);
        assert!((grid.transform().origin.x + 0.2).abs() < 1e-12);
    }

    #[test]
    fn tiny_scene_gets_minimum_padding() {
        let pts = [Point::new(0.0, 0.0), Point::new(0.01, 0.0)];
        let t = GridTransform::covering(&pts, 0.05, 0.05).unwrap();
        assert!((t.origin.x + PipelineConfig::MIN_PADDING).abs() < 1e-12);
        assert!(t.rows >= 1 && t.cols >= 1);
    }

    #[test]
    fn single_point_gives_non_empty_grid() {
        let grid = rasterize(&[Point::new(3.0, -2.0)], 0.05, 0.05).unwrap();
        assert_eq!(grid.occupied_count(), 1);
    }

    #[test]
    fn rejects_non_positive_cell_size() {
        let pts = [Point::new(0.0, 0.0)];
        assert!(matches!(
            rasterize(&pts, 0.0, 0.05),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(rasterize(&pts, -1.0, 0.05).is_err());
    }

    #[test]
    fn world_to_cell_truncates() {
        let t = GridTransform {
            origin: Point::new(0.0, 0.0),
            cell_size: 0.1,
            rows: 10,
            cols: 10,
        };
        assert_eq!(t.world_to_cell(Point::new(0.19, 0.01)), Some((0, 1)));
        assert_eq!(t.world_to_cell(Point::new(0.0, 0.099)), Some((0, 0)));
        assert_eq!(t.world_to_cell(Point::new(-0.01, 0.5)), None);
    }

    #[test]
    fn far_edge_is_clamped_not_dropped() {
        let t = GridTransform {
            origin: Point::new(0.0, 0.0),
            cell_size: 0.1,
            rows: 10,
            cols: 10,
        };
        assert_eq!(t.world_to_cell(Point::new(1.0, 1.0)), Some((9, 9)));
        assert_eq!(t.world_to_cell(Point::new(1.2, 0.0)), None);
    }

    #[test]
    fn just_past_the_far_edge_is_outside() {
        let t = GridTransform {
            origin: Point::new(0.0, 0.0),
            cell_size: 0.1,
            rows: 10,
            cols: 10,
        };
        assert_eq!(t.world_to_cell(Point::new(1.05, 0.5)), None);
        assert_eq!(t.world_to_cell(Point::new(0.5, 1.0001)), None);
        assert_eq!(t.world_to_cell(Point::new(0.999, 0.5)), Some((5, 9)));
    }

    #[test]
    fn grid_to_world_to_grid_is_exact() {
        let pts = square_ring(3.0, 0.1);
        let t = GridTransform::covering(&pts, 0.07, 0.05).unwrap();
        for row in 0..t.rows {
            for col in 0..t.cols {
                assert_eq!(t.world_to_cell(t.cell_center(row, col)), Some((row, col)));
            }
        }
    }

    #[test]
    fn world_to_grid_to_world_is_within_half_a_cell() {
        let pts = square_ring(3.0, 0.013);
        let t = GridTransform::covering(&pts, 0.05, 0.05).unwrap();
        for &p in &pts {
            let (row, col) = t.world_to_cell(p).unwrap();
            let back = t.cell_center(row, col);
            assert!(back.approx_eq(p, t.cell_size / 2.0 + 1e-12));
        }
    }

    #[test]
    fn finer_grid_never_loses_coverage() {
        let pts = square_ring(2.0, 0.01);
        let fine = rasterize(&pts, 0.05, 0.05).unwrap();
        let coarse = rasterize(&pts, 0.1, 0.05).unwrap();
        assert!(fine.occupied_count() >= coarse.occupied_count());
    }

    #[test]
    fn occupancy_matches_points() {
        let pts = [Point::new(0.0, 0.0), Point::new(1.0, 1.0)];
        let grid = rasterize(&pts, 0.5, 0.05).unwrap();
        let (r, c) = grid.transform().world_to_cell(pts[1]).unwrap();
        assert!(grid.is_occupied(r, c));
        assert_eq!(grid.occupied_count(), 2);
    }
}
