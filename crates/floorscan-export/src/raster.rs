//! Diagnostic raster images.
//!
//! Renders occupancy grids, traced contours and the final boundary into
//! north-up RGBA images with `tiny-skia`, and encodes them as PNG. Every
//! image carries a scale bar in its bottom-left corner.

use image::{ImageEncoder, Rgba, RgbaImage};
use tiny_skia::{Color, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

use floorscan_pipeline::{BoundaryPolygon, Contour, GridTransform, OccupancyGrid, Point};

/// Longest image side the pixel scale aims for.
const TARGET_SIDE_PX: u32 = 800;

/// Upper bound on pixels per grid cell for tiny grids.
const MAX_PIXELS_PER_CELL: u32 = 16;

/// Candidate scale bar lengths in metres, longest first.
const SCALE_BAR_LENGTHS: [f64; 7] = [10.0, 5.0, 2.0, 1.0, 0.5, 0.2, 0.1];

const BACKGROUND: [u8; 3] = [255, 255, 255];
const OCCUPIED: [u8; 3] = [0, 0, 0];
const OCCUPIED_FAINT: [u8; 3] = [200, 200, 200];
const BOUNDARY: [u8; 3] = [220, 30, 30];
const CONTOUR_PALETTE: [[u8; 3]; 4] = [[31, 119, 180], [255, 127, 14], [44, 160, 44], [148, 103, 189]];

/// Errors from rendering or encoding a diagnostic image.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncode(String),

    /// The canvas could not be allocated.
    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
}

impl From<image::ImageError> for ExportError {
    fn from(err: image::ImageError) -> Self {
        Self::PngEncode(err.to_string())
    }
}

/// Pixels per grid cell so the longer side lands near 800 px.
#[must_use]
pub fn pixels_per_cell(transform: &GridTransform) -> u32 {
    let longest = transform.rows.max(transform.cols).max(1);
    (TARGET_SIDE_PX / longest).clamp(1, MAX_PIXELS_PER_CELL)
}

/// The longest candidate scale bar no wider than a quarter of
/// `world_width`, falling back to the shortest candidate.
#[must_use]
pub fn scale_bar_length(world_width: f64) -> f64 {
    SCALE_BAR_LENGTHS
        .iter()
        .copied()
        .find(|&len| len <= world_width / 4.0)
        .unwrap_or(SCALE_BAR_LENGTHS[SCALE_BAR_LENGTHS.len() - 1])
}

/// A pixmap sized to a grid, with the world-to-pixel mapping.
struct Canvas {
    pixmap: Pixmap,
    transform: GridTransform,
    ppc: u32,
}

impl Canvas {
    fn new(transform: GridTransform) -> Result<Self, ExportError> {
        let ppc = pixels_per_cell(&transform);
        let (width, height) = (transform.cols * ppc, transform.rows * ppc);
        let mut pixmap = Pixmap::new(width, height).ok_or(ExportError::Canvas { width, height })?;
        pixmap.fill(Color::from_rgba8(BACKGROUND[0], BACKGROUND[1], BACKGROUND[2], 255));
        Ok(Self {
            pixmap,
            transform,
            ppc,
        })
    }

    fn pixels_per_metre(&self) -> f64 {
        f64::from(self.ppc) / self.transform.cell_size
    }

    /// North-up: world +y maps to decreasing pixel rows.
    #[allow(clippy::cast_possible_truncation)]
    fn to_pixel(&self, p: Point) -> (f32, f32) {
        let scale = self.pixels_per_metre();
        let x = (p.x - self.transform.origin.x) * scale;
        let y = f64::from(self.pixmap.height()) - (p.y - self.transform.origin.y) * scale;
        (x as f32, y as f32)
    }

    /// Paint occupied cells as solid blocks. Colours are opaque so the
    /// premultiplied bytes equal the straight ones.
    fn paint_cells(&mut self, grid: &OccupancyGrid, color: [u8; 3]) {
        let (rows, ppc) = (self.transform.rows, self.ppc);
        let stride = self.pixmap.width() as usize * 4;
        let data = self.pixmap.data_mut();
        for (col, row, px) in grid.image().enumerate_pixels() {
            if px.0[0] == 0 {
                continue;
            }
            let top = (rows - 1 - row) * ppc;
            for y in top..top + ppc {
                for x in col * ppc..(col + 1) * ppc {
                    let off = y as usize * stride + x as usize * 4;
                    data[off..off + 4].copy_from_slice(&[color[0], color[1], color[2], 255]);
                }
            }
        }
    }

    fn stroke(&mut self, points: &[Point], close: bool, color: [u8; 3], width: f32) {
        let mut pb = PathBuilder::new();
        if let Some((first, rest)) = points.split_first() {
            let (x, y) = self.to_pixel(*first);
            pb.move_to(x, y);
            for p in rest {
                let (x, y) = self.to_pixel(*p);
                pb.line_to(x, y);
            }
            if close {
                pb.close();
            }
        }
        let Some(path) = pb.finish() else {
            return;
        };

        let stroke = Stroke {
            width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(color[0], color[1], color[2], 255);
        paint.anti_alias = true;
        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    /// A horizontal bar with end ticks, 10 px in from the bottom-left.
    #[allow(clippy::cast_possible_truncation)]
    fn scale_bar(&mut self) {
        let (world_width, _) = self.transform.world_size();
        let length = (scale_bar_length(world_width) * self.pixels_per_metre()) as f32;
        let (x0, y0) = (10.0_f32, self.pixmap.height() as f32 - 10.0);

        let mut pb = PathBuilder::new();
        pb.move_to(x0, y0 - 4.0);
        pb.line_to(x0, y0);
        pb.line_to(x0 + length, y0);
        pb.line_to(x0 + length, y0 - 4.0);
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width: 2.0,
            ..Stroke::default()
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, 255);
        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    /// Convert premultiplied pixmap data to a straight-alpha image.
    fn into_image(mut self) -> RgbaImage {
        self.scale_bar();
        let (width, height) = (self.pixmap.width(), self.pixmap.height());
        let data = self.pixmap.data();
        let mut img = RgbaImage::new(width, height);
        for (pixel, src) in img.pixels_mut().zip(data.chunks_exact(4)) {
            let a = src[3];
            *pixel = if a == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                #[allow(clippy::cast_possible_truncation)]
                let un = |c: u8| (u16::from(c) * 255 / u16::from(a)) as u8;
                Rgba([un(src[0]), un(src[1]), un(src[2]), a])
            };
        }
        img
    }
}

/// Render an occupancy grid: occupied cells black on white.
///
/// # Errors
///
/// Returns [`ExportError::Canvas`] if the canvas cannot be allocated.
pub fn render_grid(grid: &OccupancyGrid) -> Result<RgbaImage, ExportError> {
    let mut canvas = Canvas::new(*grid.transform())?;
    canvas.paint_cells(grid, OCCUPIED);
    Ok(canvas.into_image())
}

/// Render traced contours over a faint copy of the grid they came from.
///
/// # Errors
///
/// Returns [`ExportError::Canvas`] if the canvas cannot be allocated.
pub fn render_contours(grid: &OccupancyGrid, contours: &[Contour]) -> Result<RgbaImage, ExportError> {
    let mut canvas = Canvas::new(*grid.transform())?;
    canvas.paint_cells(grid, OCCUPIED_FAINT);
    for (i, contour) in contours.iter().enumerate() {
        let color = CONTOUR_PALETTE[i % CONTOUR_PALETTE.len()];
        canvas.stroke(contour.points(), true, color, 2.0);
    }
    Ok(canvas.into_image())
}

/// Render the final boundary over a faint copy of the grid.
///
/// # Errors
///
/// Returns [`ExportError::Canvas`] if the canvas cannot be allocated.
pub fn render_boundary(
    grid: &OccupancyGrid,
    boundary: &BoundaryPolygon,
) -> Result<RgbaImage, ExportError> {
    let mut canvas = Canvas::new(*grid.transform())?;
    canvas.paint_cells(grid, OCCUPIED_FAINT);
    canvas.stroke(boundary.vertices(), false, BOUNDARY, 3.0);
    Ok(canvas.into_image())
}

/// Encode an RGBA image as PNG bytes.
///
/// # Errors
///
/// Returns [`ExportError::PngEncode`] if encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(png_bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use floorscan_pipeline::GrayImage;

    use super::*;

    /// 10 × 10 cells of 0.1 m at the origin with cell (0, 0) occupied.
    fn corner_grid() -> OccupancyGrid {
        let transform = GridTransform {
            origin: Point::new(0.0, 0.0),
            cell_size: 0.1,
            rows: 10,
            cols: 10,
        };
        let mut image = GrayImage::new(10, 10);
        image.put_pixel(0, 0, image::Luma([255]));
        OccupancyGrid::from_image(image, transform).unwrap()
    }

    #[test]
    fn tiny_grids_are_upscaled() {
        let grid = corner_grid();
        assert_eq!(pixels_per_cell(grid.transform()), 16);
    }

    #[test]
    fn large_grids_get_one_pixel_per_cell() {
        let transform = GridTransform {
            origin: Point::new(0.0, 0.0),
            cell_size: 0.01,
            rows: 900,
            cols: 1200,
        };
        assert_eq!(pixels_per_cell(&transform), 1);
    }

    #[test]
    fn scale_bar_fits_a_quarter_of_the_width() {
        assert!((scale_bar_length(12.0) - 2.0).abs() < f64::EPSILON);
        assert!((scale_bar_length(4.0) - 1.0).abs() < f64::EPSILON);
        assert!((scale_bar_length(0.01) - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn grid_render_is_north_up() {
        let img = render_grid(&corner_grid()).unwrap();
        assert_eq!(img.dimensions(), (160, 160));
        // Cell (0, 0) is the south-west cell: bottom-left block.
        assert_eq!(img.get_pixel(8, 152).0, [0, 0, 0, 255]);
        // Top-left stays background.
        assert_eq!(img.get_pixel(8, 8).0, [255, 255, 255, 255]);
    }

    #[test]
    fn boundary_render_draws_the_outline() {
        let grid = corner_grid();
        let boundary = BoundaryPolygon::from_ring(
            &[
                Point::new(0.2, 0.2),
                Point::new(0.8, 0.2),
                Point::new(0.8, 0.8),
                Point::new(0.2, 0.8),
            ],
            0.0,
        )
        .unwrap();
        let img = render_boundary(&grid, &boundary).unwrap();
        // Midpoint of the bottom edge: x = 0.5 m, y = 0.2 m.
        let px = img.get_pixel(80, 160 - 32).0;
        assert_eq!(&px[..3], &BOUNDARY);
        // The interior is untouched.
        assert_eq!(img.get_pixel(80, 80).0, [255, 255, 255, 255]);
    }

    #[test]
    fn contours_render_without_error() {
        let grid = corner_grid();
        let contours = vec![
            Contour::new(vec![Point::new(0.1, 0.1), Point::new(0.5, 0.1), Point::new(0.5, 0.5)]),
            Contour::new(Vec::new()),
        ];
        let img = render_contours(&grid, &contours).unwrap();
        assert_eq!(img.dimensions(), (160, 160));
    }

    #[test]
    fn png_has_signature() {
        let img = render_grid(&corner_grid()).unwrap();
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
