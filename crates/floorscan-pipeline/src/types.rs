//! Shared types for the floorscan boundary pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryStrategy;
use crate::contour::ContourTracerKind;
use crate::height::{ElevationBand, HeightMode};
use crate::raster::OccupancyGrid;
use crate::ring;
use crate::simplify::SimplifierKind;
use crate::snap::AxisSnapperKind;

/// Re-export `GrayImage` so downstream crates can reference
/// occupancy rasters without depending on `image` directly.
pub use image::GrayImage;

/// A 2D point in world coordinates (metres, +y north).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// East-west position.
    pub x: f64,
    /// North-south position.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Returns `true` if both coordinates differ by at most `tolerance`.
    #[must_use]
    pub fn approx_eq(self, other: Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

/// A 3D point in world coordinates (metres, +z up).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Orthographic projection onto the horizontal plane.
    #[must_use]
    pub const fn project(self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// An 8-bit RGB color attached to a point.
pub type Rgb = [u8; 3];

/// An ordered, immutable collection of 3D points with optional
/// per-point colors.
///
/// When colors are present there is exactly one per point.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloud {
    points: Vec<Point3>,
    colors: Option<Vec<Rgb>>,
}

impl PointCloud {
    /// Create a cloud without colors.
    #[must_use]
    pub const fn new(points: Vec<Point3>) -> Self {
        Self {
            points,
            colors: None,
        }
    }

    /// Create a cloud with one color per point.
    ///
    /// Returns `None` if the lengths differ.
    #[must_use]
    pub fn with_colors(points: Vec<Point3>, colors: Vec<Rgb>) -> Option<Self> {
        (points.len() == colors.len()).then_some(Self {
            points,
            colors: Some(colors),
        })
    }

    /// Returns the number of points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the cloud has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Returns the per-point colors, if the cloud carries any.
    #[must_use]
    pub fn colors(&self) -> Option<&[Rgb]> {
        self.colors.as_deref()
    }

    /// Returns the z coordinate of every point, in order.
    #[must_use]
    pub fn heights(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.z).collect()
    }

    /// Project every point onto the horizontal plane.
    #[must_use]
    pub fn project(&self) -> Vec<Point> {
        self.points.iter().map(|p| p.project()).collect()
    }

    /// Keep the points (and their colors) for which `keep` returns `true`.
    #[must_use = "returns a new cloud; the original is unchanged"]
    pub fn filter(&self, mut keep: impl FnMut(&Point3) -> bool) -> Self {
        match &self.colors {
            Some(colors) => {
                let (points, colors) = self
                    .points
                    .iter()
                    .zip(colors)
                    .filter(|(p, _)| keep(p))
                    .map(|(p, c)| (*p, *c))
                    .unzip();
                Self {
                    points,
                    colors: Some(colors),
                }
            }
            None => Self::new(self.points.iter().copied().filter(|p| keep(p)).collect()),
        }
    }
}

/// A traced boundary curve in world coordinates.
///
/// Traced contours repeat their first vertex as the last one; the
/// closing vertex is not required, see [`Contour::is_closed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour(Vec<Point>);

impl Contour {
    /// Create a contour from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points, including a closing duplicate.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the contour and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// Returns `true` if the last vertex repeats the first within
    /// `tolerance` on each axis.
    #[must_use]
    pub fn is_closed(&self, tolerance: f64) -> bool {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) if self.0.len() > 1 => first.approx_eq(*last, tolerance),
            _ => false,
        }
    }

    /// Shoelace area with sign: positive for counter-clockwise rings.
    #[must_use]
    pub fn signed_area(&self) -> f64 {
        ring::signed_area(&self.0)
    }
}

/// The selected outer boundary: a closed ring whose last vertex is
/// identical to its first, without consecutive duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryPolygon {
    vertices: Vec<Point>,
}

impl BoundaryPolygon {
    /// Build a boundary from a ring of vertices, closed or not.
    ///
    /// Consecutive duplicates (within `tolerance`) are removed and the
    /// ring is closed by appending an exact copy of its first vertex.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegeneratePolygon`] if fewer than 3
    /// distinct vertices remain.
    pub fn from_ring(points: &[Point], tolerance: f64) -> Result<Self, PipelineError> {
        let open = ring::open_ring(points, tolerance);
        if open.len() < 3 {
            return Err(PipelineError::DegeneratePolygon {
                distinct: open.len(),
            });
        }
        Ok(Self {
            vertices: ring::close(open),
        })
    }

    /// Returns the closed vertex ring (last == first).
    #[must_use]
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Returns the vertices without the closing duplicate.
    #[must_use]
    pub fn corners(&self) -> &[Point] {
        &self.vertices[..self.vertices.len().saturating_sub(1)]
    }

    /// Unsigned enclosed area in square metres.
    #[must_use]
    pub fn area(&self) -> f64 {
        ring::signed_area(&self.vertices).abs()
    }

    /// Total boundary length in metres.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        self.vertices.windows(2).map(|w| w[0].distance(w[1])).sum()
    }

    /// Edges longer than `min_length`, in ring order, as dimensionable
    /// segments.
    #[must_use]
    pub fn dimensioned_segments(&self, min_length: f64) -> Vec<DimensionedSegment> {
        self.vertices
            .windows(2)
            .map(|w| DimensionedSegment::new(w[0], w[1]))
            .filter(|s| s.length() > min_length)
            .collect()
    }
}

/// A boundary edge worth annotating with its length.
///
/// Carries only geometry; annotation style belongs to the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionedSegment {
    pub start: Point,
    pub end: Point,
}

impl DimensionedSegment {
    #[must_use]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Euclidean length in metres.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }
}

/// Configuration for the boundary pipeline.
///
/// Each invocation owns its own instance. Defaults are exposed as
/// associated constants so front ends can show them without
/// constructing a config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Occupancy grid cell edge in metres. Smaller values give a finer
    /// boundary at the cost of speed and noise.
    pub cell_size: f64,

    /// How the elevation band is chosen.
    pub height_mode: HeightMode,

    /// Width of the elevation band in metres.
    pub slice_thickness: f64,

    /// Percentile of all heights taken as the floor in
    /// [`HeightMode::AutoFromFloor`].
    pub floor_percentile: f64,

    /// Drop points at or above this height percentile before slicing.
    /// Useful with [`HeightMode::FullProjection`] to remove ceilings.
    pub ceiling_percentile: Option<f64>,

    /// Voxel edge for pre-filtering the cloud. `None` keeps every point.
    pub voxel_size: Option<f64>,

    /// Grid padding as a fraction of the larger bounding-box extent.
    pub padding_fraction: f64,

    /// Dilation iterations (cross structuring element).
    pub dilate_iterations: u8,

    /// Erosion iterations.
    pub erode_iterations: u8,

    /// Closing iterations.
    pub close_iterations: u8,

    /// Gaussian sigma, in cells, of the blur-and-threshold step.
    /// Zero skips the step.
    pub blur_sigma: f32,

    /// Occupancy level (0..1) above which a blurred cell stays occupied.
    pub threshold: f32,

    /// Which contour tracing algorithm to use.
    pub contour_tracer: ContourTracerKind,

    /// Contours with fewer vertices are discarded as noise.
    pub min_contour_vertices: usize,

    /// Keep contours around empty regions enclosed by occupied cells.
    pub keep_holes: bool,

    /// How the single outer boundary is obtained.
    pub boundary_strategy: BoundaryStrategy,

    /// Which polygon simplifier to use.
    pub simplifier: SimplifierKind,

    /// Simplification distance tolerance in metres.
    pub simplify_tolerance: f64,

    /// Which axis snapping strategy to use.
    pub axis_snapper: AxisSnapperKind,

    /// Edges within this many degrees of an axis are made axis-aligned.
    pub snap_angle_degrees: f64,

    /// Edges no longer than this are not dimensioned.
    pub min_dimension_length: f64,
}

impl PipelineConfig {
    pub const DEFAULT_CELL_SIZE: f64 = 0.05;
    pub const DEFAULT_FLOOR_OFFSET: f64 = 1.2;
    pub const DEFAULT_SLICE_THICKNESS: f64 = 0.1;
    pub const DEFAULT_FLOOR_PERCENTILE: f64 = 5.0;
    pub const DEFAULT_PADDING_FRACTION: f64 = 0.05;
    /// Smallest padding in metres, whatever the extent.
    pub const MIN_PADDING: f64 = 0.1;
    pub const DEFAULT_DILATE_ITERATIONS: u8 = 2;
    pub const DEFAULT_ERODE_ITERATIONS: u8 = 1;
    pub const DEFAULT_CLOSE_ITERATIONS: u8 = 2;
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.0;
    pub const DEFAULT_THRESHOLD: f32 = 0.5;
    pub const DEFAULT_MIN_CONTOUR_VERTICES: usize = 10;
    pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 0.1;
    pub const DEFAULT_SNAP_ANGLE_DEGREES: f64 = 10.0;
    pub const DEFAULT_MIN_DIMENSION_LENGTH: f64 = 0.2;

    /// Check every field for values the pipeline cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        fn invalid(message: String) -> Result<(), PipelineError> {
            Err(PipelineError::InvalidConfig(message))
        }

        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return invalid(format!("cell_size must be > 0, got {}", self.cell_size));
        }
        if !(self.slice_thickness.is_finite() && self.slice_thickness > 0.0) {
            return invalid(format!(
                "slice_thickness must be > 0, got {}",
                self.slice_thickness
            ));
        }
        if !(0.0..=100.0).contains(&self.floor_percentile) {
            return invalid(format!(
                "floor_percentile must be within 0..=100, got {}",
                self.floor_percentile
            ));
        }
        if let Some(p) = self.ceiling_percentile
            && !(p > 0.0 && p <= 100.0)
        {
            return invalid(format!("ceiling_percentile must be within (0, 100], got {p}"));
        }
        if let Some(v) = self.voxel_size
            && !(v.is_finite() && v >= 0.0)
        {
            return invalid(format!("voxel_size must be >= 0, got {v}"));
        }
        if !(self.padding_fraction.is_finite()
            && self.padding_fraction >= Self::DEFAULT_PADDING_FRACTION)
        {
            return invalid(format!(
                "padding_fraction must be >= {}, got {}",
                Self::DEFAULT_PADDING_FRACTION,
                self.padding_fraction
            ));
        }
        if !(self.blur_sigma.is_finite() && self.blur_sigma >= 0.0) {
            return invalid(format!("blur_sigma must be >= 0, got {}", self.blur_sigma));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return invalid(format!(
                "threshold must be within (0, 1), got {}",
                self.threshold
            ));
        }
        if !(self.simplify_tolerance.is_finite() && self.simplify_tolerance >= 0.0) {
            return invalid(format!(
                "simplify_tolerance must be >= 0, got {}",
                self.simplify_tolerance
            ));
        }
        if !(0.0..45.0).contains(&self.snap_angle_degrees) {
            return invalid(format!(
                "snap_angle_degrees must be within [0, 45), got {}",
                self.snap_angle_degrees
            ));
        }
        if !(self.min_dimension_length.is_finite() && self.min_dimension_length >= 0.0) {
            return invalid(format!(
                "min_dimension_length must be >= 0, got {}",
                self.min_dimension_length
            ));
        }
        self.height_mode.validate()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cell_size: Self::DEFAULT_CELL_SIZE,
            height_mode: HeightMode::default(),
            slice_thickness: Self::DEFAULT_SLICE_THICKNESS,
            floor_percentile: Self::DEFAULT_FLOOR_PERCENTILE,
            ceiling_percentile: None,
            voxel_size: None,
            padding_fraction: Self::DEFAULT_PADDING_FRACTION,
            dilate_iterations: Self::DEFAULT_DILATE_ITERATIONS,
            erode_iterations: Self::DEFAULT_ERODE_ITERATIONS,
            close_iterations: Self::DEFAULT_CLOSE_ITERATIONS,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            threshold: Self::DEFAULT_THRESHOLD,
            contour_tracer: ContourTracerKind::default(),
            min_contour_vertices: Self::DEFAULT_MIN_CONTOUR_VERTICES,
            keep_holes: false,
            boundary_strategy: BoundaryStrategy::default(),
            simplifier: SimplifierKind::default(),
            simplify_tolerance: Self::DEFAULT_SIMPLIFY_TOLERANCE,
            axis_snapper: AxisSnapperKind::default(),
            snap_angle_degrees: Self::DEFAULT_SNAP_ANGLE_DEGREES,
            min_dimension_length: Self::DEFAULT_MIN_DIMENSION_LENGTH,
        }
    }
}

/// Result of running the full pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// The closed, simplified and axis-snapped outer boundary.
    pub boundary: BoundaryPolygon,

    /// Boundary edges long enough to carry a dimension.
    pub segments: Vec<DimensionedSegment>,

    /// Enclosed area of the boundary in square metres.
    pub area: f64,
}

/// Result of running the pipeline with every intermediate stage output
/// preserved, for diagnostics and artifact writing.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Number of points in the cloud handed to the pipeline.
    pub input_points: usize,
    /// Points left after voxel downsampling.
    pub downsampled_points: usize,
    /// Stage 1: the selected elevation band (`None` for full projection).
    pub band: Option<ElevationBand>,
    /// Stage 1: the points that were projected.
    pub slice: PointCloud,
    /// Stage 2: occupancy grid straight from the projected points.
    pub raw_grid: OccupancyGrid,
    /// Stage 3: occupancy grid after morphological cleanup.
    pub clean_grid: OccupancyGrid,
    /// Stage 4: traced contours that survived filtering (empty in
    /// convex hull mode).
    pub contours: Vec<Contour>,
    /// Stage 5: the selected boundary before simplification.
    pub selected: Contour,
    /// Stage 6a: the boundary after simplification.
    pub simplified: Contour,
    /// Stage 6b: the final closed, axis-snapped boundary.
    pub boundary: BoundaryPolygon,
    /// Dimensionable edges of the final boundary.
    pub segments: Vec<DimensionedSegment>,
}

impl StagedResult {
    /// Drops the intermediates and keeps the final geometry.
    #[must_use]
    pub fn into_result(self) -> ProcessResult {
        ProcessResult {
            area: self.boundary.area(),
            boundary: self.boundary,
            segments: self.segments,
        }
    }
}

/// Which set of points ran short in [`PipelineError::InsufficientData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataStage {
    /// The cloud handed to the pipeline.
    PointCloud,
    /// The points left after the ceiling cut.
    CeilingCut,
    /// The points inside the elevation band.
    ElevationBand,
}

impl fmt::Display for DataStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PointCloud => "point cloud",
            Self::CeilingCut => "ceiling-filtered cloud",
            Self::ElevationBand => "elevation band",
        })
    }
}

/// Errors that can occur during pipeline processing.
///
/// Every variant is recoverable by the caller; no stage retries or
/// falls back on its own.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// Too few points survived filtering or slicing.
    #[error("insufficient data: {stage} has {found} points, at least {required} required")]
    InsufficientData {
        stage: DataStage,
        found: usize,
        required: usize,
    },

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// No traced contour qualified as a boundary.
    #[error("no boundary found: no contour has at least {min_vertices} vertices")]
    NoBoundaryFound { min_vertices: usize },

    /// A polygon had too few distinct vertices to simplify or snap.
    #[error("degenerate polygon: {distinct} distinct vertices, at least 3 required")]
    DegeneratePolygon { distinct: usize },
}
