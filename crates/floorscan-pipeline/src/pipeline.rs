//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process_staged`] which runs the entire pipeline in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use floorscan_pipeline::{Pipeline, PipelineConfig, PipelineError, PointCloud};
//! # fn run(cloud: PointCloud) -> Result<(), PipelineError> {
//! let config = PipelineConfig::default();
//! let pipeline = Pipeline::new(cloud, config)
//!     .select_height()?
//!     .rasterize()?
//!     .clean()
//!     .trace_contours()
//!     .select_boundary()?
//!     .simplify()?
//!     .snap()?;
//!
//! let staged = pipeline.into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying all previously computed
//! intermediates. The caller can inspect the current stage's output via
//! accessor methods at any point.
//!
//! # Memory
//!
//! Every stage from [`Cleaned`] onward holds both occupancy grids and the
//! sliced cloud. [`StagedResult`] needs them for the diagnostic images
//! and the slice export. Callers that only need the final boundary
//! should prefer [`crate::process`].

use crate::boundary::{self, BoundaryStrategy};
use crate::contour::{ContourFilter, ContourTracer};
use crate::diagnostics::{self, StageMetrics};
use crate::downsample::voxel_downsample;
use crate::height::{self, ElevationBand, Slice};
use crate::morphology::{self, CleanupParams};
use crate::raster::{self, OccupancyGrid};
use crate::simplify::Simplifier;
use crate::snap::AxisSnapper;
use crate::types::{
    BoundaryPolygon, Contour, DimensionedSegment, PipelineConfig, PipelineError, Point, PointCloud,
    StagedResult,
};

/// Point counts that every stage after the first carries along.
#[derive(Debug, Clone, Copy)]
struct Counts {
    input: usize,
    downsampled: usize,
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`select_height`](Self::select_height) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .select_height() to continue"]
pub struct Pending {
    config: PipelineConfig,
    cloud: PointCloud,
}

impl Pending {
    /// The input cloud.
    #[must_use]
    pub const fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    /// Validate the configuration, downsample (when configured) and
    /// choose the points to project.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a bad configuration
    /// and [`PipelineError::InsufficientData`] if the cloud is empty or
    /// the elevation band holds fewer than 3 points.
    pub fn select_height(self) -> Result<HeightSelected, PipelineError> {
        self.config.validate()?;

        let input = self.cloud.len();
        let cloud = match self.config.voxel_size {
            Some(size) if size > 0.0 => {
                let reduced = voxel_downsample(&self.cloud, size);
                tracing::info!(
                    voxel_size = size,
                    before = input,
                    after = reduced.len(),
                    "downsampled point cloud"
                );
                reduced
            }
            _ => self.cloud,
        };

        let slice = height::select_points(&cloud, &self.config)?;
        Ok(HeightSelected {
            counts: Counts {
                input,
                downsampled: cloud.len(),
            },
            config: self.config,
            slice,
        })
    }

    /// Run every stage and return the final [`StagedResult`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any fallible stage fails.
    pub fn complete(self) -> Result<StagedResult, PipelineError> {
        self.select_height()?.complete()
    }
}

// ───────────────────────── Stage 1: HeightSelected ───────────────────

/// Pipeline state after choosing the points to project.
///
/// Call [`rasterize`](Self::rasterize) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .rasterize() to continue"]
pub struct HeightSelected {
    config: PipelineConfig,
    counts: Counts,
    slice: Slice,
}

impl HeightSelected {
    /// The elevation band, or `None` when every point is projected.
    #[must_use]
    pub const fn band(&self) -> Option<ElevationBand> {
        self.slice.band
    }

    /// The points that will be projected.
    #[must_use]
    pub const fn slice(&self) -> &PointCloud {
        &self.slice.cloud
    }

    /// Project the slice onto the plane and rasterize it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the cell size gives a
    /// grid too large to address.
    pub fn rasterize(self) -> Result<Rasterized, PipelineError> {
        let projected = self.slice.cloud.project();
        let raw_grid = raster::rasterize(
            &projected,
            self.config.cell_size,
            self.config.padding_fraction,
        )?;
        Ok(Rasterized {
            config: self.config,
            counts: self.counts,
            slice: self.slice,
            projected,
            raw_grid,
        })
    }
}

// ───────────────────────── Stage 2: Rasterized ───────────────────────

/// Pipeline state after rasterizing the projected slice.
///
/// Call [`clean`](Self::clean) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .clean() to continue"]
pub struct Rasterized {
    config: PipelineConfig,
    counts: Counts,
    slice: Slice,
    projected: Vec<Point>,
    raw_grid: OccupancyGrid,
}

impl Rasterized {
    /// The occupancy grid straight from the projected points.
    #[must_use]
    pub const fn raw_grid(&self) -> &OccupancyGrid {
        &self.raw_grid
    }

    /// The projected points.
    #[must_use]
    pub fn projected(&self) -> &[Point] {
        &self.projected
    }

    /// Run the morphological cleanup.
    pub fn clean(self) -> Cleaned {
        let clean_grid = morphology::clean(&self.raw_grid, CleanupParams::from(&self.config));
        Cleaned {
            config: self.config,
            counts: self.counts,
            slice: self.slice,
            projected: self.projected,
            raw_grid: self.raw_grid,
            clean_grid,
        }
    }
}

// ───────────────────────── Stage 3: Cleaned ──────────────────────────

/// Pipeline state after morphological cleanup.
///
/// Call [`trace_contours`](Self::trace_contours) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .trace_contours() to continue"]
pub struct Cleaned {
    config: PipelineConfig,
    counts: Counts,
    slice: Slice,
    projected: Vec<Point>,
    raw_grid: OccupancyGrid,
    clean_grid: OccupancyGrid,
}

impl Cleaned {
    /// The cleaned occupancy grid.
    #[must_use]
    pub const fn clean_grid(&self) -> &OccupancyGrid {
        &self.clean_grid
    }

    /// Trace the contours of the cleaned grid.
    ///
    /// The convex hull strategy does not use contours, so nothing is
    /// traced in that mode.
    pub fn trace_contours(self) -> ContoursTraced {
        let contours: Vec<Contour> = if self.config.boundary_strategy.needs_contours() {
            self.config
                .contour_tracer
                .trace(&self.clean_grid, ContourFilter::from(&self.config))
                .collect()
        } else {
            Vec::new()
        };
        tracing::info!(count = contours.len(), "traced contours");
        ContoursTraced {
            config: self.config,
            counts: self.counts,
            slice: self.slice,
            projected: self.projected,
            raw_grid: self.raw_grid,
            clean_grid: self.clean_grid,
            contours,
        }
    }
}

// ───────────────────────── Stage 4: ContoursTraced ───────────────────

/// Pipeline state after contour tracing.
///
/// Call [`select_boundary`](Self::select_boundary) to advance. This is a
/// fallible step.
#[must_use = "pipeline stages are consumed by advancing — call .select_boundary() to continue"]
pub struct ContoursTraced {
    config: PipelineConfig,
    counts: Counts,
    slice: Slice,
    projected: Vec<Point>,
    raw_grid: OccupancyGrid,
    clean_grid: OccupancyGrid,
    contours: Vec<Contour>,
}

impl ContoursTraced {
    /// The contours that survived filtering.
    #[must_use]
    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    /// Pick the outer boundary.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoBoundaryFound`] if no contour qualifies
    /// and [`PipelineError::DegeneratePolygon`] if the projected points
    /// have no proper convex hull.
    pub fn select_boundary(self) -> Result<BoundarySelected, PipelineError> {
        let selected = match self.config.boundary_strategy {
            BoundaryStrategy::LargestContour => boundary::largest_contour(
                self.contours.iter().cloned(),
                self.config.min_contour_vertices,
            )?,
            BoundaryStrategy::ConvexHull => boundary::convex_hull(&self.projected)?,
        };
        Ok(BoundarySelected {
            config: self.config,
            counts: self.counts,
            slice: self.slice,
            raw_grid: self.raw_grid,
            clean_grid: self.clean_grid,
            contours: self.contours,
            selected,
        })
    }
}

// ───────────────────────── Stage 5: BoundarySelected ─────────────────

/// Pipeline state after picking the outer boundary.
///
/// Call [`simplify`](Self::simplify) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .simplify() to continue"]
pub struct BoundarySelected {
    config: PipelineConfig,
    counts: Counts,
    slice: Slice,
    raw_grid: OccupancyGrid,
    clean_grid: OccupancyGrid,
    contours: Vec<Contour>,
    selected: Contour,
}

impl BoundarySelected {
    /// The selected boundary before simplification.
    #[must_use]
    pub const fn selected(&self) -> &Contour {
        &self.selected
    }

    /// Simplify the boundary.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegeneratePolygon`] if the boundary has
    /// fewer than 3 distinct vertices.
    pub fn simplify(self) -> Result<Simplified, PipelineError> {
        let simplified = self
            .config
            .simplifier
            .simplify(&self.selected, self.config.simplify_tolerance)?;
        Ok(Simplified {
            config: self.config,
            counts: self.counts,
            slice: self.slice,
            raw_grid: self.raw_grid,
            clean_grid: self.clean_grid,
            contours: self.contours,
            selected: self.selected,
            simplified,
        })
    }
}

// ───────────────────────── Stage 6: Simplified ───────────────────────

/// Pipeline state after simplification.
///
/// Call [`snap`](Self::snap) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .snap() to continue"]
pub struct Simplified {
    config: PipelineConfig,
    counts: Counts,
    slice: Slice,
    raw_grid: OccupancyGrid,
    clean_grid: OccupancyGrid,
    contours: Vec<Contour>,
    selected: Contour,
    simplified: Contour,
}

impl Simplified {
    /// The simplified boundary.
    #[must_use]
    pub const fn simplified(&self) -> &Contour {
        &self.simplified
    }

    /// Snap near-axis edges and build the final boundary polygon.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegeneratePolygon`] if snapping collapses
    /// the ring below 3 distinct vertices.
    pub fn snap(self) -> Result<Snapped, PipelineError> {
        let snapped = self
            .config
            .axis_snapper
            .snap(&self.simplified, self.config.snap_angle_degrees)?;
        // Exact de-duplication: short axis jogs are real corners.
        let boundary = BoundaryPolygon::from_ring(snapped.points(), 0.0)?;
        let segments = boundary.dimensioned_segments(self.config.min_dimension_length);
        tracing::info!(
            vertices = boundary.corners().len(),
            area = boundary.area(),
            segments = segments.len(),
            "final boundary"
        );
        Ok(Snapped {
            config: self.config,
            counts: self.counts,
            slice: self.slice,
            raw_grid: self.raw_grid,
            clean_grid: self.clean_grid,
            contours: self.contours,
            selected: self.selected,
            simplified: self.simplified,
            boundary,
            segments,
        })
    }
}

// ───────────────────────── Stage 7: Snapped ──────────────────────────

/// Pipeline state after axis snapping: the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`StagedResult`].
#[must_use = "pipeline stages are consumed by advancing — call .into_result() to finish"]
pub struct Snapped {
    config: PipelineConfig,
    counts: Counts,
    slice: Slice,
    raw_grid: OccupancyGrid,
    clean_grid: OccupancyGrid,
    contours: Vec<Contour>,
    selected: Contour,
    simplified: Contour,
    boundary: BoundaryPolygon,
    segments: Vec<DimensionedSegment>,
}

impl Snapped {
    /// The final closed boundary.
    #[must_use]
    pub const fn boundary(&self) -> &BoundaryPolygon {
        &self.boundary
    }

    /// Edges long enough to carry a dimension.
    #[must_use]
    pub fn segments(&self) -> &[DimensionedSegment] {
        &self.segments
    }

    /// The configuration this run used.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Consume the pipeline and return the full [`StagedResult`].
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            input_points: self.counts.input,
            downsampled_points: self.counts.downsampled,
            band: self.slice.band,
            slice: self.slice.cloud,
            raw_grid: self.raw_grid,
            clean_grid: self.clean_grid,
            contours: self.contours,
            selected: self.selected,
            simplified: self.simplified,
            boundary: self.boundary,
            segments: self.segments,
        }
    }
}

// ──────────────────────── PipelineStage trait ────────────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 8;

/// Trait implemented by every stage that has done some work.
///
/// Gives each stage a name and an index, the metrics describing the work
/// done to reach it, and a way to run the remaining stages in one go.
/// [`Pending`] has done nothing yet and only offers
/// [`complete`](Pending::complete).
pub trait PipelineStage: Sized {
    /// Human-readable name of this stage (e.g. `"height"`, `"clean"`).
    const NAME: &str;

    /// Zero-based index of this stage (`1` for HeightSelected through
    /// `7` for Snapped; [`Pending`] is stage `0`).
    const INDEX: usize;

    /// Stage-specific metrics for diagnostics.
    fn metrics(&self) -> StageMetrics;

    /// Run all remaining stages to completion and return the final
    /// [`StagedResult`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    fn complete(self) -> Result<StagedResult, PipelineError>;
}

impl PipelineStage for HeightSelected {
    const NAME: &str = "height";
    const INDEX: usize = 1;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::HeightSelection {
            input_points: self.counts.input,
            downsampled_points: self.counts.downsampled,
            band: self.slice.band,
            slice_points: self.slice.cloud.len(),
        }
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.rasterize()?.complete()
    }
}

impl PipelineStage for Rasterized {
    const NAME: &str = "rasterize";
    const INDEX: usize = 2;

    fn metrics(&self) -> StageMetrics {
        let transform = self.raw_grid.transform();
        StageMetrics::Rasterize {
            cell_size: transform.cell_size,
            rows: transform.rows,
            cols: transform.cols,
            occupied_cells: self.raw_grid.occupied_count(),
        }
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.clean().complete()
    }
}

impl PipelineStage for Cleaned {
    const NAME: &str = "clean";
    const INDEX: usize = 3;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Cleanup {
            occupied_before: self.raw_grid.occupied_count(),
            occupied_after: self.clean_grid.occupied_count(),
        }
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.trace_contours().complete()
    }
}

impl PipelineStage for ContoursTraced {
    const NAME: &str = "contours";
    const INDEX: usize = 4;

    fn metrics(&self) -> StageMetrics {
        let stats = diagnostics::contour_stats(&self.contours);
        StageMetrics::ContourTracing {
            contour_count: self.contours.len(),
            total_point_count: stats.total,
            min_contour_points: stats.min,
            max_contour_points: stats.max,
        }
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.select_boundary()?.complete()
    }
}

impl PipelineStage for BoundarySelected {
    const NAME: &str = "boundary";
    const INDEX: usize = 5;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::BoundarySelection {
            strategy: format!("{:?}", self.config.boundary_strategy),
            vertices: self.selected.len(),
            area: boundary::enclosed_area(self.selected.points()),
        }
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.simplify()?.complete()
    }
}

impl PipelineStage for Simplified {
    const NAME: &str = "simplify";
    const INDEX: usize = 6;

    fn metrics(&self) -> StageMetrics {
        let before = self.selected.len();
        let after = self.simplified.len();
        #[allow(clippy::cast_precision_loss)]
        let reduction_ratio = if before > 0 {
            1.0 - (after as f64 / before as f64)
        } else {
            0.0
        };
        StageMetrics::Simplification {
            tolerance: self.config.simplify_tolerance,
            points_before: before,
            points_after: after,
            reduction_ratio,
        }
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.snap()?.complete()
    }
}

impl PipelineStage for Snapped {
    const NAME: &str = "snap";
    const INDEX: usize = 7;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Snapping {
            threshold_degrees: self.config.snap_angle_degrees,
            vertices: self.boundary.corners().len(),
            segments: self.segments.len(),
            area: self.boundary.area(),
        }
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.into_result())
    }
}

// ─────────────────────────── Entry point ─────────────────────────────

/// Entry point for the incremental pipeline.
///
/// Call [`Pipeline::new`] to create a [`Pending`] stage, then advance
/// through each stage with the typed methods.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from a point cloud and config.
    ///
    /// No processing is performed; the cloud and config are simply
    /// stored. Call [`.select_height()`](Pending::select_height) to begin.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(cloud: PointCloud, config: PipelineConfig) -> Pending {
        Pending { config, cloud }
    }
}
