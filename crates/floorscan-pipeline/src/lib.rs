//! floorscan-pipeline: Pure point cloud to floorplan pipeline (sans-IO).
//!
//! Converts an unstructured 3D point cloud of a building interior into a
//! closed, axis-snapped 2D boundary polygon through:
//! height selection -> rasterization -> morphological cleanup ->
//! contour tracing -> boundary selection -> simplification -> axis snapping.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! point clouds and returns structured data. File loading and artifact
//! writing live in `floorscan-io`; vector drawing lives in
//! `floorscan-export`.

pub mod boundary;
pub mod contour;
pub mod diagnostics;
pub mod downsample;
pub mod height;
pub mod morphology;
pub mod pipeline;
pub mod raster;
pub mod ring;
pub mod simplify;
pub mod snap;
pub mod types;

pub use boundary::BoundaryStrategy;
pub use contour::{ContourTracer, ContourTracerKind, Contours};
pub use diagnostics::{PipelineDiagnostics, process_with_diagnostics};
pub use height::{ElevationBand, HeightMode};
pub use pipeline::Pipeline;
pub use raster::{GridTransform, OccupancyGrid};
pub use simplify::{Simplifier, SimplifierKind};
pub use snap::{AxisSnapper, AxisSnapperKind};
pub use types::{
    BoundaryPolygon, Contour, DataStage, DimensionedSegment, GrayImage, PipelineConfig,
    PipelineError, Point, Point3, PointCloud, ProcessResult, Rgb, StagedResult,
};

/// Run the full boundary pipeline.
///
/// Takes a point cloud and a configuration, then produces a
/// [`ProcessResult`] containing the closed boundary polygon, the edges
/// worth dimensioning and the enclosed area.
///
/// # Pipeline steps
///
/// 1. Optional voxel downsampling, ceiling cut and elevation band
/// 2. Projection and rasterization into an occupancy grid
/// 3. Dilation, erosion, closing and blur-threshold cleanup
/// 4. Contour tracing (pluggable strategy; skipped in hull mode)
/// 5. Boundary selection: largest contour or convex hull
/// 6. Simplification, then axis snapping (both pluggable)
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the configuration is
/// rejected, [`PipelineError::InsufficientData`] if too few points
/// survive slicing, [`PipelineError::NoBoundaryFound`] if no contour
/// qualifies, and [`PipelineError::DegeneratePolygon`] if the boundary
/// collapses below 3 distinct vertices.
pub fn process(cloud: PointCloud, config: &PipelineConfig) -> Result<ProcessResult, PipelineError> {
    Ok(process_staged(cloud, config)?.into_result())
}

/// Run the full pipeline, preserving every intermediate output.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_staged(
    cloud: PointCloud,
    config: &PipelineConfig,
) -> Result<StagedResult, PipelineError> {
    Pipeline::new(cloud, config.clone()).complete()
}
