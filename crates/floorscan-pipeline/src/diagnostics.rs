//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! parameter tuning on real scans. [`process_with_diagnostics`] collects
//! them alongside the pipeline results.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::height::ElevationBand;
use crate::pipeline::{Pipeline, PipelineStage};
use crate::types::{Contour, PipelineConfig, PipelineError, PointCloud, StagedResult};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: downsampling and elevation band selection.
    pub height_selection: StageDiagnostics,
    /// Stage 2: projection and rasterization.
    pub rasterize: StageDiagnostics,
    /// Stage 3: morphological cleanup.
    pub cleanup: StageDiagnostics,
    /// Stage 4: contour tracing.
    pub contour_tracing: StageDiagnostics,
    /// Stage 5: boundary selection.
    pub boundary_selection: StageDiagnostics,
    /// Stage 6a: simplification.
    pub simplification: StageDiagnostics,
    /// Stage 6b: axis snapping.
    pub snapping: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Height selection metrics.
    HeightSelection {
        /// Points in the cloud handed to the pipeline.
        input_points: usize,
        /// Points left after voxel downsampling.
        downsampled_points: usize,
        /// The selected band, `None` for full projection.
        band: Option<ElevationBand>,
        /// Points kept for projection.
        slice_points: usize,
    },
    /// Rasterization metrics.
    Rasterize {
        /// Cell edge in metres.
        cell_size: f64,
        /// Grid rows.
        rows: u32,
        /// Grid columns.
        cols: u32,
        /// Cells holding at least one point.
        occupied_cells: usize,
    },
    /// Morphological cleanup metrics.
    Cleanup {
        /// Occupied cells before cleanup.
        occupied_before: usize,
        /// Occupied cells after cleanup.
        occupied_after: usize,
    },
    /// Contour tracing metrics.
    ContourTracing {
        /// Number of contours that survived filtering.
        contour_count: usize,
        /// Total number of points across all contours.
        total_point_count: usize,
        /// Minimum points in any single contour.
        min_contour_points: usize,
        /// Maximum points in any single contour.
        max_contour_points: usize,
    },
    /// Boundary selection metrics.
    BoundarySelection {
        /// Which strategy was used.
        strategy: String,
        /// Vertices of the selected ring.
        vertices: usize,
        /// Area enclosed by the selected ring.
        area: f64,
    },
    /// Simplification metrics.
    Simplification {
        /// Distance tolerance in metres.
        tolerance: f64,
        /// Vertices before simplification.
        points_before: usize,
        /// Vertices after simplification.
        points_after: usize,
        /// Reduction ratio: `1.0 - (after / before)`.
        reduction_ratio: f64,
    },
    /// Axis snapping metrics.
    Snapping {
        /// Angular threshold in degrees.
        threshold_degrees: f64,
        /// Distinct vertices of the final boundary.
        vertices: usize,
        /// Edges long enough to be dimensioned.
        segments: usize,
        /// Final enclosed area.
        area: f64,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Points in the input cloud.
    pub input_points: usize,
    /// Points projected onto the grid.
    pub slice_points: usize,
    /// Grid rows.
    pub grid_rows: u32,
    /// Grid columns.
    pub grid_cols: u32,
    /// Contours that survived filtering.
    pub contour_count: usize,
    /// Distinct vertices of the final boundary.
    pub final_vertex_count: usize,
    /// Final enclosed area in square metres.
    pub area: f64,
    /// Final boundary length in metres.
    pub perimeter: f64,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Points: {} input, {} projected | Grid: {}x{}",
            self.summary.input_points,
            self.summary.slice_points,
            self.summary.grid_cols,
            self.summary.grid_rows,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Height Selection", &self.height_selection),
            ("Rasterize", &self.rasterize),
            ("Cleanup", &self.cleanup),
            ("Contour Tracing", &self.contour_tracing),
            ("Boundary Selection", &self.boundary_selection),
            ("Simplification", &self.simplification),
            ("Snapping", &self.snapping),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Contours: {}  |  Boundary: {} vertices, {:.2} m², {:.2} m perimeter",
            self.summary.contour_count,
            self.summary.final_vertex_count,
            self.summary.area,
            self.summary.perimeter,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::HeightSelection {
            input_points,
            downsampled_points,
            band,
            slice_points,
        } => {
            let band = band.map_or_else(
                || "full projection".to_owned(),
                |b| format!("z=[{:.2}, {:.2})", b.z_lo, b.z_hi),
            );
            format!("{input_points}->{downsampled_points}->{slice_points} pts, {band}")
        }
        StageMetrics::Rasterize {
            cell_size,
            rows,
            cols,
            occupied_cells,
        } => format!("g={cell_size:.3} {cols}x{rows} occupied={occupied_cells}"),
        StageMetrics::Cleanup {
            occupied_before,
            occupied_after,
        } => format!("occupied {occupied_before}->{occupied_after}"),
        StageMetrics::ContourTracing {
            contour_count,
            total_point_count,
            min_contour_points,
            max_contour_points,
        } => format!(
            "{contour_count} contours, {total_point_count} pts (min={min_contour_points} max={max_contour_points})",
        ),
        StageMetrics::BoundarySelection {
            strategy,
            vertices,
            area,
        } => format!("{strategy} {vertices} pts, area={area:.2}"),
        StageMetrics::Simplification {
            tolerance,
            points_before,
            points_after,
            reduction_ratio,
        } => format!(
            "tol={tolerance:.2} {points_before}->{points_after} pts ({:.1}% reduction)",
            reduction_ratio * 100.0,
        ),
        StageMetrics::Snapping {
            threshold_degrees,
            vertices,
            segments,
            area,
        } => format!(
            "{threshold_degrees:.1}° {vertices} corners, {segments} dimensions, area={area:.2}"
        ),
    }
}

/// Statistics for a set of contours.
pub(crate) struct ContourStats {
    /// Total number of points across all contours.
    pub total: usize,
    /// Minimum number of points in any single contour.
    pub min: usize,
    /// Maximum number of points in any single contour.
    pub max: usize,
}

/// Compute contour statistics.
pub(crate) fn contour_stats(contours: &[Contour]) -> ContourStats {
    let total = contours.iter().map(Contour::len).sum();
    let min = contours.iter().map(Contour::len).min().unwrap_or(0);
    let max = contours.iter().map(Contour::len).max().unwrap_or(0);
    ContourStats { total, min, max }
}

/// Time one stage transition and record the new stage's metrics.
fn timed<S: PipelineStage>(
    advance: impl FnOnce() -> Result<S, PipelineError>,
) -> Result<(S, StageDiagnostics), PipelineError> {
    let start = Instant::now();
    let stage = advance()?;
    let duration = start.elapsed();
    tracing::debug!(stage = S::NAME, ?duration, "stage complete");
    let metrics = stage.metrics();
    Ok((stage, StageDiagnostics { duration, metrics }))
}

/// Run the full pipeline, timing every stage.
///
/// # Errors
///
/// Same as [`crate::process`].
pub fn process_with_diagnostics(
    cloud: PointCloud,
    config: &PipelineConfig,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let start = Instant::now();
    let pending = Pipeline::new(cloud, config.clone());

    let (stage, height_selection) = timed(|| pending.select_height())?;
    let (stage, rasterize) = timed(|| stage.rasterize())?;
    let (stage, cleanup) = timed(|| Ok(stage.clean()))?;
    let (stage, contour_tracing) = timed(|| Ok(stage.trace_contours()))?;
    let (stage, boundary_selection) = timed(|| stage.select_boundary())?;
    let (stage, simplification) = timed(|| stage.simplify())?;
    let (stage, snapping) = timed(|| stage.snap())?;
    let staged = stage.into_result();
    let total_duration = start.elapsed();

    let transform = staged.raw_grid.transform();
    let summary = PipelineSummary {
        input_points: staged.input_points,
        slice_points: staged.slice.len(),
        grid_rows: transform.rows,
        grid_cols: transform.cols,
        contour_count: staged.contours.len(),
        final_vertex_count: staged.boundary.corners().len(),
        area: staged.boundary.area(),
        perimeter: staged.boundary.perimeter(),
    };

    let diagnostics = PipelineDiagnostics {
        height_selection,
        rasterize,
        cleanup,
        contour_tracing,
        boundary_selection,
        simplification,
        snapping,
        total_duration,
        summary,
    };
    Ok((staged, diagnostics))
}
