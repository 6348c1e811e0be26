//! floorscan: extract dimensioned floorplan boundaries from point clouds.
//!
//! Loads one or more PLY point clouds, runs the boundary pipeline on each
//! and writes diagnostic images, the selected slice, a dimensioned SVG
//! drawing and a JSON summary into an output directory.
//!
//! # Usage
//!
//! ```text
//! floorscan [OPTIONS] <INPUT>...
//! ```
//!
//! With several inputs every run gets its own subdirectory named after
//! the input file stem.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use floorscan_export::{DimensionStyle, VectorExporterKind};
use floorscan_io::{ArtifactWriter, LoadError, OutputError, load_point_cloud};
use floorscan_pipeline::height::density_peaks;
use floorscan_pipeline::{
    AxisSnapperKind, BoundaryStrategy, ContourTracerKind, DataStage, HeightMode, PipelineConfig,
    PipelineError, SimplifierKind, process_with_diagnostics,
};

/// Histogram resolution for suggesting slice heights.
const PEAK_BINS: usize = 50;

/// Number of suggested slice heights.
const PEAK_COUNT: usize = 5;

/// Extract a dimensioned 2D floorplan boundary from 3D point clouds.
#[derive(Parser)]
#[command(name = "floorscan", version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input point clouds (PLY, ASCII or binary).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory, created if absent.
    #[arg(short, long, default_value = "floorscan-out")]
    output: PathBuf,

    /// Occupancy grid cell size in metres.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CELL_SIZE)]
    cell_size: f64,

    /// Slice at this absolute height (metres).
    #[arg(long, conflicts_with = "floor_offset")]
    height: Option<f64>,

    /// Slice this many metres above the estimated floor.
    #[arg(long, num_args = 0..=1, default_missing_value = "1.2")]
    floor_offset: Option<f64>,

    /// Elevation band thickness in metres.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SLICE_THICKNESS)]
    slice_thickness: f64,

    /// Height percentile taken as the floor.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_FLOOR_PERCENTILE)]
    floor_percentile: f64,

    /// Drop points at or above this height percentile.
    #[arg(long)]
    ceiling_percentile: Option<f64>,

    /// Voxel size in metres for downsampling before slicing.
    #[arg(long)]
    voxel_size: Option<f64>,

    /// Grid padding as a fraction of the larger extent.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_PADDING_FRACTION)]
    padding_fraction: f64,

    /// Dilation iterations.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_DILATE_ITERATIONS)]
    dilate: u8,

    /// Erosion iterations.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_ERODE_ITERATIONS)]
    erode: u8,

    /// Closing iterations.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CLOSE_ITERATIONS)]
    close: u8,

    /// Blur sigma in cells; 0 disables the blur-threshold step.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Occupancy threshold after blurring (0..1).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Contour tracing algorithm.
    #[arg(long, value_enum, default_value_t = Tracer::MarchingSquares)]
    tracer: Tracer,

    /// Minimum vertex count for a contour to count.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_CONTOUR_VERTICES)]
    min_contour_vertices: usize,

    /// Keep contours around enclosed empty regions.
    #[arg(long)]
    keep_holes: bool,

    /// How the outer boundary is chosen.
    #[arg(long, value_enum, default_value_t = Boundary::LargestContour)]
    boundary: Boundary,

    /// Skip polygon simplification.
    #[arg(long)]
    no_simplify: bool,

    /// Simplification tolerance in metres.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SIMPLIFY_TOLERANCE)]
    simplify_tolerance: f64,

    /// Axis snapping strategy.
    #[arg(long, value_enum, default_value_t = Snapper::Sequential)]
    snapper: Snapper,

    /// Edges within this many degrees of an axis become axis-aligned.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SNAP_ANGLE_DEGREES)]
    snap_angle: f64,

    /// Edges no longer than this (metres) get no dimension.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_DIMENSION_LENGTH)]
    min_dimension_length: f64,

    /// Distance from an edge to its dimension line in metres.
    #[arg(long, default_value_t = DimensionStyle::DEFAULT_OFFSET)]
    dimension_offset: f64,

    /// Dimension label height in metres.
    #[arg(long, default_value_t = DimensionStyle::DEFAULT_TEXT_HEIGHT)]
    text_height: f64,

    /// Do not write the vector drawing.
    #[arg(long)]
    no_vector: bool,

    /// Read the full pipeline config from a JSON file.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Print diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Log debug detail (overridden by `RUST_LOG`).
    #[arg(short, long)]
    verbose: bool,
}

/// Contour tracer selection.
#[derive(Clone, Copy, ValueEnum)]
enum Tracer {
    /// Marching squares on cell corners.
    MarchingSquares,
    /// Border following on cell centres.
    BorderFollowing,
}

/// Boundary strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Boundary {
    /// Largest traced contour.
    LargestContour,
    /// Convex hull of the projected points.
    ConvexHull,
}

/// Axis snapper selection.
#[derive(Clone, Copy, ValueEnum)]
enum Snapper {
    /// Vertex by vertex in ring order.
    Sequential,
    /// Runs of near-axis edges moved onto their mean line.
    LeastSquares,
}

/// Why one input failed.
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("cannot serialize diagnostics: {0}")]
    Report(#[from] serde_json::Error),
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// `--config` and `--config-json` replace the flag-built config
/// wholesale; fields missing from the JSON take their defaults.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref path) = cli.config {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading --config {}: {e}", path.display()))?;
        return serde_json::from_str(&json)
            .map_err(|e| format!("Error parsing --config {}: {e}", path.display()));
    }
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let height_mode = match (cli.height, cli.floor_offset) {
        (Some(height), _) => HeightMode::Explicit { height },
        (None, Some(offset)) => HeightMode::AutoFromFloor { offset },
        (None, None) => HeightMode::FullProjection,
    };

    Ok(PipelineConfig {
        cell_size: cli.cell_size,
        height_mode,
        slice_thickness: cli.slice_thickness,
        floor_percentile: cli.floor_percentile,
        ceiling_percentile: cli.ceiling_percentile,
        voxel_size: cli.voxel_size,
        padding_fraction: cli.padding_fraction,
        dilate_iterations: cli.dilate,
        erode_iterations: cli.erode,
        close_iterations: cli.close,
        blur_sigma: cli.blur_sigma,
        threshold: cli.threshold,
        contour_tracer: match cli.tracer {
            Tracer::MarchingSquares => ContourTracerKind::MarchingSquares,
            Tracer::BorderFollowing => ContourTracerKind::BorderFollowing,
        },
        min_contour_vertices: cli.min_contour_vertices,
        keep_holes: cli.keep_holes,
        boundary_strategy: match cli.boundary {
            Boundary::LargestContour => BoundaryStrategy::LargestContour,
            Boundary::ConvexHull => BoundaryStrategy::ConvexHull,
        },
        simplifier: if cli.no_simplify {
            SimplifierKind::Disabled
        } else {
            SimplifierKind::TopologyPreserving
        },
        simplify_tolerance: cli.simplify_tolerance,
        axis_snapper: match cli.snapper {
            Snapper::Sequential => AxisSnapperKind::Sequential,
            Snapper::LeastSquares => AxisSnapperKind::LeastSquares,
        },
        snap_angle_degrees: cli.snap_angle,
        min_dimension_length: cli.min_dimension_length,
    })
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Output directory for `input`: the root itself for a single input,
/// otherwise a subdirectory named after the input's file stem.
fn output_dir_for(root: &Path, input: &Path, multiple: bool) -> PathBuf {
    if !multiple {
        return root.to_path_buf();
    }
    let stem = input
        .file_stem()
        .map_or_else(|| "input".into(), |s| s.to_string_lossy());
    root.join(stem.as_ref())
}

fn run_one(
    cli: &Cli,
    config: &PipelineConfig,
    writer: &ArtifactWriter,
    input: &Path,
) -> Result<(), RunError> {
    let cloud = load_point_cloud(input)?;
    let peaks = density_peaks(&cloud, PEAK_BINS, PEAK_COUNT, 0);

    let (staged, diagnostics) = match process_with_diagnostics(cloud, config) {
        Ok(result) => result,
        Err(
            err @ PipelineError::InsufficientData {
                stage: DataStage::ElevationBand | DataStage::CeilingCut,
                ..
            },
        ) => {
            eprintln!("No usable slice in {}. Densest heights:", input.display());
            for (height, count) in &peaks {
                eprintln!("  {height:>8.3} m  ({count} points)");
            }
            eprintln!("Try --height <H> with one of these.");
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        println!("{}", diagnostics.report());
    }

    let title = input.file_stem().and_then(|s| s.to_str());
    writer.write(&staged, config, Some(&diagnostics), title)?;

    eprintln!(
        "{}: {} corners, {:.2} m², written to {}",
        input.display(),
        staged.boundary.corners().len(),
        staged.boundary.area(),
        writer.dir().display(),
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let style = DimensionStyle {
        offset: cli.dimension_offset,
        text_height: cli.text_height,
        ..DimensionStyle::default()
    };
    let exporter = if cli.no_vector {
        VectorExporterKind::Disabled
    } else {
        VectorExporterKind::Svg
    };

    let multiple = cli.inputs.len() > 1;
    let mut failures = 0_usize;
    for input in &cli.inputs {
        let writer = ArtifactWriter::new(output_dir_for(&cli.output, input, multiple))
            .with_exporter(exporter)
            .with_dimension_style(style);
        if let Err(e) = run_one(&cli, &config, &writer, input) {
            tracing::error!(input = %input.display(), error = %e, "run failed");
            failures += 1;
        }
    }

    if failures > 0 {
        eprintln!("{failures} of {} inputs failed", cli.inputs.len());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("floorscan").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_pipeline_defaults() {
        let config = config_from_cli(&parse(&["room.ply"])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn height_flags_pick_the_mode() {
        let explicit = config_from_cli(&parse(&["room.ply", "--height", "1.1"])).unwrap();
        assert_eq!(explicit.height_mode, HeightMode::Explicit { height: 1.1 });

        let floor = config_from_cli(&parse(&["room.ply", "--floor-offset"])).unwrap();
        assert_eq!(
            floor.height_mode,
            HeightMode::AutoFromFloor {
                offset: PipelineConfig::DEFAULT_FLOOR_OFFSET
            }
        );
    }

    #[test]
    fn height_and_floor_offset_conflict() {
        let parsed = Cli::try_parse_from([
            "floorscan",
            "room.ply",
            "--height",
            "1",
            "--floor-offset",
            "1",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn config_json_replaces_flags() {
        let cli = parse(&[
            "room.ply",
            "--cell-size",
            "0.2",
            "--config-json",
            r#"{"cell_size":0.07,"boundary_strategy":"ConvexHull"}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert!((config.cell_size - 0.07).abs() < f64::EPSILON);
        assert_eq!(config.boundary_strategy, BoundaryStrategy::ConvexHull);
        assert_eq!(config.dilate_iterations, PipelineConfig::DEFAULT_DILATE_ITERATIONS);
    }

    #[test]
    fn bad_config_json_is_reported() {
        let cli = parse(&["room.ply", "--config-json", "{"]);
        assert!(config_from_cli(&cli).unwrap_err().contains("--config-json"));
    }

    #[test]
    fn several_inputs_get_subdirectories() {
        let root = Path::new("out");
        assert_eq!(
            output_dir_for(root, Path::new("scans/a.ply"), true),
            Path::new("out/a")
        );
        assert_eq!(output_dir_for(root, Path::new("scans/a.ply"), false), root);
    }

    #[test]
    fn flags_reach_the_config() {
        let cli = parse(&[
            "room.ply",
            "--no-simplify",
            "--snapper",
            "least-squares",
            "--tracer",
            "border-following",
            "--voxel-size",
            "0.02",
            "--close",
            "0",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.simplifier, SimplifierKind::Disabled);
        assert_eq!(config.axis_snapper, AxisSnapperKind::LeastSquares);
        assert_eq!(config.contour_tracer, ContourTracerKind::BorderFollowing);
        assert_eq!(config.voxel_size, Some(0.02));
        assert_eq!(config.close_iterations, 0);
    }
}
