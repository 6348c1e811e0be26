//! Output directory writer.
//!
//! Writes every artifact of one pipeline run into a single directory:
//! diagnostic PNGs for the intermediate grids and contours, the selected
//! slice as PLY, the dimensioned vector drawing and a JSON summary.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use floorscan_export::svg::{DimensionStyle, SvgMetadata};
use floorscan_export::{
    ExportError, VectorExporter, VectorExporterKind, encode_png, render_boundary,
    render_contours, render_grid,
};
use floorscan_pipeline::height::ElevationBand;
use floorscan_pipeline::{
    BoundaryPolygon, DimensionedSegment, PipelineConfig, PipelineDiagnostics, StagedResult,
};

use crate::ply::write_ply;

pub const RAW_GRID_FILE: &str = "raw_grid.png";
pub const CLEAN_GRID_FILE: &str = "clean_grid.png";
pub const CONTOURS_FILE: &str = "contours.png";
pub const FINAL_BOUNDARY_FILE: &str = "final_boundary.png";
pub const SLICE_FILE: &str = "slice_points.ply";
pub const SUMMARY_FILE: &str = "summary.json";

/// Drawing file name without its extension.
pub const DRAWING_STEM: &str = "outer_boundary";

/// Errors from writing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// The output directory could not be created.
    #[error("cannot create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An artifact could not be written.
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A diagnostic image could not be rendered or encoded.
    #[error(transparent)]
    Render(#[from] ExportError),

    /// The summary could not be serialized.
    #[error("cannot serialize summary: {0}")]
    Summary(#[from] serde_json::Error),
}

/// Contents of `summary.json`.
#[derive(Debug, Serialize)]
pub struct Summary<'a> {
    pub title: Option<&'a str>,
    pub area: f64,
    pub perimeter: f64,
    pub vertex_count: usize,
    pub band: Option<&'a ElevationBand>,
    pub boundary: &'a BoundaryPolygon,
    pub segments: &'a [DimensionedSegment],
    pub config: &'a PipelineConfig,
    pub diagnostics: Option<&'a PipelineDiagnostics>,
}

/// Writes the artifacts of pipeline runs into one directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    exporter: VectorExporterKind,
    style: DimensionStyle,
}

impl ArtifactWriter {
    /// A writer targeting `dir` with the SVG exporter and default
    /// dimension style.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            exporter: VectorExporterKind::default(),
            style: DimensionStyle::default(),
        }
    }

    #[must_use]
    pub const fn with_exporter(mut self, exporter: VectorExporterKind) -> Self {
        self.exporter = exporter;
        self
    }

    #[must_use]
    pub const fn with_dimension_style(mut self, style: DimensionStyle) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every artifact for `staged`, creating the directory first.
    ///
    /// `title` names the run in the drawing and summary, usually the
    /// input file stem. Returns the paths written, in order. A disabled
    /// vector exporter skips only the drawing.
    ///
    /// # Errors
    ///
    /// Returns an [`OutputError`] on the first file that cannot be
    /// produced; files written before it are left in place.
    pub fn write(
        &self,
        staged: &StagedResult,
        config: &PipelineConfig,
        diagnostics: Option<&PipelineDiagnostics>,
        title: Option<&str>,
    ) -> Result<Vec<PathBuf>, OutputError> {
        fs::create_dir_all(&self.dir).map_err(|source| OutputError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let mut written = Vec::new();
        let mut put = |name: &str, bytes: &[u8]| -> Result<(), OutputError> {
            let path = self.dir.join(name);
            fs::write(&path, bytes).map_err(|source| OutputError::Write {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote artifact");
            written.push(path);
            Ok(())
        };

        put(RAW_GRID_FILE, &encode_png(&render_grid(&staged.raw_grid)?)?)?;
        put(CLEAN_GRID_FILE, &encode_png(&render_grid(&staged.clean_grid)?)?)?;
        put(
            CONTOURS_FILE,
            &encode_png(&render_contours(&staged.clean_grid, &staged.contours)?)?,
        )?;
        put(
            FINAL_BOUNDARY_FILE,
            &encode_png(&render_boundary(&staged.clean_grid, &staged.boundary)?)?,
        )?;
        put(SLICE_FILE, write_ply(&staged.slice).as_bytes())?;

        let config_json = serde_json::to_string(config)?;
        let description = format!(
            "Outer boundary, {:.2} m², {} corners",
            staged.boundary.area(),
            staged.boundary.corners().len()
        );
        let metadata = SvgMetadata {
            title,
            description: Some(&description),
            config_json: Some(&config_json),
        };
        match self
            .exporter
            .export(&staged.boundary, &staged.segments, &self.style, &metadata)
        {
            Some(drawing) => put(
                &format!("{DRAWING_STEM}.{}", drawing.extension),
                drawing.contents.as_bytes(),
            )?,
            None => tracing::warn!("vector export unavailable, skipping the boundary drawing"),
        }

        let summary = Summary {
            title,
            area: staged.boundary.area(),
            perimeter: staged.boundary.perimeter(),
            vertex_count: staged.boundary.corners().len(),
            band: staged.band.as_ref(),
            boundary: &staged.boundary,
            segments: &staged.segments,
            config,
            diagnostics,
        };
        put(SUMMARY_FILE, serde_json::to_string_pretty(&summary)?.as_bytes())?;

        tracing::info!(
            dir = %self.dir.display(),
            files = written.len(),
            "artifacts written"
        );
        Ok(written)
    }
}
