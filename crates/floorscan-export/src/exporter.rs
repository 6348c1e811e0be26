//! Pluggable vector drawing output.
//!
//! The pipeline produces geometry only; a [`VectorExporter`] turns the
//! final boundary and its dimensioned edges into a drawing file. Runs
//! that do not need a drawing select [`VectorExporterKind::Disabled`].

use serde::{Deserialize, Serialize};

use floorscan_pipeline::{BoundaryPolygon, DimensionedSegment};

use crate::svg::{DimensionStyle, SvgMetadata, to_svg};

/// A serialized drawing ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorDrawing {
    /// File extension without the leading dot, e.g. `"svg"`.
    pub extension: &'static str,
    pub contents: String,
}

/// Serializes a boundary into a vector drawing.
pub trait VectorExporter {
    /// Returns `None` when this exporter produces no drawing.
    fn export(
        &self,
        boundary: &BoundaryPolygon,
        segments: &[DimensionedSegment],
        style: &DimensionStyle,
        metadata: &SvgMetadata<'_>,
    ) -> Option<VectorDrawing>;
}

/// Available vector exporters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorExporterKind {
    /// Layered SVG with aligned dimensions.
    #[default]
    Svg,
    /// No drawing.
    Disabled,
}

impl VectorExporter for VectorExporterKind {
    fn export(
        &self,
        boundary: &BoundaryPolygon,
        segments: &[DimensionedSegment],
        style: &DimensionStyle,
        metadata: &SvgMetadata<'_>,
    ) -> Option<VectorDrawing> {
        match self {
            Self::Svg => Some(VectorDrawing {
                extension: "svg",
                contents: to_svg(boundary, segments, style, metadata),
            }),
            Self::Disabled => {
                tracing::debug!("vector export disabled");
                None
            }
        }
    }
}
