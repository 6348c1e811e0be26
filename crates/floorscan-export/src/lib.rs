//! floorscan-export: Pure serializers for boundaries and diagnostics (sans-IO).
//!
//! Converts pipeline output into file contents: layered, dimensioned SVG
//! drawings and PNG diagnostic images. Nothing here touches the file
//! system; callers write the returned strings and bytes.

pub mod exporter;
pub mod raster;
pub mod svg;

pub use exporter::{VectorDrawing, VectorExporter, VectorExporterKind};
pub use raster::{ExportError, encode_png, render_boundary, render_contours, render_grid};
pub use svg::{DimensionStyle, SvgMetadata, to_svg};
