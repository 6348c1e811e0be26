//! PLY point cloud reading and writing.
//!
//! Reading goes through `ply-rs`, which handles ASCII and both binary
//! encodings. Writing is plain ASCII so the selected slice can be opened
//! in any viewer.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Ply, Property};

use floorscan_pipeline::{Point3, PointCloud, Rgb};

/// Errors from loading a point cloud.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The input path does not exist.
    #[error("input file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The input exists but is not a format we read.
    #[error("unsupported point cloud format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The file could not be opened or read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The PLY header or body is malformed.
    #[error("corrupt PLY: {0}")]
    Corrupt(String),

    /// The file has no `vertex` element.
    #[error("PLY has no vertex element")]
    MissingVertexElement,

    /// A vertex lacks a coordinate.
    #[error("vertex {index} has no numeric '{property}' property")]
    MissingCoordinate { index: usize, property: &'static str },

    /// The file parsed but holds no points.
    #[error("point cloud is empty")]
    Empty,
}

/// Load a point cloud from `path`.
///
/// Only `.ply` files are read; the extension match is case-insensitive.
///
/// # Errors
///
/// Returns a [`LoadError`] if the file is missing, unreadable, corrupt,
/// lacks coordinates, or holds no points.
pub fn load_point_cloud(path: &Path) -> Result<PointCloud, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let is_ply = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ply"));
    if !is_ply {
        return Err(LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cloud = read_ply(&mut BufReader::new(file))?;
    tracing::info!(
        path = %path.display(),
        points = cloud.len(),
        colored = cloud.colors().is_some(),
        "loaded point cloud"
    );
    Ok(cloud)
}

/// Parse a PLY stream into a point cloud.
///
/// Coordinates may be any scalar property type. Colors are kept only
/// when every vertex carries `red`, `green` and `blue`.
///
/// # Errors
///
/// Returns [`LoadError::Corrupt`] for malformed input,
/// [`LoadError::MissingVertexElement`] / [`LoadError::MissingCoordinate`]
/// for missing data, and [`LoadError::Empty`] for zero vertices.
pub fn read_ply<R: Read>(reader: &mut R) -> Result<PointCloud, LoadError> {
    let parser = Parser::<DefaultElement>::new();
    let ply: Ply<DefaultElement> = parser
        .read_ply(reader)
        .map_err(|err| LoadError::Corrupt(err.to_string()))?;

    let Some(vertices) = ply.payload.get("vertex") else {
        return Err(if ply.header.elements.contains_key("vertex") {
            LoadError::Empty
        } else {
            LoadError::MissingVertexElement
        });
    };
    if vertices.is_empty() {
        return Err(LoadError::Empty);
    }

    let mut points = Vec::with_capacity(vertices.len());
    let mut colors: Option<Vec<Rgb>> = Some(Vec::with_capacity(vertices.len()));
    for (index, vertex) in vertices.iter().enumerate() {
        let coord = |property: &'static str| {
            vertex
                .get(property)
                .and_then(scalar)
                .ok_or(LoadError::MissingCoordinate { index, property })
        };
        points.push(Point3::new(coord("x")?, coord("y")?, coord("z")?));

        colors = colors.and_then(|mut list| {
            list.push(color(vertex)?);
            Some(list)
        });
    }
    tracing::debug!(vertices = points.len(), "parsed PLY");

    Ok(match colors {
        Some(colors) => PointCloud::with_colors(points, colors).ok_or(LoadError::Empty)?,
        None => PointCloud::new(points),
    })
}

/// A scalar property as `f64`; lists are not scalars.
fn scalar(property: &Property) -> Option<f64> {
    match *property {
        Property::Char(v) => Some(f64::from(v)),
        Property::UChar(v) => Some(f64::from(v)),
        Property::Short(v) => Some(f64::from(v)),
        Property::UShort(v) => Some(f64::from(v)),
        Property::Int(v) => Some(f64::from(v)),
        Property::UInt(v) => Some(f64::from(v)),
        Property::Float(v) => Some(f64::from(v)),
        Property::Double(v) => Some(v),
        _ => None,
    }
}

/// One color channel as 8 bits. Integer channels above 255 are taken
/// as 16-bit; floating channels as the unit range.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn channel(property: &Property) -> Option<u8> {
    match *property {
        Property::UChar(v) => Some(v),
        Property::UShort(v) if v > 255 => Some((v >> 8) as u8),
        Property::Float(_) | Property::Double(_) => {
            let v = scalar(property)?;
            Some((v.clamp(0.0, 1.0) * 255.0).round() as u8)
        }
        _ => scalar(property).map(|v| v.clamp(0.0, 255.0) as u8),
    }
}

fn color(vertex: &DefaultElement) -> Option<Rgb> {
    let get = |name: &str| vertex.get(name).and_then(channel);
    Some([get("red")?, get("green")?, get("blue")?])
}

/// Serialize a cloud as ASCII PLY.
///
/// Coordinates are written as `double`; colors, when present, as
/// `uchar red/green/blue`.
#[must_use]
pub fn write_ply(cloud: &PointCloud) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ply");
    let _ = writeln!(out, "format ascii 1.0");
    let _ = writeln!(out, "comment written by floorscan");
    let _ = writeln!(out, "element vertex {}", cloud.len());
    for axis in ["x", "y", "z"] {
        let _ = writeln!(out, "property double {axis}");
    }
    if cloud.colors().is_some() {
        for channel in ["red", "green", "blue"] {
            let _ = writeln!(out, "property uchar {channel}");
        }
    }
    let _ = writeln!(out, "end_header");

    match cloud.colors() {
        Some(colors) => {
            for (p, [r, g, b]) in cloud.points().iter().zip(colors) {
                let _ = writeln!(out, "{} {} {} {r} {g} {b}", p.x, p.y, p.z);
            }
        }
        None => {
            for p in cloud.points() {
                let _ = writeln!(out, "{} {} {}", p.x, p.y, p.z);
            }
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ASCII_FLOAT: &str = "ply
format ascii 1.0
element vertex 3
property float x
property float y
property float z
end_header
0 0 1
1.5 0 1
0 2.25 1.5
";

    #[test]
    fn reads_ascii_floats() {
        let cloud = read_ply(&mut ASCII_FLOAT.as_bytes()).unwrap();
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.points()[2], Point3::new(0.0, 2.25, 1.5));
        assert!(cloud.colors().is_none());
    }

    #[test]
    fn reads_integer_coordinates_and_colors() {
        let ply = "ply
format ascii 1.0
element vertex 2
property int x
property int y
property short z
property uchar red
property uchar green
property uchar blue
end_header
1 2 3 255 0 10
-4 5 6 0 128 0
";
        let cloud = read_ply(&mut ply.as_bytes()).unwrap();
        assert_eq!(cloud.points()[1], Point3::new(-4.0, 5.0, 6.0));
        assert_eq!(cloud.colors().unwrap(), &[[255, 0, 10], [0, 128, 0]]);
    }

    #[test]
    fn reads_binary_little_endian() {
        let mut bytes = b"ply
format binary_little_endian 1.0
element vertex 2
property double x
property double y
property double z
end_header
"
        .to_vec();
        for v in [1.0_f64, 2.0, 3.0, -1.0, -2.0, 0.5] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let cloud = read_ply(&mut bytes.as_slice()).unwrap();
        assert_eq!(cloud.points()[0], Point3::new(1.0, 2.0, 3.0));
        assert_eq!(cloud.points()[1], Point3::new(-1.0, -2.0, 0.5));
    }

    #[test]
    fn float_colors_scale_to_bytes() {
        let ply = "ply
format ascii 1.0
element vertex 1
property float x
property float y
property float z
property float red
property float green
property float blue
end_header
0 0 0 1 0.5 0
";
        let cloud = read_ply(&mut ply.as_bytes()).unwrap();
        assert_eq!(cloud.colors().unwrap(), &[[255, 128, 0]]);
    }

    #[test]
    fn missing_z_is_reported() {
        let ply = "ply
format ascii 1.0
element vertex 1
property float x
property float y
end_header
0 0
";
        let err = read_ply(&mut ply.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingCoordinate {
                index: 0,
                property: "z"
            }
        ));
    }

    #[test]
    fn empty_vertex_element_is_empty() {
        let ply = "ply
format ascii 1.0
element vertex 0
property float x
property float y
property float z
end_header
";
        assert!(matches!(
            read_ply(&mut ply.as_bytes()).unwrap_err(),
            LoadError::Empty
        ));
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = read_ply(&mut "not a ply file".as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::Corrupt(_)));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_point_cloud(Path::new("/nonexistent/room.ply")).unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));
    }

    #[test]
    fn written_ply_reads_back() {
        let cloud = PointCloud::with_colors(
            vec![Point3::new(0.25, -1.0, 1.125), Point3::new(3.0, 4.0, 0.0)],
            vec![[1, 2, 3], [250, 251, 252]],
        )
        .unwrap();
        let text = write_ply(&cloud);
        assert!(text.starts_with("ply\nformat ascii 1.0\n"));
        assert_eq!(read_ply(&mut text.as_bytes()).unwrap(), cloud);
    }
}
