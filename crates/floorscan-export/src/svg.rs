//! SVG export serializer.
//!
//! Converts the final boundary into a layered, dimensioned SVG drawing
//! using the [`svg`] crate for document construction, XML escaping, and
//! path data formatting.
//!
//! The drawing has two top-level groups, mirroring CAD layers:
//!
//! - `BOUNDARY`: the closed boundary as a single `<path>`.
//! - `DIMENSIONS`: one `<g>` per dimensioned edge holding an aligned
//!   dimension line offset outward from the edge, two extension lines,
//!   architectural tick marks and a length label in metres.
//!
//! User units are metres with +y pointing up in the world and down in
//! SVG, so every y coordinate is flipped. The document's physical size
//! is set for a 1:50 plot.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Group, Line, Path, Title};
use svg::node::{Node, Text};

use floorscan_pipeline::ring;
use floorscan_pipeline::{BoundaryPolygon, DimensionedSegment, Point};

/// Millimetres of paper per metre of floor (1:50).
const MM_PER_METRE: f64 = 20.0;

/// Boundary stroke width in metres.
const BOUNDARY_STROKE: f64 = 0.03;

/// Dimension stroke width in metres.
const DIMENSION_STROKE: f64 = 0.01;

/// Colour of everything on the `DIMENSIONS` layer.
const DIMENSION_COLOR: &str = "#c0392b";

/// Metadata to embed in the SVG document.
///
/// All fields are optional. Text values are XML-escaped automatically by
/// the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`. Typically the input file
    /// name without extension.
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized pipeline configuration, emitted inside `<metadata>` so
    /// drawings carry the settings that produced them.
    pub config_json: Option<&'a str>,
}

/// How dimensions are drawn. All lengths are in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionStyle {
    /// Distance from an edge to its dimension line, measured outward.
    pub offset: f64,
    /// Label font size.
    pub text_height: f64,
    /// Half-length of a tick mark, and the gap between an edge and the
    /// start of its extension lines.
    pub tick_size: f64,
}

impl DimensionStyle {
    pub const DEFAULT_OFFSET: f64 = 0.3;
    pub const DEFAULT_TEXT_HEIGHT: f64 = 0.1;
    pub const DEFAULT_TICK_SIZE: f64 = 0.05;
}

impl Default for DimensionStyle {
    fn default() -> Self {
        Self {
            offset: Self::DEFAULT_OFFSET,
            text_height: Self::DEFAULT_TEXT_HEIGHT,
            tick_size: Self::DEFAULT_TICK_SIZE,
        }
    }
}

/// World-space geometry of one aligned dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionGeometry {
    /// The dimension line, parallel to the edge.
    pub line: (Point, Point),
    /// Extension lines from near the edge to just past the dimension line.
    pub extensions: [(Point, Point); 2],
    /// 45° tick marks centred on both ends of the dimension line.
    pub ticks: [(Point, Point); 2],
    /// Centre of the label, just outside the dimension line.
    pub label_anchor: Point,
    /// Label text, e.g. `"4.00 m"`.
    pub label: String,
}

/// Format a length in metres with two decimals.
#[must_use]
pub fn format_length(metres: f64) -> String {
    format!("{metres:.2} m")
}

/// Compute the aligned dimension for `segment`.
///
/// `counter_clockwise` is the orientation of the ring the segment came
/// from; the dimension is placed on the outside of the ring.
#[must_use]
pub fn dimension_geometry(
    segment: &DimensionedSegment,
    counter_clockwise: bool,
    style: &DimensionStyle,
) -> DimensionGeometry {
    let (start, end) = (segment.start, segment.end);
    let length = segment.length();
    let u = if length > 0.0 {
        Point::new((end.x - start.x) / length, (end.y - start.y) / length)
    } else {
        Point::new(1.0, 0.0)
    };
    let n = if counter_clockwise {
        Point::new(u.y, -u.x)
    } else {
        Point::new(-u.y, u.x)
    };
    let along = |p: Point, dir: Point, d: f64| Point::new(dir.x.mul_add(d, p.x), dir.y.mul_add(d, p.y));

    let a = along(start, n, style.offset);
    let b = along(end, n, style.offset);
    let overshoot = style.offset + style.tick_size;
    let extensions = [
        (along(start, n, style.tick_size), along(start, n, overshoot)),
        (along(end, n, style.tick_size), along(end, n, overshoot)),
    ];

    let diagonal = Point::new(
        (u.x + n.x) * std::f64::consts::FRAC_1_SQRT_2,
        (u.y + n.y) * std::f64::consts::FRAC_1_SQRT_2,
    );
    let tick = |p: Point| {
        (
            along(p, diagonal, -style.tick_size),
            along(p, diagonal, style.tick_size),
        )
    };

    let mid = Point::new(f64::midpoint(a.x, b.x), f64::midpoint(a.y, b.y));
    DimensionGeometry {
        line: (a, b),
        extensions,
        ticks: [tick(a), tick(b)],
        label_anchor: along(mid, n, style.text_height),
        label: format_length(length),
    }
}

/// Label rotation in SVG degrees for an edge from `start` to `end`,
/// kept within `(-90, 90]` so text never reads upside down.
#[must_use]
pub fn label_rotation(start: Point, end: Point) -> f64 {
    // SVG y points down, so world angles flip sign.
    let mut angle = -(end.y - start.y).atan2(end.x - start.x).to_degrees();
    if angle > 90.0 {
        angle -= 180.0;
    } else if angle <= -90.0 {
        angle += 180.0;
    }
    angle
}

/// Maps world metres to SVG user units.
#[derive(Debug, Clone, Copy)]
struct Frame {
    min_x: f64,
    max_y: f64,
    margin: f64,
}

impl Frame {
    fn map(self, p: Point) -> (f64, f64) {
        (p.x - self.min_x + self.margin, self.max_y - p.y + self.margin)
    }
}

/// Build an SVG path `d` attribute for a closed ring.
///
/// Uses `M` for the first vertex, `L` for the others and `Z` to close.
/// A closing duplicate vertex is not repeated. Returns an empty string
/// for fewer than 2 vertices.
///
/// # Examples
///
/// ```
/// use floorscan_pipeline::Point;
/// use floorscan_export::svg::build_path_data;
///
/// let d = build_path_data(&[
///     Point::new(0.0, 0.0),
///     Point::new(4.0, 0.0),
///     Point::new(4.0, 3.0),
///     Point::new(0.0, 0.0),
/// ], |p| (p.x, -p.y));
/// assert_eq!(d, "M0,0 L4,0 L4,-3 z");
/// ```
#[must_use]
pub fn build_path_data(ring: &[Point], map: impl Fn(Point) -> (f64, f64)) -> String {
    let open = match ring {
        [first, .., last] if first == last => &ring[..ring.len() - 1],
        _ => ring,
    };
    let Some((first, rest)) = open.split_first() else {
        return String::new();
    };
    if rest.is_empty() {
        return String::new();
    }
    let mut data = Data::new().move_to(map(*first));
    for p in rest {
        data = data.line_to(map(*p));
    }
    String::from(svg::node::Value::from(data.close()))
}

fn line(frame: Frame, (a, b): (Point, Point)) -> Line {
    let (x1, y1) = frame.map(a);
    let (x2, y2) = frame.map(b);
    Line::new()
        .set("x1", x1)
        .set("y1", y1)
        .set("x2", x2)
        .set("y2", y2)
}

fn dimension_group(
    frame: Frame,
    segment: &DimensionedSegment,
    counter_clockwise: bool,
    style: &DimensionStyle,
) -> Group {
    let geometry = dimension_geometry(segment, counter_clockwise, style);

    let (x, y) = frame.map(geometry.label_anchor);
    let rotation = label_rotation(segment.start, segment.end);
    let mut label = Element::new("text");
    label.assign("x", x);
    label.assign("y", y);
    label.assign("font-size", style.text_height);
    label.assign("text-anchor", "middle");
    label.assign("dominant-baseline", "middle");
    label.assign("fill", DIMENSION_COLOR);
    label.assign("stroke", "none");
    label.assign("transform", format!("rotate({rotation:.3} {x} {y})"));
    label.append(Text::new(geometry.label.clone()));

    let mut group = Group::new()
        .set("class", "dimension")
        .set("data-length", format!("{:.4}", segment.length()))
        .add(line(frame, geometry.line));
    for ext in geometry.extensions {
        group = group.add(line(frame, ext));
    }
    for tick in geometry.ticks {
        group = group.add(line(frame, tick));
    }
    group.add(label)
}

/// Serialize a boundary and its dimensions into an SVG document.
///
/// The view box covers the boundary plus room for the dimensions on
/// every side. An empty `segments` slice produces an empty `DIMENSIONS`
/// group.
#[must_use]
pub fn to_svg(
    boundary: &BoundaryPolygon,
    segments: &[DimensionedSegment],
    style: &DimensionStyle,
    metadata: &SvgMetadata<'_>,
) -> String {
    let vertices = boundary.vertices();
    let (min, max) = vertices.iter().fold(
        (
            Point::new(f64::INFINITY, f64::INFINITY),
            Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        ),
        |(lo, hi), p| {
            (
                Point::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        },
    );
    let margin = 3.0f64.mul_add(style.text_height, style.offset + style.tick_size);
    let frame = Frame {
        min_x: min.x,
        max_y: max.y,
        margin,
    };
    let width = 2.0f64.mul_add(margin, max.x - min.x);
    let height = 2.0f64.mul_add(margin, max.y - min.y);

    let mut doc = Document::new()
        .set("width", format!("{}mm", width * MM_PER_METRE))
        .set("height", format!("{}mm", height * MM_PER_METRE))
        .set("viewBox", (0, 0, width, height));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(config_json) = metadata.config_json {
        let mut pipeline_el = Element::new("floorscan:pipeline");
        pipeline_el.assign("xmlns:floorscan", "urn:floorscan:pipeline:1");
        pipeline_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(pipeline_el);
        doc = doc.add(metadata_el);
    }

    let path = Path::new()
        .set("d", build_path_data(vertices, |p| frame.map(p)))
        .set("fill", "none")
        .set("stroke", "black")
        .set("stroke-width", BOUNDARY_STROKE)
        .set("stroke-linejoin", "miter");
    doc = doc.add(Group::new().set("id", "BOUNDARY").add(path));

    let counter_clockwise = ring::signed_area(vertices) > 0.0;
    let mut dimensions = Group::new()
        .set("id", "DIMENSIONS")
        .set("stroke", DIMENSION_COLOR)
        .set("stroke-width", DIMENSION_STROKE)
        .set("font-family", "sans-serif");
    for segment in segments {
        dimensions = dimensions.add(dimension_group(frame, segment, counter_clockwise, style));
    }
    doc = doc.add(dimensions);

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rectangle(ccw: bool) -> BoundaryPolygon {
        let mut pts = vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 3.0),
            Point::new(0.0, 3.0),
        ];
        if !ccw {
            pts.reverse();
        }
        BoundaryPolygon::from_ring(&pts, 0.0).unwrap()
    }

    fn approx(a: Point, b: Point) -> bool {
        a.approx_eq(b, 1e-12)
    }

    #[test]
    fn length_labels_have_two_decimals() {
        assert_eq!(format_length(4.0), "4.00 m");
        assert_eq!(format_length(2.345_6), "2.35 m");
    }

    #[test]
    fn dimension_line_sits_outside_ccw_ring() {
        let seg = DimensionedSegment::new(Point::new(0.0, 0.0), Point::new(4.0, 0.0));
        let g = dimension_geometry(&seg, true, &DimensionStyle::default());
        assert!(approx(g.line.0, Point::new(0.0, -0.3)));
        assert!(approx(g.line.1, Point::new(4.0, -0.3)));
        assert!(approx(g.extensions[0].0, Point::new(0.0, -0.05)));
        assert!(approx(g.extensions[0].1, Point::new(0.0, -0.35)));
        assert!(approx(g.label_anchor, Point::new(2.0, -0.4)));
        assert_eq!(g.label, "4.00 m");
    }

    #[test]
    fn dimension_line_sits_outside_cw_ring() {
        // Bottom edge of a clockwise ring runs right to left.
        let seg = DimensionedSegment::new(Point::new(4.0, 0.0), Point::new(0.0, 0.0));
        let g = dimension_geometry(&seg, false, &DimensionStyle::default());
        assert!(approx(g.line.0, Point::new(4.0, -0.3)));
        assert!(approx(g.line.1, Point::new(0.0, -0.3)));
    }

    #[test]
    fn ticks_are_centred_on_line_ends() {
        let seg = DimensionedSegment::new(Point::new(0.0, 0.0), Point::new(0.0, 2.0));
        let g = dimension_geometry(&seg, true, &DimensionStyle::default());
        for (tick, end) in g.ticks.iter().zip([g.line.0, g.line.1]) {
            let mid = Point::new(
                f64::midpoint(tick.0.x, tick.1.x),
                f64::midpoint(tick.0.y, tick.1.y),
            );
            assert!(approx(mid, end));
            assert!((tick.0.distance(tick.1) - 0.1).abs() < 1e-12);
        }
    }

    #[test]
    fn labels_stay_upright() {
        let o = Point::new(0.0, 0.0);
        assert!((label_rotation(o, Point::new(1.0, 0.0))).abs() < 1e-12);
        assert!((label_rotation(Point::new(1.0, 0.0), o)).abs() < 1e-12);
        assert!((label_rotation(o, Point::new(0.0, 1.0)) - 90.0).abs() < 1e-12);
        assert!((label_rotation(o, Point::new(0.0, -1.0)) - 90.0).abs() < 1e-12);
    }

    #[test]
    fn path_data_drops_closing_vertex() {
        let d = build_path_data(rectangle(true).vertices(), |p| (p.x, p.y));
        assert_eq!(d, "M0,0 L4,0 L4,3 L0,3 z");
    }

    #[test]
    fn path_data_of_single_point_is_empty() {
        assert_eq!(build_path_data(&[Point::new(1.0, 1.0)], |p| (p.x, p.y)), "");
        assert_eq!(build_path_data(&[], |p| (p.x, p.y)), "");
    }

    #[test]
    fn svg_has_both_layers() {
        let boundary = rectangle(true);
        let segments = boundary.dimensioned_segments(0.2);
        let svg = to_svg(
            &boundary,
            &segments,
            &DimensionStyle::default(),
            &SvgMetadata::default(),
        );
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"id="BOUNDARY""#));
        assert!(svg.contains(r#"id="DIMENSIONS""#));
        assert_eq!(svg.matches(r#"class="dimension""#).count(), 4);
        assert_eq!(svg.matches("4.00 m").count(), 2);
        assert_eq!(svg.matches("3.00 m").count(), 2);
        assert_eq!(svg.matches("<path").count(), 1);
    }

    #[test]
    fn svg_flips_y() {
        let boundary = rectangle(true);
        let svg = to_svg(
            &boundary,
            &[],
            &DimensionStyle::default(),
            &SvgMetadata::default(),
        );
        // margin = 0.3 + 0.05 + 3 * 0.1 = 0.65; world (0, 0) is the
        // bottom-left corner, at SVG y = 3 + 0.65.
        assert!(svg.contains("M0.65,3.65"), "{svg}");
        assert!(svg.contains(r#"width="106"#), "{svg}");
    }

    #[test]
    fn metadata_is_embedded_and_escaped() {
        let boundary = rectangle(false);
        let meta = SvgMetadata {
            title: Some("scan <1>"),
            description: Some("cell 0.05 & blur 1"),
            config_json: Some(r#"{"cell_size":0.05}"#),
        };
        let svg = to_svg(&boundary, &[], &DimensionStyle::default(), &meta);
        assert!(svg.contains("<title>scan &lt;1&gt;</title>"));
        assert!(svg.contains("cell 0.05 &amp; blur 1"));
        assert!(svg.contains("<floorscan:pipeline"));
    }
}
