//! Hit testing and geometric helpers.

use crate::element::{DrawingElement, ElementKind};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Smallest tolerance used for pointer hit tests, in canvas units.
pub const MIN_HIT_TOLERANCE: f64 = 10.0;

/// Approximate glyph advance as a fraction of the font size.
pub const TEXT_WIDTH_FACTOR: f64 = 0.6;

/// Pressure assumed when the input device reports none.
pub const DEFAULT_PRESSURE: f64 = 0.5;

/// Default eraser diameter.
pub const DEFAULT_ERASER_SIZE: f64 = 10.0;

/// Drawable area of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasBounds {
    pub width: f64,
    pub height: f64,
}

impl Default for CanvasBounds {
    fn default() -> Self {
        Self {
            width: 3000.0,
            height: 3000.0,
        }
    }
}

impl CanvasBounds {
    /// Inclusive containment test.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= 0.0 && point.x <= self.width && point.y >= 0.0 && point.y <= self.height
    }
}

/// Whether a drag released at `point` should be committed.
pub fn is_valid_drop_zone(point: Point, bounds: CanvasBounds) -> bool {
    bounds.contains(point)
}

/// Distance from a point to a line segment.
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let ap = point - a;
    let len_sq = ab.hypot2();

    if len_sq < f64::EPSILON {
        return ap.hypot();
    }

    let t = (ap.dot(ab) / len_sq).clamp(0.0, 1.0);
    let projection = a + ab * t;
    (point - projection).hypot()
}

/// Distance from a point to the nearest segment of a polyline.
///
/// Returns `f64::INFINITY` for polylines with fewer than two points.
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| point_to_segment_dist(point, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Axis-aligned bounds of a set of points.
pub fn bounding_box(points: &[Point]) -> Option<Rect> {
    let first = points.first()?;
    let rect = points
        .iter()
        .skip(1)
        .fold(Rect::from_points(*first, *first), |rect, p| rect.union_pt(*p));
    Some(rect)
}

/// Tolerance used when selecting an element with the pointer.
pub fn default_tolerance(stroke_width: f64) -> f64 {
    stroke_width.max(MIN_HIT_TOLERANCE)
}

/// Tolerance of an eraser sample for the given diameter and pressure.
pub fn eraser_tolerance(eraser_size: f64, pressure: Option<f64>) -> f64 {
    let pressure = pressure.unwrap_or(DEFAULT_PRESSURE);
    eraser_size * (0.8 + pressure * 0.4) / 2.0
}

fn within_inflated(rect: Rect, point: Point, tolerance: f64) -> bool {
    point.x >= rect.x0 - tolerance
        && point.x <= rect.x1 + tolerance
        && point.y >= rect.y0 - tolerance
        && point.y <= rect.y1 + tolerance
}

/// Whether `point` lies within `tolerance` of `element`.
///
/// Outlined circles are hit only near their ring. Filled shapes (rectangle
/// and the polygon family, approximated by their bounds) are hit anywhere in
/// their inflated box.
pub fn hit_test(element: &DrawingElement, point: Point, tolerance: f64) -> bool {
    let points = &element.points;
    if points.is_empty() {
        return false;
    }

    match &element.kind {
        ElementKind::Pen { .. }
        | ElementKind::Pencil { .. }
        | ElementKind::Brush { .. }
        | ElementKind::Eraser { .. } => point_to_polyline_dist(point, points) <= tolerance,
        ElementKind::Rectangle => {
            points.len() >= 2
                && within_inflated(Rect::from_points(points[0], points[1]), point, tolerance)
        }
        ElementKind::Circle => {
            if points.len() < 2 {
                return false;
            }
            let center = points[0];
            let radius = (points[1] - center).hypot();
            let dist = (point - center).hypot();
            (dist - radius).abs() <= tolerance
        }
        ElementKind::Line | ElementKind::Arrow => {
            points.len() >= 2 && point_to_segment_dist(point, points[0], points[1]) <= tolerance
        }
        ElementKind::Triangle
        | ElementKind::Diamond
        | ElementKind::Star
        | ElementKind::Heart
        | ElementKind::Hexagon => bounding_box(points)
            .is_some_and(|rect| within_inflated(rect, point, tolerance)),
        ElementKind::Text(style) => {
            if style.text.is_empty() {
                return false;
            }
            let anchor = points[0];
            let width = style.text.chars().count() as f64 * style.font_size * TEXT_WIDTH_FACTOR;
            let rect = Rect::new(anchor.x, anchor.y - style.font_size, anchor.x + width, anchor.y);
            within_inflated(rect, point, tolerance)
        }
    }
}
