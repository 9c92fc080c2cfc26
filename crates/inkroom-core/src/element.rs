//! Drawing elements shared between clients and the room authority.
//!
//! An element is one stroke, shape or text box on the canvas. The shape kind is
//! a closed enum so every consumer (hit testing, stroke building, validation)
//! has to handle all of them.

use crate::geometry;
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of an element, unique within a room.
pub type ElementId = String;

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Pen nib.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PenType {
    #[default]
    Ballpoint,
    FeltTip,
    Gel,
    Fountain,
    /// Strokes drawn with the laser nib expire on their own.
    Laser,
}

/// Pencil hardness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PencilType {
    #[default]
    #[serde(rename = "HB")]
    Hb,
    #[serde(rename = "2B")]
    TwoB,
    #[serde(rename = "4B")]
    FourB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushType {
    #[default]
    Watercolor,
    Marker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EraserType {
    #[default]
    Precision,
    Wide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Text payload and font attributes of a text element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    #[serde(default)]
    pub text: String,
    #[serde(default = "TextStyle::default_font_size")]
    pub font_size: f64,
    #[serde(default = "TextStyle::default_font_family")]
    pub font_family: String,
    #[serde(default = "TextStyle::default_font_variant")]
    pub font_weight: String,
    #[serde(default = "TextStyle::default_font_variant")]
    pub font_style: String,
    #[serde(default)]
    pub text_align: TextAlign,
}

impl TextStyle {
    pub const DEFAULT_FONT_SIZE: f64 = 16.0;

    fn default_font_size() -> f64 {
        Self::DEFAULT_FONT_SIZE
    }

    fn default_font_family() -> String {
        "Arial".to_string()
    }

    fn default_font_variant() -> String {
        "normal".to_string()
    }

    /// Create a style carrying `text` with default font attributes.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: Self::default_font_size(),
            font_family: Self::default_font_family(),
            font_weight: Self::default_font_variant(),
            font_style: Self::default_font_variant(),
            text_align: TextAlign::default(),
        }
    }
}

/// The kind of an element, with its kind-specific attributes.
///
/// On the wire this is the `type` tag of the element object plus the
/// sub-variant field (`penType`, `pencilType`, ...) or the text fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementKind {
    Pen {
        #[serde(rename = "penType", default)]
        pen_type: PenType,
    },
    Pencil {
        #[serde(rename = "pencilType", default)]
        pencil_type: PencilType,
    },
    Brush {
        #[serde(rename = "brushType", default)]
        brush_type: BrushType,
    },
    Eraser {
        #[serde(rename = "eraserType", default)]
        eraser_type: EraserType,
    },
    Rectangle,
    Circle,
    Line,
    Arrow,
    Triangle,
    Diamond,
    Star,
    Heart,
    Hexagon,
    Text(TextStyle),
}

impl ElementKind {
    /// Wire name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Pen { .. } => "pen",
            ElementKind::Pencil { .. } => "pencil",
            ElementKind::Brush { .. } => "brush",
            ElementKind::Eraser { .. } => "eraser",
            ElementKind::Rectangle => "rectangle",
            ElementKind::Circle => "circle",
            ElementKind::Line => "line",
            ElementKind::Arrow => "arrow",
            ElementKind::Triangle => "triangle",
            ElementKind::Diamond => "diamond",
            ElementKind::Star => "star",
            ElementKind::Heart => "heart",
            ElementKind::Hexagon => "hexagon",
            ElementKind::Text(_) => "text",
        }
    }

    /// Sampled polyline kinds.
    pub fn is_freehand(&self) -> bool {
        matches!(
            self,
            ElementKind::Pen { .. }
                | ElementKind::Pencil { .. }
                | ElementKind::Brush { .. }
                | ElementKind::Eraser { .. }
        )
    }

    /// Minimum number of points a committed element of this kind carries.
    ///
    /// Parametric shapes are defined by a start and an end corner; freehand
    /// strokes and text need a single point.
    pub fn min_points(&self) -> usize {
        match self {
            ElementKind::Pen { .. }
            | ElementKind::Pencil { .. }
            | ElementKind::Brush { .. }
            | ElementKind::Eraser { .. }
            | ElementKind::Text(_) => 1,
            ElementKind::Rectangle
            | ElementKind::Circle
            | ElementKind::Line
            | ElementKind::Arrow
            | ElementKind::Triangle
            | ElementKind::Diamond
            | ElementKind::Star
            | ElementKind::Heart
            | ElementKind::Hexagon => 2,
        }
    }
}

/// Reasons an element is rejected before it is stored or broadcast.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElementError {
    #[error("element id is empty")]
    MissingId,
    #[error("{kind} element {id} needs at least {required} point(s), got {actual}")]
    TooFewPoints {
        id: ElementId,
        kind: &'static str,
        required: usize,
        actual: usize,
    },
    #[error("element {0} has a non-finite coordinate")]
    NonFinitePoint(ElementId),
    #[error("element {id} has invalid stroke width {width}")]
    InvalidStrokeWidth { id: ElementId, width: f64 },
    #[error("element {id} has opacity {opacity} outside [0, 1]")]
    InvalidOpacity { id: ElementId, opacity: f64 },
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_opacity() -> f64 {
    1.0
}

/// One drawable object on the shared canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingElement {
    pub id: ElementId,
    #[serde(flatten)]
    pub kind: ElementKind,
    /// Polyline samples, `[start, end]` corners, or the text anchor.
    pub points: Vec<Point>,
    pub color: String,
    pub stroke_width: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub updated: u64,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_temporary: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_selected: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_dragging: bool,
}

impl DrawingElement {
    pub const DEFAULT_COLOR: &'static str = "#000000";
    pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;

    /// Create an element with a fresh id and default style.
    pub fn new(kind: ElementKind, points: Vec<Point>, user_id: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            points,
            color: Self::DEFAULT_COLOR.to_string(),
            stroke_width: Self::DEFAULT_STROKE_WIDTH,
            opacity: 1.0,
            created: now,
            updated: now,
            user_id: user_id.into(),
            is_temporary: false,
            is_selected: false,
            is_dragging: false,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_stroke_width(mut self, width: f64) -> Self {
        self.stroke_width = width;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    /// Whether this is a laser-pointer stroke.
    pub fn is_laser(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Pen {
                pen_type: PenType::Laser
            }
        )
    }

    /// Text payload, for text elements.
    pub fn text(&self) -> Option<&TextStyle> {
        match &self.kind {
            ElementKind::Text(style) => Some(style),
            _ => None,
        }
    }

    /// Bounding box of the defining points.
    pub fn bounds(&self) -> Option<Rect> {
        geometry::bounding_box(&self.points)
    }

    /// Hit test with an explicit tolerance.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        geometry::hit_test(self, point, tolerance)
    }

    /// Hit test with the stroke-derived tolerance.
    pub fn contains_point(&self, point: Point) -> bool {
        self.hit_test(point, geometry::default_tolerance(self.stroke_width))
    }

    /// Translate every point by `delta` and stamp the update time.
    pub fn translate(&mut self, delta: Vec2) {
        for point in &mut self.points {
            *point += delta;
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated = now_ms();
    }

    /// Copy with the local selection and drag flags cleared, as sent to peers.
    pub fn to_wire(&self) -> Self {
        let mut element = self.clone();
        element.is_selected = false;
        element.is_dragging = false;
        element
    }

    /// Check the invariants a committed element must satisfy.
    pub fn validate(&self) -> Result<(), ElementError> {
        if self.id.is_empty() {
            return Err(ElementError::MissingId);
        }
        let required = self.kind.min_points();
        if self.points.len() < required {
            return Err(ElementError::TooFewPoints {
                id: self.id.clone(),
                kind: self.kind.name(),
                required,
                actual: self.points.len(),
            });
        }
        if self.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ElementError::NonFinitePoint(self.id.clone()));
        }
        if !(self.stroke_width.is_finite() && self.stroke_width > 0.0) {
            return Err(ElementError::InvalidStrokeWidth {
                id: self.id.clone(),
                width: self.stroke_width,
            });
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(ElementError::InvalidOpacity {
                id: self.id.clone(),
                opacity: self.opacity,
            });
        }
        Ok(())
    }
}
