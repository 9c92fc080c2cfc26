//! Drawing tools and stroke building.

use crate::element::{
    BrushType, DrawingElement, ElementKind, EraserType, PenType, PencilType, TextStyle,
};
use crate::geometry::DEFAULT_ERASER_SIZE;
use crate::snap::{GRID_SIZE, snap_point};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ToolKind {
    #[default]
    Select,
    Pen,
    Pencil,
    Brush,
    Eraser,
    Rectangle,
    Circle,
    Line,
    Arrow,
    Triangle,
    Diamond,
    Star,
    Heart,
    Hexagon,
    Text,
}

impl ToolKind {
    /// Tools that record every pointer sample.
    pub fn is_freehand(self) -> bool {
        matches!(self, ToolKind::Pen | ToolKind::Pencil | ToolKind::Brush | ToolKind::Eraser)
    }

    /// Tools defined by a start and an end point.
    pub fn is_shape(self) -> bool {
        matches!(
            self,
            ToolKind::Rectangle
                | ToolKind::Circle
                | ToolKind::Line
                | ToolKind::Arrow
                | ToolKind::Triangle
                | ToolKind::Diamond
                | ToolKind::Star
                | ToolKind::Heart
                | ToolKind::Hexagon
        )
    }
}

/// State of a tool interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ToolState {
    /// Waiting for the pointer to go down.
    #[default]
    Idle,
    /// A stroke or shape is being drawn.
    Active {
        start: Point,
        current: Point,
    },
}

/// Style applied to new elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStyle {
    pub color: String,
    pub stroke_width: f64,
    pub opacity: f64,
    pub pen_type: PenType,
    pub pencil_type: PencilType,
    pub brush_type: BrushType,
    pub eraser_type: EraserType,
    pub eraser_size: f64,
    /// Font attributes for new text; the `text` field is ignored.
    pub font: TextStyle,
}

impl Default for ToolStyle {
    fn default() -> Self {
        Self {
            color: DrawingElement::DEFAULT_COLOR.to_string(),
            stroke_width: DrawingElement::DEFAULT_STROKE_WIDTH,
            opacity: 1.0,
            pen_type: PenType::default(),
            pencil_type: PencilType::default(),
            brush_type: BrushType::default(),
            eraser_type: EraserType::default(),
            eraser_size: DEFAULT_ERASER_SIZE,
            font: TextStyle::default(),
        }
    }
}

/// Manages the current tool and the stroke being drawn.
#[derive(Debug, Clone)]
pub struct ToolManager {
    /// Currently selected tool.
    pub current_tool: ToolKind,
    /// Current state of the tool.
    pub state: ToolState,
    /// Style applied to new elements.
    pub style: ToolStyle,
    /// Round pointer positions to the grid.
    pub snap_to_grid: bool,
    pub grid_size: f64,
    /// Points gathered so far for the active stroke.
    path: Vec<Point>,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self {
            current_tool: ToolKind::default(),
            state: ToolState::default(),
            style: ToolStyle::default(),
            snap_to_grid: false,
            grid_size: GRID_SIZE,
            path: Vec::new(),
        }
    }
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch tools, dropping any unfinished stroke.
    pub fn set_tool(&mut self, tool: ToolKind) {
        self.current_tool = tool;
        self.cancel();
    }

    /// Apply grid snapping if enabled.
    pub fn snap(&self, point: Point) -> Point {
        snap_point(point, self.snap_to_grid, self.grid_size)
    }

    /// Begin a stroke at `point`. Returns the (possibly snapped) start point.
    pub fn begin(&mut self, point: Point) -> Point {
        let point = self.snap(point);
        self.path.clear();
        self.path.push(point);
        self.state = ToolState::Active {
            start: point,
            current: point,
        };
        point
    }

    /// Feed a pointer sample into the active stroke.
    ///
    /// Freehand tools append the sample; shape tools keep `[start, current]`.
    pub fn update(&mut self, point: Point) {
        let point = self.snap(point);
        let ToolState::Active { start, current } = &mut self.state else {
            return;
        };
        *current = point;

        if self.current_tool.is_freehand() {
            self.path.push(point);
        } else if self.current_tool.is_shape() {
            self.path = vec![*start, point];
        }
    }

    pub fn cancel(&mut self) {
        self.state = ToolState::Idle;
        self.path.clear();
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ToolState::Active { .. })
    }

    /// Points of the stroke in progress, for live preview.
    pub fn current_path(&self) -> &[Point] {
        &self.path
    }

    /// Element kind the current tool produces, with the configured sub-variant.
    pub fn element_kind(&self) -> Option<ElementKind> {
        let kind = match self.current_tool {
            ToolKind::Select => return None,
            ToolKind::Pen => ElementKind::Pen {
                pen_type: self.style.pen_type,
            },
            ToolKind::Pencil => ElementKind::Pencil {
                pencil_type: self.style.pencil_type,
            },
            ToolKind::Brush => ElementKind::Brush {
                brush_type: self.style.brush_type,
            },
            ToolKind::Eraser => ElementKind::Eraser {
                eraser_type: self.style.eraser_type,
            },
            ToolKind::Rectangle => ElementKind::Rectangle,
            ToolKind::Circle => ElementKind::Circle,
            ToolKind::Line => ElementKind::Line,
            ToolKind::Arrow => ElementKind::Arrow,
            ToolKind::Triangle => ElementKind::Triangle,
            ToolKind::Diamond => ElementKind::Diamond,
            ToolKind::Star => ElementKind::Star,
            ToolKind::Heart => ElementKind::Heart,
            ToolKind::Hexagon => ElementKind::Hexagon,
            ToolKind::Text => ElementKind::Text(self.style.font.clone()),
        };
        Some(kind)
    }

    fn styled(&self, kind: ElementKind, points: Vec<Point>, user_id: &str) -> DrawingElement {
        DrawingElement::new(kind, points, user_id)
            .with_color(self.style.color.clone())
            .with_stroke_width(self.style.stroke_width)
            .with_opacity(self.style.opacity)
    }

    /// End the stroke and build the element to commit.
    ///
    /// Returns `None` for the eraser, for text, and for strokes that do not
    /// have enough points for their kind.
    pub fn finish(&mut self, user_id: &str) -> Option<DrawingElement> {
        if !self.is_active() {
            return None;
        }
        let path = std::mem::take(&mut self.path);
        self.state = ToolState::Idle;

        if matches!(self.current_tool, ToolKind::Eraser | ToolKind::Text) {
            return None;
        }
        let kind = self.element_kind()?;
        if path.len() < kind.min_points() {
            return None;
        }

        let mut element = self.styled(kind, path, user_id);
        element.is_temporary = element.is_laser();
        Some(element)
    }

    /// Empty text element anchored at `point`, ready for editing.
    pub fn text_element(&self, point: Point, user_id: &str) -> DrawingElement {
        let font = TextStyle {
            text: String::new(),
            ..self.style.font.clone()
        };
        self.styled(ElementKind::Text(font), vec![self.snap(point)], user_id)
    }
}
