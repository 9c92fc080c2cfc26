//! Selection and drag-to-move on top of [`DocumentStore`].

use crate::document::DocumentStore;
use crate::element::{DrawingElement, ElementId};
use crate::geometry::is_valid_drop_zone;
use kurbo::{Point, Vec2};

/// An in-progress drag of the current selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragState {
    /// Pointer position when the drag started.
    pub start: Point,
    /// Pointer position relative to the top-left of the first selected element.
    pub offset: Vec2,
    /// Translation shown while dragging, if the pointer has moved.
    pub preview: Option<Vec2>,
}

impl DocumentStore {
    /// Selected ids in selection order.
    pub fn selected_ids(&self) -> &[ElementId] {
        &self.selection
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.iter().any(|s| s == id)
    }

    pub fn has_selection(&self) -> bool {
        !self.selection.is_empty()
    }

    pub fn selected_elements(&self) -> Vec<&DrawingElement> {
        self.selection.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.end_transient_edit();
        self.sync_selection_flags();
    }

    /// Select the topmost element under `point`.
    ///
    /// With `multi` the hit is toggled in the existing selection; otherwise it
    /// replaces it. A miss without `multi` clears the selection. Returns the
    /// hit id, if any.
    pub fn select_at(&mut self, point: Point, multi: bool) -> Option<ElementId> {
        let hit = self.element_at(point).map(|e| e.id.clone());
        self.end_transient_edit();

        match (&hit, multi) {
            (Some(id), true) => {
                if let Some(index) = self.selection.iter().position(|s| s == id) {
                    self.selection.remove(index);
                } else {
                    self.selection.push(id.clone());
                }
            }
            (Some(id), false) => {
                self.selection = vec![id.clone()];
            }
            (None, true) => {}
            (None, false) => self.selection.clear(),
        }

        self.sync_selection_flags();
        hit
    }

    /// Select `ids` explicitly. With `multi` each id is toggled; otherwise the
    /// selection is replaced. Unknown ids are ignored.
    pub fn select(&mut self, ids: &[ElementId], multi: bool) {
        self.end_transient_edit();
        if !multi {
            self.selection.clear();
        }
        let known: Vec<&ElementId> = ids.iter().filter(|id| self.get(id).is_some()).collect();
        for id in known {
            match self.selection.iter().position(|s| s == id) {
                Some(index) if multi => {
                    self.selection.remove(index);
                }
                Some(_) => {}
                None => self.selection.push(id.clone()),
            }
        }
        self.sync_selection_flags();
    }

    // Selecting ends text editing and any drag in progress.
    fn end_transient_edit(&mut self) {
        self.editing_text = None;
        self.drag = None;
        for element in &mut self.history.present {
            element.is_dragging = false;
        }
    }

    fn sync_selection_flags(&mut self) {
        let selection = &self.selection;
        for element in &mut self.history.present {
            element.is_selected = selection.contains(&element.id);
        }
    }

    pub fn drag(&self) -> Option<&DragState> {
        self.drag.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Start dragging the selection from `point`. Returns false with nothing selected.
    pub fn start_drag(&mut self, point: Point) -> bool {
        let Some(anchor) = self
            .selection
            .first()
            .and_then(|id| self.get(id))
            .and_then(DrawingElement::bounds)
        else {
            return false;
        };

        self.drag = Some(DragState {
            start: point,
            offset: point - anchor.origin(),
            preview: None,
        });
        let selection = &self.selection;
        for element in &mut self.history.present {
            element.is_dragging = selection.contains(&element.id);
        }
        true
    }

    /// Update the preview translation. The collection is not modified.
    pub fn update_drag(&mut self, point: Point) -> Option<Vec2> {
        let drag = self.drag.as_mut()?;
        let delta = point - drag.start;
        drag.preview = Some(delta);
        Some(delta)
    }

    /// Finish the drag at `point`.
    ///
    /// Inside the canvas the selection moves by `point - start` as one undoable
    /// step and the moved elements are returned. Outside, nothing moves. Drag
    /// flags are cleared either way.
    pub fn commit_drag(&mut self, point: Point) -> Vec<DrawingElement> {
        let Some(drag) = self.drag.take() else {
            return Vec::new();
        };

        let moved = if is_valid_drop_zone(point, self.bounds) {
            self.move_selected(point - drag.start)
        } else {
            log::debug!("drop at ({}, {}) outside canvas, drag cancelled", point.x, point.y);
            Vec::new()
        };

        for element in &mut self.history.present {
            element.is_dragging = false;
        }
        moved.iter().map(DrawingElement::to_wire).collect()
    }

    /// Abandon the drag without moving anything.
    pub fn cancel_drag(&mut self) {
        self.drag = None;
        for element in &mut self.history.present {
            element.is_dragging = false;
        }
    }
}
