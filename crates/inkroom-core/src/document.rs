//! The local element collection with undo/redo history.

use crate::element::{DrawingElement, ElementId, ElementKind};
use crate::geometry::CanvasBounds;
use crate::selection::DragState;
use kurbo::{Point, Vec2};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long laser strokes stay on the canvas after the last one was drawn.
pub const LASER_TIMEOUT: Duration = Duration::from_secs(2);

/// A full copy of the element collection.
pub type Snapshot = Vec<DrawingElement>;

/// Past and future snapshots around the current element collection.
///
/// `present` is the live collection; every mutation goes through it.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub(crate) past: Vec<Snapshot>,
    pub(crate) present: Snapshot,
    pub(crate) future: VecDeque<Snapshot>,
}

impl History {
    /// Snapshots that `undo` can restore, oldest first.
    pub fn past(&self) -> &[Snapshot] {
        &self.past
    }

    pub fn present(&self) -> &[DrawingElement] {
        &self.present
    }

    /// Snapshots that `redo` can restore, nearest first.
    pub fn future(&self) -> impl Iterator<Item = &Snapshot> {
        self.future.iter()
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Push the current collection as a new past entry and drop the redo branch.
    fn checkpoint(&mut self) {
        self.past.push(self.present.clone());
        self.future.clear();
    }
}

/// Client-side document: elements, history, selection and transient edit state.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    pub(crate) history: History,
    /// Selected ids in selection order.
    pub(crate) selection: Vec<ElementId>,
    pub(crate) editing_text: Option<ElementId>,
    pub(crate) drag: Option<DragState>,
    pub(crate) bounds: CanvasBounds,
    laser_deadline: Option<Instant>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(bounds: CanvasBounds) -> Self {
        Self {
            bounds,
            ..Self::default()
        }
    }

    pub fn bounds(&self) -> CanvasBounds {
        self.bounds
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Elements in z-order (back to front).
    pub fn elements(&self) -> &[DrawingElement] {
        &self.history.present
    }

    pub fn get(&self, id: &str) -> Option<&DrawingElement> {
        self.history.present.iter().find(|e| e.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut DrawingElement> {
        self.history.present.iter_mut().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.history.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.present.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Append an element on top of the z-order. Undoable.
    ///
    /// Temporary elements (re)arm the laser expiry timer.
    pub fn add_element(&mut self, element: DrawingElement) {
        let temporary = element.is_temporary;
        self.history.checkpoint();
        self.history.present.push(element);
        if temporary {
            self.schedule_laser_expiry(Instant::now());
        }
    }

    /// Replace an element in place, keeping its z-position.
    ///
    /// Not recorded in history. The local selection and drag flags of the
    /// replaced element survive. Returns false if the id is unknown.
    pub fn update_element(&mut self, element: DrawingElement) -> bool {
        match self.get_mut(&element.id) {
            Some(slot) => {
                let (selected, dragging) = (slot.is_selected, slot.is_dragging);
                *slot = element;
                slot.is_selected = selected;
                slot.is_dragging = dragging;
                true
            }
            None => false,
        }
    }

    /// Remove an element. Undoable. Returns false if the id is unknown.
    pub fn delete_element(&mut self, id: &str) -> bool {
        let Some(index) = self.history.present.iter().position(|e| e.id == id) else {
            return false;
        };
        self.history.checkpoint();
        self.history.present.remove(index);
        self.selection.retain(|s| s != id);
        if self.editing_text.as_deref() == Some(id) {
            self.editing_text = None;
        }
        true
    }

    /// Translate every selected element by `delta` as one undoable step.
    ///
    /// Returns the moved elements.
    pub fn move_selected(&mut self, delta: Vec2) -> Vec<DrawingElement> {
        if self.selection.is_empty() {
            return Vec::new();
        }
        self.history.checkpoint();
        let selection = &self.selection;
        let mut moved = Vec::with_capacity(selection.len());
        for element in self
            .history
            .present
            .iter_mut()
            .filter(|e| selection.contains(&e.id))
        {
            element.translate(delta);
            moved.push(element.clone());
        }
        moved
    }

    /// Replace the whole collection with an authoritative batch.
    ///
    /// History stacks are left untouched; selection and edit state are reset.
    pub fn set_elements(&mut self, elements: Vec<DrawingElement>) {
        self.history.present = elements;
        self.reset_transient_state();
        self.arm_for_restored_lasers();
    }

    /// Restore the previous snapshot. Returns false if there is none.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.past.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.history.present, previous);
        self.history.future.push_front(current);
        self.reset_transient_state();
        self.arm_for_restored_lasers();
        true
    }

    /// Re-apply the most recently undone snapshot. Returns false if there is none.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.history.future.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.history.present, next);
        self.history.past.push(current);
        self.reset_transient_state();
        self.arm_for_restored_lasers();
        true
    }

    /// A collection swapped in wholesale may bring lasers back; they expire again.
    fn arm_for_restored_lasers(&mut self) {
        if self.history.present.iter().any(|e| e.is_temporary) {
            self.schedule_laser_expiry(Instant::now());
        }
    }

    fn reset_transient_state(&mut self) {
        self.selection.clear();
        self.drag = None;
        self.editing_text = None;
        for element in &mut self.history.present {
            element.is_selected = false;
            element.is_dragging = false;
        }
    }

    /// Topmost element under `point`, using each element's default tolerance.
    pub fn element_at(&self, point: Point) -> Option<&DrawingElement> {
        self.history
            .present
            .iter()
            .rev()
            .find(|e| e.contains_point(point))
    }

    /// All elements within `tolerance` of `point`, front to back.
    pub fn elements_at(&self, point: Point, tolerance: f64) -> Vec<ElementId> {
        self.history
            .present
            .iter()
            .rev()
            .filter(|e| e.hit_test(point, tolerance))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Delete every element within `tolerance` of `point`.
    ///
    /// Each deletion is its own undo step. Returns the deleted ids.
    pub fn erase_at(&mut self, point: Point, tolerance: f64) -> Vec<ElementId> {
        let hits: Vec<ElementId> = self
            .history
            .present
            .iter()
            .filter(|e| e.hit_test(point, tolerance))
            .map(|e| e.id.clone())
            .collect();
        hits.into_iter().filter(|id| self.delete_element(id)).collect()
    }

    /// Enter text editing for an existing text element.
    pub fn begin_text_edit(&mut self, id: &str) -> bool {
        match self.get(id) {
            Some(element) if matches!(element.kind, ElementKind::Text(_)) => {
                self.editing_text = Some(id.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn editing_text(&self) -> Option<&str> {
        self.editing_text.as_deref()
    }

    /// Leave text editing. A text element left blank is deleted and its id returned.
    pub fn end_text_edit(&mut self) -> Option<ElementId> {
        let id = self.editing_text.take()?;
        let blank = self
            .get(&id)
            .and_then(DrawingElement::text)
            .is_some_and(|style| style.text.trim().is_empty());
        if blank && self.delete_element(&id) {
            Some(id)
        } else {
            None
        }
    }

    /// Arm (or re-arm) the laser expiry timer relative to `now`.
    pub fn schedule_laser_expiry(&mut self, now: Instant) {
        self.laser_deadline = Some(now + LASER_TIMEOUT);
    }

    pub fn laser_deadline(&self) -> Option<Instant> {
        self.laser_deadline
    }

    /// Drop temporary elements once the laser timer has fired.
    ///
    /// Not recorded in history. Returns the removed ids.
    pub fn expire_temporary(&mut self, now: Instant) -> Vec<ElementId> {
        match self.laser_deadline {
            Some(deadline) if now >= deadline => {}
            _ => return Vec::new(),
        }
        self.laser_deadline = None;

        let mut removed = Vec::new();
        self.history.present.retain(|e| {
            if e.is_temporary {
                removed.push(e.id.clone());
                false
            } else {
                true
            }
        });
        self.selection.retain(|id| !removed.contains(id));
        if !removed.is_empty() {
            log::debug!("expired {} temporary element(s)", removed.len());
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{PenType, TextStyle};

    fn rect(x: f64, y: f64) -> DrawingElement {
        DrawingElement::new(
            ElementKind::Rectangle,
            vec![Point::new(x, y), Point::new(x + 50.0, y + 50.0)],
            "alice",
        )
    }

    fn laser() -> DrawingElement {
        let mut element = DrawingElement::new(
            ElementKind::Pen {
                pen_type: PenType::Laser,
            },
            vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)],
            "alice",
        );
        element.is_temporary = true;
        element
    }

    #[test]
    fn test_add_pushes_history_and_clears_future() {
        let mut doc = DocumentStore::new();
        doc.add_element(rect(0.0, 0.0));
        doc.add_element(rect(100.0, 0.0));
        assert_eq!(doc.history().past().len(), 2);

        assert!(doc.undo());
        assert!(doc.can_redo());
        doc.add_element(rect(200.0, 0.0));
        assert!(!doc.can_redo());
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_update_does_not_touch_history() {
        let mut doc = DocumentStore::new();
        let mut element = rect(0.0, 0.0);
        doc.add_element(element.clone());
        element.color = "#ff0000".to_string();

        assert!(doc.update_element(element.clone()));
        assert_eq!(doc.history().past().len(), 1);
        assert_eq!(doc.get(&element.id).unwrap().color, "#ff0000");
        assert_eq!(doc.history().present(), doc.elements());
    }

    #[test]
    fn test_update_unknown_is_noop() {
        let mut doc = DocumentStore::new();
        doc.add_element(rect(0.0, 0.0));
        assert!(!doc.update_element(rect(10.0, 10.0)));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_delete_unknown_does_not_record() {
        let mut doc = DocumentStore::new();
        assert!(!doc.delete_element("missing"));
        assert!(!doc.can_undo());
    }

    #[test]
    fn test_undo_then_redo_restores_collection() {
        let mut doc = DocumentStore::new();
        let first = rect(0.0, 0.0);
        doc.add_element(first.clone());
        doc.add_element(rect(100.0, 100.0));
        doc.select(&[first.id.clone()], false);
        let before: Vec<DrawingElement> = doc.elements().iter().map(|e| e.to_wire()).collect();

        assert!(doc.undo());
        assert_eq!(doc.len(), 1);
        assert!(doc.redo());
        assert_eq!(doc.elements(), before.as_slice());
        assert!(doc.selected_ids().is_empty());
        assert!(doc.elements().iter().all(|e| !e.is_selected && !e.is_dragging));
    }

    #[test]
    fn test_undo_redo_on_empty_history() {
        let mut doc = DocumentStore::new();
        assert!(!doc.undo());
        assert!(!doc.redo());
    }

    #[test]
    fn test_set_elements_keeps_history() {
        let mut doc = DocumentStore::new();
        doc.add_element(rect(0.0, 0.0));
        doc.set_elements(vec![rect(5.0, 5.0), rect(60.0, 60.0)]);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.history().past().len(), 1);
    }

    #[test]
    fn test_element_at_prefers_topmost() {
        let mut doc = DocumentStore::new();
        let bottom = rect(0.0, 0.0);
        let top = rect(20.0, 20.0);
        doc.add_element(bottom.clone());
        doc.add_element(top.clone());

        assert_eq!(doc.element_at(Point::new(30.0, 30.0)).unwrap().id, top.id);
        assert_eq!(doc.element_at(Point::new(5.0, 5.0)).unwrap().id, bottom.id);
        assert!(doc.element_at(Point::new(500.0, 500.0)).is_none());
        assert_eq!(doc.elements_at(Point::new(30.0, 30.0), 0.0), vec![top.id, bottom.id]);
    }

    #[test]
    fn test_erase_deletes_each_hit_separately() {
        let mut doc = DocumentStore::new();
        doc.add_element(rect(0.0, 0.0));
        doc.add_element(rect(10.0, 10.0));
        doc.add_element(rect(500.0, 500.0));
        let depth = doc.history().past().len();

        let erased = doc.erase_at(Point::new(25.0, 25.0), 5.0);
        assert_eq!(erased.len(), 2);
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.history().past().len(), depth + 2);
    }

    #[test]
    fn test_erase_miss_is_noop() {
        let mut doc = DocumentStore::new();
        doc.add_element(rect(0.0, 0.0));
        let depth = doc.history().past().len();
        assert!(doc.erase_at(Point::new(900.0, 900.0), 5.0).is_empty());
        assert_eq!(doc.history().past().len(), depth);
    }

    #[test]
    fn test_laser_expires_after_timeout() {
        let mut doc = DocumentStore::new();
        doc.add_element(rect(0.0, 0.0));
        doc.add_element(laser());
        let depth = doc.history().past().len();
        let armed = doc.laser_deadline().unwrap();
        let start = armed - LASER_TIMEOUT;

        assert!(doc.expire_temporary(start + Duration::from_millis(1500)).is_empty());
        assert_eq!(doc.len(), 2);

        let removed = doc.expire_temporary(start + Duration::from_millis(2500));
        assert_eq!(removed.len(), 1);
        assert_eq!(doc.len(), 1);
        assert!(doc.elements().iter().all(|e| !e.is_temporary));
        assert_eq!(doc.history().past().len(), depth);
        assert!(!doc.can_redo());
    }

    #[test]
    fn test_new_laser_resets_timer() {
        let mut doc = DocumentStore::new();
        let t0 = Instant::now();
        doc.add_element(laser());
        doc.schedule_laser_expiry(t0);
        doc.schedule_laser_expiry(t0 + Duration::from_secs(1));

        assert!(doc.expire_temporary(t0 + Duration::from_millis(2500)).is_empty());
        assert_eq!(doc.expire_temporary(t0 + Duration::from_secs(3)).len(), 1);
    }

    #[test]
    fn test_end_text_edit_removes_blank_text() {
        let mut doc = DocumentStore::new();
        let text = DrawingElement::new(
            ElementKind::Text(TextStyle::with_text("  ")),
            vec![Point::new(10.0, 10.0)],
            "alice",
        );
        doc.add_element(text.clone());
        assert!(doc.begin_text_edit(&text.id));
        assert_eq!(doc.editing_text(), Some(text.id.as_str()));

        assert_eq!(doc.end_text_edit(), Some(text.id));
        assert!(doc.is_empty());
        assert!(doc.editing_text().is_none());
    }

    #[test]
    fn test_end_text_edit_keeps_written_text() {
        let mut doc = DocumentStore::new();
        let text = DrawingElement::new(
            ElementKind::Text(TextStyle::with_text("note")),
            vec![Point::new(10.0, 10.0)],
            "alice",
        );
        doc.add_element(text.clone());
        doc.begin_text_edit(&text.id);
        assert_eq!(doc.end_text_edit(), None);
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_undo_brings_back_laser_with_timer() {
        let mut doc = DocumentStore::new();
        doc.add_element(laser());
        doc.add_element(rect(100.0, 100.0));
        let deadline = doc.laser_deadline().unwrap();
        assert_eq!(doc.expire_temporary(deadline).len(), 1);
        assert!(doc.laser_deadline().is_none());

        // Before the rectangle, the laser was still there.
        assert!(doc.undo());
        assert!(doc.elements().iter().any(|e| e.is_temporary));
        let rearmed = doc.laser_deadline().expect("undo should re-arm the laser timer");
        assert_eq!(doc.expire_temporary(rearmed).len(), 1);
        assert!(doc.is_empty());
    }

    #[test]
    fn test_redo_brings_back_laser_with_timer() {
        let mut doc = DocumentStore::new();
        doc.add_element(laser());
        let deadline = doc.laser_deadline().unwrap();
        assert!(doc.undo());
        assert!(doc.expire_temporary(deadline).is_empty());

        assert!(doc.redo());
        assert_eq!(doc.len(), 1);
        let rearmed = doc.laser_deadline().unwrap();
        assert_eq!(doc.expire_temporary(rearmed).len(), 1);
        assert!(doc.is_empty());
    }

    #[test]
    fn test_undo_without_lasers_leaves_timer_alone() {
        let mut doc = DocumentStore::new();
        doc.add_element(rect(0.0, 0.0));
        doc.add_element(rect(100.0, 0.0));
        assert!(doc.undo());
        assert!(doc.laser_deadline().is_none());
    }

    #[test]
    fn test_remote_update_keeps_selection_flag() {
        let mut doc = DocumentStore::new();
        let a = rect(0.0, 0.0);
        doc.add_element(a.clone());
        doc.select(&[a.id.clone()], false);

        let mut incoming = a.to_wire();
        incoming.color = "#00ff00".to_string();
        assert!(doc.update_element(incoming));

        let stored = doc.get(&a.id).unwrap();
        assert_eq!(stored.color, "#00ff00");
        assert!(stored.is_selected);
        assert_eq!(doc.selected_ids(), &[a.id.clone()]);
    }

    #[test]
    fn test_remote_update_during_drag_keeps_drag_flag() {
        let mut doc = DocumentStore::new();
        let a = rect(0.0, 0.0);
        doc.add_element(a.clone());
        doc.select(&[a.id.clone()], false);
        assert!(doc.start_drag(Point::new(10.0, 10.0)));

        let mut incoming = a.to_wire();
        incoming.stroke_width = 6.0;
        assert!(doc.update_element(incoming));
        assert!(doc.get(&a.id).unwrap().is_dragging);

        let moved = doc.commit_drag(Point::new(30.0, 10.0));
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].stroke_width, 6.0);
        assert_eq!(moved[0].points[0], Point::new(20.0, 0.0));
        let stored = doc.get(&a.id).unwrap();
        assert!(stored.is_selected);
        assert!(!stored.is_dragging);
    }

    #[test]
    fn test_begin_text_edit_rejects_shapes() {
        let mut doc = DocumentStore::new();
        let shape = rect(0.0, 0.0);
        doc.add_element(shape.clone());
        assert!(!doc.begin_text_edit(&shape.id));
    }
}
