//! Scrub bar interaction
//!
//! Pointer-down inside the bar starts a drag and hands out a [`PointerGrab`].
//! While the grab is held every move seeks immediately and the bar shows the
//! local drag position instead of the externally reported progress. Releasing
//! the grab ends the drag and reverts to external progress.

use crate::playback::clamp_fraction;

/// Bar bounds in window pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BarRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BarRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }

    /// Fraction of the bar at window x-coordinate `x`, clamped to `[0, 1]`
    pub fn fraction_at(&self, x: f64) -> f64 {
        if self.width <= 0.0 {
            return 0.0;
        }
        clamp_fraction((x - self.left) / self.width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Dragging { position: f64 },
}

/// Exclusive claim on pointer input for the duration of a drag.
///
/// Moves are only routed to the bar while the caller holds this; it is given
/// back through [`ProgressBar::pointer_up`] or [`ProgressBar::cancel`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the grab leaves the bar dragging until cancel or pointer-up"]
pub struct PointerGrab {
    id: u64,
}

#[derive(Debug)]
pub struct ProgressBar {
    rect: BarRect,
    state: DragState,
    active_grab: Option<u64>,
    next_grab: u64,
}

impl ProgressBar {
    pub fn new(rect: BarRect) -> Self {
        Self {
            rect,
            state: DragState::Idle,
            active_grab: None,
            next_grab: 0,
        }
    }

    pub fn rect(&self) -> BarRect {
        self.rect
    }

    pub fn set_rect(&mut self, rect: BarRect) {
        self.rect = rect;
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Start a drag if `(x, y)` hits the bar; seeks to the pressed position
    pub fn pointer_down(&mut self, x: f64, y: f64, mut seek: impl FnMut(f64)) -> Option<PointerGrab> {
        if self.is_dragging() || !self.rect.contains(x, y) {
            return None;
        }

        let position = self.rect.fraction_at(x);
        self.state = DragState::Dragging { position };
        seek(position);

        let id = self.next_grab;
        self.next_grab += 1;
        self.active_grab = Some(id);
        Some(PointerGrab { id })
    }

    /// Track the pointer anywhere in the window while `grab` is held
    pub fn pointer_move(&mut self, grab: &PointerGrab, x: f64, mut seek: impl FnMut(f64)) {
        if self.active_grab != Some(grab.id) {
            return;
        }
        let position = self.rect.fraction_at(x);
        self.state = DragState::Dragging { position };
        seek(position);
    }

    /// End the drag and drop the local position
    pub fn pointer_up(&mut self, grab: PointerGrab) {
        self.release(grab);
    }

    /// Abandon the drag without a final pointer-up (focus lost, window closed)
    pub fn cancel(&mut self, grab: PointerGrab) {
        self.release(grab);
    }

    fn release(&mut self, grab: PointerGrab) {
        if self.active_grab == Some(grab.id) {
            self.active_grab = None;
            self.state = DragState::Idle;
        }
    }

    /// Fraction to draw: the drag position while dragging, else `external`
    pub fn display_fraction(&self, external: f64) -> f64 {
        match self.state {
            DragState::Dragging { position } => position,
            DragState::Idle => clamp_fraction(external),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar() -> ProgressBar {
        ProgressBar::new(BarRect::new(100.0, 500.0, 200.0, 20.0))
    }

    #[test]
    fn test_fraction_is_clamped() {
        let rect = BarRect::new(100.0, 0.0, 200.0, 10.0);
        assert_eq!(rect.fraction_at(150.0), 0.25);
        assert_eq!(rect.fraction_at(50.0), 0.0);
        assert_eq!(rect.fraction_at(400.0), 1.0);
    }

    #[test]
    fn test_zero_width_yields_zero() {
        let rect = BarRect::new(10.0, 0.0, 0.0, 10.0);
        assert_eq!(rect.fraction_at(10.0), 0.0);
        assert_eq!(rect.fraction_at(99.0), 0.0);
    }

    #[test]
    fn test_drag_seeks_on_every_move() {
        let mut bar = bar();
        let mut seeks = Vec::new();

        let grab = bar.pointer_down(200.0, 510.0, |f| seeks.push(f)).unwrap();
        bar.pointer_move(&grab, 250.0, |f| seeks.push(f));
        // Outside the bar, still tracked
        bar.pointer_move(&grab, 900.0, |f| seeks.push(f));
        bar.pointer_move(&grab, 0.0, |f| seeks.push(f));

        assert_eq!(seeks, vec![0.5, 0.75, 1.0, 0.0]);
        assert_eq!(bar.state(), DragState::Dragging { position: 0.0 });
    }

    #[test]
    fn test_drag_position_shown_until_release() {
        let mut bar = bar();
        let grab = bar.pointer_down(150.0, 505.0, |_| {}).unwrap();
        assert_eq!(bar.display_fraction(0.9), 0.25);

        bar.pointer_up(grab);
        assert!(!bar.is_dragging());
        assert_eq!(bar.display_fraction(0.9), 0.9);
    }

    #[test]
    fn test_press_outside_is_ignored() {
        let mut bar = bar();
        let mut seeks = 0;
        assert!(bar.pointer_down(150.0, 100.0, |_| seeks += 1).is_none());
        assert_eq!(seeks, 0);
        assert_eq!(bar.state(), DragState::Idle);
    }

    #[test]
    fn test_stale_grab_has_no_effect() {
        let mut bar = bar();
        let first = bar.pointer_down(150.0, 505.0, |_| {}).unwrap();
        bar.cancel(first);

        let second = bar.pointer_down(200.0, 505.0, |_| {}).unwrap();
        let stale = PointerGrab { id: 0 };
        let mut seeks = 0;
        bar.pointer_move(&stale, 300.0, |_| seeks += 1);
        bar.pointer_up(stale);

        assert_eq!(seeks, 0);
        assert!(bar.is_dragging());
        bar.pointer_up(second);
        assert!(!bar.is_dragging());
    }
}
