use glam::Vec2;
use std::collections::BTreeMap;

/// A camera gesture, independent of the device that produced it.
///
/// The orbit controller consumes gestures, never raw input events, so mouse,
/// trackpad and touch share one camera model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// Rotate around the target by a pointer delta in pixels.
    Orbit { dx: f32, dy: f32 },
    /// Slide the target by a pointer delta in pixels.
    Pan { dx: f32, dy: f32 },
    /// Wheel steps; positive moves closer.
    Zoom { steps: f32 },
    /// Ratio of finger spread to the previous spread; above 1 moves closer.
    Pinch { scale: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// Pixels of smooth scrolling treated as one wheel step.
const PIXELS_PER_STEP: f32 = 100.0;

/// Turns raw pointer, touch and wheel events into [`Gesture`]s.
///
/// Primary drag orbits, secondary or middle drag pans, one finger orbits and
/// two fingers pinch.
#[derive(Debug, Default)]
pub struct PointerTracker {
    primary: bool,
    secondary: bool,
    middle: bool,
    cursor: Option<Vec2>,
    touches: BTreeMap<u64, Vec2>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn button(&mut self, button: PointerButton, pressed: bool) {
        match button {
            PointerButton::Primary => self.primary = pressed,
            PointerButton::Secondary => self.secondary = pressed,
            PointerButton::Middle => self.middle = pressed,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.primary || self.secondary || self.middle
    }

    pub fn cursor_moved(&mut self, position: Vec2) -> Option<Gesture> {
        let previous = self.cursor.replace(position)?;
        let delta = position - previous;
        if delta == Vec2::ZERO {
            return None;
        }
        if self.primary {
            Some(Gesture::Orbit {
                dx: delta.x,
                dy: delta.y,
            })
        } else if self.secondary || self.middle {
            Some(Gesture::Pan {
                dx: delta.x,
                dy: delta.y,
            })
        } else {
            None
        }
    }

    /// The cursor left the surface; the next move starts a fresh delta.
    pub fn cursor_left(&mut self) {
        self.cursor = None;
    }

    pub fn wheel_lines(&self, lines: f32) -> Option<Gesture> {
        (lines != 0.0 && lines.is_finite()).then_some(Gesture::Zoom { steps: lines })
    }

    pub fn wheel_pixels(&self, pixels: f32) -> Option<Gesture> {
        self.wheel_lines(pixels / PIXELS_PER_STEP)
    }

    pub fn touch_start(&mut self, id: u64, position: Vec2) {
        self.touches.insert(id, position);
    }

    pub fn touch_moved(&mut self, id: u64, position: Vec2) -> Option<Gesture> {
        let previous = *self.touches.get(&id)?;
        let spread_before = self.spread();
        self.touches.insert(id, position);
        match self.touches.len() {
            1 => {
                let delta = position - previous;
                Some(Gesture::Orbit {
                    dx: delta.x,
                    dy: delta.y,
                })
            }
            2 => {
                let before = spread_before?;
                let after = self.spread()?;
                (before > f32::EPSILON).then(|| Gesture::Pinch {
                    scale: after / before,
                })
            }
            _ => None,
        }
    }

    pub fn touch_end(&mut self, id: u64) {
        self.touches.remove(&id);
    }

    /// Drop all held buttons and touches, e.g. when focus is lost.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn spread(&self) -> Option<f32> {
        let mut it = self.touches.values();
        let a = it.next()?;
        let b = it.next()?;
        Some(a.distance(*b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hover_produces_no_gesture() {
        let mut t = PointerTracker::new();
        assert_eq!(t.cursor_moved(Vec2::new(10.0, 10.0)), None);
        assert_eq!(t.cursor_moved(Vec2::new(20.0, 10.0)), None);
    }

    #[test]
    fn primary_drag_orbits() {
        let mut t = PointerTracker::new();
        t.cursor_moved(Vec2::new(10.0, 10.0));
        t.button(PointerButton::Primary, true);
        assert_eq!(
            t.cursor_moved(Vec2::new(15.0, 7.0)),
            Some(Gesture::Orbit { dx: 5.0, dy: -3.0 })
        );
    }

    #[test]
    fn secondary_drag_pans() {
        let mut t = PointerTracker::new();
        t.button(PointerButton::Secondary, true);
        t.cursor_moved(Vec2::ZERO);
        assert!(matches!(
            t.cursor_moved(Vec2::new(1.0, 2.0)),
            Some(Gesture::Pan { .. })
        ));
    }

    #[test]
    fn leaving_surface_resets_delta() {
        let mut t = PointerTracker::new();
        t.button(PointerButton::Primary, true);
        t.cursor_moved(Vec2::ZERO);
        t.cursor_left();
        assert_eq!(t.cursor_moved(Vec2::new(500.0, 500.0)), None);
    }

    #[test]
    fn wheel_maps_to_zoom_steps() {
        let t = PointerTracker::new();
        assert_eq!(t.wheel_lines(2.0), Some(Gesture::Zoom { steps: 2.0 }));
        assert_eq!(t.wheel_pixels(-50.0), Some(Gesture::Zoom { steps: -0.5 }));
        assert_eq!(t.wheel_lines(0.0), None);
        assert_eq!(t.wheel_lines(f32::NAN), None);
    }

    #[test]
    fn one_finger_orbits_two_fingers_pinch() {
        let mut t = PointerTracker::new();
        t.touch_start(1, Vec2::new(100.0, 100.0));
        assert_eq!(
            t.touch_moved(1, Vec2::new(110.0, 100.0)),
            Some(Gesture::Orbit { dx: 10.0, dy: 0.0 })
        );
        t.touch_start(2, Vec2::new(210.0, 100.0));
        match t.touch_moved(2, Vec2::new(310.0, 100.0)) {
            Some(Gesture::Pinch { scale }) => assert!((scale - 2.0).abs() < 1e-5),
            other => panic!("expected pinch, got {other:?}"),
        }
        t.touch_end(2);
        assert!(matches!(
            t.touch_moved(1, Vec2::new(100.0, 100.0)),
            Some(Gesture::Orbit { .. })
        ));
    }

    #[test]
    fn unknown_touch_is_ignored() {
        let mut t = PointerTracker::new();
        assert_eq!(t.touch_moved(9, Vec2::ONE), None);
        t.touch_start(1, Vec2::ZERO);
        assert_eq!(
            t.touch_moved(1, Vec2::new(0.0, 4.0)),
            Some(Gesture::Orbit { dx: 0.0, dy: 4.0 })
        );
    }
}
