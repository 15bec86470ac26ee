use winit::event::{ElementState, MouseButton, WindowEvent};

use super::controller::{PointerEvent, PointerGate, PointerSource};

/// Movement in pixels after which a press becomes a drag instead of a click
pub const CLICK_SLOP: f32 = 4.0;

/// Adapter that bridges Winit events to [`PointerEvent`]s
#[derive(Debug, Clone)]
pub struct WinitPointer {
    /// Scene-controlled switch for move events
    gate: PointerGate,
    /// Current cursor position (relative to window)
    position: Option<(f32, f32)>,
    /// Where the primary button went down, if held
    pressed_at: Option<(f32, f32)>,
    /// Set once the held cursor moved past the click slop
    dragging: bool,
}

impl WinitPointer {
    pub fn new(gate: PointerGate) -> Self {
        Self {
            gate,
            position: None,
            pressed_at: None,
            dragging: false,
        }
    }

    /// Process a Winit WindowEvent and translate it for the scene
    pub fn process_event(&mut self, event: &WindowEvent) -> Option<PointerEvent> {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = (position.x as f32, position.y as f32);
                let previous = self.position.replace((x, y));

                if let Some(start) = self.pressed_at {
                    let (ox, oy) = previous.unwrap_or(start);
                    if !self.dragging {
                        let moved = (x - start.0).hypot(y - start.1);
                        self.dragging = moved > CLICK_SLOP;
                    }
                    if self.dragging {
                        return Some(PointerEvent::Dragged {
                            dx: x - ox,
                            dy: y - oy,
                        });
                    }
                }

                self.gate
                    .is_attached()
                    .then_some(PointerEvent::Moved { x, y })
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    self.pressed_at = self.position.or(Some((0.0, 0.0)));
                    self.dragging = false;
                    None
                }
                ElementState::Released => {
                    let was_drag = std::mem::take(&mut self.dragging);
                    let start = self.pressed_at.take()?;
                    if was_drag {
                        return None;
                    }
                    let (x, y) = self.position.unwrap_or(start);
                    Some(PointerEvent::Clicked { x, y })
                }
            },
            WindowEvent::CursorLeft { .. } => {
                self.pressed_at = None;
                self.dragging = false;
                None
            }
            _ => None,
        }
    }

    /// Get current cursor position (if available)
    pub fn position(&self) -> Option<(f32, f32)> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Winit event construction requires device ids that are not publicly
    // constructible, so these tests cover state outside event dispatch

    #[test]
    fn test_new_pointer_empty() {
        let pointer = WinitPointer::new(PointerGate::new());
        assert_eq!(pointer.position(), None);
        assert!(!pointer.dragging);
        assert!(pointer.pressed_at.is_none());
    }

    #[test]
    fn test_gate_shared_with_host() {
        let mut gate = PointerGate::new();
        let pointer = WinitPointer::new(gate.clone());

        gate.attach();
        assert!(pointer.gate.is_attached());
    }
}
