use std::cell::Cell;
use std::rc::Rc;

/// Pointer input delivered to a scene, in physical canvas pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Cursor moved to a new position
    Moved { x: f32, y: f32 },
    /// Cursor moved while the primary button is held
    Dragged { dx: f32, dy: f32 },
    /// Primary button released without dragging
    Clicked { x: f32, y: f32 },
}

/// Subscription to pointer-move events
///
/// Scenes attach when they want hover input and detach when hidden or
/// when reduced motion is requested. Clicks and drags are not gated.
pub trait PointerSource {
    fn attach(&mut self);

    fn detach(&mut self);

    fn is_attached(&self) -> bool;
}

#[derive(Debug, Default)]
struct GateState {
    attached: Cell<bool>,
    attach_count: Cell<u32>,
}

/// Shared on/off switch between a scene and the input host
///
/// Cloning is cheap (Rc). The host keeps one clone and consults
/// [`PointerGate::is_attached`] before forwarding move events.
#[derive(Debug, Clone, Default)]
pub struct PointerGate(Rc<GateState>);

impl PointerGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a listener was attached over the gate's lifetime
    pub fn attach_count(&self) -> u32 {
        self.0.attach_count.get()
    }
}

impl PointerSource for PointerGate {
    fn attach(&mut self) {
        if !self.0.attached.replace(true) {
            self.0.attach_count.set(self.0.attach_count.get() + 1);
            log::debug!("pointer listener attached");
        }
    }

    fn detach(&mut self) {
        if self.0.attached.replace(false) {
            log::debug!("pointer listener detached");
        }
    }

    fn is_attached(&self) -> bool {
        self.0.attached.get()
    }
}
