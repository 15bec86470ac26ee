//! Frame scheduling state machine
//!
//! A scene renders only while it is both loaded and visible. The host owns
//! the actual display-refresh callback; [`RenderLoop`] decides when to ask
//! for one and when to cancel it. At most one request is pending at a time
//! and callbacks carrying any other id are ignored.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use crate::core::Clock;

pub type FrameRequestId = u64;

/// Host hook for next-frame callbacks
pub trait FrameScheduler {
    /// Ask for one callback on the next display refresh
    fn request_frame(&mut self) -> FrameRequestId;

    /// Drop a pending request; unknown or already-fired ids are ignored
    fn cancel_frame(&mut self, id: FrameRequestId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Scheduled(FrameRequestId),
    Rendering,
}

#[derive(Debug)]
pub struct RenderLoop {
    state: LoopState,
    loaded: bool,
    visible: bool,
    clock: Clock,
    frames: u64,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLoop {
    /// Not loaded, visible, idle
    pub fn new() -> Self {
        Self {
            state: LoopState::Idle,
            loaded: false,
            visible: true,
            clock: Clock::new(),
            frames: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Frames rendered since creation
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn pending(&self) -> Option<FrameRequestId> {
        match self.state {
            LoopState::Scheduled(id) => Some(id),
            _ => None,
        }
    }

    fn should_run(&self) -> bool {
        self.loaded && self.visible
    }

    pub fn set_loaded(&mut self, loaded: bool, scheduler: &mut dyn FrameScheduler) {
        self.loaded = loaded;
        self.reconcile(scheduler);
    }

    pub fn set_visible(&mut self, visible: bool, scheduler: &mut dyn FrameScheduler) {
        if self.visible != visible {
            log::debug!("viewport visibility -> {}", visible);
        }
        self.visible = visible;
        self.reconcile(scheduler);
    }

    /// Cancel any pending callback and go idle; safe to repeat
    pub fn cancel(&mut self, scheduler: &mut dyn FrameScheduler) {
        if let LoopState::Scheduled(id) = self.state {
            scheduler.cancel_frame(id);
        }
        self.go_idle();
    }

    fn go_idle(&mut self) {
        self.state = LoopState::Idle;
        // Resume with a zero delta rather than the time spent hidden
        self.clock.reset();
    }

    fn reconcile(&mut self, scheduler: &mut dyn FrameScheduler) {
        match (self.state, self.should_run()) {
            (LoopState::Idle, true) => {
                self.state = LoopState::Scheduled(scheduler.request_frame());
            }
            (LoopState::Scheduled(_), false) => self.cancel(scheduler),
            // Rendering decides in finish(); Idle/false and Scheduled/true hold
            _ => {}
        }
    }

    /// Start a frame for callback `id`
    ///
    /// Returns the seconds elapsed since the previous frame, or `None` when
    /// the callback is stale (cancelled or superseded).
    pub fn begin(&mut self, id: FrameRequestId, now: Instant) -> Option<f32> {
        if self.state != LoopState::Scheduled(id) {
            log::trace!("ignoring stale frame callback {}", id);
            return None;
        }
        self.state = LoopState::Rendering;
        Some(self.clock.tick_at(now))
    }

    /// Finish the current frame and reschedule if still loaded and visible
    ///
    /// A failed frame leaves the loop idle; the error belongs to the host.
    pub fn finish(&mut self, succeeded: bool, scheduler: &mut dyn FrameScheduler) {
        if self.state != LoopState::Rendering {
            return;
        }
        self.frames += 1;
        if succeeded && self.should_run() {
            self.state = LoopState::Scheduled(scheduler.request_frame());
        } else {
            self.go_idle();
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    next_id: FrameRequestId,
    pending: Vec<FrameRequestId>,
    requested: usize,
    cancelled: usize,
}

/// Scheduler whose callbacks fire only when the owner pumps them
///
/// Used by the headless host and tests. Cloning is cheap (Rc); clones share
/// the queue.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler(Rc<RefCell<ManualState>>);

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests not yet fired or cancelled
    pub fn pending(&self) -> Vec<FrameRequestId> {
        self.0.borrow().pending.clone()
    }

    /// Remove and return the oldest pending request
    pub fn take_next(&self) -> Option<FrameRequestId> {
        let mut state = self.0.borrow_mut();
        if state.pending.is_empty() {
            None
        } else {
            Some(state.pending.remove(0))
        }
    }

    pub fn requested(&self) -> usize {
        self.0.borrow().requested
    }

    pub fn cancelled(&self) -> usize {
        self.0.borrow().cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameRequestId {
        let mut state = self.0.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.pending.push(id);
        state.requested += 1;
        id
    }

    fn cancel_frame(&mut self, id: FrameRequestId) {
        let mut state = self.0.borrow_mut();
        let before = state.pending.len();
        state.pending.retain(|pending| *pending != id);
        if state.pending.len() != before {
            state.cancelled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn setup() -> (RenderLoop, ManualScheduler) {
        (RenderLoop::new(), ManualScheduler::new())
    }

    #[test]
    fn schedules_only_when_loaded_and_visible() {
        let (mut render_loop, mut scheduler) = setup();

        render_loop.set_visible(false, &mut scheduler);
        render_loop.set_loaded(true, &mut scheduler);
        assert_eq!(render_loop.state(), LoopState::Idle);
        assert!(scheduler.pending().is_empty());

        render_loop.set_visible(true, &mut scheduler);
        assert_eq!(scheduler.pending().len(), 1);
    }

    #[test]
    fn repeated_visibility_toggles_keep_one_pending() {
        let (mut render_loop, mut scheduler) = setup();
        render_loop.set_loaded(true, &mut scheduler);

        for _ in 0..3 {
            render_loop.set_visible(true, &mut scheduler);
        }
        assert_eq!(scheduler.pending().len(), 1);

        render_loop.set_visible(false, &mut scheduler);
        render_loop.set_visible(true, &mut scheduler);
        assert_eq!(scheduler.pending().len(), 1);
        assert_eq!(scheduler.cancelled(), 1);
    }

    #[test]
    fn frame_reschedules_and_reports_delta() {
        let (mut render_loop, mut scheduler) = setup();
        render_loop.set_loaded(true, &mut scheduler);
        let start = Instant::now();

        let first = scheduler.take_next().unwrap();
        assert_eq!(render_loop.begin(first, start), Some(0.0));
        render_loop.finish(true, &mut scheduler);

        let second = scheduler.take_next().unwrap();
        let delta = render_loop
            .begin(second, start + Duration::from_millis(16))
            .unwrap();
        assert!((delta - 0.016).abs() < 1e-6);
        render_loop.finish(true, &mut scheduler);
        assert_eq!(render_loop.frames(), 2);
    }

    #[test]
    fn stale_callback_is_ignored() {
        let (mut render_loop, mut scheduler) = setup();
        render_loop.set_loaded(true, &mut scheduler);
        let id = render_loop.pending().unwrap();

        render_loop.set_visible(false, &mut scheduler);
        assert_eq!(render_loop.begin(id, Instant::now()), None);
        assert_eq!(render_loop.state(), LoopState::Idle);
    }

    #[test]
    fn hiding_mid_frame_stops_after_finish() {
        let (mut render_loop, mut scheduler) = setup();
        render_loop.set_loaded(true, &mut scheduler);
        let id = scheduler.take_next().unwrap();

        render_loop.begin(id, Instant::now());
        render_loop.set_visible(false, &mut scheduler);
        render_loop.finish(true, &mut scheduler);

        assert_eq!(render_loop.state(), LoopState::Idle);
        assert!(scheduler.pending().is_empty());
    }

    #[test]
    fn failed_frame_goes_idle() {
        let (mut render_loop, mut scheduler) = setup();
        render_loop.set_loaded(true, &mut scheduler);
        let id = scheduler.take_next().unwrap();

        render_loop.begin(id, Instant::now());
        render_loop.finish(false, &mut scheduler);
        assert_eq!(render_loop.state(), LoopState::Idle);
        assert!(scheduler.pending().is_empty());
    }

    #[test]
    fn cancel_is_idempotent() {
        let (mut render_loop, mut scheduler) = setup();
        render_loop.set_loaded(true, &mut scheduler);

        render_loop.cancel(&mut scheduler);
        render_loop.cancel(&mut scheduler);
        assert_eq!(render_loop.state(), LoopState::Idle);
        assert_eq!(scheduler.cancelled(), 1);
    }
}
