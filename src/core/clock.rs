use std::time::Instant;

/// Frame clock - tracks delta time between display-refresh callbacks
///
/// The clock is started lazily: the first tick after creation or a reset
/// yields zero so a scene that was hidden for a while does not receive one
/// huge step when it becomes visible again.
#[derive(Debug, Default)]
pub struct Clock {
    last_tick: Option<Instant>,
    elapsed: f32,
}

impl Clock {
    /// Create a stopped clock
    pub fn new() -> Self {
        Self {
            last_tick: None,
            elapsed: 0.0,
        }
    }

    /// Get delta time since last tick and advance clock
    /// Returns delta in seconds
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// Advance the clock to an explicit timestamp (host callback time)
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let delta = match self.last_tick {
            Some(last) => now.saturating_duration_since(last).as_secs_f32(),
            None => 0.0,
        };
        self.last_tick = Some(now);
        self.elapsed += delta;
        delta
    }

    /// Total seconds accumulated since the clock started
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Forget the last timestamp; the next tick yields zero
    pub fn reset(&mut self) {
        self.last_tick = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_tick_is_zero() {
        let mut clock = Clock::new();
        assert_eq!(clock.tick_at(Instant::now()), 0.0);
    }

    #[test]
    fn clock_measures_delta() {
        let mut clock = Clock::new();
        let start = Instant::now();

        clock.tick_at(start);
        let delta = clock.tick_at(start + Duration::from_millis(16));

        assert!((delta - 0.016).abs() < 1e-4);
        assert!((clock.elapsed() - 0.016).abs() < 1e-4);
    }

    #[test]
    fn clock_resets() {
        let mut clock = Clock::new();
        let start = Instant::now();

        clock.tick_at(start);
        clock.reset();

        // Long gap while hidden must not leak into the next frame
        let delta = clock.tick_at(start + Duration::from_secs(5));
        assert_eq!(delta, 0.0);
    }

    #[test]
    fn backwards_timestamps_saturate() {
        let mut clock = Clock::new();
        let start = Instant::now() + Duration::from_secs(1);

        clock.tick_at(start);
        assert_eq!(clock.tick_at(start - Duration::from_millis(5)), 0.0);
    }
}
