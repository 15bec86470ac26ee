/// Self-contained timers - manage internal state, no Frame dependency
/// Each timer accumulates delta time and decides when to fire

/// Fixed-step accumulator - yields constant integration timesteps
#[derive(Debug, Clone)]
pub struct Accumulator {
    timestep: f32,
    accumulator: f32,
    max_steps: u8,
}

impl Accumulator {
    /// Create accumulator with fixed timestep
    pub fn new(hz: f32, max_steps: u8) -> Self {
        Self {
            timestep: 1.0 / hz,
            accumulator: 0.0,
            max_steps,
        }
    }

    /// Update with delta, returns iterator of fixed timesteps to execute
    ///
    /// Time beyond `max_steps` is dropped rather than carried, so a stalled
    /// frame cannot trigger a catch-up burst.
    pub fn tick(&mut self, delta: f32) -> impl Iterator<Item = f32> {
        self.accumulator += delta.max(0.0);

        let available = (self.accumulator / self.timestep) as usize;
        let steps = available.min(self.max_steps as usize);

        if available > steps {
            self.accumulator = 0.0;
        } else {
            self.accumulator -= steps as f32 * self.timestep;
        }

        std::iter::repeat(self.timestep).take(steps)
    }

    /// Fixed timestep in seconds
    pub fn timestep(&self) -> f32 {
        self.timestep
    }

    /// Discard partial time
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

/// Throttled gate - at most one fire per interval, remembers the latest
/// suppressed value so it can be delivered once the window reopens
#[derive(Debug, Clone, Copy)]
pub struct Throttled<T: Copy> {
    min_interval: f32,
    time_since_last: f32,
    pending: Option<T>,
}

impl<T: Copy> Throttled<T> {
    /// Create throttled gate with minimum interval in seconds
    pub fn new(min_interval: f32) -> Self {
        Self {
            min_interval,
            time_since_last: min_interval, // Allow immediate first fire
            pending: None,
        }
    }

    /// Offer a value; returns it if the gate is open, otherwise keeps it
    /// as the trailing value
    pub fn offer(&mut self, value: T) -> Option<T> {
        if self.time_since_last >= self.min_interval {
            self.time_since_last = 0.0;
            self.pending = None;
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// Advance time; returns the trailing value when its window has passed
    pub fn advance(&mut self, delta: f32) -> Option<T> {
        self.time_since_last += delta;

        if self.time_since_last >= self.min_interval {
            if let Some(value) = self.pending.take() {
                self.time_since_last = 0.0;
                return Some(value);
            }
        }
        None
    }

    /// Drop any trailing value and reopen the gate
    pub fn clear(&mut self) {
        self.pending = None;
        self.time_since_last = self.min_interval;
    }
}

/// Countdown timer - fires once after duration
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    duration: f32,
    elapsed: f32,
    active: bool,
}

impl Countdown {
    /// Create inactive countdown
    pub fn new(duration: f32) -> Self {
        Self {
            duration,
            elapsed: 0.0,
            active: false,
        }
    }

    /// Start countdown
    pub fn start(&mut self) {
        self.elapsed = 0.0;
        self.active = true;
    }

    /// Stop without firing
    pub fn cancel(&mut self) {
        self.active = false;
    }

    /// Whether the countdown is running
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Tick with delta, returns true if completed
    pub fn tick(&mut self, delta: f32) -> bool {
        if !self.active {
            return false;
        }

        self.elapsed += delta;

        if self.elapsed >= self.duration {
            self.active = false;
            true
        } else {
            false
        }
    }

    /// Get progress [0, 1]
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (self.elapsed / self.duration).min(1.0)
    }
}
