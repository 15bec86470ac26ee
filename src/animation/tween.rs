use crate::core::Countdown;

/// One-shot eased transition between two values
#[derive(Debug, Clone, Copy)]
pub struct Tween {
    from: f32,
    to: f32,
    countdown: Countdown,
}

impl Tween {
    /// Start a tween of `duration` seconds
    pub fn new(from: f32, to: f32, duration: f32) -> Self {
        let mut countdown = Countdown::new(duration);
        countdown.start();
        Self { from, to, countdown }
    }

    /// Advance and return the current value
    pub fn advance(&mut self, delta: f32) -> f32 {
        self.countdown.tick(delta);
        self.value()
    }

    pub fn value(&self) -> f32 {
        let t = ease_in_out(self.countdown.progress());
        self.from + (self.to - self.from) * t
    }

    pub fn is_finished(&self) -> bool {
        !self.countdown.is_active()
    }
}

/// Smoothstep easing on [0, 1]
pub fn ease_in_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tween_reaches_end_value() {
        let mut fade = Tween::new(1.0, 0.0, 0.5);
        assert_eq!(fade.value(), 1.0);

        fade.advance(0.25);
        assert!((fade.value() - 0.5).abs() < 1e-6);
        assert!(!fade.is_finished());

        assert_eq!(fade.advance(0.3), 0.0);
        assert!(fade.is_finished());
    }

    #[test]
    fn zero_duration_finishes_on_first_tick() {
        let mut fade = Tween::new(0.0, 1.0, 0.0);
        assert_eq!(fade.advance(0.0), 1.0);
        assert!(fade.is_finished());
    }
}
