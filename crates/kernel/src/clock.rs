/// Frame time source owned by one stage.
///
/// Elapsed time accumulates in `f64` so long sessions do not lose the
/// sub-millisecond steps that drive the light pulses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clock {
    elapsed: f64,
    delta: f32,
    frame: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `dt` seconds. Negative or NaN steps count as zero.
    pub fn advance(&mut self, dt: f32) -> f32 {
        let dt = if dt.is_nan() { 0.0 } else { dt.max(0.0) };
        self.delta = dt;
        self.elapsed += f64::from(dt);
        self.frame += 1;
        dt
    }

    /// Seconds since the stage was built.
    pub fn elapsed(&self) -> f32 {
        self.elapsed as f32
    }

    /// Length of the last step.
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Number of steps taken.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_steps() {
        let mut clock = Clock::new();
        clock.advance(0.25);
        clock.advance(0.5);
        assert_eq!(clock.frame(), 2);
        assert!((clock.elapsed() - 0.75).abs() < 1e-6);
        assert_eq!(clock.delta(), 0.5);
    }

    #[test]
    fn negative_step_is_zero() {
        let mut clock = Clock::new();
        assert_eq!(clock.advance(-1.0), 0.0);
        assert_eq!(clock.advance(f32::NAN), 0.0);
        assert_eq!(clock.elapsed(), 0.0);
        assert_eq!(clock.frame(), 2);
    }

    #[test]
    fn reset_starts_over() {
        let mut clock = Clock::new();
        clock.advance(3.0);
        clock.reset();
        assert_eq!(clock, Clock::default());
    }
}
