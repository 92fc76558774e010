use crate::stage::Stage;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Running,
    Stopped,
}

/// Outcome of one tick: render exactly one pass and request the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// Integration step after clamping.
    pub dt: f32,
    pub elapsed: f32,
}

/// Drives a [`Stage`] from platform redraw callbacks.
///
/// Each tick measures the time since the previous one and advances the
/// stage once. The clock takes the full measured time; motion integrates
/// over that time clamped to `max_frame_delta`. A stopped loop stays
/// stopped; a new viewport builds a new loop.
#[derive(Debug)]
pub struct FrameLoop {
    state: FrameState,
    last: Option<Instant>,
    max_frame_delta: f32,
}

impl FrameLoop {
    pub fn new(max_frame_delta: f32) -> Self {
        Self {
            state: FrameState::Running,
            last: None,
            max_frame_delta: max_frame_delta.max(0.0),
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == FrameState::Running
    }

    /// Clamp a raw frame delta into `[0, max_frame_delta]`.
    pub fn clamp_delta(&self, dt: f32) -> f32 {
        if dt.is_nan() {
            0.0
        } else {
            dt.clamp(0.0, self.max_frame_delta)
        }
    }

    /// Advance `stage` to `now`. Returns `None` once stopped.
    pub fn tick(&mut self, stage: &mut Stage, now: Instant) -> Option<FrameReport> {
        if self.state == FrameState::Stopped {
            return None;
        }
        let raw = match self.last.replace(now) {
            Some(last) => now.saturating_duration_since(last).as_secs_f32(),
            None => 0.0,
        };
        Some(self.step(stage, raw))
    }

    /// Advance by an explicit delta, for headless runs.
    pub fn tick_by(&mut self, stage: &mut Stage, dt: f32) -> Option<FrameReport> {
        if self.state == FrameState::Stopped {
            return None;
        }
        Some(self.step(stage, dt))
    }

    fn step(&mut self, stage: &mut Stage, raw: f32) -> FrameReport {
        let dt = self.clamp_delta(raw);
        let _span = tracing::trace_span!("frame", frame = stage.clock.frame() + 1).entered();
        stage.advance_by(raw, dt);
        tracing::trace!(dt, elapsed = stage.clock.elapsed(), "frame advanced");
        FrameReport {
            frame: stage.clock.frame(),
            dt,
            elapsed: stage.clock.elapsed(),
        }
    }

    pub fn stop(&mut self) {
        if self.state == FrameState::Running {
            tracing::info!("frame loop stopped");
        }
        self.state = FrameState::Stopped;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafescene_common::SceneConfig;
    use cafescene_scene::LabelPainter;
    use std::time::Duration;

    fn stage() -> Stage {
        Stage::new(&SceneConfig::default(), &LabelPainter::bitmap())
    }

    #[test]
    fn first_tick_has_zero_delta() {
        let mut stage = stage();
        let mut frames = FrameLoop::new(0.1);
        let report = frames.tick(&mut stage, Instant::now()).unwrap();
        assert_eq!(report.frame, 1);
        assert_eq!(report.dt, 0.0);
    }

    #[test]
    fn long_gaps_are_clamped() {
        let mut stage = stage();
        let mut frames = FrameLoop::new(0.1);
        let t0 = Instant::now();
        frames.tick(&mut stage, t0);
        let report = frames.tick(&mut stage, t0 + Duration::from_secs(5)).unwrap();
        assert!((report.dt - 0.1).abs() < 1e-6);
        let report = frames
            .tick(&mut stage, t0 + Duration::from_millis(5016))
            .unwrap();
        assert!((report.dt - 0.016).abs() < 1e-4);
        assert_eq!(report.frame, 3);
    }

    #[test]
    fn clamping_does_not_slow_the_clock() {
        let mut stage = stage();
        let mut frames = FrameLoop::new(0.1);
        let report = frames.tick_by(&mut stage, 5.0).unwrap();
        assert!((report.dt - 0.1).abs() < 1e-6);
        assert!((report.elapsed - 5.0).abs() < 1e-6);
        let report = frames.tick_by(&mut stage, 0.05).unwrap();
        assert!((report.elapsed - 5.05).abs() < 1e-5);
    }

    #[test]
    fn clock_never_runs_backwards() {
        let mut stage = stage();
        let mut frames = FrameLoop::new(0.1);
        let t0 = Instant::now() + Duration::from_secs(1);
        frames.tick(&mut stage, t0);
        let report = frames
            .tick(&mut stage, t0 - Duration::from_millis(500))
            .unwrap();
        assert_eq!(report.dt, 0.0);
        assert_eq!(frames.tick_by(&mut stage, -3.0).unwrap().dt, 0.0);
    }

    #[test]
    fn stopped_loop_schedules_nothing() {
        let mut stage = stage();
        let mut frames = FrameLoop::new(0.1);
        frames.tick_by(&mut stage, 0.016);
        frames.stop();
        assert_eq!(frames.state(), FrameState::Stopped);
        assert!(frames.tick(&mut stage, Instant::now()).is_none());
        assert!(frames.tick_by(&mut stage, 0.016).is_none());
        assert_eq!(stage.clock.frame(), 1);
    }

    #[test]
    fn every_tick_renders_one_frame() {
        let mut stage = stage();
        let mut frames = FrameLoop::new(0.1);
        for expected in 1..=10 {
            let report = frames.tick_by(&mut stage, 1.0 / 60.0).unwrap();
            assert_eq!(report.frame, expected);
        }
    }
}
