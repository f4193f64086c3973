use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    pub skipped_draws: u32,
    pub dropped_frames: u64,
}

/// Counts loop activity over one interval of platform time.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Duration,
    interval: Duration,
    frames: u32,
    ticks: u32,
    skipped_draws: u32,
    dropped_frames: u64,
    frame_time_sum: Duration,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, start: Duration) -> Self {
        Self {
            interval_start: start,
            interval,
            frames: 0,
            ticks: 0,
            skipped_draws: 0,
            dropped_frames: 0,
            frame_time_sum: Duration::ZERO,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_dt);
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub(crate) fn record_skipped_draw(&mut self) {
        self.skipped_draws = self.skipped_draws.saturating_add(1);
    }

    pub(crate) fn record_dropped_frames(&mut self, count: u64) {
        self.dropped_frames = self.dropped_frames.saturating_add(count);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Duration) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_sub(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = if self.frames == 0 {
            0.0
        } else {
            (self.frame_time_sum.as_secs_f32() / self.frames as f32) * 1000.0
        };

        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            tps: self.ticks as f32 / elapsed_seconds,
            frame_time_ms,
            skipped_draws: self.skipped_draws,
            dropped_frames: self.dropped_frames,
        };

        self.interval_start = now;
        self.frames = 0;
        self.ticks = 0;
        self.skipped_draws = 0;
        self.dropped_frames = 0;
        self.frame_time_sum = Duration::ZERO;

        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_computes_expected_values() {
        let base = Duration::from_secs(3);
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), base);

        accumulator.record_frame(Duration::from_millis(16));
        accumulator.record_frame(Duration::from_millis(16));
        accumulator.record_tick();
        accumulator.record_tick();
        accumulator.record_tick();
        accumulator.record_tick();
        accumulator.record_skipped_draw();
        accumulator.record_dropped_frames(5);

        let snapshot = accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("snapshot should be emitted");

        assert!((snapshot.fps - 2.0).abs() < 0.05);
        assert!((snapshot.tps - 4.0).abs() < 0.05);
        assert!((snapshot.frame_time_ms - 16.0).abs() < 0.001);
        assert_eq!(snapshot.skipped_draws, 1);
        assert_eq!(snapshot.dropped_frames, 5);
    }

    #[test]
    fn snapshot_not_emitted_before_interval() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), Duration::ZERO);
        accumulator.record_frame(Duration::from_millis(16));

        assert!(accumulator
            .maybe_snapshot(Duration::from_millis(500))
            .is_none());
    }

    #[test]
    fn counters_reset_after_snapshot() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), Duration::ZERO);
        accumulator.record_dropped_frames(2);
        accumulator.maybe_snapshot(Duration::from_secs(1)).expect("first");
        let second = accumulator
            .maybe_snapshot(Duration::from_secs(2))
            .expect("second");
        assert_eq!(second, LoopMetricsSnapshot::default());
    }
}
