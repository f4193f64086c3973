use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::tiles::{World, WorldError};
use crate::StartupError;

use super::input::{KeyEvent, KeyStates};
use super::metrics::MetricsAccumulator;
use super::DisplayList;

/// Clock, sleep and input, supplied by whatever hosts the loop.
pub trait Platform {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
    fn sleep(&mut self, duration: Duration);
    /// Appends the key events that arrived since the last call. Returns
    /// `false` once the host wants to close.
    fn poll_events(&mut self, events: &mut Vec<KeyEvent>) -> bool;
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub refresh_rate: u32,
    pub max_frame_delta: Option<Duration>,
    pub metrics_log_interval: Duration,
    pub frame_limit: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            refresh_rate: 60,
            max_frame_delta: None,
            metrics_log_interval: Duration::from_secs(1),
            frame_limit: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    World(#[from] WorldError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    pub draws: u64,
    pub dropped_frames: u64,
}

/// Runs input, tick and draw once per frame until the world asks to quit,
/// the platform closes or the frame limit is reached.
pub fn run_main_loop(
    world: &mut World,
    platform: &mut dyn Platform,
    config: &LoopConfig,
) -> Result<LoopSummary, AppError> {
    let ideal = ideal_frame_time(config.refresh_rate);
    let start = platform.now();
    let mut scheduler = FrameScheduler::new(ideal, start);
    let mut metrics = MetricsAccumulator::new(config.metrics_log_interval, start);
    let mut keys = KeyStates::default();
    let mut raw_events = Vec::new();
    let mut display = DisplayList::default();
    let mut summary = LoopSummary::default();

    info!(
        refresh_rate = config.refresh_rate,
        ideal_frame_ms = ideal.as_secs_f64() * 1000.0,
        frame_limit = ?config.frame_limit,
        "main_loop_started"
    );

    loop {
        if config
            .frame_limit
            .is_some_and(|limit| summary.frames >= limit)
        {
            info!(frames = summary.frames, "frame_limit_reached");
            break;
        }

        raw_events.clear();
        if !platform.poll_events(&mut raw_events) {
            info!(reason = "platform_closed", "shutdown_requested");
            break;
        }
        for event in raw_events.drain(..) {
            if let Some(edge) = keys.edge(event) {
                world.handle_key(edge)?;
            }
        }
        if world.quit_requested() {
            break;
        }

        let frame_dt = scheduler.begin_frame(platform.now());
        let frame_dt = match config.max_frame_delta {
            Some(max) => clamp_frame_delta(frame_dt, max),
            None => frame_dt,
        };
        world.tick(frame_dt)?;
        metrics.record_tick();

        if world.needs_redraw() {
            world.draw(&mut display);
            world.present(&mut display);
            summary.draws = summary.draws.saturating_add(1);
        } else {
            metrics.record_skipped_draw();
        }
        metrics.record_frame(frame_dt);
        summary.frames = summary.frames.saturating_add(1);

        let plan = scheduler.end_frame(platform.now());
        if plan.dropped_frames > 0 {
            warn!(
                dropped = plan.dropped_frames,
                behind_ms = plan.behind.as_secs_f64() * 1000.0,
                "frames_dropped"
            );
            metrics.record_dropped_frames(plan.dropped_frames);
            summary.dropped_frames = summary.dropped_frames.saturating_add(plan.dropped_frames);
        }
        if !plan.sleep.is_zero() {
            platform.sleep(plan.sleep);
        }

        if let Some(snapshot) = metrics.maybe_snapshot(platform.now()) {
            info!(
                fps = snapshot.fps,
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                skipped_draws = snapshot.skipped_draws,
                dropped_frames = snapshot.dropped_frames,
                "loop_metrics"
            );
        }
    }

    debug!(
        frames = summary.frames,
        draws = summary.draws,
        dropped_frames = summary.dropped_frames,
        "main_loop_finished"
    );
    Ok(summary)
}

/// Paces frames against a fixed ideal frame time. Falling behind by more
/// than one frame resynchronizes to the present and reports the whole
/// missed frames as dropped; nothing is simulated to catch up.
#[derive(Debug)]
struct FrameScheduler {
    ideal: Duration,
    next_frame_start: Duration,
    last_frame_start: Duration,
}

impl FrameScheduler {
    fn new(ideal: Duration, start: Duration) -> Self {
        Self {
            ideal,
            next_frame_start: start,
            last_frame_start: start,
        }
    }

    /// Real time since the previous frame began.
    fn begin_frame(&mut self, now: Duration) -> Duration {
        let dt = now.saturating_sub(self.last_frame_start);
        self.last_frame_start = now;
        dt
    }

    fn end_frame(&mut self, now: Duration) -> FramePlan {
        let plan = plan_frame(self.next_frame_start, now, self.ideal);
        self.next_frame_start = plan.next_frame_start;
        plan
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FramePlan {
    sleep: Duration,
    dropped_frames: u64,
    behind: Duration,
    next_frame_start: Duration,
}

fn plan_frame(frame_start: Duration, now: Duration, ideal: Duration) -> FramePlan {
    let next_frame_start = frame_start.saturating_add(ideal);
    if now <= next_frame_start {
        return FramePlan {
            sleep: next_frame_start - now,
            dropped_frames: 0,
            behind: Duration::ZERO,
            next_frame_start,
        };
    }

    let behind = now - next_frame_start;
    if behind <= ideal || ideal.is_zero() {
        return FramePlan {
            sleep: Duration::ZERO,
            dropped_frames: 0,
            behind,
            next_frame_start,
        };
    }

    let dropped_frames = (behind.as_nanos() / ideal.as_nanos()) as u64;
    FramePlan {
        sleep: Duration::ZERO,
        dropped_frames,
        behind,
        next_frame_start: now,
    }
}

fn ideal_frame_time(refresh_rate: u32) -> Duration {
    Duration::from_secs(1) / refresh_rate.max(1)
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}
