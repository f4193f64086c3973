use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use crate::app::{KeyEvent, Platform};

/// Window-less platform: real monotonic clock, no input, never asks to close.
#[derive(Debug)]
pub struct HeadlessPlatform {
    started: Instant,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HeadlessPlatform {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }

    fn poll_events(&mut self, _events: &mut Vec<KeyEvent>) -> bool {
        true
    }
}

/// Deterministic platform. Time only moves when the loop sleeps or a stall
/// is charged, and input is replayed from a queue, one batch per poll.
#[derive(Debug, Default)]
pub struct SimulatedPlatform {
    now: Duration,
    queued: VecDeque<Vec<KeyEvent>>,
    stall: Duration,
    polls: u64,
    close_after: Option<u64>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `events` on the first poll not already holding a batch.
    pub fn queue_events(&mut self, events: Vec<KeyEvent>) {
        self.queued.push_back(events);
    }

    /// The next poll takes `duration` of clock time, like a slow frame.
    pub fn stall_next_poll(&mut self, duration: Duration) {
        self.stall = self.stall.saturating_add(duration);
    }

    /// Reports the host as closed once `polls` polls have succeeded.
    pub fn close_after(&mut self, polls: u64) {
        self.close_after = Some(polls);
    }

    pub fn advance(&mut self, duration: Duration) {
        self.now = self.now.saturating_add(duration);
    }
}

impl Platform for SimulatedPlatform {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.advance(duration);
    }

    fn poll_events(&mut self, events: &mut Vec<KeyEvent>) -> bool {
        if self.close_after.is_some_and(|limit| self.polls >= limit) {
            return false;
        }
        self.polls = self.polls.saturating_add(1);
        let stall = std::mem::take(&mut self.stall);
        self.advance(stall);
        if let Some(batch) = self.queued.pop_front() {
            events.extend(batch);
        }
        true
    }
}
