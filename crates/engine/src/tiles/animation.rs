//! Frame animations driven by wall-clock time.
//!
//! An [`Animation`] is a shared handle: cloning it shares the same timeline,
//! so every tile cell painted with one tile type advances in lockstep. The
//! frames live as long as the last handle.

use std::cell::Cell;
use std::rc::Rc;

use crate::backend::ImageHandle;

/// Milliseconds on the world clock.
pub type TimeMs = u64;

#[derive(Debug)]
struct Timeline {
    frames: Vec<ImageHandle>,
    frame_duration: TimeMs,
    cycle_duration: TimeMs,
    offset: Cell<TimeMs>,
    frame_shown: Cell<usize>,
}

#[derive(Debug, Clone)]
pub struct Animation {
    timeline: Rc<Timeline>,
}

impl Animation {
    /// A static image. It never advances.
    pub fn single(image: ImageHandle) -> Self {
        Self::from_timeline(vec![image], 0)
    }

    /// Cycles through `frames`, showing each for `frame_duration` ms.
    ///
    /// Panics if `frames` is empty.
    pub fn new(frames: Vec<ImageHandle>, frame_duration: TimeMs) -> Self {
        assert!(!frames.is_empty(), "animation needs at least one frame");
        Self::from_timeline(frames, frame_duration)
    }

    fn from_timeline(frames: Vec<ImageHandle>, frame_duration: TimeMs) -> Self {
        let frame_duration = if frames.len() > 1 { frame_duration } else { 0 };
        let cycle_duration = frame_duration.saturating_mul(frames.len() as TimeMs);
        Self {
            timeline: Rc::new(Timeline {
                frames,
                frame_duration,
                cycle_duration,
                offset: Cell::new(0),
                frame_shown: Cell::new(0),
            }),
        }
    }

    /// An independent copy with its own timeline.
    pub fn detached(&self) -> Self {
        Self::from_timeline(self.timeline.frames.clone(), self.timeline.frame_duration)
    }

    pub fn is_static(&self) -> bool {
        self.timeline.cycle_duration == 0
    }

    pub fn frame_count(&self) -> usize {
        self.timeline.frames.len()
    }

    pub fn frame_duration(&self) -> TimeMs {
        self.timeline.frame_duration
    }

    pub fn restart(&self, now: TimeMs) {
        self.timeline.offset.set(now);
        self.timeline.frame_shown.set(0);
    }

    /// Advances to the frame due at `now` and returns it.
    pub fn set_frame(&self, now: TimeMs) -> ImageHandle {
        let index = self.index_at(now);
        self.timeline.frame_shown.set(index);
        self.timeline.frames[index]
    }

    /// The frame most recently returned by [`Animation::set_frame`].
    pub fn frame(&self) -> ImageHandle {
        self.timeline.frames[self.timeline.frame_shown.get()]
    }

    pub fn needs_redraw(&self, now: TimeMs) -> bool {
        !self.is_static() && self.index_at(now) != self.timeline.frame_shown.get()
    }

    pub fn shares_timeline_with(&self, other: &Animation) -> bool {
        Rc::ptr_eq(&self.timeline, &other.timeline)
    }

    pub fn share_count(&self) -> usize {
        Rc::strong_count(&self.timeline)
    }

    fn index_at(&self, now: TimeMs) -> usize {
        let timeline = &self.timeline;
        if timeline.cycle_duration == 0 {
            return 0;
        }
        let elapsed = now.saturating_sub(timeline.offset.get());
        ((elapsed % timeline.cycle_duration) / timeline.frame_duration) as usize
    }
}
