//! Frame-driven zoom and fling animations

use std::time::{Duration, Instant};

use crate::geometry::Point;

/// Reference frame length for per-frame decay factors
const FRAME: Duration = Duration::from_millis(16);

/// Flings stop below this speed (pixels per second)
pub const FLING_MIN_SPEED: f32 = 20.0;

/// Quadratic ease-out: fast start, gentle landing
pub fn ease_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}

/// Animated scale change anchored at a focal point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomAnimation {
    pub from: f32,
    pub to: f32,
    pub focal: Point,
    pub start: Instant,
    pub duration: Duration,
}

impl ZoomAnimation {
    pub fn new(from: f32, to: f32, focal: Point, start: Instant, duration: Duration) -> Self {
        Self { from, to, focal, start, duration }
    }

    /// Eased progress in `[0, 1]` at `now`
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start).as_secs_f32();
        ease_out(elapsed / self.duration.as_secs_f32())
    }

    /// Interpolated scale at `now`
    pub fn scale_at(&self, now: Instant) -> f32 {
        let progress = self.progress(now);
        if progress >= 1.0 {
            self.to
        } else {
            self.from + (self.to - self.from) * progress
        }
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.start) >= self.duration
    }
}

/// Inertial scroll with exponential velocity decay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlingAnimation {
    /// Pixels per second
    pub velocity: Point,
    /// Fraction of velocity retained per 16 ms frame
    pub decay: f32,
    pub last_tick: Instant,
}

impl FlingAnimation {
    pub fn new(velocity: Point, decay: f32, start: Instant) -> Self {
        Self { velocity, decay, last_tick: start }
    }

    /// Advance to `now`, returning the scroll delta covered since the last step
    pub fn step(&mut self, now: Instant) -> Point {
        let dt = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        if dt.is_zero() {
            return Point::default();
        }

        let seconds = dt.as_secs_f32();
        let delta = Point::new(self.velocity.x * seconds, self.velocity.y * seconds);

        let retained = self.decay.powf(seconds / FRAME.as_secs_f32());
        self.velocity = Point::new(self.velocity.x * retained, self.velocity.y * retained);
        delta
    }

    pub fn speed(&self) -> f32 {
        self.velocity.x.hypot(self.velocity.y)
    }

    pub fn is_finished(&self) -> bool {
        self.speed() < FLING_MIN_SPEED
    }
}
