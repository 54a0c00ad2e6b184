//! Quadrature encoder position tracking.
//!
//! The hardware pulse counter is only 16 bits wide. When it reaches one of
//! its limits the value is folded into a 64-bit software accumulator and the
//! counter is cleared, so callers only ever see the absolute tick count.

use std::hint;
use std::sync::atomic::{fence, AtomicBool, AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Hardware pulse counter.
pub trait PulseCounter {
    /// Current live count, between the configured limits.
    fn read(&self) -> i32;
    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Travel per tick.
    pub resolution_mm: f64,
    pub high_limit: i32,
    pub low_limit: i32,
    /// Zero automatically the first time the carriage rests near the origin.
    pub auto_zero: bool,
    pub auto_zero_window_mm: f64,
    /// Polls without a tick change before the reading is reported stationary.
    pub stationary_polls: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            resolution_mm: 0.005,
            high_limit: 32767,
            low_limit: -32768,
            auto_zero: true,
            auto_zero_window_mm: 0.5,
            // 0.5 s at the 100 Hz poll rate
            stationary_polls: 50,
        }
    }
}

/// Snapshot produced by each poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub count: i64,
    pub position_mm: f64,
    pub stationary: bool,
}

pub struct PositionTracker<C: PulseCounter> {
    counter: C,
    settings: EncoderSettings,
    accumulated: i64,
    zero_offset_mm: f64,
    zeroed: bool,
    last_count: Option<i64>,
    unchanged_polls: u32,
}

impl<C: PulseCounter> PositionTracker<C> {
    pub fn new(counter: C, settings: EncoderSettings) -> Self {
        Self {
            counter,
            settings,
            accumulated: 0,
            zero_offset_mm: 0.0,
            zeroed: false,
            last_count: None,
            unchanged_polls: 0,
        }
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Absolute tick count since start.
    pub fn count(&self) -> i64 {
        self.accumulated + i64::from(self.counter.read())
    }

    pub fn position_mm(&self) -> f64 {
        self.count() as f64 * self.settings.resolution_mm - self.zero_offset_mm
    }

    pub fn zero_offset_mm(&self) -> f64 {
        self.zero_offset_mm
    }

    /// Make the current position the origin. Calling it twice without
    /// movement leaves the offset unchanged.
    pub fn zero(&mut self) {
        self.zero_offset_mm = self.count() as f64 * self.settings.resolution_mm;
        self.zeroed = true;
        info!(zero_offset_mm = self.zero_offset_mm, "Encoder zeroed");
    }

    /// Restore a previously stored origin.
    pub fn set_zero_position(&mut self, zero_offset_mm: f64) {
        self.zero_offset_mm = zero_offset_mm;
        self.zeroed = true;
        info!(zero_offset_mm, "Encoder zero restored");
    }

    pub fn is_zeroed(&self) -> bool {
        self.zeroed
    }

    /// Counter limit event. `value` is the limit that was reached.
    pub fn on_watch_point(&mut self, value: i32) {
        self.accumulated += i64::from(value);
        self.counter.clear();
        debug!(value, accumulated = self.accumulated, "Counter limit folded");
    }

    fn fold_if_at_limit(&mut self) {
        let live = self.counter.read();
        if live >= self.settings.high_limit || live <= self.settings.low_limit {
            self.on_watch_point(live);
        }
    }

    /// Periodic update: fold a saturated counter, apply auto-zero, and track
    /// whether the reading has stopped changing.
    pub fn poll(&mut self) -> PositionSample {
        self.fold_if_at_limit();

        if self.settings.auto_zero
            && !self.zeroed
            && self.position_mm().abs() < self.settings.auto_zero_window_mm
        {
            self.zero();
        }

        let count = self.count();
        if self.last_count == Some(count) {
            self.unchanged_polls = self.unchanged_polls.saturating_add(1);
        } else {
            self.unchanged_polls = 0;
            self.last_count = Some(count);
        }

        PositionSample {
            count,
            position_mm: self.position_mm(),
            stationary: self.unchanged_polls >= self.settings.stationary_polls,
        }
    }
}

/// Latest position shared lock-free between the encoder task and readers.
///
/// A sequence counter guards the three fields: it is odd while a publish is
/// in progress, and [`load`](Self::load) retries until it reads the same
/// even value before and after copying them. There must be one publisher.
#[derive(Debug, Default)]
pub struct PositionCell {
    seq: AtomicU64,
    position_bits: AtomicU64,
    count: AtomicI64,
    stationary: AtomicBool,
}

impl PositionCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, sample: &PositionSample) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.count.store(sample.count, Ordering::Relaxed);
        self.stationary.store(sample.stationary, Ordering::Relaxed);
        self.position_bits
            .store(sample.position_mm.to_bits(), Ordering::Relaxed);

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Latest position alone; a single atomic read.
    pub fn position_mm(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Acquire))
    }

    /// Consistent snapshot of one published sample.
    pub fn load(&self) -> PositionSample {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                hint::spin_loop();
                continue;
            }

            let sample = PositionSample {
                count: self.count.load(Ordering::Relaxed),
                position_mm: f64::from_bits(self.position_bits.load(Ordering::Relaxed)),
                stationary: self.stationary.load(Ordering::Relaxed),
            };

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return sample;
            }
            hint::spin_loop();
        }
    }
}
