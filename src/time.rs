//! Rational time values and time ranges
//!
//! **Why**: Editorial media addresses time as frames at a rate, not wall
//! clock. Mixing rates (24fps timeline, 1.0-rate durations from options)
//! requires rescaling before any arithmetic or comparison.
//!
//! **Used by**: Player (current time, in/out range), FrameCache (frame
//! indexing), CacheWindow (read-ahead/read-behind math)

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::{Add, Sub};

/// A time value expressed as `value` units at `rate` units per second.
///
/// Follows the OpenTimelineIO convention: `RationalTime::new(48.0, 24.0)`
/// is two seconds. Arithmetic rescales the right operand to the left
/// operand's rate, so `2s@1.0 + 12f@24.0` yields `2.5s@1.0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RationalTime {
    value: f64,
    rate: f64,
}

impl RationalTime {
    pub fn new(value: f64, rate: f64) -> Self {
        Self { value, rate }
    }

    /// Zero at the given rate.
    pub fn zero(rate: f64) -> Self {
        Self { value: 0.0, rate }
    }

    /// Construct from seconds at the given rate.
    pub fn from_seconds(seconds: f64, rate: f64) -> Self {
        Self {
            value: seconds * rate,
            rate,
        }
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn to_seconds(&self) -> f64 {
        if self.rate != 0.0 {
            self.value / self.rate
        } else {
            0.0
        }
    }

    /// Same point in time expressed at a different rate.
    pub fn rescaled_to(&self, rate: f64) -> Self {
        if self.rate == rate || self.rate == 0.0 {
            return Self { value: self.value, rate };
        }
        Self {
            value: self.value * (rate / self.rate),
            rate,
        }
    }

    /// Snap down to a whole frame at this time's rate.
    pub fn floor(&self) -> Self {
        Self {
            value: self.value.floor(),
            rate: self.rate,
        }
    }

    /// Snap to the nearest whole frame at this time's rate.
    pub fn round(&self) -> Self {
        Self {
            value: self.value.round(),
            rate: self.rate,
        }
    }

    /// Whole-frame index at the given rate (nearest frame).
    pub fn frame_at(&self, rate: f64) -> i64 {
        self.rescaled_to(rate).value.round() as i64
    }

    /// Duration of a single frame at `rate`.
    pub fn frame_duration(rate: f64) -> Self {
        Self { value: 1.0, rate }
    }

    pub fn clamp(&self, min: RationalTime, max: RationalTime) -> Self {
        if *self < min {
            min
        } else if *self > max {
            max
        } else {
            *self
        }
    }
}

impl PartialEq for RationalTime {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.rescaled_to(self.rate).value
    }
}

impl PartialOrd for RationalTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.rescaled_to(self.rate).value)
    }
}

impl Add for RationalTime {
    type Output = RationalTime;
    fn add(self, rhs: RationalTime) -> RationalTime {
        RationalTime {
            value: self.value + rhs.rescaled_to(self.rate).value,
            rate: self.rate,
        }
    }
}

impl Sub for RationalTime {
    type Output = RationalTime;
    fn sub(self, rhs: RationalTime) -> RationalTime {
        RationalTime {
            value: self.value - rhs.rescaled_to(self.rate).value,
            rate: self.rate,
        }
    }
}

/// A half-open span of timeline: `[start, start + duration)`.
///
/// The exclusive end is the loop/wrap boundary; the inclusive end is the
/// last addressable frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    start: RationalTime,
    duration: RationalTime,
}

impl TimeRange {
    pub fn new(start: RationalTime, duration: RationalTime) -> Self {
        Self { start, duration }
    }

    /// Range covering `[start, end)`.
    pub fn from_start_end(start: RationalTime, end: RationalTime) -> Self {
        Self {
            start,
            duration: end - start,
        }
    }

    #[inline]
    pub fn start(&self) -> RationalTime {
        self.start
    }

    #[inline]
    pub fn duration(&self) -> RationalTime {
        self.duration
    }

    pub fn end_exclusive(&self) -> RationalTime {
        self.start + self.duration
    }

    /// Last whole frame inside the range.
    pub fn end_inclusive(&self) -> RationalTime {
        self.end_exclusive() - RationalTime::frame_duration(self.start.rate())
    }

    pub fn contains(&self, time: RationalTime) -> bool {
        time >= self.start && time < self.end_exclusive()
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start < other.end_exclusive() && other.start < self.end_exclusive()
    }

    pub fn intersection(&self, other: &TimeRange) -> Option<TimeRange> {
        if !self.intersects(other) {
            return None;
        }
        let start = if self.start > other.start { self.start } else { other.start };
        let end = if self.end_exclusive() < other.end_exclusive() {
            self.end_exclusive()
        } else {
            other.end_exclusive()
        };
        Some(TimeRange::from_start_end(start, end))
    }

    /// Clamp a time into `[start, start + duration]`.
    ///
    /// The exclusive end is a valid clamp target: seeking past the out
    /// point lands exactly on the boundary.
    pub fn clamp(&self, time: RationalTime) -> RationalTime {
        time.clamp(self.start, self.end_exclusive())
    }
}

impl PartialEq for TimeRange {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.duration == other.duration
    }
}
