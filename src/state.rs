//! Playback state machine: modes, loop behavior, and time advance math.
//!
//! **Why**: Transport correctness is all boundary arithmetic. Loop wrap has
//! to preserve the fractional overshoot (modular arithmetic over the in/out
//! duration) or playback speed drifts at every loop point; ping-pong and
//! play-once clamp instead.
//!
//! **Used by**: Player (tick advance, explicit operations)
//!
//! The advance math is pure functions over `PlayerState` so boundary cases
//! are unit-testable without a clock thread.

use crate::time::{RationalTime, TimeRange};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback transport mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Playback {
    Stop,
    Forward,
    Reverse,
}

/// Behavior at the in/out boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loop {
    /// Wrap to the opposite boundary, carrying the overshoot.
    Loop,
    /// Clamp to the boundary and stop.
    Once,
    /// Clamp to the boundary and reverse direction.
    PingPong,
}

/// Convenience seeks relative to the current position or range bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeAction {
    Start,
    End,
    FramePrev,
    FramePrevX10,
    FramePrevX100,
    FrameNext,
    FrameNextX10,
    FrameNextX100,
}

/// The authoritative mutable playback core. One writer (the control
/// thread); readers observe through the player's publishers.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub current_time: RationalTime,
    pub playback: Playback,
    pub loop_mode: Loop,
    pub in_out_range: TimeRange,
    pub speed: f32,
    pub video_layer: u16,
    /// Maximum in-flight decode requests.
    pub request_count: usize,
    /// How long a request may stay in flight before it is treated as
    /// failed and retriable.
    pub request_timeout: Duration,
}

impl PlayerState {
    pub fn new(initial_time: RationalTime, duration: RationalTime) -> Self {
        let rate = duration.rate();
        let full_range = TimeRange::new(RationalTime::zero(rate), duration);
        Self {
            current_time: full_range.clamp(initial_time.rescaled_to(rate)),
            playback: Playback::Stop,
            loop_mode: Loop::Loop,
            in_out_range: full_range,
            speed: 1.0,
            video_layer: 0,
            request_count: 16,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Wrap `time` into `range` by modular arithmetic over the range duration,
/// preserving fractional overshoot.
pub fn loop_time(time: RationalTime, range: &TimeRange) -> RationalTime {
    let rate = range.start().rate();
    let duration = range.duration().rescaled_to(rate).value();
    if duration <= 0.0 {
        return range.start();
    }
    let offset = (time - range.start()).rescaled_to(rate).value();
    range.start() + RationalTime::new(offset.rem_euclid(duration), rate)
}

/// Advance `state.current_time` by `elapsed` wall time at `state.speed`,
/// applying the loop behavior at the in/out boundary.
///
/// Returns the new current time and playback mode; the caller publishes
/// both through its change-filtered observables.
pub fn advance(state: &PlayerState, elapsed: Duration) -> (RationalTime, Playback) {
    let current = state.current_time;
    if state.playback == Playback::Stop {
        return (current, Playback::Stop);
    }

    let rate = current.rate();
    let step = RationalTime::from_seconds(elapsed.as_secs_f64() * state.speed as f64, rate);
    let proposed = match state.playback {
        Playback::Forward => current + step,
        Playback::Reverse => current - step,
        Playback::Stop => unreachable!(),
    };

    let range = state.in_out_range;
    let exited = match state.playback {
        Playback::Forward => proposed >= range.end_exclusive(),
        Playback::Reverse => proposed < range.start(),
        Playback::Stop => false,
    };
    if !exited {
        return (proposed, state.playback);
    }

    match state.loop_mode {
        Loop::Loop => (loop_time(proposed, &range), state.playback),
        Loop::Once => {
            // Clamp to an addressable frame: the exclusive end has no frame
            let boundary = match state.playback {
                Playback::Forward => range.end_inclusive(),
                _ => range.start(),
            };
            (boundary, Playback::Stop)
        }
        Loop::PingPong => {
            let (boundary, flipped) = match state.playback {
                Playback::Forward => (range.end_inclusive(), Playback::Reverse),
                _ => (range.start(), Playback::Forward),
            };
            (boundary, flipped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_10s_at_24(current_secs: f64) -> PlayerState {
        let duration = RationalTime::new(240.0, 24.0); // 10s
        let mut state = PlayerState::new(RationalTime::zero(24.0), duration);
        state.current_time = RationalTime::from_seconds(current_secs, 24.0);
        state
    }

    #[test]
    fn test_stopped_does_not_advance() {
        let state = state_10s_at_24(5.0);
        let (time, playback) = advance(&state, Duration::from_secs(1));
        assert_eq!(time, state.current_time);
        assert_eq!(playback, Playback::Stop);
    }

    /// Test: Forward, speed=1.0, tick=1s, range=[0,10]@Loop, current=9.6s
    /// Validates: next tick wraps to 0.6s, overshoot preserved
    #[test]
    fn test_loop_wrap_preserves_overshoot() {
        let mut state = state_10s_at_24(9.6);
        state.playback = Playback::Forward;
        state.loop_mode = Loop::Loop;
        let (time, playback) = advance(&state, Duration::from_secs(1));
        assert!((time.to_seconds() - 0.6).abs() < 1e-9);
        assert_eq!(playback, Playback::Forward);
    }

    #[test]
    fn test_loop_wrap_reverse() {
        let mut state = state_10s_at_24(0.4);
        state.playback = Playback::Reverse;
        state.loop_mode = Loop::Loop;
        let (time, playback) = advance(&state, Duration::from_secs(1));
        assert!((time.to_seconds() - 9.4).abs() < 1e-9);
        assert_eq!(playback, Playback::Reverse);
    }

    /// Test: Once at the out boundary stops on the last frame, not one past it
    /// Validates: the stopped playhead is always an addressable position
    #[test]
    fn test_once_clamps_and_stops() {
        let mut state = state_10s_at_24(9.6);
        state.playback = Playback::Forward;
        state.loop_mode = Loop::Once;
        let (time, playback) = advance(&state, Duration::from_secs(1));
        assert_eq!(time, state.in_out_range.end_inclusive());
        assert_eq!(time.frame_at(24.0), 239);
        assert_eq!(playback, Playback::Stop);
    }

    #[test]
    fn test_ping_pong_clamps_and_flips() {
        let mut state = state_10s_at_24(9.6);
        state.playback = Playback::Forward;
        state.loop_mode = Loop::PingPong;
        let (time, playback) = advance(&state, Duration::from_secs(1));
        assert_eq!(time, state.in_out_range.end_inclusive());
        assert_eq!(playback, Playback::Reverse);

        let mut state = state_10s_at_24(0.2);
        state.playback = Playback::Reverse;
        state.loop_mode = Loop::PingPong;
        let (time, playback) = advance(&state, Duration::from_secs(1));
        assert_eq!(time, state.in_out_range.start());
        assert_eq!(playback, Playback::Forward);
    }

    #[test]
    fn test_speed_scales_advance() {
        let mut state = state_10s_at_24(2.0);
        state.playback = Playback::Forward;
        state.speed = 2.0;
        let (time, _) = advance(&state, Duration::from_secs(1));
        assert!((time.to_seconds() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_loop_time_inside_range_unchanged() {
        let range = TimeRange::new(RationalTime::zero(24.0), RationalTime::new(240.0, 24.0));
        let t = RationalTime::new(100.0, 24.0);
        assert_eq!(loop_time(t, &range), t);
    }

    #[test]
    fn test_advance_respects_in_out_subrange() {
        // Range [2s, 8s), playing forward from 7.8s with Loop
        let duration = RationalTime::new(240.0, 24.0);
        let mut state = PlayerState::new(RationalTime::zero(24.0), duration);
        state.in_out_range = TimeRange::new(
            RationalTime::from_seconds(2.0, 24.0),
            RationalTime::from_seconds(6.0, 24.0),
        );
        state.current_time = RationalTime::from_seconds(7.8, 24.0);
        state.playback = Playback::Forward;
        let (time, _) = advance(&state, Duration::from_secs(1));
        // 7.8 + 1.0 = 8.8, wraps to 2.0 + 0.8
        assert!((time.to_seconds() - 2.8).abs() < 1e-9);
    }
}
