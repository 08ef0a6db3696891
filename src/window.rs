//! Cache window policy: which frame positions should be resident.
//!
//! The window is `[currentTime - readBehind, currentTime + readAhead]`
//! clamped to the timeline, widened by one frame in the direction of travel
//! while playing so a direction change never starves the first frame it
//! needs. Positions are whole frame indices at the timeline rate.

use crate::options::CacheOptions;
use crate::state::Playback;
use crate::time::RationalTime;

/// Inclusive frame-index bounds of the resident window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWindow {
    start: i64,
    end: i64,
}

impl CacheWindow {
    /// Compute the window for the current playhead.
    ///
    /// `duration`'s rate is the frame-index rate; the window is clamped to
    /// `[0, last frame]`.
    pub fn compute(
        current_time: RationalTime,
        playback: Playback,
        options: &CacheOptions,
        duration: RationalTime,
    ) -> Self {
        let rate = duration.rate();
        let last = (duration.value().round() as i64 - 1).max(0);
        let playhead = current_time.frame_at(rate);

        let behind = options.read_behind.rescaled_to(rate).value().round().max(0.0) as i64;
        let ahead = options.read_ahead.rescaled_to(rate).value().round().max(0.0) as i64;

        let mut start = playhead - behind;
        let mut end = playhead + ahead;
        // Bias one frame toward the direction of travel
        match playback {
            Playback::Forward => end += 1,
            Playback::Reverse => start -= 1,
            Playback::Stop => {}
        }

        start = start.clamp(0, last);
        end = end.clamp(0, last);
        if end < start {
            end = start;
        }
        Self { start, end }
    }

    #[inline]
    pub fn start(&self) -> i64 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn contains(&self, index: i64) -> bool {
        index >= self.start && index <= self.end
    }

    /// Number of positions in the window; never zero, the playhead frame
    /// is always included.
    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    /// Iterate window positions playhead-out: the playhead frame first,
    /// then alternating outward, biased toward the direction of travel.
    /// This is the order requests should be issued in - temporal locality
    /// to the playhead predicts need better than any fixed scan.
    pub fn spiral(&self, playhead: i64, playback: Playback) -> Vec<i64> {
        let playhead = playhead.clamp(self.start, self.end);
        let mut order = Vec::with_capacity(self.len());
        order.push(playhead);
        let max_offset = (playhead - self.start).max(self.end - playhead);
        for offset in 1..=max_offset {
            let (first, second) = match playback {
                Playback::Reverse => (playhead - offset, playhead + offset),
                _ => (playhead + offset, playhead - offset),
            };
            if first >= self.start && first <= self.end {
                order.push(first);
            }
            if second >= self.start && second <= self.end {
                order.push(second);
            }
        }
        order
    }
}
