//! Resident frame cache with playhead-distance eviction.
//!
//! **Why**: Smooth playback needs produced frames resident in RAM around the
//! playhead. Temporal locality to the playhead predicts future need better
//! than recency of access, so eviction removes the frame farthest in time
//! from the current position, not the least recently used one.
//!
//! **Used by**: Player (frame lookup per tick), RequestScheduler (completion
//! insertion), cached-ranges publication
//!
//! # Ownership
//!
//! Mutated only by the control thread while draining completions; workers
//! never touch it. Consumers receive `CachedFrame` clones whose payloads are
//! shared read-only handles, valid until the position is evicted.

use crate::frame::CachedFrame;
use crate::time::{RationalTime, TimeRange};
use crate::window::CacheWindow;
use log::debug;
use std::collections::BTreeMap;

/// Frame cache keyed by frame index at the timeline rate.
#[derive(Debug)]
pub struct FrameCache {
    frames: BTreeMap<i64, CachedFrame>,
    max_resident: usize,
    rate: f64,
    /// Monotonic sequence number stamped onto inserted frames.
    produced: u64,
}

impl FrameCache {
    pub fn new(max_resident: usize, rate: f64) -> Self {
        Self {
            frames: BTreeMap::new(),
            max_resident: max_resident.max(1),
            rate,
            produced: 0,
        }
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, index: i64) -> bool {
        self.frames.contains_key(&index)
    }

    pub fn get(&self, index: i64) -> Option<&CachedFrame> {
        self.frames.get(&index)
    }

    /// Resize the resident budget (read-ahead/read-behind changed). Excess
    /// frames are dropped farthest-from-playhead first.
    pub fn set_max_resident(&mut self, max_resident: usize, playhead: i64) {
        self.max_resident = max_resident.max(1);
        while self.frames.len() > self.max_resident {
            if !self.evict_farthest(playhead) {
                break;
            }
        }
    }

    /// Insert a produced frame, stamping its production sequence number.
    /// When at capacity, the resident frame farthest from `playhead` is
    /// evicted first.
    pub fn insert(&mut self, index: i64, mut frame: CachedFrame, playhead: i64) {
        while self.frames.len() >= self.max_resident && !self.frames.contains_key(&index) {
            if !self.evict_farthest(playhead) {
                break;
            }
        }
        self.produced += 1;
        frame.produced_at = self.produced;
        self.frames.insert(index, frame);
    }

    /// Drop resident frames outside the window. Returns whether membership
    /// changed.
    pub fn retain_window(&mut self, window: &CacheWindow) -> bool {
        let before = self.frames.len();
        self.frames.retain(|index, _| window.contains(*index));
        let evicted = before - self.frames.len();
        if evicted > 0 {
            debug!("Evicted {} frames outside window [{}, {}]",
                   evicted, window.start(), window.end());
        }
        evicted > 0
    }

    fn evict_farthest(&mut self, playhead: i64) -> bool {
        let farthest = self
            .frames
            .keys()
            .max_by_key(|index| (*index - playhead).abs())
            .copied();
        if let Some(index) = farthest {
            self.frames.remove(&index);
            debug!("Evicted frame {} (distance {})", index, (index - playhead).abs());
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Ordered, non-overlapping time ranges covering the resident set.
    /// Consecutive indices coalesce into one range.
    pub fn cached_ranges(&self) -> Vec<TimeRange> {
        let mut ranges: Vec<TimeRange> = Vec::new();
        let mut run: Option<(i64, i64)> = None;
        for &index in self.frames.keys() {
            run = match run {
                Some((start, end)) if index == end + 1 => Some((start, index)),
                Some((start, end)) => {
                    ranges.push(self.range_for(start, end));
                    Some((index, index))
                }
                None => Some((index, index)),
            };
        }
        if let Some((start, end)) = run {
            ranges.push(self.range_for(start, end));
        }
        ranges
    }

    fn range_for(&self, start: i64, end: i64) -> TimeRange {
        TimeRange::new(
            RationalTime::new(start as f64, self.rate),
            RationalTime::new((end - start + 1) as f64, self.rate),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Payload;
    use crate::options::CacheOptions;
    use crate::state::Playback;

    fn frame_at(index: i64) -> CachedFrame {
        CachedFrame::new(
            RationalTime::new(index as f64, 24.0),
            Payload::new(index),
            None,
            0,
        )
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = FrameCache::new(8, 24.0);
        cache.insert(10, frame_at(10), 10);
        assert!(cache.contains(10));
        let frame = cache.get(10).unwrap();
        assert_eq!(frame.time, RationalTime::new(10.0, 24.0));
        assert_eq!(frame.produced_at, 1);
        assert!(!cache.contains(11));
    }

    /// Test: at capacity, the frame farthest from the playhead goes first
    /// Validates: distance-ordered eviction, not LRU
    #[test]
    fn test_eviction_farthest_from_playhead() {
        let mut cache = FrameCache::new(3, 24.0);
        // Insert in an order that would mislead an LRU: 3 is oldest but
        // nearest, 20 is newest-but-one and farthest
        cache.insert(3, frame_at(3), 4);
        cache.insert(20, frame_at(20), 4);
        cache.insert(5, frame_at(5), 4);
        assert_eq!(cache.len(), 3);

        cache.insert(4, frame_at(4), 4);
        assert!(!cache.contains(20)); // farthest evicted
        assert!(cache.contains(3));
        assert!(cache.contains(4));
        assert!(cache.contains(5));
    }

    #[test]
    fn test_retain_window() {
        let duration = RationalTime::new(240.0, 24.0);
        let window = CacheWindow::compute(
            RationalTime::from_seconds(5.0, 24.0),
            Playback::Stop,
            &CacheOptions::default(),
            duration,
        );
        let mut cache = FrameCache::new(100, 24.0);
        cache.insert(72, frame_at(72), 120); // 3s: outside [4.5s, 7s]
        cache.insert(120, frame_at(120), 120); // playhead
        cache.insert(168, frame_at(168), 120); // window edge

        assert!(cache.retain_window(&window));
        assert!(!cache.contains(72));
        assert!(cache.contains(120));
        assert!(cache.contains(168));
        // Second pass: nothing left to evict
        assert!(!cache.retain_window(&window));
    }

    #[test]
    fn test_cached_ranges_coalesce() {
        let mut cache = FrameCache::new(100, 24.0);
        for index in [0, 1, 2, 10, 11, 20] {
            cache.insert(index, frame_at(index), 0);
        }
        let ranges = cache.cached_ranges();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].start(), RationalTime::new(0.0, 24.0));
        assert_eq!(ranges[0].duration(), RationalTime::new(3.0, 24.0));
        assert_eq!(ranges[1].start(), RationalTime::new(10.0, 24.0));
        assert_eq!(ranges[1].duration(), RationalTime::new(2.0, 24.0));
        assert_eq!(ranges[2].start(), RationalTime::new(20.0, 24.0));
        assert_eq!(ranges[2].duration(), RationalTime::new(1.0, 24.0));
    }

    #[test]
    fn test_produced_sequence_is_monotonic() {
        let mut cache = FrameCache::new(4, 24.0);
        cache.insert(0, frame_at(0), 0);
        cache.insert(1, frame_at(1), 0);
        let a = cache.get(0).unwrap().produced_at;
        let b = cache.get(1).unwrap().produced_at;
        assert!(b > a);
    }

    #[test]
    fn test_shrink_budget_evicts() {
        let mut cache = FrameCache::new(8, 24.0);
        for index in 0..8 {
            cache.insert(index, frame_at(index), 0);
        }
        cache.set_max_resident(3, 0);
        assert_eq!(cache.len(), 3);
        // Nearest to the playhead survive
        assert!(cache.contains(0));
        assert!(cache.contains(1));
        assert!(cache.contains(2));
    }
}
