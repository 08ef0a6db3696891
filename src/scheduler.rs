//! Decode request scheduling: issue, deduplicate, time out, cancel.
//!
//! Per cache position the lifecycle is NotRequested -> InFlight -> Resident,
//! with InFlight -> NotRequested on cancellation or timeout. The in-flight
//! table is keyed by position, which is the deduplication invariant: at most
//! one outstanding request per position.
//!
//! Completions arrive on a crossbeam channel owned here and are drained once
//! per tick on the control thread. Cancellation is advisory - a worker may
//! still complete a cancelled request, and that completion is discarded by
//! id mismatch rather than treated as an error.

use crate::cache::FrameCache;
use crate::source::{FrameRenderer, FrameRequest, RenderComplete, RequestId};
use crate::state::PlayerState;
use crate::time::RationalTime;
use crate::window::CacheWindow;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug)]
struct InFlight {
    id: RequestId,
    issued: Instant,
}

/// Schedules decode/compose work against the render collaborator for the
/// positions the cache window needs.
#[derive(Debug)]
pub struct RequestScheduler {
    in_flight: HashMap<i64, InFlight>,
    completion_tx: Sender<RenderComplete>,
    completion_rx: Receiver<RenderComplete>,
}

impl RequestScheduler {
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            in_flight: HashMap::new(),
            completion_tx,
            completion_rx,
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, index: i64) -> bool {
        self.in_flight.contains_key(&index)
    }

    /// Drain completed requests into the cache. Returns whether cache
    /// membership changed.
    ///
    /// A completion whose id no longer matches the in-flight entry for its
    /// position (cancelled and possibly reissued) is discarded. A decode
    /// failure is recorded as an unavailable placeholder so the position
    /// counts as resident and is not retried forever.
    pub fn drain(&mut self, cache: &mut FrameCache, window: &CacheWindow, playhead: i64) -> bool {
        let rate = cache.rate();
        let mut changed = false;
        while let Ok(completion) = self.completion_rx.try_recv() {
            let index = completion.time.frame_at(rate);
            match self.in_flight.get(&index) {
                Some(entry) if entry.id == completion.id => {
                    self.in_flight.remove(&index);
                    if !window.contains(index) {
                        // The window moved while the worker was busy
                        debug!("Discarding completion for stale position {}", index);
                        continue;
                    }
                    let frame = match completion.result {
                        Ok(output) => crate::frame::CachedFrame::new(
                            completion.time,
                            output.video,
                            output.audio,
                            0,
                        ),
                        Err(error) => {
                            warn!("Decode failed at frame {}: {}", index, error);
                            crate::frame::CachedFrame::unavailable(completion.time, 0)
                        }
                    };
                    cache.insert(index, frame, playhead);
                    changed = true;
                }
                _ => {
                    debug!("Discarding completion for cancelled request {}", completion.id);
                }
            }
        }
        changed
    }

    /// Cancel stale in-flight work and issue requests for uncovered window
    /// positions, nearest-to-playhead first, up to `state.request_count`.
    pub fn reconcile(
        &mut self,
        window: &CacheWindow,
        playhead: i64,
        cache: &FrameCache,
        renderer: &dyn FrameRenderer,
        state: &PlayerState,
    ) {
        // Timed-out requests return to NotRequested and are reissued below
        // if their position is still needed
        let timeout = state.request_timeout;
        let timed_out: Vec<i64> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.issued.elapsed() > timeout)
            .map(|(index, _)| *index)
            .collect();
        for index in timed_out {
            if let Some(entry) = self.in_flight.remove(&index) {
                warn!("Request for frame {} timed out after {:?}", index, timeout);
                renderer.cancel(entry.id);
            }
        }

        self.cancel_outside(window, renderer);

        let rate = cache.rate();
        for index in window.spiral(playhead, state.playback) {
            if self.in_flight.len() >= state.request_count {
                break;
            }
            if cache.contains(index) || self.in_flight.contains_key(&index) {
                continue;
            }
            let request = FrameRequest {
                id: Uuid::new_v4(),
                time: RationalTime::new(index as f64, rate),
                layer: state.video_layer,
            };
            renderer.request_frame(request.clone(), self.completion_tx.clone());
            self.in_flight.insert(
                index,
                InFlight {
                    id: request.id,
                    issued: Instant::now(),
                },
            );
        }
    }

    /// Cancel in-flight requests whose position fell outside the window
    /// (seek, direction reversal). Their positions return to NotRequested.
    pub fn cancel_outside(&mut self, window: &CacheWindow, renderer: &dyn FrameRenderer) {
        let stale: Vec<i64> = self
            .in_flight
            .keys()
            .filter(|index| !window.contains(**index))
            .copied()
            .collect();
        for index in stale {
            if let Some(entry) = self.in_flight.remove(&index) {
                debug!("Cancelling request for frame {} outside window", index);
                renderer.cancel(entry.id);
            }
        }
    }

    /// Cancel everything. Used at teardown and when the video layer
    /// changes (all in-flight compositions are for the wrong layer).
    pub fn cancel_all(&mut self, renderer: &dyn FrameRenderer) {
        for (index, entry) in self.in_flight.drain() {
            debug!("Cancelling request for frame {}", index);
            renderer.cancel(entry.id);
        }
    }
}

impl Default for RequestScheduler {
    fn default() -> Self {
        Self::new()
    }
}
