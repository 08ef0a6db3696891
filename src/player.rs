//! Timeline player: transport operations, tick loop, and state publication.
//!
//! **Why**: Professional playback requires:
//! - Wall-clock-measured time advance (scheduling jitter must not change speed)
//! - A bounded frame cache kept warm around the playhead
//! - Audio that mutes briefly instead of glitching when frames run late
//!
//! **Used by**: Host applications (UI or headless), through operations and
//! per-field observables
//!
//! # Threading
//!
//! One internal clock thread owns the tick. Explicit operations (seek,
//! play, set-in/out, ...) and the tick both mutate the core through a
//! single mutex; decode completions arrive only via the scheduler's
//! channel, drained inside the tick. Workers never touch the cache.
//! Observables are written after the core lock is released, so subscriber
//! callbacks may call back into player getters. Each publish carries a
//! sequence number taken under the lock; a racing publish that lost the
//! lock arrives stale and is discarded, keeping the published values in
//! core-mutation order.
//!
//! # Tick pipeline
//!
//! advance time -> compute cache window -> drain completions -> evict
//! outside window -> cancel/issue requests -> publish changes.

use crate::audio::AudioMonitor;
use crate::cache::FrameCache;
use crate::frame::CachedFrame;
use crate::observe::{Observable, ObservableList};
use crate::options::{CacheOptions, PlayerOptions};
use crate::scheduler::RequestScheduler;
use crate::source::{AudioDevice, DeviceInfo, FrameRenderer, TimelineSource};
use crate::state::{advance, Loop, Playback, PlayerState, TimeAction};
use crate::time::{RationalTime, TimeRange};
use crate::window::CacheWindow;
use anyhow::{bail, Result};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Mutable core: playback state, cache, scheduler, sync bookkeeping.
/// Single-writer discipline is the mutex around this struct.
struct Core {
    state: PlayerState,
    cache_options: CacheOptions,
    cache: FrameCache,
    scheduler: RequestScheduler,
    last_tick: Option<Instant>,
    /// Deadline of the current audio mute window, if a stutter is active.
    mute_deadline: Option<Instant>,
    stutter_muted: bool,
    stutter_reported: bool,
    user_mute: bool,
}

/// Per-field publishers. Each is independent; no cross-field atomicity.
struct Observables {
    speed: Observable<f32>,
    playback: Observable<Playback>,
    loop_mode: Observable<Loop>,
    current_time: Observable<RationalTime>,
    in_out_range: Observable<TimeRange>,
    video_layer: Observable<u16>,
    frame: Observable<CachedFrame>,
    cached_frames: ObservableList<TimeRange>,
    mute: Observable<bool>,
}

struct Shared {
    renderer: Arc<dyn FrameRenderer>,
    timeline: Arc<dyn TimelineSource>,
    duration: RationalTime,
    rate: f64,
    core: Mutex<Core>,
    observables: Observables,
    device_info: Observable<Option<DeviceInfo>>,
    /// Publish sequence source. Taken while holding the core lock so the
    /// observables receive values in core-mutation order even though the
    /// writes themselves happen after the lock is released.
    publish_seq: AtomicU64,
}

impl Shared {
    /// Next publish sequence. Call while holding the core lock.
    fn next_seq(&self) -> u64 {
        self.publish_seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Timeline playback and frame cache engine.
///
/// Owns the clock thread and the audio monitor; dropping the player stops
/// both and cancels all in-flight decode requests.
pub struct Player {
    shared: Arc<Shared>,
    audio_monitor: AudioMonitor,
    running: Arc<AtomicBool>,
    clock: Option<thread::JoinHandle<()>>,
}

impl Player {
    /// Create a player over the given collaborators.
    ///
    /// `initial_time` is clamped into the timeline; the clock thread and
    /// the audio device monitor start immediately. Playback starts stopped.
    pub fn new(
        timeline: Arc<dyn TimelineSource>,
        renderer: Arc<dyn FrameRenderer>,
        audio_device: Arc<dyn AudioDevice>,
        options: PlayerOptions,
    ) -> Result<Self> {
        let duration = timeline.duration();
        let rate = duration.rate();
        if !(duration.value() > 0.0) || !(rate > 0.0) {
            bail!("timeline has no duration");
        }
        if options.cache.read_ahead.value() < 0.0 || options.cache.read_behind.value() < 0.0 {
            bail!("cache read ahead/behind must be non-negative");
        }
        if options.audio_buffer_frame_count == 0 {
            bail!("audio buffer frame count must be positive");
        }
        if options.tick_interval.is_zero() {
            bail!("tick interval must be positive");
        }

        let state = PlayerState::new(options.initial_time, duration);
        let cache = FrameCache::new(options.cache.max_resident(rate), rate);

        info!(
            "Player created: duration {:.2}s @ {} fps, {} tracks",
            duration.to_seconds(),
            rate,
            timeline.track_count()
        );

        let observables = Observables {
            speed: Observable::new(state.speed),
            playback: Observable::new(state.playback),
            loop_mode: Observable::new(state.loop_mode),
            current_time: Observable::new(state.current_time),
            in_out_range: Observable::new(state.in_out_range),
            video_layer: Observable::new(state.video_layer),
            frame: Observable::new(CachedFrame::empty(state.current_time)),
            cached_frames: Observable::new(Vec::new()),
            mute: Observable::new(false),
        };

        let audio_monitor = AudioMonitor::start(audio_device);

        let shared = Arc::new(Shared {
            renderer,
            timeline,
            duration,
            rate,
            core: Mutex::new(Core {
                state,
                cache_options: options.cache,
                cache,
                scheduler: RequestScheduler::new(),
                last_tick: None,
                mute_deadline: None,
                stutter_muted: false,
                stutter_reported: false,
                user_mute: false,
            }),
            observables,
            device_info: audio_monitor.observe_device(),
            publish_seq: AtomicU64::new(0),
        });

        let running = Arc::new(AtomicBool::new(true));
        let clock = {
            let shared = Arc::clone(&shared);
            let running = Arc::clone(&running);
            let tick_interval = options.tick_interval;
            let mute_timeout = options.mute_timeout;
            thread::Builder::new()
                .name("playhead-clock".to_string())
                .spawn(move || {
                    debug!("Clock started, tick interval {:?}", tick_interval);
                    while running.load(Ordering::Relaxed) {
                        thread::sleep(tick_interval);
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        Self::tick(&shared, mute_timeout);
                    }
                    debug!("Clock stopped");
                })?
        };

        Ok(Self {
            shared,
            audio_monitor,
            running,
            clock: Some(clock),
        })
    }

    // ========== Tick ==========

    /// One tick cycle. Runs on the clock thread; measures actual elapsed
    /// wall time rather than assuming the nominal interval.
    fn tick(shared: &Shared, mute_timeout: Duration) {
        let now = Instant::now();

        // Collected under the lock, published after it is released
        let mut publish_time = None;
        let mut publish_playback = None;
        let mut publish_frame = None;
        let mut publish_ranges = None;

        {
            let mut core = shared.core.lock().expect("lock");
            let elapsed = core.last_tick.map(|t| now - t).unwrap_or_default();
            core.last_tick = Some(now);

            let (new_time, new_playback) = advance(&core.state, elapsed);
            if new_time != core.state.current_time {
                core.state.current_time = new_time;
                publish_time = Some((shared.next_seq(), new_time));
            }
            if new_playback != core.state.playback {
                core.state.playback = new_playback;
                publish_playback = Some((shared.next_seq(), new_playback));
                if new_playback == Playback::Stop {
                    // Reaching the Once boundary is a clean stop, not a stutter
                    core.mute_deadline = None;
                    core.stutter_muted = false;
                    core.stutter_reported = false;
                }
            }

            let playhead = core.state.current_time.frame_at(shared.rate);
            let window = CacheWindow::compute(
                core.state.current_time,
                core.state.playback,
                &core.cache_options,
                shared.duration,
            );

            let mut cache_changed = false;
            {
                let Core { cache, scheduler, .. } = &mut *core;
                cache_changed |= scheduler.drain(cache, &window, playhead);
                cache_changed |= cache.retain_window(&window);
            }
            {
                let Core { cache, scheduler, state, .. } = &mut *core;
                scheduler.reconcile(&window, playhead, cache, shared.renderer.as_ref(), state);
            }
            if cache_changed {
                publish_ranges = Some((shared.next_seq(), core.cache.cached_ranges()));
            }

            // Audio/video sync: present the playhead frame if resident,
            // including failed-decode placeholders (consumers check
            // availability); otherwise leave the frame stale and mute audio
            // for a bounded window. Time keeps advancing either way.
            let playing = core.state.playback != Playback::Stop;
            match core.cache.get(playhead) {
                Some(frame) => {
                    publish_frame = Some((shared.next_seq(), frame.clone()));
                    if core.stutter_muted {
                        debug!("Frames caught up, unmuting audio");
                    }
                    core.mute_deadline = None;
                    core.stutter_muted = false;
                    core.stutter_reported = false;
                }
                None if playing => {
                    if core.mute_deadline.is_none() {
                        core.mute_deadline = Some(now + mute_timeout);
                        core.stutter_muted = true;
                        debug!("Frame {} not resident, muting audio", playhead);
                    } else if let Some(deadline) = core.mute_deadline {
                        if now > deadline && !core.stutter_reported {
                            warn!(
                                "Playback stutter: frames unavailable past {:?}, transport continues",
                                mute_timeout
                            );
                            core.stutter_reported = true;
                        }
                    }
                }
                None => {}
            }
        }

        if let Some((seq, time)) = publish_time {
            shared.observables.current_time.set_ordered(seq, time);
        }
        if let Some((seq, playback)) = publish_playback {
            shared.observables.playback.set_ordered(seq, playback);
        }
        if let Some((seq, frame)) = publish_frame {
            shared.observables.frame.set_ordered(seq, frame);
        }
        if let Some((seq, ranges)) = publish_ranges {
            shared.observables.cached_frames.set_ordered(seq, ranges);
        }
    }

    // ========== Transport operations ==========

    pub fn set_speed(&self, speed: f32) {
        let speed = speed.max(0.0);
        let seq;
        {
            let mut core = self.shared.core.lock().expect("lock");
            core.state.speed = speed;
            seq = self.shared.next_seq();
        }
        self.shared.observables.speed.set_ordered(seq, speed);
    }

    pub fn set_playback(&self, playback: Playback) {
        let seq;
        {
            let mut core = self.shared.core.lock().expect("lock");
            if core.state.playback == playback {
                return;
            }
            core.state.playback = playback;
            if playback == Playback::Stop {
                // A stopped player is never stuttering
                core.mute_deadline = None;
                core.stutter_muted = false;
                core.stutter_reported = false;
            }
            debug!("Playback -> {:?} at {:.3}s", playback, core.state.current_time.to_seconds());
            seq = self.shared.next_seq();
        }
        self.shared.observables.playback.set_ordered(seq, playback);
    }

    pub fn stop(&self) {
        self.set_playback(Playback::Stop);
    }

    pub fn forward(&self) {
        self.set_playback(Playback::Forward);
    }

    pub fn reverse(&self) {
        self.set_playback(Playback::Reverse);
    }

    /// Stopped -> Forward; Forward or Reverse -> Stopped.
    pub fn toggle_playback(&self) {
        let playback = self.playback();
        self.set_playback(match playback {
            Playback::Stop => Playback::Forward,
            _ => Playback::Stop,
        });
    }

    pub fn set_loop(&self, loop_mode: Loop) {
        let seq;
        {
            let mut core = self.shared.core.lock().expect("lock");
            core.state.loop_mode = loop_mode;
            seq = self.shared.next_seq();
        }
        self.shared.observables.loop_mode.set_ordered(seq, loop_mode);
    }

    /// Seek to `time`, clamped into the in/out range. The cache window
    /// moves discontinuously, so in-flight requests outside the new window
    /// are flushed immediately rather than waiting for the next tick.
    pub fn seek(&self, time: RationalTime) {
        let published;
        let seq;
        {
            let mut core = self.shared.core.lock().expect("lock");
            let clamped = core.state.in_out_range.clamp(time.rescaled_to(self.shared.rate));
            if clamped == core.state.current_time {
                return;
            }
            core.state.current_time = clamped;
            // The mute window belonged to the old position
            core.mute_deadline = None;
            core.stutter_muted = false;
            core.stutter_reported = false;

            let window = CacheWindow::compute(
                clamped,
                core.state.playback,
                &core.cache_options,
                self.shared.duration,
            );
            let Core { scheduler, .. } = &mut *core;
            scheduler.cancel_outside(&window, self.shared.renderer.as_ref());
            published = clamped;
            seq = self.shared.next_seq();
        }
        self.shared.observables.current_time.set_ordered(seq, published);
    }

    pub fn time_action(&self, action: TimeAction) {
        let frame = RationalTime::frame_duration(self.shared.rate);
        let step = |n: f64| RationalTime::new(frame.value() * n, self.shared.rate);
        match action {
            TimeAction::Start => self.start(),
            TimeAction::End => self.end(),
            TimeAction::FramePrev => self.seek(self.current_time() - step(1.0)),
            TimeAction::FramePrevX10 => self.seek(self.current_time() - step(10.0)),
            TimeAction::FramePrevX100 => self.seek(self.current_time() - step(100.0)),
            TimeAction::FrameNext => self.seek(self.current_time() + step(1.0)),
            TimeAction::FrameNextX10 => self.seek(self.current_time() + step(10.0)),
            TimeAction::FrameNextX100 => self.seek(self.current_time() + step(100.0)),
        }
    }

    /// Seek to the in point.
    pub fn start(&self) {
        self.seek(self.in_out_range().start());
    }

    /// Seek to the last frame before the out point.
    pub fn end(&self) {
        self.seek(self.in_out_range().end_inclusive());
    }

    pub fn frame_prev(&self) {
        self.time_action(TimeAction::FramePrev);
    }

    pub fn frame_next(&self) {
        self.time_action(TimeAction::FrameNext);
    }

    /// Seek to the start of the current clip, or of the previous clip when
    /// already at a clip boundary.
    pub fn clip_prev(&self) {
        let current = self.current_time();
        let Some(item) = self.shared.timeline.item_at(current) else {
            return;
        };
        let range = self.shared.timeline.trimmed_range_in_parent(&item);
        if current > range.start() {
            self.seek(range.start());
            return;
        }
        let before = range.start() - RationalTime::frame_duration(self.shared.rate);
        if let Some(prev) = self.shared.timeline.item_at(before) {
            self.seek(self.shared.timeline.trimmed_range_in_parent(&prev).start());
        }
    }

    /// Seek to the start of the next clip.
    pub fn clip_next(&self) {
        let current = self.current_time();
        let Some(item) = self.shared.timeline.item_at(current) else {
            return;
        };
        let range = self.shared.timeline.trimmed_range_in_parent(&item);
        self.seek(range.end_exclusive());
    }

    // ========== In/out range ==========

    pub fn set_in_out_range(&self, range: TimeRange) {
        let mut publish_time = None;
        let range_seq;
        {
            let mut core = self.shared.core.lock().expect("lock");
            core.state.in_out_range = range;
            // Keep the playhead inside the new bounds
            let clamped = range.clamp(core.state.current_time);
            if clamped != core.state.current_time {
                core.state.current_time = clamped;
                publish_time = Some((self.shared.next_seq(), clamped));
            }
            range_seq = self.shared.next_seq();
        }
        self.shared.observables.in_out_range.set_ordered(range_seq, range);
        if let Some((seq, time)) = publish_time {
            self.shared.observables.current_time.set_ordered(seq, time);
        }
    }

    /// Set the in point to the current time.
    pub fn set_in_point(&self) {
        let range = self.in_out_range();
        let current = self.current_time();
        self.set_in_out_range(TimeRange::from_start_end(current, range.end_exclusive()));
    }

    pub fn reset_in_point(&self) {
        let range = self.in_out_range();
        self.set_in_out_range(TimeRange::from_start_end(
            RationalTime::zero(self.shared.rate),
            range.end_exclusive(),
        ));
    }

    /// Set the out point to the current time.
    pub fn set_out_point(&self) {
        let range = self.in_out_range();
        let current = self.current_time();
        self.set_in_out_range(TimeRange::from_start_end(range.start(), current));
    }

    pub fn reset_out_point(&self) {
        let range = self.in_out_range();
        self.set_in_out_range(TimeRange::from_start_end(
            range.start(),
            self.shared.duration.rescaled_to(self.shared.rate),
        ));
    }

    // ========== Video / cache / request configuration ==========

    /// Switch the composed video layer. All resident frames and in-flight
    /// requests are for the old layer, so both are dropped.
    pub fn set_video_layer(&self, layer: u16) {
        let layer = layer.min(self.shared.timeline.track_count().saturating_sub(1) as u16);
        let layer_seq;
        let ranges_seq;
        {
            let mut core = self.shared.core.lock().expect("lock");
            if core.state.video_layer == layer {
                return;
            }
            core.state.video_layer = layer;
            let Core { cache, scheduler, .. } = &mut *core;
            scheduler.cancel_all(self.shared.renderer.as_ref());
            cache.clear();
            info!("Video layer -> {}", layer);
            layer_seq = self.shared.next_seq();
            ranges_seq = self.shared.next_seq();
        }
        self.shared.observables.video_layer.set_ordered(layer_seq, layer);
        self.shared.observables.cached_frames.set_ordered(ranges_seq, Vec::new());
    }

    pub fn set_cache_read_ahead(&self, read_ahead: RationalTime) {
        let mut core = self.shared.core.lock().expect("lock");
        core.cache_options.read_ahead = read_ahead;
        let playhead = core.state.current_time.frame_at(self.shared.rate);
        let max = core.cache_options.max_resident(self.shared.rate);
        core.cache.set_max_resident(max, playhead);
    }

    pub fn set_cache_read_behind(&self, read_behind: RationalTime) {
        let mut core = self.shared.core.lock().expect("lock");
        core.cache_options.read_behind = read_behind;
        let playhead = core.state.current_time.frame_at(self.shared.rate);
        let max = core.cache_options.max_resident(self.shared.rate);
        core.cache.set_max_resident(max, playhead);
    }

    pub fn set_request_count(&self, count: usize) {
        self.shared.core.lock().expect("lock").state.request_count = count;
    }

    pub fn set_request_timeout(&self, timeout: Duration) {
        self.shared.core.lock().expect("lock").state.request_timeout = timeout;
    }

    /// User-level audio mute.
    pub fn set_mute(&self, mute: bool) {
        let seq;
        {
            let mut core = self.shared.core.lock().expect("lock");
            core.user_mute = mute;
            seq = self.shared.next_seq();
        }
        self.shared.observables.mute.set_ordered(seq, mute);
    }

    // ========== Getters ==========

    pub fn duration(&self) -> RationalTime {
        self.shared.duration
    }

    pub fn speed(&self) -> f32 {
        self.shared.observables.speed.get()
    }

    pub fn playback(&self) -> Playback {
        self.shared.observables.playback.get()
    }

    pub fn loop_mode(&self) -> Loop {
        self.shared.observables.loop_mode.get()
    }

    pub fn current_time(&self) -> RationalTime {
        self.shared.observables.current_time.get()
    }

    pub fn in_out_range(&self) -> TimeRange {
        self.shared.observables.in_out_range.get()
    }

    pub fn video_layer(&self) -> u16 {
        self.shared.observables.video_layer.get()
    }

    pub fn frame(&self) -> CachedFrame {
        self.shared.observables.frame.get()
    }

    pub fn cached_frames(&self) -> Vec<TimeRange> {
        self.shared.observables.cached_frames.get()
    }

    pub fn cache_read_ahead(&self) -> RationalTime {
        self.shared.core.lock().expect("lock").cache_options.read_ahead
    }

    pub fn cache_read_behind(&self) -> RationalTime {
        self.shared.core.lock().expect("lock").cache_options.read_behind
    }

    pub fn request_count(&self) -> usize {
        self.shared.core.lock().expect("lock").state.request_count
    }

    pub fn request_timeout(&self) -> Duration {
        self.shared.core.lock().expect("lock").state.request_timeout
    }

    pub fn is_muted(&self) -> bool {
        self.shared.observables.mute.get()
    }

    /// Whether the audio path is currently silent: user mute, a stutter
    /// mute window, or no usable output device.
    pub fn audio_muted(&self) -> bool {
        let core = self.shared.core.lock().expect("lock");
        core.user_mute || core.stutter_muted || self.shared.device_info.get().is_none()
    }

    // ========== Observables ==========

    pub fn observe_speed(&self) -> Observable<f32> {
        self.shared.observables.speed.clone()
    }

    pub fn observe_playback(&self) -> Observable<Playback> {
        self.shared.observables.playback.clone()
    }

    pub fn observe_loop(&self) -> Observable<Loop> {
        self.shared.observables.loop_mode.clone()
    }

    pub fn observe_current_time(&self) -> Observable<RationalTime> {
        self.shared.observables.current_time.clone()
    }

    pub fn observe_in_out_range(&self) -> Observable<TimeRange> {
        self.shared.observables.in_out_range.clone()
    }

    pub fn observe_video_layer(&self) -> Observable<u16> {
        self.shared.observables.video_layer.clone()
    }

    pub fn observe_frame(&self) -> Observable<CachedFrame> {
        self.shared.observables.frame.clone()
    }

    pub fn observe_cached_frames(&self) -> ObservableList<TimeRange> {
        self.shared.observables.cached_frames.clone()
    }

    pub fn observe_mute(&self) -> Observable<bool> {
        self.shared.observables.mute.clone()
    }

    pub fn observe_audio_device(&self) -> Observable<Option<DeviceInfo>> {
        self.audio_monitor.observe_device()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(clock) = self.clock.take() {
            let _ = clock.join();
        }
        // Teardown cancels everything still in flight
        let mut core = self.shared.core.lock().expect("lock");
        core.scheduler.cancel_all(self.shared.renderer.as_ref());
        debug!("Player torn down");
    }
}
