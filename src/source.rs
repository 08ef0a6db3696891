//! Collaborator interfaces: editorial timeline, decode/compose, audio device.
//!
//! The engine owns none of the heavy machinery. The timeline structure,
//! the decode/composite pipeline, and the audio hardware are capability
//! traits with production and test implementations interchangeable. Decode
//! work completes asynchronously: the renderer replies on the channel it
//! was handed, and the scheduler drains replies once per tick.

use crate::frame::Payload;
use crate::time::{RationalTime, TimeRange};
use crossbeam_channel::Sender;
use uuid::Uuid;

/// Identifies one decode/compose request, for completion matching and
/// advisory cancellation.
pub type RequestId = Uuid;

/// Opaque reference to an editorial item (clip, gap, transition) owned by
/// the timeline collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemHandle(pub u64);

/// The editorial timeline, queried read-only.
pub trait TimelineSource: Send + Sync {
    /// Total timeline duration; its rate is the engine's frame-index rate.
    fn duration(&self) -> RationalTime;

    fn track_count(&self) -> usize;

    /// Topmost item under `time`, if any.
    fn item_at(&self, time: RationalTime) -> Option<ItemHandle>;

    /// The item's trimmed range in its parent track.
    fn trimmed_range_in_parent(&self, item: &ItemHandle) -> TimeRange;
}

/// One decode/compose request issued by the scheduler.
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub id: RequestId,
    pub time: RationalTime,
    /// Video layer (track) to compose for.
    pub layer: u16,
}

/// Why a position could not be produced. Absorbed locally: logged and
/// recorded as an unavailable placeholder, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Media for the position could not be read.
    Read(String),
    /// Media decoded but could not be composited.
    Compose(String),
    /// The collaborator shut down before producing the frame.
    Cancelled,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Read(msg) => write!(f, "read: {}", msg),
            DecodeError::Compose(msg) => write!(f, "compose: {}", msg),
            DecodeError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Produced payloads for one position.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub video: Payload,
    pub audio: Option<Payload>,
}

/// Completion message sent back by the renderer's workers.
#[derive(Debug, Clone)]
pub struct RenderComplete {
    pub id: RequestId,
    pub time: RationalTime,
    pub result: Result<RenderOutput, DecodeError>,
}

/// The decode/compose collaborator. Runs its own worker pool; the engine
/// only enqueues and (advisorily) cancels.
pub trait FrameRenderer: Send + Sync {
    /// Enqueue a request. The completion, if any, is sent on `reply`.
    /// Workers may complete a request after it was cancelled; stale
    /// completions are discarded by the scheduler.
    fn request_frame(&self, request: FrameRequest, reply: Sender<RenderComplete>);

    /// Advisory cancellation. The renderer should drop queued work for
    /// `id` but may already be mid-decode.
    fn cancel(&self, id: RequestId);
}

/// Audio output device description, polled from the audio collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub sample_rate: u32,
    pub channel_count: u16,
}

/// The audio hardware collaborator. Polled (not pushed): device hot-plug
/// is observed by the monitor task asking again.
pub trait AudioDevice: Send + Sync {
    /// Currently usable output device, or None when unavailable.
    fn current_device(&self) -> Option<DeviceInfo>;
}
