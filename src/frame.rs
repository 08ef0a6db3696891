//! Cached frame and opaque payload handles.
//!
//! The engine never inspects pixel or sample data; the render collaborator
//! hands back opaque payloads and the cache holds them by reference. Two
//! payloads are equal only if they are the same allocation, which is what
//! the change-filtered `frame` observable needs: a re-decode of the same
//! position counts as a change, a republish of the same decode does not.

use crate::time::RationalTime;
use std::any::Any;
use std::sync::Arc;

/// Opaque handle to collaborator-produced data (decoded video, mixed audio).
/// Cheap to clone; equality is pointer identity.
#[derive(Clone)]
pub struct Payload(Arc<dyn Any + Send + Sync>);

impl Payload {
    pub fn new<T: Any + Send + Sync>(data: T) -> Self {
        Self(Arc::new(data))
    }

    /// Borrow the payload back as its concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Payload")
    }
}

/// A produced frame resident in the cache.
///
/// Owned exclusively by the cache; consumers get clones whose payloads are
/// shared read-only handles. `video: None` marks a position whose decode
/// failed - it occupies the slot (so the scheduler does not retry forever)
/// but presents as unavailable.
#[derive(Debug, Clone)]
pub struct CachedFrame {
    pub time: RationalTime,
    pub video: Option<Payload>,
    pub audio: Option<Payload>,
    /// Monotonic production sequence number, assigned at insert.
    pub produced_at: u64,
}

impl CachedFrame {
    pub fn new(time: RationalTime, video: Payload, audio: Option<Payload>, produced_at: u64) -> Self {
        Self {
            time,
            video: Some(video),
            audio,
            produced_at,
        }
    }

    /// Placeholder for a position that could not be produced.
    pub fn unavailable(time: RationalTime, produced_at: u64) -> Self {
        Self {
            time,
            video: None,
            audio: None,
            produced_at,
        }
    }

    /// Empty frame at a time, used as the initial `frame` observable value
    /// before anything is resident.
    pub fn empty(time: RationalTime) -> Self {
        Self {
            time,
            video: None,
            audio: None,
            produced_at: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.video.is_some()
    }
}

impl PartialEq for CachedFrame {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.video == other.video && self.audio == other.audio
    }
}
