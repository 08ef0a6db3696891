//! PLAYHEAD - Timeline playback and frame cache engine
//!
//! Advances a playhead through editorial time, keeps a bounded window of
//! decoded frames resident around it, and publishes every state change
//! exactly once through change-filtered observables. Decode/composite
//! work, the editorial structure, and audio hardware are collaborators
//! behind the traits in [`source`].

pub mod audio;
pub mod cache;
pub mod frame;
pub mod observe;
pub mod options;
pub mod player;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod time;
pub mod window;

// Re-export the public surface
pub use frame::{CachedFrame, Payload};
pub use observe::{Observable, ObservableList, ObservableMap, Subscription};
pub use options::{CacheOptions, PlayerOptions};
pub use player::Player;
pub use source::{
    AudioDevice, DecodeError, DeviceInfo, FrameRenderer, FrameRequest, ItemHandle,
    RenderComplete, RenderOutput, RequestId, TimelineSource,
};
pub use state::{Loop, Playback, PlayerState, TimeAction};
pub use time::{RationalTime, TimeRange};
