//! Player and cache configuration.
//!
//! Supplied once at `Player` construction; cache sizes and request limits
//! stay mutable afterward through the player's setters. Options round-trip
//! through JSON so a host application can persist them with its settings.

use crate::time::RationalTime;
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Frame cache sizing, as durations of timeline relative to the playhead.
///
/// Invariant: both durations are non-negative; together with the timeline
/// rate they bound the maximum resident frame count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Timeline kept resident ahead of the playhead.
    pub read_ahead: RationalTime,
    /// Timeline kept resident behind the playhead.
    pub read_behind: RationalTime,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            read_ahead: RationalTime::new(2.0, 1.0),
            read_behind: RationalTime::new(0.5, 1.0),
        }
    }
}

impl CacheOptions {
    /// Maximum resident frame count at `rate`, including the playhead frame
    /// and one extra position of directional bias.
    pub fn max_resident(&self, rate: f64) -> usize {
        let behind = self.read_behind.rescaled_to(rate).value().max(0.0) as usize;
        let ahead = self.read_ahead.rescaled_to(rate).value().max(0.0) as usize;
        behind + ahead + 2
    }
}

/// Construction-time player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerOptions {
    /// Audio device identifier, resolved through the audio collaborator.
    pub audio_device_id: Option<String>,
    /// Frame cache sizing.
    pub cache: CacheOptions,
    /// Audio buffer size in frames.
    pub audio_buffer_frame_count: usize,
    /// How long audio stays muted waiting for frames before the stall is
    /// surfaced and time advances regardless.
    pub mute_timeout: Duration,
    /// Clock tick period. Each tick measures actual elapsed wall time, so
    /// this only sets granularity, not playback speed.
    pub tick_interval: Duration,
    /// Playhead position at construction.
    pub initial_time: RationalTime,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            audio_device_id: None,
            cache: CacheOptions::default(),
            audio_buffer_frame_count: 1000,
            mute_timeout: Duration::from_millis(500),
            tick_interval: Duration::from_millis(5),
            initial_time: RationalTime::zero(1.0),
        }
    }
}

impl PlayerOptions {
    /// Save options as JSON (for host-application settings persistence).
    pub fn to_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize player options")?;
        std::fs::write(path, json)
            .with_context(|| format!("write player options to {}", path.display()))?;
        info!("Player options saved to {}", path.display());
        Ok(())
    }

    /// Load options from JSON.
    pub fn from_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read player options from {}", path.display()))?;
        serde_json::from_str(&json).context("parse player options")
    }
}
