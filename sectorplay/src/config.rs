//! Runtime tuning parameters
//!
//! The demux and playback layers carry a handful of empirically tuned
//! constants (sector lookahead window, presentation fudge, bounded-wait poll
//! interval). These are kept as configurable values with their original
//! defaults rather than re-derived; override them from a TOML file when
//! experimenting.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default sector lookahead window for frame assembly
const DEFAULT_SECTOR_LOOKAHEAD: u32 = 50;

/// Default presentation fudge window in microseconds
const DEFAULT_PRESENT_FUDGE_US: u64 = 50;

/// Default bounded-wait poll interval in milliseconds
const DEFAULT_WAIT_POLL_MS: u64 = 1000;

/// Tunable playback parameters
///
/// All fields have defaults; a TOML file only needs to name the fields it
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    /// How far ahead (in sectors) a frame chunk may land past the last
    /// accepted sector before the assembler rejects it. Bounds how long a
    /// stalled or corrupt frame can block frame-rate inference.
    pub sector_lookahead: u32,

    /// Presentation fudge window in microseconds. A unit within this window
    /// of its deadline is presented immediately instead of sleeping.
    pub present_fudge_us: u64,

    /// Bounded-wait poll interval in milliseconds. Every blocking wait in
    /// the pipeline re-checks its condition (and peer liveness) at least
    /// this often instead of waiting indefinitely.
    pub wait_poll_ms: u64,

    /// Capacity of the reader -> video decode queue (demuxed frames)
    pub frame_queue_capacity: usize,

    /// Capacity of the video decode -> present queue (decoded units)
    pub present_queue_capacity: usize,

    /// Capacity of the reader -> audio feed queue (PCM blocks)
    pub audio_queue_capacity: usize,

    /// Audio ring buffer capacity in sample frames (~46ms @ 44.1kHz at 2048)
    pub audio_ring_capacity: usize,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            sector_lookahead: DEFAULT_SECTOR_LOOKAHEAD,
            present_fudge_us: DEFAULT_PRESENT_FUDGE_US,
            wait_poll_ms: DEFAULT_WAIT_POLL_MS,
            frame_queue_capacity: 32,
            present_queue_capacity: 16,
            audio_queue_capacity: 64,
            audio_ring_capacity: 2048,
        }
    }
}

impl PlayerTuning {
    /// Load tuning from a TOML file, falling back to defaults for absent keys
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Presentation fudge as signed nanoseconds
    pub fn present_fudge_ns(&self) -> i64 {
        (self.present_fudge_us as i64) * 1_000
    }

    /// Bounded-wait poll interval as a Duration
    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms)
    }
}
