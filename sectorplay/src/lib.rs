//! # sectorplay
//!
//! Media frame reconstruction and real-time playback for sector-interleaved
//! disc streams.
//!
//! **Purpose:** Reassemble demuxed video frames and parallel audio streams
//! from sector-ordered chunks, then play them back against a shared
//! presentation clock.
//!
//! **Architecture:** One reader thread demuxes the chunk stream; decode,
//! present, and audio feed threads hand off through bounded queues and pace
//! themselves against an audio-driven (or wall-clock) timeline.

pub mod audio;
pub mod codec;
pub mod config;
pub mod demux;
pub mod error;
pub mod events;
pub mod playback;

pub use error::{Error, Result};
pub use playback::{new_session, PlaybackPipeline, SessionConfig};
