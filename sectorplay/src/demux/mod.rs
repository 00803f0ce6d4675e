//! Frame and stream reconstruction
//!
//! Turns the interleaved, unreliable sector-chunk stream into complete
//! demuxed frames, selects the parallel audio track, and recombines split
//! audio streams into one logical decode target.

pub mod assembler;
pub mod audio_select;
pub mod chunk;
pub mod combiner;

pub use assembler::{AcceptOutcome, DemuxedFrame, FrameAssembler};
pub use audio_select::{AudioSelection, AudioStreamDescriptor, ParallelAudioSelector};
pub use chunk::{AudioChunk, AudioCodecKind, AudioFormat, Chunk, VideoChunk};
pub use combiner::StreamCombiner;
