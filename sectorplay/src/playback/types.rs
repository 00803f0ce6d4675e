//! Playback types shared across modules

use crate::audio::types::AudioFrame;
use crate::demux::chunk::{AudioFormat, Chunk};
use crate::error::Result;
use uuid::Uuid;

/// A decoded video frame ready for presentation
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    /// Width in pixels
    pub width: u16,

    /// Height in pixels
    pub height: u16,

    /// Packed 0RGB pixels, row-major, `width * height` entries
    pub pixels: Vec<u32>,
}

/// A decoded block of PCM audio
#[derive(Debug, Clone)]
pub struct PcmBlock {
    /// Samples per second per channel
    pub sample_rate: u32,

    /// Decoded stereo sample frames
    pub frames: Vec<AudioFrame>,
}

impl PcmBlock {
    /// Block duration in nanoseconds at its sample rate
    pub fn duration_ns(&self) -> i64 {
        (self.frames.len() as i64 * 1_000_000_000) / self.sample_rate as i64
    }
}

/// Payload of one presentation unit
#[derive(Debug, Clone)]
pub enum UnitPayload {
    /// A decoded video frame
    Video(PixelBuffer),

    /// A decoded audio block
    Audio(PcmBlock),
}

/// A decoded unit tagged with its presentation time
///
/// Created by the decode stage, consumed and destroyed by the presentation
/// stage. Presentation time is monotonic nanoseconds from stream start.
#[derive(Debug, Clone)]
pub struct PresentationUnit {
    /// When this unit should be shown/played, ns from stream start
    pub presentation_ns: i64,

    /// The decoded payload
    pub payload: UnitPayload,
}

/// A demuxed frame tagged with its presentation time, awaiting decode
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// When the decoded frame should be shown, ns from stream start
    pub presentation_ns: i64,

    /// The reconstructed (possibly gapped) frame
    pub frame: crate::demux::assembler::DemuxedFrame,
}

/// Video track parameters from the media descriptor
#[derive(Debug, Clone)]
pub struct VideoTrack {
    /// Frame width in pixels
    pub width: u16,

    /// Frame height in pixels
    pub height: u16,

    /// Presentation cadence in frames per second
    pub frame_rate: f64,
}

/// Audio track parameters from the media descriptor
#[derive(Debug, Clone)]
pub struct AudioTrack {
    /// Output sample format of the selected parallel audio
    pub format: AudioFormat,

    /// First sector of the (combined) audio stream
    pub start_sector: u32,

    /// Sector cadence of the audio stream; presentation time of a block is
    /// derived from its chunk's sector offset at this rate. Zero disables
    /// sector-based timing (blocks are then timed back to back).
    pub sectors_per_second: f64,
}

/// Describes the media a session will play
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    /// Session identifier carried by every event this session fires
    pub session_id: Uuid,

    /// Video track, if the media has one
    pub video: Option<VideoTrack>,

    /// Audio track, if the media has one
    pub audio: Option<AudioTrack>,
}

/// Ordered (not necessarily gap-free) chunk supplier
///
/// Supplied by an external disc/container reader. `Ok(None)` is normal
/// end-of-stream.
pub trait ChunkSource: Send {
    /// Next chunk in sector order, or `None` at end of stream
    fn next_chunk(&mut self) -> Result<Option<Chunk>>;
}

/// External display surface accepting decoded frames
pub trait VideoSurface: Send {
    /// Blit one decoded frame; called from the presentation thread at the
    /// frame's presentation time
    fn present(&mut self, frame: &PixelBuffer) -> Result<()>;
}

/// Surface that discards frames (headless playback and tests)
#[derive(Debug, Default)]
pub struct NullVideoSurface {
    /// Frames presented so far
    pub presented: u64,
}

impl VideoSurface for NullVideoSurface {
    fn present(&mut self, _frame: &PixelBuffer) -> Result<()> {
        self.presented += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_block_duration() {
        let block = PcmBlock {
            sample_rate: 44100,
            frames: vec![AudioFrame::zero(); 44100],
        };
        assert_eq!(block.duration_ns(), 1_000_000_000);
    }

    #[test]
    fn test_null_surface_counts() {
        let mut surface = NullVideoSurface::default();
        let frame = PixelBuffer {
            width: 2,
            height: 2,
            pixels: vec![0; 4],
        };
        surface.present(&frame).unwrap();
        surface.present(&frame).unwrap();
        assert_eq!(surface.presented, 2);
    }
}
