//! Transport chunk types
//!
//! One chunk is one fixed-size transport unit (an optical-disc sector
//! payload) carrying part of a video frame or audio block plus header
//! metadata. Chunks are immutable once read; ownership passes from the
//! source to the frame assembler or audio decoder.

use serde::{Deserialize, Serialize};

/// Audio sample format tag carried by audio chunks and decoders
///
/// Streams are format-compatible only when every field matches exactly;
/// the parallel-audio selector buckets candidates by this equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Samples per second per channel
    pub sample_rate: u32,

    /// Channel count (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bits per encoded sample
    pub bits_per_sample: u16,

    /// Codec variant the payload is encoded with
    pub codec: AudioCodecKind,
}

/// Codec variant tag (the codecs themselves are external collaborators)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodecKind {
    /// 4-bit ADPCM sector payloads
    Adpcm4,

    /// 8-bit ADPCM sector payloads
    Adpcm8,

    /// Uncompressed 16-bit little-endian PCM
    Pcm16,
}

/// One video transport chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoChunk {
    /// Absolute sector index this chunk was read from
    pub sector: u32,

    /// Declared frame number
    pub frame_number: u32,

    /// Declared index of this chunk within the frame
    pub chunk_index: u16,

    /// Declared total chunk count for the frame
    pub chunks_in_frame: u16,

    /// Frame width in pixels
    pub width: u16,

    /// Frame height in pixels
    pub height: u16,

    /// Payload bytes
    pub payload: Vec<u8>,
}

/// One audio transport chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChunk {
    /// Absolute sector index this chunk was read from
    pub sector: u32,

    /// Channel tag from the sector header
    pub channel: u8,

    /// Sample format of the encoded payload
    pub format: AudioFormat,

    /// Payload bytes
    pub payload: Vec<u8>,
}

/// One transport chunk from the interleaved stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Chunk {
    /// Part of a video frame
    Video(VideoChunk),

    /// Part of an audio block
    Audio(AudioChunk),
}

impl Chunk {
    /// Sector this chunk was read from
    pub fn sector(&self) -> u32 {
        match self {
            Chunk::Video(c) => c.sector,
            Chunk::Audio(c) => c.sector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_equality_is_exact() {
        let a = AudioFormat {
            sample_rate: 18900,
            channels: 2,
            bits_per_sample: 4,
            codec: AudioCodecKind::Adpcm4,
        };
        let mut b = a;
        assert_eq!(a, b);
        b.sample_rate = 37800;
        assert_ne!(a, b);
    }

    #[test]
    fn test_chunk_serde_round_trip() {
        let chunk = Chunk::Video(VideoChunk {
            sector: 150,
            frame_number: 7,
            chunk_index: 2,
            chunks_in_frame: 5,
            width: 320,
            height: 240,
            payload: vec![0xAB; 16],
        });

        let json = serde_json::to_string(&chunk).unwrap();
        let back: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(chunk, back);
        assert_eq!(back.sector(), 150);
    }
}
