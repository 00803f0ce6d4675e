//! Codec seams
//!
//! The pixel and audio codecs themselves are external collaborators: the
//! pipeline consumes them as opaque decode calls and reports failures as
//! per-unit decode errors, never assembler errors. This module defines the
//! traits plus trivial adapter implementations used by the chunk-dump driver
//! and by tests.

use crate::audio::types::AudioFrame;
use crate::demux::assembler::DemuxedFrame;
use crate::demux::chunk::{AudioChunk, AudioFormat};
use crate::error::{Error, Result};
use crate::playback::types::PcmBlock;

/// Opaque video codec: frame bytes in, pixels out
///
/// Implementations must tolerate frames with missing chunks (the assembler
/// emits gapped frames by design).
pub trait VideoDecoder: Send {
    /// Decode one demuxed frame into `pixels`
    ///
    /// `pixels` arrives empty (usually recycled from the presentation
    /// stage's free-list); the decoder fills it with `width * height`
    /// packed 0RGB values.
    fn decode(&mut self, frame: &DemuxedFrame, pixels: &mut Vec<u32>) -> Result<()>;
}

/// Opaque audio codec over one contiguous sector range
pub trait AudioDecoder: Send {
    /// First sector this decoder's stream covers
    fn start_sector(&self) -> u32;

    /// Last sector this decoder's stream covers (inclusive)
    fn end_sector(&self) -> u32;

    /// PCM format this decoder produces
    fn output_format(&self) -> AudioFormat;

    /// Decode one audio chunk. `Ok(None)` means the chunk produced no
    /// output (header-only sectors and the like).
    fn decode(&mut self, chunk: &AudioChunk) -> Result<Option<PcmBlock>>;
}

/// Factory producing a fresh decoder for one candidate audio stream
pub trait AudioDecoderFactory: Send {
    /// First sector of the stream
    fn start_sector(&self) -> u32;

    /// Last sector of the stream (inclusive)
    fn end_sector(&self) -> u32;

    /// Format the opened decoder will produce
    fn output_format(&self) -> AudioFormat;

    /// Open a decoder for this stream
    fn open(&self) -> Result<Box<dyn AudioDecoder>>;
}

/// Diagnostic video decoder: renders payload bytes as grayscale
///
/// Not a real codec. Used by the chunk-dump driver and tests so the pipeline
/// can run end to end without an external bitstream decoder.
pub struct GrayscaleVideoDecoder;

impl VideoDecoder for GrayscaleVideoDecoder {
    fn decode(&mut self, frame: &DemuxedFrame, pixels: &mut Vec<u32>) -> Result<()> {
        let pixel_count = frame.width as usize * frame.height as usize;
        if pixel_count == 0 {
            return Err(Error::Decode(format!(
                "Frame {} has zero dimensions",
                frame.frame_number
            )));
        }

        pixels.clear();
        for chunk in &frame.chunks {
            for &byte in chunk {
                if pixels.len() == pixel_count {
                    break;
                }
                let v = byte as u32;
                pixels.push((v << 16) | (v << 8) | v);
            }
        }
        pixels.resize(pixel_count, 0);
        Ok(())
    }
}

/// Adapter decoder for uncompressed 16-bit little-endian PCM payloads
///
/// Stands in for the external ADPCM decoders in the dump driver and tests.
pub struct Pcm16AudioDecoder {
    start_sector: u32,
    end_sector: u32,
    format: AudioFormat,
}

impl Pcm16AudioDecoder {
    /// Create a PCM adapter over one sector range
    pub fn new(start_sector: u32, end_sector: u32, format: AudioFormat) -> Self {
        Self {
            start_sector,
            end_sector,
            format,
        }
    }

    fn sample(bytes: &[u8]) -> f32 {
        i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / i16::MAX as f32
    }
}

impl AudioDecoder for Pcm16AudioDecoder {
    fn start_sector(&self) -> u32 {
        self.start_sector
    }

    fn end_sector(&self) -> u32 {
        self.end_sector
    }

    fn output_format(&self) -> AudioFormat {
        self.format
    }

    fn decode(&mut self, chunk: &AudioChunk) -> Result<Option<PcmBlock>> {
        if chunk.payload.len() % 2 != 0 {
            return Err(Error::Decode(format!(
                "Odd PCM payload length {} at sector {}",
                chunk.payload.len(),
                chunk.sector
            )));
        }

        let channels = self.format.channels.max(1) as usize;
        let mut frames = Vec::with_capacity(chunk.payload.len() / (2 * channels));
        let mut samples = chunk.payload.chunks_exact(2);

        loop {
            let left = match samples.next() {
                Some(bytes) => Self::sample(bytes),
                None => break,
            };
            let frame = if channels >= 2 {
                match samples.next() {
                    Some(bytes) => AudioFrame::from_stereo(left, Self::sample(bytes)),
                    None => AudioFrame::from_mono(left),
                }
            } else {
                AudioFrame::from_mono(left)
            };
            frames.push(frame);
        }

        if frames.is_empty() {
            return Ok(None);
        }

        Ok(Some(PcmBlock {
            sample_rate: self.format.sample_rate,
            frames,
        }))
    }
}

/// Factory for [`Pcm16AudioDecoder`]
pub struct Pcm16DecoderFactory {
    /// First sector of the stream
    pub start_sector: u32,

    /// Last sector of the stream (inclusive)
    pub end_sector: u32,

    /// Stream format
    pub format: AudioFormat,
}

impl AudioDecoderFactory for Pcm16DecoderFactory {
    fn start_sector(&self) -> u32 {
        self.start_sector
    }

    fn end_sector(&self) -> u32 {
        self.end_sector
    }

    fn output_format(&self) -> AudioFormat {
        self.format
    }

    fn open(&self) -> Result<Box<dyn AudioDecoder>> {
        Ok(Box::new(Pcm16AudioDecoder::new(
            self.start_sector,
            self.end_sector,
            self.format,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::chunk::AudioCodecKind;

    fn pcm_format() -> AudioFormat {
        AudioFormat {
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
            codec: AudioCodecKind::Pcm16,
        }
    }

    #[test]
    fn test_grayscale_decode_pads_short_frames() {
        let mut decoder = GrayscaleVideoDecoder;
        let frame = DemuxedFrame {
            frame_number: 0,
            width: 4,
            height: 2,
            chunks: vec![vec![0xFF, 0x00, 0x80]],
            start_sector: 0,
            end_sector: 0,
            byte_size: 3,
            missing_chunks: 1,
        };

        let mut pixels = Vec::new();
        decoder.decode(&frame, &mut pixels).unwrap();
        assert_eq!(pixels.len(), 8);
        assert_eq!(pixels[0], 0x00FF_FFFF);
        assert_eq!(pixels[1], 0);
        // Beyond the payload: padded black
        assert_eq!(pixels[7], 0);
    }

    #[test]
    fn test_grayscale_decode_overwrites_recycled_content() {
        let mut decoder = GrayscaleVideoDecoder;
        let frame = DemuxedFrame {
            frame_number: 1,
            width: 2,
            height: 2,
            chunks: vec![vec![0x10, 0x20, 0x30, 0x40]],
            start_sector: 0,
            end_sector: 0,
            byte_size: 4,
            missing_chunks: 0,
        };

        // Simulate a buffer coming back dirty from the free-list
        let mut pixels = vec![0xDEAD_BEEF; 4];
        decoder.decode(&frame, &mut pixels).unwrap();
        assert_eq!(pixels.len(), 4);
        assert_eq!(pixels[0], 0x0010_1010);
        assert!(pixels.iter().all(|&p| p != 0xDEAD_BEEF));
    }

    #[test]
    fn test_pcm16_stereo_decode() {
        let mut decoder = Pcm16AudioDecoder::new(0, 10, pcm_format());
        let chunk = AudioChunk {
            sector: 3,
            channel: 0,
            format: pcm_format(),
            payload: vec![0xFF, 0x7F, 0x00, 0x00, 0x01, 0x80, 0xFF, 0x7F],
        };

        let block = decoder.decode(&chunk).unwrap().unwrap();
        assert_eq!(block.frames.len(), 2);
        assert!((block.frames[0].left - 1.0).abs() < 1e-4);
        assert_eq!(block.frames[0].right, 0.0);
    }

    #[test]
    fn test_pcm16_rejects_odd_payload() {
        let mut decoder = Pcm16AudioDecoder::new(0, 10, pcm_format());
        let chunk = AudioChunk {
            sector: 3,
            channel: 0,
            format: pcm_format(),
            payload: vec![0xFF],
        };
        assert!(decoder.decode(&chunk).is_err());
    }
}
