//! Combining disjoint audio streams into one logical decoder
//!
//! Ripped or corrupted media frequently split one logical audio track into
//! several disjoint disc-item sector ranges. The combiner wraps the member
//! decoders as one continuous decode target: its range is the min/max across
//! members and each input chunk is routed to the one member whose range
//! contains its sector.

use crate::codec::AudioDecoder;
use crate::demux::chunk::{AudioChunk, AudioFormat};
use crate::error::{Error, Result};
use crate::playback::types::PcmBlock;
use tracing::trace;

/// N pairwise-non-overlapping same-format decoders behind one decoder surface
///
/// Both preconditions (no member ranges overlap, all members share one output
/// format) are checked at construction; violating either is a construction
/// error, not a routing ambiguity later.
pub struct StreamCombiner {
    members: Vec<Box<dyn AudioDecoder>>,
    start_sector: u32,
    end_sector: u32,
    format: AudioFormat,
}

impl StreamCombiner {
    /// Wrap member decoders as one logical decoder
    pub fn new(members: Vec<Box<dyn AudioDecoder>>) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::Demux(
                "Stream combiner requires at least one member decoder".to_string(),
            ));
        }

        let format = members[0].output_format();
        for member in &members[1..] {
            if member.output_format() != format {
                return Err(Error::Demux(format!(
                    "Stream combiner members disagree on output format: {:?} vs {:?}",
                    format,
                    member.output_format()
                )));
            }
        }

        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                let overlap =
                    a.start_sector() <= b.end_sector() && b.start_sector() <= a.end_sector();
                if overlap {
                    return Err(Error::Demux(format!(
                        "Stream combiner members overlap: [{}, {}] and [{}, {}]",
                        a.start_sector(),
                        a.end_sector(),
                        b.start_sector(),
                        b.end_sector()
                    )));
                }
            }
        }

        let start_sector = members.iter().map(|m| m.start_sector()).min().unwrap_or(0);
        let end_sector = members.iter().map(|m| m.end_sector()).max().unwrap_or(0);

        Ok(Self {
            members,
            start_sector,
            end_sector,
            format,
        })
    }
}

impl AudioDecoder for StreamCombiner {
    fn start_sector(&self) -> u32 {
        self.start_sector
    }

    fn end_sector(&self) -> u32 {
        self.end_sector
    }

    fn output_format(&self) -> AudioFormat {
        self.format
    }

    /// Route the chunk to the member whose range contains its sector
    ///
    /// Routing is unambiguous because member ranges cannot overlap. A chunk
    /// outside every member range is a no-op.
    fn decode(&mut self, chunk: &AudioChunk) -> Result<Option<PcmBlock>> {
        for member in self.members.iter_mut() {
            if chunk.sector >= member.start_sector() && chunk.sector <= member.end_sector() {
                return member.decode(chunk);
            }
        }

        trace!(
            "Audio chunk at sector {} falls between combined streams; ignored",
            chunk.sector
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Pcm16AudioDecoder;
    use crate::demux::chunk::AudioCodecKind;

    fn format(sample_rate: u32) -> AudioFormat {
        AudioFormat {
            sample_rate,
            channels: 2,
            bits_per_sample: 16,
            codec: AudioCodecKind::Pcm16,
        }
    }

    fn member(start: u32, end: u32, sample_rate: u32) -> Box<dyn AudioDecoder> {
        Box::new(Pcm16AudioDecoder::new(start, end, format(sample_rate)))
    }

    fn chunk(sector: u32) -> AudioChunk {
        AudioChunk {
            sector,
            channel: 0,
            format: format(44100),
            payload: vec![0x00, 0x40, 0x00, 0x40],
        }
    }

    #[test]
    fn test_range_is_min_max_of_members() {
        let combiner =
            StreamCombiner::new(vec![member(100, 200, 44100), member(0, 50, 44100)]).unwrap();
        assert_eq!(combiner.start_sector(), 0);
        assert_eq!(combiner.end_sector(), 200);
        assert_eq!(combiner.output_format(), format(44100));
    }

    #[test]
    fn test_rejects_overlapping_members() {
        let result = StreamCombiner::new(vec![member(0, 100, 44100), member(100, 200, 44100)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_mixed_formats() {
        let result = StreamCombiner::new(vec![member(0, 100, 44100), member(200, 300, 18900)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_empty_members() {
        assert!(StreamCombiner::new(Vec::new()).is_err());
    }

    #[test]
    fn test_routes_by_sector_and_ignores_gaps() {
        let mut combiner =
            StreamCombiner::new(vec![member(0, 50, 44100), member(100, 200, 44100)]).unwrap();

        // In the first member's range
        assert!(combiner.decode(&chunk(25)).unwrap().is_some());
        // In the second member's range
        assert!(combiner.decode(&chunk(150)).unwrap().is_some());
        // Between the members: no-op
        assert!(combiner.decode(&chunk(75)).unwrap().is_none());
    }
}
