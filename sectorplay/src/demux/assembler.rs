//! Frame reconstruction from interleaved video chunks
//!
//! The assembler is a stateful reducer over a forward scan of video chunks.
//! Chunks for one frame usually arrive in index order but may be reordered
//! within the frame, missing, duplicated, or carry corrupt headers; the
//! assembler is intentionally tolerant, slots chunks by declared index, and
//! will emit frames with gaps. The decode stage must cope with missing
//! regions.

use crate::demux::chunk::VideoChunk;
use tracing::{debug, warn};

/// One complete (possibly gapped) demuxed video frame
///
/// Immutable output of the assembler; owned by whoever it is handed to next.
#[derive(Debug, Clone)]
pub struct DemuxedFrame {
    /// Declared frame number
    pub frame_number: u32,

    /// Frame width in pixels
    pub width: u16,

    /// Frame height in pixels
    pub height: u16,

    /// Payloads of the received chunks, in chunk-index order (gaps omitted)
    pub chunks: Vec<Vec<u8>>,

    /// First sector a chunk of this frame was seen at
    pub start_sector: u32,

    /// Last sector a chunk of this frame was seen at
    pub end_sector: u32,

    /// Total payload bytes across received chunks
    pub byte_size: usize,

    /// Number of declared slots that were never filled
    pub missing_chunks: usize,
}

impl DemuxedFrame {
    /// Whether any declared chunk slot was never filled
    pub fn has_gaps(&self) -> bool {
        self.missing_chunks > 0
    }
}

/// A frame under construction
///
/// Sized at the declared chunk count discovered from the first chunk.
/// Mutated only by the assembler and destroyed the instant the frame is
/// emitted or abandoned.
struct FrameBuildState {
    frame_number: u32,
    chunks_in_frame: u16,
    width: u16,
    height: u16,
    slots: Vec<Option<Vec<u8>>>,
    first_sector: u32,
    last_sector: u32,
    received: usize,
}

/// Outcome of offering a chunk to an open frame
pub enum AcceptOutcome {
    /// Chunk was absorbed into the open frame
    Accepted,

    /// Chunk contradicts the open frame; ownership returned to the caller,
    /// who should finish the current frame and begin a new one with it
    Rejected(VideoChunk),
}

/// Stateful frame assembler
///
/// Usage: `begin()` with the first chunk of a frame, `accept()` subsequent
/// chunks, watch `is_complete()`, and `finish()` to emit. A rejected chunk
/// means the current frame must be finished (abandoned with whatever was
/// collected) and a new frame begun with the offending chunk.
pub struct FrameAssembler {
    /// Sector lookahead window: a chunk landing further than this past the
    /// last accepted sector is rejected, bounding how long a stalled or
    /// corrupt frame can stay open
    sector_lookahead: u32,

    state: Option<FrameBuildState>,
}

impl FrameAssembler {
    /// Create an assembler with the given sector lookahead window
    pub fn new(sector_lookahead: u32) -> Self {
        Self {
            sector_lookahead,
            state: None,
        }
    }

    /// Whether a frame is currently under construction
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Begin a new frame from its first chunk
    ///
    /// Must only be called with no frame open (`finish()` first). If the
    /// chunk declares `chunk_index >= chunks_in_frame` the header is corrupt:
    /// the frame is sized to `chunk_index + 1` so this chunk becomes the only
    /// member and forces immediate completion.
    pub fn begin(&mut self, chunk: VideoChunk) {
        debug_assert!(self.state.is_none(), "begin() with a frame still open");

        let slot_count = if chunk.chunk_index >= chunk.chunks_in_frame {
            warn!(
                "Corrupt chunk header: frame {} declares {} chunks but chunk index is {}; \
                 sizing frame to the index",
                chunk.frame_number, chunk.chunks_in_frame, chunk.chunk_index
            );
            chunk.chunk_index as usize + 1
        } else {
            chunk.chunks_in_frame as usize
        };

        let mut slots = vec![None; slot_count];
        slots[chunk.chunk_index as usize] = Some(chunk.payload);

        self.state = Some(FrameBuildState {
            frame_number: chunk.frame_number,
            chunks_in_frame: chunk.chunks_in_frame,
            width: chunk.width,
            height: chunk.height,
            slots,
            first_sector: chunk.sector,
            last_sector: chunk.sector,
            received: 1,
        });
    }

    /// Offer a chunk to the open frame
    ///
    /// Succeeds only if the chunk names the same frame number, the declared
    /// chunk count is unchanged, its chunk index is within bounds and names
    /// an unfilled slot, and its sector is within the lookahead window of
    /// the last accepted sector. Chunks may arrive in any order within the
    /// frame. Anything else is rejected with ownership returned.
    pub fn accept(&mut self, chunk: VideoChunk) -> AcceptOutcome {
        let state = match self.state.as_mut() {
            Some(s) => s,
            None => return AcceptOutcome::Rejected(chunk),
        };

        if chunk.frame_number != state.frame_number {
            debug!(
                "Chunk names frame {} while frame {} is open",
                chunk.frame_number, state.frame_number
            );
            return AcceptOutcome::Rejected(chunk);
        }

        if chunk.chunks_in_frame != state.chunks_in_frame {
            warn!(
                "Inconsistent header: frame {} chunk count changed {} -> {}",
                state.frame_number, state.chunks_in_frame, chunk.chunks_in_frame
            );
            return AcceptOutcome::Rejected(chunk);
        }

        if chunk.chunk_index as usize >= state.slots.len() {
            warn!(
                "Chunk index {} out of bounds for frame {} ({} slots)",
                chunk.chunk_index,
                state.frame_number,
                state.slots.len()
            );
            return AcceptOutcome::Rejected(chunk);
        }

        if state.slots[chunk.chunk_index as usize].is_some() {
            warn!(
                "Duplicate chunk {} for frame {}",
                chunk.chunk_index, state.frame_number
            );
            return AcceptOutcome::Rejected(chunk);
        }

        if chunk.sector > state.last_sector.saturating_add(self.sector_lookahead) {
            warn!(
                "Chunk for frame {} at sector {} exceeds lookahead window (last sector {}, window {})",
                state.frame_number, chunk.sector, state.last_sector, self.sector_lookahead
            );
            return AcceptOutcome::Rejected(chunk);
        }

        state.last_sector = chunk.sector;
        state.received += 1;
        state.slots[chunk.chunk_index as usize] = Some(chunk.payload);

        AcceptOutcome::Accepted
    }

    /// True once the highest-index slot has been filled
    ///
    /// Completion does not imply every slot is filled; a complete frame may
    /// still contain gaps.
    pub fn is_complete(&self) -> bool {
        self.state
            .as_ref()
            .map(|s| s.slots.last().map(|slot| slot.is_some()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Emit the frame under construction, discarding the build state
    ///
    /// Returns the received payloads in index order; logs one warning per
    /// unfilled (gap) slot. Returns `None` if no frame is open.
    pub fn finish(&mut self) -> Option<DemuxedFrame> {
        let state = self.state.take()?;

        let mut chunks = Vec::with_capacity(state.received);
        let mut missing = 0usize;
        for (index, slot) in state.slots.into_iter().enumerate() {
            match slot {
                Some(payload) => chunks.push(payload),
                None => {
                    missing += 1;
                    warn!(
                        "Missing chunk {} of {} for frame {}",
                        index, state.chunks_in_frame, state.frame_number
                    );
                }
            }
        }

        let byte_size = chunks.iter().map(|c| c.len()).sum();

        Some(DemuxedFrame {
            frame_number: state.frame_number,
            width: state.width,
            height: state.height,
            chunks,
            start_sector: state.first_sector,
            end_sector: state.last_sector,
            byte_size,
            missing_chunks: missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(sector: u32, frame: u32, index: u16, count: u16) -> VideoChunk {
        VideoChunk {
            sector,
            frame_number: frame,
            chunk_index: index,
            chunks_in_frame: count,
            width: 320,
            height: 240,
            payload: vec![index as u8; 8],
        }
    }

    #[test]
    fn test_in_order_frame_completes() {
        let mut asm = FrameAssembler::new(50);
        asm.begin(chunk(0, 7, 0, 3));
        assert!(!asm.is_complete());

        assert!(matches!(asm.accept(chunk(1, 7, 1, 3)), AcceptOutcome::Accepted));
        assert!(matches!(asm.accept(chunk(2, 7, 2, 3)), AcceptOutcome::Accepted));
        assert!(asm.is_complete());

        let frame = asm.finish().unwrap();
        assert_eq!(frame.frame_number, 7);
        assert_eq!(frame.chunks.len(), 3);
        assert_eq!(frame.missing_chunks, 0);
        assert_eq!(frame.start_sector, 0);
        assert_eq!(frame.end_sector, 2);
        assert_eq!(frame.byte_size, 24);
        assert!(!asm.is_open());
    }

    #[test]
    fn test_gap_tolerance() {
        // P2: indices {0, 2} of a 3-chunk frame still complete with one gap
        let mut asm = FrameAssembler::new(50);
        asm.begin(chunk(0, 1, 0, 3));
        assert!(matches!(asm.accept(chunk(2, 1, 2, 3)), AcceptOutcome::Accepted));
        assert!(asm.is_complete());

        let frame = asm.finish().unwrap();
        assert_eq!(frame.chunks.len(), 2);
        assert_eq!(frame.missing_chunks, 1);
        assert!(frame.has_gaps());
    }

    #[test]
    fn test_corrupt_header_forces_immediate_completion() {
        // chunk_index >= chunks_in_frame: sized to index+1, sole member
        let mut asm = FrameAssembler::new(50);
        asm.begin(chunk(0, 9, 4, 3));
        assert!(asm.is_complete());

        let frame = asm.finish().unwrap();
        assert_eq!(frame.chunks.len(), 1);
        assert_eq!(frame.missing_chunks, 4);
    }

    #[test]
    fn test_zero_declared_chunks_is_corrupt() {
        let mut asm = FrameAssembler::new(50);
        asm.begin(chunk(0, 2, 0, 0));
        assert!(asm.is_complete());
        let frame = asm.finish().unwrap();
        assert_eq!(frame.chunks.len(), 1);
        assert_eq!(frame.missing_chunks, 0);
    }

    #[test]
    fn test_rejects_wrong_frame_number() {
        let mut asm = FrameAssembler::new(50);
        asm.begin(chunk(0, 5, 0, 4));
        let offender = chunk(1, 6, 0, 2);
        match asm.accept(offender.clone()) {
            AcceptOutcome::Rejected(returned) => assert_eq!(returned, offender),
            AcceptOutcome::Accepted => panic!("chunk for another frame was accepted"),
        }
        // Scenario B: the abandoned frame still emits with what it collected
        let frame = asm.finish().unwrap();
        assert_eq!(frame.frame_number, 5);
        assert_eq!(frame.chunks.len(), 1);
        assert_eq!(frame.missing_chunks, 3);
    }

    #[test]
    fn test_out_of_order_within_frame() {
        // Scenario A: [index1, index0, index2] still yields one full frame
        let mut asm = FrameAssembler::new(50);
        asm.begin(chunk(0, 7, 1, 3));
        assert!(matches!(asm.accept(chunk(1, 7, 0, 3)), AcceptOutcome::Accepted));
        assert!(matches!(asm.accept(chunk(2, 7, 2, 3)), AcceptOutcome::Accepted));
        assert!(asm.is_complete());

        let frame = asm.finish().unwrap();
        assert_eq!(frame.frame_number, 7);
        assert_eq!(frame.chunks.len(), 3);
        assert_eq!(frame.missing_chunks, 0);
        // Slotted by declared index, not arrival order
        assert_eq!(frame.chunks[0], vec![0u8; 8]);
        assert_eq!(frame.chunks[1], vec![1u8; 8]);
        assert_eq!(frame.chunks[2], vec![2u8; 8]);
    }

    #[test]
    fn test_rejects_duplicate_index() {
        let mut asm = FrameAssembler::new(50);
        asm.begin(chunk(0, 3, 1, 4));
        assert!(matches!(
            asm.accept(chunk(1, 3, 1, 4)),
            AcceptOutcome::Rejected(_)
        ));
        assert!(matches!(asm.accept(chunk(1, 3, 2, 4)), AcceptOutcome::Accepted));
    }

    #[test]
    fn test_rejects_changed_chunk_count() {
        let mut asm = FrameAssembler::new(50);
        asm.begin(chunk(0, 3, 0, 4));
        assert!(matches!(
            asm.accept(chunk(1, 3, 1, 5)),
            AcceptOutcome::Rejected(_)
        ));
    }

    #[test]
    fn test_rejects_out_of_bounds_index() {
        let mut asm = FrameAssembler::new(50);
        asm.begin(chunk(0, 3, 0, 3));
        assert!(matches!(
            asm.accept(chunk(1, 3, 3, 3)),
            AcceptOutcome::Rejected(_)
        ));
    }

    #[test]
    fn test_rejects_beyond_lookahead_window() {
        let mut asm = FrameAssembler::new(50);
        asm.begin(chunk(100, 3, 0, 3));
        // Exactly at the window edge is still accepted
        assert!(matches!(
            asm.accept(chunk(150, 3, 1, 3)),
            AcceptOutcome::Accepted
        ));
        // One past the (new) window edge is rejected
        assert!(matches!(
            asm.accept(chunk(201, 3, 2, 3)),
            AcceptOutcome::Rejected(_)
        ));
    }

    #[test]
    fn test_finish_without_open_frame() {
        let mut asm = FrameAssembler::new(50);
        assert!(asm.finish().is_none());
    }
}
