//! Real-time playback engine
//!
//! The pipeline threads, the handoff queues between them, the presentation
//! clock, and the shared media types they exchange.

pub mod handoff;
pub mod pipeline;
pub mod pool;
pub mod timeline;
pub mod types;

pub use handoff::{BoundedHandoffQueue, PeerGuard, PeerHandle, ReaderState};
pub use pipeline::{new_session, PlaybackPipeline, SessionConfig};
pub use pool::PixelBufferPool;
pub use timeline::{
    AudioTimeline, PresentOutcome, SystemTimeline, Timeline, TimelineState,
};
pub use types::{
    AudioTrack, ChunkSource, MediaDescriptor, NullVideoSurface, PcmBlock, PixelBuffer,
    PresentationUnit, RawFrame, UnitPayload, VideoSurface, VideoTrack,
};
