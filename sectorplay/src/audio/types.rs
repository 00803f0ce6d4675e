//! Core audio data types
//!
//! Samples are f32 in [-1.0, 1.0], stereo. Mono sources are duplicated into
//! both channels before they reach the sink.

/// One stereo sample frame
///
/// Used for passing audio between the feed thread and the output callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFrame {
    /// Left channel sample
    pub left: f32,

    /// Right channel sample
    pub right: f32,
}

impl AudioFrame {
    /// Create a silent frame (0.0, 0.0)
    pub fn zero() -> Self {
        AudioFrame {
            left: 0.0,
            right: 0.0,
        }
    }

    /// Create a frame from left/right samples
    pub fn from_stereo(left: f32, right: f32) -> Self {
        AudioFrame { left, right }
    }

    /// Create a frame with the same sample in both channels
    pub fn from_mono(sample: f32) -> Self {
        AudioFrame {
            left: sample,
            right: sample,
        }
    }
}
