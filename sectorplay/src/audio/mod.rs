//! Audio output path
//!
//! PCM blocks flow from the pipeline's audio feed thread into a sink; the
//! device sink bridges to cpal through a lock-free ring buffer whose
//! consumed-frame counter doubles as the audio play clock.

pub mod output;
pub mod ring;
pub mod sink;
pub mod types;

pub use ring::{AudioRing, RingConsumer, RingProducer};
pub use sink::{
    AudioSink, AudioSinkFactory, DeviceAudioSink, DeviceAudioSinkFactory, NullAudioSink,
    NullAudioSinkFactory, SinkShared,
};
pub use types::AudioFrame;
