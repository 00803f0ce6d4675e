//! Audio sinks
//!
//! The pipeline writes PCM blocks to a sink; the sink's consumed-frame
//! counter drives the audio-clock timeline. Sinks are built on the audio
//! feed thread through a `Send` factory (the device sink's cpal stream is
//! not `Send`) and dropped on that thread's exit path.

use crate::audio::output::AudioOutput;
use crate::audio::ring::{AudioRing, RingProducer};
use crate::audio::types::AudioFrame;
use crate::error::Result;
use crate::playback::types::PcmBlock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// State shared between the pipeline, the timeline, and the sink
#[derive(Clone)]
pub struct SinkShared {
    /// Frames the sink has actually consumed (timeline position source)
    pub consumed_frames: Arc<AtomicU64>,

    /// Gate: the sink consumes only while the timeline is running
    pub running: Arc<AtomicBool>,

    /// Set on session terminate so blocked writes bail out
    pub terminated: Arc<AtomicBool>,
}

impl SinkShared {
    /// Create shared state with the clock at zero, paused
    pub fn new() -> Self {
        Self {
            consumed_frames: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for SinkShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts PCM with a fixed sample format; writes may block on the OS
/// audio buffer
pub trait AudioSink {
    /// Write one block; blocks with backpressure while the device buffer is
    /// full, returning early if the session terminated
    fn write(&mut self, block: &PcmBlock) -> Result<()>;

    /// Write silence frames (gap padding between combined audio segments)
    fn write_silence(&mut self, frames: u64) -> Result<()>;

    /// Logical frames accepted so far (audio written + silence padding)
    fn frames_written(&self) -> u64;
}

/// Builds a sink on the audio feed thread
pub trait AudioSinkFactory: Send {
    /// Open a sink producing audio at the given sample rate
    fn open(&self, sample_rate: u32, shared: SinkShared) -> Result<Box<dyn AudioSink>>;
}

/// Sink that discards audio while keeping the clock honest
///
/// Consumes frames instantly once the running gate opens; used for headless
/// playback and tests.
pub struct NullAudioSink {
    shared: SinkShared,
    frames_written: u64,
}

impl NullAudioSink {
    /// Create a null sink over the shared state
    pub fn new(shared: SinkShared) -> Self {
        Self {
            shared,
            frames_written: 0,
        }
    }

    fn consume(&mut self, frames: u64) {
        // Block while paused, like a real device with its stream stopped
        while !self.shared.running.load(Ordering::Acquire) {
            if self.shared.terminated.load(Ordering::Acquire) {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.frames_written += frames;
        self.shared
            .consumed_frames
            .fetch_add(frames, Ordering::Release);
    }
}

impl AudioSink for NullAudioSink {
    fn write(&mut self, block: &PcmBlock) -> Result<()> {
        self.consume(block.frames.len() as u64);
        Ok(())
    }

    fn write_silence(&mut self, frames: u64) -> Result<()> {
        self.consume(frames);
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

/// Factory for [`NullAudioSink`]
pub struct NullAudioSinkFactory;

impl AudioSinkFactory for NullAudioSinkFactory {
    fn open(&self, _sample_rate: u32, shared: SinkShared) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(NullAudioSink::new(shared)))
    }
}

/// Real device sink: ring buffer into a cpal output stream
///
/// The callback pops the ring only while the running gate is open, counting
/// consumed frames; otherwise it outputs silence, which freezes the audio
/// clock exactly as a pause or underrun should.
pub struct DeviceAudioSink {
    producer: RingProducer,
    shared: SinkShared,
    frames_written: u64,
    // Held for its Drop: stopping the stream releases the device handle on
    // this thread
    _output: AudioOutput,
}

impl DeviceAudioSink {
    /// Open the default output device and start its stream
    pub fn open(sample_rate: u32, ring_capacity: usize, shared: SinkShared) -> Result<Self> {
        let ring = AudioRing::new(ring_capacity);
        let ring_counter = ring.consumed_counter();
        let (producer, mut consumer) = ring.split();

        let mut output = AudioOutput::new(sample_rate)?;
        if output.sample_rate() != sample_rate {
            warn!(
                "Audio device runs at {}Hz, stream is {}Hz; playback rate will be off",
                output.sample_rate(),
                sample_rate
            );
        }

        let running = Arc::clone(&shared.running);
        let pipeline_counter = Arc::clone(&shared.consumed_frames);
        output.start(move || {
            if !running.load(Ordering::Acquire) {
                return AudioFrame::zero();
            }
            match consumer.pop() {
                Some(frame) => {
                    // The timeline reads the shared counter; keep it in
                    // lockstep with the ring's pop count
                    pipeline_counter
                        .store(ring_counter.load(Ordering::Acquire), Ordering::Release);
                    frame
                }
                None => AudioFrame::zero(),
            }
        })?;

        Ok(Self {
            producer,
            shared,
            frames_written: 0,
            _output: output,
        })
    }

    fn push_blocking(&mut self, frame: AudioFrame) -> bool {
        loop {
            if self.shared.terminated.load(Ordering::Acquire) {
                return false;
            }
            if self.producer.push(frame) {
                return true;
            }
            // Device buffer full: natural backpressure
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl AudioSink for DeviceAudioSink {
    fn write(&mut self, block: &PcmBlock) -> Result<()> {
        for frame in &block.frames {
            if !self.push_blocking(*frame) {
                return Ok(());
            }
            self.frames_written += 1;
        }
        Ok(())
    }

    fn write_silence(&mut self, frames: u64) -> Result<()> {
        for _ in 0..frames {
            if !self.push_blocking(AudioFrame::zero()) {
                return Ok(());
            }
            self.frames_written += 1;
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

/// Factory for [`DeviceAudioSink`]
pub struct DeviceAudioSinkFactory {
    /// Ring buffer capacity in frames
    pub ring_capacity: usize,
}

impl AudioSinkFactory for DeviceAudioSinkFactory {
    fn open(&self, sample_rate: u32, shared: SinkShared) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(DeviceAudioSink::open(
            sample_rate,
            self.ring_capacity,
            shared,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_consumes_while_running() {
        let shared = SinkShared::new();
        shared.running.store(true, Ordering::Release);
        let mut sink = NullAudioSink::new(shared.clone());

        let block = PcmBlock {
            sample_rate: 44100,
            frames: vec![AudioFrame::zero(); 100],
        };
        sink.write(&block).unwrap();
        sink.write_silence(50).unwrap();

        assert_eq!(sink.frames_written(), 150);
        assert_eq!(shared.consumed_frames.load(Ordering::Acquire), 150);
    }

    #[test]
    fn test_null_sink_bails_out_on_terminate() {
        let shared = SinkShared::new();
        shared.terminated.store(true, Ordering::Release);
        let mut sink = NullAudioSink::new(shared.clone());

        // Paused and terminated: write returns without consuming
        sink.write_silence(10).unwrap();
        assert_eq!(shared.consumed_frames.load(Ordering::Acquire), 0);
    }
}
