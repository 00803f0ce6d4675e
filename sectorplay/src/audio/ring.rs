//! Lock-free ring buffer between the audio feed thread and the output
//! callback
//!
//! Single-producer single-consumer: the feed thread fills the buffer with
//! sample frames, the real-time audio callback drains it without locks.
//! Underrun and overrun are handled gracefully with rate-limited logging.
//! The consumer additionally counts frames actually consumed; that counter
//! is the audio-clock timeline's position source, so underrun freezes the
//! play clock for free.

use crate::audio::types::AudioFrame;
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Log every Nth underrun/overrun to avoid spamming from the audio path
const LOG_EVERY: u64 = 1000;

/// Lock-free SPSC ring buffer for audio frames
pub struct AudioRing {
    buffer: HeapRb<AudioFrame>,
    underruns: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,
    consumed: Arc<AtomicU64>,
}

impl AudioRing {
    /// Create a ring buffer with the given capacity in frames
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: HeapRb::new(capacity),
            underruns: Arc::new(AtomicU64::new(0)),
            overruns: Arc::new(AtomicU64::new(0)),
            consumed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Counter of frames the consumer has actually popped
    ///
    /// Grab this before `split()`; the audio-clock timeline reads it.
    pub fn consumed_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.consumed)
    }

    /// Split into producer and consumer halves
    ///
    /// Producer is used by the feed thread, consumer by the audio callback.
    pub fn split(self) -> (RingProducer, RingConsumer) {
        let (prod, cons) = self.buffer.split();

        let producer = RingProducer {
            producer: prod,
            overruns: Arc::clone(&self.overruns),
        };

        let consumer = RingConsumer {
            consumer: cons,
            underruns: Arc::clone(&self.underruns),
            consumed: Arc::clone(&self.consumed),
        };

        (producer, consumer)
    }
}

/// Producer half (feed thread)
pub struct RingProducer {
    producer: ringbuf::HeapProd<AudioFrame>,
    overruns: Arc<AtomicU64>,
}

impl RingProducer {
    /// Push one frame; returns false if the buffer was full (overrun)
    pub fn push(&mut self, frame: AudioFrame) -> bool {
        match self.producer.try_push(frame) {
            Ok(_) => true,
            Err(_) => {
                let count = self.overruns.fetch_add(1, Ordering::Relaxed) + 1;
                if count % LOG_EVERY == 0 {
                    warn!("Audio ring buffer overrun (total: {})", count);
                }
                false
            }
        }
    }

    /// Current buffer fill level
    pub fn occupied_len(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Buffer capacity in frames
    pub fn capacity(&self) -> usize {
        self.producer.capacity().into()
    }
}

/// Consumer half (audio callback)
pub struct RingConsumer {
    consumer: ringbuf::HeapCons<AudioFrame>,
    underruns: Arc<AtomicU64>,
    consumed: Arc<AtomicU64>,
}

impl RingConsumer {
    /// Pop one frame; `None` on empty buffer (underrun: output silence)
    ///
    /// Each successful pop advances the consumed-frames counter.
    pub fn pop(&mut self) -> Option<AudioFrame> {
        match self.consumer.try_pop() {
            Some(frame) => {
                self.consumed.fetch_add(1, Ordering::Release);
                Some(frame)
            }
            None => {
                let count = self.underruns.fetch_add(1, Ordering::Relaxed) + 1;
                if count % LOG_EVERY == 0 {
                    trace!("Audio ring buffer underrun (total: {})", count);
                }
                None
            }
        }
    }

    /// Current buffer fill level
    pub fn occupied_len(&self) -> usize {
        self.consumer.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_round_trip() {
        let ring = AudioRing::new(128);
        let consumed = ring.consumed_counter();
        let (mut prod, mut cons) = ring.split();

        assert!(prod.push(AudioFrame::from_stereo(0.1, 0.2)));
        assert!(prod.push(AudioFrame::from_stereo(0.3, 0.4)));
        assert_eq!(prod.occupied_len(), 2);

        let first = cons.pop().unwrap();
        assert_eq!(first.left, 0.1);
        assert_eq!(first.right, 0.2);
        assert_eq!(consumed.load(Ordering::Acquire), 1);

        cons.pop().unwrap();
        assert_eq!(consumed.load(Ordering::Acquire), 2);
        assert!(cons.pop().is_none());
        // Underrun must not advance the consumed counter
        assert_eq!(consumed.load(Ordering::Acquire), 2);
    }

    #[test]
    fn test_overrun_reports_full() {
        let ring = AudioRing::new(2);
        let (mut prod, _cons) = ring.split();

        assert!(prod.push(AudioFrame::zero()));
        assert!(prod.push(AudioFrame::zero()));
        assert!(!prod.push(AudioFrame::zero()));
        assert_eq!(prod.capacity(), 2);
    }
}
