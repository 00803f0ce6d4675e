//! Bounded single-producer/single-consumer handoff queue
//!
//! The sole inter-thread data path in the pipeline. A fixed-capacity FIFO
//! with two close modes: `close_when_empty()` enqueues a poison marker so
//! everything already queued is still delivered, while `close_now()`
//! discards queued items and wakes every waiter immediately.
//!
//! Every blocking wait is bounded (default ~1s) and re-checked in a loop.
//! Before each wait the registered peer thread is checked for liveness; a
//! dead peer turns the wait into a fatal stalled-peer error instead of a
//! hang.

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Liveness handle for a peer thread
///
/// Clone one per stage thread and drop its [`PeerGuard`] on the thread's exit
/// path (the guard clears the flag even if the thread panics).
#[derive(Clone, Debug)]
pub struct PeerHandle {
    alive: Arc<AtomicBool>,
}

impl PeerHandle {
    /// Create a handle marked alive
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the peer thread is still running
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Guard that marks the peer dead when dropped
    pub fn guard(&self) -> PeerGuard {
        PeerGuard {
            alive: Arc::clone(&self.alive),
        }
    }
}

impl Default for PeerHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the peer's alive flag on drop
pub struct PeerGuard {
    alive: Arc<AtomicBool>,
}

impl Drop for PeerGuard {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Reader-side state of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Delivering items
    Open,

    /// `take()` blocks until resumed
    Paused,

    /// No further items will be delivered
    Closed,
}

enum Entry<T> {
    Item(T),
    /// Sentinel for graceful, order-preserving closure
    Poison,
}

struct Inner<T> {
    entries: VecDeque<Entry<T>>,
    writer_closed: bool,
    reader: ReaderState,
    producer: Option<PeerHandle>,
    consumer: Option<PeerHandle>,
}

impl<T> Inner<T> {
    fn force_close(&mut self) {
        self.entries.clear();
        self.writer_closed = true;
        self.reader = ReaderState::Closed;
    }
}

/// Closable, capacity-bounded SPSC channel
pub struct BoundedHandoffQueue<T> {
    name: &'static str,
    capacity: usize,
    poll: Duration,
    inner: Mutex<Inner<T>>,
    condvar: Condvar,
}

impl<T> BoundedHandoffQueue<T> {
    /// Create a queue with the given capacity and bounded-wait interval
    pub fn new(name: &'static str, capacity: usize, poll: Duration) -> Self {
        assert!(capacity > 0, "queue capacity must be nonzero");
        Self {
            name,
            capacity,
            poll,
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                writer_closed: false,
                reader: ReaderState::Open,
                producer: None,
                consumer: None,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Register the liveness handle of the producing thread
    pub fn register_producer(&self, handle: PeerHandle) {
        self.inner.lock().unwrap().producer = Some(handle);
    }

    /// Register the liveness handle of the consuming thread
    pub fn register_consumer(&self, handle: PeerHandle) {
        self.inner.lock().unwrap().consumer = Some(handle);
    }

    /// Enqueue an item, blocking with backpressure while full
    ///
    /// Returns `Ok(false)` immediately once the queue is closed; the item is
    /// dropped in that case. Errors only on a fatal stalled-peer condition.
    pub fn add(&self, item: T) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.writer_closed || inner.reader == ReaderState::Closed {
                return Ok(false);
            }

            if inner.entries.len() < self.capacity {
                inner.entries.push_back(Entry::Item(item));
                self.condvar.notify_all();
                return Ok(true);
            }

            // Full: a dead consumer will never make space
            if let Some(consumer) = &inner.consumer {
                if !consumer.is_alive() {
                    error!(
                        "Queue '{}': consumer thread died with producer blocked on full queue",
                        self.name
                    );
                    inner.force_close();
                    self.condvar.notify_all();
                    return Err(Error::StalledPeer {
                        queue: self.name,
                        detail: "consumer thread died while queue was full".to_string(),
                    });
                }
            }

            let (guard, _timed_out) = self.condvar.wait_timeout(inner, self.poll).unwrap();
            inner = guard;
        }
    }

    /// Enqueue without ever blocking
    ///
    /// For logically-unbounded producers where hitting capacity indicates a
    /// design bug, not transient backpressure: a full queue force-closes and
    /// raises a fatal capacity error. Returns `Ok(false)` if already closed.
    pub fn add_nonblocking(&self, item: T) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();

        if inner.writer_closed || inner.reader == ReaderState::Closed {
            return Ok(false);
        }

        if inner.entries.len() >= self.capacity {
            error!(
                "Queue '{}': non-blocking add overflowed capacity {}",
                self.name, self.capacity
            );
            inner.force_close();
            self.condvar.notify_all();
            return Err(Error::CapacityExceeded {
                queue: self.name,
                detail: format!("{} entries", self.capacity),
            });
        }

        inner.entries.push_back(Entry::Item(item));
        self.condvar.notify_all();
        Ok(true)
    }

    /// Dequeue the next item, blocking while empty
    ///
    /// Returns `Ok(None)` once the queue is closed or the poison marker is
    /// dequeued (which closes the queue for all subsequent callers). Errors
    /// only on a fatal stalled-peer condition.
    pub fn take(&self) -> Result<Option<T>> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            match inner.reader {
                ReaderState::Closed => return Ok(None),
                ReaderState::Paused => {
                    let (guard, _timed_out) = self.condvar.wait_timeout(inner, self.poll).unwrap();
                    inner = guard;
                    continue;
                }
                ReaderState::Open => {}
            }

            if let Some(entry) = inner.entries.pop_front() {
                match entry {
                    Entry::Item(item) => {
                        self.condvar.notify_all();
                        return Ok(Some(item));
                    }
                    Entry::Poison => {
                        debug!("Queue '{}': poison dequeued, closing", self.name);
                        inner.force_close();
                        self.condvar.notify_all();
                        return Ok(None);
                    }
                }
            }

            // Empty with the writer closed: reader closes automatically
            if inner.writer_closed {
                inner.reader = ReaderState::Closed;
                self.condvar.notify_all();
                return Ok(None);
            }

            // Empty and open: a dead producer will never enqueue again
            if let Some(producer) = &inner.producer {
                if !producer.is_alive() {
                    error!(
                        "Queue '{}': producer thread died with consumer blocked on empty queue",
                        self.name
                    );
                    inner.force_close();
                    self.condvar.notify_all();
                    return Err(Error::StalledPeer {
                        queue: self.name,
                        detail: "producer thread died while queue was empty".to_string(),
                    });
                }
            }

            let (guard, _timed_out) = self.condvar.wait_timeout(inner, self.poll).unwrap();
            inner = guard;
        }
    }

    /// Cancel: discard queued items and wake all waiters immediately
    pub fn close_now(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.entries.is_empty() {
            warn!(
                "Queue '{}': discarding {} queued entries on close",
                self.name,
                inner.entries.len()
            );
        }
        inner.force_close();
        self.condvar.notify_all();
    }

    /// Graceful end-of-stream: deliver queued items, then close
    ///
    /// Enqueues a poison marker after current content; no further `add`
    /// succeeds. Idempotent.
    pub fn close_when_empty(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.writer_closed {
            return;
        }
        inner.writer_closed = true;
        // Poison may exceed capacity by one; delivery order matters more
        // than the bound for a sentinel
        inner.entries.push_back(Entry::Poison);
        self.condvar.notify_all();
    }

    /// Suspend `take()` until resumed
    pub fn pause_reading(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.reader == ReaderState::Open {
            inner.reader = ReaderState::Paused;
            self.condvar.notify_all();
        }
    }

    /// Resume a paused reader
    pub fn resume_reading(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.reader == ReaderState::Paused {
            inner.reader = ReaderState::Open;
            self.condvar.notify_all();
        }
    }

    /// Current reader-side state
    pub fn reader_state(&self) -> ReaderState {
        self.inner.lock().unwrap().reader
    }

    /// Whether the queue is closed for reading
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().reader == ReaderState::Closed
    }

    /// Number of queued entries (poison marker included)
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Whether the queue holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
