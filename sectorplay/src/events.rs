//! Event system for playback sessions
//!
//! Listener callbacks run on a single dedicated dispatch thread fed by an
//! mpsc channel, so registered listeners never block pipeline threads.
//! Events are delivered FIFO relative to the state changes that caused them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Every stream played out to natural end-of-stream
    Finished,

    /// The session was terminated
    Terminated,
}

/// Events a playback session fires
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Playback started or resumed
    Play {
        /// Session that changed state
        session_id: Uuid,
        /// When the state changed
        timestamp: DateTime<Utc>,
    },

    /// Playback paused
    Pause {
        /// Session that changed state
        session_id: Uuid,
        /// When the state changed
        timestamp: DateTime<Utc>,
    },

    /// Session over
    End {
        /// Session that ended
        session_id: Uuid,
        /// Natural end vs. termination
        reason: EndReason,
        /// When the session ended
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            PlayerEvent::Play { session_id, .. }
            | PlayerEvent::Pause { session_id, .. }
            | PlayerEvent::End { session_id, .. } => *session_id,
        }
    }
}

/// Receives session events on the dispatch thread
///
/// Implementations must not assume any particular calling thread, only that
/// calls for one session arrive in order.
pub trait PlaybackListener: Send {
    /// Handle one event
    fn on_event(&self, event: &PlayerEvent);
}

/// Owns the dispatch thread and the registered listeners
pub struct ListenerHub {
    tx: Mutex<Option<Sender<PlayerEvent>>>,
    listeners: Arc<Mutex<Vec<Box<dyn PlaybackListener>>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerHub {
    /// Create a hub and spawn its dispatch thread
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::channel::<PlayerEvent>();
        let listeners: Arc<Mutex<Vec<Box<dyn PlaybackListener>>>> =
            Arc::new(Mutex::new(Vec::new()));

        let dispatch_listeners = Arc::clone(&listeners);
        let thread = thread::Builder::new()
            .name("event-dispatch".to_string())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    let listeners = dispatch_listeners.lock().unwrap();
                    for listener in listeners.iter() {
                        listener.on_event(&event);
                    }
                }
                debug!("Event dispatch thread exiting");
            })
            .map_err(|e| {
                Error::Playback(format!("failed to spawn event dispatch thread: {}", e))
            })?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            listeners,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Register a listener for all subsequent events
    pub fn register(&self, listener: Box<dyn PlaybackListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Queue an event for dispatch; never blocks on listener code
    pub fn emit(&self, event: PlayerEvent) {
        let tx = self.tx.lock().unwrap();
        if let Some(tx) = tx.as_ref() {
            if tx.send(event).is_err() {
                warn!("Event dropped: dispatch thread is gone");
            }
        }
    }

    /// Close the channel and join the dispatch thread after it drains
    pub fn shutdown(&self) {
        let sender = self.tx.lock().unwrap().take();
        drop(sender);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ListenerHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        events: Arc<Mutex<Vec<PlayerEvent>>>,
    }

    impl PlaybackListener for Recorder {
        fn on_event(&self, event: &PlayerEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_events_delivered_in_fifo_order() {
        let hub = ListenerHub::new().expect("dispatch thread");
        let events = Arc::new(Mutex::new(Vec::new()));
        hub.register(Box::new(Recorder {
            events: Arc::clone(&events),
        }));

        let session_id = Uuid::new_v4();
        hub.emit(PlayerEvent::Play {
            session_id,
            timestamp: Utc::now(),
        });
        hub.emit(PlayerEvent::Pause {
            session_id,
            timestamp: Utc::now(),
        });
        hub.emit(PlayerEvent::End {
            session_id,
            reason: EndReason::Finished,
            timestamp: Utc::now(),
        });
        hub.shutdown();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], PlayerEvent::Play { .. }));
        assert!(matches!(events[1], PlayerEvent::Pause { .. }));
        assert!(matches!(
            events[2],
            PlayerEvent::End {
                reason: EndReason::Finished,
                ..
            }
        ));
        assert_eq!(events[0].session_id(), session_id);
    }

    #[test]
    fn test_all_listeners_receive_each_event() {
        let hub = ListenerHub::new().expect("dispatch thread");
        let count = Arc::new(AtomicUsize::new(0));

        struct Counter(Arc<AtomicUsize>);
        impl PlaybackListener for Counter {
            fn on_event(&self, _event: &PlayerEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        hub.register(Box::new(Counter(Arc::clone(&count))));
        hub.register(Box::new(Counter(Arc::clone(&count))));

        hub.emit(PlayerEvent::Play {
            session_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
        hub.shutdown();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emit_after_shutdown_is_dropped() {
        let hub = ListenerHub::new().expect("dispatch thread");
        hub.shutdown();
        hub.emit(PlayerEvent::Play {
            session_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_event_serialization() {
        let event = PlayerEvent::End {
            session_id: Uuid::new_v4(),
            reason: EndReason::Terminated,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"End\""));
    }
}
