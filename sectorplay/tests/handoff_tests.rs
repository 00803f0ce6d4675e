//! Threaded handoff queue tests
//!
//! Producer/consumer pairs on real threads: ordering under contention,
//! graceful drain, and dead-peer detection while blocked.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sectorplay::playback::{BoundedHandoffQueue, PeerHandle};
use sectorplay::Error;

fn queue(capacity: usize) -> Arc<BoundedHandoffQueue<u64>> {
    Arc::new(BoundedHandoffQueue::new(
        "test",
        capacity,
        Duration::from_millis(20),
    ))
}

#[test]
fn test_fifo_order_under_contention() {
    let q = queue(8);
    let producer = PeerHandle::new();
    let consumer = PeerHandle::new();
    q.register_producer(producer.clone());
    q.register_consumer(consumer.clone());

    let writer = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let _guard = producer.guard();
            for i in 0..1000u64 {
                assert!(q.add(i).expect("add should not fail"));
            }
            q.close_when_empty();
        })
    };

    let reader = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let _guard = consumer.guard();
            let mut seen = Vec::new();
            while let Some(item) = q.take().expect("take should not fail") {
                seen.push(item);
            }
            seen
        })
    };

    writer.join().unwrap();
    let seen = reader.join().unwrap();
    assert_eq!(seen.len(), 1000);
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "items must stay in order");
}

#[test]
fn test_graceful_close_delivers_everything_first() {
    let q = queue(16);
    let producer = PeerHandle::new();
    let consumer = PeerHandle::new();
    q.register_producer(producer.clone());
    q.register_consumer(consumer.clone());

    for i in 0..10u64 {
        assert!(q.add(i).unwrap());
    }
    q.close_when_empty();

    let _writer_guard = producer.guard();
    let _reader_guard = consumer.guard();
    let mut count = 0;
    while let Some(item) = q.take().unwrap() {
        assert_eq!(item, count);
        count += 1;
    }
    assert_eq!(count, 10);
    assert!(q.is_closed());
}

#[test]
fn test_blocked_producer_detects_dead_consumer() {
    let q = queue(2);
    let producer = PeerHandle::new();
    let consumer = PeerHandle::new();
    q.register_producer(producer.clone());
    q.register_consumer(consumer.clone());

    // Consumer thread exits immediately; its guard clears the liveness flag
    let dead = thread::spawn(move || {
        let _guard = consumer.guard();
    });
    dead.join().unwrap();

    let _writer_guard = producer.guard();
    assert!(q.add(1).unwrap());
    assert!(q.add(2).unwrap());

    // Queue is full and the reader is gone; the bounded wait must fail fast
    // instead of hanging
    match q.add(3) {
        Err(Error::StalledPeer { queue, .. }) => assert_eq!(queue, "test"),
        other => panic!("expected StalledPeer, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_blocked_consumer_detects_dead_producer() {
    let q = queue(4);
    let producer = PeerHandle::new();
    let consumer = PeerHandle::new();
    q.register_producer(producer.clone());
    q.register_consumer(consumer.clone());

    let dead = thread::spawn(move || {
        let _guard = producer.guard();
    });
    dead.join().unwrap();

    let _reader_guard = consumer.guard();
    match q.take() {
        Err(Error::StalledPeer { queue, .. }) => assert_eq!(queue, "test"),
        other => panic!("expected StalledPeer, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_close_now_discards_and_unblocks() {
    let q = queue(2);
    let producer = PeerHandle::new();
    let consumer = PeerHandle::new();
    q.register_producer(producer.clone());
    q.register_consumer(consumer.clone());

    let blocked = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let _guard = producer.guard();
            q.add(1).unwrap();
            q.add(2).unwrap();
            // Blocks at capacity until the queue is torn down
            q.add(3)
        })
    };

    thread::sleep(Duration::from_millis(50));
    q.close_now();

    // The blocked add resolves as "not delivered", never as an error
    assert_eq!(blocked.join().unwrap().unwrap(), false);

    let _reader_guard = consumer.guard();
    assert_eq!(q.take().unwrap(), None);
    assert!(q.is_closed());
}
