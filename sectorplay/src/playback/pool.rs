//! Pixel buffer recycling
//!
//! Decoded video frames are large short-lived allocations at frame rate.
//! Instead of allocating a fresh buffer per frame and dropping it after the
//! blit, the decode stage checks buffers out of a free-list keyed by size
//! class and the presentation stage returns them explicitly once the surface
//! is done with them. Media switches resolution rarely, so in the steady
//! state one size class serves every frame.

use std::collections::HashMap;
use std::sync::Mutex;

/// Buffers retained per size class
///
/// Bounds pool growth to roughly the number of frames in flight between
/// decode and present.
const MAX_POOLED_PER_CLASS: usize = 8;

/// Free-list of pixel buffers, keyed by capacity
pub struct PixelBufferPool {
    classes: Mutex<HashMap<usize, Vec<Vec<u32>>>>,
}

impl PixelBufferPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            classes: Mutex::new(HashMap::new()),
        }
    }

    /// Check out an empty buffer with capacity for `pixel_count` pixels
    ///
    /// Reuses a pooled buffer of the same size class when one is available.
    pub fn acquire(&self, pixel_count: usize) -> Vec<u32> {
        let mut classes = self.classes.lock().unwrap();
        match classes.get_mut(&pixel_count).and_then(|class| class.pop()) {
            Some(buffer) => buffer,
            None => Vec::with_capacity(pixel_count),
        }
    }

    /// Return a buffer to its size class
    ///
    /// The buffer is cleared; its capacity decides the class it rejoins.
    /// Classes at their retention bound drop the buffer instead.
    pub fn release(&self, mut buffer: Vec<u32>) {
        buffer.clear();
        let class = buffer.capacity();
        if class == 0 {
            return;
        }
        let mut classes = self.classes.lock().unwrap();
        let pooled = classes.entry(class).or_default();
        if pooled.len() < MAX_POOLED_PER_CLASS {
            pooled.push(buffer);
        }
    }
}

impl Default for PixelBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pooled_in_class(pool: &PixelBufferPool, class: usize) -> usize {
        pool.classes
            .lock()
            .unwrap()
            .get(&class)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    #[test]
    fn test_released_buffer_is_reused() {
        let pool = PixelBufferPool::new();
        let mut buffer = pool.acquire(64);
        buffer.resize(64, 0xAB);
        pool.release(buffer);
        assert_eq!(pooled_in_class(&pool, 64), 1);

        let reused = pool.acquire(64);
        assert_eq!(pooled_in_class(&pool, 64), 0);
        assert!(reused.is_empty(), "recycled buffers come back cleared");
        assert_eq!(reused.capacity(), 64);
    }

    #[test]
    fn test_size_classes_do_not_mix() {
        let pool = PixelBufferPool::new();
        pool.release(Vec::with_capacity(64));
        let other = pool.acquire(128);
        assert_eq!(other.capacity(), 128);
        assert_eq!(pooled_in_class(&pool, 64), 1);
    }

    #[test]
    fn test_retention_is_bounded() {
        let pool = PixelBufferPool::new();
        for _ in 0..(MAX_POOLED_PER_CLASS + 4) {
            pool.release(Vec::with_capacity(32));
        }
        assert_eq!(pooled_in_class(&pool, 32), MAX_POOLED_PER_CLASS);
    }

    #[test]
    fn test_zero_capacity_buffers_are_dropped() {
        let pool = PixelBufferPool::new();
        pool.release(Vec::new());
        assert_eq!(pooled_in_class(&pool, 0), 0);
    }
}
