//! Per-frame recycling pool of GPU/CPU-shared linear buffers.
//!
//! Dynamic vertex/index/uniform data lives in pool buffers for exactly one
//! frame. Rather than fencing each buffer individually, whole frame
//! generations migrate between three partitions: `available` buffers are
//! idle, `current` buffers were handed out this frame, and `retired` holds
//! prior frames' current-sets until their command buffers complete. The
//! completion handler may fire on a driver thread, so every mutation runs
//! under the lock.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Allocation granularity; requests round up to this.
const ALIGN: u64 = 16;

#[derive(Default)]
struct PoolInner {
    available: Vec<mtl::Buffer>,
    current: Vec<mtl::Buffer>,
    retired: VecDeque<Vec<mtl::Buffer>>,
}

pub struct BufferPool {
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    pub fn new() -> Self {
        BufferPool {
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Hand out a shared, write-combined buffer of at least `size` bytes.
    /// Reuses the first sufficiently large idle buffer, allocating only
    /// when none fits.
    pub fn buffer_for_size(&self, device: &mtl::Device, size: u64) -> mtl::Buffer {
        let size = size.max(ALIGN).next_multiple_of(ALIGN);
        let mut inner = self.inner.lock();
        let buffer = match inner.available.iter().position(|b| b.length() >= size) {
            Some(index) => inner.available.swap_remove(index),
            None => device.new_buffer(
                size,
                mtl::MTLResourceOptions::StorageModeShared
                    | mtl::MTLResourceOptions::CPUCacheModeWriteCombined,
            ),
        };
        inner.current.push(buffer.clone());
        buffer
    }

    /// Rotate frame generations on command-buffer completion.
    pub fn rotate(&self) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        rotate_generations(&mut inner.current, &mut inner.retired, &mut inner.available);
    }

    /// Buffers handed out and not yet recycled.
    pub fn in_flight(&self) -> usize {
        let inner = self.inner.lock();
        inner.current.len() + inner.retired.iter().map(Vec::len).sum::<usize>()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// The finished frame's buffers retire; the oldest retired generation comes
/// back into circulation. A generation is held for one extra frame after
/// its own completion, so a buffer can never be re-handed-out while a
/// straggling encoder still references it.
fn rotate_generations<T>(
    current: &mut Vec<T>,
    retired: &mut VecDeque<Vec<T>>,
    available: &mut Vec<T>,
) {
    retired.push_back(std::mem::take(current));
    if retired.len() > 1 {
        let freed = retired.pop_front().unwrap();
        available.extend(freed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generations_lag_one_frame() {
        let mut current = vec![1];
        let mut retired = VecDeque::new();
        let mut available = Vec::new();

        rotate_generations(&mut current, &mut retired, &mut available);
        // Frame 1 just completed; its buffers are retired, not yet reusable.
        assert!(available.is_empty());
        assert_eq!(retired.len(), 1);

        current.push(2);
        rotate_generations(&mut current, &mut retired, &mut available);
        // Frame 2's completion releases frame 1's generation.
        assert_eq!(available, vec![1]);
        assert_eq!(retired.front().map(Vec::len), Some(1));
    }

    #[test]
    fn at_most_two_generations_held() {
        let mut current = Vec::new();
        let mut retired = VecDeque::new();
        let mut available = Vec::new();
        for frame in 0..10 {
            current.push(frame);
            rotate_generations(&mut current, &mut retired, &mut available);
            assert!(retired.len() <= 2);
        }
    }
}
