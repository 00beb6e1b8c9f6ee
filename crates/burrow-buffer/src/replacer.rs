//! Clock page replacement for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clock replacement algorithm.
///
/// Each frame has a reference bit set on access. The clock hand sweeps
/// the frames; a set bit buys the frame one more rotation, a clear bit
/// on an eligible frame makes it the victim. Eligibility (pin count
/// zero, page resident) is decided by the caller-supplied filter so the
/// replacer never races the pool's pin accounting.
pub struct ClockReplacer {
    num_frames: usize,
    reference_bits: Vec<AtomicBool>,
    clock_hand: Mutex<usize>,
}

impl ClockReplacer {
    /// Creates a new clock replacer over `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            reference_bits: (0..num_frames).map(|_| AtomicBool::new(false)).collect(),
            clock_hand: Mutex::new(0),
        }
    }

    /// Returns the total number of frames tracked.
    pub fn capacity(&self) -> usize {
        self.num_frames
    }

    /// Records that the given frame was accessed.
    #[inline]
    pub fn record_access(&self, frame_id: FrameId) {
        if let Some(bit) = self.reference_bits.get(frame_id.0 as usize) {
            bit.store(true, Ordering::Relaxed);
        }
    }

    /// Forgets a frame's access history (frame returned to the free list).
    #[inline]
    pub fn remove(&self, frame_id: FrameId) {
        if let Some(bit) = self.reference_bits.get(frame_id.0 as usize) {
            bit.store(false, Ordering::Relaxed);
        }
    }

    /// Selects a victim frame among those `is_evictable` accepts.
    ///
    /// Makes at most two full rotations: the first may clear reference
    /// bits, the second is guaranteed to find any eligible frame.
    pub fn evict<F>(&self, is_evictable: F) -> Option<FrameId>
    where
        F: Fn(FrameId) -> bool,
    {
        if self.num_frames == 0 {
            return None;
        }

        let mut hand = self.clock_hand.lock();
        for _ in 0..self.num_frames * 2 {
            let idx = *hand;
            *hand = (*hand + 1) % self.num_frames;

            let frame_id = FrameId(idx as u32);
            if !is_evictable(frame_id) {
                continue;
            }

            if self.reference_bits[idx].swap(false, Ordering::Relaxed) {
                continue;
            }

            return Some(frame_id);
        }

        None
    }
}
