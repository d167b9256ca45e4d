//! Auxiliary-input ring buffer.
//!
//! Decouples the bursty external Bluetooth capture source from the
//! fixed-rate engine read. Unlike [`crate::output_sink`]'s lock-free
//! SPSC ring, this buffer is explicitly mutex-protected: the capture
//! thread's writes are bursty and infrequent (every 5 ms at most),
//! so a short critical section costs nothing, and a plain mutex is
//! far simpler to reason about than a lock-free design here.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One stereo sample pair, already converted to float.
#[derive(Debug, Clone, Copy, Default)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

struct RingState {
    buffer: Vec<StereoFrame>,
    write_idx: usize,
    read_idx: usize,
    fill: usize,
}

impl RingState {
    fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

/// Mutex-protected stereo ring buffer for the auxiliary capture path.
pub struct AuxRing {
    state: Mutex<RingState>,
    underrun_count: AtomicU64,
    last_underrun_log: Mutex<Option<Instant>>,
}

impl AuxRing {
    /// `capacity` should be `BLOCK * 8` frames per the engine's sizing rule.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                buffer: vec![StereoFrame::default(); capacity],
                write_idx: 0,
                read_idx: 0,
                fill: 0,
            }),
            underrun_count: AtomicU64::new(0),
            last_underrun_log: Mutex::new(None),
        }
    }

    /// Convert one int16 stereo frame and append it, dropping the oldest
    /// frame on overflow (write pointer advances, read pointer advances
    /// by one to keep `fill` within capacity).
    pub fn push_i16(&self, left: i16, right: i16) {
        let frame = StereoFrame {
            left: left as f32 / 32767.0,
            right: right as f32 / 32767.0,
        };
        let mut state = self.state.lock();
        let capacity = state.capacity();
        let write_idx = state.write_idx;
        state.buffer[write_idx] = frame;
        state.write_idx = (write_idx + 1) % capacity;

        if state.fill < capacity {
            state.fill += 1;
        } else {
            // overflow: drop oldest
            state.read_idx = (state.read_idx + 1) % capacity;
        }
    }

    /// Read `n_frames` stereo frames. Shortfall is zero-filled and
    /// counted as an underrun; the read is a two-part batched copy
    /// when the requested window wraps the backing buffer.
    pub fn read(&self, n_frames: usize) -> Vec<StereoFrame> {
        let mut out = vec![StereoFrame::default(); n_frames];
        let mut state = self.state.lock();
        let capacity = state.capacity();
        let available = state.fill.min(n_frames);

        if available > 0 {
            let read_idx = state.read_idx;
            let first_run = available.min(capacity - read_idx);
            out[..first_run].copy_from_slice(&state.buffer[read_idx..read_idx + first_run]);
            if first_run < available {
                let remaining = available - first_run;
                out[first_run..available].copy_from_slice(&state.buffer[..remaining]);
            }
            state.read_idx = (read_idx + available) % capacity;
            state.fill -= available;
        }
        drop(state);

        if available < n_frames {
            self.record_underrun(n_frames - available);
        }

        out
    }

    fn record_underrun(&self, shortfall: usize) {
        self.underrun_count
            .fetch_add(shortfall as u64, Ordering::Relaxed);

        let mut last = self.last_underrun_log.lock();
        let now = Instant::now();
        let should_log = last.map(|t| now.duration_since(t) >= Duration::from_secs(1)).unwrap_or(true);
        if should_log {
            log::warn!("aux ring underrun: {shortfall} frames short");
            *last = Some(now);
        }
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    pub fn fill(&self) -> usize {
        self.state.lock().fill
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_less_than_written_is_exact() {
        let ring = AuxRing::new(16);
        for i in 0..4 {
            ring.push_i16(i * 100, -(i * 100));
        }
        let frames = ring.read(4);
        assert_eq!(frames.len(), 4);
        assert!((frames[1].left - (100.0 / 32767.0)).abs() < 1e-6);
        assert_eq!(ring.underrun_count(), 0);
    }

    #[test]
    fn shortfall_is_zero_filled_and_counted() {
        let ring = AuxRing::new(16);
        ring.push_i16(1000, 1000);
        let frames = ring.read(4);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[1].left, 0.0);
        assert_eq!(frames[2].left, 0.0);
        assert_eq!(frames[3].left, 0.0);
        assert_eq!(ring.underrun_count(), 3);
    }

    #[test]
    fn overflow_drops_oldest() {
        let ring = AuxRing::new(4);
        for i in 0..8 {
            ring.push_i16(i, i);
        }
        assert_eq!(ring.fill(), 4);
        let frames = ring.read(4);
        // the oldest 4 pushes (0..4) should have been dropped
        assert!((frames[0].left - (4.0 / 32767.0)).abs() < 1e-6);
    }

    #[test]
    fn read_wraps_correctly() {
        let ring = AuxRing::new(4);
        for i in 0..4 {
            ring.push_i16(i, i);
        }
        let _ = ring.read(2); // advance read_idx to 2
        for i in 4..6 {
            ring.push_i16(i, i); // wraps write_idx
        }
        let frames = ring.read(4);
        let values: Vec<i16> = frames.iter().map(|f| (f.left * 32767.0).round() as i16).collect();
        assert_eq!(values, vec![2, 3, 4, 5]);
    }

    #[test]
    fn fill_never_exceeds_capacity() {
        let ring = AuxRing::new(8);
        for i in 0..100 {
            ring.push_i16(i, i);
        }
        assert!(ring.fill() <= ring.capacity());
    }
}
