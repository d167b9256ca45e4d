//! Auxiliary path: reads the capture ring, low-passes at 200 Hz, and
//! fans stereo out to the eight physical channels.

use rf_audio::{AuxRing, StereoFrame};
use rf_dsp::ButterworthLowpass4;

/// Whether the aux source is treated as mono (broadcast to all eight
/// channels) or stereo (fanned L->{0,2,4,6}, R->{1,3,5,7}).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxFanoutMode {
    Mono,
    Stereo,
}

/// Owns the per-channel low-pass state and turns ring reads into an
/// eight-channel float block.
pub struct AuxPath {
    left_filter: ButterworthLowpass4,
    right_filter: ButterworthLowpass4,
    fanout: AuxFanoutMode,
}

impl AuxPath {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            left_filter: ButterworthLowpass4::new(sample_rate, 200.0),
            right_filter: ButterworthLowpass4::new(sample_rate, 200.0),
            fanout: AuxFanoutMode::Stereo,
        }
    }

    pub fn set_fanout(&mut self, mode: AuxFanoutMode) {
        self.fanout = mode;
    }

    pub fn fanout(&self) -> AuxFanoutMode {
        self.fanout
    }

    pub fn reset(&mut self) {
        self.left_filter.reset();
        self.right_filter.reset();
    }

    /// Read `block_len` frames from the ring, filter, and expand into
    /// `channels` (8 pre-sized Vecs), overwriting their contents.
    pub fn process_block(&mut self, ring: &AuxRing, block_len: usize, channels: &mut [Vec<f64>; 8]) {
        let frames: Vec<StereoFrame> = ring.read(block_len);

        let mut left: Vec<f64> = frames.iter().map(|f| f.left as f64).collect();
        let mut right: Vec<f64> = frames.iter().map(|f| f.right as f64).collect();
        self.left_filter.process_block(&mut left);
        self.right_filter.process_block(&mut right);

        match self.fanout {
            AuxFanoutMode::Mono => {
                for n in 0..block_len {
                    let mono = 0.5 * (left[n] + right[n]);
                    for ch in channels.iter_mut() {
                        ch[n] = mono;
                    }
                }
            }
            AuxFanoutMode::Stereo => {
                for n in 0..block_len {
                    for &ch in &[0, 2, 4, 6] {
                        channels[ch][n] = left[n];
                    }
                    for &ch in &[1, 3, 5, 7] {
                        channels[ch][n] = right[n];
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_fanout_broadcasts_identical_samples() {
        let ring = AuxRing::new(4096);
        for _ in 0..64 {
            ring.push_i16(10000, -10000);
        }
        let mut path = AuxPath::new(48000.0);
        path.set_fanout(AuxFanoutMode::Mono);
        let mut channels: [Vec<f64>; 8] = std::array::from_fn(|_| vec![0.0; 64]);
        path.process_block(&ring, 64, &mut channels);
        for ch in &channels {
            assert_eq!(ch, &channels[0]);
        }
    }

    #[test]
    fn stereo_fanout_splits_left_and_right() {
        let ring = AuxRing::new(4096);
        for _ in 0..64 {
            ring.push_i16(10000, -10000);
        }
        let mut path = AuxPath::new(48000.0);
        path.set_fanout(AuxFanoutMode::Stereo);
        let mut channels: [Vec<f64>; 8] = std::array::from_fn(|_| vec![0.0; 64]);
        path.process_block(&ring, 64, &mut channels);
        assert_eq!(channels[0], channels[2]);
        assert_eq!(channels[1], channels[3]);
        assert_ne!(channels[0][32], channels[1][32]);
    }

    #[test]
    fn silent_ring_yields_silence() {
        let ring = AuxRing::new(4096);
        let mut path = AuxPath::new(48000.0);
        let mut channels: [Vec<f64>; 8] = std::array::from_fn(|_| vec![1.0; 64]);
        path.process_block(&ring, 64, &mut channels);
        for ch in &channels {
            assert!(ch.iter().all(|&v| v.abs() < 1e-9));
        }
    }
}
