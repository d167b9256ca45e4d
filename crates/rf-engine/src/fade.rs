//! Sample-accurate fade controller bracketing every row.

use rf_core::SampleRate;

/// 4 seconds at 48 kHz.
pub const FADE_SECONDS: f64 = 4.0;

pub fn fade_samples(sample_rate: SampleRate) -> u64 {
    (FADE_SECONDS * sample_rate.as_f64()).round() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
    Hold,
}

/// Tracks the current fade ramp and produces per-sample multipliers.
#[derive(Debug, Clone)]
pub struct FadeController {
    total_samples: u64,
    direction: FadeDirection,
    samples_remaining: u64,
    multiplier: f64,
}

impl FadeController {
    pub fn new(sample_rate: SampleRate) -> Self {
        Self {
            total_samples: fade_samples(sample_rate),
            direction: FadeDirection::Hold,
            samples_remaining: 0,
            multiplier: 0.0,
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn direction(&self) -> FadeDirection {
        self.direction
    }

    pub fn samples_remaining(&self) -> u64 {
        self.samples_remaining
    }

    pub fn start_fade_in(&mut self) {
        self.direction = FadeDirection::In;
        self.samples_remaining = self.total_samples;
        self.multiplier = 0.0;
    }

    pub fn start_fade_out(&mut self) {
        self.direction = FadeDirection::Out;
        self.samples_remaining = self.total_samples;
    }

    /// Restore an in-flight fade (pause/resume snapshot restoration
    /// always starts a fresh fade-in, so this is only used to
    /// reconstruct `multiplier` for invariant checks).
    pub fn restore(&mut self, direction: FadeDirection, samples_remaining: u64, multiplier: f64) {
        self.direction = direction;
        self.samples_remaining = samples_remaining;
        self.multiplier = multiplier;
    }

    /// Whether the pause latch condition has been met: either the
    /// fade-out has fully completed, or the multiplier has decayed
    /// near-silent. Both conditions are checked to avoid deadlock if
    /// the fade never ticks cleanly to zero.
    pub fn pause_latch_reached(&self) -> bool {
        (self.direction == FadeDirection::Out && self.samples_remaining == 0)
            || self.multiplier <= 0.001
    }

    /// Advance one sample, returning the multiplier to apply to the
    /// therapy sample at this position.
    pub fn next_multiplier(&mut self) -> f64 {
        match self.direction {
            FadeDirection::Hold => self.multiplier,
            FadeDirection::In => {
                if self.samples_remaining == 0 {
                    self.multiplier = 1.0;
                    self.direction = FadeDirection::Hold;
                } else {
                    let progressed = self.total_samples - self.samples_remaining;
                    self.multiplier = progressed as f64 / self.total_samples as f64;
                    self.samples_remaining -= 1;
                }
                self.multiplier
            }
            FadeDirection::Out => {
                if self.samples_remaining == 0 {
                    self.multiplier = 0.0;
                } else {
                    self.multiplier = self.samples_remaining as f64 / self.total_samples as f64;
                    self.samples_remaining -= 1;
                }
                self.multiplier
            }
        }
    }

    pub fn process_block(&mut self, out: &mut [f64]) {
        for sample in out.iter_mut() {
            *sample = self.next_multiplier();
        }
    }
}
