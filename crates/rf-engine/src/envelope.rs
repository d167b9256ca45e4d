//! Envelope generators: sine LFO, drum burst, heartbeat.

use rf_core::SampleRate;
use std::f64::consts::TAU;

/// Number of logical outputs that receive independently phase-offset
/// envelopes (one per zone, before the router fans them to speakers).
pub const NUM_LOGICAL_OUTPUTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvelopeFamily {
    SineLfo,
    Drum { attack_s: f64, decay_s: f64 },
    Heartbeat,
}

/// Picks the envelope family for a row's `mode`, per §4.E.
pub fn family_for_mode(mode: u8) -> EnvelopeFamily {
    match mode {
        8 => EnvelopeFamily::Drum { attack_s: 0.005, decay_s: 0.100 },
        9 => EnvelopeFamily::Drum { attack_s: 0.015, decay_s: 0.400 },
        10 => EnvelopeFamily::Heartbeat,
        _ => EnvelopeFamily::SineLfo,
    }
}

/// Stateful envelope generator for one row, producing the four
/// per-output envelope values for each sample of a block.
#[derive(Debug, Clone)]
pub struct EnvelopeGenerator {
    sample_rate: f64,
    family: EnvelopeFamily,
    f_m: f64,
    phase_deg: f64,
    /// Sine LFO: running phase in radians.
    sine_phase: f64,
    /// Drum/heartbeat: elapsed seconds within the current period/cycle.
    cycle_position: f64,
    /// Drum: how many periods elapsed since the last silent period (for
    /// burst grouping).
    periods_since_silence: u32,
    burst_len: u32,
}

impl EnvelopeGenerator {
    pub fn new(sample_rate: SampleRate, mode: u8, f_m: f64, phase_deg: f64) -> Self {
        let burst_len = (phase_deg / 22.5).round().max(1.0) as u32;
        Self {
            sample_rate: sample_rate.as_f64(),
            family: family_for_mode(mode),
            f_m,
            phase_deg,
            sine_phase: 0.0,
            cycle_position: 0.0,
            periods_since_silence: 0,
            burst_len,
        }
    }

    pub fn reset(&mut self) {
        self.sine_phase = 0.0;
        self.cycle_position = 0.0;
        self.periods_since_silence = 0;
    }

    pub fn restore(&mut self, sine_phase: f64, cycle_position: f64) {
        self.sine_phase = sine_phase;
        self.cycle_position = cycle_position;
    }

    pub fn sine_phase(&self) -> f64 {
        self.sine_phase
    }

    pub fn cycle_position(&self) -> f64 {
        self.cycle_position
    }

    /// Fill `out[k]` (k in 0..4) with one block's worth of envelope
    /// samples for logical output k.
    pub fn generate_block(&mut self, out: &mut [Vec<f64>; NUM_LOGICAL_OUTPUTS]) {
        let block_len = out[0].len();
        match self.family {
            EnvelopeFamily::SineLfo => self.generate_sine(out, block_len),
            EnvelopeFamily::Drum { attack_s, decay_s } => {
                self.generate_drum(out, block_len, attack_s, decay_s)
            }
            EnvelopeFamily::Heartbeat => self.generate_heartbeat(out, block_len),
        }
    }

    fn generate_sine(&mut self, out: &mut [Vec<f64>; NUM_LOGICAL_OUTPUTS], block_len: usize) {
        let increment = TAU * self.f_m / self.sample_rate;
        for n in 0..block_len {
            for k in 0..NUM_LOGICAL_OUTPUTS {
                let phi_k = (k as f64) * self.phase_deg.to_radians();
                out[k][n] = (1.0 + (self.sine_phase + phi_k).sin()) / 2.0;
            }
            self.sine_phase = (self.sine_phase + increment) % TAU;
        }
    }

    fn generate_drum(
        &mut self,
        out: &mut [Vec<f64>; NUM_LOGICAL_OUTPUTS],
        block_len: usize,
        attack_s: f64,
        decay_s: f64,
    ) {
        let period = 1.0 / self.f_m;
        let dt = 1.0 / self.sample_rate;

        // Phase offsets expressed as sample shifts, per §4.E. Only the
        // position within the block matters for the circular shift, so
        // reduce mod block_len up front.
        let shifts: [usize; NUM_LOGICAL_OUTPUTS] = std::array::from_fn(|k| {
            let shift = (k as f64) * self.phase_deg / 360.0 * period * self.sample_rate;
            (shift.round() as usize) % block_len.max(1)
        });

        // Render exactly one block's worth of the unshifted envelope,
        // advancing the accumulator by exactly block_len samples so it
        // stays continuous across block boundaries (§4.E).
        let mut base = Vec::with_capacity(block_len);
        let mut p = self.cycle_position;
        let mut periods_since_silence = self.periods_since_silence;
        for _ in 0..block_len {
            let active = periods_since_silence < self.burst_len;
            let env = if active {
                if p < attack_s {
                    p / attack_s
                } else {
                    (-(p - attack_s) / (decay_s / 5.0)).exp()
                }
            } else {
                0.0
            };
            base.push(env);

            p += dt;
            if p >= period {
                p -= period;
                periods_since_silence = if periods_since_silence >= self.burst_len {
                    0
                } else {
                    periods_since_silence + 1
                };
            }
        }
        self.cycle_position = p;
        self.periods_since_silence = periods_since_silence;

        // Circular shift within the rendered block, matching `np.roll`:
        // out[n] = base[(n - shift) mod block_len].
        for (k, shift) in shifts.into_iter().enumerate() {
            for n in 0..block_len {
                let src = (n + block_len - shift) % block_len;
                out[k][n] = base[src];
            }
        }
    }

    fn generate_heartbeat(&mut self, out: &mut [Vec<f64>; NUM_LOGICAL_OUTPUTS], block_len: usize) {
        let bpm = (self.f_m * 60.0).round();
        let cycle = 60.0 / bpm;
        let dt = 1.0 / self.sample_rate;

        let shifts: [usize; NUM_LOGICAL_OUTPUTS] = std::array::from_fn(|k| {
            let shift = (k as f64) * self.phase_deg / 360.0 * cycle * self.sample_rate;
            (shift.round() as usize) % block_len.max(1)
        });

        let mut base = Vec::with_capacity(block_len);
        let mut p = self.cycle_position;
        for _ in 0..block_len {
            let env = if p < 0.08 {
                (-p / 0.03).exp()
            } else if p >= 0.25 * cycle && p < 0.25 * cycle + 0.06 {
                0.6 * (-(p - 0.25 * cycle) / 0.02).exp()
            } else {
                0.0
            };
            base.push(env);
            p += dt;
            if p >= cycle {
                p -= cycle;
            }
        }
        self.cycle_position = p;

        for (k, shift) in shifts.into_iter().enumerate() {
            for n in 0..block_len {
                let src = (n + block_len - shift) % block_len;
                out[k][n] = base[src];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(len: usize) -> [Vec<f64>; NUM_LOGICAL_OUTPUTS] {
        std::array::from_fn(|_| vec![0.0; len])
    }

    #[test]
    fn sine_envelope_bounded_zero_one() {
        let mut gen = EnvelopeGenerator::new(SampleRate::Hz48000, 0, 2.0, 90.0);
        let mut out = blocks(4800);
        gen.generate_block(&mut out);
        for ch in &out {
            for &v in ch {
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn sine_phase_offsets_differ_per_output() {
        let mut gen = EnvelopeGenerator::new(SampleRate::Hz48000, 0, 1.0, 90.0);
        let mut out = blocks(100);
        gen.generate_block(&mut out);
        assert_ne!(out[0][10], out[1][10]);
    }

    #[test]
    fn drum_envelope_starts_at_zero_and_decays() {
        let mut gen = EnvelopeGenerator::new(SampleRate::Hz48000, 8, 2.0, 0.0);
        let mut out = blocks(48000);
        gen.generate_block(&mut out);
        assert!((out[0][0] - 0.0).abs() < 1e-9);
        assert!(out[0].iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn drum_accumulator_is_continuous_across_block_boundary_with_phase_offset() {
        // Output 0's shift is always 0, so its samples should be
        // identical whether rendered as one 2400-sample block or as two
        // consecutive 1200-sample blocks, even with phase_deg > 0 driving
        // nonzero shifts on the other outputs.
        let mut whole = EnvelopeGenerator::new(SampleRate::Hz48000, 8, 2.0, 45.0);
        let mut whole_out = blocks(2400);
        whole.generate_block(&mut whole_out);

        let mut split = EnvelopeGenerator::new(SampleRate::Hz48000, 8, 2.0, 45.0);
        let mut first = blocks(1200);
        split.generate_block(&mut first);
        let mut second = blocks(1200);
        split.generate_block(&mut second);

        for n in 0..1200 {
            assert!((whole_out[0][n] - first[0][n]).abs() < 1e-9);
            assert!((whole_out[0][1200 + n] - second[0][n]).abs() < 1e-9);
        }
    }

    #[test]
    fn heartbeat_has_two_distinct_beats_per_cycle() {
        let mut gen = EnvelopeGenerator::new(SampleRate::Hz48000, 10, 1.2, 0.0);
        let mut out = blocks(48000);
        gen.generate_block(&mut out);
        let peak_ta = out[0][..500].iter().cloned().fold(0.0, f64::max);
        assert!(peak_ta > 0.9);
    }
}
