//! Mixer: equal-power cross-fade of therapy vs auxiliary paths, clip
//! limiter, int16 conversion.

use std::f64::consts::PI;

/// Equal-power gain pair derived from a `music_mix` slider in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixGains {
    pub therapy: f64,
    pub music: f64,
}

impl MixGains {
    pub fn from_mix_slider(x: f64) -> Self {
        let x = x.clamp(0.0, 100.0);
        let theta = (PI / 2.0) * (x / 100.0);
        Self {
            music: theta.cos(),
            therapy: theta.sin(),
        }
    }
}

/// Mixes an 8-channel therapy block with an 8-channel auxiliary block
/// into interleaved int16 PCM.
pub fn mix_to_interleaved_i16(
    gains: MixGains,
    therapy: &[Vec<f64>; 8],
    aux: &[Vec<f64>; 8],
    out: &mut Vec<i16>,
) {
    let block_len = therapy[0].len();
    out.clear();
    out.reserve(block_len * 8);

    for n in 0..block_len {
        for ch in 0..8 {
            let mixed = therapy[ch][n] * gains.therapy + aux[ch][n] * gains.music;
            let clamped = mixed.clamp(-1.0, 1.0);
            out.push((clamped * 32767.0).round() as i16);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn equal_power_identity_holds_across_range() {
        let mut x = 0.0;
        while x <= 100.0 {
            let g = MixGains::from_mix_slider(x);
            assert_relative_eq!(g.music * g.music + g.therapy * g.therapy, 1.0, epsilon = 1e-6);
            x += 1.0;
        }
    }

    #[test]
    fn mix_zero_is_music_only() {
        let g = MixGains::from_mix_slider(0.0);
        assert_relative_eq!(g.therapy, 0.0, epsilon = 1e-9);
        assert_relative_eq!(g.music, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn mix_hundred_is_therapy_only() {
        let g = MixGains::from_mix_slider(100.0);
        assert_relative_eq!(g.therapy, 1.0, epsilon = 1e-9);
        assert_relative_eq!(g.music, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn mix_fifty_matches_cos_pi_over_four() {
        let g = MixGains::from_mix_slider(50.0);
        let expected = (PI / 4.0).cos();
        assert_relative_eq!(g.music, expected, epsilon = 1e-9);
        assert_relative_eq!(g.therapy, expected, epsilon = 1e-9);
    }

    #[test]
    fn clipping_is_respected() {
        let gains = MixGains { therapy: 1.0, music: 1.0 };
        let therapy: [Vec<f64>; 8] = std::array::from_fn(|_| vec![1.0]);
        let aux: [Vec<f64>; 8] = std::array::from_fn(|_| vec![1.0]);
        let mut out = Vec::new();
        mix_to_interleaved_i16(gains, &therapy, &aux, &mut out);
        assert_eq!(out[0], 32767);
    }

    #[test]
    fn never_silent_when_therapy_idle() {
        let gains = MixGains::from_mix_slider(50.0);
        let therapy: [Vec<f64>; 8] = std::array::from_fn(|_| vec![0.0; 4]);
        let aux: [Vec<f64>; 8] = std::array::from_fn(|_| vec![0.5; 4]);
        let mut out = Vec::new();
        mix_to_interleaved_i16(gains, &therapy, &aux, &mut out);
        assert!(out.iter().any(|&s| s != 0));
    }
}
