//! Gain stage: baseline/user-trim blending and channel amplitude.

use crate::router::CHANNEL_MAP;
use crate::row::{Row, UserTrim};

/// Combine a row baseline with an optional user override, per §4.G.
pub fn apply_dual(baseline: u8, user: Option<u8>) -> u8 {
    let baseline = baseline.min(9) as f64;
    match user {
        None => baseline.round().clamp(0.0, 9.0) as u8,
        Some(u) if u == 5 => baseline.round().clamp(0.0, 9.0) as u8,
        Some(u) => {
            let user = (u.min(9)) as f64;
            let effective = if user < 5.0 {
                baseline * (user / 5.0)
            } else {
                baseline * (1.0 + (user - 5.0) / 5.0)
            };
            effective.round().clamp(0.0, 9.0) as u8
        }
    }
}

/// Amplitude for a channel given an effective master and an effective
/// zone trim, each already the result of [`apply_dual`].
pub fn scaled_amp(master_eff: u8, trim_eff: u8) -> f64 {
    let base = master_eff as f64 * 10.0;
    let trim = trim_eff as f64;
    let amp = if trim == 5.0 {
        base
    } else if trim < 5.0 {
        base - (5.0 - trim) * (base / 5.0)
    } else {
        base + (trim - 5.0) * ((90.0 - base) / 5.0)
    };
    amp / 90.0
}

/// Per-channel gains (8 channels) for a row plus the current user trim.
pub fn channel_gains(row: &Row, trim: &UserTrim) -> [f64; 8] {
    let master_eff = apply_dual(row.strength, trim.master);
    let zones = [
        (row.neck, trim.neck),
        (row.back, trim.back),
        (row.thighs, trim.thighs),
        (row.legs, trim.legs),
    ];

    let mut gains = [0.0; 8];
    for (zone_idx, (baseline, user)) in zones.into_iter().enumerate() {
        let trim_eff = apply_dual(baseline, user);
        let gain = scaled_amp(master_eff, trim_eff);
        let (a, b) = CHANNEL_MAP[zone_idx];
        gains[a] = gain;
        gains[b] = gain;
    }
    gains
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn dual_strength_fixed_point() {
        for m in 0..=9u8 {
            assert_eq!(apply_dual(m, Some(5)), m.min(9));
            assert_eq!(apply_dual(m, None), m.min(9));
        }
    }

    #[test]
    fn scaled_amp_matches_s1_scenario() {
        // strength=5, trim=5 -> base = 50, amp = 50/90
        assert_relative_eq!(scaled_amp(5, 5), 50.0 / 90.0, epsilon = 1e-9);
    }

    #[test]
    fn scaled_amp_monotonic_in_master_for_fixed_trim() {
        let mut prev = -1.0;
        for m in 0..=9u8 {
            let amp = scaled_amp(m, 7);
            assert!(amp >= prev);
            prev = amp;
        }
    }

    #[test]
    fn scaled_amp_monotonic_in_trim_when_master_at_least_five() {
        let mut prev = -1.0;
        for t in 0..=9u8 {
            let amp = scaled_amp(7, t);
            assert!(amp >= prev - 1e-12);
            prev = amp;
        }
    }
}
