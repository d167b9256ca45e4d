//! Router: maps the four logical (zone) outputs to the eight physical
//! speaker channels per a fixed, mode-selected routing table.

/// Fixed zone-to-channel wiring, frozen per the Open Question resolution:
/// `neck:(0,1), back:(2,3), thighs:(4,5), legs:(6,7)`.
pub const CHANNEL_MAP: [(usize, usize); 4] = [(0, 1), (2, 3), (4, 5), (6, 7)];

/// `MODE_ROUTING[mode][k]` is the set of speaker indices logical
/// output `k` is copied to, for `mode` in 0..8. Each table partitions
/// the eight speakers across the four logical outputs: every speaker
/// belongs to exactly one output's set, and every output's set is
/// non-empty (§8 testable property 6).
pub const MODE_ROUTING: [[&[usize]; 4]; 8] = [
    // mode 0.
    [&[0, 1], &[2, 3], &[4, 5], &[6, 7]],
    // mode 1.
    [&[6, 7], &[4, 5], &[2, 3], &[0, 1]],
    // mode 2.
    [&[0, 2], &[4, 6], &[5, 7], &[1, 3]],
    // mode 3.
    [&[0, 2], &[1, 3], &[4, 6], &[5, 7]],
    // mode 4.
    [&[0, 1], &[6, 7], &[2, 3], &[4, 5]],
    // mode 5.
    [&[2, 3], &[4, 5], &[0, 1], &[6, 7]],
    // mode 6.
    [&[0, 3], &[1, 2], &[4, 7], &[5, 6]],
    // mode 7.
    [&[0, 6], &[1, 7], &[3, 5], &[2, 4]],
];

/// Routing table used by modes 8-10 (drum/heartbeat envelope modes),
/// which always use the mode-0 routing regardless of the declared mode.
pub fn routing_for_mode(mode: u8) -> &'static [&'static [usize]; 4] {
    match mode {
        0..=7 => &MODE_ROUTING[mode as usize],
        // unknown modes fall through to mode 0, as do the envelope-only
        // modes 8-10.
        _ => &MODE_ROUTING[0],
    }
}

/// Given four logical-output blocks, sum each into the eight physical
/// speaker channels per the routing table for `mode`. When `override_table`
/// is present it replaces the mode-selected table entirely, for every mode.
pub fn route_into_channels(
    mode: u8,
    override_table: Option<&[Vec<u8>; 4]>,
    logical: &[Vec<f64>; 4],
    channels: &mut [Vec<f64>; 8],
) {
    let block_len = logical[0].len();

    for channel in channels.iter_mut() {
        channel.iter_mut().take(block_len).for_each(|s| *s = 0.0);
    }

    match override_table {
        Some(table) => {
            for (k, speakers) in table.iter().enumerate() {
                for &speaker in speakers.iter() {
                    let speaker = speaker as usize;
                    for n in 0..block_len {
                        channels[speaker][n] += logical[k][n];
                    }
                }
            }
        }
        None => {
            let table = routing_for_mode(mode);
            for (k, speakers) in table.iter().enumerate() {
                for &speaker in speakers.iter() {
                    for n in 0..block_len {
                        channels[speaker][n] += logical[k][n];
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_mode_partitions_speakers_with_every_output_used() {
        for mode in 0..8u8 {
            let table = routing_for_mode(mode);
            let mut covered: HashSet<usize> = HashSet::new();
            let mut total = 0;
            for speakers in table.iter() {
                assert!(!speakers.is_empty(), "output has no speakers in mode {mode}");
                total += speakers.len();
                covered.extend(speakers.iter().copied());
            }
            assert_eq!(covered, (0..8).collect::<HashSet<_>>(), "mode {mode} misses a speaker");
            assert_eq!(total, 8, "mode {mode} assigns a speaker to more than one output");
        }
    }

    #[test]
    fn unknown_mode_falls_through_to_mode_zero() {
        assert_eq!(routing_for_mode(42), routing_for_mode(0));
        assert_eq!(routing_for_mode(8), routing_for_mode(0));
    }

    #[test]
    fn route_into_channels_assigns_each_speaker_its_single_output() {
        let logical: [Vec<f64>; 4] = std::array::from_fn(|k| vec![(k + 1) as f64; 4]);
        let mut channels: [Vec<f64>; 8] = std::array::from_fn(|_| vec![0.0; 4]);
        route_into_channels(2, None, &logical, &mut channels);
        // mode 2: output k -> speakers {2k, 2k+1} after interleaving, each
        // speaker carries exactly its one assigned output's value.
        let table = routing_for_mode(2);
        for (k, speakers) in table.iter().enumerate() {
            for &speaker in speakers.iter() {
                assert!((channels[speaker][0] - (k + 1) as f64).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn override_table_replaces_mode_selection() {
        let override_table: [Vec<u8>; 4] =
            [vec![7], vec![6], vec![5], vec![0, 1, 2, 3, 4]];
        let logical: [Vec<f64>; 4] = std::array::from_fn(|k| vec![(k + 1) as f64; 2]);
        let mut channels: [Vec<f64>; 8] = std::array::from_fn(|_| vec![0.0; 2]);
        // mode is ignored whenever an override is supplied.
        route_into_channels(0, Some(&override_table), &logical, &mut channels);
        assert!((channels[7][0] - 1.0).abs() < 1e-9);
        assert!((channels[6][0] - 2.0).abs() < 1e-9);
        assert!((channels[5][0] - 3.0).abs() < 1e-9);
        for speaker in 0..5 {
            assert!((channels[speaker][0] - 4.0).abs() < 1e-9);
        }
    }
}
