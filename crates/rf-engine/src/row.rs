//! Row/UserTrim/Sequence data model.

use rf_core::{EngineError, EngineResult};

/// One immutable recipe describing a single stimulation segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row {
    pub time_s: f64,
    pub frequency_hz: f64,
    pub freq_sweep_hz: f64,
    pub sweep_speed_hz: f64,
    pub phase_deg: f64,
    pub mod_speed_step: u32,
    pub mode: u8,
    pub strength: u8,
    pub neck: u8,
    pub back: u8,
    pub thighs: u8,
    pub legs: u8,
}

impl Row {
    /// Validate field ranges per the data model; does not check the
    /// zero-time/zero-frequency drop rule (that's [`Row::is_playable`]).
    pub fn validate(&self) -> EngineResult<()> {
        let in_range = |v: f64, lo: f64, hi: f64| v >= lo && v <= hi;
        if !in_range(self.time_s, 0.0, 3600.0) {
            return Err(EngineError::InvalidRow(format!("time_s {} out of range", self.time_s)));
        }
        if !in_range(self.frequency_hz, 20.0, 200.0) {
            return Err(EngineError::InvalidRow(format!(
                "frequency_hz {} out of range",
                self.frequency_hz
            )));
        }
        if !in_range(self.freq_sweep_hz, 0.0, 100.0) {
            return Err(EngineError::InvalidRow("freq_sweep_hz out of range".into()));
        }
        if !in_range(self.sweep_speed_hz, 0.0, 10.0) {
            return Err(EngineError::InvalidRow("sweep_speed_hz out of range".into()));
        }
        if !in_range(self.phase_deg, 0.0, 359.0) {
            return Err(EngineError::InvalidRow("phase_deg out of range".into()));
        }
        if !(1..=100).contains(&self.mod_speed_step) {
            return Err(EngineError::InvalidRow("mod_speed_step out of range".into()));
        }
        if self.mode > 10 {
            return Err(EngineError::InvalidRow("mode out of range".into()));
        }
        for (name, v) in [
            ("strength", self.strength),
            ("neck", self.neck),
            ("back", self.back),
            ("thighs", self.thighs),
            ("legs", self.legs),
        ] {
            if v > 9 {
                return Err(EngineError::InvalidRow(format!("{name} out of range")));
            }
        }
        Ok(())
    }

    /// Zero-time or zero-frequency rows are dropped at sequence load.
    pub fn is_playable(&self) -> bool {
        self.time_s > 0.0 && self.frequency_hz > 0.0
    }

    /// Logarithmic mapping of `mod_speed_step` into `[0.03, 10]` Hz.
    pub fn modulator_frequency_hz(&self) -> f64 {
        let step = self.mod_speed_step.clamp(1, 100) as f64;
        0.03 * (10.0_f64 / 0.03).powf((step - 1.0) / 99.0)
    }
}

/// User-facing master/zone overrides. `None` means "use the row baseline".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UserTrim {
    pub master: Option<u8>,
    pub neck: Option<u8>,
    pub back: Option<u8>,
    pub thighs: Option<u8>,
    pub legs: Option<u8>,
}

/// Ordered list of Rows, already filtered of unplayable entries.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    rows: Vec<Row>,
}

impl Sequence {
    /// Build a sequence, dropping zero-time/zero-frequency rows. Errors
    /// if the result has nothing left to play.
    pub fn new(rows: impl IntoIterator<Item = Row>) -> EngineResult<Self> {
        let rows: Vec<Row> = rows.into_iter().filter(Row::is_playable).collect();
        if rows.is_empty() {
            return Err(EngineError::NothingToPlay);
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Row> {
        self.rows.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(time_s: f64, frequency_hz: f64) -> Row {
        Row {
            time_s,
            frequency_hz,
            freq_sweep_hz: 0.0,
            sweep_speed_hz: 0.0,
            phase_deg: 0.0,
            mod_speed_step: 1,
            mode: 0,
            strength: 5,
            neck: 5,
            back: 5,
            thighs: 5,
            legs: 5,
        }
    }

    #[test]
    fn zero_time_rows_are_dropped() {
        let seq = Sequence::new(vec![row(0.0, 40.0), row(8.0, 40.0)]).unwrap();
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn all_unplayable_yields_nothing_to_play() {
        let err = Sequence::new(vec![row(0.0, 40.0), row(8.0, 0.0)]).unwrap_err();
        assert!(matches!(err, EngineError::NothingToPlay));
    }

    #[test]
    fn modulator_frequency_endpoints() {
        let mut r = row(8.0, 40.0);
        r.mod_speed_step = 1;
        assert!((r.modulator_frequency_hz() - 0.03).abs() < 1e-9);
        r.mod_speed_step = 100;
        assert!((r.modulator_frequency_hz() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_strength_fails_validation() {
        let mut r = row(8.0, 40.0);
        r.strength = 20;
        assert!(r.validate().is_err());
    }
}
