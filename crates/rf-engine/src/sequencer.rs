//! Sequencer/pause-resume state machine (§4.I).

use rf_core::SampleRate;

use crate::envelope::EnvelopeGenerator;
use crate::fade::{FadeController, FadeDirection};
use crate::row::{Row, Sequence};
use crate::synth::CarrierOscillator;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayMode {
    Idle,
    Single,
    Sequence { index: usize },
}

/// Enough state to resume a paused row without a phase discontinuity.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub row: Row,
    pub elapsed_s: f64,
    pub carrier_phase: f64,
    pub mod_sine_phase: f64,
    pub mod_cycle_position: f64,
    pub sequence: Option<Sequence>,
    pub sequence_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum MachineState {
    Idle,
    Playing(PlayMode),
    Paused,
}

/// Owns the active row, oscillator/envelope phase, and the pause
/// snapshot. The engine loop is the sole writer.
pub struct Sequencer {
    sample_rate: SampleRate,
    state: MachineState,
    active_row: Option<Row>,
    sequence: Option<Sequence>,
    sequence_index: usize,
    pub oscillator: CarrierOscillator,
    pub envelope: Option<EnvelopeGenerator>,
    pub fade: FadeController,
    pause_requested: bool,
    snapshot: Option<Snapshot>,
}

impl Sequencer {
    pub fn new(sample_rate: SampleRate) -> Self {
        Self {
            sample_rate,
            state: MachineState::Idle,
            active_row: None,
            sequence: None,
            sequence_index: 0,
            oscillator: CarrierOscillator::new(sample_rate),
            envelope: None,
            fade: FadeController::new(sample_rate),
            pause_requested: false,
            snapshot: None,
        }
    }

    pub fn active_row(&self) -> Option<Row> {
        self.active_row
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, MachineState::Idle)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, MachineState::Paused)
    }

    fn start_row(&mut self, row: Row, mode: PlayMode) {
        self.active_row = Some(row);
        self.oscillator.reset();
        self.envelope = Some(EnvelopeGenerator::new(
            self.sample_rate,
            row.mode,
            row.modulator_frequency_hz(),
            row.phase_deg,
        ));
        self.fade.start_fade_in();
        self.state = MachineState::Playing(mode);
        self.pause_requested = false;
    }

    pub fn play_row(&mut self, row: Row) {
        self.sequence = None;
        self.sequence_index = 0;
        self.start_row(row, PlayMode::Single);
    }

    /// Returns `true` if a sequence was actually started.
    pub fn play_sequence(&mut self, sequence: Sequence) -> bool {
        if sequence.is_empty() {
            return false;
        }
        let first = sequence.get(0).unwrap();
        self.sequence = Some(sequence);
        self.sequence_index = 0;
        self.start_row(first, PlayMode::Sequence { index: 0 });
        true
    }

    pub fn request_pause(&mut self) {
        if let MachineState::Playing(_) = self.state {
            self.pause_requested = true;
            self.fade.start_fade_out();
        }
        // pause without an active row is a no-op, per §7.
    }

    pub fn request_resume(&mut self, external_snapshot: Option<Snapshot>) {
        let snapshot = external_snapshot.or_else(|| self.snapshot.take());
        let Some(snapshot) = snapshot else {
            return; // no-op per §7: resume without snapshot.
        };

        self.active_row = Some(snapshot.row);
        self.oscillator.restore(snapshot.carrier_phase, snapshot.elapsed_s);
        self.envelope = Some(EnvelopeGenerator::new(
            self.sample_rate,
            snapshot.row.mode,
            snapshot.row.modulator_frequency_hz(),
            snapshot.row.phase_deg,
        ));
        if let Some(env) = self.envelope.as_mut() {
            env.restore(snapshot.mod_sine_phase, snapshot.mod_cycle_position);
        }
        self.fade.start_fade_in();
        self.sequence = snapshot.sequence;
        self.sequence_index = snapshot.sequence_index;

        let mode = if self.sequence.is_some() {
            PlayMode::Sequence { index: self.sequence_index }
        } else {
            PlayMode::Single
        };
        self.state = MachineState::Playing(mode);
        self.pause_requested = false;
    }

    pub fn stop(&mut self) {
        self.active_row = None;
        self.sequence = None;
        self.sequence_index = 0;
        self.state = MachineState::Idle;
        self.pause_requested = false;
        self.snapshot = None;
    }

    /// Events an engine-loop tick must surface to the control plane.
    pub fn take_snapshot_now(&self) -> Option<Snapshot> {
        let row = self.active_row?;
        Some(Snapshot {
            row,
            elapsed_s: self.oscillator.elapsed(),
            carrier_phase: self.oscillator.phase(),
            mod_sine_phase: self.envelope.as_ref().map(|e| e.sine_phase()).unwrap_or(0.0),
            mod_cycle_position: self.envelope.as_ref().map(|e| e.cycle_position()).unwrap_or(0.0),
            sequence: self.sequence.clone(),
            sequence_index: self.sequence_index,
        })
    }

    /// Advance the row-lifetime state machine after one block has been
    /// rendered. Returns notable events for the control plane.
    pub fn advance_after_block(&mut self, block_seconds: f64) -> Vec<SequencerEvent> {
        let mut events = Vec::new();

        // pause latch: only while a fade-out we requested is converging.
        if self.pause_requested && self.fade.pause_latch_reached() {
            self.snapshot = self.take_snapshot_now();
            self.state = MachineState::Paused;
            self.active_row = None;
            self.pause_requested = false;
            events.push(SequencerEvent::PauseComplete);
            return events;
        }

        let Some(row) = self.active_row else {
            return events;
        };
        if self.pause_requested {
            return events; // still fading out toward the pause latch.
        }

        let elapsed = self.oscillator.elapsed();

        // Auto-trigger the fade-out window.
        if row.time_s > crate::fade::FADE_SECONDS
            && elapsed >= row.time_s - crate::fade::FADE_SECONDS
            && self.fade.direction() != FadeDirection::Out
        {
            self.fade.start_fade_out();
        }

        if elapsed >= row.time_s {
            match &self.state {
                MachineState::Playing(PlayMode::Single) => {
                    self.stop();
                }
                MachineState::Playing(PlayMode::Sequence { index }) => {
                    let index = *index;
                    let sequence = self.sequence.clone();
                    if let Some(seq) = sequence {
                        if index + 1 < seq.len() {
                            let next_row = seq.get(index + 1).unwrap();
                            self.sequence_index = index + 1;
                            self.start_row(next_row, PlayMode::Sequence { index: index + 1 });
                            events.push(SequencerEvent::Highlight(index + 1));
                        } else {
                            self.stop();
                            events.push(SequencerEvent::ClearHighlight);
                        }
                    } else {
                        self.stop();
                    }
                }
                _ => {}
            }
        }

        let _ = block_seconds;
        events
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SequencerEvent {
    Highlight(usize),
    ClearHighlight,
    PauseComplete,
    ResumeComplete,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(time_s: f64) -> Row {
        Row {
            time_s,
            frequency_hz: 40.0,
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
    fn idle_play_row_transitions_to_playing() {
        let mut seq = Sequencer::new(SampleRate::Hz48000);
        assert!(seq.is_idle());
        seq.play_row(row(8.0));
        assert!(!seq.is_idle());
        assert_eq!(seq.fade.direction(), FadeDirection::In);
    }

    #[test]
    fn pause_without_active_row_is_noop() {
        let mut seq = Sequencer::new(SampleRate::Hz48000);
        seq.request_pause();
        assert!(seq.is_idle());
    }

    #[test]
    fn resume_without_snapshot_is_noop() {
        let mut seq = Sequencer::new(SampleRate::Hz48000);
        seq.request_resume(None);
        assert!(seq.is_idle());
    }

    #[test]
    fn stop_clears_active_row() {
        let mut seq = Sequencer::new(SampleRate::Hz48000);
        seq.play_row(row(8.0));
        seq.stop();
        assert!(seq.is_idle());
        assert!(seq.active_row().is_none());
    }
}
