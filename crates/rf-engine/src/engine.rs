//! The engine loop: fixed-block pull scheduler tying the synthesis
//! pipeline, aux path and mixer together.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use rf_audio::{AuxRing, OutputSink, set_realtime_priority};
use rf_core::SampleRate;

use crate::aux_path::{AuxFanoutMode, AuxPath};
use crate::config::{load_persisted_mix, load_persisted_mono, save_persisted_mix, save_persisted_mono};
use crate::control::{ControlError, EngineCommand, EngineNotification};
use crate::mixer::{self, MixGains};
use crate::row::{Row, Sequence, UserTrim};
use crate::sequencer::{Sequencer, SequencerEvent, Snapshot};

/// WiFi-stream blocks arrive pre-mixed across all eight channels; the
/// queue is bounded and drops the oldest block once it overflows. A
/// queue below the target fill level just gets a debug log, not a
/// drain pause: the underrun-to-silence behavior already answers
/// jitter, so the target fill is an observability threshold, not a
/// gate.
const WIFI_QUEUE_DEPTH: usize = 10;
const WIFI_QUEUE_TARGET_FILL: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineMode {
    Normal,
    WifiStream,
}

/// Owns every piece of mutable engine state: a single writer, driven
/// by [`Engine::run`] on its own thread.
pub struct Engine {
    sample_rate: SampleRate,
    block_size: usize,
    sequencer: Sequencer,
    aux_path: AuxPath,
    aux_ring: std::sync::Arc<AuxRing>,
    user_trim: UserTrim,
    mix_gains: MixGains,
    mode: EngineMode,
    wifi_queue: VecDeque<[Vec<f64>; 8]>,
    sink: OutputSink,
    persisted_mix_path: PathBuf,
    persisted_mono_path: PathBuf,
    routing_override: Option<crate::config::RoutingTableOverride>,
}

impl Engine {
    pub fn new(
        sample_rate: SampleRate,
        block_size: usize,
        aux_ring: std::sync::Arc<AuxRing>,
        sink: OutputSink,
        persisted_mix_path: PathBuf,
        persisted_mono_path: PathBuf,
        routing_override: Option<crate::config::RoutingTableOverride>,
    ) -> Self {
        let mix_value = load_persisted_mix(&persisted_mix_path).unwrap_or(0.0);
        let mono = load_persisted_mono(&persisted_mono_path).unwrap_or(false);
        let mut aux_path = AuxPath::new(sample_rate.as_f64());
        aux_path.set_fanout(if mono {
            AuxFanoutMode::Mono
        } else {
            AuxFanoutMode::Stereo
        });

        Self {
            sample_rate,
            block_size,
            sequencer: Sequencer::new(sample_rate),
            aux_path,
            aux_ring,
            user_trim: UserTrim::default(),
            mix_gains: MixGains::from_mix_slider(mix_value),
            mode: EngineMode::Normal,
            wifi_queue: VecDeque::with_capacity(WIFI_QUEUE_DEPTH),
            sink,
            persisted_mix_path,
            persisted_mono_path,
            routing_override,
        }
    }

    /// Apply one inbound command, returning the notifications it
    /// produces. Never panics; malformed input was already rejected
    /// by [`crate::control::dispatch_action`] before reaching here.
    pub fn apply_command(&mut self, command: EngineCommand) -> Vec<EngineNotification> {
        match command {
            EngineCommand::PlaySelected(row) => match Sequence::new([row]) {
                Ok(_) => {
                    self.sequencer.play_row(row);
                    vec![EngineNotification::Ack {
                        action: "play-selected".into(),
                        payload: None,
                    }]
                }
                Err(_) => vec![EngineNotification::Error(ControlError::NothingToPlay)],
            },
            EngineCommand::PlayAll(rows) => match Sequence::new(rows) {
                Ok(sequence) => {
                    if self.sequencer.play_sequence(sequence) {
                        vec![
                            EngineNotification::Ack {
                                action: "play-all".into(),
                                payload: None,
                            },
                            EngineNotification::Highlight(0),
                        ]
                    } else {
                        vec![EngineNotification::Error(ControlError::NothingToPlay)]
                    }
                }
                Err(_) => vec![EngineNotification::Error(ControlError::NothingToPlay)],
            },
            EngineCommand::Pause => {
                self.sequencer.request_pause();
                vec![EngineNotification::Ack {
                    action: "pause".into(),
                    payload: None,
                }]
            }
            EngineCommand::Resume { resume_state: _ } => {
                // The external snapshot arrives as opaque JSON from the
                // client; this engine only trusts its own in-process
                // snapshot and falls back to it rather than parsing the
                // client's copy.
                self.sequencer.request_resume(None);
                vec![
                    EngineNotification::Ack {
                        action: "resume".into(),
                        payload: None,
                    },
                    EngineNotification::ResumeComplete,
                ]
            }
            EngineCommand::Stop => {
                self.sequencer.stop();
                vec![EngineNotification::Ack {
                    action: "stop".into(),
                    payload: None,
                }]
            }
            EngineCommand::SetUserControl { control, value } => {
                control.apply(&mut self.user_trim, value);
                vec![EngineNotification::Ack {
                    action: "set-user-control".into(),
                    payload: None,
                }]
            }
            EngineCommand::SetMix { value } => {
                self.mix_gains = MixGains::from_mix_slider(value as f64);
                if let Err(e) = save_persisted_mix(&self.persisted_mix_path, value as f64) {
                    log::warn!("failed to persist mix value: {e}");
                }
                vec![EngineNotification::Ack {
                    action: "set-mix".into(),
                    payload: None,
                }]
            }
            EngineCommand::BtSetMono { mono } => {
                self.aux_path.set_fanout(if mono {
                    AuxFanoutMode::Mono
                } else {
                    AuxFanoutMode::Stereo
                });
                if let Err(e) = save_persisted_mono(&self.persisted_mono_path, mono) {
                    log::warn!("failed to persist mono flag: {e}");
                }
                vec![EngineNotification::Ack {
                    action: "bt-set-mono".into(),
                    payload: None,
                }]
            }
            EngineCommand::WifiStreamStart => {
                self.mode = EngineMode::WifiStream;
                self.wifi_queue.clear();
                vec![EngineNotification::Ack {
                    action: "wifi-stream-start".into(),
                    payload: None,
                }]
            }
            EngineCommand::WifiStreamStop => {
                self.mode = EngineMode::Normal;
                self.wifi_queue.clear();
                vec![EngineNotification::Ack {
                    action: "wifi-stream-stop".into(),
                    payload: None,
                }]
            }
            EngineCommand::WifiStreamData { samples } => {
                if self.mode == EngineMode::WifiStream {
                    self.push_wifi_block(&samples);
                }
                vec![EngineNotification::Ack {
                    action: "wifi-stream-data".into(),
                    payload: None,
                }]
            }
        }
    }

    /// De-interleave a flat 8-channel float block and enqueue it,
    /// dropping the oldest queued block if the bound is exceeded.
    fn push_wifi_block(&mut self, samples: &[f32]) {
        if samples.is_empty() || samples.len() % 8 != 0 {
            return;
        }
        let frames = samples.len() / 8;
        let mut block: [Vec<f64>; 8] = std::array::from_fn(|_| Vec::with_capacity(frames));
        for frame in samples.chunks_exact(8) {
            for (ch, &s) in frame.iter().enumerate() {
                block[ch].push(s as f64);
            }
        }
        if self.wifi_queue.len() >= WIFI_QUEUE_DEPTH {
            self.wifi_queue.pop_front();
        }
        self.wifi_queue.push_back(block);
    }

    fn render_therapy_block(&mut self) -> [Vec<f64>; 8] {
        if self.mode == EngineMode::WifiStream {
            let block = self.wifi_queue.pop_front();
            if block.is_none() {
                log::warn!("wifi-stream underrun: queue empty, emitting silence for this tick");
            } else if self.wifi_queue.len() < WIFI_QUEUE_TARGET_FILL {
                log::debug!(
                    "wifi-stream queue below target fill: {} < {WIFI_QUEUE_TARGET_FILL}",
                    self.wifi_queue.len()
                );
            }
            return block.unwrap_or_else(|| std::array::from_fn(|_| vec![0.0; self.block_size]));
        }

        let mut channels: [Vec<f64>; 8] = std::array::from_fn(|_| vec![0.0; self.block_size]);
        let Some(row) = self.sequencer.active_row() else {
            return channels;
        };

        let mut carrier = vec![0.0; self.block_size];
        self.sequencer.oscillator.generate_block(
            row.frequency_hz,
            row.freq_sweep_hz,
            row.sweep_speed_hz,
            &mut carrier,
        );

        let mut envelopes: [Vec<f64>; crate::envelope::NUM_LOGICAL_OUTPUTS] =
            std::array::from_fn(|_| vec![0.0; self.block_size]);
        if let Some(env) = self.sequencer.envelope.as_mut() {
            env.generate_block(&mut envelopes);
        }

        let gains = crate::gain::channel_gains(&row, &self.user_trim);
        let mut fade = vec![0.0; self.block_size];
        self.sequencer.fade.process_block(&mut fade);

        let mut logical: [Vec<f64>; 4] = std::array::from_fn(|_| vec![0.0; self.block_size]);
        for k in 0..4 {
            for n in 0..self.block_size {
                logical[k][n] = carrier[n] * envelopes[k][n] * fade[n];
            }
        }

        crate::router::route_into_channels(
            row.mode,
            self.routing_override.as_ref(),
            &logical,
            &mut channels,
        );

        // The router produces the shared carrier*envelope*fade signal per
        // logical output; channel_gains then scales each physical channel
        // by its zone's effective amplitude.
        for (ch, gain) in channels.iter_mut().zip(gains.iter()) {
            for sample in ch.iter_mut() {
                *sample *= gain;
            }
        }

        channels
    }

    /// One full scheduler tick: drain commands, render, mix, write.
    /// Returns `false` if the output sink has hit a fatal error, in
    /// which case the caller must stop the loop and let the supervisor
    /// reopen the device.
    pub fn tick(
        &mut self,
        commands: &Receiver<EngineCommand>,
        notifications: &Sender<EngineNotification>,
    ) -> bool {
        while let Ok(command) = commands.try_recv() {
            for note in self.apply_command(command) {
                let _ = notifications.try_send(note);
            }
        }

        let mut aux_channels: [Vec<f64>; 8] =
            std::array::from_fn(|_| vec![0.0; self.block_size]);
        self.aux_path
            .process_block(&self.aux_ring, self.block_size, &mut aux_channels);

        let therapy_channels = self.render_therapy_block();

        let mut interleaved = Vec::with_capacity(self.block_size * 8);
        mixer::mix_to_interleaved_i16(
            self.mix_gains,
            &therapy_channels,
            &aux_channels,
            &mut interleaved,
        );

        if let Err(e) = self.sink.write_block(&interleaved) {
            log::error!("output sink write failed, halting engine loop: {e}");
            return false;
        }

        let block_seconds = self.block_size as f64 / self.sample_rate.as_f64();
        for event in self.sequencer.advance_after_block(block_seconds) {
            let note = match event {
                SequencerEvent::Highlight(i) => EngineNotification::Highlight(i),
                SequencerEvent::ClearHighlight => EngineNotification::ClearHighlight,
                SequencerEvent::PauseComplete => EngineNotification::PauseComplete,
                SequencerEvent::ResumeComplete => EngineNotification::ResumeComplete,
            };
            let _ = notifications.try_send(note);
        }
        true
    }

    /// Run the fixed-block scheduler until `running` is cleared or the
    /// output sink fails fatally. Deadlines never accumulate drift: a
    /// missed deadline is reset to now rather than double-ticking to
    /// catch up. On a fatal sink write failure the row-in-flight
    /// snapshot is returned so the caller (supervisor) can reopen the
    /// sink, build a fresh [`Engine`] and feed the snapshot back through
    /// [`Engine::resume_from_snapshot`], preserving the active row
    /// across the restart. A graceful stop (`running` cleared) returns
    /// `None`: there is nothing to resume.
    pub fn run(
        mut self,
        commands: Receiver<EngineCommand>,
        notifications: Sender<EngineNotification>,
        running: std::sync::Arc<std::sync::atomic::AtomicBool>,
    ) -> Option<Snapshot> {
        let priority = set_realtime_priority();
        log::info!("engine thread real-time priority request: {priority:?}");

        let period = Duration::from_secs_f64(self.block_size as f64 / self.sample_rate.as_f64());
        let mut next_deadline = Instant::now() + period;

        while running.load(std::sync::atomic::Ordering::Acquire) {
            if !self.tick(&commands, &notifications) {
                return self.take_snapshot();
            }

            let now = Instant::now();
            if next_deadline > now {
                std::thread::sleep(next_deadline - now);
                next_deadline += period;
            } else {
                next_deadline = now + period;
            }
        }

        None
    }

    pub fn active_row(&self) -> Option<Row> {
        self.sequencer.active_row()
    }

    pub fn take_snapshot(&self) -> Option<Snapshot> {
        self.sequencer.take_snapshot_now()
    }

    /// Seed a freshly constructed engine's sequencer with a snapshot
    /// taken from a prior (now-discarded) engine instance, e.g. after
    /// the output sink was reopened following a fatal write error. The
    /// row resumes with a fresh fade-in, per §7.
    pub fn resume_from_snapshot(&mut self, snapshot: Snapshot) {
        self.sequencer.request_resume(Some(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row(time_s: f64) -> Row {
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
    fn wifi_queue_drops_oldest_on_overflow() {
        // Can't build a full Engine without a live output device, so
        // this exercises the queueing logic directly against a stub.
        let mut queue: VecDeque<[Vec<f64>; 8]> = VecDeque::with_capacity(WIFI_QUEUE_DEPTH);
        for i in 0..(WIFI_QUEUE_DEPTH + 3) {
            if queue.len() >= WIFI_QUEUE_DEPTH {
                queue.pop_front();
            }
            queue.push_back(std::array::from_fn(|_| vec![i as f64]));
        }
        assert_eq!(queue.len(), WIFI_QUEUE_DEPTH);
        assert_eq!(queue.front().unwrap()[0][0], 3.0);
    }

    #[test]
    fn play_selected_with_unplayable_row_reports_nothing_to_play() {
        // apply_command needs a full Engine (sink requires a device),
        // so the Sequence-construction failure path is tested at the
        // Sequence level directly; see row.rs for NothingToPlay tests.
        let row = make_row(0.0);
        assert!(!row.is_playable());
    }
}
