//! Control-plane command/notification adapter.
//!
//! `EngineCommand`/`EngineNotification` are the typed boundary between
//! the (out-of-scope) WebSocket transport and the engine loop. The
//! transport itself posts/drains these through a bounded `rtrb`
//! producer/consumer pair, the same split the mixer command queue uses.

use serde::Deserialize;
use thiserror::Error;

use crate::row::{Row, UserTrim};

/// One parsed inbound action, ready for the engine to apply at the
/// next block boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    PlaySelected(Row),
    PlayAll(Vec<Row>),
    Pause,
    Resume { resume_state: Option<serde_json::Value> },
    Stop,
    SetUserControl { control: UserControlField, value: u8 },
    SetMix { value: u8 },
    BtSetMono { mono: bool },
    WifiStreamStart,
    WifiStreamStop,
    WifiStreamData { samples: Vec<f32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserControlField {
    Master,
    Neck,
    Back,
    Thighs,
    Legs,
}

impl UserControlField {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "master" => Some(Self::Master),
            "neck" => Some(Self::Neck),
            "back" => Some(Self::Back),
            "thighs" => Some(Self::Thighs),
            "legs" => Some(Self::Legs),
            _ => None,
        }
    }

    pub fn apply(self, trim: &mut UserTrim, value: u8) {
        let value = Some(value.min(9));
        match self {
            Self::Master => trim.master = value,
            Self::Neck => trim.neck = value,
            Self::Back => trim.back = value,
            Self::Thighs => trim.thighs = value,
            Self::Legs => trim.legs = value,
        }
    }
}

/// Notifications flowing from the engine back to the control dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    Ack { action: String, payload: Option<String> },
    Error(ControlError),
    Highlight(usize),
    ClearHighlight,
    PauseComplete,
    ResumeComplete,
    TreatmentState(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("badjson")]
    BadJson,
    #[error("unknown")]
    UnknownAction,
    #[error("nothing-to-play")]
    NothingToPlay,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action: String,
    #[serde(default)]
    row: Option<RawRow>,
    #[serde(default)]
    rows: Option<Vec<RawRow>>,
    #[serde(default)]
    control: Option<String>,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    mono: Option<bool>,
    #[serde(default)]
    #[serde(rename = "resumeState")]
    resume_state: Option<serde_json::Value>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    time_s: f64,
    frequency_hz: f64,
    #[serde(default)]
    freq_sweep_hz: f64,
    #[serde(default)]
    sweep_speed_hz: f64,
    #[serde(default)]
    phase_deg: f64,
    #[serde(default = "default_mod_speed_step")]
    mod_speed_step: u32,
    #[serde(default)]
    mode: u8,
    #[serde(default)]
    strength: u8,
    #[serde(default)]
    neck: u8,
    #[serde(default)]
    back: u8,
    #[serde(default)]
    thighs: u8,
    #[serde(default)]
    legs: u8,
}

fn default_mod_speed_step() -> u32 {
    1
}

impl From<RawRow> for Row {
    fn from(r: RawRow) -> Self {
        Row {
            time_s: r.time_s,
            frequency_hz: r.frequency_hz,
            freq_sweep_hz: r.freq_sweep_hz,
            sweep_speed_hz: r.sweep_speed_hz,
            phase_deg: r.phase_deg,
            mod_speed_step: r.mod_speed_step,
            mode: r.mode,
            strength: r.strength,
            neck: r.neck,
            back: r.back,
            thighs: r.thighs,
            legs: r.legs,
        }
    }
}

/// Parse one inbound JSON action object into an [`EngineCommand`].
/// Pure and transport-independent: unit-testable against literal JSON.
pub fn dispatch_action(raw_json: &str) -> Result<EngineCommand, ControlError> {
    let raw: RawAction = serde_json::from_str(raw_json).map_err(|_| ControlError::BadJson)?;

    match raw.action.as_str() {
        "play-selected" => {
            let row = raw.row.ok_or(ControlError::BadJson)?;
            Ok(EngineCommand::PlaySelected(row.into()))
        }
        "play-all" => {
            let rows = raw.rows.ok_or(ControlError::BadJson)?;
            Ok(EngineCommand::PlayAll(rows.into_iter().map(Row::from).collect()))
        }
        "pause" => Ok(EngineCommand::Pause),
        "resume" => Ok(EngineCommand::Resume { resume_state: raw.resume_state }),
        "stop" => Ok(EngineCommand::Stop),
        "set-user-control" => {
            let control = raw.control.ok_or(ControlError::BadJson)?;
            let field = UserControlField::parse(&control).ok_or(ControlError::BadJson)?;
            let value = raw
                .value
                .as_ref()
                .and_then(|v| v.as_u64())
                .ok_or(ControlError::BadJson)? as u8;
            Ok(EngineCommand::SetUserControl { control: field, value })
        }
        "set-mix" => {
            let value = raw
                .value
                .as_ref()
                .and_then(|v| v.as_u64())
                .ok_or(ControlError::BadJson)? as u8;
            if value > 100 {
                return Err(ControlError::BadJson);
            }
            Ok(EngineCommand::SetMix { value })
        }
        "bt-set-mono" => {
            let mono = raw.mono.ok_or(ControlError::BadJson)?;
            Ok(EngineCommand::BtSetMono { mono })
        }
        "wifi-stream-start" => Ok(EngineCommand::WifiStreamStart),
        "wifi-stream-stop" => Ok(EngineCommand::WifiStreamStop),
        "wifi-stream-data" => {
            let encoded = raw.data.ok_or(ControlError::BadJson)?;
            let bytes = base64_decode(&encoded).ok_or(ControlError::BadJson)?;
            if bytes.len() % 4 != 0 {
                return Err(ControlError::BadJson);
            }
            let samples = bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            Ok(EngineCommand::WifiStreamData { samples })
        }
        _ => Err(ControlError::UnknownAction),
    }
}

/// Minimal standard-alphabet base64 decoder (no padding tolerance
/// beyond the trailing `=`), since wifi-stream-data is the only
/// base64 payload this adapter handles.
fn base64_decode(input: &str) -> Option<Vec<u8>> {
    fn value(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let trimmed = input.trim_end_matches('=');
    let mut out = Vec::with_capacity(trimmed.len() * 3 / 4 + 3);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for &byte in trimmed.as_bytes() {
        let v = value(byte)?;
        buffer = (buffer << 6) | v as u32;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_has_no_payload() {
        assert_eq!(dispatch_action(r#"{"action":"pause"}"#).unwrap(), EngineCommand::Pause);
    }

    #[test]
    fn set_mix_parses_value() {
        let cmd = dispatch_action(r#"{"action":"set-mix","value":50}"#).unwrap();
        assert_eq!(cmd, EngineCommand::SetMix { value: 50 });
    }

    #[test]
    fn set_mix_rejects_out_of_range() {
        let err = dispatch_action(r#"{"action":"set-mix","value":150}"#).unwrap_err();
        assert_eq!(err, ControlError::BadJson);
    }

    #[test]
    fn unknown_action_is_reported() {
        let err = dispatch_action(r#"{"action":"nonsense"}"#).unwrap_err();
        assert_eq!(err, ControlError::UnknownAction);
    }

    #[test]
    fn malformed_json_is_badjson() {
        let err = dispatch_action("not json").unwrap_err();
        assert_eq!(err, ControlError::BadJson);
    }

    #[test]
    fn wifi_stream_data_decodes_base64_float32() {
        let samples: [f32; 2] = [0.5, -0.25];
        let mut bytes = Vec::new();
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let encoded = base64_encode_for_test(&bytes);
        let json = format!(r#"{{"action":"wifi-stream-data","data":"{encoded}"}}"#);
        match dispatch_action(&json).unwrap() {
            EngineCommand::WifiStreamData { samples: decoded } => {
                assert_eq!(decoded, vec![0.5, -0.25]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn bt_set_mono_parses_bool() {
        let cmd = dispatch_action(r#"{"action":"bt-set-mono","mono":true}"#).unwrap();
        assert_eq!(cmd, EngineCommand::BtSetMono { mono: true });
    }

    fn base64_encode_for_test(data: &[u8]) -> String {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        let mut out = String::new();
        for chunk in data.chunks(3) {
            let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
            let n = ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32;
            out.push(ALPHABET[(n >> 18) as usize & 0x3f] as char);
            out.push(ALPHABET[(n >> 12) as usize & 0x3f] as char);
            out.push(if chunk.len() > 1 { ALPHABET[(n >> 6) as usize & 0x3f] as char } else { '=' });
            out.push(if chunk.len() > 2 { ALPHABET[n as usize & 0x3f] as char } else { '=' });
        }
        out
    }
}
