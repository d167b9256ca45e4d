//! Engine configuration: loaded once at supervisor startup and
//! defaulted field-by-field when the file or a key is absent.

use std::path::{Path, PathBuf};

use rf_core::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

fn default_output_device_substring() -> String {
    "ICUSBAUDIO7D".to_string()
}

fn default_block_size() -> usize {
    1200
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_mix_path() -> PathBuf {
    PathBuf::from("mix.json")
}

fn default_mono_path() -> PathBuf {
    PathBuf::from("mono.json")
}

/// Per-routing-table override: one speaker set per logical output
/// (same shape as one row of `MODE_ROUTING`), validated against the
/// same coverage property the fixed table satisfies (every physical
/// channel reachable by exactly one logical output). When present this
/// replaces the mode-selected table for every mode.
pub type RoutingTableOverride = [Vec<u8>; 4];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_output_device_substring")]
    pub output_device_substring: String,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub routing_table_override: Option<RoutingTableOverride>,
    #[serde(default = "default_mix_path")]
    pub persisted_mix_path: PathBuf,
    #[serde(default = "default_mono_path")]
    pub persisted_mono_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_device_substring: default_output_device_substring(),
            block_size: default_block_size(),
            sample_rate: default_sample_rate(),
            routing_table_override: None,
            persisted_mix_path: default_mix_path(),
            persisted_mono_path: default_mono_path(),
        }
    }
}

impl EngineConfig {
    /// Load from `path`, falling back to defaults entirely if the file
    /// is missing (per §4.M: "every field defaulted if the file or a
    /// field is absent"). A present-but-malformed file is an error.
    pub fn load(path: &Path) -> EngineResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config: Self = serde_json::from_str(&contents)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    fn validate(&self) -> EngineResult<()> {
        if let Some(table) = &self.routing_table_override {
            let mut covered = std::collections::HashSet::new();
            for speakers in table.iter() {
                if speakers.is_empty() {
                    return Err(EngineError::Config(
                        "routing_table_override: an output has no speakers".into(),
                    ));
                }
                for &s in speakers {
                    if s as usize >= 8 {
                        return Err(EngineError::Config(format!(
                            "routing_table_override: speaker index {s} out of range"
                        )));
                    }
                    covered.insert(s);
                }
            }
            if covered.len() != 8 {
                return Err(EngineError::Config(
                    "routing_table_override: not every physical channel is reachable".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Mirrors `{"bt_gain": f}` at `path` (§6 "Persisted state").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PersistedMix {
    bt_gain: f64,
}

/// Mirrors `{"mono": bool}` at `path`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PersistedMono {
    mono: bool,
}

/// Read the last-persisted `music_mix` slider value (0..100), if any.
pub fn load_persisted_mix(path: &Path) -> Option<f64> {
    let contents = std::fs::read_to_string(path).ok()?;
    let parsed: PersistedMix = serde_json::from_str(&contents).ok()?;
    Some(parsed.bt_gain * 100.0)
}

/// Persist the `music_mix` slider (0..100) as a normalised `bt_gain`.
pub fn save_persisted_mix(path: &Path, mix_value: f64) -> EngineResult<()> {
    let payload = PersistedMix {
        bt_gain: (mix_value / 100.0).clamp(0.0, 1.0),
    };
    let json = serde_json::to_string(&payload)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_persisted_mono(path: &Path) -> Option<bool> {
    let contents = std::fs::read_to_string(path).ok()?;
    let parsed: PersistedMono = serde_json::from_str(&contents).ok()?;
    Some(parsed.mono)
}

pub fn save_persisted_mono(path: &Path, mono: bool) -> EngineResult<()> {
    let json = serde_json::to_string(&PersistedMono { mono })?;
    std::fs::write(path, json)?;
    Ok(())
}
