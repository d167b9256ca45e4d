//! rf-engine: the real-time vibroacoustic synthesis and playback engine.
//!
//! Wires the row/sequence data model, the carrier/envelope synthesiser,
//! the router and gain stage, the fade-bracketed sequencer state
//! machine, the auxiliary path, and the equal-power mixer into a
//! fixed-block scheduler (§4.K) driven by [`engine::Engine::run`].

// Audio engine uses explicit indexing for SIMD-friendly, cache-linear access.
#![allow(clippy::needless_range_loop)]

pub mod aux_path;
pub mod config;
pub mod control;
pub mod engine;
pub mod envelope;
pub mod fade;
pub mod gain;
pub mod mixer;
pub mod router;
pub mod row;
pub mod sequencer;
pub mod synth;

pub use config::EngineConfig;
pub use control::{ControlError, EngineCommand, EngineNotification, UserControlField};
pub use engine::Engine;
pub use row::{Row, Sequence, UserTrim};
pub use sequencer::{PlayMode, Snapshot};
