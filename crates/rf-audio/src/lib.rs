//! rf-audio: Audio I/O using cpal
//!
//! Device enumeration/selection, the real-time thread priority helper,
//! the mutex-protected auxiliary capture ring, and the eight-channel
//! output sink that bridges the engine's blocking write model onto
//! cpal's callback-pull model.

mod aux_ring;
pub mod capture;
mod device;
mod error;
mod output_sink;
mod thread_priority;

pub use aux_ring::*;
pub use capture::{CaptureConfig, CaptureReadOutcome, CaptureSource, spawn_capture_thread};
pub use device::*;
pub use error::*;
pub use output_sink::*;
pub use thread_priority::*;
