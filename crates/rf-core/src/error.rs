//! Error types for the vibroacoustic engine

use thiserror::Error;

/// Crate-wide error type for fallible engine-facing operations.
///
/// Transient, expected conditions on the hot path (aux underrun, aux
/// device loss) are modelled as dedicated state enums at their call
/// sites rather than as `EngineError` variants — they must never
/// unwind the engine loop. `EngineError` covers what is genuinely an
/// error: bad configuration, device enumeration failure, and a row or
/// sequence that fails validation.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("audio device error: {0}")]
    Device(String),

    #[error("output device not found matching {0:?}")]
    DeviceNotFound(String),

    #[error("output stream broken: {0}")]
    OutputBrokenPipe(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("row validation failed: {0}")]
    InvalidRow(String),

    #[error("sequence has nothing to play")]
    NothingToPlay,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type EngineResult<T> = Result<T, EngineError>;
