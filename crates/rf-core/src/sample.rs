//! Sample types shared across the DSP and engine crates.

/// Type alias for audio samples (always f64 for maximum precision)
pub type Sample = f64;
