//! Error types for configuration and model loading.
//!
//! Neither type is ever produced on the audio thread. Configuration is
//! checked before it reaches the pipeline, and model loading happens on the
//! loader's own thread.

use thiserror::Error;

/// Rejected pipeline configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be finite and positive (got {0})")]
    InvalidSampleRate(f32),

    #[error("{field} must be non-zero")]
    ZeroSize { field: &'static str },

    #[error("max_block ({max_block}) must be at least quantum_size ({quantum_size})")]
    MaxBlockTooSmall {
        max_block: usize,
        quantum_size: usize,
    },

    #[error("stage {index}: frequency {hz} Hz must lie in (0, {nyquist}) Hz")]
    FrequencyOutOfRange { index: usize, hz: f32, nyquist: f32 },

    #[error("stage {index}: {param} is invalid ({value})")]
    InvalidParameter {
        index: usize,
        param: &'static str,
        value: f32,
    },

    #[error("too many stages ({count}, limit {max})")]
    TooManyStages { count: usize, max: usize },

    #[error("{field} is fixed for the lifetime of a pipeline and cannot be updated")]
    ImmutableField { field: &'static str },

    #[error("config JSON could not be parsed: {0}")]
    Parse(String),
}

/// Failure while loading a denoise model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("model blob is malformed or truncated")]
    Malformed,

    #[error("model frame size {model} does not match pipeline frame size {pipeline}")]
    FrameSizeMismatch { model: usize, pipeline: usize },

    #[error("a model was already delivered to this bridge")]
    AlreadyLoaded,
}
