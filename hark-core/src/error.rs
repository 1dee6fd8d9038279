//! Typed errors shared across the pipeline.
//!
//! Nothing in here is ever thrown across the producer/analyzer boundary;
//! every failure travels as a value.

use thiserror::Error;

/// Invalid pipeline configuration, reported before any thread is spawned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("window size must be at least 2 samples, got {0}")]
    WindowTooSmall(usize),

    #[error("hop size must be between 1 and the window size ({window}), got {hop}")]
    HopOutOfRange { hop: usize, window: usize },

    #[error("hop size {hop} does not divide the window size {window}")]
    HopNotDivisor { hop: usize, window: usize },

    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("gain must be finite and positive, got {0}")]
    InvalidGain(f32),

    #[error("at least one analyzer worker is required")]
    NoWorkers,

    #[error("top-k peak picking needs k >= 1")]
    ZeroPeakCapacity,

    #[error("result queue needs room for at least one analysis")]
    ZeroResultCapacity,

    #[error("peak threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f64),

    #[error("frequency floor must be finite and non-negative, got {0}")]
    InvalidFrequencyFloor(f64),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Failures starting the threaded pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn analyzer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failures of the frequency to semitone mapping.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum PitchError {
    /// The frequency falls outside the span the harmonic table can represent.
    #[error("frequency {0} Hz is outside the representable harmonic range")]
    OutOfRangeHarmonic(f64),
}
