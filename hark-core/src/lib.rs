// hark-core/src/lib.rs

//! The core logic for the Hark live pitch detector.
//! This crate owns the streaming pipeline: sliding-window capture,
//! the capture to analyzer handoff, the spectral transform, peak picking
//! and semitone naming. It contains no rendering code.

pub mod audio;
pub mod config;
pub mod error;
pub mod fft;
pub mod handoff;
pub mod harmonics;
pub mod peaks;
pub mod pipeline;
pub mod pitch;
pub mod window;

use serde::Serialize;

pub use config::PipelineConfig;
pub use error::{ConfigError, PipelineError, PitchError};
pub use harmonics::HarmonicTable;
pub use pipeline::{CaptureHandle, Pipeline};
pub use pitch::{NoteReading, PitchMapper};
pub use window::CaptureFlow;

/// One reported spectral peak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitchReport {
    /// Bin center frequency in Hz.
    pub frequency: f64,
    /// Squared bin magnitude. Relative only, not a linear amplitude.
    pub intensity: f64,
    /// The nearest note, or `None` when no confident pitch was found.
    pub note: Option<NoteReading>,
}

/// What a single window analysis produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "peaks", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Loudest peak first; exactly one entry in single-peak mode.
    Detected(Vec<PitchReport>),
    /// The spectrum had no usable peak (silence or all below threshold).
    NoPeak,
}

/// Represents the result of analysing one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    /// Publish order of the window. Use this to restore chronological order
    /// when several workers are running.
    pub seq: u64,
    /// Index of the analyzer that produced this result.
    pub worker: usize,
    pub outcome: AnalysisOutcome,
}

impl Analysis {
    /// The loudest reported peak, if any.
    pub fn primary(&self) -> Option<&PitchReport> {
        match &self.outcome {
            AnalysisOutcome::Detected(peaks) => peaks.first(),
            AnalysisOutcome::NoPeak => None,
        }
    }
}

/// Receives analyses as they complete.
///
/// Within one worker analyses arrive in window order; across workers they
/// may interleave, so sort by [`Analysis::seq`] if order matters.
pub trait Reporter {
    fn report(&mut self, analysis: &Analysis);
}

impl<F> Reporter for F
where
    F: FnMut(&Analysis),
{
    fn report(&mut self, analysis: &Analysis) {
        self(analysis)
    }
}
