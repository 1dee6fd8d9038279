//! Pipeline configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::fft::WindowFunction;
use crate::peaks::PeakPicker;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sample rate R in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Window and transform size N. Powers of two are fastest.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Hop size H. Must divide `window_size`.
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    /// Linear gain applied to every captured sample.
    #[serde(default = "default_gain")]
    pub gain: f32,
    /// Number of analyzer threads, each fed by its own handoff slot.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Start with `window_size - hop_size` zeroed samples already in the
    /// window, so the first window is emitted after one hop.
    #[serde(default)]
    pub prefill: bool,
    #[serde(default)]
    pub window_function: WindowFunction,
    /// Frequencies below this are clamped up before naming. 0 disables.
    #[serde(default = "default_frequency_floor")]
    pub frequency_floor: f64,
    #[serde(default)]
    pub peaks: PeakPicker,
    /// Analyses queued for the reporter before new ones are dropped.
    #[serde(default = "default_result_capacity")]
    pub result_capacity: usize,
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_window_size() -> usize {
    4096
}

fn default_hop_size() -> usize {
    1024
}

fn default_gain() -> f32 {
    1.0
}

fn default_workers() -> usize {
    1
}

fn default_frequency_floor() -> f64 {
    16.0
}

fn default_result_capacity() -> usize {
    64
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            window_size: default_window_size(),
            hop_size: default_hop_size(),
            gain: default_gain(),
            workers: default_workers(),
            prefill: false,
            window_function: WindowFunction::default(),
            frequency_floor: default_frequency_floor(),
            peaks: PeakPicker::default(),
            result_capacity: default_result_capacity(),
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Checks the invariants the window and handoff logic rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < 2 {
            return Err(ConfigError::WindowTooSmall(self.window_size));
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            return Err(ConfigError::HopOutOfRange {
                hop: self.hop_size,
                window: self.window_size,
            });
        }
        if self.window_size % self.hop_size != 0 {
            return Err(ConfigError::HopNotDivisor {
                hop: self.hop_size,
                window: self.window_size,
            });
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if !self.gain.is_finite() || self.gain <= 0.0 {
            return Err(ConfigError::InvalidGain(self.gain));
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if !self.frequency_floor.is_finite() || self.frequency_floor < 0.0 {
            return Err(ConfigError::InvalidFrequencyFloor(self.frequency_floor));
        }
        if self.result_capacity == 0 {
            return Err(ConfigError::ZeroResultCapacity);
        }
        if let PeakPicker::TopK { threshold, k } = self.peaks {
            if k == 0 {
                return Err(ConfigError::ZeroPeakCapacity);
            }
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(ConfigError::InvalidThreshold(threshold));
            }
        }

        if !self.window_size.is_power_of_two() {
            log::warn!(
                "Window size {} is not a power of two; the transform will be slower",
                self.window_size
            );
        }
        Ok(())
    }

    /// Seconds of audio covered by one window.
    pub fn window_duration(&self) -> f64 {
        self.window_size as f64 / self.sample_rate as f64
    }

    /// Seconds between consecutive windows; the capture deadline per hop.
    pub fn hop_duration(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }

    /// Frequency resolution of the transform in Hz per bin.
    pub fn bin_width(&self) -> f64 {
        self.sample_rate as f64 / self.window_size as f64
    }
}
