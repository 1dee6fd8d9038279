//! # Audio Capture Module
//!
//! Live input through CPAL (Cross-Platform Audio Library).
//!
//! Device selection happens first so the pipeline can be configured with the
//! sample rate the device actually runs at. The stream callback then feeds a
//! [`CaptureHandle`] directly; it never allocates and never waits on the
//! analyzers.
//!
//! ## Features
//! - Default input device selection
//! - Mono 32-bit float config closest to the requested sample rate
//! - Stop signalling back to the stream owner

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfigRange};
use crossbeam_channel::Receiver;

use crate::pipeline::CaptureHandle;
use crate::window::CaptureFlow;

/// An input device together with the stream config chosen for it.
pub struct InputSelection {
    pub device: cpal::Device,
    pub config: cpal::StreamConfig,
}

impl InputSelection {
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

/// A running input stream.
///
/// Dropping this stops capture. `stop` yields the flow that made the
/// capture handle give up, at most once.
pub struct LiveCapture {
    pub stream: cpal::Stream,
    pub stop: Receiver<CaptureFlow>,
}

/// Picks the default input device and a mono f32 config as close as
/// possible to `target_rate`.
///
/// # Returns
/// * `Ok(selection)` - device and stream config to open
/// * `Err(e)` - no input device, or no usable format
pub fn select_input(target_rate: u32) -> Result<InputSelection> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    log::info!("Using audio input device: {}", device.name()?);

    let configs = device
        .supported_input_configs()
        .context("failed to query supported input configs")?
        .collect::<Vec<_>>();
    let supported = find_supported_config(configs, target_rate)
        .ok_or_else(|| anyhow!("No suitable mono f32 input format found"))?;

    let rate = target_rate.clamp(supported.min_sample_rate().0, supported.max_sample_rate().0);
    if rate != target_rate {
        log::warn!("Device does not support {target_rate} Hz; using {rate} Hz");
    }
    let config: cpal::StreamConfig = supported.with_sample_rate(cpal::SampleRate(rate)).into();

    log::info!("Selected sample rate: {} Hz", config.sample_rate.0);
    Ok(InputSelection { device, config })
}

/// Opens and starts an input stream feeding `capture`.
///
/// The capture handle moves into the stream callback. When it returns
/// anything but [`CaptureFlow::Continue`], that flow is sent once on
/// [`LiveCapture::stop`]; the owner should then drop the stream.
pub fn start_audio_capture(selection: &InputSelection, mut capture: CaptureHandle) -> Result<LiveCapture> {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    let mut signalled = false;

    let err_fn = |err| log::error!("An error occurred on the audio stream: {}", err);

    let stream = selection
        .device
        .build_input_stream(
            &selection.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let flow = capture.on_samples(data);
                if flow != CaptureFlow::Continue && !signalled {
                    signalled = true;
                    let _ = stop_tx.try_send(flow);
                }
            },
            err_fn,
            None,
        )
        .context("failed to build input stream")?;

    stream.play().context("failed to start input stream")?;

    Ok(LiveCapture {
        stream,
        stop: stop_rx,
    })
}

/// Finds the best supported audio configuration for the target sample rate:
/// mono, 32-bit float, with the closest rate range.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| rate_distance(c.min_sample_rate().0, c.max_sample_rate().0, target_rate))
}

/// Distance from `target` to the range `[min, max]`; zero inside it.
fn rate_distance(min: u32, max: u32, target: u32) -> u32 {
    if target < min {
        min - target
    } else {
        target.saturating_sub(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_distance_is_zero_inside_range() {
        assert_eq!(rate_distance(8_000, 96_000, 44_100), 0);
        assert_eq!(rate_distance(44_100, 44_100, 44_100), 0);
    }

    #[test]
    fn rate_distance_measures_to_nearest_edge() {
        assert_eq!(rate_distance(48_000, 96_000, 44_100), 3_900);
        assert_eq!(rate_distance(8_000, 22_050, 44_100), 22_050);
    }
}
