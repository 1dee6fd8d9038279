//! # Hark - Live Pitch Detector
//!
//! Listens on the default input device and prints the detected pitch of
//! every analysed window.
//!
//! ## Architecture
//! - **Capture Thread**: CPAL callback feeding the sliding window
//! - **Analyzer Threads**: one per configured worker, fed round-robin
//! - **Main Thread**: receives analyses and prints them
//!
//! An optional JSON config path may be given as the only argument. Set
//! `HARK_REPORT=json` for JSON lines instead of text, or `HARK_REPORT=staff`
//! to add a treble staff column.

mod report;

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;
use std::sync::Arc;

use hark_core::{HarmonicTable, Pipeline, PipelineConfig, audio};
use report::ReportFormat;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::load(&path).with_context(|| format!("loading config {path}"))?,
        None => PipelineConfig::default(),
    };

    let selection = audio::select_input(config.sample_rate)?;
    config.sample_rate = selection.sample_rate();

    log::info!(
        "FFT size: {}, window length: {:.6} s, window increment: {}",
        config.window_size,
        config.window_duration(),
        config.hop_size
    );

    let table = Arc::new(HarmonicTable::new());
    let (pipeline, capture) = Pipeline::start(config, table)?;
    let live = audio::start_audio_capture(&selection, capture)?;
    let mut reporter = ReportFormat::from_env().reporter(std::io::stdout());

    log::info!("Listening...");
    loop {
        crossbeam_channel::select! {
            recv(pipeline.results()) -> msg => match msg {
                Ok(analysis) => reporter.report(&analysis),
                Err(_) => {
                    log::warn!("Analyzers stopped");
                    break;
                }
            },
            recv(live.stop) -> flow => {
                match flow {
                    Ok(flow) => log::warn!("Capture requested stop: {flow:?}"),
                    Err(_) => log::warn!("Capture callback dropped"),
                }
                break;
            },
        }
    }

    log::info!("Stopping stream...");
    if let Err(e) = live.stream.pause() {
        log::error!("Error pausing stream: {e}");
    }
    drop(live);
    pipeline.shutdown();
    Ok(())
}
