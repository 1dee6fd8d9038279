//! # Pipeline Module
//!
//! Wires the stages together:
//!
//! ```text
//! capture -> WindowBuffer -> Dispatcher -> Handoff[i] -> analyzer thread i
//!                                                          |
//!                          transform -> peaks -> pitch -> Analysis channel
//! ```
//!
//! The capture side ([`CaptureHandle`]) is driven by whoever owns the sample
//! source: a cpal callback for live input, or a loop over a recording. The
//! analyzer threads are owned by [`Pipeline`]. For offline use,
//! [`analyze_recording`] runs the same window and analysis stages inline so
//! no window is ever dropped.
//!
//! The result channel is bounded by `result_capacity`. A reporter that falls
//! behind loses the newest analyses rather than stalling the analyzers; the
//! losses are counted in [`PipelineStats::dropped_results`].

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::fft::SpectralAnalyzer;
use crate::handoff::{Dispatcher, Handoff, WindowSnapshot};
use crate::harmonics::HarmonicTable;
use crate::peaks::PeakPicker;
use crate::pitch::PitchMapper;
use crate::window::{CaptureFlow, SinkStatus, WindowBuffer};
use crate::{Analysis, AnalysisOutcome, PitchReport};

/// Transform, peak picking and pitch naming for one analyzer.
#[derive(Debug)]
pub struct AnalysisStage {
    worker: usize,
    analyzer: SpectralAnalyzer,
    picker: PeakPicker,
    mapper: PitchMapper,
}

impl AnalysisStage {
    pub fn new(worker: usize, analyzer: SpectralAnalyzer, picker: PeakPicker, mapper: PitchMapper) -> Self {
        Self {
            worker,
            analyzer,
            picker,
            mapper,
        }
    }

    /// Builds a stage from a validated config.
    pub fn from_config(config: &PipelineConfig, table: Arc<HarmonicTable>) -> Self {
        let analyzer = SpectralAnalyzer::new(config.window_size, config.sample_rate, config.window_function);
        let mapper = PitchMapper::new(table).with_frequency_floor(config.frequency_floor);
        Self::new(0, analyzer, config.peaks, mapper)
    }

    /// Another stage sharing this one's plan and table, for worker `worker`.
    pub fn fork(&self, worker: usize) -> Self {
        Self::new(worker, self.analyzer.fork(), self.picker, self.mapper.clone())
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Analyses one snapshot.
    pub fn analyze(&mut self, snapshot: &WindowSnapshot) -> Analysis {
        let spectrum = self.analyzer.transform(&snapshot.samples);
        let peaks = self.picker.select(&spectrum);

        let outcome = if peaks.is_empty() {
            AnalysisOutcome::NoPeak
        } else {
            let reports = peaks
                .iter()
                .map(|peak| {
                    let frequency = spectrum.bin_frequency(peak.bin);
                    PitchReport {
                        frequency,
                        intensity: peak.magnitude,
                        note: self.mapper.map(frequency),
                    }
                })
                .collect();
            AnalysisOutcome::Detected(reports)
        };

        Analysis {
            seq: snapshot.seq,
            worker: self.worker,
            outcome,
        }
    }
}

/// Producer side of the pipeline. Lives on the capture thread.
#[derive(Debug)]
pub struct CaptureHandle {
    window: WindowBuffer,
    dispatcher: Dispatcher,
    gain: f32,
    finished: Option<CaptureFlow>,
}

impl CaptureHandle {
    fn new(config: &PipelineConfig, dispatcher: Dispatcher) -> Self {
        let mut window = WindowBuffer::new(config.window_size, config.hop_size);
        if config.prefill {
            window.prime(config.window_size - config.hop_size);
        }
        Self {
            window,
            dispatcher,
            gain: config.gain,
            finished: None,
        }
    }

    /// Consumes one batch from the capture source.
    ///
    /// Safe to call from a real-time callback: it never allocates and never
    /// waits on an analyzer. Once a non-`Continue` flow has been returned,
    /// every later call returns it again without touching the window.
    pub fn on_samples(&mut self, samples: &[f32]) -> CaptureFlow {
        if let Some(flow) = self.finished {
            return flow;
        }
        let flow = self.window.push(samples, self.gain, &mut self.dispatcher);
        if flow != CaptureFlow::Continue {
            self.finished = Some(flow);
        }
        flow
    }

    /// Pushes a pre-recorded buffer through the live path in batches of
    /// `batch` samples. Windows the analyzers cannot keep up with are
    /// dropped exactly as they would be for live input.
    pub fn feed(&mut self, samples: &[f32], batch: usize) -> CaptureFlow {
        for chunk in samples.chunks(batch.max(1)) {
            let flow = self.on_samples(chunk);
            if flow != CaptureFlow::Continue {
                return flow;
            }
        }
        CaptureFlow::Continue
    }

    /// Windows handed to the dispatcher so far.
    pub fn windows_dispatched(&self) -> u64 {
        self.dispatcher.dispatched()
    }

    pub fn window(&self) -> &WindowBuffer {
        &self.window
    }
}

/// Aggregated handoff counters across all slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub published: u64,
    pub stale: u64,
    pub contended: u64,
    /// Analyses discarded because the result queue was full.
    pub dropped_results: u64,
}

/// Owns the analyzer threads and their handoff slots.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    slots: Vec<Arc<Handoff>>,
    workers: Vec<JoinHandle<()>>,
    results: Receiver<Analysis>,
    dropped_results: Arc<AtomicU64>,
}

impl Pipeline {
    /// Validates `config`, spawns one analyzer thread per worker and returns
    /// the pipeline together with the capture handle that feeds it.
    pub fn start(config: PipelineConfig, table: Arc<HarmonicTable>) -> Result<(Self, CaptureHandle), PipelineError> {
        config.validate()?;

        log::info!(
            "Starting pipeline: {} Hz, window {} ({:.3} s), hop {} ({:.3} s), {} worker(s), {:?}",
            config.sample_rate,
            config.window_size,
            config.window_duration(),
            config.hop_size,
            config.hop_duration(),
            config.workers,
            config.peaks,
        );

        let (results_tx, results_rx) = crossbeam_channel::bounded(config.result_capacity);
        let dropped_results = Arc::new(AtomicU64::new(0));
        let template = AnalysisStage::from_config(&config, table);
        let slots: Vec<Arc<Handoff>> = (0..config.workers)
            .map(|_| Arc::new(Handoff::new(config.window_size)))
            .collect();

        let mut pipeline = Self {
            config,
            slots: slots.clone(),
            workers: Vec::with_capacity(slots.len()),
            results: results_rx,
            dropped_results: Arc::clone(&dropped_results),
        };

        for (i, slot) in slots.iter().enumerate() {
            let stage = template.fork(i);
            let slot = Arc::clone(slot);
            let tx = results_tx.clone();
            let dropped = Arc::clone(&dropped_results);
            // On failure `pipeline` is dropped, which closes the slots and
            // joins the workers spawned so far.
            let handle = thread::Builder::new()
                .name(format!("hark-analyzer-{i}"))
                .spawn(move || run_worker(slot, stage, tx, dropped))?;
            pipeline.workers.push(handle);
        }

        let capture = CaptureHandle::new(&pipeline.config, Dispatcher::new(slots));
        Ok((pipeline, capture))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Completed analyses. Disconnects after shutdown once drained.
    pub fn results(&self) -> &Receiver<Analysis> {
        &self.results
    }

    pub fn stats(&self) -> PipelineStats {
        let initial = PipelineStats {
            dropped_results: self.dropped_results.load(Ordering::Relaxed),
            ..PipelineStats::default()
        };
        self.slots.iter().fold(initial, |acc, slot| {
            let stats = slot.stats();
            PipelineStats {
                published: acc.published + stats.published(),
                stale: acc.stale + stats.stale(),
                contended: acc.contended + stats.contended(),
                ..acc
            }
        })
    }

    /// Closes every slot, discarding in-flight windows, and joins the
    /// analyzer threads.
    pub fn shutdown(mut self) -> PipelineStats {
        self.stop();
        let stats = self.stats();
        log::info!(
            "Pipeline stopped: {} window(s) published, {} overwritten, {} dropped on contention, {} result(s) dropped",
            stats.published,
            stats.stale,
            stats.contended,
            stats.dropped_results
        );
        stats
    }

    fn stop(&mut self) {
        for slot in &self.slots {
            slot.close();
        }
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("analyzer").to_string();
            if handle.join().is_err() {
                log::error!("{name} panicked");
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    slot: Arc<Handoff>,
    mut stage: AnalysisStage,
    results: Sender<Analysis>,
    dropped: Arc<AtomicU64>,
) {
    log::info!("Analyzer {} started", stage.worker());
    let mut seen_stale = 0;

    while let Some(snapshot) = slot.take() {
        let stale = slot.stats().stale();
        if stale > seen_stale {
            log::debug!(
                "Analyzer {}: {} window(s) overwritten before analysis",
                stage.worker(),
                stale - seen_stale
            );
            seen_stale = stale;
        }

        match results.try_send(stage.analyze(&snapshot)) {
            Ok(()) => {}
            Err(TrySendError::Full(analysis)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "Analyzer {}: result queue full, dropped window {}",
                    stage.worker(),
                    analysis.seq
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                log::info!("Analyzer {}: result receiver dropped", stage.worker());
                break;
            }
        }
    }

    log::info!("Analyzer {} finished", stage.worker());
}

/// Analyses a pre-recorded buffer on the calling thread.
///
/// Uses the same window and analysis stages as the live pipeline, but hands
/// every completed window straight to the analyzer, so nothing is dropped.
/// Results come back in window order.
pub fn analyze_recording(
    config: &PipelineConfig,
    table: Arc<HarmonicTable>,
    samples: &[f32],
) -> Result<Vec<Analysis>, ConfigError> {
    config.validate()?;

    let mut stage = AnalysisStage::from_config(config, table);
    let mut window = WindowBuffer::new(config.window_size, config.hop_size);
    if config.prefill {
        window.prime(config.window_size - config.hop_size);
    }

    let mut analyses = Vec::new();
    let mut seq = 0;
    let mut sink = |completed: &[f32]| {
        let snapshot = WindowSnapshot {
            seq,
            samples: completed.to_vec(),
        };
        seq += 1;
        analyses.push(stage.analyze(&snapshot));
        SinkStatus::Open
    };
    window.push(samples, config.gain, &mut sink);

    Ok(analyses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::PublishOutcome;
    use std::f64::consts::PI;
    use std::time::Duration;

    fn sine(freq: f64, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate as f64).sin() as f32)
            .collect()
    }

    fn table() -> Arc<HarmonicTable> {
        Arc::new(HarmonicTable::new())
    }

    #[test]
    fn stage_names_concert_a() {
        let config = PipelineConfig::default();
        let mut stage = AnalysisStage::from_config(&config, table());
        let snapshot = WindowSnapshot {
            seq: 3,
            samples: sine(440.0, 44_100, 4096),
        };

        let analysis = stage.analyze(&snapshot);
        assert_eq!(analysis.seq, 3);
        let primary = analysis.primary().unwrap();
        assert!((primary.frequency - 41.0 * 44_100.0 / 4096.0).abs() < 1e-9);
        let note = primary.note.as_ref().unwrap();
        assert_eq!(note.harmonic_index, 9);
        assert_eq!(note.note_name, "A");
        assert_eq!(note.octave, 4);
    }

    #[test]
    fn stage_reports_silence_as_no_peak() {
        let config = PipelineConfig::default();
        let mut stage = AnalysisStage::from_config(&config, table());
        let snapshot = WindowSnapshot {
            seq: 0,
            samples: vec![0.0; 4096],
        };
        assert_eq!(stage.analyze(&snapshot).outcome, AnalysisOutcome::NoPeak);
    }

    #[test]
    fn low_peak_without_floor_has_no_note() {
        let config = PipelineConfig {
            frequency_floor: 0.0,
            ..PipelineConfig::default()
        };
        let mut stage = AnalysisStage::from_config(&config, table());
        // Bin 1 is about 10.8 Hz, below the lowest table entry.
        let snapshot = WindowSnapshot {
            seq: 0,
            samples: sine(44_100.0 / 4096.0, 44_100, 4096),
        };
        let analysis = stage.analyze(&snapshot);
        let primary = analysis.primary().unwrap();
        assert_eq!(primary.frequency, 44_100.0 / 4096.0);
        assert!(primary.note.is_none());
    }

    #[test]
    fn recording_yields_every_window_in_order() {
        let config = PipelineConfig::default();
        let samples = sine(440.0, 44_100, 4096 + 1024 * 5);
        let analyses = analyze_recording(&config, table(), &samples).unwrap();

        assert_eq!(analyses.len(), 6);
        for (i, analysis) in analyses.iter().enumerate() {
            assert_eq!(analysis.seq, i as u64);
            let note = analysis.primary().unwrap().note.as_ref().unwrap();
            assert_eq!(note.harmonic_index, 9);
        }
    }

    #[test]
    fn recording_rejects_invalid_config() {
        let config = PipelineConfig {
            hop_size: 3,
            ..PipelineConfig::default()
        };
        assert!(analyze_recording(&config, table(), &[0.0; 16]).is_err());
    }

    #[test]
    fn capture_handle_latches_stop() {
        let slot = Arc::new(Handoff::new(8));
        let config = PipelineConfig {
            window_size: 8,
            hop_size: 4,
            ..PipelineConfig::default()
        };
        let mut capture = CaptureHandle::new(&config, Dispatcher::new(vec![Arc::clone(&slot)]));

        assert_eq!(capture.on_samples(&[0.5; 8]), CaptureFlow::Continue);
        assert_eq!(slot.try_take().unwrap().samples, vec![0.5; 8]);

        slot.close();
        assert_eq!(capture.on_samples(&[0.5; 4]), CaptureFlow::DrainAndStop);
        assert_eq!(capture.on_samples(&[0.5; 4]), CaptureFlow::DrainAndStop);
        assert_eq!(capture.windows_dispatched(), 2);
        assert_eq!(slot.publish(9, &[0.0; 8]), PublishOutcome::Closed);
    }

    #[test]
    fn prefilled_capture_emits_after_one_hop() {
        let slot = Arc::new(Handoff::new(8));
        let config = PipelineConfig {
            window_size: 8,
            hop_size: 2,
            prefill: true,
            gain: 2.0,
            ..PipelineConfig::default()
        };
        let mut capture = CaptureHandle::new(&config, Dispatcher::new(vec![Arc::clone(&slot)]));
        capture.on_samples(&[1.0, 1.0]);
        let snapshot = slot.try_take().unwrap();
        assert_eq!(snapshot.samples, vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn threaded_pipeline_reports_and_shuts_down() {
        let config = PipelineConfig {
            workers: 2,
            ..PipelineConfig::default()
        };
        let (pipeline, mut capture) = Pipeline::start(config, table()).unwrap();
        let signal = sine(440.0, 44_100, 4096);
        // Let the analyzers park so the first publish finds the slot free.
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(capture.on_samples(&signal), CaptureFlow::Continue);
        let analysis = pipeline
            .results()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(analysis.seq, 0);
        assert_eq!(analysis.worker, 0);
        assert_eq!(
            analysis.primary().and_then(|p| p.note.as_ref()).map(|n| n.note_name),
            Some("A")
        );

        let stats = pipeline.shutdown();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.dropped_results, 0);
        assert_eq!(capture.on_samples(&signal[..1024]), CaptureFlow::DrainAndStop);
    }

    #[test]
    fn full_result_queue_drops_and_counts() {
        // Hop equal to the window: one window per 4096 samples.
        let config = PipelineConfig {
            hop_size: 4096,
            result_capacity: 1,
            ..PipelineConfig::default()
        };
        let (pipeline, mut capture) = Pipeline::start(config, table()).unwrap();
        let signal = sine(440.0, 44_100, 4096);
        std::thread::sleep(Duration::from_millis(50));

        // Nobody reads results, so only the first analysis fits.
        for _ in 0..4 {
            capture.on_samples(&signal);
            std::thread::sleep(Duration::from_millis(50));
        }

        let stats = pipeline.stats();
        assert_eq!(pipeline.results().len(), 1);
        assert!(stats.dropped_results >= 1, "{stats:?}");
        assert_eq!(
            stats.dropped_results + 1 + stats.stale,
            stats.published,
            "{stats:?}"
        );
        assert_eq!(pipeline.results().try_recv().unwrap().seq, 0);
        pipeline.shutdown();
    }
}
