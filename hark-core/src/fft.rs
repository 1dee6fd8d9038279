//! # Fast Fourier Transform (FFT) Module
//!
//! Turns window snapshots into magnitude spectra for peak picking.
//!
//! ## Features
//! - Real-to-complex forward FFT via RealFFT (built on RustFFT)
//! - Plan created once per window size and shared between workers
//! - Optional Hann windowing with DC offset removal
//! - Squared-modulus magnitudes for relative comparisons

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Taper applied to a window before the transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    /// Raw samples, no taper.
    #[default]
    Rectangular,
    /// DC offset removal followed by a Hann taper.
    Hann,
}

/// The N/2+1 complex bins of a real-to-complex transform of size N.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    bins: Vec<Complex<f64>>,
    size: usize,
    sample_rate: u32,
}

impl Spectrum {
    pub fn bins(&self) -> &[Complex<f64>] {
        &self.bins
    }

    /// Transform size N the spectrum was computed with.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Squared modulus of bin `k`. Only meaningful relative to other bins.
    pub fn magnitude(&self, k: usize) -> f64 {
        self.bins[k].norm_sqr()
    }

    /// Squared modulus of every bin, DC included.
    pub fn magnitudes(&self) -> Vec<f64> {
        self.bins.iter().map(|c| c.norm_sqr()).collect()
    }

    /// Center frequency of bin `k` in Hz: `k * R / N`.
    pub fn bin_frequency(&self, k: usize) -> f64 {
        bin_frequency(k, self.size, self.sample_rate)
    }
}

/// Center frequency of bin `k` of an `size`-point transform at `sample_rate`.
pub fn bin_frequency(k: usize, size: usize, sample_rate: u32) -> f64 {
    k as f64 * sample_rate as f64 / size as f64
}

/// Runs the forward transform for one fixed window size.
///
/// Scratch buffers are owned per analyzer, so give every worker its own
/// instance via [`SpectralAnalyzer::fork`].
pub struct SpectralAnalyzer {
    fft: Arc<dyn RealToComplex<f64>>,
    window: Option<Arc<[f64]>>,
    input: Vec<f64>,
    output: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    sample_rate: u32,
}

impl std::fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("size", &self.size())
            .field("windowed", &self.window.is_some())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl SpectralAnalyzer {
    /// Plans a forward transform of `size` points.
    ///
    /// Planning is the expensive part; do it once at startup.
    pub fn new(size: usize, sample_rate: u32, window_function: WindowFunction) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(size);
        log::info!("Planned {size}-point real FFT ({window_function:?} window)");

        let window = match window_function {
            WindowFunction::Rectangular => None,
            WindowFunction::Hann => Some(hann_window(size).into()),
        };

        Self::with_plan(fft, window, sample_rate)
    }

    /// Creates another analyzer sharing this one's plan and window, with its
    /// own scratch buffers.
    pub fn fork(&self) -> Self {
        Self::with_plan(Arc::clone(&self.fft), self.window.clone(), self.sample_rate)
    }

    fn with_plan(fft: Arc<dyn RealToComplex<f64>>, window: Option<Arc<[f64]>>, sample_rate: u32) -> Self {
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        Self {
            fft,
            window,
            input,
            output,
            scratch,
            sample_rate,
        }
    }

    pub fn size(&self) -> usize {
        self.fft.len()
    }

    /// Transforms one window into its spectrum.
    ///
    /// Windows shorter than the plan are zero-padded, longer ones truncated.
    pub fn transform(&mut self, samples: &[f32]) -> Spectrum {
        let n = self.input.len();
        for (dst, src) in self
            .input
            .iter_mut()
            .zip(samples.iter().copied().chain(std::iter::repeat(0.0)))
            .take(n)
        {
            *dst = src as f64;
        }

        if let Some(window) = &self.window {
            remove_dc_offset(&mut self.input);
            for (sample, w) in self.input.iter_mut().zip(window.iter()) {
                *sample *= w;
            }
        }

        // Lengths come from the plan itself, so processing cannot fail.
        if let Err(err) = self
            .fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
        {
            log::error!("FFT processing failed: {err}");
            self.output.fill(Complex::new(0.0, 0.0));
        }

        Spectrum {
            bins: self.output.clone(),
            size: n,
            sample_rate: self.sample_rate,
        }
    }
}

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f64>() / len as f64;
    if avg.abs() > 1e-12 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Hann window coefficients of length `n`.
fn hann_window(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f64;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n_minus_1).cos()))
        .collect()
}
