//! Frequency-domain frames over a decoded buffer.
//!
//! Magnitudes are scaled to the same 8-bit range as the live spectrum monitor: the windowed bin
//! is normalized to the amplitude of a matching sine (`2·|X[k]| / Σw`), converted to dB and
//! mapped linearly from [`MIN_DB`]..[`MAX_DB`] to `0..=255`. A full-scale sine reads 0 dBFS at
//! its bin regardless of window.
//!
//! Key, energy and the live monitor use a Blackman window. Tempo detection uses rectangular
//! frames: their leakage spreads a bass onset over every low bin, so a kick lifts the whole
//! bass range instead of a handful of bins.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::analysis::AnalysisError;
use crate::messages::AudioBuffer;

/// Level mapped to 0.
pub const MIN_DB: f32 = -100.0;

/// Level mapped to 255.
pub const MAX_DB: f32 = -30.0;

/// Largest scaled magnitude.
pub const MAX_MAGNITUDE: f32 = 255.0;

/// Smallest accepted transform window.
pub const MIN_WINDOW_SIZE: usize = 32;

const MAGNITUDE_FLOOR: f32 = 1e-10;

pub fn validate_window_size(window_size: usize) -> Result<usize, AnalysisError> {
    if window_size < MIN_WINDOW_SIZE || !window_size.is_power_of_two() {
        return Err(AnalysisError::InvalidWindowSize(window_size));
    }
    Ok(window_size)
}

/// Taper applied to each transform window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameWindow {
    #[default]
    Blackman,
    Rectangular,
}

impl FrameWindow {
    fn coefficients(self, size: usize) -> Vec<f32> {
        match self {
            FrameWindow::Blackman => {
                let n = size as f32;
                (0..size)
                    .map(|i| {
                        let x = i as f32 / n;
                        0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
                    })
                    .collect()
            }
            FrameWindow::Rectangular => vec![1.0; size],
        }
    }
}

#[inline]
fn scale_magnitude(magnitude: f32) -> f32 {
    let db = 20.0 * magnitude.max(MAGNITUDE_FLOOR).log10();
    ((db - MIN_DB) / (MAX_DB - MIN_DB) * MAX_MAGNITUDE).clamp(0.0, MAX_MAGNITUDE)
}

/// Windowed FFT producing 8-bit-scaled magnitudes. Owns its scratch space.
#[derive(Clone)]
pub struct MagnitudeAnalyzer {
    window_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    norm: f32,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl MagnitudeAnalyzer {
    /// Blackman-windowed analyzer.
    pub fn new(window_size: usize) -> Result<Self, AnalysisError> {
        Self::with_window(window_size, FrameWindow::Blackman)
    }

    pub fn with_window(window_size: usize, kind: FrameWindow) -> Result<Self, AnalysisError> {
        let window_size = validate_window_size(window_size)?;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(window_size);
        let scratch_len = fft.get_inplace_scratch_len();
        let window = kind.coefficients(window_size);
        let norm = 2.0 / window.iter().sum::<f32>();

        Ok(Self {
            window_size,
            fft,
            window,
            norm,
            buffer: vec![Complex::new(0.0, 0.0); window_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Writes `window_size / 2` scaled magnitudes of `samples` into `out`.
    ///
    /// Missing input samples count as silence; extra ones are ignored.
    pub fn process(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let norm = self.norm;
        out.clear();
        out.extend(
            self.buffer[..self.window_size / 2]
                .iter()
                .map(|bin| scale_magnitude(bin.norm() * norm)),
        );
    }
}

/// One transform window's magnitude bins.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFrame {
    magnitudes: Vec<f32>,
    sample_rate: u32,
    window_size: usize,
}

impl SpectralFrame {
    pub fn new(magnitudes: Vec<f32>, sample_rate: u32, window_size: usize) -> Self {
        Self {
            magnitudes,
            sample_rate,
            window_size,
        }
    }

    /// `window_size / 2` bins, each in `0..=255`.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    /// Center frequency of bin `k`.
    pub fn bin_frequency(&self, k: usize) -> f32 {
        k as f32 * self.sample_rate as f32 / self.window_size as f32
    }
}

/// Lazy, restartable sequence of non-overlapping frames over a buffer's mono mixdown.
pub struct SpectralFrameSource {
    mono: Vec<f32>,
    sample_rate: u32,
    analyzer: MagnitudeAnalyzer,
}

impl SpectralFrameSource {
    pub fn new(buffer: &AudioBuffer, window_size: usize) -> Result<Self, AnalysisError> {
        Self::with_window(buffer, window_size, FrameWindow::Blackman)
    }

    pub fn with_window(
        buffer: &AudioBuffer,
        window_size: usize,
        kind: FrameWindow,
    ) -> Result<Self, AnalysisError> {
        Ok(Self {
            mono: buffer.mono(),
            sample_rate: buffer.sample_rate(),
            analyzer: MagnitudeAnalyzer::with_window(window_size, kind)?,
        })
    }

    pub fn window_size(&self) -> usize {
        self.analyzer.window_size()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whole windows in the buffer; a trailing partial window is dropped.
    pub fn frame_count(&self) -> usize {
        self.mono.len() / self.window_size()
    }

    /// Computes a single frame.
    pub fn frame(&self, index: usize) -> Option<SpectralFrame> {
        self.frames().nth_frame(index)
    }

    /// Fresh iterator from the first frame. Each iterator owns its own cursor and scratch.
    pub fn frames(&self) -> SpectralFrames<'_> {
        SpectralFrames {
            source: self,
            analyzer: self.analyzer.clone(),
            next: 0,
        }
    }
}

pub struct SpectralFrames<'a> {
    source: &'a SpectralFrameSource,
    analyzer: MagnitudeAnalyzer,
    next: usize,
}

impl SpectralFrames<'_> {
    fn compute(&mut self, index: usize) -> Option<SpectralFrame> {
        if index >= self.source.frame_count() {
            return None;
        }

        let window_size = self.analyzer.window_size();
        let start = index * window_size;
        let mut magnitudes = Vec::with_capacity(window_size / 2);
        self.analyzer
            .process(&self.source.mono[start..start + window_size], &mut magnitudes);

        Some(SpectralFrame::new(
            magnitudes,
            self.source.sample_rate,
            window_size,
        ))
    }

    fn nth_frame(mut self, index: usize) -> Option<SpectralFrame> {
        self.compute(index)
    }
}

impl Iterator for SpectralFrames<'_> {
    type Item = SpectralFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.compute(self.next)?;
        self.next += 1;
        Some(frame)
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.next = self.next.saturating_add(n);
        self.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.source.frame_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SpectralFrames<'_> {}
