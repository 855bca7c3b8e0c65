//! Tempo detection from bass-band energy peaks.

use serde::Serialize;

use crate::analysis::AnalysisError;
use crate::analysis::spectral::{FrameWindow, SpectralFrame, SpectralFrameSource};
use crate::messages::AudioBuffer;

/// Number of lowest bins averaged into the bass level.
pub const BASS_BINS: usize = 20;

/// Bass level (of 255) a frame must exceed to count as a peak.
pub const PEAK_THRESHOLD: f32 = 200.0;

/// Frames that must pass after a peak before the next one counts.
pub const MIN_PEAK_SPACING: usize = 10;

/// Tempo assumed when none can be detected.
pub const DEFAULT_BPM: f32 = 128.0;

/// Below this confidence a tempo should be treated as unreliable.
pub const RELIABLE_CONFIDENCE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoSource {
    Detected,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TempoResult {
    pub bpm: f32,
    pub confidence: f32,
    pub source: TempoSource,
}

impl TempoResult {
    pub fn fallback() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            confidence: 0.0,
            source: TempoSource::Fallback,
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.confidence >= RELIABLE_CONFIDENCE
    }
}

/// `(max − mean) / max`, 0 for empty or all-zero input.
pub fn peak_to_mean_ratio(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }

    let max = values.iter().copied().fold(f32::MIN, f32::max);
    if max <= 0.0 || !max.is_finite() {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    ((max - mean) / max).clamp(0.0, 1.0)
}

/// Mean of the lowest [`BASS_BINS`] bins.
fn bass_level(frame: &SpectralFrame) -> f32 {
    let bins = &frame.magnitudes()[..frame.bin_count().min(BASS_BINS)];
    if bins.is_empty() {
        return 0.0;
    }
    bins.iter().sum::<f32>() / bins.len() as f32
}

/// Rectangular-window frames, the input [`detect_tempo`] is calibrated for.
pub fn onset_frames(buffer: &AudioBuffer, window_size: usize) -> Result<SpectralFrameSource, AnalysisError> {
    SpectralFrameSource::with_window(buffer, window_size, FrameWindow::Rectangular)
}

/// Frame indices of bass peaks.
pub fn detect_peaks<I>(frames: I) -> Vec<usize>
where
    I: IntoIterator<Item = SpectralFrame>,
{
    let mut peaks: Vec<usize> = Vec::new();
    for (index, frame) in frames.into_iter().enumerate() {
        if bass_level(&frame) <= PEAK_THRESHOLD {
            continue;
        }
        let spaced = peaks
            .last()
            .is_none_or(|&last| index - last >= MIN_PEAK_SPACING);
        if spaced {
            peaks.push(index);
        }
    }
    peaks
}

/// Estimates tempo from a frame sequence.
///
/// Confidence is the peak-to-mean ratio of the histogram of inter-peak frame deltas, so a steady
/// pulse scores near 1 and scattered intervals score low.
pub fn detect_tempo<I>(frames: I, sample_rate: u32, window_size: usize) -> Result<TempoResult, AnalysisError>
where
    I: IntoIterator<Item = SpectralFrame>,
{
    let peaks = detect_peaks(frames);
    if peaks.len() < 2 {
        return Err(AnalysisError::NoTempoDetected);
    }

    let deltas: Vec<usize> = peaks.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let mean_delta = deltas.iter().sum::<usize>() as f32 / deltas.len() as f32;
    let bpm = sample_rate as f32 * 60.0 / (mean_delta * window_size as f32);
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(AnalysisError::NoTempoDetected);
    }

    let max_delta = deltas.iter().copied().max().unwrap_or(0);
    let mut histogram = vec![0.0f32; max_delta + 1];
    for &delta in &deltas {
        histogram[delta] += 1.0;
    }

    Ok(TempoResult {
        bpm,
        confidence: peak_to_mean_ratio(&histogram),
        source: TempoSource::Detected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: u32 = 44_100;
    const WINDOW: usize = 2_048;

    /// Repeats `burst(offset)` for the first tenth of a second of every beat.
    fn pulse_track(bpm: f32, seconds: f32, burst: impl Fn(usize) -> f32) -> AudioBuffer {
        let frames = (seconds * FS as f32) as usize;
        let period = (60.0 / bpm * FS as f32) as usize;
        let length = FS as usize / 10;

        let samples = (0..frames)
            .map(|n| {
                let offset = n % period;
                if offset < length { burst(offset) } else { 0.0 }
            })
            .collect();
        AudioBuffer::from_mono(FS, samples).unwrap()
    }

    fn sine_kick(amplitude: f32) -> impl Fn(usize) -> f32 {
        move |offset| {
            let t = offset as f32 / FS as f32;
            amplitude * (2.0 * std::f32::consts::PI * 60.0 * t).sin()
        }
    }

    fn noise_burst(gain: f32) -> impl Fn(usize) -> f32 {
        let mut seed = 0x1234_5678u32;
        let noise: Vec<f32> = (0..FS as usize / 10)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
            })
            .collect();
        move |offset| gain * noise[offset]
    }

    fn tempo_of(buffer: &AudioBuffer) -> Result<TempoResult, AnalysisError> {
        let source = onset_frames(buffer, WINDOW)?;
        detect_tempo(source.frames(), FS, WINDOW)
    }

    fn frame_with_bass(level: f32) -> SpectralFrame {
        let mut magnitudes = vec![0.0; WINDOW / 2];
        magnitudes[..BASS_BINS].fill(level);
        SpectralFrame::new(magnitudes, FS, WINDOW)
    }

    #[test]
    fn test_peak_to_mean_ratio() {
        assert_eq!(peak_to_mean_ratio(&[]), 0.0);
        assert_eq!(peak_to_mean_ratio(&[0.0, 0.0]), 0.0);
        assert_eq!(peak_to_mean_ratio(&[2.0, 2.0]), 0.0);
        assert!((peak_to_mean_ratio(&[4.0, 0.0, 0.0, 0.0]) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_peaks_respect_spacing() {
        let frames: Vec<_> = (0..30)
            .map(|i| frame_with_bass(if matches!(i, 0 | 1 | 9 | 10 | 25) { 250.0 } else { 0.0 }))
            .collect();
        assert_eq!(detect_peaks(frames), vec![0, 10, 25]);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let frames = vec![frame_with_bass(200.0), frame_with_bass(200.0)];
        assert!(detect_peaks(frames).is_empty());
    }

    #[test]
    fn test_regular_peaks_give_exact_tempo() {
        let frames: Vec<_> = (0..100)
            .map(|i| frame_with_bass(if i % 20 == 0 { 255.0 } else { 10.0 }))
            .collect();
        let result = detect_tempo(frames, FS, WINDOW).unwrap();

        let expected = FS as f32 * 60.0 / (20.0 * WINDOW as f32);
        assert!((result.bpm - expected).abs() < 1e-3);
        assert!(result.confidence > 0.9);
        assert_eq!(result.source, TempoSource::Detected);
    }

    #[test]
    fn test_single_peak_is_no_tempo() {
        let frames = vec![frame_with_bass(255.0), frame_with_bass(0.0)];
        assert!(matches!(
            detect_tempo(frames, FS, WINDOW),
            Err(AnalysisError::NoTempoDetected)
        ));
    }

    #[test]
    fn test_silence_has_no_tempo() {
        let buffer = AudioBuffer::from_mono(FS, vec![0.0; FS as usize * 10]).unwrap();
        assert!(matches!(
            tempo_of(&buffer),
            Err(AnalysisError::NoTempoDetected)
        ));
    }

    #[test]
    fn test_120_bpm_sine_kick() {
        for amplitude in [1.0, 0.5] {
            let buffer = pulse_track(120.0, 12.0, sine_kick(amplitude));
            let result = tempo_of(&buffer).unwrap();

            assert!((result.bpm - 120.0).abs() <= 2.0, "{amplitude}: bpm = {}", result.bpm);
            assert!(result.confidence > 0.5, "{amplitude}: confidence = {}", result.confidence);
            assert!(result.is_reliable());
        }
    }

    #[test]
    fn test_decaying_kick_at_100_bpm() {
        let buffer = pulse_track(100.0, 12.0, |offset| {
            let t = offset as f32 / FS as f32;
            (2.0 * std::f32::consts::PI * 60.0 * t).sin() * (-t / 0.05).exp()
        });
        let result = tempo_of(&buffer).unwrap();
        assert!((result.bpm - 100.0).abs() <= 2.0, "bpm = {}", result.bpm);
    }

    #[test]
    fn test_full_scale_noise_bursts() {
        for gain in [1.0, 0.5] {
            let buffer = pulse_track(120.0, 12.0, noise_burst(gain));
            let result = tempo_of(&buffer).unwrap();
            assert!((result.bpm - 120.0).abs() <= 2.0, "{gain}: bpm = {}", result.bpm);
        }
    }

    #[test]
    fn test_fallback() {
        let fallback = TempoResult::fallback();
        assert_eq!(fallback.bpm, DEFAULT_BPM);
        assert_eq!(fallback.confidence, 0.0);
        assert!(!fallback.is_reliable());
    }
}
