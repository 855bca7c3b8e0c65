//! Offline track analysis: tempo, key, spectral energy, waveform and beat grid.
//!
//! Every analyzer reads the immutable [`AudioBuffer`] and owns its own frame cursor, so
//! [`analyze`] runs tempo, key and energy detection concurrently with [`rayon::join`]. Nothing
//! here touches the audio thread.

pub mod energy;
pub mod key;
pub mod spectral;
pub mod tempo;
pub mod waveform;

use serde::Serialize;
use thiserror::Error;

use crate::messages::AudioBuffer;

pub use energy::{EnergyBand, EnergyProfile};
pub use key::{CamelotCode, KeyCompatibility, KeyResult, PitchClass, Scale};
pub use spectral::{FrameWindow, SpectralFrame, SpectralFrameSource};
pub use tempo::{DEFAULT_BPM, TempoResult, TempoSource};
pub use waveform::{Beat, BeatGrid, WaveformEnvelope, WaveformPoint, beat_grid, overview, waveform};

/// Errors produced by the analyzers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("audio buffer is empty")]
    EmptyBuffer,

    #[error("invalid transform window size {0} (expected a power of two >= 32)")]
    InvalidWindowSize(usize),

    #[error("no tempo detected")]
    NoTempoDetected,

    #[error("no key detected")]
    NoKeyDetected,

    #[error("invalid bpm {0}")]
    InvalidBpm(f32),

    #[error("invalid duration {0}s")]
    InvalidDuration(f64),
}

impl AnalysisError {
    /// Too little signal for an estimate. Callers should fall back rather than fail.
    pub fn is_underrun(&self) -> bool {
        matches!(
            self,
            AnalysisError::EmptyBuffer
                | AnalysisError::NoTempoDetected
                | AnalysisError::NoKeyDetected
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Transform window in samples; a power of two.
    pub window_size: usize,

    /// Frames sampled by the key analyzer.
    pub key_checkpoints: usize,

    /// Columns of the waveform envelope and overview.
    pub waveform_width: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: 2_048,
            key_checkpoints: 100,
            waveform_width: 800,
        }
    }
}

/// Everything computed for one loaded track. Replaced, never mutated, on re-analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackAnalysis {
    pub tempo: TempoResult,

    /// `None` when no pitched energy was found.
    pub key: Option<KeyResult>,

    pub energy: EnergyProfile,
    pub waveform: WaveformEnvelope,
    pub overview: Vec<f32>,
    pub beat_grid: BeatGrid,
    pub duration_secs: f64,
}

/// Analyzes a decoded buffer.
///
/// Underruns do not fail the call: no tempo falls back to [`TempoResult::fallback`], no key
/// yields `None`. Only an invalid configuration is an error.
pub fn analyze(buffer: &AudioBuffer, config: &AnalysisConfig) -> Result<TrackAnalysis, AnalysisError> {
    let source = SpectralFrameSource::new(buffer, config.window_size)?;
    let onsets = tempo::onset_frames(buffer, config.window_size)?;
    let sample_rate = buffer.sample_rate();

    let (tempo, (key, energy)) = rayon::join(
        || tempo::detect_tempo(onsets.frames(), sample_rate, config.window_size),
        || {
            rayon::join(
                || key::detect_key(&source, config.key_checkpoints),
                || EnergyProfile::mean_of(source.frames()),
            )
        },
    );

    let tempo = match tempo {
        Ok(tempo) => tempo,
        Err(err) if err.is_underrun() => {
            log::debug!("tempo fallback to {DEFAULT_BPM} bpm: {err}");
            TempoResult::fallback()
        }
        Err(err) => return Err(err),
    };

    let key = match key {
        Ok(key) => Some(key),
        Err(err) if err.is_underrun() => {
            log::debug!("no key: {err}");
            None
        }
        Err(err) => return Err(err),
    };

    let duration_secs = buffer.duration_secs();
    let beat_grid = beat_grid(tempo.bpm, duration_secs)?;

    log::debug!(
        "analysis: {:.1} bpm (confidence {:.2}), key {}, {} frames, {} beats",
        tempo.bpm,
        tempo.confidence,
        key.map_or_else(|| "-".to_string(), |key| key.name()),
        source.frame_count(),
        beat_grid.len()
    );

    Ok(TrackAnalysis {
        tempo,
        key,
        energy,
        waveform: waveform(buffer, config.waveform_width),
        overview: overview(buffer, config.waveform_width),
        beat_grid,
        duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: u32 = 44_100;

    /// 60 Hz kick decaying over a tenth of a second, twice a second.
    fn pulse_track(seconds: f32) -> AudioBuffer {
        let frames = (seconds * FS as f32) as usize;
        let period = FS as usize / 2;
        let burst = FS as usize / 10;

        let samples = (0..frames)
            .map(|n| {
                let offset = n % period;
                if offset >= burst {
                    return 0.0;
                }
                let t = offset as f32 / FS as f32;
                0.8 * (2.0 * std::f32::consts::PI * 60.0 * t).sin() * (-t / 0.05).exp()
            })
            .collect();
        AudioBuffer::from_mono(FS, samples).unwrap()
    }

    #[test]
    fn test_silence_falls_back() {
        let buffer = AudioBuffer::from_mono(FS, vec![0.0; FS as usize * 10]).unwrap();
        let analysis = analyze(&buffer, &AnalysisConfig::default()).unwrap();

        assert_eq!(analysis.tempo, TempoResult::fallback());
        assert_eq!(analysis.tempo.confidence, 0.0);
        assert!(analysis.key.is_none());
        assert!(analysis.energy.iter().all(|(_, value)| value == 0.0));
        assert_eq!(analysis.waveform.len(), 800);
        assert!((analysis.duration_secs - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_buffer_does_not_fail() {
        let buffer = AudioBuffer::from_mono(FS, Vec::new()).unwrap();
        let analysis = analyze(&buffer, &AnalysisConfig::default()).unwrap();
        assert_eq!(analysis.tempo.source, TempoSource::Fallback);
        assert!(analysis.beat_grid.is_empty());
    }

    #[test]
    fn test_invalid_window_is_an_error() {
        let buffer = AudioBuffer::from_mono(FS, vec![0.0; 4_096]).unwrap();
        let config = AnalysisConfig {
            window_size: 1_000,
            ..AnalysisConfig::default()
        };
        assert_eq!(
            analyze(&buffer, &config),
            Err(AnalysisError::InvalidWindowSize(1_000))
        );
    }

    #[test]
    fn test_pulse_track_analysis() {
        let buffer = pulse_track(12.0);
        let analysis = analyze(&buffer, &AnalysisConfig::default()).unwrap();

        assert!((analysis.tempo.bpm - 120.0).abs() <= 2.0);
        assert!(analysis.tempo.confidence > 0.5);
        assert_eq!(
            analysis.beat_grid.len(),
            (12.0 / (60.0 / f64::from(analysis.tempo.bpm))).floor() as usize
        );
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let buffer = pulse_track(6.0);
        let config = AnalysisConfig::default();
        let first = analyze(&buffer, &config).unwrap();
        let second = analyze(&buffer, &config).unwrap();
        assert_eq!(first.tempo, second.tempo);
        assert_eq!(first.key, second.key);
        assert_eq!(first, second);
    }

    #[test]
    fn test_serializes_to_json() {
        let buffer = pulse_track(3.0);
        let analysis = analyze(&buffer, &AnalysisConfig::default()).unwrap();
        let json = serde_json::to_value(&analysis).unwrap();

        assert!(json["tempo"]["bpm"].is_number());
        assert!(json["energy"]["sub"].is_number());
        assert_eq!(json["waveform"].as_array().map(Vec::len), Some(800));
    }

    #[test]
    fn test_underrun_classification() {
        assert!(AnalysisError::NoTempoDetected.is_underrun());
        assert!(!AnalysisError::InvalidWindowSize(3).is_underrun());
    }
}
