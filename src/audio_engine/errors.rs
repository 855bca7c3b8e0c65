//! Audio-specific error types.

use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::audio_engine::channel_strip::StripState;
use crate::messages::Deck;

/// Errors that can occur while loading audio files.
#[derive(Debug, Error)]
pub enum SampleLoadError {
    /// Failed to open the audio file.
    #[error("failed to open file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the audio file.
    #[error("failed to decode audio file: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// Failed to create resampler.
    #[error("failed to create resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Failed to resample audio.
    #[error("failed to resample audio: {0}")]
    Resample(#[from] rubato::ResampleError),

    /// Audio file has no default track.
    #[error("audio file has no default track")]
    NoDefaultTrack,

    /// Audio file is missing sample rate information.
    #[error("audio file is missing a sample rate")]
    MissingSampleRate,

    /// Audio file decoded to zero frames.
    #[error("audio file contains no samples")]
    Empty,

    /// Unsupported channel mapping configuration.
    #[error(
        "unsupported channel mapping: file has {file_channels} channels, output has {output_channels} channels (only mono↔stereo supported)"
    )]
    UnsupportedChannels {
        /// Number of channels in the source file.
        file_channels: usize,
        /// Number of channels expected for output.
        output_channels: usize,
    },
}

/// Errors surfaced by the engine's control API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or unsupported audio. Not retried.
    #[error("decode failure: {0}")]
    DecodeFailure(#[from] SampleLoadError),

    /// Analysis could not run on the given input.
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    /// Out-of-range control value; the call was rejected and nothing changed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unknown effect preset id; the chain was left untouched.
    #[error("unknown effect preset: {0}")]
    UnknownPreset(String),

    /// The command does not apply to the deck's current transport state.
    #[error("cannot {action} {deck} deck while {state}")]
    InvalidState {
        deck: Deck,
        action: &'static str,
        state: StripState,
    },

    /// No usable audio output device. Recoverable by calling `run` again later.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio engine not running")]
    NotRunning,

    #[error("audio engine already running")]
    AlreadyRunning,

    /// The control ring buffer is full; the command was dropped.
    #[error("control queue full, dropped {0}")]
    QueueFull(&'static str),
}
