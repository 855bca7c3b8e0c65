//! Two-deck DJ mixing engine.
//!
//! [`AudioEngine`] owns the output stream and both decks. Tracks are decoded with symphonia,
//! resampled to the device rate and analyzed for tempo, key, energy and waveform before they are
//! attached. The real-time callback only reads lock-free parameters and drains a command ring.

pub mod analysis;
pub mod audio_engine;
pub mod messages;
pub mod visualization;

pub use analysis::{AnalysisConfig, AnalysisError, TrackAnalysis, analyze};
pub use audio_engine::AudioEngine;
pub use audio_engine::audio_stream::setup_logger;
pub use audio_engine::channel_strip::StripState;
pub use audio_engine::config::EngineConfig;
pub use audio_engine::effect_chain::{EffectChain, EffectNode, EffectPreset};
pub use audio_engine::errors::{EngineError, SampleLoadError};
pub use audio_engine::mixer::MixerState;
pub use audio_engine::params::{EqBand, SendEffect, StripHandle};
pub use audio_engine::sample_loader::decode_audio_file;
pub use audio_engine::sample_pads::SampleBank;
pub use messages::{AudioBuffer, AudioMessage, Deck, LoaderEvent, LoopRegion};
pub use visualization::{RefreshLoop, SpectrumMonitor};
