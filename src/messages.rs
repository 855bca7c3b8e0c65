//! Message definitions for communication between the control side and the audio thread.
//!
//! This module defines the enums that serve as the wire format for messages passed through the
//! ring buffers between the control thread, the loader thread and the real-time audio thread,
//! together with the shared immutable [`AudioBuffer`] those messages carry.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::analysis::TrackAnalysis;
use crate::audio_engine::errors::EngineError;

/// One of the two independent playback lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Deck {
    Left,
    Right,
}

impl Deck {
    pub const ALL: [Deck; 2] = [Deck::Left, Deck::Right];

    pub fn index(self) -> usize {
        match self {
            Deck::Left => 0,
            Deck::Right => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Deck::Left => "left",
            Deck::Right => "right",
        }
    }
}

impl fmt::Display for Deck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable decoded audio, shared read-only by playback and the analyzers.
///
/// Samples are interleaved. Cloning is cheap: clones share the same allocation.
#[derive(Clone)]
pub struct AudioBuffer {
    channels: usize,
    sample_rate: u32,
    samples: Arc<[f32]>,
}

impl AudioBuffer {
    /// Wraps interleaved samples.
    ///
    /// Fails when `channels` or `sample_rate` is zero, or when the sample count is not a whole
    /// number of frames.
    pub fn new(channels: usize, sample_rate: u32, samples: Vec<f32>) -> Result<Self, EngineError> {
        if channels == 0 {
            return Err(EngineError::InvalidParameter(
                "audio buffer needs at least one channel".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(EngineError::InvalidParameter(
                "audio buffer sample rate must be positive".to_string(),
            ));
        }
        if samples.len() % channels != 0 {
            return Err(EngineError::InvalidParameter(format!(
                "{} samples do not divide into {channels} channels",
                samples.len()
            )));
        }

        Ok(Self {
            channels,
            sample_rate,
            samples: Arc::from(samples.into_boxed_slice()),
        })
    }

    /// Wraps decoder output. A trailing partial frame is dropped.
    pub(crate) fn from_decoded(channels: usize, sample_rate: u32, mut samples: Vec<f32>) -> Self {
        let channels = channels.max(1);
        samples.truncate(samples.len() - samples.len() % channels);
        Self {
            channels,
            sample_rate: sample_rate.max(1),
            samples: Arc::from(samples.into_boxed_slice()),
        }
    }

    pub fn from_mono(sample_rate: u32, samples: Vec<f32>) -> Result<Self, EngineError> {
        Self::new(1, sample_rate, samples)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved sample data.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Samples of a single channel, in time order.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        let channel = channel.min(self.channels - 1);
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels)
            .copied()
    }

    /// Average of all channels, one value per frame.
    pub fn mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.to_vec();
        }

        let scale = 1.0 / self.channels as f32;
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect()
    }

    /// Stereo view of one frame: mono is duplicated, extra channels are ignored.
    #[inline]
    pub fn stereo_frame(&self, frame: usize) -> (f32, f32) {
        let base = frame * self.channels;
        if self.channels == 1 {
            let s = self.samples[base];
            (s, s)
        } else {
            (self.samples[base], self.samples[base + 1])
        }
    }

    pub fn shares_data_with(&self, other: &AudioBuffer) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Loop region in buffer frames; `end_frame` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRegion {
    pub start_frame: u64,
    pub end_frame: u64,
}

/// Message that is emitted from the audio thread.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioMessage {
    /// Response to a Ping message.
    Pong(),

    /// The deck's voice reached the end of its buffer and playback stopped.
    ///
    /// `generation` is the one carried by the [`ControlMessage::PlayDeck`] that started the voice.
    DeckEnded { deck: Deck, generation: u64 },

    /// Every load/unload command up to and including `seq` has been applied, so the audio
    /// thread no longer references the buffers those commands displaced. Deck and pad loads
    /// share one sequence.
    Released { seq: u64 },
}

/// Message that is emitted from the control side.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Used for testing message passing functionality.
    Ping(),

    /// Attach a buffer to a deck, replacing (and stopping) whatever was there.
    ///
    /// # Parameters
    /// * `deck` - Target deck
    /// * `buffer` - Pre-decoded immutable buffer (shared handle)
    /// * `seq` - Sequence number acknowledged with [`AudioMessage::Released`]
    LoadDeck {
        deck: Deck,
        buffer: AudioBuffer,
        seq: u64,
    },

    /// Detach the deck's buffer and release its voice.
    UnloadDeck { deck: Deck, seq: u64 },

    /// Start a fresh voice on the deck's chain.
    ///
    /// `generation` increases with every play command of the deck and is echoed back in
    /// [`AudioMessage::DeckEnded`], so an end notice from an earlier voice can be told apart.
    PlayDeck { deck: Deck, generation: u64 },

    /// Stop the deck's voice immediately.
    StopDeck { deck: Deck },

    /// Move the playhead (or the cue point when stopped).
    SeekDeck { deck: Deck, frame: u64 },

    /// Set or clear the deck's loop region.
    SetLoop {
        deck: Deck,
        region: Option<LoopRegion>,
    },

    /// Stop both decks and every pad voice within the same block.
    StopAll(),

    /// Put a one-shot sample into a pad slot, cutting voices of the sample it replaces.
    ///
    /// # Parameters
    /// * `slot` - Pad slot across all banks
    /// * `buffer` - Pre-decoded immutable buffer (shared handle)
    /// * `seq` - Sequence number acknowledged with [`AudioMessage::Released`]
    LoadPad {
        slot: usize,
        buffer: AudioBuffer,
        seq: u64,
    },

    /// Start a one-shot voice from a pad slot.
    TriggerPad { slot: usize },
}

impl ControlMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ControlMessage::Ping() => "Ping",
            ControlMessage::LoadDeck { .. } => "LoadDeck",
            ControlMessage::UnloadDeck { .. } => "UnloadDeck",
            ControlMessage::PlayDeck { .. } => "PlayDeck",
            ControlMessage::StopDeck { .. } => "StopDeck",
            ControlMessage::SeekDeck { .. } => "SeekDeck",
            ControlMessage::SetLoop { .. } => "SetLoop",
            ControlMessage::StopAll() => "StopAll",
            ControlMessage::LoadPad { .. } => "LoadPad",
            ControlMessage::TriggerPad { .. } => "TriggerPad",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackgroundTaskKind {
    Decoding,
    Analysis,
}

/// Events emitted from background loading.
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    /// Loading started for the given deck.
    Started { deck: Deck },

    /// A progress update.
    ///
    /// - `percent` is the best-effort *total* progress across the full load pipeline (0.0..=1.0).
    /// - `stage` is a human-readable stage string (e.g. "Loading (decoding…)").
    Progress {
        deck: Deck,
        percent: f32,
        stage: String,
    },

    /// Loading and analysis completed. The engine attaches the buffer to the deck when this
    /// event is polled.
    Success {
        deck: Deck,
        duration_sec: f32,
        buffer: AudioBuffer,
        analysis: TrackAnalysis,
    },

    /// Loading failed.
    Error {
        deck: Deck,
        task: BackgroundTaskKind,
        error: String,
    },
}
