//! Control-side deck state.
//!
//! A [`DeckSlot`] mirrors the transport state of its [`ChannelStrip`] and owns everything the
//! audio thread never needs: the loaded track's analysis, the effect chain view, hot cues. Every
//! transition validates first, then sends its command through a [`CommandSink`], and only
//! commits the new state once the command was accepted.
//!
//! [`ChannelStrip`]: crate::audio_engine::channel_strip::ChannelStrip

use std::collections::VecDeque;

use rtrb::Producer;

use crate::analysis::{DEFAULT_BPM, TrackAnalysis};
use crate::audio_engine::channel_strip::StripState;
use crate::audio_engine::constants::{LOOP_BEAT_OPTIONS, NUM_HOT_CUES};
use crate::audio_engine::effect_chain::{EffectChain, EffectNode, EffectPreset};
use crate::audio_engine::errors::EngineError;
use crate::audio_engine::params::StripHandle;
use crate::messages::{AudioBuffer, ControlMessage, Deck, LoopRegion};

/// Destination for structural commands bound for the audio thread.
pub trait CommandSink {
    fn send(&mut self, msg: ControlMessage) -> Result<(), EngineError>;
}

impl CommandSink for Producer<ControlMessage> {
    fn send(&mut self, msg: ControlMessage) -> Result<(), EngineError> {
        let name = msg.name();
        self.push(msg).map_err(|_| EngineError::QueueFull(name))
    }
}

impl CommandSink for Vec<ControlMessage> {
    fn send(&mut self, msg: ControlMessage) -> Result<(), EngineError> {
        self.push(msg);
        Ok(())
    }
}

/// Buffers displaced by load/unload, kept alive until the audio thread acknowledges the command
/// that displaced them. The last reference is therefore never dropped inside the callback.
#[derive(Debug, Default)]
pub struct ReleaseQueue {
    pending: VecDeque<(u64, AudioBuffer)>,
    next_seq: u64,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the sequence number for the next load/unload command.
    pub fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub fn hold(&mut self, seq: u64, buffer: AudioBuffer) {
        self.pending.push_back((seq, buffer));
    }

    /// Drops every buffer held for commands up to and including `seq`. Returns how many.
    pub fn release(&mut self, seq: u64) -> usize {
        let before = self.pending.len();
        self.pending.retain(|(held, _)| *held > seq);
        before - self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Control-side view of one deck.
pub struct DeckSlot {
    deck: Deck,
    state: StripState,
    buffer: Option<AudioBuffer>,
    analysis: Option<TrackAnalysis>,
    chain: EffectChain,
    strip: StripHandle,
    hot_cues: [Option<u64>; NUM_HOT_CUES],
    generation: u64,
}

impl DeckSlot {
    pub fn new(strip: StripHandle) -> Self {
        let slot = Self {
            deck: strip.deck(),
            state: StripState::Idle,
            buffer: None,
            analysis: None,
            chain: EffectChain::default(),
            strip,
            hot_cues: [None; NUM_HOT_CUES],
            generation: 0,
        };
        slot.publish_bypass();
        slot
    }

    pub fn deck(&self) -> Deck {
        self.deck
    }

    pub fn state(&self) -> StripState {
        self.state
    }

    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.buffer.as_ref()
    }

    pub fn analysis(&self) -> Option<&TrackAnalysis> {
        self.analysis.as_ref()
    }

    pub fn strip(&self) -> &StripHandle {
        &self.strip
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    /// Generation of the last play command sent.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn hot_cue(&self, index: usize) -> Option<u64> {
        self.hot_cues.get(index).copied().flatten()
    }

    fn invalid_state(&self, action: &'static str) -> EngineError {
        EngineError::InvalidState {
            deck: self.deck,
            action,
            state: self.state,
        }
    }

    /// Attaches a buffer, replacing (and stopping) whatever was loaded.
    ///
    /// Returns the displaced buffer, which must outlive the acknowledgement of `seq`.
    pub fn load(
        &mut self,
        buffer: AudioBuffer,
        analysis: TrackAnalysis,
        seq: u64,
        sink: &mut impl CommandSink,
    ) -> Result<Option<AudioBuffer>, EngineError> {
        sink.send(ControlMessage::LoadDeck {
            deck: self.deck,
            buffer: buffer.clone(),
            seq,
        })?;

        self.state = StripState::Loaded;
        self.analysis = Some(analysis);
        self.hot_cues = [None; NUM_HOT_CUES];
        Ok(self.buffer.replace(buffer))
    }

    /// Detaches the buffer. Returns it for the release queue; `None` when already idle.
    pub fn unload(
        &mut self,
        seq: u64,
        sink: &mut impl CommandSink,
    ) -> Result<Option<AudioBuffer>, EngineError> {
        if self.state == StripState::Idle {
            return Ok(None);
        }
        sink.send(ControlMessage::UnloadDeck {
            deck: self.deck,
            seq,
        })?;

        self.state = StripState::Idle;
        self.analysis = None;
        self.hot_cues = [None; NUM_HOT_CUES];
        Ok(self.buffer.take())
    }

    /// Starts playback at the cue. A no-op while already playing.
    pub fn play(&mut self, sink: &mut impl CommandSink) -> Result<(), EngineError> {
        match self.state {
            StripState::Idle => Err(self.invalid_state("play")),
            StripState::Playing => Ok(()),
            StripState::Loaded => {
                let generation = self.generation + 1;
                sink.send(ControlMessage::PlayDeck {
                    deck: self.deck,
                    generation,
                })?;
                self.generation = generation;
                self.state = StripState::Playing;
                Ok(())
            }
        }
    }

    /// Stops playback. A no-op while loaded but stopped.
    pub fn stop(&mut self, sink: &mut impl CommandSink) -> Result<(), EngineError> {
        match self.state {
            StripState::Idle => Err(self.invalid_state("stop")),
            StripState::Loaded => Ok(()),
            StripState::Playing => {
                sink.send(ControlMessage::StopDeck { deck: self.deck })?;
                self.state = StripState::Loaded;
                Ok(())
            }
        }
    }

    /// Forgets the loaded track without sending anything. Used once the stream is gone.
    pub(crate) fn reset(&mut self) -> Option<AudioBuffer> {
        self.state = StripState::Idle;
        self.analysis = None;
        self.hot_cues = [None; NUM_HOT_CUES];
        self.buffer.take()
    }

    /// The audio thread stopped the voice of play `generation` at the end of the buffer.
    ///
    /// Notices for any other generation are stale and ignored. Returns whether the state changed.
    pub fn mark_ended(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.mark_stopped()
    }

    /// Playing becomes Loaded without sending anything; the caller already sent the stop.
    pub(crate) fn mark_stopped(&mut self) -> bool {
        if self.state != StripState::Playing {
            return false;
        }
        self.state = StripState::Loaded;
        true
    }

    /// Replaces the analysis of the loaded track.
    pub fn set_analysis(&mut self, analysis: TrackAnalysis) -> Result<(), EngineError> {
        if self.state == StripState::Idle {
            return Err(self.invalid_state("analyze"));
        }
        self.analysis = Some(analysis);
        Ok(())
    }

    pub fn move_node(&mut self, from: usize, to: usize) -> Result<(), EngineError> {
        self.chain.move_node(from, to)?;
        self.publish_bypass();
        Ok(())
    }

    pub fn apply_preset(&mut self, id: &str) -> Result<EffectPreset, EngineError> {
        let preset = self.chain.apply_preset(id)?;
        self.publish_bypass();
        Ok(preset)
    }

    pub fn set_node_bypass(&mut self, node: EffectNode, bypassed: bool) -> Result<(), EngineError> {
        self.chain.set_bypass(node, bypassed)?;
        self.publish_bypass();
        Ok(())
    }

    fn publish_bypass(&self) {
        self.strip.params().store_bypass_mask(self.chain.bypass_mask());
    }

    /// Stores `frame` in hot cue slot `index`.
    pub fn set_hot_cue(&mut self, index: usize, frame: u64) -> Result<(), EngineError> {
        if self.state == StripState::Idle {
            return Err(self.invalid_state("set a hot cue on"));
        }
        let slot = self.hot_cues.get_mut(index).ok_or_else(|| {
            EngineError::InvalidParameter(format!(
                "hot cue index {index} out of range (expected 0..{NUM_HOT_CUES})"
            ))
        })?;
        *slot = Some(frame);
        Ok(())
    }

    /// Jumps to hot cue `index`. While stopped this moves the cue point.
    pub fn trigger_hot_cue(
        &mut self,
        index: usize,
        sink: &mut impl CommandSink,
    ) -> Result<u64, EngineError> {
        if self.state == StripState::Idle {
            return Err(self.invalid_state("trigger a hot cue on"));
        }
        let frame = self.hot_cue(index).ok_or_else(|| {
            EngineError::InvalidParameter(format!("hot cue {index} is not set"))
        })?;
        sink.send(ControlMessage::SeekDeck {
            deck: self.deck,
            frame,
        })?;
        Ok(frame)
    }

    /// Beat loop of `beats` beats starting at `start_frame`, or clears the loop for `None`.
    ///
    /// The beat length comes from the analyzed tempo, or the default tempo when none is known.
    pub fn set_loop(
        &mut self,
        beats: Option<u32>,
        start_frame: u64,
        sink: &mut impl CommandSink,
    ) -> Result<Option<LoopRegion>, EngineError> {
        let Some(buffer) = self.buffer.as_ref() else {
            return Err(self.invalid_state("loop"));
        };

        let region = match beats {
            None => None,
            Some(beats) => {
                if !LOOP_BEAT_OPTIONS.contains(&beats) {
                    return Err(EngineError::InvalidParameter(format!(
                        "loop length must be one of {LOOP_BEAT_OPTIONS:?} beats, got {beats}"
                    )));
                }
                let bpm = self
                    .analysis
                    .as_ref()
                    .map_or(DEFAULT_BPM, |analysis| analysis.tempo.bpm);
                Some(beat_loop(
                    beats,
                    bpm,
                    buffer.sample_rate(),
                    start_frame,
                    buffer.frames() as u64,
                ))
            }
        };

        sink.send(ControlMessage::SetLoop {
            deck: self.deck,
            region,
        })?;
        Ok(region)
    }
}

/// Loop region of `beats` beats at `bpm`, clipped to the track.
pub fn beat_loop(
    beats: u32,
    bpm: f32,
    sample_rate: u32,
    start_frame: u64,
    total_frames: u64,
) -> LoopRegion {
    let beat_frames = 60.0 / f64::from(bpm) * f64::from(sample_rate);
    let length = (f64::from(beats) * beat_frames).round() as u64;
    let start_frame = start_frame.min(total_frames);
    LoopRegion {
        start_frame,
        end_frame: start_frame.saturating_add(length).min(total_frames),
    }
}
