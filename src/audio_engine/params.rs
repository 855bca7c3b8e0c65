//! Lock-free parameter slots shared between the control side and the audio callback.
//!
//! Every live parameter is a single `f32` stored as bits in an `AtomicU32`. Writers store the
//! latest value; the callback loads each slot once per block. There is no queue, so a burst of
//! slider moves collapses to the last value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::audio_engine::constants::{
    CONTROL_MAX, CONTROL_MIN, EQ_RANGE_DB, FILTER_CURVE_EXPONENT, FILTER_MAX_HZ, FILTER_MIN_HZ,
};
use crate::audio_engine::effect_chain::EffectNode;
use crate::audio_engine::errors::EngineError;
use crate::messages::Deck;

/// Single `f32` value readable and writable from any thread without locking.
#[derive(Debug)]
pub struct AtomicParam(AtomicU32);

impl AtomicParam {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// The three EQ stages of a channel strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    pub const ALL: [EqBand; 3] = [EqBand::Low, EqBand::Mid, EqBand::High];

    pub fn index(self) -> usize {
        match self {
            EqBand::Low => 0,
            EqBand::Mid => 1,
            EqBand::High => 2,
        }
    }
}

/// The four parallel effect sends of a channel strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendEffect {
    Delay,
    Reverb,
    Flanger,
    Phaser,
}

impl SendEffect {
    pub const ALL: [SendEffect; 4] = [
        SendEffect::Delay,
        SendEffect::Reverb,
        SendEffect::Flanger,
        SendEffect::Phaser,
    ];

    pub fn index(self) -> usize {
        match self {
            SendEffect::Delay => 0,
            SendEffect::Reverb => 1,
            SendEffect::Flanger => 2,
            SendEffect::Phaser => 3,
        }
    }

    /// Chain node that renders this send.
    pub fn node(self) -> EffectNode {
        match self {
            SendEffect::Delay => EffectNode::Delay,
            SendEffect::Reverb => EffectNode::Reverb,
            SendEffect::Flanger => EffectNode::Flanger,
            SendEffect::Phaser => EffectNode::Phaser,
        }
    }
}

/// Rejects NaN and values outside the normalized control range.
pub fn validate_control(name: &str, value: f32) -> Result<f32, EngineError> {
    if !value.is_finite() || !(CONTROL_MIN..=CONTROL_MAX).contains(&value) {
        return Err(EngineError::InvalidParameter(format!(
            "{name} out of range (expected {CONTROL_MIN}..={CONTROL_MAX}, got {value})"
        )));
    }

    Ok(value)
}

/// Control value → filter cutoff: `min + (max − min) · (v/100)^4`.
pub fn control_to_cutoff_hz(value: f32) -> f32 {
    let normalized = (value / CONTROL_MAX).clamp(0.0, 1.0);
    FILTER_MIN_HZ + (FILTER_MAX_HZ - FILTER_MIN_HZ) * normalized.powi(FILTER_CURVE_EXPONENT)
}

/// Control value → EQ gain: 0 → −40 dB, 50 → 0 dB, 100 → +40 dB.
pub fn control_to_eq_db(value: f32) -> f32 {
    (value - 50.0) / 50.0 * EQ_RANGE_DB
}

/// Control value → linear level in [0, 1].
pub fn control_to_level(value: f32) -> f32 {
    (value / CONTROL_MAX).clamp(0.0, 1.0)
}

/// Live parameters of one channel strip plus the meters the callback publishes back.
#[derive(Debug)]
pub struct StripParams {
    eq_db: [AtomicParam; 3],
    cutoff_hz: AtomicParam,
    sends: [AtomicParam; 4],
    gain: AtomicParam,
    bypass_mask: AtomicU32,
    playhead_frame: AtomicU64,
    peak: AtomicParam,
}

impl Default for StripParams {
    fn default() -> Self {
        Self {
            eq_db: std::array::from_fn(|_| AtomicParam::new(0.0)),
            cutoff_hz: AtomicParam::new(FILTER_MAX_HZ),
            sends: std::array::from_fn(|_| AtomicParam::new(0.0)),
            gain: AtomicParam::new(1.0),
            bypass_mask: AtomicU32::new(0),
            playhead_frame: AtomicU64::new(0),
            peak: AtomicParam::new(0.0),
        }
    }
}

impl StripParams {
    #[inline]
    pub fn eq_db(&self, band: EqBand) -> f32 {
        self.eq_db[band.index()].load()
    }

    #[inline]
    pub fn cutoff_hz(&self) -> f32 {
        self.cutoff_hz.load()
    }

    #[inline]
    pub fn send_level(&self, send: SendEffect) -> f32 {
        self.sends[send.index()].load()
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain.load()
    }

    #[inline]
    pub fn bypass_mask(&self) -> u32 {
        self.bypass_mask.load(Ordering::Relaxed)
    }

    pub(crate) fn store_bypass_mask(&self, mask: u32) {
        self.bypass_mask.store(mask, Ordering::Relaxed);
    }

    pub fn playhead_frame(&self) -> u64 {
        self.playhead_frame.load(Ordering::Relaxed)
    }

    pub(crate) fn publish_playhead(&self, frame: u64) {
        self.playhead_frame.store(frame, Ordering::Relaxed);
    }

    pub fn peak(&self) -> f32 {
        self.peak.load()
    }

    pub(crate) fn publish_peak(&self, peak: f32) {
        self.peak.store(peak);
    }
}

/// Cloneable control handle for one deck's channel strip.
///
/// Setters take normalized `0..=100` control values and may be called from any thread in any
/// transport state; they only write the strip's parameter slots.
#[derive(Debug, Clone)]
pub struct StripHandle {
    deck: Deck,
    params: Arc<StripParams>,
}

impl StripHandle {
    pub(crate) fn new(deck: Deck, params: Arc<StripParams>) -> Self {
        Self { deck, params }
    }

    pub fn deck(&self) -> Deck {
        self.deck
    }

    pub fn set_eq(&self, band: EqBand, value: f32) -> Result<(), EngineError> {
        let value = validate_control("eq", value)?;
        self.params.eq_db[band.index()].store(control_to_eq_db(value));
        Ok(())
    }

    pub fn set_filter(&self, value: f32) -> Result<(), EngineError> {
        let value = validate_control("filter", value)?;
        self.params.cutoff_hz.store(control_to_cutoff_hz(value));
        Ok(())
    }

    pub fn set_send(&self, send: SendEffect, value: f32) -> Result<(), EngineError> {
        let value = validate_control("send level", value)?;
        self.params.sends[send.index()].store(control_to_level(value));
        Ok(())
    }

    pub fn set_gain(&self, value: f32) -> Result<(), EngineError> {
        let value = validate_control("gain", value)?;
        self.params.gain.store(control_to_level(value));
        Ok(())
    }

    pub fn params(&self) -> &StripParams {
        &self.params
    }
}

/// Crossfader and deck volumes as read by the callback, plus the audio clock and the count of
/// events it could not deliver.
#[derive(Debug)]
pub struct MixerParams {
    crossfader: AtomicParam,
    volumes: [AtomicParam; 2],
    clock_frames: AtomicU64,
    dropped_events: AtomicU64,
}

impl MixerParams {
    pub fn new(crossfader: f32, volumes: [f32; 2]) -> Self {
        Self {
            crossfader: AtomicParam::new(crossfader),
            volumes: volumes.map(AtomicParam::new),
            clock_frames: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn crossfader(&self) -> f32 {
        self.crossfader.load()
    }

    pub(crate) fn store_crossfader(&self, value: f32) {
        self.crossfader.store(value);
    }

    #[inline]
    pub fn volume(&self, deck: Deck) -> f32 {
        self.volumes[deck.index()].load()
    }

    pub(crate) fn store_volume(&self, deck: Deck, value: f32) {
        self.volumes[deck.index()].store(value);
    }

    /// Frames rendered since the stream started.
    pub fn clock_frames(&self) -> u64 {
        self.clock_frames.load(Ordering::Relaxed)
    }

    pub(crate) fn publish_clock(&self, frames: u64) {
        self.clock_frames.store(frames, Ordering::Relaxed);
    }

    /// Audio-thread events lost to a full event ring since the mixer was created.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub(crate) fn add_dropped_events(&self, count: u64) {
        self.dropped_events.fetch_add(count, Ordering::Relaxed);
    }
}
