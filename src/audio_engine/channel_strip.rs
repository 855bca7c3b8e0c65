//! Real-time side of one deck: voice, EQ, filter, sends and master gain.
//!
//! A [`ChannelStrip`] is built once per deck when the session starts and lives inside the audio
//! callback until it ends. Structural changes (load, play, stop, seek) arrive as commands; live
//! parameters are read from the deck's [`StripParams`] slots once per block and ramped.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::audio_engine::constants::COEFF_UPDATE_FRAMES;
use crate::audio_engine::effect_chain::EffectNode;
use crate::audio_engine::effects::{EchoDelay, Flanger, Phaser, Reverb};
use crate::audio_engine::eq3::{DeckEq, ResonantFilter};
use crate::audio_engine::params::{EqBand, SendEffect, StripParams};
use crate::audio_engine::ramp::ParamRamp;
use crate::audio_engine::voice::Voice;
use crate::messages::{AudioBuffer, Deck, LoopRegion};

/// Transport state of a deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StripState {
    /// No buffer attached.
    Idle,
    /// Buffer attached, not playing.
    Loaded,
    /// A voice is routed through the chain.
    Playing,
}

impl fmt::Display for StripState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StripState::Idle => "idle",
            StripState::Loaded => "loaded",
            StripState::Playing => "playing",
        })
    }
}

pub struct ChannelStrip {
    deck: Deck,
    params: Arc<StripParams>,
    sample_rate: f32,

    buffer: Option<AudioBuffer>,
    voice: Option<Voice>,
    generation: u64,
    cue_frame: usize,
    loop_region: Option<LoopRegion>,

    eq: DeckEq,
    filter: ResonantFilter,
    delay: EchoDelay,
    reverb: Reverb,
    flanger: Flanger,
    phaser: Phaser,

    eq_ramps: [ParamRamp; 3],
    cutoff_ramp: ParamRamp,
    send_ramps: [ParamRamp; 4],
    gain_ramp: ParamRamp,
    coeff_countdown: usize,
    coeffs_pending: bool,
}

impl ChannelStrip {
    /// Builds the strip and all of its delay lines. Allocates; call off the audio thread.
    pub fn new(deck: Deck, params: Arc<StripParams>, sample_rate: f32, ramp_frames: usize) -> Self {
        let eq_ramps = EqBand::ALL.map(|band| ParamRamp::new(params.eq_db(band), ramp_frames));
        let cutoff_ramp = ParamRamp::new(params.cutoff_hz(), ramp_frames);
        let send_ramps =
            SendEffect::ALL.map(|send| ParamRamp::new(params.send_level(send), ramp_frames));
        let gain_ramp = ParamRamp::new(params.gain(), ramp_frames);

        let mut strip = Self {
            deck,
            params,
            sample_rate,
            buffer: None,
            voice: None,
            generation: 0,
            cue_frame: 0,
            loop_region: None,
            eq: DeckEq::new(),
            filter: ResonantFilter::new(),
            delay: EchoDelay::new(sample_rate),
            reverb: Reverb::new(sample_rate),
            flanger: Flanger::new(sample_rate),
            phaser: Phaser::new(sample_rate),
            eq_ramps,
            cutoff_ramp,
            send_ramps,
            gain_ramp,
            coeff_countdown: 0,
            coeffs_pending: false,
        };
        strip.refresh_coefficients();
        strip
    }

    pub fn deck(&self) -> Deck {
        self.deck
    }

    /// Generation of the most recent play command.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> StripState {
        match (&self.buffer, &self.voice) {
            (None, _) => StripState::Idle,
            (Some(_), None) => StripState::Loaded,
            (Some(_), Some(_)) => StripState::Playing,
        }
    }

    /// Attaches a buffer, stopping any current playback. The cue returns to the start.
    pub fn load(&mut self, buffer: AudioBuffer) {
        self.stop();
        self.buffer = Some(buffer);
        self.cue_frame = 0;
        self.loop_region = None;
        self.params.publish_playhead(0);
    }

    pub fn unload(&mut self) {
        self.stop();
        self.buffer = None;
        self.cue_frame = 0;
        self.loop_region = None;
        self.params.publish_playhead(0);
    }

    /// Starts a fresh voice at the cue point. Returns `false` when nothing is loaded.
    ///
    /// Playing while already playing keeps the running voice but adopts `generation`.
    pub fn play(&mut self, generation: u64) -> bool {
        let Some(buffer) = self.buffer.as_ref() else {
            return false;
        };
        self.generation = generation;
        if self.voice.is_some() {
            return true;
        }

        let mut voice = Voice::new(self.cue_frame);
        voice.set_loop(self.loop_region, buffer.frames());
        self.voice = Some(voice);

        self.snap_ramps();
        self.refresh_coefficients();
        true
    }

    /// Drops the voice and clears every effect tail, so the next block is silent.
    pub fn stop(&mut self) {
        self.voice = None;
        self.eq.reset();
        self.filter.reset();
        self.delay.reset();
        self.reverb.reset();
        self.flanger.reset();
        self.phaser.reset();
        self.params.publish_peak(0.0);
        self.params.publish_playhead(self.cue_frame as u64);
    }

    /// Moves the playhead while playing; always moves the cue point.
    pub fn seek(&mut self, frame: u64) {
        let Some(buffer) = self.buffer.as_ref() else {
            return;
        };
        let frame = usize::try_from(frame)
            .unwrap_or(usize::MAX)
            .min(buffer.frames().saturating_sub(1));

        self.cue_frame = frame;
        if let Some(voice) = self.voice.as_mut() {
            voice.frame_pos = frame;
        }
        self.params.publish_playhead(frame as u64);
    }

    pub fn set_loop(&mut self, region: Option<LoopRegion>) {
        self.loop_region = region;
        if let (Some(voice), Some(buffer)) = (self.voice.as_mut(), self.buffer.as_ref()) {
            voice.set_loop(region, buffer.frames());
        }
    }

    /// Current read position, or the cue point when stopped.
    pub fn playhead(&self) -> usize {
        self.voice
            .as_ref()
            .map_or(self.cue_frame, |voice| voice.frame_pos)
    }

    fn snap_ramps(&mut self) {
        for (ramp, band) in self.eq_ramps.iter_mut().zip(EqBand::ALL) {
            ramp.snap(self.params.eq_db(band));
        }
        self.cutoff_ramp.snap(self.params.cutoff_hz());
        for (ramp, send) in self.send_ramps.iter_mut().zip(SendEffect::ALL) {
            ramp.snap(self.params.send_level(send));
        }
        self.gain_ramp.snap(self.params.gain());
    }

    fn read_targets(&mut self) {
        for (ramp, band) in self.eq_ramps.iter_mut().zip(EqBand::ALL) {
            ramp.set_target(self.params.eq_db(band));
        }
        self.cutoff_ramp.set_target(self.params.cutoff_hz());
        for (ramp, send) in self.send_ramps.iter_mut().zip(SendEffect::ALL) {
            ramp.set_target(self.params.send_level(send));
        }
        self.gain_ramp.set_target(self.params.gain());
    }

    fn refresh_coefficients(&mut self) {
        let gains = [
            self.eq_ramps[0].value(),
            self.eq_ramps[1].value(),
            self.eq_ramps[2].value(),
        ];
        self.eq.update(self.sample_rate, gains);
        self.filter.update(self.sample_rate, self.cutoff_ramp.value());
    }

    fn coefficients_ramping(&self) -> bool {
        self.cutoff_ramp.is_ramping() || self.eq_ramps.iter().any(ParamRamp::is_ramping)
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32, bypass_mask: u32) -> (f32, f32) {
        if self.coeff_countdown == 0 {
            // One refresh after a ramp finishes lands the final target.
            let ramping = self.coefficients_ramping();
            if ramping || self.coeffs_pending {
                self.refresh_coefficients();
            }
            self.coeffs_pending = ramping;
            self.coeff_countdown = COEFF_UPDATE_FRAMES;
        }
        self.coeff_countdown -= 1;

        for ramp in &mut self.eq_ramps {
            ramp.next_value();
        }
        self.cutoff_ramp.next_value();

        let (mut l, mut r) = (left, right);
        if bypass_mask & EffectNode::Eq.bit() == 0 {
            (l, r) = self.eq.process(l, r);
        }
        if bypass_mask & EffectNode::Filter.bit() == 0 {
            (l, r) = self.filter.process(l, r);
        }

        let sends = [
            self.send_ramps[0].next_value(),
            self.send_ramps[1].next_value(),
            self.send_ramps[2].next_value(),
            self.send_ramps[3].next_value(),
        ];

        let (mut out_l, mut out_r) = (l, r);
        for send in SendEffect::ALL {
            if bypass_mask & send.node().bit() != 0 {
                continue;
            }
            let level = sends[send.index()];
            let (in_l, in_r) = (l * level, r * level);
            let (wet_l, wet_r) = match send {
                SendEffect::Delay => self.delay.process(in_l, in_r),
                SendEffect::Reverb => self.reverb.process(in_l, in_r),
                SendEffect::Flanger => self.flanger.process(in_l, in_r),
                SendEffect::Phaser => self.phaser.process(in_l, in_r),
            };
            out_l += wet_l;
            out_r += wet_r;
        }

        let gain = self.gain_ramp.next_value();
        (out_l * gain, out_r * gain)
    }

    /// Renders one block into `out_l`/`out_r` (overwritten, equal lengths).
    ///
    /// Returns `true` when the voice ran off the end of the buffer during this block; the strip
    /// is then back in the loaded state with the cue at the start.
    pub fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]) -> bool {
        out_l.fill(0.0);
        out_r.fill(0.0);

        if self.voice.is_none() || self.buffer.is_none() {
            self.params.publish_peak(0.0);
            return false;
        }
        let (Some(mut voice), Some(buffer)) = (self.voice.take(), self.buffer.take()) else {
            return false;
        };

        self.read_targets();
        self.coeff_countdown = 0;
        let bypass_mask = self.params.bypass_mask();

        let mut ended = false;
        let mut peak = 0.0f32;
        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            let Some((in_l, in_r)) = voice.next_frame(&buffer) else {
                ended = true;
                break;
            };
            (*l, *r) = self.process_frame(in_l, in_r, bypass_mask);
            peak = peak.max(l.abs()).max(r.abs());
        }

        self.buffer = Some(buffer);
        if ended {
            self.cue_frame = 0;
            self.stop();
        } else {
            self.params.publish_playhead(voice.frame_pos as u64);
            self.voice = Some(voice);
            self.params.publish_peak(peak);
        }

        ended
    }
}
