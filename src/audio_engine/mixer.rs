//! Crossfader/volume law and the real-time master mix.
//!
//! [`MixerState`] is the control-side view (validated control values and the derived gain
//! coefficients). [`Mixer`] pairs it with the lock-free [`MixerParams`] slots the callback reads.
//! [`RtMixer`] owns both [`ChannelStrip`]s and the [`PadPlayer`] inside the audio callback,
//! applies structural commands and renders the master output. Pad voices join the master after
//! the crossfader.

use std::sync::Arc;

use cpal::Sample;
use rtrb::Producer;
use serde::Serialize;

use crate::audio_engine::channel_strip::ChannelStrip;
use crate::audio_engine::constants::{
    CONTROL_MAX, DEFAULT_CROSSFADER, DEFAULT_VOLUME, MAX_BLOCK_FRAMES,
};
use crate::audio_engine::errors::EngineError;
use crate::audio_engine::params::{MixerParams, validate_control};
use crate::audio_engine::ramp::ParamRamp;
use crate::audio_engine::sample_pads::PadPlayer;
use crate::messages::{AudioMessage, ControlMessage, Deck};

/// Linear crossfade law: `((100 − x)/100, x/100)`.
pub fn crossfade_coefficients(crossfader: f32) -> (f32, f32) {
    let x = crossfader.clamp(0.0, CONTROL_MAX);
    ((CONTROL_MAX - x) / CONTROL_MAX, x / CONTROL_MAX)
}

/// Effective deck gain for a crossfader position and deck volumes.
pub fn deck_gains(crossfader: f32, volumes: [f32; 2]) -> [f32; 2] {
    let (left, right) = crossfade_coefficients(crossfader);
    [
        left * (volumes[0].clamp(0.0, CONTROL_MAX) / CONTROL_MAX),
        right * (volumes[1].clamp(0.0, CONTROL_MAX) / CONTROL_MAX),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MixerState {
    crossfader: f32,
    left_volume: f32,
    right_volume: f32,
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            crossfader: DEFAULT_CROSSFADER,
            left_volume: DEFAULT_VOLUME,
            right_volume: DEFAULT_VOLUME,
        }
    }
}

impl MixerState {
    pub fn crossfader(&self) -> f32 {
        self.crossfader
    }

    pub fn volume(&self, deck: Deck) -> f32 {
        match deck {
            Deck::Left => self.left_volume,
            Deck::Right => self.right_volume,
        }
    }

    pub fn set_crossfader(&mut self, value: f32) -> Result<(), EngineError> {
        self.crossfader = validate_control("crossfader", value)?;
        Ok(())
    }

    pub fn set_volume(&mut self, deck: Deck, value: f32) -> Result<(), EngineError> {
        let value = validate_control("volume", value)?;
        match deck {
            Deck::Left => self.left_volume = value,
            Deck::Right => self.right_volume = value,
        }
        Ok(())
    }

    /// `(left, right)` crossfade coefficients.
    pub fn coefficients(&self) -> (f32, f32) {
        crossfade_coefficients(self.crossfader)
    }

    /// Crossfade coefficient times deck volume.
    pub fn deck_gain(&self, deck: Deck) -> f32 {
        deck_gains(self.crossfader, [self.left_volume, self.right_volume])[deck.index()]
    }
}

/// Control-side mixer: validated state mirrored into the callback's parameter slots.
#[derive(Debug)]
pub struct Mixer {
    state: MixerState,
    params: Arc<MixerParams>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(MixerState::default())
    }
}

impl Mixer {
    pub fn new(state: MixerState) -> Self {
        let params = Arc::new(MixerParams::new(
            state.crossfader,
            [state.left_volume, state.right_volume],
        ));
        Self { state, params }
    }

    pub fn state(&self) -> MixerState {
        self.state
    }

    pub fn params(&self) -> Arc<MixerParams> {
        Arc::clone(&self.params)
    }

    pub fn set_crossfader(&mut self, value: f32) -> Result<(), EngineError> {
        self.state.set_crossfader(value)?;
        self.params.store_crossfader(self.state.crossfader);
        Ok(())
    }

    pub fn set_volume(&mut self, deck: Deck, value: f32) -> Result<(), EngineError> {
        self.state.set_volume(deck, value)?;
        self.params.store_volume(deck, self.state.volume(deck));
        Ok(())
    }
}

/// Real-time master mixer.
///
/// Owns both channel strips and the pads. All scratch memory is allocated in [`RtMixer::new`];
/// neither
/// [`RtMixer::apply`] nor [`RtMixer::render`] allocates.
pub struct RtMixer {
    /// Number of output channels.
    channels: usize,

    strips: [ChannelStrip; 2],
    params: Arc<MixerParams>,
    deck_gains: [ParamRamp; 2],

    scratch_l: [Vec<f32>; 2],
    scratch_r: [Vec<f32>; 2],

    pads: PadPlayer,
    pad_l: Vec<f32>,
    pad_r: Vec<f32>,

    /// Frames rendered since the stream started.
    clock_frames: u64,

    /// Mono copy of the master output for the spectrum monitor.
    spectrum_tap: Option<Producer<f32>>,
}

impl RtMixer {
    pub fn new(
        channels: usize,
        strips: [ChannelStrip; 2],
        params: Arc<MixerParams>,
        ramp_frames: usize,
        spectrum_tap: Option<Producer<f32>>,
    ) -> Self {
        let gains = deck_gains(
            params.crossfader(),
            [params.volume(Deck::Left), params.volume(Deck::Right)],
        );

        Self {
            channels,
            strips,
            params,
            deck_gains: gains.map(|gain| ParamRamp::new(gain, ramp_frames)),
            scratch_l: std::array::from_fn(|_| vec![0.0; MAX_BLOCK_FRAMES]),
            scratch_r: std::array::from_fn(|_| vec![0.0; MAX_BLOCK_FRAMES]),
            pads: PadPlayer::new(),
            pad_l: vec![0.0; MAX_BLOCK_FRAMES],
            pad_r: vec![0.0; MAX_BLOCK_FRAMES],
            clock_frames: 0,
            spectrum_tap,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn strip(&self, deck: Deck) -> &ChannelStrip {
        &self.strips[deck.index()]
    }

    pub fn clock_frames(&self) -> u64 {
        self.clock_frames
    }

    pub fn pads(&self) -> &PadPlayer {
        &self.pads
    }

    pub fn params(&self) -> &MixerParams {
        &self.params
    }

    /// Applies one structural command, returning the reply to send back, if any.
    pub fn apply(&mut self, msg: ControlMessage) -> Option<AudioMessage> {
        match msg {
            ControlMessage::Ping() => Some(AudioMessage::Pong()),
            ControlMessage::LoadDeck { deck, buffer, seq } => {
                self.strips[deck.index()].load(buffer);
                Some(AudioMessage::Released { seq })
            }
            ControlMessage::UnloadDeck { deck, seq } => {
                self.strips[deck.index()].unload();
                Some(AudioMessage::Released { seq })
            }
            ControlMessage::PlayDeck { deck, generation } => {
                self.strips[deck.index()].play(generation);
                None
            }
            ControlMessage::StopDeck { deck } => {
                self.strips[deck.index()].stop();
                None
            }
            ControlMessage::SeekDeck { deck, frame } => {
                self.strips[deck.index()].seek(frame);
                None
            }
            ControlMessage::SetLoop { deck, region } => {
                self.strips[deck.index()].set_loop(region);
                None
            }
            ControlMessage::StopAll() => {
                for strip in &mut self.strips {
                    strip.stop();
                }
                self.pads.stop_all();
                None
            }
            ControlMessage::LoadPad { slot, buffer, seq } => {
                self.pads.load(slot, buffer);
                Some(AudioMessage::Released { seq })
            }
            ControlMessage::TriggerPad { slot } => {
                self.pads.trigger(slot);
                None
            }
        }
    }

    /// Renders interleaved audio into `output`.
    ///
    /// Mono outputs get the average of left and right; outputs with more than two channels get
    /// the mix on the first two and silence on the rest. A block containing a non-finite sample
    /// is replaced by silence. `on_event` receives [`AudioMessage::DeckEnded`] notifications.
    pub fn render(&mut self, output: &mut [f32], mut on_event: impl FnMut(AudioMessage)) {
        output.fill(Sample::EQUILIBRIUM);

        if self.channels == 0 {
            return;
        }

        let channels = self.channels;
        for chunk in output.chunks_mut(MAX_BLOCK_FRAMES * channels) {
            let frames = chunk.len() / channels;
            if frames == 0 {
                break;
            }

            let targets = deck_gains(
                self.params.crossfader(),
                [
                    self.params.volume(Deck::Left),
                    self.params.volume(Deck::Right),
                ],
            );
            for (ramp, target) in self.deck_gains.iter_mut().zip(targets) {
                ramp.set_target(target);
            }

            for (index, strip) in self.strips.iter_mut().enumerate() {
                let ended = strip.render(
                    &mut self.scratch_l[index][..frames],
                    &mut self.scratch_r[index][..frames],
                );
                if ended {
                    on_event(AudioMessage::DeckEnded {
                        deck: strip.deck(),
                        generation: strip.generation(),
                    });
                }
            }

            self.pad_l[..frames].fill(0.0);
            self.pad_r[..frames].fill(0.0);
            self.pads
                .render_add(&mut self.pad_l[..frames], &mut self.pad_r[..frames]);

            let mut finite = true;
            for frame in 0..frames {
                let left_gain = self.deck_gains[0].next_value();
                let right_gain = self.deck_gains[1].next_value();

                let l = self.scratch_l[0][frame] * left_gain
                    + self.scratch_l[1][frame] * right_gain
                    + self.pad_l[frame];
                let r = self.scratch_r[0][frame] * left_gain
                    + self.scratch_r[1][frame] * right_gain
                    + self.pad_r[frame];
                finite &= l.is_finite() && r.is_finite();

                let base = frame * channels;
                if channels == 1 {
                    chunk[base] = (l + r) * 0.5;
                } else {
                    chunk[base] = l;
                    chunk[base + 1] = r;
                }
            }

            if !finite {
                chunk.fill(Sample::EQUILIBRIUM);
            }

            if let Some(tap) = self.spectrum_tap.as_mut() {
                for frame in chunk.chunks_exact(channels) {
                    let mono = if channels == 1 {
                        frame[0]
                    } else {
                        (frame[0] + frame[1]) * 0.5
                    };
                    // Full ring: the monitor is behind, drop the rest of the block.
                    if tap.push(mono).is_err() {
                        break;
                    }
                }
            }

            self.clock_frames += frames as u64;
        }

        self.params.publish_clock(self.clock_frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::channel_strip::StripState;
    use crate::audio_engine::params::StripParams;
    use crate::messages::AudioBuffer;

    const FS: f32 = 48_000.0;

    fn rt_mixer(channels: usize, state: MixerState) -> (RtMixer, Mixer) {
        let mixer = Mixer::new(state);
        let strips = Deck::ALL
            .map(|deck| ChannelStrip::new(deck, Arc::new(StripParams::default()), FS, 480));
        (RtMixer::new(channels, strips, mixer.params(), 480, None), mixer)
    }

    fn constant(value: f32, frames: usize) -> AudioBuffer {
        AudioBuffer::new(2, FS as u32, vec![value; frames * 2]).unwrap()
    }

    fn load_and_play(rt: &mut RtMixer, deck: Deck, buffer: AudioBuffer, seq: u64) {
        assert_eq!(
            rt.apply(ControlMessage::LoadDeck { deck, buffer, seq }),
            Some(AudioMessage::Released { seq })
        );
        assert_eq!(
            rt.apply(ControlMessage::PlayDeck {
                deck,
                generation: seq
            }),
            None
        );
    }

    #[test]
    fn test_crossfader_law() {
        assert_eq!(crossfade_coefficients(0.0), (1.0, 0.0));
        assert_eq!(crossfade_coefficients(100.0), (0.0, 1.0));
        assert_eq!(crossfade_coefficients(50.0), (0.5, 0.5));
    }

    #[test]
    fn test_mixer_state_defaults_and_gains() {
        let mut state = MixerState::default();
        assert_eq!(state.crossfader(), 50.0);
        assert_eq!(state.volume(Deck::Left), 75.0);
        assert!((state.deck_gain(Deck::Left) - 0.375).abs() < 1e-6);

        state.set_crossfader(0.0).unwrap();
        state.set_volume(Deck::Left, 100.0).unwrap();
        assert_eq!(state.deck_gain(Deck::Left), 1.0);
        assert_eq!(state.deck_gain(Deck::Right), 0.0);
    }

    #[test]
    fn test_invalid_values_rejected_unchanged() {
        let mut mixer = Mixer::default();
        assert!(mixer.set_crossfader(101.0).is_err());
        assert!(mixer.set_volume(Deck::Right, f32::NAN).is_err());
        assert_eq!(mixer.state(), MixerState::default());
        assert_eq!(mixer.params().crossfader(), DEFAULT_CROSSFADER);
    }

    #[test]
    fn test_ping_pong() {
        let (mut rt, _) = rt_mixer(2, MixerState::default());
        assert_eq!(rt.apply(ControlMessage::Ping()), Some(AudioMessage::Pong()));
    }

    #[test]
    fn test_render_silence() {
        let (mut rt, _) = rt_mixer(2, MixerState::default());
        let mut output = vec![1.0; 200];
        rt.render(&mut output, |_| {});
        assert!(output.iter().all(|&s| s == 0.0));
        assert_eq!(rt.clock_frames(), 100);
    }

    #[test]
    fn test_hard_left_crossfader_mutes_right_deck() {
        let mut state = MixerState::default();
        state.set_crossfader(0.0).unwrap();
        state.set_volume(Deck::Left, 100.0).unwrap();
        let (mut rt, _) = rt_mixer(2, state);

        load_and_play(&mut rt, Deck::Right, constant(0.5, 48_000), 1);
        let mut output = vec![0.0; 2_048];
        rt.render(&mut output, |_| {});
        assert!(output.iter().all(|&s| s == 0.0));

        load_and_play(&mut rt, Deck::Left, constant(0.5, 48_000), 2);
        let mut output = vec![0.0; 9_600];
        rt.render(&mut output, |_| {});
        assert!((output[9_598] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_crossfader_change_is_ramped() {
        let mut state = MixerState::default();
        state.set_crossfader(0.0).unwrap();
        state.set_volume(Deck::Left, 100.0).unwrap();
        let (mut rt, mut mixer) = rt_mixer(1, state);
        load_and_play(&mut rt, Deck::Left, constant(0.5, 48_000), 1);

        let mut output = vec![0.0; 4_800];
        rt.render(&mut output, |_| {});

        mixer.set_crossfader(100.0).unwrap();
        let mut output = vec![0.0; 480];
        rt.render(&mut output, |_| {});
        assert!(output[0] > 0.49);
        assert!(output[240] > 0.2 && output[240] < 0.3);
        assert!(output[479].abs() < 1e-3);
    }

    #[test]
    fn test_mono_output_averages() {
        let mut state = MixerState::default();
        state.set_crossfader(0.0).unwrap();
        state.set_volume(Deck::Left, 100.0).unwrap();
        let (mut rt, _) = rt_mixer(1, state);

        let buffer = AudioBuffer::new(2, FS as u32, [0.8, 0.0].repeat(48_000)).unwrap();
        load_and_play(&mut rt, Deck::Left, buffer, 1);

        let mut output = vec![0.0; 4_800];
        rt.render(&mut output, |_| {});
        assert!((output[4_799] - 0.4).abs() < 0.01);
    }

    #[test]
    fn test_extra_output_channels_are_silent() {
        let mut state = MixerState::default();
        state.set_crossfader(0.0).unwrap();
        let (mut rt, _) = rt_mixer(4, state);
        load_and_play(&mut rt, Deck::Left, constant(0.5, 48_000), 1);

        let mut output = vec![0.0; 4 * 1_000];
        rt.render(&mut output, |_| {});
        assert!(output.chunks_exact(4).all(|f| f[2] == 0.0 && f[3] == 0.0));
        assert!(output.chunks_exact(4).any(|f| f[0] != 0.0));
    }

    #[test]
    fn test_deck_end_emits_event() {
        let (mut rt, _) = rt_mixer(2, MixerState::default());
        load_and_play(&mut rt, Deck::Right, constant(0.5, 100), 7);

        let mut events = Vec::new();
        let mut output = vec![0.0; 512];
        rt.render(&mut output, |event| events.push(event));

        assert_eq!(
            events,
            vec![AudioMessage::DeckEnded {
                deck: Deck::Right,
                generation: 7
            }]
        );
        assert_eq!(rt.strip(Deck::Right).state(), StripState::Loaded);
    }

    #[test]
    fn test_deck_end_carries_latest_generation() {
        let (mut rt, _) = rt_mixer(2, MixerState::default());
        load_and_play(&mut rt, Deck::Left, constant(0.5, 600), 1);

        let mut output = vec![0.0; 400];
        rt.render(&mut output, |_| {});
        rt.apply(ControlMessage::StopDeck { deck: Deck::Left });
        rt.apply(ControlMessage::PlayDeck {
            deck: Deck::Left,
            generation: 2,
        });
        rt.apply(ControlMessage::PlayDeck {
            deck: Deck::Left,
            generation: 3,
        });

        let mut events = Vec::new();
        let mut output = vec![0.0; 2_048];
        rt.render(&mut output, |event| events.push(event));
        assert_eq!(
            events,
            vec![AudioMessage::DeckEnded {
                deck: Deck::Left,
                generation: 3
            }]
        );
    }

    #[test]
    fn test_non_finite_block_is_silenced() {
        let mut state = MixerState::default();
        state.set_crossfader(0.0).unwrap();
        let (mut rt, _) = rt_mixer(2, state);

        let mut samples = vec![0.5; 2_000];
        samples[10] = f32::NAN;
        load_and_play(&mut rt, Deck::Left, AudioBuffer::new(2, FS as u32, samples).unwrap(), 1);

        let mut output = vec![0.0; 512];
        rt.render(&mut output, |_| {});
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stop_all_and_unload() {
        let (mut rt, _) = rt_mixer(2, MixerState::default());
        load_and_play(&mut rt, Deck::Left, constant(0.5, 1_000), 1);
        load_and_play(&mut rt, Deck::Right, constant(0.5, 1_000), 2);

        rt.apply(ControlMessage::LoadPad {
            slot: 0,
            buffer: constant(0.5, 1_000),
            seq: 3,
        });
        rt.apply(ControlMessage::TriggerPad { slot: 0 });

        rt.apply(ControlMessage::StopAll());
        assert_eq!(rt.strip(Deck::Left).state(), StripState::Loaded);
        assert_eq!(rt.strip(Deck::Right).state(), StripState::Loaded);
        assert_eq!(rt.pads().active_voices(), 0);

        assert_eq!(
            rt.apply(ControlMessage::UnloadDeck {
                deck: Deck::Left,
                seq: 4
            }),
            Some(AudioMessage::Released { seq: 4 })
        );
        assert_eq!(rt.strip(Deck::Left).state(), StripState::Idle);
    }

    #[test]
    fn test_pads_bypass_crossfader() {
        let mut state = MixerState::default();
        state.set_crossfader(0.0).unwrap();
        state.set_volume(Deck::Left, 0.0).unwrap();
        let (mut rt, _) = rt_mixer(2, state);

        assert_eq!(
            rt.apply(ControlMessage::LoadPad {
                slot: 4,
                buffer: constant(0.6, 2_000),
                seq: 9,
            }),
            Some(AudioMessage::Released { seq: 9 })
        );
        assert_eq!(rt.apply(ControlMessage::TriggerPad { slot: 4 }), None);

        let mut output = vec![0.0; 512];
        rt.render(&mut output, |_| {});
        assert!(output.iter().all(|&s| (s - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_pad_mixes_over_deck() {
        let mut state = MixerState::default();
        state.set_crossfader(0.0).unwrap();
        state.set_volume(Deck::Left, 100.0).unwrap();
        let (mut rt, _) = rt_mixer(2, state);
        load_and_play(&mut rt, Deck::Left, constant(0.25, 48_000), 1);
        rt.apply(ControlMessage::LoadPad {
            slot: 0,
            buffer: constant(0.5, 100),
            seq: 2,
        });

        let mut output = vec![0.0; 9_600];
        rt.render(&mut output, |_| {});
        rt.apply(ControlMessage::TriggerPad { slot: 0 });
        let mut output = vec![0.0; 400];
        rt.render(&mut output, |_| {});

        // Deck at 0.25 plus the pad at 0.5 · 0.5 for its 100 frames, then the deck alone.
        assert!((output[0] - 0.5).abs() < 0.01);
        assert!((output[199] - 0.5).abs() < 0.01);
        assert!((output[200] - 0.25).abs() < 0.01);
        assert_eq!(rt.pads().active_voices(), 0);
    }

    #[test]
    fn test_spectrum_tap_receives_mono_master() {
        let mixer = Mixer::default();
        let strips = Deck::ALL
            .map(|deck| ChannelStrip::new(deck, Arc::new(StripParams::default()), FS, 480));
        let (producer, mut consumer) = rtrb::RingBuffer::<f32>::new(64);
        let mut rt = RtMixer::new(2, strips, mixer.params(), 480, Some(producer));

        let mut output = vec![0.0; 200];
        rt.render(&mut output, |_| {});
        assert_eq!(consumer.slots(), 64);
        assert_eq!(consumer.pop(), Ok(0.0));
    }
}
