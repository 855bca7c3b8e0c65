//! Sample pads: two banks of four one-shot samples played straight into the master.
//!
//! [`PadBank`] is the control-side view: the selected bank and which pads hold a sample.
//! [`PadPlayer`] lives in the audio callback next to the decks. It owns the pad buffers and a
//! fixed pool of one-shot voices, so a trigger never allocates.

use std::fmt;

use serde::Serialize;

use crate::audio_engine::constants::{MAX_PAD_VOICES, NUM_PAD_SLOTS, PAD_GAIN, PADS_PER_BANK};
use crate::audio_engine::deck::CommandSink;
use crate::audio_engine::errors::EngineError;
use crate::audio_engine::voice::Voice;
use crate::messages::{AudioBuffer, ControlMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SampleBank {
    #[default]
    Drums,
    Fx,
}

impl SampleBank {
    pub const ALL: [SampleBank; 2] = [SampleBank::Drums, SampleBank::Fx];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn id(self) -> &'static str {
        match self {
            SampleBank::Drums => "DRUMS",
            SampleBank::Fx => "FX",
        }
    }

    /// Name shown in the bank selector.
    pub fn name(self) -> &'static str {
        match self {
            SampleBank::Drums => "Drum Kit",
            SampleBank::Fx => "Effects",
        }
    }

    pub fn pad_names(self) -> [&'static str; PADS_PER_BANK] {
        match self {
            SampleBank::Drums => ["Kick", "Snare", "HiHat", "Clap"],
            SampleBank::Fx => ["Rise", "Drop", "Impact", "Sweep"],
        }
    }

    /// File each pad is read from inside a sample directory. The FX bank reuses the drum files.
    pub fn sample_files(self) -> [&'static str; PADS_PER_BANK] {
        ["kick.wav", "snare.wav", "hihat.wav", "clap.wav"]
    }

    /// Case-insensitive lookup by id.
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        Self::ALL
            .into_iter()
            .find(|bank| bank.id().eq_ignore_ascii_case(id))
    }

    /// Case-insensitive lookup of a pad by name.
    pub fn pad_index(self, name: &str) -> Option<usize> {
        self.pad_names()
            .iter()
            .position(|pad| pad.eq_ignore_ascii_case(name.trim()))
    }

    /// Slot of `pad` in the audio thread's pad table.
    pub fn slot(self, pad: usize) -> usize {
        self.index() * PADS_PER_BANK + pad
    }
}

impl fmt::Display for SampleBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Control-side pad state.
#[derive(Debug, Default)]
pub struct PadBank {
    current: SampleBank,
    loaded: [Option<AudioBuffer>; NUM_PAD_SLOTS],
}

impl PadBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bank the pad grid currently addresses.
    pub fn current(&self) -> SampleBank {
        self.current
    }

    pub fn set_current(&mut self, bank: SampleBank) {
        self.current = bank;
    }

    pub fn is_loaded(&self, bank: SampleBank, pad: usize) -> bool {
        pad < PADS_PER_BANK && self.loaded[bank.slot(pad)].is_some()
    }

    pub(crate) fn check_pad(&self, pad: usize) -> Result<usize, EngineError> {
        if pad >= PADS_PER_BANK {
            return Err(EngineError::InvalidParameter(format!(
                "pad index {pad} out of range (expected 0..{PADS_PER_BANK})"
            )));
        }
        Ok(pad)
    }

    /// Puts `buffer` on `pad` of the current bank.
    ///
    /// Returns the displaced buffer, which must outlive the acknowledgement of `seq`.
    pub fn load(
        &mut self,
        pad: usize,
        buffer: AudioBuffer,
        seq: u64,
        sink: &mut impl CommandSink,
    ) -> Result<Option<AudioBuffer>, EngineError> {
        let slot = self.current.slot(self.check_pad(pad)?);
        sink.send(ControlMessage::LoadPad {
            slot,
            buffer: buffer.clone(),
            seq,
        })?;
        Ok(self.loaded[slot].replace(buffer))
    }

    /// Plays `pad` of the current bank once. `Ok(false)` when the pad holds no sample.
    pub fn trigger(&mut self, pad: usize, sink: &mut impl CommandSink) -> Result<bool, EngineError> {
        let slot = self.current.slot(self.check_pad(pad)?);
        if self.loaded[slot].is_none() {
            return Ok(false);
        }
        sink.send(ControlMessage::TriggerPad { slot })?;
        Ok(true)
    }

    /// Forgets every pad sample without sending anything. Used once the stream is gone.
    pub(crate) fn reset(&mut self) {
        self.loaded = Default::default();
    }
}

#[derive(Debug, Clone)]
struct PadVoice {
    slot: usize,
    voice: Voice,
}

/// Audio-thread pad table and one-shot voice pool.
pub struct PadPlayer {
    slots: [Option<AudioBuffer>; NUM_PAD_SLOTS],
    voices: [Option<PadVoice>; MAX_PAD_VOICES],
}

impl Default for PadPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl PadPlayer {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            voices: std::array::from_fn(|_| None),
        }
    }

    /// Replaces the sample in `slot`. Voices still playing the old sample are cut.
    pub fn load(&mut self, slot: usize, buffer: AudioBuffer) {
        if slot >= NUM_PAD_SLOTS {
            return;
        }
        self.stop_slot(slot);
        self.slots[slot] = Some(buffer);
    }

    /// Starts a one-shot voice from the top of the sample.
    ///
    /// Dropped when the slot is empty or every voice is busy.
    pub fn trigger(&mut self, slot: usize) -> bool {
        if !self.slots.get(slot).is_some_and(Option::is_some) {
            return false;
        }
        let Some(free) = self.voices.iter_mut().find(|voice| voice.is_none()) else {
            return false;
        };
        *free = Some(PadVoice {
            slot,
            voice: Voice::new(0),
        });
        true
    }

    pub fn stop_all(&mut self) {
        for voice in &mut self.voices {
            *voice = None;
        }
    }

    fn stop_slot(&mut self, slot: usize) {
        for voice in &mut self.voices {
            if voice.as_ref().is_some_and(|pad| pad.slot == slot) {
                *voice = None;
            }
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_some()).count()
    }

    /// Adds every active voice, scaled by [`PAD_GAIN`], onto `out_l`/`out_r`.
    ///
    /// Voices that run off the end of their sample are freed.
    pub fn render_add(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        for entry in &mut self.voices {
            let Some(pad) = entry.as_mut() else {
                continue;
            };
            let Some(buffer) = self.slots[pad.slot].as_ref() else {
                *entry = None;
                continue;
            };

            let mut finished = false;
            for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
                let Some((in_l, in_r)) = pad.voice.next_frame(buffer) else {
                    finished = true;
                    break;
                };
                *l += in_l * PAD_GAIN;
                *r += in_r * PAD_GAIN;
            }
            if finished {
                *entry = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FullQueue;

    impl CommandSink for FullQueue {
        fn send(&mut self, msg: ControlMessage) -> Result<(), EngineError> {
            Err(EngineError::QueueFull(msg.name()))
        }
    }

    fn sample(value: f32, frames: usize) -> AudioBuffer {
        AudioBuffer::from_mono(48_000, vec![value; frames]).unwrap()
    }

    fn render(player: &mut PadPlayer, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        player.render_add(&mut left, &mut right);
        (left, right)
    }

    #[test]
    fn test_bank_lookup() {
        assert_eq!(SampleBank::parse("fx"), Some(SampleBank::Fx));
        assert_eq!(SampleBank::parse(" DRUMS "), Some(SampleBank::Drums));
        assert_eq!(SampleBank::parse("VOX"), None);
        assert_eq!(SampleBank::Drums.pad_index("hihat"), Some(2));
        assert_eq!(SampleBank::Fx.pad_index("Kick"), None);
        assert_eq!(SampleBank::Fx.slot(3), 7);
        assert_eq!(SampleBank::default(), SampleBank::Drums);
    }

    #[test]
    fn test_load_targets_current_bank() {
        let mut bank = PadBank::new();
        let mut sent = Vec::new();
        bank.set_current(SampleBank::Fx);
        assert!(bank.load(1, sample(0.5, 10), 4, &mut sent).unwrap().is_none());

        assert!(bank.is_loaded(SampleBank::Fx, 1));
        assert!(!bank.is_loaded(SampleBank::Drums, 1));
        assert!(matches!(
            sent.as_slice(),
            [ControlMessage::LoadPad { slot: 5, seq: 4, .. }]
        ));
    }

    #[test]
    fn test_reload_returns_previous_buffer() {
        let mut bank = PadBank::new();
        let first = sample(0.5, 10);
        bank.load(0, first.clone(), 1, &mut Vec::new()).unwrap();
        let displaced = bank.load(0, sample(0.1, 4), 2, &mut Vec::new()).unwrap().unwrap();
        assert!(displaced.shares_data_with(&first));
    }

    #[test]
    fn test_trigger_empty_pad_sends_nothing() {
        let mut bank = PadBank::new();
        let mut sent = Vec::new();
        assert!(!bank.trigger(0, &mut sent).unwrap());
        assert!(sent.is_empty());

        bank.load(0, sample(0.5, 10), 1, &mut sent).unwrap();
        assert!(bank.trigger(0, &mut sent).unwrap());
        assert!(matches!(sent.last(), Some(ControlMessage::TriggerPad { slot: 0 })));

        // Same pad index, other bank: still empty.
        bank.set_current(SampleBank::Fx);
        assert!(!bank.trigger(0, &mut sent).unwrap());
    }

    #[test]
    fn test_pad_index_out_of_range() {
        let mut bank = PadBank::new();
        assert!(matches!(
            bank.trigger(PADS_PER_BANK, &mut Vec::new()),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(bank.load(9, sample(0.5, 10), 1, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_full_queue_leaves_pad_empty() {
        let mut bank = PadBank::new();
        assert!(matches!(
            bank.load(0, sample(0.5, 10), 1, &mut FullQueue),
            Err(EngineError::QueueFull("LoadPad"))
        ));
        assert!(!bank.is_loaded(SampleBank::Drums, 0));
    }

    #[test]
    fn test_one_shot_plays_once_at_half_gain() {
        let mut player = PadPlayer::new();
        player.load(0, sample(0.8, 100));
        assert!(player.trigger(0));

        let (left, right) = render(&mut player, 64);
        assert!(left.iter().all(|&s| (s - 0.4).abs() < 1e-6));
        assert_eq!(left, right);

        let (left, _) = render(&mut player, 64);
        assert!(left[..36].iter().all(|&s| (s - 0.4).abs() < 1e-6));
        assert!(left[36..].iter().all(|&s| s == 0.0));
        assert_eq!(player.active_voices(), 0);
    }

    #[test]
    fn test_retrigger_overlaps() {
        let mut player = PadPlayer::new();
        player.load(2, sample(0.2, 1_000));
        player.trigger(2);
        player.trigger(2);
        assert_eq!(player.active_voices(), 2);

        let (left, _) = render(&mut player, 8);
        assert!((left[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_render_adds_onto_existing_mix() {
        let mut player = PadPlayer::new();
        player.load(0, sample(0.5, 10));
        player.trigger(0);

        let mut left = vec![0.25; 4];
        let mut right = vec![0.0; 4];
        player.render_add(&mut left, &mut right);
        assert!(left.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_trigger_without_sample_or_free_voice() {
        let mut player = PadPlayer::new();
        assert!(!player.trigger(0));
        assert!(!player.trigger(NUM_PAD_SLOTS));

        player.load(1, sample(0.1, 10_000));
        for _ in 0..MAX_PAD_VOICES {
            assert!(player.trigger(1));
        }
        assert!(!player.trigger(1));
        assert_eq!(player.active_voices(), MAX_PAD_VOICES);

        player.stop_all();
        assert_eq!(player.active_voices(), 0);
    }

    #[test]
    fn test_reload_cuts_voices_of_that_slot() {
        let mut player = PadPlayer::new();
        player.load(0, sample(0.1, 1_000));
        player.load(1, sample(0.1, 1_000));
        player.trigger(0);
        player.trigger(1);

        player.load(0, sample(0.3, 1_000));
        assert_eq!(player.active_voices(), 1);
    }
}
