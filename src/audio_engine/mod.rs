//! Audio Engine Module
//!
//! This module provides the two-deck mixing engine. It is organized into sub-modules, each with a
//! specific responsibility:
//!
//! - [`audio_stream`]: CPAL audio stream management and real-time callback
//! - [`channel_strip`]: per-deck voice, EQ, filter, sends and gain (audio thread)
//! - [`deck`]: control-side deck state, hot cues, beat loops and buffer release
//! - [`effect_chain`]: effect chain view, presets and bypass flags
//! - [`mixer`]: crossfader law and the real-time master mix
//! - [`params`]: lock-free parameter slots
//! - [`sample_loader`]: audio file decoding and resampling
//! - [`sample_pads`]: one-shot sample pads in two banks
//!
//! The [`AudioEngine`] struct is an explicitly constructed session handle that orchestrates these
//! components. Nothing is global: two engines never share state.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use crate::analysis::{TrackAnalysis, analyze};
use crate::audio_engine::audio_stream::{AudioStreamHandle, create_audio_stream, start_stream};
use crate::audio_engine::channel_strip::StripState;
use crate::audio_engine::config::EngineConfig;
use crate::audio_engine::deck::{CommandSink, DeckSlot, ReleaseQueue};
use crate::audio_engine::effect_chain::{EffectChain, EffectNode, EffectPreset};
use crate::audio_engine::errors::{EngineError, SampleLoadError};
use crate::audio_engine::mixer::{Mixer, MixerState};
use crate::audio_engine::params::{StripHandle, StripParams};
use crate::audio_engine::progress::{LoadProgressStage, ProgressReporter};
use crate::audio_engine::sample_loader::{
    SampleLoadProgress, SampleLoadSubtask, decode_audio_file, decode_audio_file_with_progress,
    resample_buffer,
};
use crate::audio_engine::sample_pads::{PadBank, SampleBank};
use crate::messages::{
    AudioBuffer, AudioMessage, BackgroundTaskKind, ControlMessage, Deck, LoaderEvent, LoopRegion,
};
use crate::visualization::SpectrumMonitor;

pub mod audio_stream;
pub mod channel_strip;
pub mod channels;
pub mod config;
pub mod constants;
pub mod deck;
pub mod effect_chain;
pub mod effects;
pub mod eq3;
pub mod errors;
pub mod mixer;
pub mod params;
pub mod progress;
pub mod ramp;
pub mod sample_loader;
pub mod sample_pads;
pub mod voice;

/// Decks always play stereo buffers.
const DECK_CHANNELS: usize = 2;

/// Two-deck mixing session.
pub struct AudioEngine {
    config: EngineConfig,
    stream_handle: Option<AudioStreamHandle>,
    strip_params: [Arc<StripParams>; 2],
    decks: [DeckSlot; 2],
    mixer: Mixer,
    pads: PadBank,
    releases: ReleaseQueue,
    messages: VecDeque<AudioMessage>,
    reported_drops: u64,
    loader_tx: Sender<LoaderEvent>,
    loader_rx: Receiver<LoaderEvent>,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine {
    /// Create a new AudioEngine instance. No device is opened until [`AudioEngine::run`].
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let (loader_tx, loader_rx) = std::sync::mpsc::channel();
        let strip_params: [Arc<StripParams>; 2] =
            std::array::from_fn(|_| Arc::new(StripParams::default()));
        let decks =
            Deck::ALL.map(|deck| DeckSlot::new(StripHandle::new(deck, strip_params[deck.index()].clone())));

        AudioEngine {
            config,
            stream_handle: None,
            strip_params,
            decks,
            mixer: Mixer::default(),
            pads: PadBank::new(),
            releases: ReleaseQueue::new(),
            messages: VecDeque::new(),
            reported_drops: 0,
            loader_tx,
            loader_rx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.stream_handle.is_some()
    }

    /// Device sample rate, while running.
    pub fn output_sample_rate(&self) -> Option<u32> {
        self.stream_handle
            .as_ref()
            .map(|handle| handle.output_sample_rate)
    }

    /// Opens the default output device and starts the session.
    ///
    /// Parameter values, mixer settings and effect chains set before `run` carry over.
    pub fn run(&mut self) -> Result<(), EngineError> {
        if self.stream_handle.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let handle = create_audio_stream(
            &self.config,
            self.strip_params.clone(),
            self.mixer.params(),
        )?;
        start_stream(&handle.stream)?;
        self.stream_handle = Some(handle);
        Ok(())
    }

    /// Stops the session. Both decks return to idle. Safe to call when not running.
    pub fn shut_down(&mut self) {
        if self.stream_handle.take().is_some() {
            log::info!("AudioEngine stopped");
        }
        // The callback, and every buffer it referenced, is gone with the stream.
        for deck in &mut self.decks {
            deck.reset();
        }
        self.pads.reset();
        self.releases = ReleaseQueue::new();
        self.messages.clear();
    }

    fn running(&mut self) -> Result<&mut AudioStreamHandle, EngineError> {
        self.stream_handle.as_mut().ok_or(EngineError::NotRunning)
    }

    /// Attaches a decoded buffer to a deck, analyzing it first.
    ///
    /// Buffers at another sample rate are resampled to the device rate. Whatever the deck held
    /// before is stopped and replaced.
    pub fn load(&mut self, deck: Deck, buffer: AudioBuffer) -> Result<StripHandle, EngineError> {
        let rate = self.output_sample_rate().ok_or(EngineError::NotRunning)?;
        let buffer = if buffer.sample_rate() != rate {
            log::warn!(
                "{deck} deck: resampling buffer from {} Hz to {rate} Hz",
                buffer.sample_rate()
            );
            resample_buffer(&buffer, rate)?
        } else {
            buffer
        };

        let analysis = analyze(&buffer, &self.config.analysis)?;
        self.attach(deck, buffer, analysis)
    }

    fn attach(
        &mut self,
        deck: Deck,
        buffer: AudioBuffer,
        analysis: TrackAnalysis,
    ) -> Result<StripHandle, EngineError> {
        let handle = self.stream_handle.as_mut().ok_or(EngineError::NotRunning)?;
        let seq = self.releases.next_seq();
        let slot = &mut self.decks[deck.index()];

        log::info!(
            "{deck} deck: loaded {:.1}s, {:.1} bpm ({:?})",
            buffer.duration_secs(),
            analysis.tempo.bpm,
            analysis.tempo.source
        );
        if let Some(displaced) = slot.load(buffer, analysis, seq, &mut handle.producer)? {
            self.releases.hold(seq, displaced);
        }
        Ok(slot.strip().clone())
    }

    /// Decodes, resamples and analyzes a file on a background thread.
    ///
    /// Progress arrives through [`AudioEngine::poll_loader_event`]; the buffer is attached to the
    /// deck when the `Success` event is polled.
    pub fn load_file_async(&self, deck: Deck, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let output_sample_rate = self.output_sample_rate().ok_or(EngineError::NotRunning)?;
        let path = path.as_ref().to_path_buf();
        let loader_tx = self.loader_tx.clone();
        let analysis_config = self.config.analysis;

        thread::spawn(move || {
            let _ = loader_tx.send(LoaderEvent::Started { deck });

            let mut progress = ProgressReporter::new(deck, loader_tx.clone());

            let buffer = match decode_audio_file_with_progress(
                &path,
                DECK_CHANNELS,
                Some(output_sample_rate),
                |update: SampleLoadProgress| {
                    let stage = match update.subtask {
                        SampleLoadSubtask::Decoding => LoadProgressStage::Decoding,
                        SampleLoadSubtask::Resampling => LoadProgressStage::Resampling,
                        SampleLoadSubtask::ChannelMapping => LoadProgressStage::ChannelMapping,
                    };
                    let force = update.percent <= 0.0 || update.percent >= 1.0;
                    progress.emit(stage, update.percent, update.resampling_required, force);
                },
            ) {
                Ok(buffer) => buffer,
                Err(SampleLoadError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                    let _ = loader_tx.send(LoaderEvent::Error {
                        deck,
                        task: BackgroundTaskKind::Decoding,
                        error: format!("File not found: {}", path.display()),
                    });
                    return;
                }
                Err(err) => {
                    log::warn!("failed to decode {}: {err}", path.display());
                    let _ = loader_tx.send(LoaderEvent::Error {
                        deck,
                        task: BackgroundTaskKind::Decoding,
                        error: err.to_string(),
                    });
                    return;
                }
            };

            let resampling_required = progress.resampling_required.unwrap_or(false);
            progress.emit(LoadProgressStage::Analyzing, 0.0, resampling_required, true);
            let analysis = match analyze(&buffer, &analysis_config) {
                Ok(analysis) => analysis,
                Err(err) => {
                    let _ = loader_tx.send(LoaderEvent::Error {
                        deck,
                        task: BackgroundTaskKind::Analysis,
                        error: err.to_string(),
                    });
                    return;
                }
            };
            progress.emit(LoadProgressStage::Analyzing, 1.0, resampling_required, true);
            progress.emit(LoadProgressStage::Publishing, 0.0, resampling_required, true);

            let duration_sec = buffer.duration_secs() as f32;
            let _ = loader_tx.send(LoaderEvent::Success {
                deck,
                duration_sec,
                buffer,
                analysis,
            });
        });

        Ok(())
    }

    /// Poll for pending background loader events.
    ///
    /// Returns `None` when no events are available. A `Success` event is attached to its deck
    /// before it is returned; if attaching fails the event is turned into an `Error`.
    pub fn poll_loader_event(&mut self) -> Option<LoaderEvent> {
        self.pump_audio_messages();
        let event = self.loader_rx.try_recv().ok()?;

        if let LoaderEvent::Success {
            deck,
            buffer,
            analysis,
            ..
        } = &event
            && let Err(err) = self.attach(*deck, buffer.clone(), analysis.clone())
        {
            log::warn!("{deck} deck: could not attach loaded track: {err}");
            return Some(LoaderEvent::Error {
                deck: *deck,
                task: BackgroundTaskKind::Decoding,
                error: err.to_string(),
            });
        }

        Some(event)
    }

    /// Starts the deck from its cue point.
    pub fn play(&mut self, deck: Deck) -> Result<(), EngineError> {
        self.pump_audio_messages();
        let handle = self.stream_handle.as_mut().ok_or(EngineError::NotRunning)?;
        self.decks[deck.index()].play(&mut handle.producer)
    }

    /// Silences the deck immediately. The chain and its settings stay in place.
    pub fn stop(&mut self, deck: Deck) -> Result<(), EngineError> {
        self.pump_audio_messages();
        let handle = self.stream_handle.as_mut().ok_or(EngineError::NotRunning)?;
        self.decks[deck.index()].stop(&mut handle.producer)
    }

    /// Stops both decks and every pad voice within the same audio block.
    pub fn stop_all(&mut self) -> Result<(), EngineError> {
        let handle = self.stream_handle.as_mut().ok_or(EngineError::NotRunning)?;
        handle.producer.send(ControlMessage::StopAll())?;
        for slot in &mut self.decks {
            slot.mark_stopped();
        }
        Ok(())
    }

    /// Detaches the deck's buffer. The buffer is freed once the audio thread has let go of it.
    pub fn unload(&mut self, deck: Deck) -> Result<(), EngineError> {
        let handle = self.stream_handle.as_mut().ok_or(EngineError::NotRunning)?;
        let seq = self.releases.next_seq();
        if let Some(displaced) = self.decks[deck.index()].unload(seq, &mut handle.producer)? {
            self.releases.hold(seq, displaced);
        }
        Ok(())
    }

    pub fn deck_state(&mut self, deck: Deck) -> StripState {
        self.pump_audio_messages();
        self.decks[deck.index()].state()
    }

    /// Parameter handle for the deck's channel strip. Valid in every state and across sessions.
    pub fn strip(&self, deck: Deck) -> StripHandle {
        self.decks[deck.index()].strip().clone()
    }

    pub fn analysis(&self, deck: Deck) -> Option<&TrackAnalysis> {
        self.decks[deck.index()].analysis()
    }

    /// Re-runs analysis on the loaded buffer, replacing the previous result.
    pub fn reanalyze(&mut self, deck: Deck) -> Result<&TrackAnalysis, EngineError> {
        let slot = &mut self.decks[deck.index()];
        let buffer = slot.buffer().cloned().ok_or(EngineError::InvalidState {
            deck,
            action: "analyze",
            state: StripState::Idle,
        })?;
        let analysis = analyze(&buffer, &self.config.analysis)?;
        slot.set_analysis(analysis)?;
        slot.analysis().ok_or(EngineError::InvalidState {
            deck,
            action: "analyze",
            state: StripState::Idle,
        })
    }

    pub fn move_node(&mut self, deck: Deck, from: usize, to: usize) -> Result<(), EngineError> {
        self.decks[deck.index()].move_node(from, to)
    }

    pub fn apply_preset(&mut self, deck: Deck, id: &str) -> Result<EffectPreset, EngineError> {
        self.decks[deck.index()].apply_preset(id)
    }

    pub fn set_node_bypass(
        &mut self,
        deck: Deck,
        node: EffectNode,
        bypassed: bool,
    ) -> Result<(), EngineError> {
        self.decks[deck.index()].set_node_bypass(node, bypassed)
    }

    pub fn effect_chain(&self, deck: Deck) -> &EffectChain {
        self.decks[deck.index()].chain()
    }

    pub fn set_crossfader(&mut self, value: f32) -> Result<(), EngineError> {
        self.mixer.set_crossfader(value)
    }

    pub fn set_volume(&mut self, deck: Deck, value: f32) -> Result<(), EngineError> {
        self.mixer.set_volume(deck, value)
    }

    pub fn mixer_state(&self) -> MixerState {
        self.mixer.state()
    }

    /// Stores the current playhead in hot cue slot `index`. Returns the stored frame.
    pub fn set_hot_cue(&mut self, deck: Deck, index: usize) -> Result<u64, EngineError> {
        let frame = self.strip_params[deck.index()].playhead_frame();
        self.decks[deck.index()].set_hot_cue(index, frame)?;
        Ok(frame)
    }

    /// Jumps to hot cue `index`. Returns the target frame.
    pub fn trigger_hot_cue(&mut self, deck: Deck, index: usize) -> Result<u64, EngineError> {
        let handle = self.stream_handle.as_mut().ok_or(EngineError::NotRunning)?;
        self.decks[deck.index()].trigger_hot_cue(index, &mut handle.producer)
    }

    /// Loops `beats` beats from the current playhead, or clears the loop for `None`.
    pub fn set_loop(
        &mut self,
        deck: Deck,
        beats: Option<u32>,
    ) -> Result<Option<LoopRegion>, EngineError> {
        let start_frame = self.strip_params[deck.index()].playhead_frame();
        let handle = self.stream_handle.as_mut().ok_or(EngineError::NotRunning)?;
        self.decks[deck.index()].set_loop(beats, start_frame, &mut handle.producer)
    }

    /// Send a ping message to the audio thread.
    pub fn ping(&mut self) -> Result<(), EngineError> {
        self.running()?.producer.push(ControlMessage::Ping()).map_err(|_| EngineError::QueueFull("Ping"))
    }

    /// Receive a message from the audio thread.
    pub fn receive_msg(&mut self) -> Result<Option<AudioMessage>, EngineError> {
        self.running()?;
        self.pump_audio_messages();
        Ok(self.messages.pop_front())
    }

    /// Moves audio-thread events into the local queue, acting on releases and deck ends.
    fn pump_audio_messages(&mut self) {
        let Some(handle) = self.stream_handle.as_mut() else {
            return;
        };

        while let Ok(msg) = handle.consumer.pop() {
            match &msg {
                AudioMessage::Released { seq } => {
                    let freed = self.releases.release(*seq);
                    if freed > 0 {
                        log::debug!("released {freed} buffer(s) up to #{seq}");
                    }
                }
                AudioMessage::DeckEnded { deck, generation } => {
                    if !self.decks[deck.index()].mark_ended(*generation) {
                        log::debug!("{deck}: ignoring end of play #{generation}");
                    }
                }
                AudioMessage::Pong() => {}
            }

            if self.messages.len() >= self.config.event_queue_capacity {
                self.messages.pop_front();
            }
            self.messages.push_back(msg);
        }

        self.report_dropped_events();
    }

    /// Logs events the audio thread lost since the last call. Returns how many.
    fn report_dropped_events(&mut self) -> u64 {
        let dropped = self.mixer.params().dropped_events();
        let new = dropped.saturating_sub(self.reported_drops);
        if new > 0 {
            log::warn!("event queue full: audio thread dropped {new} event(s), {dropped} in total");
            self.reported_drops = dropped;
        }
        new
    }

    /// Bank the pad grid currently addresses.
    pub fn sample_bank(&self) -> SampleBank {
        self.pads.current()
    }

    /// Switches the pad grid to `bank`. Samples already loaded in either bank stay loaded.
    pub fn set_sample_bank(&mut self, bank: SampleBank) {
        self.pads.set_current(bank);
    }

    pub fn is_pad_loaded(&self, bank: SampleBank, pad: usize) -> bool {
        self.pads.is_loaded(bank, pad)
    }

    /// Puts a one-shot sample on `pad` of the current bank, resampled to the device rate.
    pub fn load_pad(&mut self, pad: usize, buffer: AudioBuffer) -> Result<(), EngineError> {
        let rate = self.output_sample_rate().ok_or(EngineError::NotRunning)?;
        self.pads.check_pad(pad)?;
        let buffer = resample_buffer(&buffer, rate)?;

        let handle = self.stream_handle.as_mut().ok_or(EngineError::NotRunning)?;
        let seq = self.releases.next_seq();
        if let Some(displaced) = self.pads.load(pad, buffer, seq, &mut handle.producer)? {
            self.releases.hold(seq, displaced);
        }
        Ok(())
    }

    /// Loads every pad of the current bank from its file in `dir`.
    ///
    /// Pads whose file is missing or undecodable are logged and left as they were. Returns how
    /// many pads were loaded.
    pub fn load_sample_bank(&mut self, dir: impl AsRef<Path>) -> Result<usize, EngineError> {
        let rate = self.output_sample_rate().ok_or(EngineError::NotRunning)?;
        let bank = self.pads.current();
        let mut loaded = 0;

        for (pad, (name, file)) in bank.pad_names().into_iter().zip(bank.sample_files()).enumerate() {
            let path = dir.as_ref().join(file);
            match decode_audio_file(&path, DECK_CHANNELS, Some(rate)) {
                Ok(buffer) => {
                    self.load_pad(pad, buffer)?;
                    loaded += 1;
                }
                Err(err) => log::warn!("{bank} {name}: failed to load {}: {err}", path.display()),
            }
        }

        log::info!("{bank} bank: {loaded} of {} pads loaded", bank.pad_names().len());
        Ok(loaded)
    }

    /// Plays `pad` of the current bank once, over the master. `Ok(false)` when it has no sample.
    pub fn trigger_pad(&mut self, pad: usize) -> Result<bool, EngineError> {
        let handle = self.stream_handle.as_mut().ok_or(EngineError::NotRunning)?;
        self.pads.trigger(pad, &mut handle.producer)
    }

    /// Seconds of audio rendered since [`AudioEngine::run`]; 0 when not running.
    pub fn current_time(&self) -> f64 {
        self.output_sample_rate().map_or(0.0, |rate| {
            self.mixer.params().clock_frames() as f64 / f64::from(rate)
        })
    }

    /// Playhead of the deck in seconds; 0 when idle.
    pub fn playhead_secs(&self, deck: Deck) -> f64 {
        self.decks[deck.index()].buffer().map_or(0.0, |buffer| {
            self.strip_params[deck.index()].playhead_frame() as f64
                / f64::from(buffer.sample_rate())
        })
    }

    /// Monitor over the live master output. Available once per session.
    pub fn take_spectrum_monitor(&mut self) -> Result<Option<SpectrumMonitor>, EngineError> {
        let window_size = self.config.analysis.window_size;
        let handle = self.running()?;
        let Some(consumer) = handle.spectrum.take() else {
            return Ok(None);
        };
        let monitor = SpectrumMonitor::new(consumer, handle.output_sample_rate, window_size)?;
        Ok(Some(monitor))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    /// Starts an engine, or `None` on hosts without a usable output device.
    fn running_engine() -> Option<AudioEngine> {
        let mut engine = AudioEngine::new();
        match engine.run() {
            Ok(()) => Some(engine),
            Err(EngineError::DeviceUnavailable(_)) => None,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    fn tone(sample_rate: u32, seconds: f32) -> AudioBuffer {
        let frames = (seconds * sample_rate as f32) as usize;
        let samples = (0..frames)
            .map(|n| (2.0 * std::f32::consts::PI * 220.0 * n as f32 / sample_rate as f32).sin() * 0.5)
            .collect();
        AudioBuffer::from_mono(sample_rate, samples).unwrap()
    }

    fn wait_for(engine: &mut AudioEngine, pred: impl Fn(&AudioMessage) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(Some(msg)) = engine.receive_msg()
                && pred(&msg)
            {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_audio_engine_creation() {
        let engine = AudioEngine::new();
        assert!(!engine.is_running());
        assert_eq!(engine.mixer_state(), MixerState::default());
        assert_eq!(engine.current_time(), 0.0);
    }

    #[test]
    fn test_commands_require_running_engine() {
        let mut engine = AudioEngine::new();
        let buffer = tone(44_100, 0.1);
        assert!(matches!(engine.load(Deck::Left, buffer), Err(EngineError::NotRunning)));
        assert!(matches!(engine.play(Deck::Left), Err(EngineError::NotRunning)));
        assert!(matches!(engine.ping(), Err(EngineError::NotRunning)));
        assert!(matches!(engine.receive_msg(), Err(EngineError::NotRunning)));
        assert!(matches!(
            engine.load_file_async(Deck::Left, "missing.wav"),
            Err(EngineError::NotRunning)
        ));
        assert!(engine.take_spectrum_monitor().is_err());
        assert!(matches!(engine.stop_all(), Err(EngineError::NotRunning)));
    }

    #[test]
    fn test_dropped_events_are_reported_once() {
        let mut engine = AudioEngine::new();
        assert_eq!(engine.report_dropped_events(), 0);

        engine.mixer.params().add_dropped_events(3);
        assert_eq!(engine.report_dropped_events(), 3);
        assert_eq!(engine.report_dropped_events(), 0);

        engine.mixer.params().add_dropped_events(1);
        assert_eq!(engine.report_dropped_events(), 1);
    }

    #[test]
    fn test_parameters_preconfigure_without_session() {
        let mut engine = AudioEngine::new();
        let strip = engine.strip(Deck::Right);
        strip.set_filter(50.0).unwrap();
        assert!(strip.set_gain(101.0).is_err());

        engine.set_crossfader(100.0).unwrap();
        assert!(engine.set_volume(Deck::Left, f32::NAN).is_err());
        assert_eq!(engine.mixer_state().crossfader(), 100.0);
        assert_eq!(engine.deck_state(Deck::Right), StripState::Idle);
    }

    #[test]
    fn test_effect_chain_without_session() {
        let mut engine = AudioEngine::new();
        assert_eq!(engine.apply_preset(Deck::Left, "space").unwrap(), EffectPreset::Space);
        assert_eq!(engine.effect_chain(Deck::Left).get_nodes(), vec![EffectNode::Reverb]);
        assert!(engine.effect_chain(Deck::Right).is_empty());

        assert!(engine.move_node(Deck::Left, 0, 3).is_err());
        engine.set_node_bypass(Deck::Left, EffectNode::Reverb, true).unwrap();
        assert_eq!(
            engine.strip(Deck::Left).params().bypass_mask(),
            EffectNode::Reverb.bit()
        );
    }

    #[test]
    fn test_sample_bank_without_session() {
        let mut engine = AudioEngine::new();
        assert_eq!(engine.sample_bank(), SampleBank::Drums);
        engine.set_sample_bank(SampleBank::Fx);
        assert_eq!(engine.sample_bank(), SampleBank::Fx);

        assert!(matches!(engine.trigger_pad(0), Err(EngineError::NotRunning)));
        assert!(matches!(
            engine.load_pad(0, tone(44_100, 0.1)),
            Err(EngineError::NotRunning)
        ));
        assert!(matches!(
            engine.load_sample_bank("/no/such/dir"),
            Err(EngineError::NotRunning)
        ));
    }

    #[test]
    fn test_reanalyze_idle_deck() {
        let mut engine = AudioEngine::new();
        assert!(matches!(
            engine.reanalyze(Deck::Left),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_shut_down_when_not_running() {
        let mut engine = AudioEngine::new();
        engine.shut_down();
        engine.shut_down();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_audio_engine_ping_pong() {
        let Some(mut engine) = running_engine() else {
            return;
        };
        assert!(matches!(engine.run(), Err(EngineError::AlreadyRunning)));

        engine.ping().unwrap();
        assert!(wait_for(&mut engine, |msg| *msg == AudioMessage::Pong()));
        engine.shut_down();
    }

    #[test]
    fn test_audio_engine_deck_lifecycle() {
        let Some(mut engine) = running_engine() else {
            return;
        };

        // Loading at a foreign rate resamples to the device rate.
        let strip = engine.load(Deck::Left, tone(22_050, 1.0)).unwrap();
        assert_eq!(strip.deck(), Deck::Left);
        assert_eq!(engine.deck_state(Deck::Left), StripState::Loaded);
        assert!(engine.analysis(Deck::Left).is_some());

        engine.play(Deck::Left).unwrap();
        assert_eq!(engine.deck_state(Deck::Left), StripState::Playing);
        engine.stop(Deck::Left).unwrap();
        assert_eq!(engine.deck_state(Deck::Left), StripState::Loaded);

        assert!(matches!(
            engine.play(Deck::Right),
            Err(EngineError::InvalidState { .. })
        ));

        engine.unload(Deck::Left).unwrap();
        assert_eq!(engine.deck_state(Deck::Left), StripState::Idle);
        // Load was #1, unload is #2.
        assert!(wait_for(&mut engine, |msg| matches!(
            msg,
            AudioMessage::Released { seq: 2 }
        )));
        assert!(engine.releases.is_empty());

        engine.shut_down();
        assert_eq!(engine.deck_state(Deck::Left), StripState::Idle);
    }

    #[test]
    fn test_stop_all_stops_both_decks() {
        let Some(mut engine) = running_engine() else {
            return;
        };
        let rate = engine.output_sample_rate().unwrap_or(44_100);
        for deck in Deck::ALL {
            engine.load(deck, tone(rate, 2.0)).unwrap();
            engine.play(deck).unwrap();
        }

        engine.stop_all().unwrap();
        for deck in Deck::ALL {
            assert_eq!(engine.deck_state(deck), StripState::Loaded);
        }
        engine.play(Deck::Right).unwrap();
        assert_eq!(engine.deck_state(Deck::Right), StripState::Playing);
        engine.shut_down();
    }

    #[test]
    fn test_sample_pads_load_and_trigger() {
        let Some(mut engine) = running_engine() else {
            return;
        };
        assert!(!engine.trigger_pad(0).unwrap());
        assert!(engine.trigger_pad(4).is_err());

        engine.load_pad(0, tone(22_050, 0.2)).unwrap();
        assert!(engine.is_pad_loaded(SampleBank::Drums, 0));
        assert!(!engine.is_pad_loaded(SampleBank::Fx, 0));
        assert!(engine.trigger_pad(0).unwrap());

        // Replacing the sample is acknowledged like a deck load.
        engine.load_pad(0, tone(44_100, 0.1)).unwrap();
        assert!(wait_for(&mut engine, |msg| matches!(
            msg,
            AudioMessage::Released { seq: 2 }
        )));
        assert!(engine.releases.is_empty());

        engine.shut_down();
        assert!(!engine.is_pad_loaded(SampleBank::Drums, 0));
    }

    #[test]
    fn test_load_sample_bank_skips_missing_files() {
        let Some(mut engine) = running_engine() else {
            return;
        };
        let tmp = tempfile::tempdir().unwrap();
        let clap: Vec<i16> = (0..4_410).map(|n| ((n % 100) as i16 - 50) * 200).collect();
        sample_loader::tests::write_pcm16_wav(&tmp.path().join("clap.wav"), 1, 44_100, &clap)
            .unwrap();

        engine.set_sample_bank(SampleBank::Fx);
        assert_eq!(engine.load_sample_bank(tmp.path()).unwrap(), 1);
        assert!(engine.is_pad_loaded(SampleBank::Fx, 3));
        assert!(!engine.is_pad_loaded(SampleBank::Fx, 0));
        assert!(!engine.is_pad_loaded(SampleBank::Drums, 3));
        assert!(engine.trigger_pad(3).unwrap());
    }

    #[test]
    fn test_load_file_async_reports_missing_file() {
        let Some(mut engine) = running_engine() else {
            return;
        };
        engine
            .load_file_async(Deck::Right, "/definitely/not/here.wav")
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut saw_error = false;
        while Instant::now() < deadline && !saw_error {
            match engine.poll_loader_event() {
                Some(LoaderEvent::Error { deck, task, error }) => {
                    assert_eq!(deck, Deck::Right);
                    assert_eq!(task, BackgroundTaskKind::Decoding);
                    assert!(error.contains("File not found"));
                    saw_error = true;
                }
                Some(_) => {}
                None => thread::sleep(Duration::from_millis(5)),
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn test_spectrum_monitor_is_taken_once() {
        let Some(mut engine) = running_engine() else {
            return;
        };
        assert!(engine.take_spectrum_monitor().unwrap().is_some());
        assert!(engine.take_spectrum_monitor().unwrap().is_none());
    }
}
