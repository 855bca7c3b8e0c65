//! Audio Stream Module
//!
//! This module handles CPAL audio stream management including:
//! - Device selection and stream configuration
//! - Ring buffers between the control side and the callback
//! - The real-time callback: command draining, rendering and fault isolation

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Sample, Stream, StreamConfig};
use env_logger::{Builder, Env};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::audio_engine::channel_strip::ChannelStrip;
use crate::audio_engine::config::EngineConfig;
use crate::audio_engine::errors::EngineError;
use crate::audio_engine::mixer::RtMixer;
use crate::audio_engine::params::{MixerParams, StripParams};
use crate::audio_engine::ramp::ParamRamp;
use crate::messages::{AudioMessage, ControlMessage, Deck};

/// Handle to the audio stream with associated message channels
pub struct AudioStreamHandle {
    pub stream: Stream,
    pub producer: Producer<ControlMessage>,
    pub consumer: Consumer<AudioMessage>,
    /// Mono master tap; taken by the spectrum monitor.
    pub spectrum: Option<Consumer<f32>>,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Setup and configure the logger for audio operations
pub fn setup_logger() {
    // Default to `info`; override via `RUST_LOG`, e.g. `RUST_LOG=debug`.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

/// Drains pending commands, then renders one callback buffer.
///
/// Events that do not fit into the event ring are counted in
/// [`MixerParams::dropped_events`]. A panic anywhere in here leaves the buffer silent; the
/// stream keeps running.
fn process_block(
    mixer: &mut RtMixer,
    commands: &mut Consumer<ControlMessage>,
    events: &mut Producer<AudioMessage>,
    data: &mut [f32],
) {
    let mut dropped = 0u64;
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        while let Ok(message) = commands.pop() {
            if let Some(reply) = mixer.apply(message)
                && events.push(reply).is_err()
            {
                dropped += 1;
            }
        }
        mixer.render(data, |event| {
            if events.push(event).is_err() {
                dropped += 1;
            }
        });
    }));

    if dropped > 0 {
        mixer.params().add_dropped_events(dropped);
    }
    if result.is_err() {
        data.fill(Sample::EQUILIBRIUM);
    }
}

/// Create and configure the audio stream
///
/// This function:
/// 1. Opens the default output device
/// 2. Creates the command, event and spectrum ring buffers
/// 3. Builds both channel strips and the mixer for the device rate
/// 4. Builds and returns the (paused) output stream
pub fn create_audio_stream(
    config: &EngineConfig,
    strip_params: [Arc<StripParams>; 2],
    mixer_params: Arc<MixerParams>,
) -> Result<AudioStreamHandle, EngineError> {
    setup_logger();

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| EngineError::DeviceUnavailable("no output device found".to_string()))?;

    let device_config = device
        .default_output_config()
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;
    let sample_rate = device_config.sample_rate();
    let channels = device_config.channels();

    log::info!("Starting AudioEngine... ({} ch@{} Hz)", channels, sample_rate);

    let (producer_in, mut consumer_in) = RingBuffer::new(config.control_queue_capacity);
    let (mut producer_out, consumer_out) = RingBuffer::new(config.event_queue_capacity);
    let (spectrum_producer, spectrum_consumer) = RingBuffer::new(config.spectrum_queue_capacity);

    let ramp_frames = ParamRamp::frames_for(config.ramp_seconds, sample_rate as f32);
    let strips = Deck::ALL.map(|deck| {
        ChannelStrip::new(
            deck,
            strip_params[deck.index()].clone(),
            sample_rate as f32,
            ramp_frames,
        )
    });
    let mut mixer = RtMixer::new(
        channels as usize,
        strips,
        mixer_params,
        ramp_frames,
        Some(spectrum_producer),
    );

    let stream_config = StreamConfig {
        channels,
        sample_rate,
        buffer_size: config
            .stream_buffer_frames
            .map_or(BufferSize::Default, BufferSize::Fixed),
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                process_block(&mut mixer, &mut consumer_in, &mut producer_out, data);
            },
            |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| EngineError::DeviceUnavailable(format!("failed to build stream: {e}")))?;

    Ok(AudioStreamHandle {
        stream,
        producer: producer_in,
        consumer: consumer_out,
        spectrum: Some(spectrum_consumer),
        output_channels: channels as usize,
        output_sample_rate: sample_rate,
    })
}

/// Start playing the audio stream
pub fn start_stream(stream: &Stream) -> Result<(), EngineError> {
    stream
        .play()
        .map_err(|e| EngineError::DeviceUnavailable(format!("failed to start stream: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::mixer::Mixer;
    use crate::messages::AudioBuffer;

    fn rt_mixer() -> RtMixer {
        let strips = Deck::ALL.map(|deck| {
            ChannelStrip::new(deck, Arc::new(StripParams::default()), 48_000.0, 480)
        });
        RtMixer::new(2, strips, Mixer::default().params(), 480, None)
    }

    #[test]
    fn test_logger_setup() {
        // Multiple calls are safe; only the first takes effect.
        setup_logger();
        setup_logger();
    }

    #[test]
    fn test_process_block_answers_ping() {
        let mut mixer = rt_mixer();
        let (mut commands_tx, mut commands) = RingBuffer::new(8);
        let (mut events, mut events_rx) = RingBuffer::new(8);

        commands_tx.push(ControlMessage::Ping()).unwrap();
        let mut data = vec![1.0; 64];
        process_block(&mut mixer, &mut commands, &mut events, &mut data);

        assert!(matches!(events_rx.pop(), Ok(AudioMessage::Pong())));
        assert!(data.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_process_block_acknowledges_loads() {
        let mut mixer = rt_mixer();
        let (mut commands_tx, mut commands) = RingBuffer::new(8);
        let (mut events, mut events_rx) = RingBuffer::new(8);

        let buffer = AudioBuffer::from_mono(48_000, vec![0.5; 4_800]).unwrap();
        commands_tx
            .push(ControlMessage::LoadDeck {
                deck: Deck::Left,
                buffer,
                seq: 7,
            })
            .unwrap();
        commands_tx
            .push(ControlMessage::PlayDeck {
                deck: Deck::Left,
                generation: 1,
            })
            .unwrap();

        let mut data = vec![0.0; 256];
        process_block(&mut mixer, &mut commands, &mut events, &mut data);

        assert!(matches!(
            events_rx.pop(),
            Ok(AudioMessage::Released { seq: 7 })
        ));
        assert!(data.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_full_event_ring_counts_drops() {
        let mut mixer = rt_mixer();
        let (mut commands_tx, mut commands) = RingBuffer::new(8);
        let (mut events, mut events_rx) = RingBuffer::new(1);

        let buffer = AudioBuffer::from_mono(48_000, vec![0.5; 32]).unwrap();
        commands_tx.push(ControlMessage::Ping()).unwrap();
        commands_tx
            .push(ControlMessage::LoadDeck {
                deck: Deck::Right,
                buffer,
                seq: 1,
            })
            .unwrap();
        commands_tx
            .push(ControlMessage::PlayDeck {
                deck: Deck::Right,
                generation: 1,
            })
            .unwrap();

        // Pong fits; Released and the end of the 32-frame track do not.
        let mut data = vec![0.0; 256];
        process_block(&mut mixer, &mut commands, &mut events, &mut data);

        assert!(matches!(events_rx.pop(), Ok(AudioMessage::Pong())));
        assert!(events_rx.pop().is_err());
        assert_eq!(mixer.params().dropped_events(), 2);

        process_block(&mut mixer, &mut commands, &mut events, &mut data);
        assert_eq!(mixer.params().dropped_events(), 2);
    }

    #[test]
    fn test_audio_stream_creation() {
        // Stream creation requires audio hardware.
        if cpal::default_host().default_output_device().is_none() {
            return;
        }

        let params = [
            Arc::new(StripParams::default()),
            Arc::new(StripParams::default()),
        ];
        // Headless CI hosts may list a device that cannot be opened.
        if let Ok(handle) =
            create_audio_stream(&EngineConfig::default(), params, Mixer::default().params())
        {
            assert!(handle.output_sample_rate > 0);
            assert!(handle.spectrum.is_some());
        }
    }
}
