//! Audio engine configuration constants and limits.

/// Lower bound of every normalized control (sliders, knobs, crossfader).
pub const CONTROL_MIN: f32 = 0.0;

/// Upper bound of every normalized control.
pub const CONTROL_MAX: f32 = 100.0;

/// Filter cutoff at control value 0.
pub const FILTER_MIN_HZ: f32 = 20.0;

/// Filter cutoff at control value 100.
pub const FILTER_MAX_HZ: f32 = 20_000.0;

/// Exponent of the control → cutoff curve.
pub const FILTER_CURVE_EXPONENT: i32 = 4;

/// Resonance of the deck filter.
pub const FILTER_Q: f32 = 1.0;

/// EQ boost/cut at the ends of the control range, in dB.
pub const EQ_RANGE_DB: f32 = 40.0;

/// Corner of the low shelf.
pub const EQ_LOW_SHELF_HZ: f32 = 320.0;

/// Center of the mid peak.
pub const EQ_MID_PEAK_HZ: f32 = 1_000.0;

/// Width of the mid peak.
pub const EQ_MID_Q: f32 = 0.5;

/// Corner of the high shelf.
pub const EQ_HIGH_SHELF_HZ: f32 = 3_200.0;

/// Delay send echo time.
pub const DELAY_TIME_SECONDS: f32 = 0.3;

/// Portion of the echo fed back into the delay line.
pub const DELAY_FEEDBACK: f32 = 0.35;

/// Default deck volume (control units).
pub const DEFAULT_VOLUME: f32 = 75.0;

/// Default crossfader position (control units).
pub const DEFAULT_CROSSFADER: f32 = 50.0;

/// Length of the linear ramp applied to every parameter change.
pub const PARAM_RAMP_SECONDS: f32 = 0.01;

/// Largest block rendered in one pass; bigger callbacks are split.
pub const MAX_BLOCK_FRAMES: usize = 1024;

/// Frames between coefficient refreshes while an EQ/filter parameter is ramping.
pub const COEFF_UPDATE_FRAMES: usize = 32;

/// Requested device buffer size in frames.
pub const STREAM_BUFFER_FRAMES: u32 = 512;

/// Capacity of the control → audio command ring.
pub const CONTROL_QUEUE_CAPACITY: usize = 1024;

/// Capacity of the audio → control event ring.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Capacity of the master-output tap read by the spectrum monitor.
pub const SPECTRUM_QUEUE_CAPACITY: usize = 16_384;

/// Hot cue slots per deck.
pub const NUM_HOT_CUES: usize = 4;

/// Beat loop lengths offered by the loop controls.
pub const LOOP_BEAT_OPTIONS: [u32; 4] = [1, 2, 4, 8];

/// Pads per sample bank.
pub const PADS_PER_BANK: usize = 4;

/// Pad sample slots across both banks.
pub const NUM_PAD_SLOTS: usize = PADS_PER_BANK * 2;

/// One-shot pad voices that can sound at once; further triggers are dropped.
pub const MAX_PAD_VOICES: usize = 16;

/// Gain applied to every pad voice.
pub const PAD_GAIN: f32 = 0.5;
