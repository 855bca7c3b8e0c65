//! Biquad building blocks for the deck EQ and the resonant deck filter.

use std::f32::consts::PI;

use crate::audio_engine::constants::{
    EQ_HIGH_SHELF_HZ, EQ_LOW_SHELF_HZ, EQ_MID_PEAK_HZ, EQ_MID_Q, FILTER_Q,
};

/// Shelf slope; 1.0 is the steepest slope without overshoot.
const SHELF_SLOPE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    pub fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Gain at 0 Hz.
    pub fn dc_gain(&self) -> f32 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    z1: f32,
    z2: f32,
}

#[inline]
fn biquad_process(coeffs: &BiquadCoeffs, state: &mut BiquadState, x: f32) -> f32 {
    let y = coeffs.b0 * x + state.z1;
    state.z1 = coeffs.b1 * x - coeffs.a1 * y + state.z2;
    state.z2 = coeffs.b2 * x - coeffs.a2 * y;
    y
}

fn clamp_freq_hz(fs_hz: f32, freq_hz: f32) -> f32 {
    if !fs_hz.is_finite() || fs_hz <= 0.0 {
        return freq_hz.max(1.0);
    }

    let nyquist = fs_hz * 0.5;
    let max_hz = (nyquist * 0.9).max(1.0);
    freq_hz.clamp(1.0, max_hz)
}

fn normalize_biquad(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> BiquadCoeffs {
    if !a0.is_finite() || a0.abs() < 1e-12 {
        return BiquadCoeffs::identity();
    }

    let inv_a0 = 1.0 / a0;
    let coeffs = BiquadCoeffs {
        b0: b0 * inv_a0,
        b1: b1 * inv_a0,
        b2: b2 * inv_a0,
        a1: a1 * inv_a0,
        a2: a2 * inv_a0,
    };

    if [coeffs.b0, coeffs.b1, coeffs.b2, coeffs.a1, coeffs.a2]
        .iter()
        .all(|v| v.is_finite())
    {
        coeffs
    } else {
        BiquadCoeffs::identity()
    }
}

fn angular(fs_hz: f32, freq_hz: f32) -> (f32, f32) {
    let freq_hz = clamp_freq_hz(fs_hz, freq_hz);
    let w0 = 2.0 * PI * freq_hz / fs_hz;
    (w0.cos(), w0.sin())
}

fn shelf_gain(gain_db: f32) -> f32 {
    if gain_db.is_finite() {
        10.0_f32.powf(gain_db / 40.0)
    } else {
        1.0
    }
}

pub fn biquad_low_shelf(fs_hz: f32, freq_hz: f32, gain_db: f32) -> BiquadCoeffs {
    if !fs_hz.is_finite() || fs_hz <= 0.0 {
        return BiquadCoeffs::identity();
    }

    let a = shelf_gain(gain_db);
    let (cos_w0, sin_w0) = angular(fs_hz, freq_hz);
    let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt();
    let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

    let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha);
    let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0);
    let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha);
    let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
    let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0);
    let a2 = (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha;

    normalize_biquad(b0, b1, b2, a0, a1, a2)
}

pub fn biquad_high_shelf(fs_hz: f32, freq_hz: f32, gain_db: f32) -> BiquadCoeffs {
    if !fs_hz.is_finite() || fs_hz <= 0.0 {
        return BiquadCoeffs::identity();
    }

    let a = shelf_gain(gain_db);
    let (cos_w0, sin_w0) = angular(fs_hz, freq_hz);
    let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt();
    let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

    let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha);
    let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
    let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha);
    let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
    let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
    let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha;

    normalize_biquad(b0, b1, b2, a0, a1, a2)
}

pub fn biquad_peaking(fs_hz: f32, freq_hz: f32, q: f32, gain_db: f32) -> BiquadCoeffs {
    if !fs_hz.is_finite() || fs_hz <= 0.0 || q <= 0.0 {
        return BiquadCoeffs::identity();
    }

    let a = shelf_gain(gain_db);
    let (cos_w0, sin_w0) = angular(fs_hz, freq_hz);
    let alpha = sin_w0 / (2.0 * q);

    let b0 = 1.0 + alpha * a;
    let b1 = -2.0 * cos_w0;
    let b2 = 1.0 - alpha * a;
    let a0 = 1.0 + alpha / a;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha / a;

    normalize_biquad(b0, b1, b2, a0, a1, a2)
}

pub fn biquad_low_pass(fs_hz: f32, freq_hz: f32, q: f32) -> BiquadCoeffs {
    if !fs_hz.is_finite() || fs_hz <= 0.0 || q <= 0.0 {
        return BiquadCoeffs::identity();
    }

    let (cos_w0, sin_w0) = angular(fs_hz, freq_hz);
    let alpha = sin_w0 / (2.0 * q);

    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = (1.0 - cos_w0) * 0.5;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;

    normalize_biquad(b0, b1, b2, a0, a1, a2)
}

/// Low shelf → mid peak → high shelf, stereo.
#[derive(Debug, Clone)]
pub struct DeckEq {
    coeffs: [BiquadCoeffs; 3],
    state: [[BiquadState; 3]; 2],
}

impl DeckEq {
    pub fn new() -> Self {
        Self {
            coeffs: [BiquadCoeffs::identity(); 3],
            state: [[BiquadState::default(); 3]; 2],
        }
    }

    /// Recomputes the three stages for gains in dB (low, mid, high).
    pub fn update(&mut self, fs_hz: f32, gains_db: [f32; 3]) {
        self.coeffs = [
            biquad_low_shelf(fs_hz, EQ_LOW_SHELF_HZ, gains_db[0]),
            biquad_peaking(fs_hz, EQ_MID_PEAK_HZ, EQ_MID_Q, gains_db[1]),
            biquad_high_shelf(fs_hz, EQ_HIGH_SHELF_HZ, gains_db[2]),
        ];
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let mut out = [left, right];
        for (sample, stages) in out.iter_mut().zip(self.state.iter_mut()) {
            for (coeffs, stage) in self.coeffs.iter().zip(stages.iter_mut()) {
                *sample = biquad_process(coeffs, stage, *sample);
            }
        }
        (out[0], out[1])
    }

    pub fn reset(&mut self) {
        self.state = [[BiquadState::default(); 3]; 2];
    }
}

impl Default for DeckEq {
    fn default() -> Self {
        Self::new()
    }
}

/// Stereo resonant low-pass used as the deck filter.
#[derive(Debug, Clone)]
pub struct ResonantFilter {
    coeffs: BiquadCoeffs,
    state: [BiquadState; 2],
}

impl ResonantFilter {
    pub fn new() -> Self {
        Self {
            coeffs: BiquadCoeffs::identity(),
            state: [BiquadState::default(); 2],
        }
    }

    pub fn update(&mut self, fs_hz: f32, cutoff_hz: f32) {
        self.coeffs = biquad_low_pass(fs_hz, cutoff_hz, FILTER_Q);
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (
            biquad_process(&self.coeffs, &mut self.state[0], left),
            biquad_process(&self.coeffs, &mut self.state[1], right),
        )
    }

    pub fn reset(&mut self) {
        self.state = [BiquadState::default(); 2];
    }
}

impl Default for ResonantFilter {
    fn default() -> Self {
        Self::new()
    }
}
