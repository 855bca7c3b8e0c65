//! Send effects rendered in parallel with the dry deck signal.
//!
//! Each effect returns only its wet signal; the channel strip scales it by the send level and
//! sums it with the dry path. All buffers are allocated up front so `process` never allocates.

use std::f32::consts::PI;

use crate::audio_engine::constants::{DELAY_FEEDBACK, DELAY_TIME_SECONDS};

/// Stereo circular buffer with integer and fractional taps.
#[derive(Debug, Clone)]
struct DelayLine {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            buffer_l: vec![0.0; capacity],
            buffer_r: vec![0.0; capacity],
            write_pos: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buffer_l.len()
    }

    #[inline]
    fn read(&self, delay_samples: usize) -> (f32, f32) {
        let len = self.capacity();
        let delay = delay_samples.clamp(1, len - 1);
        let read_pos = (self.write_pos + len - delay) % len;
        (self.buffer_l[read_pos], self.buffer_r[read_pos])
    }

    /// Linearly interpolated tap `delay_samples` behind the write head.
    #[inline]
    fn read_frac(&self, delay_samples: f32) -> (f32, f32) {
        let len = self.capacity();
        let delay = delay_samples.clamp(1.0, (len - 2) as f32);
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;

        let a = (self.write_pos + len - whole) % len;
        let b = (a + len - 1) % len;
        (
            self.buffer_l[a] + (self.buffer_l[b] - self.buffer_l[a]) * frac,
            self.buffer_r[a] + (self.buffer_r[b] - self.buffer_r[a]) * frac,
        )
    }

    #[inline]
    fn write(&mut self, left: f32, right: f32) {
        self.buffer_l[self.write_pos] = left;
        self.buffer_r[self.write_pos] = right;
        self.write_pos = (self.write_pos + 1) % self.capacity();
    }

    fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

/// Fixed-time feedback echo.
#[derive(Debug, Clone)]
pub struct EchoDelay {
    line: DelayLine,
    delay_samples: usize,
    feedback: f32,
}

impl EchoDelay {
    pub fn new(sample_rate: f32) -> Self {
        let delay_samples = ((DELAY_TIME_SECONDS * sample_rate).round() as usize).max(1);
        Self {
            line: DelayLine::new(delay_samples + 1),
            delay_samples,
            feedback: DELAY_FEEDBACK,
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let (delayed_l, delayed_r) = self.line.read(self.delay_samples);
        self.line
            .write(left + delayed_l * self.feedback, right + delayed_r * self.feedback);
        (delayed_l, delayed_r)
    }

    pub fn reset(&mut self) {
        self.line.reset();
    }
}

/// Comb/allpass lengths in samples at 44.1 kHz.
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];
const STEREO_SPREAD: usize = 23;

const ROOM_FEEDBACK: f32 = 0.84;
const ROOM_DAMPING: f32 = 0.2;
const ALLPASS_FEEDBACK: f32 = 0.5;
const COMB_GAIN: f32 = 0.2;

#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output * (1.0 - ROOM_DAMPING) + self.filter_state * ROOM_DAMPING;
        self.buffer[self.pos] = input + self.filter_state * ROOM_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
    }
}

#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        buffered - input
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Freeverb-style room: eight damped combs into four allpasses per side.
#[derive(Debug, Clone)]
pub struct Reverb {
    combs_l: Vec<CombFilter>,
    combs_r: Vec<CombFilter>,
    allpass_l: Vec<AllpassFilter>,
    allpass_r: Vec<AllpassFilter>,
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        let scale = sample_rate / 44_100.0;
        let scaled = |len: usize| (len as f32 * scale) as usize;

        Self {
            combs_l: COMB_LENGTHS.iter().map(|&len| CombFilter::new(scaled(len))).collect(),
            combs_r: COMB_LENGTHS
                .iter()
                .map(|&len| CombFilter::new(scaled(len + STEREO_SPREAD)))
                .collect(),
            allpass_l: ALLPASS_LENGTHS
                .iter()
                .map(|&len| AllpassFilter::new(scaled(len)))
                .collect(),
            allpass_r: ALLPASS_LENGTHS
                .iter()
                .map(|&len| AllpassFilter::new(scaled(len + STEREO_SPREAD)))
                .collect(),
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * 0.5;

        let mut out_l = 0.0f32;
        let mut out_r = 0.0f32;
        for comb in &mut self.combs_l {
            out_l += comb.process(input);
        }
        for comb in &mut self.combs_r {
            out_r += comb.process(input);
        }
        out_l *= COMB_GAIN;
        out_r *= COMB_GAIN;

        for ap in &mut self.allpass_l {
            out_l = ap.process(out_l);
        }
        for ap in &mut self.allpass_r {
            out_r = ap.process(out_r);
        }

        (out_l, out_r)
    }

    pub fn reset(&mut self) {
        self.combs_l.iter_mut().for_each(CombFilter::reset);
        self.combs_r.iter_mut().for_each(CombFilter::reset);
        self.allpass_l.iter_mut().for_each(AllpassFilter::reset);
        self.allpass_r.iter_mut().for_each(AllpassFilter::reset);
    }
}

/// Sine LFO in [-1, 1].
#[derive(Debug, Clone, Copy)]
struct Lfo {
    phase: f32,
    increment: f32,
}

impl Lfo {
    fn new(rate_hz: f32, sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            increment: rate_hz / sample_rate.max(1.0),
        }
    }

    #[inline]
    fn next(&mut self) -> f32 {
        let value = (2.0 * PI * self.phase).sin();
        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

const FLANGER_MIN_MS: f32 = 1.0;
const FLANGER_MAX_MS: f32 = 5.0;
const FLANGER_RATE_HZ: f32 = 0.25;
const FLANGER_FEEDBACK: f32 = 0.5;

/// Short modulated delay; summed with the dry path it sweeps a comb filter.
#[derive(Debug, Clone)]
pub struct Flanger {
    line: DelayLine,
    lfo: Lfo,
    min_samples: f32,
    depth_samples: f32,
}

impl Flanger {
    pub fn new(sample_rate: f32) -> Self {
        let min_samples = FLANGER_MIN_MS * 0.001 * sample_rate;
        let max_samples = FLANGER_MAX_MS * 0.001 * sample_rate;
        Self {
            line: DelayLine::new(max_samples.ceil() as usize + 4),
            lfo: Lfo::new(FLANGER_RATE_HZ, sample_rate),
            min_samples,
            depth_samples: max_samples - min_samples,
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let sweep = (self.lfo.next() + 1.0) * 0.5;
        let delay = self.min_samples + self.depth_samples * sweep;
        let (wet_l, wet_r) = self.line.read_frac(delay);
        self.line.write(
            left + wet_l * FLANGER_FEEDBACK,
            right + wet_r * FLANGER_FEEDBACK,
        );
        (wet_l, wet_r)
    }

    pub fn reset(&mut self) {
        self.line.reset();
        self.lfo.reset();
    }
}

const PHASER_STAGES: usize = 4;
const PHASER_MIN_HZ: f32 = 200.0;
const PHASER_MAX_HZ: f32 = 1_600.0;
const PHASER_RATE_HZ: f32 = 0.5;
const PHASER_FEEDBACK: f32 = 0.3;

#[derive(Debug, Clone, Copy, Default)]
struct AllpassStage {
    x1: f32,
    y1: f32,
}

impl AllpassStage {
    #[inline]
    fn process(&mut self, coeff: f32, x: f32) -> f32 {
        let y = coeff * x + self.x1 - coeff * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }
}

/// Four first-order allpasses with a swept corner; summed with the dry path it moves notches.
#[derive(Debug, Clone)]
pub struct Phaser {
    stages: [[AllpassStage; PHASER_STAGES]; 2],
    last: [f32; 2],
    lfo: Lfo,
    sample_rate: f32,
}

impl Phaser {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            stages: [[AllpassStage::default(); PHASER_STAGES]; 2],
            last: [0.0; 2],
            lfo: Lfo::new(PHASER_RATE_HZ, sample_rate),
            sample_rate: sample_rate.max(1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let sweep = (self.lfo.next() + 1.0) * 0.5;
        let corner_hz = PHASER_MIN_HZ * (PHASER_MAX_HZ / PHASER_MIN_HZ).powf(sweep);
        let t = (PI * corner_hz / self.sample_rate).tan();
        let coeff = (t - 1.0) / (t + 1.0);

        let mut out = [left, right];
        for ((sample, stages), last) in out
            .iter_mut()
            .zip(self.stages.iter_mut())
            .zip(self.last.iter_mut())
        {
            let mut x = *sample + *last * PHASER_FEEDBACK;
            for stage in stages.iter_mut() {
                x = stage.process(coeff, x);
            }
            *last = x;
            *sample = x;
        }
        (out[0], out[1])
    }

    pub fn reset(&mut self) {
        self.stages = [[AllpassStage::default(); PHASER_STAGES]; 2];
        self.last = [0.0; 2];
        self.lfo.reset();
    }
}
