//! Linear parameter ramps driven by the audio clock.
//!
//! A new target read from a parameter slot schedules a ramp that starts at the current sample
//! and lasts a fixed number of frames, so gain and coefficient changes never jump.

#[derive(Debug, Clone, Copy)]
pub struct ParamRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: usize,
    ramp_frames: usize,
}

impl ParamRamp {
    pub fn new(value: f32, ramp_frames: usize) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
            ramp_frames: ramp_frames.max(1),
        }
    }

    /// Ramp length for `seconds` at `sample_rate`.
    pub fn frames_for(seconds: f32, sample_rate: f32) -> usize {
        ((seconds * sample_rate).round() as usize).max(1)
    }

    /// Schedules a ramp toward `target` starting at the next sample.
    ///
    /// Non-finite targets are ignored; an unchanged target leaves a running ramp alone.
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        if !target.is_finite() || target == self.target {
            return;
        }

        self.target = target;
        self.remaining = self.ramp_frames;
        self.step = (target - self.current) / self.ramp_frames as f32;
    }

    /// Jumps straight to `value`, cancelling any ramp.
    pub fn snap(&mut self, value: f32) {
        if !value.is_finite() {
            return;
        }
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Advances one sample and returns the value for it.
    #[inline]
    pub fn next_value(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}
