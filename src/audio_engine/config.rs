//! Runtime engine configuration.

use crate::analysis::AnalysisConfig;
use crate::audio_engine::constants::{
    CONTROL_QUEUE_CAPACITY, EVENT_QUEUE_CAPACITY, PARAM_RAMP_SECONDS, SPECTRUM_QUEUE_CAPACITY,
    STREAM_BUFFER_FRAMES,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Requested device buffer size in frames. `None` lets the host pick.
    pub stream_buffer_frames: Option<u32>,

    pub control_queue_capacity: usize,
    pub event_queue_capacity: usize,

    /// Mono master samples buffered for the spectrum monitor.
    pub spectrum_queue_capacity: usize,

    /// Length of every gain and parameter ramp.
    pub ramp_seconds: f32,

    pub analysis: AnalysisConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_buffer_frames: Some(STREAM_BUFFER_FRAMES),
            control_queue_capacity: CONTROL_QUEUE_CAPACITY,
            event_queue_capacity: EVENT_QUEUE_CAPACITY,
            spectrum_queue_capacity: SPECTRUM_QUEUE_CAPACITY,
            ramp_seconds: PARAM_RAMP_SECONDS,
            analysis: AnalysisConfig::default(),
        }
    }
}
