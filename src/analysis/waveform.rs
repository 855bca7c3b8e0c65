//! Waveform envelopes and beat grids. Pure functions of their inputs.

use serde::Serialize;

use crate::analysis::AnalysisError;
use crate::messages::AudioBuffer;

/// Beats per measure.
pub const BEATS_PER_MEASURE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WaveformPoint {
    pub min: f32,
    pub max: f32,
    pub avg: f32,
}

/// One point per output column.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct WaveformEnvelope(Vec<WaveformPoint>);

impl WaveformEnvelope {
    pub fn points(&self) -> &[WaveformPoint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn block_size(len: usize, width: usize) -> usize {
    len.div_ceil(width.max(1)).max(1)
}

/// Runs `f` over `width` equal blocks of the first channel.
///
/// `f` gets the real samples of the block and the padded block size; samples past the end of
/// the buffer count as 0.
fn map_blocks<T>(buffer: &AudioBuffer, width: usize, mut f: impl FnMut(&[f32], usize) -> T) -> Vec<T> {
    let samples: Vec<f32> = buffer.channel(0).collect();
    let block = block_size(samples.len(), width);

    (0..width)
        .map(|i| {
            let start = (i * block).min(samples.len());
            let end = (start + block).min(samples.len());
            f(&samples[start..end], block)
        })
        .collect()
}

/// Min/max/avg envelope of the first channel, exactly `width` points long.
pub fn waveform(buffer: &AudioBuffer, width: usize) -> WaveformEnvelope {
    let points = map_blocks(buffer, width, |block, size| {
        let padded = block.len() < size;
        let (mut min, mut max) = if padded { (0.0, 0.0) } else { (f32::MAX, f32::MIN) };
        for &sample in block {
            min = min.min(sample);
            max = max.max(sample);
        }
        WaveformPoint {
            min,
            max,
            avg: block.iter().sum::<f32>() / size as f32,
        }
    });
    WaveformEnvelope(points)
}

/// Mean absolute level per block, normalized so the loudest block is 1. Silent input is all 0.
pub fn overview(buffer: &AudioBuffer, width: usize) -> Vec<f32> {
    let levels = map_blocks(buffer, width, |block, size| {
        block.iter().map(|s| s.abs()).sum::<f32>() / size as f32
    });

    let loudest = levels.iter().copied().fold(0.0f32, f32::max);
    if loudest <= 0.0 || !loudest.is_finite() {
        return vec![0.0; levels.len()];
    }
    levels.into_iter().map(|level| level / loudest).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Beat {
    /// Seconds from the start of the track.
    pub time: f64,
    pub is_measure_start: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct BeatGrid(Vec<Beat>);

impl BeatGrid {
    pub fn beats(&self) -> &[Beat] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last beat at or before `time`.
    pub fn beat_at(&self, time: f64) -> Option<&Beat> {
        let index = self.0.partition_point(|beat| beat.time <= time);
        index.checked_sub(1).map(|i| &self.0[i])
    }
}

/// `floor(duration / (60/bpm))` beats spaced `60/bpm` seconds apart.
pub fn beat_grid(bpm: f32, duration_secs: f64) -> Result<BeatGrid, AnalysisError> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(AnalysisError::InvalidBpm(bpm));
    }
    if !duration_secs.is_finite() || duration_secs < 0.0 {
        return Err(AnalysisError::InvalidDuration(duration_secs));
    }

    let interval = 60.0 / f64::from(bpm);
    let total = (duration_secs / interval).floor() as usize;
    let beats = (0..total)
        .map(|i| Beat {
            time: i as f64 * interval,
            is_measure_start: i % BEATS_PER_MEASURE == 0,
        })
        .collect();
    Ok(BeatGrid(beats))
}
