//! Per-band spectral energy.

use serde::Serialize;
use serde::ser::SerializeMap;

use crate::analysis::spectral::{MAX_MAGNITUDE, SpectralFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EnergyBand {
    Sub,
    Bass,
    LowMid,
    Mid,
    HighMid,
    High,
}

impl EnergyBand {
    pub const ALL: [EnergyBand; 6] = [
        EnergyBand::Sub,
        EnergyBand::Bass,
        EnergyBand::LowMid,
        EnergyBand::Mid,
        EnergyBand::HighMid,
        EnergyBand::High,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            EnergyBand::Sub => "sub",
            EnergyBand::Bass => "bass",
            EnergyBand::LowMid => "lowMid",
            EnergyBand::Mid => "mid",
            EnergyBand::HighMid => "highMid",
            EnergyBand::High => "high",
        }
    }

    /// `(low, high)` edges in Hz.
    pub fn range_hz(self) -> (f32, f32) {
        match self {
            EnergyBand::Sub => (20.0, 60.0),
            EnergyBand::Bass => (60.0, 250.0),
            EnergyBand::LowMid => (250.0, 500.0),
            EnergyBand::Mid => (500.0, 2_000.0),
            EnergyBand::HighMid => (2_000.0, 4_000.0),
            EnergyBand::High => (4_000.0, 20_000.0),
        }
    }

    /// Bin index range `[floor(low·W/sr), ceil(high·W/sr))`, clipped to `bin_count`.
    pub fn bins(self, sample_rate: u32, window_size: usize, bin_count: usize) -> std::ops::Range<usize> {
        let (low, high) = self.range_hz();
        let scale = window_size as f32 / sample_rate.max(1) as f32;
        let start = ((low * scale).floor() as usize).min(bin_count);
        let end = ((high * scale).ceil() as usize).min(bin_count);
        start..end.max(start)
    }
}

/// Normalized energy per band, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergyProfile([f32; 6]);

impl EnergyProfile {
    pub fn get(&self, band: EnergyBand) -> f32 {
        self.0[band.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (EnergyBand, f32)> + '_ {
        EnergyBand::ALL.into_iter().map(|band| (band, self.get(band)))
    }

    /// Mean magnitude per band of one frame, divided by 255. Empty bands report 0.
    pub fn from_frame(frame: &SpectralFrame) -> Self {
        let magnitudes = frame.magnitudes();
        let values = EnergyBand::ALL.map(|band| {
            let bins = band.bins(frame.sample_rate(), frame.window_size(), magnitudes.len());
            if bins.is_empty() {
                return 0.0;
            }
            let count = bins.len() as f32;
            let mean = magnitudes[bins].iter().sum::<f32>() / count;
            (mean / MAX_MAGNITUDE).clamp(0.0, 1.0)
        });
        Self(values)
    }

    /// Mean of per-frame profiles; all zeros for no frames.
    pub fn mean_of<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = SpectralFrame>,
    {
        let mut sums = [0.0f32; 6];
        let mut count = 0usize;
        for frame in frames {
            let profile = Self::from_frame(&frame);
            for (sum, value) in sums.iter_mut().zip(profile.0) {
                *sum += value;
            }
            count += 1;
        }

        if count == 0 {
            return Self::default();
        }
        Self(sums.map(|sum| (sum / count as f32).clamp(0.0, 1.0)))
    }
}

impl Serialize for EnergyProfile {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(EnergyBand::ALL.len()))?;
        for (band, value) in self.iter() {
            map.serialize_entry(band.name(), &value)?;
        }
        map.end()
    }
}
