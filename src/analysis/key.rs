//! Musical key estimation from a pitch-class energy histogram.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::analysis::AnalysisError;
use crate::analysis::spectral::{SpectralFrame, SpectralFrameSource};
use crate::analysis::tempo::peak_to_mean_ratio;

const MAJOR_TRIAD: [usize; 3] = [0, 4, 7];
const MINOR_TRIAD: [usize; 3] = [0, 3, 7];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Pitch class for any integer, wrapping by octaves.
    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    /// `round(12·log2(f/440) + 69) mod 12`; `None` for 0 Hz and non-finite input.
    pub fn from_frequency(freq_hz: f32) -> Option<Self> {
        if !freq_hz.is_finite() || freq_hz <= 0.0 {
            return None;
        }
        let midi = (12.0 * (f64::from(freq_hz) / 440.0).log2() + 69.0).round();
        Some(Self::from_index(midi as i64))
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    fn interval_from(self, root: PitchClass) -> usize {
        (self.index() + 12 - root.index()) % 12
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for PitchClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Major,
    Minor,
}

/// Position on the Camelot wheel: 1..=12 plus A (minor) or B (major).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CamelotCode {
    pub number: u8,
    pub scale: Scale,
}

impl CamelotCode {
    pub fn letter(&self) -> char {
        match self.scale {
            Scale::Minor => 'A',
            Scale::Major => 'B',
        }
    }

    /// Steps around the wheel, 0..=6.
    fn distance(&self, other: &CamelotCode) -> u8 {
        let diff = self.number.abs_diff(other.number);
        diff.min(12 - diff)
    }
}

impl fmt::Display for CamelotCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, self.letter())
    }
}

impl Serialize for CamelotCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How well two keys mix, as shown next to the deck key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KeyCompatibility {
    PerfectMatch,
    RelativeKey,
    Compatible,
    UseCaution,
    KeyClash,
}

impl KeyCompatibility {
    pub fn label(self) -> &'static str {
        match self {
            KeyCompatibility::PerfectMatch => "Perfect Match",
            KeyCompatibility::RelativeKey => "Relative Key",
            KeyCompatibility::Compatible => "Compatible",
            KeyCompatibility::UseCaution => "Use Caution",
            KeyCompatibility::KeyClash => "Key Clash",
        }
    }
}

impl fmt::Display for KeyCompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyResult {
    pub root: PitchClass,
    pub scale: Scale,
    pub confidence: f32,
}

impl KeyResult {
    /// Short key name, e.g. `"C"` or `"F#m"`.
    pub fn name(&self) -> String {
        match self.scale {
            Scale::Major => self.root.name().to_string(),
            Scale::Minor => format!("{}m", self.root.name()),
        }
    }

    pub fn camelot(&self) -> CamelotCode {
        // Minor keys share the number of their relative major.
        let major_root = match self.scale {
            Scale::Major => self.root.index(),
            Scale::Minor => (self.root.index() + 3) % 12,
        };
        let number = ((7 * major_root) % 12 + 7) % 12 + 1;
        CamelotCode {
            number: number as u8,
            scale: self.scale,
        }
    }

    pub fn compatibility(&self, other: &KeyResult) -> KeyCompatibility {
        let (a, b) = (self.camelot(), other.camelot());
        let distance = a.distance(&b);
        let same_scale = a.scale == b.scale;

        match (distance, same_scale) {
            (0, true) => KeyCompatibility::PerfectMatch,
            (0, false) => KeyCompatibility::RelativeKey,
            (1, true) => KeyCompatibility::Compatible,
            (1, false) | (2, true) => KeyCompatibility::UseCaution,
            _ => KeyCompatibility::KeyClash,
        }
    }
}

/// Sums every non-DC bin's magnitude into its pitch class.
pub fn accumulate_pitch_classes<I>(frames: I) -> [f32; 12]
where
    I: IntoIterator<Item = SpectralFrame>,
{
    let mut totals = [0.0f32; 12];
    for frame in frames {
        for (k, &magnitude) in frame.magnitudes().iter().enumerate().skip(1) {
            if let Some(pitch) = PitchClass::from_frequency(frame.bin_frequency(k)) {
                totals[pitch.index()] += magnitude;
            }
        }
    }
    totals
}

/// Root, scale and confidence from accumulated pitch-class energy.
pub fn key_from_totals(totals: &[f32; 12]) -> Result<KeyResult, AnalysisError> {
    if totals.iter().all(|&energy| energy <= 0.0) {
        return Err(AnalysisError::NoKeyDetected);
    }

    let mut order: Vec<usize> = (0..12).collect();
    order.sort_by(|&a, &b| totals[b].total_cmp(&totals[a]).then(a.cmp(&b)));

    let root = PitchClass::ALL[order[0]];
    let intervals: Vec<usize> = order[..3]
        .iter()
        .map(|&index| PitchClass::ALL[index].interval_from(root))
        .collect();

    let matches = |template: &[usize; 3]| {
        intervals
            .iter()
            .filter(|interval| template.contains(interval))
            .count()
    };
    let scale = if matches(&MAJOR_TRIAD) >= matches(&MINOR_TRIAD) {
        Scale::Major
    } else {
        Scale::Minor
    };

    Ok(KeyResult {
        root,
        scale,
        confidence: peak_to_mean_ratio(totals),
    })
}

/// Estimates the key from `checkpoints` evenly spaced frames (every frame when there are fewer).
pub fn detect_key(
    source: &SpectralFrameSource,
    checkpoints: usize,
) -> Result<KeyResult, AnalysisError> {
    let count = source.frame_count();
    let n = checkpoints.min(count);
    if n == 0 {
        return Err(AnalysisError::NoKeyDetected);
    }

    let mut frames = source.frames();
    let mut next = 0;
    let sampled = (0..n).filter_map(move |i| {
        let index = i * count / n;
        let frame = frames.nth(index - next);
        next = index + 1;
        frame
    });

    key_from_totals(&accumulate_pitch_classes(sampled))
}
