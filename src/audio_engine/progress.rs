use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use crate::messages::{Deck, LoaderEvent};

/// Phases of a background load, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadProgressStage {
    Decoding,
    Resampling,
    ChannelMapping,
    Analyzing,
    Publishing,
}

impl LoadProgressStage {
    pub fn stage_label(self) -> &'static str {
        match self {
            Self::Decoding => "Decoding…",
            Self::Resampling => "Resampling…",
            Self::ChannelMapping => "Mapping channels…",
            Self::Analyzing => "Analyzing…",
            Self::Publishing => "Publishing…",
        }
    }

    /// Slice of the total progress bar this stage covers.
    fn range(self, resampling_required: bool) -> (f32, f32) {
        if !resampling_required {
            return match self {
                Self::Decoding => (0.0, 0.5),
                Self::Resampling => (0.5, 0.5),
                Self::ChannelMapping => (0.5, 0.55),
                Self::Analyzing => (0.55, 0.95),
                Self::Publishing => (0.95, 1.0),
            };
        }

        match self {
            Self::Decoding => (0.0, 0.35),
            Self::Resampling => (0.35, 0.6),
            Self::ChannelMapping => (0.6, 0.65),
            Self::Analyzing => (0.65, 0.95),
            Self::Publishing => (0.95, 1.0),
        }
    }
}

/// Throttled progress sender for one deck's load.
pub struct ProgressReporter {
    deck: Deck,
    tx: Sender<LoaderEvent>,
    last_emit: Instant,
    min_interval: Duration,
    pub resampling_required: Option<bool>,
}

impl ProgressReporter {
    pub fn new(deck: Deck, tx: Sender<LoaderEvent>) -> Self {
        Self::with_interval(deck, tx, Duration::from_millis(100))
    }

    pub fn with_interval(deck: Deck, tx: Sender<LoaderEvent>, min_interval: Duration) -> Self {
        Self {
            deck,
            tx,
            last_emit: Instant::now()
                .checked_sub(min_interval)
                .unwrap_or_else(Instant::now),
            min_interval,
            resampling_required: None,
        }
    }

    /// Sends a progress event unless one went out less than `min_interval` ago.
    ///
    /// `force` bypasses the throttle; stage boundaries should always be forced.
    pub fn emit(
        &mut self,
        stage: LoadProgressStage,
        local_percent: f32,
        resampling_required: bool,
        force: bool,
    ) {
        let local_percent = if local_percent.is_finite() {
            local_percent.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let now = Instant::now();
        if !force && now.duration_since(self.last_emit) < self.min_interval {
            return;
        }
        self.last_emit = now;

        let resampling_required = *self.resampling_required.get_or_insert(resampling_required);

        let (start, end) = stage.range(resampling_required);
        let percent = (start + (end - start) * local_percent).clamp(0.0, 1.0);
        let stage = match stage {
            LoadProgressStage::Analyzing => stage.stage_label().to_string(),
            _ => format!("Loading ({})", stage.stage_label()),
        };
        let _ = self.tx.send(LoaderEvent::Progress {
            deck: self.deck,
            percent,
            stage,
        });
    }
}
