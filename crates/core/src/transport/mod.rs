//! Host transport interpretation and beat-boundary detection.

/// Transport metadata reported by the host for one audio block.
///
/// Hosts may omit tempo or position; those are `None` rather than sentinel
/// numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransportInfo {
    pub bpm: Option<f64>,
    /// Musical position at the start of the block, in quarter notes.
    pub ppq_position: Option<f64>,
    pub is_playing: bool,
}

impl TransportInfo {
    /// Transport of a playing host at a known tempo and position.
    pub fn playing(bpm: f64, ppq_position: f64) -> Self {
        Self {
            bpm: Some(bpm),
            ppq_position: Some(ppq_position),
            is_playing: true,
        }
    }

    /// Tempo if present and usable as a divisor.
    pub fn valid_bpm(&self) -> Option<f64> {
        self.bpm.filter(|bpm| bpm.is_finite() && *bpm > 0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
}

/// Why a boundary fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    /// The integer beat advanced during normal playback.
    Forward,
    /// The position moved backwards (loop wrap or seek).
    Jump,
}

/// A beat boundary detected within one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatBoundary {
    /// Samples since the beat at the reported position, clamped to the block.
    pub offset: usize,
    pub kind: BoundaryKind,
}

/// Tracks the last observed musical position and reports beat crossings.
#[derive(Debug, Clone)]
pub struct TransportTracker {
    sample_rate: f64,
    last_ppq_position: f64,
    state: PlayState,
    beat_just_occurred: bool,
}

impl TransportTracker {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            last_ppq_position: 0.0,
            state: PlayState::Stopped,
            beat_just_occurred: false,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub(crate) fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn last_ppq_position(&self) -> f64 {
        self.last_ppq_position
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    /// Whether the most recent [`evaluate`](Self::evaluate) reported a beat.
    pub(crate) fn beat_just_occurred(&self) -> bool {
        self.beat_just_occurred
    }

    /// Evaluates one block of transport info.
    ///
    /// Returns the boundary found in this block, if any. The last observed
    /// position is only updated when the block carried a usable tempo and
    /// position while playing.
    pub fn evaluate(&mut self, info: &TransportInfo, num_samples: usize) -> Option<BeatBoundary> {
        self.beat_just_occurred = false;
        self.state = if info.is_playing {
            PlayState::Playing
        } else {
            PlayState::Stopped
        };

        if self.state != PlayState::Playing || num_samples == 0 {
            return None;
        }
        let (Some(bpm), Some(ppq)) = (info.valid_bpm(), info.ppq_position) else {
            return None;
        };
        if !ppq.is_finite() || !(self.sample_rate > 0.0) {
            return None;
        }

        let current_beat = ppq.floor();
        let last_beat = self.last_ppq_position.floor();
        let kind = if current_beat > last_beat {
            Some(BoundaryKind::Forward)
        } else if ppq < self.last_ppq_position {
            Some(BoundaryKind::Jump)
        } else {
            None
        };
        self.last_ppq_position = ppq;

        let kind = kind?;
        let ppq_per_sample = bpm / 60.0 / self.sample_rate;
        let beat_fraction = ppq - current_beat;
        let samples_since_beat = (beat_fraction / ppq_per_sample).round();
        let max_offset = (num_samples - 1) as f64;
        let offset = samples_since_beat.clamp(0.0, max_offset) as usize;

        self.beat_just_occurred = true;
        Some(BeatBoundary { offset, kind })
    }
}
