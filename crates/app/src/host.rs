use beatsnap_core::TransportInfo;

/// Length of the click rendered at every beat.
const CLICK_SECONDS: f64 = 0.01;
const CLICK_LEVEL: f32 = 0.8;

/// Stand-in for a plugin host: advances a musical position at a given tempo,
/// optionally looping, and renders a click at the start of every beat.
#[derive(Debug, Clone)]
pub struct SimulatedHost {
    sample_rate: f64,
    bpm: f64,
    ppq_position: f64,
    loop_beats: Option<f64>,
}

impl SimulatedHost {
    pub fn new(sample_rate: f64, bpm: f64, loop_beats: Option<f64>) -> Self {
        Self {
            sample_rate,
            bpm,
            ppq_position: 0.0,
            loop_beats: loop_beats.filter(|beats| *beats > 0.0),
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
    }

    pub fn ppq_position(&self) -> f64 {
        self.ppq_position
    }

    /// Renders the next block into `channels` and returns the transport as
    /// seen at the start of that block.
    pub fn next_block(&mut self, channels: &mut [&mut [f32]]) -> TransportInfo {
        let transport = TransportInfo::playing(self.bpm, self.ppq_position);
        let ppq_per_sample = self.bpm / 60.0 / self.sample_rate;
        let click_samples = CLICK_SECONDS * self.sample_rate;
        let block_len = channels.iter().map(|channel| channel.len()).min().unwrap_or(0);

        for i in 0..block_len {
            let ppq = self.ppq_position + i as f64 * ppq_per_sample;
            let since_beat = ppq.fract() / ppq_per_sample;
            let sample = if since_beat < click_samples {
                CLICK_LEVEL * (1.0 - since_beat / click_samples) as f32
            } else {
                0.0
            };
            for channel in channels.iter_mut() {
                channel[i] = sample;
            }
        }

        self.ppq_position += block_len as f64 * ppq_per_sample;
        if let Some(loop_beats) = self.loop_beats {
            if self.ppq_position >= loop_beats {
                self.ppq_position -= loop_beats;
            }
        }
        transport
    }
}
