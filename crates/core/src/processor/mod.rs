use std::fmt;

use crate::{
    align, capacity_for, AppConfig, BeatBuffer, BeatError, BeatEvent, ConsumerPort,
    DispatchStats, PersistedState, Result, SnapshotDispatcher, SnapshotReceiver, SnapshotStamp,
    TrackerConfig, TransportInfo, TransportTracker,
};

/// The audio-callback side of the engine.
///
/// [`process_block`](Self::process_block) is real-time safe: it never locks,
/// never blocks and does not allocate unless the host tempo drops below
/// [`TrackerConfig::reserve_min_bpm`]. Tempos under
/// [`TrackerConfig::min_bpm`] are ignored outright. Everything else on this
/// type is meant to be called from a non-real-time context; consumers that
/// arrive once the processor lives on the audio thread go through a
/// [`ConsumerPort`].
pub struct BeatProcessor {
    config: TrackerConfig,
    sample_rate: f64,
    tracker: TransportTracker,
    buffer: BeatBuffer,
    dispatcher: SnapshotDispatcher,
    beats: u64,
}

impl BeatProcessor {
    /// Creates a processor that is ready to run at `sample_rate`.
    pub fn new(config: TrackerConfig, sample_rate: f64, input_channels: usize) -> Result<Self> {
        config.validate()?;
        let dispatcher = SnapshotDispatcher::new(input_channels, 1, config.snapshot_slots);
        let mut processor = Self {
            config,
            sample_rate: 0.0,
            tracker: TransportTracker::new(0.0),
            buffer: BeatBuffer::new(0, 1),
            dispatcher,
            beats: 0,
        };
        processor.prepare(sample_rate, input_channels)?;
        Ok(processor)
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.audio.validate()?;
        Self::new(
            config.tracker.clone(),
            f64::from(config.audio.sample_rate),
            config.audio.input_channels,
        )
    }

    /// Resets the beat buffer for a new stream. Until the host reports a
    /// tempo the buffer is sized for the configured fallback tempo. An
    /// attached consumer keeps its receiver; its snapshot pool is resized to
    /// match.
    pub fn prepare(&mut self, sample_rate: f64, input_channels: usize) -> Result<()> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(BeatError::InvalidConfig("sample rate must be positive"));
        }
        if input_channels == 0 {
            return Err(BeatError::InvalidConfig(
                "at least one input channel is required",
            ));
        }
        let capacity = capacity_for(self.config.fallback_bpm, sample_rate)
            .ok_or(BeatError::InvalidConfig("fallback bpm must be positive"))?;
        let reserve = capacity_for(self.config.reserve_min_bpm, sample_rate)
            .unwrap_or(capacity)
            .max(capacity);

        self.sample_rate = sample_rate;
        self.tracker.set_sample_rate(sample_rate);
        self.buffer = BeatBuffer::with_reserve(input_channels, capacity, reserve);
        self.dispatcher.reserve(input_channels, reserve);
        self.beats = 0;

        tracing::info!(
            sample_rate,
            input_channels,
            capacity,
            reserve,
            "prepared beat processor"
        );
        Ok(())
    }

    /// Processes one block in place.
    ///
    /// `buffer` holds every bus channel; the first `num_input_channels` carry
    /// input audio and are passed through untouched, the rest are silenced.
    /// The block length is the shortest channel. Returns the beat found in
    /// this block, whether or not a consumer received it.
    pub fn process_block(
        &mut self,
        buffer: &mut [&mut [f32]],
        num_input_channels: usize,
        transport: &TransportInfo,
    ) -> Option<BeatEvent> {
        let num_samples = buffer.iter().map(|channel| channel.len()).min().unwrap_or(0);
        let num_inputs = num_input_channels.min(buffer.len());
        for channel in buffer.iter_mut().skip(num_inputs) {
            channel.fill(0.0);
        }

        self.dispatcher.apply_commands();
        let tempo_usable = self.update_capacity(transport);
        self.dispatcher.flush();

        let boundary = if tempo_usable {
            self.tracker.evaluate(transport, num_samples)
        } else {
            let untimed = TransportInfo {
                bpm: None,
                ..*transport
            };
            self.tracker.evaluate(&untimed, num_samples)
        };
        self.buffer.write_block(&buffer[..num_inputs], num_samples);

        let event = align(
            boundary?,
            self.buffer.write_index(),
            self.buffer.capacity(),
            num_samples,
        );
        self.beats += 1;
        let stamp = SnapshotStamp {
            sequence: self.beats,
            bpm: transport.valid_bpm().unwrap_or_default(),
            sample_rate: self.sample_rate,
        };
        self.dispatcher.notify(&self.buffer, &event, stamp);
        Some(event)
    }

    /// Follows the host tempo. Returns false when the block carries no tempo
    /// the tracker can follow.
    fn update_capacity(&mut self, transport: &TransportInfo) -> bool {
        let capacity = transport
            .valid_bpm()
            .filter(|bpm| *bpm >= self.config.min_bpm)
            .and_then(|bpm| capacity_for(bpm, self.sample_rate));
        match capacity {
            Some(capacity) => self.buffer.resize_if_needed(capacity).is_ok(),
            None => false,
        }
    }

    /// Registers a new consumer and returns its receiving end. A previously
    /// attached consumer stops receiving snapshots.
    pub fn attach_consumer(&mut self) -> SnapshotReceiver {
        let receiver = self.dispatcher.connect();
        tracing::info!(
            slots = self.config.snapshot_slots,
            reserve = self.buffer.reserved(),
            "attached snapshot consumer"
        );
        receiver
    }

    pub fn detach_consumer(&mut self) {
        if self.dispatcher.disconnect() {
            tracing::info!("detached snapshot consumer");
        }
    }

    /// Hands out a port through which a consumer can attach or detach while
    /// the processor runs on another thread. Take it before the processor
    /// moves to the audio thread; a newer port disables older ones.
    pub fn consumer_port(&mut self) -> ConsumerPort {
        tracing::debug!("opened consumer port");
        self.dispatcher.port()
    }

    pub fn has_consumer(&self) -> bool {
        self.dispatcher.is_connected()
    }

    pub fn store_state(&self) -> Result<Vec<u8>> {
        PersistedState::default().to_bytes()
    }

    pub fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let state = PersistedState::from_bytes(data)?;
        tracing::debug!(?state, bytes = data.len(), "restored state");
        Ok(())
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Samples per beat at the most recently known tempo.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn beat_buffer(&self) -> &BeatBuffer {
        &self.buffer
    }

    pub fn tracker(&self) -> &TransportTracker {
        &self.tracker
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Beats detected since the last prepare.
    pub fn beats_detected(&self) -> u64 {
        self.beats
    }
}

impl fmt::Debug for BeatProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeatProcessor")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.buffer.channels())
            .field("capacity", &self.buffer.capacity())
            .field("write_index", &self.buffer.write_index())
            .field("last_ppq_position", &self.tracker.last_ppq_position())
            .field("play_state", &self.tracker.state())
            .field("beat_just_occurred", &self.tracker.beat_just_occurred())
            .field("dispatcher", &self.dispatcher)
            .field("beats", &self.beats)
            .finish()
    }
}
