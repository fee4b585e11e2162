//! Circular sample store holding exactly one beat of audio.

use crate::{BeatError, Result};

/// Number of samples in one beat at `bpm` and `sample_rate`.
///
/// Returns `None` when either value is not a positive finite number. The
/// result is never zero.
pub fn capacity_for(bpm: f64, sample_rate: f64) -> Option<usize> {
    if !(bpm.is_finite() && bpm > 0.0 && sample_rate.is_finite() && sample_rate > 0.0) {
        return None;
    }
    let samples = (60.0 / bpm * sample_rate).round();
    if !samples.is_finite() {
        return None;
    }
    Some((samples as usize).max(1))
}

/// Planar circular buffer sized to one beat.
///
/// Storage is laid out as `channels` planes of `stride` samples; only the
/// first `capacity` samples of each plane are in use. `stride` is reserved up
/// front so that capacity changes below it do not reallocate.
#[derive(Debug, Clone)]
pub struct BeatBuffer {
    data: Vec<f32>,
    channels: usize,
    stride: usize,
    capacity: usize,
    write_index: usize,
}

impl BeatBuffer {
    /// Creates a silent buffer of `capacity` samples per channel.
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self::with_reserve(channels, capacity, capacity)
    }

    /// Creates a silent buffer with room for `reserve` samples per channel.
    pub fn with_reserve(channels: usize, capacity: usize, reserve: usize) -> Self {
        let capacity = capacity.max(1);
        let stride = reserve.max(capacity);
        Self {
            data: vec![0.0; channels * stride],
            channels,
            stride,
            capacity,
            write_index: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel in one beat.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples per channel that fit without reallocating.
    pub fn reserved(&self) -> usize {
        self.stride
    }

    /// Next slot to be written.
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Switches to `capacity` samples per beat if it differs from the current
    /// one. Any change discards all stored audio and rewinds the write index.
    ///
    /// Returns whether the buffer was reset. Growing past the reserve
    /// allocates; if that allocation fails the buffer is left untouched and
    /// [`BeatError::Capacity`] is returned.
    pub fn resize_if_needed(&mut self, capacity: usize) -> Result<bool> {
        let capacity = capacity.max(1);
        if capacity == self.capacity {
            return Ok(false);
        }
        if capacity > self.stride {
            let len = self
                .channels
                .checked_mul(capacity)
                .ok_or(BeatError::Capacity(capacity))?;
            let mut data = Vec::new();
            data.try_reserve_exact(len)
                .map_err(|_| BeatError::Capacity(capacity))?;
            data.resize(len, 0.0);
            self.data = data;
            self.stride = capacity;
        }
        self.capacity = capacity;
        self.clear();
        Ok(true)
    }

    /// Silences every channel and rewinds the write index.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_index = 0;
    }

    /// Stores one sample at the current write index. Out-of-range channels
    /// are ignored.
    pub fn write(&mut self, sample: f32, channel: usize) {
        if channel < self.channels {
            self.data[channel * self.stride + self.write_index] = sample;
        }
    }

    /// Moves to the next slot once every channel of a frame is written.
    pub fn advance(&mut self) {
        self.write_index = (self.write_index + 1) % self.capacity;
    }

    /// Appends `num_samples` frames from planar `inputs`.
    ///
    /// Only `min(inputs.len(), channels)` channels are written; excess input
    /// channels are dropped and missing ones keep their previous contents.
    pub fn write_block<S: AsRef<[f32]>>(&mut self, inputs: &[S], num_samples: usize) {
        let channels = inputs.len().min(self.channels);
        let mut remaining = num_samples;
        let mut source = 0;
        while remaining > 0 {
            let run = remaining.min(self.capacity - self.write_index);
            for (ch, input) in inputs.iter().take(channels).enumerate() {
                let start = ch * self.stride + self.write_index;
                self.data[start..start + run]
                    .copy_from_slice(&input.as_ref()[source..source + run]);
            }
            self.write_index = (self.write_index + run) % self.capacity;
            source += run;
            remaining -= run;
        }
    }

    /// The in-use portion of one channel, in slot order.
    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.stride;
        &self.data[start..start + self.capacity]
    }

    /// Reads one channel starting at `start`, wrapping around once.
    pub fn aligned(&self, channel: usize, start: usize) -> impl Iterator<Item = f32> + '_ {
        let plane = self.channel(channel);
        let start = start % self.capacity;
        plane[start..].iter().chain(&plane[..start]).copied()
    }
}
