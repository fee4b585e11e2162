use crate::{BeatBoundary, BoundaryKind};

/// A beat located inside the circular buffer. Produced once per detected
/// boundary and handed straight to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatEvent {
    /// Slot holding the sample written at the beat boundary.
    pub beat_start_index: usize,
    /// Offset reported by the tracker for the block.
    pub offset: usize,
    pub kind: BoundaryKind,
}

/// Slot of the beat boundary, given the write index after a block of
/// `block_len` samples in which the tracker reported `offset`.
///
/// Equivalent to `(write_index + capacity - block_len - offset) mod capacity`
/// but stays in range when the block is longer than a beat.
pub fn beat_start_index(write_index: usize, capacity: usize, block_len: usize, offset: usize) -> usize {
    let capacity = capacity.max(1) as i64;
    let index = write_index as i64 - block_len as i64 - offset as i64;
    index.rem_euclid(capacity) as usize
}

/// Builds the [`BeatEvent`] for a boundary found in the block just written.
pub fn align(boundary: BeatBoundary, write_index: usize, capacity: usize, block_len: usize) -> BeatEvent {
    BeatEvent {
        beat_start_index: beat_start_index(write_index, capacity, block_len, boundary.offset),
        offset: boundary.offset,
        kind: boundary.kind,
    }
}
