//! Core library for the beatsnap engine.
//!
//! The engine runs inside a host's audio callback. Every block it reads the
//! host transport, records audio into a circular buffer exactly one beat
//! long, and whenever the musical position crosses a beat it hands a
//! beat-aligned copy of that buffer to a consumer such as a visualiser.
//!
//! Modules, leaves first:
//!
//! - [`transport`]: beat-boundary detection from host transport info.
//! - [`buffer`]: the one-beat circular buffer.
//! - [`alignment`]: locating the beat boundary inside the buffer.
//! - [`dispatch`]: lock-free snapshot hand-off to the consumer thread.
//! - [`processor`]: the audio callback wiring the above together.

pub mod alignment;
pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod processor;
pub mod state;
pub mod transport;

pub use alignment::{align, beat_start_index, BeatEvent};
pub use buffer::{capacity_for, BeatBuffer};
pub use config::{AppConfig, AudioConfig, TrackerConfig};
pub use dispatch::{
    BeatConsumer, BeatSnapshot, ConsumerPort, DispatchOutcome, DispatchStats,
    SnapshotDispatcher, SnapshotReceiver, SnapshotStamp, PORT_COMMAND_CAPACITY,
};
pub use error::{BeatError, Result};
pub use processor::BeatProcessor;
pub use state::PersistedState;
pub use transport::{BeatBoundary, BoundaryKind, PlayState, TransportInfo, TransportTracker};
