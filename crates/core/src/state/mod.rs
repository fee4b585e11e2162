use serde::{Deserialize, Serialize};

use crate::{BeatError, Result};

/// Host-persisted plugin state.
///
/// Carries no fields yet. It is serialised as a JSON object so later versions
/// can add fields without breaking sessions saved by this one; unknown fields
/// are ignored on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {}

impl PersistedState {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(BeatError::State)
    }

    /// Decodes a blob produced by [`to_bytes`](Self::to_bytes). An empty blob
    /// is what hosts hand over for a fresh session and yields the default.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(data).map_err(BeatError::State)
    }
}
