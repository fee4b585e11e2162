/// Result alias that carries the custom [`BeatError`] type.
pub type Result<T> = std::result::Result<T, BeatError>;

/// Common error type for the core crate.
///
/// The real-time path only ever sees [`BeatError::Capacity`], and never
/// surfaces it to the host. The rest come from construction, preparation,
/// configuration, consumer registration and state handling.
#[derive(Debug, thiserror::Error)]
pub enum BeatError {
    /// A configuration or preparation value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Persisted state could not be decoded.
    #[error("malformed persisted state: {0}")]
    State(#[source] serde_json::Error),
    /// A configuration file could not be decoded.
    #[error("malformed configuration: {0}")]
    Config(#[source] serde_json::Error),
    /// A beat of this many samples per channel cannot be stored.
    #[error("cannot hold a beat of {0} samples")]
    Capacity(usize),
    /// The processor behind a consumer port has been dropped or handed out a
    /// newer port.
    #[error("processor is no longer reachable")]
    Disconnected,
    /// The processor has not yet drained earlier consumer commands.
    #[error("consumer command queue is full")]
    QueueFull,
    /// Free-form message for callers that need one.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl BeatError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for BeatError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_readable() {
        let err = BeatError::InvalidConfig("sample rate must be positive");
        assert_eq!(
            err.to_string(),
            "invalid configuration: sample rate must be positive"
        );

        assert_eq!(
            BeatError::Capacity(12).to_string(),
            "cannot hold a beat of 12 samples"
        );

        let err: BeatError = "detached".into();
        assert_eq!(err.to_string(), "detached");
    }
}
