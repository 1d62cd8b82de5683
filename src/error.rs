//! Error types for the assistant client

use thiserror::Error;

/// Result type alias for assistant client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the assistant client
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before any network or device call (empty message, capture
    /// already running, channel not open)
    #[error("invalid input: {0}")]
    ClientInput(String),

    /// Remote service answered with a non-success status
    #[error("request failed with status {status}: {body}")]
    Transport {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// No response was received
    #[error("network error: {0}")]
    Network(String),

    /// Microphone permission denied, missing, or unsupported
    #[error("device error: {0}")]
    Device(String),

    /// Realtime connection failure
    #[error("channel error: {0}")]
    Channel(String),

    /// Response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Audio encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status carried by a transport failure
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short classification used in notifications and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ClientInput(_) => "client_input",
            Self::Transport { .. } => "transport",
            Self::Network(_) => "network",
            Self::Device(_) => "device",
            Self::Channel(_) => "channel",
            Self::Decode(_) | Self::Serialization(_) => "decode",
            Self::Audio(_) => "audio",
            Self::Config(_) => "config",
            Self::Storage(_) | Self::Io(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_on_transport() {
        let err = Error::Transport {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.kind(), "transport");

        assert_eq!(Error::Network("refused".to_string()).status(), None);
    }

    #[test]
    fn test_display() {
        let err = Error::Transport {
            status: 404,
            body: "missing".to_string(),
        };
        assert_eq!(err.to_string(), "request failed with status 404: missing");
        assert_eq!(
            Error::ClientInput("empty message".to_string()).to_string(),
            "invalid input: empty message"
        );
    }

    #[test]
    fn test_from_conversions_classify() {
        fn parse(raw: &str) -> Result<u8> {
            Ok(serde_json::from_str(raw)?)
        }

        let err = parse("not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert_eq!(err.kind(), "decode");

        let err: Error = std::io::Error::other("disk full").into();
        assert_eq!(err.kind(), "storage");
        assert_eq!(err.status(), None);
    }
}
