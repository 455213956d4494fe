//! Error types for greensort-client

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel not open")]
    NotOpen,

    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Frame source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Connection-level problems are retried; they never end the channel
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChannelError::NotOpen | ChannelError::ConnectTimeout(_) | ChannelError::WebSocket(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(ChannelError::NotOpen.is_transient());
        assert!(ChannelError::ConnectTimeout(Duration::from_secs(5)).is_transient());
        assert!(!ChannelError::Source("empty directory".into()).is_transient());
        assert!(ChannelError::ConnectTimeout(Duration::from_millis(10))
            .to_string()
            .contains("10ms"));
    }
}
