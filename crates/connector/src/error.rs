use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed frame at byte {offset}: {reason}")]
    MalformedFrame { offset: usize, reason: String },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Failure of one logical request. No partial result accompanies any variant.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("request timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("request cancelled")]
    Cancelled,

    #[error("stream ended before the request completed")]
    UnexpectedClose,

    #[error("session {session} rejected: {reason}")]
    Rejected { session: String, reason: String },

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RestError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("missing key: {0}")]
    MissingKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::ConnectionClosed;
        assert_eq!(format!("{}", err), "Connection closed");

        let err = SessionError::Timeout { secs: 30 };
        assert_eq!(format!("{}", err), "request timed out after 30 seconds");

        let err = SessionError::from(TransportError::SendFailed("broken pipe".to_string()));
        assert_eq!(
            format!("{}", err),
            "transport error: Send failed: broken pipe"
        );

        let err = FrameError::MalformedFrame {
            offset: 7,
            reason: "non-numeric length prefix".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "malformed frame at byte 7: non-numeric length prefix"
        );
    }
}
