//! Errors raised while loading a feed definition

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("cannot read feed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid feed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An endpoint URL with a scheme the client cannot talk to
    #[error("{field} must use {expected}, got: {url}")]
    Scheme {
        field: &'static str,
        expected: &'static str,
        url: String,
    },

    #[error("websocket.max_message_size must be positive")]
    ZeroMessageSize,
}
