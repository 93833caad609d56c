use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{ResolverError, TransportError};

/// Bidirectional text-message channel to the data service.
///
/// The coordinator owns one transport per request and closes it exactly once.
#[async_trait]
pub trait Transport: Send {
    /// Send one text message
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next text message. A closed stream yields
    /// [`TransportError::ConnectionClosed`].
    async fn receive(&mut self) -> Result<String, TransportError>;

    /// Close the underlying connection
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// KeyResolver trait for credential sources (env vars, Vault, etc.)
pub trait KeyResolver: Send + Sync {
    /// Resolve keys from a source string (e.g., "env:VAR1,VAR2")
    fn resolve(&self, source: &str) -> Result<HashMap<String, String>, ResolverError>;
}
