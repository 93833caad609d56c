//! tvfeed-metadata: Endpoint and feed configuration for the tvfeed connector

pub mod error;
pub mod feed;

pub use error::MetadataError;
pub use feed::{Feed, RestEndpoints, WebSocketEndpoint};
