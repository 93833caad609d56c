//! tvfeed-connector: TradingView market data client core
//!
//! Wire framing, message decoding, command construction and the per-request
//! session coordinator, plus the WebSocket and REST collaborators that carry
//! them.

pub mod client;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod frame;
pub mod messages;
pub mod request;
pub mod resolver;
pub mod rest;
pub mod session;
pub mod timeframe;
pub mod traits;
pub mod websocket;

pub use client::TradingViewClient;
pub use config::{ConfigError, SessionConfig};
pub use coordinator::{Coordinator, SessionState};
pub use error::{FrameError, ResolverError, RestError, SessionError, TransportError};
pub use messages::{Message, Ohlcv, SymbolInfo};
pub use request::{CandleRequest, Request, SessionType, Step, SymbolInfoRequest};
pub use resolver::EnvResolver;
pub use rest::{RestClient, SymbolSearchHit};
pub use session::SessionId;
pub use timeframe::Timeframe;
pub use traits::{KeyResolver, Transport};
pub use websocket::TradingViewWebSocket;
