//! Outgoing command construction
//!
//! Every command is `{"m": <name>, "p": [...]}` serialized compactly and then
//! wrapped in the wire envelope. The builders are pure; nothing here touches
//! the network.

use serde::Serialize;
use serde_json::{json, Value};

use crate::frame::encode;
use crate::request::{CandleRequest, SymbolDescriptor};
use crate::session::SessionId;

/// Handle the resolved symbol is registered under inside a chart session
pub const SYMBOL_HANDLE: &str = "sds_sym_1";

/// Handle of the series; `timescale_update` keys its payload by it
pub const SERIES_HANDLE: &str = "sds_1";

/// Series id within the handle
pub const SERIES_ID: &str = "s1";

/// Default data quality tier
pub const DATA_QUALITY_LOW: &str = "low";

/// A single protocol command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub m: &'static str,
    pub p: Vec<Value>,
}

impl Command {
    fn new(m: &'static str, p: Vec<Value>) -> Self {
        Self { m, p }
    }

    /// Compact JSON text, no whitespace between tokens
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// JSON wrapped in the `~m~<len>~m~` envelope, ready to send
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        Ok(encode(&self.to_json()?))
    }
}

pub fn set_auth_token(token: &str) -> Command {
    Command::new("set_auth_token", vec![json!(token)])
}

pub fn set_data_quality(quality: &str) -> Command {
    Command::new("set_data_quality", vec![json!(quality)])
}

pub fn chart_create_session(chart_session: &SessionId) -> Command {
    Command::new("chart_create_session", vec![json!(chart_session.as_str()), json!("")])
}

/// The third parameter is a string whose value is itself JSON, prefixed
/// with `=`. The service requires this double encoding.
pub fn resolve_symbol(
    chart_session: &SessionId,
    descriptor: &SymbolDescriptor,
) -> Result<Command, serde_json::Error> {
    let encoded = format!("={}", serde_json::to_string(descriptor)?);
    Ok(Command::new(
        "resolve_symbol",
        vec![
            json!(chart_session.as_str()),
            json!(SYMBOL_HANDLE),
            json!(encoded),
        ],
    ))
}

/// Without a range the series is sized by `bar_count` alone
pub fn create_series(
    chart_session: &SessionId,
    timeframe: &str,
    bar_count: u32,
    range: Option<&str>,
) -> Command {
    let mut params = vec![
        json!(chart_session.as_str()),
        json!(SERIES_HANDLE),
        json!(SERIES_ID),
        json!(SYMBOL_HANDLE),
        json!(timeframe),
        json!(bar_count),
    ];
    if let Some(range) = range {
        params.push(json!(range));
    }
    Command::new("create_series", params)
}

pub fn quote_create_session(quote_session: &SessionId) -> Command {
    Command::new("quote_create_session", vec![json!(quote_session.as_str())])
}

pub fn quote_add_symbols(quote_session: &SessionId, symbol: &str) -> Command {
    Command::new(
        "quote_add_symbols",
        vec![json!(quote_session.as_str()), json!(symbol)],
    )
}

pub fn quote_fast_symbols(quote_session: &SessionId, symbol: &str) -> Command {
    Command::new(
        "quote_fast_symbols",
        vec![json!(quote_session.as_str()), json!(symbol)],
    )
}

/// Ordered commands that establish a chart session and request its series
pub fn candle_sequence(
    token: &str,
    quality: &str,
    chart_session: &SessionId,
    request: &CandleRequest,
) -> Result<Vec<Command>, serde_json::Error> {
    Ok(vec![
        set_auth_token(token),
        set_data_quality(quality),
        chart_create_session(chart_session),
        resolve_symbol(chart_session, &request.descriptor())?,
        create_series(
            chart_session,
            request.timeframe.as_str(),
            request.bar_count,
            request.range.as_deref(),
        ),
    ])
}

/// Ordered commands that subscribe a quote session to one symbol
pub fn symbol_info_sequence(
    token: &str,
    quality: &str,
    quote_session: &SessionId,
    symbol: &str,
) -> Vec<Command> {
    vec![
        set_auth_token(token),
        set_data_quality(quality),
        quote_create_session(quote_session),
        quote_add_symbols(quote_session, symbol),
        quote_fast_symbols(quote_session, symbol),
    ]
}
