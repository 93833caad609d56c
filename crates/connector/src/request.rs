//! Logical requests and their result accumulators
//!
//! A [`Request`] knows which commands open its session and how to fold the
//! inbound message stream into a result. The coordinator drives it.

use serde::Serialize;
use tracing::{debug, warn};

use crate::commands::{self, Command};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::messages::{AdditionalInfo, MainInfo, Message, Ohlcv, SymbolInfo};
use crate::session::SessionId;
use crate::timeframe::Timeframe;

pub const DEFAULT_BAR_COUNT: u32 = 300;
pub const DEFAULT_RANGE: &str = "12M";
pub const DEFAULT_ADJUSTMENT: &str = "splits";

/// Outcome of feeding one message to a request
#[derive(Debug)]
pub enum Step<T> {
    Continue,
    Complete(T),
    Fail(SessionError),
}

pub trait Request: Send {
    type Output: Send;

    /// Fresh correlation id of the right kind
    fn new_session(&self) -> SessionId;

    /// Commands to send, in order, to open the session
    fn commands(
        &self,
        session: &SessionId,
        config: &SessionConfig,
    ) -> Result<Vec<Command>, serde_json::Error>;

    fn accept(&mut self, session: &SessionId, message: Message) -> Step<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Regular,
    Extended,
}

/// Serialized into the `resolve_symbol` parameter string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolDescriptor {
    pub symbol: String,
    pub adjustment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionType>,
}

/// Fetch the OHLCV series of one symbol at one timeframe
#[derive(Debug, Clone, PartialEq)]
pub struct CandleRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bar_count: u32,
    pub range: Option<String>,
    pub adjustment: String,
    pub session: Option<SessionType>,
}

impl CandleRequest {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            bar_count: DEFAULT_BAR_COUNT,
            range: Some(DEFAULT_RANGE.to_string()),
            adjustment: DEFAULT_ADJUSTMENT.to_string(),
            session: None,
        }
    }

    pub fn with_bar_count(mut self, bar_count: u32) -> Self {
        self.bar_count = bar_count;
        self
    }

    pub fn with_range(mut self, range: Option<String>) -> Self {
        self.range = range;
        self
    }

    pub fn with_session(mut self, session: SessionType) -> Self {
        self.session = Some(session);
        self
    }

    pub fn descriptor(&self) -> SymbolDescriptor {
        SymbolDescriptor {
            symbol: self.symbol.clone(),
            adjustment: self.adjustment.clone(),
            session: self.session,
        }
    }
}

impl Request for CandleRequest {
    type Output = Vec<Ohlcv>;

    fn new_session(&self) -> SessionId {
        SessionId::chart()
    }

    fn commands(
        &self,
        session: &SessionId,
        config: &SessionConfig,
    ) -> Result<Vec<Command>, serde_json::Error> {
        commands::candle_sequence(&config.auth_token, &config.data_quality, session, self)
    }

    /// Terminal on the first `timescale_update` for this session. The series
    /// is handed back in arrival order, never re-sorted.
    fn accept(&mut self, session: &SessionId, message: Message) -> Step<Vec<Ohlcv>> {
        match message {
            Message::TimescaleUpdate {
                chart_session,
                series,
            } if *session == *chart_session => Step::Complete(series),
            Message::SymbolError {
                chart_session,
                reason,
            }
            | Message::SeriesError {
                chart_session,
                reason,
            } if *session == *chart_session => {
                warn!(session = %session, symbol = %self.symbol, reason = %reason, "Chart session rejected");
                Step::Fail(SessionError::Rejected {
                    session: chart_session,
                    reason,
                })
            }
            other => {
                debug!(session = %session, kind = %other.kind(), "Ignoring message");
                Step::Continue
            }
        }
    }
}

/// Fetch merged core and extended metadata for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfoRequest {
    pub symbol: String,
    main: Option<MainInfo>,
    additional: Option<AdditionalInfo>,
}

impl SymbolInfoRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            main: None,
            additional: None,
        }
    }
}

impl Request for SymbolInfoRequest {
    type Output = SymbolInfo;

    fn new_session(&self) -> SessionId {
        SessionId::quote()
    }

    fn commands(
        &self,
        session: &SessionId,
        config: &SessionConfig,
    ) -> Result<Vec<Command>, serde_json::Error> {
        Ok(commands::symbol_info_sequence(
            &config.auth_token,
            &config.data_quality,
            session,
            &self.symbol,
        ))
    }

    /// Keeps the first main and the first additional record for the target
    /// symbol; completes once both are present.
    fn accept(&mut self, session: &SessionId, message: Message) -> Step<SymbolInfo> {
        match message {
            Message::QuoteSymbolData(data)
                if *session == *data.quote_session && data.symbol == self.symbol =>
            {
                if self.main.is_none() {
                    self.main = data.main;
                }
                if self.additional.is_none() {
                    self.additional = data.additional;
                }
                debug!(
                    session = %session,
                    symbol = %self.symbol,
                    has_main = self.main.is_some(),
                    has_additional = self.additional.is_some(),
                    "Quote data received"
                );
                match (self.main.take(), self.additional.take()) {
                    (Some(main), Some(additional)) => Step::Complete(SymbolInfo {
                        symbol: self.symbol.clone(),
                        main,
                        additional,
                    }),
                    (main, additional) => {
                        self.main = main;
                        self.additional = additional;
                        Step::Continue
                    }
                }
            }
            Message::QuoteError {
                quote_session,
                symbol,
            } if *session == *quote_session && symbol == self.symbol => {
                warn!(session = %session, symbol = %symbol, "Quote session rejected symbol");
                Step::Fail(SessionError::Rejected {
                    session: quote_session,
                    reason: format!("symbol {} not available", symbol),
                })
            }
            other => {
                debug!(session = %session, kind = %other.kind(), "Ignoring message");
                Step::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{classify, QuoteSymbolData};

    fn main_info() -> MainInfo {
        serde_json::from_value(serde_json::json!({
            "pro_name": "NASDAQ:NVDA",
            "short_name": "NVDA",
            "type": "stock",
            "listed_exchange": "NASDAQ",
            "timezone": "America/New_York"
        }))
        .unwrap()
    }

    fn additional_info() -> AdditionalInfo {
        serde_json::from_value(serde_json::json!({
            "symbol-proname": "NASDAQ:NVDA",
            "industry": "Semiconductors"
        }))
        .unwrap()
    }

    fn qsd(session: &str, symbol: &str, main: bool, additional: bool) -> Message {
        Message::QuoteSymbolData(QuoteSymbolData {
            quote_session: session.to_string(),
            symbol: symbol.to_string(),
            main: main.then(main_info),
            additional: additional.then(additional_info),
        })
    }

    #[test]
    fn test_candle_request_ignores_other_sessions() {
        let session = SessionId::from_raw("cs_abc123");
        let mut request = CandleRequest::new("NASDAQ:NVDA", Timeframe::OneDay);

        let other = classify(r#"{"m":"timescale_update","p":["cs_other",{"sds_1":{"s":[]}}]}"#);
        assert!(matches!(request.accept(&session, other), Step::Continue));

        let mine = classify(r#"{"m":"timescale_update","p":["cs_abc123",{"sds_1":{"s":[{"i":0,"v":[1,2,3,1,2,10]}]}}]}"#);
        match request.accept(&session, mine) {
            Step::Complete(series) => assert_eq!(series.len(), 1),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_candle_request_fails_on_symbol_error() {
        let session = SessionId::from_raw("cs_abc123");
        let mut request = CandleRequest::new("BAD:SYM", Timeframe::OneDay);
        let msg = classify(r#"{"m":"symbol_error","p":["cs_abc123","sds_sym_1","invalid symbol"]}"#);
        match request.accept(&session, msg) {
            Step::Fail(SessionError::Rejected { session, reason }) => {
                assert_eq!(session, "cs_abc123");
                assert_eq!(reason, "invalid symbol");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_symbol_info_needs_both_parts() {
        let session = SessionId::from_raw("qs_abc123");
        let mut request = SymbolInfoRequest::new("NASDAQ:NVDA");

        assert!(matches!(
            request.accept(&session, qsd("qs_abc123", "NASDAQ:NVDA", true, false)),
            Step::Continue
        ));
        // a second main record must not complete the request
        assert!(matches!(
            request.accept(&session, qsd("qs_abc123", "NASDAQ:NVDA", true, false)),
            Step::Continue
        ));
        // wrong session and wrong symbol are ignored
        assert!(matches!(
            request.accept(&session, qsd("qs_other", "NASDAQ:NVDA", false, true)),
            Step::Continue
        ));
        assert!(matches!(
            request.accept(&session, qsd("qs_abc123", "NASDAQ:AMD", false, true)),
            Step::Continue
        ));

        match request.accept(&session, qsd("qs_abc123", "NASDAQ:NVDA", false, true)) {
            Step::Complete(info) => {
                assert_eq!(info.symbol, "NASDAQ:NVDA");
                assert_eq!(info.main.short_name, "NVDA");
                assert_eq!(info.additional.industry.as_deref(), Some("Semiconductors"));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_symbol_info_single_message_with_both_parts() {
        let session = SessionId::from_raw("qs_abc123");
        let mut request = SymbolInfoRequest::new("NASDAQ:NVDA");
        assert!(matches!(
            request.accept(&session, qsd("qs_abc123", "NASDAQ:NVDA", true, true)),
            Step::Complete(_)
        ));
    }

    #[test]
    fn test_descriptor_defaults() {
        let request = CandleRequest::new("NASDAQ:NVDA", Timeframe::OneDay)
            .with_bar_count(500)
            .with_session(SessionType::Regular);
        assert_eq!(request.bar_count, 500);
        assert_eq!(request.range.as_deref(), Some("12M"));
        let descriptor = request.descriptor();
        assert_eq!(descriptor.adjustment, "splits");
        assert_eq!(descriptor.session, Some(SessionType::Regular));
    }
}
