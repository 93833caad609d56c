//! High-level client: one connection and one session per request

use futures_util::future::try_join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tvfeed_metadata::Feed;

use crate::config::SessionConfig;
use crate::coordinator::Coordinator;
use crate::error::{RestError, SessionError};
use crate::messages::{Ohlcv, SymbolInfo};
use crate::request::{CandleRequest, Request, SymbolInfoRequest};
use crate::rest::RestClient;
use crate::timeframe::Timeframe;
use crate::websocket::TradingViewWebSocket;

pub struct TradingViewClient {
    feed: Feed,
    config: SessionConfig,
    rest: RestClient,
}

impl TradingViewClient {
    pub fn new(feed: Feed, config: SessionConfig) -> Result<Self, RestError> {
        let rest = RestClient::new(&feed.rest)?;
        Ok(Self { feed, config, rest })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Symbol search and screener endpoints
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Fetch one OHLCV series.
    ///
    /// Bars are returned exactly in the order the server sent them. No
    /// sorting or de-duplication is applied.
    pub async fn fetch_candles(
        &self,
        request: &CandleRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Ohlcv>, SessionError> {
        let series = self.execute(request.clone(), cancel).await?;
        info!(
            symbol = %request.symbol,
            timeframe = %request.timeframe,
            bars = series.len(),
            "Fetched candles"
        );
        Ok(series)
    }

    /// Fetch merged core and extended metadata for `symbol` (`EXCHANGE:TICKER`)
    pub async fn fetch_symbol_info(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<SymbolInfo, SessionError> {
        self.execute(SymbolInfoRequest::new(symbol), cancel).await
    }

    /// Run several candle requests concurrently, each over its own
    /// connection and session. Results keep the order of `requests`; the
    /// first failure fails the whole call.
    pub async fn fetch_many(
        &self,
        requests: &[CandleRequest],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<Ohlcv>>, SessionError> {
        try_join_all(requests.iter().map(|request| self.fetch_candles(request, cancel))).await
    }

    /// Fetch `symbol` at every timeframe concurrently with default request
    /// parameters
    pub async fn fetch_timeframes(
        &self,
        symbol: &str,
        timeframes: &[Timeframe],
        cancel: &CancellationToken,
    ) -> Result<Vec<(Timeframe, Vec<Ohlcv>)>, SessionError> {
        let requests: Vec<_> = timeframes
            .iter()
            .map(|&timeframe| CandleRequest::new(symbol, timeframe))
            .collect();
        let series = self.fetch_many(&requests, cancel).await?;
        Ok(timeframes.iter().copied().zip(series).collect())
    }

    async fn execute<R: Request>(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<R::Output, SessionError> {
        // connecting and the session share one budget
        let timeout = self.config.request_timeout;
        let deadline = Instant::now() + timeout;
        let connect = TradingViewWebSocket::connect(&self.feed.websocket);
        let transport = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            connected = tokio::time::timeout_at(deadline, connect) => match connected {
                Ok(transport) => transport?,
                Err(_) => return Err(SessionError::Timeout { secs: timeout.as_secs() }),
            },
        };
        Coordinator::new(transport, self.config.clone())
            .run_until(request, cancel, deadline)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::{accept_async, tungstenite::Message};
    use tvfeed_metadata::WebSocketEndpoint;

    use crate::frame::{decode, encode};

    /// Answers every chart session with one bar per character of the
    /// requested timeframe code, so the series can be told apart.
    async fn serve_charts(listener: TcpListener) {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                let mut chart_session = String::new();
                let mut timeframe = String::new();

                while timeframe.is_empty() {
                    let Some(Ok(Message::Text(text))) = ws.next().await else {
                        return;
                    };
                    for doc in decode(&text) {
                        let command: Value = serde_json::from_str(doc).unwrap();
                        match command["m"].as_str() {
                            Some("chart_create_session") => {
                                chart_session = command["p"][0].as_str().unwrap().to_string()
                            }
                            Some("create_series") => {
                                timeframe = command["p"][4].as_str().unwrap().to_string()
                            }
                            _ => {}
                        }
                    }
                }

                let bars: Vec<Value> = (0..timeframe.len())
                    .map(|i| json!({"i": i, "v": [1_700_000_000 + i as i64 * 60, 1.0, 2.0, 0.5, 1.5, 10.0]}))
                    .collect();
                let update = json!({
                    "m": "timescale_update",
                    "p": [chart_session, {"sds_1": {"s": bars}}]
                });
                ws.send(Message::Text(encode(&update.to_string()))).await.unwrap();
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    }

    async fn client() -> TradingViewClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_charts(listener));

        let feed = Feed {
            websocket: WebSocketEndpoint {
                url: format!("ws://{}", addr),
                ..WebSocketEndpoint::default()
            },
            ..Feed::default()
        };
        TradingViewClient::new(feed, SessionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_candles() {
        let client = client().await;
        let request = CandleRequest::new("NASDAQ:NVDA", Timeframe::OneDay);
        let series = client
            .fetch_candles(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp, 1_700_000_000);
        assert_eq!(series[1].timestamp, 1_700_000_060);
    }

    #[tokio::test]
    async fn test_fetch_timeframes_keeps_input_order() {
        let client = client().await;
        let timeframes = [Timeframe::FourHours, Timeframe::OneMinute, Timeframe::OneDay];
        let results = client
            .fetch_timeframes("NASDAQ:NVDA", &timeframes, &CancellationToken::new())
            .await
            .unwrap();

        let shape: Vec<(Timeframe, usize)> = results.iter().map(|(tf, s)| (*tf, s.len())).collect();
        assert_eq!(
            shape,
            vec![
                (Timeframe::FourHours, 3),
                (Timeframe::OneMinute, 1),
                (Timeframe::OneDay, 2)
            ]
        );
    }

    /// Accepts the upgrade after `delay`, then never answers
    async fn serve_slow_handshake(listener: TcpListener, delay: Duration) {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    }

    #[tokio::test]
    async fn test_connect_time_counts_toward_request_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_slow_handshake(listener, Duration::from_millis(1500)));

        let feed = Feed {
            websocket: WebSocketEndpoint {
                url: format!("ws://{}", addr),
                ..WebSocketEndpoint::default()
            },
            ..Feed::default()
        };
        let config = SessionConfig::default().with_timeout(Duration::from_secs(2));
        let client = TradingViewClient::new(feed, config).unwrap();

        let started = std::time::Instant::now();
        let request = CandleRequest::new("NASDAQ:NVDA", Timeframe::OneDay);
        let result = client.fetch_candles(&request, &CancellationToken::new()).await;

        assert!(matches!(result, Err(SessionError::Timeout { secs: 2 })));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1900), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3000), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_cancelled_before_connect() {
        let client = client().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = client.fetch_symbol_info("NASDAQ:NVDA", &cancel).await;
        assert!(matches!(result, Err(SessionError::Cancelled)));
    }
}
