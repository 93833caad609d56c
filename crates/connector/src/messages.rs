//! Inbound message types and classification
//!
//! Every decoded JSON fragment is bound to one [`Message`] variant. Commands
//! answer with `{"m": <kind>, "p": [...]}` where the parameter layout is fixed
//! per kind. Anything that does not bind cleanly becomes
//! [`Message::Unrecognized`]; classification never fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::commands::SERIES_HANDLE;

/// Accept any scalar for a text field. The service is inconsistent about
/// string vs numeric encodings of descriptive fields.
pub fn deserialize_lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// One candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    /// Bar open time, seconds since the Unix epoch
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Ohlcv {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    /// Bind `[t, o, h, l, c, v]`. Volume-less series (indices) send five
    /// values and bind with zero volume.
    fn from_values(values: &[Value]) -> Option<Self> {
        if values.len() < 5 {
            return None;
        }
        let timestamp = match values[0].as_i64() {
            Some(ts) => ts,
            None => {
                let ts = values[0].as_f64()?;
                if ts.fract() != 0.0 {
                    return None;
                }
                ts as i64
            }
        };
        let volume = match values.get(5) {
            Some(v) => v.as_f64()?,
            None => 0.0,
        };
        Some(Self {
            timestamp,
            open: values[1].as_f64()?,
            high: values[2].as_f64()?,
            low: values[3].as_f64()?,
            close: values[4].as_f64()?,
            volume,
        })
    }
}

/// Greeting sent unframed-kind right after the WebSocket upgrade
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerHello {
    pub session_id: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub release: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub protocol: Option<String>,
}

/// Symbol description returned by `symbol_resolved`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolvedSymbol {
    #[serde(deserialize_with = "deserialize_lenient_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "deserialize_lenient_text")]
    pub full_name: Option<String>,
    #[serde(deserialize_with = "deserialize_lenient_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_lenient_text")]
    pub exchange: Option<String>,
    #[serde(rename = "type", deserialize_with = "deserialize_lenient_text")]
    pub symbol_type: Option<String>,
    #[serde(deserialize_with = "deserialize_lenient_text")]
    pub currency_code: Option<String>,
    #[serde(deserialize_with = "deserialize_lenient_text")]
    pub timezone: Option<String>,
    pub pricescale: Option<i64>,
}

/// Core symbol metadata (first `qsd` for a symbol)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainInfo {
    pub pro_name: String,
    pub short_name: String,
    #[serde(rename = "type")]
    pub symbol_type: String,
    pub listed_exchange: String,
    pub timezone: String,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub country_code: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub isin: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub nsin: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub sedol: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub currency_code: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub currency_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub local_code: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub pro_perm: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub session_holidays: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub original_name: Option<String>,
    #[serde(default)]
    pub subsessions: Option<Vec<Value>>,
    #[serde(default)]
    pub is_tradable: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub logoid: Option<String>,
}

/// Extended symbol metadata (later `qsd` carrying company fields)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalInfo {
    #[serde(rename = "symbol-proname")]
    pub symbol_proname: String,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub country_fund: Option<String>,
    #[serde(rename = "exchange-traded", default, deserialize_with = "deserialize_lenient_text")]
    pub exchange_traded: Option<String>,
    #[serde(rename = "exchange-listed", default, deserialize_with = "deserialize_lenient_text")]
    pub exchange_listed: Option<String>,
    #[serde(rename = "exchange-ticker", default, deserialize_with = "deserialize_lenient_text")]
    pub exchange_ticker: Option<String>,
    #[serde(
        rename = "exchange-listed-symbol",
        default,
        deserialize_with = "deserialize_lenient_text"
    )]
    pub exchange_listed_symbol: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub sector: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub business_description: Option<String>,
    #[serde(rename = "short-description", default, deserialize_with = "deserialize_lenient_text")]
    pub short_description: Option<String>,
    #[serde(rename = "local-description", default, deserialize_with = "deserialize_lenient_text")]
    pub local_description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub mic: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub web_site_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub ceo: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    pub fundamental_currency_code: Option<String>,
    #[serde(rename = "rt-update-time", default, deserialize_with = "deserialize_lenient_text")]
    pub rt_update_time: Option<String>,
    #[serde(rename = "currency-id", default, deserialize_with = "deserialize_lenient_text")]
    pub currency_id: Option<String>,
}

/// Merged result of a symbol-info request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub main: MainInfo,
    pub additional: AdditionalInfo,
}

/// One `qsd` message. Main and additional fields are told apart by which
/// fields bind; a single message may carry both.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSymbolData {
    pub quote_session: String,
    pub symbol: String,
    pub main: Option<MainInfo>,
    pub additional: Option<AdditionalInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Keep-alive frame payload (`~h~<n>`), echoed back verbatim
    Heartbeat(String),
    ServerHello(ServerHello),
    SeriesLoading {
        chart_session: String,
    },
    SymbolResolved {
        chart_session: String,
        symbol: Box<ResolvedSymbol>,
    },
    SeriesTimeframe {
        chart_session: String,
    },
    SeriesCompleted {
        chart_session: String,
    },
    TimescaleUpdate {
        chart_session: String,
        series: Vec<Ohlcv>,
    },
    SymbolError {
        chart_session: String,
        reason: String,
    },
    SeriesError {
        chart_session: String,
        reason: String,
    },
    QuoteSymbolData(QuoteSymbolData),
    QuoteError {
        quote_session: String,
        symbol: String,
    },
    QuoteCompleted {
        quote_session: String,
        symbol: String,
    },
    Unrecognized {
        kind: Option<String>,
    },
}

impl Message {
    /// Short name for logging
    pub fn kind(&self) -> &str {
        match self {
            Message::Heartbeat(_) => "heartbeat",
            Message::ServerHello(_) => "server_hello",
            Message::SeriesLoading { .. } => "series_loading",
            Message::SymbolResolved { .. } => "symbol_resolved",
            Message::SeriesTimeframe { .. } => "series_timeframe",
            Message::SeriesCompleted { .. } => "series_completed",
            Message::TimescaleUpdate { .. } => "timescale_update",
            Message::SymbolError { .. } => "symbol_error",
            Message::SeriesError { .. } => "series_error",
            Message::QuoteSymbolData(_) => "qsd",
            Message::QuoteError { .. } => "qsd_error",
            Message::QuoteCompleted { .. } => "quote_completed",
            Message::Unrecognized { kind } => kind.as_deref().unwrap_or("unknown"),
        }
    }

    fn unrecognized(kind: &str) -> Self {
        Message::Unrecognized {
            kind: Some(kind.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    m: String,
    #[serde(default)]
    p: Vec<Value>,
}

/// Classify one JSON fragment
pub fn classify(fragment: &str) -> Message {
    match serde_json::from_str::<Value>(fragment) {
        Ok(value) => classify_value(value),
        Err(e) => {
            trace!(error = %e, "Fragment is not valid JSON");
            Message::Unrecognized { kind: None }
        }
    }
}

/// Classify an already parsed JSON value
pub fn classify_value(value: Value) -> Message {
    if value.get("m").is_none() {
        if value.get("session_id").is_some() {
            if let Ok(hello) = serde_json::from_value::<ServerHello>(value) {
                return Message::ServerHello(hello);
            }
        }
        return Message::Unrecognized { kind: None };
    }

    let Ok(Envelope { m: kind, p: params }) = serde_json::from_value::<Envelope>(value) else {
        return Message::Unrecognized { kind: None };
    };

    bind(&kind, params).unwrap_or_else(|| Message::unrecognized(&kind))
}

fn param_str(params: &[Value], index: usize) -> Option<String> {
    params.get(index)?.as_str().map(str::to_string)
}

/// Last string parameter after the session id (error texts trail the handles)
fn trailing_reason(params: &[Value]) -> String {
    params
        .iter()
        .skip(1)
        .filter_map(Value::as_str)
        .last()
        .unwrap_or("unknown error")
        .to_string()
}

fn bind(kind: &str, mut params: Vec<Value>) -> Option<Message> {
    let message = match kind {
        "series_loading" => Message::SeriesLoading {
            chart_session: param_str(&params, 0)?,
        },
        "series_timeframe" => Message::SeriesTimeframe {
            chart_session: param_str(&params, 0)?,
        },
        "series_completed" => Message::SeriesCompleted {
            chart_session: param_str(&params, 0)?,
        },
        "symbol_resolved" => {
            let chart_session = param_str(&params, 0)?;
            let info = params.get_mut(2)?.take();
            if !info.is_object() {
                return None;
            }
            Message::SymbolResolved {
                chart_session,
                symbol: Box::new(serde_json::from_value(info).ok()?),
            }
        }
        "timescale_update" => {
            let chart_session = param_str(&params, 0)?;
            let bars = params.get(1)?.get(SERIES_HANDLE)?.get("s")?.as_array()?;
            let series = bars
                .iter()
                .map(|bar| Ohlcv::from_values(bar.get("v")?.as_array()?))
                .collect::<Option<Vec<_>>>()?;
            Message::TimescaleUpdate {
                chart_session,
                series,
            }
        }
        "symbol_error" => Message::SymbolError {
            chart_session: param_str(&params, 0)?,
            reason: trailing_reason(&params),
        },
        "series_error" => Message::SeriesError {
            chart_session: param_str(&params, 0)?,
            reason: trailing_reason(&params),
        },
        "quote_completed" => Message::QuoteCompleted {
            quote_session: param_str(&params, 0)?,
            symbol: param_str(&params, 1)?,
        },
        "qsd" => {
            let quote_session = param_str(&params, 0)?;
            let data = params.get_mut(1)?;
            let symbol = data.get("n")?.as_str()?.to_string();
            if data.get("s").and_then(Value::as_str) == Some("error") {
                return Some(Message::QuoteError {
                    quote_session,
                    symbol,
                });
            }
            let fields = data.get_mut("v")?.take();
            if !fields.is_object() {
                return None;
            }
            let main = serde_json::from_value::<MainInfo>(fields.clone()).ok();
            let additional = serde_json::from_value::<AdditionalInfo>(fields).ok();
            if main.is_none() && additional.is_none() {
                return None;
            }
            Message::QuoteSymbolData(QuoteSymbolData {
                quote_session,
                symbol,
                main,
                additional,
            })
        }
        _ => return None,
    };
    Some(message)
}
