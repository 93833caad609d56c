use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MetadataError;

/// Public streaming endpoint
pub const DEFAULT_WS_URL: &str = "wss://data.tradingview.com/socket.io/websocket";

/// The streaming endpoint rejects upgrades without a matching Origin header
pub const DEFAULT_ORIGIN: &str = "https://data.tradingview.com";

pub const DEFAULT_SYMBOL_SEARCH_URL: &str = "https://symbol-search.tradingview.com";
pub const DEFAULT_SCANNER_URL: &str = "https://scanner.tradingview.com";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.72 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSocketEndpoint {
    pub url: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Largest single WebSocket message accepted (full series updates can be several MiB)
    pub max_message_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestEndpoints {
    #[serde(default = "default_symbol_search_url")]
    pub symbol_search_url: String,
    #[serde(default = "default_scanner_url")]
    pub scanner_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feed {
    pub name: String,
    pub display_name: Option<String>,
    pub websocket: WebSocketEndpoint,
    #[serde(default)]
    pub rest: RestEndpoints,
    /// Key source for the auth token, e.g. "env:TV_AUTH_TOKEN"
    pub auth_token_source: Option<String>,
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_symbol_search_url() -> String {
    DEFAULT_SYMBOL_SEARCH_URL.to_string()
}

fn default_scanner_url() -> String {
    DEFAULT_SCANNER_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

impl Default for WebSocketEndpoint {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            origin: default_origin(),
            max_message_size: None,
        }
    }
}

impl Default for RestEndpoints {
    fn default() -> Self {
        Self {
            symbol_search_url: default_symbol_search_url(),
            scanner_url: default_scanner_url(),
            user_agent: default_user_agent(),
            lang: default_lang(),
        }
    }
}

impl Default for Feed {
    fn default() -> Self {
        Self {
            name: "tradingview".to_string(),
            display_name: Some("TradingView".to_string()),
            websocket: WebSocketEndpoint::default(),
            rest: RestEndpoints::default(),
            auth_token_source: None,
        }
    }
}

impl Feed {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        let feed: Feed = serde_yaml::from_str(&content)?;
        feed.validate()?;
        Ok(feed)
    }

    /// Check endpoint schemes before anything tries to connect
    pub fn validate(&self) -> Result<(), MetadataError> {
        let ws = &self.websocket.url;
        if !(ws.starts_with("wss://") || ws.starts_with("ws://")) {
            return Err(MetadataError::Scheme {
                field: "websocket.url",
                expected: "ws:// or wss://",
                url: ws.clone(),
            });
        }

        let rest = [
            ("rest.symbol_search_url", &self.rest.symbol_search_url),
            ("rest.scanner_url", &self.rest.scanner_url),
        ];
        for (field, url) in rest {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(MetadataError::Scheme {
                    field,
                    expected: "http:// or https://",
                    url: url.clone(),
                });
            }
        }

        if self.websocket.max_message_size == Some(0) {
            return Err(MetadataError::ZeroMessageSize);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_feed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
name: tradingview
display_name: TradingView
websocket:
  url: wss://data.tradingview.com/socket.io/websocket
  max_message_size: 8388608
auth_token_source: env:TV_AUTH_TOKEN
"#
        )
        .unwrap();

        let feed = Feed::load(file.path()).unwrap();
        assert_eq!(feed.name, "tradingview");
        assert_eq!(feed.websocket.origin, DEFAULT_ORIGIN);
        assert_eq!(feed.websocket.max_message_size, Some(8_388_608));
        assert_eq!(feed.rest, RestEndpoints::default());
        assert_eq!(feed.auth_token_source.as_deref(), Some("env:TV_AUTH_TOKEN"));
    }

    #[test]
    fn test_load_rejects_http_websocket_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
name: broken
websocket:
  url: https://data.tradingview.com/socket.io/websocket
"#
        )
        .unwrap();

        match Feed::load(file.path()) {
            Err(MetadataError::Scheme { field, url, .. }) => {
                assert_eq!(field, "websocket.url");
                assert!(url.starts_with("https://"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rest_overrides() {
        let yaml = r#"
name: local
websocket:
  url: ws://127.0.0.1:9000/socket
  origin: http://localhost
rest:
  symbol_search_url: http://127.0.0.1:9001
  lang: ru
"#;
        let feed: Feed = serde_yaml::from_str(yaml).unwrap();
        feed.validate().unwrap();
        assert_eq!(feed.websocket.origin, "http://localhost");
        assert_eq!(feed.rest.symbol_search_url, "http://127.0.0.1:9001");
        assert_eq!(feed.rest.scanner_url, DEFAULT_SCANNER_URL);
        assert_eq!(feed.rest.lang, "ru");
    }

    #[test]
    fn test_validate_rest_scheme_and_message_size() {
        let mut feed = Feed::default();
        feed.rest.scanner_url = "scanner.tradingview.com/america/scan".to_string();
        match feed.validate() {
            Err(MetadataError::Scheme { field, .. }) => assert_eq!(field, "rest.scanner_url"),
            other => panic!("expected scheme error, got {:?}", other),
        }

        let mut feed = Feed::default();
        feed.websocket.max_message_size = Some(0);
        assert!(matches!(feed.validate(), Err(MetadataError::ZeroMessageSize)));
    }

    #[test]
    fn test_default_feed_is_valid() {
        let feed = Feed::default();
        feed.validate().unwrap();
        assert_eq!(feed.websocket.url, DEFAULT_WS_URL);
    }
}
