//! Client-generated session identifiers

use rand::Rng;
use std::fmt;

const SUFFIX_LEN: usize = 12;
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub const CHART_PREFIX: &str = "cs_";
pub const QUOTE_PREFIX: &str = "qs_";

/// Correlation id for one chart or quote session. Never reused across requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn chart() -> Self {
        Self::generate(CHART_PREFIX)
    }

    pub fn quote() -> Self {
        Self::generate(QUOTE_PREFIX)
    }

    /// Wrap an existing id (replayed traffic, tests)
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    fn generate(prefix: &str) -> Self {
        let mut rng = rand::rng();
        let mut id = String::with_capacity(prefix.len() + SUFFIX_LEN);
        id.push_str(prefix);
        for _ in 0..SUFFIX_LEN {
            id.push(CHARSET[rng.random_range(0..CHARSET.len())] as char);
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for SessionId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
