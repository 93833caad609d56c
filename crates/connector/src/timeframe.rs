use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported timeframe: {0}")]
pub struct TimeframeError(pub String);

/// Bar resolutions the chart service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1")]
    OneMinute,
    #[serde(rename = "3")]
    ThreeMinutes,
    #[serde(rename = "5")]
    FiveMinutes,
    #[serde(rename = "15")]
    FifteenMinutes,
    #[serde(rename = "30")]
    ThirtyMinutes,
    #[serde(rename = "45")]
    FortyFiveMinutes,
    #[serde(rename = "60")]
    OneHour,
    #[serde(rename = "120")]
    TwoHours,
    #[serde(rename = "180")]
    ThreeHours,
    #[serde(rename = "240")]
    FourHours,
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl Timeframe {
    pub const ALL: [Self; 13] = [
        Self::OneMinute,
        Self::ThreeMinutes,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::FortyFiveMinutes,
        Self::OneHour,
        Self::TwoHours,
        Self::ThreeHours,
        Self::FourHours,
        Self::OneDay,
        Self::OneWeek,
        Self::OneMonth,
    ];

    /// Resolution code as sent in `create_series`
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1",
            Self::ThreeMinutes => "3",
            Self::FiveMinutes => "5",
            Self::FifteenMinutes => "15",
            Self::ThirtyMinutes => "30",
            Self::FortyFiveMinutes => "45",
            Self::OneHour => "60",
            Self::TwoHours => "120",
            Self::ThreeHours => "180",
            Self::FourHours => "240",
            Self::OneDay => "1D",
            Self::OneWeek => "1W",
            Self::OneMonth => "1M",
        }
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    /// Accepts wire codes ("60", "1D") and short forms ("1h", "1d").
    /// "1M" is a month; minutes are lower-case "m".
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if let Some(tf) = Self::ALL.iter().find(|tf| tf.as_str() == value) {
            return Ok(*tf);
        }
        match value {
            "1m" => Ok(Self::OneMinute),
            "3m" => Ok(Self::ThreeMinutes),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "45m" => Ok(Self::FortyFiveMinutes),
            "1h" | "1H" => Ok(Self::OneHour),
            "2h" | "2H" => Ok(Self::TwoHours),
            "3h" | "3H" => Ok(Self::ThreeHours),
            "4h" | "4H" => Ok(Self::FourHours),
            "1d" | "D" => Ok(Self::OneDay),
            "1w" | "W" => Ok(Self::OneWeek),
            "M" => Ok(Self::OneMonth),
            other => Err(TimeframeError(other.to_owned())),
        }
    }
}
