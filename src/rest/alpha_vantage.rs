//! Price history from the Alpha Vantage query endpoint.
//!
//! Every call is `GET {base}?apikey=..&symbol=..&function=..[&extra..]`. The
//! response nests bars under a `"Time Series (..)"` key, one object per
//! timestamp, with numbered field names (`"1. open"`, `"5. adjusted close"`)
//! and every value encoded as a string.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, instrument};

use super::error::{RestError, RestResult};
use super::PriceHistory;
use crate::config::RestConfig;

/// `outputsize=compact` covers this many trading days.
pub const COMPACT_DAYS: usize = 100;
pub const DAILY_SERIES_KEY: &str = "Time Series (Daily)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    OneMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    SixtyMin,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMin => "1min",
            Interval::FiveMin => "5min",
            Interval::FifteenMin => "15min",
            Interval::ThirtyMin => "30min",
            Interval::SixtyMin => "60min",
        }
    }

    pub fn series_key(&self) -> String {
        format!("Time Series ({})", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1min" => Ok(Interval::OneMin),
            "5min" => Ok(Interval::FiveMin),
            "15min" => Ok(Interval::FifteenMin),
            "30min" => Ok(Interval::ThirtyMin),
            "60min" => Ok(Interval::SixtyMin),
            other => Err(RestError::BadValue { field: "interval".into(), value: other.into() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Only present on adjusted daily series.
    pub adjusted_close: Option<f64>,
    pub volume: u64,
    pub dividend_amount: Option<f64>,
    pub split_coefficient: Option<f64>,
}

impl Bar {
    /// Adjusted close where the series has one, raw close otherwise.
    pub fn price(&self) -> f64 {
        self.adjusted_close.unwrap_or(self.close)
    }
}

pub struct AlphaVantageClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(config: &RestConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.alpha_vantage_url.clone(),
            api_key: config.alpha_vantage_key.clone(),
        }
    }

    fn request(&self, symbol: &str, args: &[(&str, &str)]) -> RestResult<reqwest::Request> {
        let request = self
            .http
            .get(&self.base_url)
            .query(&[("apikey", self.api_key.as_str()), ("symbol", symbol)])
            .query(args)
            .build()?;
        Ok(request)
    }

    async fn fetch(&self, symbol: &str, args: &[(&str, &str)]) -> RestResult<Value> {
        let request = self.request(symbol, args)?;
        debug!(url = %request.url().path(), symbol, "Requesting price history");
        let body = self.http.execute(request).await?.error_for_status()?.json().await?;
        Ok(body)
    }
}

#[async_trait]
impl PriceHistory for AlphaVantageClient {
    #[instrument(skip(self))]
    async fn daily_bars(&self, symbol: &str, num_days: usize) -> RestResult<Vec<Bar>> {
        let args = [
            ("function", "TIME_SERIES_DAILY_ADJUSTED"),
            ("outputsize", output_size(num_days)),
        ];
        let body = self.fetch(symbol, &args).await?;
        parse_series(&body, DAILY_SERIES_KEY, Some(num_days))
    }

    #[instrument(skip(self))]
    async fn intraday_bars(&self, symbol: &str, interval: Interval) -> RestResult<Vec<Bar>> {
        let args = [("function", "TIME_SERIES_INTRADAY"), ("interval", interval.as_str())];
        let body = self.fetch(symbol, &args).await?;
        parse_series(&body, &interval.series_key(), None)
    }
}

pub fn output_size(num_days: usize) -> &'static str {
    if num_days > COMPACT_DAYS {
        "full"
    } else {
        "compact"
    }
}

/// Turn one `"Time Series (..)"` section into bars, oldest first, keeping the
/// most recent `keep` entries when given.
pub fn parse_series(body: &Value, series_key: &str, keep: Option<usize>) -> RestResult<Vec<Bar>> {
    for key in ["Error Message", "Note", "Information"] {
        if let Some(message) = body.get(key).and_then(Value::as_str) {
            return Err(RestError::Api(message.to_string()));
        }
    }

    let series = body
        .get(series_key)
        .and_then(Value::as_object)
        .ok_or_else(|| RestError::MissingSeries(series_key.to_string()))?;

    let mut bars = series
        .iter()
        .map(|(stamp, fields)| parse_bar(stamp, fields))
        .collect::<RestResult<Vec<_>>>()?;
    bars.sort_by_key(|bar| bar.timestamp);

    if let Some(keep) = keep {
        let skip = bars.len().saturating_sub(keep);
        bars = bars.split_off(skip);
    }
    Ok(bars)
}

fn parse_bar(stamp: &str, fields: &Value) -> RestResult<Bar> {
    let timestamp = parse_timestamp(stamp)?;
    Ok(Bar {
        timestamp,
        open: required(fields, stamp, "open")?,
        high: required(fields, stamp, "high")?,
        low: required(fields, stamp, "low")?,
        close: required(fields, stamp, "close")?,
        adjusted_close: number(fields, stamp, "adjusted close")?,
        volume: required(fields, stamp, "volume")?.max(0.0) as u64,
        dividend_amount: number(fields, stamp, "dividend amount")?,
        split_coefficient: number(fields, stamp, "split coefficient")?,
    })
}

// "1. open" -> "open"
fn field<'a>(fields: &'a Value, name: &str) -> Option<&'a str> {
    fields.as_object()?.iter().find_map(|(key, value)| {
        let bare = key.split_once(". ").map_or(key.as_str(), |(_, rest)| rest);
        if bare == name {
            value.as_str()
        } else {
            None
        }
    })
}

fn number(fields: &Value, stamp: &str, name: &str) -> RestResult<Option<f64>> {
    field(fields, name)
        .map(|raw| {
            raw.parse::<f64>().map_err(|_| RestError::BadValue {
                field: format!("{stamp} {name}"),
                value: raw.to_string(),
            })
        })
        .transpose()
}

fn required(fields: &Value, stamp: &str, name: &str) -> RestResult<f64> {
    number(fields, stamp, name)?.ok_or_else(|| RestError::BadValue {
        field: format!("{stamp} {name}"),
        value: "missing".to_string(),
    })
}

fn parse_timestamp(stamp: &str) -> RestResult<NaiveDateTime> {
    if let Ok(ts) = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(stamp, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| RestError::BadValue { field: "date".into(), value: stamp.to_string() })
}
