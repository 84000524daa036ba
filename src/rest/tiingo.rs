// IEX top-of-book over REST: GET {base}/?token=..&tickers=a,b
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::error::{RestError, RestResult};
use super::QuoteSource;
use crate::config::RestConfig;
use crate::subscription::state::QuoteSnapshot;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IexQuote {
    pub ticker: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub last: Option<f64>,
    #[serde(default)]
    pub last_size: Option<f64>,
    #[serde(default)]
    pub bid_price: Option<f64>,
    #[serde(default)]
    pub bid_size: Option<f64>,
    #[serde(default)]
    pub ask_price: Option<f64>,
    #[serde(default)]
    pub ask_size: Option<f64>,
}

impl From<&IexQuote> for QuoteSnapshot {
    fn from(q: &IexQuote) -> Self {
        let size = |s: Option<f64>| s.filter(|v| v.is_finite() && *v >= 0.0).map(|v| v.round() as u64);
        QuoteSnapshot {
            last_price: q.last,
            last_size: size(q.last_size),
            bid_price: q.bid_price,
            bid_size: size(q.bid_size),
            ask_price: q.ask_price,
            ask_size: size(q.ask_size),
            timestamp: q.timestamp.clone(),
        }
    }
}

pub struct IexRestClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl IexRestClient {
    pub fn new(config: &RestConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.iex_url.trim_end_matches('/').to_string(),
            token: config.tiingo_token.clone(),
        }
    }

    fn request(&self, tickers: &[String]) -> RestResult<reqwest::Request> {
        let joined = tickers.join(",");
        let request = self
            .http
            .get(format!("{}/", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(&[("token", self.token.as_str()), ("tickers", joined.as_str())])
            .build()?;
        Ok(request)
    }
}

#[async_trait]
impl QuoteSource for IexRestClient {
    #[instrument(skip(self))]
    async fn latest_quotes(&self, tickers: &[String]) -> RestResult<Vec<IexQuote>> {
        let request = self.request(tickers)?;
        let body: serde_json::Value = self.http.execute(request).await?.error_for_status()?.json().await?;
        let quotes = parse_quotes(body)?;
        debug!(count = quotes.len(), "Fetched IEX quotes");
        Ok(quotes)
    }
}

/// The endpoint answers with an array, or an object with `detail` on failure.
pub fn parse_quotes(body: serde_json::Value) -> RestResult<Vec<IexQuote>> {
    if let Some(detail) = body.get("detail").and_then(|d| d.as_str()) {
        return Err(RestError::Api(detail.to_string()));
    }
    serde_json::from_value(body).map_err(|e| RestError::BadValue {
        field: "quotes".to_string(),
        value: e.to_string(),
    })
}
