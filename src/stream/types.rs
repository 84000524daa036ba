// Wire types for the IEX streaming endpoint (wss://api.tiingo.com/iex)
use std::fmt;

use serde::Serialize;

use crate::stream::error::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Subscribe,
    Unsubscribe,
}

/// Server-assigned subscription id, echoed back in the JSON type it arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SubscriptionId {
    Num(u64),
    Str(String),
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionId::Num(n) => write!(f, "{}", n),
            SubscriptionId::Str(s) => f.write_str(s),
        }
    }
}

impl From<u64> for SubscriptionId {
    fn from(n: u64) -> Self {
        SubscriptionId::Num(n)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        SubscriptionId::Str(s.to_string())
    }
}

/// Client -> server control frame. Field order is part of the wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMessage {
    pub event_name: Action,
    pub authorization: String,
    pub event_data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<SubscriptionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_level: Option<u32>,
    pub tickers: Vec<String>,
}

impl ControlMessage {
    pub fn new(
        action: Action,
        authorization: &str,
        subscription_id: Option<SubscriptionId>,
        threshold_level: Option<u32>,
        tickers: Vec<String>,
    ) -> Self {
        Self {
            event_name: action,
            authorization: authorization.to_string(),
            event_data: EventData { subscription_id, threshold_level, tickers },
        }
    }

    /// First frame on a fresh connection; carries no subscription id.
    pub fn handshake(authorization: &str, threshold_level: u32, tickers: Vec<String>) -> Self {
        Self::new(Action::Subscribe, authorization, None, Some(threshold_level), tickers)
    }

    pub fn to_json(&self) -> Result<String, StreamError> {
        serde_json::to_string(self).map_err(StreamError::Encode)
    }
}

/// Which layout a `messageType: "A"` data array uses, from `data[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateShape {
    Quote,
    Trade,
}

/// One decoded price update for a single symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteUpdate {
    pub symbol: String,
    pub timestamp: String,
    pub shape: UpdateShape,
    pub price: Option<f64>,
    pub size: Option<u64>,
    pub bid_price: Option<f64>,
    pub bid_size: Option<u64>,
    pub ask_price: Option<f64>,
    pub ask_size: Option<u64>,
}

/// Classified inbound frame after the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Update(QuoteUpdate),
    Heartbeat,
    Info,
    ProviderError(String),
    Other(String),
}
