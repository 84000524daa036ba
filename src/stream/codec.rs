//! Decoding of server -> client frames.
//!
//! The handshake response only has to carry `data.subscriptionId`. Every later
//! frame is classified by `messageType`; `"A"` frames carry a positional `data`
//! array whose first element selects the quote or trade layout.

use serde_json::Value;

use crate::stream::error::DecodeError;
use crate::stream::types::{Frame, QuoteUpdate, SubscriptionId, UpdateShape};

const SHAPE_IDX: usize = 0;
const TIMESTAMP_IDX: usize = 1;
const SYMBOL_IDX: usize = 3;
const QUOTE_BID_SIZE_IDX: usize = 4;
const QUOTE_BID_PRICE_IDX: usize = 5;
const QUOTE_PRICE_IDX: usize = 7;
const QUOTE_SIZE_IDX: usize = 8;
const TRADE_PRICE_IDX: usize = 9;
const TRADE_SIZE_IDX: usize = 10;

/// Pull the subscription id out of a handshake response.
/// The provider sends it as a number, older payloads as a string; either is
/// kept as sent.
pub fn parse_handshake(text: &str) -> Result<SubscriptionId, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let id = value
        .get("data")
        .and_then(|d| d.get("subscriptionId"))
        .ok_or(DecodeError::MissingField("data.subscriptionId"))?;

    if let Some(n) = id.as_u64() {
        return Ok(SubscriptionId::Num(n));
    }
    match id {
        Value::String(s) if !s.is_empty() => Ok(SubscriptionId::Str(s.clone())),
        other => Err(DecodeError::UnexpectedType {
            field: "data.subscriptionId",
            value: other.to_string(),
        }),
    }
}

pub fn parse_frame(text: &str) -> Result<Frame, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let message_type = value
        .get("messageType")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("messageType"))?;

    match message_type {
        "A" => {
            let data = value.get("data").ok_or(DecodeError::MissingField("data"))?;
            parse_update(data).map(Frame::Update)
        }
        "H" => Ok(Frame::Heartbeat),
        "I" => Ok(Frame::Info),
        "E" => {
            let message = value
                .get("response")
                .and_then(|r| r.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error");
            Ok(Frame::ProviderError(message.to_string()))
        }
        other => Ok(Frame::Other(other.to_string())),
    }
}

/// Decode the positional array of an `"A"` frame.
pub fn parse_update(data: &Value) -> Result<QuoteUpdate, DecodeError> {
    let fields = data.as_array().ok_or_else(|| DecodeError::UnexpectedType {
        field: "data",
        value: data.to_string(),
    })?;

    let shape = match required_str(fields, SHAPE_IDX, "data[0]")? {
        "Q" => UpdateShape::Quote,
        _ => UpdateShape::Trade,
    };
    let timestamp = required_str(fields, TIMESTAMP_IDX, "data[1]")?.to_string();
    let symbol = required_str(fields, SYMBOL_IDX, "data[3]")?.to_lowercase();

    let update = match shape {
        UpdateShape::Quote => QuoteUpdate {
            symbol,
            timestamp,
            shape,
            price: price_at(fields, QUOTE_PRICE_IDX),
            size: size_at(fields, QUOTE_SIZE_IDX),
            bid_price: price_at(fields, QUOTE_BID_PRICE_IDX),
            bid_size: size_at(fields, QUOTE_BID_SIZE_IDX),
            ask_price: price_at(fields, QUOTE_PRICE_IDX),
            ask_size: size_at(fields, QUOTE_SIZE_IDX),
        },
        UpdateShape::Trade => QuoteUpdate {
            symbol,
            timestamp,
            shape,
            price: price_at(fields, TRADE_PRICE_IDX),
            size: size_at(fields, TRADE_SIZE_IDX),
            bid_price: None,
            bid_size: None,
            ask_price: None,
            ask_size: None,
        },
    };

    if update.price.is_none() && update.size.is_none() {
        return Err(DecodeError::MissingField("price/size"));
    }
    Ok(update)
}

fn required_str<'a>(fields: &'a [Value], idx: usize, name: &'static str) -> Result<&'a str, DecodeError> {
    let value = fields.get(idx).ok_or(DecodeError::MissingField(name))?;
    value.as_str().ok_or_else(|| DecodeError::UnexpectedType {
        field: name,
        value: value.to_string(),
    })
}

fn price_at(fields: &[Value], idx: usize) -> Option<f64> {
    fields.get(idx).and_then(Value::as_f64)
}

// Sizes are integral on the wire but occasionally arrive as 200.0
fn size_at(fields: &[Value], idx: usize) -> Option<u64> {
    let value = fields.get(idx)?;
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.round() as u64)
    })
}
