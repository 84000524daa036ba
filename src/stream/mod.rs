// Streaming side: wire types, frame decoding and the connection task
pub mod client;  // owns the websocket and the receive loop
pub mod codec;   // inbound frame classification
pub mod error;
pub mod types;   // control frames + decoded updates

pub use client::QuoteStreamClient;
pub use error::{DecodeError, StreamError, StreamResult};
pub use types::SubscriptionId;
