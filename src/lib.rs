//! Live IEX quote streaming with dynamic ticker subscriptions, plus the REST
//! quote/price-history clients and moving-average math around it.

pub mod analysis;
pub mod config;
pub mod rest;
pub mod stream;
pub mod subscription;
pub mod telemetry;

pub use config::{Settings, StreamConfig};
pub use stream::{QuoteStreamClient, StreamError};
pub use subscription::{QuoteSnapshot, StreamState, SubscriptionRegistry};
