// REST collaborators: one-shot quote snapshots and price history
use async_trait::async_trait;

pub mod alpha_vantage;  // daily + intraday bars
pub mod error;
pub mod tiingo;         // IEX top-of-book snapshots

pub use alpha_vantage::{AlphaVantageClient, Bar, Interval};
pub use error::{RestError, RestResult};
pub use tiingo::{IexQuote, IexRestClient};

#[async_trait]
pub trait QuoteSource {
    /// One entry per ticker the provider knows about.
    async fn latest_quotes(&self, tickers: &[String]) -> RestResult<Vec<IexQuote>>;
}

#[async_trait]
pub trait PriceHistory {
    /// Most recent `num_days` daily bars, oldest first.
    async fn daily_bars(&self, symbol: &str, num_days: usize) -> RestResult<Vec<Bar>>;

    async fn intraday_bars(&self, symbol: &str, interval: Interval) -> RestResult<Vec<Bar>>;
}
