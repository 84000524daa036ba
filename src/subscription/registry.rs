use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::StreamConfig;
use crate::stream::client::QuoteStreamClient;
use crate::stream::error::{StreamError, StreamResult};
use crate::stream::types::Action;
use crate::subscription::state::{QuoteSnapshot, StreamState, Subscription};

/// Front door for callers: add/remove tickers on the live stream and read
/// their latest snapshots.
///
/// Every identifier-scoped operation waits for the handshake to finish first,
/// so nothing is ever sent before the subscription id exists. Adds and removes
/// hold `changes` from the tracked-set update through the acknowledged write,
/// so the tracked set always matches the last frame sent for a ticker.
pub struct SubscriptionRegistry {
    subscription: Arc<Subscription>,
    client: QuoteStreamClient,
    changes: Mutex<()>,
}

impl SubscriptionRegistry {
    pub fn new(config: StreamConfig) -> Self {
        let subscription = Arc::new(Subscription::new());
        let client = QuoteStreamClient::new(config, Arc::clone(&subscription));
        Self { subscription, client, changes: Mutex::new(()) }
    }

    /// Open the stream without adding anything. `add_symbol` does this on demand.
    pub fn start(&self) {
        self.client.start();
    }

    pub fn state(&self) -> StreamState {
        self.subscription.state()
    }

    pub fn subscription_id(&self) -> Option<String> {
        self.subscription.subscription_id().map(ToString::to_string)
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        self.subscription.tracked_symbols()
    }

    pub fn snapshot(&self, ticker: &str) -> Option<QuoteSnapshot> {
        let symbol = normalize_ticker(ticker).ok()?;
        self.subscription.snapshot(&symbol)
    }

    #[instrument(skip(self))]
    pub async fn add_symbol(&self, ticker: &str) -> StreamResult<()> {
        let symbol = normalize_ticker(ticker)?;
        if self.subscription.state() == StreamState::Unstarted {
            self.client.start();
        }
        self.subscription.wait_ready(self.client.config().ready_timeout()).await?;
        let _changes = self.changes.lock().await;

        // Track before sending so an update racing the ack is not dropped.
        let newly_tracked = self.subscription.track(&symbol);
        let sent = self
            .client
            .send_control(
                Action::Subscribe,
                vec![symbol.clone()],
                Some(self.client.config().threshold_level),
            )
            .await;

        match sent {
            Ok(()) => {
                info!(%symbol, "Added ticker");
                Ok(())
            }
            Err(e) => {
                if newly_tracked {
                    let _ = self.subscription.untrack(&symbol);
                }
                warn!(%symbol, error = %e, "Failed to add ticker");
                Err(e)
            }
        }
    }

    /// Add several tickers, one result per ticker. A failure on one does not
    /// stop the rest.
    pub async fn add_symbols<I, S>(&self, tickers: I) -> Vec<(String, StreamResult<()>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut results = Vec::new();
        for ticker in tickers {
            let ticker = ticker.as_ref();
            let result = self.add_symbol(ticker).await;
            results.push((ticker.to_string(), result));
        }
        results
    }

    /// Returns `Ok(false)` when the ticker was not tracked; nothing is sent then.
    #[instrument(skip(self))]
    pub async fn remove_symbol(&self, ticker: &str) -> StreamResult<bool> {
        let symbol = normalize_ticker(ticker)?;
        let _changes = self.changes.lock().await;
        if !self.subscription.is_tracked(&symbol) {
            debug!(%symbol, "Remove of untracked ticker ignored");
            return Ok(false);
        }

        self.subscription.wait_ready(self.client.config().ready_timeout()).await?;
        self.client
            .send_control(Action::Unsubscribe, vec![symbol.clone()], None)
            .await?;

        self.subscription.untrack(&symbol)?;
        info!(%symbol, "Removed ticker");
        Ok(true)
    }

    pub async fn close(&self) {
        self.client.close().await;
    }
}

/// Provider tickers are lowercase.
pub fn normalize_ticker(ticker: &str) -> StreamResult<String> {
    let symbol = ticker.trim().to_lowercase();
    if symbol.is_empty() || symbol.chars().any(char::is_whitespace) {
        return Err(StreamError::InvalidTicker(ticker.to_string()));
    }
    Ok(symbol)
}
