use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::stream::error::{StreamError, StreamResult};
use crate::stream::types::{QuoteUpdate, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unstarted,
    Connecting,
    Ready,
    Closed,
}

/// Last known state of one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteSnapshot {
    pub last_price: Option<f64>,
    pub last_size: Option<u64>,
    pub bid_price: Option<f64>,
    pub bid_size: Option<u64>,
    pub ask_price: Option<f64>,
    pub ask_size: Option<u64>,
    pub timestamp: Option<String>,
}

impl QuoteSnapshot {
    /// Fold an update in. Bid/ask only move when the update carries them.
    pub fn apply(&mut self, update: &QuoteUpdate) {
        self.last_price = update.price.or(self.last_price);
        self.last_size = update.size.or(self.last_size);
        self.bid_price = update.bid_price.or(self.bid_price);
        self.bid_size = update.bid_size.or(self.bid_size);
        self.ask_price = update.ask_price.or(self.ask_price);
        self.ask_size = update.ask_size.or(self.ask_size);
        self.timestamp = Some(update.timestamp.clone());
    }
}

/// State shared between the registry (readers, control side) and the
/// connection task (the only writer of snapshots).
///
/// Tracked symbols map to `None` until their first update arrives.
#[derive(Debug)]
pub struct Subscription {
    state: watch::Sender<StreamState>,
    subscription_id: OnceLock<SubscriptionId>,
    symbols: RwLock<HashMap<String, Option<QuoteSnapshot>>>,
}

impl Subscription {
    pub fn new() -> Self {
        let (state, _) = watch::channel(StreamState::Unstarted);
        Self {
            state,
            subscription_id: OnceLock::new(),
            symbols: RwLock::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn subscription_id(&self) -> Option<&SubscriptionId> {
        self.subscription_id.get()
    }

    /// `Unstarted -> Connecting`. Only one caller ever gets `true`.
    pub fn begin_connect(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == StreamState::Unstarted {
                *state = StreamState::Connecting;
                true
            } else {
                false
            }
        })
    }

    /// `Connecting -> Ready`, storing the server-assigned id.
    /// Returns false (and changes nothing) if the id was already assigned or
    /// the stream is not connecting.
    pub fn mark_ready(&self, id: SubscriptionId) -> bool {
        if self.state() != StreamState::Connecting {
            return false;
        }
        if self.subscription_id.set(id).is_err() {
            return false;
        }
        let changed = self.state.send_if_modified(|state| {
            if *state == StreamState::Connecting {
                *state = StreamState::Ready;
                true
            } else {
                false
            }
        });
        if changed {
            if let Some(id) = self.subscription_id() {
                info!(subscription_id = %id, "Subscription ready");
            }
        }
        changed
    }

    pub fn mark_closed(&self) {
        let previous = self.state.send_replace(StreamState::Closed);
        if previous != StreamState::Closed {
            info!(?previous, "Subscription closed");
        }
    }

    /// Wait until the stream is `Ready` and return the subscription id.
    pub async fn wait_ready(&self, limit: Duration) -> StreamResult<SubscriptionId> {
        let mut rx = self.state.subscribe();
        let reached = tokio::time::timeout(
            limit,
            rx.wait_for(|s| matches!(s, StreamState::Ready | StreamState::Closed)),
        )
        .await;

        let state = match reached {
            Err(_) => return Err(StreamError::ReadyTimeout(limit)),
            Ok(Err(_)) => return Err(StreamError::Closed),
            Ok(Ok(guard)) => *guard,
        };

        match (state, self.subscription_id()) {
            (StreamState::Ready, Some(id)) => Ok(id.clone()),
            _ => Err(StreamError::Closed),
        }
    }

    /// Start tracking `symbol`. Returns true if it was not tracked before.
    pub fn track(&self, symbol: &str) -> bool {
        let mut symbols = self.symbols.write();
        if symbols.contains_key(symbol) {
            return false;
        }
        symbols.insert(symbol.to_string(), None);
        metrics::gauge!("qstream_tracked_symbols").set(symbols.len() as f64);
        true
    }

    pub fn untrack(&self, symbol: &str) -> StreamResult<()> {
        let mut symbols = self.symbols.write();
        if symbols.remove(symbol).is_none() {
            return Err(StreamError::UnknownSymbol(symbol.to_string()));
        }
        metrics::gauge!("qstream_tracked_symbols").set(symbols.len() as f64);
        Ok(())
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.symbols.read().contains_key(symbol)
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = self.symbols.read().keys().cloned().collect();
        out.sort();
        out
    }

    pub fn snapshot(&self, symbol: &str) -> Option<QuoteSnapshot> {
        self.symbols.read().get(symbol).cloned().flatten()
    }

    /// Apply an update from the receive loop. Untracked symbols are dropped.
    pub fn apply_update(&self, update: &QuoteUpdate) -> bool {
        let mut symbols = self.symbols.write();
        match symbols.get_mut(&update.symbol) {
            Some(slot) => {
                slot.get_or_insert_with(QuoteSnapshot::default).apply(update);
                trace!(symbol = %update.symbol, price = ?update.price, size = ?update.size, "Snapshot updated");
                true
            }
            None => {
                debug!(symbol = %update.symbol, "Dropping update for untracked symbol");
                false
            }
        }
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}
