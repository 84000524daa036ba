// Subscription bookkeeping shared with the stream task
pub mod registry;  // add/remove/snapshot facade
pub mod state;     // lifecycle state, subscription id, per-symbol snapshots

pub use registry::SubscriptionRegistry;
pub use state::{QuoteSnapshot, StreamState, Subscription};
