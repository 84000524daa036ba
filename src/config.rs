//! Runtime settings.
//!
//! Sources, lowest priority first: built-in defaults, `QSTREAM__<SECTION>__<KEY>`
//! environment variables, then the `TIINGO_KEY` / `ALPHA_VANTAGE_KEY` variables
//! the provider documentation uses. Call `dotenvy::dotenv()` before `load` to
//! pick up a `.env` file.

use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;

pub const DEFAULT_WS_URL: &str = "wss://api.tiingo.com/iex";
pub const DEFAULT_IEX_REST_URL: &str = "https://api.tiingo.com/iex";
pub const DEFAULT_ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub stream: StreamConfig,
    pub rest: RestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub ws_url: String,
    pub api_token: String,
    /// Passed through to the provider untouched.
    pub threshold_level: u32,
    /// Tickers sent with the opening handshake.
    pub default_tickers: Vec<String>,
    pub ready_timeout_ms: u64,
}

impl StreamConfig {
    pub fn new(ws_url: &str, api_token: &str) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            api_token: api_token.to_string(),
            threshold_level: 5,
            default_tickers: vec!["spy".to_string()],
            ready_timeout_ms: 10_000,
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    pub iex_url: String,
    pub tiingo_token: String,
    pub alpha_vantage_url: String,
    pub alpha_vantage_key: String,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(
            Self::environment(),
            std::env::var("TIINGO_KEY").ok(),
            std::env::var("ALPHA_VANTAGE_KEY").ok(),
        )
    }

    fn environment() -> Environment {
        Environment::with_prefix("QSTREAM")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("stream.default_tickers")
            .try_parsing(true)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("stream.ws_url", DEFAULT_WS_URL)?
            .set_default("stream.api_token", "")?
            .set_default("stream.threshold_level", 5)?
            .set_default("stream.default_tickers", vec!["spy"])?
            .set_default("stream.ready_timeout_ms", 10_000)?
            .set_default("rest.iex_url", DEFAULT_IEX_REST_URL)?
            .set_default("rest.tiingo_token", "")?
            .set_default("rest.alpha_vantage_url", DEFAULT_ALPHA_VANTAGE_URL)?
            .set_default("rest.alpha_vantage_key", "")
    }

    fn load_from(
        env: Environment,
        tiingo_key: Option<String>,
        alpha_vantage_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(env)
            .set_override_option("stream.api_token", tiingo_key.clone())?
            .set_override_option("rest.tiingo_token", tiingo_key)?
            .set_override_option("rest.alpha_vantage_key", alpha_vantage_key)?
            .build()?
            .try_deserialize()
    }
}
