use crate::core::events::{PositionMode, TradeMode};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Staleness windows for the streaming feeds, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedTimeouts {
    pub depth_secs: u64,
    /// Venue pushes at least every 10s
    pub mark_price_secs: u64,
    /// REST fallback when the price-limit stream has been quiet this long
    pub price_limit_poll_secs: u64,
    pub price_limit_secs: u64,
    /// Perpetuals only
    pub funding_rate_secs: u64,
}

impl Default for FeedTimeouts {
    fn default() -> Self {
        Self {
            depth_secs: 20,
            mark_price_secs: 20,
            price_limit_poll_secs: 10,
            price_limit_secs: 20,
            funding_rate_secs: 180,
        }
    }
}

impl FeedTimeouts {
    pub fn depth(&self) -> Duration {
        Duration::from_secs(self.depth_secs)
    }

    pub fn mark_price(&self) -> Duration {
        Duration::from_secs(self.mark_price_secs)
    }

    pub fn price_limit_poll(&self) -> Duration {
        Duration::from_secs(self.price_limit_poll_secs)
    }

    pub fn price_limit(&self) -> Duration {
        Duration::from_secs(self.price_limit_secs)
    }

    pub fn funding_rate(&self) -> Duration {
        Duration::from_secs(self.funding_rate_secs)
    }
}

/// Core configuration shared by everything created under one exchange context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub feeds: FeedTimeouts,
    /// How often traders drop finished orders from their live map
    pub sweep_interval_ms: u64,
    /// Pause applied by `make_order` when the trader is not ready
    pub unready_pause_ms: u64,
    pub account_poll_secs: u64,
    pub position_mode: PositionMode,
    pub contract_trade_mode: TradeMode,
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            feeds: FeedTimeouts::default(),
            sweep_interval_ms: 1000,
            unready_pause_ms: 1000,
            account_poll_secs: 5,
            position_mode: PositionMode::Net,
            contract_trade_mode: TradeMode::Cross,
            log_level: "info".to_string(),
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(Error::Config("sweep_interval_ms must be positive".to_string()));
        }
        if self.account_poll_secs == 0 {
            return Err(Error::Config("account_poll_secs must be positive".to_string()));
        }
        let f = &self.feeds;
        if f.depth_secs == 0 || f.mark_price_secs == 0 || f.price_limit_secs == 0 || f.funding_rate_secs == 0 {
            return Err(Error::Config("feed timeouts must be positive".to_string()));
        }
        if f.price_limit_poll_secs == 0 || f.price_limit_poll_secs >= f.price_limit_secs {
            return Err(Error::Config(
                "price_limit_poll_secs must be positive and below price_limit_secs".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn unready_pause(&self) -> Duration {
        Duration::from_millis(self.unready_pause_ms)
    }

    pub fn account_poll_interval(&self) -> Duration {
        Duration::from_secs(self.account_poll_secs)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}
