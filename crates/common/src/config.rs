//! Dashboard configuration loaded from TOML, with environment overrides.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! starting point; `account` is the only value that must be supplied
//! before [`DashboardConfig::validate`] passes.
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `STAKER_ACCOUNT` | `account` |
//! | `STAKER_GAS_TIER` | `gas_tier` |
//! | `STAKER_EVENT_WINDOW` | `event_window` |
//! | `STAKER_FETCH_TIMEOUT_MS` | `fetch_timeout_ms` |
//! | `STAKER_REFRESH_INTERVAL_MS` | `refresh_interval_ms` |

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::amount::{parse_units, NATIVE_DECIMALS};
use crate::contract::{GasTier, STAKE_EVENT};
use crate::types::{Address, Amount};

/// Default bound on a single contract read.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(String),

    #[error("cannot parse config file: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for {var}")]
    Env { var: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Hex address of the account whose stake is mirrored.
    pub account: String,

    /// Gas-price tier used for every submission.
    pub gas_tier: GasTier,

    /// Event subscribed to by the feed.
    pub event_name: String,

    /// Number of recent events retained.
    pub event_window: usize,

    /// First block scanned by the event subscription.
    pub from_block: u64,

    /// How often the native balance is polled for changes.
    pub balance_poll_interval_ms: u64,

    /// Optional periodic refresh in addition to balance triggers.
    pub refresh_interval_ms: Option<u64>,

    /// Per-read timeout; a timed-out read counts as failed.
    pub fetch_timeout_ms: Option<u64>,

    /// Pause before re-subscribing after the event stream breaks.
    pub resubscribe_delay_ms: u64,

    /// Decimal amount sent by the fixed "stake" action.
    pub stake_amount: String,

    /// Decimals of the staked token.
    pub decimals: u8,

    /// Log level for the binary's subscriber.
    pub log_level: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            account: String::new(),
            gas_tier: GasTier::Fast,
            event_name: STAKE_EVENT.to_string(),
            event_window: 10,
            from_block: 1,
            balance_poll_interval_ms: 4_000,
            refresh_interval_ms: None,
            fetch_timeout_ms: Some(DEFAULT_FETCH_TIMEOUT_MS),
            resubscribe_delay_ms: 1_000,
            stake_amount: "0.5".to_string(),
            decimals: NATIVE_DECIMALS,
            log_level: "info".to_string(),
        }
    }
}

/// Load config from a TOML file path.
/// If file is missing or parse fails, an error is returned.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<DashboardConfig, ConfigError> {
    let p = path.as_ref();
    let s = fs::read_to_string(p).map_err(|e| ConfigError::Io(format!("{}: {}", p.display(), e)))?;
    toml::from_str(&s).map_err(|e| ConfigError::Parse(e.to_string()))
}

impl DashboardConfig {
    /// Applies `STAKER_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn invalid(var: &str, value: &str) -> ConfigError {
            ConfigError::Env {
                var: var.to_string(),
                value: value.to_string(),
            }
        }

        if let Some(v) = lookup("STAKER_ACCOUNT") {
            self.account = v;
        }
        if let Some(v) = lookup("STAKER_GAS_TIER") {
            self.gas_tier = v.parse().map_err(|_| invalid("STAKER_GAS_TIER", &v))?;
        }
        if let Some(v) = lookup("STAKER_EVENT_WINDOW") {
            self.event_window = v.parse().map_err(|_| invalid("STAKER_EVENT_WINDOW", &v))?;
        }
        if let Some(v) = lookup("STAKER_FETCH_TIMEOUT_MS") {
            let ms = v.parse().map_err(|_| invalid("STAKER_FETCH_TIMEOUT_MS", &v))?;
            self.fetch_timeout_ms = Some(ms);
        }
        if let Some(v) = lookup("STAKER_REFRESH_INTERVAL_MS") {
            let ms = v.parse().map_err(|_| invalid("STAKER_REFRESH_INTERVAL_MS", &v))?;
            self.refresh_interval_ms = Some(ms);
        }
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.account_address()?;
        self.fixed_stake_value()?;

        if self.event_window == 0 {
            return Err(ConfigError::Invalid("event_window must be at least 1".into()));
        }
        if self.event_name.is_empty() {
            return Err(ConfigError::Invalid("event_name cannot be empty".into()));
        }
        if self.balance_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("balance_poll_interval_ms cannot be 0".into()));
        }
        if self.refresh_interval_ms == Some(0) {
            return Err(ConfigError::Invalid("refresh_interval_ms cannot be 0".into()));
        }
        if self.fetch_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("fetch_timeout_ms cannot be 0".into()));
        }
        Ok(())
    }

    /// The mirrored account, parsed.
    pub fn account_address(&self) -> Result<Address, ConfigError> {
        if self.account.trim().is_empty() {
            return Err(ConfigError::Invalid("account is not set".into()));
        }
        self.account
            .trim()
            .parse::<Address>()
            .map_err(|e| ConfigError::Invalid(format!("account '{}': {}", self.account, e)))
    }

    /// Smallest-unit value of the fixed stake action.
    pub fn fixed_stake_value(&self) -> Result<Amount, ConfigError> {
        parse_units(&self.stake_amount, self.decimals)
            .map_err(|e| ConfigError::Invalid(format!("stake_amount: {}", e)))
    }

    pub fn balance_poll_interval(&self) -> Duration {
        Duration::from_millis(self.balance_poll_interval_ms)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_ms.map(Duration::from_millis)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }
}
