//! wallet configuration

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, Rate, RateBand, RateError};

/// Settings read from an optional JSON file; missing keys take defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// official BS per USDT rate used for card and bill conversions
    pub reference_rate: Rate,
    /// half-width of the exchange band around the reference rate (0.10 = ±10%)
    pub rate_tolerance: Decimal,
    /// account used when `--user` is not given
    pub default_user: String,
    /// stable cents credited when a referral code is redeemed
    pub referral_bonus_cents: Cents,
    /// how long a write waits on a locked database
    pub busy_timeout_ms: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            reference_rate: Rate::DEFAULT_REFERENCE,
            rate_tolerance: Decimal::new(10, 2),
            default_user: "mia-user-123".into(),
            referral_bonus_cents: 200,
            busy_timeout_ms: 5000,
        }
    }
}

impl WalletConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        config.band().context("Invalid rate tolerance")?;
        if config.referral_bonus_cents <= 0 {
            anyhow::bail!("referral_bonus_cents must be positive");
        }
        Ok(config)
    }

    /// Auction rates accepted by the exchange.
    pub fn band(&self) -> Result<RateBand, RateError> {
        RateBand::around(self.reference_rate, self.rate_tolerance)
    }
}
