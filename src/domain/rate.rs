use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::Cents;

/// Rounding applied when a conversion lands between two cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Towards the larger amount. Used for debits so the wallet is never under-charged.
    Up,
    /// Towards zero. Used for credits.
    Down,
}

impl Rounding {
    fn strategy(self) -> RoundingStrategy {
        match self {
            Rounding::Up => RoundingStrategy::AwayFromZero,
            Rounding::Down => RoundingStrategy::ToZero,
        }
    }
}

/// Exchange rate expressed as BS per 1 USDT. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    /// Official reference rate of 36.50 BS per USDT.
    pub const DEFAULT_REFERENCE: Rate = Rate(Decimal::from_parts(3650, 0, 0, false, 2));

    pub fn new(value: Decimal) -> Result<Self, RateError> {
        if value <= Decimal::ZERO {
            return Err(RateError::NotPositive(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Convert a fiat amount into stable cents.
    pub fn fiat_to_stable(&self, fiat: Cents, rounding: Rounding) -> Cents {
        to_cents(Decimal::from(fiat).checked_div(self.0), rounding)
    }

    /// Convert a stable amount into fiat cents.
    pub fn stable_to_fiat(&self, stable: Cents, rounding: Rounding) -> Cents {
        to_cents(Decimal::from(stable).checked_mul(self.0), rounding)
    }
}

// Results outside the i64 range saturate to Cents::MAX.
fn to_cents(value: Option<Decimal>, rounding: Rounding) -> Cents {
    value
        .and_then(|v| v.round_dp_with_strategy(0, rounding.strategy()).to_i64())
        .unwrap_or(Cents::MAX)
}

impl TryFrom<Decimal> for Rate {
    type Error = RateError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Rate::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl FromStr for Rate {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| RateError::InvalidFormat)?;
        Rate::new(value)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Inclusive range of rates accepted by the exchange auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBand {
    pub floor: Rate,
    pub ceiling: Rate,
}

impl RateBand {
    pub fn new(floor: Rate, ceiling: Rate) -> Result<Self, RateError> {
        if floor > ceiling {
            return Err(RateError::InvertedBand { floor, ceiling });
        }
        Ok(Self { floor, ceiling })
    }

    /// Band of `reference ± tolerance`, where tolerance is a fraction (0.10 = 10%).
    pub fn around(reference: Rate, tolerance: Decimal) -> Result<Self, RateError> {
        if tolerance < Decimal::ZERO || tolerance >= Decimal::ONE {
            return Err(RateError::InvalidTolerance(tolerance));
        }
        let floor = Rate::new(reference.value() * (Decimal::ONE - tolerance))?;
        let ceiling = Rate::new(reference.value() * (Decimal::ONE + tolerance))?;
        Self::new(floor, ceiling)
    }

    pub fn contains(&self, rate: Rate) -> bool {
        rate >= self.floor && rate <= self.ceiling
    }
}

impl fmt::Display for RateBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.floor, self.ceiling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    InvalidFormat,
    NotPositive(Decimal),
    InvalidTolerance(Decimal),
    InvertedBand { floor: Rate, ceiling: Rate },
}

impl fmt::Display for RateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateError::InvalidFormat => write!(f, "invalid rate format"),
            RateError::NotPositive(value) => write!(f, "rate must be positive, got {}", value),
            RateError::InvalidTolerance(value) => {
                write!(f, "tolerance must be in [0, 1), got {}", value)
            }
            RateError::InvertedBand { floor, ceiling } => {
                write!(f, "rate floor {} is above ceiling {}", floor, ceiling)
            }
        }
    }
}

impl std::error::Error for RateError {}
