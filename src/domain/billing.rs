//! Fee computation.
//!
//! Two billing policies are supported and selected by configuration: a
//! metered tariff (free window, first period, per-unit increments, optional
//! cap) and a flat fee. Both are pure functions of the rental window.

use super::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MILLIS_PER_MINUTE: i64 = 60_000;
const DEFAULT_UNIT_MINUTES: u32 = 30;
/// Upper bound for any configured price: 1,000,000.00.
pub const MAX_PRICE: Money = Money::from_minor(100_000_000);

/// Rent owed for a rental window plus the (duration independent) deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub rent: Money,
    pub deposit: Money,
}

/// Metered tariff. Prices are in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffRule {
    #[serde(default)]
    pub free_minutes: u32,
    #[serde(default)]
    pub first_period_minutes: u32,
    #[serde(default)]
    pub first_period_price: Money,
    #[serde(default = "default_unit_minutes")]
    pub unit_minutes: u32,
    #[serde(default)]
    pub unit_price: Money,
    #[serde(default)]
    pub cap_price: Option<Money>,
    #[serde(default)]
    pub deposit_price: Money,
}

fn default_unit_minutes() -> u32 {
    DEFAULT_UNIT_MINUTES
}

impl Default for TariffRule {
    fn default() -> Self {
        Self {
            free_minutes: 15,
            first_period_minutes: 60,
            first_period_price: Money::from_minor(200),
            unit_minutes: DEFAULT_UNIT_MINUTES,
            unit_price: Money::from_minor(100),
            cap_price: Some(Money::from_minor(2000)),
            deposit_price: Money::from_minor(1500),
        }
    }
}

/// Whole minutes between `start` and `end`, rounded up and floored at zero.
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let ms = (end - start).num_milliseconds().max(0);
    (ms + MILLIS_PER_MINUTE - 1) / MILLIS_PER_MINUTE
}

/// Computes the metered fee for a rental window.
pub fn compute_fee(start: DateTime<Utc>, end: DateTime<Utc>, rule: &TariffRule) -> Fee {
    let minutes = elapsed_minutes(start, end);
    let free = i64::from(rule.free_minutes);
    if minutes <= free {
        return Fee {
            rent: Money::ZERO,
            deposit: rule.deposit_price,
        };
    }

    let billable = minutes - free;
    let first_period = i64::from(rule.first_period_minutes);
    let mut rent = rule.first_period_price;
    if billable > first_period {
        // A zero unit length would never advance; treat it as the default.
        let unit = match rule.unit_minutes {
            0 => i64::from(DEFAULT_UNIT_MINUTES),
            n => i64::from(n),
        };
        let units = (billable - first_period + unit - 1) / unit;
        rent = rent.saturating_add(rule.unit_price.saturating_mul(units));
    }

    if let Some(cap) = rule.cap_price
        && cap > Money::ZERO
    {
        rent = rent.min(cap);
    }

    Fee {
        rent,
        deposit: rule.deposit_price,
    }
}

/// The system-wide billing policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BillingPolicy {
    Metered(TariffRule),
    Flat { rent: Money, deposit: Money },
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self::Metered(TariffRule::default())
    }
}

impl BillingPolicy {
    /// Deposit charged when an order is created.
    pub fn deposit(&self) -> Money {
        match self {
            Self::Metered(rule) => rule.deposit_price,
            Self::Flat { deposit, .. } => *deposit,
        }
    }

    pub fn quote(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Fee {
        match self {
            Self::Metered(rule) => compute_fee(start, end, rule),
            Self::Flat { rent, deposit } => Fee {
                rent: *rent,
                deposit: *deposit,
            },
        }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        let prices = match self {
            Self::Metered(rule) => vec![
                rule.first_period_price,
                rule.unit_price,
                rule.cap_price.unwrap_or(Money::ZERO),
                rule.deposit_price,
            ],
            Self::Flat { rent, deposit } => vec![*rent, *deposit],
        };
        if prices.iter().any(Money::is_negative) {
            return Err(crate::error::LockerError::Validation(
                "billing prices must not be negative".to_string(),
            ));
        }
        if prices.iter().any(|price| *price > MAX_PRICE) {
            return Err(crate::error::LockerError::Validation(format!(
                "billing prices must not exceed {MAX_PRICE}"
            )));
        }
        Ok(())
    }
}
