//! Exact conversion between display amounts (ether) and boundary amounts (wei).

use std::{fmt, str::FromStr};

use alloy_primitives::{
    utils::{ParseUnits, Unit},
    U256,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("'{0}' is not a valid ether amount")]
    Malformed(String),
    #[error("amount must not be negative: {0}")]
    Negative(String),
    #[error("amount must be greater than zero")]
    Zero,
    #[error("'{0}' has more than 18 decimal places")]
    TooPrecise(String),
}

const ETHER_DECIMALS: usize = 18;

/// A native-currency amount held in wei.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EtherAmount(U256);

impl EtherAmount {
    pub const ZERO: Self = Self(U256::ZERO);

    pub const fn from_wei(wei: U256) -> Self {
        Self(wei)
    }

    pub const fn wei(self) -> U256 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Parses a decimal ether string such as `"0.05"`. Zero is accepted.
    pub fn parse_ether(raw: &str) -> Result<Self, AmountError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AmountError::Empty);
        }
        if raw.starts_with('-') {
            return Err(AmountError::Negative(raw.to_string()));
        }
        if let Some((_, fraction)) = raw.split_once('.') {
            if fraction.len() > ETHER_DECIMALS && fraction.bytes().all(|b| b.is_ascii_digit()) {
                return Err(AmountError::TooPrecise(raw.to_string()));
            }
        }
        match ParseUnits::parse_units(raw, Unit::ETHER) {
            Ok(ParseUnits::U256(wei)) => Ok(Self(wei)),
            Ok(ParseUnits::I256(_)) => Err(AmountError::Negative(raw.to_string())),
            Err(_) => Err(AmountError::Malformed(raw.to_string())),
        }
    }

    /// Like [`EtherAmount::parse_ether`] but rejects zero.
    pub fn parse_positive_ether(raw: &str) -> Result<Self, AmountError> {
        let amount = Self::parse_ether(raw)?;
        if amount.is_zero() {
            return Err(AmountError::Zero);
        }
        Ok(amount)
    }
}

impl From<U256> for EtherAmount {
    fn from(wei: U256) -> Self {
        Self(wei)
    }
}

impl FromStr for EtherAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_ether(s)
    }
}

/// Renders `0.0`, `0.02`, `1.5`: trailing fractional zeros are trimmed but one
/// fractional digit always remains.
impl fmt::Display for EtherAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = ParseUnits::U256(self.0).format_units(Unit::ETHER);
        let Some((whole, fraction)) = formatted.split_once('.') else {
            return write!(f, "{formatted}.0");
        };
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            write!(f, "{whole}.0")
        } else {
            write!(f, "{whole}.{fraction}")
        }
    }
}

#[cfg(test)]
#[path = "tests/amount_tests.rs"]
mod tests;
