use std::fmt;

pub use alloy_primitives::{address, Address, TxHash, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const MAINNET: Self = Self(1);
    pub const SEPOLIA: Self = Self(11_155_111);

    /// Parses the `0x`-prefixed hex form wallets use in `chainChanged` notifications.
    pub fn from_hex(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        if digits.is_empty() {
            return None;
        }
        u64::from_str_radix(digits, 16).ok().map(Self)
    }

    pub fn to_hex(self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOperation {
    Fund,
    Withdraw,
}

impl fmt::Display for TxOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fund => f.write_str("fund"),
            Self::Withdraw => f.write_str("withdraw"),
        }
    }
}

/// Checksummed `0x1234...abcd` form used in status messages.
pub fn short_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
