use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{amount::AmountError, domain::TxOperation};

/// EIP-1193 code a wallet returns when the user declines a prompt.
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderUnavailable,
    UserRejected,
    InsufficientFunds,
    ContractReverted,
    SyncFailure,
    NotConnected,
    InvalidAmount,
    TransactionInProgress,
    Provider,
}

impl ErrorKind {
    /// Whether the user can retry straight away, without installing a wallet,
    /// connecting, or topping up their balance first.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            Self::ProviderUnavailable | Self::InsufficientFunds | Self::NotConnected
        )
    }
}

/// Raw failure reported by a wallet provider or contract collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("no wallet provider is installed")]
    Unavailable,
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("execution reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Reverted { reason: Option<String> },
    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn user_rejected() -> Self {
        Self::Rpc {
            code: USER_REJECTED_CODE,
            message: "user rejected the request".to_string(),
        }
    }

    pub fn reverted(reason: impl Into<String>) -> Self {
        Self::Reverted {
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("no wallet provider detected; install a browser wallet extension")]
    ProviderUnavailable,
    #[error("request rejected by user: {0}")]
    UserRejected(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("contract reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    ContractReverted { reason: Option<String> },
    #[error("failed to read contract state: {0}")]
    SyncFailure(String),
    #[error("wallet is not connected")]
    NotConnected,
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),
    #[error("another transaction is still being processed")]
    TransactionInProgress,
    #[error("provider error: {0}")]
    Provider(String),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderUnavailable => ErrorKind::ProviderUnavailable,
            Self::UserRejected(_) => ErrorKind::UserRejected,
            Self::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            Self::ContractReverted { .. } => ErrorKind::ContractReverted,
            Self::SyncFailure(_) => ErrorKind::SyncFailure,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::InvalidAmount(_) => ErrorKind::InvalidAmount,
            Self::TransactionInProgress => ErrorKind::TransactionInProgress,
            Self::Provider(_) => ErrorKind::Provider,
        }
    }

    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::ContractReverted { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

fn revert_reason_from_message(message: &str) -> Option<String> {
    let lower = message.to_ascii_lowercase();
    let start = lower.find("execution reverted")? + "execution reverted".len();
    let reason = message[start..]
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .trim();
    (!reason.is_empty()).then(|| reason.to_string())
}

impl From<ProviderError> for WalletError {
    fn from(err: ProviderError) -> Self {
        let message = match err {
            ProviderError::Unavailable => return Self::ProviderUnavailable,
            ProviderError::Reverted { reason } => return Self::ContractReverted { reason },
            ProviderError::Rpc {
                code: USER_REJECTED_CODE,
                message,
            } => return Self::UserRejected(message),
            ProviderError::Rpc { message, .. } | ProviderError::Transport(message) => message,
        };

        let lower = message.to_ascii_lowercase();
        if lower.contains("user rejected") || lower.contains("user denied") {
            Self::UserRejected(message)
        } else if lower.contains("insufficient funds") {
            Self::InsufficientFunds(message)
        } else if lower.contains("execution reverted") {
            Self::ContractReverted {
                reason: revert_reason_from_message(&message),
            }
        } else {
            Self::Provider(message)
        }
    }
}

/// Failure of a value-moving contract call, tagged with the operation that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {error}")]
pub struct ContractCallError {
    pub operation: TxOperation,
    #[source]
    pub error: WalletError,
}

impl ContractCallError {
    pub fn new(operation: TxOperation, error: impl Into<WalletError>) -> Self {
        Self {
            operation,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn revert_reason(&self) -> Option<&str> {
        self.error.revert_reason()
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
