//! Auto-expiring status notifications and the user-facing wording of failures.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    amount::AmountError,
    domain::TxOperation,
    error::{ContractCallError, ErrorKind, WalletError},
};
use tokio::{
    sync::{broadcast, Mutex},
    time::Instant,
};

use crate::ClientEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// Wall-clock time after which the notification is no longer active.
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    deadline: Instant,
}

impl Notification {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Keeps `Instant + ttl` from overflowing on absurd settings.
const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365);

pub struct NotificationCenter {
    ttl: Duration,
    next_id: AtomicU64,
    active: Mutex<Vec<Notification>>,
    events: broadcast::Sender<ClientEvent>,
}

impl NotificationCenter {
    pub fn new(ttl: Duration, events: broadcast::Sender<ClientEvent>) -> Self {
        let ttl = ttl.min(MAX_TTL);
        Self {
            ttl,
            next_id: AtomicU64::new(1),
            active: Mutex::new(Vec::new()),
            events,
        }
    }

    pub async fn push(&self, level: NotificationLevel, message: impl Into<String>) -> Notification {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let notification = Notification {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            level,
            message: message.into(),
            created_at,
            expires_at,
            deadline: Instant::now() + self.ttl,
        };
        {
            let mut active = self.active.lock().await;
            let now = Instant::now();
            active.retain(|existing| !existing.is_expired_at(now));
            active.push(notification.clone());
        }
        let _ = self
            .events
            .send(ClientEvent::Notification(notification.clone()));
        notification
    }

    pub async fn info(&self, message: impl Into<String>) -> Notification {
        self.push(NotificationLevel::Info, message).await
    }

    pub async fn success(&self, message: impl Into<String>) -> Notification {
        self.push(NotificationLevel::Success, message).await
    }

    pub async fn warning(&self, message: impl Into<String>) -> Notification {
        self.push(NotificationLevel::Warning, message).await
    }

    pub async fn error(&self, message: impl Into<String>) -> Notification {
        self.push(NotificationLevel::Error, message).await
    }

    pub async fn dismiss(&self, id: u64) -> bool {
        let mut active = self.active.lock().await;
        let before = active.len();
        active.retain(|notification| notification.id != id);
        active.len() != before
    }

    /// Notifications that have not yet expired, oldest first.
    pub async fn active(&self) -> Vec<Notification> {
        let mut active = self.active.lock().await;
        let now = Instant::now();
        active.retain(|notification| !notification.is_expired_at(now));
        active.clone()
    }
}

pub fn describe_connect_failure(err: &WalletError) -> String {
    match err.kind() {
        ErrorKind::ProviderUnavailable => {
            "A browser wallet (e.g. MetaMask) is required to use this app".to_string()
        }
        ErrorKind::UserRejected => "Wallet connection was cancelled by user.".to_string(),
        _ => format!("Failed to connect wallet: {err}"),
    }
}

pub fn describe_refresh_failure(_err: &WalletError) -> String {
    "Failed to refresh data. Please try again.".to_string()
}

pub fn describe_contract_failure(err: &ContractCallError) -> String {
    let fallback = match err.operation {
        TxOperation::Fund => "Transaction failed. Please try again.",
        TxOperation::Withdraw => "Withdrawal failed. Please try again.",
    };

    match err.kind() {
        ErrorKind::UserRejected => "Transaction was cancelled by user.".to_string(),
        ErrorKind::InsufficientFunds => "Insufficient ETH balance in your wallet.".to_string(),
        ErrorKind::NotConnected => "Connect your wallet first.".to_string(),
        ErrorKind::InvalidAmount => match &err.error {
            WalletError::InvalidAmount(AmountError::TooPrecise(_)) => {
                "ETH amounts support at most 18 decimal places.".to_string()
            }
            _ => "Enter an amount of ETH greater than zero.".to_string(),
        },
        ErrorKind::TransactionInProgress => {
            "Another transaction is still processing. Please wait.".to_string()
        }
        ErrorKind::ProviderUnavailable => {
            "A browser wallet (e.g. MetaMask) is required to use this app".to_string()
        }
        ErrorKind::ContractReverted => {
            let reason = err.revert_reason().unwrap_or_default();
            let lower = reason.to_ascii_lowercase();
            if lower.contains("minimum usd") {
                "Minimum funding amount is $5 USD worth of ETH.".to_string()
            } else if lower.contains("notowner") {
                "Only the contract owner can withdraw funds.".to_string()
            } else if lower.contains("insufficient balance") {
                "No funds available to withdraw.".to_string()
            } else if reason.is_empty() {
                fallback.to_string()
            } else {
                format!("{fallback} Reason: {reason}")
            }
        }
        ErrorKind::SyncFailure | ErrorKind::Provider => fallback.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/notifications_tests.rs"]
mod tests;
