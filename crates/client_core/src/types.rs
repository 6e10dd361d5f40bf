//! Snapshots handed to presentation code.

use serde::Serialize;
use shared::{
    amount::EtherAmount,
    domain::{Address, ChainId, TxHash, TxOperation, U256},
    error::{ErrorKind, WalletError},
};
use wallet_integration::{SignerHandle, TransactionReceipt};

/// Current wallet binding. `connected` implies `account` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub account: Option<Address>,
    pub connected: bool,
    pub chain_id: Option<ChainId>,
    pub busy: bool,
    #[serde(skip)]
    pub(crate) signer: Option<SignerHandle>,
}

impl Session {
    pub fn is_consistent(&self) -> bool {
        !self.connected || (self.account.is_some() && self.signer.is_some())
    }

    /// Signer of the active account, if connected.
    pub fn signer(&self) -> Option<SignerHandle> {
        if self.connected {
            self.signer
        } else {
            None
        }
    }

    pub(crate) fn active_account(&self) -> Option<Address> {
        if self.connected {
            self.account
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Uninitialized,
    Syncing,
    Ready,
}

/// On-chain readings scoped to the active account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContractView {
    pub caller_contribution: EtherAmount,
    pub aggregate_balance: EtherAmount,
    pub owner_address: Option<Address>,
    pub is_owner: bool,
    pub syncing: bool,
}

impl ContractView {
    pub fn zero() -> Self {
        Self::default()
    }

    pub(crate) fn from_readings(
        account: Address,
        contribution: U256,
        balance: U256,
        owner: Address,
    ) -> Self {
        Self {
            caller_contribution: EtherAmount::from_wei(contribution),
            aggregate_balance: EtherAmount::from_wei(balance),
            owner_address: Some(owner),
            // Addresses are compared as parsed bytes, so checksum casing never matters.
            is_owner: owner == account,
            syncing: false,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.caller_contribution.is_zero() && self.aggregate_balance.is_zero() && !self.is_owner
    }

    pub fn can_withdraw(&self) -> bool {
        self.is_owner && !self.aggregate_balance.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TransactionIntent {
    Fund { amount: EtherAmount },
    Withdraw,
}

impl TransactionIntent {
    pub fn operation(&self) -> TxOperation {
        match self {
            Self::Fund { .. } => TxOperation::Fund,
            Self::Withdraw => TxOperation::Withdraw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TxState {
    /// Waiting for the wallet to sign and broadcast.
    AwaitingSignature,
    /// Broadcast, not yet confirmed.
    Pending { tx_hash: TxHash },
    Confirmed { tx_hash: TxHash, block_number: u64 },
    Failed { kind: ErrorKind, message: String },
}

impl TxState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::AwaitingSignature | Self::Pending { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSnapshot {
    pub intent: TransactionIntent,
    pub state: TxState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    pub intent: TransactionIntent,
    pub receipt: TransactionReceipt,
    /// View produced by the follow-up refresh; `None` if that refresh failed
    /// or was superseded.
    pub view: Option<ContractView>,
    /// Set when the follow-up refresh failed. The transaction itself stands.
    pub refresh_error: Option<WalletError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied(ContractView),
    /// A newer refresh or rebind started before this one resolved.
    Superseded,
}
