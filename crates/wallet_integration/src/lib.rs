use async_trait::async_trait;
use shared::{
    domain::{Address, ChainId, TxHash, U256},
    error::ProviderError,
};
use tokio::sync::broadcast;

/// Notifications pushed by the wallet outside of any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    /// Hex-encoded chain id, exactly as the wallet reports it.
    ChainChanged(String),
}

/// Authorizes transactions on behalf of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignerHandle {
    address: Address,
}

impl SignerHandle {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub from: Address,
    pub value: U256,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }
    /// Prompts the user to authorize the application.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;
    /// Accounts already authorized; never prompts.
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError>;
    async fn signer(&self) -> Result<SignerHandle, ProviderError>;
    async fn chain_id(&self) -> Result<ChainId, ProviderError>;
    async fn balance(&self, address: Address) -> Result<U256, ProviderError>;
    fn subscribe_events(&self) -> broadcast::Receiver<ProviderEvent>;
}

#[async_trait]
pub trait PendingTransaction: Send + Sync {
    fn tx_hash(&self) -> TxHash;
    /// Resolves once the transaction has `confirmations` blocks on top of it,
    /// or fails if it reverted.
    async fn wait(&self, confirmations: u64) -> Result<TransactionReceipt, ProviderError>;
}

#[async_trait]
pub trait FundingContract: Send + Sync {
    fn address(&self) -> Address;
    async fn address_to_amount(&self, funder: Address) -> Result<U256, ProviderError>;
    async fn owner(&self) -> Result<Address, ProviderError>;
    async fn fund(
        &self,
        signer: &SignerHandle,
        value: U256,
    ) -> Result<Box<dyn PendingTransaction>, ProviderError>;
    async fn withdraw(
        &self,
        signer: &SignerHandle,
    ) -> Result<Box<dyn PendingTransaction>, ProviderError>;
}
