//! In-memory development chain: a browser-style wallet and a deployed FundMe
//! contract sharing one ledger.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use alloy_primitives::keccak256;
use async_trait::async_trait;
use shared::{
    domain::{Address, ChainId, TxHash, U256},
    error::ProviderError,
};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;
use wallet_integration::{
    FundingContract, PendingTransaction, ProviderEvent, SignerHandle, TransactionReceipt,
    WalletProvider,
};

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;
/// Contract-side floor, in USD with 18 decimals.
pub const MINIMUM_USD: U256 = U256::from_limbs([5_000_000_000_000_000_000, 0, 0, 0]);
pub const MINIMUM_USD_REVERT: &str = "Minimum USD not met: you need to spend more ETH";
pub const NOT_OWNER_REVERT: &str = "FundMe__NotOwner";
pub const EMPTY_BALANCE_REVERT: &str = "Insufficient Balance";
const UNAUTHORIZED_CODE: i64 = 4100;
const INSUFFICIENT_FUNDS_CODE: i64 = -32000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DevnetRead {
    Contribution,
    Owner,
    Balance,
}

#[derive(Debug, Clone)]
pub struct DevnetConfig {
    pub chain_id: ChainId,
    pub contract_address: Address,
    /// USD price of one ether, 18 decimals.
    pub eth_usd_price: U256,
    /// Flat fee charged to the sender of every mined transaction.
    pub gas_fee: U256,
    pub block_time: Duration,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            chain_id: ChainId::SEPOLIA,
            contract_address: Address::repeat_byte(0xf0),
            eth_usd_price: U256::from(2_000u64) * U256::from(WEI_PER_ETHER),
            gas_fee: U256::from(21_000u64 * 1_000_000_000),
            block_time: Duration::ZERO,
        }
    }
}

struct FundMeState {
    owner: Address,
    funders: Vec<Address>,
    address_to_amount: HashMap<Address, U256>,
}

struct ChainState {
    config: DevnetConfig,
    block_number: u64,
    nonce: u64,
    balances: HashMap<Address, U256>,
    wallet_accounts: Vec<Address>,
    authorized: bool,
    reject_next_prompt: bool,
    failing_reads: HashSet<DevnetRead>,
    read_delays: HashMap<Address, Duration>,
    fund_me: FundMeState,
}

impl ChainState {
    fn balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    fn check_read(&self, read: DevnetRead) -> Result<(), ProviderError> {
        if self.failing_reads.contains(&read) {
            return Err(ProviderError::Transport(format!(
                "devnet read {read:?} unavailable"
            )));
        }
        Ok(())
    }

    fn take_prompt_rejection(&mut self) -> Result<(), ProviderError> {
        if std::mem::take(&mut self.reject_next_prompt) {
            return Err(ProviderError::user_rejected());
        }
        Ok(())
    }

    fn check_signer(&self, signer: &SignerHandle) -> Result<(), ProviderError> {
        if !self.authorized || !self.wallet_accounts.contains(&signer.address()) {
            return Err(ProviderError::Rpc {
                code: UNAUTHORIZED_CODE,
                message: format!("account {} has not been authorized", signer.address()),
            });
        }
        Ok(())
    }

    /// Charges the flat fee plus `value`, failing the way a node does before
    /// the transaction is broadcast.
    fn charge(&mut self, from: Address, value: U256) -> Result<(), ProviderError> {
        let cost = value.saturating_add(self.config.gas_fee);
        let balance = self.balance(&from);
        if balance < cost {
            return Err(ProviderError::Rpc {
                code: INSUFFICIENT_FUNDS_CODE,
                message: format!(
                    "insufficient funds for gas * price + value: have {balance} want {cost}"
                ),
            });
        }
        self.balances.insert(from, balance - self.config.gas_fee);
        Ok(())
    }

    fn next_tx(&mut self, from: Address, value: U256) -> (TxHash, TransactionReceipt) {
        self.nonce += 1;
        self.block_number += 1;
        let hash = keccak256(self.nonce.to_be_bytes());
        let receipt = TransactionReceipt {
            tx_hash: hash,
            block_number: self.block_number,
            from,
            value,
        };
        (hash, receipt)
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) {
        let from_balance = self.balance(&from);
        self.balances.insert(from, from_balance.saturating_sub(value));
        let to_balance = self.balance(&to);
        self.balances.insert(to, to_balance.saturating_add(value));
    }
}

/// Shared ledger. Cloning yields another handle onto the same chain.
#[derive(Clone)]
pub struct Devnet {
    state: Arc<Mutex<ChainState>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl Devnet {
    pub fn new(config: DevnetConfig, owner: Address) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(ChainState {
                config,
                block_number: 0,
                nonce: 0,
                balances: HashMap::new(),
                wallet_accounts: Vec::new(),
                authorized: false,
                reject_next_prompt: false,
                failing_reads: HashSet::new(),
                read_delays: HashMap::new(),
                fund_me: FundMeState {
                    owner,
                    funders: Vec::new(),
                    address_to_amount: HashMap::new(),
                },
            })),
            events,
        }
    }

    pub fn wallet(&self) -> DevnetWallet {
        DevnetWallet {
            devnet: self.clone(),
        }
    }

    pub async fn contract(&self) -> DevnetFundMe {
        let address = self.state.lock().await.config.contract_address;
        DevnetFundMe {
            devnet: self.clone(),
            address,
        }
    }

    /// Adds an account to the wallet (first added is selected) with a starting balance.
    pub async fn add_account(&self, address: Address, balance: U256) {
        let mut state = self.state.lock().await;
        if !state.wallet_accounts.contains(&address) {
            state.wallet_accounts.push(address);
        }
        state.balances.insert(address, balance);
    }

    pub async fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().await.balances.insert(address, balance);
    }

    pub async fn balance_of(&self, address: Address) -> U256 {
        self.state.lock().await.balance(&address)
    }

    pub async fn contribution_of(&self, address: Address) -> U256 {
        self.state
            .lock()
            .await
            .fund_me
            .address_to_amount
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    /// Credits a historical contribution without going through the wallet.
    pub async fn seed_contribution(&self, funder: Address, value: U256) {
        let mut state = self.state.lock().await;
        let contract = state.config.contract_address;
        let held = state.balance(&contract);
        state.balances.insert(contract, held.saturating_add(value));
        let entry = state.fund_me.address_to_amount.entry(funder).or_default();
        *entry += value;
        if !state.fund_me.funders.contains(&funder) {
            state.fund_me.funders.push(funder);
        }
    }

    pub async fn funders(&self) -> Vec<Address> {
        self.state.lock().await.fund_me.funders.clone()
    }

    pub async fn block_number(&self) -> u64 {
        self.state.lock().await.block_number
    }

    /// Marks the application as already authorized, as if approved in an
    /// earlier visit.
    pub async fn authorize(&self) {
        self.state.lock().await.authorized = true;
    }

    pub async fn reject_next_prompt(&self) {
        self.state.lock().await.reject_next_prompt = true;
    }

    pub async fn set_read_failure(&self, read: DevnetRead, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing_reads.insert(read);
        } else {
            state.failing_reads.remove(&read);
        }
    }

    /// Delays contribution reads for `account`.
    pub async fn set_read_delay(&self, account: Address, delay: Duration) {
        self.state.lock().await.read_delays.insert(account, delay);
    }

    /// Selects `address` in the wallet and notifies subscribers.
    pub async fn switch_account(&self, address: Address) {
        let accounts = {
            let mut state = self.state.lock().await;
            state.wallet_accounts.retain(|existing| *existing != address);
            state.wallet_accounts.insert(0, address);
            if !state.authorized {
                return;
            }
            state.wallet_accounts.clone()
        };
        debug!(account = %address, "devnet: account switched");
        let _ = self.events.send(ProviderEvent::AccountsChanged(accounts));
    }

    /// Revokes authorization; the wallet reports no accounts.
    pub async fn lock_wallet(&self) {
        self.state.lock().await.authorized = false;
        debug!("devnet: wallet locked");
        let _ = self.events.send(ProviderEvent::AccountsChanged(Vec::new()));
    }

    pub async fn switch_chain(&self, chain_id: ChainId) {
        self.state.lock().await.config.chain_id = chain_id;
        debug!(chain_id = chain_id.0, "devnet: chain switched");
        let _ = self.events.send(ProviderEvent::ChainChanged(chain_id.to_hex()));
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    async fn block_time(&self) -> Duration {
        self.state.lock().await.config.block_time
    }
}

pub struct DevnetWallet {
    devnet: Devnet,
}

#[async_trait]
impl WalletProvider for DevnetWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let mut state = self.devnet.state.lock().await;
        state.take_prompt_rejection()?;
        state.authorized = true;
        Ok(state.wallet_accounts.clone())
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let state = self.devnet.state.lock().await;
        if !state.authorized {
            return Ok(Vec::new());
        }
        Ok(state.wallet_accounts.clone())
    }

    async fn signer(&self) -> Result<SignerHandle, ProviderError> {
        let state = self.devnet.state.lock().await;
        match state.wallet_accounts.first() {
            Some(address) if state.authorized => Ok(SignerHandle::new(*address)),
            _ => Err(ProviderError::Rpc {
                code: UNAUTHORIZED_CODE,
                message: "no authorized account".to_string(),
            }),
        }
    }

    async fn chain_id(&self) -> Result<ChainId, ProviderError> {
        Ok(self.devnet.state.lock().await.config.chain_id)
    }

    async fn balance(&self, address: Address) -> Result<U256, ProviderError> {
        let state = self.devnet.state.lock().await;
        state.check_read(DevnetRead::Balance)?;
        Ok(state.balance(&address))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.devnet.events.subscribe()
    }
}

pub struct DevnetFundMe {
    devnet: Devnet,
    address: Address,
}

impl DevnetFundMe {
    async fn submit(
        &self,
        hash: TxHash,
        outcome: Result<TransactionReceipt, ProviderError>,
    ) -> Box<dyn PendingTransaction> {
        Box::new(DevnetTransaction {
            hash,
            outcome,
            block_time: self.devnet.block_time().await,
        })
    }
}

#[async_trait]
impl FundingContract for DevnetFundMe {
    fn address(&self) -> Address {
        self.address
    }

    async fn address_to_amount(&self, funder: Address) -> Result<U256, ProviderError> {
        let delay = {
            let state = self.devnet.state.lock().await;
            state.check_read(DevnetRead::Contribution)?;
            state.read_delays.get(&funder).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.devnet.state.lock().await;
        Ok(state
            .fund_me
            .address_to_amount
            .get(&funder)
            .copied()
            .unwrap_or_default())
    }

    async fn owner(&self) -> Result<Address, ProviderError> {
        let state = self.devnet.state.lock().await;
        state.check_read(DevnetRead::Owner)?;
        Ok(state.fund_me.owner)
    }

    async fn fund(
        &self,
        signer: &SignerHandle,
        value: U256,
    ) -> Result<Box<dyn PendingTransaction>, ProviderError> {
        let (hash, outcome) = {
            let mut state = self.devnet.state.lock().await;
            state.take_prompt_rejection()?;
            state.check_signer(signer)?;
            let from = signer.address();
            state.charge(from, value)?;
            let (hash, receipt) = state.next_tx(from, value);

            let usd = value.saturating_mul(state.config.eth_usd_price) / U256::from(WEI_PER_ETHER);
            let outcome = if usd < MINIMUM_USD {
                Err(ProviderError::reverted(MINIMUM_USD_REVERT))
            } else {
                state.transfer(from, self.address, value);
                let entry = state.fund_me.address_to_amount.entry(from).or_default();
                *entry += value;
                if !state.fund_me.funders.contains(&from) {
                    state.fund_me.funders.push(from);
                }
                Ok(receipt)
            };
            debug!(%hash, from = %from, %value, reverted = outcome.is_err(), "devnet: fund mined");
            (hash, outcome)
        };
        Ok(self.submit(hash, outcome).await)
    }

    async fn withdraw(
        &self,
        signer: &SignerHandle,
    ) -> Result<Box<dyn PendingTransaction>, ProviderError> {
        let (hash, outcome) = {
            let mut state = self.devnet.state.lock().await;
            state.take_prompt_rejection()?;
            state.check_signer(signer)?;
            let from = signer.address();
            state.charge(from, U256::ZERO)?;
            let held = state.balance(&self.address);
            let (hash, receipt) = state.next_tx(from, U256::ZERO);

            let outcome = if from != state.fund_me.owner {
                Err(ProviderError::reverted(NOT_OWNER_REVERT))
            } else if held.is_zero() {
                Err(ProviderError::reverted(EMPTY_BALANCE_REVERT))
            } else {
                let funders = std::mem::take(&mut state.fund_me.funders);
                for funder in funders {
                    state.fund_me.address_to_amount.insert(funder, U256::ZERO);
                }
                state.transfer(self.address, from, held);
                Ok(TransactionReceipt {
                    value: held,
                    ..receipt
                })
            };
            debug!(%hash, from = %from, reverted = outcome.is_err(), "devnet: withdraw mined");
            (hash, outcome)
        };
        Ok(self.submit(hash, outcome).await)
    }
}

struct DevnetTransaction {
    hash: TxHash,
    outcome: Result<TransactionReceipt, ProviderError>,
    block_time: Duration,
}

#[async_trait]
impl PendingTransaction for DevnetTransaction {
    fn tx_hash(&self) -> TxHash {
        self.hash
    }

    async fn wait(&self, confirmations: u64) -> Result<TransactionReceipt, ProviderError> {
        let blocks = u32::try_from(confirmations.max(1)).unwrap_or(u32::MAX);
        tokio::time::sleep(self.block_time.saturating_mul(blocks)).await;
        self.outcome.clone()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
