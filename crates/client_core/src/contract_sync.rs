use std::sync::Arc;

use shared::{
    amount::EtherAmount,
    domain::{Address, TxOperation, U256},
    error::{ContractCallError, ProviderError, WalletError},
};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};
use wallet_integration::{FundingContract, SignerHandle, TransactionReceipt, WalletProvider};

use crate::{
    transactions::TransactionTracker,
    types::{
        ConfirmedTransaction, ContractView, RefreshOutcome, Session, SyncPhase, TransactionIntent,
        TransactionSnapshot,
    },
    ClientEvent,
};

#[derive(Debug, Default)]
struct SyncState {
    /// Account the current view belongs to.
    bound: Option<Address>,
    generation: u64,
    phase: SyncPhase,
    /// Whether `view` holds readings for `bound`, as opposed to the zero state.
    committed: bool,
}

/// Mirrors the funding contract's state for the active account and drives
/// fund/withdraw transactions.
pub struct ContractSync {
    contract: Arc<dyn FundingContract>,
    provider: Arc<dyn WalletProvider>,
    session: watch::Receiver<Session>,
    state: Mutex<SyncState>,
    view: watch::Sender<ContractView>,
    transactions: TransactionTracker,
    confirmations: u64,
    events: broadcast::Sender<ClientEvent>,
}

impl ContractSync {
    pub fn new(
        contract: Arc<dyn FundingContract>,
        provider: Arc<dyn WalletProvider>,
        session: watch::Receiver<Session>,
        confirmations: u64,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (view, _) = watch::channel(ContractView::zero());
        Self {
            contract,
            provider,
            session,
            state: Mutex::new(SyncState::default()),
            view,
            transactions: TransactionTracker::new(events.clone()),
            confirmations: confirmations.max(1),
            events,
        }
    }

    pub fn contract_address(&self) -> Address {
        self.contract.address()
    }

    pub fn view(&self) -> ContractView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ContractView> {
        self.view.subscribe()
    }

    pub async fn phase(&self) -> SyncPhase {
        self.state.lock().await.phase
    }

    pub fn transaction(&self) -> Option<TransactionSnapshot> {
        self.transactions.snapshot()
    }

    pub fn transactions(&self) -> &TransactionTracker {
        &self.transactions
    }

    /// Aligns the view with the current session. Returns the account that
    /// still needs a refresh, if any.
    ///
    /// Any refresh still in flight is invalidated. When the session is not
    /// connected the view drops straight to the zero state without contacting
    /// the contract.
    pub async fn rebind(&self) -> Option<Address> {
        let account = self.session.borrow().active_account();
        let mut state = self.state.lock().await;
        state.generation += 1;

        match account {
            None => {
                if state.bound.take().is_some() {
                    debug!(generation = state.generation, "sync: unbound");
                }
                state.phase = SyncPhase::Uninitialized;
                state.committed = false;
                self.publish(|view| *view = ContractView::zero());
                None
            }
            Some(account) => {
                if state.bound != Some(account) {
                    debug!(account = %account, generation = state.generation, "sync: rebound");
                    state.bound = Some(account);
                    state.phase = SyncPhase::Uninitialized;
                    state.committed = false;
                    self.publish(|view| *view = ContractView::zero());
                }
                Some(account)
            }
        }
    }

    /// Re-reads contribution, balance and owner for the active account.
    ///
    /// The three reads run concurrently and are committed together. A read
    /// failure keeps the previous view. A result overtaken by a newer refresh
    /// or rebind is dropped and reported as [`RefreshOutcome::Superseded`].
    pub async fn refresh(&self) -> Result<RefreshOutcome, WalletError> {
        let account = self
            .session
            .borrow()
            .active_account()
            .ok_or(WalletError::NotConnected)?;

        let generation = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            if state.bound != Some(account) {
                state.bound = Some(account);
                state.committed = false;
                self.publish(|view| *view = ContractView::zero());
            }
            state.phase = SyncPhase::Syncing;
            self.publish(|view| view.syncing = true);
            state.generation
        };
        debug!(account = %account, generation, "sync: refreshing");

        let readings = self.read(account).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(
                account = %account,
                generation,
                latest = state.generation,
                "sync: discarding superseded readings"
            );
            return Ok(RefreshOutcome::Superseded);
        }

        match readings {
            Ok((contribution, balance, owner)) => {
                let fresh = ContractView::from_readings(account, contribution, balance, owner);
                state.phase = SyncPhase::Ready;
                state.committed = true;
                self.publish(|view| *view = fresh.clone());
                info!(
                    account = %account,
                    generation,
                    contribution = %fresh.caller_contribution,
                    balance = %fresh.aggregate_balance,
                    is_owner = fresh.is_owner,
                    "sync: view updated"
                );
                Ok(RefreshOutcome::Applied(fresh))
            }
            Err(err) => {
                state.phase = if state.committed {
                    SyncPhase::Ready
                } else {
                    SyncPhase::Uninitialized
                };
                self.publish(|view| view.syncing = false);
                warn!(account = %account, generation, "sync: refresh failed: {err}");
                Err(WalletError::SyncFailure(err.to_string()))
            }
        }
    }

    async fn read(&self, account: Address) -> Result<(U256, U256, Address), ProviderError> {
        let contract_address = self.contract.address();
        futures::try_join!(
            self.contract.address_to_amount(account),
            self.provider.balance(contract_address),
            self.contract.owner(),
        )
    }

    /// Sends `amount` ether to the contract and refreshes once it confirms.
    pub async fn fund(&self, amount: &str) -> Result<ConfirmedTransaction, ContractCallError> {
        let amount = EtherAmount::parse_positive_ether(amount)
            .map_err(|err| ContractCallError::new(TxOperation::Fund, err))?;
        self.execute(TransactionIntent::Fund { amount }).await
    }

    /// Withdraws the whole contract balance to the owner. The contract decides
    /// who the owner is; a cached non-owner view only produces a warning.
    pub async fn withdraw(&self) -> Result<ConfirmedTransaction, ContractCallError> {
        let view = self.view();
        if view.owner_address.is_some() && !view.is_owner {
            warn!("sync: withdraw requested by an account the last readings show is not the owner");
        }
        self.execute(TransactionIntent::Withdraw).await
    }

    async fn execute(
        &self,
        intent: TransactionIntent,
    ) -> Result<ConfirmedTransaction, ContractCallError> {
        let operation = intent.operation();
        let signer = self
            .session
            .borrow()
            .signer()
            .ok_or_else(|| ContractCallError::new(operation, WalletError::NotConnected))?;
        self.transactions
            .begin(intent.clone())
            .map_err(|err| ContractCallError::new(operation, err))?;

        let receipt = match self.submit(&intent, &signer).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(%operation, kind = ?err.kind(), "tx: failed: {err}");
                self.transactions.failed(&err);
                return Err(ContractCallError::new(operation, err));
            }
        };
        info!(
            %operation,
            tx_hash = %receipt.tx_hash,
            block = receipt.block_number,
            "tx: confirmed"
        );
        self.transactions.confirmed(&receipt);

        let (view, refresh_error) = match self.refresh().await {
            Ok(RefreshOutcome::Applied(view)) => (Some(view), None),
            Ok(RefreshOutcome::Superseded) => (None, None),
            Err(err) => {
                warn!(%operation, "sync: refresh after confirmed transaction failed: {err}");
                (None, Some(err))
            }
        };
        Ok(ConfirmedTransaction {
            intent,
            receipt,
            view,
            refresh_error,
        })
    }

    async fn submit(
        &self,
        intent: &TransactionIntent,
        signer: &SignerHandle,
    ) -> Result<TransactionReceipt, WalletError> {
        let pending = match intent {
            TransactionIntent::Fund { amount } => self.contract.fund(signer, amount.wei()).await?,
            TransactionIntent::Withdraw => self.contract.withdraw(signer).await?,
        };
        let tx_hash = pending.tx_hash();
        info!(operation = %intent.operation(), %tx_hash, from = %signer.address(), "tx: submitted");
        self.transactions.submitted(tx_hash);
        Ok(pending.wait(self.confirmations).await?)
    }

    fn publish(&self, mutate: impl FnOnce(&mut ContractView)) {
        let changed = self.view.send_if_modified(|view| {
            let before = view.clone();
            mutate(view);
            *view != before
        });
        if changed {
            let _ = self.events.send(ClientEvent::ViewChanged(self.view()));
        }
    }
}

#[cfg(test)]
#[path = "tests/contract_sync_tests.rs"]
mod tests;
