use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    amount::EtherAmount,
    domain::{short_address, Address, ChainId, TxOperation, U256},
    error::{ContractCallError, ProviderError, WalletError},
};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, Mutex},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};
use wallet_integration::{FundingContract, ProviderEvent, SignerHandle, WalletProvider};

pub mod config;
pub mod contract_sync;
pub mod notifications;
pub mod session_manager;
pub mod transactions;
pub mod types;

pub use config::{load_settings, Settings};
pub use contract_sync::ContractSync;
pub use notifications::{Notification, NotificationCenter, NotificationLevel};
pub use session_manager::{SessionChange, SessionManager};
pub use transactions::TransactionTracker;
pub use types::{
    ConfirmedTransaction, ContractView, RefreshOutcome, Session, SyncPhase, TransactionIntent,
    TransactionSnapshot, TxState,
};

use notifications::{describe_connect_failure, describe_contract_failure, describe_refresh_failure};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    SessionChanged(Session),
    ViewChanged(ContractView),
    TransactionChanged(TransactionSnapshot),
    Notification(Notification),
}

/// Stand-in for environments without an injected wallet.
pub struct MissingWalletProvider;

#[async_trait]
impl WalletProvider for MissingWalletProvider {
    fn is_available(&self) -> bool {
        false
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    async fn signer(&self) -> Result<SignerHandle, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    async fn chain_id(&self) -> Result<ChainId, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    async fn balance(&self, _address: Address) -> Result<U256, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ProviderEvent> {
        let (_events, receiver) = broadcast::channel(1);
        receiver
    }
}

struct ClientParts {
    settings: Settings,
    session: SessionManager,
    contract: ContractSync,
    notifications: NotificationCenter,
    events: broadcast::Sender<ClientEvent>,
}

impl ClientParts {
    /// Applies a provider notification to the session and rebinds the view in
    /// the same step. Returns the account that still needs a refresh.
    async fn apply_provider_event(&self, event: &ProviderEvent) -> Option<Address> {
        match self.session.apply_provider_event(event) {
            SessionChange::Unchanged => None,
            SessionChange::Disconnected => {
                self.contract.rebind().await;
                None
            }
            SessionChange::AccountSwitched(account) => {
                self.notifications
                    .success(format!("Wallet connected: {}", short_address(&account)))
                    .await;
                self.contract.rebind().await
            }
            SessionChange::ChainSwitched(chain_id) => {
                if chain_id != self.settings.chain_id {
                    warn!(
                        chain_id = chain_id.0,
                        expected = self.settings.chain_id.0,
                        "client: wallet moved to an unexpected network"
                    );
                }
                None
            }
        }
    }

    async fn resync(&self) -> Result<RefreshOutcome, WalletError> {
        let outcome = self.contract.refresh().await;
        if let Err(err) = &outcome {
            self.notifications
                .error(describe_refresh_failure(err))
                .await;
        }
        outcome
    }

    /// Rebuilds the events a lagged receiver may have dropped from the
    /// provider's current state.
    async fn recover_from_lag(&self) -> Vec<ProviderEvent> {
        let provider = self.session.provider();
        let mut recovered = Vec::with_capacity(2);
        match provider.accounts().await {
            Ok(accounts) => recovered.push(ProviderEvent::AccountsChanged(accounts)),
            Err(err) => warn!("client: account probe after lag failed: {err}"),
        }
        match provider.chain_id().await {
            Ok(chain_id) => recovered.push(ProviderEvent::ChainChanged(chain_id.to_hex())),
            Err(err) => warn!("client: chain probe after lag failed: {err}"),
        }
        recovered
    }

    /// Drives provider notifications. Resyncs run as children of this task and
    /// are aborted with it.
    async fn pump(self: Arc<Self>, mut receiver: broadcast::Receiver<ProviderEvent>) {
        let mut resyncs = JoinSet::new();
        loop {
            let received = tokio::select! {
                received = receiver.recv() => received,
                Some(_) = resyncs.join_next(), if !resyncs.is_empty() => continue,
            };
            let events = match received {
                Ok(event) => vec![event],
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client: provider events lagged; re-probing wallet state");
                    self.recover_from_lag().await
                }
                Err(RecvError::Closed) => {
                    debug!("client: provider event stream closed");
                    break;
                }
            };

            for event in events {
                if self.apply_provider_event(&event).await.is_some() {
                    let parts = Arc::clone(&self);
                    resyncs.spawn(async move {
                        let _ = parts.resync().await;
                    });
                }
            }
        }
        while resyncs.join_next().await.is_some() {}
    }
}

/// Owns the provider event task; dropping it ends the subscription.
struct ProviderSubscription {
    task: JoinHandle<()>,
}

impl Drop for ProviderSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Coordinates the wallet session, the contract view and user notifications.
pub struct FundMeClient {
    parts: Arc<ClientParts>,
    subscription: Mutex<Option<ProviderSubscription>>,
}

impl FundMeClient {
    pub fn new(
        settings: Settings,
        provider: Arc<dyn WalletProvider>,
        contract: Arc<dyn FundingContract>,
    ) -> Self {
        if contract.address() != settings.contract_address {
            warn!(
                configured = %settings.contract_address,
                actual = %contract.address(),
                "client: contract handle does not match the configured address"
            );
        }

        let (events, _) = broadcast::channel(settings.event_capacity);
        let session = SessionManager::new(Arc::clone(&provider), events.clone());
        let contract = ContractSync::new(
            contract,
            provider,
            session.subscribe(),
            settings.confirmations,
            events.clone(),
        );
        let notifications = NotificationCenter::new(settings.notification_ttl(), events.clone());

        Self {
            parts: Arc::new(ClientParts {
                settings,
                session,
                contract,
                notifications,
                events,
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Subscribes to provider notifications and reconnects silently if the
    /// wallet already authorized this application.
    pub async fn start(&self) -> Result<Session, WalletError> {
        {
            let mut subscription = self.subscription.lock().await;
            if subscription.is_none() {
                let receiver = self.parts.session.provider().subscribe_events();
                let task = tokio::spawn(Arc::clone(&self.parts).pump(receiver));
                *subscription = Some(ProviderSubscription { task });
            }
        }

        match self.parts.session.restore().await {
            Ok(Some(session)) => {
                self.on_connected(&session).await;
                Ok(session)
            }
            Ok(None) => Ok(self.session()),
            Err(err) => {
                warn!("client: restoring previous session failed: {err}");
                Err(err)
            }
        }
    }

    /// Ends the provider subscription. Also happens on drop.
    pub async fn stop(&self) {
        if self.subscription.lock().await.take().is_some() {
            info!("client: provider subscription released");
        }
    }

    pub async fn connect(&self) -> Result<Session, WalletError> {
        match self.parts.session.connect().await {
            Ok(session) => {
                self.on_connected(&session).await;
                Ok(session)
            }
            Err(err) => {
                self.parts
                    .notifications
                    .error(describe_connect_failure(&err))
                    .await;
                Err(err)
            }
        }
    }

    async fn on_connected(&self, session: &Session) {
        if let Some(account) = session.account {
            self.parts
                .notifications
                .success(format!("Wallet connected: {}", short_address(&account)))
                .await;
        }
        if self.parts.contract.rebind().await.is_some() {
            let _ = self.parts.resync().await;
        }
    }

    pub async fn disconnect(&self) {
        self.parts.session.disconnect();
        self.parts.contract.rebind().await;
    }

    /// Applies a provider notification and waits for any resulting refresh.
    pub async fn handle_provider_event(&self, event: ProviderEvent) {
        if self.parts.apply_provider_event(&event).await.is_some() {
            let _ = self.parts.resync().await;
        }
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome, WalletError> {
        self.parts
            .notifications
            .info("Refreshing contract data...")
            .await;
        let outcome = self.parts.resync().await?;
        if matches!(outcome, RefreshOutcome::Applied(_)) {
            self.parts
                .notifications
                .success("Data refreshed successfully!")
                .await;
        }
        Ok(outcome)
    }

    pub async fn fund(&self, amount: &str) -> Result<ConfirmedTransaction, ContractCallError> {
        let parsed = match EtherAmount::parse_positive_ether(amount) {
            Ok(parsed) => parsed,
            Err(err) => return Err(self.report(ContractCallError::new(TxOperation::Fund, err)).await),
        };
        self.precheck(TxOperation::Fund).await?;

        self.parts
            .notifications
            .info("Processing your funding transaction...")
            .await;
        match self.parts.contract.fund(amount).await {
            Ok(confirmed) => Ok(self
                .announce(confirmed, format!("Successfully funded {parsed} ETH!"))
                .await),
            Err(err) => Err(self.report(err).await),
        }
    }

    pub async fn withdraw(&self) -> Result<ConfirmedTransaction, ContractCallError> {
        self.precheck(TxOperation::Withdraw).await?;

        self.parts
            .notifications
            .info("Processing withdrawal transaction...")
            .await;
        match self.parts.contract.withdraw().await {
            Ok(confirmed) => Ok(self
                .announce(confirmed, "Successfully withdrew all funds!")
                .await),
            Err(err) => Err(self.report(err).await),
        }
    }

    async fn precheck(&self, operation: TxOperation) -> Result<(), ContractCallError> {
        let blocked = if !self.parts.session.snapshot().connected {
            Some(WalletError::NotConnected)
        } else if self.parts.contract.transactions().is_processing() {
            Some(WalletError::TransactionInProgress)
        } else {
            None
        };
        match blocked {
            Some(err) => Err(self.report(ContractCallError::new(operation, err)).await),
            None => Ok(()),
        }
    }

    /// A confirmed transaction whose follow-up refresh failed still succeeded,
    /// but the shown readings are stale.
    async fn announce(
        &self,
        confirmed: ConfirmedTransaction,
        message: impl Into<String>,
    ) -> ConfirmedTransaction {
        self.parts.notifications.success(message).await;
        if let Some(err) = &confirmed.refresh_error {
            self.parts
                .notifications
                .warning(describe_refresh_failure(err))
                .await;
        }
        confirmed
    }

    async fn report(&self, err: ContractCallError) -> ContractCallError {
        self.parts
            .notifications
            .error(describe_contract_failure(&err))
            .await;
        err
    }

    pub fn settings(&self) -> &Settings {
        &self.parts.settings
    }

    pub fn session(&self) -> Session {
        self.parts.session.snapshot()
    }

    pub fn view(&self) -> ContractView {
        self.parts.contract.view()
    }

    pub async fn phase(&self) -> SyncPhase {
        self.parts.contract.phase().await
    }

    pub fn transaction(&self) -> Option<TransactionSnapshot> {
        self.parts.contract.transaction()
    }

    pub fn is_processing(&self) -> bool {
        self.parts.contract.transactions().is_processing()
    }

    pub fn contract_address(&self) -> Address {
        self.parts.contract.contract_address()
    }

    pub fn on_expected_network(&self) -> bool {
        self.session().chain_id == Some(self.parts.settings.chain_id)
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.parts.notifications.active().await
    }

    pub async fn dismiss(&self, id: u64) -> bool {
        self.parts.notifications.dismiss(id).await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.parts.events.subscribe()
    }

    pub fn subscribe_view(&self) -> tokio::sync::watch::Receiver<ContractView> {
        self.parts.contract.subscribe()
    }

    pub fn subscribe_session(&self) -> tokio::sync::watch::Receiver<Session> {
        self.parts.session.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
