use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use shared::{
    domain::{Address, ChainId},
    error::WalletError,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use wallet_integration::{ProviderEvent, SignerHandle, WalletProvider};

use crate::{types::Session, ClientEvent};

/// How a provider notification changed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    Unchanged,
    Disconnected,
    AccountSwitched(Address),
    ChainSwitched(ChainId),
}

/// Owns the wallet connection lifecycle.
pub struct SessionManager {
    provider: Arc<dyn WalletProvider>,
    session: watch::Sender<Session>,
    /// Bumped by every disconnect so a connect that was in flight at the time
    /// does not resurrect the session.
    epoch: AtomicU64,
    /// Connects that have not finished yet. `busy` is cleared only when this
    /// drops back to zero.
    in_flight: AtomicU64,
    events: broadcast::Sender<ClientEvent>,
}

/// Held for the duration of one connect attempt, including cancellation.
struct ConnectInFlight<'a>(&'a SessionManager);

impl Drop for ConnectInFlight<'_> {
    fn drop(&mut self) {
        let in_flight = &self.0.in_flight;
        self.0.update(|session| {
            let remaining = in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            session.busy = remaining > 0;
        });
    }
}

impl SessionManager {
    pub fn new(provider: Arc<dyn WalletProvider>, events: broadcast::Sender<ClientEvent>) -> Self {
        let (session, _) = watch::channel(Session::default());
        Self {
            provider,
            session,
            epoch: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            events,
        }
    }

    pub fn snapshot(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.provider
    }

    pub async fn connect(&self) -> Result<Session, WalletError> {
        if !self.provider.is_available() {
            warn!("session: connect requested but no wallet provider is installed");
            return Err(WalletError::ProviderUnavailable);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let _in_flight = self.begin_connect();

        let established = self.establish().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            info!("session: disconnected while connect was in flight; discarding result");
            return Err(WalletError::NotConnected);
        }

        match established {
            Ok((account, signer, chain_id)) => {
                info!(account = %account, chain_id = chain_id.0, "session: connected");
                Ok(self.update(|session| {
                    *session = Session {
                        account: Some(account),
                        connected: true,
                        chain_id: Some(chain_id),
                        busy: self.in_flight.load(Ordering::SeqCst) > 1,
                        signer: Some(signer),
                    };
                }))
            }
            Err(err) => {
                warn!(kind = ?err.kind(), "session: connect failed: {err}");
                Err(err)
            }
        }
    }

    fn begin_connect(&self) -> ConnectInFlight<'_> {
        self.update(|session| {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            session.busy = true;
        });
        ConnectInFlight(self)
    }

    async fn establish(&self) -> Result<(Address, SignerHandle, ChainId), WalletError> {
        let accounts = self.provider.request_accounts().await?;
        let account = accounts
            .first()
            .copied()
            .ok_or_else(|| WalletError::Provider("wallet returned no accounts".to_string()))?;
        let signer = self.provider.signer().await?;
        let chain_id = self.provider.chain_id().await?;
        if signer.address() != account {
            debug!(account = %account, signer = %signer.address(), "session: rebinding signer to first account");
        }
        Ok((account, SignerHandle::new(account), chain_id))
    }

    /// Connects silently if the wallet already authorized this application.
    pub async fn restore(&self) -> Result<Option<Session>, WalletError> {
        if !self.provider.is_available() {
            return Ok(None);
        }
        let accounts = self.provider.accounts().await?;
        if accounts.is_empty() {
            debug!("session: no previously authorized account");
            return Ok(None);
        }
        self.connect().await.map(Some)
    }

    pub fn disconnect(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let previous = self.snapshot();
        self.update(|session| {
            *session = Session {
                busy: self.in_flight.load(Ordering::SeqCst) > 0,
                ..Session::default()
            };
        });
        if let Some(account) = previous.account {
            info!(account = %account, "session: disconnected");
        }
    }

    pub fn apply_provider_event(&self, event: &ProviderEvent) -> SessionChange {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    if self.snapshot() == Session::default() {
                        return SessionChange::Unchanged;
                    }
                    self.disconnect();
                    SessionChange::Disconnected
                }
                Some(&account) => {
                    let current = self.snapshot();
                    if !current.connected {
                        debug!(account = %account, "session: ignoring account change while disconnected");
                        return SessionChange::Unchanged;
                    }
                    if current.account == Some(account) {
                        return SessionChange::Unchanged;
                    }
                    info!(account = %account, "session: active account changed");
                    self.update(|session| {
                        session.account = Some(account);
                        session.signer = Some(SignerHandle::new(account));
                    });
                    SessionChange::AccountSwitched(account)
                }
            },
            ProviderEvent::ChainChanged(raw) => {
                let Some(chain_id) = ChainId::from_hex(raw) else {
                    warn!(raw = %raw, "session: ignoring malformed chain id");
                    return SessionChange::Unchanged;
                };
                info!(chain_id = chain_id.0, "session: network changed");
                self.update(|session| session.chain_id = Some(chain_id));
                SessionChange::ChainSwitched(chain_id)
            }
        }
    }

    fn update(&self, mutate: impl FnOnce(&mut Session)) -> Session {
        let changed = self.session.send_if_modified(|session| {
            let before = session.clone();
            mutate(session);
            debug_assert!(session.is_consistent(), "connected session without account");
            *session != before
        });
        let snapshot = self.snapshot();
        if changed {
            let _ = self.events.send(ClientEvent::SessionChanged(snapshot.clone()));
        }
        snapshot
    }
}

#[cfg(test)]
#[path = "tests/session_manager_tests.rs"]
mod tests;
