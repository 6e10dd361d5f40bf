use shared::{domain::TxHash, error::WalletError};
use tokio::sync::{broadcast, watch};
use tracing::debug;
use wallet_integration::TransactionReceipt;

use crate::{
    types::{TransactionIntent, TransactionSnapshot, TxState},
    ClientEvent,
};

/// Lifecycle of the single outbound transaction, independent of read state.
pub struct TransactionTracker {
    current: watch::Sender<Option<TransactionSnapshot>>,
    events: broadcast::Sender<ClientEvent>,
}

impl TransactionTracker {
    pub fn new(events: broadcast::Sender<ClientEvent>) -> Self {
        let (current, _) = watch::channel(None);
        Self { current, events }
    }

    pub fn snapshot(&self) -> Option<TransactionSnapshot> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TransactionSnapshot>> {
        self.current.subscribe()
    }

    pub fn is_processing(&self) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|snapshot| snapshot.state.is_in_flight())
    }

    /// Starts tracking `intent`; fails while another transaction is in flight.
    pub fn begin(&self, intent: TransactionIntent) -> Result<(), WalletError> {
        let started = self.current.send_if_modified(|current| {
            if current
                .as_ref()
                .is_some_and(|snapshot| snapshot.state.is_in_flight())
            {
                return false;
            }
            *current = Some(TransactionSnapshot {
                intent,
                state: TxState::AwaitingSignature,
            });
            true
        });
        if !started {
            return Err(WalletError::TransactionInProgress);
        }
        self.emit();
        Ok(())
    }

    pub fn submitted(&self, tx_hash: TxHash) {
        self.transition(TxState::Pending { tx_hash });
    }

    pub fn confirmed(&self, receipt: &TransactionReceipt) {
        self.transition(TxState::Confirmed {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
        });
    }

    pub fn failed(&self, error: &WalletError) {
        self.transition(TxState::Failed {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn transition(&self, state: TxState) {
        let changed = self.current.send_if_modified(|current| match current {
            Some(snapshot) => {
                debug!(operation = %snapshot.intent.operation(), ?state, "tx: state change");
                snapshot.state = state;
                true
            }
            None => false,
        });
        if changed {
            self.emit();
        }
    }

    fn emit(&self) {
        if let Some(snapshot) = self.snapshot() {
            let _ = self.events.send(ClientEvent::TransactionChanged(snapshot));
        }
    }
}

#[cfg(test)]
#[path = "tests/transactions_tests.rs"]
mod tests;
