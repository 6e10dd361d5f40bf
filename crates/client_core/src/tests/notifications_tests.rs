use super::*;

fn center(ttl: Duration) -> (NotificationCenter, broadcast::Receiver<ClientEvent>) {
    let (events, receiver) = broadcast::channel(16);
    (NotificationCenter::new(ttl, events), receiver)
}

#[tokio::test(start_paused = true)]
async fn notifications_expire_after_ttl() {
    let (center, _events) = center(Duration::from_secs(5));
    center.info("Refreshing contract data...").await;
    tokio::time::advance(Duration::from_secs(3)).await;
    center.success("Data refreshed successfully!").await;

    let active = center.active().await;
    assert_eq!(active.len(), 2);
    assert!(active[0].id < active[1].id);

    tokio::time::advance(Duration::from_secs(2)).await;
    let active = center.active().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].message, "Data refreshed successfully!");

    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(center.active().await.is_empty());
}

#[tokio::test]
async fn notifications_carry_their_expiry_time() {
    let (center, mut events) = center(Duration::from_secs(5));
    let pushed = center.warning("Failed to refresh data. Please try again.").await;
    assert_eq!(
        pushed.expires_at - pushed.created_at,
        chrono::Duration::seconds(5)
    );

    let Ok(ClientEvent::Notification(broadcast)) = events.try_recv() else {
        panic!("notification event");
    };
    assert_eq!(broadcast.expires_at, pushed.expires_at);
}

#[tokio::test]
async fn dismiss_removes_only_the_named_notification() {
    let (center, _events) = center(Duration::from_secs(5));
    let first = center.error("first").await;
    let second = center.warning("second").await;

    assert!(center.dismiss(first.id).await);
    assert!(!center.dismiss(first.id).await);

    let active = center.active().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);
    assert_eq!(active[0].level, NotificationLevel::Warning);
}

#[tokio::test]
async fn pushes_are_broadcast() {
    let (center, mut events) = center(Duration::from_secs(5));
    let pushed = center.success("Successfully withdrew all funds!").await;

    match events.recv().await.expect("event") {
        ClientEvent::Notification(notification) => assert_eq!(notification, pushed),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn connect_failures_distinguish_missing_wallet_from_rejection() {
    assert_eq!(
        describe_connect_failure(&WalletError::ProviderUnavailable),
        "A browser wallet (e.g. MetaMask) is required to use this app"
    );
    assert_eq!(
        describe_connect_failure(&WalletError::UserRejected("User denied".into())),
        "Wallet connection was cancelled by user."
    );
    assert!(describe_connect_failure(&WalletError::Provider("rpc down".into()))
        .starts_with("Failed to connect wallet:"));
}

#[test]
fn fund_failures_use_cause_specific_wording() {
    let rejected = ContractCallError::new(
        TxOperation::Fund,
        WalletError::UserRejected("user rejected transaction".into()),
    );
    assert_eq!(
        describe_contract_failure(&rejected),
        "Transaction was cancelled by user."
    );

    let minimum = ContractCallError::new(
        TxOperation::Fund,
        WalletError::ContractReverted {
            reason: Some("Minimum USD not met: you need to spend more ETH".into()),
        },
    );
    assert_eq!(
        describe_contract_failure(&minimum),
        "Minimum funding amount is $5 USD worth of ETH."
    );

    let broke = ContractCallError::new(
        TxOperation::Fund,
        WalletError::InsufficientFunds("insufficient funds for gas * price + value".into()),
    );
    assert_eq!(
        describe_contract_failure(&broke),
        "Insufficient ETH balance in your wallet."
    );

    let precise = ContractCallError::new(
        TxOperation::Fund,
        WalletError::InvalidAmount(AmountError::TooPrecise("0.0000000000000000001".into())),
    );
    assert_eq!(
        describe_contract_failure(&precise),
        "ETH amounts support at most 18 decimal places."
    );

    let unknown = ContractCallError::new(TxOperation::Fund, WalletError::Provider("boom".into()));
    assert_eq!(
        describe_contract_failure(&unknown),
        "Transaction failed. Please try again."
    );
}

#[test]
fn withdraw_failures_use_cause_specific_wording() {
    let not_owner = ContractCallError::new(
        TxOperation::Withdraw,
        WalletError::ContractReverted {
            reason: Some("FundMe__NotOwner".into()),
        },
    );
    assert_eq!(
        describe_contract_failure(&not_owner),
        "Only the contract owner can withdraw funds."
    );

    let empty = ContractCallError::new(
        TxOperation::Withdraw,
        WalletError::ContractReverted {
            reason: Some("Insufficient Balance".into()),
        },
    );
    assert_eq!(
        describe_contract_failure(&empty),
        "No funds available to withdraw."
    );

    let silent = ContractCallError::new(
        TxOperation::Withdraw,
        WalletError::ContractReverted { reason: None },
    );
    assert_eq!(
        describe_contract_failure(&silent),
        "Withdrawal failed. Please try again."
    );
}

#[test]
fn refresh_failure_has_a_single_message() {
    assert_eq!(
        describe_refresh_failure(&WalletError::SyncFailure("owner read timed out".into())),
        "Failed to refresh data. Please try again."
    );
}
