use super::*;

fn milli_ether(milli: u64) -> U256 {
    U256::from(milli) * U256::from(1_000_000_000_000_000u64)
}

fn owner() -> Address {
    Address::repeat_byte(0x0a)
}

fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

async fn devnet_with_alice() -> Devnet {
    let devnet = Devnet::new(DevnetConfig::default(), owner());
    devnet.add_account(alice(), milli_ether(1_000)).await;
    devnet.add_account(owner(), milli_ether(1_000)).await;
    devnet
}

#[tokio::test]
async fn request_accounts_authorizes_and_honours_rejection() {
    let devnet = devnet_with_alice().await;
    let wallet = devnet.wallet();

    assert!(wallet.accounts().await.expect("accounts").is_empty());
    assert!(wallet.signer().await.is_err());

    devnet.reject_next_prompt().await;
    assert_eq!(
        wallet.request_accounts().await,
        Err(ProviderError::user_rejected())
    );

    let accounts = wallet.request_accounts().await.expect("approved");
    assert_eq!(accounts, vec![alice(), owner()]);
    assert_eq!(wallet.signer().await.expect("signer").address(), alice());
    assert_eq!(wallet.accounts().await.expect("accounts").len(), 2);
}

#[tokio::test]
async fn fund_records_contribution_and_moves_value() {
    let devnet = devnet_with_alice().await;
    devnet.authorize().await;
    let contract = devnet.contract().await;
    let signer = SignerHandle::new(alice());

    let pending = contract.fund(&signer, milli_ether(50)).await.expect("submitted");
    let receipt = pending.wait(1).await.expect("mined");

    assert_eq!(receipt.tx_hash, pending.tx_hash());
    assert_eq!(receipt.from, alice());
    assert_eq!(devnet.contribution_of(alice()).await, milli_ether(50));
    assert_eq!(devnet.balance_of(contract.address()).await, milli_ether(50));
    assert_eq!(devnet.funders().await, vec![alice()]);
    assert_eq!(devnet.block_number().await, 1);
}

#[tokio::test]
async fn fund_below_minimum_reverts_after_mining() {
    let devnet = devnet_with_alice().await;
    devnet.authorize().await;
    let contract = devnet.contract().await;

    // 0.001 ether at 2000 USD is 2 USD, under the 5 USD floor.
    let pending = contract
        .fund(&SignerHandle::new(alice()), milli_ether(1))
        .await
        .expect("submitted");
    assert_eq!(
        pending.wait(1).await,
        Err(ProviderError::reverted(MINIMUM_USD_REVERT))
    );
    assert_eq!(devnet.contribution_of(alice()).await, U256::ZERO);
    assert!(devnet.balance_of(alice()).await < milli_ether(1_000));
}

#[tokio::test]
async fn fund_beyond_balance_fails_before_submission() {
    let devnet = devnet_with_alice().await;
    devnet.authorize().await;
    let contract = devnet.contract().await;

    let err = contract
        .fund(&SignerHandle::new(alice()), milli_ether(5_000))
        .await
        .err()
        .expect("insufficient funds");
    assert!(err.to_string().contains("insufficient funds"));
    assert_eq!(devnet.block_number().await, 0);
}

#[tokio::test]
async fn only_owner_can_withdraw() {
    let devnet = devnet_with_alice().await;
    devnet.authorize().await;
    devnet.seed_contribution(alice(), milli_ether(20)).await;
    let contract = devnet.contract().await;

    let denied = contract
        .withdraw(&SignerHandle::new(alice()))
        .await
        .expect("submitted");
    assert_eq!(
        denied.wait(1).await,
        Err(ProviderError::reverted(NOT_OWNER_REVERT))
    );
    assert_eq!(devnet.balance_of(contract.address()).await, milli_ether(20));

    let owner_before = devnet.balance_of(owner()).await;
    let accepted = contract
        .withdraw(&SignerHandle::new(owner()))
        .await
        .expect("submitted");
    let receipt = accepted.wait(1).await.expect("withdrawn");
    assert_eq!(receipt.value, milli_ether(20));
    assert_eq!(devnet.balance_of(contract.address()).await, U256::ZERO);
    assert_eq!(devnet.contribution_of(alice()).await, U256::ZERO);
    assert!(devnet.funders().await.is_empty());
    assert!(devnet.balance_of(owner()).await > owner_before);
}

#[tokio::test]
async fn withdrawing_an_empty_contract_reverts() {
    let devnet = devnet_with_alice().await;
    devnet.authorize().await;
    let contract = devnet.contract().await;

    let pending = contract
        .withdraw(&SignerHandle::new(owner()))
        .await
        .expect("submitted");
    assert_eq!(
        pending.wait(1).await,
        Err(ProviderError::reverted(EMPTY_BALANCE_REVERT))
    );
}

#[tokio::test]
async fn read_failures_are_injected_per_read() {
    let devnet = devnet_with_alice().await;
    let contract = devnet.contract().await;
    let wallet = devnet.wallet();

    devnet.set_read_failure(DevnetRead::Owner, true).await;
    assert!(contract.owner().await.is_err());
    assert!(contract.address_to_amount(alice()).await.is_ok());
    assert!(wallet.balance(contract.address()).await.is_ok());

    devnet.set_read_failure(DevnetRead::Owner, false).await;
    assert_eq!(contract.owner().await, Ok(owner()));
}

#[tokio::test]
async fn wallet_events_reach_subscribers() {
    let devnet = devnet_with_alice().await;
    devnet.authorize().await;
    let mut events = devnet.wallet().subscribe_events();
    assert_eq!(devnet.subscriber_count(), 1);

    devnet.switch_account(owner()).await;
    assert_eq!(
        events.recv().await.expect("event"),
        ProviderEvent::AccountsChanged(vec![owner(), alice()])
    );

    devnet.switch_chain(ChainId(1)).await;
    assert_eq!(
        events.recv().await.expect("event"),
        ProviderEvent::ChainChanged("0x1".to_string())
    );

    devnet.lock_wallet().await;
    assert_eq!(
        events.recv().await.expect("event"),
        ProviderEvent::AccountsChanged(Vec::new())
    );

    drop(events);
    assert_eq!(devnet.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn contribution_reads_honour_configured_delay() {
    let devnet = devnet_with_alice().await;
    let contract = devnet.contract().await;
    devnet
        .set_read_delay(alice(), Duration::from_millis(200))
        .await;

    let started = tokio::time::Instant::now();
    contract.address_to_amount(alice()).await.expect("read");
    assert!(started.elapsed() >= Duration::from_millis(200));
}
