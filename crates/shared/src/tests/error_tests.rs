use super::*;

#[test]
fn user_rejection_is_classified_by_code_and_message() {
    let by_code = WalletError::from(ProviderError::user_rejected());
    assert_eq!(by_code.kind(), ErrorKind::UserRejected);

    let by_message = WalletError::from(ProviderError::Rpc {
        code: -32603,
        message: "MetaMask Tx Signature: User denied transaction signature.".to_string(),
    });
    assert_eq!(by_message.kind(), ErrorKind::UserRejected);
}

#[test]
fn insufficient_funds_is_distinct_from_reverts() {
    let err = WalletError::from(ProviderError::Rpc {
        code: -32000,
        message: "insufficient funds for gas * price + value".to_string(),
    });
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(err.revert_reason(), None);
}

#[test]
fn revert_reason_survives_classification() {
    let explicit = WalletError::from(ProviderError::reverted("FundMe__NotOwner"));
    assert_eq!(explicit.kind(), ErrorKind::ContractReverted);
    assert_eq!(explicit.revert_reason(), Some("FundMe__NotOwner"));

    let from_message = WalletError::from(ProviderError::Rpc {
        code: 3,
        message: "execution reverted: Minimum USD not met".to_string(),
    });
    assert_eq!(from_message.revert_reason(), Some("Minimum USD not met"));

    let bare = WalletError::from(ProviderError::Transport("execution reverted".to_string()));
    assert_eq!(bare.kind(), ErrorKind::ContractReverted);
    assert_eq!(bare.revert_reason(), None);
}

#[test]
fn missing_provider_and_generic_errors_stay_separate() {
    assert_eq!(
        WalletError::from(ProviderError::Unavailable).kind(),
        ErrorKind::ProviderUnavailable
    );
    assert_eq!(
        WalletError::from(ProviderError::Transport("connection reset".to_string())).kind(),
        ErrorKind::Provider
    );
}

#[test]
fn contract_call_error_exposes_operation_and_reason() {
    let err = ContractCallError::new(
        TxOperation::Withdraw,
        ProviderError::reverted("FundMe__NotOwner"),
    );
    assert_eq!(err.kind(), ErrorKind::ContractReverted);
    assert_eq!(err.revert_reason(), Some("FundMe__NotOwner"));
    assert_eq!(
        err.to_string(),
        "withdraw failed: contract reverted: FundMe__NotOwner"
    );
}

#[test]
fn retryability_follows_required_user_action() {
    assert!(!ErrorKind::ProviderUnavailable.is_retryable());
    assert!(!ErrorKind::InsufficientFunds.is_retryable());
    assert!(ErrorKind::UserRejected.is_retryable());
    assert!(ErrorKind::SyncFailure.is_retryable());
    assert!(ErrorKind::ContractReverted.is_retryable());
}

#[test]
fn error_kind_serializes_in_snake_case() {
    let json = serde_json::to_string(&ErrorKind::ContractReverted).expect("json");
    assert_eq!(json, "\"contract_reverted\"");
}
