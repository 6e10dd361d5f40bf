use super::*;

fn wei(raw: u128) -> U256 {
    U256::from(raw)
}

#[test]
fn parses_decimal_ether_into_exact_wei() {
    let amount = EtherAmount::parse_ether("0.05").expect("parse");
    assert_eq!(amount.wei(), wei(50_000_000_000_000_000));

    let whole = EtherAmount::parse_ether("2").expect("parse");
    assert_eq!(whole.wei(), wei(2_000_000_000_000_000_000));

    let tiny = EtherAmount::parse_ether("0.000000000000000001").expect("parse");
    assert_eq!(tiny.wei(), wei(1));
}

#[test]
fn trims_surrounding_whitespace() {
    let amount = EtherAmount::parse_ether("  0.1 ").expect("parse");
    assert_eq!(amount.wei(), wei(100_000_000_000_000_000));
}

#[test]
fn rejects_empty_negative_and_malformed_input() {
    assert_eq!(EtherAmount::parse_ether(""), Err(AmountError::Empty));
    assert_eq!(EtherAmount::parse_ether("   "), Err(AmountError::Empty));
    assert!(matches!(
        EtherAmount::parse_ether("-1"),
        Err(AmountError::Negative(_))
    ));
    assert!(matches!(
        EtherAmount::parse_ether("abc"),
        Err(AmountError::Malformed(_))
    ));
    assert!(matches!(
        EtherAmount::parse_ether("1.2.3"),
        Err(AmountError::Malformed(_))
    ));
}

#[test]
fn rejects_digits_beyond_wei_precision() {
    assert_eq!(
        EtherAmount::parse_ether("0.0500000000000000009"),
        Err(AmountError::TooPrecise("0.0500000000000000009".to_string()))
    );
    assert_eq!(
        EtherAmount::parse_positive_ether("0.0000000000000000001"),
        Err(AmountError::TooPrecise("0.0000000000000000001".to_string()))
    );
    assert!(matches!(
        EtherAmount::parse_ether("0.0000000000000000000x"),
        Err(AmountError::Malformed(_))
    ));
    assert!(EtherAmount::parse_ether("0.050000000000000000").is_ok());
}

#[test]
fn positive_parse_rejects_zero() {
    assert_eq!(EtherAmount::parse_positive_ether("0"), Err(AmountError::Zero));
    assert_eq!(EtherAmount::parse_positive_ether("0.000"), Err(AmountError::Zero));
    assert!(EtherAmount::parse_positive_ether("0.001").is_ok());
}

#[test]
fn displays_with_trimmed_fraction() {
    assert_eq!(EtherAmount::ZERO.to_string(), "0.0");
    assert_eq!(
        EtherAmount::from_wei(wei(20_000_000_000_000_000)).to_string(),
        "0.02"
    );
    assert_eq!(
        EtherAmount::from_wei(wei(1_500_000_000_000_000_000)).to_string(),
        "1.5"
    );
    assert_eq!(
        EtherAmount::from_wei(wei(3_000_000_000_000_000_000)).to_string(),
        "3.0"
    );
    assert_eq!(EtherAmount::from_wei(wei(1)).to_string(), "0.000000000000000001");
}

#[test]
fn display_output_parses_back_to_the_same_wei() {
    let amount = EtherAmount::from_wei(wei(70_000_000_000_000_000));
    let rendered = amount.to_string();
    assert_eq!(rendered, "0.07");
    assert_eq!(rendered.parse::<EtherAmount>().expect("parse"), amount);
}

#[test]
fn arithmetic_helpers_stay_in_wei() {
    let a = EtherAmount::parse_ether("0.02").expect("a");
    let b = EtherAmount::parse_ether("0.05").expect("b");
    assert_eq!(a.checked_add(b).expect("sum").to_string(), "0.07");
    assert_eq!(a.saturating_sub(b), EtherAmount::ZERO);
}
