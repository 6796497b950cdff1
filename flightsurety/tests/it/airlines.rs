//! Contract-interaction scenarios for airline registration, funding and the
//! operational circuit breaker.

use alloy::primitives::U256;
use flightsurety::{error::ChainError, gateway::Gateway};

use crate::{TestLedger, AIRLINE_FEE};

#[tokio::test]
async fn airline_cannot_register_another_before_funding() {
    let test = TestLedger::new(3);
    let candidate = TestLedger::airline(1);

    // The owner airline is registered at deployment but has not staked yet.
    let err = test
        .ledger
        .register_airline(candidate, test.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted { .. }));
    assert!(!test.ledger.is_airline(candidate).await.unwrap());
}

#[tokio::test]
async fn registration_is_direct_until_four_airlines_exist() {
    let test = TestLedger::new(3);
    test.fund_owner().await;

    let second = TestLedger::airline(1);
    let third = TestLedger::airline(2);
    let fourth = TestLedger::airline(3);
    let fifth = TestLedger::airline(4);

    test.add_funded_airline(test.owner, second).await;
    test.add_funded_airline(second, third).await;
    test.add_funded_airline(third, fourth).await;

    assert!(test.ledger.is_airline(test.owner).await.unwrap());
    assert!(test.ledger.is_airline(second).await.unwrap());
    assert!(test.ledger.is_airline(third).await.unwrap());
    assert!(test.ledger.is_airline(fourth).await.unwrap());

    // Four airlines exist, so the fifth needs consensus; a single
    // registration call is only a vote.
    test.ledger
        .register_airline(fifth, test.owner)
        .await
        .unwrap();
    assert!(!test.ledger.is_airline(fifth).await.unwrap());
}

#[tokio::test]
async fn fifth_airline_registers_at_half_the_votes() {
    let test = TestLedger::new(3);
    test.fund_owner().await;

    let second = TestLedger::airline(1);
    let third = TestLedger::airline(2);
    let fourth = TestLedger::airline(3);
    let fifth = TestLedger::airline(4);

    test.add_funded_airline(test.owner, second).await;
    test.add_funded_airline(second, third).await;
    test.add_funded_airline(third, fourth).await;

    test.ledger
        .register_airline(fifth, test.owner)
        .await
        .unwrap();
    assert!(!test.ledger.is_airline(fifth).await.unwrap());

    // Second distinct vote out of four registered airlines reaches 50%.
    test.ledger.register_airline(fifth, second).await.unwrap();
    assert!(test.ledger.is_airline(fifth).await.unwrap());
}

#[tokio::test]
async fn duplicate_votes_are_rejected() {
    let test = TestLedger::new(3);
    test.fund_owner().await;

    let second = TestLedger::airline(1);
    let third = TestLedger::airline(2);
    let fourth = TestLedger::airline(3);
    let fifth = TestLedger::airline(4);

    test.add_funded_airline(test.owner, second).await;
    test.add_funded_airline(second, third).await;
    test.add_funded_airline(third, fourth).await;

    test.ledger
        .register_airline(fifth, test.owner)
        .await
        .unwrap();
    let err = test
        .ledger
        .register_airline(fifth, test.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted { .. }));
    assert!(!test.ledger.is_airline(fifth).await.unwrap());
}

#[tokio::test]
async fn funding_requires_the_participation_fee() {
    let test = TestLedger::new(3);
    let err = test
        .ledger
        .fund(test.owner, test.owner, U256::from(AIRLINE_FEE / 2))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted { .. }));

    // An airline that never registered cannot be funded at all.
    let stranger = TestLedger::airline(9);
    let err = test
        .ledger
        .fund(stranger, stranger, U256::from(AIRLINE_FEE))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted { .. }));
}

#[tokio::test]
async fn only_the_owner_flips_the_operational_switch() {
    let test = TestLedger::new(3);
    let stranger = TestLedger::airline(2);

    let err = test
        .ledger
        .set_operating_status(false, stranger)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted { .. }));
    assert!(test.ledger.is_operational().await.unwrap());

    test.ledger
        .set_operating_status(false, test.owner)
        .await
        .unwrap();
    assert!(!test.ledger.is_operational().await.unwrap());

    // Every state-changing call is gated while paused.
    let err = test
        .ledger
        .fund(test.owner, test.owner, U256::from(AIRLINE_FEE))
        .await
        .unwrap_err();
    assert_eq!(err, ChainError::NotOperational);

    test.ledger
        .set_operating_status(true, test.owner)
        .await
        .unwrap();
    test.fund_owner().await;
}
