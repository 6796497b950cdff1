//! Oracle pool registration scenarios.

use alloy::primitives::U256;
use flightsurety::{
    error::{ChainError, RegistrationError},
    gateway::Gateway,
};

use crate::{oracle_pool, TestLedger, ORACLE_FEE};

#[tokio::test]
async fn registration_returns_one_outcome_per_identity() {
    let test = TestLedger::new(3);
    let mut registry = oracle_pool(20);

    let outcomes = registry
        .register_all(test.ledger.as_ref(), U256::from(ORACLE_FEE))
        .await;
    assert_eq!(outcomes.len(), 20);
    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_ok()));
    assert_eq!(registry.active().count(), 20);

    for (address, outcome) in outcomes {
        let indexes = outcome.unwrap();
        assert_eq!(registry.indexes_for(address), Some(indexes));
        assert!(indexes.iter().all(|index| *index < 10));
    }
}

#[tokio::test]
async fn reregistration_is_an_idempotent_no_op() {
    let test = TestLedger::new(3);
    let mut registry = oracle_pool(5);

    let first = registry
        .register_all(test.ledger.as_ref(), U256::from(ORACLE_FEE))
        .await;
    let second = registry
        .register_all(test.ledger.as_ref(), U256::from(ORACLE_FEE))
        .await;
    // The second run issues no writes; identities keep their indexes.
    assert_eq!(first.len(), second.len());
    for ((address_a, a), (address_b, b)) in first.iter().zip(second.iter()) {
        assert_eq!(address_a, address_b);
        assert_eq!(a.as_ref().unwrap(), b.as_ref().unwrap());
    }
}

#[tokio::test]
async fn registering_the_same_accounts_twice_reports_duplicates() {
    let test = TestLedger::new(3);

    let mut first = oracle_pool(5);
    let outcomes = first
        .register_all(test.ledger.as_ref(), U256::from(ORACLE_FEE))
        .await;
    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_ok()));

    // A second registry over the same accounts: the contract rejects each
    // registration as a duplicate, recorded per identity, no crash.
    let mut second = oracle_pool(5);
    let outcomes = second
        .register_all(test.ledger.as_ref(), U256::from(ORACLE_FEE))
        .await;
    assert_eq!(outcomes.len(), 5);
    for (_, outcome) in outcomes {
        assert_eq!(outcome.unwrap_err(), RegistrationError::Duplicate);
    }
}

#[tokio::test]
async fn short_fee_is_recorded_per_identity_and_does_not_abort_the_batch() {
    let test = TestLedger::new(3);
    let mut registry = oracle_pool(4);

    let outcomes = registry
        .register_all(test.ledger.as_ref(), U256::from(ORACLE_FEE / 2))
        .await;
    assert_eq!(outcomes.len(), 4);
    for (_, outcome) in outcomes {
        assert_eq!(outcome.unwrap_err(), RegistrationError::InsufficientFee);
    }
    assert_eq!(registry.active().count(), 0);
}

#[tokio::test]
async fn unregistered_oracles_have_no_indexes() {
    let test = TestLedger::new(3);
    let registry = oracle_pool(1);
    let address = registry.identities()[0].address();

    let err = test.ledger.my_indexes(address).await.unwrap_err();
    assert!(matches!(err, ChainError::Reverted { .. }));
    assert_eq!(registry.indexes_for(address), None);
}
