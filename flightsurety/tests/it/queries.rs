//! Full round trips through the node loop and facade, plus the insurance
//! purchase/credit/withdraw flow driven straight through the gateway.

use std::time::Duration;

use alloy::primitives::U256;
use flightsurety::{
    error::{ChainError, QueryError},
    event::FlightStatus,
    gateway::Gateway,
    registry::OracleIdentity,
    sim::SimLedger,
};

use crate::{oracle_pool, spawn_node, TestLedger, ORACLE_FEE, STATUS_SEED};

const FLIGHT: &str = "AA100";
const DEPARTURE: u64 = 1_700_000_000;

#[tokio::test]
async fn query_resolves_with_the_requested_flight() {
    // Any single response finalizes, so the round trip completes with
    // whatever the first eligible oracle reported.
    let test = TestLedger::new(1);
    let (client, _handle, task) = spawn_node(&test, 20, Duration::from_secs(10)).await;

    let airline = TestLedger::airline(1);
    let result = client
        .flight_status(FLIGHT, DEPARTURE, airline)
        .await
        .unwrap();
    assert_eq!(result.flight, FLIGHT);
    assert_eq!(result.timestamp, DEPARTURE);

    // A different flight resolves independently.
    let result = client
        .flight_status("UA42", DEPARTURE, airline)
        .await
        .unwrap();
    assert_eq!(result.flight, "UA42");

    task.abort();
}

#[tokio::test]
async fn query_times_out_when_no_agreement_forms() {
    let test = TestLedger::new(usize::MAX);
    let (client, _handle, task) = spawn_node(&test, 20, Duration::from_millis(300)).await;

    let airline = TestLedger::airline(1);
    let err = client
        .flight_status(FLIGHT, DEPARTURE, airline)
        .await
        .unwrap_err();
    assert_eq!(err, QueryError::Timeout);

    task.abort();
}

#[tokio::test]
async fn cancelled_query_resolves_with_cancelled() {
    let test = TestLedger::new(usize::MAX);
    let (client, _handle, task) = spawn_node(&test, 20, Duration::from_secs(30)).await;

    let airline = TestLedger::airline(1);
    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.flight_status(FLIGHT, DEPARTURE, airline).await })
    };
    // Let the query reach the node loop before cancelling it.
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.cancel(FLIGHT, DEPARTURE, airline);

    let result = waiter.await.unwrap();
    assert_eq!(result.unwrap_err(), QueryError::Cancelled);

    // The node is still healthy afterwards.
    assert!(client.is_operational().await.unwrap());

    task.abort();
}

#[tokio::test]
async fn query_surfaces_chain_errors() {
    let test = TestLedger::new(1);
    let (client, _handle, task) = spawn_node(&test, 20, Duration::from_secs(10)).await;

    test.ledger
        .set_operating_status(false, test.owner)
        .await
        .unwrap();
    let err = client
        .flight_status(FLIGHT, DEPARTURE, TestLedger::airline(1))
        .await
        .unwrap_err();
    assert_eq!(err, QueryError::Chain(ChainError::NotOperational));

    task.abort();
}

#[tokio::test]
async fn late_insurance_credits_and_withdraws() {
    // Three matching responses finalize; with ten oracles every index is
    // held by exactly three of them, so a delay can be forced by hand.
    let test = TestLedger::new(3);
    let mut registry = oracle_pool(10);
    let outcomes = registry
        .register_all(test.ledger.as_ref(), U256::from(ORACLE_FEE))
        .await;
    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_ok()));

    let airline = TestLedger::airline(1);
    let passenger = OracleIdentity::derived(STATUS_SEED, "passenger", 0).address();
    let premium = U256::from(500_000_000_000_000_000u128);

    test.ledger
        .buy(airline, FLIGHT, DEPARTURE, passenger, premium)
        .await
        .unwrap();

    test.ledger
        .fetch_flight_status(airline, FLIGHT, DEPARTURE, test.owner)
        .await
        .unwrap();
    let key = flightsurety::event::CorrelationKey {
        airline,
        flight: FLIGHT.into(),
        timestamp: DEPARTURE,
    };
    let index = SimLedger::request_index_for(&key);

    let holders: Vec<_> = registry
        .active()
        .filter(|(_, indexes)| indexes.contains(&index))
        .map(|(address, _)| address)
        .collect();
    assert_eq!(holders.len(), 3);

    for oracle in holders {
        test.ledger
            .submit_oracle_response(
                index,
                airline,
                FLIGHT,
                DEPARTURE,
                FlightStatus::LateAirline,
                oracle,
            )
            .await
            .unwrap();
    }

    // Airline-attributable delay pays out 3/2 of the premium.
    let credit = test.ledger.credit_of(passenger).await.unwrap();
    assert_eq!(credit, premium * U256::from(3) / U256::from(2));

    test.ledger.pay(passenger).await.unwrap();
    assert_eq!(
        test.ledger.credit_of(passenger).await.unwrap(),
        U256::ZERO
    );

    // Nothing left to withdraw: a typed revert, not a crash.
    let err = test.ledger.pay(passenger).await.unwrap_err();
    assert!(matches!(err, ChainError::Reverted { .. }));
}

#[tokio::test]
async fn premiums_are_capped() {
    let test = TestLedger::new(3);
    let passenger = OracleIdentity::derived(STATUS_SEED, "passenger", 1).address();
    let airline = TestLedger::airline(1);

    let err = test
        .ledger
        .buy(
            airline,
            FLIGHT,
            DEPARTURE,
            passenger,
            U256::from(2_000_000_000_000_000_000u128),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted { .. }));

    let err = test
        .ledger
        .buy(airline, FLIGHT, DEPARTURE, passenger, U256::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted { .. }));
}
