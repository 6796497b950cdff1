//! Integration tests driving the whole stack against the simulated ledger:
//! contract-interaction scenarios in `airlines`, pool registration in
//! `oracles`, and full query round trips through the node in `queries`.

mod airlines;
mod oracles;
mod queries;

use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, U256};
use flightsurety::{
    facade::AppClient,
    gateway::Gateway,
    node::{NodeHandle, NodeParams, OracleNode},
    registry::{OracleIdentity, OracleRegistry},
    sim::{SimLedger, SimParams},
};
use tokio::task::JoinHandle;

pub const AIRLINE_FEE: u128 = 10_000_000_000_000_000_000;
pub const ORACLE_FEE: u128 = 1_000_000_000_000_000_000;
pub const STATUS_SEED: u64 = 7;

pub struct TestLedger {
    pub ledger: Arc<SimLedger>,
    pub owner: Address,
}

impl TestLedger {
    /// A fresh ledger whose owner is seeded as the first (unfunded) airline.
    pub fn new(agreement_threshold: usize) -> TestLedger {
        let owner = OracleIdentity::derived(STATUS_SEED, "owner", 0).address();
        let ledger = Arc::new(SimLedger::new(SimParams {
            owner,
            airline_participation_fee: U256::from(AIRLINE_FEE),
            oracle_registration_fee: U256::from(ORACLE_FEE),
            agreement_threshold,
            max_premium: U256::from(1_000_000_000_000_000_000u128),
        }));
        TestLedger { ledger, owner }
    }

    pub async fn fund_owner(&self) {
        self.ledger
            .fund(self.owner, self.owner, U256::from(AIRLINE_FEE))
            .await
            .unwrap();
    }

    /// Registers `airline` from `registrar` and funds it.
    pub async fn add_funded_airline(&self, registrar: Address, airline: Address) {
        self.ledger
            .register_airline(airline, registrar)
            .await
            .unwrap();
        self.ledger
            .fund(airline, airline, U256::from(AIRLINE_FEE))
            .await
            .unwrap();
    }

    /// A reproducible airline address that is distinct per index.
    pub fn airline(index: u32) -> Address {
        OracleIdentity::derived(STATUS_SEED, "airline", index).address()
    }
}

pub fn oracle_pool(size: u32) -> OracleRegistry {
    let identities = (0..size)
        .map(|i| OracleIdentity::derived(STATUS_SEED, "oracle", i))
        .collect();
    OracleRegistry::new(identities)
}

/// Spins up the full node (registration, listener, event loop) against the
/// ledger and returns a facade client for it.
pub async fn spawn_node(
    test: &TestLedger,
    pool_size: u32,
    response_window: Duration,
) -> (AppClient, NodeHandle, JoinHandle<anyhow::Result<()>>) {
    let registry = oracle_pool(pool_size);
    let params = NodeParams {
        registration_fee: U256::from(ORACLE_FEE),
        start_block: 0,
        response_window,
        expiry_tick: Duration::from_millis(50),
        resubscribe_backoff: Duration::from_millis(50),
        max_resubscribe_backoff: Duration::from_millis(200),
        status_seed: STATUS_SEED,
        query_sender: test.owner,
    };
    let gateway: Arc<dyn Gateway> = test.ledger.clone();
    let (handle, task) = OracleNode::spawn(gateway.clone(), registry, params)
        .await
        .unwrap();
    let client = AppClient::new(handle.clone(), gateway, test.owner);
    (client, handle, task)
}
