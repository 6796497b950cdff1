use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Top-level daemon configuration, deserialized from one or more merged TOML
/// files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The port the JSON-RPC API listens on.
    #[serde(default = "api_port_default")]
    pub api_port: u16,
    /// Connection details for a live chain. Not required when running against
    /// the simulated ledger.
    #[serde(default)]
    pub chain: Option<ChainConfig>,
    #[serde(default)]
    pub oracles: OracleConfig,
    #[serde(default)]
    pub airlines: AirlineConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    // Must be ws:// to support subscriptions.
    pub rpc_url: String,
    /// Address of the deployed insurance application contract.
    pub app_address: Address,
    /// First block to scan for oracle requests.
    #[serde(default)]
    pub start_block: u64,
    /// Hex-encoded secret key of the account that submits client-facing
    /// status queries and insurance purchases.
    pub client_secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleConfig {
    /// Size of the provisioned oracle pool when no explicit keys are given.
    #[serde(default = "pool_size_default")]
    pub pool_size: u32,
    /// Hex-encoded secret keys for the oracle accounts. When empty, the pool
    /// is derived deterministically from `seed`.
    #[serde(default)]
    pub secret_keys: Vec<String>,
    /// Value attached to each oracle registration, in wei.
    #[serde(default = "registration_fee_default")]
    pub registration_fee: u128,
    /// How long a status query may stay unresolved before it times out.
    #[serde(default = "response_window_default")]
    pub response_window: Duration,
    /// How often the timeout sweep runs.
    #[serde(default = "expiry_tick_default")]
    pub expiry_tick: Duration,
    /// Initial delay before resubscribing after a dropped event stream.
    /// Doubles on consecutive failures up to `max_resubscribe_backoff`.
    #[serde(default = "resubscribe_backoff_default")]
    pub resubscribe_backoff: Duration,
    #[serde(default = "max_resubscribe_backoff_default")]
    pub max_resubscribe_backoff: Duration,
    /// Seed for derived oracle identities and for the simulated status
    /// source. Changing it changes which status each oracle reports.
    #[serde(default)]
    pub seed: u64,
}

impl Default for OracleConfig {
    fn default() -> OracleConfig {
        OracleConfig {
            pool_size: pool_size_default(),
            secret_keys: Vec::new(),
            registration_fee: registration_fee_default(),
            response_window: response_window_default(),
            expiry_tick: expiry_tick_default(),
            resubscribe_backoff: resubscribe_backoff_default(),
            max_resubscribe_backoff: max_resubscribe_backoff_default(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AirlineConfig {
    /// Value an airline must stake before it participates, in wei.
    #[serde(default = "participation_fee_default")]
    pub participation_fee: u128,
}

impl Default for AirlineConfig {
    fn default() -> AirlineConfig {
        AirlineConfig {
            participation_fee: participation_fee_default(),
        }
    }
}

/// Knobs for the in-process simulated ledger. Ignored when a live chain is
/// configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Number of matching oracle responses required to finalize a status.
    #[serde(default = "agreement_threshold_default")]
    pub agreement_threshold: usize,
    /// Largest premium a passenger may pay for a single policy, in wei.
    #[serde(default = "max_premium_default")]
    pub max_premium: u128,
}

impl Default for SimConfig {
    fn default() -> SimConfig {
        SimConfig {
            agreement_threshold: agreement_threshold_default(),
            max_premium: max_premium_default(),
        }
    }
}

fn api_port_default() -> u16 {
    3000
}

fn pool_size_default() -> u32 {
    20
}

fn registration_fee_default() -> u128 {
    // 1 ether
    1_000_000_000_000_000_000
}

fn participation_fee_default() -> u128 {
    // 10 ether
    10_000_000_000_000_000_000
}

fn response_window_default() -> Duration {
    Duration::from_secs(60)
}

fn expiry_tick_default() -> Duration {
    Duration::from_secs(1)
}

fn resubscribe_backoff_default() -> Duration {
    Duration::from_secs(1)
}

fn max_resubscribe_backoff_default() -> Duration {
    Duration::from_secs(30)
}

fn agreement_threshold_default() -> usize {
    3
}

fn max_premium_default() -> u128 {
    // 1 ether
    1_000_000_000_000_000_000
}
