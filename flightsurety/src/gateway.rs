use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    error::{ChainError, SubscriptionError},
    event::{ChainEvent, FlightStatus},
};

/// A lazy, infinite sequence of contract events in ledger order, restartable
/// from any block.
pub type EventStream = BoxStream<'static, Result<ChainEvent, SubscriptionError>>;

/// The transport seam to the ledger-resident insurance contract.
///
/// Implementations own transport and nothing else: no retries, no domain
/// state. Every write is asynchronous, ledger-ordered and may revert; a
/// revert surfaces as [`ChainError`] carrying the reason. Retry policy
/// belongs to callers.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    async fn is_operational(&self) -> Result<bool, ChainError>;

    async fn is_airline(&self, airline: Address) -> Result<bool, ChainError>;

    /// The withdrawable insurance credit of a passenger, in wei.
    async fn credit_of(&self, passenger: Address) -> Result<U256, ChainError>;

    /// The three request indexes assigned to a registered oracle.
    async fn my_indexes(&self, oracle: Address) -> Result<[u8; 3], ChainError>;

    async fn register_airline(
        &self,
        candidate: Address,
        sender: Address,
    ) -> Result<(), ChainError>;

    async fn fund(&self, airline: Address, sender: Address, value: U256)
        -> Result<(), ChainError>;

    async fn register_oracle(&self, sender: Address, value: U256) -> Result<(), ChainError>;

    async fn fetch_flight_status(
        &self,
        airline: Address,
        flight: &str,
        timestamp: u64,
        sender: Address,
    ) -> Result<(), ChainError>;

    async fn submit_oracle_response(
        &self,
        index: u8,
        airline: Address,
        flight: &str,
        timestamp: u64,
        status: FlightStatus,
        sender: Address,
    ) -> Result<(), ChainError>;

    async fn set_operating_status(
        &self,
        operational: bool,
        sender: Address,
    ) -> Result<(), ChainError>;

    async fn buy(
        &self,
        airline: Address,
        flight: &str,
        timestamp: u64,
        sender: Address,
        value: U256,
    ) -> Result<(), ChainError>;

    /// Withdraws the sender's accumulated credit. Reverts when there is
    /// nothing to withdraw.
    async fn pay(&self, sender: Address) -> Result<(), ChainError>;

    /// Subscribes to contract events from `from_block` onwards. The returned
    /// stream replays historic events first, then delivers new ones as the
    /// ledger emits them. When it ends or errors the caller may subscribe
    /// again from the last block it saw.
    async fn subscribe(&self, from_block: u64) -> Result<EventStream, SubscriptionError>;
}
