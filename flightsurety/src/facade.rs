use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tokio::sync::oneshot;

use crate::{
    correlator::StatusResult,
    error::{ChainError, QueryError},
    event::CorrelationKey,
    gateway::Gateway,
    node::{Command, NodeHandle},
};

/// The boundary a presentation layer talks to: status queries against the
/// node loop, plus the handful of direct contract interactions a passenger
/// needs. Cheap to clone.
#[derive(Clone)]
pub struct AppClient {
    node: NodeHandle,
    gateway: Arc<dyn Gateway>,
    /// Account insurance purchases and withdrawals are sent from.
    account: Address,
}

impl AppClient {
    pub fn new(node: NodeHandle, gateway: Arc<dyn Gateway>, account: Address) -> AppClient {
        AppClient {
            node,
            gateway,
            account,
        }
    }

    /// Queries the flight status, resolving with exactly one of a result or
    /// a typed error; a query is never silently dropped.
    pub async fn flight_status(
        &self,
        flight: &str,
        timestamp: u64,
        airline: Address,
    ) -> Result<StatusResult, QueryError> {
        let key = CorrelationKey {
            airline,
            flight: flight.to_owned(),
            timestamp,
        };
        let (responder, receiver) = oneshot::channel();
        if self.node.send(Command::Query { key, responder }).is_err() {
            return Err(QueryError::Cancelled);
        }
        // A dropped responder means the node loop went away mid-query, which
        // cancels it rather than leaving the caller hanging.
        receiver.await.unwrap_or(Err(QueryError::Cancelled))
    }

    /// Cancels any pending queries for the flight. Their callers resolve
    /// with [`QueryError::Cancelled`]; a status finalized later is ignored.
    pub fn cancel(&self, flight: &str, timestamp: u64, airline: Address) {
        let key = CorrelationKey {
            airline,
            flight: flight.to_owned(),
            timestamp,
        };
        let _ = self.node.send(Command::Cancel { key });
    }

    pub async fn is_operational(&self) -> Result<bool, ChainError> {
        self.gateway.is_operational().await
    }

    pub async fn credit_of(&self, passenger: Address) -> Result<U256, ChainError> {
        self.gateway.credit_of(passenger).await
    }

    /// Buys delay insurance for a flight from the client account.
    pub async fn buy_insurance(
        &self,
        airline: Address,
        flight: &str,
        timestamp: u64,
        premium: U256,
    ) -> Result<(), ChainError> {
        self.gateway
            .buy(airline, flight, timestamp, self.account, premium)
            .await
    }

    /// Withdraws the client account's accumulated credit and reports the
    /// amount moved. Having no credit is an error value, not an exception.
    pub async fn withdraw_credit(&self) -> Result<U256, ChainError> {
        let credit = self.gateway.credit_of(self.account).await?;
        self.gateway.pay(self.account).await?;
        Ok(credit)
    }

    pub fn account(&self) -> Address {
        self.account
    }
}
