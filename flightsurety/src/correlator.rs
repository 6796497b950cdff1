use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use alloy::primitives::Address;
use serde::Serialize;
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, warn};

use crate::{
    error::{ChainError, QueryError},
    event::{CorrelationKey, FlightStatus, OracleRequest, StatusUpdate},
    gateway::Gateway,
    registry::OracleRegistry,
};

/// The payload a resolved flight-status query delivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResult {
    pub flight: String,
    pub timestamp: u64,
    pub status: FlightStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Created,
    Dispatched,
    Finalizing,
    Resolved,
    TimedOut,
}

impl RequestState {
    fn is_terminal(self) -> bool {
        matches!(self, RequestState::Resolved | RequestState::TimedOut)
    }
}

/// An observed on-chain status request and what this node has done about it.
#[derive(Debug)]
struct StatusRequest {
    index: u8,
    state: RequestState,
    /// Oracles that have had a terminal submission for this request, either
    /// accepted or rejected by the contract. Never resubmitted.
    responded: HashSet<Address>,
    opened_at: Instant,
}

/// A client query awaiting resolution. The oneshot sender is consumed on
/// resolution; a query cannot resolve twice.
#[derive(Debug)]
struct PendingQuery {
    responder: oneshot::Sender<Result<StatusResult, QueryError>>,
    opened_at: Instant,
}

/// Owns the request state machines and the correlation map from key to
/// pending queries. All mutation happens on the node's event loop; no
/// locking needed.
#[derive(Debug)]
pub struct ResponseCorrelator {
    requests: HashMap<CorrelationKey, StatusRequest>,
    pending: HashMap<CorrelationKey, Vec<PendingQuery>>,
    response_window: Duration,
    status_seed: u64,
}

impl ResponseCorrelator {
    pub fn new(response_window: Duration, status_seed: u64) -> ResponseCorrelator {
        ResponseCorrelator {
            requests: HashMap::new(),
            pending: HashMap::new(),
            response_window,
            status_seed,
        }
    }

    /// Registers a pending query for `key` and triggers the oracle-request
    /// write. A failed write resolves the query immediately with the chain
    /// error; otherwise resolution arrives via [`handle_status`] or the
    /// timeout sweep.
    ///
    /// [`handle_status`]: ResponseCorrelator::handle_status
    pub async fn submit_query(
        &mut self,
        gateway: &dyn Gateway,
        sender: Address,
        key: CorrelationKey,
        responder: oneshot::Sender<Result<StatusResult, QueryError>>,
    ) {
        if let Err(error) = gateway
            .fetch_flight_status(key.airline, &key.flight, key.timestamp, sender)
            .await
        {
            warn!(%key, %error, "status fetch failed");
            let _ = responder.send(Err(QueryError::Chain(error)));
            return;
        }
        // A fresh query for an already-settled key reopens the request on
        // chain; forget the settled state machine so the new request event
        // dispatches again instead of being treated as a late duplicate.
        if self
            .requests
            .get(&key)
            .is_some_and(|request| request.state.is_terminal())
        {
            self.requests.remove(&key);
        }
        self.pending.entry(key).or_default().push(PendingQuery {
            responder,
            opened_at: Instant::now(),
        });
    }

    /// Cancels every pending query for `key`. A finalization event arriving
    /// later is a no-op.
    pub fn cancel(&mut self, key: &CorrelationKey) {
        if let Some(waiters) = self.pending.remove(key) {
            debug!(%key, waiters = waiters.len(), "queries cancelled");
            for waiter in waiters {
                let _ = waiter.responder.send(Err(QueryError::Cancelled));
            }
        }
    }

    /// Reacts to an on-chain status request: every owned active oracle
    /// holding the request's index reports its status, at most once per
    /// (oracle, index) pair even when the event is delivered more than once.
    pub async fn handle_request(
        &mut self,
        registry: &OracleRegistry,
        gateway: &dyn Gateway,
        request: &OracleRequest,
    ) {
        let key = request.key();
        let seed = self.status_seed;
        let entry = self
            .requests
            .entry(key.clone())
            .or_insert_with(|| StatusRequest {
                index: request.index,
                state: RequestState::Created,
                responded: HashSet::new(),
                opened_at: Instant::now(),
            });
        if entry.state.is_terminal() {
            debug!(%key, "ignoring request event for settled request");
            return;
        }
        entry.state = RequestState::Dispatched;
        for (oracle, indexes) in registry.active() {
            if !indexes.contains(&request.index) {
                continue;
            }
            if entry.responded.contains(&oracle) {
                continue;
            }
            let status = FlightStatus::sample(seed, oracle, &key);
            match gateway
                .submit_oracle_response(
                    request.index,
                    request.airline,
                    &request.flight,
                    request.timestamp,
                    status,
                    oracle,
                )
                .await
            {
                Ok(()) => {
                    debug!(%key, %oracle, %status, "oracle response submitted");
                    entry.responded.insert(oracle);
                }
                Err(ChainError::Transport(error)) => {
                    // Transport failures are safe to retry if the event is
                    // delivered again; reverts are not.
                    warn!(%key, %oracle, %error, "response submission failed");
                }
                Err(error) => {
                    warn!(%key, %oracle, %error, "response rejected");
                    entry.responded.insert(oracle);
                }
            }
        }
        entry.state = RequestState::Finalizing;
    }

    /// Reacts to a finalization event: settles the request and resolves
    /// every pending query for its key, exactly once. Finalizations for
    /// settled requests or cancelled queries are silent no-ops.
    pub fn handle_status(&mut self, update: &StatusUpdate) {
        let key = update.key();
        if let Some(request) = self.requests.get_mut(&key) {
            if request.state.is_terminal() {
                debug!(%key, "ignoring repeated finalization");
                return;
            }
            request.state = RequestState::Resolved;
        }
        if let Some(waiters) = self.pending.remove(&key) {
            for waiter in waiters {
                let _ = waiter.responder.send(Ok(StatusResult {
                    flight: update.flight.clone(),
                    timestamp: update.timestamp,
                    status: update.status,
                }));
            }
        }
    }

    /// Times out requests and queries older than the response window and
    /// prunes settled requests once they can no longer receive late events
    /// worth deduplicating.
    pub fn expire(&mut self, now: Instant) {
        let window = self.response_window;
        for (key, request) in self.requests.iter_mut() {
            if !request.state.is_terminal()
                && now.saturating_duration_since(request.opened_at) >= window
            {
                warn!(%key, index = request.index, "request timed out");
                request.state = RequestState::TimedOut;
                if let Some(waiters) = self.pending.remove(key) {
                    for waiter in waiters {
                        let _ = waiter.responder.send(Err(QueryError::Timeout));
                    }
                }
            }
        }
        // Queries whose request event never even appeared.
        let orphaned: Vec<CorrelationKey> = self
            .pending
            .iter()
            .filter(|(key, waiters)| {
                !self.requests.contains_key(*key)
                    && waiters
                        .iter()
                        .any(|w| now.saturating_duration_since(w.opened_at) >= window)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in orphaned {
            warn!(%key, "query timed out before its request was observed");
            if let Some(waiters) = self.pending.remove(&key) {
                for waiter in waiters {
                    let _ = waiter.responder.send(Err(QueryError::Timeout));
                }
            }
        }
        self.requests.retain(|_, request| {
            !(request.state.is_terminal()
                && now.saturating_duration_since(request.opened_at) >= window * 2)
        });
    }

    pub fn pending_queries(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn open_requests(&self) -> usize {
        self.requests
            .values()
            .filter(|request| !request.state.is_terminal())
            .count()
    }
}
