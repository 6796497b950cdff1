use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, U256};
use anyhow::Result;
use tokio::{
    select,
    sync::{
        mpsc::{self, UnboundedSender},
        oneshot,
    },
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    cfg::Config,
    correlator::{ResponseCorrelator, StatusResult},
    error::QueryError,
    event::{ChainEvent, CorrelationKey, EventKind},
    gateway::Gateway,
    listener::RequestListener,
    registry::OracleRegistry,
};

/// Work the facade (or API) asks the node loop to do on its behalf. All
/// coordination state is owned by the loop; these are the only ways in.
#[derive(Debug)]
pub enum Command {
    Query {
        key: CorrelationKey,
        responder: oneshot::Sender<Result<StatusResult, QueryError>>,
    },
    Cancel {
        key: CorrelationKey,
    },
}

/// Cloneable handle for talking to a running [`OracleNode`].
#[derive(Debug, Clone)]
pub struct NodeHandle {
    commands: UnboundedSender<Command>,
}

impl NodeHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow::anyhow!("node loop has stopped"))
    }
}

/// Everything the node loop needs to know, lifted out of [`Config`] so tests
/// can construct it directly.
#[derive(Debug, Clone)]
pub struct NodeParams {
    pub registration_fee: U256,
    pub start_block: u64,
    pub response_window: Duration,
    pub expiry_tick: Duration,
    pub resubscribe_backoff: Duration,
    pub max_resubscribe_backoff: Duration,
    pub status_seed: u64,
    /// Account used for the client-facing oracle-request writes.
    pub query_sender: Address,
}

impl NodeParams {
    pub fn from_config(config: &Config, query_sender: Address) -> NodeParams {
        let start_block = config
            .chain
            .as_ref()
            .map(|chain| chain.start_block)
            .unwrap_or(0);
        NodeParams {
            registration_fee: U256::from(config.oracles.registration_fee),
            start_block,
            response_window: config.oracles.response_window,
            expiry_tick: config.oracles.expiry_tick,
            resubscribe_backoff: config.oracles.resubscribe_backoff,
            max_resubscribe_backoff: config.oracles.max_resubscribe_backoff,
            status_seed: config.oracles.seed,
            query_sender,
        }
    }
}

/// The single-owner event loop: ledger events, facade commands and timeout
/// sweeps are all serviced here, so the correlation maps never need a lock.
pub struct OracleNode {
    gateway: Arc<dyn Gateway>,
    registry: OracleRegistry,
    correlator: ResponseCorrelator,
    query_sender: Address,
    commands: UnboundedReceiverStream<Command>,
    events: UnboundedReceiverStream<ChainEvent>,
    expiry_tick: Duration,
}

impl OracleNode {
    /// Registers the oracle pool, starts the request listener and the node
    /// loop, and hands back the command handle.
    pub async fn spawn(
        gateway: Arc<dyn Gateway>,
        mut registry: OracleRegistry,
        params: NodeParams,
    ) -> Result<(NodeHandle, JoinHandle<Result<()>>)> {
        let outcomes = registry
            .register_all(gateway.as_ref(), params.registration_fee)
            .await;
        let registered = outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_ok())
            .count();
        info!(
            registered,
            failed = outcomes.len() - registered,
            "oracle pool registration complete"
        );

        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let listener = RequestListener::new(
            gateway.clone(),
            params.start_block,
            params.resubscribe_backoff,
            params.max_resubscribe_backoff,
        );
        tokio::spawn(listener.run(event_sender));

        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let node = OracleNode {
            gateway,
            registry,
            correlator: ResponseCorrelator::new(params.response_window, params.status_seed),
            query_sender: params.query_sender,
            commands: UnboundedReceiverStream::new(command_receiver),
            events: UnboundedReceiverStream::new(event_receiver),
            expiry_tick: params.expiry_tick,
        };
        let handle = NodeHandle {
            commands: command_sender,
        };
        let task = tokio::spawn(node.run());
        Ok((handle, task))
    }

    async fn run(mut self) -> Result<()> {
        let mut tick = time::interval(self.expiry_tick);
        tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            select! {
                Some(event) = self.events.next() => {
                    self.handle_event(event).await;
                }
                Some(command) = self.commands.next() => {
                    self.handle_command(command).await;
                }
                _ = tick.tick() => {
                    self.correlator.expire(Instant::now());
                }
            }
        }
    }

    async fn handle_event(&mut self, event: ChainEvent) {
        match event.kind {
            EventKind::Request(request) => {
                debug!(block = event.block, index = request.index, flight = %request.flight, "oracle request observed");
                self.correlator
                    .handle_request(&self.registry, self.gateway.as_ref(), &request)
                    .await;
            }
            EventKind::Status(update) => {
                info!(block = event.block, flight = %update.flight, status = %update.status, "flight status finalized");
                self.correlator.handle_status(&update);
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Query { key, responder } => {
                debug!(%key, "status query submitted");
                self.correlator
                    .submit_query(self.gateway.as_ref(), self.query_sender, key, responder)
                    .await;
            }
            Command::Cancel { key } => {
                self.correlator.cancel(&key);
            }
        }
    }
}

impl Drop for OracleNode {
    fn drop(&mut self) {
        let pending = self.correlator.pending_queries();
        if pending > 0 {
            warn!(pending, "node loop stopped with unresolved queries");
        }
    }
}
