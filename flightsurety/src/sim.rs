//! A deterministic in-memory rendition of the insurance contract, implementing
//! [`Gateway`] so the whole coordination stack can run and be tested without a
//! chain. Behavior follows the contract's observable rules: consensus-gated
//! airline registration, funding-gated participation, the operational circuit
//! breaker, indexed oracle eligibility and majority-vote status finalization.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use sha3::{Digest, Keccak256};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::{
    cfg::Config,
    error::{ChainError, SubscriptionError},
    event::{ChainEvent, CorrelationKey, EventKind, FlightStatus, OracleRequest, StatusUpdate},
    gateway::{EventStream, Gateway},
};

/// Oracles are eligible for a request when they hold its index; indexes range
/// over 0..ORACLE_INDEXES.
const ORACLE_INDEXES: u64 = 10;
/// Registration consensus kicks in from this many registered airlines.
const CONSENSUS_FROM: usize = 4;
const EVENT_BUFFER: usize = 1024;

const ERR_NOT_OWNER: &str = "Caller is not the contract owner";
const ERR_NOT_FUNDED: &str = "Caller is not a funded airline";
const ERR_AIRLINE_REGISTERED: &str = "Airline is already registered";
const ERR_AIRLINE_UNREGISTERED: &str = "Airline is not registered";
const ERR_ALREADY_VOTED: &str = "Caller has already voted to register this airline";
const ERR_PARTICIPATION_FEE: &str = "Participation fee is required";
const ERR_REGISTRATION_FEE: &str = "Registration fee is required";
const ERR_ORACLE_REGISTERED: &str = "Oracle is already registered";
const ERR_ORACLE_UNREGISTERED: &str = "Oracle is not registered";
const ERR_INDEX_MISMATCH: &str = "Index does not match oracle request";
const ERR_REQUEST_MISMATCH: &str = "Flight or timestamp do not match oracle request";
const ERR_ALREADY_RESPONDED: &str = "Oracle has already submitted a response for this request";
const ERR_PREMIUM_REQUIRED: &str = "Insurance premium is required";
const ERR_PREMIUM_TOO_LARGE: &str = "Premium exceeds the insurable maximum";
const ERR_NO_CREDIT: &str = "No credit to withdraw";

#[derive(Debug, Clone)]
pub struct SimParams {
    /// Contract owner; also seeded as the first registered airline.
    pub owner: Address,
    pub airline_participation_fee: U256,
    pub oracle_registration_fee: U256,
    /// Matching responses required to finalize a status.
    pub agreement_threshold: usize,
    pub max_premium: U256,
}

impl SimParams {
    pub fn from_config(owner: Address, config: &Config) -> SimParams {
        SimParams {
            owner,
            airline_participation_fee: U256::from(config.airlines.participation_fee),
            oracle_registration_fee: U256::from(config.oracles.registration_fee),
            agreement_threshold: config.sim.agreement_threshold,
            max_premium: U256::from(config.sim.max_premium),
        }
    }
}

#[derive(Debug, Default)]
struct OpenRequest {
    open: bool,
    responses: HashMap<u8, usize>,
    responded: HashSet<Address>,
}

#[derive(Debug)]
struct SimState {
    operational: bool,
    block: u64,
    /// Registered airlines; the flag records funding.
    airlines: HashMap<Address, bool>,
    votes: HashMap<Address, HashSet<Address>>,
    oracles: HashMap<Address, [u8; 3]>,
    requests: HashMap<(u8, CorrelationKey), OpenRequest>,
    policies: HashMap<CorrelationKey, HashMap<Address, U256>>,
    credits: HashMap<Address, U256>,
    events: Vec<ChainEvent>,
    live: broadcast::Sender<ChainEvent>,
}

impl SimState {
    fn ensure_operational(&self) -> Result<(), ChainError> {
        if self.operational {
            Ok(())
        } else {
            Err(ChainError::NotOperational)
        }
    }

    /// Every successful write advances the block counter. Emission happens
    /// under the state lock, so event order is the ledger's total order.
    fn advance(&mut self) -> u64 {
        self.block += 1;
        self.block
    }

    fn emit(&mut self, kind: EventKind) {
        let event = ChainEvent {
            block: self.advance(),
            kind,
        };
        self.events.push(event.clone());
        let _ = self.live.send(event);
    }
}

#[derive(Debug)]
pub struct SimLedger {
    params: SimParams,
    state: Mutex<SimState>,
}

impl SimLedger {
    pub fn new(params: SimParams) -> SimLedger {
        let (live, _) = broadcast::channel(EVENT_BUFFER);
        let mut airlines = HashMap::new();
        // The deployer seeds the first airline, exactly once.
        airlines.insert(params.owner, false);
        SimLedger {
            params,
            state: Mutex::new(SimState {
                operational: true,
                block: 0,
                airlines,
                votes: HashMap::new(),
                oracles: HashMap::new(),
                requests: HashMap::new(),
                policies: HashMap::new(),
                credits: HashMap::new(),
                events: Vec::new(),
                live,
            }),
        }
    }

    /// The request index a status fetch for `key` resolves to. Deterministic
    /// so test runs are reproducible.
    pub fn request_index_for(key: &CorrelationKey) -> u8 {
        let mut hasher = Keccak256::new();
        hasher.update(key.airline.as_slice());
        hasher.update(key.flight.as_bytes());
        hasher.update(key.timestamp.to_be_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        (u64::from(digest[31]) % ORACLE_INDEXES) as u8
    }

    pub fn current_block(&self) -> u64 {
        self.state.lock().unwrap().block
    }

    /// How many responses the contract has accepted for a request. Test
    /// visibility only.
    pub fn responses_recorded(&self, index: u8, key: &CorrelationKey) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .get(&(index, key.clone()))
            .map(|request| request.responded.len())
            .unwrap_or(0)
    }

    /// Drops every active subscription, as a flaky websocket would. New
    /// subscriptions keep working and replay from the requested block.
    pub fn interrupt_subscriptions(&self) {
        let mut state = self.state.lock().unwrap();
        let (live, _) = broadcast::channel(EVENT_BUFFER);
        state.live = live;
    }
}

#[async_trait]
impl Gateway for SimLedger {
    async fn is_operational(&self) -> Result<bool, ChainError> {
        Ok(self.state.lock().unwrap().operational)
    }

    async fn is_airline(&self, airline: Address) -> Result<bool, ChainError> {
        Ok(self.state.lock().unwrap().airlines.contains_key(&airline))
    }

    async fn credit_of(&self, passenger: Address) -> Result<U256, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .credits
            .get(&passenger)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn my_indexes(&self, oracle: Address) -> Result<[u8; 3], ChainError> {
        self.state
            .lock()
            .unwrap()
            .oracles
            .get(&oracle)
            .copied()
            .ok_or_else(|| ChainError::reverted(ERR_ORACLE_UNREGISTERED))
    }

    async fn register_airline(
        &self,
        candidate: Address,
        sender: Address,
    ) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        state.ensure_operational()?;
        if state.airlines.get(&sender) != Some(&true) {
            return Err(ChainError::reverted(ERR_NOT_FUNDED));
        }
        if state.airlines.contains_key(&candidate) {
            return Err(ChainError::reverted(ERR_AIRLINE_REGISTERED));
        }
        if state.airlines.len() < CONSENSUS_FROM {
            state.airlines.insert(candidate, false);
            state.advance();
            return Ok(());
        }
        let registered = state.airlines.len();
        let votes = state.votes.entry(candidate).or_default();
        if !votes.insert(sender) {
            return Err(ChainError::reverted(ERR_ALREADY_VOTED));
        }
        if votes.len() * 2 >= registered {
            state.votes.remove(&candidate);
            state.airlines.insert(candidate, false);
        }
        state.advance();
        Ok(())
    }

    async fn fund(
        &self,
        airline: Address,
        _sender: Address,
        value: U256,
    ) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        state.ensure_operational()?;
        if !state.airlines.contains_key(&airline) {
            return Err(ChainError::reverted(ERR_AIRLINE_UNREGISTERED));
        }
        if value < self.params.airline_participation_fee {
            return Err(ChainError::reverted(ERR_PARTICIPATION_FEE));
        }
        state.airlines.insert(airline, true);
        state.advance();
        Ok(())
    }

    async fn register_oracle(&self, sender: Address, value: U256) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        state.ensure_operational()?;
        if value < self.params.oracle_registration_fee {
            return Err(ChainError::reverted(ERR_REGISTRATION_FEE));
        }
        if state.oracles.contains_key(&sender) {
            return Err(ChainError::reverted(ERR_ORACLE_REGISTERED));
        }
        // Indexes are assigned in registration order so that any pool of ten
        // or more oracles covers every index.
        let n = state.oracles.len() as u64;
        let indexes = [
            (n % ORACLE_INDEXES) as u8,
            ((n + 3) % ORACLE_INDEXES) as u8,
            ((n + 7) % ORACLE_INDEXES) as u8,
        ];
        state.oracles.insert(sender, indexes);
        state.advance();
        Ok(())
    }

    async fn fetch_flight_status(
        &self,
        airline: Address,
        flight: &str,
        timestamp: u64,
        _sender: Address,
    ) -> Result<(), ChainError> {
        let key = CorrelationKey {
            airline,
            flight: flight.to_owned(),
            timestamp,
        };
        let index = SimLedger::request_index_for(&key);
        let mut state = self.state.lock().unwrap();
        state.ensure_operational()?;
        state.requests.insert(
            (index, key.clone()),
            OpenRequest {
                open: true,
                ..OpenRequest::default()
            },
        );
        state.emit(EventKind::Request(OracleRequest {
            index,
            airline,
            flight: flight.to_owned(),
            timestamp,
        }));
        Ok(())
    }

    async fn submit_oracle_response(
        &self,
        index: u8,
        airline: Address,
        flight: &str,
        timestamp: u64,
        status: FlightStatus,
        sender: Address,
    ) -> Result<(), ChainError> {
        let key = CorrelationKey {
            airline,
            flight: flight.to_owned(),
            timestamp,
        };
        let mut state = self.state.lock().unwrap();
        state.ensure_operational()?;
        match state.oracles.get(&sender) {
            None => return Err(ChainError::reverted(ERR_ORACLE_UNREGISTERED)),
            Some(indexes) if !indexes.contains(&index) => {
                return Err(ChainError::reverted(ERR_INDEX_MISMATCH));
            }
            Some(_) => {}
        }
        let request = match state.requests.get_mut(&(index, key.clone())) {
            Some(request) if request.open => request,
            _ => return Err(ChainError::reverted(ERR_REQUEST_MISMATCH)),
        };
        if !request.responded.insert(sender) {
            return Err(ChainError::reverted(ERR_ALREADY_RESPONDED));
        }
        let agreeing = {
            let count = request.responses.entry(status.code()).or_insert(0);
            *count += 1;
            *count
        };
        let finalized = agreeing >= self.params.agreement_threshold;
        if finalized {
            request.open = false;
        }
        if finalized {
            // A delay attributable to the airline credits every insuree at
            // 3/2 of the premium paid.
            if status == FlightStatus::LateAirline {
                if let Some(policies) = state.policies.remove(&key) {
                    for (passenger, premium) in policies {
                        let payout = premium * U256::from(3) / U256::from(2);
                        let credit = state.credits.entry(passenger).or_insert(U256::ZERO);
                        *credit += payout;
                    }
                }
            }
            state.emit(EventKind::Status(StatusUpdate {
                airline,
                flight: flight.to_owned(),
                timestamp,
                status,
            }));
        } else {
            state.advance();
        }
        Ok(())
    }

    async fn set_operating_status(
        &self,
        operational: bool,
        sender: Address,
    ) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        if sender != self.params.owner {
            return Err(ChainError::reverted(ERR_NOT_OWNER));
        }
        state.operational = operational;
        state.advance();
        Ok(())
    }

    async fn buy(
        &self,
        airline: Address,
        flight: &str,
        timestamp: u64,
        sender: Address,
        value: U256,
    ) -> Result<(), ChainError> {
        let key = CorrelationKey {
            airline,
            flight: flight.to_owned(),
            timestamp,
        };
        let mut state = self.state.lock().unwrap();
        state.ensure_operational()?;
        if value == U256::ZERO {
            return Err(ChainError::reverted(ERR_PREMIUM_REQUIRED));
        }
        if value > self.params.max_premium {
            return Err(ChainError::reverted(ERR_PREMIUM_TOO_LARGE));
        }
        let premium = state
            .policies
            .entry(key)
            .or_default()
            .entry(sender)
            .or_insert(U256::ZERO);
        *premium += value;
        state.advance();
        Ok(())
    }

    async fn pay(&self, sender: Address) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        state.ensure_operational()?;
        match state.credits.remove(&sender) {
            Some(credit) if credit > U256::ZERO => {
                state.advance();
                Ok(())
            }
            _ => Err(ChainError::reverted(ERR_NO_CREDIT)),
        }
    }

    async fn subscribe(&self, from_block: u64) -> Result<EventStream, SubscriptionError> {
        let (replay, cutoff, receiver) = {
            let state = self.state.lock().unwrap();
            let replay: Vec<ChainEvent> = state
                .events
                .iter()
                .filter(|event| event.block >= from_block)
                .cloned()
                .collect();
            let cutoff = replay.last().map(|event| event.block).unwrap_or(0);
            (replay, cutoff, state.live.subscribe())
        };
        let live = BroadcastStream::new(receiver).filter_map(move |item| {
            future::ready(match item {
                Ok(event) if event.block >= from_block && event.block > cutoff => Some(Ok(event)),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    Some(Err(SubscriptionError::Lagged(missed)))
                }
            })
        });
        Ok(stream::iter(replay.into_iter().map(Ok)).chain(live).boxed())
    }
}
