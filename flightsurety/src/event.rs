use std::fmt::{self, Display, Formatter};

use alloy::primitives::Address;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// The key that ties an on-chain status request, the oracle responses to it
/// and the originating client query together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationKey {
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
}

impl Display for CorrelationKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.airline, self.flight, self.timestamp)
    }
}

/// A ledger event announcing that oracles holding `index` should report the
/// status of the given flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub index: u8,
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
}

impl OracleRequest {
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey {
            airline: self.airline,
            flight: self.flight.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// A ledger event announcing that enough oracle responses agreed to set an
/// official status for the flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
    pub status: FlightStatus,
}

impl StatusUpdate {
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey {
            airline: self.airline,
            flight: self.flight.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Request(OracleRequest),
    Status(StatusUpdate),
}

/// An event as delivered by a gateway subscription. Block numbers are the
/// ledger's total order; subscriptions deliver strictly in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub block: u64,
    pub kind: EventKind,
}

/// The enumerated flight statuses the contract understands, with their wire
/// codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlightStatus {
    Unknown,
    OnTime,
    LateAirline,
    LateWeather,
    LateTechnical,
    LateOther,
}

impl FlightStatus {
    pub const ALL: [FlightStatus; 6] = [
        FlightStatus::Unknown,
        FlightStatus::OnTime,
        FlightStatus::LateAirline,
        FlightStatus::LateWeather,
        FlightStatus::LateTechnical,
        FlightStatus::LateOther,
    ];

    pub fn code(self) -> u8 {
        match self {
            FlightStatus::Unknown => 0,
            FlightStatus::OnTime => 10,
            FlightStatus::LateAirline => 20,
            FlightStatus::LateWeather => 30,
            FlightStatus::LateTechnical => 40,
            FlightStatus::LateOther => 50,
        }
    }

    pub fn from_code(code: u8) -> Option<FlightStatus> {
        FlightStatus::ALL.into_iter().find(|s| s.code() == code)
    }

    /// The simulated status source: deterministic pseudo-random over the
    /// enumerated set, keyed by (seed, oracle, flight). Two runs with the
    /// same inputs report the same status; different oracles disagree the
    /// way independent observers would.
    pub fn sample(seed: u64, oracle: Address, key: &CorrelationKey) -> FlightStatus {
        let mut hasher = Keccak256::new();
        hasher.update(seed.to_be_bytes());
        hasher.update(oracle.as_slice());
        hasher.update(key.airline.as_slice());
        hasher.update(key.flight.as_bytes());
        hasher.update(key.timestamp.to_be_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        let mut rng = ChaCha8Rng::seed_from_u64(u64::from_be_bytes(
            digest[..8].try_into().expect("digest is 32 bytes"),
        ));
        FlightStatus::ALL[rng.gen_range(0..FlightStatus::ALL.len())]
    }
}

impl Display for FlightStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlightStatus::Unknown => "unknown",
            FlightStatus::OnTime => "on time",
            FlightStatus::LateAirline => "late (airline)",
            FlightStatus::LateWeather => "late (weather)",
            FlightStatus::LateTechnical => "late (technical)",
            FlightStatus::LateOther => "late (other)",
        };
        f.write_str(name)
    }
}
