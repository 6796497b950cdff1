//! ABI bindings for the insurance application contract. The ABI is carried
//! in-tree as JSON and parsed once on first use.

use alloy::primitives::{Address, U256};
use ethabi::{Contract, Event, Function, Token};
use once_cell::sync::Lazy;

const ABI_JSON: &str = include_str!("flight_surety_app.json");

static APP: Lazy<Contract> =
    Lazy::new(|| serde_json::from_str(ABI_JSON).expect("contract ABI is valid JSON"));

pub static IS_OPERATIONAL: Lazy<Function> =
    Lazy::new(|| APP.function("isOperational").unwrap().clone());
pub static SET_OPERATING_STATUS: Lazy<Function> =
    Lazy::new(|| APP.function("setOperatingStatus").unwrap().clone());
pub static IS_AIRLINE: Lazy<Function> = Lazy::new(|| APP.function("isAirline").unwrap().clone());
pub static REGISTER_AIRLINE: Lazy<Function> =
    Lazy::new(|| APP.function("registerAirline").unwrap().clone());
pub static FUND: Lazy<Function> = Lazy::new(|| APP.function("fund").unwrap().clone());
pub static REGISTER_ORACLE: Lazy<Function> =
    Lazy::new(|| APP.function("registerOracle").unwrap().clone());
pub static GET_MY_INDEXES: Lazy<Function> =
    Lazy::new(|| APP.function("getMyIndexes").unwrap().clone());
pub static FETCH_FLIGHT_STATUS: Lazy<Function> =
    Lazy::new(|| APP.function("fetchFlightStatus").unwrap().clone());
pub static SUBMIT_ORACLE_RESPONSE: Lazy<Function> =
    Lazy::new(|| APP.function("submitOracleResponse").unwrap().clone());
pub static BUY: Lazy<Function> = Lazy::new(|| APP.function("buy").unwrap().clone());
pub static CREDIT_OF: Lazy<Function> = Lazy::new(|| APP.function("creditOf").unwrap().clone());
pub static PAY: Lazy<Function> = Lazy::new(|| APP.function("pay").unwrap().clone());

pub static ORACLE_REQUEST: Lazy<Event> =
    Lazy::new(|| APP.event("OracleRequest").unwrap().clone());
pub static FLIGHT_STATUS_INFO: Lazy<Event> =
    Lazy::new(|| APP.event("FlightStatusInfo").unwrap().clone());

// `ethabi` speaks parity's primitive types while the rest of the crate uses
// alloy's. The conversions below keep that seam in one place.

pub fn abi_address(address: Address) -> ethabi::Address {
    ethabi::Address::from_slice(address.as_slice())
}

pub fn address_from_abi(address: ethabi::Address) -> Address {
    Address::from_slice(address.as_bytes())
}

pub fn abi_u256(value: U256) -> ethabi::Uint {
    ethabi::Uint::from_big_endian(&value.to_be_bytes::<32>())
}

pub fn u256_from_abi(value: ethabi::Uint) -> U256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    U256::from_be_bytes(buf)
}

pub fn abi_u64(value: u64) -> Token {
    Token::Uint(ethabi::Uint::from(value))
}

pub fn abi_u8(value: u8) -> Token {
    Token::Uint(ethabi::Uint::from(value))
}
