//! [`Gateway`] implementation against a live chain: an alloy websocket
//! provider carrying one wallet with every oracle signer registered, so the
//! `from` address of each write selects the signing account.

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::{Filter, Log, TransactionRequest},
    signers::local::PrivateKeySigner,
    sol_types::decode_revert_reason,
    transports::TransportError,
};
use async_trait::async_trait;
use ethabi::{Function, Token};
use futures::{future, stream, StreamExt};
use tracing::{info, warn};

use crate::{
    contracts,
    error::{ChainError, SubscriptionError},
    event::{ChainEvent, EventKind, FlightStatus, OracleRequest, StatusUpdate},
    gateway::{EventStream, Gateway},
};

pub struct RpcGateway {
    provider: DynProvider,
    app_address: Address,
}

impl RpcGateway {
    /// Connects over websocket with every signing account registered in one
    /// wallet. The first signer is the wallet's default.
    pub async fn connect(
        rpc_url: &str,
        app_address: Address,
        signers: Vec<PrivateKeySigner>,
    ) -> Result<RpcGateway, ChainError> {
        let mut signers = signers.into_iter();
        let first = signers
            .next()
            .ok_or_else(|| ChainError::Transport("at least one signing account required".into()))?;
        let mut wallet = EthereumWallet::new(first);
        for signer in signers {
            wallet.register_signer(signer);
        }
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .on_ws(WsConnect::new(rpc_url))
            .await
            .map_err(|error| ChainError::Transport(error.to_string()))?
            .erased();
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(chain_error)?;
        info!(rpc_url, chain_id, %app_address, "connected to chain");
        Ok(RpcGateway {
            provider,
            app_address,
        })
    }

    fn request(&self, data: Vec<u8>, sender: Address, value: U256) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(sender)
            .with_to(self.app_address)
            .with_input(data)
            .with_value(value)
    }

    async fn read(
        &self,
        function: &Function,
        args: &[Token],
        sender: Address,
    ) -> Result<Vec<Token>, ChainError> {
        let data = function.encode_input(args).map_err(abi_error)?;
        let output = self
            .provider
            .call(self.request(data, sender, U256::ZERO))
            .await
            .map_err(chain_error)?;
        function.decode_output(&output).map_err(abi_error)
    }

    async fn write(
        &self,
        function: &Function,
        args: &[Token],
        sender: Address,
        value: U256,
    ) -> Result<(), ChainError> {
        let data = function.encode_input(args).map_err(abi_error)?;
        let tx = self.request(data, sender, value);
        // Simulate first: a revert surfaces its reason here, where it can
        // still be decoded, instead of as an opaque failed receipt.
        self.provider.call(tx.clone()).await.map_err(chain_error)?;
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(chain_error)?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|error| ChainError::Transport(error.to_string()))?;
        if receipt.status() {
            Ok(())
        } else {
            Err(ChainError::reverted("transaction reverted on chain"))
        }
    }
}

#[async_trait]
impl Gateway for RpcGateway {
    async fn is_operational(&self) -> Result<bool, ChainError> {
        let tokens = self
            .read(&contracts::IS_OPERATIONAL, &[], Address::ZERO)
            .await?;
        expect_bool(tokens)
    }

    async fn is_airline(&self, airline: Address) -> Result<bool, ChainError> {
        let tokens = self
            .read(
                &contracts::IS_AIRLINE,
                &[Token::Address(contracts::abi_address(airline))],
                Address::ZERO,
            )
            .await?;
        expect_bool(tokens)
    }

    async fn credit_of(&self, passenger: Address) -> Result<U256, ChainError> {
        let tokens = self
            .read(
                &contracts::CREDIT_OF,
                &[Token::Address(contracts::abi_address(passenger))],
                Address::ZERO,
            )
            .await?;
        expect_u256(tokens)
    }

    async fn my_indexes(&self, oracle: Address) -> Result<[u8; 3], ChainError> {
        let tokens = self.read(&contracts::GET_MY_INDEXES, &[], oracle).await?;
        expect_indexes(tokens)
    }

    async fn register_airline(
        &self,
        candidate: Address,
        sender: Address,
    ) -> Result<(), ChainError> {
        self.write(
            &contracts::REGISTER_AIRLINE,
            &[Token::Address(contracts::abi_address(candidate))],
            sender,
            U256::ZERO,
        )
        .await
    }

    async fn fund(
        &self,
        airline: Address,
        sender: Address,
        value: U256,
    ) -> Result<(), ChainError> {
        self.write(
            &contracts::FUND,
            &[Token::Address(contracts::abi_address(airline))],
            sender,
            value,
        )
        .await
    }

    async fn register_oracle(&self, sender: Address, value: U256) -> Result<(), ChainError> {
        self.write(&contracts::REGISTER_ORACLE, &[], sender, value)
            .await
    }

    async fn fetch_flight_status(
        &self,
        airline: Address,
        flight: &str,
        timestamp: u64,
        sender: Address,
    ) -> Result<(), ChainError> {
        self.write(
            &contracts::FETCH_FLIGHT_STATUS,
            &[
                Token::Address(contracts::abi_address(airline)),
                Token::String(flight.to_owned()),
                contracts::abi_u64(timestamp),
            ],
            sender,
            U256::ZERO,
        )
        .await
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
        self.write(
            &contracts::SUBMIT_ORACLE_RESPONSE,
            &[
                contracts::abi_u8(index),
                Token::Address(contracts::abi_address(airline)),
                Token::String(flight.to_owned()),
                contracts::abi_u64(timestamp),
                contracts::abi_u8(status.code()),
            ],
            sender,
            U256::ZERO,
        )
        .await
    }

    async fn set_operating_status(
        &self,
        operational: bool,
        sender: Address,
    ) -> Result<(), ChainError> {
        self.write(
            &contracts::SET_OPERATING_STATUS,
            &[Token::Bool(operational)],
            sender,
            U256::ZERO,
        )
        .await
    }

    async fn buy(
        &self,
        airline: Address,
        flight: &str,
        timestamp: u64,
        sender: Address,
        value: U256,
    ) -> Result<(), ChainError> {
        self.write(
            &contracts::BUY,
            &[
                Token::Address(contracts::abi_address(airline)),
                Token::String(flight.to_owned()),
                contracts::abi_u64(timestamp),
            ],
            sender,
            value,
        )
        .await
    }

    async fn pay(&self, sender: Address) -> Result<(), ChainError> {
        self.write(&contracts::PAY, &[], sender, U256::ZERO).await
    }

    async fn subscribe(&self, from_block: u64) -> Result<EventStream, SubscriptionError> {
        let filter = Filter::new().address(self.app_address).from_block(from_block);
        let past = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(subscription_error)?;
        let live = self
            .provider
            .subscribe_logs(&filter)
            .await
            .map_err(subscription_error)?
            .into_stream();
        let replay: Vec<ChainEvent> = past.into_iter().filter_map(decode_log).collect();
        let cutoff = replay.last().map(|event| event.block).unwrap_or(0);
        // Historic fetch and live subscription overlap around the current
        // head; the cutoff drops the doubled deliveries.
        let live = live.filter_map(move |log| {
            future::ready(match decode_log(log) {
                Some(event) if event.block > cutoff => Some(Ok(event)),
                _ => None,
            })
        });
        Ok(stream::iter(replay.into_iter().map(Ok)).chain(live).boxed())
    }
}

fn chain_error(error: TransportError) -> ChainError {
    if let Some(payload) = error.as_error_resp() {
        if let Some(data) = payload.as_revert_data() {
            if let Some(reason) = decode_revert_reason(&data) {
                return ChainError::from_revert_reason(&reason);
            }
        }
        return ChainError::from_revert_reason(&payload.message);
    }
    ChainError::Transport(error.to_string())
}

fn subscription_error(error: TransportError) -> SubscriptionError {
    SubscriptionError::Transport(error.to_string())
}

fn abi_error(error: ethabi::Error) -> ChainError {
    ChainError::Transport(format!("abi: {error}"))
}

fn expect_bool(tokens: Vec<Token>) -> Result<bool, ChainError> {
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_bool)
        .ok_or_else(|| ChainError::Transport("malformed contract output".into()))
}

fn expect_u256(tokens: Vec<Token>) -> Result<U256, ChainError> {
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .map(contracts::u256_from_abi)
        .ok_or_else(|| ChainError::Transport("malformed contract output".into()))
}

fn expect_indexes(tokens: Vec<Token>) -> Result<[u8; 3], ChainError> {
    let malformed = || ChainError::Transport("malformed contract output".into());
    let values = tokens
        .into_iter()
        .next()
        .and_then(Token::into_fixed_array)
        .ok_or_else(malformed)?;
    let indexes: Vec<u8> = values
        .into_iter()
        .filter_map(Token::into_uint)
        .map(|value| value.low_u64() as u8)
        .collect();
    indexes.try_into().map_err(|_| malformed())
}

fn decode_log(log: Log) -> Option<ChainEvent> {
    let block = log.block_number?;
    let topics: Vec<ethabi::Hash> = log
        .inner
        .data
        .topics()
        .iter()
        .map(|topic| ethabi::Hash::from_slice(topic.as_slice()))
        .collect();
    let signature = *topics.first()?;
    let raw = ethabi::RawLog {
        topics,
        data: log.inner.data.data.to_vec(),
    };
    let kind = if signature == contracts::ORACLE_REQUEST.signature() {
        let parsed = contracts::ORACLE_REQUEST.parse_log(raw).ok()?;
        let mut values = parsed.params.into_iter().map(|param| param.value);
        EventKind::Request(OracleRequest {
            index: values.next()?.into_uint()?.low_u64() as u8,
            airline: contracts::address_from_abi(values.next()?.into_address()?),
            flight: values.next()?.into_string()?,
            timestamp: values.next()?.into_uint()?.low_u64(),
        })
    } else if signature == contracts::FLIGHT_STATUS_INFO.signature() {
        let parsed = contracts::FLIGHT_STATUS_INFO.parse_log(raw).ok()?;
        let mut values = parsed.params.into_iter().map(|param| param.value);
        let airline = contracts::address_from_abi(values.next()?.into_address()?);
        let flight = values.next()?.into_string()?;
        let timestamp = values.next()?.into_uint()?.low_u64();
        let code = values.next()?.into_uint()?.low_u64() as u8;
        let Some(status) = FlightStatus::from_code(code) else {
            warn!(code, "finalization event carried an unknown status code");
            return None;
        };
        EventKind::Status(StatusUpdate {
            airline,
            flight,
            timestamp,
            status,
        })
    } else {
        return None;
    };
    Some(ChainEvent { block, kind })
}
