use std::str::FromStr;

use alloy::{
    primitives::{Address, B256, U256},
    signers::local::PrivateKeySigner,
};
use anyhow::{Context, Result};
use sha3::{Digest, Keccak256};
use tracing::{info, warn};

use crate::{cfg::OracleConfig, error::RegistrationError, gateway::Gateway};

/// Where an oracle identity is in its registration lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Pending,
    Active { indexes: [u8; 3] },
    Failed { error: RegistrationError },
}

/// One account in the oracle pool, created at startup and held for the life
/// of the process.
#[derive(Debug, Clone)]
pub struct OracleIdentity {
    pub signer: PrivateKeySigner,
    pub registration: Registration,
}

impl OracleIdentity {
    pub fn new(signer: PrivateKeySigner) -> OracleIdentity {
        OracleIdentity {
            signer,
            registration: Registration::Pending,
        }
    }

    pub fn from_hex(secret_key: &str) -> Result<OracleIdentity> {
        let signer = PrivateKeySigner::from_str(secret_key.trim())
            .context("invalid oracle secret key")?;
        Ok(OracleIdentity::new(signer))
    }

    /// Derives a reproducible identity from a seed, a role tag and an index.
    /// Used for the simulated ledger and for demo runs where real keys do
    /// not matter.
    pub fn derived(seed: u64, tag: &str, index: u32) -> OracleIdentity {
        let mut counter = 0u32;
        loop {
            let mut hasher = Keccak256::new();
            hasher.update(seed.to_be_bytes());
            hasher.update(tag.as_bytes());
            hasher.update(index.to_be_bytes());
            hasher.update(counter.to_be_bytes());
            let digest: [u8; 32] = hasher.finalize().into();
            // A digest is almost never an invalid scalar, but the key
            // derivation must not be able to panic.
            if let Ok(signer) = PrivateKeySigner::from_bytes(&B256::from(digest)) {
                return OracleIdentity::new(signer);
            }
            counter += 1;
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

/// Owns the oracle identity set and drives its registration with the
/// contract.
#[derive(Debug)]
pub struct OracleRegistry {
    identities: Vec<OracleIdentity>,
}

impl OracleRegistry {
    pub fn new(identities: Vec<OracleIdentity>) -> OracleRegistry {
        OracleRegistry { identities }
    }

    /// Builds the pool from configuration: explicit secret keys when given,
    /// otherwise `pool_size` derived identities.
    pub fn provision(config: &OracleConfig) -> Result<OracleRegistry> {
        let identities = if config.secret_keys.is_empty() {
            (0..config.pool_size)
                .map(|i| OracleIdentity::derived(config.seed, "oracle", i))
                .collect()
        } else {
            config
                .secret_keys
                .iter()
                .map(|key| OracleIdentity::from_hex(key))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(OracleRegistry::new(identities))
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn identities(&self) -> &[OracleIdentity] {
        &self.identities
    }

    pub fn signers(&self) -> impl Iterator<Item = &PrivateKeySigner> {
        self.identities.iter().map(|identity| &identity.signer)
    }

    /// The registered oracles and their assigned indexes.
    pub fn active(&self) -> impl Iterator<Item = (Address, [u8; 3])> + '_ {
        self.identities.iter().filter_map(|identity| {
            if let Registration::Active { indexes } = identity.registration {
                Some((identity.address(), indexes))
            } else {
                None
            }
        })
    }

    pub fn indexes_for(&self, oracle: Address) -> Option<[u8; 3]> {
        self.active()
            .find(|(address, _)| *address == oracle)
            .map(|(_, indexes)| indexes)
    }

    /// Registers every identity in the pool, one write each with the
    /// participation fee attached. Failures are recorded per identity and
    /// never abort the rest of the batch; identities that are already
    /// active are skipped. Returns exactly one outcome per identity.
    pub async fn register_all(
        &mut self,
        gateway: &dyn Gateway,
        fee: U256,
    ) -> Vec<(Address, Result<[u8; 3], RegistrationError>)> {
        let mut outcomes = Vec::with_capacity(self.identities.len());
        for identity in &mut self.identities {
            let address = identity.address();
            if let Registration::Active { indexes } = identity.registration {
                outcomes.push((address, Ok(indexes)));
                continue;
            }
            let outcome = match gateway.register_oracle(address, fee).await {
                Ok(()) => match gateway.my_indexes(address).await {
                    Ok(indexes) => Ok(indexes),
                    Err(error) => Err(RegistrationError::Chain(error)),
                },
                Err(error) => Err(RegistrationError::from(error)),
            };
            match &outcome {
                Ok(indexes) => {
                    info!(%address, ?indexes, "oracle registered");
                    identity.registration = Registration::Active { indexes: *indexes };
                }
                Err(error) => {
                    warn!(%address, %error, "oracle registration failed");
                    identity.registration = Registration::Failed {
                        error: error.clone(),
                    };
                }
            }
            outcomes.push((address, outcome));
        }
        outcomes
    }
}
