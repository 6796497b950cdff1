/// An error surfaced by a contract read or write.
///
/// Reverts are never retried; the classified reason goes straight back to
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("execution reverted: {reason}")]
    Reverted { reason: String },
    #[error("insufficient funds to cover the transaction value")]
    InsufficientFunds,
    #[error("contract is currently not operational")]
    NotOperational,
    #[error("transport error: {0}")]
    Transport(String),
}

impl ChainError {
    pub fn reverted(reason: impl Into<String>) -> ChainError {
        ChainError::Reverted {
            reason: reason.into(),
        }
    }

    /// Classifies a revert reason string into the taxonomy above. The
    /// operational gate is the only revert promoted to its own variant;
    /// everything else keeps its reason verbatim.
    pub fn from_revert_reason(reason: &str) -> ChainError {
        let lower = reason.to_lowercase();
        if lower.contains("not operational") {
            ChainError::NotOperational
        } else if lower.contains("insufficient funds") {
            ChainError::InsufficientFunds
        } else {
            ChainError::reverted(reason)
        }
    }
}

/// An error from the contract event stream. Unlike [`ChainError`], these are
/// retried (with backoff) by the request listener, invisibly to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("event stream ended")]
    StreamEnded,
    #[error("event stream lagged, {0} events dropped")]
    Lagged(u64),
    #[error("subscription transport error: {0}")]
    Transport(String),
}

/// Terminal outcome of a client-facing flight-status query. Every query
/// resolves with exactly one of a success payload or one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("no flight status was finalized within the response window")]
    Timeout,
    #[error("query was cancelled before a status arrived")]
    Cancelled,
}

/// Per-identity outcome of a failed oracle registration. Recorded and
/// reported; never aborts the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("oracle is already registered")]
    Duplicate,
    #[error("registration fee was not accepted")]
    InsufficientFee,
    #[error(transparent)]
    Chain(ChainError),
}

impl From<ChainError> for RegistrationError {
    fn from(error: ChainError) -> RegistrationError {
        if let ChainError::Reverted { reason } = &error {
            let lower = reason.to_lowercase();
            if lower.contains("already registered") {
                return RegistrationError::Duplicate;
            }
            if lower.contains("fee") {
                return RegistrationError::InsufficientFee;
            }
        }
        RegistrationError::Chain(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_reasons_are_classified() {
        assert_eq!(
            ChainError::from_revert_reason("Contract is currently not operational"),
            ChainError::NotOperational
        );
        assert_eq!(
            ChainError::from_revert_reason("insufficient funds for gas * price + value"),
            ChainError::InsufficientFunds
        );
        assert_eq!(
            ChainError::from_revert_reason("Caller is not the contract owner"),
            ChainError::reverted("Caller is not the contract owner")
        );
    }

    #[test]
    fn registration_failures_are_classified() {
        assert_eq!(
            RegistrationError::from(ChainError::reverted("Oracle is already registered")),
            RegistrationError::Duplicate
        );
        assert_eq!(
            RegistrationError::from(ChainError::reverted("Registration fee is required")),
            RegistrationError::InsufficientFee
        );
        assert!(matches!(
            RegistrationError::from(ChainError::Transport("ws closed".into())),
            RegistrationError::Chain(_)
        ));
    }
}
