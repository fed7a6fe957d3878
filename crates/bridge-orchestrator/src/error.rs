//! Bridge Orchestrator Errors

use bridge_types::{MessageId, TxHash};
use pool_ledger::PoolError;
use thiserror::Error;
use xdomain_watcher::{ClientError, WatchError, WatchPhase};

/// Errors surfaced by bridge operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The origin pool reverted the operation; nothing changed
    #[error("Pool ledger rejected the operation: {0}")]
    Ledger(PoolError),

    /// The origin ledger refused the transaction or the caller could not pay
    #[error("Ledger submission failed: {0}")]
    LedgerSubmissionFailed(String),

    /// A local operation was submitted but not seen included in time
    #[error("Transaction {0} was not included in time")]
    InclusionTimeout(TxHash),

    /// Settlement was not observed before the deadline
    ///
    /// In phase `Submitted` the origin was never seen included, the
    /// cross-domain form of `InclusionTimeout`. In any later phase the
    /// origin has committed.
    #[error("Settlement of {tx_hash} timed out in phase {phase}")]
    WatchTimeout { tx_hash: TxHash, phase: WatchPhase },

    /// Origin committed; the relayed message reverted on the destination
    #[error("Message {message_id} failed on the destination: {error}")]
    DestinationFailed {
        message_id: MessageId,
        error: PoolError,
    },

    /// A receipt carried a code no pool error maps to
    #[error("Unknown pool error code {0}")]
    UnknownErrorCode(u32),

    #[error("Watch failed: {0}")]
    Watch(WatchError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Error for an origin receipt that reverted with `code`
    ///
    /// Token-level rejection means the caller could not fund the
    /// transaction, which is reported as a failed submission.
    pub fn from_origin_code(code: u32) -> Self {
        match PoolError::from_code(code) {
            Some(PoolError::InsufficientBalance) => {
                BridgeError::LedgerSubmissionFailed(PoolError::InsufficientBalance.to_string())
            }
            Some(error) => BridgeError::Ledger(error),
            None => BridgeError::UnknownErrorCode(code),
        }
    }

    /// Error for a destination receipt that reverted with `code`
    pub fn from_destination_code(message_id: MessageId, code: u32) -> Self {
        match PoolError::from_code(code) {
            Some(error) => BridgeError::DestinationFailed { message_id, error },
            None => BridgeError::UnknownErrorCode(code),
        }
    }

    /// Failure caused by time running out rather than by a rejection
    ///
    /// Callers must not resubmit the origin operation on these.
    pub fn is_liveness_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::WatchTimeout { .. }
                | BridgeError::InclusionTimeout(_)
                | BridgeError::Client(ClientError::Unavailable(_))
        )
    }

    /// Whether the origin-chain effect is known to have happened
    pub fn origin_committed(&self) -> bool {
        match self {
            BridgeError::WatchTimeout { phase, .. } => *phase != WatchPhase::Submitted,
            BridgeError::DestinationFailed { .. } => true,
            _ => false,
        }
    }

    /// Pool error carried by this failure, on either chain
    pub fn pool_error(&self) -> Option<PoolError> {
        match self {
            BridgeError::Ledger(e) => Some(*e),
            BridgeError::DestinationFailed { error, .. } => Some(*error),
            _ => None,
        }
    }
}

impl From<WatchError> for BridgeError {
    fn from(err: WatchError) -> Self {
        match err {
            WatchError::WatchTimeout { tx_hash, phase } => BridgeError::WatchTimeout { tx_hash, phase },
            WatchError::OriginFailed { receipt } => match receipt.error_code() {
                Some(code) => BridgeError::from_origin_code(code),
                None => BridgeError::Watch(WatchError::OriginFailed { receipt }),
            },
            other => BridgeError::Watch(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_program::hash::Hash;

    #[test]
    fn test_origin_codes() {
        assert_eq!(
            BridgeError::from_origin_code(PoolError::InsufficientStake.code()),
            BridgeError::Ledger(PoolError::InsufficientStake)
        );
        assert!(matches!(
            BridgeError::from_origin_code(PoolError::InsufficientBalance.code()),
            BridgeError::LedgerSubmissionFailed(_)
        ));
        assert_eq!(BridgeError::from_origin_code(999), BridgeError::UnknownErrorCode(999));
    }

    #[test]
    fn test_timeout_is_liveness_and_committed() {
        let err = BridgeError::from(WatchError::WatchTimeout {
            tx_hash: Hash::new_unique(),
            phase: WatchPhase::MessagePending,
        });
        assert!(err.is_liveness_failure());
        assert!(err.origin_committed());

        let rejected = BridgeError::Ledger(PoolError::AlreadyRegistered);
        assert!(!rejected.is_liveness_failure());
        assert!(!rejected.origin_committed());
    }

    #[test]
    fn test_timeout_before_inclusion_is_not_committed() {
        let err = BridgeError::from(WatchError::WatchTimeout {
            tx_hash: Hash::new_unique(),
            phase: WatchPhase::Submitted,
        });
        assert!(err.is_liveness_failure());
        assert!(!err.origin_committed());

        let local = BridgeError::InclusionTimeout(Hash::new_unique());
        assert!(local.is_liveness_failure());
        assert!(!local.origin_committed());
    }

    #[test]
    fn test_destination_failure() {
        let id = MessageId([7; 32]);
        let err = BridgeError::from_destination_code(id, PoolError::InsufficientPoolLiquidity.code());
        assert_eq!(err.pool_error(), Some(PoolError::InsufficientPoolLiquidity));
        assert!(err.origin_committed());
        assert!(!err.is_liveness_failure());
    }
}
