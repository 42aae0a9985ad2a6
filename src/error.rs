//! Closed set of domain errors surfaced across the protocol engine (spec.md §7).
//!
//! `BadBehavior` is expected traffic: during verification it simply means "this
//! committee member votes reject" and must never be treated as a fatal condition by
//! callers. Everything else here indicates either a malformed construction or a
//! replication-breaking event.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LorError {
    #[error("coin status is not Run")]
    InvalidStatus,
    #[error("coin type is out of range")]
    InvalidType,
    #[error("trader is not known locally")]
    UnknownTrader,
    #[error("insufficient account balance")]
    InsufficientAccount,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("coin is already bound into a ring")]
    AlreadyInRing,
    #[error("record already exists")]
    Duplicate,
    #[error("recomputed id does not match")]
    InvalidId,
    #[error("recomputed weight does not match")]
    InvalidWeight,
    #[error("investor does not match position 0")]
    InvalidInvestor,
    #[error("recomputed coin selection does not match")]
    InvalidCoinSelection,
    #[error("recomputed fractal id does not match")]
    InvalidFractalId,
    #[error("recomputed fractal selection does not match")]
    InvalidFractalSelection,
    #[error("recomputed verification committee does not match")]
    InvalidCommittee,
    #[error("coin not found locally")]
    CoinNotFound,
    #[error("coin is not running")]
    CoinNotRunning,
    #[error("cooperation ring not found locally")]
    CooperationNotFound,
    #[error("coin type does not match its position")]
    InvalidCoinType,
    #[error("bad behavior")]
    BadBehavior,
}

impl LorError {
    /// Verification-phase construction errors that a Normal voter treats as an honest
    /// reject rather than propagating, and that Bad/Random voters may opportunistically
    /// falsify into acceptance (spec.md §7).
    pub fn is_suppressible_during_verification(&self) -> bool {
        matches!(
            self,
            LorError::InvalidFractalSelection | LorError::InvalidCommittee | LorError::InvalidCoinSelection
        )
    }
}
