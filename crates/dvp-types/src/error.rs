//! Error types for DvP settlement.
//!
//! All errors use the `DVP_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (malformed or out-of-range input)
//! - 2xx: Authorization errors (caller lacks role or party membership)
//! - 3xx: State errors (operation invalid for the trade's current state)
//! - 4xx: Attestation errors (mismatch, expiry, signature, replay)
//! - 5xx: External service errors (registrar)
//! - 6xx: Handler errors (settlement worker)
//! - 9xx: General / internal errors
//!
//! Every registry operation that returns an error has made **no** state change.

use thiserror::Error;

use crate::{Address, Digest, Role, TradeId, TradeState};

/// The taxonomy each [`DvpError`] falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    /// Attestation digest already consumed.
    Replay,
    ExternalService,
    TransientHandler,
    Internal,
}

/// Why signer recovery failed. Always a verification failure, never a fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature must be 65 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid recovery id {0}")]
    InvalidRecoveryId(u8),

    #[error("signature scalar out of range")]
    InvalidScalar,

    #[error("signature s-value is in the upper half of the curve order")]
    MalleableSignature,

    #[error("public key recovery failed")]
    RecoveryFailed,
}

/// Central error enum for all DvP operations.
#[derive(Debug, Error)]
pub enum DvpError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// Malformed or out-of-range input.
    #[error("DVP_ERR_100: Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// `qty` or `amount` was zero.
    #[error("DVP_ERR_101: {field} must be greater than zero")]
    NonPositive { field: &'static str },

    /// The proposed deadline is not strictly in the future.
    #[error("DVP_ERR_102: Deadline {deadline} is not after current time {now}")]
    DeadlineNotInFuture { deadline: u64, now: u64 },

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// Caller is neither the seller nor the buyer of the trade.
    #[error("DVP_ERR_200: {caller} is not a party to this trade")]
    NotParty { caller: Address },

    /// Caller (or recovered signer) lacks the required role.
    #[error("DVP_ERR_201: {account} does not hold role {role}")]
    MissingRole { role: Role, account: Address },

    /// Caller is not the administrative authority.
    #[error("DVP_ERR_202: {caller} is not the registry admin")]
    NotAdmin { caller: Address },

    // =================================================================
    // State Errors (3xx)
    // =================================================================
    /// No trade with this id.
    #[error("DVP_ERR_300: Trade not found: {0}")]
    TradeNotFound(TradeId),

    /// The trade is not in a state that allows this operation.
    #[error("DVP_ERR_301: Trade {trade_id} is {actual}, operation requires {expected}")]
    InvalidState {
        trade_id: TradeId,
        expected: &'static str,
        actual: TradeState,
    },

    /// The trade's deadline has passed.
    #[error("DVP_ERR_302: Trade {trade_id} deadline {deadline} has passed")]
    DeadlinePassed { trade_id: TradeId, deadline: u64 },

    /// `expire` was called before the deadline.
    #[error("DVP_ERR_303: Trade {trade_id} deadline {deadline} not yet reached")]
    DeadlineNotReached { trade_id: TradeId, deadline: u64 },

    /// Defensive: a trade id derived twice (should be impossible).
    #[error("DVP_ERR_304: Trade already exists: {0}")]
    DuplicateTrade(TradeId),

    // =================================================================
    // Attestation Errors (4xx)
    // =================================================================
    /// An attestation field does not match the trade or its counterpart.
    #[error("DVP_ERR_400: Attestation mismatch: {reason}")]
    AttestationMismatch { reason: String },

    /// An attestation's expiry is before the current time.
    #[error("DVP_ERR_401: {party} attestation expired at {expiry}")]
    AttestationExpired { party: &'static str, expiry: u64 },

    /// Signer recovery failed.
    #[error("DVP_ERR_402: Invalid {party} signature: {source}")]
    InvalidSignature {
        party: &'static str,
        #[source]
        source: SignatureError,
    },

    /// The attestation digest was already consumed (replay attack prevention).
    #[error("DVP_ERR_403: Attestation replay detected: {0}")]
    Replay(Digest),

    // =================================================================
    // External Service Errors (5xx)
    // =================================================================
    /// The registrar failed, timed out or returned an unusable response.
    #[error("DVP_ERR_500: Registrar failure: {reason}")]
    ExternalService { reason: String },

    // =================================================================
    // Handler Errors (6xx)
    // =================================================================
    /// Unexpected failure while processing one event.
    #[error("DVP_ERR_600: Handler failed for trade {trade_id}: {reason}")]
    HandlerFailed { trade_id: TradeId, reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("DVP_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("DVP_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (missing or malformed setting).
    #[error("DVP_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl DvpError {
    /// Which class of failure this is.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. }
            | Self::NonPositive { .. }
            | Self::DeadlineNotInFuture { .. }
            | Self::AttestationMismatch { .. }
            | Self::AttestationExpired { .. }
            | Self::InvalidSignature { .. } => ErrorKind::Validation,
            Self::NotParty { .. } | Self::MissingRole { .. } | Self::NotAdmin { .. } => {
                ErrorKind::Authorization
            }
            Self::TradeNotFound(_)
            | Self::InvalidState { .. }
            | Self::DeadlinePassed { .. }
            | Self::DeadlineNotReached { .. }
            | Self::DuplicateTrade(_) => ErrorKind::State,
            Self::Replay(_) => ErrorKind::Replay,
            Self::ExternalService { .. } => ErrorKind::ExternalService,
            Self::HandlerFailed { .. } => ErrorKind::TransientHandler,
            Self::Internal(_) | Self::Serialization(_) | Self::Configuration(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, DvpError>;

impl From<serde_json::Error> for DvpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
