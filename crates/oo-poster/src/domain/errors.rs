//! # Poster Errors
//!
//! Error taxonomy for the posting pipeline. Per-payload errors
//! (`PayloadError`) reject a single payload and never abort a batch;
//! `SubmissionError` applies to the whole submitted transaction.

use super::entities::Hash;
use thiserror::Error;

/// Malformed message body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// ABI layout did not match the expected schema
    #[error("Malformed ABI encoding: {0}")]
    Abi(String),

    /// Message kind tag is not known
    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    /// Key and value arrays differ in length
    #[error("Key/value count mismatch: {keys} keys, {values} values")]
    LengthMismatch { keys: usize, values: usize },

    /// Integer field does not fit in 64 bits
    #[error("Integer field exceeds 64 bits")]
    ValueOverflow,

    /// Message carries no observations
    #[error("Message carries no observations")]
    Empty,

    /// Observation with an empty key
    #[error("Observation key is empty")]
    EmptyKey,

    /// Observations in one message must share a timestamp
    #[error("Observations carry different timestamps")]
    MixedTimestamps,

    /// Observations in one message must share a value kind
    #[error("Observations carry different value kinds")]
    MixedValueKinds,
}

/// Errors that can occur during signature verification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Signature is not 65 bytes
    #[error("Invalid signature length: {0} bytes")]
    InvalidLength(usize),

    /// The signature format is invalid (r or s out of range)
    #[error("Invalid signature format")]
    InvalidFormat,

    /// Signature has high S value (EIP-2 malleability protection)
    #[error("Malleable signature (high S value)")]
    MalleableSignature,

    /// Invalid recovery ID (v must be 0, 1, 27, or 28)
    #[error("Invalid recovery ID: {0}")]
    InvalidRecoveryId(u8),

    /// Failed to recover public key from signature
    #[error("Failed to recover public key")]
    RecoveryFailed,

    /// Recovered signer is not a trusted attestor. Carries no address: a
    /// tampered message recovers an arbitrary one.
    #[error("Signer is not a trusted attestor")]
    UnknownSigner,
}

/// Reasons a single payload is dropped from a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// Message body could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] CodecError),

    /// No identity could be proven from the signature
    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),
}

/// Failures of the write transaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    /// The call reverted or ran out of gas. Retrying the same content fails again.
    #[error("Submission rejected: {reason}")]
    Rejected {
        /// Revert reason reported by the ledger
        reason: String,
        /// Hash, when the transaction was mined before reverting
        tx_hash: Option<Hash>,
    },

    /// No confirmation within the wait window. The outcome is unknown.
    #[error("Submission timed out after {waited_ms}ms")]
    TimedOut {
        /// Hash of the broadcast transaction
        tx_hash: Hash,
        /// Time spent waiting
        waited_ms: u64,
    },

    /// The ledger client failed before the transaction was broadcast
    #[error("Ledger transport error: {0}")]
    Transport(String),

    /// Call data could not be built
    #[error("Failed to encode write call: {0}")]
    Encoding(String),

    /// Nothing eligible to submit
    #[error("Empty submission")]
    EmptyBatch,

    /// Local waiting was abandoned; a broadcast transaction may still land
    #[error("Submission abandoned")]
    Abandoned,
}

impl SubmissionError {
    /// Whether the caller may retry with a fresh nonce/fee.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmissionError::TimedOut { .. }
                | SubmissionError::Transport(_)
                | SubmissionError::Abandoned
        )
    }

    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionError::Rejected { .. } => "rejected",
            SubmissionError::TimedOut { .. } => "timed_out",
            SubmissionError::Transport(_) => "transport",
            SubmissionError::Encoding(_) => "encoding",
            SubmissionError::EmptyBatch => "empty",
            SubmissionError::Abandoned => "abandoned",
        }
    }
}

/// Failures of aggregate recomputation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregationError {
    /// No non-expired records remain; the previous aggregate is kept
    #[error("Insufficient data for {key}: {discarded} record(s) expired")]
    InsufficientData {
        /// Series key
        key: String,
        /// Records dropped by the age filter
        discarded: usize,
    },

    /// Records for one key mix numeric and text values
    #[error("Mixed value kinds for {key}")]
    MixedValueKinds {
        /// Series key
        key: String,
    },

    /// Reading on-chain records failed
    #[error("Failed to read records: {0}")]
    Read(String),
}

/// Errors reported by the ledger ports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Execution reverted
    #[error("Execution reverted: {0}")]
    Reverted(String),

    /// Gas limit below what execution requires
    #[error("Out of gas: provided {provided}, required {required}")]
    OutOfGas { provided: u64, required: u64 },

    /// Connection or RPC failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Receipt requested for an unknown transaction
    #[error("Unknown transaction: {0:?}")]
    UnknownTransaction(Hash),
}

/// Invalid configuration or contract binding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Address string is not 20 hex-encoded bytes
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A parameter is out of range
    #[error("Invalid configuration parameter: {0}")]
    InvalidParameters(String),

    /// Configuration document could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Contract ABI could not be parsed
    #[error("Invalid contract ABI: {0}")]
    Abi(String),

    /// The configured method is absent from the ABI
    #[error("Method not found in ABI: {0}")]
    MethodNotFound(String),

    /// The configured method is view/pure
    #[error("Method {0} does not change state")]
    ReadOnlyMethod(String),

    /// The configured method has the wrong inputs
    #[error("Method {method} has unsupported inputs: {signature}")]
    MethodShape {
        /// Method name
        method: String,
        /// Actual input signature
        signature: String,
    },
}
