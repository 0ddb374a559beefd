//! # Open Oracle Poster
//!
//! Posts attestor-signed observations to an Open Oracle view contract and
//! keeps a local cache of median aggregates.
//!
//! ## Architecture
//!
//! This crate follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): Codec, signature recovery, freshness
//!   gate, aggregation and contract binding. No I/O.
//! - **Ports Layer** (`ports/`): Inbound API and outbound ledger traits
//! - **Service Layer** (`service/`): Submission pipeline and contract writer
//! - **Adapters** (`adapters/`): In-memory ledger and clocks
//!
//! ## Flow
//!
//! 1. Recover each payload's signer and decode its observations
//! 2. Drop payloads that are not strictly newer than the stored record
//! 3. Submit the rest in one transaction and wait for the receipt
//! 4. Recompute the median for every key the contract wrote
//!
//! ## Security Notes
//!
//! - **Malleability (EIP-2)**: High-S signatures are rejected
//! - A payload's attestor is always the recovered signer, never a claim
//!   carried in the message

pub mod adapters;
pub mod cache;
pub mod domain;
pub mod ports;
pub mod service;

/// Seeded signers for tests and local runs.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export public API
pub use cache::AggregateCache;
pub use domain::aggregation::Aggregator;
pub use domain::binding::{ContractBinding, OPEN_ORACLE_VIEW_ABI};
pub use domain::codec::PayloadCodec;
pub use domain::config::{PosterConfig, PosterConfigBuilder};
pub use domain::entities::{
    AggregateEntry, Address, Attestor, Observation, ObservationValue, Payload, RecordKey,
    StoredRecord, TransactionOutcome, TxOptions, ValueKind, VerifiedPayload,
};
pub use domain::errors::{
    AggregationError, CodecError, ConfigError, LedgerError, PayloadError, SignatureError,
    SubmissionError,
};
pub use domain::freshness::FreshnessGate;
pub use domain::signature::{keccak256, SignatureVerifier};
pub use ports::inbound::{BatchReport, OraclePosterApi, PayloadOutcome};
pub use ports::outbound::{LedgerClient, OracleDataReader, TimeSource};
pub use service::{ContractWriter, OraclePosterService, SubmissionHandle, SubmissionState};
