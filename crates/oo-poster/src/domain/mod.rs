//! # Domain Layer
//!
//! Decoding, signer recovery, freshness and aggregation rules.
//! No I/O: everything here is deterministic given its inputs.

pub mod aggregation;
pub mod binding;
pub mod codec;
pub mod config;
pub mod entities;
pub mod errors;
pub mod freshness;
pub mod signature;

pub use aggregation::Aggregator;
pub use binding::{CallShape, ContractBinding, DecodedCall, OPEN_ORACLE_VIEW_ABI};
pub use codec::PayloadCodec;
pub use config::{PosterConfig, PosterConfigBuilder};
pub use freshness::{FreshnessGate, GateOutcome};
pub use signature::SignatureVerifier;
