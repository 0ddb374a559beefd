//! # Service Layer
//!
//! Wires the domain rules to the ledger ports.

pub mod poster;
pub mod writer;

pub use poster::OraclePosterService;
pub use writer::{ContractWriter, SubmissionHandle, SubmissionState};
