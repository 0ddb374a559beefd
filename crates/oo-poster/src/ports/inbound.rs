//! # Inbound Ports (Driving Ports / API)
//!
//! The API callers use to hand signed payloads to the poster.

use crate::domain::entities::{AggregateEntry, Attestor, Payload, TransactionOutcome};
use crate::domain::errors::{AggregationError, SubmissionError};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// What happened to one payload of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadOutcome {
    /// Carried by the write transaction
    Eligible {
        /// Recovered signer
        attestor: Attestor,
    },
    /// Nothing newer than the stored records; not submitted
    Stale {
        /// Recovered signer
        attestor: Attestor,
    },
    /// The message body could not be decoded
    DecodeFailed(String),
    /// No signer could be recovered
    InvalidSignature(String),
}

impl PayloadOutcome {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            PayloadOutcome::Eligible { .. } => "eligible",
            PayloadOutcome::Stale { .. } => "stale",
            PayloadOutcome::DecodeFailed(_) => "decode_failed",
            PayloadOutcome::InvalidSignature(_) => "invalid_signature",
        }
    }
}

/// Report of one `submit_batch` call.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// One outcome per input payload, in input order.
    pub outcomes: Vec<PayloadOutcome>,
    /// Write transaction result; `None` when nothing was eligible.
    pub submission: Option<Result<TransactionOutcome, SubmissionError>>,
    /// Aggregate recomputation per confirmed key.
    pub aggregates: BTreeMap<String, Result<AggregateEntry, AggregationError>>,
}

impl BatchReport {
    /// Number of payloads carried by the transaction.
    pub fn eligible_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PayloadOutcome::Eligible { .. }))
            .count()
    }

    /// Number of payloads skipped as stale.
    pub fn stale_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PayloadOutcome::Stale { .. }))
            .count()
    }
}

/// Primary poster API.
#[async_trait]
pub trait OraclePosterApi: Send + Sync {
    /// Verify, gate and submit a batch, then refresh the aggregates of the
    /// confirmed keys. Per-payload failures never abort the batch.
    async fn submit_batch(&self, payloads: Vec<Payload>) -> BatchReport;

    /// Recompute one key from current on-chain records without submitting.
    ///
    /// Returns the entry the cache holds afterwards, which is the newer
    /// cached one when this computation lost to it. Unreadable attestors are
    /// skipped; `Read` only when none could be read.
    async fn refresh_aggregate(&self, key: &str) -> Result<AggregateEntry, AggregationError>;

    /// Latest cached aggregate for `key`.
    fn aggregate(&self, key: &str) -> Option<AggregateEntry>;
}
