//! # Contract Writer
//!
//! Sends one write transaction carrying every eligible payload and waits,
//! bounded by the confirmation timeout, for its receipt.
//!
//! ## Submission states
//!
//! ```text
//! Pending ──broadcast──→ Broadcast(tx) ──receipt──→ Confirmed
//!    │                        │
//!    └──────────failure───────┴──────────────────→ Failed
//! ```
//!
//! A timed out or abandoned submission may still land on-chain; only the
//! local wait stops.

use crate::domain::binding::ContractBinding;
use crate::domain::config::PosterConfig;
use crate::domain::entities::{
    hash_hex, Address, Hash, RecordKey, TransactionOutcome, TxOptions, TxReceipt, TxRequest,
    VerifiedPayload,
};
use crate::domain::errors::{LedgerError, SubmissionError};
use crate::ports::outbound::LedgerClient;
use oo_telemetry::{log_tx_event, HistogramTimer, SUBMISSIONS, SUBMISSION_DURATION};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Observable progress of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    /// Not yet broadcast
    Pending,
    /// Broadcast, waiting for a receipt
    Broadcast(Hash),
    /// Mined successfully
    Confirmed(TransactionOutcome),
    /// Rejected, timed out or never broadcast
    Failed(SubmissionError),
}

impl SubmissionState {
    /// Whether no further transition will happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Confirmed(_) | SubmissionState::Failed(_))
    }

    /// Transaction hash, once known.
    pub fn tx_hash(&self) -> Option<Hash> {
        match self {
            SubmissionState::Pending => None,
            SubmissionState::Broadcast(hash) => Some(*hash),
            SubmissionState::Confirmed(outcome) => Some(outcome.transaction_hash),
            SubmissionState::Failed(SubmissionError::TimedOut { tx_hash, .. }) => Some(*tx_hash),
            SubmissionState::Failed(SubmissionError::Rejected { tx_hash, .. }) => *tx_hash,
            SubmissionState::Failed(_) => None,
        }
    }
}

/// Handle to a submission running as its own task.
pub struct SubmissionHandle {
    state: watch::Receiver<SubmissionState>,
    task: JoinHandle<Result<TransactionOutcome, SubmissionError>>,
}

impl SubmissionHandle {
    /// Current state.
    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state.clone()
    }

    /// Wait for the final result.
    pub async fn wait(self) -> Result<TransactionOutcome, SubmissionError> {
        match self.task.await {
            Ok(result) => result,
            Err(_) => Err(SubmissionError::Abandoned),
        }
    }

    /// Stop waiting locally. A broadcast transaction is not recalled; its
    /// hash is returned so the caller can track it.
    pub fn abandon(self) -> Option<Hash> {
        self.task.abort();
        let hash = self.state.borrow().tx_hash();
        if let Some(hash) = hash {
            log_tx_event!(warn, "writer", "Submission abandoned after broadcast", hash_hex(&hash));
        }
        hash
    }
}

/// Submits eligible payloads through the bound write method.
pub struct ContractWriter<L: LedgerClient> {
    ledger: Arc<L>,
    binding: ContractBinding,
    write_event: String,
    timeout: Duration,
}

impl<L: LedgerClient> Clone for ContractWriter<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            binding: self.binding.clone(),
            write_event: self.write_event.clone(),
            timeout: self.timeout,
        }
    }
}

impl<L: LedgerClient> ContractWriter<L> {
    /// Create a writer.
    ///
    /// # Arguments
    /// * `write_event` - event whose `source`/`key` fields confirm a write
    /// * `timeout` - receipt wait window after broadcast
    pub fn new(
        ledger: Arc<L>,
        binding: ContractBinding,
        write_event: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            binding,
            write_event: write_event.into(),
            timeout,
        }
    }

    /// Writer using the event name and timeout from `config`.
    pub fn from_config(ledger: Arc<L>, binding: ContractBinding, config: &PosterConfig) -> Self {
        Self::new(
            ledger,
            binding,
            config.write_event.clone(),
            config.confirmation_timeout(),
        )
    }

    /// Bound write method.
    pub fn binding(&self) -> &ContractBinding {
        &self.binding
    }

    /// Submit `eligible` in one transaction and wait for the outcome.
    pub async fn submit(
        &self,
        eligible: &[VerifiedPayload],
        options: &TxOptions,
    ) -> Result<TransactionOutcome, SubmissionError> {
        let (state, _) = watch::channel(SubmissionState::Pending);
        self.run(eligible, options, &state).await
    }

    async fn run(
        &self,
        eligible: &[VerifiedPayload],
        options: &TxOptions,
        state: &watch::Sender<SubmissionState>,
    ) -> Result<TransactionOutcome, SubmissionError> {
        let result = self.execute(eligible, options, state).await;

        let label = match &result {
            Ok(_) => "confirmed",
            Err(e) => e.label(),
        };
        SUBMISSIONS.with_label_values(&[label]).inc();

        state.send_replace(match &result {
            Ok(outcome) => SubmissionState::Confirmed(outcome.clone()),
            Err(e) => SubmissionState::Failed(e.clone()),
        });
        result
    }

    async fn execute(
        &self,
        eligible: &[VerifiedPayload],
        options: &TxOptions,
        state: &watch::Sender<SubmissionState>,
    ) -> Result<TransactionOutcome, SubmissionError> {
        let data = self.binding.encode_call(eligible)?;
        let submitted: BTreeSet<RecordKey> =
            eligible.iter().flat_map(|p| p.record_keys()).collect();

        let request = TxRequest {
            to: self.binding.contract(),
            data,
            options: options.clone(),
        };

        let tx_hash = self
            .ledger
            .send_transaction(request)
            .await
            .map_err(|e| match e {
                LedgerError::Reverted(reason) => SubmissionError::Rejected {
                    reason,
                    tx_hash: None,
                },
                e @ LedgerError::OutOfGas { .. } => SubmissionError::Rejected {
                    reason: e.to_string(),
                    tx_hash: None,
                },
                other => SubmissionError::Transport(other.to_string()),
            })?;

        state.send_replace(SubmissionState::Broadcast(tx_hash));
        log_tx_event!(
            info,
            "writer",
            "Write transaction broadcast",
            hash_hex(&tx_hash),
            payloads = eligible.len(),
            method = self.binding.method_name()
        );

        let started = Instant::now();
        let _timer = HistogramTimer::new(&SUBMISSION_DURATION);
        let waited = tokio::time::timeout(self.timeout, self.ledger.wait_for_receipt(tx_hash)).await;
        let waited_ms = started.elapsed().as_millis() as u64;

        let receipt = match waited {
            Err(_) => {
                log_tx_event!(warn, "writer", "No receipt within timeout", hash_hex(&tx_hash), waited_ms);
                return Err(SubmissionError::TimedOut { tx_hash, waited_ms });
            }
            Ok(Err(e @ (LedgerError::Reverted(_) | LedgerError::OutOfGas { .. }))) => {
                return Err(SubmissionError::Rejected {
                    reason: e.to_string(),
                    tx_hash: Some(tx_hash),
                });
            }
            Ok(Err(e)) => {
                // Broadcast already happened, so the outcome is unknown
                log_tx_event!(warn, "writer", "Receipt lookup failed", hash_hex(&tx_hash), error = %e);
                return Err(SubmissionError::TimedOut { tx_hash, waited_ms });
            }
            Ok(Ok(receipt)) => receipt,
        };

        if !receipt.status {
            log_tx_event!(warn, "writer", "Write transaction reverted", hash_hex(&tx_hash));
            return Err(SubmissionError::Rejected {
                reason: "transaction reverted".to_string(),
                tx_hash: Some(tx_hash),
            });
        }

        let updated = self.confirmed_writes(&receipt, &submitted);
        log_tx_event!(
            info,
            "writer",
            "Write transaction confirmed",
            hash_hex(&tx_hash),
            submitted = submitted.len(),
            updated = updated.len()
        );

        Ok(TransactionOutcome {
            transaction_hash: tx_hash,
            submitted,
            updated,
        })
    }

    /// Record keys named by the write event that this transaction carried.
    fn confirmed_writes(
        &self,
        receipt: &TxReceipt,
        submitted: &BTreeSet<RecordKey>,
    ) -> BTreeSet<RecordKey> {
        receipt
            .events
            .get(&self.write_event)
            .into_iter()
            .flatten()
            .filter_map(|log| {
                let source = log.return_values.get("source")?.as_str()?;
                let key = log.return_values.get("key")?.as_str()?;
                match Address::from_hex(source) {
                    Ok(attestor) => Some(RecordKey::new(attestor, key)),
                    Err(_) => {
                        debug!(source, "Ignoring write event with malformed source");
                        None
                    }
                }
            })
            .filter(|k| submitted.contains(k))
            .collect()
    }
}

impl<L: LedgerClient + 'static> ContractWriter<L> {
    /// Run the submission as a background task.
    pub fn spawn_submit(&self, eligible: Vec<VerifiedPayload>, options: TxOptions) -> SubmissionHandle {
        let (state_tx, state_rx) = watch::channel(SubmissionState::Pending);
        let writer = self.clone();
        let task = tokio::spawn(async move { writer.run(&eligible, &options, &state_tx).await });

        SubmissionHandle {
            state: state_rx,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_ledger::{InMemoryOracleLedger, LedgerFaults};
    use crate::domain::binding::OPEN_ORACLE_VIEW_ABI;
    use crate::domain::entities::{Observation, StoredRecord};
    use crate::testing::TestAttestor;

    fn setup(timeout_ms: u64) -> (Arc<InMemoryOracleLedger>, ContractWriter<InMemoryOracleLedger>) {
        let binding =
            ContractBinding::bind(OPEN_ORACLE_VIEW_ABI, "postPrices", Address([0xCC; 20])).unwrap();
        let ledger = Arc::new(InMemoryOracleLedger::new(binding.clone()));
        let writer = ContractWriter::new(
            ledger.clone(),
            binding,
            "Write",
            Duration::from_millis(timeout_ms),
        );
        (ledger, writer)
    }

    fn eth(seed: u8, value: u64, ts: u64) -> VerifiedPayload {
        TestAttestor::from_seed(seed)
            .unwrap()
            .verified(&[Observation::numeric("ETH", value, ts)])
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_confirms_writes() {
        let (ledger, writer) = setup(1_000);
        let payloads = vec![eth(1, 100, 10), eth(2, 110, 10)];

        let outcome = writer.submit(&payloads, &TxOptions::default()).await.unwrap();
        assert_eq!(outcome.submitted.len(), 2);
        assert_eq!(outcome.updated, outcome.submitted);
        assert_eq!(ledger.sent_transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_gas_comes_from_options() {
        let (ledger, writer) = setup(1_000);
        let options = TxOptions {
            gas: 424_242,
            gas_price: 7,
            ..Default::default()
        };

        writer.submit(&[eth(1, 100, 10)], &options).await.unwrap();
        let sent = ledger.sent_transactions();
        assert_eq!(sent[0].options, options);
        assert_eq!(sent[0].to, Address([0xCC; 20]));
    }

    #[tokio::test]
    async fn test_front_run_yields_subset() {
        let (ledger, writer) = setup(1_000);
        let first = TestAttestor::from_seed(1).unwrap();
        ledger.set_faults(LedgerFaults {
            front_run: vec![StoredRecord::new(
                first.address(),
                Observation::numeric("ETH", 999, 50),
            )],
            ..Default::default()
        });

        let outcome = writer
            .submit(&[eth(1, 100, 10), eth(2, 110, 10)], &TxOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.submitted.len(), 2);
        assert_eq!(outcome.updated.len(), 1);
        assert_eq!(
            outcome.unconfirmed().into_iter().next().map(|k| k.attestor),
            Some(first.address())
        );
    }

    #[tokio::test]
    async fn test_revert_is_rejected() {
        let (ledger, writer) = setup(1_000);
        ledger.set_faults(LedgerFaults {
            revert_with: Some("bad".into()),
            ..Default::default()
        });

        let err = writer
            .submit(&[eth(1, 100, 10)], &TxOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Rejected {
                reason: "bad".into(),
                tx_hash: None
            }
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_status_zero_is_rejected_with_hash() {
        let (ledger, writer) = setup(1_000);
        ledger.set_faults(LedgerFaults {
            min_gas: Some(5_000_000),
            ..Default::default()
        });

        let err = writer
            .submit(&[eth(1, 100, 10)], &TxOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected { tx_hash: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_transport_failure_before_broadcast() {
        let (ledger, writer) = setup(1_000);
        ledger.set_faults(LedgerFaults {
            transport_down: true,
            ..Default::default()
        });

        let err = writer
            .submit(&[eth(1, 100, 10)], &TxOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_carries_hash() {
        let (ledger, writer) = setup(50);
        ledger.set_faults(LedgerFaults {
            drop_confirmations: true,
            ..Default::default()
        });

        let err = writer
            .submit(&[eth(1, 100, 10)], &TxOptions::default())
            .await
            .unwrap_err();
        match err {
            SubmissionError::TimedOut { tx_hash, waited_ms } => {
                assert_ne!(tx_hash, [0u8; 32]);
                assert!(waited_ms >= 45);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        // The transaction still executed.
        assert!(ledger
            .record(TestAttestor::from_seed(1).unwrap().address(), "ETH")
            .is_some());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (_, writer) = setup(1_000);
        assert_eq!(
            writer.submit(&[], &TxOptions::default()).await,
            Err(SubmissionError::EmptyBatch)
        );
    }

    #[tokio::test]
    async fn test_spawned_submission_reaches_confirmed() {
        let (_, writer) = setup(1_000);
        let handle = writer.spawn_submit(vec![eth(1, 100, 10)], TxOptions::default());
        let mut states = handle.subscribe();

        let outcome = handle.wait().await.unwrap();
        let last = states.borrow_and_update().clone();
        assert_eq!(last, SubmissionState::Confirmed(outcome));
        assert!(last.is_terminal());
    }

    #[tokio::test]
    async fn test_abandon_after_broadcast_returns_hash() {
        let (ledger, writer) = setup(60_000);
        ledger.set_faults(LedgerFaults {
            drop_confirmations: true,
            ..Default::default()
        });

        let handle = writer.spawn_submit(vec![eth(1, 100, 10)], TxOptions::default());
        let mut states = handle.subscribe();
        states
            .wait_for(|s| matches!(s, SubmissionState::Broadcast(_)))
            .await
            .unwrap();

        let hash = handle.abandon();
        assert!(hash.is_some());
    }
}
