//! # Oracle Poster Service
//!
//! Application service implementing `OraclePosterApi`.
//!
//! ## Pipeline
//!
//! ```text
//! payloads ──verify+decode (parallel)──→ verified ──read current records──→ FreshnessGate
//!                                                                              │
//!          AggregateCache ←── Aggregator ←── confirmed keys ←── ContractWriter ←┘
//! ```
//!
//! Per-payload failures are reported and skipped. Only a confirmed write
//! triggers aggregation, and only for the keys the contract actually
//! stored.

use super::writer::ContractWriter;
use crate::cache::AggregateCache;
use crate::domain::aggregation::Aggregator;
use crate::domain::binding::ContractBinding;
use crate::domain::codec::PayloadCodec;
use crate::domain::config::PosterConfig;
use crate::domain::entities::{AggregateEntry, Payload, RecordKey, StoredRecord, VerifiedPayload};
use crate::domain::errors::{AggregationError, ConfigError, PayloadError};
use crate::domain::freshness::FreshnessGate;
use crate::domain::signature::SignatureVerifier;
use crate::ports::inbound::{BatchReport, OraclePosterApi, PayloadOutcome};
use crate::ports::outbound::{LedgerClient, OracleDataReader, TimeSource};
use async_trait::async_trait;
use futures::future::join_all;
use oo_telemetry::{log_event, AGGREGATE_SOURCES, AGGREGATIONS, PAYLOADS_PROCESSED};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Open Oracle poster.
pub struct OraclePosterService<L, R, T>
where
    L: LedgerClient + 'static,
    R: OracleDataReader,
    T: TimeSource,
{
    config: PosterConfig,
    verifier: SignatureVerifier,
    codec: PayloadCodec,
    gate: FreshnessGate,
    writer: ContractWriter<L>,
    aggregator: Aggregator,
    cache: Arc<AggregateCache>,
    reader: Arc<R>,
    clock: Arc<T>,
}

impl<L, R, T> OraclePosterService<L, R, T>
where
    L: LedgerClient + 'static,
    R: OracleDataReader,
    T: TimeSource,
{
    /// Create a poster service.
    ///
    /// `binding` must target the configured view contract and write method.
    pub fn new(
        config: PosterConfig,
        binding: ContractBinding,
        ledger: Arc<L>,
        reader: Arc<R>,
        clock: Arc<T>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        if binding.contract() != config.view_address {
            return Err(ConfigError::InvalidParameters(format!(
                "binding targets {}, configured view is {}",
                binding.contract(),
                config.view_address
            )));
        }
        if binding.method_name() != config.write_method {
            return Err(ConfigError::InvalidParameters(format!(
                "binding method {} does not match write_method {}",
                binding.method_name(),
                config.write_method
            )));
        }

        if let Err(e) = oo_telemetry::register_metrics() {
            warn!(error = %e, "Poster metrics unavailable");
        }

        let writer = ContractWriter::from_config(ledger, binding, &config);
        let aggregator = Aggregator::new(config.max_observation_age_secs);
        let verifier = SignatureVerifier::trusting(config.attestors.iter().copied());

        info!(
            view = %config.view_address,
            method = %config.write_method,
            attestors = config.attestors.len(),
            "Oracle poster configured"
        );

        Ok(Self {
            config,
            verifier,
            codec: PayloadCodec::new(),
            gate: FreshnessGate::new(),
            writer,
            aggregator,
            cache: Arc::new(AggregateCache::new()),
            reader,
            clock,
        })
    }

    /// Bind the configured write method against `abi_json` and create the
    /// service.
    pub fn from_abi(
        config: PosterConfig,
        abi_json: &str,
        ledger: Arc<L>,
        reader: Arc<R>,
        clock: Arc<T>,
    ) -> Result<Self, ConfigError> {
        let binding = ContractBinding::bind(abi_json, &config.write_method, config.view_address)?;
        Self::new(config, binding, ledger, reader, clock)
    }

    /// Active configuration.
    pub fn config(&self) -> &PosterConfig {
        &self.config
    }

    /// Shared aggregate cache.
    pub fn cache(&self) -> Arc<AggregateCache> {
        Arc::clone(&self.cache)
    }

    /// Writer, for callers that drive submissions themselves.
    pub fn writer(&self) -> &ContractWriter<L> {
        &self.writer
    }

    fn authenticate(&self, payload: Payload) -> Result<VerifiedPayload, PayloadError> {
        let attestor = self.verifier.verify(&payload.message, &payload.signature)?;
        let observations = self.codec.decode(&payload.message)?;
        Ok(VerifiedPayload::new(attestor, observations, payload))
    }

    /// Current on-chain records for every (attestor, key) in `verified`.
    ///
    /// A failed read is treated as an absent record; the contract still
    /// refuses anything that is not newer.
    async fn current_records(
        &self,
        verified: &[(usize, VerifiedPayload)],
    ) -> HashMap<RecordKey, StoredRecord> {
        let wanted: BTreeSet<RecordKey> = verified
            .iter()
            .flat_map(|(_, p)| p.record_keys())
            .collect();

        let reads = join_all(wanted.into_iter().map(|rk| async move {
            let result = self.reader.read_record(rk.attestor, &rk.key).await;
            (rk, result)
        }))
        .await;

        let mut current = HashMap::new();
        for (rk, result) in reads {
            match result {
                Ok(Some(record)) => {
                    current.insert(rk, record);
                }
                Ok(None) => {}
                Err(e) => {
                    log_event!(
                        warn,
                        "gate",
                        "Record read failed, treating as absent",
                        attestor = %rk.attestor,
                        key = %rk.key,
                        error = %e
                    );
                }
            }
        }
        current
    }
}

#[async_trait]
impl<L, R, T> OraclePosterApi for OraclePosterService<L, R, T>
where
    L: LedgerClient + 'static,
    R: OracleDataReader,
    T: TimeSource,
{
    async fn submit_batch(&self, payloads: Vec<Payload>) -> BatchReport {
        let total = payloads.len();
        let mut outcomes: Vec<Option<PayloadOutcome>> = vec![None; total];

        let checked: Vec<Result<VerifiedPayload, PayloadError>> = payloads
            .into_par_iter()
            .map(|p| self.authenticate(p))
            .collect();

        let mut verified = Vec::with_capacity(total);
        for (index, result) in checked.into_iter().enumerate() {
            match result {
                Ok(payload) => verified.push((index, payload)),
                Err(PayloadError::InvalidSignature(e)) => {
                    // No identity to log: none was proven
                    log_event!(warn, "verifier", "Payload rejected", index, reason = %e);
                    outcomes[index] = Some(PayloadOutcome::InvalidSignature(e.to_string()));
                }
                Err(PayloadError::Decode(e)) => {
                    log_event!(warn, "codec", "Payload not decodable", index, reason = %e);
                    outcomes[index] = Some(PayloadOutcome::DecodeFailed(e.to_string()));
                }
            }
        }

        let current = self.current_records(&verified).await;
        let gated = self.gate.filter(verified, &current);

        for (index, payload) in &gated.stale {
            log_event!(
                info,
                "gate",
                "Skipping stale payload",
                index = *index,
                attestor = %payload.attestor()
            );
            outcomes[*index] = Some(PayloadOutcome::Stale {
                attestor: payload.attestor(),
            });
        }
        for (index, payload) in &gated.eligible {
            outcomes[*index] = Some(PayloadOutcome::Eligible {
                attestor: payload.attestor(),
            });
        }

        let outcomes: Vec<PayloadOutcome> = outcomes.into_iter().flatten().collect();
        for outcome in &outcomes {
            PAYLOADS_PROCESSED.with_label_values(&[outcome.label()]).inc();
        }

        let mut report = BatchReport {
            outcomes,
            submission: None,
            aggregates: BTreeMap::new(),
        };

        if gated.eligible.is_empty() {
            log_event!(info, "poster", "Nothing eligible to submit", total);
            return report;
        }

        let eligible: Vec<VerifiedPayload> = gated.eligible.into_iter().map(|(_, p)| p).collect();
        let submission = self.writer.submit(&eligible, &self.config.tx).await;

        if let Ok(outcome) = &submission {
            for key in outcome.updated_keys() {
                let result = self.refresh_aggregate(&key).await;
                report.aggregates.insert(key, result);
            }
        }

        report.submission = Some(submission);
        report
    }

    async fn refresh_aggregate(&self, key: &str) -> Result<AggregateEntry, AggregationError> {
        let reads = join_all(self.config.attestors.iter().map(|attestor| async move {
            (*attestor, self.reader.read_record(*attestor, key).await)
        }))
        .await;

        let mut records = Vec::with_capacity(reads.len());
        let mut first_failure = None;
        for (attestor, read) in reads {
            match read {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    log_event!(
                        warn,
                        "aggregator",
                        "Record read failed, skipping attestor",
                        key,
                        attestor = %attestor,
                        error = %e
                    );
                    first_failure.get_or_insert(e);
                }
            }
        }

        // Nothing readable: on-chain state is unknown rather than empty
        if records.is_empty() {
            if let Some(e) = first_failure {
                AGGREGATIONS.with_label_values(&["failed"]).inc();
                return Err(AggregationError::Read(e.to_string()));
            }
        }

        let now = self.clock.now_secs();
        let entry = match self.aggregator.recompute(key, &records, now) {
            Ok(entry) => entry,
            Err(e) => {
                let label = match e {
                    AggregationError::InsufficientData { .. } => "insufficient_data",
                    _ => "failed",
                };
                AGGREGATIONS.with_label_values(&[label]).inc();
                log_event!(warn, "aggregator", "Aggregate not updated", key, reason = %e);
                return Err(e);
            }
        };

        match self.cache.put_or_current(entry.clone()) {
            Ok(()) => {
                AGGREGATIONS.with_label_values(&["updated"]).inc();
                AGGREGATE_SOURCES
                    .with_label_values(&[key])
                    .set(entry.source_record_count as f64);
                log_event!(
                    info,
                    "aggregator",
                    "Aggregate updated",
                    key,
                    value = %entry.value,
                    sources = entry.source_record_count
                );
                Ok(entry)
            }
            Err(kept) => {
                AGGREGATIONS.with_label_values(&["superseded"]).inc();
                log_event!(
                    warn,
                    "aggregator",
                    "Cache kept a newer aggregate",
                    key,
                    kept_at = kept.computed_at,
                    offered_at = entry.computed_at
                );
                Ok(kept)
            }
        }
    }

    fn aggregate(&self, key: &str) -> Option<AggregateEntry> {
        self.cache.get(key)
    }
}
