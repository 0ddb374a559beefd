//! # Poster Pipeline Tests
//!
//! Drives `OraclePosterService` end to end against the in-memory ledger.
//!
//! ## Test Categories
//!
//! 1. **Freshness** - Stale and tied payloads never reach the ledger
//! 2. **Confirmation** - Only keys the contract wrote are reported
//! 3. **Failures** - Timeouts, reverts and out-of-gas receipts
//! 4. **Aggregation** - Medians, expiry and cache monotonicity

use oo_poster::adapters::{FixedTimeSource, InMemoryOracleLedger, LedgerFaults};
use oo_poster::domain::codec;
use oo_poster::testing::TestAttestor;
use oo_poster::{
    AggregationError, Address, ContractBinding, Observation, ObservationValue, OraclePosterApi,
    OraclePosterService, Payload, PayloadOutcome, PosterConfigBuilder, RecordKey, SignatureError,
    StoredRecord, SubmissionError, TxOptions, OPEN_ORACLE_VIEW_ABI,
};
use std::sync::Arc;

// =============================================================================
// TEST HELPERS
// =============================================================================

const VIEW: Address = Address([0xCC; 20]);
const NOW: u64 = 1_000;

type Poster = OraclePosterService<InMemoryOracleLedger, InMemoryOracleLedger, FixedTimeSource>;

struct Harness {
    ledger: Arc<InMemoryOracleLedger>,
    clock: Arc<FixedTimeSource>,
    poster: Poster,
}

fn attestor(seed: u8) -> TestAttestor {
    TestAttestor::from_seed(seed).unwrap()
}

fn harness_with(attestors: &[&TestAttestor], timeout_ms: u64, tx: TxOptions) -> Harness {
    let config = PosterConfigBuilder::new()
        .view_address(VIEW)
        .attestors(attestors.iter().map(|a| a.address()).collect())
        .confirmation_timeout_ms(timeout_ms)
        .tx(tx)
        .build()
        .unwrap();
    let binding = ContractBinding::bind(OPEN_ORACLE_VIEW_ABI, "postPrices", VIEW).unwrap();
    let ledger = Arc::new(InMemoryOracleLedger::new(binding.clone()));
    let clock = Arc::new(FixedTimeSource::new(NOW));
    let poster = OraclePosterService::new(
        config,
        binding,
        ledger.clone(),
        ledger.clone(),
        clock.clone(),
    )
    .unwrap();

    Harness {
        ledger,
        clock,
        poster,
    }
}

fn harness(attestors: &[&TestAttestor]) -> Harness {
    harness_with(attestors, 1_000, TxOptions::default())
}

fn stored(attestor: &TestAttestor, key: &str, value: u64, timestamp: u64) -> StoredRecord {
    StoredRecord::new(attestor.address(), Observation::numeric(key, value, timestamp))
}

// =============================================================================
// FRESHNESS
// =============================================================================

#[tokio::test]
async fn test_older_payload_is_not_submitted() {
    let a = attestor(1);
    let h = harness(&[&a]);
    h.ledger.insert_record(stored(&a, "ETH", 250, 10));

    let report = h
        .poster
        .submit_batch(vec![a.price_payload("ETH", 260, 9).unwrap()])
        .await;

    assert_eq!(
        report.outcomes,
        vec![PayloadOutcome::Stale {
            attestor: a.address()
        }]
    );
    assert!(report.submission.is_none());
    assert!(h.ledger.sent_transactions().is_empty());
}

#[tokio::test]
async fn test_equal_timestamp_is_not_submitted() {
    let a = attestor(1);
    let h = harness(&[&a]);
    h.ledger.insert_record(stored(&a, "ETH", 250, 10));

    let report = h
        .poster
        .submit_batch(vec![a.price_payload("ETH", 999, 10).unwrap()])
        .await;

    assert_eq!(report.stale_count(), 1);
    assert!(report.submission.is_none());
    assert_eq!(
        h.ledger.record(a.address(), "ETH").map(|r| r.observation.value),
        Some(ObservationValue::Numeric(250))
    );
}

#[tokio::test]
async fn test_record_of_other_attestor_does_not_gate() {
    let a = attestor(1);
    let b = attestor(2);
    let h = harness(&[&a, &b]);
    h.ledger.insert_record(stored(&b, "ETH", 250, 500));

    let report = h
        .poster
        .submit_batch(vec![a.price_payload("ETH", 240, 100).unwrap()])
        .await;

    assert_eq!(report.eligible_count(), 1);
    assert!(matches!(report.submission, Some(Ok(_))));
}

#[tokio::test]
async fn test_duplicate_in_batch_submits_newest_only() {
    let a = attestor(1);
    let h = harness(&[&a]);

    let report = h
        .poster
        .submit_batch(vec![
            a.price_payload("ETH", 100, 900).unwrap(),
            a.price_payload("ETH", 110, 950).unwrap(),
        ])
        .await;

    assert_eq!(
        report.outcomes[0],
        PayloadOutcome::Stale {
            attestor: a.address()
        }
    );
    assert_eq!(report.eligible_count(), 1);
    assert_eq!(
        h.poster.aggregate("ETH").map(|e| e.value),
        Some(ObservationValue::Numeric(110))
    );
}

#[tokio::test]
async fn test_bad_payloads_do_not_abort_batch() {
    let a = attestor(1);
    let h = harness(&[&a]);

    let mut forged = a.price_payload("BTC", 1, 990).unwrap();
    forged.signature = vec![0u8; 12];
    let garbage_message = b"not an abi payload".to_vec();
    let garbage = Payload::new(garbage_message.clone(), a.sign(&garbage_message).unwrap());

    let report = h
        .poster
        .submit_batch(vec![forged, garbage, a.price_payload("ETH", 250, 990).unwrap()])
        .await;

    assert!(matches!(report.outcomes[0], PayloadOutcome::InvalidSignature(_)));
    assert!(matches!(report.outcomes[1], PayloadOutcome::DecodeFailed(_)));
    assert_eq!(
        report.outcomes[2],
        PayloadOutcome::Eligible {
            attestor: a.address()
        }
    );

    let outcome = report.submission.unwrap().unwrap();
    assert_eq!(outcome.updated_keys(), ["ETH".to_string()].into_iter().collect());
}

#[tokio::test]
async fn test_tampered_message_is_never_submitted() {
    let a = attestor(1);
    let h = harness(&[&a]);

    let genuine = a.price_payload("ETH", 250, 990).unwrap();
    let altered = codec::encode(&[Observation::numeric("ETH", 999, 990)]).unwrap();
    let tampered = Payload::new(altered, genuine.signature.clone());

    let report = h.poster.submit_batch(vec![tampered]).await;

    assert_eq!(
        report.outcomes,
        vec![PayloadOutcome::InvalidSignature(
            SignatureError::UnknownSigner.to_string()
        )]
    );
    assert!(report.submission.is_none());
    assert!(h.ledger.sent_transactions().is_empty());
    assert!(h.ledger.record(a.address(), "ETH").is_none());
}

#[tokio::test]
async fn test_signer_outside_attestor_set_is_rejected() {
    let a = attestor(1);
    let outsider = attestor(9);
    let h = harness(&[&a]);

    let report = h
        .poster
        .submit_batch(vec![
            outsider.price_payload("ETH", 1, 990).unwrap(),
            a.price_payload("ETH", 250, 990).unwrap(),
        ])
        .await;

    assert!(matches!(report.outcomes[0], PayloadOutcome::InvalidSignature(_)));
    assert_eq!(report.eligible_count(), 1);
    assert!(h.ledger.record(outsider.address(), "ETH").is_none());
    assert_eq!(
        h.poster.aggregate("ETH").map(|e| e.value),
        Some(ObservationValue::Numeric(250))
    );
}

#[tokio::test]
async fn test_read_failure_treats_record_as_absent() {
    let a = attestor(1);
    let h = harness(&[&a]);
    h.ledger.set_faults(LedgerFaults {
        reads_down: true,
        ..Default::default()
    });

    let report = h
        .poster
        .submit_batch(vec![a.price_payload("ETH", 250, 990).unwrap()])
        .await;

    // Submitted anyway; the aggregate read then fails
    assert!(matches!(report.submission, Some(Ok(_))));
    assert!(matches!(
        report.aggregates["ETH"],
        Err(AggregationError::Read(_))
    ));
    assert!(h.poster.aggregate("ETH").is_none());
}

// =============================================================================
// CONFIRMATION
// =============================================================================

#[tokio::test]
async fn test_front_run_key_is_not_reported_updated() {
    let a = attestor(1);
    let h = harness(&[&a]);
    h.ledger.set_faults(LedgerFaults {
        front_run: vec![stored(&a, "ETH", 300, 995)],
        ..Default::default()
    });

    let report = h
        .poster
        .submit_batch(vec![a.payload(&[
            Observation::numeric("ETH", 250, 990),
            Observation::numeric("BTC", 40_000, 990),
        ])
        .unwrap()])
        .await;

    let outcome = report.submission.unwrap().unwrap();
    assert_eq!(outcome.updated_keys(), ["BTC".to_string()].into_iter().collect());
    assert_eq!(
        outcome.unconfirmed(),
        [RecordKey::new(a.address(), "ETH")].into_iter().collect()
    );
    assert!(report.aggregates.contains_key("BTC"));
    assert!(!report.aggregates.contains_key("ETH"));
    assert!(h.poster.aggregate("ETH").is_none());
}

#[tokio::test]
async fn test_configured_gas_reaches_ledger() {
    let a = attestor(1);
    let tx = TxOptions {
        from: Address([0xAB; 20]),
        gas: 4_000_000,
        ..Default::default()
    };
    let h = harness_with(&[&a], 1_000, tx.clone());

    h.poster
        .submit_batch(vec![a.price_payload("ETH", 250, 990).unwrap()])
        .await;

    let sent = h.ledger.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, VIEW);
    assert_eq!(sent[0].options, tx);
}

// =============================================================================
// FAILURES
// =============================================================================

#[tokio::test]
async fn test_missing_confirmation_times_out() {
    let a = attestor(1);
    let h = harness_with(&[&a], 50, TxOptions::default());
    h.ledger.set_faults(LedgerFaults {
        drop_confirmations: true,
        ..Default::default()
    });

    let report = h
        .poster
        .submit_batch(vec![a.price_payload("ETH", 250, 990).unwrap()])
        .await;

    match report.submission {
        Some(Err(SubmissionError::TimedOut { .. })) => {}
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(report.aggregates.is_empty());
    assert!(h.poster.aggregate("ETH").is_none());
}

#[tokio::test]
async fn test_revert_at_broadcast_is_rejected() {
    let a = attestor(1);
    let h = harness(&[&a]);
    h.ledger.set_faults(LedgerFaults {
        revert_with: Some("paused".into()),
        ..Default::default()
    });

    let report = h
        .poster
        .submit_batch(vec![a.price_payload("ETH", 250, 990).unwrap()])
        .await;

    match report.submission {
        Some(Err(SubmissionError::Rejected { tx_hash, .. })) => assert!(tx_hash.is_none()),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(report.aggregates.is_empty());
}

#[tokio::test]
async fn test_out_of_gas_receipt_is_rejected() {
    let a = attestor(1);
    let h = harness_with(
        &[&a],
        1_000,
        TxOptions {
            gas: 21_000,
            ..Default::default()
        },
    );
    h.ledger.set_faults(LedgerFaults {
        min_gas: Some(100_000),
        ..Default::default()
    });

    let report = h
        .poster
        .submit_batch(vec![a.price_payload("ETH", 250, 990).unwrap()])
        .await;

    match report.submission {
        Some(Err(SubmissionError::Rejected { tx_hash, .. })) => assert!(tx_hash.is_some()),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(h.ledger.record(a.address(), "ETH").is_none());
}

// =============================================================================
// AGGREGATION
// =============================================================================

#[tokio::test]
async fn test_median_of_two_attestors() {
    let a = attestor(1);
    let b = attestor(2);
    let h = harness(&[&a, &b]);

    let report = h
        .poster
        .submit_batch(vec![
            a.price_payload("ETH", 100, 990).unwrap(),
            b.price_payload("ETH", 110, 991).unwrap(),
        ])
        .await;

    let entry = report.aggregates["ETH"].clone().unwrap();
    assert_eq!(entry.value, ObservationValue::Numeric(105));
    assert_eq!(entry.source_record_count, 2);
    assert_eq!(entry.computed_at, NOW);
    assert_eq!(h.poster.aggregate("ETH"), Some(entry));
}

#[tokio::test]
async fn test_unconfigured_attestor_not_aggregated() {
    let a = attestor(1);
    let outsider = attestor(9);
    let h = harness(&[&a]);
    h.ledger.insert_record(stored(&outsider, "ETH", 1_000_000, 995));

    let report = h
        .poster
        .submit_batch(vec![a.price_payload("ETH", 100, 990).unwrap()])
        .await;

    let entry = report.aggregates["ETH"].clone().unwrap();
    assert_eq!(entry.value, ObservationValue::Numeric(100));
    assert_eq!(entry.source_record_count, 1);
}

#[tokio::test]
async fn test_text_values_take_lower_median() {
    let a = attestor(1);
    let b = attestor(2);
    let h = harness(&[&a, &b]);

    h.poster
        .submit_batch(vec![
            a.payload(&[Observation::text("status", "green", 990)]).unwrap(),
            b.payload(&[Observation::text("status", "amber", 990)]).unwrap(),
        ])
        .await;

    assert_eq!(
        h.poster.aggregate("status").map(|e| e.value),
        Some(ObservationValue::Text("amber".into()))
    );
}

#[tokio::test]
async fn test_expired_records_keep_previous_aggregate() {
    let a = attestor(1);
    let h = harness(&[&a]);

    h.poster
        .submit_batch(vec![a.price_payload("ETH", 250, 990).unwrap()])
        .await;
    let before = h.poster.aggregate("ETH").unwrap();

    h.clock.advance(4_000);
    let result = h.poster.refresh_aggregate("ETH").await;

    assert!(matches!(
        result,
        Err(AggregationError::InsufficientData { discarded: 1, .. })
    ));
    assert_eq!(h.poster.aggregate("ETH"), Some(before));
}

#[tokio::test]
async fn test_clock_regression_does_not_replace_newer_entry() {
    let a = attestor(1);
    let h = harness(&[&a]);

    h.poster
        .submit_batch(vec![a.price_payload("ETH", 250, 990).unwrap()])
        .await;

    h.ledger.insert_record(stored(&a, "ETH", 300, 999));
    h.clock.set(NOW - 5);
    let returned = h.poster.refresh_aggregate("ETH").await.unwrap();

    // The older computation lost; the caller sees what the cache holds
    let cached = h.poster.aggregate("ETH").unwrap();
    assert_eq!(cached.computed_at, NOW);
    assert_eq!(cached.value, ObservationValue::Numeric(250));
    assert_eq!(returned, cached);
}

#[tokio::test]
async fn test_unreadable_attestor_is_skipped() {
    let a = attestor(1);
    let b = attestor(2);
    let h = harness(&[&a, &b]);

    h.poster
        .submit_batch(vec![
            a.price_payload("ETH", 100, 990).unwrap(),
            b.price_payload("ETH", 110, 990).unwrap(),
        ])
        .await;

    h.ledger.set_faults(LedgerFaults {
        unreadable: vec![b.address()],
        ..Default::default()
    });
    h.clock.advance(1);
    let entry = h.poster.refresh_aggregate("ETH").await.unwrap();

    assert_eq!(entry.value, ObservationValue::Numeric(100));
    assert_eq!(entry.source_record_count, 1);
    assert_eq!(h.poster.aggregate("ETH"), Some(entry));
}

#[tokio::test]
async fn test_concurrent_batches_share_cache() {
    let a = attestor(1);
    let b = attestor(2);
    let h = Arc::new(harness(&[&a, &b]));

    let first = {
        let h = h.clone();
        let payload = a.price_payload("ETH", 100, 990).unwrap();
        tokio::spawn(async move { h.poster.submit_batch(vec![payload]).await })
    };
    let second = {
        let h = h.clone();
        let payload = b.price_payload("ETH", 110, 990).unwrap();
        tokio::spawn(async move { h.poster.submit_batch(vec![payload]).await })
    };

    assert!(matches!(first.await.unwrap().submission, Some(Ok(_))));
    assert!(matches!(second.await.unwrap().submission, Some(Ok(_))));

    // Whichever refresh ran last saw both records
    h.poster.refresh_aggregate("ETH").await.unwrap();
    assert_eq!(
        h.poster.aggregate("ETH").map(|e| e.value),
        Some(ObservationValue::Numeric(105))
    );
}
