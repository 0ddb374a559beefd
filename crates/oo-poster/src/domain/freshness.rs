//! # Freshness Gate
//!
//! A record is only worth submitting when it is strictly newer than what
//! the data contract already holds for the same (attestor, key). Equal
//! timestamps are not eligible.

use super::entities::{Attestor, Observation, RecordKey, StoredRecord, VerifiedPayload};
use std::collections::HashMap;

/// Whether `candidate`, signed by `attestor`, would replace `current`.
///
/// A `current` record stored under a different (attestor, key) says nothing
/// about the candidate and is treated as absent.
pub fn is_eligible(
    candidate: &Observation,
    attestor: Attestor,
    current: Option<&StoredRecord>,
) -> bool {
    match current {
        Some(record) if record.attestor == attestor && record.observation.key == candidate.key => {
            candidate.timestamp > record.observation.timestamp
        }
        _ => true,
    }
}

/// Result of gating a batch. Indices refer to the caller's batch order.
#[derive(Debug, Default)]
pub struct GateOutcome {
    /// Payloads to submit, in batch order.
    pub eligible: Vec<(usize, VerifiedPayload)>,
    /// Payloads with nothing newer than the chain or the rest of the batch.
    pub stale: Vec<(usize, VerifiedPayload)>,
}

/// Batch-level freshness filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreshnessGate;

impl FreshnessGate {
    /// Create a gate.
    pub fn new() -> Self {
        Self
    }

    /// Single observation check.
    pub fn is_eligible(
        &self,
        candidate: &Observation,
        attestor: Attestor,
        current: Option<&StoredRecord>,
    ) -> bool {
        is_eligible(candidate, attestor, current)
    }

    /// Split `candidates` into eligible and stale payloads.
    ///
    /// A payload is eligible when at least one of its observations is newer
    /// than the stored record and is the newest for its (attestor, key)
    /// within the batch. The earliest payload wins a timestamp tie.
    pub fn filter(
        &self,
        candidates: Vec<(usize, VerifiedPayload)>,
        current: &HashMap<RecordKey, StoredRecord>,
    ) -> GateOutcome {
        // (attestor, key) -> (timestamp, position in `candidates`)
        let mut newest: HashMap<RecordKey, (u64, usize)> = HashMap::new();

        for (pos, (_, payload)) in candidates.iter().enumerate() {
            let attestor = payload.attestor();
            for obs in payload.observations() {
                let record_key = RecordKey::new(attestor, obs.key.clone());
                if !is_eligible(obs, attestor, current.get(&record_key)) {
                    continue;
                }
                match newest.get(&record_key) {
                    Some((ts, _)) if *ts >= obs.timestamp => {}
                    _ => {
                        newest.insert(record_key, (obs.timestamp, pos));
                    }
                }
            }
        }

        let mut outcome = GateOutcome::default();
        for (pos, (index, payload)) in candidates.into_iter().enumerate() {
            let wins = payload
                .record_keys()
                .any(|k| matches!(newest.get(&k), Some((_, winner)) if *winner == pos));
            if wins {
                outcome.eligible.push((index, payload));
            } else {
                outcome.stale.push((index, payload));
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Address, Payload};
    use proptest::prelude::*;

    fn attestor(n: u8) -> Attestor {
        Address([n; 20])
    }

    fn verified(who: Attestor, observations: Vec<Observation>) -> VerifiedPayload {
        VerifiedPayload::new(who, observations, Payload::new(vec![], vec![]))
    }

    fn stored(who: Attestor, key: &str, ts: u64) -> (RecordKey, StoredRecord) {
        (
            RecordKey::new(who, key),
            StoredRecord::new(who, Observation::numeric(key, 1, ts)),
        )
    }

    #[test]
    fn test_absent_record_is_eligible() {
        let obs = Observation::numeric("ETH", 250, 10);
        assert!(is_eligible(&obs, attestor(1), None));
    }

    #[test]
    fn test_newer_older_and_equal() {
        let a = attestor(1);
        let (_, current) = stored(a, "ETH", 10);

        assert!(is_eligible(&Observation::numeric("ETH", 1, 11), a, Some(&current)));
        assert!(!is_eligible(&Observation::numeric("ETH", 1, 10), a, Some(&current)));
        assert!(!is_eligible(&Observation::numeric("ETH", 1, 9), a, Some(&current)));
    }

    #[test]
    fn test_record_of_other_attestor_is_ignored() {
        let (_, current) = stored(attestor(2), "ETH", 100);
        assert!(is_eligible(&Observation::numeric("ETH", 1, 5), attestor(1), Some(&current)));
    }

    #[test]
    fn test_filter_splits_stale() {
        let a = attestor(1);
        let current: HashMap<_, _> = [stored(a, "ETH", 10)].into_iter().collect();

        let outcome = FreshnessGate::new().filter(
            vec![
                (0, verified(a, vec![Observation::numeric("ETH", 1, 9)])),
                (1, verified(a, vec![Observation::numeric("BTC", 1, 9)])),
            ],
            &current,
        );

        assert_eq!(outcome.stale.len(), 1);
        assert_eq!(outcome.stale[0].0, 0);
        assert_eq!(outcome.eligible.len(), 1);
        assert_eq!(outcome.eligible[0].0, 1);
    }

    #[test]
    fn test_payload_with_one_fresh_observation_is_eligible() {
        let a = attestor(1);
        let current: HashMap<_, _> = [stored(a, "ETH", 10)].into_iter().collect();

        let outcome = FreshnessGate::new().filter(
            vec![(
                0,
                verified(
                    a,
                    vec![
                        Observation::numeric("ETH", 1, 10),
                        Observation::numeric("BTC", 1, 10),
                    ],
                ),
            )],
            &current,
        );
        assert_eq!(outcome.eligible.len(), 1);
    }

    #[test]
    fn test_duplicate_within_batch_keeps_newest() {
        let a = attestor(1);
        let outcome = FreshnessGate::new().filter(
            vec![
                (0, verified(a, vec![Observation::numeric("ETH", 1, 5)])),
                (1, verified(a, vec![Observation::numeric("ETH", 2, 7)])),
                (2, verified(a, vec![Observation::numeric("ETH", 3, 7)])),
            ],
            &HashMap::new(),
        );

        let eligible: Vec<_> = outcome.eligible.iter().map(|(i, _)| *i).collect();
        assert_eq!(eligible, vec![1]);
        assert_eq!(outcome.stale.len(), 2);
    }

    #[test]
    fn test_same_key_different_attestors_both_eligible() {
        let outcome = FreshnessGate::new().filter(
            vec![
                (0, verified(attestor(1), vec![Observation::numeric("ETH", 1, 5)])),
                (1, verified(attestor(2), vec![Observation::numeric("ETH", 2, 5)])),
            ],
            &HashMap::new(),
        );
        assert_eq!(outcome.eligible.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_eligible_iff_strictly_newer(current_ts in any::<u64>(), candidate_ts in any::<u64>()) {
            let a = attestor(9);
            let (_, current) = stored(a, "K", current_ts);
            let obs = Observation::numeric("K", 0, candidate_ts);
            prop_assert_eq!(is_eligible(&obs, a, Some(&current)), candidate_ts > current_ts);
        }

        #[test]
        fn prop_filter_partitions_batch(
            stored_ts in proptest::collection::vec(0u64..20, 3),
            batch in proptest::collection::vec((0usize..3, 0u64..20), 0..12),
        ) {
            let keys = ["A", "B", "C"];
            let a = attestor(1);
            let current: HashMap<_, _> = keys
                .iter()
                .zip(&stored_ts)
                .map(|(k, ts)| stored(a, k, *ts))
                .collect();

            let candidates: Vec<_> = batch
                .iter()
                .enumerate()
                .map(|(i, (k, ts))| (i, verified(a, vec![Observation::numeric(keys[*k], 0, *ts)])))
                .collect();
            let total = candidates.len();

            let outcome = FreshnessGate::new().filter(candidates, &current);
            prop_assert_eq!(outcome.eligible.len() + outcome.stale.len(), total);

            // At most one eligible payload per key, and it beats the chain.
            let mut seen = std::collections::HashSet::new();
            for (_, p) in &outcome.eligible {
                let obs = &p.observations()[0];
                prop_assert!(seen.insert(obs.key.clone()));
                let record = &current[&RecordKey::new(a, obs.key.clone())];
                prop_assert!(obs.timestamp > record.observation.timestamp);
            }
        }
    }
}
