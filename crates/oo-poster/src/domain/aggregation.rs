//! # Aggregation
//!
//! Median of the non-expired records of one key.

use super::entities::{AggregateEntry, ObservationValue, StoredRecord};
use super::errors::AggregationError;

/// Computes aggregate entries from stored records.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    max_age_secs: u64,
}

impl Aggregator {
    /// Records older than `max_age_secs` at computation time are ignored.
    pub fn new(max_age_secs: u64) -> Self {
        Self { max_age_secs }
    }

    /// Maximum accepted record age in seconds.
    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }

    /// Recompute the aggregate for `key` at local time `now`.
    ///
    /// Numeric values take the midpoint of the two middle values for even
    /// counts (rounded down); text values take the lower median.
    pub fn recompute(
        &self,
        key: &str,
        records: &[StoredRecord],
        now: u64,
    ) -> Result<AggregateEntry, AggregationError> {
        let live: Vec<&StoredRecord> = records
            .iter()
            .filter(|r| r.observation.key == key)
            .filter(|r| now.saturating_sub(r.observation.timestamp) <= self.max_age_secs)
            .collect();

        if live.is_empty() {
            return Err(AggregationError::InsufficientData {
                key: key.to_string(),
                discarded: records.len(),
            });
        }

        let value = if live
            .iter()
            .all(|r| matches!(r.observation.value, ObservationValue::Numeric(_)))
        {
            let mut values: Vec<u64> = live
                .iter()
                .filter_map(|r| match r.observation.value {
                    ObservationValue::Numeric(v) => Some(v),
                    ObservationValue::Text(_) => None,
                })
                .collect();
            ObservationValue::Numeric(numeric_median(&mut values))
        } else if live
            .iter()
            .all(|r| matches!(r.observation.value, ObservationValue::Text(_)))
        {
            let mut values: Vec<&str> = live
                .iter()
                .filter_map(|r| match &r.observation.value {
                    ObservationValue::Text(s) => Some(s.as_str()),
                    ObservationValue::Numeric(_) => None,
                })
                .collect();
            values.sort_unstable();
            ObservationValue::Text(values[(values.len() - 1) / 2].to_string())
        } else {
            return Err(AggregationError::MixedValueKinds {
                key: key.to_string(),
            });
        };

        Ok(AggregateEntry {
            key: key.to_string(),
            value,
            computed_at: now,
            source_record_count: live.len(),
        })
    }
}

/// `values` must be non-empty.
fn numeric_median(values: &mut [u64]) -> u64 {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        ((values[mid - 1] as u128 + values[mid] as u128) / 2) as u64
    }
}
