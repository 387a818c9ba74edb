//! Per-job rollup of numeric observations

use crate::records::{AggregateKey, AggregateUpdate, ProcessedObservation};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    cnt: i64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn new(value: f64) -> Self {
        Self {
            cnt: 1,
            sum: value,
            min: value,
            max: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.cnt += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Group numeric observations by entity and measurement type.
///
/// Textual observations are ignored. Output is sorted by key.
pub fn build_aggregates(job_id: &str, observations: &[ProcessedObservation]) -> Vec<AggregateUpdate> {
    let mut groups: BTreeMap<AggregateKey, Accumulator> = BTreeMap::new();

    for obs in observations {
        let Some(value) = obs.value_num() else {
            continue;
        };
        groups
            .entry(AggregateKey::of(obs))
            .and_modify(|acc| acc.push(value))
            .or_insert_with(|| Accumulator::new(value));
    }

    groups
        .into_iter()
        .map(|(key, acc)| AggregateUpdate {
            key,
            cnt: acc.cnt,
            avg_num: acc.sum / acc.cnt as f64,
            min_num: acc.min,
            max_num: acc.max,
            job_id: job_id.to_string(),
        })
        .collect()
}
