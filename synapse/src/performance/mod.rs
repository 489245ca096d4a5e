//! Performance Aggregation
//!
//! The aggregator is the ledger of sealed execution records. Per-agent
//! counters are updated under the same write lock that appends a record, so
//! a snapshot never observes a record without its counters (or the reverse).

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;

pub mod record;

pub use record::{ExecutionRecord, ExecutionStatus, FailureReason};

/// Statistical view over one agent's execution records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub agent_id: AgentId,
    pub count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Fraction of successful executions, 0 when there are none
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    count: u64,
    successes: u64,
    total_duration_ms: u64,
    last_execution: Option<DateTime<Utc>>,
}

impl Counters {
    fn add(&mut self, record: &ExecutionRecord) {
        self.count += 1;
        if record.is_success() {
            self.successes += 1;
        }
        self.total_duration_ms += record.duration_ms;
        self.last_execution = self.last_execution.max(Some(record.timestamp));
    }

    fn snapshot(&self, agent_id: &AgentId) -> PerformanceSnapshot {
        let (success_rate, average_duration_ms) = if self.count == 0 {
            (0.0, 0.0)
        } else {
            (
                self.successes as f64 / self.count as f64,
                self.total_duration_ms as f64 / self.count as f64,
            )
        };

        PerformanceSnapshot {
            agent_id: agent_id.clone(),
            count: self.count,
            success_count: self.successes,
            failure_count: self.count - self.successes,
            success_rate,
            average_duration_ms,
            last_execution: self.last_execution,
        }
    }
}

#[derive(Default)]
struct Ledger {
    records: HashMap<AgentId, Vec<ExecutionRecord>>,
    counters: HashMap<AgentId, Counters>,
}

/// Per-agent statistics over execution records
#[derive(Default)]
pub struct PerformanceAggregator {
    ledger: RwLock<Ledger>,
}

impl PerformanceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and update its agent's counters in one step
    pub fn seal(&self, record: ExecutionRecord) {
        let mut ledger = self.ledger.write();
        ledger
            .counters
            .entry(record.agent_id.clone())
            .or_default()
            .add(&record);
        ledger
            .records
            .entry(record.agent_id.clone())
            .or_default()
            .push(record);
    }

    /// Snapshot from the maintained counters
    pub fn snapshot(&self, agent_id: &AgentId) -> PerformanceSnapshot {
        let ledger = self.ledger.read();
        ledger
            .counters
            .get(agent_id)
            .copied()
            .unwrap_or_default()
            .snapshot(agent_id)
    }

    /// An agent's records in sealing order
    pub fn records_for(&self, agent_id: &AgentId) -> Vec<ExecutionRecord> {
        self.ledger
            .read()
            .records
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot derived from the records alone
    pub fn recompute(&self, agent_id: &AgentId) -> PerformanceSnapshot {
        let ledger = self.ledger.read();
        let mut counters = Counters::default();
        for record in ledger.records.get(agent_id).into_iter().flatten() {
            counters.add(record);
        }
        counters.snapshot(agent_id)
    }

    /// Total records across all agents
    pub fn total_records(&self) -> usize {
        self.ledger.read().records.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn record(agent: &str, ok: bool, ms: u64) -> ExecutionRecord {
        let agent_id = AgentId::from_string(agent);
        let started = Utc::now();
        if ok {
            ExecutionRecord::success(agent_id, "op", json!({}), json!({}), started, Duration::from_millis(ms))
        } else {
            ExecutionRecord::failure(
                agent_id,
                "op",
                json!({}),
                FailureReason::HandlerError,
                "boom",
                started,
                Duration::from_millis(ms),
            )
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let aggregator = PerformanceAggregator::new();
        let snapshot = aggregator.snapshot(&AgentId::from_string("a"));
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.last_execution, None);
    }

    #[test]
    fn test_snapshot_counts() {
        let aggregator = PerformanceAggregator::new();
        aggregator.seal(record("a", true, 10));
        aggregator.seal(record("a", false, 30));
        aggregator.seal(record("b", true, 5));

        let a = AgentId::from_string("a");
        let snapshot = aggregator.snapshot(&a);
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.success_count, 1);
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.success_rate, 0.5);
        assert_eq!(snapshot.average_duration_ms, 20.0);
        assert!(snapshot.last_execution.is_some());
        assert_eq!(aggregator.records_for(&a).len(), 2);
        assert_eq!(aggregator.total_records(), 3);
    }

    #[test]
    fn test_concurrent_writers() {
        let aggregator = std::sync::Arc::new(PerformanceAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        aggregator.seal(record("shared", (i + j) % 3 != 0, j));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let id = AgentId::from_string("shared");
        assert_eq!(aggregator.snapshot(&id).count, 400);
        assert_eq!(aggregator.snapshot(&id), aggregator.recompute(&id));
    }

    proptest! {
        #[test]
        fn counters_match_records(outcomes in prop::collection::vec((any::<bool>(), 0u64..5_000), 0..64)) {
            let aggregator = PerformanceAggregator::new();
            for (ok, ms) in &outcomes {
                aggregator.seal(record("p", *ok, *ms));
            }

            let id = AgentId::from_string("p");
            let snapshot = aggregator.snapshot(&id);
            prop_assert_eq!(snapshot.count as usize, outcomes.len());
            prop_assert_eq!(snapshot.count as usize, aggregator.records_for(&id).len());
            prop_assert_eq!(snapshot.success_count as usize, outcomes.iter().filter(|(ok, _)| *ok).count());
            prop_assert_eq!(snapshot, aggregator.recompute(&id));
        }
    }
}
