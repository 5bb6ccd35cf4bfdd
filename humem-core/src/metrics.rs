//! Runtime counters for the memory engine.
//!
//! Lock-free `AtomicU64` counters incremented on the hot path and read on
//! export. Snapshots render as Prometheus text for dashboards.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for engine events.
#[derive(Debug)]
pub struct EngineCounters {
    /// Records committed to a tier.
    pub records_committed: AtomicU64,
    /// Utterances not stored (too short, review question, duplicate).
    pub utterances_skipped: AtomicU64,
    /// Records deleted by the conflict pipeline or the full sweep.
    pub records_superseded: AtomicU64,
    /// Records evicted by the decay sweep.
    pub records_evicted: AtomicU64,
    /// Index writes that failed and were dropped.
    pub write_failures: AtomicU64,
    /// Retrieval calls served.
    pub retrievals: AtomicU64,
    /// Tier queries abandoned at the fan-out deadline.
    pub fanout_timeouts: AtomicU64,
    /// Access bumps applied.
    pub access_updates: AtomicU64,
    /// Access bumps dropped because the update queue was full.
    pub access_updates_dropped: AtomicU64,
}

impl EngineCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records_committed: AtomicU64::new(0),
            utterances_skipped: AtomicU64::new(0),
            records_superseded: AtomicU64::new(0),
            records_evicted: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            retrievals: AtomicU64::new(0),
            fanout_timeouts: AtomicU64::new(0),
            access_updates: AtomicU64::new(0),
            access_updates_dropped: AtomicU64::new(0),
        }
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment a counter by one.
    pub fn inc(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            records_committed: self.records_committed.load(Ordering::Relaxed),
            utterances_skipped: self.utterances_skipped.load(Ordering::Relaxed),
            records_superseded: self.records_superseded.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            retrievals: self.retrievals.load(Ordering::Relaxed),
            fanout_timeouts: self.fanout_timeouts.load(Ordering::Relaxed),
            access_updates: self.access_updates.load(Ordering::Relaxed),
            access_updates_dropped: self.access_updates_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for EngineCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Records committed.
    pub records_committed: u64,
    /// Utterances skipped.
    pub utterances_skipped: u64,
    /// Records superseded.
    pub records_superseded: u64,
    /// Records evicted.
    pub records_evicted: u64,
    /// Failed writes.
    pub write_failures: u64,
    /// Retrievals served.
    pub retrievals: u64,
    /// Abandoned tier queries.
    pub fanout_timeouts: u64,
    /// Access bumps applied.
    pub access_updates: u64,
    /// Access bumps dropped.
    pub access_updates_dropped: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let series: [(&str, &str, u64); 9] = [
            ("records_committed", "Records committed to a tier", self.records_committed),
            ("utterances_skipped", "Utterances not stored", self.utterances_skipped),
            ("records_superseded", "Records deleted as superseded", self.records_superseded),
            ("records_evicted", "Records evicted by decay", self.records_evicted),
            ("write_failures", "Index writes dropped after failure", self.write_failures),
            ("retrievals", "Retrieval calls served", self.retrievals),
            ("fanout_timeouts", "Tier queries abandoned at the deadline", self.fanout_timeouts),
            ("access_updates", "Access bumps applied", self.access_updates),
            ("access_updates_dropped", "Access bumps dropped", self.access_updates_dropped),
        ];
        let mut out = String::new();
        for (name, help, value) in series {
            out.push_str(&format!(
                "# HELP humem_{name}_total {help}\n\
                 # TYPE humem_{name}_total counter\n\
                 humem_{name}_total {value}\n"
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_snapshot() {
        let counters = EngineCounters::new();
        EngineCounters::inc(&counters.records_committed);
        EngineCounters::add(&counters.records_evicted, 3);
        let snap = counters.snapshot();
        assert_eq!(snap.records_committed, 1);
        assert_eq!(snap.records_evicted, 3);
    }

    #[test]
    fn prometheus_export() {
        let snap = CounterSnapshot {
            retrievals: 42,
            ..CounterSnapshot::default()
        };
        let text = snap.to_prometheus();
        assert!(text.contains("humem_retrievals_total 42"));
        assert!(text.contains("# TYPE humem_records_committed_total counter"));
    }
}
