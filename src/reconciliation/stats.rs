use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::processor::PairOutcome;

/// Counters for one run. Logged, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRunStats {
    pub run_id: Uuid,
    /// Pairs that finished without error, skips included
    pub processed: usize,
    /// Pairs with no safe block yet
    pub skipped: usize,
    pub reconciled: usize,
    pub errors: usize,
    pub duration: Duration,
}

impl WorkerRunStats {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            processed: 0,
            skipped: 0,
            reconciled: 0,
            errors: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn record(&mut self, outcome: PairOutcome) {
        self.processed += 1;
        match outcome {
            PairOutcome::Skipped => self.skipped += 1,
            PairOutcome::Reconciled => self.reconciled += 1,
            PairOutcome::InSync | PairOutcome::AlreadyReconciled => {}
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn finish(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn log_summary(&self) {
        info!(
            run_id = %self.run_id,
            processed = self.processed,
            skipped = self.skipped,
            reconciled = self.reconciled,
            errors = self.errors,
            duration_ms = self.duration.as_millis() as u64,
            "✓ Reconciliation run completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_are_counted() {
        let mut stats = WorkerRunStats::new(Uuid::new_v4());
        stats.record(PairOutcome::InSync);
        stats.record(PairOutcome::Reconciled);
        stats.record(PairOutcome::Skipped);
        stats.record(PairOutcome::AlreadyReconciled);
        stats.record_error();

        assert_eq!(stats.processed, 4);
        assert_eq!(stats.reconciled, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 1);
    }
}
