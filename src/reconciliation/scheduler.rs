// Reconciliation scheduler
//
// start() runs one batch inline, then arms a fixed-interval timer. Runs are
// serialised by a single-slot guard: a tick that arrives while a run is still
// going is skipped, never queued. stop() is cooperative and is observed at
// the next pair boundary or during the inter-pair delay. A run armed before a
// stop never resumes, even if the worker is started again before it winds down.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::bounded;
use super::processor::PairProcessor;
use super::stats::WorkerRunStats;
use crate::chain::BalanceOracle;
use crate::config::WorkerConfig;
use crate::error::AppResult;
use crate::ledger::LedgerStore;

/// Lifecycle state shared by the worker and its runs. Every start() opens
/// a new epoch; a run belongs to the epoch it was armed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    pub epoch: u64,
    pub running: bool,
}

impl RunState {
    fn is_live(&self, epoch: u64) -> bool {
        self.running && self.epoch == epoch
    }
}

/// Observes the worker's lifecycle from inside a run. Once the epoch it was
/// armed in has been stopped it stays stopped, even across a restart.
#[derive(Debug, Clone)]
pub struct StopSignal {
    state: watch::Receiver<RunState>,
    epoch: Option<u64>,
}

impl StopSignal {
    pub fn armed(state: watch::Receiver<RunState>, epoch: u64) -> Self {
        Self {
            state,
            epoch: Some(epoch),
        }
    }

    /// A signal that never fires, for one-shot runs
    pub fn never() -> Self {
        let (_, state) = watch::channel(RunState::default());
        Self { state, epoch: None }
    }

    pub fn is_stopped(&self) -> bool {
        match self.epoch {
            Some(epoch) => !self.state.borrow().is_live(epoch),
            None => false,
        }
    }

    /// Resolves once the armed epoch is stopped
    pub async fn stopped(&mut self) {
        let Some(epoch) = self.epoch else {
            return futures::future::pending().await;
        };
        // A dropped sender means the worker is gone, which counts as stopped
        let _ = self.state.wait_for(|state| !state.is_live(epoch)).await;
    }
}

struct WorkerInner {
    config: WorkerConfig,
    store: Arc<dyn LedgerStore>,
    processor: PairProcessor,
    state: watch::Sender<RunState>,
    run_guard: tokio::sync::Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
    last_run: Mutex<Option<WorkerRunStats>>,
}

/// Periodic balance reconciliation worker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReconciliationWorker {
    inner: Arc<WorkerInner>,
}

impl ReconciliationWorker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn LedgerStore>,
        oracle: Arc<dyn BalanceOracle>,
    ) -> AppResult<Self> {
        config.validate()?;

        let processor = PairProcessor::new(&config, store.clone(), oracle);
        let (state, _) = watch::channel(RunState::default());

        Ok(Self {
            inner: Arc::new(WorkerInner {
                config,
                store,
                processor,
                state,
                run_guard: tokio::sync::Mutex::new(()),
                timer: Mutex::new(None),
                last_run: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.borrow().running
    }

    /// Stats of the most recent completed run
    pub fn last_run(&self) -> Option<WorkerRunStats> {
        self.inner.last_run.lock().clone()
    }

    /// Stopped -> Running. Runs one batch before arming the poll timer.
    pub async fn start(&self) {
        let mut epoch = 0;
        let started = self.inner.state.send_if_modified(|state| {
            if state.running {
                return false;
            }
            state.epoch += 1;
            state.running = true;
            epoch = state.epoch;
            true
        });
        if !started {
            warn!("Worker already running");
            return;
        }

        info!(
            epoch,
            chain_id = self.inner.config.chain_id,
            batch_size = self.inner.config.batch_size,
            poll_interval_ms = self.inner.config.poll_interval_ms,
            rate_limit_ms = self.inner.config.rate_limit_ms,
            "🚀 Reconciliation worker started"
        );

        // Errors are logged inside run_once; the next tick retries
        let _ = self.run_once().await;

        // Stopped, or stopped and restarted, while the first run was going
        if !self.inner.state.borrow().is_live(epoch) {
            return;
        }

        let handle = tokio::spawn(self.clone().poll_loop(epoch));
        *self.inner.timer.lock() = Some(handle);
    }

    /// Running -> Stopped. Disarms the timer and waits for it to wind down;
    /// an in-flight run ends at its next pair boundary.
    pub async fn stop(&self) {
        let stopped = self.inner.state.send_if_modified(|state| {
            let was_running = state.running;
            state.running = false;
            was_running
        });
        if !stopped {
            return;
        }

        let timer = self.inner.timer.lock().take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                error!("Poll timer task failed: {:?}", e);
            }
        }

        info!("🛑 Reconciliation worker stopped");
    }

    async fn poll_loop(self, epoch: u64) {
        let period = Duration::from_millis(self.inner.config.poll_interval_ms);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stop = StopSignal::armed(self.inner.state.subscribe(), epoch);

        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = ticker.tick() => {
                    let _ = self.run_once().await;
                }
            }
        }

        debug!(epoch, "⏰ Poll timer disarmed");
    }

    /// Execute one reconciliation run.
    ///
    /// Returns `Ok(None)` when another run is still in progress. A run on a
    /// stopped worker is a one-shot run and goes through the whole batch.
    /// Only a candidate-fetch failure makes the run itself fail.
    pub async fn run_once(&self) -> AppResult<Option<WorkerRunStats>> {
        let Ok(_guard) = self.inner.run_guard.try_lock() else {
            warn!("⏭️ Previous reconciliation run still in progress, skipping");
            return Ok(None);
        };

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let state = *self.inner.state.borrow();
        let stop = if state.running {
            StopSignal::armed(self.inner.state.subscribe(), state.epoch)
        } else {
            StopSignal::never()
        };

        info!(%run_id, "🔄 Starting reconciliation run");

        let pairs = match bounded(
            "fetch_reconciliation_candidates",
            self.inner.config.store_timeout_ms,
            self.inner
                .store
                .fetch_reconciliation_candidates(self.inner.config.batch_size),
        )
        .await
        {
            Ok(pairs) => pairs,
            Err(e) => {
                error!(%run_id, error = %e, "❌ Failed to fetch balances to reconcile");
                return Err(e);
            }
        };

        let mut stats = WorkerRunStats::new(run_id);

        if pairs.is_empty() {
            info!(%run_id, "✓ No balances to reconcile");
        } else {
            info!(%run_id, count = pairs.len(), "📊 Processing balance reconciliations");
            self.inner
                .processor
                .process_batch(run_id, &pairs, stop, &mut stats)
                .await;
        }

        stats.finish(started.elapsed());
        stats.log_summary();
        *self.inner.last_run.lock() = Some(stats.clone());

        Ok(Some(stats))
    }
}
