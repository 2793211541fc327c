use crate::board::LatencyBoard;
use crate::catalog::Catalog;
use crate::error::{PingError, Result};
use crate::filter::{FilterChange, FilterState};
use crate::settings::{Order, Settings, TimeoutPolicy};
use crate::traits::{ProbeOutcome, Prober};
use crate::types::{Provider, Region};
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub type SharedFilter = Arc<RwLock<FilterState>>;

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag for one scheduler instance.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// The polling loop: probe every selected pair, record, pause, repeat.
pub struct Scheduler {
    catalog: Arc<Catalog>,
    filter: SharedFilter,
    board: Arc<LatencyBoard>,
    prober: Arc<dyn Prober>,
    settings: Settings,
    token: CancelToken,
    epoch: u64,
    max_passes: Option<u64>,
}

impl Scheduler {
    pub fn new(
        catalog: Arc<Catalog>,
        filter: SharedFilter,
        board: Arc<LatencyBoard>,
        prober: Arc<dyn Prober>,
        settings: Settings,
        token: CancelToken,
    ) -> Self {
        let epoch = board.epoch();
        Self {
            catalog,
            filter,
            board,
            prober,
            settings,
            token,
            epoch,
            max_passes: None,
        }
    }

    pub fn with_max_passes(mut self, max_passes: Option<u64>) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Runs until cancelled (or `max_passes` is reached). Returns completed passes.
    pub async fn run(self) -> u64 {
        let mut passes = 0;
        if !self.pause(self.settings.settle()).await {
            return passes;
        }

        loop {
            if !self.run_pass().await {
                break;
            }
            passes += 1;
            debug!(epoch = self.epoch, passes, "pass complete");

            if self.max_passes.is_some_and(|max| passes >= max) {
                break;
            }
            if !self.pause(self.settings.interval()).await {
                break;
            }
        }
        passes
    }

    /// One sweep over all pairs. Returns false when cancelled mid-way.
    async fn run_pass(&self) -> bool {
        for (provider, region) in self.pass_order() {
            if self.token.is_cancelled() {
                return false;
            }

            let Some(url) = region.ping_url.as_deref() else {
                continue;
            };
            // Re-read every time so filter edits apply to the running pass
            if !self.is_selected(&provider, &region) {
                continue;
            }

            let Some(sample) = self.measure(url).await else {
                continue;
            };

            if self.token.is_cancelled() {
                return false;
            }
            self.board.record(self.epoch, &provider, &region, sample);
        }
        true
    }

    fn pass_order(&self) -> Vec<(Provider, Region)> {
        let mut pairs = self.catalog.pairs();
        if self.settings.order == Order::Shuffle {
            pairs.shuffle(&mut rand::thread_rng());
        }
        pairs
    }

    fn is_selected(&self, provider: &Provider, region: &Region) -> bool {
        self.filter
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .allows(&provider.key, &region.country)
    }

    /// Best of `probes_per_pair` sequential probes, or None if none produced a sample.
    async fn measure(&self, url: &str) -> Option<u64> {
        let mut best: Option<u64> = None;

        for _ in 0..self.settings.probes_per_pair {
            let outcome = tokio::select! {
                _ = self.token.cancelled() => return None,
                outcome = self.prober.probe(url) => outcome,
            };

            let sample = match outcome {
                ProbeOutcome::Reached(ms) => Some(ms),
                ProbeOutcome::TimedOut(ms) => match self.settings.timeout_policy {
                    TimeoutPolicy::Record => Some(ms),
                    TimeoutPolicy::Discard => {
                        debug!(url, elapsed_ms = ms, "probe timed out, sample discarded");
                        None
                    }
                },
                ProbeOutcome::Failed(reason) => {
                    debug!(url, %reason, "probe failed");
                    None
                }
            };

            if let Some(ms) = sample {
                best = Some(best.map_or(ms, |b| b.min(ms)));
            }
        }
        best
    }

    /// Sleep, waking early on cancellation. Returns false if cancelled.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => !self.token.is_cancelled(),
        }
    }
}

struct Running {
    token: CancelToken,
    handle: JoinHandle<u64>,
}

/// Owns the filter and the running scheduler; restarts it whenever the filter changes.
pub struct Controller {
    catalog: Arc<Catalog>,
    filter: SharedFilter,
    board: Arc<LatencyBoard>,
    prober: Arc<dyn Prober>,
    settings: Settings,
    max_passes: Option<u64>,
    current: Option<Running>,
}

impl Controller {
    pub fn new(
        catalog: Arc<Catalog>,
        filter: FilterState,
        prober: Arc<dyn Prober>,
        settings: Settings,
    ) -> Self {
        let board = Arc::new(LatencyBoard::new(settings.aggregate));
        Self {
            catalog,
            filter: Arc::new(RwLock::new(filter)),
            board,
            prober,
            settings,
            max_passes: None,
            current: None,
        }
    }

    pub fn with_max_passes(mut self, max_passes: u64) -> Self {
        self.max_passes = Some(max_passes);
        self
    }

    pub fn board(&self) -> Arc<LatencyBoard> {
        Arc::clone(&self.board)
    }

    pub fn filter(&self) -> FilterState {
        self.filter.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Start a scheduler instance if none is active and the filter selects something.
    pub fn start(&mut self) {
        if self.current.is_some() {
            return;
        }
        if !self.filter().is_runnable() {
            info!("Nothing selected, scheduler idle");
            return;
        }

        let token = CancelToken::new();
        let scheduler = Scheduler::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.filter),
            Arc::clone(&self.board),
            Arc::clone(&self.prober),
            self.settings.clone(),
            token.clone(),
        )
        .with_max_passes(self.max_passes);

        debug!(epoch = self.board.epoch(), "starting scheduler");
        let handle = tokio::spawn(scheduler.run());
        self.current = Some(Running { token, handle });
    }

    /// Cancel the active instance. Its in-flight probe may still finish, but
    /// the epoch bump guarantees the result never reaches the board.
    pub fn stop(&mut self) {
        if let Some(run) = self.current.take() {
            self.board.advance_epoch();
            run.token.cancel();
            debug!("scheduler cancelled");
        }
    }

    pub fn restart(&mut self) {
        self.stop();
        if self.settings.reset_on_restart {
            self.board.reset();
        }
        self.start();
    }

    /// Apply a filter edit; restarts the scheduler when the selection changed.
    pub fn apply(&mut self, change: &FilterChange) -> bool {
        let changed = self
            .filter
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .apply(change);
        if changed {
            info!(?change, "filter changed, restarting scheduler");
            self.restart();
        }
        changed
    }

    pub fn reset_samples(&mut self) {
        self.board.reset();
    }

    /// Wait for the active instance to finish on its own (only ends with `max_passes`).
    pub async fn join(&mut self) -> Result<u64> {
        match self.current.take() {
            Some(run) => run
                .handle
                .await
                .map_err(|e| PingError::Custom(format!("scheduler task failed: {}", e))),
            None => Ok(0),
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(run) = self.current.take() {
            self.board.advance_epoch();
            run.token.cancel();
            let _ = run.handle.await;
        }
    }
}
