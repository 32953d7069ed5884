//! Concurrency scheduler driving a load run.
//!
//! Two scheduling models are supported:
//!
//! - **Window**: a fixed number of slots. Each slot runs its sender, releases,
//!   and after `tx_interval` the same sender comes back with a freshly drawn
//!   behavior. Requests arriving while every slot is busy wait in a FIFO queue
//!   and take the next freed slot.
//! - **Batch**: every scheduling window takes the next rotation group, plans
//!   its behaviors, dispatches the group at once and waits for all of it.
//!
//! In both models a sender holds its account lock for the whole dispatch, so
//! no two dispatches for one address ever overlap.

use std::{sync::Arc, time::Duration};

use alloy_primitives::Address;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{
    account::Account,
    artifacts::ContractArtifact,
    balance::BalanceGuardian,
    behavior::{self, BehaviorDeck, Weights},
    client::ChainClient,
    config::{ConfigError, LoadConfig, SchedulingMode},
    constants::STOP_POLL_INTERVAL,
    dispatcher::TransactionDispatcher,
    locks::AccountLocks,
    metrics::{MetricSample, MetricsAggregator},
    report::RunSummary,
    rotation::AccountRotationPool,
    state::{Outcome, RunState},
    window::{Admission, PendingRequest, SlotWindow},
};

/// What happened to a request offered to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A slot was free and the dispatch started.
    Started,
    /// Every slot was busy; the request waits in the queue.
    Queued,
    /// The run is stopping; the request was dropped.
    Rejected,
}

/// Picks the sender accounts of a run.
///
/// The funding account never sends. When `limit` is set only the first
/// `limit` remaining accounts are used.
pub fn select_senders(
    accounts: &[Account],
    funding: Address,
    limit: Option<usize>,
) -> Vec<Account> {
    accounts
        .iter()
        .filter(|a| a.address() != funding)
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

/// Orchestrates slots, the pending queue and the sender rotation of one run.
pub struct ConcurrencyScheduler<C> {
    config: LoadConfig,
    weights: Weights,
    pool: AccountRotationPool,
    dispatcher: TransactionDispatcher<C>,
    locks: AccountLocks,
    window: SlotWindow,
    deck: Mutex<BehaviorDeck>,
    state: RunState,
    metrics: Arc<MetricsAggregator>,
    tracker: TaskTracker,
}

impl<C> std::fmt::Debug for ConcurrencyScheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyScheduler")
            .field("mode", &self.config.mode)
            .field("window", &self.window)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<C: ChainClient + 'static> ConcurrencyScheduler<C> {
    /// Wires up a run over `accounts`, funded from `funding`.
    ///
    /// Fails before anything is dispatched when the configuration is invalid
    /// or the accounts cannot fill `concurrency x rotation_groups` slots.
    pub fn assemble(
        client: Arc<C>,
        funding: Account,
        accounts: &[Account],
        artifact: &ContractArtifact,
        config: LoadConfig,
        metrics: Arc<MetricsAggregator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let senders = select_senders(accounts, funding.address(), config.account_count);
        let pool = AccountRotationPool::new(&senders, config.concurrency, config.rotation_groups)?;
        let receivers = senders.iter().map(Account::address).collect();

        let locks = AccountLocks::new();
        let guardian = BalanceGuardian::new(Arc::clone(&client), locks.clone(), funding, &config);
        let dispatcher = TransactionDispatcher::new(client, guardian, receivers, artifact, &config);

        Ok(Self::new(config, pool, dispatcher, locks, metrics))
    }

    /// Creates a scheduler from already built parts.
    pub fn new(
        config: LoadConfig,
        pool: AccountRotationPool,
        dispatcher: TransactionDispatcher<C>,
        locks: AccountLocks,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        let weights = behavior::weights(config.complexity);
        let width = config.concurrency;
        Self {
            weights,
            pool,
            dispatcher,
            locks,
            window: SlotWindow::new(width),
            deck: Mutex::new(BehaviorDeck::new(weights, width)),
            state: RunState::new(),
            metrics,
            tracker: TaskTracker::new(),
            config,
        }
    }

    /// Counters and stop flag of this run.
    pub const fn state(&self) -> &RunState {
        &self.state
    }

    /// The slot window.
    pub const fn window(&self) -> &SlotWindow {
        &self.window
    }

    /// Per-address locks shared by the slots and the balance guardian.
    pub const fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    /// Effective configuration.
    pub const fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Requests the run to stop. Returns immediately.
    ///
    /// Queued requests are dropped at once, so a slot finishing after this
    /// call never picks up stale work.
    pub fn stop(&self) {
        self.state.request_stop();
        let dropped = self.window.close();
        self.publish_occupancy();
        if dropped > 0 {
            debug!(dropped, "Dropped queued requests");
        }
    }

    /// Runs until stopped and returns the completion summary.
    ///
    /// After a stop request no new round starts, the pending queue is dropped
    /// and the summary is produced only once every active slot has drained.
    pub async fn run(self: Arc<Self>) -> RunSummary {
        info!(
            mode = %self.config.mode,
            concurrency = self.config.concurrency,
            rotation_groups = self.pool.group_count(),
            complexity = self.config.complexity,
            weights = ?self.weights,
            "Run started"
        );

        self.spawn_reporter();
        if let Some(duration) = self.config.duration {
            self.spawn_deadline(duration);
        }

        match self.config.mode {
            SchedulingMode::Window => {
                self.seed_window();
                self.state.stop_token().cancelled().await;
            }
            SchedulingMode::Batch => Arc::clone(&self).run_batches().await,
        }

        self.drain().await
    }

    /// Offers a request to the window, starting a slot task when admitted.
    pub fn submit(self: &Arc<Self>, request: PendingRequest) -> Submission {
        if self.state.is_stopping() {
            return Submission::Rejected;
        }
        let submission = match self.window.admit(request) {
            Admission::Admitted(request) => {
                let scheduler = Arc::clone(self);
                self.tracker.spawn(scheduler.run_slot(request));
                Submission::Started
            }
            Admission::Queued => Submission::Queued,
            Admission::Closed => Submission::Rejected,
        };
        self.publish_occupancy();
        submission
    }

    /// Pairs the first rotation group with a freshly planned set of behaviors.
    fn seed_window(self: &Arc<Self>) {
        let group = self.pool.next_group().to_vec();
        let behaviors = {
            let mut deck = self.deck.lock();
            let mut rng = rand::rng();
            group.iter().map(|_| deck.draw(&mut rng)).collect::<Vec<_>>()
        };
        for (sender, behavior) in group.into_iter().zip(behaviors) {
            self.submit(PendingRequest { sender, behavior });
        }
    }

    /// Body of one slot: runs its request, then any request handed over by
    /// the queue, and schedules each finished sender's next round.
    async fn run_slot(self: Arc<Self>, mut request: PendingRequest) {
        loop {
            if let (_, Some(sample)) = self.execute(&request).await {
                self.metrics.observe(sample);
            }

            let next = self.window.complete();
            self.publish_occupancy();
            self.schedule_next_round(request.sender);

            match next {
                Some(queued) => request = queued,
                None => break,
            }
        }
    }

    fn schedule_next_round(self: &Arc<Self>, sender: Account) {
        if self.state.is_stopping() {
            return;
        }
        let scheduler = Arc::clone(self);
        self.tracker.spawn(async move {
            tokio::select! {
                _ = scheduler.state.stop_token().cancelled() => return,
                _ = tokio::time::sleep(scheduler.config.tx_interval) => {}
            }
            let behavior = scheduler.deck.lock().draw(&mut rand::rng());
            let submission = scheduler.submit(PendingRequest { sender, behavior });
            debug!(?submission, %behavior, "Next round submitted");
        });
    }

    /// Dispatches one request under the sender's lock and records its outcome.
    async fn execute(&self, request: &PendingRequest) -> (Outcome, Option<MetricSample>) {
        let sender = &request.sender;
        let _guard = self.locks.acquire(sender.address()).await;

        self.state.record_attempt();
        let started = Instant::now();
        let result = self
            .dispatcher
            .dispatch_with_deadline(sender, request.behavior, self.config.tx_timeout)
            .await;
        let elapsed = started.elapsed();

        let (outcome, sample) = match result {
            Ok(outcome) => {
                debug!(
                    sender = %sender.address(),
                    receiver = %outcome.receiver,
                    action = %outcome.action,
                    tx_hash = %outcome.tx_hash,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Dispatch succeeded"
                );
                (Outcome::Success, Some(MetricSample::new(elapsed, Some(outcome.gas_price))))
            }
            Err(e) if e.is_timeout() => (Outcome::TimedOut, None),
            Err(_) => (Outcome::Failed, None),
        };
        self.state.record(outcome);
        self.metrics.record_outcome(outcome);
        (outcome, sample)
    }

    async fn run_batches(self: Arc<Self>) {
        let stop = self.state.stop_token().clone();
        while !stop.is_cancelled() {
            let group = self.pool.next_group().to_vec();
            let behaviors = behavior::plan(&self.weights, group.len(), &mut rand::rng());

            let slots = group.into_iter().zip(behaviors).map(|(sender, behavior)| {
                self.execute_batch_slot(PendingRequest { sender, behavior })
            });
            let samples: Vec<_> = join_all(slots).await.into_iter().flatten().collect();

            if let Some(summary) = self.metrics.record_batch(&samples) {
                info!(
                    samples = summary.samples,
                    min_ms = summary.duration.min.as_millis() as u64,
                    max_ms = summary.duration.max.as_millis() as u64,
                    avg_ms = summary.duration.avg.as_millis() as u64,
                    gas_avg_gwei = ?summary.gas_price_gwei.map(|g| g.avg),
                    "Batch completed"
                );
            } else {
                warn!("Batch completed without a successful transaction");
            }

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(self.config.tx_interval) => {}
            }
        }
    }

    async fn execute_batch_slot(&self, request: PendingRequest) -> Option<MetricSample> {
        let Admission::Admitted(request) = self.window.admit(request) else {
            return None;
        };
        self.publish_occupancy();
        let (_, sample) = self.execute(&request).await;
        // Batches are never wider than the window, so nothing is ever queued.
        let _ = self.window.complete();
        self.publish_occupancy();
        sample
    }

    fn spawn_reporter(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        self.tracker.spawn(async move {
            let stop = scheduler.state.stop_token().clone();
            let mut ticker = tokio::time::interval(scheduler.config.reporting_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => scheduler.report_progress(),
                }
            }
        });
    }

    fn report_progress(&self) {
        let counters = self.state.counters();
        let window = self.metrics.drain_window();
        info!(
            total = counters.total,
            success = counters.success,
            failed = counters.failed,
            timed_out = counters.timed_out,
            elapsed_secs = counters.elapsed.as_secs(),
            active = self.window.active(),
            pending = self.window.pending(),
            avg_ms = ?window.map(|w| w.duration.avg.as_millis() as u64),
            gas_avg_gwei = ?window.and_then(|w| w.gas_price_gwei).map(|g| g.avg),
            "Progress"
        );
    }

    fn spawn_deadline(self: &Arc<Self>, duration: Duration) {
        let scheduler = Arc::clone(self);
        self.tracker.spawn(async move {
            tokio::select! {
                _ = scheduler.state.stop_token().cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    info!(?duration, "Run duration elapsed, stopping");
                    scheduler.stop();
                }
            }
        });
    }

    async fn drain(&self) -> RunSummary {
        self.window.close();
        self.publish_occupancy();
        info!(active = self.window.active(), "Stopping, waiting for active slots");

        while self.window.active() > 0 {
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
        self.tracker.close();
        self.tracker.wait().await;
        self.publish_occupancy();

        let counters = self.state.counters();
        let accounts = self.pool.accounts().count();
        let summary = RunSummary::new(&self.config, accounts, &counters, self.window.pending());
        info!(
            total = counters.total,
            success = counters.success,
            failed = counters.failed,
            timed_out = counters.timed_out,
            elapsed_secs = counters.elapsed.as_secs_f64(),
            throughput = counters.throughput(),
            "Run completed"
        );
        summary
    }

    fn publish_occupancy(&self) {
        self.metrics.set_occupancy(self.window.active(), self.window.pending());
    }
}
