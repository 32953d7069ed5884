//! Start/stop/metrics control surface over successive runs.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    account::Account,
    artifacts::ContractArtifact,
    client::ChainClient,
    config::{LoadConfig, RunOverrides},
    error::ControlError,
    metrics::MetricsAggregator,
    report::{RunSummary, SummarySink},
    scheduler::ConcurrencyScheduler,
};

/// Control operations exposed to the HTTP control plane.
#[async_trait]
pub trait RunControl: Send + Sync {
    /// Starts a run with the given overrides and returns immediately.
    async fn start(&self, overrides: RunOverrides) -> Result<(), ControlError>;

    /// Requests the active run to stop and returns immediately.
    async fn stop(&self) -> Result<(), ControlError>;

    /// Renders the metrics in the Prometheus text format.
    fn metrics(&self) -> String;

    /// Returns true while a run is active or draining.
    fn is_running(&self) -> bool;
}

struct ActiveRun<C> {
    scheduler: Arc<ConcurrencyScheduler<C>>,
    summary: watch::Receiver<Option<RunSummary>>,
}

impl<C> ActiveRun<C> {
    /// A run is finished once its summary is published or its task is gone.
    fn is_finished(&self) -> bool {
        self.summary.borrow().is_some() || self.summary.has_changed().is_err()
    }
}

/// Owns the run lifecycle: at most one run exists at a time.
///
/// Each run gets fresh counters; the metrics recorder lives as long as the
/// controller so series survive across runs.
pub struct Controller<C> {
    client: Arc<C>,
    funding: Account,
    accounts: Vec<Account>,
    artifact: ContractArtifact,
    config: LoadConfig,
    metrics: Arc<MetricsAggregator>,
    sink: Arc<dyn SummarySink>,
    run: Mutex<Option<ActiveRun<C>>>,
}

impl<C> std::fmt::Debug for Controller<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("funding", &self.funding.address())
            .field("accounts", &self.accounts.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: ChainClient + 'static> Controller<C> {
    /// Creates an idle controller.
    pub fn new(
        client: Arc<C>,
        funding: Account,
        accounts: Vec<Account>,
        artifact: ContractArtifact,
        config: LoadConfig,
        metrics: Arc<MetricsAggregator>,
        sink: Arc<dyn SummarySink>,
    ) -> Self {
        Self {
            client,
            funding,
            accounts,
            artifact,
            config,
            metrics,
            sink,
            run: Mutex::new(None),
        }
    }

    /// Base configuration that overrides are applied to.
    pub const fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Scheduler of the current or most recent run.
    pub fn scheduler(&self) -> Option<Arc<ConcurrencyScheduler<C>>> {
        self.run.lock().as_ref().map(|run| Arc::clone(&run.scheduler))
    }

    fn start_run(&self, overrides: &RunOverrides) -> Result<(), ControlError> {
        let mut run = self.run.lock();
        if run.as_ref().is_some_and(|r| !r.is_finished()) {
            return Err(ControlError::AlreadyRunning);
        }

        let config = self.config.with_overrides(overrides);
        let scheduler = Arc::new(ConcurrencyScheduler::assemble(
            Arc::clone(&self.client),
            self.funding.clone(),
            &self.accounts,
            &self.artifact,
            config,
            Arc::clone(&self.metrics),
        )?);

        let (tx, summary) = watch::channel(None);
        let sink = Arc::clone(&self.sink);
        let task = Arc::clone(&scheduler);
        tokio::spawn(async move {
            let summary = task.run().await;
            let record = summary.clone();
            match tokio::task::spawn_blocking(move || sink.write(&record)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Failed to persist run summary"),
                Err(e) => warn!(error = %e, "Summary writer panicked"),
            }
            let _ = tx.send(Some(summary));
        });
        *run = Some(ActiveRun { scheduler, summary });
        Ok(())
    }

    fn stop_run(&self) -> Result<(), ControlError> {
        let run = self.run.lock();
        match run.as_ref() {
            Some(active) if !active.is_finished() && !active.scheduler.state().is_stopping() => {
                active.scheduler.stop();
                info!("Stop requested");
                Ok(())
            }
            _ => Err(ControlError::NotRunning),
        }
    }

    /// Waits for the current or most recent run to finish and returns its summary.
    ///
    /// Returns `None` when no run was started or the run task died.
    pub async fn join(&self) -> Option<RunSummary> {
        let mut rx = self.run.lock().as_ref().map(|run| run.summary.clone())?;
        match rx.wait_for(Option::is_some).await {
            Ok(summary) => (*summary).clone(),
            Err(_) => {
                warn!("Run task ended without a summary");
                None
            }
        }
    }

    /// Stops the active run, if any, and waits for it to drain.
    pub async fn shutdown(&self) -> Option<RunSummary> {
        if self.stop_run().is_ok() {
            info!("Draining active run");
        }
        self.join().await
    }
}

#[async_trait]
impl<C: ChainClient + 'static> RunControl for Controller<C> {
    async fn start(&self, overrides: RunOverrides) -> Result<(), ControlError> {
        self.start_run(&overrides)
    }

    async fn stop(&self) -> Result<(), ControlError> {
        self.stop_run()
    }

    fn metrics(&self) -> String {
        self.metrics.render()
    }

    fn is_running(&self) -> bool {
        self.run.lock().as_ref().is_some_and(|r| !r.is_finished())
    }
}
