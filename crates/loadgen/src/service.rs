//! Service lifecycles: a control-plane service and a single headless run.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use eyre::{Result, WrapErr};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::{
    Account, AlloyChainClient, ContractArtifact, Controller, JsonLinesSink, LoadConfig,
    MetricsAggregator, RunControl, RunOverrides, RunSummary,
};

/// Inputs shared by both lifecycles, resolved by the caller.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// JSON-RPC endpoint of the target chain.
    pub rpc_url: Url,
    /// Account that tops up senders.
    pub funding: Account,
    /// Candidate sender accounts.
    pub accounts: Vec<Account>,
    /// Contract deployed by `ContractDeploy` actions.
    pub artifact: ContractArtifact,
    /// Base run configuration.
    pub load: LoadConfig,
    /// File run summaries are appended to.
    pub summary_path: PathBuf,
}

async fn build_controller(config: ServiceConfig) -> Result<Arc<Controller<AlloyChainClient>>> {
    config.load.validate().wrap_err("invalid load configuration")?;

    let client = Arc::new(AlloyChainClient::new(config.rpc_url.clone()));
    let chain_id = client.chain_id().await.wrap_err("failed to reach the RPC endpoint")?;
    info!(endpoint = %config.rpc_url, chain_id, "Chain client initialized");

    let metrics = Arc::new(MetricsAggregator::new().wrap_err("failed to build metrics recorder")?);
    let sink = Arc::new(JsonLinesSink::new(config.summary_path));

    info!(
        funding = %config.funding.address(),
        accounts = config.accounts.len(),
        "Controller initialized"
    );
    Ok(Arc::new(Controller::new(
        client,
        config.funding,
        config.accounts,
        config.artifact,
        config.load,
        metrics,
        sink,
    )))
}

/// Runs the control-plane service until SIGINT or SIGTERM.
///
/// Steps:
/// 1. Install the signal handler
/// 2. Create the chain client and controller
/// 3. Serve the control plane on `addr`
/// 4. On shutdown, stop and drain the active run, then stop the server
pub async fn run_service(config: ServiceConfig, addr: SocketAddr) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Load generator service starting");

    // ── 1. Global cancellation token and signal handler ──────────────────
    let cancel = CancellationToken::new();
    crate::setup_signal_handler(cancel.clone());

    // ── 2. Chain client and controller ───────────────────────────────────
    let controller = build_controller(config).await?;

    // ── 3. Control server ────────────────────────────────────────────────
    let control: Arc<dyn RunControl> = Arc::clone(&controller) as _;
    let mut server = tokio::spawn(crate::serve(addr, control, cancel.clone()));

    tokio::select! {
        _ = cancel.cancelled() => {}
        result = &mut server => {
            cancel.cancel();
            result.wrap_err("control server task failed")??;
        }
    }

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    if let Some(summary) = controller.shutdown().await {
        info!(
            total = summary.metrics.total_transactions,
            success = summary.metrics.successful_transactions,
            "Active run drained"
        );
    }
    if !server.is_finished() {
        server.await.wrap_err("control server task failed")??;
    }

    info!("Load generator service stopped");
    Ok(())
}

/// Runs a single load run with the base configuration.
///
/// The run ends when its configured duration elapses or on SIGINT/SIGTERM,
/// after every active slot has drained.
pub async fn run(config: ServiceConfig) -> Result<Option<RunSummary>> {
    let cancel = CancellationToken::new();
    crate::setup_signal_handler(cancel.clone());

    let controller = build_controller(config).await?;
    controller.start(RunOverrides::default()).await.wrap_err("failed to start run")?;

    let stopper = {
        let controller = Arc::clone(&controller);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            if controller.stop().await.is_ok() {
                info!("Stopping run, draining active slots");
            }
        })
    };

    let summary = controller.join().await;
    cancel.cancel();
    if let Err(e) = stopper.await {
        warn!(error = %e, "Stop task failed");
    }
    Ok(summary)
}
