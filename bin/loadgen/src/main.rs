//! Load generator binary entry point.
//!
//! Subcommands:
//!
//! - `serve`: control-plane service, runs are started and stopped over HTTP
//! - `run`: a single run, stopped by `--duration` or a signal
//! - `setup`: create and fund sender accounts, write the wallets file
//! - `info`: print the funding account and its balance
//! - `deploy-token`: deploy the faucet token used by token transfers

mod cli;
mod logging;

use alloy_primitives::utils::format_ether;
use base_loadgen::{AlloyChainClient, ChainClient, deploy_token, provision, with_retry};
use clap::Parser;
use eyre::{Result, WrapErr};
use tracing::{info, warn};

use crate::cli::{Cli, Command, DeployTokenArgs, SetupArgs};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = cli.logging.init_tracing_subscriber()?;

    match cli.command {
        Command::Serve(args) => {
            let config = args.load.service_config(&args.chain, None)?;
            base_loadgen::run_service(config, args.listen).await
        }
        Command::Run(args) => {
            let config = args.load.service_config(&args.chain, args.duration)?;
            match base_loadgen::run(config).await? {
                Some(summary) => {
                    let line =
                        serde_json::to_string(&summary).wrap_err("failed to encode summary")?;
                    println!("{line}");
                    Ok(())
                }
                None => Err(eyre::eyre!("run ended without a summary")),
            }
        }
        Command::Setup(args) => setup(args).await,
        Command::Info(chain) => {
            let funding = chain.funding_account()?;
            let client = AlloyChainClient::new(chain.rpc_url.clone());
            let address = funding.address();
            let balance = with_retry("balance", &chain.retry_policy(), || client.balance(address))
                .await
                .wrap_err("failed to read funding balance")?;
            let chain_id = client.chain_id().await.wrap_err("failed to read chain id")?;
            println!("chain id:        {chain_id}");
            println!("funding address: {address}");
            println!("funding balance: {} ETH", format_ether(balance));
            Ok(())
        }
        Command::DeployToken(args) => deploy(args).await,
    }
}

async fn deploy(args: DeployTokenArgs) -> Result<()> {
    let funding = args.chain.funding_account()?;
    let artifact = args.artifact()?;
    let client = AlloyChainClient::new(args.chain.rpc_url.clone());

    let deployment = deploy_token(&client, &funding, &artifact, &args.chain.retry_policy())
        .await
        .wrap_err("token deployment failed")?;
    println!("token address: {}", deployment.address);
    println!("deployer:      {}", deployment.deployer);
    println!("tx hash:       {}", deployment.tx_hash);
    println!("pass --token-address {} to enable token transfers", deployment.address);
    Ok(())
}

async fn setup(args: SetupArgs) -> Result<()> {
    let funding = args.chain.funding_account()?;
    let accounts = args.accounts()?;
    let client = AlloyChainClient::new(args.chain.rpc_url.clone());

    let report =
        provision(&client, &funding, &accounts, args.fund_amount, &args.chain.retry_policy())
            .await
            .wrap_err("provisioning failed")?;

    report
        .wallets
        .save(&args.output)
        .wrap_err_with(|| format!("failed to write {}", args.output.display()))?;

    if !report.failed.is_empty() {
        warn!(failed = report.failed.len(), "Some accounts were not funded");
    }
    info!(
        funded = report.funded.len(),
        failed = report.failed.len(),
        output = %args.output.display(),
        "Setup complete"
    );
    Ok(())
}
