use std::io;

use anyhow::Result;
use clap::{Arg, Command};
use contracts::ArtifactStore;
use deployer::{
    chain,
    config::Settings,
    deploy::{DeployTarget, IsItMoonYetDeployer},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let matches = Command::new("IsItMoonYet Deployer")
        .version("1.0")
        .about("Deploys IsItMoonYet to a local fork of Ethereum mainnet")
        .arg(
            Arg::new("block-time")
                .long("block-time")
                .help("Block time of the forked node in seconds (default: mine per transaction)")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("keep-running")
                .long("keep-running")
                .help("Keep the forked node running after deployment so tasks can reach the contract")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let mut settings = Settings::from_env()?;
    if let Some(block_time) = matches.get_one::<u64>("block-time") {
        settings.anvil.block_time = Some(*block_time);
    }

    let target = DeployTarget::mainnet_fork();
    let profile = settings.profile(target.network)?;
    let backend = chain::connect(&profile, &settings.anvil).await?;
    let artifacts = ArtifactStore::new(&settings.artifacts_dir);

    let result = IsItMoonYetDeployer::new(&backend, &artifacts)
        .deploy(&target, &mut io::stdout())
        .await?;

    tracing::info!(
        address = %result.address,
        tx_hash = %result.tx_hash,
        chain_id = ?result.chain_id,
        "deployment completed"
    );

    if matches.get_flag("keep-running") {
        println!("Node endpoint: {}", backend.endpoint());
        backend.wait_for_shutdown().await?;
    }

    Ok(())
}
