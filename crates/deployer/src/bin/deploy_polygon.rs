use std::io;

use anyhow::Result;
use clap::Command;
use contracts::ArtifactStore;
use deployer::{
    chain,
    config::Settings,
    deploy::{self, DeployTarget, IsItMoonYetDeployer, Verification},
    explorer::EtherscanVerifier,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    Command::new("IsItMoonYet Polygon Deployer")
        .version("1.0")
        .about("Deploys IsItMoonYet to Polygon and verifies it on Polygonscan")
        .get_matches();

    let settings = Settings::from_env()?;
    let target = DeployTarget::polygon();
    let profile = settings.profile(target.network)?;

    // Explorer credentials are checked before any gas is spent.
    let verifier = EtherscanVerifier::for_profile(&profile)?;
    let backend = chain::connect(&profile, &settings.anvil).await?;
    let artifacts = ArtifactStore::new(&settings.artifacts_dir);

    let verification = Verification {
        verifier: &verifier,
        policy: &settings.verification,
        compiler: &settings.compiler,
    };
    let cancel = deploy::cancel_on(tokio::signal::ctrl_c());

    let result = IsItMoonYetDeployer::new(&backend, &artifacts)
        .deploy_and_verify(&target, &verification, cancel, &mut io::stdout())
        .await?;

    tracing::info!(
        address = %result.address,
        outcome = ?result.verification,
        "deployment completed"
    );
    Ok(())
}
