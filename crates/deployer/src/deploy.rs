use std::fmt;
use std::future::Future;
use std::io::Write;

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{address, Address, TxHash},
};
use contracts::{Artifact, ArtifactStore, CONTRACT_NAME};
use tokio::time::sleep;

use crate::chain::{ChainBackend, PendingDeployment};
use crate::config::{CompilerSettings, NetworkName};
use crate::error::HarnessError;
use crate::explorer::{self, ContractVerifier, VerificationOutcome, VerificationPolicy, VerificationRequest};

/// Uniswap pool the mainnet-fork deployment is bound to.
pub const MAINNET_FORK_POOL: Address = address!("07a6e955ba4345bae83ac2a6faa771fddd8a2011");

/// Uniswap pool the Polygon deployment is bound to.
pub const POLYGON_POOL: Address = address!("a374094527e1673a86de625aa59517c5de346d32");

/// Progress of a deployment run. A failure records the stage it happened in.
/// Failures in `Start` are preconditions checked before anything is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStage {
    Start,
    FactoryBound,
    DeploySubmitted,
    DeployConfirmed,
    Paused,
    VerificationSubmitted,
    Done,
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Describes the work done on the way into the stage.
        let doing = match self {
            DeployStage::Start => "checking preconditions",
            DeployStage::FactoryBound => "loading the contract artifact",
            DeployStage::DeploySubmitted => "submitting the deployment transaction",
            DeployStage::DeployConfirmed => "waiting for confirmation",
            DeployStage::Paused => "waiting for the explorer to index",
            DeployStage::VerificationSubmitted => "verifying on the explorer",
            DeployStage::Done => "finishing",
        };
        f.write_str(doing)
    }
}

/// Where and how a deployment runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub network: NetworkName,
    pub pool: Address,
    pub verify: bool,
}

impl DeployTarget {
    pub fn mainnet_fork() -> Self {
        Self {
            network: NetworkName::Localhost,
            pool: MAINNET_FORK_POOL,
            verify: false,
        }
    }

    pub fn polygon() -> Self {
        Self {
            network: NetworkName::Polygon,
            pool: POLYGON_POOL,
            verify: true,
        }
    }

    pub fn constructor_arguments(&self) -> Vec<DynSolValue> {
        vec![DynSolValue::Address(self.pool)]
    }
}

/// Result of a successful deployment
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    pub address: Address,
    pub tx_hash: TxHash,
    pub constructor_arguments: Vec<DynSolValue>,
    pub chain_id: Option<u64>,
    pub block_number: Option<u64>,
    pub stage: DeployStage,
    pub verification: Option<VerificationOutcome>,
}

/// What the explorer needs that is known before deploying: the compiler
/// input and version from the artifact's build info.
#[derive(Debug, Clone)]
pub struct VerificationSource {
    pub contract_name: String,
    pub compiler_version: String,
    pub input: serde_json::Value,
}

/// Explorer side of a production deployment.
pub struct Verification<'a, V> {
    pub verifier: &'a V,
    pub policy: &'a VerificationPolicy,
    pub compiler: &'a CompilerSettings,
}

pub struct IsItMoonYetDeployer<'a, B> {
    backend: &'a B,
    artifacts: &'a ArtifactStore,
}

impl<'a, B: ChainBackend> IsItMoonYetDeployer<'a, B> {
    pub fn new(backend: &'a B, artifacts: &'a ArtifactStore) -> Self {
        Self { backend, artifacts }
    }

    /// Deploy IsItMoonYet bound to `target.pool`, printing the address once
    /// the creation transaction is mined.
    pub async fn deploy<W: Write>(
        &self,
        target: &DeployTarget,
        out: &mut W,
    ) -> Result<DeploymentResult, HarnessError> {
        tracing::info!(
            stage = ?DeployStage::Start,
            network = %target.network,
            pool = %target.pool,
            "starting deployment"
        );
        let info = self.backend.network_info().await;
        if let Some(id) = info.chain_id {
            tracing::info!(chain_id = id, block = ?info.block_number, "network info");
        }

        let artifact = self
            .load_artifact()
            .map_err(|err| err.at(DeployStage::FactoryBound))?;
        tracing::info!(stage = ?DeployStage::FactoryBound, contract = %artifact.qualified_name());

        let constructor_arguments = target.constructor_arguments();
        let init_code = artifact
            .init_code(&constructor_arguments)
            .map_err(|err| HarnessError::from(err).at(DeployStage::FactoryBound))?;

        let pending = self
            .backend
            .submit_deployment(init_code)
            .await
            .map_err(|err| err.at(DeployStage::DeploySubmitted))?;
        let tx_hash = pending.tx_hash();
        tracing::info!(stage = ?DeployStage::DeploySubmitted, %tx_hash);

        let address = self
            .backend
            .confirm_deployment(pending)
            .await
            .map_err(|err| err.at(DeployStage::DeployConfirmed))?;
        check_deployment(address).map_err(|err| err.at(DeployStage::DeployConfirmed))?;
        tracing::info!(stage = ?DeployStage::DeployConfirmed, %address);

        writeln!(out, "{CONTRACT_NAME} deployed to: {address}").map_err(|source| {
            HarnessError::Io {
                path: "<stdout>".into(),
                source,
            }
        })?;

        Ok(DeploymentResult {
            address,
            tx_hash,
            constructor_arguments,
            chain_id: info.chain_id,
            block_number: info.block_number,
            stage: DeployStage::DeployConfirmed,
            verification: None,
        })
    }

    /// Pause, then verify a confirmed deployment on the explorer. Runs until
    /// the policy gives up or `cancel` resolves. The deployment itself is never
    /// undone.
    pub async fn verify<V, C>(
        &self,
        result: &mut DeploymentResult,
        source: &VerificationSource,
        verification: &Verification<'_, V>,
        cancel: C,
    ) -> Result<VerificationOutcome, HarnessError>
    where
        V: ContractVerifier,
        C: Future<Output = ()>,
    {
        let address = result.address;
        let unverified = |err: HarnessError| HarnessError::Unverified {
            address,
            source: Box::new(err),
        };

        let request = VerificationRequest {
            address,
            contract_name: source.contract_name.clone(),
            compiler_version: source.compiler_version.clone(),
            source: source.input.clone(),
            constructor_arguments: result.constructor_arguments.clone(),
        };

        let work = async {
            result.stage = DeployStage::Paused;
            tracing::info!(
                stage = ?DeployStage::Paused,
                delay = ?verification.policy.initial_delay,
                "sleeping before verification"
            );
            sleep(verification.policy.initial_delay).await;

            result.stage = DeployStage::VerificationSubmitted;
            tracing::info!(stage = ?DeployStage::VerificationSubmitted, %address);
            explorer::verify(verification.verifier, &request, verification.policy).await
        };

        let outcome = tokio::select! {
            outcome = work => outcome,
            _ = cancel => Err(HarnessError::Cancelled),
        }
        .map_err(unverified)?;

        result.stage = DeployStage::Done;
        result.verification = Some(outcome.clone());
        tracing::info!(?outcome, "verification finished");
        Ok(outcome)
    }

    /// Full production run: deploy, then verify. The build info needed for
    /// verification is loaded first, so a run that could not verify fails
    /// before spending gas. A verification failure is returned as
    /// [`HarnessError::Unverified`] after the address was printed.
    pub async fn deploy_and_verify<V, C, W>(
        &self,
        target: &DeployTarget,
        verification: &Verification<'_, V>,
        cancel: C,
        out: &mut W,
    ) -> Result<DeploymentResult, HarnessError>
    where
        V: ContractVerifier,
        C: Future<Output = ()>,
        W: Write,
    {
        let source = if target.verify {
            let source = self
                .prepare_verification(verification.compiler)
                .map_err(|err| err.at(DeployStage::Start))?;
            Some(source)
        } else {
            None
        };

        let mut result = self.deploy(target, out).await?;
        match source {
            Some(source) => {
                self.verify(&mut result, &source, verification, cancel).await?;
            }
            None => result.stage = DeployStage::Done,
        }
        Ok(result)
    }

    fn load_artifact(&self) -> Result<Artifact, HarnessError> {
        let artifact = self.artifacts.load(CONTRACT_NAME)?;
        let arity = artifact.constructor_arity();
        if arity != 1 {
            return Err(contracts::ArtifactError::ConstructorArity {
                name: artifact.contract_name,
                expected: 1,
                found: arity,
            }
            .into());
        }
        Ok(artifact)
    }

    /// Reads the artifact's build info, warning when it was compiled with a
    /// solc other than the configured one.
    pub fn prepare_verification(
        &self,
        compiler: &CompilerSettings,
    ) -> Result<VerificationSource, HarnessError> {
        let artifact = self.artifacts.load(CONTRACT_NAME)?;
        let build_info = self.artifacts.build_info(&artifact)?;

        if build_info.solc_version != compiler.version {
            tracing::warn!(
                built_with = %build_info.solc_version,
                configured = %compiler.version,
                "artifact was compiled with a different solc version"
            );
        }

        Ok(VerificationSource {
            contract_name: artifact.qualified_name(),
            compiler_version: format!("v{}", build_info.solc_long_version),
            input: build_info.input,
        })
    }
}

/// Resolves when `signal` fires. If the signal handler cannot be installed
/// this never resolves, so the run goes on without being cancellable.
pub async fn cancel_on<F, E>(signal: F)
where
    F: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    if let Err(err) = signal.await {
        tracing::warn!(%err, "cannot listen for Ctrl+C, verification cannot be cancelled");
        std::future::pending::<()>().await;
    }
}

/// Verify that deployment was successful
fn check_deployment(address: Address) -> Result<(), HarnessError> {
    if address == Address::ZERO {
        return Err(HarnessError::Network(
            "deployment returned the zero address".to_string(),
        ));
    }
    Ok(())
}
