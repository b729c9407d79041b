use std::path::PathBuf;

use alloy::primitives::Address;
use contracts::ArtifactError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::deploy::DeployStage;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("contract address file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid contract address in {}: {reason}", path.display())]
    InvalidAddress { path: PathBuf, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("network error: {0}")]
    Network(String),

    #[error("contract call `{method}` failed: {message}")]
    ContractCall {
        method: &'static str,
        message: String,
    },

    #[error("deployment failed while {stage}: {source}")]
    Deployment {
        stage: DeployStage,
        #[source]
        source: Box<HarnessError>,
    },

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("contract deployed at {address} but not verified: {source}")]
    Unverified {
        address: Address,
        #[source]
        source: Box<HarnessError>,
    },

    #[error("cancelled by operator")]
    Cancelled,
}

impl HarnessError {
    pub(crate) fn at(self, stage: DeployStage) -> Self {
        match self {
            err @ HarnessError::Deployment { .. } => err,
            err => HarnessError::Deployment {
                stage,
                source: Box::new(err),
            },
        }
    }
}
