//! Loading of compiled contracts from the Hardhat artifact layout.
//!
//! ```text
//! artifacts/
//!   build-info/<id>.json
//!   contracts/IsItMoonYet.sol/IsItMoonYet.json
//!   contracts/IsItMoonYet.sol/IsItMoonYet.dbg.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use alloy::dyn_abi::{DynSolValue, Specifier};
use alloy::json_abi::JsonAbi;
use alloy_primitives::Bytes;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact for `{name}` not found under {root}; compile the contracts first")]
    NotFound { name: String, root: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed artifact {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{0}` has no creation bytecode (abstract contract or interface?)")]
    NotDeployable(String),
    #[error("constructor of `{name}` takes {expected} argument(s), got {found}")]
    ConstructorArity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("constructor argument #{index} of `{name}` is not a valid `{expected}`")]
    ConstructorArgument {
        name: String,
        index: usize,
        expected: String,
    },
    #[error("invalid constructor ABI of `{name}`: {reason}")]
    InvalidAbi { name: String, reason: String },
}

/// A compiled contract: everything needed to deploy it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
    #[serde(skip)]
    path: PathBuf,
}

/// Compiler record used for explorer verification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_version: String,
    pub solc_long_version: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: String,
}

impl Artifact {
    /// Path of the artifact file this was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fully qualified name as explorers expect it, e.g.
    /// `contracts/IsItMoonYet.sol:IsItMoonYet`.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// Number of inputs the constructor declares.
    pub fn constructor_arity(&self) -> usize {
        self.abi
            .constructor()
            .map(|constructor| constructor.inputs.len())
            .unwrap_or(0)
    }

    /// ABI-encodes `args` against the declared constructor, checking arity and
    /// types.
    pub fn encode_constructor_args(&self, args: &[DynSolValue]) -> Result<Bytes, ArtifactError> {
        let inputs = self
            .abi
            .constructor()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        if inputs.len() != args.len() {
            return Err(ArtifactError::ConstructorArity {
                name: self.contract_name.clone(),
                expected: inputs.len(),
                found: args.len(),
            });
        }

        for (index, (param, value)) in inputs.iter().zip(args).enumerate() {
            let ty = param.resolve().map_err(|err| ArtifactError::InvalidAbi {
                name: self.contract_name.clone(),
                reason: err.to_string(),
            })?;
            if !ty.matches(value) {
                return Err(ArtifactError::ConstructorArgument {
                    name: self.contract_name.clone(),
                    index,
                    expected: param.ty.clone(),
                });
            }
        }

        if args.is_empty() {
            return Ok(Bytes::new());
        }
        Ok(DynSolValue::Tuple(args.to_vec()).abi_encode_params().into())
    }

    /// Creation code followed by the encoded constructor arguments.
    pub fn init_code(&self, args: &[DynSolValue]) -> Result<Bytes, ArtifactError> {
        let encoded = self.encode_constructor_args(args)?;
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&encoded);
        Ok(code.into())
    }
}

/// Reads artifacts produced by the Solidity toolchain.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads the artifact of `name`, looking first at the conventional
    /// `contracts/<name>.sol/<name>.json` and then anywhere below `contracts/`.
    pub fn load(&self, name: &str) -> Result<Artifact, ArtifactError> {
        let conventional = self
            .root
            .join("contracts")
            .join(format!("{name}.sol"))
            .join(format!("{name}.json"));

        let path = if conventional.is_file() {
            conventional
        } else {
            find_artifact(&self.root.join("contracts"), name).ok_or_else(|| {
                ArtifactError::NotFound {
                    name: name.to_string(),
                    root: self.root.clone(),
                }
            })?
        };

        let mut artifact: Artifact = read_json(&path)?;
        if artifact.bytecode.is_empty() {
            return Err(ArtifactError::NotDeployable(artifact.contract_name));
        }
        artifact.path = path;
        Ok(artifact)
    }

    /// Follows the artifact's `.dbg.json` to the build info it was compiled in.
    pub fn build_info(&self, artifact: &Artifact) -> Result<BuildInfo, ArtifactError> {
        let dbg_path = artifact.path.with_extension("dbg.json");
        let dbg: DebugFile = read_json(&dbg_path)?;

        let base = dbg_path.parent().unwrap_or_else(|| Path::new("."));
        read_json(&base.join(dbg.build_info))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn find_artifact(dir: &Path, name: &str) -> Option<PathBuf> {
    let file_name = format!("{name}.json");
    let entries = fs::read_dir(dir).ok()?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_artifact(&path, name) {
                return Some(found);
            }
        } else if path.file_name().is_some_and(|f| f == file_name.as_str()) {
            return Some(path);
        }
    }
    None
}
