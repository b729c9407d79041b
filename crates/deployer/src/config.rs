//! Network profiles and process-wide settings.
//!
//! Everything the harness reads from the environment is read once, here, into
//! [`Settings`]. The rest of the crate only ever sees the resulting structs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use thiserror::Error;
use url::Url;

use crate::chain::AnvilConfig;
use crate::explorer::VerificationPolicy;

/// Mainnet endpoint forked by the `localhost` network unless overridden.
pub const DEFAULT_MAINNET_FORK_URL: &str =
    "https://eth-mainnet.alchemyapi.io/v2/H35X6FNT3pet5bbx_toH2vK55eh4GAx9";

/// Node the `localhost` network talks to. `deploy` starts its fork here when
/// nothing is listening yet.
pub const DEFAULT_LOCALHOST_RPC_URL: &str = "http://127.0.0.1:8545";

pub const DEFAULT_POLYGONSCAN_API_URL: &str = "https://api.polygonscan.com/api";

pub const DEFAULT_CONTRACT_ADDRESS_FILE: &str = "scripts/contractAddress.txt";
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {var}, required by the `{network}` network")]
    Missing {
        var: &'static str,
        network: NetworkName,
    },
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error("unknown network `{0}` (expected `localhost` or `polygon`)")]
    UnknownNetwork(String),
    #[error("failed to load .env: {0}")]
    DotEnv(#[from] dotenvy::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkName {
    #[default]
    Localhost,
    Polygon,
}

impl NetworkName {
    pub const ALL: [NetworkName; 2] = [NetworkName::Localhost, NetworkName::Polygon];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkName::Localhost => "localhost",
            NetworkName::Polygon => "polygon",
        }
    }
}

impl fmt::Display for NetworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "localhost" => Ok(NetworkName::Localhost),
            "polygon" => Ok(NetworkName::Polygon),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

/// How a profile reaches its chain. Exactly one of the two shapes applies.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// A local node forking a remote chain, using the node's dev accounts.
    /// An already running node at `node_url` is reused; otherwise one is
    /// started there.
    Fork {
        fork_url: Url,
        fork_block_number: Option<u64>,
        node_url: Url,
    },
    /// A remote node, signing with a single configured key.
    Remote {
        rpc_url: Url,
        signer: PrivateKeySigner,
    },
}

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    pub api_url: Url,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NetworkProfile {
    pub name: NetworkName,
    pub endpoint: Endpoint,
    pub explorer: Option<ExplorerConfig>,
}

/// Solidity compiler the contract is expected to be built with. The build
/// info emitted by the compiler is what gets submitted for verification;
/// this version is checked against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerSettings {
    pub version: String,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            version: "0.8.7".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub mainnet_fork_url: String,
    pub fork_block_number: Option<u64>,
    pub localhost_rpc_url: String,
    pub polygon_rpc_url: Option<String>,
    pub polygon_private_key: Option<String>,
    pub polygonscan_key: Option<String>,
    pub polygonscan_api_url: String,
    pub contract_address_file: PathBuf,
    pub artifacts_dir: PathBuf,
    pub compiler: CompilerSettings,
    pub anvil: AnvilConfig,
    pub verification: VerificationPolicy,
}

impl Settings {
    /// Loads `.env` (if present) and builds settings from the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(err.into()),
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds settings from an arbitrary variable lookup. Empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut verification = VerificationPolicy::default();
        if let Some(secs) = parse_var::<u64>("VERIFY_INITIAL_DELAY_SECS", get("VERIFY_INITIAL_DELAY_SECS"))? {
            verification.initial_delay = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var::<u32>("VERIFY_MAX_ATTEMPTS", get("VERIFY_MAX_ATTEMPTS"))? {
            if attempts == 0 {
                return Err(ConfigError::Invalid {
                    var: "VERIFY_MAX_ATTEMPTS",
                    reason: "must be at least 1".to_string(),
                });
            }
            verification.max_attempts = attempts;
        }
        if let Some(secs) = parse_var::<u64>("VERIFY_TIMEOUT_SECS", get("VERIFY_TIMEOUT_SECS"))? {
            verification.timeout = Duration::from_secs(secs);
        }

        Ok(Self {
            mainnet_fork_url: get("MAINNET_FORK_URL")
                .unwrap_or_else(|| DEFAULT_MAINNET_FORK_URL.to_string()),
            fork_block_number: parse_var("FORK_BLOCK_NUMBER", get("FORK_BLOCK_NUMBER"))?,
            localhost_rpc_url: get("LOCALHOST_RPC_URL")
                .unwrap_or_else(|| DEFAULT_LOCALHOST_RPC_URL.to_string()),
            polygon_rpc_url: get("ALCHEMY_POLYGON"),
            polygon_private_key: get("MATIC_PRIVATE_KEY"),
            polygonscan_key: get("POLYGONSCAN_KEY"),
            polygonscan_api_url: get("POLYGONSCAN_API_URL")
                .unwrap_or_else(|| DEFAULT_POLYGONSCAN_API_URL.to_string()),
            contract_address_file: get("CONTRACT_ADDRESS_FILE")
                .unwrap_or_else(|| DEFAULT_CONTRACT_ADDRESS_FILE.to_string())
                .into(),
            artifacts_dir: get("ARTIFACTS_DIR")
                .unwrap_or_else(|| DEFAULT_ARTIFACTS_DIR.to_string())
                .into(),
            compiler: CompilerSettings::default(),
            anvil: AnvilConfig::default(),
            verification,
        })
    }

    /// Resolves a network profile, failing if the selected network lacks the
    /// endpoint or credentials it needs.
    pub fn profile(&self, name: NetworkName) -> Result<NetworkProfile, ConfigError> {
        match name {
            NetworkName::Localhost => Ok(NetworkProfile {
                name,
                endpoint: Endpoint::Fork {
                    fork_url: parse_url("MAINNET_FORK_URL", &self.mainnet_fork_url)?,
                    fork_block_number: self.fork_block_number,
                    node_url: parse_url("LOCALHOST_RPC_URL", &self.localhost_rpc_url)?,
                },
                explorer: None,
            }),
            NetworkName::Polygon => {
                let rpc_url = self
                    .polygon_rpc_url
                    .as_deref()
                    .ok_or(ConfigError::Missing {
                        var: "ALCHEMY_POLYGON",
                        network: name,
                    })?;
                let key = self
                    .polygon_private_key
                    .as_deref()
                    .ok_or(ConfigError::Missing {
                        var: "MATIC_PRIVATE_KEY",
                        network: name,
                    })?;
                let signer = key.parse::<PrivateKeySigner>().map_err(|err| ConfigError::Invalid {
                    var: "MATIC_PRIVATE_KEY",
                    reason: err.to_string(),
                })?;

                Ok(NetworkProfile {
                    name,
                    endpoint: Endpoint::Remote {
                        rpc_url: parse_url("ALCHEMY_POLYGON", rpc_url)?,
                        signer,
                    },
                    explorer: Some(ExplorerConfig {
                        api_url: parse_url("POLYGONSCAN_API_URL", &self.polygonscan_api_url)?,
                        api_key: self.polygonscan_key.clone(),
                    }),
                })
            }
        }
    }
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|err| ConfigError::Invalid {
        var,
        reason: err.to_string(),
    })
}

fn parse_var<T>(var: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.map(|value| {
        value.parse().map_err(|err: T::Err| ConfigError::Invalid {
            var,
            reason: err.to_string(),
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // Anvil's first dev key; never holds real funds.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn localhost_needs_no_credentials() {
        let settings = settings(&[]).unwrap();
        let profile = settings.profile(NetworkName::Localhost).unwrap();

        match profile.endpoint {
            Endpoint::Fork {
                fork_url,
                fork_block_number,
                node_url,
            } => {
                assert_eq!(fork_url.as_str(), DEFAULT_MAINNET_FORK_URL);
                assert_eq!(fork_block_number, None);
                assert_eq!(node_url.as_str(), "http://127.0.0.1:8545/");
                assert_eq!(node_url.port(), Some(8545));
            }
            other => panic!("unexpected endpoint {other:?}"),
        }
        assert!(profile.explorer.is_none());
        assert_eq!(settings.contract_address_file, PathBuf::from("scripts/contractAddress.txt"));
    }

    #[test]
    fn fork_settings_are_overridable() {
        let settings = settings(&[
            ("MAINNET_FORK_URL", "http://archive.internal:8545"),
            ("FORK_BLOCK_NUMBER", "13500000"),
        ])
        .unwrap();

        match settings.profile(NetworkName::Localhost).unwrap().endpoint {
            Endpoint::Fork {
                fork_url,
                fork_block_number,
                ..
            } => {
                assert_eq!(fork_url.as_str(), "http://archive.internal:8545/");
                assert_eq!(fork_block_number, Some(13_500_000));
            }
            other => panic!("unexpected endpoint {other:?}"),
        }
    }

    #[test]
    fn localhost_node_url_is_shared_between_runs() {
        // deploy and tasks resolve the same node, so a task can reach a
        // contract deployed by an earlier run
        let node_url = |vars: &[(&str, &str)]| {
            match settings(vars).unwrap().profile(NetworkName::Localhost).unwrap().endpoint {
                Endpoint::Fork { node_url, .. } => node_url,
                other => panic!("unexpected endpoint {other:?}"),
            }
        };

        assert_eq!(node_url(&[]), node_url(&[("FORK_BLOCK_NUMBER", "13500000")]));
        assert_eq!(
            node_url(&[("LOCALHOST_RPC_URL", "http://127.0.0.1:9545")]).as_str(),
            "http://127.0.0.1:9545/"
        );

        let err = settings(&[("LOCALHOST_RPC_URL", "not a url")])
            .unwrap()
            .profile(NetworkName::Localhost)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "LOCALHOST_RPC_URL", .. }));
    }

    #[test]
    fn polygon_fails_fast_without_rpc_url() {
        let settings = settings(&[("MATIC_PRIVATE_KEY", DEV_KEY)]).unwrap();
        let err = settings.profile(NetworkName::Polygon).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { var: "ALCHEMY_POLYGON", .. }));
    }

    #[test]
    fn polygon_fails_fast_without_key() {
        // an empty value in .env is as good as missing
        let settings = settings(&[
            ("ALCHEMY_POLYGON", "https://polygon-mainnet.g.alchemy.com/v2/demo"),
            ("MATIC_PRIVATE_KEY", ""),
        ])
        .unwrap();
        let err = settings.profile(NetworkName::Polygon).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { var: "MATIC_PRIVATE_KEY", .. }));
    }

    #[test]
    fn polygon_rejects_malformed_key() {
        let settings = settings(&[
            ("ALCHEMY_POLYGON", "https://polygon-mainnet.g.alchemy.com/v2/demo"),
            ("MATIC_PRIVATE_KEY", "not-a-key"),
        ])
        .unwrap();
        let err = settings.profile(NetworkName::Polygon).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "MATIC_PRIVATE_KEY", .. }));
    }

    #[test]
    fn polygon_profile_carries_signer_and_explorer() {
        let settings = settings(&[
            ("ALCHEMY_POLYGON", "https://polygon-mainnet.g.alchemy.com/v2/demo"),
            ("MATIC_PRIVATE_KEY", DEV_KEY),
            ("POLYGONSCAN_KEY", "SCANKEY"),
        ])
        .unwrap();
        let profile = settings.profile(NetworkName::Polygon).unwrap();

        match &profile.endpoint {
            Endpoint::Remote { signer, .. } => assert_eq!(
                signer.address().to_string(),
                "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
            ),
            other => panic!("unexpected endpoint {other:?}"),
        }
        let explorer = profile.explorer.unwrap();
        assert_eq!(explorer.api_key.as_deref(), Some("SCANKEY"));
        assert_eq!(explorer.api_url.as_str(), DEFAULT_POLYGONSCAN_API_URL);
    }

    #[test]
    fn polygonscan_api_url_is_overridable() {
        let settings = settings(&[
            ("ALCHEMY_POLYGON", "https://polygon-mainnet.g.alchemy.com/v2/demo"),
            ("MATIC_PRIVATE_KEY", DEV_KEY),
            ("POLYGONSCAN_API_URL", "https://api-amoy.polygonscan.com/api"),
        ])
        .unwrap();
        let explorer = settings.profile(NetworkName::Polygon).unwrap().explorer.unwrap();
        assert_eq!(explorer.api_url.as_str(), "https://api-amoy.polygonscan.com/api");

        let settings = Settings {
            polygonscan_api_url: "::".to_string(),
            ..settings
        };
        let err = settings.profile(NetworkName::Polygon).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "POLYGONSCAN_API_URL", .. }));
    }

    #[test]
    fn verification_policy_is_configurable() {
        let settings = settings(&[
            ("VERIFY_INITIAL_DELAY_SECS", "30"),
            ("VERIFY_MAX_ATTEMPTS", "3"),
        ])
        .unwrap();
        assert_eq!(settings.verification.initial_delay, Duration::from_secs(30));
        assert_eq!(settings.verification.max_attempts, 3);

        let err = settings_err(&[("VERIFY_MAX_ATTEMPTS", "0")]);
        assert!(matches!(err, ConfigError::Invalid { var: "VERIFY_MAX_ATTEMPTS", .. }));
        let err = settings_err(&[("FORK_BLOCK_NUMBER", "latest")]);
        assert!(matches!(err, ConfigError::Invalid { var: "FORK_BLOCK_NUMBER", .. }));
    }

    fn settings_err(vars: &[(&str, &str)]) -> ConfigError {
        settings(vars).unwrap_err()
    }

    #[test]
    fn network_names_round_trip() {
        for name in NetworkName::ALL {
            assert_eq!(name.as_str().parse::<NetworkName>().unwrap(), name);
        }
        assert!("mainnet".parse::<NetworkName>().is_err());
    }
}
