//! Access to the execution environment.
//!
//! [`ChainBackend`] is the seam between the harness and the chain: signer
//! enumeration, the contract's read methods and contract creation.
//! [`RpcBackend`] implements it over JSON-RPC with alloy. For the `localhost`
//! network it attaches to the node already listening at the profile's node
//! URL, or spawns an Anvil fork there.

use std::time::Duration;

use alloy::{
    network::{Ethereum, EthereumWallet, TransactionBuilder},
    node_bindings::{Anvil, AnvilInstance},
    primitives::{Address, Bytes, TxHash, U256},
    providers::{PendingTransactionBuilder, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner},
};
use contracts::IsItMoonYet;
use url::Url;

use crate::config::{Endpoint, NetworkProfile};
use crate::error::HarnessError;

/// Mnemonic Anvil and Hardhat derive their dev accounts from.
pub const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";
pub const DEV_ACCOUNTS: u32 = 10;

const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for the Anvil instance backing the `localhost` network
#[derive(Debug, Clone, Default)]
pub struct AnvilConfig {
    /// Block time in seconds; `None` mines on every transaction
    pub block_time: Option<u64>,
}

/// Chain metadata reported alongside a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkInfo {
    pub chain_id: Option<u64>,
    pub block_number: Option<u64>,
}

/// A creation transaction that has been accepted but not yet mined.
pub trait PendingDeployment {
    fn tx_hash(&self) -> TxHash;
}

#[allow(async_fn_in_trait)]
pub trait ChainBackend {
    type Pending: PendingDeployment;

    /// Addresses of the signing identities, in profile order.
    fn signers(&self) -> Vec<Address>;

    async fn network_info(&self) -> NetworkInfo {
        NetworkInfo::default()
    }

    async fn get_pair_price(&self, contract: Address) -> Result<U256, HarnessError>;

    async fn token_uri(&self, contract: Address, token_id: U256) -> Result<String, HarnessError>;

    /// Sends a creation transaction carrying `init_code` from the first signer.
    async fn submit_deployment(&self, init_code: Bytes) -> Result<Self::Pending, HarnessError>;

    /// Blocks until the creation transaction is mined and returns the new
    /// contract's address. There is no timeout.
    async fn confirm_deployment(&self, pending: Self::Pending) -> Result<Address, HarnessError>;
}

pub struct RpcPending(PendingTransactionBuilder<Ethereum>);

impl PendingDeployment for RpcPending {
    fn tx_hash(&self) -> TxHash {
        *self.0.tx_hash()
    }
}

/// JSON-RPC backend. Owns the Anvil node when it spawned one, so the node
/// lives exactly as long as the backend.
pub struct RpcBackend<P> {
    provider: P,
    endpoint: Url,
    signers: Vec<Address>,
    node: Option<AnvilInstance>,
}

/// Opens the chain described by `profile`.
pub async fn connect(
    profile: &NetworkProfile,
    anvil_config: &AnvilConfig,
) -> Result<RpcBackend<impl Provider>, HarnessError> {
    let (endpoint, keys, node) = match &profile.endpoint {
        Endpoint::Fork {
            fork_url,
            fork_block_number,
            node_url,
        } => {
            if node_is_running(node_url).await {
                tracing::info!(endpoint = %node_url, "attaching to running node");
                (node_url.clone(), dev_signers(DEV_MNEMONIC, DEV_ACCOUNTS)?, None)
            } else {
                let node = setup_anvil(anvil_config, fork_url, *fork_block_number, node_url)?;
                let keys: Vec<PrivateKeySigner> =
                    node.keys().iter().cloned().map(Into::into).collect();
                (node.endpoint_url(), keys, Some(node))
            }
        }
        Endpoint::Remote { rpc_url, signer } => (rpc_url.clone(), vec![signer.clone()], None),
    };

    let signers: Vec<Address> = keys.iter().map(|key| key.address()).collect();

    let mut keys = keys.into_iter();
    let first = keys.next().ok_or_else(|| {
        HarnessError::Network(format!("no signing keys available on `{}`", profile.name))
    })?;
    let mut wallet = EthereumWallet::from(first);
    for key in keys {
        wallet.register_signer(key);
    }

    let provider = ProviderBuilder::new()
        .wallet(wallet)
        .connect_http(endpoint.clone());

    tracing::debug!(network = %profile.name, %endpoint, signers = signers.len(), "connected");

    Ok(RpcBackend {
        provider,
        endpoint,
        signers,
        node,
    })
}

/// Whether a node answers JSON-RPC at `url`.
async fn node_is_running(url: &Url) -> bool {
    let provider = ProviderBuilder::new().connect_http(url.clone());
    matches!(
        tokio::time::timeout(NODE_CHECK_TIMEOUT, provider.get_chain_id()).await,
        Ok(Ok(_))
    )
}

/// Derives the first `count` dev accounts from `mnemonic`, in the order the
/// node lists them.
pub fn dev_signers(mnemonic: &str, count: u32) -> Result<Vec<PrivateKeySigner>, HarnessError> {
    (0..count)
        .map(|index| {
            MnemonicBuilder::<English>::default()
                .phrase(mnemonic)
                .index(index)
                .and_then(|builder| builder.build())
                .map_err(|err| {
                    HarnessError::Network(format!("cannot derive dev account {index}: {err}"))
                })
        })
        .collect()
}

/// Setup Anvil instance forking `fork_url`, listening on the port of
/// `node_url`
fn setup_anvil(
    config: &AnvilConfig,
    fork_url: &Url,
    fork_block_number: Option<u64>,
    node_url: &Url,
) -> Result<AnvilInstance, HarnessError> {
    let mut anvil_builder = Anvil::new().fork(fork_url.as_str());

    if let Some(port) = node_url.port_or_known_default() {
        anvil_builder = anvil_builder.port(port);
    }

    if let Some(block) = fork_block_number {
        anvil_builder = anvil_builder.fork_block_number(block);
    }
    if let Some(block_time) = config.block_time {
        anvil_builder = anvil_builder.block_time(block_time);
    }

    tracing::info!(fork_url = %redact(fork_url), ?fork_block_number, "forking");
    let anvil = anvil_builder
        .try_spawn()
        .map_err(|err| HarnessError::Network(format!("failed to start anvil: {err}")))?;
    tracing::info!(endpoint = %anvil.endpoint(), "anvil started");

    Ok(anvil)
}

/// Strips the path from RPC URLs; providers embed API keys there.
fn redact(url: &Url) -> String {
    format!("{}://{}/…", url.scheme(), url.host_str().unwrap_or_default())
}

impl<P: Provider> RpcBackend<P> {
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Whether this backend runs its own forked node.
    pub fn is_local_fork(&self) -> bool {
        self.node.is_some()
    }

    /// Keeps the forked node alive until Ctrl+C.
    pub async fn wait_for_shutdown(self) -> Result<(), HarnessError> {
        if self.node.is_none() {
            return Ok(());
        }
        tracing::info!(endpoint = %self.endpoint, "node is running, press Ctrl+C to stop");
        tokio::signal::ctrl_c()
            .await
            .map_err(|err| HarnessError::Network(err.to_string()))?;
        drop(self.node);
        tracing::info!("anvil instance stopped");
        Ok(())
    }
}

impl<P: Provider> ChainBackend for RpcBackend<P> {
    type Pending = RpcPending;

    fn signers(&self) -> Vec<Address> {
        self.signers.clone()
    }

    async fn network_info(&self) -> NetworkInfo {
        NetworkInfo {
            chain_id: self.provider.get_chain_id().await.ok(),
            block_number: self.provider.get_block_number().await.ok(),
        }
    }

    async fn get_pair_price(&self, contract: Address) -> Result<U256, HarnessError> {
        IsItMoonYet::new(contract, &self.provider)
            .getPairPrice()
            .call()
            .await
            .map_err(|err| HarnessError::ContractCall {
                method: "getPairPrice",
                message: err.to_string(),
            })
    }

    async fn token_uri(&self, contract: Address, token_id: U256) -> Result<String, HarnessError> {
        IsItMoonYet::new(contract, &self.provider)
            .tokenURI(token_id)
            .call()
            .await
            .map_err(|err| HarnessError::ContractCall {
                method: "tokenURI",
                message: err.to_string(),
            })
    }

    async fn submit_deployment(&self, init_code: Bytes) -> Result<RpcPending, HarnessError> {
        let from = self
            .signers
            .first()
            .copied()
            .ok_or_else(|| HarnessError::Network("no deployer account".to_string()))?;

        let tx = TransactionRequest::default()
            .with_from(from)
            .with_deploy_code(init_code);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|err| HarnessError::Network(err.to_string()))?;
        Ok(RpcPending(pending))
    }

    async fn confirm_deployment(&self, pending: RpcPending) -> Result<Address, HarnessError> {
        let tx_hash = pending.tx_hash();
        let receipt = pending
            .0
            .get_receipt()
            .await
            .map_err(|err| HarnessError::Network(err.to_string()))?;

        if !receipt.status() {
            return Err(HarnessError::Network(format!(
                "creation transaction {tx_hash} reverted"
            )));
        }
        receipt.contract_address.ok_or_else(|| {
            HarnessError::Network(format!("receipt of {tx_hash} carries no contract address"))
        })
    }
}
