//! Read-only inspection tasks.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use alloy::primitives::U256;
use contracts::DEFAULT_TOKEN_ID;

use crate::chain::ChainBackend;
use crate::error::HarnessError;
use crate::locator::resolve_deployed_contract;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Accounts,
    Price,
    Uri,
}

impl Task {
    pub const ALL: [Task; 3] = [Task::Accounts, Task::Price, Task::Uri];

    pub fn name(&self) -> &'static str {
        match self {
            Task::Accounts => "accounts",
            Task::Price => "price",
            Task::Uri => "uri",
        }
    }

    pub fn about(&self) -> &'static str {
        match self {
            Task::Accounts => "Prints the list of accounts",
            Task::Price => "Prints the uniswap pool price",
            Task::Uri => "Prints the uri of the NFT",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::ALL
            .into_iter()
            .find(|task| task.name() == s)
            .ok_or_else(|| format!("unknown task `{s}`"))
    }
}

/// Runs one task, writing its output to `out`.
pub async fn run<B, W>(
    task: Task,
    backend: &B,
    address_file: &Path,
    out: &mut W,
) -> Result<(), HarnessError>
where
    B: ChainBackend,
    W: Write,
{
    tracing::debug!(%task, "running task");
    match task {
        Task::Accounts => accounts(backend, out),
        Task::Price => price(backend, address_file, out).await,
        Task::Uri => uri(backend, address_file, out).await,
    }
}

/// One signer address per line.
pub fn accounts<B: ChainBackend, W: Write>(backend: &B, out: &mut W) -> Result<(), HarnessError> {
    for account in backend.signers() {
        writeln!(out, "{account}").map_err(stdout_error)?;
    }
    Ok(())
}

pub async fn price<B: ChainBackend, W: Write>(
    backend: &B,
    address_file: &Path,
    out: &mut W,
) -> Result<(), HarnessError> {
    let contract = resolve_deployed_contract(address_file, backend)?;
    let price = contract.get_pair_price().await?;
    writeln!(out, "Pair price: {price}").map_err(stdout_error)
}

pub async fn uri<B: ChainBackend, W: Write>(
    backend: &B,
    address_file: &Path,
    out: &mut W,
) -> Result<(), HarnessError> {
    let contract = resolve_deployed_contract(address_file, backend)?;
    let uri = contract.token_uri(U256::from(DEFAULT_TOKEN_ID)).await?;
    writeln!(out, "Token URI: {uri}").map_err(stdout_error)
}

fn stdout_error(source: std::io::Error) -> HarnessError {
    HarnessError::Io {
        path: "<stdout>".into(),
        source,
    }
}
