//! Resolves the previously deployed contract from the address file.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use alloy::primitives::{Address, U256};

use crate::chain::ChainBackend;
use crate::error::HarnessError;

/// A contract address exactly as it was written down, plus its parsed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAddress {
    text: String,
    address: Address,
}

impl ContractAddress {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for ContractAddress {
    type Err = String;

    /// Accepts `0x` followed by 40 hex digits. Mixed-case input must be a
    /// valid EIP-55 checksum; single-case input is taken as is.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| "missing 0x prefix".to_string())?;

        if digits.len() != 40 {
            return Err(format!("expected 40 hex digits, found {}", digits.len()));
        }
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err("not a hex string".to_string());
        }

        let address = Address::from_str(digits).map_err(|err| err.to_string())?;

        let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
        let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
        if has_lower && has_upper && address.to_checksum(None)[2..] != *digits {
            return Err("bad address checksum".to_string());
        }

        Ok(Self {
            text: s.to_string(),
            address,
        })
    }
}

/// Reads the address file. Surrounding whitespace is ignored; anything else
/// that is not a single address is an error.
pub fn read_contract_address(path: &Path) -> Result<ContractAddress, HarnessError> {
    let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => HarnessError::FileNotFound(path.to_path_buf()),
        _ => HarnessError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    })?;

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HarnessError::InvalidAddress {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }

    trimmed
        .parse()
        .map_err(|reason| HarnessError::InvalidAddress {
            path: path.to_path_buf(),
            reason,
        })
}

/// Binds the address stored at `path` to the contract interface.
pub fn resolve_deployed_contract<'a, B: ChainBackend>(
    path: &Path,
    backend: &'a B,
) -> Result<ContractHandle<'a, B>, HarnessError> {
    let address = read_contract_address(path)?;
    tracing::debug!(%address, path = %path.display(), "resolved deployed contract");
    Ok(ContractHandle::attach(address, backend))
}

/// A deployed IsItMoonYet reachable through a backend.
pub struct ContractHandle<'a, B> {
    address: ContractAddress,
    backend: &'a B,
}

impl<'a, B: ChainBackend> ContractHandle<'a, B> {
    pub fn attach(address: ContractAddress, backend: &'a B) -> Self {
        Self { address, backend }
    }

    pub fn address(&self) -> &ContractAddress {
        &self.address
    }

    pub async fn get_pair_price(&self) -> Result<U256, HarnessError> {
        self.backend.get_pair_price(self.address.address()).await
    }

    pub async fn token_uri(&self, token_id: U256) -> Result<String, HarnessError> {
        self.backend.token_uri(self.address.address(), token_id).await
    }
}
