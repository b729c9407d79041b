use alloy::sol;

pub mod artifact;

pub use artifact::{Artifact, ArtifactError, ArtifactStore, BuildInfo};

/// Name of the contract as compiled by Hardhat.
pub const CONTRACT_NAME: &str = "IsItMoonYet";

/// Token queried by the `uri` task.
pub const DEFAULT_TOKEN_ID: u64 = 1;

// Callable surface of the deployed contract. Creation bytecode is not baked in
// here; deployments go through the compiled artifact instead.
sol!(
    #[sol(rpc)]
    #[derive(Debug)]
    contract IsItMoonYet {
        constructor(address pool);

        function getPairPrice() external view returns (uint256);

        function tokenURI(uint256 tokenId) external view returns (string memory);
    }
);

pub use IsItMoonYet::*;
