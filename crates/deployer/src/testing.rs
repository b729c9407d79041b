//! In-memory chain and explorer used by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use tokio::time::Instant;

use crate::chain::{ChainBackend, NetworkInfo, PendingDeployment};
use crate::error::HarnessError;
use crate::explorer::{ContractVerifier, Submission, VerificationRequest, VerificationStatus};

pub struct MockPending {
    tx_hash: TxHash,
}

impl PendingDeployment for MockPending {
    fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }
}

/// Chain whose every deployment lands at a fresh address.
pub struct MockChain {
    pub signers: Vec<Address>,
    pub price: U256,
    pub uri: String,
    pub fail_calls: bool,
    pub fail_submit: bool,
    pub(crate) state: Mutex<ChainState>,
}

#[derive(Default)]
pub(crate) struct ChainState {
    nonce: u8,
    price_calls: Vec<Address>,
    uri_calls: Vec<(Address, U256)>,
    submitted: Vec<Bytes>,
    confirmed_at: Vec<Instant>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            signers: vec![Address::with_last_byte(0xaa), Address::with_last_byte(0xbb)],
            price: U256::from(1_234_567u64),
            uri: "data:application/json;base64,eyJuYW1lIjoiTW9vbiJ9".to_string(),
            fail_calls: false,
            fail_submit: false,
            state: Mutex::new(ChainState::default()),
        }
    }
}

impl MockChain {
    pub fn price_calls(&self) -> Vec<Address> {
        self.state.lock().unwrap().price_calls.clone()
    }

    pub fn uri_calls(&self) -> Vec<(Address, U256)> {
        self.state.lock().unwrap().uri_calls.clone()
    }

    pub fn submitted(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn confirmed_at(&self) -> Vec<Instant> {
        self.state.lock().unwrap().confirmed_at.clone()
    }
}

impl ChainBackend for MockChain {
    type Pending = MockPending;

    fn signers(&self) -> Vec<Address> {
        self.signers.clone()
    }

    async fn network_info(&self) -> NetworkInfo {
        NetworkInfo {
            chain_id: Some(31337),
            block_number: Some(1),
        }
    }

    async fn get_pair_price(&self, contract: Address) -> Result<U256, HarnessError> {
        self.state.lock().unwrap().price_calls.push(contract);
        if self.fail_calls {
            return Err(HarnessError::ContractCall {
                method: "getPairPrice",
                message: "execution reverted".to_string(),
            });
        }
        Ok(self.price)
    }

    async fn token_uri(&self, contract: Address, token_id: U256) -> Result<String, HarnessError> {
        self.state.lock().unwrap().uri_calls.push((contract, token_id));
        if self.fail_calls {
            return Err(HarnessError::ContractCall {
                method: "tokenURI",
                message: "execution reverted".to_string(),
            });
        }
        Ok(self.uri.clone())
    }

    async fn submit_deployment(&self, init_code: Bytes) -> Result<MockPending, HarnessError> {
        if self.fail_submit {
            return Err(HarnessError::Network("insufficient funds for gas".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.submitted.push(init_code);
        state.nonce += 1;
        Ok(MockPending {
            tx_hash: B256::with_last_byte(state.nonce),
        })
    }

    async fn confirm_deployment(&self, pending: MockPending) -> Result<Address, HarnessError> {
        let mut state = self.state.lock().unwrap();
        state.confirmed_at.push(Instant::now());
        Ok(Address::with_last_byte(0xc0 + pending.tx_hash[31]))
    }
}

/// Explorer replaying scripted answers.
pub struct MockVerifier {
    submissions: Mutex<VecDeque<Result<Submission, HarnessError>>>,
    statuses: Mutex<VecDeque<Result<VerificationStatus, HarnessError>>>,
    requests: Mutex<Vec<(Instant, VerificationRequest)>>,
    checks: Mutex<Vec<String>>,
}

impl MockVerifier {
    pub fn new(
        submissions: Vec<Result<Submission, HarnessError>>,
        statuses: Vec<Result<VerificationStatus, HarnessError>>,
    ) -> Self {
        Self {
            submissions: Mutex::new(submissions.into()),
            statuses: Mutex::new(statuses.into()),
            requests: Mutex::new(Vec::new()),
            checks: Mutex::new(Vec::new()),
        }
    }

    /// Verifier that accepts the first submission and reports success.
    pub fn accepting() -> Self {
        Self::new(
            vec![Ok(Submission::Accepted {
                guid: "guid".to_string(),
            })],
            vec![Ok(VerificationStatus::Verified)],
        )
    }

    pub fn submissions(&self) -> Vec<(Instant, VerificationRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn status_checks(&self) -> Vec<String> {
        self.checks.lock().unwrap().clone()
    }
}

impl ContractVerifier for MockVerifier {
    async fn submit(&self, request: &VerificationRequest) -> Result<Submission, HarnessError> {
        self.requests
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        self.submissions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(HarnessError::Verification("no scripted submission".to_string())))
    }

    async fn status(&self, guid: &str) -> Result<VerificationStatus, HarnessError> {
        self.checks.lock().unwrap().push(guid.to_string());
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(HarnessError::Verification("no scripted status".to_string())))
    }
}
