//! Source verification on Etherscan-compatible block explorers.

use std::time::Duration;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::Address;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::{sleep, timeout};
use url::Url;

use crate::config::{ConfigError, NetworkProfile};
use crate::error::HarnessError;

/// Retry policy for explorer verification.
///
/// The first submission happens `initial_delay` after deployment. Submissions
/// the explorer rejects because it has not indexed the bytecode yet, and
/// status checks that report a pending job, are retried with exponential
/// backoff until `max_attempts` or `timeout` is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPolicy {
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub backoff_factor: u32,
    pub max_interval: Duration,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(3),
            backoff_factor: 2,
            max_interval: Duration::from_secs(60),
            max_attempts: 6,
            timeout: Duration::from_secs(300),
        }
    }
}

impl VerificationPolicy {
    /// Delay before retry number `retry` (0-based) of an operation whose first
    /// wait is `base`.
    pub fn backoff(&self, base: Duration, retry: u32) -> Duration {
        base.saturating_mul(self.backoff_factor.saturating_pow(retry))
            .min(self.max_interval)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    pub address: Address,
    /// `path/To.sol:Name`
    pub contract_name: String,
    /// Long compiler version, e.g. `v0.8.7+commit.e28d00a7`
    pub compiler_version: String,
    /// Solidity standard JSON input the contract was compiled from
    pub source: serde_json::Value,
    pub constructor_arguments: Vec<DynSolValue>,
}

impl VerificationRequest {
    /// ABI-encoded constructor arguments as hex, without the `0x` prefix.
    pub fn encoded_constructor_arguments(&self) -> String {
        if self.constructor_arguments.is_empty() {
            return String::new();
        }
        hex::encode(DynSolValue::Tuple(self.constructor_arguments.clone()).abi_encode_params())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Accepted { guid: String },
    AlreadyVerified,
    /// The explorer does not know the bytecode at the address yet.
    NotIndexed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Verified,
    AlreadyVerified,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified { guid: String },
    AlreadyVerified,
}

#[allow(async_fn_in_trait)]
pub trait ContractVerifier {
    async fn submit(&self, request: &VerificationRequest) -> Result<Submission, HarnessError>;

    async fn status(&self, guid: &str) -> Result<VerificationStatus, HarnessError>;
}

/// Submits `request` and waits for the explorer's verdict, following `policy`.
pub async fn verify<V: ContractVerifier>(
    verifier: &V,
    request: &VerificationRequest,
    policy: &VerificationPolicy,
) -> Result<VerificationOutcome, HarnessError> {
    timeout(policy.timeout, verify_inner(verifier, request, policy))
        .await
        .map_err(|_| {
            HarnessError::Verification(format!("explorer did not answer within {:?}", policy.timeout))
        })?
}

async fn verify_inner<V: ContractVerifier>(
    verifier: &V,
    request: &VerificationRequest,
    policy: &VerificationPolicy,
) -> Result<VerificationOutcome, HarnessError> {
    let mut attempt = 0;
    let guid = loop {
        attempt += 1;
        match verifier.submit(request).await? {
            Submission::Accepted { guid } => break guid,
            Submission::AlreadyVerified => {
                tracing::info!(address = %request.address, "contract is already verified");
                return Ok(VerificationOutcome::AlreadyVerified);
            }
            Submission::NotIndexed(reason) if attempt < policy.max_attempts => {
                let wait = policy.backoff(policy.initial_delay, attempt - 1);
                tracing::warn!(attempt, ?wait, %reason, "explorer has not indexed the contract yet");
                sleep(wait).await;
            }
            Submission::NotIndexed(reason) => {
                return Err(HarnessError::Verification(format!(
                    "explorer still has no bytecode for {} after {attempt} attempts: {reason}",
                    request.address
                )));
            }
        }
    };
    tracing::info!(%guid, "verification submitted");

    for retry in 0..policy.max_attempts {
        sleep(policy.backoff(policy.poll_interval, retry)).await;
        match verifier.status(&guid).await? {
            VerificationStatus::Verified => return Ok(VerificationOutcome::Verified { guid }),
            VerificationStatus::AlreadyVerified => return Ok(VerificationOutcome::AlreadyVerified),
            VerificationStatus::Failed(reason) => {
                return Err(HarnessError::Verification(reason));
            }
            VerificationStatus::Pending => {
                tracing::debug!(%guid, retry, "verification pending");
            }
        }
    }

    Err(HarnessError::Verification(format!(
        "verification {guid} still pending after {} checks",
        policy.max_attempts
    )))
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

impl EtherscanResponse {
    fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Etherscan API client (Polygonscan and friends share the protocol).
pub struct EtherscanVerifier {
    api_key: String,
    api_url: Url,
    client: Client,
}

impl EtherscanVerifier {
    pub fn new(api_url: Url, api_key: String) -> Result<Self, HarnessError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| HarnessError::Network(err.to_string()))?;

        Ok(Self {
            api_key,
            api_url,
            client,
        })
    }

    /// Builds a client for the profile's explorer, failing when the profile
    /// has no explorer or no API key.
    pub fn for_profile(profile: &NetworkProfile) -> Result<Self, HarnessError> {
        let explorer = profile.explorer.as_ref().ok_or_else(|| {
            HarnessError::Verification(format!("`{}` has no block explorer", profile.name))
        })?;
        let api_key = explorer.api_key.clone().ok_or(ConfigError::Missing {
            var: "POLYGONSCAN_KEY",
            network: profile.name,
        })?;
        Self::new(explorer.api_url.clone(), api_key)
    }

    async fn request(&self, request: reqwest::RequestBuilder) -> Result<EtherscanResponse, HarnessError> {
        let response = request
            .send()
            .await
            .map_err(|err| HarnessError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(HarnessError::Network(format!(
                "explorer API request failed: {}",
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|err| HarnessError::Network(err.to_string()))?;
        serde_json::from_str(&text).map_err(|_| {
            HarnessError::Verification(format!("unexpected explorer response: {text}"))
        })
    }
}

impl ContractVerifier for EtherscanVerifier {
    async fn submit(&self, request: &VerificationRequest) -> Result<Submission, HarnessError> {
        let address = request.address.to_string();
        let source = request.source.to_string();
        let constructor_arguments = request.encoded_constructor_arguments();

        let form = [
            ("apikey", self.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", request.contract_name.as_str()),
            ("compilerversion", request.compiler_version.as_str()),
            // sic, the API's spelling
            ("constructorArguements", constructor_arguments.as_str()),
        ];

        let response = self
            .request(self.client.post(self.api_url.clone()).form(&form))
            .await?;
        parse_submission(&response)
    }

    async fn status(&self, guid: &str) -> Result<VerificationStatus, HarnessError> {
        let query = [
            ("apikey", self.api_key.as_str()),
            ("module", "contract"),
            ("action", "checkverifystatus"),
            ("guid", guid),
        ];

        let response = self
            .request(self.client.get(self.api_url.clone()).query(&query))
            .await?;
        Ok(parse_status(&response))
    }
}

fn parse_submission(response: &EtherscanResponse) -> Result<Submission, HarnessError> {
    let result = response.result_text();
    if response.status == "1" {
        return Ok(Submission::Accepted { guid: result });
    }

    let lowered = result.to_lowercase();
    if lowered.contains("already verified") {
        Ok(Submission::AlreadyVerified)
    } else if lowered.contains("unable to locate contractcode")
        || lowered.contains("does not have bytecode")
    {
        Ok(Submission::NotIndexed(result))
    } else {
        Err(HarnessError::Verification(format!(
            "{}: {result}",
            response.message
        )))
    }
}

fn parse_status(response: &EtherscanResponse) -> VerificationStatus {
    let result = response.result_text();
    let lowered = result.to_lowercase();

    if lowered.contains("pending in queue") {
        VerificationStatus::Pending
    } else if lowered.contains("already verified") {
        VerificationStatus::AlreadyVerified
    } else if response.status == "1" && lowered.starts_with("pass") {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Failed(result)
    }
}
