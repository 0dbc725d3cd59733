use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_core::{ChainId, ChainParams, Committee, QuorumThreshold, DEFAULT_PERIOD_LENGTH};
use url::Url;

use crate::error::ClientError;
use crate::provider::RetryConfig;

/// Everything needed to start a light client.
///
/// Loaded from JSON; every field except `chain_id`, `genesis_committee` and
/// `endpoints` has a default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightClientConfig {
    pub chain_id: ChainId,
    #[serde(default = "default_period_length")]
    pub period_length: u64,
    #[serde(default)]
    pub quorum: QuorumThreshold,
    /// Root of trust: the committee for period 0.
    pub genesis_committee: Committee,
    /// JSON-RPC endpoints, tried in order.
    pub endpoints: Vec<String>,
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Per-operation deadline across retries. 0 selects the 10 s default.
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Timeout for a single HTTP request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_period_length() -> u64 {
    DEFAULT_PERIOD_LENGTH
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl LightClientConfig {
    pub fn new(chain_id: ChainId, genesis_committee: Committee, endpoints: Vec<String>) -> Self {
        Self {
            chain_id,
            period_length: default_period_length(),
            quorum: QuorumThreshold::default(),
            genesis_committee,
            endpoints,
            retries: default_retries(),
            timeout_ms: 0,
            backoff_ms: default_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ClientError> {
        serde_json::from_str(json)
            .map_err(|e| ClientError::InvalidConfig(format!("Invalid config JSON: {}", e)))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            ClientError::InvalidConfig(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Check the config can build a client. Returns the parsed endpoints.
    pub fn validate(&self) -> Result<Vec<Url>, ClientError> {
        self.chain_params()
            .validate()
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;

        self.genesis_committee
            .validate()
            .map_err(|e| ClientError::InvalidConfig(format!("Genesis committee: {}", e)))?;

        if self.endpoints.is_empty() {
            return Err(ClientError::InvalidConfig(
                "At least one provider endpoint is required".into(),
            ));
        }

        self.endpoints
            .iter()
            .map(|endpoint| {
                Url::parse(endpoint).map_err(|e| {
                    ClientError::InvalidConfig(format!("Malformed endpoint {:?}: {}", endpoint, e))
                })
            })
            .collect()
    }

    pub fn chain_params(&self) -> ChainParams {
        ChainParams::new(self.chain_id, self.period_length).with_quorum(self.quorum)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            retries: self.retries,
            timeout: Duration::from_millis(self.timeout_ms),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
