//! JSON-RPC 2.0 over HTTP.
//!
//! Certificates travel as hex-encoded wire bytes; account proofs use the
//! standard `eth_getProof` shape. Every response is decoded here but trusted
//! nowhere: verification happens in the sync driver and the facade.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::U256;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tessera_core::{
    codec, AccountProof, AccountState, BlockCertificate, BlockNumber, Certificate,
    CommitteeCertificate, EthGetProofResponse, Period, Statement, StorageProof,
};
use tracing::debug;
use url::Url;

use super::{BlockRequest, Provider, ProviderError};

pub const METHOD_COMMITTEE_CERTIFICATES: &str = "tessera_getCommitteeCertificates";
pub const METHOD_BLOCK_CERTIFICATES: &str = "tessera_getBlockCertificates";
pub const METHOD_GET_PROOF: &str = "eth_getProof";

#[derive(Serialize, Debug)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: Vec<Value>,
    pub id: u64,
}

#[derive(Deserialize, Debug)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Deserialize, Debug)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A provider backed by one JSON-RPC endpoint.
pub struct RpcProvider {
    endpoint: Url,
    client: Option<Client>,
    next_id: AtomicU64,
}

impl RpcProvider {
    pub fn new(endpoint: Url, request_timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::Transport {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            endpoint,
            client: Some(client),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    fn transport(&self, reason: impl ToString) -> ProviderError {
        ProviderError::Transport {
            endpoint: self.endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    fn decode(&self, reason: impl ToString) -> ProviderError {
        ProviderError::Decode {
            endpoint: self.endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Issue one call. A `null` result is `Ok(None)`.
    fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Option<T>, ProviderError> {
        let client = self.client.as_ref().ok_or(ProviderError::Closed)?;
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        debug!(endpoint = %self.endpoint, method, id = request.id, "JSON-RPC request");

        let response = client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.transport(format!("HTTP status {}", status)));
        }

        let body: JsonRpcResponse = response.json().map_err(|e| self.decode(e))?;
        if let Some(error) = body.error {
            return Err(ProviderError::Rpc {
                endpoint: self.endpoint.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        match body.result {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| self.decode(e)),
        }
    }

    fn certificates<S: Statement>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Vec<Certificate<S>>, ProviderError> {
        let encoded: Vec<String> = self.call(method, params)?.unwrap_or_default();
        encoded
            .iter()
            .map(|hex_str| {
                let bytes = hex_to_bytes(hex_str).map_err(|e| self.decode(e))?;
                codec::deserialize::<S>(&bytes).map_err(|e| self.decode(e))
            })
            .collect()
    }
}

impl Provider for RpcProvider {
    fn committee_certificates(
        &self,
        first: Period,
        max: usize,
    ) -> Result<Vec<CommitteeCertificate>, ProviderError> {
        self.certificates(METHOD_COMMITTEE_CERTIFICATES, vec![json!(first), json!(max)])
    }

    fn block_certificates(
        &self,
        request: BlockRequest,
        max: usize,
    ) -> Result<Vec<BlockCertificate>, ProviderError> {
        let first = match request {
            BlockRequest::Latest => json!("latest"),
            BlockRequest::Number(n) => json!(n),
        };
        self.certificates(METHOD_BLOCK_CERTIFICATES, vec![first, json!(max)])
    }

    fn account_proof(
        &self,
        address: [u8; 20],
        storage_keys: &[[u8; 32]],
        height: BlockNumber,
    ) -> Result<Option<EthGetProofResponse>, ProviderError> {
        let keys: Vec<String> = storage_keys
            .iter()
            .map(|k| format!("0x{}", hex::encode(k)))
            .collect();
        let params = vec![
            json!(format!("0x{}", hex::encode(address))),
            json!(keys),
            json!(format!("0x{:x}", height)),
        ];

        let response: Option<RpcGetProofResponse> = self.call(METHOD_GET_PROOF, params)?;
        response
            .map(|r| r.to_core(&address).map_err(|e| self.decode(e)))
            .transpose()
    }

    fn close(&mut self) -> Result<(), ProviderError> {
        if self.client.take().is_some() {
            debug!(endpoint = %self.endpoint, "Closed RPC provider");
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RpcGetProofResponse {
    pub address: String,
    pub account_proof: Vec<String>,
    pub balance: String,
    pub code_hash: String,
    pub nonce: String,
    pub storage_hash: String,
    #[serde(default)]
    pub storage_proof: Vec<RpcStorageProof>,
}

#[derive(Deserialize, Debug)]
pub struct RpcStorageProof {
    pub key: String,
    pub value: String,
    pub proof: Vec<String>,
}

impl RpcGetProofResponse {
    /// Convert the hex fields to core types. The claimed account values are
    /// carried along so verification can check them against the proof.
    pub fn to_core(&self, requested: &[u8; 20]) -> Result<EthGetProofResponse, String> {
        let address = hex_to_bytes20(&self.address)?;
        if &address != requested {
            return Err(format!(
                "proof is for 0x{}, requested 0x{}",
                hex::encode(address),
                hex::encode(requested)
            ));
        }

        let account = AccountState {
            nonce: quantity_to_u64(&self.nonce)?,
            balance: quantity_to_bytes32(&self.balance)?,
            storage_root: hex_to_bytes32(&self.storage_hash)?,
            code_hash: hex_to_bytes32(&self.code_hash)?,
        };

        let storage_proofs = self
            .storage_proof
            .iter()
            .map(|sp| -> Result<StorageProof, String> {
                Ok(StorageProof {
                    key: quantity_to_bytes32(&sp.key)?,
                    value: quantity_to_bytes32(&sp.value)?,
                    proof: sp.proof.iter().map(|n| hex_to_bytes(n)).collect::<Result<_, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EthGetProofResponse {
            account_proof: AccountProof {
                address,
                proof: self
                    .account_proof
                    .iter()
                    .map(|n| hex_to_bytes(n))
                    .collect::<Result<_, _>>()?,
                account: Some(account),
            },
            storage_proofs,
        })
    }
}

pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| format!("hex decode: {}", e))
}

pub fn hex_to_bytes32(s: &str) -> Result<[u8; 32], String> {
    let bytes = hex_to_bytes(s)?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected 32 bytes, got {}", b.len()))
}

pub fn hex_to_bytes20(s: &str) -> Result<[u8; 20], String> {
    let bytes = hex_to_bytes(s)?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected 20 bytes, got {}", b.len()))
}

/// Parse a hex quantity ("0x2a") into 32 big-endian bytes.
fn quantity_to_bytes32(s: &str) -> Result<[u8; 32], String> {
    let value = U256::from_str(s).map_err(|e| format!("quantity {}: {}", s, e))?;
    Ok(value.to_be_bytes::<32>())
}

fn quantity_to_u64(s: &str) -> Result<u64, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| format!("quantity {}: {}", s, e))
}
