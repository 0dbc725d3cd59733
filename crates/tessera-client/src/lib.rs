//! # Tessera Client
//!
//! Keeps a `tessera_core::LightClientState` in step with the chain through
//! untrusted providers, and answers account queries with proofs checked
//! against the verified state root.
//!
//! ## Architecture
//!
//! - `provider`: JSON-RPC transport, retry decorator and multi-source fallback
//! - `state`: the sync driver that rotates committees and advances the head
//! - `LightClient`: configuration, lifecycle and proof-backed queries
//!
//! Nothing fetched from a provider is used before it verifies. A failed sync
//! or query leaves the trusted state as it was.

pub mod config;
pub mod error;
pub mod provider;
pub mod state;

use alloy_primitives::{Address, B256, U256};
use tessera_core::{
    verify_full_account_state, BlockNumber, ChainParams, Committee, LightClientState,
    VerifiedAccountState,
};
use tracing::{debug, info, warn};

pub use config::LightClientConfig;
pub use error::ClientError;
pub use provider::{
    BlockRequest, Multiplexer, Provider, ProviderError, Retry, RetryConfig, RpcProvider,
};
pub use state::{sync, SyncError, SyncProgress, SyncReport};

/// An account proven against the state root of a verified block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedAccount {
    pub address: Address,
    /// Block whose state root the proof was checked against.
    pub block: BlockNumber,
    pub state_root: B256,
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: B256,
    pub code_hash: B256,
}

impl VerifiedAccount {
    fn from_verified(block: BlockNumber, verified: &VerifiedAccountState) -> Self {
        Self {
            address: Address::from(verified.address),
            block,
            state_root: B256::from(verified.state_root),
            nonce: verified.account.nonce,
            balance: U256::from_be_bytes(verified.account.balance),
            storage_root: B256::from(verified.account.storage_root),
            code_hash: B256::from(verified.account.code_hash),
        }
    }

    pub fn is_contract(&self) -> bool {
        self.code_hash != B256::from(tessera_core::AccountState::EMPTY_CODE_HASH)
    }
}

/// A light client bound to one provider.
///
/// Methods run on the caller's thread. Callers sharing a client across
/// threads serialize access themselves.
pub struct LightClient {
    state: LightClientState,
    provider: Option<Box<dyn Provider>>,
    progress: SyncProgress,
}

impl LightClient {
    /// Build a client that fetches from every configured endpoint, each
    /// wrapped in retries, falling back in order.
    pub fn new(config: LightClientConfig) -> Result<Self, ClientError> {
        let endpoints = config.validate()?;
        let retry = config.retry_config();

        let providers = endpoints
            .into_iter()
            .map(|url| {
                let rpc = RpcProvider::new(url, config.request_timeout())?;
                Ok(Box::new(Retry::new(rpc, retry)) as Box<dyn Provider>)
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        info!(
            chain_id = config.chain_id,
            endpoints = providers.len(),
            retries = retry.retries,
            "Light client configured"
        );

        let provider = Multiplexer::new(providers)?;
        Self::with_provider(config.chain_params(), config.genesis_committee, Box::new(provider))
    }

    /// Build a client over any provider.
    pub fn with_provider(
        params: ChainParams,
        genesis: Committee,
        provider: Box<dyn Provider>,
    ) -> Result<Self, ClientError> {
        let state = LightClientState::from_genesis(params, genesis)
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            state,
            provider: Some(provider),
            progress: SyncProgress::new(),
        })
    }

    /// Advance to the provider's latest certified block. Returns the head.
    pub fn sync(&mut self) -> Result<BlockNumber, ClientError> {
        let provider = self.provider.as_deref().ok_or(ClientError::Closed)?;

        match state::sync(&mut self.state, provider) {
            Ok(report) => {
                self.progress.record_sync(&report, &self.state);
                Ok(report.head)
            }
            Err(err) => {
                warn!(error = %err, head = self.state.head(), "Sync failed");
                self.progress.record_failure(&self.state);
                Err(err.into())
            }
        }
    }

    pub fn head(&self) -> BlockNumber {
        self.state.head()
    }

    pub fn state(&self) -> &LightClientState {
        &self.state
    }

    pub fn progress(&self) -> &SyncProgress {
        &self.progress
    }

    pub fn is_closed(&self) -> bool {
        self.provider.is_none()
    }

    /// Sync, then prove `address` at the new head.
    pub fn account(&mut self, address: Address) -> Result<VerifiedAccount, ClientError> {
        let (block, verified) = self.prove(address, &[])?;
        Ok(VerifiedAccount::from_verified(block, &verified))
    }

    pub fn balance(&mut self, address: Address) -> Result<U256, ClientError> {
        Ok(self.account(address)?.balance)
    }

    pub fn nonce(&mut self, address: Address) -> Result<u64, ClientError> {
        Ok(self.account(address)?.nonce)
    }

    /// Sync, then prove one storage slot of `address` at the new head.
    pub fn storage_at(&mut self, address: Address, slot: B256) -> Result<B256, ClientError> {
        let (block, verified) = self.prove(address, &[slot.0])?;
        verified
            .get_storage(&slot.0)
            .map(|value| B256::from(*value))
            .ok_or_else(|| ClientError::ProofNotFound {
                address: hex::encode(address),
                block,
            })
    }

    fn prove(
        &mut self,
        address: Address,
        storage_keys: &[[u8; 32]],
    ) -> Result<(BlockNumber, VerifiedAccountState), ClientError> {
        self.sync()?;

        let provider = self.provider.as_deref().ok_or(ClientError::Closed)?;
        let block = self.state.head();
        let state_root = self.state.head_state_root();

        let response = provider
            .account_proof(address.into_array(), storage_keys, block)?
            .ok_or_else(|| ClientError::ProofNotFound {
                address: hex::encode(address),
                block,
            })?;

        match verify_full_account_state(state_root, address.into_array(), &response) {
            Ok(verified) => {
                self.progress.record_proof(true);
                debug!(
                    address = %address,
                    block,
                    slots = verified.storage_slots.len(),
                    "Account proven"
                );
                Ok((block, verified))
            }
            Err(err) => {
                self.progress.record_proof(false);
                warn!(address = %address, block, error = %err, "Account proof rejected");
                Err(ClientError::NotProven {
                    address: hex::encode(address),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Release the provider. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), ClientError> {
        match self.provider.take() {
            Some(mut provider) => {
                info!(head = self.state.head(), "Closing light client");
                provider.close().map_err(ClientError::from)
            }
            None => Ok(()),
        }
    }
}

impl Drop for LightClient {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "Failed to close provider");
        }
    }
}
