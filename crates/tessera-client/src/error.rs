use tessera_core::BlockNumber;
use thiserror::Error;

use crate::provider::ProviderError;
use crate::state::SyncError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("No proof for 0x{address} at block {block}")]
    ProofNotFound { address: String, block: BlockNumber },

    #[error("Proof for 0x{address} does not verify: {reason}")]
    NotProven { address: String, reason: String },

    #[error("Light client is closed")]
    Closed,
}

impl ClientError {
    /// A certificate failed verification while syncing.
    pub fn is_invalid_committee(&self) -> bool {
        matches!(self, ClientError::Sync(err) if err.is_invalid_committee())
    }
}
