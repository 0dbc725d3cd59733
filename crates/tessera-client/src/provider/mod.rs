//! Certificate and proof sources.
//!
//! A `Provider` is one logical source of certificates. Sources compose by
//! wrapping: `Retry` bounds attempts and latency around one provider, and
//! `Multiplexer` falls back across several. Nothing a provider returns is
//! trusted; the sync driver verifies every certificate before using it.

pub mod multiplexer;
pub mod retry;
pub mod rpc;

use std::fmt;
use std::time::Duration;

use tessera_core::{
    BlockCertificate, BlockNumber, CommitteeCertificate, EthGetProofResponse, Period,
};
use thiserror::Error;

pub use multiplexer::Multiplexer;
pub use retry::{Retry, RetryConfig};
pub use rpc::RpcProvider;

/// Which block certificates to fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockRequest {
    /// The source's current head.
    Latest,
    /// Blocks starting at this number.
    Number(BlockNumber),
}

impl fmt::Display for BlockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRequest::Latest => write!(f, "latest"),
            BlockRequest::Number(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("{endpoint} returned JSON-RPC error {code}: {message}")]
    Rpc {
        endpoint: String,
        code: i64,
        message: String,
    },

    #[error("Malformed response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("Out-of-order {what}: expected {expected}, got {got}")]
    OutOfOrder {
        what: &'static str,
        expected: u64,
        got: u64,
    },

    #[error("Provider is closed")]
    Closed,

    #[error("At least one provider is required")]
    NoProviders,

    #[error("Retries exhausted after {attempts} attempts: {}", join(.errors))]
    RetriesExhausted {
        attempts: u32,
        errors: Vec<ProviderError>,
    },

    #[error("Timeout of {timeout:?} exceeded after {attempts} attempts: {}", join(.errors))]
    TimeoutExceeded {
        timeout: Duration,
        attempts: u32,
        errors: Vec<ProviderError>,
    },

    #[error("All providers failed: {}", join(.0))]
    AllProvidersFailed(Vec<ProviderError>),

    #[error("Failed to close {} provider(s): {}", .0.len(), join(.0))]
    CloseFailed(Vec<ProviderError>),
}

fn join(errors: &[ProviderError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("[{}] {}", i, e))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProviderError {
    /// Whether trying the same call again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport { .. } | ProviderError::Rpc { .. } => true,
            ProviderError::AllProvidersFailed(errors) => errors.iter().any(Self::is_retryable),
            _ => false,
        }
    }

    /// The source broke the ordering contract. Never retried or masked by fallback.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, ProviderError::OutOfOrder { .. })
    }

    /// Every underlying error, for callers that want to inspect them one by one.
    pub fn causes(&self) -> &[ProviderError] {
        match self {
            ProviderError::RetriesExhausted { errors, .. }
            | ProviderError::TimeoutExceeded { errors, .. }
            | ProviderError::AllProvidersFailed(errors)
            | ProviderError::CloseFailed(errors) => errors,
            _ => &[],
        }
    }
}

/// A remote source of certificates and account proofs.
///
/// Certificate batches start at the requested point and increase by one with
/// no gaps, up to `max` items; fewer mean the source has no more.
pub trait Provider: Send {
    fn committee_certificates(
        &self,
        first: Period,
        max: usize,
    ) -> Result<Vec<CommitteeCertificate>, ProviderError>;

    fn block_certificates(
        &self,
        request: BlockRequest,
        max: usize,
    ) -> Result<Vec<BlockCertificate>, ProviderError>;

    /// Proof of `address` (and `storage_keys` within it) at block `height`.
    /// `None` when the source has no proof to offer.
    fn account_proof(
        &self,
        address: [u8; 20],
        storage_keys: &[[u8; 32]],
        height: BlockNumber,
    ) -> Result<Option<EthGetProofResponse>, ProviderError>;

    /// Release resources. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), ProviderError>;
}

impl<P: Provider + ?Sized> Provider for Box<P> {
    fn committee_certificates(
        &self,
        first: Period,
        max: usize,
    ) -> Result<Vec<CommitteeCertificate>, ProviderError> {
        (**self).committee_certificates(first, max)
    }

    fn block_certificates(
        &self,
        request: BlockRequest,
        max: usize,
    ) -> Result<Vec<BlockCertificate>, ProviderError> {
        (**self).block_certificates(request, max)
    }

    fn account_proof(
        &self,
        address: [u8; 20],
        storage_keys: &[[u8; 32]],
        height: BlockNumber,
    ) -> Result<Option<EthGetProofResponse>, ProviderError> {
        (**self).account_proof(address, storage_keys, height)
    }

    fn close(&mut self) -> Result<(), ProviderError> {
        (**self).close()
    }
}

fn ensure_sequence(
    what: &'static str,
    first: Option<u64>,
    max: usize,
    items: impl ExactSizeIterator<Item = u64>,
) -> Result<(), ProviderError> {
    if items.len() > max {
        return Err(ProviderError::OutOfOrder {
            what: "result count",
            expected: max as u64,
            got: items.len() as u64,
        });
    }

    let mut expected = first;
    for got in items {
        if let Some(expected) = expected {
            if got != expected {
                return Err(ProviderError::OutOfOrder {
                    what,
                    expected,
                    got,
                });
            }
        }
        expected = Some(got.saturating_add(1));
    }
    Ok(())
}

/// Check a committee batch starts at `first` and advances one period at a time.
pub fn ensure_committee_order(
    first: Period,
    max: usize,
    certificates: &[CommitteeCertificate],
) -> Result<(), ProviderError> {
    ensure_sequence(
        "committee period",
        Some(first),
        max,
        certificates.iter().map(|c| c.subject.period),
    )
}

/// Check a block batch matches `request` and advances one block at a time.
pub fn ensure_block_order(
    request: BlockRequest,
    max: usize,
    certificates: &[BlockCertificate],
) -> Result<(), ProviderError> {
    let first = match request {
        BlockRequest::Latest => None,
        BlockRequest::Number(n) => Some(n),
    };
    ensure_sequence(
        "block number",
        first,
        max,
        certificates.iter().map(|c| c.subject.number),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{BlockStatement, Certificate, CommitteeStatement};

    fn committees(periods: &[u64]) -> Vec<CommitteeCertificate> {
        periods
            .iter()
            .map(|&period| {
                Certificate::new(CommitteeStatement {
                    period,
                    ..Default::default()
                })
            })
            .collect()
    }

    fn blocks(numbers: &[u64]) -> Vec<BlockCertificate> {
        numbers
            .iter()
            .map(|&number| {
                Certificate::new(BlockStatement {
                    number,
                    ..Default::default()
                })
            })
            .collect()
    }

    #[test]
    fn test_committee_order_accepts_contiguous_batch() {
        assert!(ensure_committee_order(3, 3, &committees(&[3, 4, 5])).is_ok());
        assert!(ensure_committee_order(3, 3, &committees(&[3, 4])).is_ok());
        assert!(ensure_committee_order(3, 3, &[]).is_ok());
    }

    #[test]
    fn test_committee_order_rejects_gap_and_wrong_start() {
        let gap = ensure_committee_order(3, 5, &committees(&[3, 5])).unwrap_err();
        assert!(matches!(
            gap,
            ProviderError::OutOfOrder { expected: 4, got: 5, .. }
        ));
        assert!(gap.is_protocol_violation());
        assert!(!gap.is_retryable());

        assert!(ensure_committee_order(3, 5, &committees(&[4, 5])).is_err());
        assert!(ensure_committee_order(3, 5, &committees(&[3, 3])).is_err());
    }

    #[test]
    fn test_too_many_results_rejected() {
        assert!(matches!(
            ensure_committee_order(1, 1, &committees(&[1, 2])),
            Err(ProviderError::OutOfOrder { what: "result count", expected: 1, got: 2 })
        ));
    }

    #[test]
    fn test_block_order_latest_has_no_fixed_start() {
        assert!(ensure_block_order(BlockRequest::Latest, 1, &blocks(&[90])).is_ok());
        assert!(ensure_block_order(BlockRequest::Latest, 2, &blocks(&[90, 91])).is_ok());
        assert!(ensure_block_order(BlockRequest::Latest, 2, &blocks(&[91, 90])).is_err());
        assert!(ensure_block_order(BlockRequest::Number(7), 2, &blocks(&[8])).is_err());
    }

    #[test]
    fn test_error_text_joins_causes() {
        let err = ProviderError::AllProvidersFailed(vec![
            ProviderError::Closed,
            ProviderError::Transport {
                endpoint: "http://b".into(),
                reason: "connection refused".into(),
            },
        ]);
        let text = err.to_string();
        assert!(text.starts_with("All providers failed"));
        assert!(text.contains("Provider is closed"));
        assert!(text.contains("connection refused"));
        assert_eq!(err.causes().len(), 2);
        assert!(err.is_retryable());
    }
}
