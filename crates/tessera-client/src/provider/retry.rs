use std::thread;
use std::time::{Duration, Instant};

use tessera_core::{BlockCertificate, BlockNumber, CommitteeCertificate, EthGetProofResponse, Period};
use tracing::{debug, warn};

use super::{BlockRequest, Provider, ProviderError};

/// Deadline applied when a zero timeout is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts allowed after the first.
    pub retries: u32,
    /// Wall-clock budget for the whole operation. Zero means `DEFAULT_TIMEOUT`.
    pub timeout: Duration,
    /// First backoff delay; doubles after every failed attempt.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: DEFAULT_TIMEOUT,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }
}

/// Retries one provider's failing calls, blocking the caller between attempts.
pub struct Retry<P> {
    inner: P,
    config: RetryConfig,
}

impl<P: Provider> Retry<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn run<T>(
        &self,
        operation: &'static str,
        mut call: impl FnMut(&P) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let timeout = self.config.effective_timeout();
        let started = Instant::now();
        let mut delay = self.config.backoff;
        let mut errors = Vec::new();

        loop {
            let attempt = errors.len() as u32 + 1;
            match call(&self.inner) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Provider call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    warn!(operation, attempt, error = %err, "Provider call failed");
                    errors.push(err);
                }
            }

            let attempts = errors.len() as u32;
            if attempts > self.config.retries {
                return Err(ProviderError::RetriesExhausted { attempts, errors });
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(ProviderError::TimeoutExceeded {
                    timeout,
                    attempts,
                    errors,
                });
            }

            thread::sleep(delay.min(MAX_BACKOFF).min(timeout - elapsed));
            delay = delay.saturating_mul(2);

            if started.elapsed() >= timeout {
                return Err(ProviderError::TimeoutExceeded {
                    timeout,
                    attempts,
                    errors,
                });
            }
        }
    }
}

impl<P: Provider> Provider for Retry<P> {
    fn committee_certificates(
        &self,
        first: Period,
        max: usize,
    ) -> Result<Vec<CommitteeCertificate>, ProviderError> {
        self.run("committee_certificates", |p| p.committee_certificates(first, max))
    }

    fn block_certificates(
        &self,
        request: BlockRequest,
        max: usize,
    ) -> Result<Vec<BlockCertificate>, ProviderError> {
        self.run("block_certificates", |p| p.block_certificates(request, max))
    }

    fn account_proof(
        &self,
        address: [u8; 20],
        storage_keys: &[[u8; 32]],
        height: BlockNumber,
    ) -> Result<Option<EthGetProofResponse>, ProviderError> {
        self.run("account_proof", |p| p.account_proof(address, storage_keys, height))
    }

    fn close(&mut self) -> Result<(), ProviderError> {
        self.inner.close()
    }
}
