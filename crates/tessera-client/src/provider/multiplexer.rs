use tessera_core::{BlockCertificate, BlockNumber, CommitteeCertificate, EthGetProofResponse, Period};
use tracing::{debug, warn};

use super::{ensure_block_order, ensure_committee_order, BlockRequest, Provider, ProviderError};

/// One logical provider over several sources, tried in order until one answers.
pub struct Multiplexer {
    providers: Vec<Box<dyn Provider>>,
}

impl Multiplexer {
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Result<Self, ProviderError> {
        if providers.is_empty() {
            return Err(ProviderError::NoProviders);
        }
        Ok(Self { providers })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn first_success<T>(
        &self,
        operation: &'static str,
        mut call: impl FnMut(&dyn Provider) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut errors = Vec::with_capacity(self.providers.len());

        for (index, provider) in self.providers.iter().enumerate() {
            match call(provider.as_ref()) {
                Ok(value) => {
                    if index > 0 {
                        debug!(operation, provider = index, "Served by fallback provider");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_protocol_violation() => {
                    warn!(operation, provider = index, error = %err, "Provider violated ordering");
                    return Err(err);
                }
                Err(err) => {
                    warn!(operation, provider = index, error = %err, "Provider failed, trying next");
                    errors.push(err);
                }
            }
        }

        Err(ProviderError::AllProvidersFailed(errors))
    }
}

impl Provider for Multiplexer {
    fn committee_certificates(
        &self,
        first: Period,
        max: usize,
    ) -> Result<Vec<CommitteeCertificate>, ProviderError> {
        self.first_success("committee_certificates", |p| {
            let certificates = p.committee_certificates(first, max)?;
            ensure_committee_order(first, max, &certificates)?;
            Ok(certificates)
        })
    }

    fn block_certificates(
        &self,
        request: BlockRequest,
        max: usize,
    ) -> Result<Vec<BlockCertificate>, ProviderError> {
        self.first_success("block_certificates", |p| {
            let certificates = p.block_certificates(request, max)?;
            ensure_block_order(request, max, &certificates)?;
            Ok(certificates)
        })
    }

    fn account_proof(
        &self,
        address: [u8; 20],
        storage_keys: &[[u8; 32]],
        height: BlockNumber,
    ) -> Result<Option<EthGetProofResponse>, ProviderError> {
        self.first_success("account_proof", |p| p.account_proof(address, storage_keys, height))
    }

    /// Close every provider, even after one fails.
    fn close(&mut self) -> Result<(), ProviderError> {
        let failures: Vec<ProviderError> = self
            .providers
            .iter_mut()
            .filter_map(|p| p.close().err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::CloseFailed(failures))
        }
    }
}
