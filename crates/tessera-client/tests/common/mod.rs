//! A scripted in-memory chain shared by the integration scenarios.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tessera_client::{BlockRequest, Provider, ProviderError};
use tessera_core::test_utils::{certify, committee_of, TestValidator};
use tessera_core::{
    BlockCertificate, BlockNumber, BlockStatement, ChainParams, CommitteeCertificate,
    CommitteeStatement, EthGetProofResponse, Hash, Period,
};

pub const CHAIN_ID: u64 = 1;
pub const PERIOD_LENGTH: u64 = 100;

pub fn params() -> ChainParams {
    ChainParams::new(CHAIN_ID, PERIOD_LENGTH)
}

/// Four equal-power validators derived from `seed..seed + 4`.
pub fn validators(seed: u8) -> Vec<TestValidator> {
    (seed..seed + 4).map(|s| TestValidator::new(s, 10)).collect()
}

pub fn hand_off(signers: &[TestValidator], period: Period, next: &[TestValidator]) -> CommitteeCertificate {
    certify(
        signers,
        &[0, 1, 2],
        CommitteeStatement {
            chain_id: CHAIN_ID,
            period,
            committee: committee_of(next),
        },
    )
}

pub fn block(signers: &[TestValidator], number: BlockNumber, state_root: Hash) -> BlockCertificate {
    certify(
        signers,
        &[0, 1, 2],
        BlockStatement {
            chain_id: CHAIN_ID,
            number,
            hash: [(number % 251) as u8; 32],
            state_root,
        },
    )
}

/// Calls observed by a `ScriptedProvider`, readable after it moves into a client.
#[derive(Default)]
pub struct Calls {
    pub committee_requests: Mutex<Vec<(Period, usize)>>,
    pub proof_requests: Mutex<Vec<([u8; 20], BlockNumber)>>,
    pub closes: AtomicUsize,
}

impl Calls {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Serves whatever the test scripted, verbatim and unchecked.
#[derive(Default)]
pub struct ScriptedProvider {
    pub latest: Option<BlockCertificate>,
    pub committees: BTreeMap<Period, CommitteeCertificate>,
    /// Served as-is regardless of the requested range.
    pub committee_override: Option<Vec<CommitteeCertificate>>,
    pub proofs: BTreeMap<[u8; 20], EthGetProofResponse>,
    pub calls: Arc<Calls>,
}

impl ScriptedProvider {
    pub fn new(latest: BlockCertificate) -> Self {
        Self {
            latest: Some(latest),
            ..Default::default()
        }
    }

    pub fn with_committee(mut self, certificate: CommitteeCertificate) -> Self {
        self.committees.insert(certificate.subject.period, certificate);
        self
    }

    pub fn with_proof(mut self, address: [u8; 20], proof: EthGetProofResponse) -> Self {
        self.proofs.insert(address, proof);
        self
    }

    pub fn calls(&self) -> Arc<Calls> {
        self.calls.clone()
    }
}

impl Provider for ScriptedProvider {
    fn committee_certificates(
        &self,
        first: Period,
        max: usize,
    ) -> Result<Vec<CommitteeCertificate>, ProviderError> {
        self.calls.committee_requests.lock().unwrap().push((first, max));
        if let Some(batch) = &self.committee_override {
            return Ok(batch.clone());
        }
        Ok(self
            .committees
            .range(first..)
            .take(max)
            .map(|(_, c)| c.clone())
            .collect())
    }

    fn block_certificates(
        &self,
        _request: BlockRequest,
        _max: usize,
    ) -> Result<Vec<BlockCertificate>, ProviderError> {
        Ok(self.latest.clone().into_iter().collect())
    }

    fn account_proof(
        &self,
        address: [u8; 20],
        _storage_keys: &[[u8; 32]],
        height: BlockNumber,
    ) -> Result<Option<EthGetProofResponse>, ProviderError> {
        self.calls.proof_requests.lock().unwrap().push((address, height));
        Ok(self.proofs.get(&address).cloned())
    }

    fn close(&mut self) -> Result<(), ProviderError> {
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every call with a transport error.
pub struct DownProvider {
    pub name: &'static str,
    pub attempts: Arc<AtomicUsize>,
}

impl DownProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fail<T>(&self) -> Result<T, ProviderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Transport {
            endpoint: format!("http://{}", self.name),
            reason: format!("{} refused connection", self.name),
        })
    }
}

impl Provider for DownProvider {
    fn committee_certificates(
        &self,
        _first: Period,
        _max: usize,
    ) -> Result<Vec<CommitteeCertificate>, ProviderError> {
        self.fail()
    }

    fn block_certificates(
        &self,
        _request: BlockRequest,
        _max: usize,
    ) -> Result<Vec<BlockCertificate>, ProviderError> {
        self.fail()
    }

    fn account_proof(
        &self,
        _address: [u8; 20],
        _storage_keys: &[[u8; 32]],
        _height: BlockNumber,
    ) -> Result<Option<EthGetProofResponse>, ProviderError> {
        self.fail()
    }

    fn close(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }
}
