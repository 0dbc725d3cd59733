use thiserror::Error;
use tracing::{debug, info};

use crate::consensus::certificate::{BlockCertificate, CommitteeCertificate, VerificationError};
use crate::types::committee::{Committee, CommitteeError};
use crate::types::statement::{BlockNumber, ChainParams, Hash, ParamsError, Period};

/// Errors raised when the root of trust itself is unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid chain parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("Invalid genesis committee: {0}")]
    InvalidGenesis(#[from] CommitteeError),
}

/// The light client's trusted view of the chain.
///
/// Holds only the latest trusted committee and the verified head. It changes
/// through two transitions: committing a verified `CommitteeRotation` and
/// advancing the head with a verified block certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LightClientState {
    params: ChainParams,
    committee: Committee,
    period: Period,
    head: BlockNumber,
    head_hash: Hash,
    head_state_root: Hash,
}

impl LightClientState {
    /// Bootstrap from the genesis committee, the root of trust for period 0.
    pub fn from_genesis(params: ChainParams, committee: Committee) -> Result<Self, StateError> {
        params.validate()?;
        committee.validate()?;

        info!(
            chain_id = params.chain_id,
            members = committee.len(),
            "Initialized light client from genesis committee"
        );

        Ok(Self {
            params,
            committee,
            period: 0,
            head: 0,
            head_hash: [0u8; 32],
            head_state_root: [0u8; 32],
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn trusted_committee(&self) -> &Committee {
        &self.committee
    }

    pub fn trusted_period(&self) -> Period {
        self.period
    }

    pub fn head(&self) -> BlockNumber {
        self.head
    }

    pub fn head_hash(&self) -> Hash {
        self.head_hash
    }

    pub fn head_state_root(&self) -> Hash {
        self.head_state_root
    }

    pub fn period_of(&self, number: BlockNumber) -> Period {
        self.params.period_of(number)
    }

    /// Start a rotation on a working copy of the trusted committee.
    /// Nothing is trusted until `commit_rotation`.
    pub fn begin_rotation(&self) -> CommitteeRotation {
        CommitteeRotation {
            params: self.params,
            base_period: self.period,
            period: self.period,
            committee: self.committee.clone(),
            adopted: 0,
        }
    }

    /// Install a completed rotation. Returns how many committees it adopted.
    pub fn commit_rotation(&mut self, rotation: CommitteeRotation) -> Result<usize, VerificationError> {
        if rotation.base_period != self.period {
            return Err(VerificationError::PeriodMismatch {
                expected: self.period,
                got: rotation.base_period,
            });
        }

        if rotation.adopted > 0 {
            info!(
                from = self.period,
                to = rotation.period,
                members = rotation.committee.len(),
                "Committee rotation committed"
            );
        }

        self.committee = rotation.committee;
        self.period = rotation.period;
        Ok(rotation.adopted)
    }

    /// Check a block certificate against the committee for the trusted period.
    pub fn verify_block(&self, certificate: &BlockCertificate) -> Result<(), VerificationError> {
        let period = self.period_of(certificate.subject.number);
        if period != self.period {
            return Err(VerificationError::PeriodMismatch {
                expected: self.period,
                got: period,
            });
        }
        certificate.verify(&self.committee, &self.params)
    }

    /// Verify `certificate` and make its block the new head.
    pub fn advance_head(&mut self, certificate: &BlockCertificate) -> Result<BlockNumber, VerificationError> {
        self.verify_block(certificate)?;

        let subject = &certificate.subject;
        self.head = subject.number;
        self.head_hash = subject.hash;
        self.head_state_root = subject.state_root;

        info!(
            number = self.head,
            state_root = %hex::encode(self.head_state_root),
            "Head advanced"
        );
        Ok(self.head)
    }
}

/// A chain of committee hand-offs being verified against a working copy.
#[derive(Clone, Debug)]
pub struct CommitteeRotation {
    params: ChainParams,
    base_period: Period,
    period: Period,
    committee: Committee,
    adopted: usize,
}

impl CommitteeRotation {
    /// Period of the working committee.
    pub fn period(&self) -> Period {
        self.period
    }

    pub fn committee(&self) -> &Committee {
        &self.committee
    }

    pub fn adopted(&self) -> usize {
        self.adopted
    }

    /// Adopt the committee for `period + 1`, attested by the working committee.
    pub fn extend(&mut self, certificate: &CommitteeCertificate) -> Result<(), VerificationError> {
        let next = self.period + 1;
        if certificate.subject.period != next {
            return Err(VerificationError::PeriodMismatch {
                expected: next,
                got: certificate.subject.period,
            });
        }

        certificate.verify(&self.committee, &self.params)?;
        certificate.subject.committee.validate()?;

        debug!(
            period = next,
            members = certificate.subject.committee.len(),
            signers = certificate.signature.num_signers(),
            "Verified committee hand-off"
        );

        self.committee = certificate.subject.committee.clone();
        self.period = next;
        self.adopted += 1;
        Ok(())
    }
}
