use bitvec::prelude::*;
use thiserror::Error;

use crate::consensus::bls::{self, BlsError};
use crate::types::committee::{BlsPublicKey, BlsSignature, Committee, CommitteeError, MemberId};
use crate::types::statement::{BlockStatement, ChainId, ChainParams, CommitteeStatement, Period, Statement};

/// Errors that can occur while building or verifying a certificate.
/// Each variant names the specific check that failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Statement is bound to chain {got}, expected chain {expected}")]
    ChainIdMismatch { expected: ChainId, got: ChainId },

    #[error("Signer {member} is not a member of the committee ({size} members)")]
    UnknownMember { member: MemberId, size: usize },

    #[error("Member {member} has already signed this certificate")]
    AlreadySigned { member: MemberId },

    #[error("Certificate has no signers")]
    NoSigners,

    #[error("Insufficient voting power: {signed}/{total} (need at least {required})")]
    InsufficientQuorum { signed: u64, total: u64, required: u64 },

    #[error("Invalid BLS signature: the signature does not verify against the signing members")]
    InvalidSignature,

    #[error("Certificate is for period {got}, expected period {expected}")]
    PeriodMismatch { expected: Period, got: Period },

    #[error("Certified committee is invalid: {0}")]
    InvalidCommittee(#[from] CommitteeError),

    #[error("BLS error: {0}")]
    Bls(String),
}

impl From<BlsError> for VerificationError {
    fn from(err: BlsError) -> Self {
        match err {
            BlsError::VerificationFailed => VerificationError::InvalidSignature,
            other => VerificationError::Bls(other.to_string()),
        }
    }
}

/// An aggregate BLS signature plus the bitmask of members that contributed.
///
/// The bitmask length is always a whole number of bytes so the wire encoding
/// round-trips to an identical value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregatedSignature {
    signers: BitVec<u8, Lsb0>,
    signature: BlsSignature,
}

impl AggregatedSignature {
    pub fn new(signers: BitVec<u8, Lsb0>, signature: BlsSignature) -> Self {
        let mut signers = signers;
        let padded = signers.len().div_ceil(8) * 8;
        signers.resize(padded, false);
        Self { signers, signature }
    }

    /// Rebuild from the raw bitmask bytes.
    pub fn from_parts(signer_bytes: Vec<u8>, signature: BlsSignature) -> Self {
        Self {
            signers: BitVec::from_vec(signer_bytes),
            signature,
        }
    }

    pub fn signature(&self) -> &BlsSignature {
        &self.signature
    }

    pub fn signer_bytes(&self) -> &[u8] {
        self.signers.as_raw_slice()
    }

    pub fn has_signer(&self, member: MemberId) -> bool {
        self.signers.get(member).map_or(false, |bit| *bit)
    }

    pub fn num_signers(&self) -> usize {
        self.signers.count_ones()
    }

    pub fn signer_indices(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.signers.iter_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.not_any()
    }

    fn mark(&mut self, member: MemberId) {
        if member >= self.signers.len() {
            self.signers.resize((member / 8 + 1) * 8, false);
        }
        self.signers.set(member, true);
    }
}

/// A statement together with the committee's aggregated signature over it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Certificate<S: Statement> {
    pub subject: S,
    pub signature: AggregatedSignature,
}

pub type CommitteeCertificate = Certificate<CommitteeStatement>;
pub type BlockCertificate = Certificate<BlockStatement>;

impl<S: Statement> Certificate<S> {
    /// An unsigned certificate, the seed for incremental signing.
    pub fn new(subject: S) -> Self {
        Self {
            subject,
            signature: AggregatedSignature::default(),
        }
    }

    /// Add one member's signature, checking it before folding it into the aggregate.
    pub fn add(
        &mut self,
        committee: &Committee,
        member: MemberId,
        signature: &BlsSignature,
    ) -> Result<(), VerificationError> {
        let signer = committee.get(member).ok_or(VerificationError::UnknownMember {
            member,
            size: committee.len(),
        })?;
        if self.signature.has_signer(member) {
            return Err(VerificationError::AlreadySigned { member });
        }

        bls::verify(&signer.public_key, &self.subject.signing_bytes(), signature)?;

        let aggregate = if self.signature.is_empty() {
            *signature
        } else {
            bls::aggregate(&self.signature.signature, signature)?
        };
        self.signature.signature = aggregate;
        self.signature.mark(member);
        Ok(())
    }

    /// Check the certificate against the committee trusted for its statement.
    ///
    /// 1. The statement is bound to the configured chain.
    /// 2. Every signer bit names a member of `committee`.
    /// 3. Signers hold at least the quorum share of voting power.
    /// 4. The aggregate signature verifies against exactly the signers' keys.
    pub fn verify(&self, committee: &Committee, params: &ChainParams) -> Result<(), VerificationError> {
        let chain_id = self.subject.chain_id();
        if chain_id != params.chain_id {
            return Err(VerificationError::ChainIdMismatch {
                expected: params.chain_id,
                got: chain_id,
            });
        }

        if self.signature.is_empty() {
            return Err(VerificationError::NoSigners);
        }

        let mut signed_power = 0u64;
        let mut signer_keys: Vec<&BlsPublicKey> = Vec::with_capacity(self.signature.num_signers());
        for member in self.signature.signer_indices() {
            let signer = committee.get(member).ok_or(VerificationError::UnknownMember {
                member,
                size: committee.len(),
            })?;
            signed_power = signed_power.saturating_add(signer.voting_power);
            signer_keys.push(&signer.public_key);
        }

        let total = committee
            .total_voting_power()
            .ok_or(CommitteeError::VotingPowerOverflow)?;
        if !params.quorum.is_met(signed_power, total) {
            return Err(VerificationError::InsufficientQuorum {
                signed: signed_power,
                total,
                required: params.quorum.required(total),
            });
        }

        bls::verify_aggregate(&signer_keys, &self.subject.signing_bytes(), &self.signature.signature)?;
        Ok(())
    }
}
