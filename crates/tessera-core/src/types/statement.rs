use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::WireFormat;
use crate::types::committee::Committee;

/// Identifies the chain a statement is bound to.
pub type ChainId = u64;

/// Committee epoch index.
pub type Period = u64;

/// Block height.
pub type BlockNumber = u64;

/// A 32-byte hash (block hash, state root).
pub type Hash = [u8; 32];

/// Default committee rotation length, in blocks.
pub const DEFAULT_PERIOD_LENGTH: u64 = 16_384;

/// Supermajority fraction of total voting power a signer set must reach.
///
/// A signer set with power `signed` out of `total` meets the threshold iff
/// `signed * denominator >= total * numerator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumThreshold {
    pub numerator: u64,
    pub denominator: u64,
}

impl QuorumThreshold {
    /// Two thirds of the total voting power.
    pub const TWO_THIRDS: Self = Self {
        numerator: 2,
        denominator: 3,
    };

    pub fn is_valid(&self) -> bool {
        self.numerator > 0 && self.numerator <= self.denominator
    }

    pub fn is_met(&self, signed: u64, total: u64) -> bool {
        (signed as u128) * (self.denominator as u128) >= (total as u128) * (self.numerator as u128)
    }

    /// Smallest voting power that satisfies the threshold for `total`.
    pub fn required(&self, total: u64) -> u64 {
        let num = (total as u128) * (self.numerator as u128);
        let den = self.denominator.max(1) as u128;
        num.div_ceil(den) as u64
    }
}

impl Default for QuorumThreshold {
    fn default() -> Self {
        Self::TWO_THIRDS
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamsError {
    #[error("Period length must be non-zero")]
    ZeroPeriodLength,

    #[error("Invalid quorum threshold {numerator}/{denominator}")]
    InvalidQuorum { numerator: u64, denominator: u64 },
}

/// Chain-wide constants a light client is configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub chain_id: ChainId,
    pub period_length: u64,
    #[serde(default)]
    pub quorum: QuorumThreshold,
}

impl ChainParams {
    pub fn new(chain_id: ChainId, period_length: u64) -> Self {
        Self {
            chain_id,
            period_length,
            quorum: QuorumThreshold::default(),
        }
    }

    pub fn with_quorum(mut self, quorum: QuorumThreshold) -> Self {
        self.quorum = quorum;
        self
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.period_length == 0 {
            return Err(ParamsError::ZeroPeriodLength);
        }
        if !self.quorum.is_valid() {
            return Err(ParamsError::InvalidQuorum {
                numerator: self.quorum.numerator,
                denominator: self.quorum.denominator,
            });
        }
        Ok(())
    }

    /// The committee period a block belongs to.
    pub fn period_of(&self, number: BlockNumber) -> Period {
        number / self.period_length.max(1)
    }
}

/// Wire tag distinguishing the statement variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StatementKind {
    Committee = 1,
    Block = 2,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::CommitteeStatement {}
    impl Sealed for super::BlockStatement {}
}

/// Something a committee signs. Implemented only by the two statement types.
pub trait Statement: sealed::Sealed + WireFormat + Clone + Debug + PartialEq + Eq {
    const KIND: StatementKind;

    fn chain_id(&self) -> ChainId;

    /// The exact bytes members sign: the statement's wire encoding.
    fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_length());
        self.encode_wire(&mut out);
        out
    }
}

/// "This is the committee governing `period`."
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeStatement {
    pub chain_id: ChainId,
    pub period: Period,
    pub committee: Committee,
}

impl Statement for CommitteeStatement {
    const KIND: StatementKind = StatementKind::Committee;

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }
}

/// "Block `number` is finalized with this hash and state root."
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStatement {
    pub chain_id: ChainId,
    pub number: BlockNumber,
    pub hash: Hash,
    pub state_root: Hash,
}

impl Statement for BlockStatement {
    const KIND: StatementKind = StatementKind::Block;

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }
}
