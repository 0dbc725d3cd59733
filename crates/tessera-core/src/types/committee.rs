use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::bls;

/// Number of bytes in a BLS12-381 public key (compressed G1 point).
pub const BLS_PUBKEY_LEN: usize = 48;

/// Number of bytes in a BLS12-381 signature or proof-of-possession (compressed G2 point).
pub const BLS_SIGNATURE_LEN: usize = 96;

/// Dense zero-based index of a member inside its committee.
pub type MemberId = usize;

/// Errors raised when a committee fails structural or cryptographic validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitteeError {
    #[error("Committee has no members")]
    Empty,

    #[error("Duplicate public key in committee: members {first} and {second}")]
    DuplicateKey { first: MemberId, second: MemberId },

    #[error("Invalid BLS public key for member {member}: {reason}")]
    InvalidPublicKey { member: MemberId, reason: String },

    #[error("Proof of possession does not verify for member {member}")]
    InvalidProofOfPossession { member: MemberId },

    #[error("Committee total voting power is zero")]
    NoVotingPower,

    #[error("Committee total voting power overflows u64")]
    VotingPowerOverflow,
}

/// A BLS12-381 public key (48 bytes, compressed G1 point).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlsPublicKey(pub [u8; BLS_PUBKEY_LEN]);

impl Default for BlsPublicKey {
    fn default() -> Self {
        Self([0u8; BLS_PUBKEY_LEN])
    }
}

impl BlsPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, &'static str> {
        let arr: [u8; BLS_PUBKEY_LEN] = bytes
            .try_into()
            .map_err(|_| "Invalid BLS public key length")?;
        Ok(Self(arr))
    }
}

/// A BLS12-381 signature (96 bytes, compressed G2 point).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlsSignature(pub [u8; BLS_SIGNATURE_LEN]);

impl BlsSignature {
    /// Compressed encoding of the G2 point at infinity, the identity for aggregation.
    pub const INFINITY: Self = {
        let mut bytes = [0u8; BLS_SIGNATURE_LEN];
        bytes[0] = 0xc0;
        Self(bytes)
    };

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, &'static str> {
        let arr: [u8; BLS_SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| "Invalid BLS signature length")?;
        Ok(Self(arr))
    }
}

impl Default for BlsSignature {
    fn default() -> Self {
        Self::INFINITY
    }
}

macro_rules! hex_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                let s = s.strip_prefix("0x").unwrap_or(&s);
                let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
                Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(BlsPublicKey);
hex_serde!(BlsSignature);

/// A validator entitled to sign for one rotation period.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub public_key: BlsPublicKey,
    pub proof_of_possession: BlsSignature,
    pub voting_power: u64,
}

/// The ordered validator set governing one period.
///
/// Never mutated after construction; a rotation produces a new value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Committee(Vec<Member>);

impl Committee {
    pub fn new(members: Vec<Member>) -> Self {
        Self(members)
    }

    pub fn members(&self) -> &[Member] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: MemberId) -> Option<&Member> {
        self.0.get(id)
    }

    /// Sum of all members' voting power, `None` on overflow.
    pub fn total_voting_power(&self) -> Option<u64> {
        self.0
            .iter()
            .try_fold(0u64, |acc, m| acc.checked_add(m.voting_power))
    }

    /// Validate the committee before it is trusted.
    ///
    /// Rejects empty committees, duplicate keys, undecodable keys, failing
    /// proofs of possession and committees without voting power.
    pub fn validate(&self) -> Result<(), CommitteeError> {
        if self.0.is_empty() {
            return Err(CommitteeError::Empty);
        }

        let mut seen: HashMap<&BlsPublicKey, MemberId> = HashMap::with_capacity(self.0.len());
        for (id, member) in self.0.iter().enumerate() {
            if let Some(&first) = seen.get(&member.public_key) {
                return Err(CommitteeError::DuplicateKey { first, second: id });
            }
            seen.insert(&member.public_key, id);
        }

        match self.total_voting_power() {
            None => return Err(CommitteeError::VotingPowerOverflow),
            Some(0) => return Err(CommitteeError::NoVotingPower),
            Some(_) => {}
        }

        for (id, member) in self.0.iter().enumerate() {
            bls::verify_possession(&member.public_key, &member.proof_of_possession).map_err(
                |e| match e {
                    bls::BlsError::InvalidPublicKey(reason) => {
                        CommitteeError::InvalidPublicKey { member: id, reason }
                    }
                    _ => CommitteeError::InvalidProofOfPossession { member: id },
                },
            )?;
        }

        Ok(())
    }
}
