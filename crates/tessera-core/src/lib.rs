//! # Tessera Core
//!
//! Pure verification logic for the tessera light client.
//!
//! This crate contains **no networking code**. Every certificate and proof a
//! client receives passes through these functions before it is trusted.
//!
//! ## Trust Model
//!
//! - **Certificate verification** (`consensus` module): a statement is accepted
//!   when the committee trusted for its period signed it with at least the
//!   configured quorum of voting power. Each committee is attested by the one
//!   before it, back to a caller-supplied genesis committee.
//!
//! - **Execution proof verification** (`execution` module): verifies
//!   Merkle-Patricia trie proofs for account state and storage against a
//!   state root taken from a verified block certificate.
//!
//! ## Usage
//!
//! ```ignore
//! use tessera_core::{codec, LightClientState, ChainParams};
//!
//! let mut state = LightClientState::from_genesis(ChainParams::new(1, 16_384), genesis)?;
//! let cert = codec::deserialize(&bytes)?;
//! state.advance_head(&cert)?;
//! ```

pub mod codec;
pub mod consensus;
pub mod execution;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use codec::{deserialize, serialize, CodecError, WireFormat};
pub use consensus::{
    bls::BlsError,
    certificate::{
        AggregatedSignature, BlockCertificate, Certificate, CommitteeCertificate,
        VerificationError,
    },
    light_client::{CommitteeRotation, LightClientState, StateError},
};
pub use execution::{
    account::{verify_full_account_state, VerifiedAccountState, VerifiedStorageSlot},
    proof::{keccak256, verify_account_proof, verify_storage_proof, ProofError},
};
pub use types::{committee::*, execution::*, statement::*};
