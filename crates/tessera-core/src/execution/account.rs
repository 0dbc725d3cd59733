use tracing::debug;

use crate::execution::proof::{verify_account_proof, verify_storage_proof, ProofError};
use crate::types::execution::*;

/// Verify `address` and every storage slot in `proof_response` against a
/// trusted state root.
///
/// The proof data can come from any source; only the state root must be
/// trusted. A response for any other address is rejected.
pub fn verify_full_account_state(
    state_root: [u8; 32],
    address: [u8; 20],
    proof_response: &EthGetProofResponse,
) -> Result<VerifiedAccountState, ProofError> {
    let account = verify_account_proof(state_root, address, &proof_response.account_proof)?;

    let storage_slots = proof_response
        .storage_proofs
        .iter()
        .map(|storage_proof| {
            verify_storage_proof(account.storage_root, storage_proof.key, storage_proof).map(
                |value| VerifiedStorageSlot {
                    key: storage_proof.key,
                    value,
                },
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        address = %hex::encode(address),
        slots = storage_slots.len(),
        "Verified account state"
    );

    Ok(VerifiedAccountState {
        address,
        state_root,
        account,
        storage_slots,
    })
}

/// An account state proven against a trusted state root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedAccountState {
    pub address: [u8; 20],
    /// The root the account was proven against.
    pub state_root: [u8; 32],
    pub account: AccountState,
    pub storage_slots: Vec<VerifiedStorageSlot>,
}

/// A single verified storage slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedStorageSlot {
    pub key: [u8; 32],
    pub value: [u8; 32],
}

impl VerifiedAccountState {
    pub fn is_contract(&self) -> bool {
        self.account.is_contract()
    }

    /// Look up a verified storage slot value by key.
    pub fn get_storage(&self, key: &[u8; 32]) -> Option<&[u8; 32]> {
        self.storage_slots
            .iter()
            .find(|s| &s.key == key)
            .map(|s| &s.value)
    }
}
