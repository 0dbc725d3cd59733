use serde::{Deserialize, Serialize};

/// An account as stored in the state trie.
/// Verified via Merkle-Patricia trie proofs against a trusted state root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Number of transactions sent from this account.
    pub nonce: u64,
    /// Balance as 32 big-endian bytes.
    pub balance: [u8; 32],
    /// Root hash of the account's storage trie.
    pub storage_root: [u8; 32],
    /// Keccak256 hash of the account's code.
    pub code_hash: [u8; 32],
}

impl AccountState {
    /// keccak256 of empty bytes, the code hash of accounts without code.
    pub const EMPTY_CODE_HASH: [u8; 32] = [
        0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7,
        0x03, 0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04,
        0x5d, 0x85, 0xa4, 0x70,
    ];

    /// Root of an empty Merkle-Patricia trie.
    pub const EMPTY_STORAGE_ROOT: [u8; 32] = [
        0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0,
        0xf8, 0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5,
        0xe3, 0x63, 0xb4, 0x21,
    ];

    /// A fresh account with no code and no storage.
    pub fn with_balance(nonce: u64, balance: [u8; 32]) -> Self {
        Self {
            nonce,
            balance,
            storage_root: Self::EMPTY_STORAGE_ROOT,
            code_hash: Self::EMPTY_CODE_HASH,
        }
    }

    pub fn is_contract(&self) -> bool {
        self.code_hash != Self::EMPTY_CODE_HASH
    }

}

/// A Merkle-Patricia trie proof for an account.
/// Fetched from an untrusted source and verified locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProof {
    /// The address this proof is for.
    pub address: [u8; 20],
    /// RLP-encoded trie nodes from the root down.
    pub proof: Vec<Vec<u8>>,
    /// The account state the source claims (checked against the proof if present).
    pub account: Option<AccountState>,
}

/// A Merkle-Patricia trie proof for a storage slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProof {
    /// The storage slot this proof is for.
    pub key: [u8; 32],
    /// The value the source claims.
    pub value: [u8; 32],
    /// RLP-encoded trie nodes from the storage root down.
    pub proof: Vec<Vec<u8>>,
}

/// Account proof plus storage proofs for the requested slots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthGetProofResponse {
    pub account_proof: AccountProof,
    pub storage_proofs: Vec<StorageProof>,
}
