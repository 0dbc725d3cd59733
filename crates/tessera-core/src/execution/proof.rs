use alloy_rlp::{Decodable, Header};
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};
use tracing::debug;

use crate::types::execution::*;

/// Errors during Merkle-Patricia trie proof verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("Empty proof: no trie nodes provided")]
    EmptyProof,

    #[error("Invalid RLP encoding in proof node {index}: {reason}")]
    InvalidRlp { index: usize, reason: String },

    #[error("Proof node {index} hashes to {computed}, parent commits to {expected}")]
    RootMismatch {
        index: usize,
        computed: String,
        expected: String,
    },

    #[error("Invalid trie node at depth {depth}: {node_type}")]
    InvalidNodeType { depth: usize, node_type: String },

    #[error("Proof path incomplete: ran out of nodes at depth {depth}")]
    IncompleteProof { depth: usize },

    #[error("Proof is for address {proof}, requested {requested}")]
    AddressMismatch { requested: String, proof: String },

    #[error("Account not found at address {address}")]
    AccountNotFound { address: String },

    #[error("Invalid account RLP encoding: {reason}")]
    InvalidAccountEncoding { reason: String },

    #[error("Invalid value encoding: {reason}")]
    InvalidValueEncoding { reason: String },

    #[error("Claimed {field} does not match the proven value")]
    ClaimMismatch { field: &'static str },
}

/// Compute keccak256 hash of data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// Verify an account proof against a trusted state root.
///
/// The state root must come from a verified block certificate. The proof must
/// be for `address`; an address with no leaf in the trie yields
/// `AccountNotFound`, never a default account.
pub fn verify_account_proof(
    state_root: [u8; 32],
    address: [u8; 20],
    proof: &AccountProof,
) -> Result<AccountState, ProofError> {
    if proof.address != address {
        return Err(ProofError::AddressMismatch {
            requested: hex::encode(address),
            proof: hex::encode(proof.address),
        });
    }
    if proof.proof.is_empty() {
        return Err(ProofError::EmptyProof);
    }

    let key = keccak256(&address);
    match verify_merkle_patricia_proof(&state_root, &key, &proof.proof)? {
        Some(rlp_bytes) => {
            let account = decode_account(rlp_bytes)?;
            if let Some(claimed) = &proof.account {
                if claimed != &account {
                    return Err(ProofError::ClaimMismatch { field: "account" });
                }
            }
            Ok(account)
        }
        None => Err(ProofError::AccountNotFound {
            address: hex::encode(address),
        }),
    }
}

/// Verify a storage proof against a proven account's storage root.
/// A slot absent from the trie is proven zero.
pub fn verify_storage_proof(
    storage_root: [u8; 32],
    slot: [u8; 32],
    proof: &StorageProof,
) -> Result<[u8; 32], ProofError> {
    if proof.proof.is_empty() {
        if storage_root == AccountState::EMPTY_STORAGE_ROOT {
            return Ok([0u8; 32]);
        }
        return Err(ProofError::EmptyProof);
    }

    let key = keccak256(&slot);
    let value = match verify_merkle_patricia_proof(&storage_root, &key, &proof.proof)? {
        Some(rlp_bytes) => decode_storage_value(rlp_bytes)?,
        None => [0u8; 32],
    };

    if value != proof.value {
        return Err(ProofError::ClaimMismatch { field: "storage value" });
    }
    Ok(value)
}

/// Where the next trie node lives: in the proof (by hash) or inside its parent.
#[derive(Clone, Copy)]
enum NodeRef<'a> {
    Hash([u8; 32]),
    Inline(&'a [u8]),
}

/// One item of a decoded trie node.
enum Item<'a> {
    Bytes(&'a [u8]),
    /// A nested list, kept as its full encoding.
    List(&'a [u8]),
}

impl<'a> Item<'a> {
    fn bytes(&self, depth: usize) -> Result<&'a [u8], ProofError> {
        match self {
            Item::Bytes(b) => Ok(*b),
            Item::List(_) => Err(ProofError::InvalidNodeType {
                depth,
                node_type: "expected a byte string, found a list".to_string(),
            }),
        }
    }
}

/// Walk the trie from the root following `key`, checking every hash link.
///
/// Returns `Some(value)` if the key is present, `None` for a proof of absence.
fn verify_merkle_patricia_proof<'a>(
    expected_root: &[u8; 32],
    key: &[u8; 32],
    proof_nodes: &'a [Vec<u8>],
) -> Result<Option<&'a [u8]>, ProofError> {
    if proof_nodes.is_empty() {
        return Err(ProofError::EmptyProof);
    }

    let nibbles = bytes_to_nibbles(key);
    let mut nibble_index = 0usize;
    let mut next_node = 0usize;
    let mut target = NodeRef::Hash(*expected_root);

    let mut depth = 0usize;
    loop {
        let node: &'a [u8] = match target {
            NodeRef::Hash(expected) => {
                let node = proof_nodes
                    .get(next_node)
                    .map(Vec::as_slice)
                    .ok_or(ProofError::IncompleteProof { depth })?;
                let computed = keccak256(node);
                if computed != expected {
                    return Err(ProofError::RootMismatch {
                        index: next_node,
                        computed: hex::encode(computed),
                        expected: hex::encode(expected),
                    });
                }
                next_node += 1;
                node
            }
            NodeRef::Inline(raw) => raw,
        };

        let items = decode_node(node).map_err(|reason| ProofError::InvalidRlp {
            index: next_node.saturating_sub(1),
            reason,
        })?;

        match items.len() {
            17 => {
                // Branch node: 16 children + value
                if nibble_index == nibbles.len() {
                    let value = items[16].bytes(depth)?;
                    return Ok((!value.is_empty()).then_some(value));
                }
                let child = &items[nibbles[nibble_index] as usize];
                nibble_index += 1;
                match child_ref(child, depth)? {
                    Some(next) => target = next,
                    None => return Ok(None),
                }
            }
            2 => {
                let (path, is_leaf) = decode_compact_path(items[0].bytes(depth)?, depth)?;
                let remaining = &nibbles[nibble_index..];

                if is_leaf {
                    if remaining != path.as_slice() {
                        return Ok(None);
                    }
                    let value = items[1].bytes(depth)?;
                    return Ok((!value.is_empty()).then_some(value));
                }

                // Extension node: consume the shared prefix
                if path.is_empty() {
                    return Err(ProofError::InvalidNodeType {
                        depth,
                        node_type: "extension with an empty path".to_string(),
                    });
                }
                if !remaining.starts_with(&path) {
                    return Ok(None);
                }
                nibble_index += path.len();
                match child_ref(&items[1], depth)? {
                    Some(next) => target = next,
                    None => return Ok(None),
                }
            }
            n => {
                return Err(ProofError::InvalidNodeType {
                    depth,
                    node_type: format!("{}-element list", n),
                });
            }
        }
        depth += 1;
    }
}

fn child_ref<'a>(item: &Item<'a>, depth: usize) -> Result<Option<NodeRef<'a>>, ProofError> {
    match item {
        Item::Bytes(b) if b.is_empty() => Ok(None),
        Item::Bytes(b) => {
            let hash: [u8; 32] = (*b).try_into().map_err(|_| ProofError::InvalidNodeType {
                depth,
                node_type: format!("{}-byte child reference", b.len()),
            })?;
            Ok(Some(NodeRef::Hash(hash)))
        }
        Item::List(raw) => Ok(Some(NodeRef::Inline(*raw))),
    }
}

/// Split an RLP list into its items.
fn decode_node(node: &[u8]) -> Result<Vec<Item<'_>>, String> {
    let mut buf = node;
    let header = Header::decode(&mut buf).map_err(|e| e.to_string())?;
    if !header.list {
        return Err("trie node is not a list".to_string());
    }
    if buf.len() != header.payload_length {
        return Err(format!(
            "list declares {} payload bytes, node carries {}",
            header.payload_length,
            buf.len()
        ));
    }

    let mut items = Vec::with_capacity(17);
    while !buf.is_empty() {
        let start = buf;
        let item = Header::decode(&mut buf).map_err(|e| e.to_string())?;
        if buf.len() < item.payload_length {
            return Err("item overruns node".to_string());
        }
        let header_len = start.len() - buf.len();
        let (payload, rest) = buf.split_at(item.payload_length);
        items.push(if item.list {
            Item::List(&start[..header_len + item.payload_length])
        } else {
            Item::Bytes(payload)
        });
        buf = rest;
    }
    Ok(items)
}

/// Read one RLP byte string.
fn decode_string<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], String> {
    let header = Header::decode(buf).map_err(|e| e.to_string())?;
    if header.list {
        return Err("expected bytes, got list".to_string());
    }
    if buf.len() < header.payload_length {
        return Err("string overruns input".to_string());
    }
    let (value, rest) = buf.split_at(header.payload_length);
    *buf = rest;
    Ok(value)
}

/// Decode an account: RLP([nonce, balance, storageRoot, codeHash]).
fn decode_account(rlp_bytes: &[u8]) -> Result<AccountState, ProofError> {
    let invalid = |reason: String| ProofError::InvalidAccountEncoding { reason };

    let mut buf = rlp_bytes;
    let header = Header::decode(&mut buf).map_err(|e| invalid(e.to_string()))?;
    if !header.list || buf.len() != header.payload_length {
        return Err(invalid("account is not a well-formed list".to_string()));
    }

    let nonce = u64::decode(&mut buf).map_err(|e| invalid(format!("nonce: {}", e)))?;
    let balance_bytes = decode_string(&mut buf).map_err(invalid)?;
    if balance_bytes.len() > 32 {
        return Err(invalid(format!("balance is {} bytes", balance_bytes.len())));
    }
    let mut balance = [0u8; 32];
    balance[32 - balance_bytes.len()..].copy_from_slice(balance_bytes);

    let storage_root = fixed_hash(&mut buf, "storage root")?;
    let code_hash = fixed_hash(&mut buf, "code hash")?;

    if !buf.is_empty() {
        return Err(invalid("expected 4 items".to_string()));
    }

    Ok(AccountState {
        nonce,
        balance,
        storage_root,
        code_hash,
    })
}

fn fixed_hash(buf: &mut &[u8], field: &str) -> Result<[u8; 32], ProofError> {
    let bytes = decode_string(buf).map_err(|reason| ProofError::InvalidAccountEncoding { reason })?;
    bytes.try_into().map_err(|_| ProofError::InvalidAccountEncoding {
        reason: format!("Invalid {} length: {}", field, bytes.len()),
    })
}

/// Decode a storage value: an RLP string of at most 32 big-endian bytes.
fn decode_storage_value(rlp_bytes: &[u8]) -> Result<[u8; 32], ProofError> {
    let mut buf = rlp_bytes;
    let value =
        decode_string(&mut buf).map_err(|reason| ProofError::InvalidValueEncoding { reason })?;

    if value.len() > 32 {
        return Err(ProofError::InvalidValueEncoding {
            reason: format!("Storage value too long: {} bytes", value.len()),
        });
    }
    let mut result = [0u8; 32];
    result[32 - value.len()..].copy_from_slice(value);
    debug!(bytes = value.len(), "Decoded storage value");
    Ok(result)
}

fn bytes_to_nibbles(bytes: &[u8; 32]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(64);
    for byte in bytes {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    nibbles
}

/// Decode compact (hex-prefix) encoding used in trie nodes.
/// Returns (nibbles, is_leaf). The flag nibble must be 0 to 3.
fn decode_compact_path(encoded: &[u8], depth: usize) -> Result<(Vec<u8>, bool), ProofError> {
    let invalid = |node_type: String| ProofError::InvalidNodeType { depth, node_type };

    let Some((&first, rest)) = encoded.split_first() else {
        return Err(invalid("empty hex-prefix path".to_string()));
    };

    let flag = first >> 4;
    if flag > 3 {
        return Err(invalid(format!("hex-prefix flag {}", flag)));
    }
    if flag % 2 == 0 && first & 0x0F != 0 {
        return Err(invalid("non-zero padding in even hex-prefix path".to_string()));
    }

    let is_leaf = flag >= 2;
    let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
    if flag % 2 == 1 {
        nibbles.push(first & 0x0F);
    }
    for &byte in rest {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    Ok((nibbles, is_leaf))
}
