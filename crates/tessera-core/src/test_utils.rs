//! Deterministic validators, certificates and single-leaf tries for tests.
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for dependents' tests.

use alloy_rlp::{Encodable, Header};
use bitvec::prelude::*;
use blst::min_pk::SecretKey;

use crate::consensus::bls::{POP_DST, SIGNATURE_DST};
use crate::consensus::certificate::{AggregatedSignature, Certificate};
use crate::execution::proof::keccak256;
use crate::types::committee::{BlsPublicKey, BlsSignature, Committee, Member, MemberId};
use crate::types::execution::{AccountProof, AccountState, StorageProof};
use crate::types::statement::Statement;

/// A committee member whose secret key is derived from a one-byte seed.
pub struct TestValidator {
    secret: SecretKey,
    pub member: Member,
}

impl TestValidator {
    pub fn new(seed: u8, voting_power: u64) -> Self {
        let secret = SecretKey::key_gen(&[seed; 32], &[]).expect("32 bytes of key material");
        let public_key = BlsPublicKey(secret.sk_to_pk().compress());
        let proof_of_possession = BlsSignature(secret.sign(&public_key.0, POP_DST, &[]).compress());
        Self {
            secret,
            member: Member {
                public_key,
                proof_of_possession,
                voting_power,
            },
        }
    }

    pub fn sign<S: Statement>(&self, statement: &S) -> BlsSignature {
        BlsSignature(
            self.secret
                .sign(&statement.signing_bytes(), SIGNATURE_DST, &[])
                .compress(),
        )
    }

    /// A certificate claiming this validator sits in slot 0 of whatever
    /// committee the verifier trusts.
    pub fn certify_alone<S: Statement>(&self, statement: S) -> Certificate<S> {
        let signature = self.sign(&statement);
        let mut signers = bitvec![u8, Lsb0; 0; 8];
        signers.set(0, true);
        Certificate {
            subject: statement,
            signature: AggregatedSignature::new(signers, signature),
        }
    }
}

pub fn committee_of(validators: &[TestValidator]) -> Committee {
    Committee::new(validators.iter().map(|v| v.member.clone()).collect())
}

/// Build a certificate over `statement` signed by `validators[signers]`.
pub fn certify<S: Statement>(
    validators: &[TestValidator],
    signers: &[MemberId],
    statement: S,
) -> Certificate<S> {
    let committee = committee_of(validators);
    let mut certificate = Certificate::new(statement);
    for &id in signers {
        let signature = validators[id].sign(&certificate.subject);
        certificate
            .add(&committee, id, &signature)
            .expect("test validator signature verifies");
    }
    certificate
}

/// Build a trie holding exactly one account. Returns its root and the proof.
pub fn account_trie(address: [u8; 20], account: &AccountState) -> ([u8; 32], AccountProof) {
    let mut account_rlp = Vec::new();
    let balance = trim_leading_zeros(&account.balance);
    list_header(
        account.nonce.length()
            + balance.length()
            + account.storage_root[..].length()
            + account.code_hash[..].length(),
    )
    .encode(&mut account_rlp);
    account.nonce.encode(&mut account_rlp);
    balance.encode(&mut account_rlp);
    account.storage_root[..].encode(&mut account_rlp);
    account.code_hash[..].encode(&mut account_rlp);

    let leaf = single_leaf(keccak256(&address), &account_rlp);
    (
        keccak256(&leaf),
        AccountProof {
            address,
            proof: vec![leaf],
            account: Some(account.clone()),
        },
    )
}

/// Build a storage trie holding exactly one slot.
pub fn storage_trie(slot: [u8; 32], value: [u8; 32]) -> ([u8; 32], StorageProof) {
    let mut value_rlp = Vec::new();
    trim_leading_zeros(&value).encode(&mut value_rlp);

    let leaf = single_leaf(keccak256(&slot), &value_rlp);
    (
        keccak256(&leaf),
        StorageProof {
            key: slot,
            value,
            proof: vec![leaf],
        },
    )
}

/// A leaf node at the root: `[hex-prefix(key), value]` with the full 64-nibble path.
fn single_leaf(key: [u8; 32], value: &[u8]) -> Vec<u8> {
    let mut path = Vec::with_capacity(33);
    path.push(0x20);
    path.extend_from_slice(&key);

    let mut leaf = Vec::new();
    list_header(path[..].length() + value.length()).encode(&mut leaf);
    path[..].encode(&mut leaf);
    value.encode(&mut leaf);
    leaf
}

fn list_header(payload_length: usize) -> Header {
    Header {
        list: true,
        payload_length,
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}
