//! Thin wrapper over `blst` (min_pk variant: keys in G1, signatures in G2).

use blst::min_pk::{AggregatePublicKey, AggregateSignature, PublicKey, Signature};
use blst::BLST_ERROR;
use thiserror::Error;

use crate::types::committee::{BlsPublicKey, BlsSignature};

/// Domain separation tag for statement signatures.
pub const SIGNATURE_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Domain separation tag for proofs of possession.
pub const POP_DST: &[u8] = b"BLS_POP_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlsError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    #[error("signature does not verify")]
    VerificationFailed,

    #[error("aggregation failed: {0}")]
    Aggregation(String),

    #[error("no public keys to verify against")]
    NoKeys,
}

fn decode_public_key(pk: &BlsPublicKey) -> Result<PublicKey, BlsError> {
    let key = PublicKey::from_bytes(&pk.0)
        .map_err(|e| BlsError::InvalidPublicKey(format!("{:?}", e)))?;
    key.validate()
        .map_err(|e| BlsError::InvalidPublicKey(format!("{:?}", e)))?;
    Ok(key)
}

fn decode_signature(sig: &BlsSignature) -> Result<Signature, BlsError> {
    Signature::from_bytes(&sig.0).map_err(|e| BlsError::InvalidSignatureEncoding(format!("{:?}", e)))
}

fn check(result: BLST_ERROR) -> Result<(), BlsError> {
    if result == BLST_ERROR::BLST_SUCCESS {
        Ok(())
    } else {
        Err(BlsError::VerificationFailed)
    }
}

/// Verify one member's signature over `message`.
pub fn verify(pk: &BlsPublicKey, message: &[u8], sig: &BlsSignature) -> Result<(), BlsError> {
    let key = decode_public_key(pk)?;
    let sig = decode_signature(sig)?;
    check(sig.verify(true, message, SIGNATURE_DST, &[], &key, false))
}

/// Verify an aggregate signature produced by exactly `pks` over the same `message`.
pub fn verify_aggregate(
    pks: &[&BlsPublicKey],
    message: &[u8],
    sig: &BlsSignature,
) -> Result<(), BlsError> {
    if pks.is_empty() {
        return Err(BlsError::NoKeys);
    }

    let keys = pks
        .iter()
        .map(|pk| decode_public_key(pk))
        .collect::<Result<Vec<_>, _>>()?;
    let key_refs: Vec<&PublicKey> = keys.iter().collect();
    let aggregate = AggregatePublicKey::aggregate(&key_refs, false)
        .map_err(|e| BlsError::Aggregation(format!("{:?}", e)))?
        .to_public_key();

    let sig = decode_signature(sig)?;
    check(sig.verify(true, message, SIGNATURE_DST, &[], &aggregate, false))
}

/// Fold `next` into the running aggregate `current`.
pub fn aggregate(current: &BlsSignature, next: &BlsSignature) -> Result<BlsSignature, BlsError> {
    let current = decode_signature(current)?;
    let next = decode_signature(next)?;
    let mut agg = AggregateSignature::from_signature(&current);
    agg.add_signature(&next, true)
        .map_err(|e| BlsError::Aggregation(format!("{:?}", e)))?;
    Ok(BlsSignature(agg.to_signature().compress()))
}

/// Check that `pop` proves possession of the secret key behind `pk`.
pub fn verify_possession(pk: &BlsPublicKey, pop: &BlsSignature) -> Result<(), BlsError> {
    let key = decode_public_key(pk)?;
    let pop = decode_signature(pop)?;
    check(pop.verify(true, &pk.0, POP_DST, &[], &key, false))
}
