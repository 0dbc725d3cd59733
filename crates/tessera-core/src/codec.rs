//! Binary wire format for certificates.
//!
//! Every composite value is an RLP list of its fields in declaration order:
//!
//! | value                 | layout                                              |
//! |-----------------------|-----------------------------------------------------|
//! | `Member`              | `[public_key(48), proof_of_possession(96), power]`  |
//! | `Committee`           | `[member, ...]`                                     |
//! | `CommitteeStatement`  | `[1, chain_id, period, committee]`                  |
//! | `BlockStatement`      | `[2, chain_id, number, hash(32), state_root(32)]`   |
//! | `AggregatedSignature` | `[signer_bitmask, signature(96)]`                   |
//! | `Certificate`         | `[statement, aggregated_signature]`                 |
//!
//! Fixed-size fields must decode to exactly their size; anything else is a
//! `LengthMismatch`, never a silent truncation or padding.

use alloy_rlp::{length_of_length, BufMut, Decodable, Encodable, Header};
use thiserror::Error;

use crate::consensus::certificate::{AggregatedSignature, Certificate};
use crate::types::committee::{
    BlsPublicKey, BlsSignature, Committee, Member, BLS_PUBKEY_LEN, BLS_SIGNATURE_LEN,
};
use crate::types::statement::{BlockStatement, CommitteeStatement, Statement, StatementKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Length mismatch in field '{field}': expected {expected} bytes, got {got}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Unexpected statement kind {got}, expected {expected:?}")]
    UnexpectedKind { expected: StatementKind, got: u64 },

    #[error("Field '{field}' must be a byte string, found a list")]
    UnexpectedList { field: &'static str },

    #[error("Expected an RLP list")]
    ExpectedList,

    #[error("{0} trailing bytes after the encoded value")]
    TrailingBytes(usize),

    #[error("Malformed RLP: {0}")]
    Rlp(#[from] alloy_rlp::Error),
}

/// A value with a stable list-shaped wire encoding.
///
/// Implementors provide the list payload; the list header is handled here.
pub trait WireFormat: Sized {
    fn payload_length(&self) -> usize;

    fn encode_payload(&self, out: &mut dyn BufMut);

    fn decode_payload(payload: &mut &[u8]) -> Result<Self, CodecError>;

    fn wire_length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + length_of_length(payload_length)
    }

    fn encode_wire(&self, out: &mut dyn BufMut) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.encode_payload(out);
    }

    fn decode_wire(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(CodecError::ExpectedList);
        }
        let mut payload = take(buf, header.payload_length)?;
        let value = Self::decode_payload(&mut payload)?;
        if !payload.is_empty() {
            return Err(CodecError::TrailingBytes(payload.len()));
        }
        Ok(value)
    }
}

/// Encode a certificate to its wire bytes.
pub fn serialize<S: Statement>(certificate: &Certificate<S>) -> Vec<u8> {
    let mut out = Vec::with_capacity(certificate.wire_length());
    certificate.encode_wire(&mut out);
    out
}

/// Decode a certificate, rejecting any bytes left after it.
pub fn deserialize<S: Statement>(bytes: &[u8]) -> Result<Certificate<S>, CodecError> {
    let mut buf = bytes;
    let certificate = Certificate::<S>::decode_wire(&mut buf)?;
    if !buf.is_empty() {
        return Err(CodecError::TrailingBytes(buf.len()));
    }
    Ok(certificate)
}

fn take<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], CodecError> {
    if buf.len() < len {
        return Err(alloy_rlp::Error::InputTooShort.into());
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(head)
}

fn decode_bytes<'a>(buf: &mut &'a [u8], field: &'static str) -> Result<&'a [u8], CodecError> {
    let header = Header::decode(buf)?;
    if header.list {
        return Err(CodecError::UnexpectedList { field });
    }
    take(buf, header.payload_length)
}

fn decode_fixed<const N: usize>(
    buf: &mut &[u8],
    field: &'static str,
) -> Result<[u8; N], CodecError> {
    let bytes = decode_bytes(buf, field)?;
    <[u8; N]>::try_from(bytes).map_err(|_| CodecError::LengthMismatch {
        field,
        expected: N,
        got: bytes.len(),
    })
}

fn decode_kind(buf: &mut &[u8], expected: StatementKind) -> Result<(), CodecError> {
    let got = u64::decode(buf)?;
    if got != expected as u64 {
        return Err(CodecError::UnexpectedKind { expected, got });
    }
    Ok(())
}

impl WireFormat for Member {
    fn payload_length(&self) -> usize {
        self.public_key.0[..].length()
            + self.proof_of_possession.0[..].length()
            + self.voting_power.length()
    }

    fn encode_payload(&self, out: &mut dyn BufMut) {
        self.public_key.0[..].encode(out);
        self.proof_of_possession.0[..].encode(out);
        self.voting_power.encode(out);
    }

    fn decode_payload(payload: &mut &[u8]) -> Result<Self, CodecError> {
        let public_key = BlsPublicKey(decode_fixed::<BLS_PUBKEY_LEN>(payload, "public_key")?);
        let proof_of_possession =
            BlsSignature(decode_fixed::<BLS_SIGNATURE_LEN>(payload, "proof_of_possession")?);
        let voting_power = u64::decode(payload)?;
        Ok(Member {
            public_key,
            proof_of_possession,
            voting_power,
        })
    }
}

impl WireFormat for Committee {
    fn payload_length(&self) -> usize {
        self.members().iter().map(WireFormat::wire_length).sum()
    }

    fn encode_payload(&self, out: &mut dyn BufMut) {
        for member in self.members() {
            member.encode_wire(out);
        }
    }

    fn decode_payload(payload: &mut &[u8]) -> Result<Self, CodecError> {
        let mut members = Vec::new();
        while !payload.is_empty() {
            members.push(Member::decode_wire(payload)?);
        }
        Ok(Committee::new(members))
    }
}

impl WireFormat for CommitteeStatement {
    fn payload_length(&self) -> usize {
        (Self::KIND as u64).length()
            + self.chain_id.length()
            + self.period.length()
            + self.committee.wire_length()
    }

    fn encode_payload(&self, out: &mut dyn BufMut) {
        (Self::KIND as u64).encode(out);
        self.chain_id.encode(out);
        self.period.encode(out);
        self.committee.encode_wire(out);
    }

    fn decode_payload(payload: &mut &[u8]) -> Result<Self, CodecError> {
        decode_kind(payload, Self::KIND)?;
        Ok(CommitteeStatement {
            chain_id: u64::decode(payload)?,
            period: u64::decode(payload)?,
            committee: Committee::decode_wire(payload)?,
        })
    }
}

impl WireFormat for BlockStatement {
    fn payload_length(&self) -> usize {
        (Self::KIND as u64).length()
            + self.chain_id.length()
            + self.number.length()
            + self.hash[..].length()
            + self.state_root[..].length()
    }

    fn encode_payload(&self, out: &mut dyn BufMut) {
        (Self::KIND as u64).encode(out);
        self.chain_id.encode(out);
        self.number.encode(out);
        self.hash[..].encode(out);
        self.state_root[..].encode(out);
    }

    fn decode_payload(payload: &mut &[u8]) -> Result<Self, CodecError> {
        decode_kind(payload, Self::KIND)?;
        Ok(BlockStatement {
            chain_id: u64::decode(payload)?,
            number: u64::decode(payload)?,
            hash: decode_fixed::<32>(payload, "hash")?,
            state_root: decode_fixed::<32>(payload, "state_root")?,
        })
    }
}

impl WireFormat for AggregatedSignature {
    fn payload_length(&self) -> usize {
        self.signer_bytes().length() + self.signature().0[..].length()
    }

    fn encode_payload(&self, out: &mut dyn BufMut) {
        self.signer_bytes().encode(out);
        self.signature().0[..].encode(out);
    }

    fn decode_payload(payload: &mut &[u8]) -> Result<Self, CodecError> {
        let signers = decode_bytes(payload, "signers")?.to_vec();
        let signature = BlsSignature(decode_fixed::<BLS_SIGNATURE_LEN>(payload, "signature")?);
        Ok(AggregatedSignature::from_parts(signers, signature))
    }
}

impl<S: Statement> WireFormat for Certificate<S> {
    fn payload_length(&self) -> usize {
        self.subject.wire_length() + self.signature.wire_length()
    }

    fn encode_payload(&self, out: &mut dyn BufMut) {
        self.subject.encode_wire(out);
        self.signature.encode_wire(out);
    }

    fn decode_payload(payload: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(Certificate {
            subject: S::decode_wire(payload)?,
            signature: AggregatedSignature::decode_wire(payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::certificate::{BlockCertificate, CommitteeCertificate};
    use crate::test_utils::{certify, committee_of, TestValidator};
    use hex_literal::hex;

    fn block_statement() -> BlockStatement {
        BlockStatement {
            chain_id: 1,
            number: 16_385,
            hash: hex!("6e2cba1c7b5b4bd31c8cfef1d3bd0a1d9a0ff5b1c40e5dbd47e4d4cfcb4b9a40"),
            state_root: hex!("d7f8974fb5ac78d9ac099b9ad5018bedc2ce0a72dad1827a1709da30580f0544"),
        }
    }

    fn list(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_block_certificate_roundtrip() {
        let validators: Vec<_> = (1..=3).map(|i| TestValidator::new(i, 5)).collect();
        let cert = certify(&validators, &[0, 2], block_statement());

        let bytes = serialize(&cert);
        assert_eq!(bytes.len(), cert.wire_length());
        let decoded: BlockCertificate = deserialize(&bytes).unwrap();
        assert_eq!(decoded, cert);
    }

    #[test]
    fn test_committee_certificate_roundtrip() {
        let genesis: Vec<_> = (1..=4).map(|i| TestValidator::new(i, 1)).collect();
        let next: Vec<_> = (10..=12).map(|i| TestValidator::new(i, 3)).collect();
        let statement = CommitteeStatement {
            chain_id: 9,
            period: 1,
            committee: committee_of(&next),
        };
        let cert = certify(&genesis, &[0, 1, 3], statement);

        let decoded: CommitteeCertificate = deserialize(&serialize(&cert)).unwrap();
        assert_eq!(decoded, cert);
        assert_eq!(decoded.subject.committee.len(), 3);
    }

    #[test]
    fn test_default_certificates_roundtrip() {
        let block = BlockCertificate::default();
        assert_eq!(deserialize::<BlockStatement>(&serialize(&block)).unwrap(), block);

        let committee = CommitteeCertificate::default();
        assert_eq!(
            deserialize::<CommitteeStatement>(&serialize(&committee)).unwrap(),
            committee
        );
    }

    #[test]
    fn test_kind_tag_is_enforced() {
        let bytes = serialize(&BlockCertificate::default());
        assert_eq!(
            deserialize::<CommitteeStatement>(&bytes),
            Err(CodecError::UnexpectedKind {
                expected: StatementKind::Committee,
                got: 2
            })
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = serialize(&BlockCertificate::default());
        bytes.push(0x00);
        assert_eq!(
            deserialize::<BlockStatement>(&bytes),
            Err(CodecError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_truncated_input_rejected() {
        let bytes = serialize(&BlockCertificate::default());
        assert!(matches!(
            deserialize::<BlockStatement>(&bytes[..bytes.len() - 5]),
            Err(CodecError::Rlp(_))
        ));
        assert!(deserialize::<BlockStatement>(&[]).is_err());
    }

    #[test]
    fn test_hash_length_mismatch() {
        let statement = block_statement();
        let mut payload = Vec::new();
        (StatementKind::Block as u64).encode(&mut payload);
        statement.chain_id.encode(&mut payload);
        statement.number.encode(&mut payload);
        statement.hash[..31].encode(&mut payload);
        statement.state_root[..].encode(&mut payload);
        let bytes = list(&payload);

        assert_eq!(
            BlockStatement::decode_wire(&mut bytes.as_slice()),
            Err(CodecError::LengthMismatch {
                field: "hash",
                expected: 32,
                got: 31
            })
        );
    }

    #[test]
    fn test_public_key_length_mismatch() {
        let mut payload = Vec::new();
        [0xAAu8; 49][..].encode(&mut payload);
        [0xBBu8; 96][..].encode(&mut payload);
        7u64.encode(&mut payload);
        let bytes = list(&payload);

        assert_eq!(
            Member::decode_wire(&mut bytes.as_slice()),
            Err(CodecError::LengthMismatch {
                field: "public_key",
                expected: 48,
                got: 49
            })
        );
    }

    #[test]
    fn test_signature_length_mismatch() {
        let mut payload = Vec::new();
        [0x01u8][..].encode(&mut payload);
        [0xC0u8; 95][..].encode(&mut payload);

        assert_eq!(
            AggregatedSignature::decode_wire(&mut list(&payload).as_slice()),
            Err(CodecError::LengthMismatch {
                field: "signature",
                expected: 96,
                got: 95
            })
        );
    }

    #[test]
    fn test_proof_of_possession_length_mismatch() {
        let mut payload = Vec::new();
        [0xAAu8; 48][..].encode(&mut payload);
        [0xBBu8; 97][..].encode(&mut payload);
        1u64.encode(&mut payload);

        assert_eq!(
            Member::decode_wire(&mut list(&payload).as_slice()),
            Err(CodecError::LengthMismatch {
                field: "proof_of_possession",
                expected: 96,
                got: 97
            })
        );
    }

    #[test]
    fn test_list_where_bytes_expected() {
        let mut payload = Vec::new();
        Header {
            list: true,
            payload_length: 0,
        }
        .encode(&mut payload);
        [0u8; 96][..].encode(&mut payload);
        let bytes = list(&payload);

        assert_eq!(
            AggregatedSignature::decode_wire(&mut bytes.as_slice()),
            Err(CodecError::UnexpectedList { field: "signers" })
        );
    }
}
