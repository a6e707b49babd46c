// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticator data decoding.
//!
//! ## Layout
//!
//! ```text
//! rp_id_hash      32 bytes   SHA-256 of the relying-party id
//! flags            1 byte    UP=0x01, UV=0x04, AT=0x40
//! sign_count       4 bytes   big-endian
//! -- present only when AT is set --
//! cred_id_len      2 bytes   big-endian
//! cred_id          cred_id_len bytes
//! alg              2 bytes   COSE algorithm id, big-endian two's complement
//! key_len          2 bytes   big-endian
//! key              key_len bytes
//! ```

use sha2::{Digest, Sha256};

use super::crypto::{PublicKey, SignatureAlgorithm};
use super::error::CredentialError;

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;
pub const FLAG_ATTESTED: u8 = 0x40;

const FIXED_LEN: usize = 32 + 1 + 4;

/// Credential data carried by a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    pub credential_id: Vec<u8>,
    pub public_key: PublicKey,
}

/// Decoded authenticator data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredential>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self, CredentialError> {
        if bytes.len() < FIXED_LEN {
            return Err(malformed("authenticator data too short"));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let mut reader = Reader {
            bytes: &bytes[FIXED_LEN..],
        };
        let attested = if flags & FLAG_ATTESTED != 0 {
            let id_len = reader.u16()? as usize;
            let credential_id = reader.take(id_len)?.to_vec();
            if credential_id.is_empty() {
                return Err(malformed("empty credential id"));
            }
            let alg = reader.u16()? as i16;
            let algorithm = SignatureAlgorithm::from_cose_id(alg)
                .ok_or_else(|| malformed("unsupported key algorithm"))?;
            let key_len = reader.u16()? as usize;
            let key = reader.take(key_len)?.to_vec();

            Some(AttestedCredential {
                credential_id,
                public_key: PublicKey {
                    algorithm,
                    bytes: key,
                },
            })
        } else {
            None
        };

        if !reader.bytes.is_empty() {
            return Err(malformed("trailing bytes after authenticator data"));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested,
        })
    }

    /// Encode back to the wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIXED_LEN + 64);
        out.extend_from_slice(&self.rp_id_hash);
        let mut flags = self.flags & !FLAG_ATTESTED;
        if self.attested.is_some() {
            flags |= FLAG_ATTESTED;
        }
        out.push(flags);
        out.extend_from_slice(&self.sign_count.to_be_bytes());
        if let Some(attested) = &self.attested {
            out.extend_from_slice(&(attested.credential_id.len() as u16).to_be_bytes());
            out.extend_from_slice(&attested.credential_id);
            out.extend_from_slice(&attested.public_key.algorithm.cose_id().to_be_bytes());
            out.extend_from_slice(&(attested.public_key.bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(&attested.public_key.bytes);
        }
        out
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }
}

/// SHA-256 of a relying-party id, as embedded in authenticator data.
pub fn rp_id_hash(rp_id: &str) -> [u8; 32] {
    Sha256::digest(rp_id.as_bytes()).into()
}

fn malformed(reason: &str) -> CredentialError {
    CredentialError::Malformed(reason.to_string())
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CredentialError> {
        if self.bytes.len() < n {
            return Err(malformed("authenticator data truncated"));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u16(&mut self) -> Result<u16, CredentialError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}
