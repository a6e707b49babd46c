// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signature verification and attestation parsing.
//!
//! The verifier never touches curve arithmetic directly; it goes through
//! [`CredentialCrypto`]. Attestation formats are a closed tagged union
//! ([`Attestation`]) so adding a format means adding a variant, not a
//! string branch.
//!
//! ## Algorithms
//!
//! | COSE id | Variant | Backend |
//! |---------|---------|---------|
//! | -7 | `Es256` (P-256, SHA-256, ASN.1 DER signature) | ring |
//! | -8 | `EdDsa` (Ed25519) | ring |
//! | -47 | `Es256k` (secp256k1, SHA-256, DER signature) | k256 |

use k256::ecdsa::signature::Verifier;
use ring::signature::{UnparsedPublicKey, ECDSA_P256_SHA256_ASN1, ED25519};
use serde::{Deserialize, Serialize};

use super::authenticator_data::AuthenticatorData;
use super::error::CredentialError;

/// Signature algorithm of a credential key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Es256,
    EdDsa,
    Es256k,
}

impl SignatureAlgorithm {
    /// COSE algorithm identifier.
    pub fn cose_id(self) -> i16 {
        match self {
            SignatureAlgorithm::Es256 => -7,
            SignatureAlgorithm::EdDsa => -8,
            SignatureAlgorithm::Es256k => -47,
        }
    }

    pub fn from_cose_id(id: i16) -> Option<Self> {
        match id {
            -7 => Some(SignatureAlgorithm::Es256),
            -8 => Some(SignatureAlgorithm::EdDsa),
            -47 => Some(SignatureAlgorithm::Es256k),
            _ => None,
        }
    }
}

/// Credential public key material.
///
/// EC keys are SEC1-encoded points; Ed25519 keys are the raw 32 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub algorithm: SignatureAlgorithm,
    #[serde(with = "b64")]
    pub bytes: Vec<u8>,
}

/// Attestation statement supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fmt", rename_all = "lowercase")]
pub enum Attestation {
    /// No attestation statement; trust rests on the ceremony itself.
    None {
        #[serde(with = "b64")]
        auth_data: Vec<u8>,
    },
    /// Self attestation: the new credential signs
    /// `auth_data || client_data_hash` with its own private key.
    Packed {
        #[serde(with = "b64")]
        auth_data: Vec<u8>,
        alg: SignatureAlgorithm,
        #[serde(with = "b64")]
        sig: Vec<u8>,
    },
}

impl Attestation {
    pub fn format(&self) -> &'static str {
        match self {
            Attestation::None { .. } => "none",
            Attestation::Packed { .. } => "packed",
        }
    }

    pub fn auth_data(&self) -> &[u8] {
        match self {
            Attestation::None { auth_data } | Attestation::Packed { auth_data, .. } => auth_data,
        }
    }
}

/// Result of parsing an attestation.
#[derive(Debug, Clone)]
pub struct ParsedAttestation {
    pub credential_id: Vec<u8>,
    pub public_key: PublicKey,
    pub counter: u32,
    pub authenticator: AuthenticatorData,
    /// Whether the attestation statement checked out.
    pub valid: bool,
}

/// Cryptographic primitive consumed by the verifier.
pub trait CredentialCrypto: Send + Sync {
    /// Verify `signature` over `message` with `key`.
    fn verify(&self, key: &PublicKey, signature: &[u8], message: &[u8]) -> bool;

    /// Decode an attestation and check its statement.
    ///
    /// Returns an error only when the attestation cannot be decoded; a
    /// decodable attestation with a bad statement comes back with
    /// `valid = false`.
    fn parse_attestation(
        &self,
        attestation: &Attestation,
        client_data_hash: &[u8; 32],
    ) -> Result<ParsedAttestation, CredentialError>;
}

/// Default primitive backed by ring (P-256, Ed25519) and k256 (secp256k1).
#[derive(Debug, Default, Clone, Copy)]
pub struct RingCrypto;

impl CredentialCrypto for RingCrypto {
    fn verify(&self, key: &PublicKey, signature: &[u8], message: &[u8]) -> bool {
        match key.algorithm {
            SignatureAlgorithm::Es256 => UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, &key.bytes)
                .verify(message, signature)
                .is_ok(),
            SignatureAlgorithm::EdDsa => UnparsedPublicKey::new(&ED25519, &key.bytes)
                .verify(message, signature)
                .is_ok(),
            SignatureAlgorithm::Es256k => verify_secp256k1(&key.bytes, signature, message),
        }
    }

    fn parse_attestation(
        &self,
        attestation: &Attestation,
        client_data_hash: &[u8; 32],
    ) -> Result<ParsedAttestation, CredentialError> {
        let authenticator = AuthenticatorData::parse(attestation.auth_data())?;
        let attested = authenticator.attested.clone().ok_or_else(|| {
            CredentialError::AttestationInvalid("missing attested credential data".to_string())
        })?;

        let valid = match attestation {
            Attestation::None { .. } => true,
            Attestation::Packed { auth_data, alg, sig } => {
                if *alg != attested.public_key.algorithm {
                    false
                } else {
                    let mut message = Vec::with_capacity(auth_data.len() + client_data_hash.len());
                    message.extend_from_slice(auth_data);
                    message.extend_from_slice(client_data_hash);
                    self.verify(&attested.public_key, sig, &message)
                }
            }
        };

        Ok(ParsedAttestation {
            credential_id: attested.credential_id,
            public_key: attested.public_key,
            counter: authenticator.sign_count,
            authenticator,
            valid,
        })
    }
}

fn verify_secp256k1(key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let Ok(verifying_key) = k256::ecdsa::VerifyingKey::from_sec1_bytes(key) else {
        return false;
    };
    let Ok(signature) = k256::ecdsa::Signature::from_der(signature) else {
        return false;
    };
    let signature = signature.normalize_s().unwrap_or(signature);
    verifying_key.verify(message, &signature).is_ok()
}

/// Serde helper: bytes as unpadded base64url strings.
pub(crate) mod b64 {
    use base64ct::{Base64UrlUnpadded, Encoding};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64UrlUnpadded::encode_string(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Base64UrlUnpadded::decode_vec(&encoded).map_err(serde::de::Error::custom)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::TestKey;
    use super::*;
    use crate::authn::authenticator_data::{AttestedCredential, FLAG_ATTESTED, FLAG_USER_PRESENT};

    const ALGORITHMS: [SignatureAlgorithm; 3] = [
        SignatureAlgorithm::Es256,
        SignatureAlgorithm::EdDsa,
        SignatureAlgorithm::Es256k,
    ];

    #[test]
    fn verify_accepts_valid_and_rejects_tampered() {
        for algorithm in ALGORITHMS {
            let key = TestKey::generate(algorithm);
            let signature = key.sign(b"message");

            assert!(RingCrypto.verify(&key.public_key(), &signature, b"message"), "{algorithm:?}");
            assert!(!RingCrypto.verify(&key.public_key(), &signature, b"massage"), "{algorithm:?}");
        }
    }

    #[test]
    fn verify_rejects_garbage_key() {
        let key = PublicKey {
            algorithm: SignatureAlgorithm::Es256k,
            bytes: vec![1, 2, 3],
        };
        assert!(!RingCrypto.verify(&key, &[0u8; 70], b"message"));
    }

    #[test]
    fn cose_ids_map_both_ways() {
        for algorithm in ALGORITHMS {
            assert_eq!(SignatureAlgorithm::from_cose_id(algorithm.cose_id()), Some(algorithm));
        }
        assert_eq!(SignatureAlgorithm::from_cose_id(-257), None);
    }

    fn attested_auth_data(key: &TestKey) -> Vec<u8> {
        AuthenticatorData {
            rp_id_hash: [0u8; 32],
            flags: FLAG_USER_PRESENT | FLAG_ATTESTED,
            sign_count: 3,
            attested: Some(AttestedCredential {
                credential_id: vec![9, 9, 9],
                public_key: key.public_key(),
            }),
        }
        .to_bytes()
    }

    #[test]
    fn packed_self_attestation_checks_signature() {
        let key = TestKey::generate(SignatureAlgorithm::Es256);
        let auth_data = attested_auth_data(&key);
        let client_hash = [5u8; 32];

        let mut signed = auth_data.clone();
        signed.extend_from_slice(&client_hash);
        let good = Attestation::Packed {
            auth_data: auth_data.clone(),
            alg: SignatureAlgorithm::Es256,
            sig: key.sign(&signed),
        };
        let parsed = RingCrypto.parse_attestation(&good, &client_hash).unwrap();
        assert!(parsed.valid);
        assert_eq!(parsed.counter, 3);
        assert_eq!(parsed.credential_id, vec![9, 9, 9]);

        let wrong_hash = RingCrypto.parse_attestation(&good, &[6u8; 32]).unwrap();
        assert!(!wrong_hash.valid);
    }

    #[test]
    fn packed_alg_must_match_key() {
        let key = TestKey::generate(SignatureAlgorithm::EdDsa);
        let auth_data = attested_auth_data(&key);
        let attestation = Attestation::Packed {
            auth_data: auth_data.clone(),
            alg: SignatureAlgorithm::Es256,
            sig: key.sign(&auth_data),
        };
        assert!(!RingCrypto.parse_attestation(&attestation, &[0u8; 32]).unwrap().valid);
    }

    #[test]
    fn none_attestation_requires_attested_data() {
        let bare = AuthenticatorData {
            rp_id_hash: [0u8; 32],
            flags: FLAG_USER_PRESENT,
            sign_count: 0,
            attested: None,
        };
        let attestation = Attestation::None {
            auth_data: bare.to_bytes(),
        };
        let err = RingCrypto.parse_attestation(&attestation, &[0u8; 32]).unwrap_err();
        assert!(matches!(err, CredentialError::AttestationInvalid(_)));
    }

    #[test]
    fn attestation_serializes_with_format_tag() {
        let attestation = Attestation::None {
            auth_data: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&attestation).unwrap();
        assert_eq!(json["fmt"], "none");
        assert_eq!(json["auth_data"], "AQID");
    }
}
