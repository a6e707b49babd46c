// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attestation and assertion verification.
//!
//! ## Assertion checks, in order
//!
//! 1. Credential lookup
//! 2. Challenge purpose and owner binding
//! 3. Client data type and challenge value
//! 4. Origin (exact match against the configured list)
//! 5. Relying-party id hash in authenticator data
//! 6. User presence
//! 7. Signature over `authenticator_data || SHA-256(client_data)`
//! 8. Counter strictly greater than the stored counter
//!
//! The counter check fails closed even when the signature is bad, so a
//! replayed or cloned assertion always reports `CounterRegression`. The
//! stored counter moves only after every check has passed.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;

use super::authenticator_data::{rp_id_hash, AuthenticatorData};
use super::challenge::{CeremonyPurpose, ChallengeMeta};
use super::client_data::{client_data_hash, ClientData};
use super::credential::{Credential, CredentialRegistry, Transport};
use super::crypto::{b64, Attestation, CredentialCrypto};
use super::error::CredentialError;
use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::clock::Clock;

/// Relying-party identity the verifier enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    id: String,
    id_hash: [u8; 32],
    origins: Vec<String>,
}

impl RelyingParty {
    /// Build from an rp id and allowed origins.
    ///
    /// Configured origins are reduced to their serialized origin
    /// (`scheme://host[:port]`); incoming origins must equal one of them
    /// byte for byte.
    pub fn new<I, S>(id: impl Into<String>, origins: I) -> Result<Self, url::ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let id = id.into();
        let origins = origins
            .into_iter()
            .map(|raw| Url::parse(raw.as_ref()).map(|url| url.origin().ascii_serialization()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id_hash: rp_id_hash(&id),
            id,
            origins,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    pub fn allows_origin(&self, origin: &str) -> bool {
        self.origins.iter().any(|allowed| allowed == origin)
    }
}

/// Client response to a registration ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    #[serde(with = "b64")]
    pub client_data_json: Vec<u8>,
    pub attestation: Attestation,
    #[serde(default)]
    pub transports: Vec<Transport>,
}

/// Signed assertion from an authentication ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(with = "b64")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "b64")]
    pub authenticator_data: Vec<u8>,
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

/// Identity proven by a successful assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub owner: String,
    pub credential_id: String,
    pub counter: u32,
    pub user_verified: bool,
}

/// Validates attestations and assertions against the registry.
pub struct CredentialVerifier {
    registry: Arc<CredentialRegistry>,
    crypto: Arc<dyn CredentialCrypto>,
    rp: RelyingParty,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

impl CredentialVerifier {
    pub fn new(
        registry: Arc<CredentialRegistry>,
        crypto: Arc<dyn CredentialCrypto>,
        rp: RelyingParty,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            crypto,
            rp,
            clock,
            audit,
        }
    }

    pub fn relying_party(&self) -> &RelyingParty {
        &self.rp
    }

    pub fn registry(&self) -> &CredentialRegistry {
        &self.registry
    }

    /// Validate a registration and persist the new credential.
    pub fn register_credential(
        &self,
        owner: &str,
        response: &RegistrationResponse,
        expected: &ChallengeMeta,
    ) -> Result<Credential, CredentialError> {
        if expected.purpose != CeremonyPurpose::Register {
            return Err(CredentialError::ChallengeMismatch);
        }
        if expected.owner.as_deref().is_some_and(|bound| bound != owner) {
            return Err(CredentialError::OwnerMismatch);
        }

        let client = self.check_client_data(
            &response.client_data_json,
            CeremonyPurpose::Register,
            expected,
        )?;
        debug!(origin = %client.origin, "Registration client data accepted");

        let parsed = self.crypto.parse_attestation(
            &response.attestation,
            &client_data_hash(&response.client_data_json),
        )?;
        if parsed.authenticator.rp_id_hash != self.rp.id_hash {
            return Err(CredentialError::OriginMismatch);
        }
        if !parsed.authenticator.user_present() {
            return Err(CredentialError::UserNotPresent);
        }
        if !parsed.valid {
            return Err(CredentialError::AttestationInvalid(format!(
                "{} statement rejected",
                response.attestation.format()
            )));
        }

        let credential = Credential {
            id: Base64UrlUnpadded::encode_string(&parsed.credential_id),
            owner: owner.to_string(),
            public_key: parsed.public_key,
            counter: parsed.counter,
            transports: response.transports.clone(),
            attestation_format: response.attestation.format().to_string(),
            user_verified: parsed.authenticator.user_verified(),
            created_at: self.clock.now(),
            last_used_at: None,
        };
        self.registry.insert(&credential)?;

        info!(
            owner,
            credential_id = %credential.id,
            format = %credential.attestation_format,
            "Credential registered"
        );
        Ok(credential)
    }

    /// Verify an assertion and advance the stored counter.
    pub fn verify_assertion(
        &self,
        credential_id: &str,
        assertion: &Assertion,
        expected: &ChallengeMeta,
    ) -> Result<VerifiedIdentity, CredentialError> {
        let credential = self.registry.get(credential_id)?;

        if expected.purpose != CeremonyPurpose::Authenticate {
            return Err(CredentialError::ChallengeMismatch);
        }
        if expected
            .owner
            .as_deref()
            .is_some_and(|bound| bound != credential.owner)
        {
            return Err(CredentialError::OwnerMismatch);
        }

        self.check_client_data(
            &assertion.client_data_json,
            CeremonyPurpose::Authenticate,
            expected,
        )?;

        let auth_data = AuthenticatorData::parse(&assertion.authenticator_data)?;
        if auth_data.rp_id_hash != self.rp.id_hash {
            return Err(CredentialError::OriginMismatch);
        }
        if !auth_data.user_present() {
            return Err(CredentialError::UserNotPresent);
        }

        let mut message =
            Vec::with_capacity(assertion.authenticator_data.len() + 32);
        message.extend_from_slice(&assertion.authenticator_data);
        message.extend_from_slice(&client_data_hash(&assertion.client_data_json));
        let signature_valid =
            self.crypto
                .verify(&credential.public_key, &assertion.signature, &message);

        if auth_data.sign_count <= credential.counter {
            let err = CredentialError::CounterRegression {
                stored: credential.counter,
                received: auth_data.sign_count,
            };
            self.alert_counter_regression(&credential, auth_data.sign_count, signature_valid);
            return Err(err);
        }
        if !signature_valid {
            return Err(CredentialError::InvalidSignature);
        }

        let updated = self
            .registry
            .record_use(credential_id, auth_data.sign_count, self.clock.now())
            .inspect_err(|e| {
                if matches!(e, CredentialError::CounterRegression { .. }) {
                    self.alert_counter_regression(&credential, auth_data.sign_count, true);
                }
            })?;

        debug!(
            owner = %updated.owner,
            credential_id,
            counter = updated.counter,
            "Assertion verified"
        );
        Ok(VerifiedIdentity {
            owner: updated.owner,
            credential_id: updated.id,
            counter: updated.counter,
            user_verified: auth_data.user_verified(),
        })
    }

    fn check_client_data(
        &self,
        raw: &[u8],
        purpose: CeremonyPurpose,
        expected: &ChallengeMeta,
    ) -> Result<ClientData, CredentialError> {
        let client = ClientData::parse(raw)?;
        if !client.matches_purpose(purpose) || client.challenge != expected.value {
            return Err(CredentialError::ChallengeMismatch);
        }
        if client.cross_origin || !self.rp.allows_origin(&client.origin) {
            return Err(CredentialError::OriginMismatch);
        }
        Ok(client)
    }

    fn alert_counter_regression(&self, credential: &Credential, received: u32, signature_valid: bool) {
        error!(
            owner = %credential.owner,
            credential_id = %credential.id,
            stored = credential.counter,
            received,
            signature_valid,
            "Signature counter regression, possible cloned authenticator"
        );
        self.audit.record(
            &AuditEvent::new(AuditEventType::CounterRegression, self.clock.now())
                .with_user(credential.owner.clone())
                .with_resource("credential", credential.id.clone())
                .with_details(serde_json::json!({
                    "stored": credential.counter,
                    "received": received,
                    "signature_valid": signature_valid,
                }))
                .failed("counter_regression"),
        );
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::authn::crypto::testing::TestKey;
    use crate::authn::crypto::{RingCrypto, SignatureAlgorithm};
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    struct Harness {
        verifier: CredentialVerifier,
        audit: Arc<MemoryAuditSink>,
    }

    fn harness() -> Harness {
        let audit = Arc::new(MemoryAuditSink::new());
        let registry = Arc::new(CredentialRegistry::new(Arc::new(MemoryStore::new())));
        let verifier = CredentialVerifier::new(
            registry,
            Arc::new(RingCrypto),
            relying_party(),
            Arc::new(ManualClock::default()),
            audit.clone(),
        );
        Harness { verifier, audit }
    }

    fn meta(purpose: CeremonyPurpose, value: &str, owner: Option<&str>) -> ChallengeMeta {
        ChallengeMeta {
            value: value.to_string(),
            purpose,
            owner: owner.map(str::to_string),
            created_at: chrono::Utc::now(),
        }
    }

    fn register(h: &Harness, key: &TestKey, owner: &str) -> Credential {
        let response = registration(key, b"cred-1", "reg-challenge");
        h.verifier
            .register_credential(
                owner,
                &response,
                &meta(CeremonyPurpose::Register, "reg-challenge", Some(owner)),
            )
            .unwrap()
    }

    #[test]
    fn registers_every_supported_algorithm() {
        for algorithm in [
            SignatureAlgorithm::Es256,
            SignatureAlgorithm::EdDsa,
            SignatureAlgorithm::Es256k,
        ] {
            let h = harness();
            let key = TestKey::generate(algorithm);
            let credential = register(&h, &key, "user_1");

            assert_eq!(credential.owner, "user_1");
            assert_eq!(credential.counter, 0);
            assert_eq!(credential.attestation_format, "packed");
            assert!(credential.user_verified);
            assert_eq!(credential.public_key.algorithm, algorithm);
        }
    }

    #[test]
    fn registration_rejects_wrong_challenge_and_origin() {
        let h = harness();
        let key = TestKey::generate(SignatureAlgorithm::Es256);
        let response = registration(&key, b"cred-1", "reg-challenge");

        let err = h
            .verifier
            .register_credential(
                "user_1",
                &response,
                &meta(CeremonyPurpose::Register, "other", None),
            )
            .unwrap_err();
        assert!(matches!(err, CredentialError::ChallengeMismatch));

        let mut foreign = response.clone();
        foreign.client_data_json =
            client_data(CeremonyPurpose::Register, "reg-challenge", "https://evil.example");
        let err = h
            .verifier
            .register_credential(
                "user_1",
                &foreign,
                &meta(CeremonyPurpose::Register, "reg-challenge", None),
            )
            .unwrap_err();
        assert!(matches!(err, CredentialError::OriginMismatch));
    }

    #[test]
    fn registration_rejects_bad_attestation_signature() {
        let h = harness();
        let key = TestKey::generate(SignatureAlgorithm::EdDsa);
        let mut response = registration(&key, b"cred-1", "reg-challenge");
        if let Attestation::Packed { sig, .. } = &mut response.attestation {
            sig[0] ^= 0xff;
        }

        let err = h
            .verifier
            .register_credential(
                "user_1",
                &response,
                &meta(CeremonyPurpose::Register, "reg-challenge", None),
            )
            .unwrap_err();
        assert!(matches!(err, CredentialError::AttestationInvalid(_)));
    }

    #[test]
    fn re_registration_does_not_overwrite() {
        let h = harness();
        let key = TestKey::generate(SignatureAlgorithm::Es256);
        register(&h, &key, "user_1");

        let other_key = TestKey::generate(SignatureAlgorithm::Es256);
        let response = registration(&other_key, b"cred-1", "second");
        let err = h
            .verifier
            .register_credential(
                "user_2",
                &response,
                &meta(CeremonyPurpose::Register, "second", None),
            )
            .unwrap_err();
        assert!(matches!(err, CredentialError::AlreadyRegistered));
    }

    #[test]
    fn assertion_advances_counter() {
        let h = harness();
        let key = TestKey::generate(SignatureAlgorithm::Es256);
        let credential = register(&h, &key, "user_1");

        let identity = h
            .verifier
            .verify_assertion(
                &credential.id,
                &assertion(&key, "auth-1", 1),
                &meta(CeremonyPurpose::Authenticate, "auth-1", None),
            )
            .unwrap();
        assert_eq!(identity.owner, "user_1");
        assert_eq!(identity.counter, 1);

        let stored = h.verifier.registry().get(&credential.id).unwrap();
        assert_eq!(stored.counter, 1);
        assert!(stored.last_used_at.is_some());
    }

    #[test]
    fn non_increasing_counter_fails_regardless_of_signature() {
        let h = harness();
        let key = TestKey::generate(SignatureAlgorithm::Es256);
        let credential = register(&h, &key, "user_1");
        h.verifier
            .verify_assertion(
                &credential.id,
                &assertion(&key, "auth-1", 5),
                &meta(CeremonyPurpose::Authenticate, "auth-1", None),
            )
            .unwrap();

        for counter in [0, 4, 5] {
            let valid = assertion(&key, "auth-2", counter);
            let err = h
                .verifier
                .verify_assertion(
                    &credential.id,
                    &valid,
                    &meta(CeremonyPurpose::Authenticate, "auth-2", None),
                )
                .unwrap_err();
            assert!(
                matches!(err, CredentialError::CounterRegression { stored: 5, .. }),
                "counter {counter}"
            );

            let mut forged = valid.clone();
            forged.signature[0] ^= 0xff;
            let err = h
                .verifier
                .verify_assertion(
                    &credential.id,
                    &forged,
                    &meta(CeremonyPurpose::Authenticate, "auth-2", None),
                )
                .unwrap_err();
            assert!(matches!(err, CredentialError::CounterRegression { .. }));
        }

        assert_eq!(h.audit.count(AuditEventType::CounterRegression), 6);
        assert_eq!(h.verifier.registry().get(&credential.id).unwrap().counter, 5);
    }

    #[test]
    fn invalid_signature_leaves_counter_untouched() {
        let h = harness();
        let key = TestKey::generate(SignatureAlgorithm::EdDsa);
        let credential = register(&h, &key, "user_1");

        let mut forged = assertion(&key, "auth-1", 3);
        forged.signature[0] ^= 0xff;
        let err = h
            .verifier
            .verify_assertion(
                &credential.id,
                &forged,
                &meta(CeremonyPurpose::Authenticate, "auth-1", None),
            )
            .unwrap_err();
        assert!(matches!(err, CredentialError::InvalidSignature));
        assert_eq!(h.verifier.registry().get(&credential.id).unwrap().counter, 0);
    }

    #[test]
    fn origin_match_is_exact() {
        let h = harness();
        let key = TestKey::generate(SignatureAlgorithm::Es256);
        let credential = register(&h, &key, "user_1");

        for origin in [
            "https://wallet.relational.network.evil.example",
            "https://evil.example/https://wallet.relational.network",
            "http://wallet.relational.network",
            "https://wallet.relational.network/",
        ] {
            let err = h
                .verifier
                .verify_assertion(
                    &credential.id,
                    &assertion_with(&key, "auth-1", origin, RP_ID, 1),
                    &meta(CeremonyPurpose::Authenticate, "auth-1", None),
                )
                .unwrap_err();
            assert!(matches!(err, CredentialError::OriginMismatch), "{origin}");
        }

        let err = h
            .verifier
            .verify_assertion(
                &credential.id,
                &assertion_with(&key, "auth-1", ORIGIN, "relational.network", 1),
                &meta(CeremonyPurpose::Authenticate, "auth-1", None),
            )
            .unwrap_err();
        assert!(matches!(err, CredentialError::OriginMismatch));
    }

    #[test]
    fn owner_bound_challenge_rejects_other_credential() {
        let h = harness();
        let key = TestKey::generate(SignatureAlgorithm::Es256);
        let credential = register(&h, &key, "user_1");

        let err = h
            .verifier
            .verify_assertion(
                &credential.id,
                &assertion(&key, "auth-1", 1),
                &meta(CeremonyPurpose::Authenticate, "auth-1", Some("user_2")),
            )
            .unwrap_err();
        assert!(matches!(err, CredentialError::OwnerMismatch));
    }

    #[test]
    fn unknown_credential() {
        let h = harness();
        let key = TestKey::generate(SignatureAlgorithm::Es256);
        let err = h
            .verifier
            .verify_assertion(
                "missing",
                &assertion(&key, "auth-1", 1),
                &meta(CeremonyPurpose::Authenticate, "auth-1", None),
            )
            .unwrap_err();
        assert!(matches!(err, CredentialError::NotFound));
    }

    #[test]
    fn relying_party_normalizes_configured_origins() {
        let rp = RelyingParty::new(RP_ID, ["https://wallet.relational.network/"]).unwrap();
        assert_eq!(rp.origins(), &["https://wallet.relational.network".to_string()]);
        assert!(rp.allows_origin(ORIGIN));
        assert!(RelyingParty::new(RP_ID, ["not a url"]).is_err());
    }
}
