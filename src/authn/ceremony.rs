// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ceremony orchestration.
//!
//! [`AuthService`] is what a transport layer talks to. It strings the
//! challenge manager, verifier, and session issuer together, writes the
//! audit trail, and collapses every failure into a [`ProtocolRejection`].
//!
//! ```text
//! start_registration ──▶ client signs ──▶ finish_registration ──▶ Credential
//! start_authentication ─▶ client signs ─▶ finish_authentication ─▶ Session
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::challenge::{CeremonyPurpose, ChallengeManager};
use super::client_data::ClientData;
use super::credential::{Credential, Transport};
use super::session::{IssuedSession, SessionIssuer};
use super::verifier::{Assertion, CredentialVerifier, RegistrationResponse, VerifiedIdentity};
use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::clock::Clock;
use crate::error::{CeremonyError, ProtocolRejection};

/// A credential the client may use or must not re-register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<Transport>,
}

impl From<&Credential> for CredentialDescriptor {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id.clone(),
            transports: credential.transports.clone(),
        }
    }
}

/// Options handed to the client to start a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationOptions {
    pub challenge: String,
    pub rp_id: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
    /// Credentials the owner already holds.
    pub exclude_credentials: Vec<CredentialDescriptor>,
}

/// Options handed to the client to start an authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationOptions {
    pub challenge: String,
    pub rp_id: String,
    pub expires_at: DateTime<Utc>,
    /// Empty when the owner is not known up front.
    pub allow_credentials: Vec<CredentialDescriptor>,
}

/// Client response to an authentication ceremony.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationResponse {
    pub credential_id: String,
    #[serde(flatten)]
    pub assertion: Assertion,
}

/// Result of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub identity: VerifiedIdentity,
    pub session: IssuedSession,
}

/// Authentication front door.
pub struct AuthService {
    challenges: Arc<ChallengeManager>,
    verifier: Arc<CredentialVerifier>,
    sessions: Arc<SessionIssuer>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        challenges: Arc<ChallengeManager>,
        verifier: Arc<CredentialVerifier>,
        sessions: Arc<SessionIssuer>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            challenges,
            verifier,
            sessions,
            audit,
            clock,
        }
    }

    pub fn start_registration(&self, owner: &str) -> Result<RegistrationOptions, ProtocolRejection> {
        let exclude_credentials = self
            .verifier
            .registry()
            .list_for_owner(owner)
            .map_err(|e| CeremonyError::from(e).registration_rejection())?
            .iter()
            .map(CredentialDescriptor::from)
            .collect();

        let challenge = self
            .challenges
            .issue(CeremonyPurpose::Register, Some(owner))
            .map_err(|e| CeremonyError::from(e).registration_rejection())?;

        Ok(RegistrationOptions {
            challenge: challenge.value,
            rp_id: self.verifier.relying_party().id().to_string(),
            owner: owner.to_string(),
            expires_at: challenge.expires_at,
            exclude_credentials,
        })
    }

    pub fn finish_registration(
        &self,
        owner: &str,
        response: &RegistrationResponse,
    ) -> Result<Credential, ProtocolRejection> {
        match self.try_finish_registration(owner, response) {
            Ok(credential) => {
                self.audit.record(
                    &AuditEvent::new(AuditEventType::CredentialRegistered, self.clock.now())
                        .with_user(owner)
                        .with_resource("credential", credential.id.clone())
                        .with_details(serde_json::json!({
                            "format": credential.attestation_format,
                            "algorithm": credential.public_key.algorithm,
                        })),
                );
                Ok(credential)
            }
            Err(e) => {
                warn!(owner, error_code = e.error_code(), error = %e, "Registration rejected");
                self.audit.record(
                    &AuditEvent::new(AuditEventType::RegistrationRejected, self.clock.now())
                        .with_user(owner)
                        .failed(e.error_code()),
                );
                Err(e.registration_rejection())
            }
        }
    }

    fn try_finish_registration(
        &self,
        owner: &str,
        response: &RegistrationResponse,
    ) -> Result<Credential, CeremonyError> {
        let client = ClientData::parse(&response.client_data_json)?;
        let expected = self.challenges.consume(&client.challenge)?;
        Ok(self.verifier.register_credential(owner, response, &expected)?)
    }

    /// Start an authentication. Without an owner the allow list is empty
    /// and the client picks a discoverable credential.
    pub fn start_authentication(
        &self,
        owner: Option<&str>,
    ) -> Result<AuthenticationOptions, ProtocolRejection> {
        let allow_credentials = match owner {
            Some(owner) => self
                .verifier
                .registry()
                .list_for_owner(owner)
                .map_err(|e| CeremonyError::from(e).authentication_rejection())?
                .iter()
                .map(CredentialDescriptor::from)
                .collect(),
            None => Vec::new(),
        };

        let challenge = self
            .challenges
            .issue(CeremonyPurpose::Authenticate, owner)
            .map_err(|e| CeremonyError::from(e).authentication_rejection())?;

        Ok(AuthenticationOptions {
            challenge: challenge.value,
            rp_id: self.verifier.relying_party().id().to_string(),
            expires_at: challenge.expires_at,
            allow_credentials,
        })
    }

    pub fn finish_authentication(
        &self,
        response: &AuthenticationResponse,
    ) -> Result<AuthenticatedSession, ProtocolRejection> {
        match self.try_finish_authentication(response) {
            Ok(authenticated) => {
                let now = self.clock.now();
                self.audit.record(
                    &AuditEvent::new(AuditEventType::AuthSuccess, now)
                        .with_user(authenticated.identity.owner.clone())
                        .with_resource("credential", authenticated.identity.credential_id.clone()),
                );
                self.audit.record(
                    &AuditEvent::new(AuditEventType::SessionIssued, now)
                        .with_user(authenticated.identity.owner.clone())
                        .with_resource("session", authenticated.session.token_hash.clone()),
                );
                Ok(authenticated)
            }
            Err(e) => {
                warn!(
                    credential_id = %response.credential_id,
                    error_code = e.error_code(),
                    error = %e,
                    "Authentication rejected"
                );
                self.audit.record(
                    &AuditEvent::new(AuditEventType::AuthFailure, self.clock.now())
                        .with_resource("credential", response.credential_id.clone())
                        .failed(e.error_code()),
                );
                Err(e.authentication_rejection())
            }
        }
    }

    fn try_finish_authentication(
        &self,
        response: &AuthenticationResponse,
    ) -> Result<AuthenticatedSession, CeremonyError> {
        let client = ClientData::parse(&response.assertion.client_data_json)?;
        let expected = self.challenges.consume(&client.challenge)?;
        let identity =
            self.verifier
                .verify_assertion(&response.credential_id, &response.assertion, &expected)?;
        let session = self.sessions.issue(&identity.owner)?;

        info!(owner = %identity.owner, credential_id = %identity.credential_id, "Authenticated");
        Ok(AuthenticatedSession { identity, session })
    }

    pub fn validate_session(&self, token: &str) -> Result<String, ProtocolRejection> {
        self.sessions.validate(token).map_err(|e| {
            info!(error_code = e.error_code(), "Session rejected");
            ProtocolRejection::from(e)
        })
    }

    /// Log out. Revoking an already revoked session succeeds.
    pub fn revoke_session(&self, token: &str) -> Result<(), ProtocolRejection> {
        let token_hash = self.sessions.hash_token(token)?;
        self.sessions.revoke(&token_hash)?;
        self.audit.record(
            &AuditEvent::new(AuditEventType::SessionRevoked, self.clock.now())
                .with_resource("session", token_hash),
        );
        Ok(())
    }

    pub fn list_credentials(&self, owner: &str) -> Result<Vec<Credential>, ProtocolRejection> {
        self.verifier
            .registry()
            .list_for_owner(owner)
            .map_err(|e| CeremonyError::from(e).authentication_rejection())
    }

    pub fn remove_credential(&self, owner: &str, credential_id: &str) -> Result<(), ProtocolRejection> {
        self.verifier
            .registry()
            .remove(owner, credential_id)
            .map_err(|e| {
                warn!(owner, credential_id, error_code = e.error_code(), "Credential removal rejected");
                CeremonyError::from(e).authentication_rejection()
            })?;

        self.audit.record(
            &AuditEvent::new(AuditEventType::CredentialRemoved, self.clock.now())
                .with_user(owner)
                .with_resource("credential", credential_id),
        );
        Ok(())
    }
}
