// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Errors as seen by the transport layer.
//!
//! Internal error enums say exactly which check failed. That detail goes to
//! logs and the audit trail; callers only ever see a [`ProtocolRejection`],
//! so a failed ceremony does not reveal whether a credential exists, which
//! origin was expected, or what counter is stored.

use serde::Serialize;

use crate::authn::error::{ChallengeError, CredentialError, SessionError};
use crate::store::StoreError;

/// Generic rejection returned across the protocol boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolRejection {
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("registration failed")]
    RegistrationFailed,

    #[error("session invalid")]
    SessionInvalid,

    /// Backing store or random source failed; the caller may start over.
    #[error("service unavailable")]
    Unavailable,
}

#[derive(Debug, Serialize)]
pub struct RejectionBody {
    pub error: String,
    pub error_code: &'static str,
}

impl ProtocolRejection {
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtocolRejection::AuthenticationFailed => "authentication_failed",
            ProtocolRejection::RegistrationFailed => "registration_failed",
            ProtocolRejection::SessionInvalid => "session_invalid",
            ProtocolRejection::Unavailable => "unavailable",
        }
    }

    /// JSON body for whichever transport carries the rejection.
    pub fn body(&self) -> RejectionBody {
        RejectionBody {
            error: self.to_string(),
            error_code: self.error_code(),
        }
    }
}

/// Failure anywhere in an authentication ceremony.
#[derive(Debug, thiserror::Error)]
pub enum CeremonyError {
    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl CeremonyError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CeremonyError::Challenge(e) => e.error_code(),
            CeremonyError::Credential(e) => e.error_code(),
            CeremonyError::Session(e) => e.error_code(),
        }
    }

    fn is_unavailable(&self) -> bool {
        matches!(
            self,
            CeremonyError::Challenge(ChallengeError::Storage(_) | ChallengeError::Randomness)
                | CeremonyError::Credential(CredentialError::Storage(_))
                | CeremonyError::Session(
                    SessionError::Storage(_) | SessionError::Randomness | SessionError::WeakPepper(_)
                )
        )
    }

    /// Collapse into the rejection for a registration ceremony.
    pub fn registration_rejection(&self) -> ProtocolRejection {
        if self.is_unavailable() {
            ProtocolRejection::Unavailable
        } else {
            ProtocolRejection::RegistrationFailed
        }
    }

    /// Collapse into the rejection for an authentication ceremony.
    pub fn authentication_rejection(&self) -> ProtocolRejection {
        if self.is_unavailable() {
            ProtocolRejection::Unavailable
        } else {
            ProtocolRejection::AuthenticationFailed
        }
    }
}

impl From<SessionError> for ProtocolRejection {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Storage(_) | SessionError::Randomness | SessionError::WeakPepper(_) => {
                ProtocolRejection::Unavailable
            }
            SessionError::Expired
            | SessionError::Revoked
            | SessionError::Malformed
            | SessionError::Unknown => ProtocolRejection::SessionInvalid,
        }
    }
}

impl From<StoreError> for ProtocolRejection {
    fn from(_: StoreError) -> Self {
        ProtocolRejection::Unavailable
    }
}
