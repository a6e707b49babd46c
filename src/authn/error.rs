// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every variant is terminal: the caller restarts the ceremony (or
//! re-authenticates) instead of retrying. The detailed variants are for
//! logs and audit only; the transport boundary sees a
//! [`ProtocolRejection`](crate::error::ProtocolRejection).

use crate::store::StoreError;

/// Challenge lifecycle failures.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("challenge not found")]
    NotFound,

    #[error("challenge expired")]
    Expired,

    #[error("challenge already consumed")]
    AlreadyConsumed,

    /// The challenge was issued for a different ceremony or owner.
    #[error("challenge purpose mismatch")]
    PurposeMismatch,

    #[error("random source failure")]
    Randomness,

    #[error("challenge storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ChallengeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ChallengeError::NotFound => "challenge_not_found",
            ChallengeError::Expired => "challenge_expired",
            ChallengeError::AlreadyConsumed => "challenge_already_consumed",
            ChallengeError::PurposeMismatch => "challenge_purpose_mismatch",
            ChallengeError::Randomness => "randomness_failure",
            ChallengeError::Storage(_) => "storage_error",
        }
    }
}

/// Credential registration and assertion failures.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential not found")]
    NotFound,

    #[error("assertion signature is invalid")]
    InvalidSignature,

    /// The authenticator reported a counter at or below the stored one.
    /// Treated as a cloned authenticator.
    #[error("signature counter regressed (stored {stored}, received {received})")]
    CounterRegression { stored: u32, received: u32 },

    #[error("origin or relying party mismatch")]
    OriginMismatch,

    #[error("attestation is invalid: {0}")]
    AttestationInvalid(String),

    #[error("challenge mismatch")]
    ChallengeMismatch,

    /// Client data or authenticator data could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("user presence not asserted")]
    UserNotPresent,

    /// The credential id is already registered.
    #[error("credential already registered")]
    AlreadyRegistered,

    /// The credential belongs to a different owner than the ceremony.
    #[error("credential owner mismatch")]
    OwnerMismatch,

    #[error("credential storage error: {0}")]
    Storage(#[from] StoreError),
}

impl CredentialError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CredentialError::NotFound => "credential_not_found",
            CredentialError::InvalidSignature => "invalid_signature",
            CredentialError::CounterRegression { .. } => "counter_regression",
            CredentialError::OriginMismatch => "origin_mismatch",
            CredentialError::AttestationInvalid(_) => "attestation_invalid",
            CredentialError::ChallengeMismatch => "challenge_mismatch",
            CredentialError::Malformed(_) => "malformed_response",
            CredentialError::UserNotPresent => "user_not_present",
            CredentialError::AlreadyRegistered => "credential_already_registered",
            CredentialError::OwnerMismatch => "credential_owner_mismatch",
            CredentialError::Storage(_) => "storage_error",
        }
    }
}

/// Session validation failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session expired")]
    Expired,

    #[error("session revoked")]
    Revoked,

    #[error("session token malformed")]
    Malformed,

    /// Well-formed token with no server-side record.
    #[error("session unknown")]
    Unknown,

    #[error("random source failure")]
    Randomness,

    /// The token-hashing key is shorter than the minimum.
    #[error("session pepper must be at least {0} bytes")]
    WeakPepper(usize),

    #[error("session storage error: {0}")]
    Storage(#[from] StoreError),
}

impl SessionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SessionError::Expired => "session_expired",
            SessionError::Revoked => "session_revoked",
            SessionError::Malformed => "session_malformed",
            SessionError::Unknown => "session_unknown",
            SessionError::Randomness => "randomness_failure",
            SessionError::WeakPepper(_) => "weak_pepper",
            SessionError::Storage(_) => "storage_error",
        }
    }
}
