// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication
//!
//! Public-key credential ceremonies with replay protection.
//!
//! ## Flow
//!
//! ```text
//! ChallengeManager::issue ──▶ client signs ──▶ ChallengeManager::consume
//!                                                   │
//!                                                   ▼
//!                          CredentialVerifier (CredentialRegistry, CredentialCrypto)
//!                                                   │
//!                                                   ▼
//!                                         SessionIssuer::issue
//! ```
//!
//! ## Invariants
//!
//! - A challenge is consumed at most once; expired and consumed challenges
//!   never come back.
//! - A credential's counter only moves forward. A non-increasing counter is
//!   a hard failure and raises a security alert.
//! - Origins and the relying-party id match exactly.
//! - Only a keyed hash of each session token is stored.

pub mod authenticator_data;
pub mod ceremony;
pub mod challenge;
pub mod client_data;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod session;
pub mod verifier;

pub use ceremony::{
    AuthService, AuthenticatedSession, AuthenticationOptions, AuthenticationResponse,
    CredentialDescriptor, RegistrationOptions,
};
pub use challenge::{CeremonyPurpose, Challenge, ChallengeManager, ChallengeMeta};
pub use credential::{Credential, CredentialRegistry, Transport};
pub use crypto::{Attestation, CredentialCrypto, PublicKey, RingCrypto, SignatureAlgorithm};
pub use error::{ChallengeError, CredentialError, SessionError};
pub use session::{IssuedSession, SessionIssuer, SessionRecord};
pub use verifier::{
    Assertion, CredentialVerifier, RegistrationResponse, RelyingParty, VerifiedIdentity,
};
