// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client data collected by the browser for a ceremony.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::challenge::CeremonyPurpose;
use super::error::CredentialError;

/// Client data JSON as sent by the authenticator's host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientData {
    /// `webauthn.create` or `webauthn.get`
    #[serde(rename = "type")]
    pub ceremony: String,
    /// Base64url challenge the client signed over.
    pub challenge: String,
    /// Origin of the page that ran the ceremony.
    pub origin: String,
    #[serde(rename = "crossOrigin", default)]
    pub cross_origin: bool,
}

impl ClientData {
    pub fn parse(raw: &[u8]) -> Result<Self, CredentialError> {
        serde_json::from_slice(raw)
            .map_err(|e| CredentialError::Malformed(format!("client data: {e}")))
    }

    /// Whether the ceremony type matches the purpose.
    pub fn matches_purpose(&self, purpose: CeremonyPurpose) -> bool {
        self.ceremony == ceremony_type(purpose)
    }
}

/// Client data `type` string for a ceremony purpose.
pub fn ceremony_type(purpose: CeremonyPurpose) -> &'static str {
    match purpose {
        CeremonyPurpose::Register => "webauthn.create",
        CeremonyPurpose::Authenticate => "webauthn.get",
    }
}

/// SHA-256 of the raw client data bytes.
pub fn client_data_hash(raw: &[u8]) -> [u8; 32] {
    Sha256::digest(raw).into()
}
