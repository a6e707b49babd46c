// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Risk
//!
//! Scores a proposed transaction before the wallet signs it.
//!
//! ```text
//!  ConfirmationListener ──▶ ProfileStore, RecipientHistory
//!  ThreatFeedRefresher  ──▶ ThreatCache
//!
//!  TransactionRequest ──▶ RiskEngine::assess_transaction ──▶ RiskAssessment
//!                           (reads profiles, history, threats, preferences)
//! ```
//!
//! Assessment is read-only and never fails. Unreadable state is treated as
//! "no baseline" or "never seen", which can only raise the score.

pub mod assessment;
pub mod confirmation;
pub mod engine;
pub mod error;
pub mod feed;
pub mod history;
pub mod preferences;
pub mod profile;
pub mod threat;

pub use assessment::{
    Recommendation, RiskAssessment, RiskFlag, RiskFlagType, RiskLevel, Severity,
};
pub use confirmation::{ConfirmationListener, ConfirmedTransaction};
pub use engine::{RiskConfig, RiskEngine, TransactionRequest};
pub use error::{PreferenceError, ProfileError, ThreatFeedError};
pub use feed::{HttpThreatFeed, ThreatFeed, ThreatFeedRefresher};
pub use history::{RecipientHistory, RecipientRecord};
pub use preferences::{PreferenceStore, RiskPreferences, DEFAULT_RISK_THRESHOLD};
pub use profile::{BehaviorProfile, CounterpartyStat, ProfileStore};
pub use threat::{ThreatCache, ThreatCategory, ThreatEntry, ThreatIndicator, ThreatKind};
