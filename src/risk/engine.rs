// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Risk Engine
//!
//! Scores a prospective transaction before it is signed.
//!
//! ## Checks
//!
//! | Flag | Severity | Points | Condition |
//! |------|----------|--------|-----------|
//! | `LARGE_AMOUNT` | HIGH | 40 | baseline exists and amount > 5x average |
//! | `LARGE_AMOUNT` | MEDIUM | 20 | otherwise, amount > absolute ceiling |
//! | `FIRST_TIME_ADDRESS` | MEDIUM | 20 | no confirmed transfer wallet -> recipient |
//! | `BLACKLISTED_ADDRESS` | CRITICAL | veto | active threat cache entry |
//! | `UNUSUAL_INSTRUCTIONS` | MEDIUM | 20 | instruction count > ceiling |
//! | `BEHAVIOR_DEVIATION` | HIGH | 30 | last-24h count > 3x daily frequency |
//!
//! Points are hundredths of the score and are summed as integers, then
//! clamped to 100. A CRITICAL flag sets the score to 1.0 and blocks
//! regardless of every other signal.
//!
//! Assessment reads the profile, recipient history, preferences, and
//! threat cache. It never writes any of them.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::assessment::{RiskAssessment, RiskFlag, RiskFlagType, RiskLevel, Recommendation, Severity};
use super::history::RecipientHistory;
use super::preferences::PreferenceStore;
use super::profile::ProfileStore;
use super::threat::{ThreatCache, ThreatKind};
use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::clock::Clock;

/// Default absolute amount ceiling, in native units.
pub const DEFAULT_ABSOLUTE_CEILING: f64 = 10.0;

/// Default instruction-count ceiling.
pub const DEFAULT_INSTRUCTION_CEILING: u32 = 10;

const SCORE_SCALE: u32 = 100;
const LARGE_AMOUNT_RELATIVE_POINTS: u32 = 40;
const LARGE_AMOUNT_ABSOLUTE_POINTS: u32 = 20;
const FIRST_TIME_ADDRESS_POINTS: u32 = 20;
const UNUSUAL_INSTRUCTIONS_POINTS: u32 = 20;
const BEHAVIOR_DEVIATION_POINTS: u32 = 30;

const RELATIVE_AMOUNT_MULTIPLIER: f64 = 5.0;
const FREQUENCY_MULTIPLIER: f64 = 3.0;

/// Static heuristics configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskConfig {
    pub absolute_ceiling: f64,
    pub instruction_ceiling: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            absolute_ceiling: DEFAULT_ABSOLUTE_CEILING,
            instruction_ceiling: DEFAULT_INSTRUCTION_CEILING,
        }
    }
}

/// A transaction about to be signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub owner: String,
    pub wallet: String,
    pub amount: f64,
    pub recipient: String,
    pub instruction_count: u32,
}

pub struct RiskEngine {
    profiles: Arc<ProfileStore>,
    history: Arc<RecipientHistory>,
    threats: Arc<ThreatCache>,
    preferences: Arc<PreferenceStore>,
    config: RiskConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

impl RiskEngine {
    pub fn new(
        profiles: Arc<ProfileStore>,
        history: Arc<RecipientHistory>,
        threats: Arc<ThreatCache>,
        preferences: Arc<PreferenceStore>,
        config: RiskConfig,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            profiles,
            history,
            threats,
            preferences,
            config,
            clock,
            audit,
        }
    }

    /// Produce an assessment. Never fails; missing state degrades to a
    /// zero baseline and "not listed".
    pub fn assess_transaction(&self, tx: &TransactionRequest) -> RiskAssessment {
        let now = self.clock.now();
        let profile = self.profiles.get(&tx.owner);

        let mut flags = Vec::new();
        let mut points: u32 = 0;
        let mut add = |flag_type, severity, contribution: u32, message: String| {
            points += contribution;
            flags.push(RiskFlag {
                flag_type,
                severity,
                score: f64::from(contribution) / f64::from(SCORE_SCALE),
                message,
            });
        };

        if profile.has_baseline()
            && tx.amount > profile.average_amount * RELATIVE_AMOUNT_MULTIPLIER
        {
            add(
                RiskFlagType::LargeAmount,
                Severity::High,
                LARGE_AMOUNT_RELATIVE_POINTS,
                format!(
                    "Amount {} is more than {}x the average of {:.4}",
                    tx.amount, RELATIVE_AMOUNT_MULTIPLIER, profile.average_amount
                ),
            );
        } else if tx.amount > self.config.absolute_ceiling {
            add(
                RiskFlagType::LargeAmount,
                Severity::Medium,
                LARGE_AMOUNT_ABSOLUTE_POINTS,
                format!(
                    "Amount {} exceeds the ceiling of {}",
                    tx.amount, self.config.absolute_ceiling
                ),
            );
        }

        if !self.history.has_confirmed_transfer(&tx.wallet, &tx.recipient) {
            add(
                RiskFlagType::FirstTimeAddress,
                Severity::Medium,
                FIRST_TIME_ADDRESS_POINTS,
                "First transfer from this wallet to this recipient".to_string(),
            );
        }

        let listed = self
            .threats
            .lookup(ThreatKind::Address, &tx.recipient)
            .filter(|entry| entry.active);
        if let Some(entry) = &listed {
            add(
                RiskFlagType::BlacklistedAddress,
                Severity::Critical,
                0,
                format!("Recipient is listed as {:?} by {}", entry.category, entry.source),
            );
        }

        if tx.instruction_count > self.config.instruction_ceiling {
            add(
                RiskFlagType::UnusualInstructions,
                Severity::Medium,
                UNUSUAL_INSTRUCTIONS_POINTS,
                format!(
                    "{} instructions exceeds the ceiling of {}",
                    tx.instruction_count, self.config.instruction_ceiling
                ),
            );
        }

        let recent = profile.recent_count(now, Duration::hours(24));
        if recent as f64 > profile.frequency * FREQUENCY_MULTIPLIER {
            add(
                RiskFlagType::BehaviorDeviation,
                Severity::High,
                BEHAVIOR_DEVIATION_POINTS,
                format!(
                    "{} confirmed transactions in 24h against a baseline of {:.2}/day",
                    recent, profile.frequency
                ),
            );
        }

        let points = points.min(SCORE_SCALE);
        let critical = flags.iter().any(|f| f.severity == Severity::Critical);
        let threshold = self.preferences.threshold(&tx.owner);
        let level = classify(points, threshold, critical);
        let score = if critical {
            1.0
        } else {
            f64::from(points) / f64::from(SCORE_SCALE)
        };

        let assessment = RiskAssessment {
            flags,
            score,
            level,
            recommendation: level.recommendation(),
        };
        self.record(tx, &assessment);
        assessment
    }

    fn record(&self, tx: &TransactionRequest, assessment: &RiskAssessment) {
        info!(
            owner = %tx.owner,
            wallet = %tx.wallet,
            score = assessment.score,
            level = ?assessment.level,
            flags = ?assessment.flag_types(),
            "Risk assessment"
        );

        let event_type = match assessment.recommendation {
            Recommendation::Approve => return,
            Recommendation::Warn => AuditEventType::TransactionWarned,
            Recommendation::Block => AuditEventType::TransactionBlocked,
        };
        self.audit.record(
            &AuditEvent::new(event_type, self.clock.now())
                .with_user(tx.owner.clone())
                .with_resource("wallet", tx.wallet.clone())
                .with_details(serde_json::json!({
                    "recipient": tx.recipient,
                    "amount": tx.amount,
                    "score": assessment.score,
                    "flags": assessment.flag_types(),
                })),
        );
    }
}

/// Map a score to a level.
///
/// Compared in thousandths so band edges are exact: a score of 0.2
/// against threshold 0.5 sits on the MEDIUM edge and is MEDIUM.
fn classify(points: u32, threshold: f64, critical: bool) -> RiskLevel {
    if critical {
        return RiskLevel::Blocked;
    }

    let score = u64::from(points) * 10;
    let threshold = (threshold * 1_000.0).round() as u64;

    if score >= threshold {
        RiskLevel::Blocked
    } else if score * 10 >= threshold * 7 {
        RiskLevel::High
    } else if score * 10 >= threshold * 4 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::clock::ManualClock;
    use crate::risk::confirmation::{ConfirmationListener, ConfirmedTransaction};
    use crate::risk::preferences::DEFAULT_RISK_THRESHOLD;
    use crate::risk::threat::{ThreatCategory, ThreatIndicator};
    use crate::store::{KeyedStore, MemoryStore};

    const KNOWN: &str = "0x1111111111111111111111111111111111111111";
    const STRANGER: &str = "0x2222222222222222222222222222222222222222";

    struct Harness {
        engine: RiskEngine,
        listener: ConfirmationListener,
        profiles: Arc<ProfileStore>,
        threats: Arc<ThreatCache>,
        preferences: Arc<PreferenceStore>,
        clock: Arc<ManualClock>,
        audit: Arc<MemoryAuditSink>,
    }

    fn harness() -> Harness {
        let store: Arc<dyn KeyedStore> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let audit = Arc::new(MemoryAuditSink::new());

        let profiles = Arc::new(ProfileStore::new(store.clone(), clock.clone()));
        let history = Arc::new(RecipientHistory::new(store.clone()));
        let threats = Arc::new(ThreatCache::new(1_000, clock.clone()));
        let preferences = Arc::new(
            PreferenceStore::new(store, clock.clone(), DEFAULT_RISK_THRESHOLD).unwrap(),
        );
        let engine = RiskEngine::new(
            profiles.clone(),
            history.clone(),
            threats.clone(),
            preferences.clone(),
            RiskConfig::default(),
            clock.clone(),
            audit.clone(),
        );

        Harness {
            engine,
            listener: ConfirmationListener::new(profiles.clone(), history),
            profiles,
            threats,
            preferences,
            clock,
            audit,
        }
    }

    fn request(amount: f64, recipient: &str, instruction_count: u32) -> TransactionRequest {
        TransactionRequest {
            owner: "user_1".to_string(),
            wallet: "wallet_1".to_string(),
            amount,
            recipient: recipient.to_string(),
            instruction_count,
        }
    }

    /// Ten confirmed 1.0 transfers to `KNOWN`, one every two days, the last
    /// a week before now.
    fn seed_baseline(h: &Harness) {
        let now = h.clock.now();
        let start = now - Duration::days(25);
        for i in 0..10 {
            let at = start + Duration::days(2 * i);
            h.clock.set(at);
            h.listener
                .apply(&ConfirmedTransaction {
                    owner: "user_1".to_string(),
                    wallet: "wallet_1".to_string(),
                    amount: 1.0,
                    counterparty: KNOWN.to_string(),
                    confirmed_at: at,
                })
                .unwrap();
        }
        h.clock.set(now);
    }

    fn blacklist(h: &Harness, address: &str) {
        h.threats.upsert(ThreatIndicator {
            kind: ThreatKind::Address,
            value: address.to_string(),
            category: ThreatCategory::Drainer,
            source: "test-feed".to_string(),
            active: true,
        });
    }

    #[test]
    fn scenario_new_user_first_time_recipient() {
        let h = harness();
        let assessment = h.engine.assess_transaction(&request(2.0, STRANGER, 1));

        assert_eq!(assessment.flag_types(), vec![RiskFlagType::FirstTimeAddress]);
        assert_eq!(assessment.score, 0.2);
        // 0.2 sits exactly on threshold x 0.4 and the bands are inclusive
        assert_eq!(assessment.level, RiskLevel::Medium);
        assert_eq!(assessment.recommendation, Recommendation::Warn);
    }

    #[test]
    fn scenario_new_user_below_medium_band() {
        let h = harness();
        h.preferences.set_threshold("user_1", 0.6).unwrap();
        let assessment = h.engine.assess_transaction(&request(2.0, STRANGER, 1));

        assert_eq!(assessment.score, 0.2);
        assert_eq!(assessment.level, RiskLevel::Low);
        assert_eq!(assessment.recommendation, Recommendation::Approve);
    }

    #[test]
    fn scenario_large_amount_against_baseline() {
        let h = harness();
        seed_baseline(&h);
        assert!((h.profiles.get("user_1").average_amount - 1.0).abs() < 1e-9);

        let assessment = h.engine.assess_transaction(&request(10.0, KNOWN, 1));
        assert_eq!(assessment.flag_types(), vec![RiskFlagType::LargeAmount]);
        assert_eq!(assessment.flags[0].severity, Severity::High);
        assert_eq!(assessment.score, 0.4);
        assert_eq!(assessment.level, RiskLevel::High);
        assert_eq!(assessment.recommendation, Recommendation::Warn);
    }

    #[test]
    fn scenario_blacklisted_recipient_blocks_tiny_amount() {
        let h = harness();
        seed_baseline(&h);
        blacklist(&h, KNOWN);

        let assessment = h.engine.assess_transaction(&request(0.01, KNOWN, 1));
        assert_eq!(assessment.score, 1.0);
        assert_eq!(assessment.level, RiskLevel::Blocked);
        assert_eq!(assessment.recommendation, Recommendation::Block);
        assert!(assessment.has_flag(RiskFlagType::BlacklistedAddress));
        assert_eq!(h.audit.count(AuditEventType::TransactionBlocked), 1);
    }

    #[test]
    fn blacklist_veto_ignores_threshold_and_amount() {
        let h = harness();
        h.preferences.set_threshold("user_1", 1.0).unwrap();
        blacklist(&h, STRANGER);

        for amount in [0.0, 0.5, 1_000.0] {
            let assessment = h.engine.assess_transaction(&request(amount, STRANGER, 1));
            assert_eq!(assessment.score, 1.0);
            assert!(assessment.is_blocked());
        }
    }

    #[test]
    fn inactive_or_expired_entries_do_not_block() {
        let h = harness();
        h.threats.upsert(ThreatIndicator {
            kind: ThreatKind::Address,
            value: STRANGER.to_string(),
            category: ThreatCategory::Scam,
            source: "test-feed".to_string(),
            active: false,
        });
        assert!(!h
            .engine
            .assess_transaction(&request(1.0, STRANGER, 1))
            .has_flag(RiskFlagType::BlacklistedAddress));

        blacklist(&h, STRANGER);
        h.clock.advance(Duration::days(2));
        assert!(!h
            .engine
            .assess_transaction(&request(1.0, STRANGER, 1))
            .is_blocked());
    }

    #[test]
    fn relative_check_fires_above_five_times_average() {
        let h = harness();
        seed_baseline(&h);

        for amount in [5.01, 7.5, 50.0] {
            let assessment = h.engine.assess_transaction(&request(amount, KNOWN, 1));
            let flag = assessment
                .flags
                .iter()
                .find(|f| f.flag_type == RiskFlagType::LargeAmount)
                .unwrap();
            assert_eq!(flag.severity, Severity::High, "amount {amount}");
            assert_eq!(
                assessment
                    .flags
                    .iter()
                    .filter(|f| f.flag_type == RiskFlagType::LargeAmount)
                    .count(),
                1
            );
        }

        let at_edge = h.engine.assess_transaction(&request(5.0, KNOWN, 1));
        assert!(!at_edge.has_flag(RiskFlagType::LargeAmount));
    }

    #[test]
    fn stale_baseline_is_not_used() {
        let h = harness();
        h.listener
            .apply(&ConfirmedTransaction {
                owner: "user_1".to_string(),
                wallet: "wallet_1".to_string(),
                amount: 1.0,
                counterparty: KNOWN.to_string(),
                confirmed_at: h.clock.now(),
            })
            .unwrap();
        assert!(h
            .engine
            .assess_transaction(&request(6.0, KNOWN, 1))
            .has_flag(RiskFlagType::LargeAmount));

        // Nothing confirmed in the trailing window: no baseline to deviate from
        h.clock.advance(Duration::days(90));
        let assessment = h.engine.assess_transaction(&request(6.0, KNOWN, 1));
        assert!(assessment.flags.is_empty());
        assert_eq!(assessment.recommendation, Recommendation::Approve);
    }

    #[test]
    fn absolute_ceiling_without_baseline() {
        let h = harness();
        let assessment = h.engine.assess_transaction(&request(10.5, STRANGER, 1));

        let flag = &assessment.flags[0];
        assert_eq!(flag.flag_type, RiskFlagType::LargeAmount);
        assert_eq!(flag.severity, Severity::Medium);
        assert_eq!(assessment.score, 0.4);
    }

    #[test]
    fn unusual_instruction_count() {
        let h = harness();
        seed_baseline(&h);

        let at_ceiling = h.engine.assess_transaction(&request(1.0, KNOWN, 10));
        assert!(at_ceiling.flags.is_empty());
        assert_eq!(at_ceiling.recommendation, Recommendation::Approve);

        let over = h.engine.assess_transaction(&request(1.0, KNOWN, 11));
        assert_eq!(over.flag_types(), vec![RiskFlagType::UnusualInstructions]);
        assert_eq!(over.score, 0.2);
    }

    #[test]
    fn burst_of_confirmations_is_a_deviation() {
        let h = harness();
        seed_baseline(&h);
        let now = h.clock.now();

        // Eight in the last day against well under one per day
        for i in 0..8 {
            h.listener
                .apply(&ConfirmedTransaction {
                    owner: "user_1".to_string(),
                    wallet: "wallet_1".to_string(),
                    amount: 1.0,
                    counterparty: KNOWN.to_string(),
                    confirmed_at: now - Duration::minutes(10 * (i + 1)),
                })
                .unwrap();
        }

        let assessment = h.engine.assess_transaction(&request(1.0, KNOWN, 1));
        assert!(assessment.has_flag(RiskFlagType::BehaviorDeviation));
    }

    #[test]
    fn score_is_clamped() {
        let h = harness();
        seed_baseline(&h);
        for i in 0..8 {
            h.listener
                .apply(&ConfirmedTransaction {
                    owner: "user_1".to_string(),
                    wallet: "wallet_1".to_string(),
                    amount: 1.0,
                    counterparty: KNOWN.to_string(),
                    confirmed_at: h.clock.now() - Duration::minutes(i + 1),
                })
                .unwrap();
        }

        // 40 + 20 + 20 + 30 = 110 points
        let assessment = h.engine.assess_transaction(&request(100.0, STRANGER, 50));
        assert_eq!(assessment.flags.len(), 4);
        assert_eq!(assessment.score, 1.0);
        assert_eq!(assessment.level, RiskLevel::Blocked);
    }

    #[test]
    fn identical_inputs_give_identical_assessments() {
        let h = harness();
        seed_baseline(&h);
        blacklist(&h, "0x3333333333333333333333333333333333333333");

        for tx in [
            request(2.0, STRANGER, 1),
            request(10.0, KNOWN, 12),
            request(0.5, "0x3333333333333333333333333333333333333333", 1),
        ] {
            assert_eq!(h.engine.assess_transaction(&tx), h.engine.assess_transaction(&tx));
        }
    }

    #[test]
    fn assessment_never_mutates_profile() {
        let h = harness();
        seed_baseline(&h);
        let before = h.profiles.get("user_1");

        for _ in 0..20 {
            h.engine.assess_transaction(&request(50.0, STRANGER, 30));
        }
        assert_eq!(h.profiles.get("user_1"), before);
        assert!(h
            .engine
            .assess_transaction(&request(1.0, STRANGER, 1))
            .has_flag(RiskFlagType::FirstTimeAddress));

        h.listener
            .apply(&ConfirmedTransaction {
                owner: "user_1".to_string(),
                wallet: "wallet_1".to_string(),
                amount: 2.0,
                counterparty: STRANGER.to_string(),
                confirmed_at: h.clock.now(),
            })
            .unwrap();
        let after = h.profiles.get("user_1");
        assert_eq!(after.samples.len(), before.samples.len() + 1);
        assert!(!h
            .engine
            .assess_transaction(&request(1.0, STRANGER, 1))
            .has_flag(RiskFlagType::FirstTimeAddress));
    }

    #[test]
    fn classify_bands() {
        assert_eq!(classify(50, 0.5, false), RiskLevel::Blocked);
        assert_eq!(classify(49, 0.5, false), RiskLevel::High);
        assert_eq!(classify(35, 0.5, false), RiskLevel::High);
        assert_eq!(classify(34, 0.5, false), RiskLevel::Medium);
        assert_eq!(classify(20, 0.5, false), RiskLevel::Medium);
        assert_eq!(classify(19, 0.5, false), RiskLevel::Low);
        assert_eq!(classify(0, 0.5, true), RiskLevel::Blocked);
    }
}
