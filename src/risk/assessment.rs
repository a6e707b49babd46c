// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Risk assessment types.
//!
//! `RiskLevel` and `Recommendation` are closed enums shared with calling
//! layers; their serialized names are stable.

use serde::{Deserialize, Serialize};

/// Heuristic that produced a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskFlagType {
    LargeAmount,
    FirstTimeAddress,
    BlacklistedAddress,
    UnusualInstructions,
    BehaviorDeviation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One heuristic signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFlag {
    pub flag_type: RiskFlagType,
    pub severity: Severity,
    /// Contribution to the aggregate score. Zero for vetoes.
    pub score: f64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approve,
    Warn,
    Block,
}

impl RiskLevel {
    pub fn recommendation(self) -> Recommendation {
        match self {
            RiskLevel::Low => Recommendation::Approve,
            RiskLevel::Medium | RiskLevel::High => Recommendation::Warn,
            RiskLevel::Blocked => Recommendation::Block,
        }
    }
}

/// Result of assessing one prospective transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub flags: Vec<RiskFlag>,
    /// Aggregate score in `[0, 1]`.
    pub score: f64,
    pub level: RiskLevel,
    pub recommendation: Recommendation,
}

impl RiskAssessment {
    pub fn has_flag(&self, flag_type: RiskFlagType) -> bool {
        self.flags.iter().any(|f| f.flag_type == flag_type)
    }

    pub fn flag_types(&self) -> Vec<RiskFlagType> {
        self.flags.iter().map(|f| f.flag_type).collect()
    }

    pub fn is_blocked(&self) -> bool {
        self.recommendation == Recommendation::Block
    }
}
