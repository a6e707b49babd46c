// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the typed [`TrustConfig`]
//! loaded from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `TRUST_DB_PATH` | redb file backing the keyed store | `/data/trust.redb` |
//! | `RP_ID` | Relying-party identifier | Required |
//! | `RP_ORIGINS` | Comma-separated allowed origins (exact match) | Required |
//! | `CHALLENGE_TTL_SECS` | Challenge lifetime | `60` |
//! | `SESSION_TTL_SECS` | Session lifetime | `86400` |
//! | `SESSION_PEPPER` | Session-token hashing key, at least 32 bytes | Required |
//! | `RISK_ABSOLUTE_CEILING` | Absolute amount ceiling (native units) | `10` |
//! | `RISK_INSTRUCTION_CEILING` | Instruction-count ceiling | `10` |
//! | `RISK_DEFAULT_THRESHOLD` | Default per-user risk threshold | `0.5` |
//! | `THREAT_FEED_URL` | JSON threat feed | Unset (refresher disabled) |
//! | `THREAT_REFRESH_SECS` | Feed refresh interval | `900` |
//! | `THREAT_ENTRY_TTL_SECS` | Threat entry lifetime after refresh | `86400` |
//! | `THREAT_CACHE_CAPACITY` | Max cached threat entries | `100000` |
//! | `MAINTENANCE_INTERVAL_SECS` | Expired challenge/session sweep interval | `60` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,relational_trust=debug` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::authn::challenge::DEFAULT_CHALLENGE_TTL_SECS;
use crate::authn::session::{DEFAULT_SESSION_TTL_SECS, MIN_PEPPER_BYTES};
use crate::risk::engine::{RiskConfig, DEFAULT_ABSOLUTE_CEILING, DEFAULT_INSTRUCTION_CEILING};
use crate::risk::feed::DEFAULT_REFRESH_INTERVAL;
use crate::risk::preferences::{validate_threshold, DEFAULT_RISK_THRESHOLD};
use crate::risk::threat::{DEFAULT_CAPACITY, DEFAULT_ENTRY_TTL_SECS};

/// Path of the redb database file.
///
/// # Default
/// `/data/trust.redb`
pub const TRUST_DB_PATH_ENV: &str = "TRUST_DB_PATH";

/// Relying-party identifier bound into every authenticator data blob.
pub const RP_ID_ENV: &str = "RP_ID";

/// Allowed client origins. Compared exactly after URL normalization.
pub const RP_ORIGINS_ENV: &str = "RP_ORIGINS";

pub const CHALLENGE_TTL_SECS_ENV: &str = "CHALLENGE_TTL_SECS";

pub const SESSION_TTL_SECS_ENV: &str = "SESSION_TTL_SECS";

/// Secret used to HMAC session tokens before storage.
///
/// # Security
/// Never logged. Rotating it invalidates every live session.
pub const SESSION_PEPPER_ENV: &str = "SESSION_PEPPER";

pub const RISK_ABSOLUTE_CEILING_ENV: &str = "RISK_ABSOLUTE_CEILING";

pub const RISK_INSTRUCTION_CEILING_ENV: &str = "RISK_INSTRUCTION_CEILING";

pub const RISK_DEFAULT_THRESHOLD_ENV: &str = "RISK_DEFAULT_THRESHOLD";

/// Threat feed URL. When unset the cache only holds what is upserted
/// directly.
pub const THREAT_FEED_URL_ENV: &str = "THREAT_FEED_URL";

pub const THREAT_REFRESH_SECS_ENV: &str = "THREAT_REFRESH_SECS";

pub const THREAT_ENTRY_TTL_SECS_ENV: &str = "THREAT_ENTRY_TTL_SECS";

pub const THREAT_CACHE_CAPACITY_ENV: &str = "THREAT_CACHE_CAPACITY";

pub const MAINTENANCE_INTERVAL_SECS_ENV: &str = "MAINTENANCE_INTERVAL_SECS";

/// Log output format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DB_PATH: &str = "/data/trust.redb";

pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Everything the daemon needs to wire the trust boundary.
#[derive(Clone)]
pub struct TrustConfig {
    pub db_path: PathBuf,
    pub rp_id: String,
    pub rp_origins: Vec<String>,
    pub challenge_ttl: chrono::Duration,
    pub session_ttl: chrono::Duration,
    pub session_pepper: Vec<u8>,
    pub risk: RiskConfig,
    pub default_risk_threshold: f64,
    pub threat_feed_url: Option<String>,
    pub threat_refresh_interval: Duration,
    pub threat_entry_ttl: chrono::Duration,
    pub threat_cache_capacity: usize,
    pub maintenance_interval: Duration,
}

impl std::fmt::Debug for TrustConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustConfig")
            .field("db_path", &self.db_path)
            .field("rp_id", &self.rp_id)
            .field("rp_origins", &self.rp_origins)
            .field("challenge_ttl", &self.challenge_ttl)
            .field("session_ttl", &self.session_ttl)
            .field("session_pepper", &"<redacted>")
            .field("risk", &self.risk)
            .field("default_risk_threshold", &self.default_risk_threshold)
            .field("threat_feed_url", &self.threat_feed_url)
            .field("threat_refresh_interval", &self.threat_refresh_interval)
            .field("threat_entry_ttl", &self.threat_entry_ttl)
            .field("threat_cache_capacity", &self.threat_cache_capacity)
            .field("maintenance_interval", &self.maintenance_interval)
            .finish()
    }
}

impl TrustConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let rp_id = var(RP_ID_ENV).ok_or(ConfigError::Missing(RP_ID_ENV))?;

        let rp_origins: Vec<String> = var(RP_ORIGINS_ENV)
            .ok_or(ConfigError::Missing(RP_ORIGINS_ENV))?
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if rp_origins.is_empty() {
            return Err(ConfigError::Missing(RP_ORIGINS_ENV));
        }
        for origin in &rp_origins {
            url::Url::parse(origin).map_err(|e| ConfigError::Invalid {
                name: RP_ORIGINS_ENV,
                reason: format!("{origin}: {e}"),
            })?;
        }

        let session_pepper = var(SESSION_PEPPER_ENV)
            .ok_or(ConfigError::Missing(SESSION_PEPPER_ENV))?
            .into_bytes();
        if session_pepper.len() < MIN_PEPPER_BYTES {
            return Err(ConfigError::Invalid {
                name: SESSION_PEPPER_ENV,
                reason: format!("must be at least {MIN_PEPPER_BYTES} bytes"),
            });
        }

        let challenge_ttl_secs: i64 = parse_or(&var, CHALLENGE_TTL_SECS_ENV, DEFAULT_CHALLENGE_TTL_SECS)?;
        let session_ttl_secs: i64 = parse_or(&var, SESSION_TTL_SECS_ENV, DEFAULT_SESSION_TTL_SECS)?;
        let entry_ttl_secs: i64 = parse_or(&var, THREAT_ENTRY_TTL_SECS_ENV, DEFAULT_ENTRY_TTL_SECS)?;
        for (name, secs) in [
            (CHALLENGE_TTL_SECS_ENV, challenge_ttl_secs),
            (SESSION_TTL_SECS_ENV, session_ttl_secs),
            (THREAT_ENTRY_TTL_SECS_ENV, entry_ttl_secs),
        ] {
            if secs <= 0 {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be positive".to_string(),
                });
            }
        }

        let absolute_ceiling: f64 = parse_or(&var, RISK_ABSOLUTE_CEILING_ENV, DEFAULT_ABSOLUTE_CEILING)?;
        if !absolute_ceiling.is_finite() || absolute_ceiling <= 0.0 {
            return Err(ConfigError::Invalid {
                name: RISK_ABSOLUTE_CEILING_ENV,
                reason: "must be a positive number".to_string(),
            });
        }
        let instruction_ceiling: u32 =
            parse_or(&var, RISK_INSTRUCTION_CEILING_ENV, DEFAULT_INSTRUCTION_CEILING)?;

        let default_risk_threshold: f64 =
            parse_or(&var, RISK_DEFAULT_THRESHOLD_ENV, DEFAULT_RISK_THRESHOLD)?;
        validate_threshold(default_risk_threshold).map_err(|e| ConfigError::Invalid {
            name: RISK_DEFAULT_THRESHOLD_ENV,
            reason: e.to_string(),
        })?;

        let threat_feed_url = var(THREAT_FEED_URL_ENV);
        if let Some(feed) = &threat_feed_url {
            url::Url::parse(feed).map_err(|e| ConfigError::Invalid {
                name: THREAT_FEED_URL_ENV,
                reason: e.to_string(),
            })?;
        }

        let refresh_secs: u64 =
            parse_or(&var, THREAT_REFRESH_SECS_ENV, DEFAULT_REFRESH_INTERVAL.as_secs())?;
        let maintenance_secs: u64 =
            parse_or(&var, MAINTENANCE_INTERVAL_SECS_ENV, DEFAULT_MAINTENANCE_INTERVAL_SECS)?;
        for (name, secs) in [
            (THREAT_REFRESH_SECS_ENV, refresh_secs),
            (MAINTENANCE_INTERVAL_SECS_ENV, maintenance_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be positive".to_string(),
                });
            }
        }

        Ok(Self {
            db_path: var(TRUST_DB_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            rp_id,
            rp_origins,
            challenge_ttl: chrono::Duration::seconds(challenge_ttl_secs),
            session_ttl: chrono::Duration::seconds(session_ttl_secs),
            session_pepper,
            risk: RiskConfig {
                absolute_ceiling,
                instruction_ceiling,
            },
            default_risk_threshold,
            threat_feed_url,
            threat_refresh_interval: Duration::from_secs(refresh_secs),
            threat_entry_ttl: chrono::Duration::seconds(entry_ttl_secs),
            threat_cache_capacity: parse_or(&var, THREAT_CACHE_CAPACITY_ENV, DEFAULT_CAPACITY)?,
            maintenance_interval: Duration::from_secs(maintenance_secs),
        })
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const PEPPER: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<TrustConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TrustConfig::from_lookup(|name| vars.get(name).cloned())
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            (RP_ID_ENV, "wallet.relational.network"),
            (RP_ORIGINS_ENV, "https://wallet.relational.network, https://app.relational.network"),
            (SESSION_PEPPER_ENV, PEPPER),
        ]
    }

    #[test]
    fn defaults_apply() {
        let config = load(&required()).unwrap();

        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.rp_origins.len(), 2);
        assert_eq!(config.challenge_ttl, chrono::Duration::seconds(60));
        assert_eq!(config.session_ttl, chrono::Duration::seconds(86_400));
        assert_eq!(config.risk, RiskConfig::default());
        assert_eq!(config.default_risk_threshold, 0.5);
        assert!(config.threat_feed_url.is_none());
        assert_eq!(config.threat_cache_capacity, 100_000);
        assert_eq!(config.maintenance_interval, Duration::from_secs(60));
    }

    #[test]
    fn overrides_parse() {
        let mut vars = required();
        vars.extend([
            (CHALLENGE_TTL_SECS_ENV, "30"),
            (RISK_ABSOLUTE_CEILING_ENV, "25.5"),
            (RISK_DEFAULT_THRESHOLD_ENV, "0.8"),
            (THREAT_FEED_URL_ENV, "https://feeds.example/threats.json"),
            (THREAT_REFRESH_SECS_ENV, "120"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.challenge_ttl, chrono::Duration::seconds(30));
        assert_eq!(config.risk.absolute_ceiling, 25.5);
        assert_eq!(config.default_risk_threshold, 0.8);
        assert_eq!(config.threat_refresh_interval, Duration::from_secs(120));
        assert!(config.threat_feed_url.is_some());
    }

    #[test]
    fn required_variables_are_enforced() {
        for missing in [RP_ID_ENV, RP_ORIGINS_ENV, SESSION_PEPPER_ENV] {
            let vars: Vec<_> = required().into_iter().filter(|(k, _)| *k != missing).collect();
            assert!(matches!(load(&vars), Err(ConfigError::Missing(name)) if name == missing));
        }
    }

    #[test]
    fn short_pepper_is_rejected() {
        let mut vars = required();
        vars.retain(|(k, _)| *k != SESSION_PEPPER_ENV);
        vars.push((SESSION_PEPPER_ENV, "too-short"));
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: SESSION_PEPPER_ENV, .. })
        ));
    }

    #[test]
    fn bad_values_are_rejected() {
        for (name, value) in [
            (CHALLENGE_TTL_SECS_ENV, "soon"),
            (CHALLENGE_TTL_SECS_ENV, "0"),
            (RISK_DEFAULT_THRESHOLD_ENV, "1.5"),
            (RISK_ABSOLUTE_CEILING_ENV, "-1"),
            (MAINTENANCE_INTERVAL_SECS_ENV, "0"),
            (THREAT_FEED_URL_ENV, "not a url"),
        ] {
            let mut vars = required();
            vars.push((name, value));
            assert!(
                matches!(load(&vars), Err(ConfigError::Invalid { .. })),
                "{name}={value} should be rejected"
            );
        }
    }

    #[test]
    fn pepper_is_redacted_in_debug() {
        let config = load(&required()).unwrap();
        assert!(!format!("{config:?}").contains(PEPPER));
    }
}
