// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Trust - Wallet Trust Boundary
//!
//! Decides whether a caller is who they claim to be and whether a
//! transaction they request is safe enough to sign.
//!
//! ## Modules
//!
//! - `authn` - Challenge/response credential ceremonies and sessions
//! - `risk` - Behavior profiles, threat cache, and the risk engine
//! - `store` - Keyed store with atomic conditional writes (memory, redb)
//! - `audit` - Audit trail for security decisions
//! - `config` - Environment configuration
//! - `state` - Component wiring
//! - `maintenance` - Expired-state sweeper

pub mod audit;
pub mod authn;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod risk;
pub mod state;
pub mod store;
