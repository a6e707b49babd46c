// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit trail for security-sensitive decisions.
//!
//! Ceremony outcomes, counter regressions, session changes, and blocked
//! transactions are recorded through an [`AuditSink`]. Sinks must not fail
//! the operation being audited; write errors are logged and dropped.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{key_segment, JsonStoreExt, KeyedStore, StoreResult};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Credential events
    CredentialRegistered,
    RegistrationRejected,
    CredentialRemoved,

    // Authentication events
    AuthSuccess,
    AuthFailure,
    /// Possible cloned authenticator. Feeds the account-security alert path.
    CounterRegression,

    // Session events
    SessionIssued,
    SessionRevoked,

    // Risk events
    TransactionWarned,
    TransactionBlocked,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// User who triggered the event (if known).
    pub user_id: Option<String>,
    /// Resource affected (credential id, session hash, wallet id).
    pub resource_id: Option<String>,
    /// Resource type (credential, session, wallet).
    pub resource_type: Option<String>,
    /// Additional details as JSON.
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Internal reason if the operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            event_type,
            user_id: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with the internal reason.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Emits audit events as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        match event.event_type {
            AuditEventType::CounterRegression => tracing::error!(
                target: "audit",
                event_id = %event.event_id,
                event_type = ?event.event_type,
                user_id = ?event.user_id,
                resource_id = ?event.resource_id,
                error = ?event.error,
                "Security alert"
            ),
            _ => tracing::info!(
                target: "audit",
                event_id = %event.event_id,
                event_type = ?event.event_type,
                user_id = ?event.user_id,
                resource_id = ?event.resource_id,
                success = event.success,
                error = ?event.error,
                "Audit event"
            ),
        }
    }
}

/// Persists events in the keyed store under `audit/{date}/{timestamp}-{id}`
/// and mirrors them to the log.
pub struct StoreAuditSink {
    store: Arc<dyn KeyedStore>,
}

impl StoreAuditSink {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// Read audit events for a specific date (`%Y-%m-%d`), oldest first.
    pub fn read_events(&self, date: &str) -> StoreResult<Vec<AuditEvent>> {
        let prefix = format!("audit/{}/", key_segment(date));
        Ok(self
            .store
            .scan_json::<AuditEvent>(&prefix)?
            .into_iter()
            .map(|(_, event)| event)
            .collect())
    }

    /// Events for one user on a given date.
    pub fn search_by_user(&self, user_id: &str, date: &str) -> StoreResult<Vec<AuditEvent>> {
        Ok(self
            .read_events(date)?
            .into_iter()
            .filter(|e| e.user_id.as_deref() == Some(user_id))
            .collect())
    }
}

impl AuditSink for StoreAuditSink {
    fn record(&self, event: &AuditEvent) {
        TracingAuditSink.record(event);

        let key = format!(
            "audit/{}/{:020}-{}",
            event.timestamp.format("%Y-%m-%d"),
            event.timestamp.timestamp_micros(),
            event.event_id
        );
        if let Err(e) = self.store.put_json(&key, event) {
            tracing::warn!(error = %e, event_id = %event.event_id, "Failed to persist audit event");
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, event_type: AuditEventType) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    #[test]
    fn builder_sets_fields() {
        let event = AuditEvent::new(AuditEventType::CounterRegression, Utc::now())
            .with_user("user_123")
            .with_resource("credential", "cred_abc")
            .failed("counter 4 <= 9");

        assert_eq!(event.event_type, AuditEventType::CounterRegression);
        assert_eq!(event.user_id, Some("user_123".to_string()));
        assert_eq!(event.resource_type, Some("credential".to_string()));
        assert!(!event.success);
        assert_eq!(event.error, Some("counter 4 <= 9".to_string()));
    }

    #[test]
    fn store_sink_persists_in_order() {
        let store: Arc<dyn KeyedStore> = Arc::new(MemoryStore::new());
        let sink = StoreAuditSink::new(store);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        sink.record(&AuditEvent::new(AuditEventType::SessionIssued, now).with_user("u1"));
        sink.record(
            &AuditEvent::new(AuditEventType::SessionRevoked, now + chrono::Duration::seconds(1))
                .with_user("u2"),
        );

        let date = now.format("%Y-%m-%d").to_string();
        let events = sink.read_events(&date).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::SessionIssued);
        assert_eq!(events[1].event_type, AuditEventType::SessionRevoked);

        let u2 = sink.search_by_user("u2", &date).unwrap();
        assert_eq!(u2.len(), 1);
    }

    #[test]
    fn memory_sink_counts_by_type() {
        let sink = MemoryAuditSink::new();
        sink.record(&AuditEvent::new(AuditEventType::AuthFailure, Utc::now()));
        sink.record(&AuditEvent::new(AuditEventType::AuthFailure, Utc::now()));
        sink.record(&AuditEvent::new(AuditEventType::AuthSuccess, Utc::now()));
        assert_eq!(sink.count(AuditEventType::AuthFailure), 2);
    }
}
