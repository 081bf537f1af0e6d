//! Audit events for registry operations.
//!
//! The registry emits one [`AuditEvent`] per public call, whatever its outcome, to the
//! configured [`AuditSink`]. Sinks are best-effort: a failing sink is logged and never turns a
//! successful operation into an error.

use crate::entry::EntryId;
use crate::error::{RegistryError, RegistryErrorKind};
use crate::location::LocationId;
use crate::permissions::{Actor, Operation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Denied,
    Failed { kind: RegistryErrorKind, error: String },
}

impl AuditOutcome {
    pub fn from_result<T>(result: &Result<T, RegistryError>) -> Self {
        match result {
            Ok(_) => AuditOutcome::Success,
            Err(RegistryError::PermissionDenied { .. }) => AuditOutcome::Denied,
            Err(err) => AuditOutcome::Failed {
                kind: err.kind(),
                error: err.to_string(),
            },
        }
    }
}

/// What happened, where, by whom, and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub operation: Operation,
    /// Finer-grained action name, e.g. `versions` or `collect_garbage`, when it differs from
    /// the authorised operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
    pub location_id: LocationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<EntryId>,
    pub actor: Actor,
    pub outcome: AuditOutcome,
    pub at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("failed to encode audit event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

pub trait AuditSink: Send + Sync + std::fmt::Debug {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes each event as one JSON line to the `docreg::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(event)?;
        tracing::info!(target: "docreg::audit", event = %json, "audit");
        Ok(())
    }
}

/// Collects events in memory. Used by tests and embedders that ship events themselves.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    fail: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `record` calls fail without storing the event.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("sink set to fail".into()));
        }
        self.events
            .lock()
            .map_err(|_| AuditError::Unavailable("event buffer lock poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(outcome: AuditOutcome) -> AuditEvent {
        AuditEvent {
            operation: Operation::Register,
            action: None,
            location_id: LocationId::parse("L1").unwrap(),
            entry_id: Some(EntryId::new()),
            actor: Actor::new("doctor", "dr-weber").unwrap(),
            outcome,
            at: Utc::now(),
        }
    }

    #[test]
    fn outcome_classifies_results() {
        let ok: Result<(), RegistryError> = Ok(());
        assert_eq!(AuditOutcome::from_result(&ok), AuditOutcome::Success);

        let denied: Result<(), RegistryError> = Err(RegistryError::PermissionDenied {
            location: "L1".into(),
            role: "assistant".into(),
            operation: Operation::Delete,
        });
        assert_eq!(AuditOutcome::from_result(&denied), AuditOutcome::Denied);

        let conflict: Result<(), RegistryError> = Err(RegistryError::Conflict("busy".into()));
        assert!(matches!(
            AuditOutcome::from_result(&conflict),
            AuditOutcome::Failed {
                kind: RegistryErrorKind::Conflict,
                ..
            }
        ));
    }

    #[test]
    fn event_serialises_as_flat_json() {
        let json = serde_json::to_value(event(AuditOutcome::Denied)).unwrap();

        assert_eq!(json["operation"], "register");
        assert_eq!(json["location_id"], "L1");
        assert_eq!(json["actor"]["role"], "doctor");
        assert_eq!(json["outcome"]["status"], "denied");
        assert!(json.get("action").is_none());
    }

    #[test]
    fn memory_sink_records_until_failing() {
        let sink = MemoryAuditSink::new();
        sink.record(&event(AuditOutcome::Success)).unwrap();

        sink.set_failing(true);
        assert!(sink.record(&event(AuditOutcome::Success)).is_err());

        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn tracing_sink_accepts_events() {
        assert!(TracingAuditSink.record(&event(AuditOutcome::Success)).is_ok());
    }
}
