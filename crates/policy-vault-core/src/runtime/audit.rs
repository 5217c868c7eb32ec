// crates/policy-vault-core/src/runtime/audit.rs
// ============================================================================
// Module: Policy Vault Audit Logging
// Description: Structured audit events for persistence and field locks.
// Purpose: Emit hash-only JSON-lines audit logs without hard dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every persist attempt and every confirmation change produces one audit
//! event. Events carry identifiers, outcomes, and hashes only; candidate
//! payload values are never logged. Sinks serialize events as JSON lines so
//! deployments can route them to their preferred logging pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::core::Timestamp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Redaction label for events that never include payload values.
pub const REDACTION_HASH_ONLY: &str = "hash_only";

/// Persist audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyPersistEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Owning account.
    pub owner_id: String,
    /// Upper-cased insurer key when the candidate got that far.
    pub insurer_key: Option<String>,
    /// Policy number when the candidate got that far.
    pub policy_number: Option<String>,
    /// Committed policy id.
    pub policy_id: Option<u64>,
    /// Outcome label (`committed` or `rejected`).
    pub outcome: &'static str,
    /// Whether the write updated an existing record.
    pub is_update: Option<bool>,
    /// Committed version.
    pub version: Option<u64>,
    /// Artifact content hash.
    pub artifact_hash: Option<String>,
    /// Whether the artifact write was skipped as a duplicate.
    pub artifact_deduplicated: bool,
    /// Number of normalization warnings.
    pub warning_count: usize,
    /// Error kind labels.
    pub error_kinds: Vec<&'static str>,
    /// Storage attempts used.
    pub attempts: u32,
    /// Redaction classification for payload logging.
    pub redaction: &'static str,
}

/// Field lock audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct FieldLockAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Policy id.
    pub policy_id: u64,
    /// Field name as requested.
    pub field: String,
    /// Action label (`confirm` or `unconfirm`).
    pub action: &'static str,
    /// Whether the registry changed.
    pub changed: bool,
    /// Outcome label (`committed` or `rejected`).
    pub outcome: &'static str,
    /// Error kind label on rejection.
    pub error_kind: Option<&'static str>,
    /// Acting user when provided.
    pub actor: Option<String>,
}

/// Inputs required to construct a persist audit event.
pub struct PolicyPersistEventParams {
    /// Event time.
    pub timestamp: Timestamp,
    /// Owning account.
    pub owner_id: String,
    /// Upper-cased insurer key.
    pub insurer_key: Option<String>,
    /// Policy number.
    pub policy_number: Option<String>,
    /// Committed policy id.
    pub policy_id: Option<u64>,
    /// Committed version.
    pub version: Option<u64>,
    /// Whether the write updated an existing record.
    pub is_update: Option<bool>,
    /// Artifact content hash.
    pub artifact_hash: Option<String>,
    /// Whether the artifact write was skipped as a duplicate.
    pub artifact_deduplicated: bool,
    /// Number of normalization warnings.
    pub warning_count: usize,
    /// Error kind labels; empty on success.
    pub error_kinds: Vec<&'static str>,
    /// Storage attempts used.
    pub attempts: u32,
}

/// Inputs required to construct a field lock audit event.
pub struct FieldLockAuditEventParams {
    /// Event time.
    pub timestamp: Timestamp,
    /// Policy id.
    pub policy_id: u64,
    /// Field name as requested.
    pub field: String,
    /// Action label.
    pub action: &'static str,
    /// Whether the registry changed.
    pub changed: bool,
    /// Error kind label on rejection.
    pub error_kind: Option<&'static str>,
    /// Acting user when provided.
    pub actor: Option<String>,
}

impl PolicyPersistEvent {
    /// Creates a persist audit event.
    #[must_use]
    pub fn new(params: PolicyPersistEventParams) -> Self {
        let outcome = if params.error_kinds.is_empty() { "committed" } else { "rejected" };
        Self {
            event: "policy_persist",
            timestamp_ms: params.timestamp.as_unix_millis(),
            owner_id: params.owner_id,
            insurer_key: params.insurer_key,
            policy_number: params.policy_number,
            policy_id: params.policy_id,
            outcome,
            is_update: params.is_update,
            version: params.version,
            artifact_hash: params.artifact_hash,
            artifact_deduplicated: params.artifact_deduplicated,
            warning_count: params.warning_count,
            error_kinds: params.error_kinds,
            attempts: params.attempts,
            redaction: REDACTION_HASH_ONLY,
        }
    }
}

impl FieldLockAuditEvent {
    /// Creates a field lock audit event.
    #[must_use]
    pub fn new(params: FieldLockAuditEventParams) -> Self {
        let outcome = if params.error_kind.is_none() { "committed" } else { "rejected" };
        Self {
            event: "field_lock",
            timestamp_ms: params.timestamp.as_unix_millis(),
            policy_id: params.policy_id,
            field: params.field,
            action: params.action,
            changed: params.changed,
            outcome,
            error_kind: params.error_kind,
            actor: params.actor,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for persistence events.
pub trait PersistAuditSink: Send + Sync {
    /// Records a persist event.
    fn record_persist(&self, event: &PolicyPersistEvent);

    /// Records a field lock event.
    fn record_field_lock(&self, _event: &FieldLockAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl PersistAuditSink for StderrAuditSink {
    fn record_persist(&self, event: &PolicyPersistEvent) {
        write_stderr(event);
    }

    fn record_field_lock(&self, event: &FieldLockAuditEvent) {
        write_stderr(event);
    }
}

/// Writes one JSON line to stderr, dropping serialization failures.
fn write_stderr<T: Serialize>(event: &T) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = writeln!(std::io::stderr(), "{payload}");
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one JSON line and flushes.
    fn append<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl PersistAuditSink for FileAuditSink {
    fn record_persist(&self, event: &PolicyPersistEvent) {
        self.append(event);
    }

    fn record_field_lock(&self, event: &FieldLockAuditEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl PersistAuditSink for NoopAuditSink {
    fn record_persist(&self, _event: &PolicyPersistEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    fn rejected_params() -> PolicyPersistEventParams {
        PolicyPersistEventParams {
            timestamp: Timestamp::from_unix_millis(1_718_409_600_000),
            owner_id: "owner-1".to_string(),
            insurer_key: None,
            policy_number: None,
            policy_id: None,
            version: None,
            is_update: None,
            artifact_hash: None,
            artifact_deduplicated: false,
            warning_count: 0,
            error_kinds: vec!["validation"],
            attempts: 1,
        }
    }

    #[test]
    fn persist_outcome_follows_error_kinds() {
        let rejected = PolicyPersistEvent::new(rejected_params());
        assert_eq!(rejected.outcome, "rejected");
        assert_eq!(rejected.redaction, REDACTION_HASH_ONLY);

        let committed = PolicyPersistEvent::new(PolicyPersistEventParams {
            error_kinds: Vec::new(),
            ..rejected_params()
        });
        assert_eq!(committed.outcome, "committed");
    }

    #[test]
    fn file_sink_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileAuditSink::new(&path).unwrap();
        sink.record_persist(&PolicyPersistEvent::new(rejected_params()));
        sink.record_field_lock(&FieldLockAuditEvent::new(FieldLockAuditEventParams {
            timestamp: Timestamp::from_unix_millis(0),
            policy_id: 7,
            field: "premium".to_string(),
            action: "confirm",
            changed: true,
            error_kind: None,
            actor: None,
        }));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> =
            contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "policy_persist");
        assert_eq!(lines[0]["error_kinds"][0], "validation");
        assert_eq!(lines[1]["event"], "field_lock");
        assert_eq!(lines[1]["outcome"], "committed");
    }
}
