// crates/policy-vault-core/tests/field_locks.rs
// ============================================================================
// Module: Field Lock Tests
// Description: Confirmation, protection, and lock history behavior.
// Purpose: Ensure confirmed fields are never overwritten by ingestion.
// ============================================================================

//! Field confirmation tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;

use policy_vault_core::EngineSettings;
use policy_vault_core::FieldName;
use policy_vault_core::FixedClock;
use policy_vault_core::InMemoryArtifactStore;
use policy_vault_core::InMemoryPolicyStore;
use policy_vault_core::LockAction;
use policy_vault_core::Money;
use policy_vault_core::OwnerId;
use policy_vault_core::PersistAuditSink;
use policy_vault_core::PersistError;
use policy_vault_core::PersistenceEngine;
use policy_vault_core::PolicyId;
use policy_vault_core::ViolationKind;
use policy_vault_core::parse_date;
use policy_vault_core::runtime::FieldLockAuditEvent;
use policy_vault_core::runtime::PolicyPersistEvent;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

#[derive(Default)]
struct LockSink {
    events: Mutex<Vec<FieldLockAuditEvent>>,
}

impl PersistAuditSink for LockSink {
    fn record_persist(&self, _event: &PolicyPersistEvent) {}

    fn record_field_lock(&self, event: &FieldLockAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn engine_with(sink: Arc<LockSink>) -> PersistenceEngine {
    PersistenceEngine::new(
        Arc::new(InMemoryPolicyStore::new()),
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(FixedClock::at_date(parse_date("2024-06-15").unwrap())),
        sink,
        EngineSettings::default(),
    )
}

fn candidate(name: &str, premium: &str) -> Value {
    json!({
        "insurer": "Allianz",
        "policy_number": "AZ-100",
        "insured_name": name,
        "start_date": "2024-03-01",
        "end_date": "2025-03-01",
        "premium": premium,
        "installments": [],
    })
}

fn seeded() -> (PersistenceEngine, Arc<LockSink>, PolicyId) {
    let sink = Arc::new(LockSink::default());
    let engine = engine_with(sink.clone());
    let owner = OwnerId::new("owner-1");
    let first = candidate("Joao Lima", "1.200,00");
    let id = engine.try_persist(&owner, &first, None).unwrap().policy_id;
    (engine, sink, id)
}

// ============================================================================
// SECTION: Protection
// ============================================================================

#[test]
fn confirmed_field_survives_reingestion() {
    let (engine, _sink, id) = seeded();
    let owner = OwnerId::new("owner-1");
    engine.confirm_field(id, "premium", Some("broker@example.com")).unwrap();

    let success =
        engine.try_persist(&owner, &candidate("Joao P. Lima", "9.999,00"), None).unwrap();
    assert_eq!(success.version, 2);

    let record = engine.load(id).unwrap().unwrap();
    assert_eq!(record.header.fields.premium, Some(Money::from_cents(120_000)));
    assert_eq!(record.header.fields.insured_name.as_deref(), Some("Joao P. Lima"));
}

#[test]
fn unconfirmed_field_accepts_new_values_again() {
    let (engine, _sink, id) = seeded();
    let owner = OwnerId::new("owner-1");
    engine.confirm_field(id, "insured_name", None).unwrap();
    assert!(engine.unconfirm_field(id, "insured_name", None).unwrap());

    engine.try_persist(&owner, &candidate("Joao P. Lima", "1.200,00"), None).unwrap();
    let record = engine.load(id).unwrap().unwrap();
    assert_eq!(record.header.fields.insured_name.as_deref(), Some("Joao P. Lima"));
}

#[test]
fn confirming_does_not_bump_the_version() {
    let (engine, _sink, id) = seeded();
    engine.confirm_field(id, "end_date", None).unwrap();
    assert_eq!(engine.load(id).unwrap().unwrap().header.version, 1);
    assert_eq!(engine.list_revisions(id).unwrap().len(), 1);
}

// ============================================================================
// SECTION: Idempotence and History
// ============================================================================

#[test]
fn repeated_confirmation_keeps_the_first_lock() {
    let (engine, sink, id) = seeded();
    let first = engine.confirm_field(id, "phone", Some("ana")).unwrap();
    let second = engine.confirm_field(id, "phone", Some("bruno")).unwrap();
    assert_eq!(first, second);
    assert_eq!(second.confirmed_by.as_deref(), Some("ana"));

    let registry = engine.locked_fields(id).unwrap();
    assert_eq!(registry.fields(), vec![FieldName::Phone]);
    assert_eq!(engine.list_lock_events(id).unwrap().len(), 1);

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].changed);
    assert!(!events[1].changed);
}

#[test]
fn lock_history_is_oldest_first() {
    let (engine, _sink, id) = seeded();
    engine.confirm_field(id, "coverages", Some("ana")).unwrap();
    assert!(engine.unconfirm_field(id, "coverages", Some("ana")).unwrap());
    assert!(!engine.unconfirm_field(id, "coverages", Some("ana")).unwrap());

    let history = engine.list_lock_events(id).unwrap();
    let actions: Vec<LockAction> = history.iter().map(|event| event.action).collect();
    assert_eq!(actions, vec![LockAction::Confirm, LockAction::Unconfirm]);
    assert!(engine.locked_fields(id).unwrap().is_empty());
}

// ============================================================================
// SECTION: Errors
// ============================================================================

#[test]
fn unknown_and_key_fields_are_rejected() {
    let (engine, sink, id) = seeded();
    for field in ["colour", "policy_number", "insurer"] {
        let err = engine.confirm_field(id, field, None).unwrap_err();
        let PersistError::Validation(validation) = err else {
            panic!("expected validation error for {field}");
        };
        assert_eq!(validation.violations[0].kind, ViolationKind::UnknownField);
    }
    assert!(engine.locked_fields(id).unwrap().is_empty());
    let events = sink.events.lock().unwrap();
    assert!(events.iter().all(|event| event.outcome == "rejected"));
}

#[test]
fn unknown_policy_is_not_found() {
    let (engine, _sink, _id) = seeded();
    let missing = PolicyId::from_raw(999).unwrap();
    assert!(matches!(
        engine.confirm_field(missing, "premium", None),
        Err(PersistError::PolicyNotFound(_))
    ));
    assert!(matches!(
        engine.unconfirm_field(missing, "premium", None),
        Err(PersistError::PolicyNotFound(_))
    ));
    assert!(matches!(engine.locked_fields(missing), Err(PersistError::PolicyNotFound(_))));
}
