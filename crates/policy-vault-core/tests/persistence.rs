// crates/policy-vault-core/tests/persistence.rs
// ============================================================================
// Module: Persistence Engine Tests
// Description: Idempotent upsert, guard, sub-entity, and artifact behavior.
// Purpose: Validate the transactional write path against the in-memory store.
// ============================================================================

//! ## Overview
//! Exercises [`PersistenceEngine`] end to end with in-memory collaborators:
//! idempotent upsert, no-erasure updates, atomic child replacement,
//! installment synthesis, artifact dedup and retries, and concurrency.

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
use std::sync::mpsc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use policy_vault_core::ArtifactError;
use policy_vault_core::ArtifactPath;
use policy_vault_core::ArtifactStore;
use policy_vault_core::EngineSettings;
use policy_vault_core::FixedClock;
use policy_vault_core::HashDigest;
use policy_vault_core::InMemoryArtifactStore;
use policy_vault_core::InMemoryPolicyStore;
use policy_vault_core::InstallmentStatus;
use policy_vault_core::Money;
use policy_vault_core::NoopAuditSink;
use policy_vault_core::OwnerId;
use policy_vault_core::PersistAuditSink;
use policy_vault_core::PersistError;
use policy_vault_core::PersistenceEngine;
use policy_vault_core::PolicyStatus;
use policy_vault_core::PolicyStore;
use policy_vault_core::RetryPolicy;
use policy_vault_core::ViolationKind;
use policy_vault_core::parse_date;
use policy_vault_core::runtime::PolicyPersistEvent;
use policy_vault_core::runtime::WarningCode;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

#[derive(Default)]
struct RecordingSink {
    persists: Mutex<Vec<PolicyPersistEvent>>,
}

impl PersistAuditSink for RecordingSink {
    fn record_persist(&self, event: &PolicyPersistEvent) {
        self.persists.lock().unwrap().push(event.clone());
    }
}

struct Harness {
    engine: PersistenceEngine,
    artifacts: Arc<InMemoryArtifactStore>,
    audit: Arc<RecordingSink>,
}

fn harness() -> Harness {
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let audit = Arc::new(RecordingSink::default());
    let settings = EngineSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        },
        ..EngineSettings::default()
    };
    let engine = PersistenceEngine::new(
        Arc::new(InMemoryPolicyStore::new()),
        artifacts.clone(),
        Arc::new(FixedClock::at_date(parse_date("2024-06-15").unwrap())),
        audit.clone(),
        settings,
    );
    Harness {
        engine,
        artifacts,
        audit,
    }
}

fn owner() -> OwnerId {
    OwnerId::new("owner-1")
}

fn candidate() -> Value {
    json!({
        "insurer": "Porto Seguro",
        "policy_number": "0531-778",
        "insured_name": "Maria Souza",
        "phone": "11 99999-0000",
        "start_date": "2024-01-10",
        "end_date": "2025-01-10",
        "premium": "4.200,00",
        "monthly_amount": "350,00",
        "coverages": ["Colisao", "Roubo"],
    })
}

fn with(mut base: Value, key: &str, value: Value) -> Value {
    base.as_object_mut().unwrap().insert(key.to_string(), value);
    base
}

fn without(mut base: Value, key: &str) -> Value {
    base.as_object_mut().unwrap().remove(key);
    base
}

// ============================================================================
// SECTION: Upsert
// ============================================================================

#[test]
fn identical_payload_twice_yields_one_record_at_version_two() {
    let h = harness();
    let first = h.engine.try_persist(&owner(), &candidate(), None).unwrap();
    let second = h.engine.try_persist(&owner(), &candidate(), None).unwrap();

    assert!(!first.is_update);
    assert_eq!(first.version, 1);
    assert!(second.is_update);
    assert_eq!(second.version, 2);
    assert_eq!(first.policy_id, second.policy_id);
    assert_eq!(h.engine.list_by_owner(&owner()).unwrap().len(), 1);
    assert_eq!(h.engine.list_revisions(first.policy_id).unwrap().len(), 2);
}

#[test]
fn natural_key_matching_ignores_insurer_case_and_padding() {
    let h = harness();
    let first = h.engine.try_persist(&owner(), &candidate(), None).unwrap();
    let shouted = with(candidate(), "insurer", json!("  PORTO SEGURO "));
    let second = h.engine.try_persist(&owner(), &shouted, None).unwrap();
    assert_eq!(first.policy_id, second.policy_id);

    let found = h.engine.find_by_key(&owner(), "porto seguro", "0531-778").unwrap().unwrap();
    assert_eq!(found.header.insurer, "Porto Seguro");
    let other = OwnerId::new("owner-2");
    assert!(h.engine.find_by_key(&other, "Porto Seguro", "0531-778").unwrap().is_none());
}

#[test]
fn status_is_derived_on_write() {
    let h = harness();
    let expiring = with(candidate(), "end_date", json!("2024-06-20"));
    let success = h.engine.try_persist(&owner(), &expiring, None).unwrap();
    assert_eq!(success.status, PolicyStatus::Vencendo);
}

#[test]
fn absent_fields_never_erase_stored_values() {
    let h = harness();
    let id = h.engine.try_persist(&owner(), &candidate(), None).unwrap().policy_id;
    let sparse = without(without(candidate(), "phone"), "coverages");
    let sparse = with(sparse, "insured_name", json!("  "));
    h.engine.try_persist(&owner(), &sparse, None).unwrap();

    let record = h.engine.load(id).unwrap().unwrap();
    assert_eq!(record.header.fields.phone.as_deref(), Some("11 99999-0000"));
    assert_eq!(record.header.fields.insured_name.as_deref(), Some("Maria Souza"));
    assert_eq!(record.coverages.len(), 2);
}

#[test]
fn update_dates_fall_back_to_stored_values_before_order_check() {
    let h = harness();
    let id = h.engine.try_persist(&owner(), &candidate(), None).unwrap().policy_id;
    let only_end = without(with(candidate(), "end_date", json!("2025-02-10")), "start_date");
    h.engine.try_persist(&owner(), &only_end, None).unwrap();
    let record = h.engine.load(id).unwrap().unwrap();
    assert_eq!(record.header.start_date, parse_date("2024-01-10").unwrap());
    assert_eq!(record.header.end_date, parse_date("2025-02-10").unwrap());

    let inverted = without(with(candidate(), "end_date", json!("2023-12-31")), "start_date");
    let err = h.engine.try_persist(&owner(), &inverted, None).unwrap_err();
    assert!(matches!(err, PersistError::Validation(_)));
    assert_eq!(h.engine.load(id).unwrap().unwrap().header.version, 2);
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn validation_failure_reports_fields_and_writes_nothing() {
    let h = harness();
    let bad = without(candidate(), "insurer");
    let report = h.engine.persist(&owner(), &bad, Some(b"%PDF"));

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ViolationKind::MissingRequiredField.as_str());
    assert_eq!(report.errors[0].field.as_deref(), Some("insurer"));
    assert!(h.engine.list_by_owner(&owner()).unwrap().is_empty());
    assert_eq!(h.artifacts.write_count(), 0);

    let events = h.audit.persists.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, "rejected");
    assert_eq!(events[0].error_kinds, vec!["validation_error"]);
}

#[test]
fn insert_without_dates_defaults_to_today_and_fails_order_check() {
    let h = harness();
    let undated = without(without(candidate(), "start_date"), "end_date");
    let err = h.engine.try_persist(&owner(), &undated, None).unwrap_err();
    let PersistError::Validation(validation) = err else {
        panic!("expected validation error");
    };
    assert_eq!(validation.violations[0].kind, ViolationKind::InvalidDateOrder);
    assert!(h.engine.list_by_owner(&owner()).unwrap().is_empty());
}

#[test]
fn insert_with_missing_start_defaults_with_warning() {
    let h = harness();
    let no_start = without(candidate(), "start_date");
    let success = h.engine.try_persist(&owner(), &no_start, None).unwrap();
    assert!(success.warnings.iter().any(|w| w.code == WarningCode::DateDefaulted));
    let record = h.engine.load(success.policy_id).unwrap().unwrap();
    assert_eq!(record.header.start_date, parse_date("2024-06-15").unwrap());
}

#[test]
fn uninterpretable_vehicle_year_does_not_block_ingestion() {
    let h = harness();
    let report = h.engine.persist(&owner(), &with(candidate(), "vehicle_year", json!("n/d")), None);
    assert!(report.success);
    assert!(report.warnings.iter().any(|w| w.code == WarningCode::ValueDropped));

    let model_year = with(candidate(), "vehicle_year", json!("2024/2025"));
    let success = h.engine.try_persist(&owner(), &model_year, None).unwrap();
    let record = h.engine.load(success.policy_id).unwrap().unwrap();
    assert_eq!(record.header.fields.vehicle_year, Some(2025));
}

// ============================================================================
// SECTION: Sub-Entities
// ============================================================================

#[test]
fn monthly_amount_without_schedule_synthesizes_twelve_installments() {
    let h = harness();
    let id = h.engine.try_persist(&owner(), &candidate(), None).unwrap().policy_id;
    let installments = h.engine.load(id).unwrap().unwrap().installments;

    assert_eq!(installments.len(), 12);
    assert_eq!(installments[0].sequence, 1);
    assert_eq!(installments[0].due_date, parse_date("2024-01-10").unwrap());
    assert_eq!(installments[11].sequence, 12);
    assert_eq!(installments[11].due_date, parse_date("2024-12-10").unwrap());
    assert!(installments.iter().all(|item| item.amount == Money::from_cents(35_000)));
}

#[test]
fn explicit_installment_count_is_honored() {
    let h = harness();
    let counted = with(candidate(), "installment_count", json!(10));
    let id = h.engine.try_persist(&owner(), &counted, None).unwrap().policy_id;
    assert_eq!(h.engine.load(id).unwrap().unwrap().installments.len(), 10);
}

#[test]
fn paid_schedule_survives_reingestion_without_installments() {
    let h = harness();
    let paid = with(
        candidate(),
        "installments",
        json!([
            {"sequence": 1, "amount": "350,00", "due_date": "2024-01-10", "status": "paid"},
            {"sequence": 2, "amount": "350,00", "due_date": "2024-02-10"},
        ]),
    );
    let id = h.engine.try_persist(&owner(), &paid, None).unwrap().policy_id;
    h.engine.try_persist(&owner(), &candidate(), None).unwrap();

    let installments = h.engine.load(id).unwrap().unwrap().installments;
    assert_eq!(installments.len(), 2);
    assert_eq!(installments[0].status, InstallmentStatus::Paid);
}

#[test]
fn supplied_upcoming_schedule_is_kept_when_later_omitted() {
    let h = harness();
    let supplied = with(
        candidate(),
        "installments",
        json!([
            {"sequence": 1, "amount": "400,00", "due_date": "2024-01-10"},
            {"sequence": 2, "amount": "400,00", "due_date": "2024-02-10"},
            {"sequence": 3, "amount": "400,00", "due_date": "2024-03-10"},
        ]),
    );
    let id = h.engine.try_persist(&owner(), &supplied, None).unwrap().policy_id;
    h.engine.try_persist(&owner(), &candidate(), None).unwrap();

    let installments = h.engine.load(id).unwrap().unwrap().installments;
    assert_eq!(installments.len(), 3);
    assert!(installments.iter().all(|item| item.status == InstallmentStatus::Upcoming));
    assert!(installments.iter().all(|item| item.amount == Money::from_cents(40_000)));
}

#[test]
fn coverage_replacement_is_atomic_for_concurrent_readers() {
    let h = harness();
    let id = h.engine.try_persist(&owner(), &candidate(), None).unwrap().policy_id;
    let done = AtomicBool::new(false);
    let replaced = with(candidate(), "coverages", json!(["Incendio"]));

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut observations = 0_u32;
            while !done.load(Ordering::SeqCst) || observations == 0 {
                let record = h.engine.load(id).unwrap().unwrap();
                let names: Vec<&str> =
                    record.coverages.iter().map(|c| c.description.as_str()).collect();
                assert!(
                    names == ["Colisao", "Roubo"] || names == ["Incendio"],
                    "torn read: {names:?}"
                );
                observations += 1;
            }
        });
        for _ in 0 .. 20 {
            h.engine.try_persist(&owner(), &replaced, None).unwrap();
        }
        done.store(true, Ordering::SeqCst);
        reader.join().unwrap();
    });

    let names: Vec<String> =
        h.engine.load(id).unwrap().unwrap().coverages.into_iter().map(|c| c.description).collect();
    assert_eq!(names, vec!["Incendio".to_string()]);
}

#[test]
fn explicit_empty_coverage_list_clears_coverages() {
    let h = harness();
    let id = h.engine.try_persist(&owner(), &candidate(), None).unwrap().policy_id;
    h.engine.try_persist(&owner(), &with(candidate(), "coverages", json!([])), None).unwrap();
    assert!(h.engine.load(id).unwrap().unwrap().coverages.is_empty());
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[test]
fn concurrent_first_ingestions_converge_on_one_record() {
    let h = harness();
    let versions: Vec<u64> = thread::scope(|scope| {
        let handles: Vec<_> = (0 .. 8)
            .map(|_| scope.spawn(|| h.engine.try_persist(&owner(), &candidate(), None).unwrap()))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap().version).collect()
    });

    let records = h.engine.list_by_owner(&owner()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].header.version, 8);
    let mut sorted = versions;
    sorted.sort_unstable();
    assert_eq!(sorted, (1 ..= 8).collect::<Vec<u64>>());
}

// ============================================================================
// SECTION: Artifacts
// ============================================================================

#[test]
fn unchanged_artifact_is_not_rewritten() {
    let h = harness();
    let first = h.engine.try_persist(&owner(), &candidate(), Some(b"%PDF-1.7 a")).unwrap();
    let second = h.engine.try_persist(&owner(), &candidate(), Some(b"%PDF-1.7 a")).unwrap();
    assert!(!first.artifact_deduplicated);
    assert!(second.artifact_deduplicated);
    assert_eq!(second.version, 2);
    assert_eq!(h.artifacts.write_count(), 1);

    let third = h.engine.try_persist(&owner(), &candidate(), Some(b"%PDF-1.7 b")).unwrap();
    assert!(!third.artifact_deduplicated);
    assert_eq!(h.artifacts.write_count(), 2);
    let record = h.engine.load(third.policy_id).unwrap().unwrap();
    let path = record.header.artifact_path.unwrap();
    assert_eq!(h.artifacts.get(&path).unwrap(), b"%PDF-1.7 b");
}

#[test]
fn transient_artifact_failures_are_retried() {
    let h = harness();
    h.artifacts.fail_next(2);
    let success = h.engine.try_persist(&owner(), &candidate(), Some(b"%PDF")).unwrap();
    let record = h.engine.load(success.policy_id).unwrap().unwrap();
    assert!(record.header.artifact_hash.is_some());
}

#[test]
fn exhausted_artifact_retries_commit_nothing() {
    let h = harness();
    h.artifacts.fail_next(5);
    let err = h.engine.try_persist(&owner(), &candidate(), Some(b"%PDF")).unwrap_err();
    assert_eq!(err.kind(), "artifact_error");
    assert!(h.engine.list_by_owner(&owner()).unwrap().is_empty());
}

/// Artifact store that checks the policy store stays readable during writes.
struct ReadCheckingArtifacts {
    policies: Arc<InMemoryPolicyStore>,
    inner: InMemoryArtifactStore,
    readable: Mutex<Vec<bool>>,
}

impl ArtifactStore for ReadCheckingArtifacts {
    fn store(&self, bytes: &[u8], digest: &HashDigest) -> Result<ArtifactPath, ArtifactError> {
        let (sender, receiver) = mpsc::channel();
        let policies = Arc::clone(&self.policies);
        thread::spawn(move || {
            let _ = sender.send(policies.list_by_owner(&owner()).is_ok());
        });
        let readable = receiver.recv_timeout(Duration::from_secs(2)).unwrap_or(false);
        self.readable.lock().unwrap().push(readable);
        self.inner.store(bytes, digest)
    }
}

#[test]
fn artifact_writes_happen_outside_the_store_transaction() {
    let policies = Arc::new(InMemoryPolicyStore::new());
    let artifacts = Arc::new(ReadCheckingArtifacts {
        policies: Arc::clone(&policies),
        inner: InMemoryArtifactStore::new(),
        readable: Mutex::new(Vec::new()),
    });
    let engine = PersistenceEngine::new(
        policies,
        artifacts.clone(),
        Arc::new(FixedClock::at_date(parse_date("2024-06-15").unwrap())),
        Arc::new(NoopAuditSink),
        EngineSettings::default(),
    );
    engine.try_persist(&owner(), &candidate(), Some(b"%PDF-1.7 a")).unwrap();
    let second = engine.try_persist(&owner(), &candidate(), Some(b"%PDF-1.7 b")).unwrap();

    assert!(second.is_update);
    assert_eq!(*artifacts.readable.lock().unwrap(), vec![true, true]);
}

// ============================================================================
// SECTION: Revisions
// ============================================================================

#[test]
fn revisions_are_newest_first_with_snapshots() {
    let h = harness();
    let id = h.engine.try_persist(&owner(), &candidate(), None).unwrap().policy_id;
    let phone = with(candidate(), "phone", json!("11 3333-4444"));
    h.engine.try_persist(&owner(), &phone, None).unwrap();

    let revisions = h.engine.list_revisions(id).unwrap();
    assert_eq!(revisions[0].version, 2);
    assert_eq!(revisions[1].version, 1);
    assert_eq!(revisions[0].snapshot["header"]["fields"]["phone"], json!("11 3333-4444"));
    assert!(revisions[0].snapshot_hash.is_well_formed());

    let report = serde_json::to_value(h.engine.persist(&owner(), &candidate(), None)).unwrap();
    assert_eq!(report["success"], json!(true));
    assert_eq!(report["version"], json!(3));
}
