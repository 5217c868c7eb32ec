// crates/policy-vault-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Policy Store Tests
// Description: Durability, integrity, and concurrency of the SQLite store.
// Purpose: Validate the persistence engine against a real database file.
// ============================================================================

//! ## Overview
//! Runs the persistence engine over [`SqlitePolicyStore`] and verifies
//! reopen durability, natural-key integrity, digest verification, lock
//! storage, revision retention, and concurrent writers on one file.

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

use std::path::Path;
use std::sync::Arc;
use std::thread;

use policy_vault_core::EngineSettings;
use policy_vault_core::FieldName;
use policy_vault_core::FixedClock;
use policy_vault_core::InMemoryArtifactStore;
use policy_vault_core::InstallmentStatus;
use policy_vault_core::Money;
use policy_vault_core::NoopAuditSink;
use policy_vault_core::OwnerId;
use policy_vault_core::PersistError;
use policy_vault_core::PersistenceEngine;
use policy_vault_core::PolicyStatus;
use policy_vault_core::StoreError;
use policy_vault_core::parse_date;
use policy_vault_store_sqlite::SqlitePolicyStore;
use policy_vault_store_sqlite::SqliteStoreConfig;
use policy_vault_store_sqlite::SqliteStoreError;
use rusqlite::Connection;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open_store(path: &Path) -> SqlitePolicyStore {
    SqlitePolicyStore::new(SqliteStoreConfig::new(path.to_path_buf())).unwrap()
}

fn engine_over(store: SqlitePolicyStore) -> PersistenceEngine {
    PersistenceEngine::new(
        Arc::new(store),
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(FixedClock::at_date(parse_date("2024-06-15").unwrap())),
        Arc::new(NoopAuditSink),
        EngineSettings::default(),
    )
}

fn candidate() -> Value {
    json!({
        "insurer": "Porto Seguro",
        "policy_number": "PS-2024-001",
        "insured_name": "Maria Souza",
        "insured_document": "123.456.789-09",
        "start_date": "2024-01-10",
        "end_date": "2025-01-10",
        "premium": "R$ 4.200,00",
        "monthly_amount": "R$ 350,00",
        "coverages": [
            {"name": "Colisao", "limit": "80.000,00"},
            "Assistencia 24h",
        ],
    })
}

fn db_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("vault").join("policies.db")
}

// ============================================================================
// SECTION: Durability
// ============================================================================

#[test]
fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let owner = OwnerId::new("owner-1");
    let policy_id = {
        let engine = engine_over(open_store(&path));
        engine.try_persist(&owner, &candidate(), Some(b"%PDF-1.7")).unwrap().policy_id
    };

    let engine = engine_over(open_store(&path));
    let record = engine.load(policy_id).unwrap().unwrap();
    assert_eq!(record.header.insurer, "Porto Seguro");
    assert_eq!(record.header.insurer_key, "PORTO SEGURO");
    assert_eq!(record.header.fields.premium, Some(Money::from_cents(420_000)));
    assert_eq!(record.header.status, PolicyStatus::Vigente);
    assert_eq!(record.coverages.len(), 2);
    assert_eq!(record.coverages[0].limit, Some(Money::from_cents(8_000_000)));
    assert_eq!(record.coverages[1].description, "Assistencia 24h");
    assert_eq!(record.installments.len(), 12);
    assert!(record.installments.iter().all(|item| item.status == InstallmentStatus::Upcoming));
    assert!(record.header.artifact_path.is_some());

    let found = engine.find_by_key(&owner, " porto seguro ", "PS-2024-001").unwrap().unwrap();
    assert_eq!(found.policy_id, policy_id);
    assert_eq!(engine.list_by_owner(&owner).unwrap().len(), 1);
    assert!(engine.list_by_owner(&OwnerId::new("owner-2")).unwrap().is_empty());
}

#[test]
fn repeated_ingestion_updates_in_place() {
    let dir = TempDir::new().unwrap();
    let engine = engine_over(open_store(&db_path(&dir)));
    let owner = OwnerId::new("owner-1");
    let first = engine.try_persist(&owner, &candidate(), None).unwrap();
    let second = engine.try_persist(&owner, &candidate(), None).unwrap();
    assert!(!first.is_update);
    assert!(second.is_update);
    assert_eq!(first.policy_id, second.policy_id);
    assert_eq!(second.version, 2);

    let revisions = engine.list_revisions(first.policy_id).unwrap();
    let versions: Vec<u64> = revisions.iter().map(|revision| revision.version).collect();
    assert_eq!(versions, vec![2, 1]);
    assert_eq!(revisions[0].snapshot["header"]["policy_number"], "PS-2024-001");
}

#[test]
fn revision_retention_prunes_oldest() {
    let dir = TempDir::new().unwrap();
    let mut config = SqliteStoreConfig::new(db_path(&dir));
    config.max_revisions = Some(2);
    let engine = engine_over(SqlitePolicyStore::new(config).unwrap());
    let owner = OwnerId::new("owner-1");
    let mut policy_id = None;
    for _ in 0 .. 3 {
        policy_id = Some(engine.try_persist(&owner, &candidate(), None).unwrap().policy_id);
    }
    let revisions = engine.list_revisions(policy_id.unwrap()).unwrap();
    let versions: Vec<u64> = revisions.iter().map(|revision| revision.version).collect();
    assert_eq!(versions, vec![3, 2]);
}

// ============================================================================
// SECTION: Integrity
// ============================================================================

#[test]
fn tampered_snapshot_fails_closed() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let engine = engine_over(open_store(&path));
    let owner = OwnerId::new("owner-1");
    let policy_id = engine.try_persist(&owner, &candidate(), None).unwrap().policy_id;

    let raw = Connection::open(&path).unwrap();
    raw.execute(
        "UPDATE policy_revisions SET snapshot_json = CAST(?1 AS BLOB)",
        [r#"{"policy_number":"forged"}"#],
    )
    .unwrap();

    let err = engine.list_revisions(policy_id).unwrap_err();
    assert!(matches!(err, PersistError::Storage(StoreError::Corrupt(_))));
}

#[test]
fn duplicate_natural_key_is_an_integrity_fault() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let engine = engine_over(open_store(&path));
    let owner = OwnerId::new("owner-1");
    engine.try_persist(&owner, &candidate(), None).unwrap();

    let raw = Connection::open(&path).unwrap();
    raw.execute_batch(
        "DROP INDEX idx_policies_natural_key;
         INSERT INTO policies (owner_id, insurer, insurer_key, policy_number, insured_name,
             insured_document, document_type, phone, email, premium_cents,
             monthly_amount_cents, deductible_cents, vehicle_model, vehicle_plate,
             vehicle_year, start_date, end_date, status, artifact_hash, artifact_path,
             version, provenance, created_at, updated_at, extracted_at)
         SELECT owner_id, insurer, insurer_key, policy_number, insured_name,
             insured_document, document_type, phone, email, premium_cents,
             monthly_amount_cents, deductible_cents, vehicle_model, vehicle_plate,
             vehicle_year, start_date, end_date, status, artifact_hash, artifact_path,
             version, provenance, created_at, updated_at, extracted_at
         FROM policies;",
    )
    .unwrap();

    assert!(matches!(
        engine.find_by_key(&owner, "Porto Seguro", "PS-2024-001"),
        Err(PersistError::IntegrityFault { count: 2, .. })
    ));
    let report = engine.persist(&owner, &candidate(), None);
    assert!(!report.success);
    assert_eq!(report.errors[0].kind, "integrity_fault");
}

#[test]
fn schema_version_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    drop(open_store(&path));
    let raw = Connection::open(&path).unwrap();
    raw.execute("UPDATE store_meta SET version = 99", []).unwrap();
    drop(raw);

    let result = SqlitePolicyStore::new(SqliteStoreConfig::new(path));
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

// ============================================================================
// SECTION: Field Locks
// ============================================================================

#[test]
fn locks_and_history_persist() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let owner = OwnerId::new("owner-1");
    let policy_id = {
        let engine = engine_over(open_store(&path));
        let id = engine.try_persist(&owner, &candidate(), None).unwrap().policy_id;
        engine.confirm_field(id, "premium", Some("broker")).unwrap();
        engine.confirm_field(id, "insured_name", None).unwrap();
        assert!(engine.unconfirm_field(id, "insured_name", None).unwrap());
        id
    };

    let engine = engine_over(open_store(&path));
    let registry = engine.locked_fields(policy_id).unwrap();
    assert_eq!(registry.fields(), vec![FieldName::Premium]);
    assert_eq!(
        registry.get(FieldName::Premium).unwrap().confirmed_by.as_deref(),
        Some("broker")
    );
    assert_eq!(engine.list_lock_events(policy_id).unwrap().len(), 3);

    let mut changed = candidate();
    changed["premium"] = json!("R$ 9.999,00");
    engine.try_persist(&owner, &changed, None).unwrap();
    let record = engine.load(policy_id).unwrap().unwrap();
    assert_eq!(record.header.fields.premium, Some(Money::from_cents(420_000)));
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

#[test]
fn invalid_configs_are_rejected() {
    let dir = TempDir::new().unwrap();
    let directory = SqliteStoreConfig::new(dir.path().to_path_buf());
    assert!(matches!(SqlitePolicyStore::new(directory), Err(SqliteStoreError::Invalid(_))));

    let overlong = SqliteStoreConfig::new(dir.path().join("a".repeat(300)));
    assert!(matches!(SqlitePolicyStore::new(overlong), Err(SqliteStoreError::Invalid(_))));

    let mut zero = SqliteStoreConfig::new(db_path(&dir));
    zero.max_revisions = Some(0);
    assert!(matches!(SqlitePolicyStore::new(zero), Err(SqliteStoreError::Invalid(_))));
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[test]
fn concurrent_writers_on_one_file_converge() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let engines: Vec<PersistenceEngine> =
        (0 .. 2).map(|_| engine_over(open_store(&path))).collect();
    let owner = OwnerId::new("owner-1");

    thread::scope(|scope| {
        for engine in &engines {
            for _ in 0 .. 3 {
                let owner = owner.clone();
                scope.spawn(move || {
                    engine.try_persist(&owner, &candidate(), None).unwrap();
                });
            }
        }
    });

    let records = engines[0].list_by_owner(&owner).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].header.version, 6);
    assert_eq!(engines[1].list_revisions(records[0].policy_id).unwrap().len(), 6);
}
