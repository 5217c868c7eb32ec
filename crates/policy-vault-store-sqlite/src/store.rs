// crates/policy-vault-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Policy Store
// Description: Durable PolicyStore backed by SQLite.
// Purpose: Persist policy records, locks, and revisions transactionally.
// Dependencies: policy-vault-core, rusqlite, serde, thiserror, time
// ============================================================================

//! ## Overview
//! This module implements a durable [`PolicyStore`] using `SQLite`. Policy
//! headers, coverages, installments, field locks, lock events, and revision
//! snapshots live in separate tables tied together by `policy_id`.
//!
//! Writers go through a single connection and open `BEGIN IMMEDIATE`
//! transactions, so concurrent ingestions of the same natural key serialize
//! at the database. A unique index on `(owner_id, insurer_key, policy_number)`
//! backs key uniqueness. Reads use a separate connection and, under WAL, only
//! ever observe committed state.
//!
//! Security posture: database contents are untrusted; revision snapshots are
//! verified against their stored digest and fail closed on mismatch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use policy_vault_core::ArtifactPath;
use policy_vault_core::CoverageItem;
use policy_vault_core::FieldLock;
use policy_vault_core::FieldLockEvent;
use policy_vault_core::FieldName;
use policy_vault_core::HashAlgorithm;
use policy_vault_core::HashDigest;
use policy_vault_core::InstallmentItem;
use policy_vault_core::LockAction;
use policy_vault_core::LockRegistry;
use policy_vault_core::Money;
use policy_vault_core::NaturalKey;
use policy_vault_core::OwnerId;
use policy_vault_core::PolicyFields;
use policy_vault_core::PolicyHeader;
use policy_vault_core::PolicyId;
use policy_vault_core::PolicyRecord;
use policy_vault_core::PolicyRevision;
use policy_vault_core::PolicyStore;
use policy_vault_core::PolicyTransaction;
use policy_vault_core::StoreError;
use policy_vault_core::Timestamp;
use policy_vault_core::format_iso_date;
use policy_vault_core::parse_date;
use policy_vault_core::runtime::revisions::decode_snapshot;
use policy_vault_core::runtime::revisions::snapshot_bytes;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Params;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use thiserror::Error;
use time::Date;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Policy header projection; `policy_id` first, then columns in bind order.
const SELECT_POLICIES: &str = "SELECT policy_id, owner_id, insurer, insurer_key, policy_number, \
                               insured_name, insured_document, document_type, phone, email, \
                               premium_cents, monthly_amount_cents, deductible_cents, \
                               vehicle_model, vehicle_plate, vehicle_year, start_date, end_date, \
                               status, artifact_hash, artifact_path, version, provenance, \
                               created_at, updated_at, extracted_at FROM policies";

/// Insert statement for a policy header.
const INSERT_POLICY: &str = "INSERT INTO policies (owner_id, insurer, insurer_key, \
                             policy_number, insured_name, insured_document, document_type, \
                             phone, email, premium_cents, monthly_amount_cents, \
                             deductible_cents, vehicle_model, vehicle_plate, vehicle_year, \
                             start_date, end_date, status, artifact_hash, artifact_path, \
                             version, provenance, created_at, updated_at, extracted_at) VALUES \
                             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                             ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)";

/// Update statement for a policy header; `?26` is the policy id.
const UPDATE_POLICY: &str = "UPDATE policies SET owner_id = ?1, insurer = ?2, insurer_key = ?3, \
                             policy_number = ?4, insured_name = ?5, insured_document = ?6, \
                             document_type = ?7, phone = ?8, email = ?9, premium_cents = ?10, \
                             monthly_amount_cents = ?11, deductible_cents = ?12, \
                             vehicle_model = ?13, vehicle_plate = ?14, vehicle_year = ?15, \
                             start_date = ?16, end_date = ?17, status = ?18, \
                             artifact_hash = ?19, artifact_path = ?20, version = ?21, \
                             provenance = ?22, created_at = ?23, updated_at = ?24, \
                             extracted_at = ?25 WHERE policy_id = ?26";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` policy store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `max_revisions`, when set, must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Optional maximum revisions kept per policy (older ones pruned).
    #[serde(default)]
    pub max_revisions: Option<u64>,
}

impl SqliteStoreConfig {
    /// Returns a config with defaults for the given database path.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::Wal,
            sync_mode: SqliteSyncMode::Full,
            max_revisions: None,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding policy field values.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Database is busy or locked by another writer.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// Uniqueness constraint violated.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Referenced policy does not exist.
    #[error("sqlite store record not found: {0}")]
    NotFound(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Busy(message) => Self::Busy(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
        }
    }
}

/// Classifies a `rusqlite` error.
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                SqliteStoreError::Busy(err.to_string())
            }
            ErrorCode::ConstraintViolation => SqliteStoreError::Conflict(err.to_string()),
            _ => SqliteStoreError::Db(err.to_string()),
        },
        _ => SqliteStoreError::Db(err.to_string()),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed policy store with WAL support.
///
/// # Invariants
/// - Write transactions hold the writer mutex for their whole lifetime.
/// - Revision reads verify stored digests before returning snapshots.
#[derive(Clone)]
pub struct SqlitePolicyStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Reader connection guarded by a mutex.
    read_connection: Arc<Mutex<Connection>>,
}

impl SqlitePolicyStore {
    /// Opens an `SQLite`-backed policy store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        if config.max_revisions == Some(0) {
            return Err(SqliteStoreError::Invalid(
                "max_revisions must be greater than zero".to_string(),
            ));
        }
        ensure_parent_dir(&config.path)?;
        let mut write_connection = open_connection(&config)?;
        initialize_schema(&mut write_connection)?;
        let read_connection = open_connection(&config)?;
        Ok(Self {
            config,
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connection: Arc::new(Mutex::new(read_connection)),
        })
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Runs `read` inside one read transaction on the reader connection.
    fn read<T>(
        &self,
        read: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let connection = self
            .read_connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite read mutex poisoned".to_string()))?;
        let tx = connection.unchecked_transaction().map_err(db_error)?;
        let value = read(&tx)?;
        tx.commit().map_err(db_error)?;
        Ok(value)
    }
}

impl PolicyStore for SqlitePolicyStore {
    fn begin(&self) -> Result<Box<dyn PolicyTransaction + '_>, StoreError> {
        let connection = self
            .write_connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite write mutex poisoned".to_string()))?;
        connection.execute_batch("BEGIN IMMEDIATE").map_err(db_error)?;
        Ok(Box::new(SqliteTransaction {
            connection,
            max_revisions: self.config.max_revisions,
            open: true,
        }))
    }

    fn load(&self, policy_id: PolicyId) -> Result<Option<PolicyRecord>, StoreError> {
        Ok(self.read(|connection| load_policy(connection, policy_id))?)
    }

    fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<PolicyRecord>, StoreError> {
        Ok(self.read(|connection| {
            query_policies(
                connection,
                "WHERE owner_id = ?1 ORDER BY created_at DESC, policy_id DESC",
                params![owner_id.as_str()],
            )
        })?)
    }

    fn find_by_key(&self, key: &NaturalKey) -> Result<Vec<PolicyRecord>, StoreError> {
        Ok(self.read(|connection| find_by_key(connection, key))?)
    }

    fn locked_fields(&self, policy_id: PolicyId) -> Result<LockRegistry, StoreError> {
        Ok(self.read(|connection| load_locks(connection, policy_id))?)
    }

    fn list_revisions(&self, policy_id: PolicyId) -> Result<Vec<PolicyRevision>, StoreError> {
        Ok(self.read(|connection| load_revisions(connection, policy_id))?)
    }

    fn list_lock_events(&self, policy_id: PolicyId) -> Result<Vec<FieldLockEvent>, StoreError> {
        Ok(self.read(|connection| load_lock_events(connection, policy_id))?)
    }
}

// ============================================================================
// SECTION: Transaction
// ============================================================================

/// Write transaction over the writer connection.
///
/// # Invariants
/// - Rolls back on drop unless committed.
struct SqliteTransaction<'a> {
    /// Held writer connection.
    connection: MutexGuard<'a, Connection>,
    /// Revision retention limit.
    max_revisions: Option<u64>,
    /// Whether the transaction still needs a rollback on drop.
    open: bool,
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.connection.execute_batch("ROLLBACK");
        }
    }
}

impl PolicyTransaction for SqliteTransaction<'_> {
    fn find_by_key(&mut self, key: &NaturalKey) -> Result<Vec<PolicyRecord>, StoreError> {
        Ok(find_by_key(&self.connection, key)?)
    }

    fn load_policy(&mut self, policy_id: PolicyId) -> Result<Option<PolicyRecord>, StoreError> {
        Ok(load_policy(&self.connection, policy_id)?)
    }

    fn locked_fields(&mut self, policy_id: PolicyId) -> Result<LockRegistry, StoreError> {
        Ok(load_locks(&self.connection, policy_id)?)
    }

    fn insert_policy(&mut self, header: &PolicyHeader) -> Result<PolicyId, StoreError> {
        let values = header_values(header)?;
        self.connection
            .prepare_cached(INSERT_POLICY)
            .and_then(|mut stmt| stmt.execute(params_from_iter(values.iter())))
            .map_err(|err| match db_error(err) {
                SqliteStoreError::Conflict(_) => SqliteStoreError::Conflict(format!(
                    "natural key already exists: {}",
                    header.natural_key()
                )),
                other => other,
            })?;
        Ok(parse_policy_id(self.connection.last_insert_rowid())?)
    }

    fn update_policy(
        &mut self,
        policy_id: PolicyId,
        expected_version: u64,
        header: &PolicyHeader,
    ) -> Result<(), StoreError> {
        let Some(current) = load_header(&self.connection, policy_id)? else {
            return Err(SqliteStoreError::NotFound(format!("policy {policy_id}")).into());
        };
        if current.version != expected_version {
            return Err(SqliteStoreError::Conflict(format!(
                "policy {policy_id} is at version {}, expected {expected_version}",
                current.version
            ))
            .into());
        }
        if current.natural_key() != header.natural_key() {
            return Err(
                SqliteStoreError::Invalid("natural key fields are immutable".to_string()).into()
            );
        }
        let mut values = header_values(header)?;
        values.push(SqlValue::Integer(id_value(policy_id)?));
        self.connection
            .prepare_cached(UPDATE_POLICY)
            .and_then(|mut stmt| stmt.execute(params_from_iter(values.iter())))
            .map_err(db_error)?;
        Ok(())
    }

    fn replace_coverages(
        &mut self,
        policy_id: PolicyId,
        coverages: &[CoverageItem],
    ) -> Result<(), StoreError> {
        let id = id_value(policy_id)?;
        ensure_policy(&self.connection, policy_id)?;
        self.connection
            .execute("DELETE FROM coverages WHERE policy_id = ?1", params![id])
            .map_err(db_error)?;
        let mut stmt = self
            .connection
            .prepare_cached(
                "INSERT INTO coverages (policy_id, position, description, limit_cents) VALUES \
                 (?1, ?2, ?3, ?4)",
            )
            .map_err(db_error)?;
        for (position, coverage) in coverages.iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| SqliteStoreError::Invalid("too many coverages".to_string()))?;
            stmt.execute(params![
                id,
                position,
                coverage.description,
                coverage.limit.map(Money::cents)
            ])
            .map_err(db_error)?;
        }
        Ok(())
    }

    fn replace_installments(
        &mut self,
        policy_id: PolicyId,
        installments: &[InstallmentItem],
    ) -> Result<(), StoreError> {
        let id = id_value(policy_id)?;
        ensure_policy(&self.connection, policy_id)?;
        self.connection
            .execute("DELETE FROM installments WHERE policy_id = ?1", params![id])
            .map_err(db_error)?;
        let mut stmt = self
            .connection
            .prepare_cached(
                "INSERT INTO installments (policy_id, sequence, amount_cents, due_date, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(db_error)?;
        for item in installments {
            stmt.execute(params![
                id,
                i64::from(item.sequence),
                item.amount.cents(),
                format_iso_date(item.due_date),
                item.status.as_str()
            ])
            .map_err(db_error)?;
        }
        Ok(())
    }

    fn append_revision(&mut self, revision: &PolicyRevision) -> Result<(), StoreError> {
        let id = id_value(revision.policy_id)?;
        let version = version_value(revision.version)?;
        let bytes = snapshot_bytes(&revision.snapshot)?;
        ensure_policy(&self.connection, revision.policy_id)?;
        self.connection
            .execute(
                "INSERT INTO policy_revisions (policy_id, version, provenance, artifact_hash, \
                 extracted_at, recorded_at, snapshot_json, snapshot_hash, hash_algorithm) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    version,
                    revision.provenance.as_str(),
                    revision.artifact_hash,
                    revision.extracted_at.map(Timestamp::as_unix_millis),
                    revision.recorded_at.as_unix_millis(),
                    bytes,
                    revision.snapshot_hash.value,
                    revision.snapshot_hash.algorithm.as_str()
                ],
            )
            .map_err(db_error)?;
        enforce_retention(&self.connection, id, version, self.max_revisions)?;
        Ok(())
    }

    fn upsert_lock(&mut self, policy_id: PolicyId, lock: &FieldLock) -> Result<(), StoreError> {
        ensure_policy(&self.connection, policy_id)?;
        self.connection
            .execute(
                "INSERT INTO field_locks (policy_id, field, confirmed_at, confirmed_by) VALUES \
                 (?1, ?2, ?3, ?4) ON CONFLICT(policy_id, field) DO UPDATE SET confirmed_at = \
                 excluded.confirmed_at, confirmed_by = excluded.confirmed_by",
                params![
                    id_value(policy_id)?,
                    lock.field.as_str(),
                    lock.confirmed_at.as_unix_millis(),
                    lock.confirmed_by
                ],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn remove_lock(&mut self, policy_id: PolicyId, field: FieldName) -> Result<bool, StoreError> {
        ensure_policy(&self.connection, policy_id)?;
        let removed = self
            .connection
            .execute(
                "DELETE FROM field_locks WHERE policy_id = ?1 AND field = ?2",
                params![id_value(policy_id)?, field.as_str()],
            )
            .map_err(db_error)?;
        Ok(removed > 0)
    }

    fn append_lock_event(&mut self, event: &FieldLockEvent) -> Result<(), StoreError> {
        ensure_policy(&self.connection, event.policy_id)?;
        self.connection
            .execute(
                "INSERT INTO field_lock_events (policy_id, field, action, recorded_at, actor) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id_value(event.policy_id)?,
                    event.field.as_str(),
                    event.action.as_str(),
                    event.recorded_at.as_unix_millis(),
                    event.actor
                ],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.connection.execute_batch("COMMIT").map_err(db_error)?;
        self.open = false;
        Ok(())
    }
}

// ============================================================================
// SECTION: Row Types
// ============================================================================

/// Raw policy header row.
struct PolicyRow {
    /// Policy id.
    policy_id: i64,
    /// Owner id.
    owner_id: String,
    /// Display insurer.
    insurer: String,
    /// Normalized insurer key.
    insurer_key: String,
    /// Policy number.
    policy_number: String,
    /// Insured name.
    insured_name: Option<String>,
    /// Tax document.
    insured_document: Option<String>,
    /// Tax document type label.
    document_type: Option<String>,
    /// Phone.
    phone: Option<String>,
    /// Email.
    email: Option<String>,
    /// Premium in cents.
    premium_cents: Option<i64>,
    /// Monthly amount in cents.
    monthly_amount_cents: Option<i64>,
    /// Deductible in cents.
    deductible_cents: Option<i64>,
    /// Vehicle model.
    vehicle_model: Option<String>,
    /// Vehicle plate.
    vehicle_plate: Option<String>,
    /// Vehicle year.
    vehicle_year: Option<i64>,
    /// ISO start date.
    start_date: String,
    /// ISO end date.
    end_date: String,
    /// Status label.
    status: String,
    /// Artifact hash.
    artifact_hash: Option<String>,
    /// Artifact path.
    artifact_path: Option<String>,
    /// Record version.
    version: i64,
    /// Provenance label.
    provenance: String,
    /// Creation time.
    created_at: i64,
    /// Update time.
    updated_at: i64,
    /// Extraction time.
    extracted_at: Option<i64>,
}

/// Raw revision row.
struct RevisionRow {
    /// Revision version.
    version: i64,
    /// Provenance label.
    provenance: String,
    /// Artifact hash.
    artifact_hash: Option<String>,
    /// Extraction time.
    extracted_at: Option<i64>,
    /// Record time.
    recorded_at: i64,
    /// Canonical snapshot bytes.
    snapshot_json: Vec<u8>,
    /// Stored digest.
    snapshot_hash: String,
    /// Stored digest algorithm label.
    hash_algorithm: String,
}

/// Maps a policy row.
fn map_policy_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PolicyRow> {
    Ok(PolicyRow {
        policy_id: row.get(0)?,
        owner_id: row.get(1)?,
        insurer: row.get(2)?,
        insurer_key: row.get(3)?,
        policy_number: row.get(4)?,
        insured_name: row.get(5)?,
        insured_document: row.get(6)?,
        document_type: row.get(7)?,
        phone: row.get(8)?,
        email: row.get(9)?,
        premium_cents: row.get(10)?,
        monthly_amount_cents: row.get(11)?,
        deductible_cents: row.get(12)?,
        vehicle_model: row.get(13)?,
        vehicle_plate: row.get(14)?,
        vehicle_year: row.get(15)?,
        start_date: row.get(16)?,
        end_date: row.get(17)?,
        status: row.get(18)?,
        artifact_hash: row.get(19)?,
        artifact_path: row.get(20)?,
        version: row.get(21)?,
        provenance: row.get(22)?,
        created_at: row.get(23)?,
        updated_at: row.get(24)?,
        extracted_at: row.get(25)?,
    })
}

/// Maps a revision row.
fn map_revision_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RevisionRow> {
    Ok(RevisionRow {
        version: row.get(0)?,
        provenance: row.get(1)?,
        artifact_hash: row.get(2)?,
        extracted_at: row.get(3)?,
        recorded_at: row.get(4)?,
        snapshot_json: row.get(5)?,
        snapshot_hash: row.get(6)?,
        hash_algorithm: row.get(7)?,
    })
}

/// Converts a raw row into a header.
fn build_header(row: PolicyRow) -> Result<(PolicyId, PolicyHeader), SqliteStoreError> {
    let policy_id = parse_policy_id(row.policy_id)?;
    let header = PolicyHeader {
        owner_id: OwnerId::new(row.owner_id),
        insurer: row.insurer,
        insurer_key: row.insurer_key,
        policy_number: row.policy_number,
        fields: PolicyFields {
            insured_name: row.insured_name,
            insured_document: row.insured_document,
            document_type: row.document_type.as_deref().map(parse_label).transpose()?,
            phone: row.phone,
            email: row.email,
            premium: row.premium_cents.map(Money::from_cents),
            monthly_amount: row.monthly_amount_cents.map(Money::from_cents),
            deductible: row.deductible_cents.map(Money::from_cents),
            vehicle_model: row.vehicle_model,
            vehicle_plate: row.vehicle_plate,
            vehicle_year: row
                .vehicle_year
                .map(|year| {
                    i32::try_from(year).map_err(|_| {
                        SqliteStoreError::Corrupt("vehicle year out of range".to_string())
                    })
                })
                .transpose()?,
        },
        start_date: parse_stored_date(&row.start_date)?,
        end_date: parse_stored_date(&row.end_date)?,
        status: parse_label(&row.status)?,
        artifact_hash: row.artifact_hash,
        artifact_path: row.artifact_path.map(ArtifactPath::new),
        version: parse_version(row.version)?,
        provenance: parse_label(&row.provenance)?,
        created_at: Timestamp::from_unix_millis(row.created_at),
        updated_at: Timestamp::from_unix_millis(row.updated_at),
        extracted_at: row.extracted_at.map(Timestamp::from_unix_millis),
    };
    Ok((policy_id, header))
}

/// Converts a raw revision row, verifying its digest.
fn build_revision(
    policy_id: PolicyId,
    row: RevisionRow,
) -> Result<PolicyRevision, SqliteStoreError> {
    let algorithm = HashAlgorithm::from_label(&row.hash_algorithm).ok_or_else(|| {
        SqliteStoreError::Invalid(format!("unsupported hash algorithm: {}", row.hash_algorithm))
    })?;
    let snapshot_hash = HashDigest::from_hex(algorithm, &row.snapshot_hash)
        .ok_or_else(|| SqliteStoreError::Corrupt("malformed revision digest".to_string()))?;
    let snapshot = decode_snapshot(&row.snapshot_json, &snapshot_hash).map_err(|err| match err {
        StoreError::Corrupt(message) => SqliteStoreError::Corrupt(message),
        other => SqliteStoreError::Invalid(other.to_string()),
    })?;
    Ok(PolicyRevision {
        policy_id,
        version: parse_version(row.version)?,
        provenance: parse_label(&row.provenance)?,
        artifact_hash: row.artifact_hash,
        extracted_at: row.extracted_at.map(Timestamp::from_unix_millis),
        recorded_at: Timestamp::from_unix_millis(row.recorded_at),
        snapshot,
        snapshot_hash,
    })
}

/// Returns bind values for a header in column order.
fn header_values(header: &PolicyHeader) -> Result<Vec<SqlValue>, SqliteStoreError> {
    let fields = &header.fields;
    Ok(vec![
        SqlValue::Text(header.owner_id.as_str().to_string()),
        SqlValue::Text(header.insurer.clone()),
        SqlValue::Text(header.insurer_key.clone()),
        SqlValue::Text(header.policy_number.clone()),
        text_value(fields.insured_name.as_deref()),
        text_value(fields.insured_document.as_deref()),
        text_value(fields.document_type.map(|kind| kind.as_str())),
        text_value(fields.phone.as_deref()),
        text_value(fields.email.as_deref()),
        int_value(fields.premium.map(Money::cents)),
        int_value(fields.monthly_amount.map(Money::cents)),
        int_value(fields.deductible.map(Money::cents)),
        text_value(fields.vehicle_model.as_deref()),
        text_value(fields.vehicle_plate.as_deref()),
        int_value(fields.vehicle_year.map(i64::from)),
        SqlValue::Text(format_iso_date(header.start_date)),
        SqlValue::Text(format_iso_date(header.end_date)),
        SqlValue::Text(header.status.as_str().to_string()),
        text_value(header.artifact_hash.as_deref()),
        text_value(header.artifact_path.as_ref().map(ArtifactPath::as_str)),
        SqlValue::Integer(version_value(header.version)?),
        SqlValue::Text(header.provenance.as_str().to_string()),
        SqlValue::Integer(header.created_at.as_unix_millis()),
        SqlValue::Integer(header.updated_at.as_unix_millis()),
        int_value(header.extracted_at.map(Timestamp::as_unix_millis)),
    ])
}

/// Wraps an optional string as a bind value.
fn text_value(value: Option<&str>) -> SqlValue {
    value.map_or(SqlValue::Null, |text| SqlValue::Text(text.to_string()))
}

/// Wraps an optional integer as a bind value.
fn int_value(value: Option<i64>) -> SqlValue {
    value.map_or(SqlValue::Null, SqlValue::Integer)
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Runs a policy query and loads each record's children.
fn query_policies<P: Params>(
    connection: &Connection,
    filter: &str,
    params: P,
) -> Result<Vec<PolicyRecord>, SqliteStoreError> {
    let rows = {
        let mut stmt =
            connection.prepare_cached(&format!("{SELECT_POLICIES} {filter}")).map_err(db_error)?;
        let mapped = stmt.query_map(params, map_policy_row).map_err(db_error)?;
        mapped.collect::<Result<Vec<_>, _>>().map_err(db_error)?
    };
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let (policy_id, header) = build_header(row)?;
        records.push(PolicyRecord {
            policy_id,
            header,
            coverages: load_coverages(connection, policy_id)?,
            installments: load_installments(connection, policy_id)?,
        });
    }
    Ok(records)
}

/// Loads one policy record.
fn load_policy(
    connection: &Connection,
    policy_id: PolicyId,
) -> Result<Option<PolicyRecord>, SqliteStoreError> {
    let mut records =
        query_policies(connection, "WHERE policy_id = ?1", params![id_value(policy_id)?])?;
    Ok(records.pop())
}

/// Loads one policy header without children.
fn load_header(
    connection: &Connection,
    policy_id: PolicyId,
) -> Result<Option<PolicyHeader>, SqliteStoreError> {
    let id = id_value(policy_id)?;
    let row = connection
        .prepare_cached(&format!("{SELECT_POLICIES} WHERE policy_id = ?1"))
        .and_then(|mut stmt| stmt.query_row(params![id], map_policy_row).optional())
        .map_err(db_error)?;
    row.map(|row| build_header(row).map(|(_, header)| header)).transpose()
}

/// Returns every record matching a natural key.
fn find_by_key(
    connection: &Connection,
    key: &NaturalKey,
) -> Result<Vec<PolicyRecord>, SqliteStoreError> {
    query_policies(
        connection,
        "WHERE owner_id = ?1 AND insurer_key = ?2 AND policy_number = ?3 ORDER BY policy_id",
        params![key.owner_id.as_str(), key.insurer_key, key.policy_number],
    )
}

/// Fails with `NotFound` when the policy does not exist.
fn ensure_policy(connection: &Connection, policy_id: PolicyId) -> Result<(), SqliteStoreError> {
    let exists: Option<i64> = connection
        .query_row(
            "SELECT 1 FROM policies WHERE policy_id = ?1",
            params![id_value(policy_id)?],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)?;
    exists.map(|_| ()).ok_or_else(|| SqliteStoreError::NotFound(format!("policy {policy_id}")))
}

/// Loads coverages in stored order.
fn load_coverages(
    connection: &Connection,
    policy_id: PolicyId,
) -> Result<Vec<CoverageItem>, SqliteStoreError> {
    let mut stmt = connection
        .prepare_cached(
            "SELECT description, limit_cents FROM coverages WHERE policy_id = ?1 ORDER BY \
             position",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![id_value(policy_id)?], |row| {
            Ok(CoverageItem {
                description: row.get(0)?,
                limit: row.get::<_, Option<i64>>(1)?.map(Money::from_cents),
            })
        })
        .map_err(db_error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
}

/// Loads installments ordered by sequence.
fn load_installments(
    connection: &Connection,
    policy_id: PolicyId,
) -> Result<Vec<InstallmentItem>, SqliteStoreError> {
    let mut stmt = connection
        .prepare_cached(
            "SELECT sequence, amount_cents, due_date, status FROM installments WHERE policy_id = \
             ?1 ORDER BY sequence",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![id_value(policy_id)?], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(db_error)?;
    let mut items = Vec::new();
    for row in rows {
        let (sequence, amount, due_date, status) = row.map_err(db_error)?;
        items.push(InstallmentItem {
            sequence: u32::try_from(sequence).map_err(|_| {
                SqliteStoreError::Corrupt(format!("installment sequence out of range: {sequence}"))
            })?,
            amount: Money::from_cents(amount),
            due_date: parse_stored_date(&due_date)?,
            status: parse_label(&status)?,
        });
    }
    Ok(items)
}

/// Loads the lock registry of a policy.
fn load_locks(
    connection: &Connection,
    policy_id: PolicyId,
) -> Result<LockRegistry, SqliteStoreError> {
    let mut stmt = connection
        .prepare_cached(
            "SELECT field, confirmed_at, confirmed_by FROM field_locks WHERE policy_id = ?1",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![id_value(policy_id)?], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, Option<String>>(2)?))
        })
        .map_err(db_error)?;
    let mut registry = LockRegistry::new();
    for row in rows {
        let (field, confirmed_at, confirmed_by) = row.map_err(db_error)?;
        registry.insert(FieldLock {
            field: parse_field(&field)?,
            confirmed_at: Timestamp::from_unix_millis(confirmed_at),
            confirmed_by,
        });
    }
    Ok(registry)
}

/// Loads revisions newest first, verifying each digest.
fn load_revisions(
    connection: &Connection,
    policy_id: PolicyId,
) -> Result<Vec<PolicyRevision>, SqliteStoreError> {
    let mut stmt = connection
        .prepare_cached(
            "SELECT version, provenance, artifact_hash, extracted_at, recorded_at, \
             snapshot_json, snapshot_hash, hash_algorithm FROM policy_revisions WHERE policy_id \
             = ?1 ORDER BY version DESC",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![id_value(policy_id)?], map_revision_row)
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    rows.into_iter().map(|row| build_revision(policy_id, row)).collect()
}

/// Loads lock history oldest first.
fn load_lock_events(
    connection: &Connection,
    policy_id: PolicyId,
) -> Result<Vec<FieldLockEvent>, SqliteStoreError> {
    let mut stmt = connection
        .prepare_cached(
            "SELECT field, action, recorded_at, actor FROM field_lock_events WHERE policy_id = \
             ?1 ORDER BY event_id ASC",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![id_value(policy_id)?], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })
        .map_err(db_error)?;
    let mut events = Vec::new();
    for row in rows {
        let (field, action, recorded_at, actor) = row.map_err(db_error)?;
        events.push(FieldLockEvent {
            policy_id,
            field: parse_field(&field)?,
            action: LockAction::from_label(&action).ok_or_else(|| {
                SqliteStoreError::Corrupt(format!("unknown lock action: {action}"))
            })?,
            recorded_at: Timestamp::from_unix_millis(recorded_at),
            actor,
        });
    }
    Ok(events)
}

/// Prunes revisions beyond the retention limit.
fn enforce_retention(
    connection: &Connection,
    policy_id: i64,
    latest_version: i64,
    max_revisions: Option<u64>,
) -> Result<(), SqliteStoreError> {
    let Some(max_revisions) = max_revisions else {
        return Ok(());
    };
    let max_revisions = i64::try_from(max_revisions)
        .map_err(|_| SqliteStoreError::Invalid("max_revisions too large".to_string()))?;
    if latest_version > max_revisions {
        connection
            .execute(
                "DELETE FROM policy_revisions WHERE policy_id = ?1 AND version <= ?2",
                params![policy_id, latest_version - max_revisions],
            )
            .map_err(db_error)?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a policy id into its `SQLite` integer.
fn id_value(policy_id: PolicyId) -> Result<i64, SqliteStoreError> {
    i64::try_from(policy_id.get())
        .map_err(|_| SqliteStoreError::Invalid(format!("policy id out of range: {policy_id}")))
}

/// Converts a record version into its `SQLite` integer.
fn version_value(version: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(version)
        .map_err(|_| SqliteStoreError::Invalid(format!("version out of range: {version}")))
}

/// Parses a stored policy id.
fn parse_policy_id(raw: i64) -> Result<PolicyId, SqliteStoreError> {
    u64::try_from(raw)
        .ok()
        .and_then(PolicyId::from_raw)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid policy id: {raw}")))
}

/// Parses a stored version.
fn parse_version(raw: i64) -> Result<u64, SqliteStoreError> {
    u64::try_from(raw).map_err(|_| SqliteStoreError::Corrupt(format!("invalid version: {raw}")))
}

/// Parses a stored ISO date.
fn parse_stored_date(raw: &str) -> Result<Date, SqliteStoreError> {
    parse_date(raw).ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid stored date: {raw}")))
}

/// Parses a stored enum label.
fn parse_label<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, SqliteStoreError> {
    raw.parse::<T>().map_err(SqliteStoreError::Corrupt)
}

/// Parses a stored field name.
fn parse_field(raw: &str) -> Result<FieldName, SqliteStoreError> {
    raw.parse::<FieldName>()
        .map_err(|_| SqliteStoreError::Corrupt(format!("unknown stored field: {raw}")))
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db_error)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
        .map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS policies (
                    policy_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id TEXT NOT NULL,
                    insurer TEXT NOT NULL,
                    insurer_key TEXT NOT NULL,
                    policy_number TEXT NOT NULL,
                    insured_name TEXT,
                    insured_document TEXT,
                    document_type TEXT,
                    phone TEXT,
                    email TEXT,
                    premium_cents INTEGER,
                    monthly_amount_cents INTEGER,
                    deductible_cents INTEGER,
                    vehicle_model TEXT,
                    vehicle_plate TEXT,
                    vehicle_year INTEGER,
                    start_date TEXT NOT NULL,
                    end_date TEXT NOT NULL,
                    status TEXT NOT NULL,
                    artifact_hash TEXT,
                    artifact_path TEXT,
                    version INTEGER NOT NULL,
                    provenance TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    extracted_at INTEGER
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_policies_natural_key
                    ON policies (owner_id, insurer_key, policy_number);
                CREATE INDEX IF NOT EXISTS idx_policies_owner
                    ON policies (owner_id, created_at);
                CREATE TABLE IF NOT EXISTS coverages (
                    policy_id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    description TEXT NOT NULL,
                    limit_cents INTEGER,
                    PRIMARY KEY (policy_id, position),
                    FOREIGN KEY (policy_id) REFERENCES policies(policy_id) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS installments (
                    policy_id INTEGER NOT NULL,
                    sequence INTEGER NOT NULL,
                    amount_cents INTEGER NOT NULL,
                    due_date TEXT NOT NULL,
                    status TEXT NOT NULL,
                    PRIMARY KEY (policy_id, sequence),
                    FOREIGN KEY (policy_id) REFERENCES policies(policy_id) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS field_locks (
                    policy_id INTEGER NOT NULL,
                    field TEXT NOT NULL,
                    confirmed_at INTEGER NOT NULL,
                    confirmed_by TEXT,
                    PRIMARY KEY (policy_id, field),
                    FOREIGN KEY (policy_id) REFERENCES policies(policy_id) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS field_lock_events (
                    event_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    policy_id INTEGER NOT NULL,
                    field TEXT NOT NULL,
                    action TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL,
                    actor TEXT,
                    FOREIGN KEY (policy_id) REFERENCES policies(policy_id) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_field_lock_events_policy
                    ON field_lock_events (policy_id, event_id);
                CREATE TABLE IF NOT EXISTS policy_revisions (
                    policy_id INTEGER NOT NULL,
                    version INTEGER NOT NULL,
                    provenance TEXT NOT NULL,
                    artifact_hash TEXT,
                    extracted_at INTEGER,
                    recorded_at INTEGER NOT NULL,
                    snapshot_json BLOB NOT NULL,
                    snapshot_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    PRIMARY KEY (policy_id, version),
                    FOREIGN KEY (policy_id) REFERENCES policies(policy_id) ON DELETE CASCADE
                );",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}
