// crates/policy-vault-core/src/interfaces/mod.rs
// ============================================================================
// Module: Policy Vault Interfaces
// Description: Backend-agnostic interfaces for storage, artifacts, and time.
// Purpose: Define the contracts the persistence runtime composes.
// Dependencies: crate::core, thiserror, time
// ============================================================================

//! ## Overview
//! The runtime reaches every external collaborator through these traits:
//! - [`PolicyStore`] / [`PolicyTransaction`]: transactional system of record
//! - [`ArtifactStore`]: content-addressed blob storage for source documents
//! - [`Clock`]: injectable wall clock
//!
//! A transaction obtained from [`PolicyStore::begin`] serializes writers for
//! its whole lifetime and rolls back when dropped without
//! [`PolicyTransaction::commit`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use time::OffsetDateTime;

use crate::core::ArtifactPath;
use crate::core::CoverageItem;
use crate::core::FieldLock;
use crate::core::FieldLockEvent;
use crate::core::FieldName;
use crate::core::HashDigest;
use crate::core::InstallmentItem;
use crate::core::LockRegistry;
use crate::core::NaturalKey;
use crate::core::OwnerId;
use crate::core::PolicyHeader;
use crate::core::PolicyId;
use crate::core::PolicyRecord;
use crate::core::PolicyRevision;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Policy store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("policy store io error: {0}")]
    Io(String),
    /// Store is busy (lock timeout).
    #[error("policy store busy: {0}")]
    Busy(String),
    /// Write conflicted with a concurrent write or uniqueness constraint.
    #[error("policy store conflict: {0}")]
    Conflict(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("policy store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("policy store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("policy store invalid data: {0}")]
    Invalid(String),
    /// Referenced record does not exist.
    #[error("policy store record not found: {0}")]
    NotFound(String),
    /// Store reported an error.
    #[error("policy store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Returns true for failures that may succeed when retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::Conflict(_))
    }

    /// Returns the stable kind label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Busy(_) => "busy",
            Self::Conflict(_) => "conflict",
            Self::Corrupt(_) => "corrupt",
            Self::VersionMismatch(_) => "version_mismatch",
            Self::Invalid(_) => "invalid",
            Self::NotFound(_) => "not_found",
            Self::Store(_) => "store",
        }
    }
}

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// Write transaction against the policy store.
///
/// # Invariants
/// - Only one transaction is open per store at a time.
/// - Nothing becomes visible to readers before [`PolicyTransaction::commit`].
/// - Dropping the transaction without committing discards every write.
pub trait PolicyTransaction {
    /// Returns every live record matching the natural key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn find_by_key(&mut self, key: &NaturalKey) -> Result<Vec<PolicyRecord>, StoreError>;

    /// Loads one record with its sub-entities.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the load fails.
    fn load_policy(&mut self, policy_id: PolicyId) -> Result<Option<PolicyRecord>, StoreError>;

    /// Returns the lock registry of a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn locked_fields(&mut self, policy_id: PolicyId) -> Result<LockRegistry, StoreError>;

    /// Inserts a new record header.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the natural key already exists.
    fn insert_policy(&mut self, header: &PolicyHeader) -> Result<PolicyId, StoreError>;

    /// Updates a record header if its stored version equals `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on a version mismatch and
    /// [`StoreError::NotFound`] when the record is missing.
    fn update_policy(
        &mut self,
        policy_id: PolicyId,
        expected_version: u64,
        header: &PolicyHeader,
    ) -> Result<(), StoreError>;

    /// Replaces the coverage collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn replace_coverages(
        &mut self,
        policy_id: PolicyId,
        coverages: &[CoverageItem],
    ) -> Result<(), StoreError>;

    /// Replaces the installment collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn replace_installments(
        &mut self,
        policy_id: PolicyId,
        installments: &[InstallmentItem],
    ) -> Result<(), StoreError>;

    /// Appends a revision row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn append_revision(&mut self, revision: &PolicyRevision) -> Result<(), StoreError>;

    /// Inserts or replaces a field lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_lock(&mut self, policy_id: PolicyId, lock: &FieldLock) -> Result<(), StoreError>;

    /// Removes a field lock, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn remove_lock(&mut self, policy_id: PolicyId, field: FieldName) -> Result<bool, StoreError>;

    /// Appends a lock history event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn append_lock_event(&mut self, event: &FieldLockEvent) -> Result<(), StoreError>;

    /// Commits every write of the transaction atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails; nothing is applied.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Transactional system of record for policies.
pub trait PolicyStore: Send + Sync {
    /// Opens a serialized write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Busy`] when the writer cannot be acquired.
    fn begin(&self) -> Result<Box<dyn PolicyTransaction + '_>, StoreError>;

    /// Loads one record with its sub-entities.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load(&self, policy_id: PolicyId) -> Result<Option<PolicyRecord>, StoreError>;

    /// Lists an owner's records, newest first by creation time, ties by id descending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<PolicyRecord>, StoreError>;

    /// Returns every live record matching the natural key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn find_by_key(&self, key: &NaturalKey) -> Result<Vec<PolicyRecord>, StoreError>;

    /// Returns the lock registry of a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn locked_fields(&self, policy_id: PolicyId) -> Result<LockRegistry, StoreError>;

    /// Lists revisions newest first, verifying every snapshot digest.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when a snapshot fails verification.
    fn list_revisions(&self, policy_id: PolicyId) -> Result<Vec<PolicyRevision>, StoreError>;

    /// Lists lock history events oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_lock_events(&self, policy_id: PolicyId) -> Result<Vec<FieldLockEvent>, StoreError>;
}

// ============================================================================
// SECTION: Artifact Store
// ============================================================================

/// Artifact store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    /// Store could not be reached or refused the write.
    #[error("artifact store unavailable: {0}")]
    Unavailable(String),
    /// Local I/O failure.
    #[error("artifact store io error: {0}")]
    Io(String),
    /// Digest or path rejected.
    #[error("artifact store invalid input: {0}")]
    Invalid(String),
}

impl ArtifactError {
    /// Returns the stable kind label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Io(_) => "io",
            Self::Invalid(_) => "invalid",
        }
    }
}

/// Content-addressed blob storage for source artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Stores artifact bytes under their digest and returns the stored location.
    ///
    /// Storing identical content twice yields the same location.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the bytes cannot be stored.
    fn store(&self, bytes: &[u8], digest: &HashDigest) -> Result<ArtifactPath, ArtifactError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Wall clock used for timestamps and status derivation.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> OffsetDateTime;
}
