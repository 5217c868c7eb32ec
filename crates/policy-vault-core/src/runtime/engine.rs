// crates/policy-vault-core/src/runtime/engine.rs
// ============================================================================
// Module: Policy Vault Persistence Engine
// Description: Transactional write path and read API for policy records.
// Purpose: Commit candidates under key uniqueness, field locks, and versioning.
// Dependencies: crate::{core, interfaces, runtime}, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`PersistenceEngine::try_persist`] runs one ingestion event:
//! 1. normalize the candidate (no storage is touched on failure)
//! 2. store the artifact unless a record for the key already carries its
//!    hash; artifact retries back off outside any store transaction
//! 3. open a serialized store transaction and resolve the natural key
//! 4. new key: default missing dates, check order, insert at version 1
//! 5. existing key: apply the confirmed-field guard, check order, update at
//!    the next version with an optimistic check on the previous one
//! 6. replace supplied (or synthesized) sub-entity collections
//! 7. append a digest-protected revision and commit
//!
//! Any failure drops the transaction, which discards every staged write. A
//! blob stored in step 2 for a rejected write stays content-addressed and
//! unreferenced. Transient storage failures and uniqueness conflicts re-run
//! the transaction with exponential backoff.
//!
//! Security posture: candidates are untrusted input; audit events carry
//! identifiers and hashes only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;

use crate::core::ArtifactPath;
use crate::core::CoverageItem;
use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::FieldLock;
use crate::core::FieldLockEvent;
use crate::core::FieldName;
use crate::core::HashDigest;
use crate::core::InstallmentItem;
use crate::core::LockAction;
use crate::core::LockRegistry;
use crate::core::Money;
use crate::core::NaturalKey;
use crate::core::OwnerId;
use crate::core::PolicyFields;
use crate::core::PolicyHeader;
use crate::core::PolicyId;
use crate::core::PolicyRecord;
use crate::core::PolicyRevision;
use crate::core::PolicyStatus;
use crate::core::Provenance;
use crate::core::Timestamp;
use crate::core::ValidationError;
use crate::core::derive_status;
use crate::core::hash_bytes;
use crate::core::format_iso_date;
use crate::interfaces::ArtifactError;
use crate::interfaces::ArtifactStore;
use crate::interfaces::Clock;
use crate::interfaces::PolicyStore;
use crate::interfaces::StoreError;
use crate::runtime::audit::FieldLockAuditEvent;
use crate::runtime::audit::FieldLockAuditEventParams;
use crate::runtime::audit::PersistAuditSink;
use crate::runtime::audit::PolicyPersistEvent;
use crate::runtime::audit::PolicyPersistEventParams;
use crate::runtime::guard::InstallmentPlan;
use crate::runtime::guard::plan_installments;
use crate::runtime::guard::resolve_write_set;
use crate::runtime::normalizer::DEFAULT_PREMIUM_TOLERANCE_PERCENT;
use crate::runtime::normalizer::NormalizeWarning;
use crate::runtime::normalizer::Normalized;
use crate::runtime::normalizer::Normalizer;
use crate::runtime::normalizer::WarningCode;
use crate::runtime::normalizer::check_date_order;
use crate::runtime::revisions::build_revision;
use crate::runtime::schedule::DEFAULT_INSTALLMENT_COUNT;
use crate::runtime::schedule::synthesize_installments;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Retry policy for transient storage and artifact failures.
///
/// # Invariants
/// - `max_attempts >= 1`.
/// - `max_backoff >= initial_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay after the `attempt`-th failed attempt (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1_u32 << exponent).min(self.max_backoff)
    }
}

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Installments synthesized when a candidate carries no schedule or count.
    pub default_installment_count: u32,
    /// Premium coherence tolerance in percent.
    pub premium_tolerance_percent: u8,
    /// Retry policy.
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_installment_count: DEFAULT_INSTALLMENT_COUNT,
            premium_tolerance_percent: DEFAULT_PREMIUM_TOLERANCE_PERCENT,
            retry: RetryPolicy::default(),
        }
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Successful persist outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistSuccess {
    /// Committed policy id.
    pub policy_id: PolicyId,
    /// Whether an existing record was updated.
    pub is_update: bool,
    /// Committed version.
    pub version: u64,
    /// Derived lifecycle status.
    pub status: PolicyStatus,
    /// Non-blocking warnings.
    pub warnings: Vec<NormalizeWarning>,
    /// Whether the artifact write was skipped because the hash matched.
    pub artifact_deduplicated: bool,
}

/// One error entry of a [`PersistReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedError {
    /// Stable kind label.
    pub kind: String,
    /// Offending field, when the error is field-specific.
    pub field: Option<String>,
    /// Human-readable detail.
    pub message: String,
}

/// Structured persist outcome; never an unstructured error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    /// Whether the write committed.
    pub success: bool,
    /// Committed policy id.
    pub policy_id: Option<PolicyId>,
    /// Whether an existing record was updated.
    pub is_update: Option<bool>,
    /// Committed version.
    pub version: Option<u64>,
    /// Derived lifecycle status.
    pub status: Option<PolicyStatus>,
    /// Non-blocking warnings.
    pub warnings: Vec<NormalizeWarning>,
    /// Errors; empty on success.
    pub errors: Vec<ReportedError>,
}

impl From<PersistSuccess> for PersistReport {
    fn from(success: PersistSuccess) -> Self {
        Self {
            success: true,
            policy_id: Some(success.policy_id),
            is_update: Some(success.is_update),
            version: Some(success.version),
            status: Some(success.status),
            warnings: success.warnings,
            errors: Vec::new(),
        }
    }
}

impl From<&PersistError> for PersistReport {
    fn from(error: &PersistError) -> Self {
        Self {
            success: false,
            policy_id: None,
            is_update: None,
            version: None,
            status: None,
            warnings: Vec::new(),
            errors: error.reported(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Persistence engine errors.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Candidate or request failed validation; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// More than one live record matches a natural key.
    #[error("integrity fault: {count} live records for natural key {key}")]
    IntegrityFault {
        /// Offending key.
        key: NaturalKey,
        /// Number of live matches.
        count: usize,
    },
    /// Referenced policy does not exist.
    #[error("policy not found: {0}")]
    PolicyNotFound(PolicyId),
    /// Store failure after retries.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    /// Artifact store failure after retries.
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

impl PersistError {
    /// Returns the stable kind label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::IntegrityFault {
                ..
            } => "integrity_fault",
            Self::PolicyNotFound(_) => "not_found",
            Self::Storage(_) => "storage_error",
            Self::Artifact(_) => "artifact_error",
        }
    }

    /// Expands the error into report entries; validation yields one per field.
    #[must_use]
    pub fn reported(&self) -> Vec<ReportedError> {
        match self {
            Self::Validation(err) => err
                .violations
                .iter()
                .map(|violation| ReportedError {
                    kind: violation.kind.as_str().to_string(),
                    field: Some(violation.field.clone()),
                    message: violation.message.clone(),
                })
                .collect(),
            other => vec![ReportedError {
                kind: other.kind().to_string(),
                field: None,
                message: other.to_string(),
            }],
        }
    }
}

// ============================================================================
// SECTION: Internal Types
// ============================================================================

/// Per-call context shared by retried attempts.
struct PersistInput<'a> {
    /// Resolved natural key.
    key: &'a NaturalKey,
    /// Normalized candidate.
    normalized: &'a Normalized,
    /// Artifact bytes and digest.
    artifact: Option<(&'a [u8], &'a HashDigest)>,
    /// Location written before the transaction opened.
    prestored: Option<&'a ArtifactPath>,
    /// Call time.
    now: OffsetDateTime,
}

/// Audit details collected while persisting.
#[derive(Default)]
struct PersistTrace {
    /// Natural key once normalized.
    key: Option<NaturalKey>,
    /// Artifact hash when supplied.
    artifact_hash: Option<String>,
    /// Store attempts used.
    attempts: u32,
}

/// Final values decided before any write.
struct WritePlan {
    /// Final scalar fields.
    fields: PolicyFields,
    /// Final vigency start.
    start_date: Date,
    /// Final vigency end.
    end_date: Date,
    /// Coverage replacement.
    coverages: Option<Vec<CoverageItem>>,
    /// Installment replacement.
    installments: Option<Vec<InstallmentItem>>,
}

/// Artifact reference for the header.
struct StagedArtifact {
    /// Content hash.
    hash: Option<String>,
    /// Stored location.
    path: Option<ArtifactPath>,
    /// Whether the write was skipped.
    deduplicated: bool,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Policy persistence engine.
pub struct PersistenceEngine {
    /// System of record.
    store: Arc<dyn PolicyStore>,
    /// Source artifact storage.
    artifacts: Arc<dyn ArtifactStore>,
    /// Wall clock.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn PersistAuditSink>,
    /// Engine settings.
    settings: EngineSettings,
    /// Candidate normalizer.
    normalizer: Normalizer,
}

impl PersistenceEngine {
    /// Creates an engine over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn PolicyStore>,
        artifacts: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn PersistAuditSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            artifacts,
            clock,
            audit,
            normalizer: Normalizer::new(settings.premium_tolerance_percent),
            settings,
        }
    }

    /// Returns the engine settings.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ------------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------------

    /// Persists a candidate and reports the outcome as data.
    #[must_use]
    pub fn persist(
        &self,
        owner_id: &OwnerId,
        candidate: &Value,
        artifact: Option<&[u8]>,
    ) -> PersistReport {
        match self.try_persist(owner_id, candidate, artifact) {
            Ok(success) => PersistReport::from(success),
            Err(err) => PersistReport::from(&err),
        }
    }

    /// Persists a candidate.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] when validation, key resolution, storage, or
    /// the artifact store fails; nothing is committed in that case.
    pub fn try_persist(
        &self,
        owner_id: &OwnerId,
        candidate: &Value,
        artifact: Option<&[u8]>,
    ) -> Result<PersistSuccess, PersistError> {
        let now = self.clock.now();
        let mut trace = PersistTrace::default();
        let result = self.persist_with_retry(owner_id, candidate, artifact, now, &mut trace);
        let (policy_id, is_update, version, deduplicated, warning_count, error_kinds) =
            match &result {
                Ok(success) => (
                    Some(success.policy_id.get()),
                    Some(success.is_update),
                    Some(success.version),
                    success.artifact_deduplicated,
                    success.warnings.len(),
                    Vec::new(),
                ),
                Err(err) => (None, None, None, false, 0, vec![err.kind()]),
            };
        self.audit.record_persist(&PolicyPersistEvent::new(PolicyPersistEventParams {
            timestamp: Timestamp::from_datetime(now),
            owner_id: owner_id.to_string(),
            insurer_key: trace.key.as_ref().map(|key| key.insurer_key.clone()),
            policy_number: trace.key.as_ref().map(|key| key.policy_number.clone()),
            policy_id,
            version,
            is_update,
            artifact_hash: trace.artifact_hash,
            artifact_deduplicated: deduplicated,
            warning_count,
            error_kinds,
            attempts: trace.attempts,
        }));
        result
    }

    /// Normalizes once, then runs the store transaction with retries.
    fn persist_with_retry(
        &self,
        owner_id: &OwnerId,
        candidate: &Value,
        artifact: Option<&[u8]>,
        now: OffsetDateTime,
        trace: &mut PersistTrace,
    ) -> Result<PersistSuccess, PersistError> {
        let normalized = self.normalizer.normalize(candidate, now.date())?;
        let key = NaturalKey::new(
            owner_id.clone(),
            &normalized.record.insurer,
            &normalized.record.policy_number,
        );
        let digest = artifact.map(|bytes| hash_bytes(DEFAULT_HASH_ALGORITHM, bytes));
        trace.key = Some(key.clone());
        trace.artifact_hash = digest.as_ref().map(|digest| digest.value.clone());
        let artifact = artifact.zip(digest.as_ref());
        let prestored = match artifact {
            Some((bytes, digest)) if !self.artifact_on_record(&key, digest)? => {
                Some(self.store_artifact(bytes, digest)?)
            }
            _ => None,
        };
        let input = PersistInput {
            key: &key,
            normalized: &normalized,
            artifact,
            prestored: prestored.as_ref(),
            now,
        };
        self.with_storage_retry(&mut trace.attempts, || self.persist_once(&input))
    }

    /// Runs one persist transaction.
    fn persist_once(&self, input: &PersistInput<'_>) -> Result<PersistSuccess, PersistError> {
        let record = &input.normalized.record;
        let today = input.now.date();
        let timestamp = Timestamp::from_datetime(input.now);
        let mut warnings = input.normalized.warnings.clone();

        let mut tx = self.store.begin()?;
        let existing = resolve_single(input.key, tx.find_by_key(input.key)?)?;
        let plan = match &existing {
            None => self.plan_insert(input, &mut warnings)?,
            Some(current) => {
                let locks = tx.locked_fields(current.policy_id)?;
                self.plan_update(input, current, &locks)?
            }
        };
        let artifact = self.stage_artifact(input, existing.as_ref())?;

        let header = PolicyHeader {
            owner_id: input.key.owner_id.clone(),
            insurer: existing
                .as_ref()
                .map_or_else(|| record.insurer.clone(), |current| current.header.insurer.clone()),
            insurer_key: input.key.insurer_key.clone(),
            policy_number: input.key.policy_number.clone(),
            status: derive_status(plan.start_date, plan.end_date, today),
            fields: plan.fields,
            start_date: plan.start_date,
            end_date: plan.end_date,
            artifact_hash: artifact.hash,
            artifact_path: artifact.path,
            version: match &existing {
                None => 1,
                Some(current) => current.header.version.checked_add(1).ok_or_else(|| {
                    StoreError::Invalid(format!("policy {} version overflow", current.policy_id))
                })?,
            },
            provenance: record.provenance,
            created_at: existing.as_ref().map_or(timestamp, |current| current.header.created_at),
            updated_at: timestamp,
            extracted_at: match record.provenance {
                Provenance::Extraction => Some(timestamp),
                Provenance::Manual => {
                    existing.as_ref().and_then(|current| current.header.extracted_at)
                }
            },
        };

        let policy_id = match &existing {
            None => tx.insert_policy(&header)?,
            Some(current) => {
                tx.update_policy(current.policy_id, current.header.version, &header)?;
                current.policy_id
            }
        };
        if let Some(coverages) = &plan.coverages {
            tx.replace_coverages(policy_id, coverages)?;
        }
        if let Some(installments) = &plan.installments {
            tx.replace_installments(policy_id, installments)?;
        }

        let committed = tx.load_policy(policy_id)?.ok_or_else(|| {
            StoreError::Corrupt(format!("policy {policy_id} missing after write"))
        })?;
        tx.append_revision(&build_revision(&committed, timestamp)?)?;
        tx.commit()?;

        Ok(PersistSuccess {
            policy_id,
            is_update: existing.is_some(),
            version: committed.header.version,
            status: committed.header.status,
            warnings,
            artifact_deduplicated: artifact.deduplicated,
        })
    }

    /// Decides values for a new record.
    fn plan_insert(
        &self,
        input: &PersistInput<'_>,
        warnings: &mut Vec<NormalizeWarning>,
    ) -> Result<WritePlan, PersistError> {
        let record = &input.normalized.record;
        let today = input.now.date();
        let start_date = default_date(record.start_date, "start_date", today, warnings);
        let end_date = default_date(record.end_date, "end_date", today, warnings);
        check_date_order(start_date, end_date)
            .map_err(|violation| ValidationError::new(vec![violation]))?;
        let plan = plan_installments(None, record.installments.as_deref(), false);
        let installments = self.materialize_installments(
            plan,
            record.fields.monthly_amount,
            start_date,
            record.installment_count,
        );
        Ok(WritePlan {
            fields: record.fields.clone(),
            start_date,
            end_date,
            coverages: record.coverages.clone(),
            installments,
        })
    }

    /// Decides values for an existing record through the guard.
    fn plan_update(
        &self,
        input: &PersistInput<'_>,
        existing: &PolicyRecord,
        locks: &LockRegistry,
    ) -> Result<WritePlan, PersistError> {
        let record = &input.normalized.record;
        let write = resolve_write_set(existing, record, locks);
        check_date_order(write.start_date, write.end_date)
            .map_err(|violation| ValidationError::new(vec![violation]))?;
        let installments = self.materialize_installments(
            write.installments,
            write.fields.monthly_amount,
            write.start_date,
            record.installment_count,
        );
        Ok(WritePlan {
            fields: write.fields,
            start_date: write.start_date,
            end_date: write.end_date,
            coverages: write.coverages,
            installments,
        })
    }

    /// Turns an installment plan into a concrete replacement, if any.
    fn materialize_installments(
        &self,
        plan: InstallmentPlan,
        monthly: Option<Money>,
        start_date: Date,
        count: Option<u32>,
    ) -> Option<Vec<InstallmentItem>> {
        match plan {
            InstallmentPlan::Keep => None,
            InstallmentPlan::Replace(items) => Some(items),
            InstallmentPlan::Synthesize => {
                let monthly = monthly.filter(|amount| !amount.is_zero())?;
                let count = count.unwrap_or(self.settings.default_installment_count);
                Some(synthesize_installments(monthly, start_date, count))
            }
        }
    }

    /// Returns true when a stored record for `key` already carries `digest`.
    fn artifact_on_record(
        &self,
        key: &NaturalKey,
        digest: &HashDigest,
    ) -> Result<bool, PersistError> {
        Ok(self.store.find_by_key(key)?.iter().any(|record| {
            record.header.artifact_hash.as_deref() == Some(digest.value.as_str())
                && record.header.artifact_path.is_some()
        }))
    }

    /// Resolves the artifact location for the write.
    ///
    /// Reuses the existing record's location when it carries the same hash,
    /// else the location stored before the transaction opened. The artifact
    /// store is only called here when a concurrent writer changed the record
    /// between the pre-check and the transaction.
    fn stage_artifact(
        &self,
        input: &PersistInput<'_>,
        existing: Option<&PolicyRecord>,
    ) -> Result<StagedArtifact, PersistError> {
        let Some((bytes, digest)) = input.artifact else {
            return Ok(StagedArtifact {
                hash: existing.and_then(|record| record.header.artifact_hash.clone()),
                path: existing.and_then(|record| record.header.artifact_path.clone()),
                deduplicated: false,
            });
        };
        if let Some(record) = existing
            && record.header.artifact_hash.as_deref() == Some(digest.value.as_str())
            && let Some(path) = &record.header.artifact_path
        {
            return Ok(StagedArtifact {
                hash: Some(digest.value.clone()),
                path: Some(path.clone()),
                deduplicated: true,
            });
        }
        let path = match input.prestored {
            Some(path) => path.clone(),
            None => self.store_artifact(bytes, digest)?,
        };
        Ok(StagedArtifact {
            hash: Some(digest.value.clone()),
            path: Some(path),
            deduplicated: false,
        })
    }

    /// Calls the artifact store with retries; invalid input is not retried.
    fn store_artifact(
        &self,
        bytes: &[u8],
        digest: &HashDigest,
    ) -> Result<ArtifactPath, PersistError> {
        let policy = self.settings.retry;
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            match self.artifacts.store(bytes, digest) {
                Ok(path) => return Ok(path),
                Err(err)
                    if !matches!(err, ArtifactError::Invalid(_)) && attempt < policy.max_attempts =>
                {
                    thread::sleep(policy.backoff(attempt));
                }
                Err(err) => return Err(PersistError::Artifact(err)),
            }
        }
    }

    /// Runs `op` until it succeeds or fails with a non-transient error.
    ///
    /// Uniqueness conflicts get at least one re-run so a lost insert race
    /// resolves as an update.
    fn with_storage_retry<T>(
        &self,
        attempts: &mut u32,
        mut op: impl FnMut() -> Result<T, PersistError>,
    ) -> Result<T, PersistError> {
        let policy = self.settings.retry;
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            *attempts = attempt;
            match op() {
                Err(PersistError::Storage(err)) if err.is_transient() => {
                    let limit = match err {
                        StoreError::Conflict(_) => policy.max_attempts.max(2),
                        _ => policy.max_attempts,
                    };
                    if attempt >= limit {
                        return Err(PersistError::Storage(err));
                    }
                    thread::sleep(policy.backoff(attempt));
                }
                other => return other,
            }
        }
    }

    // ------------------------------------------------------------------------
    // Field confirmation
    // ------------------------------------------------------------------------

    /// Locks a field against automated ingestion; idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Validation`] for unknown or natural-key fields
    /// and [`PersistError::PolicyNotFound`] for unknown policies.
    pub fn confirm_field(
        &self,
        policy_id: PolicyId,
        field: &str,
        actor: Option<&str>,
    ) -> Result<FieldLock, PersistError> {
        let now = Timestamp::from_datetime(self.clock.now());
        let mut attempts = 0;
        let result = FieldName::parse_lockable(field).map_err(PersistError::from).and_then(|name| {
            self.with_storage_retry(&mut attempts, || {
                self.confirm_once(policy_id, name, actor, now)
            })
        });
        self.record_lock_audit(
            now,
            policy_id,
            field,
            LockAction::Confirm,
            actor,
            result.as_ref().map(|(_, changed)| *changed),
        );
        result.map(|(lock, _)| lock)
    }

    /// Removes a field lock; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Validation`] for unknown or natural-key fields
    /// and [`PersistError::PolicyNotFound`] for unknown policies.
    pub fn unconfirm_field(
        &self,
        policy_id: PolicyId,
        field: &str,
        actor: Option<&str>,
    ) -> Result<bool, PersistError> {
        let now = Timestamp::from_datetime(self.clock.now());
        let mut attempts = 0;
        let result = FieldName::parse_lockable(field).map_err(PersistError::from).and_then(|name| {
            self.with_storage_retry(&mut attempts, || {
                self.unconfirm_once(policy_id, name, actor, now)
            })
        });
        self.record_lock_audit(
            now,
            policy_id,
            field,
            LockAction::Unconfirm,
            actor,
            result.as_ref().copied(),
        );
        result
    }

    /// Runs one confirm transaction.
    fn confirm_once(
        &self,
        policy_id: PolicyId,
        field: FieldName,
        actor: Option<&str>,
        now: Timestamp,
    ) -> Result<(FieldLock, bool), PersistError> {
        let mut tx = self.store.begin()?;
        if tx.load_policy(policy_id)?.is_none() {
            return Err(PersistError::PolicyNotFound(policy_id));
        }
        if let Some(existing) = tx.locked_fields(policy_id)?.get(field) {
            return Ok((existing.clone(), false));
        }
        let lock = FieldLock {
            field,
            confirmed_at: now,
            confirmed_by: actor.map(str::to_string),
        };
        tx.upsert_lock(policy_id, &lock)?;
        tx.append_lock_event(&FieldLockEvent {
            policy_id,
            field,
            action: LockAction::Confirm,
            recorded_at: now,
            actor: actor.map(str::to_string),
        })?;
        tx.commit()?;
        Ok((lock, true))
    }

    /// Runs one unconfirm transaction.
    fn unconfirm_once(
        &self,
        policy_id: PolicyId,
        field: FieldName,
        actor: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, PersistError> {
        let mut tx = self.store.begin()?;
        if tx.load_policy(policy_id)?.is_none() {
            return Err(PersistError::PolicyNotFound(policy_id));
        }
        if !tx.remove_lock(policy_id, field)? {
            return Ok(false);
        }
        tx.append_lock_event(&FieldLockEvent {
            policy_id,
            field,
            action: LockAction::Unconfirm,
            recorded_at: now,
            actor: actor.map(str::to_string),
        })?;
        tx.commit()?;
        Ok(true)
    }

    /// Emits a field lock audit event.
    fn record_lock_audit(
        &self,
        now: Timestamp,
        policy_id: PolicyId,
        field: &str,
        action: LockAction,
        actor: Option<&str>,
        result: Result<bool, &PersistError>,
    ) {
        let (changed, error_kind) = match result {
            Ok(changed) => (changed, None),
            Err(err) => (false, Some(err.kind())),
        };
        self.audit.record_field_lock(&FieldLockAuditEvent::new(FieldLockAuditEventParams {
            timestamp: now,
            policy_id: policy_id.get(),
            field: field.to_string(),
            action: action.as_str(),
            changed,
            error_kind,
            actor: actor.map(str::to_string),
        }));
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Returns the lock registry of a policy.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::PolicyNotFound`] for unknown policies.
    pub fn locked_fields(&self, policy_id: PolicyId) -> Result<LockRegistry, PersistError> {
        if self.store.load(policy_id)?.is_none() {
            return Err(PersistError::PolicyNotFound(policy_id));
        }
        Ok(self.store.locked_fields(policy_id)?)
    }

    /// Resolves a natural key to at most one record.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::IntegrityFault`] when more than one record matches.
    pub fn find_by_key(
        &self,
        owner_id: &OwnerId,
        insurer: &str,
        policy_number: &str,
    ) -> Result<Option<PolicyRecord>, PersistError> {
        let key = NaturalKey::new(owner_id.clone(), insurer, policy_number);
        let matches = self.store.find_by_key(&key)?;
        resolve_single(&key, matches)
    }

    /// Lists an owner's records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Storage`] when the read fails.
    pub fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<PolicyRecord>, PersistError> {
        Ok(self.store.list_by_owner(owner_id)?)
    }

    /// Loads one record.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Storage`] when the read fails.
    pub fn load(&self, policy_id: PolicyId) -> Result<Option<PolicyRecord>, PersistError> {
        Ok(self.store.load(policy_id)?)
    }

    /// Lists revisions newest first, verifying snapshot digests.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Storage`] with [`StoreError::Corrupt`] when a
    /// snapshot fails verification.
    pub fn list_revisions(&self, policy_id: PolicyId) -> Result<Vec<PolicyRevision>, PersistError> {
        Ok(self.store.list_revisions(policy_id)?)
    }

    /// Lists lock history oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Storage`] when the read fails.
    pub fn list_lock_events(
        &self,
        policy_id: PolicyId,
    ) -> Result<Vec<FieldLockEvent>, PersistError> {
        Ok(self.store.list_lock_events(policy_id)?)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reduces key matches to at most one record.
fn resolve_single(
    key: &NaturalKey,
    mut matches: Vec<PolicyRecord>,
) -> Result<Option<PolicyRecord>, PersistError> {
    match matches.len() {
        0 | 1 => Ok(matches.pop()),
        count => Err(PersistError::IntegrityFault {
            key: key.clone(),
            count,
        }),
    }
}

/// Returns the supplied date, or today with a warning.
fn default_date(
    value: Option<Date>,
    field: &str,
    today: Date,
    warnings: &mut Vec<NormalizeWarning>,
) -> Date {
    value.unwrap_or_else(|| {
        warnings.push(NormalizeWarning::new(
            field,
            WarningCode::DateDefaulted,
            format!("{field} missing on a new record; using {}", format_iso_date(today)),
        ));
        today
    })
}
