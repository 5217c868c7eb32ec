// crates/policy-vault-core/src/runtime/store.rs
// ============================================================================
// Module: Policy Vault In-Memory Store
// Description: Mutex-guarded in-memory policy store with staged transactions.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryPolicyStore`] keeps every table in one mutex-protected state.
//! A write transaction holds the mutex for its whole lifetime and works on a
//! staged copy; commit swaps the copy in, and dropping the transaction
//! discards it. Readers therefore never observe a parent without the
//! children of the same write. It is intended for tests and single-process
//! deployments, not for durable storage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::CoverageItem;
use crate::core::FieldLock;
use crate::core::FieldLockEvent;
use crate::core::FieldName;
use crate::core::InstallmentItem;
use crate::core::LockRegistry;
use crate::core::NaturalKey;
use crate::core::OwnerId;
use crate::core::PolicyHeader;
use crate::core::PolicyId;
use crate::core::PolicyRecord;
use crate::core::PolicyRevision;
use crate::interfaces::PolicyStore;
use crate::interfaces::PolicyTransaction;
use crate::interfaces::StoreError;
use crate::runtime::revisions::decode_snapshot;
use crate::runtime::revisions::snapshot_bytes;

// ============================================================================
// SECTION: State
// ============================================================================

/// Revision row with its canonical snapshot bytes.
#[derive(Debug, Clone)]
struct StoredRevision {
    /// Revision metadata as appended.
    revision: PolicyRevision,
    /// Canonical snapshot bytes covered by the digest.
    bytes: Vec<u8>,
}

/// All tables of the in-memory store.
#[derive(Debug, Default, Clone)]
struct MemoryState {
    /// Last allocated policy id.
    last_id: u64,
    /// Policy records by id.
    policies: BTreeMap<PolicyId, PolicyRecord>,
    /// Lock registries by policy id.
    locks: BTreeMap<PolicyId, LockRegistry>,
    /// Revisions by policy id, oldest first.
    revisions: BTreeMap<PolicyId, Vec<StoredRevision>>,
    /// Lock events by policy id, oldest first.
    lock_events: BTreeMap<PolicyId, Vec<FieldLockEvent>>,
}

impl MemoryState {
    /// Returns records matching a natural key.
    fn matching(&self, key: &NaturalKey) -> Vec<PolicyRecord> {
        self.policies
            .values()
            .filter(|record| record.header.natural_key() == *key)
            .cloned()
            .collect()
    }

    /// Returns a mutable record or `NotFound`.
    fn record_mut(&mut self, policy_id: PolicyId) -> Result<&mut PolicyRecord, StoreError> {
        self.policies
            .get_mut(&policy_id)
            .ok_or_else(|| StoreError::NotFound(format!("policy {policy_id}")))
    }

    /// Fails with `NotFound` when the policy does not exist.
    fn require(&self, policy_id: PolicyId) -> Result<(), StoreError> {
        if self.policies.contains_key(&policy_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("policy {policy_id}")))
        }
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory policy store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPolicyStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryPolicyStore {
    /// Creates a new in-memory policy store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Locks the state mutex.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Store("policy store mutex poisoned".to_string()))
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn begin(&self) -> Result<Box<dyn PolicyTransaction + '_>, StoreError> {
        let guard = self.lock()?;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            staged,
        }))
    }

    fn load(&self, policy_id: PolicyId) -> Result<Option<PolicyRecord>, StoreError> {
        Ok(self.lock()?.policies.get(&policy_id).cloned())
    }

    fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<PolicyRecord>, StoreError> {
        let guard = self.lock()?;
        let mut records: Vec<PolicyRecord> = guard
            .policies
            .values()
            .filter(|record| record.header.owner_id == *owner_id)
            .cloned()
            .collect();
        drop(guard);
        records.sort_by(|left, right| {
            right
                .header
                .created_at
                .cmp(&left.header.created_at)
                .then_with(|| right.policy_id.cmp(&left.policy_id))
        });
        Ok(records)
    }

    fn find_by_key(&self, key: &NaturalKey) -> Result<Vec<PolicyRecord>, StoreError> {
        Ok(self.lock()?.matching(key))
    }

    fn locked_fields(&self, policy_id: PolicyId) -> Result<LockRegistry, StoreError> {
        Ok(self.lock()?.locks.get(&policy_id).cloned().unwrap_or_default())
    }

    fn list_revisions(&self, policy_id: PolicyId) -> Result<Vec<PolicyRevision>, StoreError> {
        let guard = self.lock()?;
        let Some(stored) = guard.revisions.get(&policy_id) else {
            return Ok(Vec::new());
        };
        stored
            .iter()
            .rev()
            .map(|row| {
                let snapshot = decode_snapshot(&row.bytes, &row.revision.snapshot_hash)?;
                Ok(PolicyRevision {
                    snapshot,
                    ..row.revision.clone()
                })
            })
            .collect()
    }

    fn list_lock_events(&self, policy_id: PolicyId) -> Result<Vec<FieldLockEvent>, StoreError> {
        Ok(self.lock()?.lock_events.get(&policy_id).cloned().unwrap_or_default())
    }
}

// ============================================================================
// SECTION: Transaction
// ============================================================================

/// Staged write transaction holding the store mutex.
struct MemoryTransaction<'a> {
    /// Held mutex guard; serializes writers.
    guard: MutexGuard<'a, MemoryState>,
    /// Working copy applied on commit.
    staged: MemoryState,
}

impl PolicyTransaction for MemoryTransaction<'_> {
    fn find_by_key(&mut self, key: &NaturalKey) -> Result<Vec<PolicyRecord>, StoreError> {
        Ok(self.staged.matching(key))
    }

    fn load_policy(&mut self, policy_id: PolicyId) -> Result<Option<PolicyRecord>, StoreError> {
        Ok(self.staged.policies.get(&policy_id).cloned())
    }

    fn locked_fields(&mut self, policy_id: PolicyId) -> Result<LockRegistry, StoreError> {
        Ok(self.staged.locks.get(&policy_id).cloned().unwrap_or_default())
    }

    fn insert_policy(&mut self, header: &PolicyHeader) -> Result<PolicyId, StoreError> {
        let key = header.natural_key();
        if !self.staged.matching(&key).is_empty() {
            return Err(StoreError::Conflict(format!("natural key already exists: {key}")));
        }
        let next = self
            .staged
            .last_id
            .checked_add(1)
            .ok_or_else(|| StoreError::Store("policy id space exhausted".to_string()))?;
        let policy_id = PolicyId::from_raw(next)
            .ok_or_else(|| StoreError::Store("invalid policy id".to_string()))?;
        self.staged.last_id = next;
        self.staged.policies.insert(
            policy_id,
            PolicyRecord {
                policy_id,
                header: header.clone(),
                coverages: Vec::new(),
                installments: Vec::new(),
            },
        );
        Ok(policy_id)
    }

    fn update_policy(
        &mut self,
        policy_id: PolicyId,
        expected_version: u64,
        header: &PolicyHeader,
    ) -> Result<(), StoreError> {
        let record = self.staged.record_mut(policy_id)?;
        if record.header.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "policy {policy_id} is at version {}, expected {expected_version}",
                record.header.version
            )));
        }
        if record.header.natural_key() != header.natural_key() {
            return Err(StoreError::Invalid("natural key fields are immutable".to_string()));
        }
        record.header = header.clone();
        Ok(())
    }

    fn replace_coverages(
        &mut self,
        policy_id: PolicyId,
        coverages: &[CoverageItem],
    ) -> Result<(), StoreError> {
        self.staged.record_mut(policy_id)?.coverages = coverages.to_vec();
        Ok(())
    }

    fn replace_installments(
        &mut self,
        policy_id: PolicyId,
        installments: &[InstallmentItem],
    ) -> Result<(), StoreError> {
        let mut items = installments.to_vec();
        items.sort_by_key(|item| item.sequence);
        self.staged.record_mut(policy_id)?.installments = items;
        Ok(())
    }

    fn append_revision(&mut self, revision: &PolicyRevision) -> Result<(), StoreError> {
        self.staged.require(revision.policy_id)?;
        let bytes = snapshot_bytes(&revision.snapshot)?;
        self.staged.revisions.entry(revision.policy_id).or_default().push(StoredRevision {
            revision: revision.clone(),
            bytes,
        });
        Ok(())
    }

    fn upsert_lock(&mut self, policy_id: PolicyId, lock: &FieldLock) -> Result<(), StoreError> {
        self.staged.require(policy_id)?;
        self.staged.locks.entry(policy_id).or_default().insert(lock.clone());
        Ok(())
    }

    fn remove_lock(&mut self, policy_id: PolicyId, field: FieldName) -> Result<bool, StoreError> {
        self.staged.require(policy_id)?;
        Ok(self.staged.locks.get_mut(&policy_id).and_then(|locks| locks.remove(field)).is_some())
    }

    fn append_lock_event(&mut self, event: &FieldLockEvent) -> Result<(), StoreError> {
        self.staged.require(event.policy_id)?;
        self.staged.lock_events.entry(event.policy_id).or_default().push(event.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self {
            mut guard,
            staged,
        } = *self;
        *guard = staged;
        Ok(())
    }
}
