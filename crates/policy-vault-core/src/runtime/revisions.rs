// crates/policy-vault-core/src/runtime/revisions.rs
// ============================================================================
// Module: Policy Vault Revisions
// Description: Build and verify digest-protected revision snapshots.
// Purpose: Make revision history tamper-evident and fail closed on mismatch.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! A revision snapshot is the committed [`PolicyRecord`] serialized as RFC
//! 8785 canonical JSON. Stores persist those exact bytes together with their
//! SHA-256 digest, and [`decode_snapshot`] recomputes the digest on every
//! read before handing the snapshot back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::HashDigest;
use crate::core::PolicyRecord;
use crate::core::PolicyRevision;
use crate::core::Timestamp;
use crate::core::canonical_json_bytes;
use crate::core::hash_bytes;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum canonical snapshot size accepted by stores.
pub const MAX_SNAPSHOT_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Build
// ============================================================================

/// Builds the revision for a freshly committed record.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the record cannot be canonicalized or
/// exceeds [`MAX_SNAPSHOT_BYTES`].
pub fn build_revision(
    record: &PolicyRecord,
    recorded_at: Timestamp,
) -> Result<PolicyRevision, StoreError> {
    let snapshot =
        serde_json::to_value(record).map_err(|err| StoreError::Invalid(err.to_string()))?;
    let bytes = snapshot_bytes(&snapshot)?;
    Ok(PolicyRevision {
        policy_id: record.policy_id,
        version: record.header.version,
        provenance: record.header.provenance,
        artifact_hash: record.header.artifact_hash.clone(),
        extracted_at: record.header.extracted_at,
        recorded_at,
        snapshot,
        snapshot_hash: hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes),
    })
}

/// Returns the canonical bytes a store persists for a snapshot.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when canonicalization fails or the snapshot
/// exceeds [`MAX_SNAPSHOT_BYTES`].
pub fn snapshot_bytes(snapshot: &Value) -> Result<Vec<u8>, StoreError> {
    let bytes = canonical_json_bytes(snapshot).map_err(|err| StoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_SNAPSHOT_BYTES {
        return Err(StoreError::Invalid(format!(
            "revision snapshot exceeds size limit: {} bytes (max {MAX_SNAPSHOT_BYTES})",
            bytes.len()
        )));
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Verify
// ============================================================================

/// Verifies stored snapshot bytes against their digest and parses them.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] on digest mismatch or unparseable bytes.
pub fn decode_snapshot(bytes: &[u8], expected: &HashDigest) -> Result<Value, StoreError> {
    let actual = hash_bytes(expected.algorithm, bytes);
    if actual.value != expected.value {
        return Err(StoreError::Corrupt(format!(
            "revision snapshot hash mismatch: expected {}, computed {}",
            expected.value, actual.value
        )));
    }
    serde_json::from_slice(bytes).map_err(|err| StoreError::Corrupt(err.to_string()))
}
