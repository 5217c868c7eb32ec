// crates/policy-vault-core/src/core/identifiers.rs
// ============================================================================
// Module: Policy Vault Identifiers
// Description: Owner, policy, natural-key, and artifact identifiers.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque wrappers. [`NaturalKey`] is the only one with
//! behavior: it canonicalizes the insurer comparison key and the policy number
//! so key resolution is insensitive to casing and surrounding whitespace.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Owner Identifier
// ============================================================================

/// Account that owns a policy record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates a new owner identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Policy Identifier
// ============================================================================

/// Storage-assigned policy record identifier.
///
/// # Invariants
/// - Always non-zero; backends allocate identifiers starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(NonZeroU64);

impl PolicyId {
    /// Creates a policy identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a policy identifier from a raw value, rejecting zero.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Natural Key
// ============================================================================

/// Natural key identifying one live policy record.
///
/// # Invariants
/// - `insurer_key` is trimmed and upper-cased.
/// - `policy_number` is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    /// Owning account.
    pub owner_id: OwnerId,
    /// Upper-cased insurer comparison key.
    pub insurer_key: String,
    /// Trimmed policy number.
    pub policy_number: String,
}

impl NaturalKey {
    /// Builds a natural key, canonicalizing the insurer and policy number.
    #[must_use]
    pub fn new(owner_id: OwnerId, insurer: &str, policy_number: &str) -> Self {
        Self {
            owner_id,
            insurer_key: insurer_key(insurer),
            policy_number: policy_number.trim().to_string(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner_id, self.insurer_key, self.policy_number)
    }
}

/// Returns the comparison key for an insurer display name.
#[must_use]
pub fn insurer_key(insurer: &str) -> String {
    insurer.trim().to_uppercase()
}

// ============================================================================
// SECTION: Artifact Path
// ============================================================================

/// Location of a stored source artifact, as reported by the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactPath(String);

impl ArtifactPath {
    /// Creates a new artifact path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
