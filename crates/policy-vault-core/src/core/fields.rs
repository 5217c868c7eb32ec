// crates/policy-vault-core/src/core/fields.rs
// ============================================================================
// Module: Policy Vault Field Locks
// Description: Lockable field names, lock records, and the per-policy registry.
// Purpose: Represent human confirmations as an explicit tagged registry.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every mutable field of a policy, plus the `coverages` and `installments`
//! collections, can be locked by an explicit confirmation. Natural-key fields
//! (`owner_id`, `insurer`, `policy_number`) are immutable and never lockable.
//! The registry is a map from [`FieldName`] to [`FieldLock`], so the guard
//! decision for a field is a single lookup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::PolicyId;
use crate::core::time::Timestamp;
use crate::core::validation::ValidationError;
use crate::core::validation::ViolationKind;

// ============================================================================
// SECTION: Field Names
// ============================================================================

/// Lockable policy field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    /// Insured party name.
    InsuredName,
    /// Tax document id.
    InsuredDocument,
    /// Tax document type.
    DocumentType,
    /// Contact phone.
    Phone,
    /// Contact email.
    Email,
    /// Vigency start.
    StartDate,
    /// Vigency end.
    EndDate,
    /// Annual premium.
    Premium,
    /// Monthly amount.
    MonthlyAmount,
    /// Deductible.
    Deductible,
    /// Vehicle model.
    VehicleModel,
    /// Vehicle plate.
    VehiclePlate,
    /// Vehicle year.
    VehicleYear,
    /// Coverage collection.
    Coverages,
    /// Installment collection.
    Installments,
}

/// Field names that form the natural key.
const NATURAL_KEY_FIELDS: [&str; 4] = ["owner_id", "insurer", "insurer_key", "policy_number"];

impl FieldName {
    /// All lockable fields.
    pub const ALL: [Self; 15] = [
        Self::InsuredName,
        Self::InsuredDocument,
        Self::DocumentType,
        Self::Phone,
        Self::Email,
        Self::StartDate,
        Self::EndDate,
        Self::Premium,
        Self::MonthlyAmount,
        Self::Deductible,
        Self::VehicleModel,
        Self::VehiclePlate,
        Self::VehicleYear,
        Self::Coverages,
        Self::Installments,
    ];

    /// Returns the canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsuredName => "insured_name",
            Self::InsuredDocument => "insured_document",
            Self::DocumentType => "document_type",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::StartDate => "start_date",
            Self::EndDate => "end_date",
            Self::Premium => "premium",
            Self::MonthlyAmount => "monthly_amount",
            Self::Deductible => "deductible",
            Self::VehicleModel => "vehicle_model",
            Self::VehiclePlate => "vehicle_plate",
            Self::VehicleYear => "vehicle_year",
            Self::Coverages => "coverages",
            Self::Installments => "installments",
        }
    }

    /// Parses a lockable field name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] with [`ViolationKind::UnknownField`] for
    /// unknown names and natural-key fields.
    pub fn parse_lockable(raw: &str) -> Result<Self, ValidationError> {
        let name = raw.trim();
        if let Some(field) = Self::ALL.iter().copied().find(|field| field.as_str() == name) {
            return Ok(field);
        }
        let message = if NATURAL_KEY_FIELDS.contains(&name) {
            "natural-key fields are immutable and cannot be locked"
        } else {
            "unknown field name"
        };
        Err(ValidationError::single(name, ViolationKind::UnknownField, message))
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse_lockable(raw)
    }
}

// ============================================================================
// SECTION: Locks
// ============================================================================

/// Confirmation lock on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLock {
    /// Locked field.
    pub field: FieldName,
    /// Confirmation time.
    pub confirmed_at: Timestamp,
    /// Confirming actor, when known.
    pub confirmed_by: Option<String>,
}

/// Per-policy lock registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockRegistry(BTreeMap<FieldName, FieldLock>);

impl LockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns true when the field is locked.
    #[must_use]
    pub fn is_locked(&self, field: FieldName) -> bool {
        self.0.contains_key(&field)
    }

    /// Returns the lock for a field.
    #[must_use]
    pub fn get(&self, field: FieldName) -> Option<&FieldLock> {
        self.0.get(&field)
    }

    /// Inserts or replaces a lock.
    pub fn insert(&mut self, lock: FieldLock) {
        self.0.insert(lock.field, lock);
    }

    /// Removes a lock, returning it when present.
    pub fn remove(&mut self, field: FieldName) -> Option<FieldLock> {
        self.0.remove(&field)
    }

    /// Iterates locks in field order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldLock> {
        self.0.values()
    }

    /// Returns the locked field names in field order.
    #[must_use]
    pub fn fields(&self) -> Vec<FieldName> {
        self.0.keys().copied().collect()
    }

    /// Returns the number of locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no field is locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<FieldLock> for LockRegistry {
    fn from_iter<I: IntoIterator<Item = FieldLock>>(iter: I) -> Self {
        let mut registry = Self::new();
        for lock in iter {
            registry.insert(lock);
        }
        registry
    }
}

// ============================================================================
// SECTION: Lock Events
// ============================================================================

/// Confirmation action recorded in lock history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockAction {
    /// Field confirmed.
    Confirm,
    /// Confirmation removed.
    Unconfirm,
}

impl LockAction {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Unconfirm => "unconfirm",
        }
    }

    /// Parses a stored label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "confirm" => Some(Self::Confirm),
            "unconfirm" => Some(Self::Unconfirm),
            _ => None,
        }
    }
}

/// Append-only lock history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLockEvent {
    /// Policy the event belongs to.
    pub policy_id: PolicyId,
    /// Affected field.
    pub field: FieldName,
    /// Action taken.
    pub action: LockAction,
    /// Event time.
    pub recorded_at: Timestamp,
    /// Acting user, when known.
    pub actor: Option<String>,
}
