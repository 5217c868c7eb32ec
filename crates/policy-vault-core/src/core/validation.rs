// crates/policy-vault-core/src/core/validation.rs
// ============================================================================
// Module: Policy Vault Validation Errors
// Description: Collect-all field violations raised before any write.
// Purpose: Report every offending field of a candidate in one error.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A [`ValidationError`] always carries at least one [`FieldViolation`].
//! Field paths use the canonical snake_case names, with list elements as
//! `coverages[2].description`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Violations
// ============================================================================

/// Category of a field violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Required field absent or blank.
    MissingRequiredField,
    /// End date not strictly after start date.
    InvalidDateOrder,
    /// Value has the wrong type or is out of range.
    InvalidValue,
    /// Field name is not known or not lockable.
    UnknownField,
}

impl ViolationKind {
    /// Returns the stable label for reports and audit events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingRequiredField => "missing_required_field",
            Self::InvalidDateOrder => "invalid_date_order",
            Self::InvalidValue => "invalid_value",
            Self::UnknownField => "unknown_field",
        }
    }
}

/// One offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Field path.
    pub field: String,
    /// Violation category.
    pub kind: ViolationKind,
    /// Human-readable detail.
    pub message: String,
}

impl FieldViolation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(field: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Validation Error
// ============================================================================

/// Validation failure listing every offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", summarize(.violations))]
pub struct ValidationError {
    /// Offending fields in discovery order.
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// Wraps a list of violations.
    #[must_use]
    pub const fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    /// Creates an error with a single violation.
    #[must_use]
    pub fn single(
        field: impl Into<String>,
        kind: ViolationKind,
        message: impl Into<String>,
    ) -> Self {
        Self::new(vec![FieldViolation::new(field, kind, message)])
    }
}

/// Formats violations as `field (kind)` pairs.
fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|violation| format!("{} ({})", violation.field, violation.kind.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}
