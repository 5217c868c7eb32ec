// crates/policy-vault-core/src/core/record.rs
// ============================================================================
// Module: Policy Vault Record Model
// Description: Policy records, sub-entities, candidates, and revisions.
// Purpose: Define the canonical shapes exchanged between normalizer, guard, and stores.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! A [`PolicyRecord`] is a [`PolicyHeader`] plus its coverage and installment
//! collections. [`CanonicalRecord`] is the normalizer output: every mutable
//! value is optional, and `None` means the candidate did not supply it.
//! [`PolicyRevision`] is an append-only snapshot of a committed record.
//!
//! Invariants:
//! - `end_date` is strictly after `start_date` on every stored header.
//! - `version` starts at 1 and increases by one per committed update.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::Date;

use crate::core::dates::iso_date;
use crate::core::hashing::HashDigest;
use crate::core::identifiers::ArtifactPath;
use crate::core::identifiers::NaturalKey;
use crate::core::identifiers::OwnerId;
use crate::core::identifiers::PolicyId;
use crate::core::money::Money;
use crate::core::status::PolicyStatus;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Kind of tax document identifying the insured party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxDocumentType {
    /// Individual taxpayer registry (11 digits).
    Cpf,
    /// Company registry (14 digits).
    Cnpj,
    /// Any other document.
    Other,
}

impl TaxDocumentType {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpf => "cpf",
            Self::Cnpj => "cnpj",
            Self::Other => "other",
        }
    }

    /// Infers the document type from the digit count of a document id.
    #[must_use]
    pub fn infer(document: &str) -> Self {
        match document.chars().filter(char::is_ascii_digit).count() {
            11 => Self::Cpf,
            14 => Self::Cnpj,
            _ => Self::Other,
        }
    }
}

impl FromStr for TaxDocumentType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cpf" => Ok(Self::Cpf),
            "cnpj" => Ok(Self::Cnpj),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown document type: {other}")),
        }
    }
}

/// Origin of the most recent write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Automated document extraction.
    #[default]
    Extraction,
    /// Manual entry or edit.
    Manual,
}

impl Provenance {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for Provenance {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "extraction" => Ok(Self::Extraction),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown provenance: {other}")),
        }
    }
}

/// Payment state of one installment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    /// Not yet due or not yet paid.
    #[default]
    Upcoming,
    /// Paid.
    Paid,
    /// Past due and unpaid.
    Overdue,
    /// Cancelled.
    Cancelled,
}

impl InstallmentStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallmentStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "upcoming" => Ok(Self::Upcoming),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown installment status: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Sub-Entities
// ============================================================================

/// One coverage line of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageItem {
    /// Coverage description.
    pub description: String,
    /// Optional coverage limit.
    pub limit: Option<Money>,
}

/// One scheduled installment of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentItem {
    /// 1-based sequence number.
    pub sequence: u32,
    /// Installment amount.
    pub amount: Money,
    /// Due date.
    #[serde(with = "iso_date")]
    pub due_date: Date,
    /// Payment state.
    pub status: InstallmentStatus,
}

// ============================================================================
// SECTION: Mutable Fields
// ============================================================================

/// Mutable, individually lockable scalar fields of a policy.
///
/// Vigency dates are lockable too but live on [`PolicyHeader`] because a
/// stored record always has them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFields {
    /// Insured party name.
    pub insured_name: Option<String>,
    /// Tax document id of the insured party.
    pub insured_document: Option<String>,
    /// Tax document type.
    pub document_type: Option<TaxDocumentType>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Annual premium.
    pub premium: Option<Money>,
    /// Monthly installment amount.
    pub monthly_amount: Option<Money>,
    /// Deductible amount.
    pub deductible: Option<Money>,
    /// Vehicle model.
    pub vehicle_model: Option<String>,
    /// Vehicle plate.
    pub vehicle_plate: Option<String>,
    /// Vehicle model year.
    pub vehicle_year: Option<i32>,
}

// ============================================================================
// SECTION: Stored Record
// ============================================================================

/// Policy record header (everything except sub-entity collections).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyHeader {
    /// Owning account.
    pub owner_id: OwnerId,
    /// Insurer display name.
    pub insurer: String,
    /// Upper-cased insurer comparison key.
    pub insurer_key: String,
    /// Policy number.
    pub policy_number: String,
    /// Mutable scalar fields.
    pub fields: PolicyFields,
    /// Vigency start.
    #[serde(with = "iso_date")]
    pub start_date: Date,
    /// Vigency end.
    #[serde(with = "iso_date")]
    pub end_date: Date,
    /// Derived lifecycle status.
    pub status: PolicyStatus,
    /// Source artifact content hash (lowercase hex).
    pub artifact_hash: Option<String>,
    /// Source artifact location.
    pub artifact_path: Option<ArtifactPath>,
    /// Record version, starting at 1.
    pub version: u64,
    /// Origin of the latest write.
    pub provenance: Provenance,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
    /// Last extraction time.
    pub extracted_at: Option<Timestamp>,
}

impl PolicyHeader {
    /// Returns the natural key of this header.
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            owner_id: self.owner_id.clone(),
            insurer_key: self.insurer_key.clone(),
            policy_number: self.policy_number.clone(),
        }
    }
}

/// Stored policy record with its sub-entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Storage identifier.
    pub policy_id: PolicyId,
    /// Header values.
    pub header: PolicyHeader,
    /// Coverage lines in stored order.
    pub coverages: Vec<CoverageItem>,
    /// Installments ordered by sequence.
    pub installments: Vec<InstallmentItem>,
}

// ============================================================================
// SECTION: Canonical Candidate
// ============================================================================

/// Normalized candidate record.
///
/// # Invariants
/// - `insurer` and `policy_number` are trimmed and non-empty.
/// - `insurer_key` is the upper-cased insurer.
/// - Installments, when present, have unique sequence numbers in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    /// Insurer display name.
    pub insurer: String,
    /// Upper-cased insurer comparison key.
    pub insurer_key: String,
    /// Policy number.
    pub policy_number: String,
    /// Supplied scalar fields.
    pub fields: PolicyFields,
    /// Supplied vigency start.
    pub start_date: Option<Date>,
    /// Supplied vigency end.
    pub end_date: Option<Date>,
    /// Supplied coverage list.
    pub coverages: Option<Vec<CoverageItem>>,
    /// Supplied installment schedule.
    pub installments: Option<Vec<InstallmentItem>>,
    /// Explicit installment count for schedule synthesis.
    pub installment_count: Option<u32>,
    /// Origin of the candidate.
    pub provenance: Provenance,
}

// ============================================================================
// SECTION: Revisions
// ============================================================================

/// Append-only snapshot of a committed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRevision {
    /// Policy the revision belongs to.
    pub policy_id: PolicyId,
    /// Record version captured.
    pub version: u64,
    /// Origin of the write.
    pub provenance: Provenance,
    /// Artifact hash at the time of the write.
    pub artifact_hash: Option<String>,
    /// Extraction time at the time of the write.
    pub extracted_at: Option<Timestamp>,
    /// Time the revision was recorded.
    pub recorded_at: Timestamp,
    /// Snapshot of the committed record.
    pub snapshot: Value,
    /// Digest over the canonical JSON of `snapshot`.
    pub snapshot_hash: HashDigest,
}

