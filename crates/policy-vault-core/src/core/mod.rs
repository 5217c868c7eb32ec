// crates/policy-vault-core/src/core/mod.rs
// ============================================================================
// Module: Policy Vault Core Types
// Description: Canonical policy record model and pure domain helpers.
// Purpose: Provide stable, serializable types shared by every backend.
// Dependencies: bigdecimal, serde, time
// ============================================================================

//! ## Overview
//! Core types describe policy records, their sub-entities, field locks, and
//! revisions, together with the pure helpers (money, dates, status, hashing)
//! the persistence runtime composes. Nothing here performs I/O.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod dates;
pub mod fields;
pub mod hashing;
pub mod identifiers;
pub mod money;
pub mod record;
pub mod status;
pub mod time;
pub mod validation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dates::add_months;
pub use dates::days_between;
pub use dates::format_iso_date;
pub use dates::parse_date;
pub use fields::FieldLock;
pub use fields::FieldLockEvent;
pub use fields::FieldName;
pub use fields::LockAction;
pub use fields::LockRegistry;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::hash_bytes;
pub use hashing::hash_canonical_json;
pub use identifiers::ArtifactPath;
pub use identifiers::NaturalKey;
pub use identifiers::OwnerId;
pub use identifiers::PolicyId;
pub use money::Money;
pub use money::MoneyError;
pub use record::CanonicalRecord;
pub use record::CoverageItem;
pub use record::InstallmentItem;
pub use record::InstallmentStatus;
pub use record::PolicyFields;
pub use record::PolicyHeader;
pub use record::PolicyRecord;
pub use record::PolicyRevision;
pub use record::Provenance;
pub use record::TaxDocumentType;
pub use status::PolicyStatus;
pub use status::derive_status;
pub use time::Timestamp;
pub use validation::FieldViolation;
pub use validation::ValidationError;
pub use validation::ViolationKind;
