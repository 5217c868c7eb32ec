// crates/policy-vault-core/src/lib.rs
// ============================================================================
// Module: Policy Vault Core Library
// Description: Public API surface for the Policy Vault core.
// Purpose: Expose record types, interfaces, and the persistence runtime.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Policy Vault core commits loosely-typed insurance policy candidates to a
//! system of record. It guarantees one record per natural key
//! `(owner, insurer, policy number)`, never lets automated ingestion overwrite
//! human-confirmed fields, derives lifecycle status deterministically, and
//! keeps a digest-verified revision history of every committed write.
//!
//! Storage, artifact blobs, time, and audit logging are reached through
//! explicit interfaces so backends can be swapped without touching the write
//! path.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::ArtifactError;
pub use interfaces::ArtifactStore;
pub use interfaces::Clock;
pub use interfaces::PolicyStore;
pub use interfaces::PolicyTransaction;
pub use interfaces::StoreError;
pub use runtime::EngineSettings;
pub use runtime::FileArtifactStore;
pub use runtime::FileAuditSink;
pub use runtime::FixedClock;
pub use runtime::InMemoryArtifactStore;
pub use runtime::InMemoryPolicyStore;
pub use runtime::NoopAuditSink;
pub use runtime::PersistAuditSink;
pub use runtime::PersistError;
pub use runtime::PersistReport;
pub use runtime::PersistSuccess;
pub use runtime::PersistenceEngine;
pub use runtime::RetryPolicy;
pub use runtime::StderrAuditSink;
pub use runtime::SystemClock;
