// crates/policy-vault-core/src/runtime/mod.rs
// ============================================================================
// Module: Policy Vault Runtime
// Description: Normalizer, guard, persistence engine, and reference backends.
// Purpose: Commit policy candidates atomically and serve reads.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime turns a loosely-typed candidate into a committed record:
//! normalize, resolve the natural key, apply the confirmed-field guard, derive
//! status, replace sub-entities, and append a revision, all inside one store
//! transaction. In-memory and filesystem backends live here for tests and
//! single-process deployments.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod artifacts;
pub mod audit;
pub mod clock;
pub mod engine;
pub mod guard;
pub mod normalizer;
pub mod revisions;
pub mod schedule;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifacts::FileArtifactStore;
pub use artifacts::InMemoryArtifactStore;
pub use audit::FieldLockAuditEvent;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::PersistAuditSink;
pub use audit::PolicyPersistEvent;
pub use audit::StderrAuditSink;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use engine::EngineSettings;
pub use engine::PersistError;
pub use engine::PersistReport;
pub use engine::PersistSuccess;
pub use engine::PersistenceEngine;
pub use engine::ReportedError;
pub use engine::RetryPolicy;
pub use guard::InstallmentPlan;
pub use guard::WriteSet;
pub use guard::resolve_write_set;
pub use normalizer::NormalizeWarning;
pub use normalizer::Normalized;
pub use normalizer::Normalizer;
pub use normalizer::WarningCode;
pub use store::InMemoryPolicyStore;
