// crates/policy-vault-config/src/wiring.rs
// ============================================================================
// Module: Engine Wiring
// Description: Assembles a persistence engine from validated configuration.
// Purpose: Map config sections onto concrete store, artifact, and audit backends.
// Dependencies: policy-vault-core, policy-vault-store-sqlite, thiserror
// ============================================================================

//! ## Overview
//! [`build_engine`] validates the config again, opens the configured policy
//! store, artifact store, and audit sink, and returns a ready
//! [`PersistenceEngine`]. Backends that fail to open surface as
//! [`WiringError`] without partially constructed state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use policy_vault_core::ArtifactError;
use policy_vault_core::ArtifactStore;
use policy_vault_core::Clock;
use policy_vault_core::FileArtifactStore;
use policy_vault_core::FileAuditSink;
use policy_vault_core::InMemoryArtifactStore;
use policy_vault_core::InMemoryPolicyStore;
use policy_vault_core::NoopAuditSink;
use policy_vault_core::PersistAuditSink;
use policy_vault_core::PersistenceEngine;
use policy_vault_core::PolicyStore;
use policy_vault_core::StderrAuditSink;
use policy_vault_core::SystemClock;
use policy_vault_store_sqlite::SqlitePolicyStore;
use policy_vault_store_sqlite::SqliteStoreError;
use thiserror::Error;

use crate::config::ArtifactStoreType;
use crate::config::AuditSinkType;
use crate::config::ConfigError;
use crate::config::PolicyVaultConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while assembling an engine.
#[derive(Debug, Error)]
pub enum WiringError {
    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The `SQLite` store could not be opened.
    #[error("policy store unavailable: {0}")]
    Store(#[from] SqliteStoreError),
    /// The artifact store could not be opened.
    #[error("artifact store unavailable: {0}")]
    Artifacts(#[from] ArtifactError),
    /// The audit sink could not be opened.
    #[error("audit sink unavailable: {0}")]
    Audit(String),
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

/// Builds an engine on the system clock.
///
/// # Errors
///
/// Returns [`WiringError`] when the config is invalid or a backend fails to open.
pub fn build_engine(config: &PolicyVaultConfig) -> Result<PersistenceEngine, WiringError> {
    build_engine_with_clock(config, Arc::new(SystemClock))
}

/// Builds an engine on the given clock.
///
/// # Errors
///
/// Returns [`WiringError`] when the config is invalid or a backend fails to open.
pub fn build_engine_with_clock(
    config: &PolicyVaultConfig,
    clock: Arc<dyn Clock>,
) -> Result<PersistenceEngine, WiringError> {
    config.validate()?;
    let store = open_store(config)?;
    let artifacts = open_artifacts(config)?;
    let audit = open_audit(config)?;
    Ok(PersistenceEngine::new(store, artifacts, clock, audit, config.engine_settings()))
}

/// Opens the configured policy store.
fn open_store(config: &PolicyVaultConfig) -> Result<Arc<dyn PolicyStore>, WiringError> {
    match config.store.sqlite_config() {
        Some(sqlite) => Ok(Arc::new(SqlitePolicyStore::new(sqlite)?)),
        None => Ok(Arc::new(InMemoryPolicyStore::new())),
    }
}

/// Opens the configured artifact store.
fn open_artifacts(config: &PolicyVaultConfig) -> Result<Arc<dyn ArtifactStore>, WiringError> {
    match (config.artifacts.store_type, &config.artifacts.root) {
        (ArtifactStoreType::Filesystem, Some(root)) => {
            Ok(Arc::new(FileArtifactStore::new(root.clone())?))
        }
        (ArtifactStoreType::Filesystem, None) => {
            Err(ConfigError::Invalid("filesystem artifacts require root".to_string()).into())
        }
        (ArtifactStoreType::Memory, _) => Ok(Arc::new(InMemoryArtifactStore::new())),
    }
}

/// Opens the configured audit sink.
fn open_audit(config: &PolicyVaultConfig) -> Result<Arc<dyn PersistAuditSink>, WiringError> {
    match (config.audit.sink, &config.audit.path) {
        (AuditSinkType::File, Some(path)) => {
            let sink = FileAuditSink::new(path).map_err(|err| WiringError::Audit(err.to_string()))?;
            Ok(Arc::new(sink))
        }
        (AuditSinkType::File, None) => {
            Err(ConfigError::Invalid("file audit sink requires path".to_string()).into())
        }
        (AuditSinkType::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
        (AuditSinkType::None, _) => Ok(Arc::new(NoopAuditSink)),
    }
}
