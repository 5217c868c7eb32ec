// crates/policy-vault-config/src/config.rs
// ============================================================================
// Module: Policy Vault Configuration
// Description: Configuration loading and validation for the policy vault.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: policy-vault-core, policy-vault-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing sections take defaults; present but invalid values fail closed.
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use policy_vault_core::EngineSettings;
use policy_vault_core::RetryPolicy;
use policy_vault_core::runtime::normalizer::DEFAULT_PREMIUM_TOLERANCE_PERCENT;
use policy_vault_core::runtime::schedule::DEFAULT_INSTALLMENT_COUNT;
use policy_vault_store_sqlite::SqliteStoreConfig;
use policy_vault_store_sqlite::SqliteStoreMode;
use policy_vault_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "policy-vault.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "POLICY_VAULT_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Largest installment count accepted for synthesized schedules.
pub(crate) const MAX_INSTALLMENT_COUNT: u32 = 120;
/// Largest premium tolerance in percent.
pub(crate) const MAX_PREMIUM_TOLERANCE_PERCENT: u8 = 100;
/// Largest retry attempt count.
pub(crate) const MAX_RETRY_ATTEMPTS: u32 = 10;
/// Largest single retry delay in milliseconds.
pub(crate) const MAX_BACKOFF_MS: u64 = 60_000;
/// Default delay after the first failed attempt (ms).
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 50;
/// Default retry delay cap (ms).
const DEFAULT_MAX_BACKOFF_MS: u64 = 1_000;
/// Default retry attempt count.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Smallest accepted busy timeout (ms).
const MIN_BUSY_TIMEOUT_MS: u64 = 10;
/// Largest accepted busy timeout (ms).
const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Policy vault configuration.
///
/// # Invariants
/// - Every section is independently validated by [`PolicyVaultConfig::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyVaultConfig {
    /// Policy store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Artifact store configuration.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    /// Ingestion defaults.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Transient failure retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl PolicyVaultConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then the `POLICY_VAULT_CONFIG`
    /// environment variable, then `policy-vault.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.artifacts.validate()?;
        self.ingest.validate()?;
        self.retry.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Returns the engine settings described by this config.
    #[must_use]
    pub const fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_installment_count: self.ingest.default_installment_count,
            premium_tolerance_percent: self.ingest.premium_tolerance_percent,
            retry: self.retry.policy(),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Policy store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory store (lost on exit).
    #[default]
    Memory,
    /// `SQLite`-backed durable store.
    Sqlite,
}

/// Policy store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Optional max revisions to retain per policy.
    #[serde(default)]
    pub max_revisions: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_revisions: None,
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_section_path("store.path", path)?;
                if !(MIN_BUSY_TIMEOUT_MS ..= MAX_BUSY_TIMEOUT_MS).contains(&self.busy_timeout_ms) {
                    return Err(ConfigError::Invalid(format!(
                        "store.busy_timeout_ms must be between {MIN_BUSY_TIMEOUT_MS} and \
                         {MAX_BUSY_TIMEOUT_MS}"
                    )));
                }
                if self.max_revisions == Some(0) {
                    return Err(ConfigError::Invalid(
                        "store max_revisions must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Returns the `SQLite` store config, or `None` for the memory backend.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match self.store_type {
            StoreType::Memory => None,
            StoreType::Sqlite => self.path.as_ref().map(|path| SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
                max_revisions: self.max_revisions,
            }),
        }
    }
}

// ============================================================================
// SECTION: Artifacts
// ============================================================================

/// Artifact store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStoreType {
    /// In-memory artifact store.
    #[default]
    Memory,
    /// Content-addressed files under a root directory.
    Filesystem,
}

/// Artifact store configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactsConfig {
    /// Artifact backend type.
    #[serde(rename = "type", default)]
    pub store_type: ArtifactStoreType,
    /// Root directory for the filesystem backend.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl ArtifactsConfig {
    /// Validates artifact store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            ArtifactStoreType::Memory => {
                if self.root.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory artifacts must not set root".to_string(),
                    ));
                }
                Ok(())
            }
            ArtifactStoreType::Filesystem => {
                let root = self.root.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("filesystem artifacts require root".to_string())
                })?;
                validate_section_path("artifacts.root", root)
            }
        }
    }
}

// ============================================================================
// SECTION: Ingest
// ============================================================================

/// Ingestion defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Installments synthesized when a candidate carries no schedule or count.
    #[serde(default = "default_installment_count")]
    pub default_installment_count: u32,
    /// Allowed deviation between premium and twelve monthly amounts (percent).
    #[serde(default = "default_premium_tolerance_percent")]
    pub premium_tolerance_percent: u8,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_installment_count: default_installment_count(),
            premium_tolerance_percent: default_premium_tolerance_percent(),
        }
    }
}

impl IngestConfig {
    /// Validates ingestion defaults.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1 ..= MAX_INSTALLMENT_COUNT).contains(&self.default_installment_count) {
            return Err(ConfigError::Invalid(format!(
                "ingest.default_installment_count must be between 1 and {MAX_INSTALLMENT_COUNT}"
            )));
        }
        if self.premium_tolerance_percent > MAX_PREMIUM_TOLERANCE_PERCENT {
            return Err(ConfigError::Invalid(format!(
                "ingest.premium_tolerance_percent must be at most {MAX_PREMIUM_TOLERANCE_PERCENT}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Retry
// ============================================================================

/// Retry configuration for transient storage and artifact failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failure (ms).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay (ms).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Validates retry bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1 ..= MAX_RETRY_ATTEMPTS).contains(&self.max_attempts) {
            return Err(ConfigError::Invalid(format!(
                "retry.max_attempts must be between 1 and {MAX_RETRY_ATTEMPTS}"
            )));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.max_backoff_ms must be at least retry.initial_backoff_ms".to_string(),
            ));
        }
        if self.max_backoff_ms > MAX_BACKOFF_MS {
            return Err(ConfigError::Invalid(format!(
                "retry.max_backoff_ms must be at most {MAX_BACKOFF_MS}"
            )));
        }
        Ok(())
    }

    /// Returns the engine retry policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// Discard audit events.
    None,
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
}

/// Audit configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditSinkType::File, Some(path)) => validate_section_path("audit.path", path),
            (AuditSinkType::None | AuditSinkType::Stderr, Some(_)) => Err(ConfigError::Invalid(
                "audit.path is only valid for the file sink".to_string(),
            )),
            (AuditSinkType::None | AuditSinkType::Stderr, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default busy timeout for the `SQLite` store (ms).
pub(crate) const fn default_store_busy_timeout_ms() -> u64 {
    5_000
}

/// Default synthesized installment count.
pub(crate) const fn default_installment_count() -> u32 {
    DEFAULT_INSTALLMENT_COUNT
}

/// Default premium tolerance.
pub(crate) const fn default_premium_tolerance_percent() -> u8 {
    DEFAULT_PREMIUM_TOLERANCE_PERCENT
}

/// Default retry attempts.
pub(crate) const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Default initial backoff.
pub(crate) const fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

/// Default backoff cap.
pub(crate) const fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the argument or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a section path against emptiness and length limits.
fn validate_section_path(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn validate_section_path_rejects_blank() {
        let err = validate_section_path("store.path", Path::new("  ")).unwrap_err();
        assert!(err.to_string().contains("store.path must be non-empty"));
    }

    #[test]
    fn validate_section_path_rejects_long_component() {
        let path = PathBuf::from("a".repeat(MAX_PATH_COMPONENT_LENGTH + 1));
        let err = validate_section_path("artifacts.root", &path).unwrap_err();
        assert!(err.to_string().contains("artifacts.root path component too long"));
    }

    #[test]
    fn validate_section_path_accepts_component_at_max() {
        let path = PathBuf::from("a".repeat(MAX_PATH_COMPONENT_LENGTH));
        assert!(validate_section_path("audit.path", &path).is_ok());
    }

    #[test]
    fn validate_path_rejects_total_length() {
        let path = PathBuf::from("a/".repeat(MAX_TOTAL_PATH_LENGTH / 2 + 1));
        assert!(matches!(validate_path(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn explicit_path_wins_resolution() {
        let resolved = resolve_path(Some(Path::new("custom.toml"))).unwrap();
        assert_eq!(resolved, PathBuf::from("custom.toml"));
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let config = PolicyVaultConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine_settings(), EngineSettings::default());
        assert!(config.store.sqlite_config().is_none());
    }
}
