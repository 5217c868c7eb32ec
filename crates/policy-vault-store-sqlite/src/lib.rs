// crates/policy-vault-store-sqlite/src/lib.rs
// ============================================================================
// Module: Policy Vault SQLite Store Library
// Description: Durable SQLite-backed PolicyStore.
// Purpose: Expose the SQLite store and its configuration.
// Dependencies: policy-vault-core, rusqlite
// ============================================================================

//! ## Overview
//! Durable [`policy_vault_core::PolicyStore`] implementation backed by
//! `SQLite`. Natural-key uniqueness is enforced by a unique index, writers are
//! serialized with `BEGIN IMMEDIATE`, and revision snapshots are verified
//! against their stored digest on every read.

pub mod store;

pub use store::SqlitePolicyStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
