// crates/policy-vault-config/src/lib.rs
// ============================================================================
// Module: Policy Vault Config Library
// Description: Canonical config model, validation, and engine wiring.
// Purpose: Single source of truth for policy-vault.toml semantics.
// Dependencies: policy-vault-core, policy-vault-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `policy-vault-config` defines the configuration model for the policy vault.
//! It provides strict, fail-closed validation and assembles a ready
//! [`policy_vault_core::PersistenceEngine`] from a validated config.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod wiring;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use wiring::WiringError;
pub use wiring::build_engine;
pub use wiring::build_engine_with_clock;
