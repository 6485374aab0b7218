// crates/nda-portal-config/src/lib.rs
// ============================================================================
// Module: NDA Portal Config
// Description: Canonical configuration model for the NDA portal core.
// Purpose: Single source of truth for config loading and validation.
// Dependencies: nda-portal-core, nda-portal-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `nda-portal-config` defines the portal configuration model and its
//! fail-closed loader. Every section carries defaults so an empty file yields
//! a usable in-memory development setup, while validation rejects oversized
//! token tables, empty role names, and incomplete storage wiring.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditConfig;
pub use config::AuditMirrorType;
pub use config::AuthConfig;
pub use config::AuthTokenConfig;
pub use config::ConfigError;
pub use config::PortalConfig;
pub use config::RolesConfig;
pub use config::SecurityConfig;
pub use config::StoreConfig;
pub use config::StoreType;
