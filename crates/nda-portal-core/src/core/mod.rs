// crates/nda-portal-core/src/core/mod.rs
// ============================================================================
// Module: NDA Portal Core Types
// Description: Canonical data model for authorization, scoping, and audit.
// Purpose: Group the pure data types shared by every portal crate.
// Dependencies: serde, serde_json, uuid
// ============================================================================

//! ## Overview
//! Core types are plain data with no side effects. Lookups over static
//! catalogs (permissions, status matrix) are pure functions.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod agency;
pub mod audit;
pub mod context;
pub mod identifiers;
pub mod nda;
pub mod permissions;
pub mod roles;
pub mod status;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use agency::*;
pub use audit::*;
pub use context::*;
pub use identifiers::*;
pub use nda::*;
pub use permissions::*;
pub use roles::*;
pub use status::*;
pub use time::*;
