// crates/nda-portal-core/src/runtime/mod.rs
// ============================================================================
// Module: NDA Portal Runtime Helpers
// Description: Reference implementations of the portal interfaces.
// Purpose: Provide a deterministic store for tests and local demos.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime helpers implement the portal interfaces without external
//! dependencies so the authorization engine can be exercised in isolation.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::InMemoryPortalStore;
