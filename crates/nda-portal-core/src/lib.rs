// crates/nda-portal-core/src/lib.rs
// ============================================================================
// Module: NDA Portal Core Library
// Description: Public API surface for the NDA portal authorization core.
// Purpose: Expose canonical types, persistence interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! NDA portal core defines the authorization-relevant data model of the
//! portal: the permission registry, role catalog, user contexts, agency
//! hierarchy, NDA lifecycle status matrix, and append-only audit records. It
//! performs no I/O and integrates with storage through explicit async
//! interfaces so the authorization engine stays backend-agnostic.

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

pub use interfaces::AgencyStore;
pub use interfaces::AuditStore;
pub use interfaces::DirectoryStore;
pub use interfaces::NdaStore;
pub use interfaces::PortalStore;
pub use interfaces::StoreError;
pub use runtime::InMemoryPortalStore;
