// crates/nda-portal-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Portal Store
// Description: Durable portal store backend using SQLite WAL.
// Purpose: Provide production-grade persistence for the NDA portal core.
// Dependencies: nda-portal-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed implementation of every portal store
//! interface: contacts and roles, the agency hierarchy and grants, NDA records
//! with their status history, and the append-only audit log. Status changes
//! commit the record update and history row in one transaction. Security
//! posture: database contents are untrusted and decoding fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_AUDIT_DETAILS_BYTES;
pub use store::SqlitePortalStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
