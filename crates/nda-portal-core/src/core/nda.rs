// crates/nda-portal-core/src/core/nda.rs
// ============================================================================
// Module: NDA Records
// Description: The protected NDA entity and its append-only status history.
// Purpose: Define record shapes read and mutated through scoped access paths.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every NDA carries exactly one owning subagency (the scoping key) and a
//! lifecycle status. Status changes are committed together with a history
//! entry through [`StatusChange`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ContactId;
use crate::core::identifiers::NdaId;
use crate::core::identifiers::SubagencyId;
use crate::core::status::NdaStatus;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Records
// ============================================================================

/// NDA record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdaRecord {
    /// Record identifier.
    pub id: NdaId,
    /// Human-facing sequential number.
    pub display_id: u64,
    /// Owning subagency.
    pub subagency_id: SubagencyId,
    /// Counterparty company name.
    pub company_name: String,
    /// Current lifecycle status.
    pub status: NdaStatus,
    /// Set when the record entered `FullyExecuted`.
    pub fully_executed_at: Option<Timestamp>,
    /// Creating contact, when known.
    pub created_by: Option<ContactId>,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Append-only status history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    /// Record the entry belongs to.
    pub nda_id: NdaId,
    /// Status entered.
    pub status: NdaStatus,
    /// Contact that caused the change, when known.
    pub changed_by: Option<ContactId>,
    /// Change time.
    pub changed_at: Timestamp,
}

/// Atomic status update applied by the store.
///
/// # Invariants
/// - The store applies the change only while the record is still in
///   `expected_status`; the status update and history append commit together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// Target record.
    pub nda_id: NdaId,
    /// Status the record must currently hold.
    pub expected_status: NdaStatus,
    /// Status to enter.
    pub new_status: NdaStatus,
    /// Acting contact.
    pub changed_by: Option<ContactId>,
    /// Change time.
    pub changed_at: Timestamp,
    /// Completion time recorded on entering `FullyExecuted`.
    pub fully_executed_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Filter for bulk NDA reads, applied in addition to the scope filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NdaQuery {
    /// Restrict to a single status.
    pub status: Option<NdaStatus>,
    /// Maximum number of records returned.
    pub limit: Option<usize>,
}

impl NdaQuery {
    /// Returns true when the record satisfies the non-scope criteria.
    #[must_use]
    pub fn matches(&self, record: &NdaRecord) -> bool {
        self.status.is_none_or(|status| status == record.status)
    }
}
