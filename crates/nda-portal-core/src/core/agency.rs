// crates/nda-portal-core/src/core/agency.rs
// ============================================================================
// Module: Agency Model
// Description: Agency groups, subagencies, access grants, and scope filters.
// Purpose: Define the organizational hierarchy that scopes NDA visibility.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Subagencies are the unit of access-control granularity: every NDA belongs
//! to exactly one. Users reach subagencies either through a direct grant or
//! through a grant on the owning agency group; the effective access is the
//! union of both. [`ScopeFilter`] is the query-side form of a resolved scope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AgencyGroupId;
use crate::core::identifiers::ContactId;
use crate::core::identifiers::SubagencyId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Hierarchy
// ============================================================================

/// Named organizational cluster owning zero or more subagencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyGroup {
    /// Group identifier.
    pub id: AgencyGroupId,
    /// Display name.
    pub name: String,
    /// Short unique code (e.g. `DoD`).
    pub code: String,
}

/// Finest-grained organizational unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subagency {
    /// Subagency identifier.
    pub id: SubagencyId,
    /// Owning agency group.
    pub agency_group_id: AgencyGroupId,
    /// Display name.
    pub name: String,
    /// Short code, unique within the group.
    pub code: String,
}

// ============================================================================
// SECTION: Grants
// ============================================================================

/// Target of an agency access grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum GrantTarget {
    /// Grant on a whole agency group.
    AgencyGroup(AgencyGroupId),
    /// Grant on a single subagency.
    Subagency(SubagencyId),
}

/// Access grant from a contact to a group or subagency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyGrant {
    /// Contact receiving access.
    pub contact_id: ContactId,
    /// Granted group or subagency.
    pub target: GrantTarget,
    /// Contact that created the grant, when known.
    pub granted_by: Option<ContactId>,
    /// Grant time.
    pub granted_at: Timestamp,
}

/// Group grant with the group's current subagency membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    /// Granted agency group.
    pub agency_group_id: AgencyGroupId,
    /// Subagencies currently owned by the group.
    pub subagencies: BTreeSet<SubagencyId>,
}

/// Raw grant edges for one contact, as read from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEdges {
    /// Directly granted subagencies.
    pub direct_subagencies: BTreeSet<SubagencyId>,
    /// Granted agency groups with their subagencies.
    pub groups: Vec<GroupMembership>,
}

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Resolved set of subagencies a user may access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyScope {
    /// Authorized subagency identifiers.
    pub subagency_ids: BTreeSet<SubagencyId>,
}

impl AgencyScope {
    /// Returns an empty scope.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            subagency_ids: BTreeSet::new(),
        }
    }

    /// Returns the union of direct grants and group memberships.
    #[must_use]
    pub fn from_edges(edges: GrantEdges) -> Self {
        let mut subagency_ids = edges.direct_subagencies;
        for group in edges.groups {
            subagency_ids.extend(group.subagencies);
        }
        Self {
            subagency_ids,
        }
    }

    /// Returns true when the scope contains the subagency.
    #[must_use]
    pub fn contains(&self, subagency_id: &SubagencyId) -> bool {
        self.subagency_ids.contains(subagency_id)
    }

    /// Returns true when no subagency is authorized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subagency_ids.is_empty()
    }
}

/// Query constraint derived from a user's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "subagency_ids", rename_all = "snake_case")]
pub enum ScopeFilter {
    /// Matches every record.
    Unrestricted,
    /// Matches records owned by one of the listed subagencies.
    Subagencies(BTreeSet<SubagencyId>),
}

impl ScopeFilter {
    /// Builds a filter that matches nothing.
    #[must_use]
    pub const fn deny_all() -> Self {
        Self::Subagencies(BTreeSet::new())
    }

    /// Returns true when a record owned by `subagency_id` passes the filter.
    #[must_use]
    pub fn permits(&self, subagency_id: &SubagencyId) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Subagencies(ids) => ids.contains(subagency_id),
        }
    }
}

impl From<AgencyScope> for ScopeFilter {
    fn from(scope: AgencyScope) -> Self {
        Self::Subagencies(scope.subagency_ids)
    }
}

// ============================================================================
// SECTION: Access Listing
// ============================================================================

/// How a contact reaches a subagency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "access_type", rename_all = "snake_case")]
pub enum AccessSource {
    /// Direct subagency grant.
    Direct,
    /// Grant on the owning agency group.
    Inherited {
        /// Group the access is inherited from.
        agency_group_id: AgencyGroupId,
    },
}

/// Contact with access to a subagency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubagencyAccessEntry {
    /// Contact identifier.
    pub contact_id: ContactId,
    /// Contact email.
    pub email: String,
    /// Access source.
    pub source: AccessSource,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
