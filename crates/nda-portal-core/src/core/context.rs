// crates/nda-portal-core/src/core/context.rs
// ============================================================================
// Module: User Context
// Description: Authorization-relevant projection of an authenticated user.
// Purpose: Aggregate roles, permissions, and direct agency grants per user.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`ContactProfile`] is the raw directory record returned by storage: the
//! contact with its roles (each carrying its permission bundle) and both kinds
//! of agency grants. [`UserContext::from_profile`] collapses it into the
//! per-request projection used by every authorization decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AgencyGroupId;
use crate::core::identifiers::ContactId;
use crate::core::identifiers::SubagencyId;
use crate::core::identifiers::SubjectId;
use crate::core::roles::RoleRecord;

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Minimal identity produced by the authentication gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// External subject identifier.
    pub subject_id: SubjectId,
    /// Verified email address.
    pub email: String,
}

// ============================================================================
// SECTION: Directory Records
// ============================================================================

/// Contact record with roles and direct agency grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactProfile {
    /// Internal contact identifier.
    pub contact_id: ContactId,
    /// External subject identifier, when linked.
    pub subject_id: Option<SubjectId>,
    /// Contact email.
    pub email: String,
    /// Display name, when known.
    pub name: Option<String>,
    /// False once the contact has been deactivated.
    pub active: bool,
    /// Assigned roles in assignment order.
    pub roles: Vec<RoleRecord>,
    /// Directly granted agency groups.
    pub agency_group_grants: BTreeSet<AgencyGroupId>,
    /// Directly granted subagencies.
    pub subagency_grants: BTreeSet<SubagencyId>,
}

/// Contact row without roles or grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Internal contact identifier.
    pub contact_id: ContactId,
    /// External subject identifier, when linked.
    pub subject_id: Option<SubjectId>,
    /// Contact email.
    pub email: String,
    /// Display name, when known.
    pub name: Option<String>,
    /// False once the contact has been deactivated.
    pub active: bool,
}

impl ContactRecord {
    /// Builds an active contact linked to an external subject.
    #[must_use]
    pub fn linked(
        contact_id: impl Into<ContactId>,
        subject_id: impl Into<SubjectId>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            contact_id: contact_id.into(),
            subject_id: Some(subject_id.into()),
            email: email.into(),
            name: None,
            active: true,
        }
    }
}

/// Fields used to provision a contact on first login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    /// Identifier assigned to the new contact.
    pub contact_id: ContactId,
    /// External subject identifier.
    pub subject_id: SubjectId,
    /// Contact email.
    pub email: String,
    /// Initial role name.
    pub role_name: String,
}

// ============================================================================
// SECTION: User Context
// ============================================================================

/// Authorization projection of an authenticated user.
///
/// # Invariants
/// - `permissions` is the union of the permission bundles of every role in
///   `roles` at the time the context was built.
/// - `authorized_subagencies` holds direct grants only; group membership is
///   expanded by the agency scope resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// External subject identifier.
    pub subject_id: SubjectId,
    /// Contact email.
    pub email: String,
    /// Internal contact identifier.
    pub contact_id: ContactId,
    /// Display name, when known.
    pub name: Option<String>,
    /// False once the contact has been deactivated.
    pub active: bool,
    /// Role names in assignment order, without duplicates.
    pub roles: Vec<String>,
    /// Aggregated permission codes.
    pub permissions: BTreeSet<String>,
    /// Directly granted agency groups.
    pub authorized_agency_groups: BTreeSet<AgencyGroupId>,
    /// Directly granted subagencies.
    pub authorized_subagencies: BTreeSet<SubagencyId>,
}

impl UserContext {
    /// Builds a context from a directory profile for the given identity.
    #[must_use]
    pub fn from_profile(subject_id: SubjectId, profile: ContactProfile) -> Self {
        let mut roles: Vec<String> = Vec::with_capacity(profile.roles.len());
        let mut permissions = BTreeSet::new();
        for role in profile.roles {
            permissions.extend(role.permissions);
            if !roles.contains(&role.name) {
                roles.push(role.name);
            }
        }
        Self {
            subject_id,
            email: profile.email,
            contact_id: profile.contact_id,
            name: profile.name,
            active: profile.active,
            roles,
            permissions,
            authorized_agency_groups: profile.agency_group_grants,
            authorized_subagencies: profile.subagency_grants,
        }
    }

    /// Returns true when the user holds the named role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|held| held == role)
    }

    /// Returns true when the aggregated permissions contain `code`.
    ///
    /// This is a raw membership test with no admin short-circuit.
    #[must_use]
    pub fn holds_permission(&self, code: &str) -> bool {
        self.permissions.contains(code)
    }

    /// Returns true when the user has any direct agency grant.
    #[must_use]
    pub fn has_agency_grants(&self) -> bool {
        !self.authorized_agency_groups.is_empty() || !self.authorized_subagencies.is_empty()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::ContactProfile;
    use super::UserContext;
    use crate::core::identifiers::ContactId;
    use crate::core::identifiers::SubjectId;
    use crate::core::permissions::Permission;
    use crate::core::roles::RoleRecord;

    #[test]
    fn permissions_are_the_union_of_role_bundles() {
        let profile = ContactProfile {
            contact_id: ContactId::new("c-1"),
            subject_id: Some(SubjectId::new("sub-1")),
            email: "user@example.gov".to_string(),
            name: None,
            active: true,
            roles: vec![
                RoleRecord::new("A", "", &[Permission::NdaView, Permission::NdaCreate]),
                RoleRecord::new("B", "", &[Permission::NdaView, Permission::NdaDelete]),
                RoleRecord::new("A", "", &[Permission::NdaView]),
            ],
            agency_group_grants: BTreeSet::new(),
            subagency_grants: BTreeSet::new(),
        };
        let ctx = UserContext::from_profile(SubjectId::new("sub-1"), profile);
        assert_eq!(ctx.roles, vec!["A".to_string(), "B".to_string()]);
        let expected: BTreeSet<String> = ["nda:create", "nda:delete", "nda:view"]
            .into_iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(ctx.permissions, expected);
        assert!(!ctx.has_agency_grants());
    }
}
