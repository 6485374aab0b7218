// crates/nda-portal-core/src/core/roles.rs
// ============================================================================
// Module: Role Catalog
// Description: Named permission bundles and role assignment records.
// Purpose: Define the system roles and the contact-role relation.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A role is a named bundle of permission codes. Roles are assigned to
//! contacts with grant metadata. A contact always holds at least one role;
//! removal of the last role is rejected by the access administration layer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ContactId;
use crate::core::permissions::Permission;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Role that bypasses every permission check.
pub const ADMIN_ROLE: &str = "Admin";
/// Role for users who create and route NDAs.
pub const NDA_USER_ROLE: &str = "NDA User";
/// Role for users who view NDAs and upload documents.
pub const LIMITED_USER_ROLE: &str = "Limited User";
/// Lowest-privilege role assigned on first login.
pub const READ_ONLY_ROLE: &str = "Read-Only";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Role definition with its permission bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Unique role name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Permission codes granted by the role.
    pub permissions: BTreeSet<String>,
    /// True for roles shipped with the portal.
    pub system_role: bool,
}

impl RoleRecord {
    /// Builds a role from catalog permissions.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        permissions: &[Permission],
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            permissions: permissions.iter().map(|p| p.code().to_string()).collect(),
            system_role: true,
        }
    }
}

/// Role held by a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Contact holding the role.
    pub contact_id: ContactId,
    /// Assigned role name.
    pub role_name: String,
    /// Contact that granted the role, when known.
    pub granted_by: Option<ContactId>,
    /// Grant time.
    pub granted_at: Timestamp,
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Returns the four system roles with their permission bundles.
#[must_use]
pub fn system_roles() -> Vec<RoleRecord> {
    vec![
        RoleRecord::new(
            ADMIN_ROLE,
            "Full system access - can manage users, agencies, templates, and all NDA operations",
            &Permission::ALL,
        ),
        RoleRecord::new(
            NDA_USER_ROLE,
            "Can create, edit, and send NDAs within their authorized agencies",
            &[
                Permission::NdaCreate,
                Permission::NdaUpdate,
                Permission::NdaUploadDocument,
                Permission::NdaSendEmail,
                Permission::NdaMarkStatus,
                Permission::NdaView,
            ],
        ),
        RoleRecord::new(
            LIMITED_USER_ROLE,
            "Can view NDAs and upload documents, but cannot create or edit",
            &[Permission::NdaUploadDocument, Permission::NdaView],
        ),
        RoleRecord::new(
            READ_ONLY_ROLE,
            "Can only view NDAs - default role for new users",
            &[Permission::NdaView],
        ),
    ]
}
