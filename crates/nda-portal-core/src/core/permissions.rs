// crates/nda-portal-core/src/core/permissions.rs
// ============================================================================
// Module: Permission Registry
// Description: Static catalog of permission codes, categories, and messages.
// Purpose: Provide pure lookups for permission validation and user messaging.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Permissions are namespaced `category:action` codes. The catalog is fixed at
//! compile time and never mutated at runtime. Description and denial-message
//! lookups accept raw codes and fall back to generic text for unknown or
//! unmessaged codes, so callers never need to handle a missing entry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Description returned for codes outside the catalog.
pub const UNKNOWN_PERMISSION_DESCRIPTION: &str = "Unknown permission";

// ============================================================================
// SECTION: Categories
// ============================================================================

/// Permission category (the namespace prefix of a code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCategory {
    /// NDA record operations.
    Nda,
    /// Administrative operations.
    Admin,
}

impl PermissionCategory {
    /// Returns the canonical category label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nda => "nda",
            Self::Admin => "admin",
        }
    }

    /// Parses a category label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "nda" => Some(Self::Nda),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Permissions
// ============================================================================

/// Permission codes known to the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Create new NDAs.
    #[serde(rename = "nda:create")]
    NdaCreate,
    /// Edit existing NDAs.
    #[serde(rename = "nda:update")]
    NdaUpdate,
    /// Upload documents to NDAs.
    #[serde(rename = "nda:upload_document")]
    NdaUploadDocument,
    /// Send NDA emails.
    #[serde(rename = "nda:send_email")]
    NdaSendEmail,
    /// Change NDA status.
    #[serde(rename = "nda:mark_status")]
    NdaMarkStatus,
    /// View NDA details and documents.
    #[serde(rename = "nda:view")]
    NdaView,
    /// Delete NDAs.
    #[serde(rename = "nda:delete")]
    NdaDelete,
    /// Manage users and their roles.
    #[serde(rename = "admin:manage_users")]
    AdminManageUsers,
    /// Manage agency groups and subagencies.
    #[serde(rename = "admin:manage_agencies")]
    AdminManageAgencies,
    /// Manage document and email templates.
    #[serde(rename = "admin:manage_templates")]
    AdminManageTemplates,
    /// View the audit log.
    #[serde(rename = "admin:view_audit_logs")]
    AdminViewAuditLogs,
}

impl Permission {
    /// Every permission in catalog order.
    pub const ALL: [Self; 11] = [
        Self::NdaCreate,
        Self::NdaUpdate,
        Self::NdaUploadDocument,
        Self::NdaSendEmail,
        Self::NdaMarkStatus,
        Self::NdaView,
        Self::NdaDelete,
        Self::AdminManageUsers,
        Self::AdminManageAgencies,
        Self::AdminManageTemplates,
        Self::AdminViewAuditLogs,
    ];

    /// Returns the canonical permission code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NdaCreate => "nda:create",
            Self::NdaUpdate => "nda:update",
            Self::NdaUploadDocument => "nda:upload_document",
            Self::NdaSendEmail => "nda:send_email",
            Self::NdaMarkStatus => "nda:mark_status",
            Self::NdaView => "nda:view",
            Self::NdaDelete => "nda:delete",
            Self::AdminManageUsers => "admin:manage_users",
            Self::AdminManageAgencies => "admin:manage_agencies",
            Self::AdminManageTemplates => "admin:manage_templates",
            Self::AdminViewAuditLogs => "admin:view_audit_logs",
        }
    }

    /// Parses a permission code.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|permission| permission.code() == code)
    }

    /// Returns the permission category.
    #[must_use]
    pub const fn category(self) -> PermissionCategory {
        match self {
            Self::NdaCreate
            | Self::NdaUpdate
            | Self::NdaUploadDocument
            | Self::NdaSendEmail
            | Self::NdaMarkStatus
            | Self::NdaView
            | Self::NdaDelete => PermissionCategory::Nda,
            Self::AdminManageUsers
            | Self::AdminManageAgencies
            | Self::AdminManageTemplates
            | Self::AdminViewAuditLogs => PermissionCategory::Admin,
        }
    }

    /// Returns the human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::NdaCreate => "Create new NDAs",
            Self::NdaUpdate => "Edit existing NDAs",
            Self::NdaUploadDocument => "Upload documents to NDAs",
            Self::NdaSendEmail => "Send emails related to NDAs",
            Self::NdaMarkStatus => "Change NDA status (e.g., mark as executed)",
            Self::NdaView => "View NDA details and documents",
            Self::NdaDelete => "Delete NDAs permanently",
            Self::AdminManageUsers => "Create, edit, and deactivate users",
            Self::AdminManageAgencies => "Manage agency groups and subagencies",
            Self::AdminManageTemplates => "Create and edit RTF and email templates",
            Self::AdminViewAuditLogs => "Access centralized audit log viewer",
        }
    }

    /// Returns the registered denial message, if any.
    #[must_use]
    pub const fn denial_message(self) -> Option<&'static str> {
        match self {
            Self::NdaCreate => Some("You don't have permission to create NDAs - contact admin"),
            Self::NdaUpdate => Some("You don't have permission to edit NDAs - contact admin"),
            Self::NdaUploadDocument => {
                Some("You don't have permission to upload documents - contact admin")
            }
            Self::NdaSendEmail => Some("You don't have permission to send emails - contact admin"),
            Self::NdaMarkStatus => {
                Some("You don't have permission to change NDA status - contact admin")
            }
            Self::NdaView => None,
            Self::NdaDelete => Some("You don't have permission to delete NDAs - contact admin"),
            Self::AdminManageUsers => Some("Admin access required for user management"),
            Self::AdminManageAgencies => Some("Admin access required for agency management"),
            Self::AdminManageTemplates => Some("Admin access required for template management"),
            Self::AdminViewAuditLogs => Some("Admin access required to view audit logs"),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// SECTION: Lookups
// ============================================================================

/// Returns true when `code` names a catalog permission.
#[must_use]
pub fn is_valid_permission(code: &str) -> bool {
    Permission::parse(code).is_some()
}

/// Returns the permissions whose code is namespaced under `category`.
///
/// Unknown categories yield an empty list.
#[must_use]
pub fn permissions_by_category(category: &str) -> Vec<Permission> {
    Permission::ALL
        .into_iter()
        .filter(|permission| {
            permission
                .code()
                .strip_prefix(category)
                .is_some_and(|rest| rest.starts_with(':'))
        })
        .collect()
}

/// Returns the description for a permission code, or a generic fallback.
#[must_use]
pub fn permission_description(code: &str) -> &'static str {
    Permission::parse(code).map_or(UNKNOWN_PERMISSION_DESCRIPTION, Permission::description)
}

/// Returns the denial message for a permission code, or a templated fallback.
#[must_use]
pub fn permission_denial_message(code: &str) -> String {
    Permission::parse(code)
        .and_then(Permission::denial_message)
        .map_or_else(|| format!("Permission '{code}' required"), ToString::to_string)
}
