// crates/nda-portal-core/src/core/audit.rs
// ============================================================================
// Module: Audit Records
// Description: Tagged audit actions, append-only entries, and read queries.
// Purpose: Define the security audit log shared by every portal component.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit entries are append-only. The application never updates or deletes
//! them. Each entry carries a tagged [`AuditAction`], the affected entity, the
//! acting contact, request metadata, and a structured `details` payload.
//! [`AuditQuery`] covers the indexed read paths used by security monitoring:
//! action tags, client IP, the `email` field of `details`, and creation time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::AuditEntryId;
use crate::core::identifiers::ContactId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Actions
// ============================================================================

/// Tagged audit event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Successful login.
    LoginSuccess,
    /// Failed login.
    LoginFailed,
    /// Successful MFA challenge.
    MfaSuccess,
    /// Failed MFA challenge.
    MfaFailed,
    /// Logout.
    Logout,
    /// Contact provisioned on first login.
    UserAutoProvisioned,
    /// Permission check denied.
    PermissionDenied,
    /// Permission check passed through admin bypass.
    AdminBypass,
    /// Role assigned to a contact.
    RoleAssigned,
    /// Role removed from a contact.
    RoleRemoved,
    /// Access outside the caller's scope was attempted.
    UnauthorizedAccessAttempt,
    /// Agency group created.
    AgencyGroupCreated,
    /// Agency group updated.
    AgencyGroupUpdated,
    /// Agency group deleted.
    AgencyGroupDeleted,
    /// Subagency created.
    SubagencyCreated,
    /// Subagency updated.
    SubagencyUpdated,
    /// Subagency deleted.
    SubagencyDeleted,
    /// Agency group access granted.
    AgencyGroupAccessGranted,
    /// Agency group access revoked.
    AgencyGroupAccessRevoked,
    /// Subagency access granted.
    SubagencyAccessGranted,
    /// Subagency access revoked.
    SubagencyAccessRevoked,
    /// Contact created by an administrator.
    UserCreated,
    /// Contact updated.
    UserUpdated,
    /// Contact deactivated.
    UserDeactivated,
    /// Access report exported.
    AccessExport,
    /// NDA created.
    NdaCreated,
    /// NDA updated.
    NdaUpdated,
    /// NDA cloned.
    NdaCloned,
    /// NDA status changed.
    NdaStatusChanged,
    /// NDA deleted.
    NdaDeleted,
    /// Document generated.
    DocumentGenerated,
    /// Document uploaded.
    DocumentUploaded,
    /// Document download link issued.
    DocumentDownloaded,
    /// Document deleted.
    DocumentDeleted,
    /// Email queued.
    EmailQueued,
    /// Email sent.
    EmailSent,
    /// Email delivery failed.
    EmailFailed,
    /// Bulk role assignment.
    BulkRoleAssign,
    /// Bulk access grant.
    BulkAccessGrant,
    /// Bulk deactivation.
    BulkDeactivate,
}

impl AuditAction {
    /// Failure actions counted by brute-force detection.
    pub const LOGIN_FAILURES: [Self; 2] = [Self::LoginFailed, Self::MfaFailed];

    /// Returns the canonical action tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::MfaSuccess => "mfa_success",
            Self::MfaFailed => "mfa_failed",
            Self::Logout => "logout",
            Self::UserAutoProvisioned => "user_auto_provisioned",
            Self::PermissionDenied => "permission_denied",
            Self::AdminBypass => "admin_bypass",
            Self::RoleAssigned => "role_assigned",
            Self::RoleRemoved => "role_removed",
            Self::UnauthorizedAccessAttempt => "unauthorized_access_attempt",
            Self::AgencyGroupCreated => "agency_group_created",
            Self::AgencyGroupUpdated => "agency_group_updated",
            Self::AgencyGroupDeleted => "agency_group_deleted",
            Self::SubagencyCreated => "subagency_created",
            Self::SubagencyUpdated => "subagency_updated",
            Self::SubagencyDeleted => "subagency_deleted",
            Self::AgencyGroupAccessGranted => "agency_group_access_granted",
            Self::AgencyGroupAccessRevoked => "agency_group_access_revoked",
            Self::SubagencyAccessGranted => "subagency_access_granted",
            Self::SubagencyAccessRevoked => "subagency_access_revoked",
            Self::UserCreated => "user_created",
            Self::UserUpdated => "user_updated",
            Self::UserDeactivated => "user_deactivated",
            Self::AccessExport => "access_export",
            Self::NdaCreated => "nda_created",
            Self::NdaUpdated => "nda_updated",
            Self::NdaCloned => "nda_cloned",
            Self::NdaStatusChanged => "nda_status_changed",
            Self::NdaDeleted => "nda_deleted",
            Self::DocumentGenerated => "document_generated",
            Self::DocumentUploaded => "document_uploaded",
            Self::DocumentDownloaded => "document_downloaded",
            Self::DocumentDeleted => "document_deleted",
            Self::EmailQueued => "email_queued",
            Self::EmailSent => "email_sent",
            Self::EmailFailed => "email_failed",
            Self::BulkRoleAssign => "bulk_role_assign",
            Self::BulkAccessGrant => "bulk_access_grant",
            Self::BulkDeactivate => "bulk_deactivate",
        }
    }

    /// Parses a canonical action tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        serde_json::from_value(Value::String(tag.to_string())).ok()
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Audit entry as submitted by a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Event type.
    pub action: AuditAction,
    /// Kind of entity affected (e.g. `nda`, `permission_check`).
    pub entity_type: String,
    /// Affected entity identifier, when any.
    pub entity_id: Option<String>,
    /// Acting contact, when known.
    pub user_id: Option<ContactId>,
    /// Client IP address, when known.
    pub ip_address: Option<String>,
    /// Client user agent, when known.
    pub user_agent: Option<String>,
    /// Structured event payload.
    pub details: Value,
}

impl AuditEntry {
    /// Builds an entry with no entity id, actor, or request metadata.
    #[must_use]
    pub fn new(action: AuditAction, entity_type: impl Into<String>) -> Self {
        Self {
            action,
            entity_type: entity_type.into(),
            entity_id: None,
            user_id: None,
            ip_address: None,
            user_agent: None,
            details: Value::Null,
        }
    }

    /// Returns a copy with the entity identifier set.
    #[must_use]
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Returns a copy with the acting contact set.
    #[must_use]
    pub fn with_user(mut self, user_id: ContactId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Returns a copy with client metadata set.
    #[must_use]
    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    /// Returns a copy with the details payload set.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Returns the `email` field of the details payload, if present.
    #[must_use]
    pub fn detail_email(&self) -> Option<&str> {
        self.details.get("email").and_then(Value::as_str)
    }
}

/// Persisted audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Entry identifier.
    pub id: AuditEntryId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Entry content.
    #[serde(flatten)]
    pub entry: AuditEntry,
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Read-side audit filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    /// Match any of these actions; empty matches every action.
    pub actions: Vec<AuditAction>,
    /// Match entries created at or after this time.
    pub since: Option<Timestamp>,
    /// Match entries from this client IP.
    pub ip_address: Option<String>,
    /// Match entries whose `details.email` equals this value.
    pub detail_email: Option<String>,
    /// Maximum number of records returned by listing reads.
    pub limit: Option<usize>,
}

impl AuditQuery {
    /// Builds a query over the given actions.
    #[must_use]
    pub fn for_actions(actions: &[AuditAction]) -> Self {
        Self {
            actions: actions.to_vec(),
            ..Self::default()
        }
    }

    /// Returns true when the record satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if !self.actions.is_empty() && !self.actions.contains(&record.entry.action) {
            return false;
        }
        if let Some(since) = self.since
            && record.created_at < since
        {
            return false;
        }
        if let Some(ip) = &self.ip_address
            && record.entry.ip_address.as_deref() != Some(ip.as_str())
        {
            return false;
        }
        if let Some(email) = &self.detail_email
            && record.entry.detail_email() != Some(email.as_str())
        {
            return false;
        }
        true
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
