// crates/nda-portal-core/src/interfaces/mod.rs
// ============================================================================
// Module: NDA Portal Interfaces
// Description: Backend-agnostic persistence interfaces for the portal core.
// Purpose: Define the contract between authorization logic and storage.
// Dependencies: crate::core, async-trait, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the authorization engine reads the directory, agency
//! hierarchy, NDA records, and audit log. Every call is an awaited suspension
//! point. Implementations must be deterministic and fail closed: an error is
//! reported as [`StoreError`], never as an empty or permissive result.
//! Security posture: storage contents are untrusted inputs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use thiserror::Error;

use crate::core::AgencyGrant;
use crate::core::AgencyGroup;
use crate::core::AgencyGroupId;
use crate::core::AuditQuery;
use crate::core::AuditRecord;
use crate::core::ContactId;
use crate::core::ContactProfile;
use crate::core::GrantEdges;
use crate::core::GrantTarget;
use crate::core::NdaId;
use crate::core::NdaQuery;
use crate::core::NdaRecord;
use crate::core::NewContact;
use crate::core::RoleAssignment;
use crate::core::RoleRecord;
use crate::core::ScopeFilter;
use crate::core::StatusChange;
use crate::core::StatusHistoryEntry;
use crate::core::Subagency;
use crate::core::SubagencyAccessEntry;
use crate::core::SubagencyId;
use crate::core::SubjectId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Portal store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("portal store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("portal store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("portal store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("portal store invalid data: {0}")]
    Invalid(String),
    /// Write conflicts with existing state.
    #[error("portal store conflict: {0}")]
    Conflict(String),
    /// Referenced row does not exist.
    #[error("portal store not found: {0}")]
    NotFound(String),
    /// Store reported an error.
    #[error("portal store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Directory
// ============================================================================

/// Contacts, roles, and role assignments.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Loads a contact profile by external subject id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn find_profile_by_subject(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Option<ContactProfile>, StoreError>;

    /// Loads a contact profile by contact id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn find_profile_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<ContactProfile>, StoreError>;

    /// Loads a role definition by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn find_role(&self, name: &str) -> Result<Option<RoleRecord>, StoreError>;

    /// Creates a contact holding a single role.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the subject is already linked and
    /// [`StoreError::NotFound`] when the role does not exist.
    async fn create_contact(
        &self,
        contact: NewContact,
        created_at: Timestamp,
    ) -> Result<ContactProfile, StoreError>;

    /// Assigns a role to a contact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the role is already held.
    async fn assign_role(&self, assignment: &RoleAssignment) -> Result<(), StoreError>;

    /// Removes a role from a contact. The held-role check and the delete are
    /// one atomic step, so a contact never ends up with zero roles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the role is not held and
    /// [`StoreError::Conflict`] when it is the contact's only role.
    async fn remove_role(&self, contact_id: &ContactId, role_name: &str)
    -> Result<(), StoreError>;

    /// Sets the contact's active flag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the contact does not exist.
    async fn set_contact_active(
        &self,
        contact_id: &ContactId,
        active: bool,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Agencies
// ============================================================================

/// Agency hierarchy and access grants.
#[async_trait]
pub trait AgencyStore: Send + Sync {
    /// Returns the contact's direct subagency grants and granted groups with
    /// their current subagency membership.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn grant_edges(&self, contact_id: &ContactId) -> Result<GrantEdges, StoreError>;

    /// Loads an agency group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn find_agency_group(
        &self,
        group_id: &AgencyGroupId,
    ) -> Result<Option<AgencyGroup>, StoreError>;

    /// Loads a subagency.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn find_subagency(
        &self,
        subagency_id: &SubagencyId,
    ) -> Result<Option<Subagency>, StoreError>;

    /// Lists the subagencies owned by a group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn subagencies_in_group(
        &self,
        group_id: &AgencyGroupId,
    ) -> Result<Vec<Subagency>, StoreError>;

    /// Inserts an agency group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the id or code already exists.
    async fn insert_agency_group(&self, group: &AgencyGroup) -> Result<(), StoreError>;

    /// Inserts a subagency.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the owning group is missing.
    async fn insert_subagency(&self, subagency: &Subagency) -> Result<(), StoreError>;

    /// Deletes an agency group and its group grants.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] while the group owns subagencies.
    async fn delete_agency_group(&self, group_id: &AgencyGroupId) -> Result<(), StoreError>;

    /// Inserts an access grant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the grant already exists.
    async fn insert_grant(&self, grant: &AgencyGrant) -> Result<(), StoreError>;

    /// Deletes an access grant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the grant does not exist.
    async fn delete_grant(
        &self,
        contact_id: &ContactId,
        target: &GrantTarget,
    ) -> Result<(), StoreError>;

    /// Lists contacts with direct or group-inherited access to a subagency.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn subagency_access(
        &self,
        subagency_id: &SubagencyId,
    ) -> Result<Vec<SubagencyAccessEntry>, StoreError>;
}

// ============================================================================
// SECTION: NDA Records
// ============================================================================

/// NDA records and status history.
#[async_trait]
pub trait NdaStore: Send + Sync {
    /// Loads a record by id if it passes the scope filter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn find_nda(
        &self,
        nda_id: &NdaId,
        scope: &ScopeFilter,
    ) -> Result<Option<NdaRecord>, StoreError>;

    /// Lists records passing the scope filter and query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn find_ndas(
        &self,
        scope: &ScopeFilter,
        query: &NdaQuery,
    ) -> Result<Vec<NdaRecord>, StoreError>;

    /// Counts records passing the scope filter and query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn count_ndas(&self, scope: &ScopeFilter, query: &NdaQuery) -> Result<u64, StoreError>;

    /// Inserts a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the id already exists.
    async fn insert_nda(&self, record: &NdaRecord) -> Result<(), StoreError>;

    /// Atomically updates status and appends the matching history entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the record is missing and
    /// [`StoreError::Conflict`] when it no longer holds the expected status.
    async fn commit_status_change(
        &self,
        change: &StatusChange,
    ) -> Result<StatusHistoryEntry, StoreError>;

    /// Returns the record's status history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn status_history(&self, nda_id: &NdaId)
    -> Result<Vec<StatusHistoryEntry>, StoreError>;
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

/// Append-only audit log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends an audit record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError>;

    /// Counts records matching the query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn count_audit(&self, query: &AuditQuery) -> Result<u64, StoreError>;

    /// Lists records matching the query, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError>;
}

// ============================================================================
// SECTION: Combined Store
// ============================================================================

/// Backend implementing every portal store interface.
pub trait PortalStore: DirectoryStore + AgencyStore + NdaStore + AuditStore {}

impl<T> PortalStore for T where T: DirectoryStore + AgencyStore + NdaStore + AuditStore {}
