// crates/nda-portal-authz/src/access_admin.rs
// ============================================================================
// Module: Access Administration
// Description: Role assignment, agency grants, and bulk user operations.
// Purpose: Mutate authorization data with audit and cache invalidation.
// Dependencies: nda-portal-core, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! Every mutation of roles, agency grants, or contact activation goes through
//! [`AccessAdmin`]. After a successful write the affected subject's cached
//! user context is invalidated so the next request sees the change, and an
//! audit entry records who made it. Bulk operations deduplicate their input,
//! report a per-contact outcome, invalidate each changed contact once, and
//! write a single audit entry tagged with a batch id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use nda_portal_core::AgencyGrant;
use nda_portal_core::AgencyGroup;
use nda_portal_core::AgencyGroupId;
use nda_portal_core::AgencyStore;
use nda_portal_core::AuditAction;
use nda_portal_core::AuditEntry;
use nda_portal_core::BatchId;
use nda_portal_core::Clock;
use nda_portal_core::ContactId;
use nda_portal_core::ContactProfile;
use nda_portal_core::DirectoryStore;
use nda_portal_core::GrantTarget;
use nda_portal_core::RoleAssignment;
use nda_portal_core::StoreError;
use nda_portal_core::Subagency;
use nda_portal_core::SubagencyAccessEntry;
use nda_portal_core::SubagencyId;
use nda_portal_core::UserContext;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::audit::AuditLogger;
use crate::auth::ClientInfo;
use crate::context::UserContextLoader;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Access administration failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessAdminError {
    /// The contact does not exist.
    #[error("user not found")]
    UserNotFound,
    /// The role does not exist.
    #[error("role '{0}' not found")]
    RoleNotFound(String),
    /// The contact already holds the role.
    #[error("role '{0}' is already assigned")]
    RoleAlreadyAssigned(String),
    /// The contact does not hold the role.
    #[error("role '{0}' is not assigned")]
    RoleNotAssigned(String),
    /// Removing the role would leave the contact without roles.
    #[error("cannot remove the last role of a user")]
    LastRole,
    /// The agency group does not exist.
    #[error("agency group not found")]
    AgencyGroupNotFound,
    /// The subagency does not exist.
    #[error("subagency not found")]
    SubagencyNotFound,
    /// The grant already exists.
    #[error("access already granted")]
    AlreadyGranted,
    /// The grant does not exist.
    #[error("access grant not found")]
    GrantNotFound,
    /// The agency group still owns subagencies.
    #[error("agency group still has subagencies")]
    HasSubagencies,
    /// The request is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Storage failed.
    #[error("internal error: {0}")]
    Store(String),
}

impl AccessAdminError {
    /// Returns the stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::RoleNotFound(_) => "ROLE_NOT_FOUND",
            Self::RoleAlreadyAssigned(_) => "ROLE_ALREADY_ASSIGNED",
            Self::RoleNotAssigned(_) => "ROLE_NOT_ASSIGNED",
            Self::LastRole => "LAST_ROLE",
            Self::AgencyGroupNotFound => "AGENCY_GROUP_NOT_FOUND",
            Self::SubagencyNotFound => "SUBAGENCY_NOT_FOUND",
            Self::AlreadyGranted => "ALREADY_GRANTED",
            Self::GrantNotFound => "GRANT_NOT_FOUND",
            Self::HasSubagencies => "HAS_SUBAGENCIES",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for the error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::UserNotFound
            | Self::RoleNotFound(_)
            | Self::RoleNotAssigned(_)
            | Self::AgencyGroupNotFound
            | Self::SubagencyNotFound
            | Self::GrantNotFound => 404,
            Self::RoleAlreadyAssigned(_) | Self::AlreadyGranted | Self::HasSubagencies => 409,
            Self::LastRole | Self::InvalidInput(_) => 400,
            Self::Store(_) => 500,
        }
    }
}

impl From<StoreError> for AccessAdminError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

// ============================================================================
// SECTION: Bulk Types
// ============================================================================

/// Target of a bulk grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkGrantTarget {
    /// Grant one agency group.
    AgencyGroup(AgencyGroupId),
    /// Grant each listed subagency.
    Subagencies(Vec<SubagencyId>),
}

/// Per-contact outcome of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum BulkStatus {
    /// The change was applied.
    Applied,
    /// Nothing to change; the reason code says why.
    Skipped(&'static str),
    /// The change failed; the code says why.
    Failed(&'static str),
}

/// Outcome for one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    /// Contact identifier.
    pub contact_id: ContactId,
    /// Outcome.
    pub status: BulkStatus,
}

/// Outcome of a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    /// Batch identifier recorded on the audit entry.
    pub batch_id: BatchId,
    /// Per-contact outcomes in input order.
    pub results: Vec<BulkResult>,
}

impl BulkOutcome {
    /// Returns the contacts the change was applied to.
    #[must_use]
    pub fn applied(&self) -> Vec<&ContactId> {
        self.results
            .iter()
            .filter(|result| result.status == BulkStatus::Applied)
            .map(|result| &result.contact_id)
            .collect()
    }

    /// Counts outcomes matching a predicate.
    fn count(&self, predicate: impl Fn(&BulkStatus) -> bool) -> usize {
        self.results.iter().filter(|result| predicate(&result.status)).count()
    }

    /// Returns the audit summary of the batch.
    fn summary(&self) -> serde_json::Map<String, Value> {
        let mut details = serde_json::Map::new();
        details.insert("batchId".to_string(), json!(self.batch_id.as_str()));
        let applied: Vec<&str> = self.applied().into_iter().map(ContactId::as_str).collect();
        details.insert("contactIds".to_string(), json!(applied));
        details.insert(
            "skipped".to_string(),
            json!(self.count(|status| matches!(status, BulkStatus::Skipped(_)))),
        );
        details.insert(
            "failed".to_string(),
            json!(self.count(|status| matches!(status, BulkStatus::Failed(_)))),
        );
        details
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Authorization data administration.
pub struct AccessAdmin {
    /// Directory store.
    directory: Arc<dyn DirectoryStore>,
    /// Agency store.
    agencies: Arc<dyn AgencyStore>,
    /// Context loader used for cache invalidation.
    contexts: Arc<UserContextLoader>,
    /// Audit writer.
    audit: Arc<AuditLogger>,
    /// Clock stamping grants.
    clock: Arc<dyn Clock>,
}

impl AccessAdmin {
    /// Creates the service.
    #[must_use]
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        agencies: Arc<dyn AgencyStore>,
        contexts: Arc<UserContextLoader>,
        audit: Arc<AuditLogger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            agencies,
            contexts,
            audit,
            clock,
        }
    }

    // ------------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------------

    /// Assigns a role to a contact.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError`] when the contact or role is missing or the
    /// role is already held.
    pub async fn assign_role(
        &self,
        actor: &UserContext,
        contact_id: &ContactId,
        role_name: &str,
        client: &ClientInfo,
    ) -> Result<(), AccessAdminError> {
        let profile = self.require_profile(contact_id).await?;
        self.require_role(role_name).await?;
        if profile.roles.iter().any(|role| role.name == role_name) {
            return Err(AccessAdminError::RoleAlreadyAssigned(role_name.to_string()));
        }
        let assignment = RoleAssignment {
            contact_id: contact_id.clone(),
            role_name: role_name.to_string(),
            granted_by: Some(actor.contact_id.clone()),
            granted_at: self.clock.now(),
        };
        self.directory.assign_role(&assignment).await.map_err(|err| match err {
            StoreError::Conflict(_) => AccessAdminError::RoleAlreadyAssigned(role_name.to_string()),
            other => other.into(),
        })?;
        self.invalidate(&profile);
        let details = json!({ "roleName": role_name, "contactEmail": profile.email });
        self.record(
            AuditAction::RoleAssigned,
            "contact",
            contact_id.as_str(),
            actor,
            client,
            details,
        )
        .await;
        Ok(())
    }

    /// Removes a role from a contact. The last role cannot be removed.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError`] when the contact is missing, the role is
    /// not held, or it is the contact's only role.
    pub async fn remove_role(
        &self,
        actor: &UserContext,
        contact_id: &ContactId,
        role_name: &str,
        client: &ClientInfo,
    ) -> Result<(), AccessAdminError> {
        let profile = self.require_profile(contact_id).await?;
        if !profile.roles.iter().any(|role| role.name == role_name) {
            return Err(AccessAdminError::RoleNotAssigned(role_name.to_string()));
        }
        self.directory.remove_role(contact_id, role_name).await.map_err(|err| match err {
            StoreError::NotFound(_) => AccessAdminError::RoleNotAssigned(role_name.to_string()),
            StoreError::Conflict(_) => AccessAdminError::LastRole,
            other => other.into(),
        })?;
        self.invalidate(&profile);
        let details = json!({ "roleName": role_name, "contactEmail": profile.email });
        self.record(
            AuditAction::RoleRemoved,
            "contact",
            contact_id.as_str(),
            actor,
            client,
            details,
        )
        .await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Agency Grants
    // ------------------------------------------------------------------------

    /// Grants a contact access to an agency group.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError`] when the contact or group is missing or
    /// the grant exists.
    pub async fn grant_agency_group_access(
        &self,
        actor: &UserContext,
        contact_id: &ContactId,
        group_id: &AgencyGroupId,
        client: &ClientInfo,
    ) -> Result<(), AccessAdminError> {
        let profile = self.require_profile(contact_id).await?;
        let group = self.require_group(group_id).await?;
        if profile.agency_group_grants.contains(group_id) {
            return Err(AccessAdminError::AlreadyGranted);
        }
        self.insert_grant(actor, contact_id, GrantTarget::AgencyGroup(group_id.clone())).await?;
        self.invalidate(&profile);
        let details = group_grant_details(&profile, &group);
        self.record(
            AuditAction::AgencyGroupAccessGranted,
            "agency_group_grant",
            group_id.as_str(),
            actor,
            client,
            details,
        )
        .await;
        Ok(())
    }

    /// Revokes a contact's agency group grant.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError`] when the contact or group is missing or
    /// no such grant exists.
    pub async fn revoke_agency_group_access(
        &self,
        actor: &UserContext,
        contact_id: &ContactId,
        group_id: &AgencyGroupId,
        client: &ClientInfo,
    ) -> Result<(), AccessAdminError> {
        let profile = self.require_profile(contact_id).await?;
        let group = self.require_group(group_id).await?;
        self.delete_grant(contact_id, &GrantTarget::AgencyGroup(group_id.clone())).await?;
        self.invalidate(&profile);
        let details = group_grant_details(&profile, &group);
        self.record(
            AuditAction::AgencyGroupAccessRevoked,
            "agency_group_grant",
            group_id.as_str(),
            actor,
            client,
            details,
        )
        .await;
        Ok(())
    }

    /// Grants a contact access to a single subagency.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError`] when the contact or subagency is missing
    /// or the grant exists.
    pub async fn grant_subagency_access(
        &self,
        actor: &UserContext,
        contact_id: &ContactId,
        subagency_id: &SubagencyId,
        client: &ClientInfo,
    ) -> Result<(), AccessAdminError> {
        let profile = self.require_profile(contact_id).await?;
        let subagency = self.require_subagency(subagency_id).await?;
        if profile.subagency_grants.contains(subagency_id) {
            return Err(AccessAdminError::AlreadyGranted);
        }
        self.insert_grant(actor, contact_id, GrantTarget::Subagency(subagency_id.clone())).await?;
        self.invalidate(&profile);
        let details = subagency_grant_details(&profile, &subagency);
        self.record(
            AuditAction::SubagencyAccessGranted,
            "subagency_grant",
            subagency_id.as_str(),
            actor,
            client,
            details,
        )
        .await;
        Ok(())
    }

    /// Revokes a contact's direct subagency grant.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError`] when the contact or subagency is missing
    /// or no such grant exists.
    pub async fn revoke_subagency_access(
        &self,
        actor: &UserContext,
        contact_id: &ContactId,
        subagency_id: &SubagencyId,
        client: &ClientInfo,
    ) -> Result<(), AccessAdminError> {
        let profile = self.require_profile(contact_id).await?;
        let subagency = self.require_subagency(subagency_id).await?;
        self.delete_grant(contact_id, &GrantTarget::Subagency(subagency_id.clone())).await?;
        self.invalidate(&profile);
        let details = subagency_grant_details(&profile, &subagency);
        self.record(
            AuditAction::SubagencyAccessRevoked,
            "subagency_grant",
            subagency_id.as_str(),
            actor,
            client,
            details,
        )
        .await;
        Ok(())
    }

    /// Deletes an agency group that owns no subagencies.
    ///
    /// Grants on the group disappear with it, so every cached context is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError`] when the group is missing or still owns
    /// subagencies.
    pub async fn delete_agency_group(
        &self,
        actor: &UserContext,
        group_id: &AgencyGroupId,
        client: &ClientInfo,
    ) -> Result<(), AccessAdminError> {
        let group = self.require_group(group_id).await?;
        if !self.agencies.subagencies_in_group(group_id).await?.is_empty() {
            return Err(AccessAdminError::HasSubagencies);
        }
        self.agencies.delete_agency_group(group_id).await.map_err(|err| match err {
            StoreError::Conflict(_) => AccessAdminError::HasSubagencies,
            StoreError::NotFound(_) => AccessAdminError::AgencyGroupNotFound,
            other => other.into(),
        })?;
        self.contexts.clear_all_user_context_cache();
        let details = json!({ "name": group.name, "code": group.code });
        self.record(
            AuditAction::AgencyGroupDeleted,
            "agency_group",
            group_id.as_str(),
            actor,
            client,
            details,
        )
        .await;
        Ok(())
    }

    /// Lists contacts with access to a subagency and how they reach it.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError::SubagencyNotFound`] for unknown ids.
    pub async fn subagency_access(
        &self,
        subagency_id: &SubagencyId,
    ) -> Result<Vec<SubagencyAccessEntry>, AccessAdminError> {
        self.agencies.subagency_access(subagency_id).await.map_err(|err| match err {
            StoreError::NotFound(_) => AccessAdminError::SubagencyNotFound,
            other => other.into(),
        })
    }

    // ------------------------------------------------------------------------
    // Bulk Operations
    // ------------------------------------------------------------------------

    /// Assigns a role to many contacts.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError`] when the input is empty or the role does
    /// not exist. Per-contact failures are reported in the outcome.
    pub async fn bulk_assign_role(
        &self,
        actor: &UserContext,
        contact_ids: &[ContactId],
        role_name: &str,
        client: &ClientInfo,
    ) -> Result<BulkOutcome, AccessAdminError> {
        let contact_ids = dedupe(contact_ids)?;
        self.require_role(role_name).await?;
        let granted_at = self.clock.now();
        let mut outcome = BulkOutcome {
            batch_id: BatchId::generate(),
            results: Vec::with_capacity(contact_ids.len()),
        };
        for contact_id in contact_ids {
            let status = match self.directory.find_profile_by_contact(&contact_id).await {
                Ok(None) => BulkStatus::Failed("USER_NOT_FOUND"),
                Ok(Some(profile)) if profile.roles.iter().any(|role| role.name == role_name) => {
                    BulkStatus::Skipped("ALREADY_ASSIGNED")
                }
                Ok(Some(profile)) => {
                    let assignment = RoleAssignment {
                        contact_id: contact_id.clone(),
                        role_name: role_name.to_string(),
                        granted_by: Some(actor.contact_id.clone()),
                        granted_at,
                    };
                    match self.directory.assign_role(&assignment).await {
                        Ok(()) => {
                            self.invalidate(&profile);
                            BulkStatus::Applied
                        }
                        Err(StoreError::Conflict(_)) => BulkStatus::Skipped("ALREADY_ASSIGNED"),
                        Err(err) => bulk_store_failure(&contact_id, &err),
                    }
                }
                Err(err) => bulk_store_failure(&contact_id, &err),
            };
            outcome.results.push(BulkResult {
                contact_id,
                status,
            });
        }
        let mut details = outcome.summary();
        details.insert("roleName".to_string(), json!(role_name));
        self.record_bulk(AuditAction::BulkRoleAssign, &outcome, actor, client, details).await;
        Ok(outcome)
    }

    /// Grants an agency group or a set of subagencies to many contacts.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError`] when the input is empty or a target does
    /// not exist. Per-contact failures are reported in the outcome.
    pub async fn bulk_grant_access(
        &self,
        actor: &UserContext,
        contact_ids: &[ContactId],
        target: BulkGrantTarget,
        client: &ClientInfo,
    ) -> Result<BulkOutcome, AccessAdminError> {
        let contact_ids = dedupe(contact_ids)?;
        let (targets, mut details) = self.resolve_bulk_targets(target).await?;
        let mut outcome = BulkOutcome {
            batch_id: BatchId::generate(),
            results: Vec::with_capacity(contact_ids.len()),
        };
        for contact_id in contact_ids {
            let status = match self.directory.find_profile_by_contact(&contact_id).await {
                Ok(None) => BulkStatus::Failed("USER_NOT_FOUND"),
                Ok(Some(profile)) => self.grant_targets(actor, &profile, &targets).await,
                Err(err) => bulk_store_failure(&contact_id, &err),
            };
            outcome.results.push(BulkResult {
                contact_id,
                status,
            });
        }
        details.extend(outcome.summary());
        self.record_bulk(AuditAction::BulkAccessGrant, &outcome, actor, client, details).await;
        Ok(outcome)
    }

    /// Deactivates many contacts. The actor is never deactivated.
    ///
    /// # Errors
    ///
    /// Returns [`AccessAdminError::InvalidInput`] when the input is empty.
    /// Per-contact failures are reported in the outcome.
    pub async fn bulk_deactivate(
        &self,
        actor: &UserContext,
        contact_ids: &[ContactId],
        client: &ClientInfo,
    ) -> Result<BulkOutcome, AccessAdminError> {
        let contact_ids = dedupe(contact_ids)?;
        let mut outcome = BulkOutcome {
            batch_id: BatchId::generate(),
            results: Vec::with_capacity(contact_ids.len()),
        };
        for contact_id in contact_ids {
            let status = if contact_id == actor.contact_id {
                BulkStatus::Skipped("SELF_DEACTIVATION_BLOCKED")
            } else {
                match self.directory.find_profile_by_contact(&contact_id).await {
                    Ok(None) => BulkStatus::Failed("USER_NOT_FOUND"),
                    Ok(Some(profile)) if !profile.active => BulkStatus::Skipped("ALREADY_INACTIVE"),
                    Ok(Some(profile)) => {
                        match self.directory.set_contact_active(&contact_id, false).await {
                            Ok(()) => {
                                self.invalidate(&profile);
                                BulkStatus::Applied
                            }
                            Err(err) => bulk_store_failure(&contact_id, &err),
                        }
                    }
                    Err(err) => bulk_store_failure(&contact_id, &err),
                }
            };
            outcome.results.push(BulkResult {
                contact_id,
                status,
            });
        }
        let details = outcome.summary();
        self.record_bulk(AuditAction::BulkDeactivate, &outcome, actor, client, details).await;
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Loads a contact profile or fails with `USER_NOT_FOUND`.
    async fn require_profile(
        &self,
        contact_id: &ContactId,
    ) -> Result<ContactProfile, AccessAdminError> {
        self.directory
            .find_profile_by_contact(contact_id)
            .await?
            .ok_or(AccessAdminError::UserNotFound)
    }

    /// Fails with `ROLE_NOT_FOUND` when the role is undefined.
    async fn require_role(&self, role_name: &str) -> Result<(), AccessAdminError> {
        match self.directory.find_role(role_name).await? {
            Some(_) => Ok(()),
            None => Err(AccessAdminError::RoleNotFound(role_name.to_string())),
        }
    }

    /// Loads an agency group or fails with `AGENCY_GROUP_NOT_FOUND`.
    async fn require_group(
        &self,
        group_id: &AgencyGroupId,
    ) -> Result<AgencyGroup, AccessAdminError> {
        self.agencies
            .find_agency_group(group_id)
            .await?
            .ok_or(AccessAdminError::AgencyGroupNotFound)
    }

    /// Loads a subagency or fails with `SUBAGENCY_NOT_FOUND`.
    async fn require_subagency(
        &self,
        subagency_id: &SubagencyId,
    ) -> Result<Subagency, AccessAdminError> {
        self.agencies
            .find_subagency(subagency_id)
            .await?
            .ok_or(AccessAdminError::SubagencyNotFound)
    }

    /// Validates bulk grant targets and returns them with audit details.
    async fn resolve_bulk_targets(
        &self,
        target: BulkGrantTarget,
    ) -> Result<(Vec<GrantTarget>, serde_json::Map<String, Value>), AccessAdminError> {
        let mut details = serde_json::Map::new();
        match target {
            BulkGrantTarget::AgencyGroup(group_id) => {
                self.require_group(&group_id).await?;
                details.insert("agencyGroupId".to_string(), json!(group_id.as_str()));
                Ok((vec![GrantTarget::AgencyGroup(group_id)], details))
            }
            BulkGrantTarget::Subagencies(ids) => {
                let ids: BTreeSet<SubagencyId> = ids.into_iter().collect();
                if ids.is_empty() {
                    return Err(AccessAdminError::InvalidInput(
                        "subagency ids must be non-empty".to_string(),
                    ));
                }
                for id in &ids {
                    self.require_subagency(id).await?;
                }
                let labels: Vec<&str> = ids.iter().map(SubagencyId::as_str).collect();
                details.insert("subagencyIds".to_string(), json!(labels));
                Ok((ids.into_iter().map(GrantTarget::Subagency).collect(), details))
            }
        }
    }

    /// Grants every target to one contact, skipping existing grants.
    async fn grant_targets(
        &self,
        actor: &UserContext,
        profile: &ContactProfile,
        targets: &[GrantTarget],
    ) -> BulkStatus {
        let mut added = 0_usize;
        for target in targets {
            match self.insert_grant(actor, &profile.contact_id, target.clone()).await {
                Ok(()) => added += 1,
                Err(AccessAdminError::AlreadyGranted) => {}
                Err(err) => {
                    tracing::warn!(
                        target = "nda_portal::access_admin",
                        contact_id = %profile.contact_id,
                        error = %err,
                        "bulk grant failed"
                    );
                    if added > 0 {
                        self.invalidate(profile);
                    }
                    return BulkStatus::Failed(err.code());
                }
            }
        }
        if added == 0 {
            return BulkStatus::Skipped("ALREADY_GRANTED");
        }
        self.invalidate(profile);
        BulkStatus::Applied
    }

    /// Inserts a grant, mapping store conflicts.
    async fn insert_grant(
        &self,
        actor: &UserContext,
        contact_id: &ContactId,
        target: GrantTarget,
    ) -> Result<(), AccessAdminError> {
        let not_found = match &target {
            GrantTarget::AgencyGroup(_) => AccessAdminError::AgencyGroupNotFound,
            GrantTarget::Subagency(_) => AccessAdminError::SubagencyNotFound,
        };
        let grant = AgencyGrant {
            contact_id: contact_id.clone(),
            target,
            granted_by: Some(actor.contact_id.clone()),
            granted_at: self.clock.now(),
        };
        self.agencies.insert_grant(&grant).await.map_err(|err| match err {
            StoreError::Conflict(_) => AccessAdminError::AlreadyGranted,
            StoreError::NotFound(_) => not_found,
            other => other.into(),
        })
    }

    /// Deletes a grant, mapping a missing grant to `GRANT_NOT_FOUND`.
    async fn delete_grant(
        &self,
        contact_id: &ContactId,
        target: &GrantTarget,
    ) -> Result<(), AccessAdminError> {
        self.agencies.delete_grant(contact_id, target).await.map_err(|err| match err {
            StoreError::NotFound(_) => AccessAdminError::GrantNotFound,
            other => other.into(),
        })
    }

    /// Drops the cached context of a profile's subject.
    fn invalidate(&self, profile: &ContactProfile) {
        if let Some(subject_id) = &profile.subject_id {
            self.contexts.invalidate_user_context(subject_id);
        }
    }

    /// Writes an audit entry for a single mutation.
    async fn record(
        &self,
        action: AuditAction,
        entity_type: &str,
        entity_id: &str,
        actor: &UserContext,
        client: &ClientInfo,
        details: Value,
    ) {
        let entry = AuditEntry::new(action, entity_type)
            .with_entity_id(entity_id)
            .with_user(actor.contact_id.clone())
            .with_client(client.ip_address.clone(), client.user_agent.clone())
            .with_details(details);
        self.audit.log(entry).await;
    }

    /// Writes the single audit entry of a bulk operation.
    async fn record_bulk(
        &self,
        action: AuditAction,
        outcome: &BulkOutcome,
        actor: &UserContext,
        client: &ClientInfo,
        details: serde_json::Map<String, Value>,
    ) {
        self.record(
            action,
            "bulk_operation",
            outcome.batch_id.as_str(),
            actor,
            client,
            Value::Object(details),
        )
        .await;
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Removes duplicate ids, keeping first occurrences in order.
fn dedupe(contact_ids: &[ContactId]) -> Result<Vec<ContactId>, AccessAdminError> {
    if contact_ids.is_empty() {
        return Err(AccessAdminError::InvalidInput("contact ids must be non-empty".to_string()));
    }
    let mut seen = BTreeSet::new();
    Ok(contact_ids.iter().filter(|id| seen.insert((*id).clone())).cloned().collect())
}

/// Logs a per-contact store failure and reports it.
fn bulk_store_failure(contact_id: &ContactId, err: &StoreError) -> BulkStatus {
    tracing::warn!(
        target = "nda_portal::access_admin",
        contact_id = %contact_id,
        error = %err,
        "bulk operation failed for contact"
    );
    BulkStatus::Failed("INTERNAL_ERROR")
}

/// Audit details for an agency group grant change.
fn group_grant_details(profile: &ContactProfile, group: &AgencyGroup) -> Value {
    json!({
        "contactId": profile.contact_id.as_str(),
        "contactEmail": profile.email,
        "agencyGroupId": group.id.as_str(),
        "agencyGroupName": group.name,
    })
}

/// Audit details for a subagency grant change.
fn subagency_grant_details(profile: &ContactProfile, subagency: &Subagency) -> Value {
    json!({
        "contactId": profile.contact_id.as_str(),
        "contactEmail": profile.email,
        "subagencyId": subagency.id.as_str(),
        "subagencyName": subagency.name,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
