// crates/nda-portal-authz/src/scoped_query.rs
// ============================================================================
// Module: Scoped Queries
// Description: NDA reads restricted to the caller's agency scope.
// Purpose: Hide out-of-scope records behind not-found and audit probing.
// Dependencies: nda-portal-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! Every NDA read goes through [`ScopedQuery`], which pushes the caller's
//! scope filter into the store query. A record outside the scope is reported
//! exactly like a missing record. When a non-admin lookup misses, an
//! unscoped existence check runs afterwards: if the record exists the attempt
//! is audited, and failures of that check are logged and swallowed so they
//! never change the response.
//!
//! Document artifacts are released only after the scoped lookup succeeds and
//! the download audit entry has been written.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use nda_portal_core::AuditAction;
use nda_portal_core::AuditEntry;
use nda_portal_core::NdaId;
use nda_portal_core::NdaQuery;
use nda_portal_core::NdaRecord;
use nda_portal_core::NdaStore;
use nda_portal_core::ScopeFilter;
use nda_portal_core::SubagencyId;
use nda_portal_core::UserContext;
use serde_json::json;

use crate::audit::AuditLogger;
use crate::auth::ClientInfo;
use crate::error::AuthzError;
use crate::scope::AgencyScopeResolver;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Entity label used in not-found errors.
pub const NDA_ENTITY_LABEL: &str = "NDA";

// ============================================================================
// SECTION: Scoped Query
// ============================================================================

/// Scope-enforcing NDA reader.
pub struct ScopedQuery {
    /// NDA store.
    ndas: Arc<dyn NdaStore>,
    /// Scope resolver.
    resolver: Arc<AgencyScopeResolver>,
    /// Audit writer.
    audit: Arc<AuditLogger>,
}

impl ScopedQuery {
    /// Creates a scoped reader.
    #[must_use]
    pub fn new(
        ndas: Arc<dyn NdaStore>,
        resolver: Arc<AgencyScopeResolver>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            ndas,
            resolver,
            audit,
        }
    }

    /// Finds a record within the caller's scope.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Internal`] when the scoped lookup fails.
    pub async fn find_record_with_scope(
        &self,
        nda_id: &NdaId,
        ctx: &UserContext,
        client: &ClientInfo,
    ) -> Result<Option<NdaRecord>, AuthzError> {
        let filter = self.resolver.scope_ndas_to_user(ctx).await;
        let found = self.ndas.find_nda(nda_id, &filter).await.map_err(internal)?;
        if found.is_none()
            && let ScopeFilter::Subagencies(authorized) = &filter
        {
            self.audit_if_out_of_scope(nda_id, ctx, authorized, client).await;
        }
        Ok(found)
    }

    /// Finds a record within the caller's scope or fails with not-found.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::NotFound`] when the record is missing or out of
    /// scope, and [`AuthzError::Internal`] when the lookup fails.
    pub async fn require_record_with_scope(
        &self,
        nda_id: &NdaId,
        ctx: &UserContext,
        client: &ClientInfo,
    ) -> Result<NdaRecord, AuthzError> {
        self.find_record_with_scope(nda_id, ctx, client)
            .await?
            .ok_or(AuthzError::NotFound(NDA_ENTITY_LABEL))
    }

    /// Lists records within the caller's scope.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Internal`] when the query fails.
    pub async fn find_many_records_with_scope(
        &self,
        ctx: &UserContext,
        query: &NdaQuery,
    ) -> Result<Vec<NdaRecord>, AuthzError> {
        let filter = self.resolver.scope_ndas_to_user(ctx).await;
        self.ndas.find_ndas(&filter, query).await.map_err(internal)
    }

    /// Counts records within the caller's scope.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Internal`] when the query fails.
    pub async fn count_records_with_scope(
        &self,
        ctx: &UserContext,
        query: &NdaQuery,
    ) -> Result<u64, AuthzError> {
        let filter = self.resolver.scope_ndas_to_user(ctx).await;
        self.ndas.count_ndas(&filter, query).await.map_err(internal)
    }

    /// Returns true when the record exists within the caller's scope.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Internal`] when the lookup fails.
    pub async fn is_authorized_for_record(
        &self,
        nda_id: &NdaId,
        ctx: &UserContext,
    ) -> Result<bool, AuthzError> {
        let found = self.find_record_with_scope(nda_id, ctx, &ClientInfo::default()).await?;
        Ok(found.is_some())
    }

    /// Releases a document artifact for an in-scope record.
    ///
    /// The download audit entry is written before `produce` runs.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::NotFound`] when the record is missing or out of
    /// scope, and [`AuthzError::Internal`] when the lookup fails.
    pub async fn release_artifact<T, F, Fut>(
        &self,
        nda_id: &NdaId,
        ctx: &UserContext,
        client: &ClientInfo,
        document: &str,
        produce: F,
    ) -> Result<T, AuthzError>
    where
        F: FnOnce(NdaRecord) -> Fut + Send,
        Fut: Future<Output = T> + Send,
    {
        let record = self.require_record_with_scope(nda_id, ctx, client).await?;
        let entry = AuditEntry::new(AuditAction::DocumentDownloaded, "document")
            .with_entity_id(document)
            .with_user(ctx.contact_id.clone())
            .with_client(client.ip_address.clone(), client.user_agent.clone())
            .with_details(json!({
                "ndaId": record.id.as_str(),
                "displayId": record.display_id,
            }));
        self.audit.log(entry).await;
        Ok(produce(record).await)
    }

    /// Audits a miss that an unscoped lookup shows to be a scope violation.
    async fn audit_if_out_of_scope(
        &self,
        nda_id: &NdaId,
        ctx: &UserContext,
        authorized: &BTreeSet<SubagencyId>,
        client: &ClientInfo,
    ) {
        let record = match self.ndas.find_nda(nda_id, &ScopeFilter::Unrestricted).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(
                    target = "nda_portal::scoped_query",
                    nda_id = %nda_id,
                    error = %err,
                    "existence check for unauthorized access audit failed"
                );
                return;
            }
        };
        let authorized: Vec<&str> = authorized.iter().map(SubagencyId::as_str).collect();
        let entry = AuditEntry::new(AuditAction::UnauthorizedAccessAttempt, "nda")
            .with_entity_id(nda_id.as_str())
            .with_user(ctx.contact_id.clone())
            .with_client(client.ip_address.clone(), client.user_agent.clone())
            .with_details(json!({
                "attemptedSubagency": record.subagency_id.as_str(),
                "userAuthorizedSubagencies": authorized,
            }));
        self.audit.log(entry).await;
    }
}

/// Maps a store failure on an authorized read.
fn internal(err: nda_portal_core::StoreError) -> AuthzError {
    AuthzError::Internal(err.to_string())
}
