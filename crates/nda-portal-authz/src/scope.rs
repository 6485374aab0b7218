// crates/nda-portal-authz/src/scope.rs
// ============================================================================
// Module: Agency Scope Resolver
// Description: Computes the subagencies a contact may access.
// Purpose: Turn grant edges into fail-closed scope filters for NDA queries.
// Dependencies: nda-portal-core, tracing
// ============================================================================

//! ## Overview
//! A contact's scope is the union of its direct subagency grants and every
//! subagency owned by a granted agency group. Group membership is read at
//! resolution time, so subagencies added to a granted group become visible
//! without re-granting. Lookup failures resolve to the empty scope; callers
//! that must distinguish a failure use [`AgencyScopeResolver::try_resolve`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use nda_portal_core::AgencyScope;
use nda_portal_core::AgencyStore;
use nda_portal_core::ContactId;
use nda_portal_core::ScopeFilter;
use nda_portal_core::StoreError;
use nda_portal_core::SubagencyId;
use nda_portal_core::UserContext;

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves agency scopes from grant edges.
pub struct AgencyScopeResolver {
    /// Agency store.
    agencies: Arc<dyn AgencyStore>,
    /// Role that sees every record.
    admin_role: String,
}

impl AgencyScopeResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(agencies: Arc<dyn AgencyStore>, admin_role: impl Into<String>) -> Self {
        Self {
            agencies,
            admin_role: admin_role.into(),
        }
    }

    /// Returns the role that bypasses scoping.
    #[must_use]
    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    /// Returns true when the context holds the admin role.
    #[must_use]
    pub fn is_admin(&self, ctx: &UserContext) -> bool {
        ctx.has_role(&self.admin_role)
    }

    /// Resolves the scope, surfacing storage failures.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when grant edges cannot be read.
    pub async fn try_resolve(&self, contact_id: &ContactId) -> Result<AgencyScope, StoreError> {
        let edges = self.agencies.grant_edges(contact_id).await?;
        Ok(AgencyScope::from_edges(edges))
    }

    /// Resolves the scope, returning the empty scope on failure.
    pub async fn get_user_agency_scope(&self, contact_id: &ContactId) -> AgencyScope {
        match self.try_resolve(contact_id).await {
            Ok(scope) => scope,
            Err(err) => {
                tracing::error!(
                    target = "nda_portal::scope",
                    contact_id = %contact_id,
                    error = %err,
                    "agency scope lookup failed; denying all subagencies"
                );
                AgencyScope::empty()
            }
        }
    }

    /// Returns true when the subagency is in the contact's scope.
    pub async fn is_authorized_for_subagency(
        &self,
        contact_id: &ContactId,
        subagency_id: &SubagencyId,
    ) -> bool {
        self.get_user_agency_scope(contact_id).await.contains(subagency_id)
    }

    /// Returns true when the contact's scope is non-empty.
    pub async fn has_any_agency_access(&self, contact_id: &ContactId) -> bool {
        !self.get_user_agency_scope(contact_id).await.is_empty()
    }

    /// Returns the NDA filter for a user: unrestricted for admins, otherwise
    /// the resolved scope. An empty scope matches no record.
    pub async fn scope_ndas_to_user(&self, ctx: &UserContext) -> ScopeFilter {
        if self.is_admin(ctx) {
            return ScopeFilter::Unrestricted;
        }
        ScopeFilter::from(self.get_user_agency_scope(&ctx.contact_id).await)
    }
}
