// crates/nda-portal-authz/src/pipeline.rs
// ============================================================================
// Module: Authorization Pipeline
// Description: Ordered authenticate, load-context, permission, scope stages.
// Purpose: Authorize a request end to end or stop at the first failing stage.
// Dependencies: nda-portal-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! Requests pass through four stages in a fixed order: the authentication
//! gate, user-context loading (with first-login provisioning), the route's
//! permission rule, and agency scope attachment. Each stage runs only when
//! every earlier stage succeeded; the first failure short-circuits with an
//! [`AuthzError`] whose [`AuthzError::stage`] names where it stopped.
//!
//! Scope attachment routes on the context's direct grants: no grants yields
//! an audited empty scope, subagency-only grants are used as-is, and any
//! group grant triggers a full resolution through the scope resolver.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use nda_portal_core::AgencyScope;
use nda_portal_core::AuditAction;
use nda_portal_core::AuditEntry;
use nda_portal_core::Identity;
use nda_portal_core::UserContext;
use serde_json::json;

use crate::audit::AuditLogger;
use crate::auth::RequestMeta;
use crate::auth::TokenVerifier;
use crate::auth::parse_bearer_token;
use crate::context::UserContextLoader;
use crate::error::AuthzError;
use crate::permission::AccessGrant;
use crate::permission::PermissionEvaluator;
use crate::permission::PermissionRule;
use crate::scope::AgencyScopeResolver;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Audit message for scoped requests from users without agency grants.
const NO_AGENCY_ACCESS_MESSAGE: &str =
    "User attempted to access agency-scoped resource without any agency access";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Authorization requirements of a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteGuard {
    /// Permission rule, when the route requires one.
    pub permission: Option<PermissionRule>,
    /// Whether the route attaches the caller's agency scope.
    pub agency_scoped: bool,
}

impl RouteGuard {
    /// Guard that only requires authentication.
    #[must_use]
    pub const fn authenticated() -> Self {
        Self {
            permission: None,
            agency_scoped: false,
        }
    }

    /// Guard requiring a permission rule.
    #[must_use]
    pub const fn requiring(rule: PermissionRule) -> Self {
        Self {
            permission: Some(rule),
            agency_scoped: false,
        }
    }

    /// Adds agency scope attachment.
    #[must_use]
    pub const fn scoped(mut self) -> Self {
        self.agency_scoped = true;
        self
    }
}

/// How the attached scope was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeResolution {
    /// The user holds no agency grant; the scope is empty.
    NoAgencyAccess,
    /// Only direct subagency grants exist; no lookup was needed.
    DirectOnly,
    /// Group grants were expanded through the resolver.
    Expanded,
    /// Group grants resolved to zero subagencies.
    VacuouslyEmpty,
}

/// Agency scope attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedScope {
    /// Authorized subagencies.
    pub scope: AgencyScope,
    /// How the scope was computed.
    pub resolution: ScopeResolution,
}

/// Request that passed every pipeline stage.
#[derive(Debug, Clone)]
pub struct AuthorizedRequest {
    /// Caller context.
    pub user: UserContext,
    /// How the permission rule passed, when the route has one.
    pub access: Option<AccessGrant>,
    /// Attached agency scope, when the route is scoped.
    pub agency_scope: Option<AttachedScope>,
    /// Request metadata.
    pub meta: RequestMeta,
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Ordered request authorization stages.
pub struct AuthorizationPipeline {
    /// Bearer token verifier.
    verifier: Arc<dyn TokenVerifier>,
    /// Context loader.
    contexts: Arc<UserContextLoader>,
    /// Permission evaluator.
    permissions: Arc<PermissionEvaluator>,
    /// Scope resolver.
    resolver: Arc<AgencyScopeResolver>,
    /// Audit writer.
    audit: Arc<AuditLogger>,
}

impl AuthorizationPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        contexts: Arc<UserContextLoader>,
        permissions: Arc<PermissionEvaluator>,
        resolver: Arc<AgencyScopeResolver>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            verifier,
            contexts,
            permissions,
            resolver,
            audit,
        }
    }

    /// Runs every stage the guard requires.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthzError`] of the first failing stage.
    pub async fn authorize(
        &self,
        meta: RequestMeta,
        guard: &RouteGuard,
    ) -> Result<AuthorizedRequest, AuthzError> {
        let identity = self.authenticate(&meta).await?;
        let user = self.attach_user_context(&identity, &meta).await?;
        let access = match &guard.permission {
            Some(rule) => Some(self.permissions.evaluate_access(Some(&user), rule, &meta).await?),
            None => None,
        };
        let agency_scope = if guard.agency_scoped {
            Some(self.scope_to_agencies(Some(&user), &meta).await?)
        } else {
            None
        };
        Ok(AuthorizedRequest {
            user,
            access,
            agency_scope,
            meta,
        })
    }

    /// Verifies the request's bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::NotAuthenticated`] when the token is missing or
    /// invalid.
    pub async fn authenticate(&self, meta: &RequestMeta) -> Result<Identity, AuthzError> {
        let token = parse_bearer_token(meta.auth_header.as_deref())
            .map_err(|err| AuthzError::NotAuthenticated(err.to_string()))?;
        self.verifier
            .verify_token(&token)
            .await
            .map_err(|err| AuthzError::NotAuthenticated(err.to_string()))
    }

    /// Loads the identity's context, provisioning a contact on first login.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::AccountInactive`] for deactivated contacts and
    /// context-load or provisioning errors otherwise.
    pub async fn attach_user_context(
        &self,
        identity: &Identity,
        meta: &RequestMeta,
    ) -> Result<UserContext, AuthzError> {
        let loaded = self.contexts.load_user_context(&identity.subject_id).await;
        let user = match loaded {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.contexts.create_contact_for_first_login(identity, &meta.client()).await?
            }
            Err(err) => {
                tracing::error!(
                    target = "nda_portal::pipeline",
                    subject_id = %identity.subject_id,
                    error = %err,
                    "user context load failed"
                );
                return Err(err);
            }
        };
        if !user.active {
            return Err(AuthzError::AccountInactive);
        }
        Ok(user)
    }

    /// Computes the agency scope for the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::NotAuthenticated`] without a context and
    /// [`AuthzError::ScopeComputation`] when group expansion fails.
    pub async fn scope_to_agencies(
        &self,
        ctx: Option<&UserContext>,
        meta: &RequestMeta,
    ) -> Result<AttachedScope, AuthzError> {
        let Some(ctx) = ctx else {
            return Err(AuthzError::NotAuthenticated("no user context".to_string()));
        };
        if !ctx.has_agency_grants() {
            self.audit_no_agency_access(ctx, meta).await;
            return Ok(AttachedScope {
                scope: AgencyScope::empty(),
                resolution: ScopeResolution::NoAgencyAccess,
            });
        }
        if ctx.authorized_agency_groups.is_empty() {
            return Ok(AttachedScope {
                scope: AgencyScope {
                    subagency_ids: ctx.authorized_subagencies.clone(),
                },
                resolution: ScopeResolution::DirectOnly,
            });
        }
        let scope = self.resolver.try_resolve(&ctx.contact_id).await.map_err(|err| {
            tracing::error!(
                target = "nda_portal::pipeline",
                contact_id = %ctx.contact_id,
                error = %err,
                "agency scope computation failed"
            );
            AuthzError::ScopeComputation(err.to_string())
        })?;
        if scope.is_empty() {
            tracing::warn!(
                target = "nda_portal::pipeline",
                contact_id = %ctx.contact_id,
                "agency group grants resolved to no subagencies"
            );
            return Ok(AttachedScope {
                scope,
                resolution: ScopeResolution::VacuouslyEmpty,
            });
        }
        Ok(AttachedScope {
            scope,
            resolution: ScopeResolution::Expanded,
        })
    }

    /// Audits a scoped request from a user without any agency grant.
    async fn audit_no_agency_access(&self, ctx: &UserContext, meta: &RequestMeta) {
        let client = meta.client();
        let entry = AuditEntry::new(AuditAction::UnauthorizedAccessAttempt, "agency_scope")
            .with_user(ctx.contact_id.clone())
            .with_client(client.ip_address, client.user_agent)
            .with_details(json!({
                "reason": "no_agency_access",
                "path": meta.path,
                "method": meta.method,
                "message": NO_AGENCY_ACCESS_MESSAGE,
            }));
        self.audit.log(entry).await;
    }
}
