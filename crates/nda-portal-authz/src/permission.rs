// crates/nda-portal-authz/src/permission.rs
// ============================================================================
// Module: Permission Checks
// Description: Single, any-of, and all-of permission rules with admin bypass.
// Purpose: Decide route access and audit every bypass and denial.
// Dependencies: nda-portal-core, serde_json
// ============================================================================

//! ## Overview
//! [`PermissionEvaluator`] evaluates a [`PermissionRule`] against a user
//! context. Holders of the admin role pass every rule; the bypass is audited
//! once per check. Denials are audited with the caller's roles and the
//! endpoint, then surfaced as [`AuthzError::PermissionDenied`]. A missing
//! context is reported as unauthenticated without an audit entry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use nda_portal_core::AuditAction;
use nda_portal_core::AuditEntry;
use nda_portal_core::Permission;
use nda_portal_core::UserContext;
use nda_portal_core::permission_denial_message;
use serde_json::Value;
use serde_json::json;

use crate::audit::AuditLogger;
use crate::auth::RequestMeta;
use crate::error::AuthzError;
use crate::error::PermissionDenial;
use crate::error::PermissionLogic;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Denial message for any-of and all-of rules.
pub const INSUFFICIENT_PERMISSIONS_MESSAGE: &str = "Insufficient permissions";

/// Audit entity type for permission checks.
const PERMISSION_CHECK_ENTITY: &str = "permission_check";

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Permission requirement attached to a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionRule {
    /// The permission must be held.
    Single(Permission),
    /// At least one permission must be held.
    Any(Vec<Permission>),
    /// Every permission must be held.
    All(Vec<Permission>),
}

impl PermissionRule {
    /// Returns the rule's combination logic.
    #[must_use]
    pub const fn logic(&self) -> PermissionLogic {
        match self {
            Self::Single(_) => PermissionLogic::Single,
            Self::Any(_) => PermissionLogic::Any,
            Self::All(_) => PermissionLogic::All,
        }
    }

    /// Returns the permission codes named by the rule.
    #[must_use]
    pub fn codes(&self) -> Vec<String> {
        match self {
            Self::Single(permission) => vec![permission.code().to_string()],
            Self::Any(permissions) | Self::All(permissions) => {
                permissions.iter().map(|permission| permission.code().to_string()).collect()
            }
        }
    }

    /// Returns true when the context's own permissions satisfy the rule.
    ///
    /// Empty any-of and all-of rules are never satisfied.
    #[must_use]
    pub fn satisfied_by(&self, ctx: &UserContext) -> bool {
        match self {
            Self::Single(permission) => ctx.holds_permission(permission.code()),
            Self::Any(permissions) => {
                permissions.iter().any(|permission| ctx.holds_permission(permission.code()))
            }
            Self::All(permissions) => {
                !permissions.is_empty()
                    && permissions.iter().all(|permission| ctx.holds_permission(permission.code()))
            }
        }
    }

    /// Returns the named codes the context does not hold.
    #[must_use]
    pub fn missing(&self, ctx: &UserContext) -> Vec<String> {
        self.codes().into_iter().filter(|code| !ctx.holds_permission(code)).collect()
    }

    /// Returns the denial message for the rule.
    fn denial_message(&self) -> String {
        match self {
            Self::Single(permission) => permission
                .denial_message()
                .map_or_else(|| permission_denial_message(permission.code()), ToString::to_string),
            Self::Any(_) | Self::All(_) => INSUFFICIENT_PERMISSIONS_MESSAGE.to_string(),
        }
    }

    /// Returns the rule fields shared by bypass and denial audit details.
    fn audit_details(&self) -> serde_json::Map<String, Value> {
        let mut details = serde_json::Map::new();
        match self {
            Self::Single(permission) => {
                details.insert("permission".to_string(), json!(permission.code()));
            }
            Self::Any(_) | Self::All(_) => {
                details.insert("permissions".to_string(), json!(self.codes()));
                details.insert("logic".to_string(), json!(self.logic().as_str()));
            }
        }
        details
    }
}

// ============================================================================
// SECTION: Evaluator
// ============================================================================

/// How a permission check passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessGrant {
    /// The caller holds the required permissions.
    Held,
    /// The caller holds the admin role.
    AdminBypass,
}

/// Evaluates permission rules and audits bypasses and denials.
pub struct PermissionEvaluator {
    /// Audit writer.
    audit: Arc<AuditLogger>,
    /// Role that passes every rule.
    admin_role: String,
}

impl PermissionEvaluator {
    /// Creates an evaluator.
    #[must_use]
    pub fn new(audit: Arc<AuditLogger>, admin_role: impl Into<String>) -> Self {
        Self {
            audit,
            admin_role: admin_role.into(),
        }
    }

    /// Returns true when the context holds the permission, counting the
    /// admin role as holding every permission. Nothing is audited.
    #[must_use]
    pub fn has_permission(&self, ctx: &UserContext, permission: Permission) -> bool {
        ctx.has_role(&self.admin_role) || ctx.holds_permission(permission.code())
    }

    /// Evaluates a rule for a request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::NotAuthenticated`] without a context and
    /// [`AuthzError::PermissionDenied`] when the rule is not satisfied.
    pub async fn evaluate_access(
        &self,
        ctx: Option<&UserContext>,
        rule: &PermissionRule,
        meta: &RequestMeta,
    ) -> Result<AccessGrant, AuthzError> {
        let Some(ctx) = ctx else {
            return Err(AuthzError::NotAuthenticated("no user context".to_string()));
        };
        if ctx.has_role(&self.admin_role) {
            let mut details = rule.audit_details();
            details.insert("bypassReason".to_string(), json!("admin_role"));
            let entry = permission_check_entry(AuditAction::AdminBypass, ctx, meta, details);
            self.audit.log(entry).await;
            return Ok(AccessGrant::AdminBypass);
        }
        if rule.satisfied_by(ctx) {
            return Ok(AccessGrant::Held);
        }
        let missing = match rule {
            PermissionRule::All(_) => rule.missing(ctx),
            PermissionRule::Single(_) | PermissionRule::Any(_) => Vec::new(),
        };
        let mut details = rule.audit_details();
        details.insert("userRoles".to_string(), json!(ctx.roles));
        details.insert("endpoint".to_string(), json!(meta.endpoint()));
        if matches!(rule, PermissionRule::All(_)) {
            details.insert("missingPermissions".to_string(), json!(missing));
        }
        let entry = permission_check_entry(AuditAction::PermissionDenied, ctx, meta, details);
        self.audit.log(entry).await;
        Err(AuthzError::PermissionDenied(PermissionDenial {
            message: rule.denial_message(),
            logic: rule.logic(),
            required: rule.codes(),
            missing,
        }))
    }

    /// Requires a single permission.
    ///
    /// # Errors
    ///
    /// See [`PermissionEvaluator::evaluate_access`].
    pub async fn require_permission(
        &self,
        ctx: Option<&UserContext>,
        permission: Permission,
        meta: &RequestMeta,
    ) -> Result<AccessGrant, AuthzError> {
        self.evaluate_access(ctx, &PermissionRule::Single(permission), meta).await
    }

    /// Requires at least one of the permissions.
    ///
    /// # Errors
    ///
    /// See [`PermissionEvaluator::evaluate_access`].
    pub async fn require_any_permission(
        &self,
        ctx: Option<&UserContext>,
        permissions: &[Permission],
        meta: &RequestMeta,
    ) -> Result<AccessGrant, AuthzError> {
        self.evaluate_access(ctx, &PermissionRule::Any(permissions.to_vec()), meta).await
    }

    /// Requires every one of the permissions.
    ///
    /// # Errors
    ///
    /// See [`PermissionEvaluator::evaluate_access`].
    pub async fn require_all_permissions(
        &self,
        ctx: Option<&UserContext>,
        permissions: &[Permission],
        meta: &RequestMeta,
    ) -> Result<AccessGrant, AuthzError> {
        self.evaluate_access(ctx, &PermissionRule::All(permissions.to_vec()), meta).await
    }
}

/// Builds a permission-check audit entry.
fn permission_check_entry(
    action: AuditAction,
    ctx: &UserContext,
    meta: &RequestMeta,
    details: serde_json::Map<String, Value>,
) -> AuditEntry {
    let client = meta.client();
    AuditEntry::new(action, PERMISSION_CHECK_ENTITY)
        .with_user(ctx.contact_id.clone())
        .with_client(client.ip_address, client.user_agent)
        .with_details(Value::Object(details))
}
