// crates/nda-portal-authz/src/error.rs
// ============================================================================
// Module: Authorization Errors
// Description: Error taxonomy for the request authorization pipeline.
// Purpose: Map every authorization failure to a stable code and HTTP status.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every authorization failure carries a machine-readable code and the HTTP
//! status the transport layer should answer with. Not-found errors carry no
//! detail about whether the record exists, so a record outside the caller's
//! scope and a missing record produce identical responses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Permission Denials
// ============================================================================

/// How a permission rule combines its codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLogic {
    /// Exactly one permission is required.
    Single,
    /// At least one listed permission is required.
    Any,
    /// Every listed permission is required.
    All,
}

impl PermissionLogic {
    /// Returns the label recorded in audit details.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Any => "any",
            Self::All => "all",
        }
    }
}

/// Details of a denied permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDenial {
    /// Human-readable denial message.
    pub message: String,
    /// Rule logic that was evaluated.
    pub logic: PermissionLogic,
    /// Permission codes the rule named.
    pub required: Vec<String>,
    /// Codes the caller lacks (populated for `All` rules).
    pub missing: Vec<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while authorizing a request.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// No verified identity or user context.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),
    /// The contact exists but has been deactivated.
    #[error("account is inactive")]
    AccountInactive,
    /// The caller lacks the required permissions.
    #[error("{}", .0.message)]
    PermissionDenied(PermissionDenial),
    /// Agency scope could not be computed.
    #[error("failed to compute agency scope: {0}")]
    ScopeComputation(String),
    /// The record is missing or outside the caller's scope.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// The user context could not be loaded.
    #[error("failed to load user context: {0}")]
    ContextLoad(String),
    /// The configured first-login role does not exist.
    #[error("default role '{0}' is not defined")]
    DefaultRoleMissing(String),
    /// Storage failed while serving an authorized read.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthzError {
    /// Returns the stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated(_) => "NOT_AUTHENTICATED",
            Self::AccountInactive => "ACCOUNT_INACTIVE",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::ScopeComputation(_) => "SCOPE_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ContextLoad(_) => "CONTEXT_LOAD_ERROR",
            Self::DefaultRoleMissing(_) => "DEFAULT_ROLE_MISSING",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for the error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::NotAuthenticated(_) | Self::AccountInactive => 401,
            Self::PermissionDenied(_) => 403,
            Self::NotFound(_) => 404,
            Self::ScopeComputation(_)
            | Self::ContextLoad(_)
            | Self::DefaultRoleMissing(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns the pipeline stage that raises the error.
    #[must_use]
    pub const fn stage(&self) -> PipelineStage {
        match self {
            Self::NotAuthenticated(_) => PipelineStage::Authenticate,
            Self::AccountInactive | Self::ContextLoad(_) | Self::DefaultRoleMissing(_) => {
                PipelineStage::LoadContext
            }
            Self::PermissionDenied(_) => PipelineStage::CheckPermission,
            Self::ScopeComputation(_) => PipelineStage::AttachScope,
            Self::NotFound(_) | Self::Internal(_) => PipelineStage::Handler,
        }
    }
}

// ============================================================================
// SECTION: Pipeline Stages
// ============================================================================

/// Ordered stages of the authorization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    /// Verify the bearer token.
    Authenticate,
    /// Load or provision the user context.
    LoadContext,
    /// Evaluate the route's permission rule.
    CheckPermission,
    /// Attach the agency scope.
    AttachScope,
    /// Route handler work after the pipeline completed.
    Handler,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
