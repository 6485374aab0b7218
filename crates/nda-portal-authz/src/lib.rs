// crates/nda-portal-authz/src/lib.rs
// ============================================================================
// Module: NDA Portal Authz Library
// Description: Request authorization engine for the NDA portal.
// Purpose: Expose the pipeline, scoped queries, status engine, and admin APIs.
// Dependencies: nda-portal-core, nda-portal-config, nda-portal-store-sqlite
// ============================================================================

//! ## Overview
//! `nda-portal-authz` decides, for every request, whether the caller may act
//! and which NDA records they may see. Requests flow through an ordered
//! pipeline (authenticate, load context, check permission, attach scope);
//! NDA reads go through scope-enforcing queries that answer out-of-scope
//! lookups with not-found; and every security-relevant decision is written to
//! the audit log on a best-effort basis.
//! Security posture: all decisions fail closed; unknown identities, storage
//! errors during scope resolution, and empty rule sets never grant access.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod access_admin;
pub mod audit;
pub mod auth;
pub mod context;
pub mod error;
pub mod permission;
pub mod pipeline;
pub mod runtime;
pub mod scope;
pub mod scoped_query;
pub mod security;
pub mod status;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use access_admin::AccessAdmin;
pub use access_admin::AccessAdminError;
pub use access_admin::BulkGrantTarget;
pub use access_admin::BulkOutcome;
pub use access_admin::BulkResult;
pub use access_admin::BulkStatus;
pub use audit::AuditLogger;
pub use audit::AuditMirror;
pub use audit::AuditMirrorError;
pub use audit::FileAuditMirror;
pub use audit::NoopAuditMirror;
pub use audit::StderrAuditMirror;
pub use auth::AuthError;
pub use auth::ClientInfo;
pub use auth::RequestMeta;
pub use auth::StaticTokenVerifier;
pub use auth::TokenVerifier;
pub use context::CacheGeneration;
pub use context::InMemoryUserContextCache;
pub use context::UserContextCache;
pub use context::UserContextLoader;
pub use error::AuthzError;
pub use error::PermissionDenial;
pub use error::PermissionLogic;
pub use error::PipelineStage;
pub use permission::AccessGrant;
pub use permission::PermissionEvaluator;
pub use permission::PermissionRule;
pub use pipeline::AttachedScope;
pub use pipeline::AuthorizationPipeline;
pub use pipeline::AuthorizedRequest;
pub use pipeline::RouteGuard;
pub use pipeline::ScopeResolution;
pub use runtime::PortalRuntime;
pub use runtime::RuntimeError;
pub use runtime::RuntimeServices;
pub use scope::AgencyScopeResolver;
pub use scoped_query::ScopedQuery;
pub use security::FailedLoginAttempt;
pub use security::FailedLoginKind;
pub use security::FailedLoginSummary;
pub use security::MonitorSettings;
pub use security::SecurityMonitor;
pub use status::AutoTransitionOutcome;
pub use status::StatusTransitionEngine;
pub use status::StatusTransitionError;
pub use status::TransitionResult;
