// crates/nda-portal-authz/tests/pipeline.rs
// ============================================================================
// Module: Authorization Pipeline Tests
// Description: End-to-end request authorization through every stage.
// ============================================================================
//! ## Overview
//! Drives requests through authenticate, load-context, permission, and scope
//! stages. Covers first-login provisioning, inactive accounts, the three
//! scope routes, and fail-closed scope computation.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::collections::BTreeSet;

use common::Fixture;
use common::InstrumentedStore;
use common::request;
use common::subject_id;
use nda_portal_authz::AccessGrant;
use nda_portal_authz::AuthzError;
use nda_portal_authz::PermissionRule;
use nda_portal_authz::PipelineStage;
use nda_portal_authz::RequestMeta;
use nda_portal_authz::RouteGuard;
use nda_portal_authz::ScopeResolution;
use nda_portal_config::PortalConfig;
use nda_portal_core::AuditAction;
use nda_portal_core::Permission;
use nda_portal_core::SubagencyId;
use serde_json::json;

fn view_scoped() -> RouteGuard {
    RouteGuard::requiring(PermissionRule::Single(Permission::NdaView)).scoped()
}

// ============================================================================
// SECTION: Authentication
// ============================================================================

#[tokio::test]
async fn missing_header_stops_at_authentication() {
    let fixture = Fixture::new().await;
    let meta = RequestMeta::new("GET", "/api/ndas");

    let err = fixture.runtime.pipeline().authorize(meta, &view_scoped()).await.unwrap_err();

    assert!(matches!(err, AuthzError::NotAuthenticated(_)));
    assert_eq!(err.stage(), PipelineStage::Authenticate);
    assert_eq!(err.http_status(), 401);
    assert_eq!(fixture.store.subject_lookups(), 0);
}

#[tokio::test]
async fn unknown_token_stops_at_authentication() {
    let fixture = Fixture::new().await;
    let meta = RequestMeta::new("GET", "/api/ndas").with_bearer("tok-stranger");

    let err = fixture.runtime.pipeline().authorize(meta, &view_scoped()).await.unwrap_err();

    assert_eq!(err.code(), "NOT_AUTHENTICATED");
    assert_eq!(fixture.store.subject_lookups(), 0);
    assert_eq!(fixture.audit_total().await, 0);
}

#[tokio::test]
async fn wrong_scheme_is_rejected() {
    let fixture = Fixture::new().await;
    let meta = RequestMeta::new("GET", "/api/ndas").with_auth_header("Basic dG9rLWRpcmVjdA==");

    let err = fixture.runtime.pipeline().authorize(meta, &RouteGuard::authenticated()).await;

    assert!(matches!(err, Err(AuthzError::NotAuthenticated(_))));
}

// ============================================================================
// SECTION: Context
// ============================================================================

#[tokio::test]
async fn first_login_provisions_with_default_role() {
    let fixture = Fixture::new().await;
    let meta = request("GET", "/api/me", "newcomer").with_forwarded_for("203.0.113.9, 10.0.0.1");

    let authorized =
        fixture.runtime.pipeline().authorize(meta, &RouteGuard::authenticated()).await.unwrap();

    assert_eq!(authorized.user.subject_id, subject_id("newcomer"));
    assert_eq!(authorized.user.email, "newcomer@example.gov");
    assert_eq!(authorized.user.roles, vec!["Read-Only".to_string()]);
    assert!(authorized.user.holds_permission("nda:view"));
    assert!(authorized.access.is_none());
    assert!(authorized.agency_scope.is_none());

    let provisioned = fixture.audit(AuditAction::UserAutoProvisioned).await;
    assert_eq!(provisioned.len(), 1);
    let entry = &provisioned[0].entry;
    assert_eq!(entry.entity_type, "contact");
    assert_eq!(entry.entity_id.as_deref(), Some(authorized.user.contact_id.as_str()));
    assert_eq!(entry.ip_address.as_deref(), Some("203.0.113.9"));
    assert_eq!(entry.details["subjectId"], json!("sub-newcomer"));
    assert_eq!(entry.details["email"], json!("newcomer@example.gov"));
    assert_eq!(entry.details["defaultRole"], json!("Read-Only"));
}

#[tokio::test]
async fn second_login_reuses_provisioned_contact() {
    let fixture = Fixture::new().await;
    let pipeline = fixture.runtime.pipeline();
    let guard = RouteGuard::authenticated();

    let first = pipeline.authorize(request("GET", "/api/me", "newcomer"), &guard).await.unwrap();
    fixture.runtime.contexts().clear_all_user_context_cache();
    let second = pipeline.authorize(request("GET", "/api/me", "newcomer"), &guard).await.unwrap();

    assert_eq!(first.user.contact_id, second.user.contact_id);
    assert_eq!(fixture.audit(AuditAction::UserAutoProvisioned).await.len(), 1);
}

#[tokio::test]
async fn missing_default_role_is_fatal() {
    let mut config = PortalConfig::default();
    config.roles.default_role = "Ghost Role".to_string();
    let fixture = Fixture::with_config(config).await;
    let meta = request("GET", "/api/me", "newcomer");

    let err =
        fixture.runtime.pipeline().authorize(meta, &RouteGuard::authenticated()).await.unwrap_err();

    assert!(matches!(&err, AuthzError::DefaultRoleMissing(role) if role == "Ghost Role"));
    assert_eq!(err.code(), "DEFAULT_ROLE_MISSING");
    assert_eq!(err.http_status(), 500);
    assert_eq!(err.stage(), PipelineStage::LoadContext);
    assert!(fixture.audit(AuditAction::UserAutoProvisioned).await.is_empty());
}

#[tokio::test]
async fn inactive_contact_is_rejected() {
    let fixture = Fixture::new().await;
    let meta = request("GET", "/api/ndas", "inactive");

    let err = fixture.runtime.pipeline().authorize(meta, &view_scoped()).await.unwrap_err();

    assert!(matches!(err, AuthzError::AccountInactive));
    assert_eq!(err.code(), "ACCOUNT_INACTIVE");
    assert_eq!(err.http_status(), 401);
    assert!(fixture.audit(AuditAction::UserAutoProvisioned).await.is_empty());
}

#[tokio::test]
async fn directory_failure_surfaces_as_context_error() {
    let fixture = Fixture::new().await;
    InstrumentedStore::fail(&fixture.store.fail_subject_lookup);
    let meta = request("GET", "/api/ndas", "direct");

    let err = fixture.runtime.pipeline().authorize(meta, &view_scoped()).await.unwrap_err();

    assert_eq!(err.code(), "CONTEXT_LOAD_ERROR");
    assert_eq!(err.stage(), PipelineStage::LoadContext);
    assert!(fixture.audit(AuditAction::UserAutoProvisioned).await.is_empty());
}

// ============================================================================
// SECTION: Permission Stage
// ============================================================================

#[tokio::test]
async fn permission_denial_skips_scope_stage() {
    let fixture = Fixture::new().await;
    let guard = RouteGuard::requiring(PermissionRule::Single(Permission::NdaCreate)).scoped();
    let meta = request("POST", "/api/ndas", "reader");

    let err = fixture.runtime.pipeline().authorize(meta, &guard).await.unwrap_err();

    assert_eq!(err.stage(), PipelineStage::CheckPermission);
    assert_eq!(fixture.store.grant_edge_lookups(), 0);
    assert_eq!(fixture.audit(AuditAction::PermissionDenied).await.len(), 1);
    assert!(fixture.audit(AuditAction::UnauthorizedAccessAttempt).await.is_empty());
}

#[tokio::test]
async fn admin_passes_permission_stage_by_bypass() {
    let fixture = Fixture::new().await;
    let guard = RouteGuard::requiring(PermissionRule::All(vec![
        Permission::NdaDelete,
        Permission::AdminManageAgencies,
    ]));
    let meta = request("DELETE", "/api/agency-groups/g-empty", "admin");

    let authorized = fixture.runtime.pipeline().authorize(meta, &guard).await.unwrap();

    assert_eq!(authorized.access, Some(AccessGrant::AdminBypass));
    assert_eq!(fixture.audit(AuditAction::AdminBypass).await.len(), 1);
}

// ============================================================================
// SECTION: Scope Stage
// ============================================================================

#[tokio::test]
async fn direct_only_grants_skip_group_expansion() {
    let fixture = Fixture::new().await;
    let meta = request("GET", "/api/ndas", "reader");

    let authorized = fixture.runtime.pipeline().authorize(meta, &view_scoped()).await.unwrap();

    assert_eq!(authorized.access, Some(AccessGrant::Held));
    let attached = authorized.agency_scope.unwrap();
    assert_eq!(attached.resolution, ScopeResolution::DirectOnly);
    assert_eq!(
        attached.scope.subagency_ids,
        BTreeSet::from([SubagencyId::new("sa-nasa")])
    );
    assert_eq!(fixture.store.grant_edge_lookups(), 0);
}

#[tokio::test]
async fn no_grants_attach_empty_scope_and_audit() {
    let fixture = Fixture::new().await;
    let meta = request("GET", "/api/ndas", "none").with_user_agent("browser/2.0");

    let authorized = fixture.runtime.pipeline().authorize(meta, &view_scoped()).await.unwrap();

    let attached = authorized.agency_scope.unwrap();
    assert_eq!(attached.resolution, ScopeResolution::NoAgencyAccess);
    assert!(attached.scope.is_empty());
    let attempts = fixture.audit(AuditAction::UnauthorizedAccessAttempt).await;
    assert_eq!(attempts.len(), 1);
    let entry = &attempts[0].entry;
    assert_eq!(entry.entity_type, "agency_scope");
    assert_eq!(entry.user_agent.as_deref(), Some("browser/2.0"));
    assert_eq!(entry.details["reason"], json!("no_agency_access"));
    assert_eq!(entry.details["path"], json!("/api/ndas"));
    assert_eq!(entry.details["method"], json!("GET"));
}

#[tokio::test]
async fn group_grants_expand_through_resolver() {
    let fixture = Fixture::new().await;
    let meta = request("GET", "/api/ndas", "group");

    let authorized = fixture.runtime.pipeline().authorize(meta, &view_scoped()).await.unwrap();

    let attached = authorized.agency_scope.unwrap();
    assert_eq!(attached.resolution, ScopeResolution::Expanded);
    assert_eq!(
        attached.scope.subagency_ids,
        BTreeSet::from([SubagencyId::new("sa-army"), SubagencyId::new("sa-navy")])
    );
    assert_eq!(fixture.store.grant_edge_lookups(), 1);
}

#[tokio::test]
async fn empty_group_is_vacuous_not_unauthorized() {
    let fixture = Fixture::new().await;
    let meta = request("GET", "/api/ndas", "hollow");

    let authorized = fixture.runtime.pipeline().authorize(meta, &view_scoped()).await.unwrap();

    let attached = authorized.agency_scope.unwrap();
    assert_eq!(attached.resolution, ScopeResolution::VacuouslyEmpty);
    assert!(attached.scope.is_empty());
    assert!(fixture.audit(AuditAction::UnauthorizedAccessAttempt).await.is_empty());
}

#[tokio::test]
async fn scope_lookup_failure_is_a_server_error() {
    let fixture = Fixture::new().await;
    InstrumentedStore::fail(&fixture.store.fail_grant_edges);
    let meta = request("GET", "/api/ndas", "group");

    let err = fixture.runtime.pipeline().authorize(meta, &view_scoped()).await.unwrap_err();

    assert!(matches!(err, AuthzError::ScopeComputation(_)));
    assert_eq!(err.code(), "SCOPE_ERROR");
    assert_eq!(err.http_status(), 500);
    assert_eq!(err.stage(), PipelineStage::AttachScope);
}

#[tokio::test]
async fn scope_stage_requires_context() {
    let fixture = Fixture::new().await;
    let meta = request("GET", "/api/ndas", "direct");

    let err = fixture.runtime.pipeline().scope_to_agencies(None, &meta).await.unwrap_err();

    assert_eq!(err.code(), "NOT_AUTHENTICATED");
}

#[tokio::test]
async fn cached_context_serves_repeat_requests() {
    let fixture = Fixture::new().await;
    let pipeline = fixture.runtime.pipeline();

    for _ in 0 .. 3 {
        pipeline.authorize(request("GET", "/api/ndas", "direct"), &view_scoped()).await.unwrap();
    }

    assert_eq!(fixture.store.subject_lookups(), 1);
    assert_eq!(fixture.cache.len(), 1);
}
