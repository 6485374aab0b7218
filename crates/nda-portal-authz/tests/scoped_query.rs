// crates/nda-portal-authz/tests/scoped_query.rs
// ============================================================================
// Module: Scoped Query Tests
// Description: Scope-enforcing NDA reads and audited artifact release.
// ============================================================================
//! ## Overview
//! Out-of-scope records are indistinguishable from missing ones, but only
//! the former leave an unauthorized-access audit entry. Artifact release
//! writes its download audit before the artifact is produced.

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
use common::nda;
use nda_portal_authz::AuthzError;
use nda_portal_authz::ClientInfo;
use nda_portal_core::AuditAction;
use nda_portal_core::AuditQuery;
use nda_portal_core::AuditStore;
use nda_portal_core::NdaQuery;
use nda_portal_core::NdaRecord;
use nda_portal_core::NdaStatus;
use serde_json::json;

fn client() -> ClientInfo {
    ClientInfo {
        ip_address: Some("198.51.100.7".to_string()),
        user_agent: Some("portal-ui/3.1".to_string()),
    }
}

fn record_ids(records: &[NdaRecord]) -> BTreeSet<String> {
    records.iter().map(|record| record.id.to_string()).collect()
}

#[tokio::test]
async fn in_scope_record_is_returned_without_audit() {
    let fixture = Fixture::new().await;
    let user = fixture.user("direct").await;

    let found = fixture
        .runtime
        .scoped_query()
        .find_record_with_scope(&nda("nda-army"), &user, &client())
        .await
        .unwrap();

    assert_eq!(found.map(|record| record.display_id), Some(1));
    assert_eq!(fixture.audit_total().await, 0);
}

#[tokio::test]
async fn out_of_scope_and_missing_records_look_identical() {
    let fixture = Fixture::new().await;
    let user = fixture.user("direct").await;
    let queries = fixture.runtime.scoped_query();

    let out_of_scope = queries.require_record_with_scope(&nda("nda-navy"), &user, &client()).await;
    let missing = queries.require_record_with_scope(&nda("nda-ghost"), &user, &client()).await;

    let out_of_scope = out_of_scope.unwrap_err();
    let missing = missing.unwrap_err();
    assert!(matches!(out_of_scope, AuthzError::NotFound("NDA")));
    assert!(matches!(missing, AuthzError::NotFound("NDA")));
    assert_eq!(out_of_scope.to_string(), missing.to_string());
    assert_eq!(out_of_scope.http_status(), 404);
}

#[tokio::test]
async fn only_existing_out_of_scope_records_are_audited() {
    let fixture = Fixture::new().await;
    let user = fixture.user("direct").await;
    let queries = fixture.runtime.scoped_query();

    queries.find_record_with_scope(&nda("nda-ghost"), &user, &client()).await.unwrap();
    assert_eq!(fixture.audit_total().await, 0);

    queries.find_record_with_scope(&nda("nda-navy"), &user, &client()).await.unwrap();
    let attempts = fixture.audit(AuditAction::UnauthorizedAccessAttempt).await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(fixture.audit_total().await, 1);
    let entry = &attempts[0].entry;
    assert_eq!(entry.entity_type, "nda");
    assert_eq!(entry.entity_id.as_deref(), Some("nda-navy"));
    assert_eq!(entry.ip_address.as_deref(), Some("198.51.100.7"));
    assert_eq!(entry.details["attemptedSubagency"], json!("sa-navy"));
    assert_eq!(entry.details["userAuthorizedSubagencies"], json!(["sa-army"]));
}

#[tokio::test]
async fn admin_reads_every_record_without_audit() {
    let fixture = Fixture::new().await;
    let admin = fixture.user("admin").await;
    let queries = fixture.runtime.scoped_query();

    for id in ["nda-army", "nda-navy", "nda-nasa"] {
        assert!(queries.is_authorized_for_record(&nda(id), &admin).await.unwrap());
    }
    let missing = queries.find_record_with_scope(&nda("nda-ghost"), &admin, &client()).await;
    assert!(missing.unwrap().is_none());
    assert_eq!(fixture.audit_total().await, 0);
}

#[tokio::test]
async fn user_without_grants_sees_nothing() {
    let fixture = Fixture::new().await;
    let user = fixture.user("none").await;
    let queries = fixture.runtime.scoped_query();

    let listed = queries.find_many_records_with_scope(&user, &NdaQuery::default()).await.unwrap();
    let counted = queries.count_records_with_scope(&user, &NdaQuery::default()).await.unwrap();

    assert!(listed.is_empty());
    assert_eq!(counted, 0);
}

#[tokio::test]
async fn listings_follow_group_scope_and_filters() {
    let fixture = Fixture::new().await;
    let user = fixture.user("group").await;
    let queries = fixture.runtime.scoped_query();

    let all = queries.find_many_records_with_scope(&user, &NdaQuery::default()).await.unwrap();
    assert_eq!(record_ids(&all), BTreeSet::from(["nda-army".to_string(), "nda-navy".to_string()]));

    let emailed = NdaQuery {
        status: Some(NdaStatus::Emailed),
        limit: None,
    };
    let filtered = queries.find_many_records_with_scope(&user, &emailed).await.unwrap();
    assert_eq!(record_ids(&filtered), BTreeSet::from(["nda-navy".to_string()]));
    assert_eq!(queries.count_records_with_scope(&user, &emailed).await.unwrap(), 1);

    let limited = NdaQuery {
        status: None,
        limit: Some(1),
    };
    assert_eq!(queries.find_many_records_with_scope(&user, &limited).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_existence_check_still_masks() {
    let fixture = Fixture::new().await;
    let user = fixture.user("direct").await;
    InstrumentedStore::fail(&fixture.store.fail_unscoped_find);

    let found = fixture
        .runtime
        .scoped_query()
        .find_record_with_scope(&nda("nda-navy"), &user, &client())
        .await
        .unwrap();

    assert!(found.is_none());
    assert_eq!(fixture.audit_total().await, 0);
}

#[tokio::test]
async fn scope_lookup_failure_denies_every_record() {
    let fixture = Fixture::new().await;
    let user = fixture.user("group").await;
    InstrumentedStore::fail(&fixture.store.fail_grant_edges);

    let authorized = fixture
        .runtime
        .scoped_query()
        .is_authorized_for_record(&nda("nda-army"), &user)
        .await
        .unwrap();

    assert!(!authorized);
}

#[tokio::test]
async fn artifact_release_audits_before_producing() {
    let fixture = Fixture::new().await;
    let user = fixture.user("direct").await;
    let store = fixture.store.clone();

    let url = fixture
        .runtime
        .scoped_query()
        .release_artifact(&nda("nda-army"), &user, &client(), "doc-17", |record| async move {
            let query = AuditQuery::for_actions(&[AuditAction::DocumentDownloaded]);
            let logged = store.count_audit(&query).await.unwrap();
            assert_eq!(logged, 1, "download audit must precede artifact generation");
            format!("https://files.example.gov/{}/doc-17?sig=abc", record.id)
        })
        .await
        .unwrap();

    assert_eq!(url, "https://files.example.gov/nda-army/doc-17?sig=abc");
    let downloads = fixture.audit(AuditAction::DocumentDownloaded).await;
    assert_eq!(downloads.len(), 1);
    let entry = &downloads[0].entry;
    assert_eq!(entry.entity_type, "document");
    assert_eq!(entry.entity_id.as_deref(), Some("doc-17"));
    assert_eq!(entry.details["ndaId"], json!("nda-army"));
    assert_eq!(entry.details["displayId"], json!(1));
}

#[tokio::test]
async fn artifact_release_out_of_scope_never_produces() {
    let fixture = Fixture::new().await;
    let user = fixture.user("direct").await;
    let mut produced = false;

    let result = fixture
        .runtime
        .scoped_query()
        .release_artifact(&nda("nda-nasa"), &user, &client(), "doc-99", |_| {
            produced = true;
            async {}
        })
        .await;

    assert!(matches!(result, Err(AuthzError::NotFound(_))));
    assert!(!produced);
    assert!(fixture.audit(AuditAction::DocumentDownloaded).await.is_empty());
    assert_eq!(fixture.audit(AuditAction::UnauthorizedAccessAttempt).await.len(), 1);
}
