// crates/nda-portal-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Portal Store Unit Tests
// Description: Targeted integrity tests for the SQLite portal store
// Purpose: Validate path safety, schema versioning, scope filtering, status
//          compare-and-set, grant bookkeeping, and audit queries.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` store invariants:
//! - Path safety checks (component/directory rejection)
//! - Schema version validation
//! - Scope filters pushed into SQL (empty scope matches nothing)
//! - Status changes commit atomically with history
//! - Grant edges, subagency access listing, and group deletion guards
//! - Audit counting and newest-first listing
//! - Corrupted rows fail closed

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;
use std::path::PathBuf;

use nda_portal_core::AccessSource;
use nda_portal_core::AgencyGrant;
use nda_portal_core::AgencyGroup;
use nda_portal_core::AgencyGroupId;
use nda_portal_core::AgencyStore;
use nda_portal_core::AuditAction;
use nda_portal_core::AuditEntry;
use nda_portal_core::AuditEntryId;
use nda_portal_core::AuditQuery;
use nda_portal_core::AuditRecord;
use nda_portal_core::AuditStore;
use nda_portal_core::ContactId;
use nda_portal_core::ContactRecord;
use nda_portal_core::DirectoryStore;
use nda_portal_core::GrantTarget;
use nda_portal_core::LIMITED_USER_ROLE;
use nda_portal_core::NDA_USER_ROLE;
use nda_portal_core::NdaId;
use nda_portal_core::NdaQuery;
use nda_portal_core::NdaRecord;
use nda_portal_core::NdaStatus;
use nda_portal_core::NdaStore;
use nda_portal_core::NewContact;
use nda_portal_core::READ_ONLY_ROLE;
use nda_portal_core::ScopeFilter;
use nda_portal_core::StatusChange;
use nda_portal_core::StoreError;
use nda_portal_core::Subagency;
use nda_portal_core::SubagencyId;
use nda_portal_core::SubjectId;
use nda_portal_core::Timestamp;
use nda_portal_core::system_roles;
use nda_portal_store_sqlite::MAX_AUDIT_DETAILS_BYTES;
use nda_portal_store_sqlite::SqlitePortalStore;
use nda_portal_store_sqlite::SqliteStoreConfig;
use nda_portal_store_sqlite::SqliteStoreError;
use rusqlite::Connection;
use rusqlite::params;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn store_path(temp: &TempDir) -> PathBuf {
    temp.path().join("portal.sqlite")
}

fn open_store(temp: &TempDir) -> SqlitePortalStore {
    let store = SqlitePortalStore::new(&SqliteStoreConfig::at(store_path(temp))).unwrap();
    for role in system_roles() {
        store.insert_role(&role).unwrap();
    }
    store
}

fn ts(value: i64) -> Timestamp {
    Timestamp::from_unix_millis(value)
}

async fn seed_hierarchy(store: &SqlitePortalStore) {
    store
        .insert_agency_group(&AgencyGroup {
            id: AgencyGroupId::new("g-dod"),
            name: "Department of Defense".to_string(),
            code: "DOD".to_string(),
        })
        .await
        .unwrap();
    for (id, code) in [("s-army", "ARMY"), ("s-navy", "NAVY")] {
        store
            .insert_subagency(&Subagency {
                id: SubagencyId::new(id),
                agency_group_id: AgencyGroupId::new("g-dod"),
                name: code.to_string(),
                code: code.to_string(),
            })
            .await
            .unwrap();
    }
}

fn nda(id: &str, display_id: u64, subagency: &str, status: NdaStatus) -> NdaRecord {
    NdaRecord {
        id: NdaId::new(id),
        display_id,
        subagency_id: SubagencyId::new(subagency),
        company_name: format!("Company {display_id}"),
        status,
        fully_executed_at: None,
        created_by: None,
        created_at: ts(1_000),
    }
}

fn only(ids: &[&str]) -> ScopeFilter {
    ScopeFilter::Subagencies(ids.iter().map(|id| SubagencyId::new(*id)).collect())
}

fn audit(id: &str, action: AuditAction, at: i64, ip: &str, email: &str) -> AuditRecord {
    AuditRecord {
        id: AuditEntryId::new(id),
        created_at: ts(at),
        entry: AuditEntry::new(action, "auth")
            .with_client(Some(ip.to_string()), None)
            .with_details(json!({ "email": email })),
    }
}

// ============================================================================
// SECTION: Path And Schema
// ============================================================================

#[test]
fn sqlite_store_rejects_directory_path() {
    let temp = TempDir::new().unwrap();
    let result = SqlitePortalStore::new(&SqliteStoreConfig::at(temp.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn sqlite_store_rejects_overlong_component() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a".repeat(300));
    let result = SqlitePortalStore::new(&SqliteStoreConfig::at(path));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn sqlite_store_rejects_unknown_schema_version() {
    let temp = TempDir::new().unwrap();
    drop(open_store(&temp));
    let conn = Connection::open(store_path(&temp)).unwrap();
    conn.execute("UPDATE store_meta SET version = ?1", params![99_i64]).unwrap();
    drop(conn);
    let result = SqlitePortalStore::new(&SqliteStoreConfig::at(store_path(&temp)));
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

#[tokio::test]
async fn sqlite_store_persists_across_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let store = open_store(&temp);
        seed_hierarchy(&store).await;
        store.insert_nda(&nda("n-1", 1, "s-army", NdaStatus::Created)).await.unwrap();
    }
    let store = open_store(&temp);
    let found = store.find_nda(&NdaId::new("n-1"), &ScopeFilter::Unrestricted).await.unwrap();
    assert_eq!(found.map(|record| record.display_id), Some(1));
}

// ============================================================================
// SECTION: Directory
// ============================================================================

#[tokio::test]
async fn profile_carries_roles_in_assignment_order_and_grants() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_hierarchy(&store).await;
    store
        .insert_contact(
            &ContactRecord::linked("c-1", "sub-1", "one@example.gov"),
            &[LIMITED_USER_ROLE, NDA_USER_ROLE],
            ts(1),
        )
        .unwrap();
    store
        .insert_grant(&AgencyGrant {
            contact_id: ContactId::new("c-1"),
            target: GrantTarget::Subagency(SubagencyId::new("s-navy")),
            granted_by: None,
            granted_at: ts(2),
        })
        .await
        .unwrap();

    let profile =
        store.find_profile_by_subject(&SubjectId::new("sub-1")).await.unwrap().unwrap();
    let names: Vec<&str> = profile.roles.iter().map(|role| role.name.as_str()).collect();
    assert_eq!(names, vec![LIMITED_USER_ROLE, NDA_USER_ROLE]);
    assert!(profile.subagency_grants.contains(&SubagencyId::new("s-navy")));
    assert!(profile.agency_group_grants.is_empty());

    let by_contact = store.find_profile_by_contact(&ContactId::new("c-1")).await.unwrap();
    assert_eq!(by_contact, Some(profile));
    assert!(store.find_profile_by_subject(&SubjectId::new("nobody")).await.unwrap().is_none());
}

#[tokio::test]
async fn create_contact_rejects_linked_subject_and_unknown_role() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let created = store
        .create_contact(
            NewContact {
                contact_id: ContactId::new("c-1"),
                subject_id: SubjectId::new("sub-1"),
                email: "one@example.gov".to_string(),
                role_name: READ_ONLY_ROLE.to_string(),
            },
            ts(5),
        )
        .await
        .unwrap();
    assert_eq!(created.roles.len(), 1);
    assert!(created.active);

    let duplicate = store
        .create_contact(
            NewContact {
                contact_id: ContactId::new("c-2"),
                subject_id: SubjectId::new("sub-1"),
                email: "two@example.gov".to_string(),
                role_name: READ_ONLY_ROLE.to_string(),
            },
            ts(6),
        )
        .await;
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

    let missing_role = store
        .create_contact(
            NewContact {
                contact_id: ContactId::new("c-3"),
                subject_id: SubjectId::new("sub-3"),
                email: "three@example.gov".to_string(),
                role_name: "Ghost".to_string(),
            },
            ts(7),
        )
        .await;
    assert!(matches!(missing_role, Err(StoreError::NotFound(_))));
    assert!(store.find_profile_by_contact(&ContactId::new("c-3")).await.unwrap().is_none());
}

#[tokio::test]
async fn remove_role_and_deactivate_report_missing_rows() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    store
        .insert_contact(
            &ContactRecord::linked("c-1", "sub-1", "a@example.gov"),
            &[READ_ONLY_ROLE],
            ts(1),
        )
        .unwrap();
    let missing = store.remove_role(&ContactId::new("c-1"), NDA_USER_ROLE).await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
    store.set_contact_active(&ContactId::new("c-1"), false).await.unwrap();
    let profile = store.find_profile_by_contact(&ContactId::new("c-1")).await.unwrap().unwrap();
    assert!(!profile.active);
    let ghost = store.set_contact_active(&ContactId::new("ghost"), false).await;
    assert!(matches!(ghost, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn remove_role_refuses_the_last_role() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    store
        .insert_contact(
            &ContactRecord::linked("c-1", "sub-1", "a@example.gov"),
            &[READ_ONLY_ROLE, NDA_USER_ROLE],
            ts(1),
        )
        .unwrap();
    let contact = ContactId::new("c-1");

    store.remove_role(&contact, NDA_USER_ROLE).await.unwrap();
    let last = store.remove_role(&contact, READ_ONLY_ROLE).await;

    assert!(matches!(last, Err(StoreError::Conflict(_))));
    let profile = store.find_profile_by_contact(&contact).await.unwrap().unwrap();
    let roles: Vec<&str> = profile.roles.iter().map(|role| role.name.as_str()).collect();
    assert_eq!(roles, vec![READ_ONLY_ROLE]);
}

// ============================================================================
// SECTION: Agencies
// ============================================================================

#[tokio::test]
async fn grant_edges_expand_current_group_membership() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_hierarchy(&store).await;
    store
        .insert_contact(
            &ContactRecord::linked("c-1", "sub-1", "a@example.gov"),
            &[READ_ONLY_ROLE],
            ts(1),
        )
        .unwrap();
    store
        .insert_grant(&AgencyGrant {
            contact_id: ContactId::new("c-1"),
            target: GrantTarget::AgencyGroup(AgencyGroupId::new("g-dod")),
            granted_by: None,
            granted_at: ts(2),
        })
        .await
        .unwrap();

    let edges = store.grant_edges(&ContactId::new("c-1")).await.unwrap();
    assert!(edges.direct_subagencies.is_empty());
    assert_eq!(edges.groups.len(), 1);
    let expected: BTreeSet<SubagencyId> =
        ["s-army", "s-navy"].into_iter().map(SubagencyId::new).collect();
    assert_eq!(edges.groups[0].subagencies, expected);
}

#[tokio::test]
async fn insert_grant_rejects_duplicates_and_missing_targets() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_hierarchy(&store).await;
    store
        .insert_contact(
            &ContactRecord::linked("c-1", "sub-1", "a@example.gov"),
            &[READ_ONLY_ROLE],
            ts(1),
        )
        .unwrap();
    let grant = AgencyGrant {
        contact_id: ContactId::new("c-1"),
        target: GrantTarget::Subagency(SubagencyId::new("s-army")),
        granted_by: None,
        granted_at: ts(2),
    };
    store.insert_grant(&grant).await.unwrap();
    assert!(matches!(store.insert_grant(&grant).await, Err(StoreError::Conflict(_))));

    let missing = AgencyGrant {
        target: GrantTarget::Subagency(SubagencyId::new("s-none")),
        ..grant.clone()
    };
    assert!(matches!(store.insert_grant(&missing).await, Err(StoreError::NotFound(_))));

    store.delete_grant(&grant.contact_id, &grant.target).await.unwrap();
    assert!(matches!(
        store.delete_grant(&grant.contact_id, &grant.target).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn subagency_access_prefers_direct_over_inherited() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_hierarchy(&store).await;
    for (contact, subject) in [("c-1", "sub-1"), ("c-2", "sub-2")] {
        store
            .insert_contact(
                &ContactRecord::linked(contact, subject, format!("{contact}@example.gov")),
                &[READ_ONLY_ROLE],
                ts(1),
            )
            .unwrap();
    }
    for target in [
        GrantTarget::AgencyGroup(AgencyGroupId::new("g-dod")),
        GrantTarget::Subagency(SubagencyId::new("s-army")),
    ] {
        store
            .insert_grant(&AgencyGrant {
                contact_id: ContactId::new("c-1"),
                target,
                granted_by: None,
                granted_at: ts(2),
            })
            .await
            .unwrap();
    }
    store
        .insert_grant(&AgencyGrant {
            contact_id: ContactId::new("c-2"),
            target: GrantTarget::AgencyGroup(AgencyGroupId::new("g-dod")),
            granted_by: None,
            granted_at: ts(2),
        })
        .await
        .unwrap();

    let entries = store.subagency_access(&SubagencyId::new("s-army")).await.unwrap();
    assert_eq!(entries.len(), 2);
    let first = entries.iter().find(|entry| entry.contact_id.as_str() == "c-1").unwrap();
    assert_eq!(first.source, AccessSource::Direct);
    let second = entries.iter().find(|entry| entry.contact_id.as_str() == "c-2").unwrap();
    assert_eq!(
        second.source,
        AccessSource::Inherited {
            agency_group_id: AgencyGroupId::new("g-dod")
        }
    );
}

#[tokio::test]
async fn delete_agency_group_blocked_while_subagencies_exist() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_hierarchy(&store).await;
    let blocked = store.delete_agency_group(&AgencyGroupId::new("g-dod")).await;
    assert!(matches!(blocked, Err(StoreError::Conflict(_))));

    store
        .insert_agency_group(&AgencyGroup {
            id: AgencyGroupId::new("g-empty"),
            name: "Empty".to_string(),
            code: "EMPTY".to_string(),
        })
        .await
        .unwrap();
    store.delete_agency_group(&AgencyGroupId::new("g-empty")).await.unwrap();
    assert!(store.find_agency_group(&AgencyGroupId::new("g-empty")).await.unwrap().is_none());
    let missing = store.delete_agency_group(&AgencyGroupId::new("g-empty")).await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

// ============================================================================
// SECTION: NDA Records
// ============================================================================

#[tokio::test]
async fn scope_filter_constrains_reads() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_hierarchy(&store).await;
    store.insert_nda(&nda("n-1", 1, "s-army", NdaStatus::Created)).await.unwrap();
    store.insert_nda(&nda("n-2", 2, "s-navy", NdaStatus::Emailed)).await.unwrap();
    store.insert_nda(&nda("n-3", 3, "s-army", NdaStatus::Emailed)).await.unwrap();

    let army = only(&["s-army"]);
    let visible = store.find_ndas(&army, &NdaQuery::default()).await.unwrap();
    let ids: Vec<&str> = visible.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["n-1", "n-3"]);

    assert!(store.find_nda(&NdaId::new("n-2"), &army).await.unwrap().is_none());
    let found = store.find_nda(&NdaId::new("n-2"), &ScopeFilter::Unrestricted).await.unwrap();
    assert!(found.is_some());

    let nothing = ScopeFilter::deny_all();
    assert!(store.find_ndas(&nothing, &NdaQuery::default()).await.unwrap().is_empty());
    assert_eq!(store.count_ndas(&nothing, &NdaQuery::default()).await.unwrap(), 0);
    assert!(store.find_nda(&NdaId::new("n-1"), &nothing).await.unwrap().is_none());

    let emailed = NdaQuery {
        status: Some(NdaStatus::Emailed),
        limit: Some(1),
    };
    assert_eq!(store.find_ndas(&ScopeFilter::Unrestricted, &emailed).await.unwrap().len(), 1);
    assert_eq!(store.count_ndas(&ScopeFilter::Unrestricted, &emailed).await.unwrap(), 2);
}

#[tokio::test]
async fn status_change_is_compare_and_set_with_history() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_hierarchy(&store).await;
    store.insert_nda(&nda("n-1", 1, "s-army", NdaStatus::InRevision)).await.unwrap();

    let change = StatusChange {
        nda_id: NdaId::new("n-1"),
        expected_status: NdaStatus::InRevision,
        new_status: NdaStatus::FullyExecuted,
        changed_by: Some(ContactId::new("c-1")),
        changed_at: ts(50),
        fully_executed_at: Some(ts(50)),
    };
    let entry = store.commit_status_change(&change).await.unwrap();
    assert_eq!(entry.status, NdaStatus::FullyExecuted);

    let record =
        store.find_nda(&NdaId::new("n-1"), &ScopeFilter::Unrestricted).await.unwrap().unwrap();
    assert_eq!(record.status, NdaStatus::FullyExecuted);
    assert_eq!(record.fully_executed_at, Some(ts(50)));

    let stale = store.commit_status_change(&change).await;
    assert!(matches!(stale, Err(StoreError::Conflict(_))));
    let history = store.status_history(&NdaId::new("n-1")).await.unwrap();
    assert_eq!(history.len(), 1);

    let missing = StatusChange {
        nda_id: NdaId::new("n-404"),
        ..change
    };
    assert!(matches!(store.commit_status_change(&missing).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn unknown_status_label_fails_closed() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_hierarchy(&store).await;
    store.insert_nda(&nda("n-1", 1, "s-army", NdaStatus::Created)).await.unwrap();
    let conn = Connection::open(store_path(&temp)).unwrap();
    conn.execute("UPDATE ndas SET status = 'ARCHIVED' WHERE id = 'n-1'", params![]).unwrap();
    drop(conn);
    let result = store.find_nda(&NdaId::new("n-1"), &ScopeFilter::Unrestricted).await;
    assert!(matches!(result, Err(StoreError::Corrupt(_))));
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

#[tokio::test]
async fn audit_queries_filter_and_order_newest_first() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let records = [
        audit("a-1", AuditAction::LoginFailed, 100, "10.0.0.1", "x@example.gov"),
        audit("a-2", AuditAction::MfaFailed, 200, "10.0.0.1", "y@example.gov"),
        audit("a-3", AuditAction::LoginSuccess, 300, "10.0.0.1", "x@example.gov"),
        audit("a-4", AuditAction::LoginFailed, 400, "10.0.0.2", "x@example.gov"),
    ];
    for record in &records {
        store.append_audit(record).await.unwrap();
    }

    let failures = AuditQuery::for_actions(&AuditAction::LOGIN_FAILURES);
    assert_eq!(store.count_audit(&failures).await.unwrap(), 3);

    let by_ip = AuditQuery {
        ip_address: Some("10.0.0.1".to_string()),
        since: Some(ts(150)),
        ..failures.clone()
    };
    assert_eq!(store.count_audit(&by_ip).await.unwrap(), 1);

    let by_email = AuditQuery {
        detail_email: Some("x@example.gov".to_string()),
        ..failures.clone()
    };
    assert_eq!(store.count_audit(&by_email).await.unwrap(), 2);

    let recent = AuditQuery {
        limit: Some(2),
        ..failures
    };
    let listed = store.list_audit(&recent).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["a-4", "a-2"]);
    assert_eq!(listed[0], records[3]);
}

#[tokio::test]
async fn oversized_audit_details_are_rejected() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let record = AuditRecord {
        id: AuditEntryId::new("big"),
        created_at: ts(1),
        entry: AuditEntry::new(AuditAction::AccessExport, "report")
            .with_details(json!({ "blob": "x".repeat(MAX_AUDIT_DETAILS_BYTES) })),
    };
    let result = store.append_audit(&record).await;
    assert!(matches!(result, Err(StoreError::Invalid(_))));
    assert_eq!(store.count_audit(&AuditQuery::default()).await.unwrap(), 0);
}
