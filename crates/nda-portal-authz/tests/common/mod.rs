// crates/nda-portal-authz/tests/common/mod.rs
// ============================================================================
// Module: Authz Test Fixtures
// Description: Seeded portal, instrumented store, and manual clock.
// Purpose: Share one realistic directory and agency layout across suites.
// ============================================================================

//! ## Overview
//! The fixture seeds the system roles, three agency groups, a handful of
//! contacts with different grant shapes, and three NDAs. The store wrapper
//! counts directory and grant lookups and can be told to fail selected
//! operations so fail-closed paths can be exercised. It can also yield after
//! a profile read so a concurrent mutation runs in between.
//!
//! | Contact   | Role       | Grants                      |
//! |-----------|------------|-----------------------------|
//! | admin     | Admin      | none                        |
//! | direct    | NDA User   | subagency `sa-army`         |
//! | group     | NDA User   | group `g-dod`               |
//! | none      | NDA User   | none                        |
//! | reader    | Read-Only  | subagency `sa-nasa`         |
//! | hollow    | NDA User   | group `g-empty` (no subs)   |
//! | inactive  | NDA User   | subagency `sa-army`, inactive |

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Shared test helpers; not every suite uses every helper."
)]

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use nda_portal_authz::CacheGeneration;
use nda_portal_authz::InMemoryUserContextCache;
use nda_portal_authz::NoopAuditMirror;
use nda_portal_authz::PortalRuntime;
use nda_portal_authz::RequestMeta;
use nda_portal_authz::RuntimeServices;
use nda_portal_authz::StaticTokenVerifier;
use nda_portal_authz::UserContextCache;
use nda_portal_config::PortalConfig;
use nda_portal_core::AgencyGrant;
use nda_portal_core::AgencyGroup;
use nda_portal_core::AgencyGroupId;
use nda_portal_core::AgencyStore;
use nda_portal_core::AuditAction;
use nda_portal_core::AuditQuery;
use nda_portal_core::AuditRecord;
use nda_portal_core::AuditStore;
use nda_portal_core::Clock;
use nda_portal_core::ContactId;
use nda_portal_core::ContactProfile;
use nda_portal_core::ContactRecord;
use nda_portal_core::DirectoryStore;
use nda_portal_core::GrantEdges;
use nda_portal_core::GrantTarget;
use nda_portal_core::Identity;
use nda_portal_core::InMemoryPortalStore;
use nda_portal_core::NdaId;
use nda_portal_core::NdaQuery;
use nda_portal_core::NdaRecord;
use nda_portal_core::NdaStatus;
use nda_portal_core::NdaStore;
use nda_portal_core::NewContact;
use nda_portal_core::RoleAssignment;
use nda_portal_core::RoleRecord;
use nda_portal_core::ScopeFilter;
use nda_portal_core::StatusChange;
use nda_portal_core::StatusHistoryEntry;
use nda_portal_core::StoreError;
use nda_portal_core::Subagency;
use nda_portal_core::SubagencyAccessEntry;
use nda_portal_core::SubagencyId;
use nda_portal_core::SubjectId;
use nda_portal_core::Timestamp;
use nda_portal_core::UserContext;
use nda_portal_core::system_roles;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Start of the fixture clock (2023-11-14T22:13:20Z).
pub const FIXTURE_EPOCH_MS: i64 = 1_700_000_000_000;

/// Clock advanced by hand.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub const fn new() -> Self {
        Self {
            now_ms: AtomicI64::new(FIXTURE_EPOCH_MS),
        }
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.now_ms.fetch_add(minutes * 60_000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Instrumented Store
// ============================================================================

/// In-memory store that counts lookups and injects failures.
#[derive(Debug, Default)]
pub struct InstrumentedStore {
    pub inner: InMemoryPortalStore,
    pub subject_lookups: AtomicUsize,
    pub grant_edge_lookups: AtomicUsize,
    pub fail_subject_lookup: AtomicBool,
    pub fail_grant_edges: AtomicBool,
    pub fail_audit: AtomicBool,
    pub fail_unscoped_find: AtomicBool,
    pub race_status_commit: AtomicBool,
    pub yield_after_subject_lookup: AtomicBool,
    pub yield_after_contact_lookup: AtomicBool,
}

impl InstrumentedStore {
    pub fn subject_lookups(&self) -> usize {
        self.subject_lookups.load(Ordering::SeqCst)
    }

    pub fn grant_edge_lookups(&self) -> usize {
        self.grant_edge_lookups.load(Ordering::SeqCst)
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }
}

fn injected() -> StoreError {
    StoreError::Io("injected failure".to_string())
}

#[async_trait]
impl DirectoryStore for InstrumentedStore {
    async fn find_profile_by_subject(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Option<ContactProfile>, StoreError> {
        self.subject_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_subject_lookup.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let profile = self.inner.find_profile_by_subject(subject_id).await;
        if self.yield_after_subject_lookup.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        profile
    }

    async fn find_profile_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<ContactProfile>, StoreError> {
        let profile = self.inner.find_profile_by_contact(contact_id).await;
        if self.yield_after_contact_lookup.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        profile
    }

    async fn find_role(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        self.inner.find_role(name).await
    }

    async fn create_contact(
        &self,
        contact: NewContact,
        created_at: Timestamp,
    ) -> Result<ContactProfile, StoreError> {
        self.inner.create_contact(contact, created_at).await
    }

    async fn assign_role(&self, assignment: &RoleAssignment) -> Result<(), StoreError> {
        self.inner.assign_role(assignment).await
    }

    async fn remove_role(&self, contact_id: &ContactId, role_name: &str) -> Result<(), StoreError> {
        self.inner.remove_role(contact_id, role_name).await
    }

    async fn set_contact_active(
        &self,
        contact_id: &ContactId,
        active: bool,
    ) -> Result<(), StoreError> {
        self.inner.set_contact_active(contact_id, active).await
    }
}

#[async_trait]
impl AgencyStore for InstrumentedStore {
    async fn grant_edges(&self, contact_id: &ContactId) -> Result<GrantEdges, StoreError> {
        self.grant_edge_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_grant_edges.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.grant_edges(contact_id).await
    }

    async fn find_agency_group(
        &self,
        group_id: &AgencyGroupId,
    ) -> Result<Option<AgencyGroup>, StoreError> {
        self.inner.find_agency_group(group_id).await
    }

    async fn find_subagency(
        &self,
        subagency_id: &SubagencyId,
    ) -> Result<Option<Subagency>, StoreError> {
        self.inner.find_subagency(subagency_id).await
    }

    async fn subagencies_in_group(
        &self,
        group_id: &AgencyGroupId,
    ) -> Result<Vec<Subagency>, StoreError> {
        self.inner.subagencies_in_group(group_id).await
    }

    async fn insert_agency_group(&self, group: &AgencyGroup) -> Result<(), StoreError> {
        self.inner.insert_agency_group(group).await
    }

    async fn insert_subagency(&self, subagency: &Subagency) -> Result<(), StoreError> {
        self.inner.insert_subagency(subagency).await
    }

    async fn delete_agency_group(&self, group_id: &AgencyGroupId) -> Result<(), StoreError> {
        self.inner.delete_agency_group(group_id).await
    }

    async fn insert_grant(&self, grant: &AgencyGrant) -> Result<(), StoreError> {
        self.inner.insert_grant(grant).await
    }

    async fn delete_grant(
        &self,
        contact_id: &ContactId,
        target: &GrantTarget,
    ) -> Result<(), StoreError> {
        self.inner.delete_grant(contact_id, target).await
    }

    async fn subagency_access(
        &self,
        subagency_id: &SubagencyId,
    ) -> Result<Vec<SubagencyAccessEntry>, StoreError> {
        self.inner.subagency_access(subagency_id).await
    }
}

#[async_trait]
impl NdaStore for InstrumentedStore {
    async fn find_nda(
        &self,
        nda_id: &NdaId,
        scope: &ScopeFilter,
    ) -> Result<Option<NdaRecord>, StoreError> {
        if *scope == ScopeFilter::Unrestricted && self.fail_unscoped_find.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.find_nda(nda_id, scope).await
    }

    async fn find_ndas(
        &self,
        scope: &ScopeFilter,
        query: &NdaQuery,
    ) -> Result<Vec<NdaRecord>, StoreError> {
        self.inner.find_ndas(scope, query).await
    }

    async fn count_ndas(&self, scope: &ScopeFilter, query: &NdaQuery) -> Result<u64, StoreError> {
        self.inner.count_ndas(scope, query).await
    }

    async fn insert_nda(&self, record: &NdaRecord) -> Result<(), StoreError> {
        self.inner.insert_nda(record).await
    }

    async fn commit_status_change(
        &self,
        change: &StatusChange,
    ) -> Result<StatusHistoryEntry, StoreError> {
        if self.race_status_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Conflict(format!("nda {} changed concurrently", change.nda_id)));
        }
        self.inner.commit_status_change(change).await
    }

    async fn status_history(&self, nda_id: &NdaId) -> Result<Vec<StatusHistoryEntry>, StoreError> {
        self.inner.status_history(nda_id).await
    }
}

#[async_trait]
impl AuditStore for InstrumentedStore {
    async fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.append_audit(record).await
    }

    async fn count_audit(&self, query: &AuditQuery) -> Result<u64, StoreError> {
        self.inner.count_audit(query).await
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        self.inner.list_audit(query).await
    }
}

// ============================================================================
// SECTION: Counting Cache
// ============================================================================

/// Context cache that records invalidations per subject.
#[derive(Debug, Default)]
pub struct CountingCache {
    inner: InMemoryUserContextCache,
    invalidations: Mutex<BTreeMap<SubjectId, usize>>,
}

impl CountingCache {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.get(&subject_id(name)).is_some()
    }

    /// Returns how often the named user's context was invalidated.
    pub fn invalidations(&self, name: &str) -> usize {
        self.invalidations.lock().unwrap().get(&subject_id(name)).copied().unwrap_or(0)
    }
}

impl UserContextCache for CountingCache {
    fn get(&self, subject_id: &SubjectId) -> Option<UserContext> {
        self.inner.get(subject_id)
    }

    fn generation(&self, subject_id: &SubjectId) -> CacheGeneration {
        self.inner.generation(subject_id)
    }

    fn set_if_generation(
        &self,
        subject_id: SubjectId,
        generation: CacheGeneration,
        context: UserContext,
    ) -> bool {
        self.inner.set_if_generation(subject_id, generation, context)
    }

    fn invalidate(&self, subject_id: &SubjectId) {
        *self.invalidations.lock().unwrap().entry(subject_id.clone()).or_default() += 1;
        self.inner.invalidate(subject_id);
    }

    fn clear(&self) {
        self.inner.clear();
    }
}

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// Contacts seeded by the fixture: name, role, active.
const CONTACTS: [(&str, &str, bool); 7] = [
    ("admin", "Admin", true),
    ("direct", "NDA User", true),
    ("group", "NDA User", true),
    ("none", "NDA User", true),
    ("reader", "Read-Only", true),
    ("hollow", "NDA User", true),
    ("inactive", "NDA User", false),
];

/// Identities with a token but no contact yet.
pub const NEWCOMERS: [&str; 2] = ["newcomer", "latecomer"];

pub fn contact_id(name: &str) -> ContactId {
    ContactId::new(format!("c-{name}"))
}

pub fn subject_id(name: &str) -> SubjectId {
    SubjectId::new(format!("sub-{name}"))
}

pub fn subagency(id: &str) -> SubagencyId {
    SubagencyId::new(id)
}

pub fn nda(id: &str) -> NdaId {
    NdaId::new(id)
}

/// Builds a request carrying the named user's bearer token.
pub fn request(method: &str, path: &str, name: &str) -> RequestMeta {
    RequestMeta::new(method, path)
        .with_bearer(&format!("tok-{name}"))
        .with_peer_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)))
        .with_user_agent("fixture-agent/1.0")
}

pub struct Fixture {
    pub store: Arc<InstrumentedStore>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<CountingCache>,
    pub runtime: PortalRuntime,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(PortalConfig::default()).await
    }

    pub async fn with_config(config: PortalConfig) -> Self {
        let store = Arc::new(InstrumentedStore::default());
        seed(&store).await;
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(CountingCache::default());
        let names = CONTACTS.iter().map(|(name, _, _)| *name).chain(NEWCOMERS);
        let verifier = StaticTokenVerifier::new(names.map(|name| {
            (
                format!("tok-{name}"),
                Identity {
                    subject_id: subject_id(name),
                    email: format!("{name}@example.gov"),
                },
            )
        }));
        let services = RuntimeServices {
            verifier: Arc::new(verifier),
            cache: cache.clone(),
            clock: clock.clone(),
            mirror: Arc::new(NoopAuditMirror),
        };
        let runtime = PortalRuntime::assemble(store.clone(), &config, services);
        Self {
            store,
            clock,
            cache,
            runtime,
        }
    }

    /// Loads the named user's context through the loader.
    pub async fn user(&self, name: &str) -> UserContext {
        self.runtime
            .contexts()
            .load_user_context(&subject_id(name))
            .await
            .expect("context load")
            .expect("seeded contact")
    }

    /// Lists audit records for an action, newest first.
    pub async fn audit(&self, action: AuditAction) -> Vec<AuditRecord> {
        self.store.list_audit(&AuditQuery::for_actions(&[action])).await.expect("audit list")
    }

    /// Counts every audit record.
    pub async fn audit_total(&self) -> u64 {
        self.store.count_audit(&AuditQuery::default()).await.expect("audit count")
    }

    pub async fn nda_status(&self, id: &str) -> NdaStatus {
        self.store
            .find_nda(&nda(id), &ScopeFilter::Unrestricted)
            .await
            .expect("nda lookup")
            .expect("seeded nda")
            .status
    }
}

async fn seed(store: &InstrumentedStore) {
    let inner = &store.inner;
    for role in system_roles() {
        inner.insert_role(role).unwrap();
    }
    let groups = [
        ("g-dod", "Department of Defense", "DoD"),
        ("g-empty", "Empty Group", "EMP"),
        ("g-civ", "Civilian Agencies", "CIV"),
    ];
    for (id, name, code) in groups {
        inner
            .insert_agency_group(&AgencyGroup {
                id: AgencyGroupId::new(id),
                name: name.to_string(),
                code: code.to_string(),
            })
            .await
            .unwrap();
    }
    let subagencies =
        [("sa-army", "g-dod", "Army"), ("sa-navy", "g-dod", "Navy"), ("sa-nasa", "g-civ", "NASA")];
    for (id, group, name) in subagencies {
        inner
            .insert_subagency(&Subagency {
                id: SubagencyId::new(id),
                agency_group_id: AgencyGroupId::new(group),
                name: name.to_string(),
                code: name.to_uppercase(),
            })
            .await
            .unwrap();
    }
    let seeded_at = Timestamp::from_unix_millis(FIXTURE_EPOCH_MS - 86_400_000);
    for (name, role, active) in CONTACTS {
        let email = format!("{name}@example.gov");
        let mut contact = ContactRecord::linked(contact_id(name), subject_id(name), email);
        contact.active = active;
        inner.insert_contact(contact, &[role], seeded_at).unwrap();
    }
    let grants = [
        ("direct", GrantTarget::Subagency(SubagencyId::new("sa-army"))),
        ("group", GrantTarget::AgencyGroup(AgencyGroupId::new("g-dod"))),
        ("reader", GrantTarget::Subagency(SubagencyId::new("sa-nasa"))),
        ("hollow", GrantTarget::AgencyGroup(AgencyGroupId::new("g-empty"))),
        ("inactive", GrantTarget::Subagency(SubagencyId::new("sa-army"))),
    ];
    for (name, target) in grants {
        inner
            .insert_grant(&AgencyGrant {
                contact_id: contact_id(name),
                target,
                granted_by: Some(contact_id("admin")),
                granted_at: seeded_at,
            })
            .await
            .unwrap();
    }
    let ndas = [
        ("nda-army", 1, "sa-army", NdaStatus::Created),
        ("nda-navy", 2, "sa-navy", NdaStatus::Emailed),
        ("nda-nasa", 3, "sa-nasa", NdaStatus::InRevision),
    ];
    for (id, display_id, subagency_id, status) in ndas {
        inner
            .insert_nda(&NdaRecord {
                id: NdaId::new(id),
                display_id,
                subagency_id: SubagencyId::new(subagency_id),
                company_name: format!("Vendor {display_id}"),
                status,
                fully_executed_at: None,
                created_by: Some(contact_id("admin")),
                created_at: seeded_at,
            })
            .await
            .unwrap();
    }
}
