// crates/nda-portal-core/src/runtime/store.rs
// ============================================================================
// Module: NDA Portal In-Memory Store
// Description: Simple in-memory portal store for tests and examples.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of every portal store
//! interface. All state lives behind a single mutex so multi-row writes (a
//! status update plus its history entry) are atomic. It is not intended for
//! production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;

use crate::core::AccessSource;
use crate::core::AgencyGrant;
use crate::core::AgencyGroup;
use crate::core::AgencyGroupId;
use crate::core::AuditQuery;
use crate::core::AuditRecord;
use crate::core::ContactId;
use crate::core::ContactProfile;
use crate::core::ContactRecord;
use crate::core::GrantEdges;
use crate::core::GrantTarget;
use crate::core::GroupMembership;
use crate::core::NdaId;
use crate::core::NdaQuery;
use crate::core::NdaRecord;
use crate::core::NdaStatus;
use crate::core::NewContact;
use crate::core::RoleAssignment;
use crate::core::RoleRecord;
use crate::core::ScopeFilter;
use crate::core::StatusChange;
use crate::core::StatusHistoryEntry;
use crate::core::Subagency;
use crate::core::SubagencyAccessEntry;
use crate::core::SubagencyId;
use crate::core::SubjectId;
use crate::core::Timestamp;
use crate::interfaces::AgencyStore;
use crate::interfaces::AuditStore;
use crate::interfaces::DirectoryStore;
use crate::interfaces::NdaStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: State
// ============================================================================

/// Portal tables held in memory.
#[derive(Debug, Default)]
struct PortalState {
    /// Role definitions keyed by name.
    roles: BTreeMap<String, RoleRecord>,
    /// Contacts keyed by id.
    contacts: BTreeMap<ContactId, ContactRecord>,
    /// Role assignments in assignment order.
    role_assignments: Vec<RoleAssignment>,
    /// Agency groups keyed by id.
    agency_groups: BTreeMap<AgencyGroupId, AgencyGroup>,
    /// Subagencies keyed by id.
    subagencies: BTreeMap<SubagencyId, Subagency>,
    /// Access grants in grant order.
    grants: Vec<AgencyGrant>,
    /// NDA records keyed by id.
    ndas: BTreeMap<NdaId, NdaRecord>,
    /// Status history in append order.
    history: Vec<StatusHistoryEntry>,
    /// Audit log in append order.
    audit: Vec<AuditRecord>,
}

impl PortalState {
    /// Assembles the profile for a contact.
    fn profile(&self, contact: &ContactRecord) -> ContactProfile {
        let roles = self
            .role_assignments
            .iter()
            .filter(|assignment| assignment.contact_id == contact.contact_id)
            .filter_map(|assignment| self.roles.get(&assignment.role_name).cloned())
            .collect();
        let mut agency_group_grants = BTreeSet::new();
        let mut subagency_grants = BTreeSet::new();
        for grant in self.grants.iter().filter(|grant| grant.contact_id == contact.contact_id) {
            match &grant.target {
                GrantTarget::AgencyGroup(id) => {
                    agency_group_grants.insert(id.clone());
                }
                GrantTarget::Subagency(id) => {
                    subagency_grants.insert(id.clone());
                }
            }
        }
        ContactProfile {
            contact_id: contact.contact_id.clone(),
            subject_id: contact.subject_id.clone(),
            email: contact.email.clone(),
            name: contact.name.clone(),
            active: contact.active,
            roles,
            agency_group_grants,
            subagency_grants,
        }
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory portal store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPortalStore {
    /// Portal tables protected by a mutex.
    state: Arc<Mutex<PortalState>>,
}

impl InMemoryPortalStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the portal tables.
    fn lock(&self) -> Result<MutexGuard<'_, PortalState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("portal store mutex poisoned".to_string()))
    }

    /// Inserts or replaces a role definition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store lock is poisoned.
    pub fn insert_role(&self, role: RoleRecord) -> Result<(), StoreError> {
        self.lock()?.roles.insert(role.name.clone(), role);
        Ok(())
    }

    /// Inserts a contact holding the listed roles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the contact or subject exists and
    /// [`StoreError::NotFound`] when a role is undefined.
    pub fn insert_contact(
        &self,
        contact: ContactRecord,
        roles: &[&str],
        granted_at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(missing) = roles.iter().find(|role| !state.roles.contains_key(**role)) {
            return Err(StoreError::NotFound(format!("role {missing}")));
        }
        let contact_id = contact.contact_id.clone();
        insert_contact_row(&mut state, contact)?;
        for role in roles {
            state.role_assignments.push(RoleAssignment {
                contact_id: contact_id.clone(),
                role_name: (*role).to_string(),
                granted_by: None,
                granted_at,
            });
        }
        drop(state);
        Ok(())
    }
}

/// Inserts a contact row, rejecting duplicate ids and linked subjects.
fn insert_contact_row(state: &mut PortalState, contact: ContactRecord) -> Result<(), StoreError> {
    if state.contacts.contains_key(&contact.contact_id) {
        return Err(StoreError::Conflict(format!("contact {}", contact.contact_id)));
    }
    if let Some(subject) = &contact.subject_id
        && state.contacts.values().any(|row| row.subject_id.as_ref() == Some(subject))
    {
        return Err(StoreError::Conflict(format!("subject {subject}")));
    }
    state.contacts.insert(contact.contact_id.clone(), contact);
    Ok(())
}

// ============================================================================
// SECTION: Directory
// ============================================================================

#[async_trait]
impl DirectoryStore for InMemoryPortalStore {
    async fn find_profile_by_subject(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Option<ContactProfile>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .contacts
            .values()
            .find(|contact| contact.subject_id.as_ref() == Some(subject_id))
            .map(|contact| state.profile(contact)))
    }

    async fn find_profile_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<ContactProfile>, StoreError> {
        let state = self.lock()?;
        Ok(state.contacts.get(contact_id).map(|contact| state.profile(contact)))
    }

    async fn find_role(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        Ok(self.lock()?.roles.get(name).cloned())
    }

    async fn create_contact(
        &self,
        contact: NewContact,
        created_at: Timestamp,
    ) -> Result<ContactProfile, StoreError> {
        let mut state = self.lock()?;
        if !state.roles.contains_key(&contact.role_name) {
            return Err(StoreError::NotFound(format!("role {}", contact.role_name)));
        }
        let row = ContactRecord {
            contact_id: contact.contact_id.clone(),
            subject_id: Some(contact.subject_id),
            email: contact.email,
            name: None,
            active: true,
        };
        insert_contact_row(&mut state, row.clone())?;
        state.role_assignments.push(RoleAssignment {
            contact_id: contact.contact_id,
            role_name: contact.role_name,
            granted_by: None,
            granted_at: created_at,
        });
        Ok(state.profile(&row))
    }

    async fn assign_role(&self, assignment: &RoleAssignment) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.contacts.contains_key(&assignment.contact_id) {
            return Err(StoreError::NotFound(format!("contact {}", assignment.contact_id)));
        }
        if !state.roles.contains_key(&assignment.role_name) {
            return Err(StoreError::NotFound(format!("role {}", assignment.role_name)));
        }
        if state.role_assignments.iter().any(|held| {
            held.contact_id == assignment.contact_id && held.role_name == assignment.role_name
        }) {
            return Err(StoreError::Conflict(format!(
                "role {} already assigned to {}",
                assignment.role_name, assignment.contact_id
            )));
        }
        state.role_assignments.push(assignment.clone());
        drop(state);
        Ok(())
    }

    async fn remove_role(
        &self,
        contact_id: &ContactId,
        role_name: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let held =
            state.role_assignments.iter().filter(|held| held.contact_id == *contact_id).count();
        let Some(position) = state
            .role_assignments
            .iter()
            .position(|held| held.contact_id == *contact_id && held.role_name == role_name)
        else {
            return Err(StoreError::NotFound(format!(
                "role {role_name} not assigned to {contact_id}"
            )));
        };
        if held <= 1 {
            return Err(StoreError::Conflict(format!(
                "role {role_name} is the only role of {contact_id}"
            )));
        }
        state.role_assignments.remove(position);
        drop(state);
        Ok(())
    }

    async fn set_contact_active(
        &self,
        contact_id: &ContactId,
        active: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let contact = state
            .contacts
            .get_mut(contact_id)
            .ok_or_else(|| StoreError::NotFound(format!("contact {contact_id}")))?;
        contact.active = active;
        drop(state);
        Ok(())
    }
}

// ============================================================================
// SECTION: Agencies
// ============================================================================

#[async_trait]
impl AgencyStore for InMemoryPortalStore {
    async fn grant_edges(&self, contact_id: &ContactId) -> Result<GrantEdges, StoreError> {
        let state = self.lock()?;
        let mut edges = GrantEdges::default();
        for grant in state.grants.iter().filter(|grant| grant.contact_id == *contact_id) {
            match &grant.target {
                GrantTarget::Subagency(id) => {
                    edges.direct_subagencies.insert(id.clone());
                }
                GrantTarget::AgencyGroup(group_id) => {
                    let subagencies = state
                        .subagencies
                        .values()
                        .filter(|sub| sub.agency_group_id == *group_id)
                        .map(|sub| sub.id.clone())
                        .collect();
                    edges.groups.push(GroupMembership {
                        agency_group_id: group_id.clone(),
                        subagencies,
                    });
                }
            }
        }
        Ok(edges)
    }

    async fn find_agency_group(
        &self,
        group_id: &AgencyGroupId,
    ) -> Result<Option<AgencyGroup>, StoreError> {
        Ok(self.lock()?.agency_groups.get(group_id).cloned())
    }

    async fn find_subagency(
        &self,
        subagency_id: &SubagencyId,
    ) -> Result<Option<Subagency>, StoreError> {
        Ok(self.lock()?.subagencies.get(subagency_id).cloned())
    }

    async fn subagencies_in_group(
        &self,
        group_id: &AgencyGroupId,
    ) -> Result<Vec<Subagency>, StoreError> {
        Ok(self
            .lock()?
            .subagencies
            .values()
            .filter(|sub| sub.agency_group_id == *group_id)
            .cloned()
            .collect())
    }

    async fn insert_agency_group(&self, group: &AgencyGroup) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.agency_groups.contains_key(&group.id)
            || state.agency_groups.values().any(|existing| existing.code == group.code)
        {
            return Err(StoreError::Conflict(format!("agency group {}", group.code)));
        }
        state.agency_groups.insert(group.id.clone(), group.clone());
        drop(state);
        Ok(())
    }

    async fn insert_subagency(&self, subagency: &Subagency) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.agency_groups.contains_key(&subagency.agency_group_id) {
            return Err(StoreError::NotFound(format!(
                "agency group {}",
                subagency.agency_group_id
            )));
        }
        if state.subagencies.contains_key(&subagency.id) {
            return Err(StoreError::Conflict(format!("subagency {}", subagency.id)));
        }
        state.subagencies.insert(subagency.id.clone(), subagency.clone());
        drop(state);
        Ok(())
    }

    async fn delete_agency_group(&self, group_id: &AgencyGroupId) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.agency_groups.contains_key(group_id) {
            return Err(StoreError::NotFound(format!("agency group {group_id}")));
        }
        if state.subagencies.values().any(|sub| sub.agency_group_id == *group_id) {
            return Err(StoreError::Conflict(format!("agency group {group_id} has subagencies")));
        }
        state.agency_groups.remove(group_id);
        state.grants.retain(|grant| grant.target != GrantTarget::AgencyGroup(group_id.clone()));
        drop(state);
        Ok(())
    }

    async fn insert_grant(&self, grant: &AgencyGrant) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.contacts.contains_key(&grant.contact_id) {
            return Err(StoreError::NotFound(format!("contact {}", grant.contact_id)));
        }
        let target_exists = match &grant.target {
            GrantTarget::AgencyGroup(id) => state.agency_groups.contains_key(id),
            GrantTarget::Subagency(id) => state.subagencies.contains_key(id),
        };
        if !target_exists {
            return Err(StoreError::NotFound("grant target".to_string()));
        }
        let duplicate = state
            .grants
            .iter()
            .any(|held| held.contact_id == grant.contact_id && held.target == grant.target);
        if duplicate {
            return Err(StoreError::Conflict("grant already exists".to_string()));
        }
        state.grants.push(grant.clone());
        drop(state);
        Ok(())
    }

    async fn delete_grant(
        &self,
        contact_id: &ContactId,
        target: &GrantTarget,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let before = state.grants.len();
        state.grants.retain(|grant| !(grant.contact_id == *contact_id && grant.target == *target));
        if state.grants.len() == before {
            return Err(StoreError::NotFound("grant".to_string()));
        }
        drop(state);
        Ok(())
    }

    async fn subagency_access(
        &self,
        subagency_id: &SubagencyId,
    ) -> Result<Vec<SubagencyAccessEntry>, StoreError> {
        let state = self.lock()?;
        let Some(subagency) = state.subagencies.get(subagency_id) else {
            return Err(StoreError::NotFound(format!("subagency {subagency_id}")));
        };
        let direct_target = GrantTarget::Subagency(subagency_id.clone());
        let group_target = GrantTarget::AgencyGroup(subagency.agency_group_id.clone());
        let mut entries: BTreeMap<ContactId, SubagencyAccessEntry> = BTreeMap::new();
        for grant in &state.grants {
            let source = if grant.target == direct_target {
                AccessSource::Direct
            } else if grant.target == group_target {
                AccessSource::Inherited {
                    agency_group_id: subagency.agency_group_id.clone(),
                }
            } else {
                continue;
            };
            let Some(contact) = state.contacts.get(&grant.contact_id) else {
                continue;
            };
            let entry = SubagencyAccessEntry {
                contact_id: contact.contact_id.clone(),
                email: contact.email.clone(),
                source,
            };
            match entries.get(&contact.contact_id) {
                Some(existing) if existing.source == AccessSource::Direct => {}
                _ => {
                    entries.insert(contact.contact_id.clone(), entry);
                }
            }
        }
        Ok(entries.into_values().collect())
    }
}

// ============================================================================
// SECTION: NDA Records
// ============================================================================

#[async_trait]
impl NdaStore for InMemoryPortalStore {
    async fn find_nda(
        &self,
        nda_id: &NdaId,
        scope: &ScopeFilter,
    ) -> Result<Option<NdaRecord>, StoreError> {
        Ok(self
            .lock()?
            .ndas
            .get(nda_id)
            .filter(|record| scope.permits(&record.subagency_id))
            .cloned())
    }

    async fn find_ndas(
        &self,
        scope: &ScopeFilter,
        query: &NdaQuery,
    ) -> Result<Vec<NdaRecord>, StoreError> {
        let state = self.lock()?;
        let matching = state
            .ndas
            .values()
            .filter(|record| scope.permits(&record.subagency_id) && query.matches(record))
            .cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn count_ndas(&self, scope: &ScopeFilter, query: &NdaQuery) -> Result<u64, StoreError> {
        let state = self.lock()?;
        let count = state
            .ndas
            .values()
            .filter(|record| scope.permits(&record.subagency_id) && query.matches(record))
            .count();
        u64::try_from(count).map_err(|_| StoreError::Invalid("count overflow".to_string()))
    }

    async fn insert_nda(&self, record: &NdaRecord) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.ndas.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("nda {}", record.id)));
        }
        state.ndas.insert(record.id.clone(), record.clone());
        drop(state);
        Ok(())
    }

    async fn commit_status_change(
        &self,
        change: &StatusChange,
    ) -> Result<StatusHistoryEntry, StoreError> {
        let mut state = self.lock()?;
        let record = state
            .ndas
            .get_mut(&change.nda_id)
            .ok_or_else(|| StoreError::NotFound(format!("nda {}", change.nda_id)))?;
        if record.status != change.expected_status {
            return Err(StoreError::Conflict(format!(
                "nda {} is {} not {}",
                change.nda_id, record.status, change.expected_status
            )));
        }
        record.status = change.new_status;
        if change.new_status == NdaStatus::FullyExecuted {
            record.fully_executed_at = change.fully_executed_at;
        }
        let entry = StatusHistoryEntry {
            nda_id: change.nda_id.clone(),
            status: change.new_status,
            changed_by: change.changed_by.clone(),
            changed_at: change.changed_at,
        };
        state.history.push(entry.clone());
        drop(state);
        Ok(entry)
    }

    async fn status_history(
        &self,
        nda_id: &NdaId,
    ) -> Result<Vec<StatusHistoryEntry>, StoreError> {
        Ok(self.lock()?.history.iter().filter(|entry| entry.nda_id == *nda_id).cloned().collect())
    }
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

#[async_trait]
impl AuditStore for InMemoryPortalStore {
    async fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.lock()?.audit.push(record.clone());
        Ok(())
    }

    async fn count_audit(&self, query: &AuditQuery) -> Result<u64, StoreError> {
        let count = self.lock()?.audit.iter().filter(|record| query.matches(record)).count();
        u64::try_from(count).map_err(|_| StoreError::Invalid("count overflow".to_string()))
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        let state = self.lock()?;
        let mut records: Vec<AuditRecord> =
            state.audit.iter().rev().filter(|record| query.matches(record)).cloned().collect();
        drop(state);
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}
