// crates/nda-portal-authz/src/context.rs
// ============================================================================
// Module: User Context Loader
// Description: Cached loading and first-login provisioning of user contexts.
// Purpose: Resolve an authenticated identity into its authorization context.
// Dependencies: nda-portal-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The loader reads contact profiles from the directory store and collapses
//! them into [`UserContext`] values. Contexts are cached by subject id behind
//! the [`UserContextCache`] seam; entries live until explicitly invalidated,
//! so every role or grant mutation must invalidate the affected subject. A
//! load stores its result only if the subject was not invalidated while the
//! directory read was in flight.
//! Identities with no contact are provisioned with the configured default
//! role and the provisioning is audited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use nda_portal_core::AuditAction;
use nda_portal_core::AuditEntry;
use nda_portal_core::Clock;
use nda_portal_core::ContactId;
use nda_portal_core::DirectoryStore;
use nda_portal_core::Identity;
use nda_portal_core::NewContact;
use nda_portal_core::StoreError;
use nda_portal_core::SubjectId;
use nda_portal_core::UserContext;
use serde_json::json;

use crate::audit::AuditLogger;
use crate::auth::ClientInfo;
use crate::error::AuthzError;

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Invalidation state of one subject, captured before a directory fetch.
///
/// Invalidating the subject or clearing the cache advances the generation, so
/// a fetch that started earlier can no longer be stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheGeneration {
    /// Bumped when the whole cache is cleared.
    epoch: u64,
    /// Bumped when the subject is invalidated.
    subject: u64,
}

impl CacheGeneration {
    /// Builds a generation from a cache-wide epoch and a per-subject counter.
    #[must_use]
    pub const fn new(epoch: u64, subject: u64) -> Self {
        Self {
            epoch,
            subject,
        }
    }
}

/// Cache of user contexts keyed by subject id.
pub trait UserContextCache: Send + Sync {
    /// Returns the cached context for a subject.
    fn get(&self, subject_id: &SubjectId) -> Option<UserContext>;
    /// Returns the subject's current generation.
    fn generation(&self, subject_id: &SubjectId) -> CacheGeneration;
    /// Stores a context fetched at `generation`.
    ///
    /// Returns false and stores nothing when the subject was invalidated, or
    /// the cache cleared, after `generation` was read.
    fn set_if_generation(
        &self,
        subject_id: SubjectId,
        generation: CacheGeneration,
        context: UserContext,
    ) -> bool;
    /// Drops the cached context for a subject and advances its generation.
    fn invalidate(&self, subject_id: &SubjectId);
    /// Drops every cached context and advances every generation.
    fn clear(&self);
}

/// Entries and generations, guarded together.
#[derive(Debug, Default)]
struct CacheState {
    /// Cached contexts.
    entries: HashMap<SubjectId, UserContext>,
    /// Per-subject invalidation counters.
    generations: HashMap<SubjectId, u64>,
    /// Clear counter.
    epoch: u64,
}

impl CacheState {
    /// Returns the subject's current generation.
    fn generation(&self, subject_id: &SubjectId) -> CacheGeneration {
        CacheGeneration::new(self.epoch, self.generations.get(subject_id).copied().unwrap_or(0))
    }
}

/// Process-local context cache.
#[derive(Debug, Default)]
pub struct InMemoryUserContextCache {
    /// Cache state.
    state: Mutex<CacheState>,
}

impl InMemoryUserContextCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of cached contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Locks the state. A poisoned map is still usable for eviction.
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UserContextCache for InMemoryUserContextCache {
    fn get(&self, subject_id: &SubjectId) -> Option<UserContext> {
        self.state().entries.get(subject_id).cloned()
    }

    fn generation(&self, subject_id: &SubjectId) -> CacheGeneration {
        self.state().generation(subject_id)
    }

    fn set_if_generation(
        &self,
        subject_id: SubjectId,
        generation: CacheGeneration,
        context: UserContext,
    ) -> bool {
        let mut state = self.state();
        if state.generation(&subject_id) != generation {
            return false;
        }
        state.entries.insert(subject_id, context);
        true
    }

    fn invalidate(&self, subject_id: &SubjectId) {
        let mut state = self.state();
        state.entries.remove(subject_id);
        let counter = state.generations.entry(subject_id.clone()).or_default();
        *counter = counter.wrapping_add(1);
    }

    fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.generations.clear();
        state.epoch = state.epoch.wrapping_add(1);
    }
}

// ============================================================================
// SECTION: Loader
// ============================================================================

/// Loads, caches, and provisions user contexts.
pub struct UserContextLoader {
    /// Directory store.
    directory: Arc<dyn DirectoryStore>,
    /// Context cache.
    cache: Arc<dyn UserContextCache>,
    /// Audit writer.
    audit: Arc<AuditLogger>,
    /// Clock stamping provisioned contacts.
    clock: Arc<dyn Clock>,
    /// Role granted on first login.
    default_role: String,
}

impl UserContextLoader {
    /// Creates a loader.
    #[must_use]
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        cache: Arc<dyn UserContextCache>,
        audit: Arc<AuditLogger>,
        clock: Arc<dyn Clock>,
        default_role: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            cache,
            audit,
            clock,
            default_role: default_role.into(),
        }
    }

    /// Returns the role granted on first login.
    #[must_use]
    pub fn default_role(&self) -> &str {
        &self.default_role
    }

    /// Loads the context for a subject, serving from cache when possible.
    ///
    /// Returns `None` when no contact is linked to the subject.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::ContextLoad`] when the directory lookup fails.
    pub async fn load_user_context(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Option<UserContext>, AuthzError> {
        if let Some(cached) = self.cache.get(subject_id) {
            return Ok(Some(cached));
        }
        let generation = self.cache.generation(subject_id);
        let profile =
            self.directory.find_profile_by_subject(subject_id).await.map_err(context_error)?;
        let Some(profile) = profile else {
            return Ok(None);
        };
        let context = UserContext::from_profile(subject_id.clone(), profile);
        self.store_in_cache(generation, &context);
        Ok(Some(context))
    }

    /// Loads a context by contact id, bypassing the cache.
    ///
    /// Returns `None` when the contact does not exist or has no linked
    /// subject.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::ContextLoad`] when the directory lookup fails.
    pub async fn load_user_context_by_contact_id(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<UserContext>, AuthzError> {
        let profile =
            self.directory.find_profile_by_contact(contact_id).await.map_err(context_error)?;
        Ok(profile.and_then(|profile| {
            let subject_id = profile.subject_id.clone()?;
            Some(UserContext::from_profile(subject_id, profile))
        }))
    }

    /// Provisions a contact for an identity seen for the first time.
    ///
    /// The contact receives the default role and the provisioning is audited.
    /// When a concurrent request provisioned the same subject first, the
    /// existing contact is returned instead.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::DefaultRoleMissing`] when the default role is not
    /// defined and [`AuthzError::ContextLoad`] when storage fails.
    pub async fn create_contact_for_first_login(
        &self,
        identity: &Identity,
        client: &ClientInfo,
    ) -> Result<UserContext, AuthzError> {
        let role = self.directory.find_role(&self.default_role).await.map_err(context_error)?;
        if role.is_none() {
            tracing::error!(
                target = "nda_portal::context",
                role = %self.default_role,
                "default role missing; cannot provision first-login contact"
            );
            return Err(AuthzError::DefaultRoleMissing(self.default_role.clone()));
        }
        let generation = self.cache.generation(&identity.subject_id);
        let new_contact = NewContact {
            contact_id: ContactId::generate(),
            subject_id: identity.subject_id.clone(),
            email: identity.email.clone(),
            role_name: self.default_role.clone(),
        };
        let profile = match self.directory.create_contact(new_contact, self.clock.now()).await {
            Ok(profile) => profile,
            Err(StoreError::Conflict(_)) => {
                return self.load_user_context(&identity.subject_id).await?.ok_or_else(|| {
                    AuthzError::ContextLoad("provisioning conflict without contact".to_string())
                });
            }
            Err(err) => return Err(context_error(err)),
        };
        let context = UserContext::from_profile(identity.subject_id.clone(), profile);
        self.store_in_cache(generation, &context);
        tracing::info!(
            target = "nda_portal::context",
            contact_id = %context.contact_id,
            role = %self.default_role,
            "provisioned contact on first login"
        );
        let entry = AuditEntry::new(AuditAction::UserAutoProvisioned, "contact")
            .with_entity_id(context.contact_id.as_str())
            .with_user(context.contact_id.clone())
            .with_client(client.ip_address.clone(), client.user_agent.clone())
            .with_details(json!({
                "subjectId": identity.subject_id.as_str(),
                "email": identity.email,
                "defaultRole": self.default_role,
            }));
        self.audit.log(entry).await;
        Ok(context)
    }

    /// Caches a fetched context unless the subject was invalidated meanwhile.
    fn store_in_cache(&self, generation: CacheGeneration, context: &UserContext) {
        let stored =
            self.cache.set_if_generation(context.subject_id.clone(), generation, context.clone());
        if !stored {
            tracing::debug!(
                target = "nda_portal::context",
                contact_id = %context.contact_id,
                "context invalidated during load; not caching"
            );
        }
    }

    /// Drops the cached context for a subject.
    pub fn invalidate_user_context(&self, subject_id: &SubjectId) {
        self.cache.invalidate(subject_id);
    }

    /// Drops every cached context.
    pub fn clear_all_user_context_cache(&self) {
        self.cache.clear();
    }
}

/// Maps a directory failure to a context-load error.
fn context_error(err: StoreError) -> AuthzError {
    AuthzError::ContextLoad(err.to_string())
}
