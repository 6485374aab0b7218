// crates/nda-portal-authz/src/runtime.rs
// ============================================================================
// Module: Portal Runtime
// Description: Wires stores, caches, and services from configuration.
// Purpose: Provide one composition root for the authorization engine.
// Dependencies: nda-portal-config, nda-portal-core, nda-portal-store-sqlite
// ============================================================================

//! ## Overview
//! [`PortalRuntime`] builds every authorization service over one portal store.
//! [`PortalRuntime::from_config`] selects the in-memory or `SQLite` backend,
//! seeds the system role catalog, and opens the configured audit mirror.
//! [`PortalRuntime::assemble`] accepts an existing store plus
//! [`RuntimeServices`] so tests can inject clocks, caches, and verifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use nda_portal_config::AuditMirrorType;
use nda_portal_config::PortalConfig;
use nda_portal_config::StoreType;
use nda_portal_core::AgencyStore;
use nda_portal_core::AuditStore;
use nda_portal_core::Clock;
use nda_portal_core::DirectoryStore;
use nda_portal_core::InMemoryPortalStore;
use nda_portal_core::NdaStore;
use nda_portal_core::PortalStore;
use nda_portal_core::SystemClock;
use nda_portal_core::system_roles;
use nda_portal_store_sqlite::SqlitePortalStore;
use thiserror::Error;

use crate::access_admin::AccessAdmin;
use crate::audit::AuditLogger;
use crate::audit::AuditMirror;
use crate::audit::FileAuditMirror;
use crate::audit::NoopAuditMirror;
use crate::audit::StderrAuditMirror;
use crate::auth::StaticTokenVerifier;
use crate::auth::TokenVerifier;
use crate::context::InMemoryUserContextCache;
use crate::context::UserContextCache;
use crate::context::UserContextLoader;
use crate::permission::PermissionEvaluator;
use crate::pipeline::AuthorizationPipeline;
use crate::scope::AgencyScopeResolver;
use crate::scoped_query::ScopedQuery;
use crate::security::MonitorSettings;
use crate::security::SecurityMonitor;
use crate::status::StatusTransitionEngine;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Runtime construction errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration is invalid.
    #[error("runtime config error: {0}")]
    Config(String),
    /// The store could not be opened or seeded.
    #[error("runtime store error: {0}")]
    Store(String),
    /// The audit mirror could not be opened.
    #[error("runtime audit error: {0}")]
    Audit(String),
}

// ============================================================================
// SECTION: Services
// ============================================================================

/// Replaceable collaborators of the runtime.
pub struct RuntimeServices {
    /// Bearer token verifier.
    pub verifier: Arc<dyn TokenVerifier>,
    /// User context cache.
    pub cache: Arc<dyn UserContextCache>,
    /// Clock.
    pub clock: Arc<dyn Clock>,
    /// Audit mirror.
    pub mirror: Arc<dyn AuditMirror>,
}

impl RuntimeServices {
    /// Builds the configured collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Audit`] when the audit mirror file cannot be
    /// opened.
    pub fn from_config(config: &PortalConfig) -> Result<Self, RuntimeError> {
        let mirror: Arc<dyn AuditMirror> = match config.audit.mirror {
            AuditMirrorType::None => Arc::new(NoopAuditMirror),
            AuditMirrorType::Stderr => Arc::new(StderrAuditMirror),
            AuditMirrorType::File => {
                let path = config.audit.path.as_deref().ok_or_else(|| {
                    RuntimeError::Config("file audit mirror requires path".to_string())
                })?;
                let mirror =
                    FileAuditMirror::new(path).map_err(|err| RuntimeError::Audit(err.to_string()))?;
                Arc::new(mirror)
            }
        };
        Ok(Self {
            verifier: Arc::new(StaticTokenVerifier::from_config(&config.auth)),
            cache: Arc::new(InMemoryUserContextCache::new()),
            clock: Arc::new(SystemClock),
            mirror,
        })
    }
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Fully wired authorization engine.
pub struct PortalRuntime {
    /// Audit writer.
    audit: Arc<AuditLogger>,
    /// Context loader.
    contexts: Arc<UserContextLoader>,
    /// Scope resolver.
    resolver: Arc<AgencyScopeResolver>,
    /// Permission evaluator.
    permissions: Arc<PermissionEvaluator>,
    /// Request pipeline.
    pipeline: AuthorizationPipeline,
    /// Scoped NDA reader.
    scoped_query: ScopedQuery,
    /// Status engine.
    status: StatusTransitionEngine,
    /// Failed-login monitor.
    security: SecurityMonitor,
    /// Access administration.
    access_admin: AccessAdmin,
}

impl PortalRuntime {
    /// Builds a runtime from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when validation fails or the store or audit
    /// mirror cannot be opened.
    pub fn from_config(config: &PortalConfig) -> Result<Self, RuntimeError> {
        config.validate().map_err(|err| RuntimeError::Config(err.to_string()))?;
        let services = RuntimeServices::from_config(config)?;
        match config.store.store_type {
            StoreType::Memory => {
                let store = InMemoryPortalStore::new();
                for role in system_roles() {
                    store.insert_role(role).map_err(|err| RuntimeError::Store(err.to_string()))?;
                }
                Ok(Self::assemble(Arc::new(store), config, services))
            }
            StoreType::Sqlite => {
                let sqlite = config.store.sqlite().ok_or_else(|| {
                    RuntimeError::Config("sqlite store requires path".to_string())
                })?;
                let store = SqlitePortalStore::new(&sqlite)
                    .map_err(|err| RuntimeError::Store(err.to_string()))?;
                for role in system_roles() {
                    store.insert_role(&role).map_err(|err| RuntimeError::Store(err.to_string()))?;
                }
                tracing::info!(
                    target = "nda_portal::runtime",
                    path = %sqlite.path.display(),
                    "opened sqlite portal store"
                );
                Ok(Self::assemble(Arc::new(store), config, services))
            }
        }
    }

    /// Builds a runtime over an existing store.
    #[must_use]
    pub fn assemble<S>(store: Arc<S>, config: &PortalConfig, services: RuntimeServices) -> Self
    where
        S: PortalStore + 'static,
    {
        let directory: Arc<dyn DirectoryStore> = store.clone();
        let agencies: Arc<dyn AgencyStore> = store.clone();
        let ndas: Arc<dyn NdaStore> = store.clone();
        let audit_store: Arc<dyn AuditStore> = store;
        let audit = Arc::new(
            AuditLogger::new(Arc::clone(&audit_store), Arc::clone(&services.clock))
                .with_mirror(services.mirror),
        );
        let contexts = Arc::new(UserContextLoader::new(
            Arc::clone(&directory),
            services.cache,
            Arc::clone(&audit),
            Arc::clone(&services.clock),
            config.roles.default_role.clone(),
        ));
        let resolver = Arc::new(AgencyScopeResolver::new(
            Arc::clone(&agencies),
            config.roles.admin_role.clone(),
        ));
        let permissions =
            Arc::new(PermissionEvaluator::new(Arc::clone(&audit), config.roles.admin_role.clone()));
        let pipeline = AuthorizationPipeline::new(
            services.verifier,
            Arc::clone(&contexts),
            Arc::clone(&permissions),
            Arc::clone(&resolver),
            Arc::clone(&audit),
        );
        let scoped_query =
            ScopedQuery::new(Arc::clone(&ndas), Arc::clone(&resolver), Arc::clone(&audit));
        let status =
            StatusTransitionEngine::new(ndas, Arc::clone(&audit), Arc::clone(&services.clock));
        let security = SecurityMonitor::new(
            audit_store,
            Arc::clone(&audit),
            Arc::clone(&services.clock),
            MonitorSettings::from_config(&config.security),
        );
        let access_admin = AccessAdmin::new(
            directory,
            agencies,
            Arc::clone(&contexts),
            Arc::clone(&audit),
            services.clock,
        );
        Self {
            audit,
            contexts,
            resolver,
            permissions,
            pipeline,
            scoped_query,
            status,
            security,
            access_admin,
        }
    }

    /// Returns the audit writer.
    #[must_use]
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Returns the context loader.
    #[must_use]
    pub fn contexts(&self) -> &UserContextLoader {
        &self.contexts
    }

    /// Returns the scope resolver.
    #[must_use]
    pub fn resolver(&self) -> &AgencyScopeResolver {
        &self.resolver
    }

    /// Returns the permission evaluator.
    #[must_use]
    pub fn permissions(&self) -> &PermissionEvaluator {
        &self.permissions
    }

    /// Returns the request pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &AuthorizationPipeline {
        &self.pipeline
    }

    /// Returns the scoped NDA reader.
    #[must_use]
    pub const fn scoped_query(&self) -> &ScopedQuery {
        &self.scoped_query
    }

    /// Returns the status engine.
    #[must_use]
    pub const fn status(&self) -> &StatusTransitionEngine {
        &self.status
    }

    /// Returns the failed-login monitor.
    #[must_use]
    pub const fn security(&self) -> &SecurityMonitor {
        &self.security
    }

    /// Returns the access administration service.
    #[must_use]
    pub const fn access_admin(&self) -> &AccessAdmin {
        &self.access_admin
    }
}
