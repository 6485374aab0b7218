// crates/nda-portal-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Portal Store
// Description: Durable portal store backed by SQLite WAL.
// Purpose: Persist directory, agency, NDA, and audit rows with strict decoding.
// Dependencies: nda-portal-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements the portal store interfaces using `SQLite`. A single
//! mutex-guarded connection serializes access. Scope filters are pushed into
//! SQL as `subagency_id IN (...)` constraints so out-of-scope rows never leave
//! the database. Status changes run in one transaction guarded by a
//! compare-and-set on the current status. Audit rows are insert-only and index
//! the `details.email` field for brute-force queries.
//! Security posture: database contents are untrusted; unknown status or action
//! labels fail closed as corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
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
use nda_portal_core::ContactProfile;
use nda_portal_core::ContactRecord;
use nda_portal_core::DirectoryStore;
use nda_portal_core::GrantEdges;
use nda_portal_core::GrantTarget;
use nda_portal_core::GroupMembership;
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
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum audit details payload accepted by the store.
pub const MAX_AUDIT_DETAILS_BYTES: usize = 64 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` portal store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a config with default pragmas for the given path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored row failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Write violates a uniqueness or state constraint.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Referenced row does not exist.
    #[error("sqlite store not found: {0}")]
    NotFound(String),
    /// Audit details exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "details_json exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps a `rusqlite` error, classifying constraint violations as conflicts.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = err
        && failure.code == ErrorCode::ConstraintViolation
    {
        return SqliteStoreError::Conflict(err.to_string());
    }
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed portal store with WAL support.
#[derive(Clone)]
pub struct SqlitePortalStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqlitePortalStore {
    /// Opens an `SQLite`-backed portal store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs `op` against the locked connection.
    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let result = op(&mut guard);
        drop(guard);
        result
    }

    /// Inserts or replaces a role definition.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn insert_role(&self, role: &RoleRecord) -> Result<(), SqliteStoreError> {
        let permissions = serde_json::to_string(&role.permissions)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO roles (name, description, permissions_json, system_role) VALUES (?1, \
                 ?2, ?3, ?4) ON CONFLICT(name) DO UPDATE SET description = excluded.description, \
                 permissions_json = excluded.permissions_json, system_role = excluded.system_role",
                params![role.name, role.description, permissions, role.system_role],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    /// Inserts a contact holding the listed roles.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Conflict`] when the contact or subject
    /// exists and [`SqliteStoreError::NotFound`] when a role is undefined.
    pub fn insert_contact(
        &self,
        contact: &ContactRecord,
        roles: &[&str],
        granted_at: Timestamp,
    ) -> Result<(), SqliteStoreError> {
        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|err| db_error(&err))?;
            insert_contact_row(&tx, contact)?;
            for role in roles {
                insert_role_assignment(&tx, &contact.contact_id, role, None, granted_at)?;
            }
            tx.commit().map_err(|err| db_error(&err))?;
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: Directory
// ============================================================================

#[async_trait]
impl DirectoryStore for SqlitePortalStore {
    async fn find_profile_by_subject(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Option<ContactProfile>, StoreError> {
        self.with_connection(|conn| {
            let contact_id: Option<String> = conn
                .query_row(
                    "SELECT contact_id FROM contacts WHERE subject_id = ?1",
                    params![subject_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_error(&err))?;
            match contact_id {
                Some(contact_id) => load_profile(conn, &ContactId::new(contact_id)),
                None => Ok(None),
            }
        })
        .map_err(StoreError::from)
    }

    async fn find_profile_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<ContactProfile>, StoreError> {
        self.with_connection(|conn| load_profile(conn, contact_id)).map_err(StoreError::from)
    }

    async fn find_role(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        self.with_connection(|conn| load_role(conn, name)).map_err(StoreError::from)
    }

    async fn create_contact(
        &self,
        contact: NewContact,
        created_at: Timestamp,
    ) -> Result<ContactProfile, StoreError> {
        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|err| db_error(&err))?;
            let row = ContactRecord {
                contact_id: contact.contact_id.clone(),
                subject_id: Some(contact.subject_id.clone()),
                email: contact.email.clone(),
                name: None,
                active: true,
            };
            insert_contact_row(&tx, &row)?;
            insert_role_assignment(&tx, &row.contact_id, &contact.role_name, None, created_at)?;
            let profile = load_profile(&tx, &row.contact_id)?;
            tx.commit().map_err(|err| db_error(&err))?;
            profile.ok_or_else(|| {
                SqliteStoreError::Corrupt(format!("contact {} vanished", row.contact_id))
            })
        })
        .map_err(StoreError::from)
    }

    async fn assign_role(&self, assignment: &RoleAssignment) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|err| db_error(&err))?;
            ensure_contact_exists(&tx, &assignment.contact_id)?;
            insert_role_assignment(
                &tx,
                &assignment.contact_id,
                &assignment.role_name,
                assignment.granted_by.as_ref(),
                assignment.granted_at,
            )?;
            tx.commit().map_err(|err| db_error(&err))?;
            Ok(())
        })
        .map_err(StoreError::from)
    }

    async fn remove_role(
        &self,
        contact_id: &ContactId,
        role_name: &str,
    ) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|err| db_error(&err))?;
            let held: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM contact_roles WHERE contact_id = ?1 AND role_name = ?2",
                    params![contact_id.as_str(), role_name],
                    |row| row.get(0),
                )
                .map_err(|err| db_error(&err))?;
            if held == 0 {
                return Err(SqliteStoreError::NotFound(format!(
                    "role {role_name} not assigned to {contact_id}"
                )));
            }
            let removed = tx
                .execute(
                    "DELETE FROM contact_roles WHERE contact_id = ?1 AND role_name = ?2 AND \
                     (SELECT COUNT(*) FROM contact_roles WHERE contact_id = ?1) > 1",
                    params![contact_id.as_str(), role_name],
                )
                .map_err(|err| db_error(&err))?;
            if removed == 0 {
                return Err(SqliteStoreError::Conflict(format!(
                    "role {role_name} is the only role of {contact_id}"
                )));
            }
            tx.commit().map_err(|err| db_error(&err))?;
            Ok(())
        })
        .map_err(StoreError::from)
    }

    async fn set_contact_active(
        &self,
        contact_id: &ContactId,
        active: bool,
    ) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            let updated = conn
                .execute(
                    "UPDATE contacts SET active = ?2 WHERE contact_id = ?1",
                    params![contact_id.as_str(), active],
                )
                .map_err(|err| db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!("contact {contact_id}")));
            }
            Ok(())
        })
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Agencies
// ============================================================================

#[async_trait]
impl AgencyStore for SqlitePortalStore {
    async fn grant_edges(&self, contact_id: &ContactId) -> Result<GrantEdges, StoreError> {
        self.with_connection(|conn| load_grant_edges(conn, contact_id)).map_err(StoreError::from)
    }

    async fn find_agency_group(
        &self,
        group_id: &AgencyGroupId,
    ) -> Result<Option<AgencyGroup>, StoreError> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, name, code FROM agency_groups WHERE id = ?1",
                params![group_id.as_str()],
                |row| {
                    Ok(AgencyGroup {
                        id: AgencyGroupId::new(row.get::<_, String>(0)?),
                        name: row.get(1)?,
                        code: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|err| db_error(&err))
        })
        .map_err(StoreError::from)
    }

    async fn find_subagency(
        &self,
        subagency_id: &SubagencyId,
    ) -> Result<Option<Subagency>, StoreError> {
        self.with_connection(|conn| load_subagency(conn, subagency_id)).map_err(StoreError::from)
    }

    async fn subagencies_in_group(
        &self,
        group_id: &AgencyGroupId,
    ) -> Result<Vec<Subagency>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, agency_group_id, name, code FROM subagencies WHERE \
                     agency_group_id = ?1 ORDER BY id",
                )
                .map_err(|err| db_error(&err))?;
            let rows = stmt
                .query_map(params![group_id.as_str()], subagency_from_row)
                .map_err(|err| db_error(&err))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))
        })
        .map_err(StoreError::from)
    }

    async fn insert_agency_group(&self, group: &AgencyGroup) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO agency_groups (id, name, code) VALUES (?1, ?2, ?3)",
                params![group.id.as_str(), group.name, group.code],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
        .map_err(StoreError::from)
    }

    async fn insert_subagency(&self, subagency: &Subagency) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            let group_exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM agency_groups WHERE id = ?1",
                    params![subagency.agency_group_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_error(&err))?;
            if group_exists.is_none() {
                return Err(SqliteStoreError::NotFound(format!(
                    "agency group {}",
                    subagency.agency_group_id
                )));
            }
            conn.execute(
                "INSERT INTO subagencies (id, agency_group_id, name, code) VALUES (?1, ?2, ?3, ?4)",
                params![
                    subagency.id.as_str(),
                    subagency.agency_group_id.as_str(),
                    subagency.name,
                    subagency.code
                ],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
        .map_err(StoreError::from)
    }

    async fn delete_agency_group(&self, group_id: &AgencyGroupId) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|err| db_error(&err))?;
            let subagency_count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM subagencies WHERE agency_group_id = ?1",
                    params![group_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| db_error(&err))?;
            if subagency_count > 0 {
                return Err(SqliteStoreError::Conflict(format!(
                    "agency group {group_id} has subagencies"
                )));
            }
            let deleted = tx
                .execute("DELETE FROM agency_groups WHERE id = ?1", params![group_id.as_str()])
                .map_err(|err| db_error(&err))?;
            if deleted == 0 {
                return Err(SqliteStoreError::NotFound(format!("agency group {group_id}")));
            }
            tx.commit().map_err(|err| db_error(&err))?;
            Ok(())
        })
        .map_err(StoreError::from)
    }

    async fn insert_grant(&self, grant: &AgencyGrant) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|err| db_error(&err))?;
            ensure_contact_exists(&tx, &grant.contact_id)?;
            let granted_by = grant.granted_by.as_ref().map(ContactId::as_str);
            let (exists_sql, insert_sql, target_id) = match &grant.target {
                GrantTarget::AgencyGroup(id) => (
                    "SELECT 1 FROM agency_groups WHERE id = ?1",
                    "INSERT INTO agency_group_grants (contact_id, agency_group_id, granted_by, \
                     granted_at) VALUES (?1, ?2, ?3, ?4)",
                    id.as_str(),
                ),
                GrantTarget::Subagency(id) => (
                    "SELECT 1 FROM subagencies WHERE id = ?1",
                    "INSERT INTO subagency_grants (contact_id, subagency_id, granted_by, \
                     granted_at) VALUES (?1, ?2, ?3, ?4)",
                    id.as_str(),
                ),
            };
            let target_exists: Option<i64> = tx
                .query_row(exists_sql, params![target_id], |row| row.get(0))
                .optional()
                .map_err(|err| db_error(&err))?;
            if target_exists.is_none() {
                return Err(SqliteStoreError::NotFound(format!("grant target {target_id}")));
            }
            tx.execute(
                insert_sql,
                params![
                    grant.contact_id.as_str(),
                    target_id,
                    granted_by,
                    grant.granted_at.as_unix_millis()
                ],
            )
            .map_err(|err| db_error(&err))?;
            tx.commit().map_err(|err| db_error(&err))?;
            Ok(())
        })
        .map_err(StoreError::from)
    }

    async fn delete_grant(
        &self,
        contact_id: &ContactId,
        target: &GrantTarget,
    ) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            let (sql, target_id) = match target {
                GrantTarget::AgencyGroup(id) => (
                    "DELETE FROM agency_group_grants WHERE contact_id = ?1 AND agency_group_id = \
                     ?2",
                    id.as_str(),
                ),
                GrantTarget::Subagency(id) => (
                    "DELETE FROM subagency_grants WHERE contact_id = ?1 AND subagency_id = ?2",
                    id.as_str(),
                ),
            };
            let deleted = conn
                .execute(sql, params![contact_id.as_str(), target_id])
                .map_err(|err| db_error(&err))?;
            if deleted == 0 {
                return Err(SqliteStoreError::NotFound("grant".to_string()));
            }
            Ok(())
        })
        .map_err(StoreError::from)
    }

    async fn subagency_access(
        &self,
        subagency_id: &SubagencyId,
    ) -> Result<Vec<SubagencyAccessEntry>, StoreError> {
        self.with_connection(|conn| {
            let subagency = load_subagency(conn, subagency_id)?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("subagency {subagency_id}")))?;
            let mut entries: BTreeMap<String, SubagencyAccessEntry> = BTreeMap::new();
            let mut direct = conn
                .prepare(
                    "SELECT c.contact_id, c.email FROM subagency_grants g JOIN contacts c ON \
                     c.contact_id = g.contact_id WHERE g.subagency_id = ?1",
                )
                .map_err(|err| db_error(&err))?;
            let rows = direct
                .query_map(params![subagency_id.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|err| db_error(&err))?;
            for row in rows {
                let (contact_id, email) = row.map_err(|err| db_error(&err))?;
                entries.insert(
                    contact_id.clone(),
                    SubagencyAccessEntry {
                        contact_id: ContactId::new(contact_id),
                        email,
                        source: AccessSource::Direct,
                    },
                );
            }
            let mut inherited = conn
                .prepare(
                    "SELECT c.contact_id, c.email FROM agency_group_grants g JOIN contacts c ON \
                     c.contact_id = g.contact_id WHERE g.agency_group_id = ?1",
                )
                .map_err(|err| db_error(&err))?;
            let rows = inherited
                .query_map(params![subagency.agency_group_id.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|err| db_error(&err))?;
            for row in rows {
                let (contact_id, email) = row.map_err(|err| db_error(&err))?;
                entries.entry(contact_id.clone()).or_insert_with(|| SubagencyAccessEntry {
                    contact_id: ContactId::new(contact_id),
                    email,
                    source: AccessSource::Inherited {
                        agency_group_id: subagency.agency_group_id.clone(),
                    },
                });
            }
            Ok(entries.into_values().collect())
        })
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: NDA Records
// ============================================================================

#[async_trait]
impl NdaStore for SqlitePortalStore {
    async fn find_nda(
        &self,
        nda_id: &NdaId,
        scope: &ScopeFilter,
    ) -> Result<Option<NdaRecord>, StoreError> {
        let Some(scope_clause) = ScopeClause::build(scope) else {
            return Ok(None);
        };
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {NDA_COLUMNS} FROM ndas WHERE id = ?{}{}",
                scope_clause.values.len() + 1,
                scope_clause.sql
            );
            let mut values = scope_clause.values.clone();
            values.push(SqlValue::Text(nda_id.as_str().to_string()));
            let row = conn
                .query_row(&sql, params_from_iter(values.iter()), nda_row_from_row)
                .optional()
                .map_err(|err| db_error(&err))?;
            row.map(NdaRow::into_record).transpose()
        })
        .map_err(StoreError::from)
    }

    async fn find_ndas(
        &self,
        scope: &ScopeFilter,
        query: &NdaQuery,
    ) -> Result<Vec<NdaRecord>, StoreError> {
        let Some(scope_clause) = ScopeClause::build(scope) else {
            return Ok(Vec::new());
        };
        self.with_connection(|conn| {
            let (filter_sql, values) = nda_listing(&scope_clause, query)?;
            let sql = format!("SELECT {NDA_COLUMNS} FROM ndas WHERE 1 = 1{filter_sql}");
            let mut stmt = conn.prepare(&sql).map_err(|err| db_error(&err))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), nda_row_from_row)
                .map_err(|err| db_error(&err))?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row.map_err(|err| db_error(&err))?.into_record()?);
            }
            Ok(records)
        })
        .map_err(StoreError::from)
    }

    async fn count_ndas(&self, scope: &ScopeFilter, query: &NdaQuery) -> Result<u64, StoreError> {
        let Some(scope_clause) = ScopeClause::build(scope) else {
            return Ok(0);
        };
        self.with_connection(|conn| {
            let (filter_sql, values) = nda_filter(&scope_clause, query);
            let sql = format!("SELECT COUNT(*) FROM ndas WHERE 1 = 1{filter_sql}");
            let count: i64 = conn
                .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
                .map_err(|err| db_error(&err))?;
            u64::try_from(count)
                .map_err(|_| SqliteStoreError::Corrupt("negative nda count".to_string()))
        })
        .map_err(StoreError::from)
    }

    async fn insert_nda(&self, record: &NdaRecord) -> Result<(), StoreError> {
        let display_id = i64::try_from(record.display_id)
            .map_err(|_| StoreError::Invalid("display_id out of range".to_string()))?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO ndas (id, display_id, subagency_id, company_name, status, \
                 fully_executed_at, created_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, \
                 ?8)",
                params![
                    record.id.as_str(),
                    display_id,
                    record.subagency_id.as_str(),
                    record.company_name,
                    record.status.as_str(),
                    record.fully_executed_at.map(Timestamp::as_unix_millis),
                    record.created_by.as_ref().map(ContactId::as_str),
                    record.created_at.as_unix_millis()
                ],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
        .map_err(StoreError::from)
    }

    async fn commit_status_change(
        &self,
        change: &StatusChange,
    ) -> Result<StatusHistoryEntry, StoreError> {
        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|err| db_error(&err))?;
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM ndas WHERE id = ?1",
                    params![change.nda_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_error(&err))?;
            let Some(current) = current else {
                return Err(SqliteStoreError::NotFound(format!("nda {}", change.nda_id)));
            };
            if current != change.expected_status.as_str() {
                return Err(SqliteStoreError::Conflict(format!(
                    "nda {} is {current} not {}",
                    change.nda_id, change.expected_status
                )));
            }
            let fully_executed_at = if change.new_status == NdaStatus::FullyExecuted {
                change.fully_executed_at.map(Timestamp::as_unix_millis)
            } else {
                None
            };
            tx.execute(
                "UPDATE ndas SET status = ?2, fully_executed_at = COALESCE(?3, fully_executed_at) \
                 WHERE id = ?1 AND status = ?4",
                params![
                    change.nda_id.as_str(),
                    change.new_status.as_str(),
                    fully_executed_at,
                    change.expected_status.as_str()
                ],
            )
            .map_err(|err| db_error(&err))?;
            tx.execute(
                "INSERT INTO nda_status_history (nda_id, status, changed_by, changed_at) VALUES \
                 (?1, ?2, ?3, ?4)",
                params![
                    change.nda_id.as_str(),
                    change.new_status.as_str(),
                    change.changed_by.as_ref().map(ContactId::as_str),
                    change.changed_at.as_unix_millis()
                ],
            )
            .map_err(|err| db_error(&err))?;
            tx.commit().map_err(|err| db_error(&err))?;
            Ok(StatusHistoryEntry {
                nda_id: change.nda_id.clone(),
                status: change.new_status,
                changed_by: change.changed_by.clone(),
                changed_at: change.changed_at,
            })
        })
        .map_err(StoreError::from)
    }

    async fn status_history(
        &self,
        nda_id: &NdaId,
    ) -> Result<Vec<StatusHistoryEntry>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT status, changed_by, changed_at FROM nda_status_history WHERE nda_id = \
                     ?1 ORDER BY seq",
                )
                .map_err(|err| db_error(&err))?;
            let rows = stmt
                .query_map(params![nda_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(|err| db_error(&err))?;
            let mut entries = Vec::new();
            for row in rows {
                let (status, changed_by, changed_at) = row.map_err(|err| db_error(&err))?;
                entries.push(StatusHistoryEntry {
                    nda_id: nda_id.clone(),
                    status: parse_status(&status)?,
                    changed_by: changed_by.map(ContactId::new),
                    changed_at: Timestamp::from_unix_millis(changed_at),
                });
            }
            Ok(entries)
        })
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

#[async_trait]
impl AuditStore for SqlitePortalStore {
    async fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let details = serde_json::to_string(&record.entry.details)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        if details.len() > MAX_AUDIT_DETAILS_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_AUDIT_DETAILS_BYTES,
                actual_bytes: details.len(),
            }
            .into());
        }
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO audit_log (id, action, entity_type, entity_id, user_id, ip_address, \
                 user_agent, details_json, detail_email, created_at) VALUES (?1, ?2, ?3, ?4, ?5, \
                 ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id.as_str(),
                    record.entry.action.as_str(),
                    record.entry.entity_type,
                    record.entry.entity_id,
                    record.entry.user_id.as_ref().map(ContactId::as_str),
                    record.entry.ip_address,
                    record.entry.user_agent,
                    details,
                    record.entry.detail_email(),
                    record.created_at.as_unix_millis()
                ],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
        .map_err(StoreError::from)
    }

    async fn count_audit(&self, query: &AuditQuery) -> Result<u64, StoreError> {
        self.with_connection(|conn| {
            let (filter_sql, values) = audit_filter(query);
            let sql = format!("SELECT COUNT(*) FROM audit_log WHERE 1 = 1{filter_sql}");
            let count: i64 = conn
                .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
                .map_err(|err| db_error(&err))?;
            u64::try_from(count)
                .map_err(|_| SqliteStoreError::Corrupt("negative audit count".to_string()))
        })
        .map_err(StoreError::from)
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        self.with_connection(|conn| {
            let (filter_sql, mut values) = audit_filter(query);
            let mut sql = format!(
                "SELECT id, action, entity_type, entity_id, user_id, ip_address, user_agent, \
                 details_json, created_at FROM audit_log WHERE 1 = 1{filter_sql} ORDER BY \
                 created_at DESC, seq DESC"
            );
            if let Some(limit) = query.limit {
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                values.push(SqlValue::Integer(limit));
                sql.push_str(&format!(" LIMIT ?{}", values.len()));
            }
            let mut stmt = conn.prepare(&sql).map_err(|err| db_error(&err))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), |row| {
                    Ok(AuditRow {
                        id: row.get(0)?,
                        action: row.get(1)?,
                        entity_type: row.get(2)?,
                        entity_id: row.get(3)?,
                        user_id: row.get(4)?,
                        ip_address: row.get(5)?,
                        user_agent: row.get(6)?,
                        details_json: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })
                .map_err(|err| db_error(&err))?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row.map_err(|err| db_error(&err))?.into_record()?);
            }
            Ok(records)
        })
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Column list for NDA reads.
const NDA_COLUMNS: &str =
    "id, display_id, subagency_id, company_name, status, fully_executed_at, created_by, created_at";

/// Raw NDA row prior to label decoding.
struct NdaRow {
    /// Record identifier.
    id: String,
    /// Display number.
    display_id: i64,
    /// Owning subagency.
    subagency_id: String,
    /// Counterparty company.
    company_name: String,
    /// Status label.
    status: String,
    /// Completion time.
    fully_executed_at: Option<i64>,
    /// Creating contact.
    created_by: Option<String>,
    /// Creation time.
    created_at: i64,
}

impl NdaRow {
    /// Decodes the row into a record, failing closed on unknown labels.
    fn into_record(self) -> Result<NdaRecord, SqliteStoreError> {
        let display_id = u64::try_from(self.display_id).map_err(|_| {
            SqliteStoreError::Corrupt(format!("negative display_id for {}", self.id))
        })?;
        Ok(NdaRecord {
            status: parse_status(&self.status)?,
            id: NdaId::new(self.id),
            display_id,
            subagency_id: SubagencyId::new(self.subagency_id),
            company_name: self.company_name,
            fully_executed_at: self.fully_executed_at.map(Timestamp::from_unix_millis),
            created_by: self.created_by.map(ContactId::new),
            created_at: Timestamp::from_unix_millis(self.created_at),
        })
    }
}

/// Reads an NDA row.
fn nda_row_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NdaRow> {
    Ok(NdaRow {
        id: row.get(0)?,
        display_id: row.get(1)?,
        subagency_id: row.get(2)?,
        company_name: row.get(3)?,
        status: row.get(4)?,
        fully_executed_at: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Raw audit row prior to decoding.
struct AuditRow {
    /// Entry identifier.
    id: String,
    /// Action tag.
    action: String,
    /// Entity type.
    entity_type: String,
    /// Entity identifier.
    entity_id: Option<String>,
    /// Acting contact.
    user_id: Option<String>,
    /// Client IP.
    ip_address: Option<String>,
    /// Client user agent.
    user_agent: Option<String>,
    /// Details payload.
    details_json: String,
    /// Creation time.
    created_at: i64,
}

impl AuditRow {
    /// Decodes the row into a record, failing closed on unknown actions.
    fn into_record(self) -> Result<AuditRecord, SqliteStoreError> {
        let action = AuditAction::parse(&self.action).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("unknown audit action: {}", self.action))
        })?;
        let details = serde_json::from_str(&self.details_json)
            .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
        Ok(AuditRecord {
            id: AuditEntryId::new(self.id),
            created_at: Timestamp::from_unix_millis(self.created_at),
            entry: AuditEntry {
                action,
                entity_type: self.entity_type,
                entity_id: self.entity_id,
                user_id: self.user_id.map(ContactId::new),
                ip_address: self.ip_address,
                user_agent: self.user_agent,
                details,
            },
        })
    }
}

/// Reads a subagency row.
fn subagency_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subagency> {
    Ok(Subagency {
        id: SubagencyId::new(row.get::<_, String>(0)?),
        agency_group_id: AgencyGroupId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        code: row.get(3)?,
    })
}

/// Parses a stored status label.
fn parse_status(label: &str) -> Result<NdaStatus, SqliteStoreError> {
    NdaStatus::parse(label)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown nda status: {label}")))
}

// ============================================================================
// SECTION: Query Builders
// ============================================================================

/// SQL fragment constraining `subagency_id` to a scope.
struct ScopeClause {
    /// Fragment appended to a `WHERE` clause (empty when unrestricted).
    sql: String,
    /// Bound values, numbered from `?1`.
    values: Vec<SqlValue>,
}

impl ScopeClause {
    /// Builds the clause; returns `None` when the scope matches nothing.
    fn build(scope: &ScopeFilter) -> Option<Self> {
        match scope {
            ScopeFilter::Unrestricted => Some(Self {
                sql: String::new(),
                values: Vec::new(),
            }),
            ScopeFilter::Subagencies(ids) if ids.is_empty() => None,
            ScopeFilter::Subagencies(ids) => {
                let placeholders: Vec<String> =
                    (1..=ids.len()).map(|index| format!("?{index}")).collect();
                Some(Self {
                    sql: format!(" AND subagency_id IN ({})", placeholders.join(", ")),
                    values: ids.iter().map(|id| SqlValue::Text(id.as_str().to_string())).collect(),
                })
            }
        }
    }
}

/// Builds the NDA filter fragment and bound values.
fn nda_filter(scope: &ScopeClause, query: &NdaQuery) -> (String, Vec<SqlValue>) {
    let mut sql = scope.sql.clone();
    let mut values = scope.values.clone();
    if let Some(status) = query.status {
        values.push(SqlValue::Text(status.as_str().to_string()));
        sql.push_str(&format!(" AND status = ?{}", values.len()));
    }
    (sql, values)
}

/// Builds the ordered, limited NDA listing fragment and bound values.
fn nda_listing(
    scope: &ScopeClause,
    query: &NdaQuery,
) -> Result<(String, Vec<SqlValue>), SqliteStoreError> {
    let (mut sql, mut values) = nda_filter(scope, query);
    sql.push_str(" ORDER BY id");
    if let Some(limit) = query.limit {
        let limit = i64::try_from(limit)
            .map_err(|_| SqliteStoreError::Invalid("limit out of range".to_string()))?;
        values.push(SqlValue::Integer(limit));
        sql.push_str(&format!(" LIMIT ?{}", values.len()));
    }
    Ok((sql, values))
}

/// Builds the audit filter fragment and bound values.
fn audit_filter(query: &AuditQuery) -> (String, Vec<SqlValue>) {
    let mut sql = String::new();
    let mut values: Vec<SqlValue> = Vec::new();
    if !query.actions.is_empty() {
        let mut placeholders = Vec::with_capacity(query.actions.len());
        for action in &query.actions {
            values.push(SqlValue::Text(action.as_str().to_string()));
            placeholders.push(format!("?{}", values.len()));
        }
        sql.push_str(&format!(" AND action IN ({})", placeholders.join(", ")));
    }
    if let Some(since) = query.since {
        values.push(SqlValue::Integer(since.as_unix_millis()));
        sql.push_str(&format!(" AND created_at >= ?{}", values.len()));
    }
    if let Some(ip) = &query.ip_address {
        values.push(SqlValue::Text(ip.clone()));
        sql.push_str(&format!(" AND ip_address = ?{}", values.len()));
    }
    if let Some(email) = &query.detail_email {
        values.push(SqlValue::Text(email.clone()));
        sql.push_str(&format!(" AND detail_email = ?{}", values.len()));
    }
    (sql, values)
}

// ============================================================================
// SECTION: Directory Helpers
// ============================================================================

/// Loads a role definition.
fn load_role(conn: &Connection, name: &str) -> Result<Option<RoleRecord>, SqliteStoreError> {
    let row: Option<(String, String, bool)> = conn
        .query_row(
            "SELECT description, permissions_json, system_role FROM roles WHERE name = ?1",
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    row.map(|(description, permissions_json, system_role)| {
        let permissions: BTreeSet<String> = serde_json::from_str(&permissions_json)
            .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
        Ok(RoleRecord {
            name: name.to_string(),
            description,
            permissions,
            system_role,
        })
    })
    .transpose()
}

/// Loads a full contact profile.
fn load_profile(
    conn: &Connection,
    contact_id: &ContactId,
) -> Result<Option<ContactProfile>, SqliteStoreError> {
    let contact: Option<(Option<String>, String, Option<String>, bool)> = conn
        .query_row(
            "SELECT subject_id, email, name, active FROM contacts WHERE contact_id = ?1",
            params![contact_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    let Some((subject_id, email, name, active)) = contact else {
        return Ok(None);
    };
    let mut stmt = conn
        .prepare("SELECT role_name FROM contact_roles WHERE contact_id = ?1 ORDER BY seq")
        .map_err(|err| db_error(&err))?;
    let role_names = stmt
        .query_map(params![contact_id.as_str()], |row| row.get::<_, String>(0))
        .map_err(|err| db_error(&err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| db_error(&err))?;
    let mut roles = Vec::with_capacity(role_names.len());
    for role_name in role_names {
        let role = load_role(conn, &role_name)?.ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("assigned role {role_name} is undefined"))
        })?;
        roles.push(role);
    }
    let agency_group_grants = string_column(
        conn,
        "SELECT agency_group_id FROM agency_group_grants WHERE contact_id = ?1",
        contact_id,
    )?
    .into_iter()
    .map(AgencyGroupId::new)
    .collect();
    let subagency_grants = string_column(
        conn,
        "SELECT subagency_id FROM subagency_grants WHERE contact_id = ?1",
        contact_id,
    )?
    .into_iter()
    .map(SubagencyId::new)
    .collect();
    Ok(Some(ContactProfile {
        contact_id: contact_id.clone(),
        subject_id: subject_id.map(SubjectId::new),
        email,
        name,
        active,
        roles,
        agency_group_grants,
        subagency_grants,
    }))
}

/// Loads direct subagency grants and granted groups with their membership.
fn load_grant_edges(
    conn: &Connection,
    contact_id: &ContactId,
) -> Result<GrantEdges, SqliteStoreError> {
    let direct_subagencies = string_column(
        conn,
        "SELECT subagency_id FROM subagency_grants WHERE contact_id = ?1",
        contact_id,
    )?
    .into_iter()
    .map(SubagencyId::new)
    .collect();
    let mut stmt = conn
        .prepare(
            "SELECT g.agency_group_id, s.id FROM agency_group_grants g LEFT JOIN subagencies s ON \
             s.agency_group_id = g.agency_group_id WHERE g.contact_id = ?1",
        )
        .map_err(|err| db_error(&err))?;
    let rows = stmt
        .query_map(params![contact_id.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })
        .map_err(|err| db_error(&err))?;
    let mut groups: BTreeMap<String, BTreeSet<SubagencyId>> = BTreeMap::new();
    for row in rows {
        let (group_id, subagency_id) = row.map_err(|err| db_error(&err))?;
        let members = groups.entry(group_id).or_default();
        if let Some(subagency_id) = subagency_id {
            members.insert(SubagencyId::new(subagency_id));
        }
    }
    Ok(GrantEdges {
        direct_subagencies,
        groups: groups
            .into_iter()
            .map(|(group_id, subagencies)| GroupMembership {
                agency_group_id: AgencyGroupId::new(group_id),
                subagencies,
            })
            .collect(),
    })
}

/// Loads a subagency.
fn load_subagency(
    conn: &Connection,
    subagency_id: &SubagencyId,
) -> Result<Option<Subagency>, SqliteStoreError> {
    conn.query_row(
        "SELECT id, agency_group_id, name, code FROM subagencies WHERE id = ?1",
        params![subagency_id.as_str()],
        subagency_from_row,
    )
    .optional()
    .map_err(|err| db_error(&err))
}

/// Reads a single text column keyed by contact id.
fn string_column(
    conn: &Connection,
    sql: &str,
    contact_id: &ContactId,
) -> Result<Vec<String>, SqliteStoreError> {
    let mut stmt = conn.prepare(sql).map_err(|err| db_error(&err))?;
    let rows = stmt
        .query_map(params![contact_id.as_str()], |row| row.get::<_, String>(0))
        .map_err(|err| db_error(&err))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))
}

/// Fails with not-found when the contact row is missing.
fn ensure_contact_exists(
    conn: &Connection,
    contact_id: &ContactId,
) -> Result<(), SqliteStoreError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM contacts WHERE contact_id = ?1",
            params![contact_id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    if exists.is_none() {
        return Err(SqliteStoreError::NotFound(format!("contact {contact_id}")));
    }
    Ok(())
}

/// Inserts a contact row.
fn insert_contact_row(conn: &Connection, contact: &ContactRecord) -> Result<(), SqliteStoreError> {
    conn.execute(
        "INSERT INTO contacts (contact_id, subject_id, email, name, active) VALUES (?1, ?2, ?3, \
         ?4, ?5)",
        params![
            contact.contact_id.as_str(),
            contact.subject_id.as_ref().map(SubjectId::as_str),
            contact.email,
            contact.name,
            contact.active
        ],
    )
    .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Inserts a role assignment after checking the role exists.
fn insert_role_assignment(
    conn: &Connection,
    contact_id: &ContactId,
    role_name: &str,
    granted_by: Option<&ContactId>,
    granted_at: Timestamp,
) -> Result<(), SqliteStoreError> {
    if load_role(conn, role_name)?.is_none() {
        return Err(SqliteStoreError::NotFound(format!("role {role_name}")));
    }
    conn.execute(
        "INSERT INTO contact_roles (contact_id, role_name, granted_by, granted_at) VALUES (?1, \
         ?2, ?3, ?4)",
        params![
            contact_id.as_str(),
            role_name,
            granted_by.map(ContactId::as_str),
            granted_at.as_unix_millis()
        ],
    )
    .map_err(|err| db_error(&err))?;
    Ok(())
}

// ============================================================================
// SECTION: Connection Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS roles (
                    name TEXT PRIMARY KEY,
                    description TEXT NOT NULL,
                    permissions_json TEXT NOT NULL,
                    system_role INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS contacts (
                    contact_id TEXT PRIMARY KEY,
                    subject_id TEXT UNIQUE,
                    email TEXT NOT NULL,
                    name TEXT,
                    active INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS contact_roles (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    contact_id TEXT NOT NULL,
                    role_name TEXT NOT NULL,
                    granted_by TEXT,
                    granted_at INTEGER NOT NULL,
                    UNIQUE (contact_id, role_name),
                    FOREIGN KEY (contact_id) REFERENCES contacts(contact_id) ON DELETE CASCADE,
                    FOREIGN KEY (role_name) REFERENCES roles(name)
                );
                CREATE TABLE IF NOT EXISTS agency_groups (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    code TEXT NOT NULL UNIQUE
                );
                CREATE TABLE IF NOT EXISTS subagencies (
                    id TEXT PRIMARY KEY,
                    agency_group_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    code TEXT NOT NULL,
                    UNIQUE (agency_group_id, code),
                    FOREIGN KEY (agency_group_id) REFERENCES agency_groups(id)
                );
                CREATE TABLE IF NOT EXISTS agency_group_grants (
                    contact_id TEXT NOT NULL,
                    agency_group_id TEXT NOT NULL,
                    granted_by TEXT,
                    granted_at INTEGER NOT NULL,
                    PRIMARY KEY (contact_id, agency_group_id),
                    FOREIGN KEY (contact_id) REFERENCES contacts(contact_id) ON DELETE CASCADE,
                    FOREIGN KEY (agency_group_id) REFERENCES agency_groups(id) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS subagency_grants (
                    contact_id TEXT NOT NULL,
                    subagency_id TEXT NOT NULL,
                    granted_by TEXT,
                    granted_at INTEGER NOT NULL,
                    PRIMARY KEY (contact_id, subagency_id),
                    FOREIGN KEY (contact_id) REFERENCES contacts(contact_id) ON DELETE CASCADE,
                    FOREIGN KEY (subagency_id) REFERENCES subagencies(id) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS ndas (
                    id TEXT PRIMARY KEY,
                    display_id INTEGER NOT NULL,
                    subagency_id TEXT NOT NULL,
                    company_name TEXT NOT NULL,
                    status TEXT NOT NULL,
                    fully_executed_at INTEGER,
                    created_by TEXT,
                    created_at INTEGER NOT NULL,
                    FOREIGN KEY (subagency_id) REFERENCES subagencies(id)
                );
                CREATE INDEX IF NOT EXISTS idx_ndas_subagency_id ON ndas (subagency_id);
                CREATE TABLE IF NOT EXISTS nda_status_history (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    nda_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    changed_by TEXT,
                    changed_at INTEGER NOT NULL,
                    FOREIGN KEY (nda_id) REFERENCES ndas(id) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_nda_status_history_nda_id
                    ON nda_status_history (nda_id);
                CREATE TABLE IF NOT EXISTS audit_log (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    action TEXT NOT NULL,
                    entity_type TEXT NOT NULL,
                    entity_id TEXT,
                    user_id TEXT,
                    ip_address TEXT,
                    user_agent TEXT,
                    details_json TEXT NOT NULL,
                    detail_email TEXT,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_log_action_created
                    ON audit_log (action, created_at);
                CREATE INDEX IF NOT EXISTS idx_audit_log_ip ON audit_log (ip_address);
                CREATE INDEX IF NOT EXISTS idx_audit_log_detail_email ON audit_log (detail_email);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
