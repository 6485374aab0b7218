// crates/nda-portal-config/src/config.rs
// ============================================================================
// Module: Portal Configuration
// Description: Configuration loading and validation for the NDA portal.
// Purpose: Provide strict, fail-closed config parsing with safe defaults.
// Dependencies: nda-portal-core, nda-portal-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! This module loads `nda-portal.toml`, applies defaults, and validates every
//! section before the runtime is wired. Path resolution prefers an explicit
//! argument, then `NDA_PORTAL_CONFIG`, then the working-directory default.
//! Security posture: config files are untrusted input; size, encoding, and
//! path limits are enforced before parsing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use nda_portal_core::ADMIN_ROLE;
use nda_portal_core::READ_ONLY_ROLE;
use nda_portal_store_sqlite::SqliteStoreConfig;
use nda_portal_store_sqlite::SqliteStoreMode;
use nda_portal_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default config filename.
pub const DEFAULT_CONFIG_NAME: &str = "nda-portal.toml";
/// Environment variable override for config path.
pub const CONFIG_ENV_VAR: &str = "NDA_PORTAL_CONFIG";
/// Maximum allowed config file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length for config-related paths.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum number of static bearer tokens.
pub const MAX_AUTH_TOKENS: usize = 64;
/// Maximum bearer token length.
pub const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Maximum subject identifier length.
pub const MAX_AUTH_SUBJECT_LENGTH: usize = 512;
/// Hard ceiling on the recent failed-login listing.
pub const MAX_RECENT_FAILED_LOGINS: usize = 500;
/// Default busy timeout (ms) for `SQLite` connections.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Config errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("config io error: {0}")]
    Io(String),
    /// Parse error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Top-Level Config
// ============================================================================

/// NDA portal configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortalConfig {
    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Audit mirror configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Security monitoring configuration.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Role name configuration.
    #[serde(default)]
    pub roles: RolesConfig,
}

impl PortalConfig {
    /// Loads configuration from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.validate()?;
        self.store.validate()?;
        self.audit.validate()?;
        self.security.validate()?;
        self.roles.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// Static bearer-token authentication.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Token table mapping bearer tokens to identities.
    #[serde(default)]
    pub tokens: Vec<AuthTokenConfig>,
}

/// Single bearer token entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthTokenConfig {
    /// Bearer token value.
    pub token: String,
    /// External subject identifier issued for the token.
    pub subject: String,
    /// Verified email for the subject.
    pub email: String,
}

impl AuthConfig {
    /// Validates the token table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when limits are exceeded or entries are malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.len() > MAX_AUTH_TOKENS {
            return Err(ConfigError::Invalid(format!(
                "auth.tokens exceeds max count of {MAX_AUTH_TOKENS}"
            )));
        }
        let mut seen = BTreeSet::new();
        for entry in &self.tokens {
            let token = entry.token.trim();
            if token.is_empty() {
                return Err(ConfigError::Invalid("auth token must be non-empty".to_string()));
            }
            if token.len() > MAX_AUTH_TOKEN_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "auth token exceeds max length of {MAX_AUTH_TOKEN_LENGTH}"
                )));
            }
            if !seen.insert(token) {
                return Err(ConfigError::Invalid("auth token is duplicated".to_string()));
            }
            if entry.subject.trim().is_empty() {
                return Err(ConfigError::Invalid("auth subject must be non-empty".to_string()));
            }
            if entry.subject.len() > MAX_AUTH_SUBJECT_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "auth subject exceeds max length of {MAX_AUTH_SUBJECT_LENGTH}"
                )));
            }
            if !entry.email.contains('@') {
                return Err(ConfigError::Invalid(format!(
                    "auth email for subject {} is malformed",
                    entry.subject
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory store (dev/test only).
    #[default]
    Memory,
    /// SQLite-backed store.
    Sqlite,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Memory,
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates store wiring.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the `SQLite` path is missing or unsafe.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_store_path(path)?;
        }
        if self.store_type == StoreType::Sqlite && self.path.is_none() {
            return Err(ConfigError::Invalid("sqlite store requires path".to_string()));
        }
        Ok(())
    }

    /// Returns the `SQLite` store config when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite(&self) -> Option<SqliteStoreConfig> {
        if self.store_type != StoreType::Sqlite {
            return None;
        }
        self.path.as_ref().map(|path| SqliteStoreConfig {
            path: path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        })
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit mirror selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditMirrorType {
    /// No mirror; the audit store is the only record.
    #[default]
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to a file.
    File,
}

/// Audit mirror configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Mirror sink type.
    #[serde(default)]
    pub mirror: AuditMirrorType,
    /// Mirror file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates mirror wiring.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file sink has no usable path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_store_path(path)?;
        }
        if self.mirror == AuditMirrorType::File && self.path.is_none() {
            return Err(ConfigError::Invalid("file audit mirror requires path".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Security
// ============================================================================

/// Security monitoring defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Failure count at which an IP is considered blocked.
    #[serde(default = "default_failed_login_threshold")]
    pub failed_login_threshold: u64,
    /// Window for the IP block check, in minutes.
    #[serde(default = "default_block_window_minutes")]
    pub block_window_minutes: u32,
    /// Lookback for per-IP and per-email failure counts, in hours.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    /// Default size of the recent failed-login listing.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Maximum size of the recent failed-login listing.
    #[serde(default = "default_recent_limit_max")]
    pub recent_limit_max: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            failed_login_threshold: default_failed_login_threshold(),
            block_window_minutes: default_block_window_minutes(),
            lookback_hours: default_lookback_hours(),
            recent_limit: default_recent_limit(),
            recent_limit_max: default_recent_limit_max(),
        }
    }
}

impl SecurityConfig {
    /// Validates monitoring bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a bound is zero or out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failed_login_threshold == 0 {
            return Err(ConfigError::Invalid(
                "security.failed_login_threshold must be at least 1".to_string(),
            ));
        }
        if self.block_window_minutes == 0 {
            return Err(ConfigError::Invalid(
                "security.block_window_minutes must be at least 1".to_string(),
            ));
        }
        if self.lookback_hours == 0 {
            return Err(ConfigError::Invalid(
                "security.lookback_hours must be at least 1".to_string(),
            ));
        }
        if self.recent_limit_max == 0 || self.recent_limit_max > MAX_RECENT_FAILED_LOGINS {
            return Err(ConfigError::Invalid(format!(
                "security.recent_limit_max must be between 1 and {MAX_RECENT_FAILED_LOGINS}"
            )));
        }
        if self.recent_limit == 0 || self.recent_limit > self.recent_limit_max {
            return Err(ConfigError::Invalid(
                "security.recent_limit must be between 1 and recent_limit_max".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default brute-force threshold.
const fn default_failed_login_threshold() -> u64 {
    10
}

/// Default IP block window.
const fn default_block_window_minutes() -> u32 {
    60
}

/// Default failure lookback.
const fn default_lookback_hours() -> u32 {
    24
}

/// Default recent failed-login listing size.
const fn default_recent_limit() -> usize {
    100
}

/// Default ceiling for the recent failed-login listing.
const fn default_recent_limit_max() -> usize {
    MAX_RECENT_FAILED_LOGINS
}

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Role names used by the authorization engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolesConfig {
    /// Role assigned to contacts provisioned on first login.
    #[serde(default = "default_role_name")]
    pub default_role: String,
    /// Role that bypasses permission checks and agency scoping.
    #[serde(default = "admin_role_name")]
    pub admin_role: String,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            default_role: default_role_name(),
            admin_role: admin_role_name(),
        }
    }
}

impl RolesConfig {
    /// Validates role names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a role name is empty or the default role
    /// would grant admin bypass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_role.trim().is_empty() {
            return Err(ConfigError::Invalid("roles.default_role must be non-empty".to_string()));
        }
        if self.admin_role.trim().is_empty() {
            return Err(ConfigError::Invalid("roles.admin_role must be non-empty".to_string()));
        }
        if self.default_role == self.admin_role {
            return Err(ConfigError::Invalid(
                "roles.default_role must not be the admin role".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default first-login role.
fn default_role_name() -> String {
    READ_ONLY_ROLE.to_string()
}

/// Returns the default admin role.
fn admin_role_name() -> String {
    ADMIN_ROLE.to_string()
}

// ============================================================================
// SECTION: Path Helpers
// ============================================================================

/// Resolves the config path from explicit input or environment.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the config file path length and components.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates store and mirror paths.
fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid("store path must be non-empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("store path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("store path component too long".to_string()));
        }
    }
    Ok(())
}
