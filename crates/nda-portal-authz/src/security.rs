// crates/nda-portal-authz/src/security.rs
// ============================================================================
// Module: Security Monitoring
// Description: Failed-login accounting over the audit log.
// Purpose: Detect brute-force patterns by IP address and email.
// Dependencies: nda-portal-config, nda-portal-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Failed password and MFA attempts are recorded as audit entries and
//! counted back out of the audit store. Counts look back over a configurable
//! window (24 hours by default). The block decision compares failures within
//! a shorter window against a threshold; both inputs are clamped to at least
//! one so a zero or negative override can never disable the check.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use nda_portal_config::SecurityConfig;
use nda_portal_core::AuditAction;
use nda_portal_core::AuditEntry;
use nda_portal_core::AuditEntryId;
use nda_portal_core::AuditQuery;
use nda_portal_core::AuditRecord;
use nda_portal_core::AuditStore;
use nda_portal_core::Clock;
use nda_portal_core::StoreError;
use nda_portal_core::Timestamp;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::audit::AuditLogger;
use crate::auth::ClientInfo;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Placeholder for detail fields missing from a failure record.
const UNKNOWN: &str = "unknown";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Kind of failed authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedLoginKind {
    /// Password step failed.
    Password,
    /// MFA step failed.
    Mfa,
}

impl FailedLoginKind {
    /// Returns the audit action for the kind.
    #[must_use]
    pub const fn action(self) -> AuditAction {
        match self {
            Self::Password => AuditAction::LoginFailed,
            Self::Mfa => AuditAction::MfaFailed,
        }
    }
}

/// Failed authentication attempt to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLoginAttempt {
    /// Failed step.
    pub kind: FailedLoginKind,
    /// Email the attempt targeted.
    pub email: String,
    /// Failure reason label.
    pub reason: String,
    /// Attempts left before lockout, when known.
    pub attempts_remaining: Option<u32>,
    /// Client facts.
    pub client: ClientInfo,
}

/// Projection of a failed-login audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedLoginSummary {
    /// Audit record id.
    pub id: AuditEntryId,
    /// `login_failed` or `mfa_failed`.
    pub action: AuditAction,
    /// Record time.
    pub timestamp: Timestamp,
    /// Client IP address.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Targeted email, or `unknown`.
    pub email: String,
    /// Failure reason, or `unknown`.
    pub reason: String,
    /// Attempts left before lockout, when recorded.
    pub attempts_remaining: Option<u64>,
}

impl FailedLoginSummary {
    /// Projects an audit record.
    fn from_record(record: AuditRecord) -> Self {
        let detail = |key: &str| {
            record.entry.details.get(key).and_then(Value::as_str).unwrap_or(UNKNOWN).to_string()
        };
        let email = detail("email");
        let reason = detail("reason");
        let attempts_remaining =
            record.entry.details.get("attemptsRemaining").and_then(Value::as_u64);
        Self {
            id: record.id,
            action: record.entry.action,
            timestamp: record.created_at,
            ip_address: record.entry.ip_address,
            user_agent: record.entry.user_agent,
            email,
            reason,
            attempts_remaining,
        }
    }
}

/// Resolved monitoring thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Failures within the window that trigger a block.
    pub failed_login_threshold: u64,
    /// Block window in minutes.
    pub block_window_minutes: u32,
    /// Default lookback for counts in hours.
    pub lookback_hours: u32,
    /// Default number of recent failures listed.
    pub recent_limit: usize,
    /// Upper bound for listed failures.
    pub recent_limit_max: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&SecurityConfig::default())
    }
}

impl MonitorSettings {
    /// Builds settings from the security config section.
    #[must_use]
    pub const fn from_config(config: &SecurityConfig) -> Self {
        Self {
            failed_login_threshold: config.failed_login_threshold,
            block_window_minutes: config.block_window_minutes,
            lookback_hours: config.lookback_hours,
            recent_limit: config.recent_limit,
            recent_limit_max: config.recent_limit_max,
        }
    }
}

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// Failed-login monitor over the audit log.
pub struct SecurityMonitor {
    /// Audit store queried for failures.
    store: Arc<dyn AuditStore>,
    /// Audit writer used to record failures.
    audit: Arc<AuditLogger>,
    /// Clock anchoring lookback windows.
    clock: Arc<dyn Clock>,
    /// Thresholds.
    settings: MonitorSettings,
}

impl SecurityMonitor {
    /// Creates a monitor.
    #[must_use]
    pub fn new(
        store: Arc<dyn AuditStore>,
        audit: Arc<AuditLogger>,
        clock: Arc<dyn Clock>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            settings,
        }
    }

    /// Returns the active thresholds.
    #[must_use]
    pub const fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Counts failures from an IP address since `since` (default lookback).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the audit query fails.
    pub async fn failed_logins_by_ip(
        &self,
        ip_address: &str,
        since: Option<Timestamp>,
    ) -> Result<u64, StoreError> {
        let mut query = self.failure_query(since);
        query.ip_address = Some(ip_address.to_string());
        self.store.count_audit(&query).await
    }

    /// Counts failures targeting an email since `since` (default lookback).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the audit query fails.
    pub async fn failed_logins_by_email(
        &self,
        email: &str,
        since: Option<Timestamp>,
    ) -> Result<u64, StoreError> {
        let mut query = self.failure_query(since);
        query.detail_email = Some(email.to_string());
        self.store.count_audit(&query).await
    }

    /// Lists recent failures, newest first.
    ///
    /// `limit` defaults to the configured value and is clamped to
    /// `1..=recent_limit_max`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the audit query fails.
    pub async fn recent_failed_logins(
        &self,
        limit: Option<i64>,
        since: Option<Timestamp>,
    ) -> Result<Vec<FailedLoginSummary>, StoreError> {
        let max = self.settings.recent_limit_max.max(1);
        let limit = limit
            .map_or(self.settings.recent_limit, |value| {
                usize::try_from(value.max(1)).unwrap_or(max)
            })
            .clamp(1, max);
        let mut query = self.failure_query(since);
        query.limit = Some(limit);
        let records = self.store.list_audit(&query).await?;
        Ok(records.into_iter().map(FailedLoginSummary::from_record).collect())
    }

    /// Returns true when an IP reached the failure threshold within the
    /// block window. Overrides below one are raised to one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the audit query fails.
    pub async fn should_block_ip(
        &self,
        ip_address: &str,
        threshold: Option<i64>,
        window_minutes: Option<i64>,
    ) -> Result<bool, StoreError> {
        let threshold = threshold.map_or(self.settings.failed_login_threshold, |value| {
            u64::try_from(value.max(1)).unwrap_or(u64::MAX)
        });
        let window = window_minutes.map_or(self.settings.block_window_minutes, |value| {
            u32::try_from(value.max(1)).unwrap_or(u32::MAX)
        });
        let since = self.clock.now().minus_minutes(window.max(1));
        let failures = self.failed_logins_by_ip(ip_address, Some(since)).await?;
        Ok(failures >= threshold.max(1))
    }

    /// Records a failed authentication attempt. Returns false when the audit
    /// store rejected the entry.
    pub async fn record_failed_login(&self, attempt: FailedLoginAttempt) -> bool {
        let mut details = serde_json::Map::new();
        details.insert("email".to_string(), json!(attempt.email));
        details.insert("reason".to_string(), json!(attempt.reason));
        if let Some(remaining) = attempt.attempts_remaining {
            details.insert("attemptsRemaining".to_string(), json!(remaining));
        }
        let entry = AuditEntry::new(attempt.kind.action(), "auth")
            .with_client(attempt.client.ip_address, attempt.client.user_agent)
            .with_details(Value::Object(details));
        self.audit.log(entry).await
    }

    /// Builds the failure query for a lookback start.
    fn failure_query(&self, since: Option<Timestamp>) -> AuditQuery {
        let mut query = AuditQuery::for_actions(&AuditAction::LOGIN_FAILURES);
        let lookback_start = || self.clock.now().minus_hours(self.settings.lookback_hours);
        query.since = Some(since.unwrap_or_else(lookback_start));
        query
    }
}
