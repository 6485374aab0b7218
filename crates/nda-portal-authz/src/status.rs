// crates/nda-portal-authz/src/status.rs
// ============================================================================
// Module: Status Transition Engine
// Description: Validated NDA status changes with history and audit.
// Purpose: Enforce the lifecycle matrix and fire event-driven transitions.
// Dependencies: nda-portal-core, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`StatusTransitionEngine::transition_status`] validates a requested
//! change against the lifecycle matrix and commits it through the store's
//! compare-and-set, which writes the new status and the history row in one
//! step. Auto-transitions map domain events (email sent, document uploaded)
//! to target statuses and fire only from their listed source statuses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use nda_portal_core::AuditAction;
use nda_portal_core::AuditEntry;
use nda_portal_core::Clock;
use nda_portal_core::NdaId;
use nda_portal_core::NdaRecord;
use nda_portal_core::NdaStatus;
use nda_portal_core::NdaStore;
use nda_portal_core::ScopeFilter;
use nda_portal_core::StatusChange;
use nda_portal_core::StatusTrigger;
use nda_portal_core::StoreError;
use nda_portal_core::Timestamp;
use nda_portal_core::UserContext;
use nda_portal_core::is_valid_transition;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::audit::AuditLogger;
use crate::auth::ClientInfo;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Status transition failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusTransitionError {
    /// The NDA does not exist.
    #[error("NDA not found")]
    NdaNotFound,
    /// The NDA already holds the requested status.
    #[error("NDA is already in {0} status")]
    AlreadyInStatus(NdaStatus),
    /// The lifecycle matrix forbids the change.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: NdaStatus,
        /// Requested status.
        to: NdaStatus,
    },
    /// Another writer changed the status first.
    #[error("NDA status changed concurrently")]
    Conflict,
    /// Storage failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StatusTransitionError {
    /// Returns the stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NdaNotFound => "NDA_NOT_FOUND",
            Self::AlreadyInStatus(_) => "ALREADY_IN_STATUS",
            Self::InvalidTransition {
                ..
            } => "INVALID_TRANSITION",
            Self::Conflict => "STATUS_CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for the error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::NdaNotFound => 404,
            Self::AlreadyInStatus(_)
            | Self::InvalidTransition {
                ..
            } => 400,
            Self::Conflict => 409,
            Self::Internal(_) => 500,
        }
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Committed status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResult {
    /// NDA identifier.
    pub nda_id: NdaId,
    /// Human-facing sequence number.
    pub display_id: u64,
    /// Status before the change.
    pub previous_status: NdaStatus,
    /// Status after the change.
    pub new_status: NdaStatus,
    /// Event that caused the change.
    pub trigger: StatusTrigger,
    /// Commit time.
    pub timestamp: Timestamp,
}

/// Outcome of an event-driven transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoTransitionOutcome {
    /// The rule fired and the change was committed.
    Transitioned(TransitionResult),
    /// No rule is registered for the trigger.
    NoRuleForTrigger,
    /// The record's current status is not a source of the rule.
    StatusNotEligible(NdaStatus),
    /// The record does not exist.
    RecordMissing,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Applies validated status changes.
pub struct StatusTransitionEngine {
    /// NDA store.
    ndas: Arc<dyn NdaStore>,
    /// Audit writer.
    audit: Arc<AuditLogger>,
    /// Clock stamping changes.
    clock: Arc<dyn Clock>,
}

impl StatusTransitionEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(ndas: Arc<dyn NdaStore>, audit: Arc<AuditLogger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ndas,
            audit,
            clock,
        }
    }

    /// Moves an NDA to `new_status`.
    ///
    /// # Errors
    ///
    /// Returns [`StatusTransitionError`] when the record is missing, already
    /// in the status, the change is not allowed, or the commit fails.
    pub async fn transition_status(
        &self,
        nda_id: &NdaId,
        new_status: NdaStatus,
        trigger: StatusTrigger,
        actor: Option<&UserContext>,
        client: &ClientInfo,
    ) -> Result<TransitionResult, StatusTransitionError> {
        let record = self.load(nda_id).await?.ok_or(StatusTransitionError::NdaNotFound)?;
        self.commit(record, new_status, trigger, actor, client).await
    }

    /// Fires the auto-transition registered for `trigger`, if it applies.
    ///
    /// # Errors
    ///
    /// Returns [`StatusTransitionError`] when the lookup or commit fails.
    pub async fn attempt_auto_transition(
        &self,
        nda_id: &NdaId,
        trigger: StatusTrigger,
        actor: Option<&UserContext>,
        client: &ClientInfo,
    ) -> Result<AutoTransitionOutcome, StatusTransitionError> {
        let Some(rule) = trigger.auto_rule() else {
            return Ok(AutoTransitionOutcome::NoRuleForTrigger);
        };
        let Some(record) = self.load(nda_id).await? else {
            return Ok(AutoTransitionOutcome::RecordMissing);
        };
        if !rule.applies_to(record.status) {
            return Ok(AutoTransitionOutcome::StatusNotEligible(record.status));
        }
        let result = self.commit(record, rule.to, trigger, actor, client).await?;
        Ok(AutoTransitionOutcome::Transitioned(result))
    }

    /// Loads a record without scope restriction.
    async fn load(&self, nda_id: &NdaId) -> Result<Option<NdaRecord>, StatusTransitionError> {
        self.ndas
            .find_nda(nda_id, &ScopeFilter::Unrestricted)
            .await
            .map_err(|err| StatusTransitionError::Internal(err.to_string()))
    }

    /// Validates and commits a change from the record's current status.
    async fn commit(
        &self,
        record: NdaRecord,
        new_status: NdaStatus,
        trigger: StatusTrigger,
        actor: Option<&UserContext>,
        client: &ClientInfo,
    ) -> Result<TransitionResult, StatusTransitionError> {
        let previous_status = record.status;
        if previous_status == new_status {
            return Err(StatusTransitionError::AlreadyInStatus(new_status));
        }
        if !is_valid_transition(previous_status, new_status) {
            return Err(StatusTransitionError::InvalidTransition {
                from: previous_status,
                to: new_status,
            });
        }
        let now = self.clock.now();
        let change = StatusChange {
            nda_id: record.id.clone(),
            expected_status: previous_status,
            new_status,
            changed_by: actor.map(|user| user.contact_id.clone()),
            changed_at: now,
            fully_executed_at: (new_status == NdaStatus::FullyExecuted).then_some(now),
        };
        self.ndas.commit_status_change(&change).await.map_err(|err| match err {
            StoreError::NotFound(_) => StatusTransitionError::NdaNotFound,
            StoreError::Conflict(_) => StatusTransitionError::Conflict,
            other => StatusTransitionError::Internal(other.to_string()),
        })?;
        tracing::info!(
            target = "nda_portal::status",
            nda_id = %record.id,
            from = previous_status.as_str(),
            to = new_status.as_str(),
            trigger = trigger.as_str(),
            "nda status changed"
        );
        let mut entry = AuditEntry::new(AuditAction::NdaStatusChanged, "nda")
            .with_entity_id(record.id.as_str())
            .with_client(client.ip_address.clone(), client.user_agent.clone())
            .with_details(json!({
                "displayId": record.display_id,
                "previousStatus": previous_status.as_str(),
                "newStatus": new_status.as_str(),
                "trigger": trigger.as_str(),
            }));
        if let Some(user) = actor {
            entry = entry.with_user(user.contact_id.clone());
        }
        self.audit.log(entry).await;
        Ok(TransitionResult {
            nda_id: record.id,
            display_id: record.display_id,
            previous_status,
            new_status,
            trigger,
            timestamp: now,
        })
    }
}
