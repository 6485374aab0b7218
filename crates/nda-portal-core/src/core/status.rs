// crates/nda-portal-core/src/core/status.rs
// ============================================================================
// Module: NDA Status Matrix
// Description: Lifecycle statuses, transition matrix, and auto-transition rules.
// Purpose: Provide pure transition validation for the status engine.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The NDA lifecycle is a fixed directed graph over [`NdaStatus`]. Cancelled
//! has no outgoing edges and no status has a self-loop. Auto-transition rules
//! map a domain trigger to a target status reachable from a fixed set of
//! source statuses.
//!
//! ```text
//! Created -> Emailed | Inactive | Cancelled
//! Emailed -> InRevision | FullyExecuted | Inactive | Cancelled
//! InRevision -> Emailed | FullyExecuted | Inactive | Cancelled
//! FullyExecuted -> Inactive
//! Inactive -> Created | Emailed | InRevision | FullyExecuted
//! Cancelled -> (terminal)
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Status
// ============================================================================

/// NDA lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NdaStatus {
    /// Drafted, not yet sent.
    Created,
    /// Sent to the counterparty.
    Emailed,
    /// Counterparty returned edits.
    InRevision,
    /// Signed by all parties.
    FullyExecuted,
    /// Parked; may be revived.
    Inactive,
    /// Abandoned permanently.
    Cancelled,
}

impl NdaStatus {
    /// Every status in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::Emailed,
        Self::InRevision,
        Self::FullyExecuted,
        Self::Inactive,
        Self::Cancelled,
    ];

    /// Returns the canonical status label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Emailed => "EMAILED",
            Self::InRevision => "IN_REVISION",
            Self::FullyExecuted => "FULLY_EXECUTED",
            Self::Inactive => "INACTIVE",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a canonical status label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == label)
    }

    /// Returns the statuses reachable in one step.
    #[must_use]
    pub const fn valid_targets(self) -> &'static [Self] {
        match self {
            Self::Created => &[Self::Emailed, Self::Inactive, Self::Cancelled],
            Self::Emailed => {
                &[Self::InRevision, Self::FullyExecuted, Self::Inactive, Self::Cancelled]
            }
            Self::InRevision => {
                &[Self::Emailed, Self::FullyExecuted, Self::Inactive, Self::Cancelled]
            }
            Self::FullyExecuted => &[Self::Inactive],
            Self::Inactive => {
                &[Self::Created, Self::Emailed, Self::InRevision, Self::FullyExecuted]
            }
            Self::Cancelled => &[],
        }
    }

    /// Returns true when the status has no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.valid_targets().is_empty()
    }
}

impl fmt::Display for NdaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true when the matrix allows `from -> to`.
#[must_use]
pub fn is_valid_transition(from: NdaStatus, to: NdaStatus) -> bool {
    from.valid_targets().contains(&to)
}

/// Returns the statuses reachable from `status` in one step.
#[must_use]
pub fn valid_transitions_from(status: NdaStatus) -> Vec<NdaStatus> {
    status.valid_targets().to_vec()
}

/// Returns true when `status` has no outgoing transitions.
#[must_use]
pub const fn is_terminal_status(status: NdaStatus) -> bool {
    status.is_terminal()
}

// ============================================================================
// SECTION: Triggers
// ============================================================================

/// Domain event that caused a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTrigger {
    /// An NDA email was sent.
    EmailSent,
    /// A revised document was uploaded.
    DocumentUploaded,
    /// A fully executed document was uploaded.
    FullyExecutedUpload,
    /// A user changed the status directly.
    ManualChange,
    /// A scheduled job changed the status.
    SystemAuto,
}

impl StatusTrigger {
    /// Returns the canonical trigger label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmailSent => "email_sent",
            Self::DocumentUploaded => "document_uploaded",
            Self::FullyExecutedUpload => "fully_executed_upload",
            Self::ManualChange => "manual_change",
            Self::SystemAuto => "system_auto",
        }
    }

    /// Returns the auto-transition rule registered for the trigger, if any.
    #[must_use]
    pub const fn auto_rule(self) -> Option<AutoTransitionRule> {
        match self {
            Self::EmailSent => Some(AutoTransitionRule {
                from: &[NdaStatus::Created],
                to: NdaStatus::Emailed,
            }),
            Self::DocumentUploaded => Some(AutoTransitionRule {
                from: &[NdaStatus::Emailed],
                to: NdaStatus::InRevision,
            }),
            Self::FullyExecutedUpload => Some(AutoTransitionRule {
                from: &[NdaStatus::Created, NdaStatus::Emailed, NdaStatus::InRevision],
                to: NdaStatus::FullyExecuted,
            }),
            Self::ManualChange | Self::SystemAuto => None,
        }
    }
}

impl fmt::Display for StatusTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Auto-transition rule: statuses the rule fires from and its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoTransitionRule {
    /// Source statuses that fire the rule.
    pub from: &'static [NdaStatus],
    /// Target status.
    pub to: NdaStatus,
}

impl AutoTransitionRule {
    /// Returns true when the rule fires from `status`.
    ///
    /// A listed source whose edge to the target is absent from the matrix
    /// never fires, so auto-transitions cannot produce an invalid change.
    #[must_use]
    pub fn applies_to(&self, status: NdaStatus) -> bool {
        self.from.contains(&status) && is_valid_transition(status, self.to)
    }
}

/// Returns the auto-transition target for `status` under `trigger`, if any.
#[must_use]
pub fn auto_transition_target(status: NdaStatus, trigger: StatusTrigger) -> Option<NdaStatus> {
    trigger.auto_rule().filter(|rule| rule.applies_to(status)).map(|rule| rule.to)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
