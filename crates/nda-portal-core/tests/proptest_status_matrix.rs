// crates/nda-portal-core/tests/proptest_status_matrix.rs
// ============================================================================
// Module: Status Matrix Property-Based Tests
// Description: Property tests for the NDA status transition matrix.
// Purpose: Check matrix consistency across every status and trigger pairing.
// ============================================================================

//! Property-based tests for status transition invariants.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use nda_portal_core::NdaStatus;
use nda_portal_core::StatusTrigger;
use nda_portal_core::auto_transition_target;
use nda_portal_core::is_terminal_status;
use nda_portal_core::is_valid_transition;
use nda_portal_core::valid_transitions_from;
use proptest::prelude::*;

fn status_strategy() -> impl Strategy<Value = NdaStatus> {
    prop::sample::select(NdaStatus::ALL.to_vec())
}

fn trigger_strategy() -> impl Strategy<Value = StatusTrigger> {
    prop::sample::select(vec![
        StatusTrigger::EmailSent,
        StatusTrigger::DocumentUploaded,
        StatusTrigger::FullyExecutedUpload,
        StatusTrigger::ManualChange,
        StatusTrigger::SystemAuto,
    ])
}

proptest! {
    #[test]
    fn validity_matches_listed_targets(from in status_strategy(), to in status_strategy()) {
        let listed = valid_transitions_from(from).contains(&to);
        prop_assert_eq!(is_valid_transition(from, to), listed);
        prop_assert!(!is_valid_transition(from, from));
    }

    #[test]
    fn terminal_statuses_have_no_exits(status in status_strategy()) {
        prop_assert_eq!(is_terminal_status(status), valid_transitions_from(status).is_empty());
    }

    #[test]
    fn auto_targets_are_valid_transitions(
        status in status_strategy(),
        trigger in trigger_strategy(),
    ) {
        if let Some(target) = auto_transition_target(status, trigger) {
            prop_assert!(is_valid_transition(status, target));
            prop_assert!(!matches!(trigger, StatusTrigger::ManualChange));
        }
    }

    #[test]
    fn labels_round_trip(status in status_strategy()) {
        prop_assert_eq!(NdaStatus::parse(status.as_str()), Some(status));
    }
}
