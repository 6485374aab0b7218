// crates/nda-portal-authz/tests/security_monitoring.rs
// ============================================================================
// Module: Security Monitoring Tests
// Description: Failed-login recording, windowed counts, and block checks.
// ============================================================================
//! ## Overview
//! Failures are written through the audit logger and counted back out by IP
//! and email. Limits and thresholds are clamped so caller input can neither
//! unbound a listing nor disable the block check.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use common::FIXTURE_EPOCH_MS;
use common::Fixture;
use nda_portal_authz::ClientInfo;
use nda_portal_authz::FailedLoginAttempt;
use nda_portal_authz::FailedLoginKind;
use nda_portal_authz::MonitorSettings;
use nda_portal_config::PortalConfig;
use nda_portal_core::AuditAction;
use nda_portal_core::AuditEntry;
use nda_portal_core::Timestamp;

const ATTACKER_IP: &str = "192.0.2.44";

fn attempt(kind: FailedLoginKind, email: &str, ip: &str) -> FailedLoginAttempt {
    FailedLoginAttempt {
        kind,
        email: email.to_string(),
        reason: "invalid_password".to_string(),
        attempts_remaining: Some(4),
        client: ClientInfo {
            ip_address: Some(ip.to_string()),
            user_agent: Some("curl/8.0".to_string()),
        },
    }
}

async fn record_many(fixture: &Fixture, count: usize, email: &str, ip: &str) {
    for _ in 0 .. count {
        let recorded = fixture
            .runtime
            .security()
            .record_failed_login(attempt(FailedLoginKind::Password, email, ip))
            .await;
        assert!(recorded);
    }
}

#[test]
fn default_settings_match_documented_values() {
    let settings = MonitorSettings::default();
    assert_eq!(settings.failed_login_threshold, 10);
    assert_eq!(settings.block_window_minutes, 60);
    assert_eq!(settings.lookback_hours, 24);
    assert_eq!(settings.recent_limit, 100);
    assert_eq!(settings.recent_limit_max, 500);
}

#[tokio::test]
async fn failures_are_counted_by_ip_and_email() {
    let fixture = Fixture::new().await;
    let monitor = fixture.runtime.security();
    record_many(&fixture, 2, "victim@example.gov", ATTACKER_IP).await;
    monitor
        .record_failed_login(attempt(FailedLoginKind::Mfa, "victim@example.gov", "192.0.2.45"))
        .await;
    let success = AuditEntry::new(AuditAction::LoginSuccess, "auth")
        .with_client(Some(ATTACKER_IP.to_string()), None);
    fixture.runtime.audit().log(success).await;

    assert_eq!(monitor.failed_logins_by_ip(ATTACKER_IP, None).await.unwrap(), 2);
    assert_eq!(monitor.failed_logins_by_ip("192.0.2.45", None).await.unwrap(), 1);
    assert_eq!(monitor.failed_logins_by_email("victim@example.gov", None).await.unwrap(), 3);
    assert_eq!(monitor.failed_logins_by_email("other@example.gov", None).await.unwrap(), 0);
}

#[tokio::test]
async fn counts_respect_the_lookback_window() {
    let fixture = Fixture::new().await;
    let monitor = fixture.runtime.security();
    record_many(&fixture, 3, "victim@example.gov", ATTACKER_IP).await;

    fixture.clock.advance_minutes(23 * 60);
    assert_eq!(monitor.failed_logins_by_ip(ATTACKER_IP, None).await.unwrap(), 3);

    fixture.clock.advance_minutes(2 * 60);
    assert_eq!(monitor.failed_logins_by_ip(ATTACKER_IP, None).await.unwrap(), 0);

    let since = Timestamp::from_unix_millis(FIXTURE_EPOCH_MS);
    assert_eq!(monitor.failed_logins_by_ip(ATTACKER_IP, Some(since)).await.unwrap(), 3);
}

#[tokio::test]
async fn block_decision_compares_window_count_to_threshold() {
    let fixture = Fixture::new().await;
    let monitor = fixture.runtime.security();
    record_many(&fixture, 3, "victim@example.gov", ATTACKER_IP).await;

    assert!(monitor.should_block_ip(ATTACKER_IP, Some(3), Some(15)).await.unwrap());
    assert!(!monitor.should_block_ip(ATTACKER_IP, Some(4), Some(15)).await.unwrap());
    assert!(!monitor.should_block_ip(ATTACKER_IP, None, None).await.unwrap());

    record_many(&fixture, 7, "victim@example.gov", ATTACKER_IP).await;
    assert!(monitor.should_block_ip(ATTACKER_IP, None, None).await.unwrap());
    assert!(!monitor.should_block_ip("192.0.2.99", None, None).await.unwrap());
}

#[tokio::test]
async fn block_inputs_are_clamped_to_one() {
    let fixture = Fixture::new().await;
    let monitor = fixture.runtime.security();
    record_many(&fixture, 1, "victim@example.gov", ATTACKER_IP).await;

    assert!(monitor.should_block_ip(ATTACKER_IP, Some(0), Some(5)).await.unwrap());
    assert!(monitor.should_block_ip(ATTACKER_IP, Some(-7), Some(5)).await.unwrap());
    assert!(!monitor.should_block_ip("192.0.2.99", Some(0), Some(5)).await.unwrap());

    fixture.clock.advance_minutes(2);
    assert!(!monitor.should_block_ip(ATTACKER_IP, Some(1), Some(0)).await.unwrap());
    assert!(!monitor.should_block_ip(ATTACKER_IP, Some(1), Some(-30)).await.unwrap());
    assert!(monitor.should_block_ip(ATTACKER_IP, Some(1), Some(3)).await.unwrap());
}

#[tokio::test]
async fn recent_listing_limit_is_clamped() {
    let mut config = PortalConfig::default();
    config.security.recent_limit = 3;
    config.security.recent_limit_max = 4;
    let fixture = Fixture::with_config(config).await;
    let monitor = fixture.runtime.security();
    record_many(&fixture, 6, "victim@example.gov", ATTACKER_IP).await;

    assert_eq!(monitor.recent_failed_logins(None, None).await.unwrap().len(), 3);
    assert_eq!(monitor.recent_failed_logins(Some(100), None).await.unwrap().len(), 4);
    assert_eq!(monitor.recent_failed_logins(Some(0), None).await.unwrap().len(), 1);
    assert_eq!(monitor.recent_failed_logins(Some(-10), None).await.unwrap().len(), 1);
    assert_eq!(monitor.recent_failed_logins(Some(2), None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn recent_listing_projects_details() {
    let fixture = Fixture::new().await;
    let monitor = fixture.runtime.security();
    monitor
        .record_failed_login(attempt(FailedLoginKind::Mfa, "victim@example.gov", ATTACKER_IP))
        .await;
    fixture.clock.advance_minutes(1);
    fixture.runtime.audit().log(AuditEntry::new(AuditAction::LoginFailed, "auth")).await;

    let recent = monitor.recent_failed_logins(None, None).await.unwrap();

    assert_eq!(recent.len(), 2);
    let bare = &recent[0];
    assert_eq!(bare.action, AuditAction::LoginFailed);
    assert_eq!(bare.email, "unknown");
    assert_eq!(bare.reason, "unknown");
    assert_eq!(bare.attempts_remaining, None);
    assert_eq!(bare.ip_address, None);

    let mfa = &recent[1];
    assert_eq!(mfa.action, AuditAction::MfaFailed);
    assert_eq!(mfa.email, "victim@example.gov");
    assert_eq!(mfa.reason, "invalid_password");
    assert_eq!(mfa.attempts_remaining, Some(4));
    assert_eq!(mfa.ip_address.as_deref(), Some(ATTACKER_IP));
    assert_eq!(mfa.user_agent.as_deref(), Some("curl/8.0"));
    assert_eq!(mfa.timestamp, Timestamp::from_unix_millis(FIXTURE_EPOCH_MS));
}

#[tokio::test]
async fn rejected_failure_record_is_reported() {
    let fixture = Fixture::new().await;
    common::InstrumentedStore::fail(&fixture.store.fail_audit);

    let recorded = fixture
        .runtime
        .security()
        .record_failed_login(attempt(FailedLoginKind::Password, "victim@example.gov", ATTACKER_IP))
        .await;

    assert!(!recorded);
    assert_eq!(fixture.runtime.audit().failed_writes(), 1);
}
