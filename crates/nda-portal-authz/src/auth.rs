// crates/nda-portal-authz/src/auth.rs
// ============================================================================
// Module: Authentication Gate
// Description: Bearer-token verification and per-request metadata.
// Purpose: Produce a verified identity or fail closed before any authz work.
// Dependencies: nda-portal-config, nda-portal-core, sha2, thiserror
// ============================================================================

//! ## Overview
//! The authentication gate turns an `Authorization` header into a verified
//! [`Identity`]. Token verification sits behind [`TokenVerifier`] so
//! deployments can plug in their identity provider; [`StaticTokenVerifier`]
//! serves configured tokens and only keeps their SHA-256 fingerprints in
//! memory. [`RequestMeta`] carries the request facts audit entries need.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::net::IpAddr;

use async_trait::async_trait;
use nda_portal_config::AuthConfig;
use nda_portal_core::Identity;
use nda_portal_core::SubjectId;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted `Authorization` header size.
pub const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Request Metadata
// ============================================================================

/// Client facts recorded on audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Client IP address.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
}

/// Per-request metadata used for auth decisions and audit entries.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Peer IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// Raw `X-Forwarded-For` header.
    pub forwarded_for: Option<String>,
    /// Raw `User-Agent` header.
    pub user_agent: Option<String>,
    /// Raw `Authorization` header.
    pub auth_header: Option<String>,
}

impl RequestMeta {
    /// Builds metadata for a request line.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Sets the `Authorization` header.
    #[must_use]
    pub fn with_auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = Some(header.into());
        self
    }

    /// Sets a bearer token as the `Authorization` header.
    #[must_use]
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_auth_header(format!("Bearer {token}"))
    }

    /// Sets the peer address.
    #[must_use]
    pub const fn with_peer_ip(mut self, peer_ip: IpAddr) -> Self {
        self.peer_ip = Some(peer_ip);
        self
    }

    /// Sets the `X-Forwarded-For` header.
    #[must_use]
    pub fn with_forwarded_for(mut self, header: impl Into<String>) -> Self {
        self.forwarded_for = Some(header.into());
        self
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Returns the client IP: the first forwarded hop, else the peer address.
    #[must_use]
    pub fn client_ip(&self) -> Option<String> {
        let forwarded = self
            .forwarded_for
            .as_deref()
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        match forwarded {
            Some(hop) => Some(hop.to_string()),
            None => self.peer_ip.map(|ip| ip.to_string()),
        }
    }

    /// Returns the `METHOD path` label recorded on denials.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Returns the client facts for audit entries.
    #[must_use]
    pub fn client(&self) -> ClientInfo {
        ClientInfo {
            ip_address: self.client_ip(),
            user_agent: self.user_agent.clone(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or invalid credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Bearer token verifier.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies a raw bearer token and returns the identity it proves.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the token is unknown or invalid.
    async fn verify_token(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Verifier backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    /// Identities keyed by token fingerprint.
    identities: BTreeMap<String, Identity>,
}

impl StaticTokenVerifier {
    /// Builds a verifier from `(token, identity)` pairs.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (String, Identity)>) -> Self {
        let identities = entries
            .into_iter()
            .map(|(token, identity)| (token_fingerprint(&token), identity))
            .collect();
        Self {
            identities,
        }
    }

    /// Builds a verifier from the auth config section.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.tokens.iter().map(|entry| {
            (
                entry.token.clone(),
                Identity {
                    subject_id: SubjectId::new(entry.subject.clone()),
                    email: entry.email.clone(),
                },
            )
        }))
    }

    /// Returns the number of configured tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Returns true when no tokens are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        self.identities
            .get(&token_fingerprint(token))
            .cloned()
            .ok_or_else(|| AuthError::Unauthenticated("invalid bearer token".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the token from a `Bearer` authorization header.
///
/// # Errors
///
/// Returns [`AuthError`] when the header is missing, oversized, or malformed.
pub fn parse_bearer_token(auth_header: Option<&str>) -> Result<String, AuthError> {
    let header = auth_header
        .ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token.to_string())
}

/// Returns the lowercase hex SHA-256 fingerprint of a token.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
