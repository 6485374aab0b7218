// crates/nda-portal-authz/src/audit.rs
// ============================================================================
// Module: Audit Logging
// Description: Best-effort audit writer with optional JSON-lines mirrors.
// Purpose: Persist audit records without ever failing the calling operation.
// Dependencies: nda-portal-core, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`AuditLogger`] stamps each [`AuditEntry`] with an id and timestamp and
//! appends it to the audit store. Write failures are reported through
//! `tracing` and a failure counter; they never propagate to the caller.
//! Every record is also handed to an [`AuditMirror`], which can emit it as a
//! JSON line to stderr or to an append-only file. Mirror failures are logged
//! and counted separately and do not block the store write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use nda_portal_core::AuditEntry;
use nda_portal_core::AuditEntryId;
use nda_portal_core::AuditRecord;
use nda_portal_core::AuditStore;
use nda_portal_core::Clock;
use thiserror::Error;

// ============================================================================
// SECTION: Mirrors
// ============================================================================

/// Failure to mirror an audit record.
#[derive(Debug, Error)]
pub enum AuditMirrorError {
    /// Record could not be encoded.
    #[error("audit mirror encode failed: {0}")]
    Encode(String),
    /// Sink write failed.
    #[error("audit mirror write failed: {0}")]
    Io(String),
    /// File lock was poisoned by a panicking writer.
    #[error("audit mirror lock poisoned")]
    Poisoned,
}

/// Secondary sink receiving every audit record.
pub trait AuditMirror: Send + Sync {
    /// Records an audit record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditMirrorError`] when the record could not be written.
    fn record(&self, record: &AuditRecord) -> Result<(), AuditMirrorError>;
}

/// Encodes a record as one JSON line.
fn encode(record: &AuditRecord) -> Result<String, AuditMirrorError> {
    serde_json::to_string(record).map_err(|err| AuditMirrorError::Encode(err.to_string()))
}

/// Mirror that writes JSON lines to stderr.
pub struct StderrAuditMirror;

impl AuditMirror for StderrAuditMirror {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditMirrorError> {
        let payload = encode(record)?;
        writeln!(std::io::stderr(), "{payload}")
            .map_err(|err| AuditMirrorError::Io(err.to_string()))
    }
}

/// Mirror that appends JSON lines to a file.
pub struct FileAuditMirror {
    /// File handle guarded for concurrent writes.
    file: Mutex<std::fs::File>,
}

impl FileAuditMirror {
    /// Opens a file-backed audit mirror.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] when the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditMirror for FileAuditMirror {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditMirrorError> {
        let payload = encode(record)?;
        let mut file = self.file.lock().map_err(|_| AuditMirrorError::Poisoned)?;
        writeln!(file, "{payload}")
            .and_then(|()| file.flush())
            .map_err(|err| AuditMirrorError::Io(err.to_string()))
    }
}

/// Mirror that drops every record.
pub struct NoopAuditMirror;

impl AuditMirror for NoopAuditMirror {
    fn record(&self, _record: &AuditRecord) -> Result<(), AuditMirrorError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Logger
// ============================================================================

/// Best-effort audit writer.
pub struct AuditLogger {
    /// Durable audit store.
    store: Arc<dyn AuditStore>,
    /// Secondary sink.
    mirror: Arc<dyn AuditMirror>,
    /// Clock stamping records.
    clock: Arc<dyn Clock>,
    /// Number of records the store rejected.
    failed_writes: AtomicU64,
    /// Number of records the mirror failed to write.
    mirror_failures: AtomicU64,
}

impl AuditLogger {
    /// Creates a logger without a mirror.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            mirror: Arc::new(NoopAuditMirror),
            clock,
            failed_writes: AtomicU64::new(0),
            mirror_failures: AtomicU64::new(0),
        }
    }

    /// Replaces the mirror.
    #[must_use]
    pub fn with_mirror(mut self, mirror: Arc<dyn AuditMirror>) -> Self {
        self.mirror = mirror;
        self
    }

    /// Appends an audit entry. Returns false when the store rejected it.
    pub async fn log(&self, entry: AuditEntry) -> bool {
        let record = AuditRecord {
            id: AuditEntryId::generate(),
            created_at: self.clock.now(),
            entry,
        };
        if let Err(err) = self.mirror.record(&record) {
            self.mirror_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                target = "nda_portal::audit",
                error = %err,
                action = record.entry.action.as_str(),
                "failed to mirror audit record"
            );
        }
        match self.store.append_audit(&record).await {
            Ok(()) => true,
            Err(err) => {
                self.failed_writes.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    target = "nda_portal::audit",
                    error = %err,
                    action = record.entry.action.as_str(),
                    entity_type = %record.entry.entity_type,
                    "failed to write audit record"
                );
                false
            }
        }
    }

    /// Returns the number of audit writes the store rejected.
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    /// Returns the number of records the mirror failed to write.
    #[must_use]
    pub fn mirror_failures(&self) -> u64 {
        self.mirror_failures.load(Ordering::Relaxed)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
