//! Upload and reconciliation
//!
//! Each startup, every pending record is resolved once:
//!
//! - older than the keep age: deleted without an upload attempt
//! - uploaded and answered with `201 Created`: deleted
//! - anything else: left in place for the next pass
//!
//! When consent is refused the whole batch is deleted instead.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::consent::{ConsentGate, ConsentPrompt};
use crate::consts::{DEFAULT_COLLECTOR_URL, DEFAULT_KEEP_AGE, SDK_NAME, SDK_VERSION};
use crate::error::{Error, TransportError};
use crate::record::panic_payload_message;
use crate::store::{CrashLogFile, CrashLogStore};
use crate::transport::{FormRequest, Transport};

const HTTP_CREATED: u16 = 201;

/// Form body for one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    pub raw: String,
    pub sdk: String,
    pub sdk_version: String,
    pub user_id: Option<String>,
}

impl UploadPayload {
    pub fn new(raw: String, user_id: Option<String>) -> Self {
        Self {
            raw,
            sdk: SDK_NAME.to_string(),
            sdk_version: SDK_VERSION.to_string(),
            user_id,
        }
    }

    pub fn into_fields(self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("raw", self.raw),
            ("sdk", self.sdk),
            ("sdk_version", self.sdk_version),
        ];
        if let Some(user_id) = self.user_id {
            fields.push(("userID", user_id));
        }
        fields
    }
}

/// How one pending record was resolved
#[derive(Debug)]
pub enum Disposition {
    Sent,
    Expired,
    Deferred(TransportError),
    Declined,
    /// Local store failure; the record stays for the next pass
    Failed(Error),
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Expired => "expired",
            Self::Deferred(_) => "deferred",
            Self::Declined => "declined",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub outcomes: Vec<(CrashLogFile, Disposition)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    pub sent: usize,
    pub expired: usize,
    pub deferred: usize,
    pub declined: usize,
    pub failed: usize,
}

impl ReconcileReport {
    pub fn counts(&self) -> ReconcileCounts {
        let mut counts = ReconcileCounts::default();
        for (_, disposition) in &self.outcomes {
            match disposition {
                Disposition::Sent => counts.sent += 1,
                Disposition::Expired => counts.expired += 1,
                Disposition::Deferred(_) => counts.deferred += 1,
                Disposition::Declined => counts.declined += 1,
                Disposition::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

pub struct UploadManager {
    transport: Box<dyn Transport>,
    collector_url: String,
    identifier: String,
    keep_age: Duration,
}

impl UploadManager {
    pub fn new(transport: Box<dyn Transport>, identifier: impl Into<String>) -> Self {
        Self {
            transport,
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            identifier: identifier.into(),
            keep_age: DEFAULT_KEEP_AGE,
        }
    }

    pub fn with_collector_url(mut self, url: impl Into<String>) -> Self {
        self.collector_url = url.into();
        self
    }

    pub fn with_keep_age(mut self, keep_age: Duration) -> Self {
        self.keep_age = keep_age;
        self
    }

    pub fn keep_age(&self) -> Duration {
        self.keep_age
    }

    /// `<collector>/<identifier>/crashes`
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}/crashes",
            self.collector_url.trim_end_matches('/'),
            self.identifier
        )
    }

    /// Strictly older than the keep age
    pub fn is_expired(&self, file: &CrashLogFile, now: DateTime<Utc>) -> bool {
        let keep_age = TimeDelta::from_std(self.keep_age).unwrap_or(TimeDelta::MAX);
        file.age(now) > keep_age
    }

    /// Resolve one record: expire it, or make exactly one upload attempt.
    pub fn process(
        &self,
        store: &CrashLogStore,
        file: &CrashLogFile,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Disposition {
        if self.is_expired(file, now) {
            tracing::debug!(file = file.file_name(), "crash log expired");
            return match store.delete(file) {
                Ok(()) => Disposition::Expired,
                Err(e) => Disposition::Failed(e),
            };
        }

        let raw = match store.read_text(file) {
            Ok(raw) => raw,
            Err(e) => return Disposition::Failed(e),
        };
        let request = FormRequest {
            url: self.endpoint(),
            user_agent: format!("{SDK_NAME}/{SDK_VERSION}"),
            fields: UploadPayload::new(raw, user_id.map(str::to_string)).into_fields(),
        };

        let result = self.post(&request).and_then(|status| {
            if status == HTTP_CREATED {
                Ok(())
            } else {
                Err(TransportError::Status(status))
            }
        });

        match result {
            Ok(()) => match store.delete(file) {
                Ok(()) => Disposition::Sent,
                // Uploaded but still on disk: it will be sent again next time
                Err(e) => Disposition::Failed(e),
            },
            Err(e) => {
                tracing::warn!(file = file.file_name(), error = %e, "crash log upload deferred");
                Disposition::Deferred(e)
            }
        }
    }

    /// A transport that panics is treated like one that could not connect.
    fn post(&self, request: &FormRequest) -> Result<u16, TransportError> {
        catch_unwind(AssertUnwindSafe(|| self.transport.post_form(request))).unwrap_or_else(
            |payload| {
                Err(TransportError::Unreachable(format!(
                    "transport panicked: {}",
                    panic_payload_message(payload.as_ref())
                )))
            },
        )
    }

    /// Resolve a batch in enumeration order, after consent was decided.
    pub fn reconcile(
        &self,
        store: &CrashLogStore,
        files: &[CrashLogFile],
        consent: bool,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let outcomes = files
            .iter()
            .map(|file| {
                let disposition = if consent {
                    self.process(store, file, user_id, now)
                } else {
                    match store.delete(file) {
                        Ok(()) => Disposition::Declined,
                        Err(e) => Disposition::Failed(e),
                    }
                };
                if let Disposition::Failed(e) = &disposition {
                    tracing::warn!(file = file.file_name(), error = %e, "crash log left in place");
                }
                (file.clone(), disposition)
            })
            .collect();
        ReconcileReport { outcomes }
    }
}

/// One full pass: enumerate, ask for consent, resolve every record.
///
/// Never fails; an unreadable store is treated as empty.
pub fn run_pass(
    store: &CrashLogStore,
    manager: &UploadManager,
    prompt: &dyn ConsentPrompt,
    ask_before_sending: bool,
    user_id: Option<&str>,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let files = match store.enumerate() {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(error = %e, "cannot list pending crash logs");
            return ReconcileReport::default();
        }
    };

    let consent = ConsentGate::decide(files.len(), ask_before_sending, prompt);
    let report = manager.reconcile(store, &files, consent, user_id, now);
    tracing::debug!(counts = ?report.counts(), "crash log reconciliation finished");
    report
}
