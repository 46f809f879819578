use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::record::{Fault, render};
use crate::store::{CrashLogFile, CrashLogStore};

thread_local! {
    static IN_CAPTURE: Cell<bool> = const { Cell::new(false) };
}

/// Result of a best-effort capture. Never propagated as an error.
#[derive(Debug)]
pub enum CaptureOutcome {
    Written(CrashLogFile),
    /// Nothing to capture into (no session yet, or a capture already running on this thread)
    Skipped,
    Failed(Error),
    /// The capture code itself panicked
    Panicked,
}

impl CaptureOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Renders faults and writes them through the store
#[derive(Debug, Clone)]
pub struct CrashRecorder {
    store: CrashLogStore,
    metadata: Metadata,
}

impl CrashRecorder {
    pub fn new(store: CrashLogStore, metadata: Metadata) -> Self {
        Self { store, metadata }
    }

    pub fn store(&self) -> &CrashLogStore {
        &self.store
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Render and durably write one record stamped with `captured_at`.
    pub fn try_capture_at(
        &self,
        message: &str,
        fault: &Fault,
        extra_stack_trace: Option<&str>,
        captured_at: DateTime<Utc>,
    ) -> Result<CrashLogFile> {
        let captured_at = captured_at.trunc_subsecs(0);
        let text = render(
            message,
            fault,
            extra_stack_trace,
            &self.metadata,
            captured_at,
        );
        self.store.write_sync(captured_at, &text)
    }

    /// Capture now, swallowing every failure.
    ///
    /// Safe to call from a panic hook: it only does blocking file I/O on the
    /// calling thread and takes no locks. A capture triggered while another
    /// capture is running on the same thread is skipped.
    ///
    /// A panic during capture becomes [`CaptureOutcome::Panicked`] only
    /// outside a panic hook. Inside one, std aborts on the nested panic
    /// before `catch_unwind` sees it.
    pub fn capture(
        &self,
        message: &str,
        fault: &Fault,
        extra_stack_trace: Option<&str>,
    ) -> CaptureOutcome {
        if IN_CAPTURE.with(|flag| flag.replace(true)) {
            return CaptureOutcome::Skipped;
        }

        let result = catch_unwind(AssertUnwindSafe(|| {
            self.try_capture_at(message, fault, extra_stack_trace, Utc::now())
        }));

        IN_CAPTURE.with(|flag| flag.set(false));

        match result {
            Ok(Ok(file)) => CaptureOutcome::Written(file),
            Ok(Err(e)) => CaptureOutcome::Failed(e),
            Err(_) => CaptureOutcome::Panicked,
        }
    }
}
