//! Fault channels and the observer that turns their events into crash records
//!
//! A [`FaultChannel`] delivers `(message, fault)` events from somewhere in
//! the host: [`PanicChannel`] hooks `std::panic`, [`TaskFaultChannel`]
//! collects failures from detached background work. [`ExceptionObserver`]
//! subscribes once per channel and writes each event through the
//! [`CrashRecorder`]. Nothing raised while capturing leaves the observer.

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;

use crate::record::Fault;
use crate::recorder::{CaptureOutcome, CrashRecorder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultEvent {
    pub message: String,
    pub fault: Fault,
    pub extra_stack_trace: Option<String>,
}

impl FaultEvent {
    pub fn new(message: impl Into<String>, fault: Fault) -> Self {
        Self {
            message: message.into(),
            fault,
            extra_stack_trace: None,
        }
    }
}

pub type FaultHandler = Arc<dyn Fn(&FaultEvent) + Send + Sync>;

/// A process-wide source of fault notifications
pub trait FaultChannel: Send + Sync {
    fn name(&self) -> &'static str;

    fn subscribe(&self, handler: FaultHandler);
}

/// Unhandled panics on any thread, via `std::panic::set_hook`.
///
/// The previously installed hook still runs after capture, so the default
/// stderr report is kept. Capture here runs inside the hook: if it panics in
/// turn, std aborts the process, so `catch_unwind` cannot recover it the way
/// it does for [`TaskFaultChannel`].
#[derive(Debug, Clone)]
pub struct PanicChannel {
    capture_backtrace: bool,
}

impl PanicChannel {
    pub fn new() -> Self {
        Self {
            capture_backtrace: true,
        }
    }

    pub fn without_backtrace() -> Self {
        Self {
            capture_backtrace: false,
        }
    }
}

impl Default for PanicChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultChannel for PanicChannel {
    fn name(&self) -> &'static str {
        "panic"
    }

    fn subscribe(&self, handler: FaultHandler) {
        let capture_backtrace = self.capture_backtrace;
        let previous = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            // Capture early, before the handler allocates
            let bt = capture_backtrace.then(Backtrace::force_capture);
            let fault = Fault::from_panic(info, bt.as_ref());
            let thread = std::thread::current();
            let message = format!(
                "Unhandled panic on thread '{}'",
                thread.name().unwrap_or("<unnamed>")
            );
            handler(&FaultEvent::new(message, fault));
            previous(info);
        }));
    }
}

/// Failures from detached background work that nobody joined on.
///
/// Clone it into workers and call [`report`](Self::report), or let
/// [`spawn`](Self::spawn) run the work and report an `Err` it returns.
#[derive(Clone, Default)]
pub struct TaskFaultChannel {
    handlers: Arc<RwLock<Vec<FaultHandler>>>,
}

impl TaskFaultChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, message: impl Into<String>, fault: Fault) {
        self.deliver(&FaultEvent::new(message, fault));
    }

    pub fn report_error<E: StdError + ?Sized>(&self, err: &E) {
        self.report(
            "Unobserved failure in background task",
            Fault::from_error(err),
        );
    }

    pub fn deliver(&self, event: &FaultEvent) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler(event);
        }
    }

    /// Run `work` on a named thread and report its error, if any.
    pub fn spawn<F, E>(&self, name: impl Into<String>, work: F) -> std::io::Result<JoinHandle<()>>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: StdError + Send + 'static,
    {
        let name = name.into();
        let channel = self.clone();
        std::thread::Builder::new().name(name.clone()).spawn(move || {
            if let Err(e) = work() {
                channel.report(
                    format!("Unobserved failure in background task '{name}'"),
                    Fault::from_error(&e),
                );
            }
        })
    }
}

impl FaultChannel for TaskFaultChannel {
    fn name(&self) -> &'static str {
        "task"
    }

    fn subscribe(&self, handler: FaultHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }
}

/// Bridges fault channels to the recorder
#[derive(Debug)]
pub struct ExceptionObserver {
    recorder: Arc<CrashRecorder>,
    written: AtomicUsize,
    dropped: AtomicUsize,
}

impl ExceptionObserver {
    pub fn new(recorder: Arc<CrashRecorder>) -> Arc<Self> {
        Arc::new(Self {
            recorder,
            written: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        })
    }

    pub fn attach(self: &Arc<Self>, channel: &dyn FaultChannel) {
        let observer = Arc::clone(self);
        channel.subscribe(Arc::new(move |event: &FaultEvent| {
            // Outcome is counted, never returned to the channel
            let _ = observer.handle(event);
        }));
    }

    pub fn handle(&self, event: &FaultEvent) -> CaptureOutcome {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.recorder.capture(
                &event.message,
                &event.fault,
                event.extra_stack_trace.as_deref(),
            )
        }))
        .unwrap_or(CaptureOutcome::Panicked);

        if outcome.is_written() {
            self.written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    /// Records written since the observer was created
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    /// Events that produced no record
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}
