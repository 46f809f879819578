//! Crash capture and delivery for desktop applications
//!
//! Faults raised during a run (panics, failed background work) are written
//! to disk immediately as plain-text crash records. On the next start,
//! [`initialize`] finds those records, optionally asks the user for consent,
//! and uploads each one to the collector. Records that fail to upload stay
//! for the next start until they exceed the keep age (two days by default).
//!
//! ```rust,no_run
//! use crashreport::{Host, SessionOptions, StaticMetadata};
//!
//! let metadata = StaticMetadata::new("com.example.notes", env!("CARGO_PKG_VERSION"));
//! let prompt = |title: &str, message: &str| {
//!     eprintln!("{title}: {message} [y/N]");
//!     let mut answer = String::new();
//!     std::io::stdin().read_line(&mut answer).is_ok() && answer.trim() == "y"
//! };
//! let previous = crashreport::initialize(
//!     SessionOptions::new("0123456789abcdef"),
//!     Host::new(metadata, prompt),
//! )?;
//! for raw in previous {
//!     eprintln!("recovered crash report:\n{raw}");
//! }
//! # Ok::<(), crashreport::Error>(())
//! ```

pub mod consent;
pub mod consts;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod observer;
pub mod record;
pub mod recorder;
pub mod session;
pub mod store;
pub mod transport;
pub mod upload;

pub use consent::{AlwaysSend, ConsentGate, ConsentPrompt};
pub use error::{Error, Result, TransportError};
pub use metadata::{
    AppInfo, AppVersion, DeviceInfo, Metadata, MetadataProvider, StaticMetadata,
};
pub use observer::{
    ExceptionObserver, FaultChannel, FaultEvent, PanicChannel, TaskFaultChannel,
};
pub use record::{Fault, ParsedRecord, render};
pub use recorder::{CaptureOutcome, CrashRecorder};
pub use session::{
    Host, Initialized, Session, SessionOptions, SessionSlot, initialize, save_exception, session,
    set_user_id, unsent_raw_crash_logs, user_id,
};
pub use store::{CrashLogFile, CrashLogStore};
pub use transport::{FormRequest, Transport, UreqTransport};
pub use upload::{
    Disposition, ReconcileCounts, ReconcileReport, UploadManager, UploadPayload, run_pass,
};
