//! Session lifecycle
//!
//! A [`Session`] is created once per [`SessionSlot`]. Creating it wires the
//! fault channels to the store and runs the first reconciliation pass. The
//! process-wide slot behind [`initialize`] and friends enforces the
//! one-session-per-process rule; a private slot gives tests their own.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::consent::ConsentPrompt;
use crate::consts::{DEFAULT_COLLECTOR_URL, DEFAULT_KEEP_AGE};
use crate::error::{Error, Result};
use crate::metadata::{Metadata, MetadataProvider};
use crate::observer::{ExceptionObserver, FaultChannel, PanicChannel};
use crate::record::Fault;
use crate::recorder::{CaptureOutcome, CrashRecorder};
use crate::store::CrashLogStore;
use crate::transport::{Transport, UreqTransport};
use crate::upload::{ReconcileReport, UploadManager, run_pass};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Collector-side identifier of the application
    pub identifier: String,
    pub ask_before_sending: bool,
    /// Defaults to [`CrashLogStore::default_dir`] for the package name
    pub storage_dir: Option<PathBuf>,
    pub collector_url: String,
    pub keep_age: Duration,
    pub user_id: Option<String>,
}

impl SessionOptions {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ask_before_sending: true,
            storage_dir: None,
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            keep_age: DEFAULT_KEEP_AGE,
            user_id: None,
        }
    }

    pub fn ask_before_sending(mut self, ask: bool) -> Self {
        self.ask_before_sending = ask;
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn collector_url(mut self, url: impl Into<String>) -> Self {
        self.collector_url = url.into();
        self
    }

    pub fn keep_age(mut self, keep_age: Duration) -> Self {
        self.keep_age = keep_age;
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// The host-side collaborators a session needs
pub struct Host {
    metadata: Box<dyn MetadataProvider>,
    prompt: Box<dyn ConsentPrompt>,
    transport: Box<dyn Transport>,
    channels: Vec<Box<dyn FaultChannel>>,
}

impl Host {
    /// Host with a ureq transport and a panic hook.
    ///
    /// `prompt` answers the consent question when the session asks before
    /// sending. Hosts that never show UI pass [`AlwaysSend`](crate::AlwaysSend)
    /// and should also turn `ask_before_sending` off.
    pub fn new(
        metadata: impl MetadataProvider + 'static,
        prompt: impl ConsentPrompt + 'static,
    ) -> Self {
        Self {
            metadata: Box::new(metadata),
            prompt: Box::new(prompt),
            transport: Box::new(UreqTransport::new()),
            channels: vec![Box::new(PanicChannel::new())],
        }
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    pub fn with_channel(mut self, channel: impl FaultChannel + 'static) -> Self {
        self.channels.push(Box::new(channel));
        self
    }

    /// Drop the default panic hook and any channels added so far
    pub fn without_channels(mut self) -> Self {
        self.channels.clear();
        self
    }
}

pub struct Session {
    identifier: String,
    ask_before_sending: bool,
    user_id: RwLock<Option<String>>,
    recorder: Arc<CrashRecorder>,
    observer: Arc<ExceptionObserver>,
    uploads: UploadManager,
    prompt: Box<dyn ConsentPrompt>,
    reconciling: Mutex<()>,
}

impl Session {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn ask_before_sending(&self) -> bool {
        self.ask_before_sending
    }

    pub fn storage_path(&self) -> &Path {
        self.recorder.store().dir()
    }

    pub fn metadata(&self) -> &Metadata {
        self.recorder.metadata()
    }

    pub fn observer(&self) -> &ExceptionObserver {
        &self.observer
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Uploads already in flight keep the previous value
    pub fn set_user_id(&self, user_id: Option<String>) {
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) = user_id;
    }

    /// Manually persist a fault through the same path as automatic capture.
    pub fn save_exception(
        &self,
        message: &str,
        fault: &Fault,
        extra_stack_trace: Option<&str>,
    ) -> CaptureOutcome {
        let outcome = self.recorder.capture(message, fault, extra_stack_trace);
        if let CaptureOutcome::Failed(e) = &outcome {
            tracing::warn!(error = %e, "crash record not saved");
        }
        outcome
    }

    /// Raw text of every record still in the store, oldest first
    pub fn unsent_raw_crash_logs(&self) -> Vec<String> {
        read_all(self.recorder.store())
    }

    /// Run another reconciliation pass now.
    pub fn reconcile(&self) -> ReconcileReport {
        self.reconcile_at(Utc::now())
    }

    pub fn reconcile_at(&self, now: DateTime<Utc>) -> ReconcileReport {
        // Concurrent passes would upload the same record twice
        let _guard = self
            .reconciling
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let user_id = self.user_id();
        run_pass(
            self.recorder.store(),
            &self.uploads,
            self.prompt.as_ref(),
            self.ask_before_sending,
            user_id.as_deref(),
            now,
        )
    }
}

fn read_all(store: &CrashLogStore) -> Vec<String> {
    let files = match store.enumerate() {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(error = %e, "cannot list pending crash logs");
            return Vec::new();
        }
    };
    files
        .iter()
        .filter_map(|file| match store.read_text(file) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable crash log");
                None
            }
        })
        .collect()
}

/// What a successful initialization hands back
pub struct Initialized {
    pub session: Arc<Session>,
    /// Records found at startup, read before reconciliation touched them
    pub pending_crash_logs: Vec<String>,
    pub report: ReconcileReport,
}

/// Holds at most one session for its lifetime
pub struct SessionSlot {
    claimed: AtomicBool,
    session: OnceLock<Arc<Session>>,
}

impl SessionSlot {
    pub const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            session: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Option<&Arc<Session>> {
        self.session.get()
    }

    /// Create the session, attach fault channels and reconcile pending records.
    ///
    /// A second call fails with [`Error::AlreadyInitialized`] and changes
    /// nothing. If setup stops early (the storage folder cannot be created,
    /// or the metadata provider panics) the slot stays free for another try.
    /// Panics from the prompt or transport during reconciliation are caught
    /// and reported per record.
    pub fn initialize(&self, options: SessionOptions, host: Host) -> Result<Initialized> {
        let claim = Claim::take(&self.claimed)?;

        let metadata = Metadata::collect(host.metadata.as_ref());
        let dir = options
            .storage_dir
            .clone()
            .unwrap_or_else(|| CrashLogStore::default_dir(&metadata.package_name));
        let store = CrashLogStore::open(dir)?;

        let recorder = Arc::new(CrashRecorder::new(store, metadata));
        let observer = ExceptionObserver::new(Arc::clone(&recorder));
        for channel in &host.channels {
            observer.attach(channel.as_ref());
            tracing::debug!(channel = channel.name(), "fault channel attached");
        }

        let pending_crash_logs = read_all(recorder.store());

        let uploads = UploadManager::new(host.transport, options.identifier.clone())
            .with_collector_url(options.collector_url)
            .with_keep_age(options.keep_age);
        let session = Arc::new(Session {
            identifier: options.identifier,
            ask_before_sending: options.ask_before_sending,
            user_id: RwLock::new(options.user_id),
            recorder,
            observer,
            uploads,
            prompt: host.prompt,
            reconciling: Mutex::new(()),
        });
        let session = Arc::clone(self.session.get_or_init(|| session));
        claim.keep();

        tracing::debug!(
            dir = %session.storage_path().display(),
            pending = pending_crash_logs.len(),
            "crash reporting initialized"
        );
        let report = session.reconcile();

        Ok(Initialized {
            session,
            pending_crash_logs,
            report,
        })
    }
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// The slot's "already created" flag, handed back if setup does not finish
/// (an error return or a panicking collaborator).
struct Claim<'a> {
    flag: Option<&'a AtomicBool>,
}

impl<'a> Claim<'a> {
    fn take(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyInitialized)?;
        Ok(Self { flag: Some(flag) })
    }

    fn keep(mut self) {
        self.flag = None;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let Some(flag) = self.flag.take() {
            flag.store(false, Ordering::Release);
        }
    }
}

static GLOBAL: SessionSlot = SessionSlot::new();

/// Initialize crash reporting for this process. Returns the raw text of
/// records left over from earlier runs.
pub fn initialize(options: SessionOptions, host: Host) -> Result<Vec<String>> {
    GLOBAL
        .initialize(options, host)
        .map(|init| init.pending_crash_logs)
}

pub fn session() -> Option<Arc<Session>> {
    GLOBAL.get().cloned()
}

/// Persist a fault now. Does nothing before [`initialize`].
pub fn save_exception(
    message: &str,
    fault: &Fault,
    extra_stack_trace: Option<&str>,
) -> CaptureOutcome {
    match GLOBAL.get() {
        Some(session) => session.save_exception(message, fault, extra_stack_trace),
        None => CaptureOutcome::Skipped,
    }
}

pub fn unsent_raw_crash_logs() -> Vec<String> {
    GLOBAL
        .get()
        .map(|s| s.unsent_raw_crash_logs())
        .unwrap_or_default()
}

pub fn user_id() -> Option<String> {
    GLOBAL.get().and_then(|s| s.user_id())
}

pub fn set_user_id(user_id: Option<String>) {
    if let Some(session) = GLOBAL.get() {
        session.set_user_id(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::AlwaysSend;
    use crate::error::TransportError;
    use crate::metadata::{AppInfo, DeviceInfo, StaticMetadata};
    use crate::observer::TaskFaultChannel;
    use crate::transport::FormRequest;

    fn created(_: &FormRequest) -> std::result::Result<u16, TransportError> {
        Ok(201)
    }

    fn host() -> Host {
        Host::new(StaticMetadata::new("com.example.app", "1.0.0"), AlwaysSend)
            .without_channels()
            .with_transport(created)
    }

    struct BrokenDevice;

    impl MetadataProvider for BrokenDevice {
        fn device_info(&self) -> DeviceInfo {
            panic!("device query crashed")
        }

        fn app_info(&self) -> AppInfo {
            AppInfo::default()
        }
    }

    #[test]
    fn second_initialize_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let slot = SessionSlot::new();
        let first = slot
            .initialize(SessionOptions::new("first").storage_dir(dir.path()), host())
            .unwrap();

        let second = slot.initialize(
            SessionOptions::new("second").storage_dir(dir.path()),
            host(),
        );
        assert!(matches!(second, Err(Error::AlreadyInitialized)));
        assert_eq!(slot.get().unwrap().identifier(), "first");
        assert!(Arc::ptr_eq(slot.get().unwrap(), &first.session));
    }

    #[test]
    fn storage_failure_leaves_slot_free() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let slot = SessionSlot::new();
        let err = slot.initialize(
            SessionOptions::new("id").storage_dir(blocker.join("crashes")),
            host(),
        );
        assert!(matches!(err, Err(Error::StoreIo { .. })));
        assert!(slot.get().is_none());

        slot.initialize(
            SessionOptions::new("id").storage_dir(dir.path().join("ok")),
            host(),
        )
        .unwrap();
        assert!(slot.get().is_some());
    }

    #[test]
    fn panicking_metadata_provider_leaves_slot_free() {
        let dir = tempfile::tempdir().unwrap();
        let slot = SessionSlot::new();

        let attempt = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let broken = Host::new(BrokenDevice, AlwaysSend)
                .without_channels()
                .with_transport(created);
            slot.initialize(SessionOptions::new("id").storage_dir(dir.path()), broken)
        }));
        assert!(attempt.is_err());
        assert!(slot.get().is_none());

        slot.initialize(SessionOptions::new("id").storage_dir(dir.path()), host())
            .unwrap();
        assert!(slot.get().is_some());
    }

    #[test]
    fn panicking_transport_stays_inside_initialize() {
        let dir = tempfile::tempdir().unwrap();
        CrashLogStore::open(dir.path())
            .unwrap()
            .write_sync(Utc::now(), "pending")
            .unwrap();

        let slot = SessionSlot::new();
        let init = slot
            .initialize(
                SessionOptions::new("id")
                    .storage_dir(dir.path())
                    .ask_before_sending(false),
                host().with_transport(
                    |_: &FormRequest| -> std::result::Result<u16, TransportError> {
                        panic!("tls backend blew up")
                    },
                ),
            )
            .unwrap();

        assert_eq!(init.report.counts().deferred, 1);
        assert_eq!(init.session.unsent_raw_crash_logs(), vec!["pending".to_string()]);
    }

    #[test]
    fn panicking_prompt_discards_batch() {
        let dir = tempfile::tempdir().unwrap();
        CrashLogStore::open(dir.path())
            .unwrap()
            .write_sync(Utc::now(), "pending")
            .unwrap();

        let prompt = |_: &str, _: &str| -> bool { panic!("no display") };
        let slot = SessionSlot::new();
        let init = slot
            .initialize(
                SessionOptions::new("id").storage_dir(dir.path()),
                Host::new(StaticMetadata::new("com.example.app", "1.0.0"), prompt)
                    .without_channels()
                    .with_transport(created),
            )
            .unwrap();

        assert_eq!(init.report.counts().declined, 1);
        assert!(init.session.unsent_raw_crash_logs().is_empty());
    }

    #[test]
    fn user_id_updates_are_visible() {
        let dir = tempfile::tempdir().unwrap();
        let slot = SessionSlot::new();
        let init = slot
            .initialize(
                SessionOptions::new("id").storage_dir(dir.path()).user_id("a"),
                host(),
            )
            .unwrap();
        assert_eq!(init.session.user_id().as_deref(), Some("a"));

        let session = Arc::clone(&init.session);
        std::thread::spawn(move || session.set_user_id(Some("b".to_string())))
            .join()
            .unwrap();
        assert_eq!(init.session.user_id().as_deref(), Some("b"));
    }

    #[test]
    fn channels_attached_at_initialize_feed_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let channel = TaskFaultChannel::new();
        let slot = SessionSlot::new();
        let init = slot
            .initialize(
                SessionOptions::new("id").storage_dir(dir.path()),
                host().with_channel(channel.clone()),
            )
            .unwrap();

        channel.report("background job failed", Fault::new("io", "timeout"));

        assert_eq!(init.session.observer().written(), 1);
        let logs = init.session.unsent_raw_crash_logs();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].ends_with("background job failed"));
    }
}
