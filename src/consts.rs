use std::time::Duration;

/// Fallback rendered for any metadata field that is blank or unavailable
pub const UNKNOWN: &str = "Unknown";

/// Crash log files are named `crash<timestamp>.log`
pub(crate) const FILE_PREFIX: &str = "crash";
pub(crate) const FILE_SUFFIX: &str = ".log";

/// Second-resolution UTC timestamp with `:` replaced by `-` so it is filesystem safe
pub(crate) const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Timestamp format of the `Date:` header inside a record
pub(crate) const DATE_HEADER_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Records older than this are deleted instead of retried
pub const DEFAULT_KEEP_AGE: Duration = Duration::from_secs(2 * 24 * 60 * 60);

pub const DEFAULT_COLLECTOR_URL: &str = "https://rink.hockeyapp.net/api/2/apps";

pub const SDK_NAME: &str = env!("CARGO_PKG_NAME");
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) const CONSENT_TITLE: &str = "Crash Data";
pub(crate) const CONSENT_MESSAGE: &str =
    "The app quit unexpectedly. Would you like to send information about this to the developer?";
