//! Device and application metadata
//!
//! Collecting descriptive metadata is the host's job. The core only sees a
//! [`Metadata`] snapshot taken once at session start, supplied through a
//! [`MetadataProvider`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::UNKNOWN;

/// Four-part application version (`major.minor.build.revision`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl AppVersion {
    pub fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse a dotted version such as `1.4.2` or `1.4.2.7`.
    ///
    /// Missing parts default to zero; pre-release or build suffixes after `-`/`+`
    /// are ignored. Returns `None` when any present part is not a number.
    pub fn parse(s: &str) -> Option<Self> {
        let core = s.trim().split(['-', '+']).next()?;
        if core.is_empty() {
            return None;
        }
        let mut parts = [0u32; 4];
        for (i, part) in core.split('.').enumerate() {
            if i >= parts.len() {
                return None;
            }
            parts[i] = part.parse().ok()?;
        }
        Some(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppInfo {
    pub package_name: String,
    pub version: Option<AppVersion>,
}

/// Snapshot rendered into every crash record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub package_name: String,
    pub app_version: Option<AppVersion>,
    pub platform_label: String,
    pub device_manufacturer: String,
    pub device_model: String,
}

impl Metadata {
    pub fn collect(provider: &dyn MetadataProvider) -> Self {
        let device = provider.device_info();
        let app = provider.app_info();
        Self {
            package_name: app.package_name,
            app_version: app.version,
            platform_label: provider.platform_label(),
            device_manufacturer: device.manufacturer,
            device_model: device.model,
        }
    }

    pub(crate) fn version_label(&self) -> String {
        self.app_version
            .map(|v| v.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

/// Host-supplied source of device and app details.
///
/// Implementations must not fail: return empty strings (rendered as
/// `Unknown`) when a value is unavailable.
pub trait MetadataProvider: Send + Sync {
    fn device_info(&self) -> DeviceInfo;

    fn app_info(&self) -> AppInfo;

    fn platform_label(&self) -> String {
        format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
    }
}

/// Provider for hosts that know their package name and version up front and
/// have no device details beyond the compile target.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    pub device: DeviceInfo,
    pub app: AppInfo,
}

impl StaticMetadata {
    pub fn new(package_name: impl Into<String>, version: &str) -> Self {
        Self {
            device: DeviceInfo::default(),
            app: AppInfo {
                package_name: package_name.into(),
                version: AppVersion::parse(version),
            },
        }
    }

    pub fn with_device(
        mut self,
        manufacturer: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        self.device = DeviceInfo {
            manufacturer: manufacturer.into(),
            model: model.into(),
        };
        self
    }
}

impl MetadataProvider for StaticMetadata {
    fn device_info(&self) -> DeviceInfo {
        self.device.clone()
    }

    fn app_info(&self) -> AppInfo {
        self.app.clone()
    }
}
