//! Crash log storage
//!
//! One dedicated folder holds one file per captured crash. Every read, write
//! and delete of that folder goes through [`CrashLogStore`].
//!
//! File names encode the capture time at second resolution, so sorting by
//! name sorts by capture time and the age of a record is known without
//! opening it.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

use crate::consts::{FILE_PREFIX, FILE_SUFFIX, FILE_TIMESTAMP_FORMAT};
use crate::error::{Error, Result};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A persisted crash record, identified by its file name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CrashLogFile {
    path: PathBuf,
    captured_at: DateTime<Utc>,
}

impl CrashLogFile {
    fn from_path(path: PathBuf) -> Option<Self> {
        let captured_at = parse_file_name(path.file_name()?.to_str()?)?;
        Some(Self { path, captured_at })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Negative when the file claims a capture time in the future
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.captured_at
    }
}

/// `crash2026-03-01T12-30-05Z.log`
pub fn file_name_for(captured_at: DateTime<Utc>) -> String {
    format!(
        "{FILE_PREFIX}{}{FILE_SUFFIX}",
        captured_at.format(FILE_TIMESTAMP_FORMAT)
    )
}

pub(crate) fn parse_file_name(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, FILE_TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

#[derive(Debug, Clone)]
pub struct CrashLogStore {
    dir: PathBuf,
}

impl CrashLogStore {
    /// Open the store, creating the folder if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::store("create folder", &dir, e))?;
        Ok(Self { dir })
    }

    /// `<local data dir>/<package>/crashes`, or the temp dir when the platform
    /// has no data directory.
    pub fn default_dir(package_name: &str) -> PathBuf {
        let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
        let package = if package_name.trim().is_empty() {
            crate::consts::SDK_NAME
        } else {
            package_name.trim()
        };
        base.join(package).join("crashes")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Durably write a record before returning.
    ///
    /// Runs entirely on the calling thread with blocking file I/O, so it is
    /// usable from a panic hook. The content goes to a hidden temp file that
    /// is flushed to disk and then renamed over the final name. A record
    /// captured in the same second replaces the earlier one.
    pub fn write_sync(&self, captured_at: DateTime<Utc>, text: &str) -> Result<CrashLogFile> {
        let name = file_name_for(captured_at);
        let final_path = self.dir.join(&name);
        let tmp_path = self.dir.join(format!(
            ".{name}.{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = write_file_sync(&tmp_path, text.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::store("write", &tmp_path, e));
        }
        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::store("rename", &final_path, e));
        }
        sync_dir(&self.dir);

        Ok(CrashLogFile {
            path: final_path,
            captured_at,
        })
    }

    /// Crash files in capture order. Anything not matching the naming
    /// convention is ignored.
    pub fn enumerate(&self) -> Result<Vec<CrashLogFile>> {
        let pattern = format!(
            "{}/{FILE_PREFIX}*{FILE_SUFFIX}",
            glob::Pattern::escape(&self.dir.to_string_lossy())
        );
        let entries = glob::glob(&pattern)
            .map_err(|e| Error::store("list", &self.dir, std::io::Error::other(e)))?;

        let mut files: Vec<CrashLogFile> = entries
            .flatten()
            .filter(|path| path.is_file())
            .filter_map(CrashLogFile::from_path)
            .collect();
        files.sort();
        Ok(files)
    }

    pub fn read_text(&self, file: &CrashLogFile) -> Result<String> {
        fs::read_to_string(&file.path).map_err(|e| Error::store("read", &file.path, e))
    }

    /// Remove a record. A file that is already gone counts as removed.
    pub fn delete(&self, file: &CrashLogFile) -> Result<()> {
        match fs::remove_file(&file.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::store("delete", &file.path, e)),
        }
    }

    /// Look up a record by file name, e.g. for `crashreport show`. Anything
    /// with a directory part is rejected, so lookups stay inside the folder.
    pub fn find(&self, file_name: &str) -> Option<CrashLogFile> {
        if Path::new(file_name).file_name() != Some(OsStr::new(file_name)) {
            return None;
        }
        let file = CrashLogFile::from_path(self.dir.join(file_name))?;
        file.path.is_file().then_some(file)
    }

    /// Delete every record, returning how many were removed.
    pub fn purge(&self) -> Result<usize> {
        let files = self.enumerate()?;
        for file in &files {
            self.delete(file)?;
        }
        Ok(files.len())
    }
}

fn write_file_sync(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut f = File::create(path)?;
    f.write_all(data)?;
    f.sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = f.set_permissions(fs::Permissions::from_mode(0o600));
    }

    Ok(())
}

/// Persist the rename itself. Best effort: not every platform can open a
/// directory for syncing.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(d) = File::open(dir) {
            let _ = d.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}
