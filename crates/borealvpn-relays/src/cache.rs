//! On-disk relay directory cache
//!
//! A single JSON document holding the last fetched relay list and its
//! freshness timestamp. Both read and write hold an exclusive whole-file
//! lock so a reader never observes a torn file and concurrent writers
//! cannot interleave. The refresh policy (who fetches, how failures are
//! retried) belongs to the API-client collaborator; this module only
//! stores what it is given and reports staleness.

use crate::error::{RelayError, RelayResult};
use crate::list::RelayList;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// How long a cached relay list stays fresh, in seconds
const CACHE_REFRESH_INTERVAL_SECS: i64 = 3600;

/// File name of the cache document inside the shared container
const CACHE_FILE_NAME: &str = "relays.json";

/// How long a cached relay list stays fresh
pub fn cache_refresh_interval() -> Duration {
    Duration::seconds(CACHE_REFRESH_INTERVAL_SECS)
}

/// The relay directory cache entry as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayListCache {
    /// The relay list stored within the cache entry
    pub relay_list: RelayList,
    /// When this entry was last refreshed
    pub updated_at: DateTime<Utc>,
}

impl RelayListCache {
    /// Wrap a freshly fetched relay list, stamping it with `now`
    pub fn with_fetched_list(relay_list: RelayList, now: DateTime<Utc>) -> Self {
        Self {
            relay_list,
            updated_at: now,
        }
    }

    /// Whether the entry is due for a refresh at `now`
    pub fn needs_update(&self, now: DateTime<Utc>) -> bool {
        now >= self.updated_at + cache_refresh_interval()
    }

    /// Read and decode the cache file, holding an exclusive lock for the
    /// duration of the read.
    pub fn read(path: &Path) -> RelayResult<Self> {
        let file = File::open(path)?;
        lock_exclusive(&file)?;

        let decoded = serde_json::from_reader(BufReader::new(&file));

        unlock(&file);
        Ok(decoded?)
    }

    /// Encode and write the cache file in place, holding an exclusive lock
    /// for the duration of the write.
    ///
    /// The file is opened without truncation and emptied only after the
    /// lock is held, so a concurrent reader can never observe a partially
    /// written document.
    pub fn write(&self, path: &Path) -> RelayResult<()> {
        let mut file = OpenOptions::new().write(true).create(true).open(path)?;
        lock_exclusive(&file)?;

        let result = self.write_locked(&mut file);

        unlock(&file);
        result
    }

    fn write_locked(&self, file: &mut File) -> RelayResult<()> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Default cache file location inside the shared container directory
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("borealvpn").join(CACHE_FILE_NAME))
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> RelayResult<()> {
    use std::os::unix::io::AsRawFd;

    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if result != 0 {
        return Err(RelayError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;

    // Released on close regardless; unlock eagerly so a queued reader does
    // not wait for the handle to drop.
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> RelayResult<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}
