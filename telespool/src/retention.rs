//! On-disk spill tier with size and file-count retention limits.
//!
//! Each (directory, route) pair gets a [`DiskRetentionPolicy`]: spilled
//! records are written one per file as self-describing JSON, named
//! `{prefix}_{unix_millis}{suffix}` so the creation instant survives in
//! the name itself. Eviction (`make_room`) deletes oldest-first by
//! modification time; recovery (`recover_eligible`) restores newest-first
//! by the name-embedded timestamp — a deliberate recency bias, on the
//! theory that fresh telemetry is worth more than stale telemetry.
//!
//! The directory's aggregate size and file count are cached and refreshed
//! by scanning; the directory itself is created on demand and never
//! deleted.

use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::DiskError;
use crate::estimate::estimated_size;
use crate::record::DataRecord;

/// Default spill file extension.
const SPOOL_SUFFIX: &str = ".buff";

/// Maximum number of files considered per recovery pass.
const RECOVERY_BATCH: usize = 5;

/// Cached aggregate state of one route's spill files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    /// Total size of the route's spill files, in bytes.
    pub size_bytes: u64,
    /// Number of spill files.
    pub file_count: u64,
}

/// One spill file as seen by a directory scan.
#[derive(Debug, Clone)]
pub struct SpoolFile {
    /// Full path to the file.
    pub path: PathBuf,
    /// File size in bytes.
    pub len: u64,
    /// Last-modified time, the eviction ordering key.
    pub modified: SystemTime,
    /// Creation instant embedded in the file name, the recovery ordering
    /// key. `None` if the name carries no parseable timestamp; such files
    /// are never recovered (but still count against the budget).
    pub created_ms: Option<i64>,
}

/// Per-(directory, route) on-disk store with retention limits.
pub struct DiskRetentionPolicy {
    dir: PathBuf,
    file_prefix: String,
    file_suffix: String,
    stats: parking_lot::Mutex<DirStats>,
    last_created_ms: parking_lot::Mutex<i64>,
}

impl DiskRetentionPolicy {
    /// Creates a policy for `route` under `dir` with the default
    /// `spool_{route}` file prefix.
    ///
    /// Missing path segments are created.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::DirectoryAccess`] if the directory cannot be
    /// created or scanned.
    pub fn for_route(dir: impl AsRef<Path>, route: &str) -> Result<Self, DiskError> {
        Self::with_prefix(dir, &format!("spool_{route}"))
    }

    /// Creates a policy with an explicit file prefix.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::DirectoryAccess`] if the directory cannot be
    /// created or scanned.
    pub fn with_prefix(dir: impl AsRef<Path>, prefix: &str) -> Result<Self, DiskError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| DiskError::DirectoryAccess {
            path: dir.display().to_string(),
            source: e,
        })?;
        let policy = DiskRetentionPolicy {
            dir,
            file_prefix: prefix.to_string(),
            file_suffix: SPOOL_SUFFIX.to_string(),
            stats: parking_lot::Mutex::new(DirStats::default()),
            last_created_ms: parking_lot::Mutex::new(0),
        };
        policy.rescan()?;
        Ok(policy)
    }

    /// The spill directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file name prefix this policy owns.
    pub fn file_prefix(&self) -> &str {
        &self.file_prefix
    }

    /// The cached aggregate size and file count.
    pub fn stats(&self) -> DirStats {
        *self.stats.lock()
    }

    /// Lists this policy's spill files.
    ///
    /// Only names matching `{prefix}*{suffix}` are considered; other
    /// files in the directory are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::DirectoryAccess`] if the directory cannot be
    /// read.
    pub fn files(&self) -> Result<Vec<SpoolFile>, DiskError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| DiskError::DirectoryAccess {
            path: self.dir.display().to_string(),
            source: e,
        })?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&self.file_prefix) || !name.ends_with(&self.file_suffix) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            files.push(SpoolFile {
                path: entry.path(),
                len: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                created_ms: self.parse_created_ms(name),
            });
        }
        Ok(files)
    }

    /// Extracts the creation millis from `{prefix}_{millis}{suffix}`.
    ///
    /// Keyed on the trailing `_{millis}` segment alone, so a policy
    /// scanning with a partial prefix (operator tooling) still sees the
    /// embedded timestamps.
    fn parse_created_ms(&self, name: &str) -> Option<i64> {
        let (_, millis) = name.strip_suffix(&self.file_suffix)?.rsplit_once('_')?;
        millis.parse().ok()
    }

    /// Reads and decodes one spill file.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::ReadFailed`] if the file cannot be read and
    /// [`DiskError::Serialize`] if its contents do not decode.
    pub fn decode_file(path: &Path) -> Result<DataRecord, DiskError> {
        let json = fs::read_to_string(path).map_err(|e| DiskError::ReadFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Rescans the directory and refreshes the cached aggregates.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::DirectoryAccess`] if the directory cannot be
    /// read.
    pub fn rescan(&self) -> Result<DirStats, DiskError> {
        let files = self.files()?;
        let stats = DirStats {
            size_bytes: files.iter().map(|f| f.len).sum(),
            file_count: files.len() as u64,
        };
        *self.stats.lock() = stats;
        Ok(stats)
    }

    /// Serializes `record` into a new uniquely named spill file.
    ///
    /// The name embeds the current unix-millisecond timestamp, forced
    /// strictly monotonic within the process so a burst of spills in one
    /// millisecond cannot collide with itself. An existing file with the
    /// same name is never overwritten: the write is refused with
    /// [`DiskError::FileExists`] and the record is accepted as lost.
    /// Such collisions only arise against files left by a previous run.
    ///
    /// # Errors
    ///
    /// [`DiskError::Serialize`] if the record cannot be encoded,
    /// [`DiskError::FileExists`] on a name collision,
    /// [`DiskError::WriteFailed`] on I/O failure.
    pub fn write(&self, record: &DataRecord) -> Result<PathBuf, DiskError> {
        let created_ms = {
            let mut last = self.last_created_ms.lock();
            let now = Utc::now().timestamp_millis();
            *last = now.max(*last + 1);
            *last
        };
        self.write_at(record, created_ms)
    }

    fn write_at(&self, record: &DataRecord, created_ms: i64) -> Result<PathBuf, DiskError> {
        let json = serde_json::to_string_pretty(record)?;
        let name = format!("{}_{created_ms}{}", self.file_prefix, self.file_suffix);
        let path = self.dir.join(name);

        if path.exists() {
            return Err(DiskError::FileExists {
                path: path.display().to_string(),
            });
        }
        fs::write(&path, &json).map_err(|e| DiskError::WriteFailed {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut stats = self.stats.lock();
        stats.size_bytes += json.len() as u64;
        stats.file_count += 1;
        debug!(path = %path.display(), bytes = json.len(), "spilled record to disk");
        Ok(path)
    }

    /// Deletes oldest files until `append_size` more bytes fit within
    /// `size_limit` and one more file fits within `file_count_limit`
    /// (0 disables either limit). Returns whether anything was evicted.
    ///
    /// Runs immediately before each spill write, so the disk budget is
    /// never durably exceeded — only transiently, during the triggering
    /// write itself. Every eviction is logged as a warning; it is the one
    /// path on this tier by which data is permanently and intentionally
    /// lost.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError`] if the directory cannot be scanned or a file
    /// cannot be deleted.
    pub fn make_room(
        &self,
        append_size: u64,
        size_limit: u64,
        file_count_limit: u64,
    ) -> Result<bool, DiskError> {
        let mut stats = self.rescan()?;
        let mut evicted = false;

        loop {
            let over_size = size_limit > 0 && stats.size_bytes + append_size > size_limit;
            let over_count = file_count_limit > 0 && stats.file_count + 1 > file_count_limit;
            if !over_size && !over_count {
                break;
            }

            let files = self.files()?;
            let Some(oldest) = files.iter().min_by_key(|f| f.modified) else {
                break;
            };
            warn!(
                path = %oldest.path.display(),
                "disk buffer over budget, evicting oldest spill file"
            );
            fs::remove_file(&oldest.path).map_err(|e| DiskError::DeleteFailed {
                path: oldest.path.display().to_string(),
                source: e,
            })?;
            evicted = true;
            stats = self.rescan()?;
        }
        Ok(evicted)
    }

    /// Returns spilled records that fit back into memory, newest first.
    ///
    /// Considers at most [`RECOVERY_BATCH`] candidates ordered by
    /// descending name-embedded creation timestamp. Each decoded record is
    /// accepted only while `current_size` plus its estimate stays within
    /// `mem_threshold`; the pass stops at the first candidate that does
    /// not fit. As the one exception, a record is always accepted when the
    /// threshold is zero and memory is completely empty — otherwise a
    /// zero-memory configuration would strand spilled data on disk
    /// forever.
    ///
    /// A file that fails to decode is skipped and left in place for a
    /// later operator to inspect. Accepted files are deleted immediately;
    /// if a deletion fails the record is *not* returned (it stays on
    /// disk), so recovery never duplicates data.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::DirectoryAccess`] if the directory cannot be
    /// scanned.
    pub fn recover_eligible(
        &self,
        mem_threshold: u64,
        current_size: u64,
    ) -> Result<Vec<DataRecord>, DiskError> {
        let mut files = self.files()?;
        files.retain(|f| f.created_ms.is_some());
        files.sort_by_key(|f| Reverse(f.created_ms));

        let mut recovered = Vec::new();
        let mut current = current_size;

        for file in files.into_iter().take(RECOVERY_BATCH) {
            let record = match Self::decode_file(&file.path) {
                Ok(record) => record,
                Err(e @ DiskError::ReadFailed { .. }) => {
                    warn!(error = %e, "cannot read spill file, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "malformed spill file left in place");
                    continue;
                }
            };

            let estimate = estimated_size(&record);
            let fits = current + estimate <= mem_threshold;
            let starvation_guard = mem_threshold == 0 && current == 0 && recovered.is_empty();
            if !fits && !starvation_guard {
                break;
            }

            if let Err(e) = fs::remove_file(&file.path) {
                warn!(path = %file.path.display(), error = %e, "cannot delete recovered spill file, leaving record on disk");
                continue;
            }
            current += estimate;
            recovered.push(record);
        }

        if !recovered.is_empty() {
            self.rescan()?;
            debug!(count = recovered.len(), "recovered spilled records into memory");
        }
        Ok(recovered)
    }
}
