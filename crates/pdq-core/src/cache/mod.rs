//! On-disk catalog cache.
//!
//! The cache is a derived representation of the feed — never authoritative.
//! A snapshot records the full catalog plus the staleness token of the feed
//! it was built from; the token decides reuse. Anything wrong with a
//! snapshot on disk (unreadable, bad JSON, unknown format version) is
//! treated as the snapshot being absent: the catalog is rebuilt from the
//! feed and the snapshot rewritten. Corruption is never an error the caller
//! sees.
//!
//! # Module layout
//!
//! - [`CatalogSnapshot`] — the serialized form (this module).
//! - [`CacheError`] — error type, internal to the cache (this module).
//! - [`manager`] — [`CacheManager`], the load-or-rebuild orchestration.
//! - [`latest`] — the per-query entry store for latest mode.
//!
//! # Concurrency
//!
//! Writes go to a temp file then rename into place, under a best-effort fs2
//! advisory lock. Readers never lock; a reader racing a writer sees either
//! the old snapshot or the new one.

pub mod latest;
pub mod manager;

pub use latest::{LatestCache, LatestKey};
pub use manager::{CacheManager, CacheOptions, CacheStatus, LoadResult, LoadSource};

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Catalog, PackageRecord};

/// The current snapshot format version. A snapshot carrying any other value
/// is rebuilt, so bumping this invalidates every existing cache entry.
pub const SNAPSHOT_FORMAT: u32 = 1;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from snapshot encoding, decoding, and file handling. These stay
/// inside the cache layer: callers observe a rebuild, not a failure.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache i/o: {0}")]
    Io(#[from] io::Error),

    /// The file exists but does not decode as a snapshot.
    #[error("snapshot decode failed: {0}")]
    Decode(String),

    /// The snapshot was written by a different format version.
    #[error("unsupported snapshot format {found}: this build reads {SNAPSHOT_FORMAT}")]
    UnsupportedFormat { found: u32 },
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The serialized catalog: format version, the staleness token of the feed
/// it was built from, a write timestamp for `cache status`, and the records.
/// Load warnings are not persisted; a rebuild regenerates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    format: u32,
    token: String,
    written_at: DateTime<Utc>,
    records: Vec<PackageRecord>,
}

impl CatalogSnapshot {
    #[must_use]
    pub fn new(token: impl Into<String>, records: Vec<PackageRecord>) -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            token: token.into(),
            written_at: Utc::now(),
            records,
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub const fn written_at(&self) -> DateTime<Utc> {
        self.written_at
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rehydrate the catalog. Records were normalized before the snapshot
    /// was written, so this re-sorts already sorted data.
    #[must_use]
    pub fn into_catalog(self) -> Catalog {
        Catalog::new(self.records, Vec::new())
    }

    /// # Errors
    ///
    /// Serialization failure only, which plain data does not produce.
    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// # Errors
    ///
    /// [`CacheError::Decode`] for malformed bytes,
    /// [`CacheError::UnsupportedFormat`] for a version this build does not
    /// read.
    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let snapshot: Self = serde_json::from_slice(bytes)?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(CacheError::UnsupportedFormat {
                found: snapshot.format,
            });
        }
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// File primitives
// ---------------------------------------------------------------------------

/// Read a snapshot file. `Ok(None)` means no file; any other failure is the
/// caller's cue to treat the snapshot as absent.
pub(crate) fn read_snapshot(path: &Path) -> Result<Option<CatalogSnapshot>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(CatalogSnapshot::decode(&bytes)?))
}

/// Write bytes to `path` atomically: temp file in the same directory, then
/// rename. An exclusive advisory lock on a sibling `.lock` file is taken
/// best-effort; if another process holds it, the write is skipped — that
/// process is writing an equally fresh snapshot.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let lock_path = path.with_extension("lock");
    let lock_file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    if lock_file.try_lock_exclusive().is_err() {
        debug!(path = %path.display(), "cache write skipped, lock held elsewhere");
        return Ok(());
    }

    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    let _ = lock_file.unlock();
    result.map_err(Into::into)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
