//! Per-query entry store for latest mode.
//!
//! # Overview
//!
//! Latest mode answers a depends query against a remote-catalog feed
//! snapshot, and those feeds change rarely relative to how often the same
//! query is repeated. So instead of one catalog snapshot, this cache keeps
//! one small entry per distinct query under `<cache-dir>/latest/`, keyed by
//! a blake3 digest of the query: package plus every traversal option. The
//! validity contract is the same as the catalog snapshot's — the stored
//! feed token must match the current one, unless reuse is forced.
//!
//! Every operation here is best-effort. A miss, a corrupt entry, or a
//! failed write all degrade to "run the query against the feed"; nothing
//! in this module produces a caller-visible error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CacheError, CacheOptions, SNAPSHOT_FORMAT, write_atomic};
use crate::fmri::Fmri;
use crate::query::{Listing, QueryOpts};

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Identity of one latest-mode query: the canonical target FMRI string plus
/// every option that changes the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestKey {
    pub package: String,
    pub opts: QueryOpts,
}

impl LatestKey {
    #[must_use]
    pub fn new(pkg: &Fmri, opts: &QueryOpts) -> Self {
        Self {
            package: pkg.to_string(),
            opts: opts.clone(),
        }
    }

    fn digest(&self) -> Result<String, CacheError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// On-disk form of one cached query result. The key is stored alongside the
/// listing so a digest collision reads as a miss instead of a wrong answer.
#[derive(Debug, Serialize, Deserialize)]
struct LatestEntry {
    format: u32,
    token: String,
    written_at: DateTime<Utc>,
    key: LatestKey,
    listing: Listing,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Directory-scoped store of latest-mode query results.
#[derive(Debug, Clone)]
pub struct LatestCache {
    dir: PathBuf,
}

impl LatestCache {
    #[must_use]
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            dir: cache_dir.join("latest"),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The cached listing for `key`, when an entry exists and its token
    /// matches `token` (or reuse is forced). `clear` removes the entry and
    /// reports a miss, forcing the query to run.
    #[must_use]
    pub fn lookup(&self, key: &LatestKey, token: &str, options: CacheOptions) -> Option<Listing> {
        if options.disabled {
            return None;
        }
        let path = self.entry_path(key)?;
        if options.clear {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "latest entry removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(error = %e, "latest entry removal failed"),
            }
            return None;
        }

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(error = %e, "latest entry unreadable, treating as miss");
                return None;
            }
        };
        let entry: LatestEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "latest entry corrupt, treating as miss");
                return None;
            }
        };
        if entry.format != SNAPSHOT_FORMAT || entry.key != *key {
            return None;
        }
        if entry.token != token && !options.force {
            debug!(package = %key.package, "latest entry stale");
            return None;
        }
        debug!(package = %key.package, "latest entry hit");
        Some(entry.listing)
    }

    /// Persist a fresh result. Best-effort: failures are logged, the query
    /// result is returned to the caller either way.
    pub fn store(&self, key: &LatestKey, token: &str, listing: &Listing, options: CacheOptions) {
        if options.disabled {
            return;
        }
        let Some(path) = self.entry_path(key) else {
            return;
        };
        let entry = LatestEntry {
            format: SNAPSHOT_FORMAT,
            token: token.to_string(),
            written_at: Utc::now(),
            key: key.clone(),
            listing: listing.clone(),
        };
        let written = serde_json::to_vec(&entry)
            .map_err(CacheError::from)
            .and_then(|bytes| write_atomic(&path, &bytes));
        match written {
            Ok(()) => debug!(package = %key.package, "latest entry written"),
            Err(e) => warn!(error = %e, "latest entry write failed"),
        }
    }

    /// Remove every entry; the count removed is reported by `cache clear`.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for path in self.entry_files() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "latest entry removal failed"),
            }
            let _ = fs::remove_file(path.with_extension("lock"));
        }
        removed
    }

    /// Number of entries on disk, for `cache status`.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entry_files().len()
    }

    fn entry_path(&self, key: &LatestKey) -> Option<PathBuf> {
        match key.digest() {
            Ok(digest) => Some(self.dir.join(format!("{digest}.json"))),
            Err(e) => {
                warn!(error = %e, "latest key digest failed");
                None
            }
        }
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
