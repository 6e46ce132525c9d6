//! Load-or-rebuild orchestration for the catalog snapshot.
//!
//! # Overview
//!
//! [`CacheManager`] owns the decision of where a catalog comes from: the
//! on-disk snapshot when its staleness token matches the feed (or reuse is
//! forced), otherwise a fresh load from the feed followed by a best-effort
//! snapshot rewrite. Every outcome is reported as a [`LoadSource`] so the
//! CLI can log provenance and `cache status` can explain state.
//!
//! # Contract
//!
//! - Token match, or `force`: reuse the snapshot without touching the feed
//!   records.
//! - Mismatch, miss, or `clear`: load from the feed; rewrite the snapshot
//!   unless caching is disabled.
//! - A snapshot that cannot be read or decoded counts as a miss, never as
//!   an error.
//! - A snapshot that cannot be written back degrades the provenance to
//!   [`LoadSource::RebuiltWriteFailed`]; the load itself still succeeds.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use super::{CatalogSnapshot, read_snapshot, write_atomic};
use crate::catalog::{Catalog, CatalogSource};
use crate::error::EngineError;

/// Cache behavior switches, wired from CLI flags and config.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// Skip cache reads and writes entirely.
    pub disabled: bool,
    /// Reuse an existing snapshot even when its token is stale.
    pub force: bool,
    /// Delete the snapshot before loading, forcing a rebuild.
    pub clear: bool,
}

/// Where a loaded catalog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Reused the on-disk snapshot.
    Cache,
    /// Rebuilt from the feed; a fresh snapshot was written.
    Rebuilt,
    /// Rebuilt from the feed, but the snapshot could not be written back.
    RebuiltWriteFailed,
}

/// A loaded catalog, its provenance, and the staleness token it reflects.
#[derive(Debug)]
pub struct LoadResult {
    pub catalog: Catalog,
    pub source: LoadSource,
    pub token: String,
}

/// Snapshot freshness relative to the feed, for `cache status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Missing,
    Corrupt,
    Fresh {
        written_at: DateTime<Utc>,
        records: usize,
    },
    Stale {
        written_at: DateTime<Utc>,
        records: usize,
    },
}

/// Owns the snapshot path and the load-or-rebuild decision.
#[derive(Debug, Clone)]
pub struct CacheManager {
    snapshot_path: PathBuf,
}

impl CacheManager {
    #[must_use]
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            snapshot_path: cache_dir.join("catalog.json"),
        }
    }

    #[must_use]
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Load the catalog, preferring the snapshot when its token matches the
    /// feed's current token.
    ///
    /// # Errors
    ///
    /// Only feed failures propagate: `SourceUnavailable` when the feed
    /// cannot be read at all, `MalformedRecord` for load-critical defects.
    #[instrument(skip(self, source), fields(feed = %source.describe()))]
    pub fn load(
        &self,
        source: &dyn CatalogSource,
        options: CacheOptions,
    ) -> Result<LoadResult, EngineError> {
        if options.clear {
            self.discard();
        }
        let current = source.token()?;

        if !options.disabled && !options.clear {
            match read_snapshot(&self.snapshot_path) {
                Ok(Some(snapshot)) if snapshot.token() == current || options.force => {
                    debug!(
                        records = snapshot.len(),
                        forced = options.force && snapshot.token() != current,
                        "catalog loaded from snapshot"
                    );
                    let token = snapshot.token().to_string();
                    return Ok(LoadResult {
                        catalog: snapshot.into_catalog(),
                        source: LoadSource::Cache,
                        token,
                    });
                }
                Ok(Some(_)) => debug!("snapshot token stale, rebuilding"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "unreadable snapshot treated as absent"),
            }
        }

        let catalog = source.load()?;
        if options.disabled {
            return Ok(LoadResult {
                catalog,
                source: LoadSource::Rebuilt,
                token: current,
            });
        }

        let snapshot = CatalogSnapshot::new(current.clone(), catalog.records().to_vec());
        let written = snapshot
            .encode()
            .and_then(|bytes| write_atomic(&self.snapshot_path, &bytes));
        let provenance = match written {
            Ok(()) => {
                debug!(records = catalog.len(), "snapshot rewritten");
                LoadSource::Rebuilt
            }
            Err(e) => {
                warn!(error = %e, "snapshot write failed, continuing without it");
                LoadSource::RebuiltWriteFailed
            }
        };
        Ok(LoadResult {
            catalog,
            source: provenance,
            token: current,
        })
    }

    /// Freshness of the snapshot relative to the feed.
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` when the feed's current token cannot be computed.
    pub fn status(&self, source: &dyn CatalogSource) -> Result<CacheStatus, EngineError> {
        let current = source.token()?;
        Ok(match read_snapshot(&self.snapshot_path) {
            Ok(None) => CacheStatus::Missing,
            Err(_) => CacheStatus::Corrupt,
            Ok(Some(snapshot)) => {
                let written_at = snapshot.written_at();
                let records = snapshot.len();
                if snapshot.token() == current {
                    CacheStatus::Fresh {
                        written_at,
                        records,
                    }
                } else {
                    CacheStatus::Stale {
                        written_at,
                        records,
                    }
                }
            }
        })
    }

    /// Remove the snapshot file. Best-effort; missing is fine.
    pub fn discard(&self) {
        match fs::remove_file(&self.snapshot_path) {
            Ok(()) => debug!(path = %self.snapshot_path.display(), "snapshot removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "snapshot removal failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DependencyEdge, DependencyType, PackageRecord};
    use crate::fmri::Fmri;

    fn fmri(text: &str) -> Fmri {
        text.parse().expect("test FMRI should parse")
    }

    struct StubSource {
        token: String,
        records: Vec<PackageRecord>,
        fail: bool,
    }

    impl StubSource {
        fn new(token: &str, records: Vec<PackageRecord>) -> Self {
            Self {
                token: token.to_string(),
                records,
                fail: false,
            }
        }
    }

    impl CatalogSource for StubSource {
        fn describe(&self) -> String {
            "stub feed".to_string()
        }

        fn token(&self) -> Result<String, EngineError> {
            Ok(self.token.clone())
        }

        fn load(&self) -> Result<Catalog, EngineError> {
            if self.fail {
                return Err(EngineError::SourceUnavailable {
                    source_desc: self.describe(),
                    reason: "forced failure".to_string(),
                });
            }
            Ok(Catalog::new(self.records.clone(), vec![]))
        }
    }

    fn sample_records(version: &str) -> Vec<PackageRecord> {
        vec![
            PackageRecord::new(
                fmri(&format!("a/app@{version}")),
                vec![DependencyEdge::new(
                    fmri("b/lib@1.0"),
                    DependencyType::Require,
                )],
            ),
            PackageRecord::new(fmri("b/lib@1.0"), vec![]),
        ]
    }

    // === load =============================================================

    #[test]
    fn first_load_rebuilds_then_snapshot_is_reused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path());
        let source = StubSource::new("tok-1", sample_records("1.0"));

        let first = manager.load(&source, CacheOptions::default()).expect("load");
        assert_eq!(first.source, LoadSource::Rebuilt);
        assert_eq!(first.token, "tok-1");
        assert!(manager.snapshot_path().exists());

        let second = manager.load(&source, CacheOptions::default()).expect("load");
        assert_eq!(second.source, LoadSource::Cache);
        assert_eq!(second.catalog.records(), first.catalog.records());
    }

    #[test]
    fn stale_token_triggers_rebuild() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path());

        let old = StubSource::new("tok-1", sample_records("1.0"));
        manager.load(&old, CacheOptions::default()).expect("seed");

        let new = StubSource::new("tok-2", sample_records("2.0"));
        let result = manager.load(&new, CacheOptions::default()).expect("load");
        assert_eq!(result.source, LoadSource::Rebuilt);
        assert_eq!(result.token, "tok-2");
        assert_eq!(result.catalog.records()[0].fmri().to_string(), "a/app@2.0");
    }

    #[test]
    fn force_reuses_a_stale_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path());

        let old = StubSource::new("tok-1", sample_records("1.0"));
        manager.load(&old, CacheOptions::default()).expect("seed");

        let mut new = StubSource::new("tok-2", sample_records("2.0"));
        new.fail = true; // reuse must not touch the feed records
        let options = CacheOptions {
            force: true,
            ..CacheOptions::default()
        };
        let result = manager.load(&new, options).expect("load");
        assert_eq!(result.source, LoadSource::Cache);
        assert_eq!(result.token, "tok-1");
        assert_eq!(result.catalog.records()[0].fmri().to_string(), "a/app@1.0");
    }

    #[test]
    fn force_without_a_snapshot_still_rebuilds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path());
        let source = StubSource::new("tok-1", sample_records("1.0"));
        let options = CacheOptions {
            force: true,
            ..CacheOptions::default()
        };
        let result = manager.load(&source, options).expect("load");
        assert_eq!(result.source, LoadSource::Rebuilt);
    }

    #[test]
    fn disabled_skips_reads_and_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path());

        let old = StubSource::new("tok-1", sample_records("1.0"));
        manager.load(&old, CacheOptions::default()).expect("seed");

        // Same token, but caching disabled: the feed must be re-read.
        let fresh = StubSource::new("tok-1", sample_records("3.0"));
        let options = CacheOptions {
            disabled: true,
            ..CacheOptions::default()
        };
        let result = manager.load(&fresh, options).expect("load");
        assert_eq!(result.source, LoadSource::Rebuilt);
        assert_eq!(result.catalog.records()[0].fmri().to_string(), "a/app@3.0");

        // And the stale snapshot was not overwritten.
        let reread = manager
            .load(&old, CacheOptions::default())
            .expect("load");
        assert_eq!(reread.catalog.records()[0].fmri().to_string(), "a/app@1.0");
    }

    #[test]
    fn clear_discards_a_matching_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path());

        let old = StubSource::new("tok-1", sample_records("1.0"));
        manager.load(&old, CacheOptions::default()).expect("seed");

        // Token still matches, yet clear must force a feed read.
        let fresh = StubSource::new("tok-1", sample_records("4.0"));
        let options = CacheOptions {
            clear: true,
            ..CacheOptions::default()
        };
        let result = manager.load(&fresh, options).expect("load");
        assert_eq!(result.source, LoadSource::Rebuilt);
        assert_eq!(result.catalog.records()[0].fmri().to_string(), "a/app@4.0");
    }

    #[test]
    fn corrupt_snapshot_recovers_by_rebuilding() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path());
        std::fs::write(manager.snapshot_path(), b"{ definitely not a snapshot")
            .expect("write garbage");

        let source = StubSource::new("tok-1", sample_records("1.0"));
        let result = manager.load(&source, CacheOptions::default()).expect("load");
        assert_eq!(result.source, LoadSource::Rebuilt);

        // The rewrite healed the file.
        let again = manager.load(&source, CacheOptions::default()).expect("load");
        assert_eq!(again.source, LoadSource::Cache);
    }

    #[test]
    fn feed_failure_propagates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path());
        let mut source = StubSource::new("tok-1", vec![]);
        source.fail = true;
        let err = manager
            .load(&source, CacheOptions::default())
            .expect_err("feed failure should propagate");
        assert!(matches!(err, EngineError::SourceUnavailable { .. }));
    }

    #[test]
    fn write_failure_degrades_provenance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path());
        // A directory where the snapshot file should be makes the rename fail.
        std::fs::create_dir_all(manager.snapshot_path()).expect("blocker dir");

        let source = StubSource::new("tok-1", sample_records("1.0"));
        let result = manager.load(&source, CacheOptions::default()).expect("load");
        assert_eq!(result.source, LoadSource::RebuiltWriteFailed);
        assert_eq!(result.catalog.len(), 2);
    }

    // === status ===========================================================

    #[test]
    fn status_reports_missing_fresh_stale_and_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path());
        let source = StubSource::new("tok-1", sample_records("1.0"));

        assert_eq!(
            manager.status(&source).expect("status"),
            CacheStatus::Missing
        );

        manager.load(&source, CacheOptions::default()).expect("seed");
        assert!(matches!(
            manager.status(&source).expect("status"),
            CacheStatus::Fresh { records: 2, .. }
        ));

        let moved_on = StubSource::new("tok-2", sample_records("2.0"));
        assert!(matches!(
            manager.status(&moved_on).expect("status"),
            CacheStatus::Stale { records: 2, .. }
        ));

        std::fs::write(manager.snapshot_path(), b"garbage").expect("corrupt");
        assert_eq!(
            manager.status(&source).expect("status"),
            CacheStatus::Corrupt
        );
    }
}
