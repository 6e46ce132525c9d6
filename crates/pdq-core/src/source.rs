//! Feed provider: package records from a directory of JSON-lines files.
//!
//! # Overview
//!
//! The installed-package universe is described by `*.jsonl` files, one JSON
//! object per line:
//!
//! ```text
//! {"fmri": "web/server@2.4.1", "depends": [{"fmri": "library/zlib@1.3", "type": "require"}]}
//! ```
//!
//! [`FeedDir`] implements [`CatalogSource`] over such a directory. Its
//! staleness token is a fingerprint of the directory listing (names, sizes,
//! mtimes), so any added, removed, or rewritten feed file invalidates a
//! cached catalog without reading file contents.
//!
//! # Malformed records
//!
//! A line that is not valid JSON, or whose own FMRI does not parse, is
//! load-critical and fails the load. Defects inside an edge degrade
//! instead: an unparsable version bound drops the bound, an unknown
//! dependency type or unusable target skips the edge; each degradation
//! retains a [`LoadWarning`] on the catalog.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::catalog::{Catalog, CatalogSource, DependencyEdge, DependencyType, LoadWarning, PackageRecord};
use crate::error::EngineError;
use crate::fmri::{Fmri, FmriError};

// ---------------------------------------------------------------------------
// FeedDir
// ---------------------------------------------------------------------------

/// Directory-backed record provider.
#[derive(Debug, Clone)]
pub struct FeedDir {
    dir: PathBuf,
}

/// Raw line shapes, decoupled from the validated model so edge-level
/// defects can degrade per policy instead of failing deserialization.
#[derive(Debug, Deserialize)]
struct RawRecord {
    fmri: String,
    #[serde(default)]
    depends: Vec<RawDepend>,
}

#[derive(Debug, Deserialize)]
struct RawDepend {
    fmri: String,
    #[serde(rename = "type")]
    dep_type: String,
}

impl FeedDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn unavailable(&self, reason: impl Display) -> EngineError {
        EngineError::SourceUnavailable {
            source_desc: self.describe(),
            reason: reason.to_string(),
        }
    }

    /// Feed files in deterministic (name-sorted) order.
    fn feed_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        let read_dir = fs::read_dir(&self.dir).map_err(|e| self.unavailable(e))?;
        let mut files = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| self.unavailable(e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".jsonl") {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn parse_file(
        &self,
        path: &Path,
        records: &mut Vec<PackageRecord>,
        warnings: &mut Vec<LoadWarning>,
    ) -> Result<(), EngineError> {
        let file_name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string());
        let file = fs::File::open(path).map_err(|e| self.unavailable(e))?;

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.unavailable(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let origin = format!("{file_name}:{}", index + 1);
            records.push(parse_record(&line, &origin, warnings)?);
        }
        Ok(())
    }
}

impl CatalogSource for FeedDir {
    fn describe(&self) -> String {
        format!("feed directory {}", self.dir.display())
    }

    fn token(&self) -> Result<String, EngineError> {
        let fingerprint =
            fingerprint_dir(&self.dir, ".jsonl").map_err(|e| self.unavailable(e))?;
        Ok(format!("{fingerprint:016x}"))
    }

    fn load(&self) -> Result<Catalog, EngineError> {
        let mut records = Vec::new();
        let mut warnings = Vec::new();
        for path in self.feed_files()? {
            self.parse_file(&path, &mut records, &mut warnings)?;
        }

        debug!(
            records = records.len(),
            warnings = warnings.len(),
            dir = %self.dir.display(),
            "loaded feed records"
        );
        Ok(Catalog::new(records, warnings))
    }
}

/// Parse one feed line into a validated record, degrading edge defects.
fn parse_record(
    line: &str,
    origin: &str,
    warnings: &mut Vec<LoadWarning>,
) -> Result<PackageRecord, EngineError> {
    let malformed = |reason: String| EngineError::MalformedRecord {
        origin: origin.to_string(),
        reason,
    };

    let raw: RawRecord =
        serde_json::from_str(line).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
    let fmri: Fmri = raw
        .fmri
        .parse()
        .map_err(|e: FmriError| malformed(format!("bad record FMRI '{}': {e}", raw.fmri)))?;

    let mut edges = Vec::with_capacity(raw.depends.len());
    for dep in raw.depends {
        let Ok(dep_type) = dep.dep_type.parse::<DependencyType>() else {
            warnings.push(LoadWarning::new(
                origin,
                format!("unknown dependency type '{}', edge skipped", dep.dep_type),
            ));
            continue;
        };
        match parse_target(&dep.fmri) {
            TargetParse::Ok(target) => edges.push(DependencyEdge::new(target, dep_type)),
            TargetParse::BoundDropped(target) => {
                warnings.push(LoadWarning::new(
                    origin,
                    format!("unparsable version bound on '{}', bound ignored", dep.fmri),
                ));
                edges.push(DependencyEdge::new(target, dep_type));
            }
            TargetParse::Unusable(err) => {
                warnings.push(LoadWarning::new(
                    origin,
                    format!("unusable dependency target '{}' ({err}), edge skipped", dep.fmri),
                ));
            }
        }
    }

    Ok(PackageRecord::new(fmri, edges))
}

enum TargetParse {
    Ok(Fmri),
    BoundDropped(Fmri),
    Unusable(FmriError),
}

/// Edge targets follow the degrade policy: a bad version bound reduces the
/// target to its bare name, a bad name makes the edge unusable.
fn parse_target(text: &str) -> TargetParse {
    match text.parse::<Fmri>() {
        Ok(fmri) => TargetParse::Ok(fmri),
        Err(err @ FmriError::InvalidVersion { .. }) => {
            let name_part = text.split_once('@').map_or(text, |(name, _)| name);
            name_part
                .parse::<Fmri>()
                .map_or(TargetParse::Unusable(err), TargetParse::BoundDropped)
        }
        Err(err) => TargetParse::Unusable(err),
    }
}

// ---------------------------------------------------------------------------
// Fingerprinting
// ---------------------------------------------------------------------------

/// Fingerprint a directory's files of the given extension.
///
/// Hashes the sorted (filename, size, mtime_ns) tuples with an FNV-1a
/// combiner. Cheap (no content reading) and catches additions, deletions,
/// and modifications. Returns 0 when the directory does not exist, so a
/// vanished feed can never validate a cached catalog.
pub(crate) fn fingerprint_dir(dir: &Path, extension: &str) -> std::io::Result<u64> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut entries: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(extension) {
            continue;
        }

        let meta = entry.metadata()?;
        let size = meta.len();
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        entries.insert(name, (size, mtime_ns));
    }

    let mut hash: u64 = 0xcbf2_9ce4_8422_2325; // FNV-1a offset basis
    let mut mix = |byte: u8| {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3); // FNV-1a prime
    };
    for (name, (size, mtime)) in &entries {
        name.bytes().for_each(&mut mix);
        size.to_le_bytes().into_iter().for_each(&mut mix);
        mtime.to_le_bytes().into_iter().for_each(&mut mix);
    }

    Ok(hash)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
