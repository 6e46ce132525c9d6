//! FMRI parsing, ordering, and display.
//!
//! # Overview
//!
//! An FMRI (fault-managed resource identifier) names a package: a
//! slash-separated name plus an optional structured version. The textual
//! forms accepted here are:
//!
//! ```text
//! [pkg:/ | pkg://publisher/] name [@ release [,build] [-branch] [:timestamp]]
//! ```
//!
//! A `pkg://publisher/` prefix is tolerated and the publisher discarded;
//! the canonical rendering is always `name@version` with no scheme.
//!
//! # Design
//!
//! Versions are compared structurally, never as strings: `release`, `build`,
//! and `branch` are dot-separated integer sequences compared componentwise
//! (a shorter sequence orders before a longer one sharing its prefix), and
//! the timestamp breaks remaining ties textually. An absent component orders
//! before any present one. `Fmri` ordering is name first, then version,
//! which is the ordering every query listing in this crate relies on.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an FMRI string failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FmriError {
    #[error("empty FMRI")]
    Empty,

    #[error("invalid package name '{0}'")]
    InvalidName(String),

    #[error("invalid version '{text}': {reason}")]
    InvalidVersion { text: String, reason: String },
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Structured, totally ordered package version.
///
/// Field order matters: the derived `Ord` compares `release`, then `build`,
/// then `branch`, then `timestamp`, which is the documented precedence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    release: Vec<u64>,
    build: Vec<u64>,
    branch: Vec<u64>,
    timestamp: Option<String>,
}

impl Version {
    /// Dotted release sequence, e.g. `[2, 4, 1]` for `2.4.1`.
    #[must_use]
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// Build sequence (the part after `,`), empty when absent.
    #[must_use]
    pub fn build(&self) -> &[u64] {
        &self.build
    }

    /// Branch sequence (the part after `-`), empty when absent.
    #[must_use]
    pub fn branch(&self) -> &[u64] {
        &self.branch
    }

    /// Timestamp component (the part after `:`), if any.
    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    fn parse_sequence(text: &str, full: &str) -> Result<Vec<u64>, FmriError> {
        text.split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|_| FmriError::InvalidVersion {
                    text: full.to_string(),
                    reason: format!("'{part}' is not a non-negative integer"),
                })
            })
            .collect()
    }
}

impl FromStr for Version {
    type Err = FmriError;

    /// Parse `release[,build][-branch][:timestamp]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| FmriError::InvalidVersion {
            text: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("empty version"));
        }

        let (head, timestamp) = match s.split_once(':') {
            Some((_, ts)) if ts.is_empty() => {
                return Err(invalid("empty timestamp after ':'"));
            }
            Some((head, ts)) => (head, Some(ts.to_string())),
            None => (s, None),
        };

        let (head, branch_text) = match head.split_once('-') {
            Some((head, branch)) => (head, Some(branch)),
            None => (head, None),
        };

        let (release_text, build_text) = match head.split_once(',') {
            Some((release, build)) => (release, Some(build)),
            None => (head, None),
        };

        let release = Self::parse_sequence(release_text, s)?;
        let build = match build_text {
            Some(text) => Self::parse_sequence(text, s)?,
            None => Vec::new(),
        };
        let branch = match branch_text {
            Some(text) => Self::parse_sequence(text, s)?,
            None => Vec::new(),
        };

        Ok(Self {
            release,
            build,
            branch,
            timestamp,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_sequence(f, &self.release)?;
        if !self.build.is_empty() {
            write!(f, ",")?;
            fmt_sequence(f, &self.build)?;
        }
        if !self.branch.is_empty() {
            write!(f, "-")?;
            fmt_sequence(f, &self.branch)?;
        }
        if let Some(ts) = &self.timestamp {
            write!(f, ":{ts}")?;
        }
        Ok(())
    }
}

fn fmt_sequence(f: &mut fmt::Formatter<'_>, seq: &[u64]) -> fmt::Result {
    for (i, part) in seq.iter().enumerate() {
        if i > 0 {
            write!(f, ".")?;
        }
        write!(f, "{part}")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Fmri
// ---------------------------------------------------------------------------

/// A package identifier: name plus optional version.
///
/// Catalog records always carry a version; query targets and edge targets
/// may omit it (a name-only FMRI matches any version during non-exact
/// resolution).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fmri {
    name: String,
    version: Option<Version>,
}

impl Fmri {
    /// Parse an FMRI from any of the accepted textual forms.
    ///
    /// # Errors
    ///
    /// Returns [`FmriError`] when the name is empty or malformed, or the
    /// version part does not parse.
    pub fn parse(text: &str) -> Result<Self, FmriError> {
        text.parse()
    }

    /// Build an FMRI from already-validated parts. Test and fixture helper.
    ///
    /// # Errors
    ///
    /// Returns [`FmriError::InvalidVersion`] when `version` does not parse.
    pub fn new(name: &str, version: &str) -> Result<Self, FmriError> {
        Ok(Self {
            name: validate_name(name)?,
            version: Some(version.parse()?),
        })
    }

    /// Package name without scheme or publisher.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Same name and, when the query carries a version, exactly that
    /// version. A versionless query matches every version of the name.
    #[must_use]
    pub fn matches_exact(&self, query: &Self) -> bool {
        self.name == query.name
            && query
                .version
                .as_ref()
                .is_none_or(|v| self.version.as_ref() == Some(v))
    }

    /// Same name and version at or before the query's version bound. With
    /// no bound every version of the name matches.
    #[must_use]
    pub fn matches_at_or_before(&self, query: &Self) -> bool {
        if self.name != query.name {
            return false;
        }
        match (&self.version, &query.version) {
            (_, None) => true,
            (Some(mine), Some(bound)) => mine.cmp(bound) != Ordering::Greater,
            (None, Some(_)) => false,
        }
    }
}

impl FromStr for Fmri {
    type Err = FmriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FmriError::Empty);
        }

        // Strip scheme and publisher: pkg://publisher/name or pkg:/name.
        let rest = if let Some(after) = trimmed.strip_prefix("pkg://") {
            match after.split_once('/') {
                Some((_publisher, rest)) if !rest.is_empty() => rest,
                _ => return Err(FmriError::InvalidName(trimmed.to_string())),
            }
        } else {
            trimmed.strip_prefix("pkg:/").unwrap_or(trimmed)
        };

        let (name_text, version) = match rest.split_once('@') {
            Some((name, version_text)) => (name, Some(version_text.parse()?)),
            None => (rest, None),
        };

        Ok(Self {
            name: validate_name(name_text)?,
            version,
        })
    }
}

fn validate_name(name: &str) -> Result<String, FmriError> {
    let valid_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-' | '/');
    let well_formed = !name.is_empty()
        && !name.starts_with('/')
        && !name.ends_with('/')
        && !name.contains("//")
        && name.chars().all(valid_char);
    if well_formed {
        Ok(name.to_string())
    } else {
        Err(FmriError::InvalidName(name.to_string()))
    }
}

impl fmt::Display for Fmri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{v}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

// Serialized as the canonical string form so snapshots and JSON output stay
// readable and diffable.
impl Serialize for Fmri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fmri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fmri(text: &str) -> Fmri {
        text.parse().expect("test FMRI should parse")
    }

    fn version(text: &str) -> Version {
        text.parse().expect("test version should parse")
    }

    // === parsing ===

    #[test]
    fn parses_name_only() {
        let f = fmri("library/zlib");
        assert_eq!(f.name(), "library/zlib");
        assert!(f.version().is_none());
    }

    #[test]
    fn parses_full_form() {
        let f = fmri("web/server@2.4.1,5.11-0.175.2:20260101T000000Z");
        assert_eq!(f.name(), "web/server");
        let v = f.version().expect("version present");
        assert_eq!(v.release(), &[2, 4, 1]);
        assert_eq!(v.build(), &[5, 11]);
        assert_eq!(v.branch(), &[0, 175, 2]);
        assert_eq!(v.timestamp(), Some("20260101T000000Z"));
    }

    #[test]
    fn strips_scheme_prefixes() {
        assert_eq!(fmri("pkg:/web/server@1.0").name(), "web/server");
        assert_eq!(fmri("pkg://solaris/web/server@1.0").name(), "web/server");
        assert_eq!(fmri("pkg:/web/server@1.0"), fmri("web/server@1.0"));
    }

    #[test]
    fn rejects_empty_and_malformed_names() {
        assert_eq!(Fmri::parse(""), Err(FmriError::Empty));
        assert_eq!(Fmri::parse("   "), Err(FmriError::Empty));
        assert!(matches!(
            Fmri::parse("@1.0"),
            Err(FmriError::InvalidName(_))
        ));
        assert!(matches!(
            Fmri::parse("/leading/slash"),
            Err(FmriError::InvalidName(_))
        ));
        assert!(matches!(
            Fmri::parse("has space"),
            Err(FmriError::InvalidName(_))
        ));
        assert!(matches!(
            Fmri::parse("pkg://publisher-only/"),
            Err(FmriError::InvalidName(_))
        ));
    }

    #[test]
    fn rejects_malformed_versions() {
        assert!(matches!(
            Fmri::parse("a@"),
            Err(FmriError::InvalidVersion { .. })
        ));
        assert!(matches!(
            Fmri::parse("a@1.x"),
            Err(FmriError::InvalidVersion { .. })
        ));
        assert!(matches!(
            Fmri::parse("a@1.0:"),
            Err(FmriError::InvalidVersion { .. })
        ));
        assert!(matches!(
            Fmri::parse("a@1..2"),
            Err(FmriError::InvalidVersion { .. })
        ));
    }

    // === ordering ===

    #[test]
    fn version_ordering_is_numeric_not_textual() {
        assert!(version("1.9") < version("1.10"));
        assert!(version("0.9.9") < version("1.0"));
    }

    #[test]
    fn shorter_release_orders_before_extension() {
        assert!(version("2") < version("2.0"));
        assert!(version("2.0") < version("2.0.1"));
    }

    #[test]
    fn component_precedence_release_build_branch_timestamp() {
        assert!(version("1.0,5.11") < version("1.1"));
        assert!(version("1.0,5.11-0.1") < version("1.0,5.12-0.0"));
        assert!(version("1.0-0.1") < version("1.0-0.2"));
        assert!(version("1.0-0.1:20250101T000000Z") < version("1.0-0.1:20260101T000000Z"));
    }

    #[test]
    fn absent_component_orders_before_present() {
        assert!(version("1.0") < version("1.0,1"));
        assert!(version("1.0") < version("1.0-1"));
        assert!(version("1.0") < version("1.0:20260101T000000Z"));
    }

    #[test]
    fn fmri_ordering_is_name_then_version() {
        let mut fmris = vec![
            fmri("b/pkg@1.0"),
            fmri("a/pkg@2.0"),
            fmri("a/pkg@1.0"),
            fmri("a/pkg"),
        ];
        fmris.sort();
        let rendered: Vec<String> = fmris.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["a/pkg", "a/pkg@1.0", "a/pkg@2.0", "b/pkg@1.0"]);
    }

    // === matching ===

    #[test]
    fn exact_match_requires_every_component() {
        let installed = fmri("a@1.0,5.11-0.1:20260101T000000Z");
        assert!(installed.matches_exact(&fmri("a@1.0,5.11-0.1:20260101T000000Z")));
        assert!(!installed.matches_exact(&fmri("a@1.0,5.11-0.1")));
        assert!(!installed.matches_exact(&fmri("a@1.0")));
        assert!(installed.matches_exact(&fmri("a")));
    }

    #[test]
    fn at_or_before_matching() {
        let installed = fmri("a@1.4");
        assert!(installed.matches_at_or_before(&fmri("a@1.4")));
        assert!(installed.matches_at_or_before(&fmri("a@1.5")));
        assert!(installed.matches_at_or_before(&fmri("a@2")));
        assert!(!installed.matches_at_or_before(&fmri("a@1.3")));
        assert!(!installed.matches_at_or_before(&fmri("b@9.9")));
        assert!(installed.matches_at_or_before(&fmri("a")));
    }

    // === display and serde ===

    #[test]
    fn display_round_trips() {
        for text in [
            "library/zlib",
            "web/server@2.4.1",
            "web/server@2.4.1,5.11",
            "web/server@2.4.1-0.175",
            "web/server@2.4.1,5.11-0.175.2:20260101T000000Z",
        ] {
            let f = fmri(text);
            assert_eq!(f.to_string(), text);
            assert_eq!(fmri(&f.to_string()), f);
        }
    }

    #[test]
    fn serde_uses_canonical_string() {
        let f = fmri("web/server@2.4.1-0.175");
        let json = serde_json::to_string(&f).expect("serialize");
        assert_eq!(json, "\"web/server@2.4.1-0.175\"");
        let back: Fmri = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, f);
    }

    #[test]
    fn serde_rejects_malformed_strings() {
        let result: Result<Fmri, _> = serde_json::from_str("\"bad name@1\"");
        assert!(result.is_err());
    }

    // === property: parse/display round-trip ===

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_sequence(max_len: usize) -> impl Strategy<Value = Vec<u64>> {
            prop::collection::vec(0_u64..1000, 1..=max_len)
        }

        fn arb_fmri() -> impl Strategy<Value = String> {
            let name = prop::collection::vec("[a-z][a-z0-9]{0,6}", 1..=3)
                .prop_map(|parts| parts.join("/"));
            let version = (
                arb_sequence(4),
                prop::option::of(arb_sequence(2)),
                prop::option::of(arb_sequence(3)),
                prop::option::of("[0-9]{8}T[0-9]{6}Z"),
            )
                .prop_map(|(release, build, branch, ts)| {
                    let mut out = release
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(".");
                    if let Some(build) = build {
                        out.push(',');
                        out.push_str(
                            &build
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join("."),
                        );
                    }
                    if let Some(branch) = branch {
                        out.push('-');
                        out.push_str(
                            &branch
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join("."),
                        );
                    }
                    if let Some(ts) = ts {
                        out.push(':');
                        out.push_str(&ts);
                    }
                    out
                });
            (name, prop::option::of(version)).prop_map(|(name, version)| match version {
                Some(v) => format!("{name}@{v}"),
                None => name,
            })
        }

        proptest! {
            #[test]
            fn parse_display_round_trip(text in arb_fmri()) {
                let parsed: Fmri = text.parse().expect("generated FMRI parses");
                prop_assert_eq!(parsed.to_string(), text.clone());
                let reparsed: Fmri = text.parse().expect("round-trip parses");
                prop_assert_eq!(parsed, reparsed);
            }
        }
    }
}
