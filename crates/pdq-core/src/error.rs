//! Engine error taxonomy with stable machine codes.
//!
//! Every fatal engine failure maps to one [`ErrorCode`] so scripts and
//! agents can branch on `E####` identifiers instead of message text. Cache
//! corruption never appears here: it is recovered internally by rebuilding
//! from source (see `cache`).

use std::fmt;

use thiserror::Error;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    SourceUnavailable,
    PackageNotFound,
    UnsupportedOption,
    MalformedRecord,
    ConfigParseError,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::SourceUnavailable => "E1001",
            Self::PackageNotFound => "E1002",
            Self::UnsupportedOption => "E1003",
            Self::MalformedRecord => "E1004",
            Self::ConfigParseError => "E1005",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::SourceUnavailable => "Package source unavailable",
            Self::PackageNotFound => "Package not found",
            Self::UnsupportedOption => "Unsupported option combination",
            Self::MalformedRecord => "Malformed package record",
            Self::ConfigParseError => "Config file parse error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::SourceUnavailable => {
                Some("Check that the feed directory exists and is readable, or pass --source.")
            }
            Self::PackageNotFound => {
                Some("List known names with `pdq no-dependants --names` or check the spelling.")
            }
            Self::UnsupportedOption => None,
            Self::MalformedRecord => Some("Regenerate the feed; a record's FMRI failed to parse."),
            Self::ConfigParseError => Some("Fix syntax in the pdq config.toml and retry."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Fatal engine failures. Each variant stops the run; nothing is partially
/// reported past one of these.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The external provider (feed directory, catalog snapshot) failed.
    #[error("package source unavailable ({source_desc}): {reason}")]
    SourceUnavailable { source_desc: String, reason: String },

    /// The queried identifier resolved to nothing in the catalog.
    #[error("package not found: {fmri}")]
    PackageNotFound { fmri: String },

    /// Option combination rejected before any graph work.
    #[error("unsupported option: {reason}")]
    UnsupportedOption { reason: String },

    /// A load-critical record could not be parsed (its own FMRI is bad or
    /// the line is not valid JSON). Cosmetic defects degrade to retained
    /// warnings instead.
    #[error("malformed record at {origin}: {reason}")]
    MalformedRecord { origin: String, reason: String },

    /// The configuration file exists but cannot be read or parsed.
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl EngineError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::SourceUnavailable { .. } => ErrorCode::SourceUnavailable,
            Self::PackageNotFound { .. } => ErrorCode::PackageNotFound,
            Self::UnsupportedOption { .. } => ErrorCode::UnsupportedOption,
            Self::MalformedRecord { .. } => ErrorCode::MalformedRecord,
            Self::Config { .. } => ErrorCode::ConfigParseError,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineError, ErrorCode};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::SourceUnavailable,
            ErrorCode::PackageNotFound,
            ErrorCode::UnsupportedOption,
            ErrorCode::MalformedRecord,
            ErrorCode::ConfigParseError,
        ];
        let codes: HashSet<&str> = all.iter().map(|c| c.code()).collect();
        assert_eq!(codes.len(), all.len(), "duplicate E#### code assigned");
    }

    #[test]
    fn error_maps_to_its_code() {
        let err = EngineError::PackageNotFound {
            fmri: "web/server".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::PackageNotFound);
        assert_eq!(err.code().code(), "E1002");
    }

    #[test]
    fn display_includes_offending_identifier() {
        let err = EngineError::PackageNotFound {
            fmri: "web/server@9.9".to_string(),
        };
        assert!(err.to_string().contains("web/server@9.9"));
    }
}
