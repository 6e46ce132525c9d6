//! Optional configuration file.
//!
//! `$XDG_CONFIG_HOME/pdq/config.toml`, read once at startup. Every field has
//! a default and the whole file may be absent; CLI flags override whatever
//! the file says. A file that exists but cannot be read or parsed is a real
//! error (`E1005`), not a silent fallback to defaults.
//!
//! ```toml
//! [source]
//! dir = "/var/db/pdq/feed"
//! catalog = "/var/db/pdq/latest"
//!
//! [cache]
//! enabled = true
//! dir = ""            # empty: platform cache dir
//!
//! [output]
//! format = "pretty"   # pretty | text | json
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Feed directory for installed-package records.
    #[serde(default = "default_feed_dir")]
    pub dir: PathBuf,
    /// Feed directory for the latest-mode catalog snapshot, if any.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: default_feed_dir(),
            catalog: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache directory; `None` (or empty in the file) means the platform
    /// cache dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Preferred output format name; unknown values fall through to TTY
    /// detection in the CLI.
    #[serde(default)]
    pub format: Option<String>,
}

fn default_feed_dir() -> PathBuf {
    PathBuf::from("/var/db/pdq/feed")
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Read the user configuration, or defaults when no file exists.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] when the file exists but cannot be read or
    /// parsed.
    pub fn load_default() -> Result<Self, EngineError> {
        match dirs::config_dir() {
            Some(config_dir) => Self::load_from(&config_dir.join("pdq").join("config.toml")),
            None => Ok(Self::default()),
        }
    }

    /// Read configuration from an explicit path; missing file means
    /// defaults.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] for an unreadable or unparsable file.
    pub fn load_from(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::Config {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        toml::from_str(&content).map_err(|e| EngineError::Config {
            reason: format!("failed to parse {}: {e}", path.display()),
        })
    }

    /// Effective cache directory: the configured one when set and non-empty,
    /// otherwise `<platform cache dir>/pdq`.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache.dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => dirs::cache_dir().map_or_else(|| PathBuf::from(".pdq-cache"), |d| d.join("pdq")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_from(&dir.path().join("config.toml")).expect("load");
        assert_eq!(config, Config::default());
        assert!(config.cache.enabled);
        assert_eq!(config.source.dir, PathBuf::from("/var/db/pdq/feed"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[source]\ndir = \"/srv/feed\"\n").expect("write");

        let config = Config::load_from(&path).expect("load");
        assert_eq!(config.source.dir, PathBuf::from("/srv/feed"));
        assert!(config.source.catalog.is_none());
        assert!(config.cache.enabled);
        assert!(config.output.format.is_none());
    }

    #[test]
    fn full_file_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            concat!(
                "[source]\ndir = \"/srv/feed\"\ncatalog = \"/srv/latest\"\n",
                "[cache]\nenabled = false\ndir = \"/tmp/pdq-cache\"\n",
                "[output]\nformat = \"json\"\n",
            ),
        )
        .expect("write");

        let config = Config::load_from(&path).expect("load");
        assert_eq!(config.source.catalog, Some(PathBuf::from("/srv/latest")));
        assert!(!config.cache.enabled);
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/pdq-cache"));
        assert_eq!(config.output.format.as_deref(), Some("json"));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[source\ndir =").expect("write");

        let err = Config::load_from(&path).expect_err("parse should fail");
        assert!(matches!(err, EngineError::Config { .. }));
        assert_eq!(err.code().code(), "E1005");
    }

    #[test]
    fn empty_cache_dir_falls_back_to_platform() {
        let config = Config {
            cache: CacheConfig {
                enabled: true,
                dir: Some(PathBuf::new()),
            },
            ..Config::default()
        };
        // Whatever the platform dir is, the empty override must not win.
        assert_ne!(config.cache_dir(), PathBuf::new());
    }
}
