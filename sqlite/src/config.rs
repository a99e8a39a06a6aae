//! Manager configuration.
//!
//! Every [`Databased`](crate::Databased) is built from an explicit
//! [`DatabaseConfig`]; there is no process-wide default path. The options
//! can also be loaded from YAML so a shell session can keep them in a file.
//!
//! # Example YAML
//!
//! ```yaml
//! path: data/cereals.db
//! timeout_secs: 10.0
//! detect_types: true
//! enforce_foreign_keys: true
//! commit_on_close: true
//! max_variables: 900
//! ```

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Parameter ceiling per statement for the bundled engine lineage.
pub const DEFAULT_MAX_VARIABLES: usize = 900;

/// Seconds to wait for a file lock before failing with
/// [`Error::Busy`](crate::Error::Busy).
pub const DEFAULT_TIMEOUT_SECS: f64 = 10.0;

/// Longest lock wait the engine accepts: `i32::MAX` milliseconds.
pub const MAX_TIMEOUT_SECS: f64 = i32::MAX as f64 / 1000.0;

/// Options for a database manager.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use databased_sqlite::DatabaseConfig;
///
/// let config = DatabaseConfig::new("cereals.db")
///     .with_timeout(Duration::from_secs(5))
///     .with_commit_on_close(false);
/// assert_eq!(config.timeout(), Duration::from_secs(5));
/// assert!(config.detect_types);
/// assert_eq!(config.max_variables, 900);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; created along with missing parent directories.
    pub path: PathBuf,
    /// Lock wait in seconds.
    pub timeout_secs: f64,
    /// Decode `TIMESTAMP`/`DATETIME` columns into timestamp values.
    pub detect_types: bool,
    /// Issue `PRAGMA foreign_keys = ON` on every connect.
    pub enforce_foreign_keys: bool,
    /// Commit pending writes when the connection is closed.
    pub commit_on_close: bool,
    /// Maximum bound parameters per statement; drives insert chunking.
    pub max_variables: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            detect_types: true,
            enforce_foreign_keys: true,
            commit_on_close: true,
            max_variables: DEFAULT_MAX_VARIABLES,
        }
    }
}

impl DatabaseConfig {
    /// Creates a configuration for `path` with default options.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Loads options from a YAML file. Keys that are absent keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Config`] if it is not valid YAML for this struct.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let config: Self = serde_yaml::from_reader(BufReader::new(file))
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks option ranges.
    pub fn validate(&self) -> Result<()> {
        check_timeout(self.timeout_secs)?;
        if self.max_variables == 0 {
            return Err(Error::Config("max_variables must be at least 1".into()));
        }
        Ok(())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_detect_types(mut self, detect_types: bool) -> Self {
        self.detect_types = detect_types;
        self
    }

    pub fn with_enforce_foreign_keys(mut self, enforce: bool) -> Self {
        self.enforce_foreign_keys = enforce;
        self
    }

    pub fn with_commit_on_close(mut self, commit_on_close: bool) -> Self {
        self.commit_on_close = commit_on_close;
        self
    }

    pub fn with_max_variables(mut self, max_variables: usize) -> Self {
        self.max_variables = max_variables;
        self
    }

    /// Lock wait as a [`Duration`], clamped to `0..=MAX_TIMEOUT_SECS`.
    pub fn timeout(&self) -> Duration {
        let secs = if self.timeout_secs.is_nan() {
            0.0
        } else {
            self.timeout_secs.clamp(0.0, MAX_TIMEOUT_SECS)
        };
        Duration::from_secs_f64(secs)
    }
}

pub(crate) fn check_timeout(secs: f64) -> Result<()> {
    if !secs.is_finite() || !(0.0..=MAX_TIMEOUT_SECS).contains(&secs) {
        return Err(Error::Config(format!(
            "timeout must be between 0 and {MAX_TIMEOUT_SECS} seconds, got {secs}"
        )));
    }
    Ok(())
}
