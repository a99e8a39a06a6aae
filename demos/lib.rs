//! Shared setup for the runnable demos.

use databased_sqlite::{DatabaseConfig, Databased, Result};
use tempfile::TempDir;

/// Opens `<name>.db` in a fresh temporary directory.
///
/// The directory is removed when the returned [`TempDir`] is dropped, so
/// keep it alive for as long as the database is used.
pub fn scratch_db(name: &str) -> Result<(TempDir, Databased)> {
    let dir = tempfile::tempdir().map_err(|e| databased_sqlite::Error::Io {
        path: std::env::temp_dir(),
        source: e,
    })?;
    let db = Databased::new(DatabaseConfig::new(dir.path().join(format!("{name}.db"))))?;
    Ok((dir, db))
}
