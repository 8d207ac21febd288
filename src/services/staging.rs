//! Scoped local files used to stage object payloads.
//!
//! A `StagingFile` is created empty inside the staging directory and removed
//! when dropped. Removal failures are logged and otherwise ignored.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tracing::{debug, error};

const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    /// Create a new empty staging file inside `dir`.
    pub fn create_in(dir: &Path) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(dir)?;
        let path = file.into_temp_path().keep()?;
        debug!("created staging file {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        let path = self.path.display();
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed staging file {}", path),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("staging file {} already missing", path);
            }
            Err(err) => error!("failed to delete staging file {}: {}", path, err),
        }
    }
}
