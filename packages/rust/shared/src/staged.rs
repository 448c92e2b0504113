//! Scoped temporary file that is either committed by atomic rename or removed.
//!
//! Every durable write in pokespin (cache file, downloaded dumps, output
//! tables) goes through a [`StagedFile`]: bytes land at a sibling path
//! `<target>.tmp` and only become visible at `<target>` through a single
//! `rename`, so the target always holds either its old or its new complete
//! contents. Dropping an uncommitted staged file removes the temporary path.

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PokespinError, Result};

/// Suffix appended to the target file name for the staging path.
pub const STAGING_SUFFIX: &str = ".tmp";

/// A pending replacement of `target`, staged at a sibling path.
#[derive(Debug)]
pub struct StagedFile {
    target: PathBuf,
    staging: PathBuf,
    armed: bool,
}

impl StagedFile {
    /// Stage a replacement for `target` at `<target>.tmp`.
    pub fn new(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let staging = sibling_with_suffix(&target, STAGING_SUFFIX);
        Self {
            target,
            staging,
            armed: true,
        }
    }

    /// The path that will be replaced on commit.
    pub fn target_path(&self) -> &Path {
        &self.target
    }

    /// The temporary sibling path holding the staged bytes.
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    /// Create (or truncate) the staging file for streaming writes.
    pub fn create(&self) -> Result<File> {
        if let Some(parent) = self.staging.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| PokespinError::io(parent, e))?;
            }
        }
        File::create(&self.staging).map_err(|e| PokespinError::io(&self.staging, e))
    }

    /// Write the complete staged contents in one call.
    pub fn write_all(&self, contents: impl AsRef<[u8]>) -> Result<()> {
        use std::io::Write;

        let mut file = self.create()?;
        file.write_all(contents.as_ref())
            .and_then(|()| file.sync_all())
            .map_err(|e| PokespinError::io(&self.staging, e))
    }

    /// Atomically rename the staged file over the target.
    pub fn commit(mut self) -> Result<()> {
        std::fs::rename(&self.staging, &self.target)
            .map_err(|e| PokespinError::io(&self.target, e))?;
        self.armed = false;
        debug!(path = %self.target.display(), "committed staged file");
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.staging) {
            Ok(()) => debug!(staging = %self.staging.display(), "discarded staged file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(staging = %self.staging.display(), error = %e, "failed to discard staged file"),
        }
    }
}

/// `dir/name` → `dir/name<suffix>` (e.g. `pokeLIST.csv` → `pokeLIST.csv.bak`).
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
