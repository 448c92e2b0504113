//! Atomic publish of a finished table over the current one.
//!
//! The current table is first copied to the backup path; only when that copy
//! succeeded is the staged table renamed over the final path. The rename is
//! the commit point, so readers of the final path see either the complete old
//! table or the complete new one.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use pokespin_shared::{PokespinError, Result, StagedFile};

/// Paths touched by a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// The table now holding the new contents.
    pub table: PathBuf,
    /// Where the previous table was copied, if there was one.
    pub backup: Option<PathBuf>,
}

/// Back up the staged file's target, then commit the staged file over it.
///
/// On any failure the staged file is dropped (and removed) and the target
/// is left as it was.
pub fn publish(staged: StagedFile, backup_path: &Path) -> Result<PublishReport> {
    let table = staged.target_path().to_path_buf();
    let backup = backup_existing(&table, backup_path)?;

    staged.commit().map_err(into_publish_error)?;

    info!(table = %table.display(), backup = ?backup, "published table");
    Ok(PublishReport { table, backup })
}

/// Publish `table_tmp_path` over `final_path`, keeping a copy at `backup_path`.
pub fn publish_file(
    table_tmp_path: &Path,
    final_path: &Path,
    backup_path: &Path,
) -> Result<PublishReport> {
    let backup = backup_existing(final_path, backup_path)?;

    std::fs::rename(table_tmp_path, final_path)
        .map_err(|e| PokespinError::publish(final_path, e))?;

    info!(table = %final_path.display(), backup = ?backup, "published table");
    Ok(PublishReport {
        table: final_path.to_path_buf(),
        backup,
    })
}

/// Copy `table` to `backup_path`, overwriting any previous backup.
///
/// Returns `None` when there is no table yet.
fn backup_existing(table: &Path, backup_path: &Path) -> Result<Option<PathBuf>> {
    if !table.exists() {
        debug!(table = %table.display(), "no existing table, skipping backup");
        return Ok(None);
    }
    std::fs::copy(table, backup_path).map_err(|e| PokespinError::publish(backup_path, e))?;
    debug!(backup = %backup_path.display(), "backed up previous table");
    Ok(Some(backup_path.to_path_buf()))
}

fn into_publish_error(err: PokespinError) -> PokespinError {
    match err {
        PokespinError::Io { path, source } => PokespinError::Publish { path, source },
        other => other,
    }
}
