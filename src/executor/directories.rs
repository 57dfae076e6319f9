//! Directory handler: Task::MkDirs

use anyhow::Result;
use std::path::Path;

use crate::staging::ensure_dir;

/// Handle Task::MkDirs: create every listed directory under the staged tree.
pub fn handle_mkdirs(staged: &Path, dirs: &[String]) -> Result<()> {
    for dir in dirs {
        ensure_dir(&staged.join(dir))?;
    }
    Ok(())
}
