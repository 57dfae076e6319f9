//! Path handlers: Task::CopyPath, Task::DeletePath

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::InstallError;
use crate::staging::{copy_tree, copy_tree_with};
use crate::substitute::{copy_with_substitution, PropertyResolver};

/// Handle Task::CopyPath.
///
/// `target` is relative to the staged tree and defaults to its root. A file
/// source copied to a directory target keeps its file name.
pub fn handle_copy_path(
    root: &Path,
    staged: &Path,
    src: &str,
    target: Option<&str>,
    replace_properties: Option<&dyn PropertyResolver>,
) -> Result<()> {
    let src_path = root.join(src);
    if !src_path.exists() {
        return Err(InstallError::MissingResource(src_path).into());
    }

    let mut target_path = match target {
        Some(target) => staged.join(target),
        None => staged.to_path_buf(),
    };
    if src_path.is_file() && target_path.is_dir() {
        if let Some(name) = src_path.file_name() {
            target_path.push(name);
        }
    }
    debug!(src = %src_path.display(), target = %target_path.display(), "copying path");

    match replace_properties {
        Some(resolver) => copy_tree_with(&src_path, &target_path, |from, to| {
            copy_with_substitution(from, to, resolver)
        }),
        None => copy_tree(&src_path, &target_path),
    }
}

/// Handle Task::DeletePath.
///
/// An absent path is a no-op. With `if_empty`, a non-empty directory is left
/// alone and a non-directory is an error.
pub fn handle_delete_path(staged: &Path, path: &str, recursive: bool, if_empty: bool) -> Result<()> {
    let full_path = staged.join(path);
    let Ok(metadata) = fs::symlink_metadata(&full_path) else {
        return Ok(());
    };

    if recursive {
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&full_path)
        } else {
            fs::remove_file(&full_path)
        };
        removed.map_err(|e| InstallError::io(format!("deleting '{}'", full_path.display()), e))?;
        return Ok(());
    }

    if if_empty {
        if !metadata.is_dir() {
            bail!("'{}' is not a directory", full_path.display());
        }
        let mut entries = fs::read_dir(&full_path)
            .with_context(|| format!("reading directory '{}'", full_path.display()))?;
        if entries.next().is_some() {
            debug!(path = %full_path.display(), "directory not empty, keeping it");
            return Ok(());
        }
    }

    let removed = if metadata.is_dir() {
        fs::remove_dir(&full_path)
    } else {
        fs::remove_file(&full_path)
    };
    removed.map_err(|e| InstallError::io(format!("deleting '{}'", full_path.display()), e))?;
    Ok(())
}
