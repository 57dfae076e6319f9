//! Writes into the staged install tree.
//!
//! Two rules apply everywhere:
//! - directories are created idempotently; an existing directory is fine, an
//!   existing non-directory at a directory path is an error;
//! - regular files are overwritten, except through [`create_new_file`], which
//!   module descriptor and XSLT output use.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::InstallError;

/// File name of a module descriptor template.
pub const MODULE_XML: &str = "module.xml";

/// Create `path` and its parents unless it already is a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(InstallError::AlreadyExists(path.to_path_buf()).into());
    }
    fs::create_dir_all(path)
        .map_err(|e| InstallError::io(format!("creating directory '{}'", path.display()), e))?;
    Ok(())
}

/// Open a new file for writing, failing if anything exists at `path`.
pub fn create_new_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(InstallError::AlreadyExists(path.to_path_buf()).into())
        }
        Err(e) => Err(InstallError::io(format!("creating '{}'", path.display()), e).into()),
    }
}

/// Copy a single file, replacing any existing file at `dst`.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(src, dst).map_err(|e| {
        InstallError::io(
            format!("copying '{}' to '{}'", src.display(), dst.display()),
            e,
        )
    })?;
    Ok(())
}

/// Copy a file or directory tree with overwrite semantics for files.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    copy_tree_with(src, dst, |from, to| copy_file(from, to))
}

/// Walk `src`, mirroring directories under `dst` and handing each regular
/// file to `copy`. Symbolic links are followed.
pub fn copy_tree_with<F>(src: &Path, dst: &Path, mut copy: F) -> Result<()>
where
    F: FnMut(&Path, &Path) -> Result<()>,
{
    if !src.exists() {
        return Err(InstallError::MissingResource(src.to_path_buf()).into());
    }
    if src.is_file() {
        return copy(src, dst);
    }

    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.with_context(|| format!("walking '{}'", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("relativizing '{}'", entry.path().display()))?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else {
            copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Outcome of staging a package's module-template tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StagedModuleTree {
    /// Descriptor templates found, relative to the template root. Not copied.
    pub descriptors: Vec<PathBuf>,
    /// Other files copied into the staged tree, relative to the template root.
    pub copied: Vec<PathBuf>,
}

/// Mirror a module-template tree into the staged root.
///
/// Every file except `module.xml` is copied with overwrite. Descriptors are
/// only reported; they are rewritten later, once the last owner is known.
pub fn stage_module_tree(template_root: &Path, staged_dir: &Path) -> Result<StagedModuleTree> {
    let mut staged = StagedModuleTree::default();
    ensure_dir(staged_dir)?;

    let mut entries: Vec<_> = WalkDir::new(template_root)
        .sort_by_file_name()
        .into_iter()
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("walking '{}'", template_root.display()))?;
    entries.retain(|e| e.path() != template_root);

    for entry in entries {
        let rel = entry
            .path()
            .strip_prefix(template_root)
            .with_context(|| format!("relativizing '{}'", entry.path().display()))?
            .to_path_buf();
        let target = staged_dir.join(&rel);
        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else if entry.file_name() == MODULE_XML {
            staged.descriptors.push(rel);
        } else {
            copy_file(entry.path(), &target)?;
            staged.copied.push(rel);
        }
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_dirs() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let staging = temp.path().join("staging");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&staging).unwrap();
        (temp, source, staging)
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let (_temp, _source, staging) = temp_dirs();
        ensure_dir(&staging.join("a/b")).unwrap();
        ensure_dir(&staging.join("a/b")).unwrap();
        assert!(staging.join("a/b").is_dir());
    }

    #[test]
    fn ensure_dir_rejects_existing_file() {
        let (_temp, _source, staging) = temp_dirs();
        fs::write(staging.join("occupied"), "x").unwrap();
        let err = ensure_dir(&staging.join("occupied")).unwrap_err();
        assert!(matches!(
            InstallError::find(&err),
            Some(InstallError::AlreadyExists(_))
        ));
    }

    #[test]
    fn create_new_file_fails_on_existing() {
        let (_temp, _source, staging) = temp_dirs();
        let path = staging.join("out/result.xml");
        create_new_file(&path).unwrap();
        let err = create_new_file(&path).unwrap_err();
        assert!(matches!(
            InstallError::find(&err),
            Some(InstallError::AlreadyExists(p)) if p == &path
        ));
    }

    #[test]
    fn copy_tree_overwrites_files_and_keeps_existing_dirs() {
        let (_temp, source, staging) = temp_dirs();
        fs::create_dir_all(source.join("bin")).unwrap();
        fs::write(source.join("bin/run.sh"), "new").unwrap();
        fs::create_dir_all(staging.join("bin")).unwrap();
        fs::write(staging.join("bin/run.sh"), "old").unwrap();
        fs::write(staging.join("bin/keep.sh"), "keep").unwrap();

        copy_tree(&source, &staging).unwrap();

        assert_eq!(fs::read_to_string(staging.join("bin/run.sh")).unwrap(), "new");
        assert_eq!(fs::read_to_string(staging.join("bin/keep.sh")).unwrap(), "keep");
    }

    #[test]
    fn copy_tree_missing_source() {
        let (_temp, source, staging) = temp_dirs();
        let err = copy_tree(&source.join("absent"), &staging).unwrap_err();
        assert!(matches!(
            InstallError::find(&err),
            Some(InstallError::MissingResource(_))
        ));
    }

    #[test]
    fn stage_module_tree_defers_descriptors() {
        let (_temp, source, staging) = temp_dirs();
        let module = source.join("modules/system/layers/base/org/foo/main");
        fs::create_dir_all(&module).unwrap();
        fs::write(module.join("module.xml"), "<module/>").unwrap();
        fs::write(module.join("extra.txt"), "extra").unwrap();

        let staged = stage_module_tree(&source, &staging).unwrap();

        assert_eq!(
            staged.descriptors,
            vec![PathBuf::from("modules/system/layers/base/org/foo/main/module.xml")]
        );
        assert_eq!(
            staged.copied,
            vec![PathBuf::from("modules/system/layers/base/org/foo/main/extra.txt")]
        );
        let target = staging.join("modules/system/layers/base/org/foo/main");
        assert!(target.is_dir());
        assert!(target.join("extra.txt").is_file());
        assert!(!target.join("module.xml").exists());
    }
}
