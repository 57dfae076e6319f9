//! Local content-addressed artifact store.
//!
//! Layout under the store root:
//! - `objects/<xx>/<sha256>`: artifact bytes, addressed by digest;
//! - `index/<group>/<file-name>.json`: one [`StoreEntry`] per coordinate;
//! - `repository/`: objects linked under their Maven path, so a resolved
//!   artifact carries its real file name;
//! - `store.lock`, `tmp/`: writer lock and staging for atomic writes.
//!
//! Artifacts only get in through [`ArtifactStore::put`]; nothing is downloaded.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::InstallError;
use crate::provider::{ArtifactResolver, MavenRepository};
use crate::versions::ArtifactCoords;

/// Directory name under the user cache dir when no root is configured.
pub const DEFAULT_STORE_DIR: &str = "featurepack-installer/artifacts";

const OBJECTS_DIR: &str = "objects";
const INDEX_DIR: &str = "index";
const REPOSITORY_DIR: &str = "repository";
const TMP_DIR: &str = "tmp";
const LOCK_FILE: &str = "store.lock";

/// What the index records for one coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    /// `group:artifact:version:classifier:type`
    pub coords: String,
    pub sha256: String,
    pub size: u64,
    /// Seconds since the epoch.
    pub stored_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    repository: MavenRepository,
}

impl ArtifactStore {
    /// Open the store at `root`, creating its directories.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [OBJECTS_DIR, INDEX_DIR, REPOSITORY_DIR, TMP_DIR] {
            let dir = root.join(dir);
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating store directory '{}'", dir.display()))?;
        }
        let repository = MavenRepository::new(root.join(REPOSITORY_DIR));
        Ok(Self { root, repository })
    }

    /// Open the store under the user cache directory.
    pub fn open_default() -> Result<Self> {
        let cache = dirs::cache_dir().context("no user cache directory on this platform")?;
        Self::open(cache.join(DEFAULT_STORE_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, sha256: &str) -> Result<PathBuf> {
        if sha256.len() != 64 || !sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("invalid sha256 '{sha256}'");
        }
        Ok(self.root.join(OBJECTS_DIR).join(&sha256[..2]).join(sha256))
    }

    fn entry_path(&self, coords: &ArtifactCoords) -> Result<PathBuf> {
        let file_name = coords.file_name();
        for segment in [coords.group_id.as_str(), file_name.as_str()] {
            if segment.is_empty() || segment.contains(['/', '\\']) || segment.contains("..") {
                bail!("coordinates {coords} do not map to a safe index path");
            }
        }
        Ok(self
            .root
            .join(INDEX_DIR)
            .join(&coords.group_id)
            .join(format!("{file_name}.json")))
    }

    /// The index entry for `coords`, if any.
    pub fn get(&self, coords: &ArtifactCoords) -> Result<Option<StoreEntry>> {
        let path = self.entry_path(coords)?;
        if !path.is_file() {
            return Ok(None);
        }
        read_entry(&path).map(Some)
    }

    /// Import `src` under `coords` and return its digest. A previous entry
    /// for the same coordinates is replaced; objects are never rewritten.
    pub fn put(&self, coords: &ArtifactCoords, src: &Path) -> Result<String> {
        if !src.is_file() {
            return Err(InstallError::MissingResource(src.to_path_buf()).into());
        }
        let _guard = self.lock()?;

        let (sha256, size) = digest(src)?;
        let object = self.object_path(&sha256)?;
        if !object.is_file() {
            let mut input =
                File::open(src).with_context(|| format!("opening '{}'", src.display()))?;
            self.write_atomically(&object, |out| io::copy(&mut input, out).map(drop))?;
        }

        let entry = StoreEntry {
            coords: coords.to_string(),
            sha256: sha256.clone(),
            size,
            stored_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            source: Some(src.to_path_buf()),
        };
        let json = serde_json::to_vec_pretty(&entry)?;
        self.write_atomically(&self.entry_path(coords)?, |out| out.write_all(&json))?;

        // A replaced entry must not keep resolving to the old bytes.
        let linked = self.repository.artifact_path(coords);
        if linked.is_file() {
            fs::remove_file(&linked)
                .with_context(|| format!("unlinking stale '{}'", linked.display()))?;
        }

        debug!(%coords, %sha256, size, "stored artifact");
        Ok(sha256)
    }

    /// Every index entry, sorted by coordinates.
    pub fn list(&self) -> Result<Vec<StoreEntry>> {
        let index = self.root.join(INDEX_DIR);
        let mut entries = Vec::new();
        for dent in WalkDir::new(&index) {
            let dent = dent.with_context(|| format!("walking '{}'", index.display()))?;
            if dent.file_type().is_file() && dent.path().extension().is_some_and(|e| e == "json") {
                entries.push(read_entry(dent.path())?);
            }
        }
        entries.sort_by(|a, b| a.coords.cmp(&b.coords));
        Ok(entries)
    }

    /// Blocks until no other writer holds the store.
    fn lock(&self) -> Result<File> {
        let path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("opening '{}'", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("locking '{}'", path.display()))?;
        Ok(file)
    }

    /// Stage through `tmp/` and rename onto `dest`; readers never see a
    /// partial file.
    fn write_atomically<F>(&self, dest: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }
        let mut tmp = NamedTempFile::new_in(self.root.join(TMP_DIR))
            .context("creating temporary file in store")?;
        write(tmp.as_file_mut()).with_context(|| format!("writing '{}'", dest.display()))?;
        tmp.persist(dest)
            .map_err(|e| InstallError::io(format!("persisting '{}'", dest.display()), e.error))?;
        Ok(())
    }

    fn link_into_repository(&self, object: &Path, coords: &ArtifactCoords) -> Result<PathBuf> {
        let dest = self.repository.artifact_path(coords);
        if dest.is_file() {
            return Ok(dest);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }
        if fs::hard_link(object, &dest).is_err() {
            let mut input = File::open(object)
                .with_context(|| format!("opening object '{}'", object.display()))?;
            self.write_atomically(&dest, |out| io::copy(&mut input, out).map(drop))?;
        }
        Ok(dest)
    }
}

impl ArtifactResolver for ArtifactStore {
    fn resolve(&self, coords: &ArtifactCoords) -> Result<PathBuf> {
        let missing = |reason: String| InstallError::ArtifactResolution {
            coords: coords.to_string(),
            reason,
        };
        let entry = self
            .get(coords)?
            .ok_or_else(|| missing(format!("not present in store '{}'", self.root.display())))?;
        let object = self.object_path(&entry.sha256)?;
        if !object.is_file() {
            return Err(missing(format!("object '{}' is missing", object.display())).into());
        }
        self.link_into_repository(&object, coords)
    }
}

fn read_entry(path: &Path) -> Result<StoreEntry> {
    let bytes =
        fs::read(path).with_context(|| format!("reading index entry '{}'", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing index entry '{}'", path.display()))
}

fn digest(path: &Path) -> Result<(String, u64)> {
    let mut file = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher)
        .with_context(|| format!("hashing '{}'", path.display()))?;
    Ok((format!("{:x}", hasher.finalize()), size))
}
