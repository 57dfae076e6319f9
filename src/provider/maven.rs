//! Resolver over a directory in Maven repository layout.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ArtifactResolver;
use crate::error::InstallError;
use crate::versions::ArtifactCoords;

/// `<root>/<group as path>/<artifact>/<version>/<artifact>-<version>[-<classifier>].<type>`
#[derive(Debug, Clone)]
pub struct MavenRepository {
    root: PathBuf,
}

impl MavenRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, coords: &ArtifactCoords) -> PathBuf {
        let mut path = self.root.clone();
        for segment in coords.group_id.split('.') {
            path.push(segment);
        }
        path.join(&coords.artifact_id)
            .join(&coords.version)
            .join(coords.file_name())
    }
}

impl ArtifactResolver for MavenRepository {
    fn resolve(&self, coords: &ArtifactCoords) -> Result<PathBuf> {
        let path = self.artifact_path(coords);
        if !path.is_file() {
            return Err(InstallError::ArtifactResolution {
                coords: coords.to_string(),
                reason: format!("not found in repository '{}'", self.root.display()),
            }
            .into());
        }
        debug!(%coords, path = %path.display(), "resolved artifact");
        Ok(path)
    }
}
