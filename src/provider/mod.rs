//! Feature packs, packages and the collaborators that supply their bytes.

pub mod layout;
pub mod maven;

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::tasks::ExampleConfig;
use crate::versions::ArtifactCoords;

pub use layout::Layout;
pub use maven::MavenRepository;

/// Plugin resource directory inside a package.
pub const PLUGIN_DIR: &str = "pm/wildfly";
/// Module templates inside the plugin resource directory.
pub const MODULE_DIR: &str = "module";
/// Task descriptor inside the plugin resource directory.
pub const TASKS_FILE: &str = "tasks.toml";
/// Raw package content.
pub const CONTENT_DIR: &str = "content";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeaturePackId {
    /// Producer name, the key of the feature-pack scoped maps.
    pub producer: String,
    pub version: String,
}

impl FeaturePackId {
    pub fn new(producer: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for FeaturePackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.producer, self.version)
    }
}

/// A versioned unit of packages plus a resource tree.
#[derive(Debug, Clone)]
pub struct FeaturePack {
    pub id: FeaturePackId,
    /// Root directory; resources live under `resources/`.
    pub dir: PathBuf,
    /// Packages in install order.
    pub packages: Vec<Package>,
    /// Default configurations the pack ships; generated by the install.
    pub configs: Vec<ExampleConfig>,
}

impl FeaturePack {
    pub fn new(id: FeaturePackId, dir: impl Into<PathBuf>, packages: Vec<Package>) -> Self {
        Self {
            id,
            dir: dir.into(),
            packages,
            configs: Vec::new(),
        }
    }

    pub fn with_configs(mut self, configs: Vec<ExampleConfig>) -> Self {
        self.configs = configs;
        self
    }

    pub fn producer(&self) -> &str {
        &self.id.producer
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.dir.join("resources")
    }

    /// Path of a resource, relative to the resource tree.
    pub fn resource(&self, rel: &str) -> PathBuf {
        self.resources_dir().join(rel)
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub dir: PathBuf,
}

impl Package {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.dir.join(PLUGIN_DIR)
    }

    pub fn module_dir(&self) -> PathBuf {
        self.plugin_dir().join(MODULE_DIR)
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.plugin_dir().join(TASKS_FILE)
    }

    pub fn content_dir(&self) -> PathBuf {
        self.dir.join(CONTENT_DIR)
    }
}

/// Relative paths recorded by a prior installation of the same target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsDiff {
    paths: BTreeSet<PathBuf>,
}

impl FsDiff {
    /// One relative path per line; blank lines are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading file-system diff '{}'", path.display()))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect())
    }

    pub fn contains(&self, rel: impl AsRef<Path>) -> bool {
        self.paths.contains(rel.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for FsDiff {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Maps resolved coordinates to a local file.
pub trait ArtifactResolver {
    /// Fails with [`crate::error::InstallError::ArtifactResolution`] when the
    /// artifact is unavailable.
    fn resolve(&self, coords: &ArtifactCoords) -> Result<PathBuf>;
}
