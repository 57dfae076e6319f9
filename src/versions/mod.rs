//! Version registry: artifact versions and task properties from every feature pack.
//!
//! Each feature pack may ship two property files. Their entries are kept in
//! two layers:
//! - a map scoped to the producing feature pack;
//! - a merged map where later feature packs overwrite earlier ones.
//!
//! [`RegistryBuilder`] accumulates sources in feature-pack order and is
//! frozen into a read-only [`VersionRegistry`] before any package is processed.

pub mod coords;
pub mod properties;

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::InstallError;
use crate::substitute::PropertyResolver;

pub use coords::{parse_coords, parse_placeholder, ArtifactCoords, ParsedCoords, Placeholder};
pub use properties::{parse_properties, read_properties, write_properties};

/// A flat string map: artifact key → coordinates, or property → value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    entries: BTreeMap<String, String>,
}

/// Artifact key (`g:a[::c]`) → concrete coordinates.
pub type VersionMap = PropertyMap;

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn extend(&mut self, other: &PropertyMap) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_btree(&self) -> &BTreeMap<String, String> {
        &self.entries
    }
}

impl From<BTreeMap<String, String>> for PropertyMap {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl PropertyResolver for PropertyMap {
    fn property(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

static EMPTY: PropertyMap = PropertyMap {
    entries: BTreeMap::new(),
};

/// Mutable accumulation state, one call per feature pack.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    producer_versions: BTreeMap<String, VersionMap>,
    merged_versions: VersionMap,
    producer_task_props: BTreeMap<String, PropertyMap>,
    merged_task_props: PropertyMap,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one feature pack's property files. Absent files are skipped.
    pub fn register_source(
        &mut self,
        producer: &str,
        version_props: &Path,
        task_props: &Path,
    ) -> Result<()> {
        if version_props.is_file() {
            let versions = PropertyMap::from(read_properties(version_props)?);
            debug!(
                producer,
                entries = versions.len(),
                "registered artifact versions"
            );
            self.add_versions(producer, versions);
        }
        if task_props.is_file() {
            let props = PropertyMap::from(read_properties(task_props)?);
            debug!(producer, entries = props.len(), "registered task properties");
            self.add_task_props(producer, props);
        }
        Ok(())
    }

    pub fn add_versions(&mut self, producer: &str, versions: VersionMap) {
        self.merged_versions.extend(&versions);
        self.producer_versions
            .entry(producer.to_string())
            .or_default()
            .extend(&versions);
    }

    pub fn add_task_props(&mut self, producer: &str, props: PropertyMap) {
        self.merged_task_props.extend(&props);
        self.producer_task_props
            .entry(producer.to_string())
            .or_default()
            .extend(&props);
    }

    pub fn finish(self) -> VersionRegistry {
        VersionRegistry {
            producer_versions: self.producer_versions,
            merged_versions: self.merged_versions,
            producer_task_props: self.producer_task_props,
            merged_task_props: self.merged_task_props,
        }
    }
}

/// Frozen registry consulted during package, task and descriptor processing.
#[derive(Debug, Default)]
pub struct VersionRegistry {
    producer_versions: BTreeMap<String, VersionMap>,
    merged_versions: VersionMap,
    producer_task_props: BTreeMap<String, PropertyMap>,
    merged_task_props: PropertyMap,
}

impl VersionRegistry {
    pub fn producer_versions(&self, producer: &str) -> &VersionMap {
        self.producer_versions.get(producer).unwrap_or(&EMPTY)
    }

    pub fn merged_versions(&self) -> &VersionMap {
        &self.merged_versions
    }

    pub fn producer_task_props(&self, producer: &str) -> &PropertyMap {
        self.producer_task_props.get(producer).unwrap_or(&EMPTY)
    }

    pub fn merged_task_props(&self) -> &PropertyMap {
        &self.merged_task_props
    }

    /// The version map a task or descriptor resolves against.
    pub fn version_scope(&self, producer: &str, feature_pack_scoped: bool) -> &VersionMap {
        if feature_pack_scoped {
            self.producer_versions(producer)
        } else {
            &self.merged_versions
        }
    }

    pub fn task_props_scope(&self, producer: &str, feature_pack_scoped: bool) -> &PropertyMap {
        if feature_pack_scoped {
            self.producer_task_props(producer)
        } else {
            &self.merged_task_props
        }
    }
}

/// Resolve a literal coordinate, symbolic key or `${key[?opts]}` placeholder.
///
/// Returns `Ok(None)` only for an absent key when `optional` is set.
pub fn resolve(scope: &VersionMap, expr: &str, optional: bool) -> Result<Option<ArtifactCoords>> {
    let body = match parse_placeholder(expr) {
        Some(placeholder) => placeholder.body,
        None => expr,
    };

    if let Ok(ParsedCoords::Concrete(coords)) = parse_coords(body) {
        return Ok(Some(coords));
    }

    match scope.get(body) {
        Some(value) => Ok(Some(ArtifactCoords::parse(value)?)),
        None if optional => Ok(None),
        None => Err(InstallError::UnresolvedArtifactCoordinate {
            key: body.to_string(),
        }
        .into()),
    }
}
