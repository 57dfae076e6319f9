//! Which package supplies each module descriptor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::provider::FeaturePackId;

/// Feature-pack index and package index into the install's pack list.
pub type PackageRef = (usize, usize);

/// A descriptor claimed by a later package, replacing an earlier claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOverride {
    /// Descriptor path relative to the staged root.
    pub path: PathBuf,
    pub previous_feature_pack: FeaturePackId,
    pub previous_package: String,
    pub feature_pack: FeaturePackId,
    pub package: String,
}

/// Descriptor path → last package to supply it.
///
/// Paths keep the position of their first claim; an override replaces the
/// owner in place.
#[derive(Debug, Default)]
pub struct ModuleOwners {
    owners: Vec<(PathBuf, Owner)>,
    positions: HashMap<PathBuf, usize>,
    overrides: Vec<ModuleOverride>,
}

#[derive(Debug, Clone)]
struct Owner {
    package: PackageRef,
    feature_pack_id: FeaturePackId,
    package_name: String,
}

impl ModuleOwners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `package` supplies `path`; a previous owner is replaced
    /// and the override recorded.
    pub fn claim(
        &mut self,
        path: PathBuf,
        package: PackageRef,
        feature_pack_id: &FeaturePackId,
        package_name: &str,
    ) {
        let owner = Owner {
            package,
            feature_pack_id: feature_pack_id.clone(),
            package_name: package_name.to_string(),
        };
        let previous = match self.positions.get(&path) {
            Some(&pos) => Some(std::mem::replace(&mut self.owners[pos].1, owner)),
            None => {
                self.positions.insert(path.clone(), self.owners.len());
                self.owners.push((path.clone(), owner));
                None
            }
        };
        if let Some(previous) = previous {
            debug!(
                "feature-pack {} package {} overrode module {} from feature-pack {} package {}",
                feature_pack_id,
                package_name,
                path.display(),
                previous.feature_pack_id,
                previous.package_name
            );
            self.overrides.push(ModuleOverride {
                path,
                previous_feature_pack: previous.feature_pack_id,
                previous_package: previous.package_name,
                feature_pack: feature_pack_id.clone(),
                package: package_name.to_string(),
            });
        }
    }

    /// Descriptors and their owners, in first-claim order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, PackageRef)> {
        self.owners
            .iter()
            .map(|(path, owner)| (path.as_path(), owner.package))
    }

    pub fn overrides(&self) -> &[ModuleOverride] {
        &self.overrides
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
