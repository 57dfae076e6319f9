//! Feature packs laid out in a directory and described by `layout.toml`.
//!
//! ```toml
//! [[feature-packs]]
//! producer = "org.wildfly.core:wildfly-core-galleon-pack"
//! version = "20.0.0.Final"
//! dir = "core"
//! packages = ["docs.schema", "org.jboss.as.server"]
//!
//! [[feature-packs.configs]]
//! model = "standalone"
//! name = "standalone.xml"
//! properties = { "--server-config" = "standalone.xml" }
//! ```
//!
//! `packages` is optional; when absent every directory under
//! `<dir>/packages/` is a package, in file-name order. `configs` lists the
//! configurations the pack declares.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{FeaturePack, FeaturePackId, Package};
use crate::tasks::ExampleConfig;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct LayoutToml {
    feature_packs: Vec<FeaturePackToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FeaturePackToml {
    producer: String,
    version: String,
    dir: PathBuf,
    packages: Option<Vec<String>>,
    #[serde(default)]
    configs: Vec<ExampleConfig>,
}

/// Ordered feature packs loaded from a layout descriptor.
#[derive(Debug, Clone)]
pub struct Layout {
    pub feature_packs: Vec<FeaturePack>,
}

impl Layout {
    /// Load `layout.toml`; relative `dir` values resolve against its parent.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading layout '{}'", path.display()))?;
        let parsed: LayoutToml = toml::from_str(&content)
            .with_context(|| format!("parsing layout '{}'", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut feature_packs = Vec::with_capacity(parsed.feature_packs.len());
        for entry in parsed.feature_packs {
            let dir = if entry.dir.is_absolute() {
                entry.dir
            } else {
                base.join(entry.dir)
            };
            if !dir.is_dir() {
                bail!(
                    "feature-pack '{}' directory '{}' does not exist",
                    entry.producer,
                    dir.display()
                );
            }
            let packages_dir = dir.join("packages");
            let names = match entry.packages {
                Some(names) => names,
                None => discover_packages(&packages_dir)?,
            };
            let packages = names
                .into_iter()
                .map(|name| {
                    let pkg_dir = packages_dir.join(&name);
                    Package::new(name, pkg_dir)
                })
                .collect();
            feature_packs.push(
                FeaturePack::new(FeaturePackId::new(entry.producer, entry.version), dir, packages)
                    .with_configs(entry.configs),
            );
        }
        Ok(Self { feature_packs })
    }
}

fn discover_packages(packages_dir: &Path) -> Result<Vec<String>> {
    if !packages_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(packages_dir)
        .with_context(|| format!("listing packages in '{}'", packages_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
