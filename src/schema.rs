//! Schema extraction into `docs/schema`.
//!
//! Artifacts whose group is listed in a [`SchemaGroups`] set carry XML
//! schemas under `schema/`; those are copied out of the archive whenever the
//! artifact is installed, in thin and full mode alike.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::provider::FeaturePack;
use crate::staging::ensure_dir;

/// Package that declares schema groups.
pub const SCHEMA_PACKAGE: &str = "docs.schema";
/// Resource inside that package's plugin directory.
pub const SCHEMA_GROUPS_FILE: &str = "schema-groups.txt";
/// Target directory inside the staged tree.
pub const SCHEMA_DOCS_DIR: &str = "docs/schema";

const ARCHIVE_SCHEMA_DIR: &str = "schema";

/// Artifact groups that trigger schema extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaGroups {
    groups: BTreeSet<String>,
}

impl SchemaGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the groups of a feature pack's `docs.schema` package, if any.
    pub fn add_from(&mut self, fp: &FeaturePack) -> Result<()> {
        let Some(pkg) = fp.package(SCHEMA_PACKAGE) else {
            return Ok(());
        };
        let path = pkg.plugin_dir().join(SCHEMA_GROUPS_FILE);
        if !path.is_file() {
            return Ok(());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading schema groups '{}'", path.display()))?;
        for group in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.groups.insert(group.to_string());
        }
        debug!(producer = fp.producer(), groups = self.groups.len(), "loaded schema groups");
        Ok(())
    }

    pub fn insert(&mut self, group: impl Into<String>) {
        self.groups.insert(group.into());
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Copy the archive's `schema/**` entries into `<staged>/docs/schema/`,
/// overwriting. Returns the number of files written.
pub fn extract_schemas(artifact: &Path, staged_dir: &Path) -> Result<usize> {
    let file = File::open(artifact)
        .with_context(|| format!("opening artifact '{}'", artifact.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("reading archive '{}'", artifact.display()))?;
    let target_root = staged_dir.join(SCHEMA_DOCS_DIR);

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("reading entry {i} of '{}'", artifact.display()))?;
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let Some(rel) = schema_relative(&name) else {
            continue;
        };
        let target = target_root.join(rel);
        if entry.is_dir() {
            ensure_dir(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("creating '{}'", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("extracting '{}'", target.display()))?;
        written += 1;
    }
    debug!(artifact = %artifact.display(), written, "extracted schemas");
    Ok(written)
}

fn schema_relative(name: &Path) -> Option<PathBuf> {
    let mut components = name.components();
    match components.next() {
        Some(Component::Normal(first)) if first == ARCHIVE_SCHEMA_DIR => {}
        _ => return None,
    }
    let rest: PathBuf = components.collect();
    if rest.as_os_str().is_empty() {
        None
    } else {
        Some(rest)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::{FeaturePackId, Package};
    use std::io::Write;
    use tempfile::TempDir;

    /// Write a zip archive with the given `(name, content)` entries.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extracts_only_schema_subtree() {
        let temp = TempDir::new().unwrap();
        let jar = temp.path().join("subsystem.jar");
        write_zip(
            &jar,
            &[
                ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n"),
                ("schema/jboss-as-foo_1_0.xsd", "<xs:schema/>"),
                ("schema/nested/bar.xsd", "<xs:schema/>"),
                ("org/foo/Foo.class", "cafebabe"),
            ],
        );
        let staged = temp.path().join("staged");

        let written = extract_schemas(&jar, &staged).unwrap();

        assert_eq!(written, 2);
        assert!(staged.join("docs/schema/jboss-as-foo_1_0.xsd").is_file());
        assert!(staged.join("docs/schema/nested/bar.xsd").is_file());
        assert!(!staged.join("docs/schema/META-INF").exists());
    }

    #[test]
    fn loads_groups_from_schema_package() {
        let temp = TempDir::new().unwrap();
        let pkg_dir = temp.path().join("packages/docs.schema");
        fs::create_dir_all(pkg_dir.join("pm/wildfly")).unwrap();
        fs::write(
            pkg_dir.join("pm/wildfly/schema-groups.txt"),
            "org.wildfly.core\n\n  org.jboss.as \n",
        )
        .unwrap();
        let fp = FeaturePack::new(
            FeaturePackId::new("core", "1.0"),
            temp.path(),
            vec![Package::new(SCHEMA_PACKAGE, pkg_dir)],
        );

        let mut groups = SchemaGroups::new();
        groups.add_from(&fp).unwrap();

        assert!(groups.contains("org.wildfly.core"));
        assert!(groups.contains("org.jboss.as"));
        assert!(!groups.contains(""));
    }
}
