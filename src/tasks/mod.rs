//! Declarative install-time tasks.
//!
//! A package lists its tasks in `pm/wildfly/tasks.toml`. Tasks describe WHAT
//! happens to the staged tree; [`crate::executor`] interprets them.
//!
//! ```toml
//! mkdirs = ["standalone/data", "standalone/log"]
//!
//! [[tasks]]
//! kind = "copy-artifact"
//! artifact = "org.example:client"
//! to-location = "bin/client/"
//!
//! [[tasks]]
//! kind = "delete-path"
//! path = "standalone/tmp"
//! if-empty = true
//! phase = "finalizing"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// When a task runs.
///
/// `Processing` tasks run while their package is processed. `Finalizing`
/// tasks are queued and run after every package, module descriptor, layer
/// merge, config generation and finalize script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Processing,
    Finalizing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Processing => write!(f, "processing"),
            Phase::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// Root a [`Task::CopyPath`] source is relative to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyRoot {
    /// The package's `content/` directory.
    #[default]
    Content,
    /// The package's plugin resources, `pm/wildfly/`.
    Resources,
    /// The staged tree itself.
    Staged,
}

/// One example configuration requested by an [`Task::ExampleConfigs`] task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ExampleConfig {
    /// Config model: `standalone`, `domain` or `host`.
    pub model: String,
    pub name: String,
    /// Present for a configuration model, absent for a reference to the
    /// feature pack's default config of that id.
    pub properties: Option<BTreeMap<String, String>>,
}

/// Example configs requested across all packages, grouped by origin
/// producer in first-request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExampleConfigSet {
    by_origin: Vec<(String, Vec<ExampleConfig>)>,
}

impl ExampleConfigSet {
    pub fn add(&mut self, origin: &str, configs: impl IntoIterator<Item = ExampleConfig>) {
        let idx = match self.by_origin.iter().position(|(o, _)| o == origin) {
            Some(idx) => idx,
            None => {
                self.by_origin.push((origin.to_string(), Vec::new()));
                self.by_origin.len() - 1
            }
        };
        self.by_origin[idx].1.extend(configs);
    }

    pub fn is_empty(&self) -> bool {
        self.by_origin.iter().all(|(_, configs)| configs.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ExampleConfig])> {
        self.by_origin
            .iter()
            .map(|(origin, configs)| (origin.as_str(), configs.as_slice()))
    }

    pub fn configs(&self) -> impl Iterator<Item = &ExampleConfig> {
        self.by_origin.iter().flat_map(|(_, configs)| configs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Task {
    /// Copy (or unpack) a resolved artifact into the staged tree.
    #[serde(rename_all = "kebab-case")]
    CopyArtifact {
        artifact: String,
        to_location: String,
        #[serde(default)]
        extract: bool,
        #[serde(default)]
        optional: bool,
        /// Resolve against the feature pack's own versions instead of the
        /// merged map.
        #[serde(default)]
        feature_pack_version: bool,
        #[serde(default)]
        phase: Phase,
    },

    /// Copy a file or tree, optionally substituting `${...}` properties.
    #[serde(rename_all = "kebab-case")]
    CopyPath {
        src: String,
        #[serde(default)]
        root: CopyRoot,
        /// Relative to the staged tree; the staged root when absent.
        target: Option<String>,
        #[serde(default)]
        replace_properties: bool,
        #[serde(default)]
        phase: Phase,
    },

    /// Remove a staged path.
    #[serde(rename_all = "kebab-case")]
    DeletePath {
        path: String,
        #[serde(default)]
        recursive: bool,
        #[serde(default)]
        if_empty: bool,
        #[serde(default)]
        phase: Phase,
    },

    /// Apply an XSLT stylesheet to a staged XML file.
    #[serde(rename_all = "kebab-case")]
    XslTransform {
        src: String,
        output: String,
        stylesheet: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
        #[serde(default)]
        feature_pack_properties: bool,
        #[serde(default)]
        phase: Phase,
    },

    /// Create directories under the staged tree.
    #[serde(rename_all = "kebab-case")]
    MkDirs {
        dirs: Vec<String>,
        #[serde(default)]
        phase: Phase,
    },

    /// Request example configurations, generated after the install.
    #[serde(rename_all = "kebab-case")]
    ExampleConfigs {
        /// Producer of the feature pack the configs belong to; the
        /// declaring feature pack when absent.
        origin: Option<String>,
        configs: Vec<ExampleConfig>,
        #[serde(default)]
        phase: Phase,
    },
}

impl Task {
    pub fn phase(&self) -> Phase {
        match self {
            Task::CopyArtifact { phase, .. }
            | Task::CopyPath { phase, .. }
            | Task::DeletePath { phase, .. }
            | Task::XslTransform { phase, .. }
            | Task::MkDirs { phase, .. }
            | Task::ExampleConfigs { phase, .. } => *phase,
        }
    }

    /// Name for logging and error context.
    pub fn kind(&self) -> &'static str {
        match self {
            Task::CopyArtifact { .. } => "copy-artifact",
            Task::CopyPath { .. } => "copy-path",
            Task::DeletePath { .. } => "delete-path",
            Task::XslTransform { .. } => "xsl-transform",
            Task::MkDirs { .. } => "mkdirs",
            Task::ExampleConfigs { .. } => "example-configs",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TasksToml {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    mkdirs: Vec<String>,
}

/// Tasks declared by one package, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageTasks {
    pub tasks: Vec<Task>,
}

impl PackageTasks {
    /// Load a task descriptor. The `mkdirs` list becomes a trailing
    /// processing-phase [`Task::MkDirs`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading task descriptor '{}'", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("parsing task descriptor '{}'", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let parsed: TasksToml = toml::from_str(content)?;
        let mut tasks = parsed.tasks;
        if !parsed.mkdirs.is_empty() {
            tasks.push(mkdirs(parsed.mkdirs));
        }
        Ok(Self { tasks })
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper functions for readable task definitions
// ─────────────────────────────────────────────────────────────────────────────

/// Copy an artifact resolved against the merged version map.
pub fn copy_artifact(artifact: impl Into<String>, to_location: impl Into<String>) -> Task {
    Task::CopyArtifact {
        artifact: artifact.into(),
        to_location: to_location.into(),
        extract: false,
        optional: false,
        feature_pack_version: false,
        phase: Phase::Processing,
    }
}

/// Copy a path from the package content directory.
pub fn copy_path(src: impl Into<String>, target: impl Into<String>) -> Task {
    Task::CopyPath {
        src: src.into(),
        root: CopyRoot::Content,
        target: Some(target.into()),
        replace_properties: false,
        phase: Phase::Processing,
    }
}

/// Delete a staged path (non-recursive, unconditional).
pub fn delete_path(path: impl Into<String>) -> Task {
    Task::DeletePath {
        path: path.into(),
        recursive: false,
        if_empty: false,
        phase: Phase::Processing,
    }
}

/// Create directories.
pub fn mkdirs(dirs: impl IntoIterator<Item = impl Into<String>>) -> Task {
    Task::MkDirs {
        dirs: dirs.into_iter().map(Into::into).collect(),
        phase: Phase::Processing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_task_kind() {
        let tasks = PackageTasks::parse(
            r#"
            mkdirs = ["standalone/data"]

            [[tasks]]
            kind = "copy-artifact"
            artifact = "org.example:client"
            to-location = "bin/client/"
            optional = true

            [[tasks]]
            kind = "copy-path"
            src = "docs"
            root = "resources"
            replace-properties = true

            [[tasks]]
            kind = "delete-path"
            path = "standalone/tmp"
            if-empty = true
            phase = "finalizing"

            [[tasks]]
            kind = "xsl-transform"
            src = "standalone/configuration/standalone.xml"
            output = "standalone/configuration/standalone-ha.xml"
            stylesheet = "docs/ha.xsl"
            params = { profile = "ha" }

            [[tasks]]
            kind = "example-configs"
            configs = [{ model = "standalone", name = "standalone-ha.xml" }]
            "#,
        )
        .unwrap();

        let kinds: Vec<_> = tasks.tasks.iter().map(Task::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "copy-artifact",
                "copy-path",
                "delete-path",
                "xsl-transform",
                "example-configs",
                "mkdirs"
            ]
        );
        assert_eq!(tasks.tasks[2].phase(), Phase::Finalizing);
        assert_eq!(tasks.tasks[0].phase(), Phase::Processing);
        assert_eq!(tasks.tasks[5], mkdirs(["standalone/data"]));
        assert!(matches!(
            &tasks.tasks[1],
            Task::CopyPath { root: CopyRoot::Resources, target: None, replace_properties: true, .. }
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = PackageTasks::parse(
            r#"
            [[tasks]]
            kind = "delete-path"
            path = "x"
            recursively = true
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_descriptor_has_no_tasks() {
        assert!(PackageTasks::parse("").unwrap().is_empty());
    }

    #[test]
    fn example_configs_group_by_origin() {
        let cfg = |name: &str| ExampleConfig {
            model: "standalone".into(),
            name: name.into(),
            properties: None,
        };
        let mut set = ExampleConfigSet::default();
        assert!(set.is_empty());
        set.add("full", [cfg("a.xml")]);
        set.add("core", [cfg("b.xml")]);
        set.add("full", [cfg("c.xml")]);

        let origins: Vec<_> = set.iter().map(|(o, c)| (o, c.len())).collect();
        assert_eq!(origins, vec![("full", 2), ("core", 1)]);
        let names: Vec<_> = set.configs().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a.xml", "c.xml", "b.xml"]);
    }

    #[test]
    fn test_task_helpers() {
        assert_eq!(copy_artifact("g:a", "lib/").phase(), Phase::Processing);
        assert_eq!(delete_path("tmp").kind(), "delete-path");
        assert_eq!(copy_path("a", "b").kind(), "copy-path");
        assert_eq!(Phase::Finalizing.to_string(), "finalizing");
    }
}
