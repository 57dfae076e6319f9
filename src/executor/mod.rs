//! Task executor - interprets [`Task`] variants against the staged tree.
//!
//! # Usage
//!
//! ```rust,ignore
//! use featurepack_installer::executor::{Executor, xslt::XsltprocCompiler};
//!
//! let compiler = XsltprocCompiler::locate()?;
//! let mut executor = Executor::new(&staged, &registry, &schema_groups, &repo, &compiler);
//! for task in &tasks.tasks {
//!     executor.execute(&feature_pack, &package, task)?;
//! }
//! ```

pub mod artifacts;
pub mod directories;
pub mod paths;
pub mod xslt;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use crate::provider::{ArtifactResolver, FeaturePack, Package};
use crate::schema::SchemaGroups;
use crate::substitute::PropertyResolver;
use crate::tasks::{CopyRoot, ExampleConfigSet, Task};
use crate::versions::VersionRegistry;
use xslt::{StylesheetCache, StylesheetCompiler};

/// Shared, read-only install state plus the accumulators tasks feed.
pub struct Executor<'a> {
    staged: &'a Path,
    registry: &'a VersionRegistry,
    schema_groups: &'a SchemaGroups,
    artifacts: &'a dyn ArtifactResolver,
    stylesheets: StylesheetCache<'a>,
    example_configs: ExampleConfigSet,
}

impl<'a> Executor<'a> {
    pub fn new(
        staged: &'a Path,
        registry: &'a VersionRegistry,
        schema_groups: &'a SchemaGroups,
        artifacts: &'a dyn ArtifactResolver,
        stylesheets: &'a dyn StylesheetCompiler,
    ) -> Self {
        Self {
            staged,
            registry,
            schema_groups,
            artifacts,
            stylesheets: StylesheetCache::new(stylesheets),
            example_configs: ExampleConfigSet::default(),
        }
    }

    /// Execute one task declared by `package` of `feature_pack`.
    pub fn execute(&mut self, feature_pack: &FeaturePack, package: &Package, task: &Task) -> Result<()> {
        debug!(
            feature_pack = %feature_pack.id,
            package = %package.name,
            task = task.kind(),
            phase = %task.phase(),
            "executing task"
        );
        self.dispatch(feature_pack, package, task).with_context(|| {
            format!(
                "executing {} task of feature-pack {} package {}",
                task.kind(),
                feature_pack.id,
                package.name
            )
        })
    }

    fn dispatch(&mut self, feature_pack: &FeaturePack, package: &Package, task: &Task) -> Result<()> {
        let producer = feature_pack.producer();
        match task {
            Task::CopyArtifact {
                artifact,
                to_location,
                extract,
                optional,
                feature_pack_version,
                ..
            } => artifacts::handle_copy_artifact(
                self.staged,
                self.registry.version_scope(producer, *feature_pack_version),
                self.artifacts,
                self.schema_groups,
                artifact,
                to_location,
                *extract,
                *optional,
            )?,

            Task::CopyPath {
                src,
                root,
                target,
                replace_properties,
                ..
            } => {
                let root_dir = match root {
                    CopyRoot::Content => package.content_dir(),
                    CopyRoot::Resources => package.plugin_dir(),
                    CopyRoot::Staged => self.staged.to_path_buf(),
                };
                let resolver: Option<&dyn PropertyResolver> = if *replace_properties {
                    Some(self.registry.merged_task_props())
                } else {
                    None
                };
                paths::handle_copy_path(&root_dir, self.staged, src, target.as_deref(), resolver)?;
            }

            Task::DeletePath {
                path,
                recursive,
                if_empty,
                ..
            } => paths::handle_delete_path(self.staged, path, *recursive, *if_empty)?,

            Task::XslTransform {
                src,
                output,
                stylesheet,
                params,
                feature_pack_properties,
                ..
            } => xslt::handle_xsl_transform(
                self.staged,
                &mut self.stylesheets,
                src,
                output,
                stylesheet,
                params,
                self.registry
                    .task_props_scope(producer, *feature_pack_properties)
                    .as_btree(),
            )?,

            Task::MkDirs { dirs, .. } => directories::handle_mkdirs(self.staged, dirs)?,

            Task::ExampleConfigs { origin, configs, .. } => {
                let origin = origin.as_deref().unwrap_or(producer);
                self.example_configs.add(origin, configs.iter().cloned());
            }
        }
        Ok(())
    }

    pub fn example_configs(&self) -> &ExampleConfigSet {
        &self.example_configs
    }
}
