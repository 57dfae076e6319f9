//! Install pipeline.
//!
//! One [`Installer::install`] call turns an ordered list of feature packs into
//! a staged tree:
//!
//! 1. refuse to touch an installation whose server is running;
//! 2. load version and task properties plus schema groups from every pack;
//! 3. stage each package's module templates and run its processing-phase
//!    tasks, queueing finalizing-phase ones;
//! 4. rewrite every module descriptor from the last package that supplied it;
//! 5. merge `modules/layers.conf` when several packages contributed one;
//! 6. generate configurations, if any pack or the request declares one;
//! 7. run each pack's finalize script;
//! 8. drain the finalizing-phase queue;
//! 9. provision example configurations through a nested thin install.
//!
//! The nested install ([`InstallScope::ExampleConfigs`]) stops after step 6.
//!
//! Failures abort the run. Nothing already written is rolled back.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::InstallOptions;
use crate::configgen::{generate_configs, ConfigGenerator};
use crate::error::InstallError;
use crate::executor::xslt::StylesheetCompiler;
use crate::executor::Executor;
use crate::layers::{merge_if_needed, LayerListMerger, LayersConfMerger, LayersConfSources};
use crate::module_xml::{
    rewrite_descriptor, ArchiveIndexer, ModuleOverride, ModuleOwners, RewriteContext, RewriteOutcome,
};
use crate::provider::{ArtifactResolver, FeaturePack, FeaturePackId, FsDiff};
use crate::schema::SchemaGroups;
use crate::scripts::{run_script, ScriptLauncher};
use crate::staging::{copy_file, ensure_dir, stage_module_tree};
use crate::tasks::{ExampleConfig, ExampleConfigSet, PackageTasks, Phase, Task};
use crate::versions::{RegistryBuilder, VersionRegistry};

pub const ARTIFACT_VERSIONS_PROPS: &str = "wildfly/artifact-versions.properties";
pub const TASK_PROPS: &str = "wildfly/wildfly-tasks.properties";
pub const FINALIZE_SCRIPT: &str = "wildfly/scripts/finalize.cli";
pub const EXAMPLE_CONFIGS_DIR: &str = "docs/examples/configs";

const STARTUP_MARKERS: [(&str, &str); 2] = [
    ("standalone/tmp/startup-marker", "standalone"),
    ("domain/tmp/startup-marker", "domain"),
];

/// Which steps an install runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallScope {
    /// Every step.
    #[default]
    Primary,
    /// Scratch install that only produces example configs: pack configs,
    /// finalize scripts, finalizing-phase tasks and example provisioning
    /// are skipped.
    ExampleConfigs,
}

/// What to install and where.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// In install order; later packs override earlier ones.
    pub feature_packs: Vec<FeaturePack>,
    pub staged_dir: PathBuf,
    pub options: InstallOptions,
    /// Recorded state of a previous installation at the same target.
    pub fs_diff: Option<FsDiff>,
    /// Installer resources; holds the config generator archive.
    pub plugin_resources: PathBuf,
    /// Configurations to generate in addition to the ones packs declare.
    pub configs: Vec<ExampleConfig>,
    /// Run the example-config step when packages request examples.
    pub provision_examples: bool,
    pub scope: InstallScope,
}

impl InstallRequest {
    pub fn new(feature_packs: Vec<FeaturePack>, staged_dir: impl Into<PathBuf>) -> Self {
        Self {
            feature_packs,
            staged_dir: staged_dir.into(),
            options: InstallOptions::default(),
            fs_diff: None,
            plugin_resources: PathBuf::new(),
            configs: Vec::new(),
            provision_examples: true,
            scope: InstallScope::Primary,
        }
    }

    /// Pack-declared configs in install order, then requested ones not
    /// already declared. The example-config scope only uses requested ones.
    pub fn configs_to_generate(&self) -> Vec<ExampleConfig> {
        let declared: Vec<&ExampleConfig> = match self.scope {
            InstallScope::Primary => self.feature_packs.iter().flat_map(|fp| &fp.configs).collect(),
            InstallScope::ExampleConfigs => Vec::new(),
        };
        let mut configs: Vec<ExampleConfig> = Vec::new();
        for config in declared.into_iter().chain(&self.configs) {
            if !configs
                .iter()
                .any(|c| c.model == config.model && c.name == config.name)
            {
                configs.push(config.clone());
            }
        }
        configs
    }
}

/// How far a package got through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStage {
    Discovered,
    TasksLoaded,
    ImmediateTasksExecuted,
    /// Has finalizing-phase tasks waiting in the queue.
    QueuedForFinalizing,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub feature_pack: FeaturePackId,
    pub package: String,
    pub stage: PackageStage,
    pub deferred_tasks: usize,
}

/// Summary of a completed install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub packages: Vec<PackageReport>,
    pub module_overrides: Vec<ModuleOverride>,
    pub descriptors_rewritten: usize,
    pub descriptors_copied: usize,
    pub layers_merged: bool,
    pub configs_generated: bool,
    pub finalize_scripts: Vec<PathBuf>,
    pub deferred_tasks: usize,
    /// Example configs copied, relative to the staged root.
    pub example_configs: Vec<PathBuf>,
}

struct DeferredTask {
    feature_pack: usize,
    package: usize,
    report: usize,
    task: Task,
}

/// The pipeline and its collaborators.
pub struct Installer<'a> {
    artifacts: &'a dyn ArtifactResolver,
    indexer: &'a dyn ArchiveIndexer,
    stylesheets: &'a dyn StylesheetCompiler,
    config_generator: &'a dyn ConfigGenerator,
    layers: &'a dyn LayersConfMerger,
    launcher: ScriptLauncher,
}

impl<'a> Installer<'a> {
    pub fn new(
        artifacts: &'a dyn ArtifactResolver,
        indexer: &'a dyn ArchiveIndexer,
        stylesheets: &'a dyn StylesheetCompiler,
        config_generator: &'a dyn ConfigGenerator,
    ) -> Self {
        Self {
            artifacts,
            indexer,
            stylesheets,
            config_generator,
            layers: &LayerListMerger,
            launcher: ScriptLauncher::default(),
        }
    }

    pub fn with_layers_merger(mut self, layers: &'a dyn LayersConfMerger) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_launcher(mut self, launcher: ScriptLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn install(&self, request: &InstallRequest) -> Result<InstallReport> {
        let started = Instant::now();
        let staged = request.staged_dir.as_path();
        info!(
            staged = %staged.display(),
            feature_packs = request.feature_packs.len(),
            thin = request.options.thin,
            "installing"
        );

        if let Some(diff) = &request.fs_diff {
            check_server_stopped(diff)?;
        }

        let (registry, schema_groups) = load_registry(&request.feature_packs)?;
        ensure_dir(staged)?;

        let mut report = InstallReport::default();
        let mut owners = ModuleOwners::new();
        let mut layers_sources = LayersConfSources::default();
        let mut deferred = Vec::new();
        let mut executor = Executor::new(
            staged,
            &registry,
            &schema_groups,
            self.artifacts,
            self.stylesheets,
        );

        for (fp_idx, fp) in request.feature_packs.iter().enumerate() {
            for (pkg_idx, pkg) in fp.packages.iter().enumerate() {
                let mut entry = PackageReport {
                    feature_pack: fp.id.clone(),
                    package: pkg.name.clone(),
                    stage: PackageStage::Discovered,
                    deferred_tasks: 0,
                };

                let module_dir = pkg.module_dir();
                if module_dir.is_dir() {
                    let tree = stage_module_tree(&module_dir, staged).with_context(|| {
                        format!(
                            "staging module templates of feature-pack {} package {}",
                            fp.id, pkg.name
                        )
                    })?;
                    for descriptor in tree.descriptors {
                        owners.claim(descriptor, (fp_idx, pkg_idx), &fp.id, &pkg.name);
                    }
                    layers_sources.collect_from(&module_dir);
                }

                let tasks_file = pkg.tasks_file();
                if tasks_file.is_file() {
                    let tasks = PackageTasks::load(&tasks_file)?;
                    entry.stage = PackageStage::TasksLoaded;
                    for task in tasks.tasks {
                        if task.phase() == Phase::Finalizing {
                            entry.deferred_tasks += 1;
                            deferred.push(DeferredTask {
                                feature_pack: fp_idx,
                                package: pkg_idx,
                                report: report.packages.len(),
                                task,
                            });
                        } else {
                            executor.execute(fp, pkg, &task)?;
                        }
                    }
                }
                entry.stage = if entry.deferred_tasks > 0 {
                    PackageStage::QueuedForFinalizing
                } else {
                    PackageStage::ImmediateTasksExecuted
                };
                debug!(feature_pack = %fp.id, package = %pkg.name, stage = ?entry.stage, "package processed");
                report.packages.push(entry);
            }
        }

        self.rewrite_descriptors(request, &registry, &schema_groups, &owners, &mut report)?;
        report.module_overrides = owners.overrides().to_vec();

        report.layers_merged = merge_if_needed(self.layers, &layers_sources, staged)?;

        let configs = request.configs_to_generate();
        if !configs.is_empty() {
            generate_configs(
                self.config_generator,
                staged,
                &request.plugin_resources,
                registry.merged_versions(),
                self.artifacts,
                request.options.fork_config_generation,
                request.options.dump_config_scripts.as_deref(),
                &configs,
            )?;
            report.configs_generated = true;
        }

        if request.scope == InstallScope::ExampleConfigs {
            debug!(deferred_tasks = deferred.len(), "example config install, skipping finalization");
            return Ok(report);
        }

        // Finalize scripts see the tree before finalizing-phase tasks run.
        for fp in &request.feature_packs {
            let script = fp.resource(FINALIZE_SCRIPT);
            if script.is_file() {
                run_script(staged, &script, &self.launcher)
                    .with_context(|| format!("finalizing feature-pack {}", fp.id))?;
                report.finalize_scripts.push(script);
            }
        }

        for item in &deferred {
            let fp = &request.feature_packs[item.feature_pack];
            let pkg = &fp.packages[item.package];
            executor.execute(fp, pkg, &item.task)?;
            report.packages[item.report].stage = PackageStage::Finalized;
        }
        report.deferred_tasks = deferred.len();

        let examples = executor.example_configs();
        if request.provision_examples && !examples.is_empty() {
            report.example_configs = self.provision_example_configs(request, examples)?;
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            packages = report.packages.len(),
            "install finished"
        );
        Ok(report)
    }

    fn rewrite_descriptors(
        &self,
        request: &InstallRequest,
        registry: &VersionRegistry,
        schema_groups: &SchemaGroups,
        owners: &ModuleOwners,
        report: &mut InstallReport,
    ) -> Result<()> {
        if owners.is_empty() {
            return Ok(());
        }
        let staged = request.staged_dir.as_path();
        info!(descriptors = owners.len(), "processing module templates");
        for (rel, (fp_idx, pkg_idx)) in owners.iter() {
            let fp = &request.feature_packs[fp_idx];
            let pkg = &fp.packages[pkg_idx];
            let ctx = RewriteContext {
                versions: registry.producer_versions(fp.producer()),
                artifacts: self.artifacts,
                indexer: self.indexer,
                schema_groups,
                staged,
                thin: request.options.thin,
            };
            let outcome = rewrite_descriptor(&ctx, &pkg.module_dir().join(rel), &staged.join(rel))
                .with_context(|| {
                    format!(
                        "failed to process module template for feature-pack {} package {}",
                        fp.id, pkg.name
                    )
                })?;
            match outcome {
                RewriteOutcome::Copied => report.descriptors_copied += 1,
                RewriteOutcome::Rewritten { .. } => report.descriptors_rewritten += 1,
            }
        }
        Ok(())
    }

    /// Install the packs up to the last origin thin into a scratch
    /// directory with only the example configs, then copy the produced files
    /// into the docs.
    fn provision_example_configs(
        &self,
        request: &InstallRequest,
        examples: &ExampleConfigSet,
    ) -> Result<Vec<PathBuf>> {
        let mut last_origin = 0;
        for (origin, _) in examples.iter() {
            let idx = request
                .feature_packs
                .iter()
                .rposition(|fp| fp.producer() == origin)
                .ok_or_else(|| {
                    InstallError::PreconditionViolation(format!(
                        "example configs reference feature pack '{origin}', which is not installed"
                    ))
                })?;
            last_origin = last_origin.max(idx);
        }
        let configs: Vec<ExampleConfig> = examples.configs().cloned().collect();

        let scratch = tempfile::Builder::new()
            .prefix("example-configs")
            .tempdir()
            .context("creating example configs directory")?;
        info!(configs = configs.len(), "generating example configs");

        let produced: Vec<PathBuf> = configs
            .iter()
            .map(|config| example_config_path(scratch.path(), config))
            .collect();
        let nested = InstallRequest {
            feature_packs: request.feature_packs[..=last_origin].to_vec(),
            staged_dir: scratch.path().to_path_buf(),
            options: InstallOptions {
                thin: true,
                ..request.options.clone()
            },
            fs_diff: None,
            plugin_resources: request.plugin_resources.clone(),
            configs,
            provision_examples: false,
            scope: InstallScope::ExampleConfigs,
        };
        self.install(&nested)
            .context("failed to generate example configs")?;

        let docs = Path::new(EXAMPLE_CONFIGS_DIR);
        let mut copied = Vec::with_capacity(produced.len());
        for src in produced {
            let Some(file_name) = src.file_name() else {
                continue;
            };
            if !src.is_file() {
                return Err(InstallError::MissingResource(src).into());
            }
            let rel = docs.join(file_name);
            copy_file(&src, &request.staged_dir.join(&rel))?;
            copied.push(rel);
        }
        Ok(copied)
    }
}

fn check_server_stopped(diff: &FsDiff) -> Result<()> {
    for (marker, mode) in STARTUP_MARKERS {
        if diff.contains(marker) {
            return Err(InstallError::PreconditionViolation(format!(
                "The server appears to be running ({mode} mode)."
            ))
            .into());
        }
    }
    Ok(())
}

/// Merged and per-producer properties plus schema groups of every pack.
pub fn load_registry(feature_packs: &[FeaturePack]) -> Result<(VersionRegistry, SchemaGroups)> {
    let mut builder = RegistryBuilder::new();
    let mut schema_groups = SchemaGroups::new();
    for fp in feature_packs {
        builder
            .register_source(
                fp.producer(),
                &fp.resource(ARTIFACT_VERSIONS_PROPS),
                &fp.resource(TASK_PROPS),
            )
            .with_context(|| format!("loading properties of feature-pack {}", fp.id))?;
        schema_groups.add_from(fp)?;
    }
    Ok((builder.finish(), schema_groups))
}

/// Where an install leaves the file for `config`.
///
/// The name comes from the model's `--server-config`, `--host-config` or
/// `--domain-config` property, falling back to the config name. Host
/// configs live with the domain ones.
pub fn example_config_path(install_dir: &Path, config: &ExampleConfig) -> PathBuf {
    let property = match config.model.as_str() {
        "standalone" => "--server-config",
        "host" => "--host-config",
        _ => "--domain-config",
    };
    let name = config
        .properties
        .as_ref()
        .and_then(|props| props.get(property))
        .unwrap_or(&config.name);
    let model_dir = if config.model == "host" {
        "domain"
    } else {
        config.model.as_str()
    };
    install_dir.join(model_dir).join("configuration").join(name)
}
