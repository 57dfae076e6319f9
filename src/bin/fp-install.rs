use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use featurepack_installer::artifact_store::ArtifactStore;
use featurepack_installer::configgen::ProcessConfigGenerator;
use featurepack_installer::executor::xslt::XsltprocCompiler;
use featurepack_installer::installer::load_registry;
use featurepack_installer::module_xml::{ArchiveIndexer, NoIndexer};
use featurepack_installer::provider::{ArtifactResolver, FsDiff, Layout, MavenRepository};
use featurepack_installer::tasks::ExampleConfig;
use featurepack_installer::versions::{ArtifactCoords, VersionMap};
use featurepack_installer::{InstallOptions, InstallRequest, Installer, InstallerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install feature packs into a staged server tree.
#[derive(Parser, Debug)]
#[command(name = "fp-install", version)]
struct Cli {
    /// Installer configuration (`installer.toml`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage the feature packs of a layout
    Install(InstallArgs),

    /// Print artifact versions in properties form
    Versions(VersionsArgs),

    /// Manage the content-addressed artifact store
    Store {
        #[command(subcommand)]
        command: StoreCommand,
    },
}

#[derive(Parser, Debug)]
struct InstallArgs {
    /// Feature-pack layout (`layout.toml`)
    #[arg(long)]
    layout: PathBuf,

    /// Output directory
    #[arg(long)]
    staged: PathBuf,

    /// Install option, `NAME` or `NAME=VALUE` (dist-mode, fork-config-generation, dump-config-scripts)
    #[arg(long = "option", short = 'o')]
    options: Vec<String>,

    /// File-system diff recorded by a previous install at the same target
    #[arg(long)]
    fs_diff: Option<PathBuf>,

    /// Installer resources holding the config generator
    #[arg(long, default_value = ".")]
    plugin_resources: PathBuf,

    /// Configuration to generate, `MODEL:NAME`
    #[arg(long = "generate-config")]
    configs: Vec<String>,

    /// Skip example configuration provisioning
    #[arg(long)]
    no_examples: bool,
}

#[derive(Parser, Debug)]
struct VersionsArgs {
    /// Feature-pack layout (`layout.toml`)
    #[arg(long)]
    layout: PathBuf,

    /// Only the versions shipped by this producer
    #[arg(long)]
    producer: Option<String>,
}

#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Import a file under the given coordinates
    Put {
        /// `group:artifact:version[:classifier[:type]]`
        coords: String,
        file: PathBuf,
    },

    /// List stored artifacts
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => InstallerConfig::load(path)?,
        None => InstallerConfig::default(),
    };

    match cli.command {
        Command::Install(args) => install(&config, args),
        Command::Versions(args) => print_versions(&args),
        Command::Store { command } => store(&config, command),
    }
}

fn install(config: &InstallerConfig, args: InstallArgs) -> Result<()> {
    let layout = Layout::load(&args.layout)?;
    let artifacts = open_resolver(config)?;
    let indexer: &dyn ArchiveIndexer = match &config.indexer {
        Some(indexer) => indexer,
        None => &NoIndexer,
    };
    let xslt = match &config.xslt.xsltproc {
        Some(path) => XsltprocCompiler::new(path),
        None => XsltprocCompiler::locate().unwrap_or_else(|_| XsltprocCompiler::new("xsltproc")),
    };
    let mut generator = match &config.config_generator.java {
        Some(path) => ProcessConfigGenerator::new(path),
        None => ProcessConfigGenerator::locate().unwrap_or_else(|_| ProcessConfigGenerator::new("java")),
    };
    if let Some(main_class) = &config.config_generator.main_class {
        generator = generator.with_main_class(main_class);
    }

    let mut request = InstallRequest::new(layout.feature_packs, &args.staged);
    request.options = InstallOptions::from_args(&args.options)?;
    request.fs_diff = args.fs_diff.as_deref().map(FsDiff::load).transpose()?;
    request.plugin_resources = args.plugin_resources;
    request.configs = args
        .configs
        .iter()
        .map(|value| parse_config(value))
        .collect::<Result<_>>()?;
    request.provision_examples = !args.no_examples;

    let report = Installer::new(artifacts.as_ref(), indexer, &xslt, &generator)
        .with_launcher(config.finalize.clone())
        .install(&request)?;

    for overridden in &report.module_overrides {
        info!(
            "module {} from {} {} overridden by {} {}",
            overridden.path.display(),
            overridden.previous_feature_pack,
            overridden.previous_package,
            overridden.feature_pack,
            overridden.package
        );
    }
    info!(
        packages = report.packages.len(),
        descriptors = report.descriptors_rewritten + report.descriptors_copied,
        deferred_tasks = report.deferred_tasks,
        example_configs = report.example_configs.len(),
        "staged '{}'",
        args.staged.display()
    );
    Ok(())
}

fn open_resolver(config: &InstallerConfig) -> Result<Box<dyn ArtifactResolver>> {
    if let Some(root) = &config.artifacts.store {
        return Ok(Box::new(ArtifactStore::open(root)?));
    }
    if let Some(root) = &config.artifacts.maven_repository {
        return Ok(Box::new(MavenRepository::new(root)));
    }
    Ok(Box::new(ArtifactStore::open_default()?))
}

fn parse_config(value: &str) -> Result<ExampleConfig> {
    let Some((model, name)) = value.split_once(':') else {
        bail!("invalid config '{value}' (expected MODEL:NAME)");
    };
    if model.is_empty() || name.is_empty() {
        bail!("invalid config '{value}' (expected MODEL:NAME)");
    }
    Ok(ExampleConfig {
        model: model.to_string(),
        name: name.to_string(),
        properties: Some(BTreeMap::new()),
    })
}

fn print_versions(args: &VersionsArgs) -> Result<()> {
    let layout = Layout::load(&args.layout)?;
    let (registry, _) = load_registry(&layout.feature_packs)?;
    let versions: &VersionMap = match &args.producer {
        Some(producer) => registry.producer_versions(producer),
        None => registry.merged_versions(),
    };
    for (key, value) in versions.iter() {
        println!("{key}={value}");
    }
    Ok(())
}

fn store(config: &InstallerConfig, command: StoreCommand) -> Result<()> {
    let store = match &config.artifacts.store {
        Some(root) => ArtifactStore::open(root)?,
        None => ArtifactStore::open_default()?,
    };
    match command {
        StoreCommand::Put { coords, file } => put(&store, &coords, &file),
        StoreCommand::List => {
            for entry in store.list()? {
                println!("{} {} {}", entry.coords, entry.sha256, entry.size);
            }
            Ok(())
        }
    }
}

fn put(store: &ArtifactStore, coords: &str, file: &Path) -> Result<()> {
    let coords = ArtifactCoords::parse(coords)?;
    let sha256 = store
        .put(&coords, file)
        .with_context(|| format!("storing {coords}"))?;
    println!("{sha256}");
    Ok(())
}
