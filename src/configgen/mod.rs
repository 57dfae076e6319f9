//! Server configuration generation.
//!
//! The generator runs once against the fully staged tree. Its class path is
//! the generator archive shipped with the plugin resources plus the module
//! loader and CLI client artifacts from the merged version map.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::InstallError;
use crate::provider::ArtifactResolver;
use crate::tasks::ExampleConfig;
use crate::versions::{resolve, VersionMap};

/// Generator archive, relative to the plugin resources.
pub const CONFIG_GEN_JAR: &str = "wildfly/wildfly-config-gen.jar";
pub const CONFIG_GEN_MAIN_CLASS: &str = "org.wildfly.galleon.plugin.config.generator.WfConfigGenerator";
pub const MODULE_LOADER_KEY: &str = "org.jboss.modules:jboss-modules";
pub const CLI_CLIENT_KEY: &str = "org.wildfly.core:wildfly-cli::client";

/// Inputs of one generation run.
#[derive(Debug, Clone)]
pub struct ConfigGenContext<'a> {
    pub install_dir: &'a Path,
    /// Generator, module loader, CLI client.
    pub classpath: &'a [PathBuf; 3],
    /// Run the embedded server out of process.
    pub fork: bool,
    pub dump_config_scripts: Option<&'a str>,
    pub configs: &'a [ExampleConfig],
}

/// Produces server configurations inside a staged tree.
pub trait ConfigGenerator {
    fn generate(&self, ctx: &ConfigGenContext<'_>) -> Result<()>;
}

/// Launches the generator on a JVM.
#[derive(Debug, Clone)]
pub struct ProcessConfigGenerator {
    java: PathBuf,
    main_class: String,
}

impl ProcessConfigGenerator {
    pub fn new(java: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            main_class: CONFIG_GEN_MAIN_CLASS.to_string(),
        }
    }

    /// Use `java` from `PATH`.
    pub fn locate() -> Result<Self> {
        let java = which::which("java").context("java not found on PATH")?;
        Ok(Self::new(java))
    }

    pub fn with_main_class(mut self, main_class: impl Into<String>) -> Self {
        self.main_class = main_class.into();
        self
    }

    fn command(&self, ctx: &ConfigGenContext<'_>) -> Result<Command> {
        let classpath = std::env::join_paths(ctx.classpath.iter())
            .context("joining config generator class path")?;
        let mut cmd = Command::new(&self.java);
        cmd.arg("-cp")
            .arg(classpath)
            .arg(&self.main_class)
            .arg(ctx.install_dir)
            .current_dir(ctx.install_dir);
        if ctx.fork {
            cmd.arg("--fork");
        }
        if let Some(value) = ctx.dump_config_scripts {
            let mut arg = OsString::from("--dump-config-scripts=");
            arg.push(value);
            cmd.arg(arg);
        }
        for config in ctx.configs {
            cmd.arg(format!("--config={}/{}", config.model, config.name));
        }
        Ok(cmd)
    }
}

impl ConfigGenerator for ProcessConfigGenerator {
    fn generate(&self, ctx: &ConfigGenContext<'_>) -> Result<()> {
        let mut cmd = self.command(ctx)?;
        debug!(command = ?cmd, "launching config generator");
        let output = cmd
            .output()
            .with_context(|| format!("launching {}", self.java.display()))?;
        if output.status.success() {
            return Ok(());
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(InstallError::ExternalProcessFailure {
            context: Some("configuration".to_string()),
            output: text,
            status: output.status.code(),
        }
        .into())
    }
}

/// Resolve the three class path entries.
pub fn build_classpath(
    plugin_resources: &Path,
    merged: &VersionMap,
    artifacts: &dyn ArtifactResolver,
) -> Result<[PathBuf; 3]> {
    let generator = plugin_resources.join(CONFIG_GEN_JAR);
    if !generator.is_file() {
        return Err(InstallError::MissingResource(generator).into());
    }
    let resolve_key = |key: &str| -> Result<PathBuf> {
        // Not optional, so `None` cannot come back.
        let coords = resolve(merged, key, false)?
            .ok_or_else(|| InstallError::UnresolvedArtifactCoordinate { key: key.to_string() })?;
        artifacts.resolve(&coords)
    };
    let loader = resolve_key(MODULE_LOADER_KEY)?;
    let cli = resolve_key(CLI_CLIENT_KEY)?;
    Ok([generator, loader, cli])
}

/// Build the class path and run `generator` once.
#[allow(clippy::too_many_arguments)]
pub fn generate_configs(
    generator: &dyn ConfigGenerator,
    install_dir: &Path,
    plugin_resources: &Path,
    merged: &VersionMap,
    artifacts: &dyn ArtifactResolver,
    fork: bool,
    dump_config_scripts: Option<&str>,
    configs: &[ExampleConfig],
) -> Result<()> {
    let started = Instant::now();
    let classpath = build_classpath(plugin_resources, merged, artifacts)
        .with_context(|| format!("initializing config generator class path for {}", install_dir.display()))?;
    for (idx, entry) in classpath.iter().enumerate() {
        debug!("config generator class path {}. {}", idx + 1, entry.display());
    }

    generator.generate(&ConfigGenContext {
        install_dir,
        classpath: &classpath,
        fork,
        dump_config_scripts,
        configs,
    })?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "configuration generation finished"
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::MavenRepository;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    /// Records each call's class path and fork flag.
    #[derive(Default)]
    pub(crate) struct RecordingGenerator {
        pub(crate) calls: RefCell<Vec<(Vec<PathBuf>, bool)>>,
        /// `model/name` of every config requested, across calls.
        pub(crate) configs: RefCell<Vec<String>>,
    }

    impl ConfigGenerator for RecordingGenerator {
        fn generate(&self, ctx: &ConfigGenContext<'_>) -> Result<()> {
            self.calls
                .borrow_mut()
                .push((ctx.classpath.to_vec(), ctx.fork));
            self.configs
                .borrow_mut()
                .extend(ctx.configs.iter().map(|c| format!("{}/{}", c.model, c.name)));
            Ok(())
        }
    }

    fn seed_repo(temp: &TempDir) -> (MavenRepository, VersionMap) {
        let repo = MavenRepository::new(temp.path().join("repo"));
        let versions: VersionMap = [
            (MODULE_LOADER_KEY, "org.jboss.modules:jboss-modules:2.1.0::jar"),
            (CLI_CLIENT_KEY, "org.wildfly.core:wildfly-cli:21.0.0:client:jar"),
        ]
        .into_iter()
        .collect();
        for (_, value) in versions.iter() {
            let path = repo.artifact_path(&crate::versions::ArtifactCoords::parse(value).unwrap());
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"jar").unwrap();
        }
        (repo, versions)
    }

    #[test]
    fn classpath_resolves_generator_loader_and_client() {
        let temp = TempDir::new().unwrap();
        let (repo, versions) = seed_repo(&temp);
        let resources = temp.path().join("resources");
        fs::create_dir_all(resources.join("wildfly")).unwrap();
        fs::write(resources.join(CONFIG_GEN_JAR), b"gen").unwrap();

        let cp = build_classpath(&resources, &versions, &repo).unwrap();

        assert_eq!(cp[0], resources.join(CONFIG_GEN_JAR));
        assert!(cp[1].ends_with("jboss-modules-2.1.0.jar"));
        assert!(cp[2].ends_with("wildfly-cli-21.0.0-client.jar"));
    }

    #[test]
    fn missing_generator_archive_is_missing_resource() {
        let temp = TempDir::new().unwrap();
        let (repo, versions) = seed_repo(&temp);
        let generator = RecordingGenerator::default();

        let err = generate_configs(
            &generator,
            temp.path(),
            &temp.path().join("resources"),
            &versions,
            &repo,
            false,
            None,
            &[],
        )
        .unwrap_err();

        assert!(matches!(
            InstallError::find(&err),
            Some(InstallError::MissingResource(_))
        ));
        assert!(generator.calls.borrow().is_empty());
    }

    #[test]
    fn process_generator_arguments() {
        let config = ExampleConfig {
            model: "standalone".into(),
            name: "standalone.xml".into(),
            properties: None,
        };
        let classpath = [
            PathBuf::from("/r/gen.jar"),
            PathBuf::from("/r/modules.jar"),
            PathBuf::from("/r/cli.jar"),
        ];
        let ctx = ConfigGenContext {
            install_dir: Path::new("/opt/server"),
            classpath: &classpath,
            fork: true,
            dump_config_scripts: Some("/tmp/scripts"),
            configs: std::slice::from_ref(&config),
        };

        let cmd = ProcessConfigGenerator::new("/usr/bin/java").command(&ctx).unwrap();

        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-cp",
                "/r/gen.jar:/r/modules.jar:/r/cli.jar",
                CONFIG_GEN_MAIN_CLASS,
                "/opt/server",
                "--fork",
                "--dump-config-scripts=/tmp/scripts",
                "--config=standalone/standalone.xml",
            ]
        );
    }
}
