//! Install options and the installer configuration file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::module_xml::CommandIndexer;
use crate::scripts::ScriptLauncher;

pub const OPTION_DIST_MODE: &str = "dist-mode";
pub const OPTION_DUMP_CONFIG_SCRIPTS: &str = "dump-config-scripts";
pub const OPTION_FORK_CONFIG_GENERATION: &str = "fork-config-generation";

/// Switches recognized by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Reference artifacts by coordinates instead of embedding them.
    pub thin: bool,
    /// Forwarded to the config generator; never persisted.
    pub dump_config_scripts: Option<String>,
    pub fork_config_generation: bool,
}

impl InstallOptions {
    /// Interpret raw `name -> value` options; a `None` value means the
    /// option was given without one.
    pub fn from_map(options: &BTreeMap<String, Option<String>>) -> Result<Self> {
        let mut parsed = InstallOptions::default();
        for (name, value) in options {
            match name.as_str() {
                OPTION_DIST_MODE => {
                    parsed.thin = !value.as_deref().is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
                }
                OPTION_FORK_CONFIG_GENERATION => {
                    parsed.fork_config_generation = flag_value(value.as_deref())
                }
                OPTION_DUMP_CONFIG_SCRIPTS => {
                    parsed.dump_config_scripts = Some(value.clone().unwrap_or_default())
                }
                other => bail!(
                    "unknown install option '{}' (expected '{}', '{}' or '{}')",
                    other,
                    OPTION_DIST_MODE,
                    OPTION_DUMP_CONFIG_SCRIPTS,
                    OPTION_FORK_CONFIG_GENERATION
                ),
            }
        }
        Ok(parsed)
    }

    /// Parse `name` or `name=value` arguments.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let map = args
            .into_iter()
            .map(|arg| match arg.as_ref().split_once('=') {
                Some((name, value)) => (name.trim().to_string(), Some(value.to_string())),
                None => (arg.as_ref().trim().to_string(), None),
            })
            .collect();
        Self::from_map(&map)
    }
}

// Set without a value means true.
fn flag_value(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => v.trim().eq_ignore_ascii_case("true"),
    }
}

/// `installer.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case", default)]
pub struct InstallerConfig {
    pub artifacts: ArtifactsConfig,
    pub finalize: ScriptLauncher,
    pub config_generator: ConfigGeneratorConfig,
    pub xslt: XsltConfig,
    /// Required for descriptors that request jandex indexing in full mode.
    pub indexer: Option<CommandIndexer>,
}

/// Where artifacts come from: a Maven-layout repository or the
/// content-addressed store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case", default)]
pub struct ArtifactsConfig {
    pub maven_repository: Option<PathBuf>,
    pub store: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case", default)]
pub struct ConfigGeneratorConfig {
    /// JVM launcher; looked up on `PATH` when unset.
    pub java: Option<PathBuf>,
    pub main_class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case", default)]
pub struct XsltConfig {
    /// `xsltproc` binary; looked up on `PATH` when unset.
    pub xsltproc: Option<PathBuf>,
}

impl InstallerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading installer config '{}'", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("parsing installer config '{}'", path.display()))?;
        if let Some(base) = path.parent() {
            config.artifacts.resolve_relative(base);
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl ArtifactsConfig {
    fn resolve_relative(&mut self, base: &Path) {
        for dir in [&mut self.maven_repository, &mut self.store].into_iter().flatten() {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, Option<&str>)]) -> BTreeMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn absent_options_are_off() {
        assert_eq!(InstallOptions::from_map(&BTreeMap::new()).unwrap(), InstallOptions::default());
    }

    #[test]
    fn flags_without_value_are_on() {
        let parsed = InstallOptions::from_map(&options(&[
            ("dist-mode", None),
            ("fork-config-generation", None),
        ]))
        .unwrap();
        assert!(parsed.thin);
        assert!(parsed.fork_config_generation);
    }

    #[test]
    fn flag_values_are_interpreted() {
        let parsed = InstallOptions::from_args(["dist-mode=false", "fork-config-generation=yes"]).unwrap();
        assert!(!parsed.thin);
        assert!(!parsed.fork_config_generation);

        assert!(InstallOptions::from_args(["dist-mode=1"]).unwrap().thin);

        let parsed = InstallOptions::from_args(["fork-config-generation=TRUE"]).unwrap();
        assert!(parsed.fork_config_generation);
    }

    #[test]
    fn dump_config_scripts_value_is_forwarded() {
        let parsed = InstallOptions::from_args(["dump-config-scripts=/tmp/dump"]).unwrap();
        assert_eq!(parsed.dump_config_scripts.as_deref(), Some("/tmp/dump"));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = InstallOptions::from_args(["jboss-maven-dist"]).unwrap_err();
        assert!(err.to_string().contains("unknown install option 'jboss-maven-dist'"));
    }

    #[test]
    fn installer_config_sections_default() {
        let config = InstallerConfig::parse(
            r#"
[artifacts]
maven-repository = "/var/cache/m2"

[finalize]
program = "/usr/bin/cli"
"#,
        )
        .unwrap();
        assert_eq!(config.artifacts.maven_repository, Some(PathBuf::from("/var/cache/m2")));
        assert_eq!(config.finalize.program, PathBuf::from("/usr/bin/cli"));
        assert_eq!(config.finalize.home_env, "JBOSS_HOME");
        assert_eq!(config.xslt, XsltConfig::default());
    }

    #[test]
    fn installer_config_rejects_unknown_keys() {
        assert!(InstallerConfig::parse("[xslt]\nengine = \"saxon\"\n").is_err());
    }
}
