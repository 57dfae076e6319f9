//! External archive indexers.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::ArchiveIndexer;
use crate::error::InstallError;

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Runs a command producing the indexed archive, e.g.
/// `java -jar jandex.jar -m -d {output} {input}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CommandIndexer {
    pub program: PathBuf,
    /// `{input}` and `{output}` are replaced by the archive paths.
    pub args: Vec<String>,
}

impl CommandIndexer {
    fn command(&self, artifact: &Path, output: &Path) -> Command {
        let input = artifact.display().to_string();
        let out = output.display().to_string();
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|arg| {
            arg.replace(INPUT_PLACEHOLDER, &input)
                .replace(OUTPUT_PLACEHOLDER, &out)
        }));
        cmd
    }
}

impl ArchiveIndexer for CommandIndexer {
    fn index(&self, artifact: &Path, output: &Path) -> Result<()> {
        let mut cmd = self.command(artifact, output);
        debug!(command = ?cmd, "indexing archive");
        let result = cmd
            .output()
            .with_context(|| format!("launching {}", self.program.display()))?;
        if result.status.success() {
            if !output.is_file() {
                return Err(InstallError::MissingResource(output.to_path_buf()).into());
            }
            return Ok(());
        }
        let mut text = String::from_utf8_lossy(&result.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&result.stderr));
        Err(InstallError::ExternalProcessFailure {
            context: Some(format!("index for {}", artifact.display())),
            output: text,
            status: result.status.code(),
        }
        .into())
    }
}

/// Rejects every request; used when no indexer is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndexer;

impl ArchiveIndexer for NoIndexer {
    fn index(&self, artifact: &Path, _output: &Path) -> Result<()> {
        Err(InstallError::PreconditionViolation(format!(
            "module references '{}' with jandex indexing but no archive indexer is configured",
            artifact.display()
        ))
        .into())
    }
}
