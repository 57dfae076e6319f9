//! Finalize-script runner.
//!
//! A script is run through a launcher rooted at the staged tree. stdout and
//! stderr share one pipe and are read to completion. When the process fails,
//! the error carries the most recent command-context line and the output
//! since the last block boundary.
//!
//! Locating the failing statement this way is a heuristic tied to the
//! launcher's echo format; treat the captured context as a hint.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::error::InstallError;

/// Placeholder in [`ScriptLauncher::args`] replaced by the script path.
pub const SCRIPT_PLACEHOLDER: &str = "{script}";

/// How finalize scripts are launched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case", default)]
pub struct ScriptLauncher {
    /// Relative to the install root unless absolute.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Environment variable set to the install root.
    pub home_env: String,
    /// Output lines starting with this are command context.
    pub command_prefix: String,
}

impl Default for ScriptLauncher {
    fn default() -> Self {
        Self {
            program: PathBuf::from("bin/jboss-cli.sh"),
            args: vec![
                "--no-operation-validation".to_string(),
                "--echo-command".to_string(),
                format!("--file={SCRIPT_PLACEHOLDER}"),
            ],
            home_env: "JBOSS_HOME".to_string(),
            command_prefix: "&config ".to_string(),
        }
    }
}

impl ScriptLauncher {
    fn command(&self, install_root: &Path, script: &Path) -> Command {
        let program = if self.program.is_absolute() {
            self.program.clone()
        } else {
            install_root.join(&self.program)
        };
        let script = script.display().to_string();
        let mut cmd = Command::new(program);
        cmd.args(self.args.iter().map(|arg| arg.replace(SCRIPT_PLACEHOLDER, &script)))
            .env(&self.home_env, install_root)
            .current_dir(install_root);
        cmd
    }
}

/// Whether the last line seen closed a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Collecting,
    BoundaryHit,
}

/// Tracks the current output block and the last command-context line.
#[derive(Debug, Clone)]
pub struct DiagnosticCapture {
    state: CaptureState,
    prefix: String,
    last_command: Option<String>,
    block: String,
}

impl DiagnosticCapture {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            state: CaptureState::Collecting,
            prefix: prefix.into(),
            last_command: None,
            block: String::new(),
        }
    }

    /// Feed one output line, without its terminator.
    ///
    /// A bare `}` ends a block; the block is discarded when the next line
    /// that is not itself a boundary arrives.
    pub fn feed(&mut self, line: &str) {
        if line == "}" {
            self.state = CaptureState::BoundaryHit;
        } else {
            if line.starts_with(&self.prefix) {
                self.last_command = Some(line.to_string());
            }
            if self.state == CaptureState::BoundaryHit {
                self.block.clear();
                self.state = CaptureState::Collecting;
            }
        }
        self.block.push_str(line);
        self.block.push('\n');
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    pub fn block(&self) -> &str {
        &self.block
    }

    /// The error returned for a failed process.
    pub fn into_failure(self, status: Option<i32>) -> InstallError {
        InstallError::ExternalProcessFailure {
            context: self
                .last_command
                .map(|cmd| cmd.strip_prefix('&').unwrap_or(&cmd).to_string()),
            output: self.block,
            status,
        }
    }
}

/// Run `script` through `launcher` with `install_root` as home.
pub fn run_script(install_root: &Path, script: &Path, launcher: &ScriptLauncher) -> Result<()> {
    let mut cmd = launcher.command(install_root, script);
    info!(script = %script.display(), "running finalize script");
    debug!(command = ?cmd, "launching");

    let (reader, writer) = io::pipe().context("creating output pipe")?;
    let writer_err = writer.try_clone().context("cloning output pipe")?;
    cmd.stdout(writer).stderr(writer_err);
    let mut child = cmd
        .spawn()
        .with_context(|| format!("launching {:?}", cmd.get_program()))?;
    // The parent's copies of the write end must close for EOF to arrive.
    drop(cmd);

    let mut capture = DiagnosticCapture::new(launcher.command_prefix.as_str());
    let mut lines = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match lines.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                debug!(target: "featurepack_installer::scripts::output", "{line}");
                capture.feed(line);
            }
            Err(e) => {
                warn!(error = %e, "reading script output");
                break;
            }
        }
    }

    let status = child
        .wait()
        .with_context(|| format!("waiting for script '{}'", script.display()))?;
    if !status.success() {
        return Err(capture.into_failure(status.code())).with_context(|| {
            format!("running finalize script '{}'", script.display())
        });
    }
    Ok(())
}
