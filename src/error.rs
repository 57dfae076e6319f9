//! Error taxonomy for the installation pipeline.
//!
//! Pipeline functions return [`anyhow::Result`] and attach location context
//! (feature-pack, package, file) with `.with_context(..)`. The root cause of a
//! failure is one of the [`InstallError`] variants below, recoverable with
//! [`InstallError::find`].

use std::path::PathBuf;

use thiserror::Error;

/// Root causes an install can fail with.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The installation target is in a state that forbids changes.
    #[error("{0}")]
    PreconditionViolation(String),

    /// A required file, artifact or path is absent.
    #[error("path does not exist: {}", .0.display())]
    MissingResource(PathBuf),

    /// An output path that must not be overwritten already exists.
    #[error("path already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// A `${name}` placeholder has no value in any resolver layer.
    #[error("unresolved property '{name}'")]
    UnresolvedProperty { name: String },

    /// A symbolic artifact key is missing from the version map in scope.
    #[error("failed to resolve artifact coordinates for '{key}'")]
    UnresolvedArtifactCoordinate { key: String },

    /// The artifact store could not supply a file for resolved coordinates.
    #[error("failed to resolve artifact {coords}: {reason}")]
    ArtifactResolution { coords: String, reason: String },

    /// An external process exited with a non-zero status.
    #[error("{}", describe_process_failure(.context.as_deref(), .status, .output))]
    ExternalProcessFailure {
        /// Last command-context line observed in the output, if any.
        context: Option<String>,
        /// Output buffered since the last block boundary.
        output: String,
        /// Exit code, `None` when terminated by a signal.
        status: Option<i32>,
    },

    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        InstallError::Io {
            message: message.into(),
            source,
        }
    }

    /// Find the first [`InstallError`] in an error chain.
    pub fn find(err: &anyhow::Error) -> Option<&InstallError> {
        err.chain().find_map(|cause| cause.downcast_ref::<InstallError>())
    }
}

fn describe_process_failure(context: Option<&str>, status: &Option<i32>, output: &str) -> String {
    let status = match status {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    };
    let headline = match context {
        Some(context) => format!("Failed to generate {context} ({status})"),
        None => format!("external process failed ({status})"),
    };
    if output.trim().is_empty() {
        headline
    } else {
        format!("{headline}:\n{}", output.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn find_sees_through_context() {
        let err = Err::<(), _>(InstallError::MissingResource(PathBuf::from("a/b")))
            .context("processing package foo")
            .unwrap_err();
        assert!(matches!(
            InstallError::find(&err),
            Some(InstallError::MissingResource(p)) if p == &PathBuf::from("a/b")
        ));
    }

    #[test]
    fn process_failure_names_context() {
        let err = InstallError::ExternalProcessFailure {
            context: Some("config standalone.xml".into()),
            output: String::new(),
            status: Some(1),
        };
        assert_eq!(
            err.to_string(),
            "Failed to generate config standalone.xml (exit code 1)"
        );
    }
}
