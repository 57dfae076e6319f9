//! Maven-style artifact coordinates.
//!
//! Two textual shapes exist:
//! - symbolic keys, `group:artifact` or `group:artifact::classifier`, used as
//!   version-map keys and `${...}` placeholder bodies;
//! - concrete coordinates, `group:artifact:version[:classifier]:type` with the
//!   classifier segment allowed to be empty (`g:a:1.0::jar`).

use std::fmt;

use anyhow::{bail, Result};

pub const DEFAULT_TYPE: &str = "jar";

/// Parsed artifact coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactCoords {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub classifier: String,
    pub artifact_type: String,
}

/// Result of parsing a coordinate expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCoords {
    /// Symbolic key, normalized to `g:a` or `g:a::c`.
    Key(String),
    /// Fully-qualified coordinates.
    Concrete(ArtifactCoords),
}

impl ArtifactCoords {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        classifier: impl Into<String>,
        artifact_type: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: classifier.into(),
            artifact_type: artifact_type.into(),
        }
    }

    /// Parse an expression that must carry a version.
    pub fn parse(expr: &str) -> Result<Self> {
        match parse_coords(expr)? {
            ParsedCoords::Concrete(coords) => Ok(coords),
            ParsedCoords::Key(key) => bail!("coordinates '{key}' do not specify a version"),
        }
    }

    /// Version-map key for these coordinates.
    pub fn key(&self) -> String {
        symbolic_key(&self.group_id, &self.artifact_id, &self.classifier)
    }

    /// `group:artifact:version[:classifier]`, the form thin installs reference.
    pub fn to_maven_gav(&self) -> String {
        let mut buf = format!("{}:{}:{}", self.group_id, self.artifact_id, self.version);
        if !self.classifier.is_empty() {
            buf.push(':');
            buf.push_str(&self.classifier);
        }
        buf
    }

    /// File name under a Maven repository layout:
    /// `artifact-version[-classifier].type`.
    pub fn file_name(&self) -> String {
        let mut name = format!("{}-{}", self.artifact_id, self.version);
        if !self.classifier.is_empty() {
            name.push('-');
            name.push_str(&self.classifier);
        }
        name.push('.');
        name.push_str(&self.artifact_type);
        name
    }
}

impl fmt::Display for ArtifactCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.group_id, self.artifact_id, self.version, self.classifier, self.artifact_type
        )
    }
}

fn symbolic_key(group_id: &str, artifact_id: &str, classifier: &str) -> String {
    if classifier.is_empty() {
        format!("{group_id}:{artifact_id}")
    } else {
        format!("{group_id}:{artifact_id}::{classifier}")
    }
}

/// Parse either a symbolic key or concrete coordinates.
pub fn parse_coords(expr: &str) -> Result<ParsedCoords> {
    let expr = expr.trim();
    let parts: Vec<&str> = expr.split(':').collect();
    if parts.len() < 2 || parts.len() > 5 || parts[0].is_empty() || parts[1].is_empty() {
        bail!("malformed artifact coordinates '{expr}'");
    }
    let (group_id, artifact_id) = (parts[0], parts[1]);

    let version = parts.get(2).copied().unwrap_or("");
    if version.is_empty() {
        // g:a or g:a::c
        let classifier = match parts.len() {
            2 => "",
            4 => parts[3],
            _ => bail!("malformed artifact key '{expr}'"),
        };
        return Ok(ParsedCoords::Key(symbolic_key(
            group_id,
            artifact_id,
            classifier,
        )));
    }

    let (classifier, artifact_type) = match parts.len() {
        3 => ("", DEFAULT_TYPE),
        4 => ("", parts[3]),
        _ => (parts[3], parts[4]),
    };
    let artifact_type = if artifact_type.is_empty() {
        DEFAULT_TYPE
    } else {
        artifact_type
    };

    Ok(ParsedCoords::Concrete(ArtifactCoords::new(
        group_id,
        artifact_id,
        version,
        classifier,
        artifact_type,
    )))
}

/// A `${body}` placeholder split into the lookup body and its `?options`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    pub body: &'a str,
    pub options: Option<&'a str>,
}

impl Placeholder<'_> {
    pub fn has_option(&self, token: &str) -> bool {
        self.options.is_some_and(|opts| opts.contains(token))
    }
}

/// Split `${key?opts}` into key and options; `None` when `expr` is not a
/// placeholder.
pub fn parse_placeholder(expr: &str) -> Option<Placeholder<'_>> {
    let inner = expr.strip_prefix("${")?.strip_suffix('}')?;
    Some(match inner.find('?') {
        Some(idx) => Placeholder {
            body: &inner[..idx],
            options: Some(&inner[idx + 1..]),
        },
        None => Placeholder {
            body: inner,
            options: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symbolic_keys() {
        assert_eq!(
            parse_coords("org.x:y").unwrap(),
            ParsedCoords::Key("org.x:y".into())
        );
        assert_eq!(
            parse_coords("org.x:y::client").unwrap(),
            ParsedCoords::Key("org.x:y::client".into())
        );
    }

    #[test]
    fn parses_concrete_forms() {
        let plain = ArtifactCoords::parse("org.x:y:2.0").unwrap();
        assert_eq!(plain.version, "2.0");
        assert_eq!(plain.artifact_type, "jar");
        assert_eq!(plain.classifier, "");

        let typed = ArtifactCoords::parse("g:a:1.2.3::zip").unwrap();
        assert_eq!(typed.artifact_type, "zip");
        assert_eq!(typed.to_string(), "g:a:1.2.3::zip");

        assert_eq!(
            ArtifactCoords::parse("g:a:1.0:jar").unwrap(),
            ArtifactCoords::parse("g:a:1.0::jar").unwrap()
        );
    }

    #[test]
    fn positional_classifier_matches_shorthand_key() {
        let coords = ArtifactCoords::parse("org.wildfly.core:wildfly-cli:20.0:client:jar").unwrap();
        assert_eq!(coords.key(), "org.wildfly.core:wildfly-cli::client");
        assert_eq!(
            parse_coords("org.wildfly.core:wildfly-cli::client").unwrap(),
            ParsedCoords::Key(coords.key())
        );
        assert_eq!(coords.to_maven_gav(), "org.wildfly.core:wildfly-cli:20.0:client");
        assert_eq!(coords.file_name(), "wildfly-cli-20.0-client.jar");
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse_coords("justone").is_err());
        assert!(parse_coords(":a").is_err());
        assert!(parse_coords("g:a:::").is_err());
        assert!(ArtifactCoords::parse("g:a").is_err());
    }

    #[test]
    fn splits_placeholder_options() {
        let p = parse_placeholder("${org.x:y?jandex}").unwrap();
        assert_eq!(p.body, "org.x:y");
        assert!(p.has_option("jandex"));

        let p = parse_placeholder("${foo.bar}").unwrap();
        assert_eq!(p.body, "foo.bar");
        assert!(!p.has_option("jandex"));

        assert!(parse_placeholder("org.x:y:1.0").is_none());
    }
}
