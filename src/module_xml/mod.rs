//! Module descriptor rewriting.
//!
//! A `module.xml` template references artifacts symbolically:
//!
//! ```xml
//! <module xmlns="urn:jboss:module:1.9" name="org.foo" version="${org.foo:foo}">
//!     <resources>
//!         <artifact name="${org.foo:foo?jandex}"/>
//!     </resources>
//! </module>
//! ```
//!
//! The rewrite resolves each reference through the owning feature pack's
//! version map. Thin installs keep an `artifact` element naming plain Maven
//! coordinates; full installs copy the artifact next to the descriptor and
//! turn the element into `<resource-root path="..."/>`.
//!
//! Events the rewrite does not touch are written back unchanged, so
//! whitespace, comments and attribute quoting survive.

pub mod indexer;
pub mod owners;

use anyhow::{Context, Result};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::InstallError;
use crate::provider::ArtifactResolver;
use crate::schema::{extract_schemas, SchemaGroups};
use crate::staging::{copy_file, create_new_file};
use crate::versions::{parse_placeholder, resolve, ArtifactCoords, VersionMap};

pub use indexer::{CommandIndexer, NoIndexer};
pub use owners::{ModuleOverride, ModuleOwners};

const MODULE: &[u8] = b"module";
const RESOURCES: &[u8] = b"resources";
const ARTIFACT: &[u8] = b"artifact";
const RESOURCE_ROOT: &str = "resource-root";
const JANDEX_OPTION: &str = "jandex";

/// Generates a search index for an archive.
pub trait ArchiveIndexer {
    /// Write an indexed copy of `artifact` to `output`.
    fn index(&self, artifact: &Path, output: &Path) -> Result<()>;
}

/// Everything the rewrite of one descriptor consults.
pub struct RewriteContext<'a> {
    /// Version map of the feature pack that owns the descriptor.
    pub versions: &'a VersionMap,
    pub artifacts: &'a dyn ArtifactResolver,
    pub indexer: &'a dyn ArchiveIndexer,
    pub schema_groups: &'a SchemaGroups,
    pub staged: &'a Path,
    pub thin: bool,
}

/// How a descriptor was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Root is not `module`; bytes copied verbatim.
    Copied,
    /// `module` root rewritten; the count of artifact references resolved.
    Rewritten { artifacts: usize },
}

/// Rewrite `template` into `target`, which must not exist yet.
///
/// On failure nothing is left at `target`.
pub fn rewrite_descriptor(
    ctx: &RewriteContext<'_>,
    template: &Path,
    target: &Path,
) -> Result<RewriteOutcome> {
    let bytes = fs::read(template)
        .with_context(|| format!("reading module template '{}'", template.display()))?;
    let text = std::str::from_utf8(&bytes)
        .with_context(|| format!("module template '{}' is not UTF-8", template.display()))?;

    let mut out = create_new_file(target)?;
    let written = write_descriptor(ctx, text, target, &mut out);
    drop(out);
    if written.is_err() {
        let _ = fs::remove_file(target);
    }
    written.with_context(|| format!("processing module template '{}'", template.display()))
}

fn write_descriptor(
    ctx: &RewriteContext<'_>,
    text: &str,
    target: &Path,
    out: &mut fs::File,
) -> Result<RewriteOutcome> {
    if root_local_name(text)?.as_deref() != Some(MODULE) {
        out.write_all(text.as_bytes())?;
        return Ok(RewriteOutcome::Copied);
    }
    let target_dir = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut rewriter = Rewriter {
        ctx,
        target_dir,
        artifacts: 0,
    };
    let rewritten = rewriter.rewrite(text)?;
    out.write_all(&rewritten)?;
    out.flush()?;
    Ok(RewriteOutcome::Rewritten {
        artifacts: rewriter.artifacts,
    })
}

fn root_local_name(text: &str) -> Result<Option<Vec<u8>>> {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(Some(e.local_name().as_ref().to_vec()));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

struct Rewriter<'c, 'a> {
    ctx: &'c RewriteContext<'a>,
    target_dir: PathBuf,
    artifacts: usize,
}

/// An open element: its local name and whether its end tag is renamed.
struct Open {
    local: Vec<u8>,
    renamed: bool,
}

impl Rewriter<'_, '_> {
    fn rewrite(&mut self, text: &str) -> Result<Vec<u8>> {
        let mut reader = Reader::from_str(text);
        let mut writer = Writer::new(Vec::with_capacity(text.len()));
        let mut stack: Vec<Open> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let local = e.local_name().as_ref().to_vec();
                    let replaced = self.rewrite_element(&stack, &e)?;
                    let renamed = replaced
                        .as_ref()
                        .is_some_and(|r| r.local_name().as_ref() != local.as_slice());
                    match replaced {
                        Some(r) => writer.write_event(Event::Start(r))?,
                        None => writer.write_event(Event::Start(e))?,
                    }
                    stack.push(Open { local, renamed });
                }
                Event::Empty(e) => match self.rewrite_element(&stack, &e)? {
                    Some(r) => writer.write_event(Event::Empty(r))?,
                    None => writer.write_event(Event::Empty(e))?,
                },
                Event::End(e) => match stack.pop() {
                    Some(open) if open.renamed => {
                        writer.write_event(Event::End(BytesEnd::new(RESOURCE_ROOT)))?
                    }
                    _ => writer.write_event(Event::End(e))?,
                },
                Event::Eof => break,
                other => writer.write_event(other)?,
            }
        }
        Ok(writer.into_inner())
    }

    /// `Some` when the element must be replaced.
    fn rewrite_element(
        &mut self,
        stack: &[Open],
        e: &BytesStart<'_>,
    ) -> Result<Option<BytesStart<'static>>> {
        let local = e.local_name();
        if stack.is_empty() && local.as_ref() == MODULE {
            return self.rewrite_module_version(e);
        }
        let under_resources = stack.len() == 2
            && stack[0].local == MODULE
            && stack[1].local == RESOURCES;
        if under_resources && local.as_ref() == ARTIFACT {
            return self.rewrite_artifact(e).map(Some);
        }
        Ok(None)
    }

    fn rewrite_module_version(&self, e: &BytesStart<'_>) -> Result<Option<BytesStart<'static>>> {
        let Some(expr) = attribute_value(e, b"version")? else {
            return Ok(None);
        };
        let Some(placeholder) = parse_placeholder(&expr) else {
            return Ok(None);
        };
        let coords = resolve_required(self.ctx.versions, placeholder.body)?;
        debug!(version = %coords.version, "resolved module version");
        Ok(Some(replace_attribute(e, b"version", None, &coords.version)?))
    }

    fn rewrite_artifact(&mut self, e: &BytesStart<'_>) -> Result<BytesStart<'static>> {
        let expr = attribute_value(e, b"name")?.ok_or_else(|| {
            anyhow::anyhow!(
                "artifact element without a name attribute: {}",
                String::from_utf8_lossy(e)
            )
        })?;
        let (body, jandex) = match parse_placeholder(&expr) {
            Some(placeholder) => (placeholder.body, placeholder.has_option(JANDEX_OPTION)),
            None => (expr.as_str(), false),
        };
        let coords = resolve_required(self.ctx.versions, body)?;
        self.artifacts += 1;
        // Thin servers load from the local repository at runtime, so the
        // artifact must be resolvable in both modes.
        let artifact = self.ctx.artifacts.resolve(&coords)?;
        if self.ctx.schema_groups.contains(&coords.group_id) {
            extract_schemas(&artifact, self.ctx.staged)?;
        }

        if self.ctx.thin {
            // Nothing is embedded, so a jandex request has no effect.
            return replace_attribute(e, b"name", None, &coords.to_maven_gav());
        }

        let file_name = self.install_artifact(&artifact, &coords, jandex)?;
        let mut renamed = replace_attribute(e, b"name", Some("path"), &file_name)?;
        renamed.set_name(RESOURCE_ROOT.as_bytes());
        Ok(renamed)
    }

    /// Copy or index the artifact next to the descriptor; returns the file
    /// name the descriptor references.
    fn install_artifact(
        &self,
        artifact: &Path,
        coords: &ArtifactCoords,
        jandex: bool,
    ) -> Result<String> {
        let file_name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| coords.file_name());
        if jandex {
            let indexed = jandex_file_name(&file_name);
            let target = self.target_dir.join(&indexed);
            self.ctx
                .indexer
                .index(artifact, &target)
                .with_context(|| format!("indexing {coords}"))?;
            debug!(%coords, file = %indexed, "indexed module artifact");
            Ok(indexed)
        } else {
            copy_file(artifact, &self.target_dir.join(&file_name))?;
            debug!(%coords, file = %file_name, "copied module artifact");
            Ok(file_name)
        }
    }
}

fn resolve_required(versions: &VersionMap, expr: &str) -> Result<ArtifactCoords> {
    resolve(versions, expr, false)?.ok_or_else(|| {
        InstallError::UnresolvedArtifactCoordinate {
            key: expr.to_string(),
        }
        .into()
    })
}

/// `name-1.0.jar` → `name-1.0-jandex.jar`
pub fn jandex_file_name(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(dot) => format!("{}-jandex{}", &file_name[..dot], &file_name[dot..]),
        None => format!("{file_name}-jandex"),
    }
}

fn attribute_value(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == local {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Copy `e`, giving attribute `local` a new value and optionally a new name.
/// Other attributes keep their raw bytes and order.
fn replace_attribute(
    e: &BytesStart<'_>,
    local: &[u8],
    new_name: Option<&str>,
    value: &str,
) -> Result<BytesStart<'static>> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut out = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == local {
            let key = match new_name {
                Some(new_name) => new_name.to_string(),
                None => std::str::from_utf8(attr.key.as_ref())?.to_string(),
            };
            out.push_attribute((key.as_str(), value));
        } else {
            out.push_attribute(attr);
        }
    }
    Ok(out)
}
