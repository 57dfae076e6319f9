//! XSLT handler: Task::XslTransform, and the stylesheet collaborators.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use tracing::debug;

use crate::error::InstallError;
use crate::staging::create_new_file;

/// A stylesheet prepared by a [`StylesheetCompiler`].
pub trait Stylesheet {
    /// Transform `src` into `output`. `output` exists and is empty.
    fn transform(&self, src: &Path, output: &Path, params: &BTreeMap<String, String>) -> Result<()>;
}

/// Prepares stylesheets; called once per distinct stylesheet path. Whether
/// preparing compiles anything is up to the backend.
pub trait StylesheetCompiler {
    fn compile(&self, stylesheet: &Path) -> Result<Rc<dyn Stylesheet>>;
}

/// Runs `xsltproc` for each transform.
///
/// Nothing is compiled ahead of time: `compile` only checks that the
/// stylesheet exists, and `xsltproc` parses it again on every transform.
#[derive(Debug, Clone)]
pub struct XsltprocCompiler {
    program: PathBuf,
}

impl XsltprocCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find `xsltproc` on `PATH`.
    pub fn locate() -> Result<Self> {
        let program = which::which("xsltproc").context("xsltproc not found on PATH")?;
        Ok(Self::new(program))
    }
}

impl StylesheetCompiler for XsltprocCompiler {
    fn compile(&self, stylesheet: &Path) -> Result<Rc<dyn Stylesheet>> {
        if !stylesheet.is_file() {
            return Err(InstallError::MissingResource(stylesheet.to_path_buf()).into());
        }
        Ok(Rc::new(XsltprocStylesheet {
            program: self.program.clone(),
            stylesheet: stylesheet.to_path_buf(),
        }))
    }
}

/// Stylesheet path handed to `xsltproc` per transform.
#[derive(Debug)]
struct XsltprocStylesheet {
    program: PathBuf,
    stylesheet: PathBuf,
}

impl Stylesheet for XsltprocStylesheet {
    fn transform(&self, src: &Path, output: &Path, params: &BTreeMap<String, String>) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        for (name, value) in params {
            cmd.arg("--stringparam").arg(name).arg(value);
        }
        let result = cmd
            .arg("-o")
            .arg(output)
            .arg(&self.stylesheet)
            .arg(src)
            .output()
            .with_context(|| format!("running {}", self.program.display()))?;

        if result.status.success() {
            return Ok(());
        }
        let stdout = String::from_utf8_lossy(&result.stdout);
        let stderr = String::from_utf8_lossy(&result.stderr);
        bail!(
            "xsltproc failed applying '{}': {}\n{}",
            self.stylesheet.display(),
            stdout.trim(),
            stderr.trim()
        )
    }
}

/// Prepared stylesheets keyed by the path string a task declared.
pub struct StylesheetCache<'a> {
    compiler: &'a dyn StylesheetCompiler,
    compiled: BTreeMap<String, Rc<dyn Stylesheet>>,
}

impl<'a> StylesheetCache<'a> {
    pub fn new(compiler: &'a dyn StylesheetCompiler) -> Self {
        Self {
            compiler,
            compiled: BTreeMap::new(),
        }
    }

    /// Compile on first use; `stylesheet` is relative to the staged tree.
    pub fn get(&mut self, staged: &Path, stylesheet: &str) -> Result<Rc<dyn Stylesheet>> {
        if let Some(compiled) = self.compiled.get(stylesheet) {
            return Ok(Rc::clone(compiled));
        }
        let path = staged.join(stylesheet);
        let compiled = self
            .compiler
            .compile(&path)
            .with_context(|| format!("compiling stylesheet '{}'", path.display()))?;
        debug!(stylesheet, "compiled stylesheet");
        self.compiled
            .insert(stylesheet.to_string(), Rc::clone(&compiled));
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Handle Task::XslTransform.
///
/// Fixed `params` are applied first; `task_props` override same names.
pub fn handle_xsl_transform(
    staged: &Path,
    cache: &mut StylesheetCache<'_>,
    src: &str,
    output: &str,
    stylesheet: &str,
    params: &BTreeMap<String, String>,
    task_props: &BTreeMap<String, String>,
) -> Result<()> {
    let src_path = staged.join(src);
    if !src_path.exists() {
        return Err(InstallError::MissingResource(src_path).into());
    }
    let output_path = staged.join(output);
    if output_path.exists() {
        return Err(InstallError::AlreadyExists(output_path).into());
    }

    let compiled = cache.get(staged, stylesheet)?;
    let mut all_params = params.clone();
    all_params.extend(task_props.iter().map(|(k, v)| (k.clone(), v.clone())));

    drop(create_new_file(&output_path)?);
    if let Err(e) = compiled.transform(&src_path, &output_path, &all_params) {
        let _ = fs::remove_file(&output_path);
        return Err(e.context(format!(
            "failed to transform {src} with {stylesheet} to {output}"
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Counts compilations; its stylesheets append `name=value` lines for
    /// every parameter to the copied source.
    pub(crate) struct RecordingCompiler {
        pub(crate) compiles: Cell<usize>,
    }

    impl RecordingCompiler {
        pub(crate) fn new() -> Self {
            Self {
                compiles: Cell::new(0),
            }
        }
    }

    struct RecordingStylesheet;

    impl Stylesheet for RecordingStylesheet {
        fn transform(&self, src: &Path, output: &Path, params: &BTreeMap<String, String>) -> Result<()> {
            let mut out = fs::read_to_string(src)?;
            for (k, v) in params {
                out.push_str(&format!("\n{k}={v}"));
            }
            fs::write(output, out)?;
            Ok(())
        }
    }

    impl StylesheetCompiler for RecordingCompiler {
        fn compile(&self, stylesheet: &Path) -> Result<Rc<dyn Stylesheet>> {
            if !stylesheet.is_file() {
                return Err(InstallError::MissingResource(stylesheet.to_path_buf()).into());
            }
            self.compiles.set(self.compiles.get() + 1);
            Ok(Rc::new(RecordingStylesheet))
        }
    }

    fn staged_with_sources() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("staged");
        fs::create_dir_all(staged.join("configuration")).unwrap();
        fs::write(staged.join("configuration/a.xml"), "<a/>").unwrap();
        fs::write(staged.join("configuration/b.xml"), "<b/>").unwrap();
        fs::write(staged.join("ha.xsl"), "<xsl:stylesheet/>").unwrap();
        (temp, staged)
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn task_properties_override_fixed_params() {
        let (_temp, staged) = staged_with_sources();
        let compiler = RecordingCompiler::new();
        let mut cache = StylesheetCache::new(&compiler);

        handle_xsl_transform(
            &staged,
            &mut cache,
            "configuration/a.xml",
            "configuration/a-ha.xml",
            "ha.xsl",
            &map(&[("profile", "default"), ("fixed", "1")]),
            &map(&[("profile", "ha")]),
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(staged.join("configuration/a-ha.xml")).unwrap(),
            "<a/>\nfixed=1\nprofile=ha"
        );
    }

    #[test]
    fn stylesheet_is_compiled_once() {
        let (_temp, staged) = staged_with_sources();
        let compiler = RecordingCompiler::new();
        let mut cache = StylesheetCache::new(&compiler);
        let none = BTreeMap::new();

        for (src, out) in [("configuration/a.xml", "a-out.xml"), ("configuration/b.xml", "b-out.xml")] {
            handle_xsl_transform(&staged, &mut cache, src, out, "ha.xsl", &none, &none).unwrap();
        }

        assert_eq!(compiler.compiles.get(), 1);
        assert_eq!(cache.len(), 1);
        assert!(staged.join("b-out.xml").is_file());
    }

    #[test]
    fn existing_output_is_rejected() {
        let (_temp, staged) = staged_with_sources();
        let compiler = RecordingCompiler::new();
        let mut cache = StylesheetCache::new(&compiler);
        let none = BTreeMap::new();

        let err = handle_xsl_transform(
            &staged,
            &mut cache,
            "configuration/a.xml",
            "configuration/b.xml",
            "ha.xsl",
            &none,
            &none,
        )
        .unwrap_err();
        assert!(matches!(
            InstallError::find(&err),
            Some(InstallError::AlreadyExists(_))
        ));
        assert_eq!(fs::read_to_string(staged.join("configuration/b.xml")).unwrap(), "<b/>");
    }

    #[test]
    fn missing_source_is_rejected() {
        let (_temp, staged) = staged_with_sources();
        let compiler = RecordingCompiler::new();
        let mut cache = StylesheetCache::new(&compiler);
        let none = BTreeMap::new();

        let err = handle_xsl_transform(&staged, &mut cache, "absent.xml", "out.xml", "ha.xsl", &none, &none)
            .unwrap_err();
        assert!(matches!(
            InstallError::find(&err),
            Some(InstallError::MissingResource(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn xsltproc_compile_only_checks_existence() {
        let (_temp, staged) = staged_with_sources();
        let compiler = XsltprocCompiler::new("/nonexistent/xsltproc");

        assert!(compiler.compile(&staged.join("ha.xsl")).is_ok());
        let err = compiler.compile(&staged.join("absent.xsl")).err().unwrap();
        assert!(matches!(
            InstallError::find(&err),
            Some(InstallError::MissingResource(_))
        ));
    }
}
