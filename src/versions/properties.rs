//! Reading and writing `.properties` files.
//!
//! Supports the subset feature packs ship: `key=value` or `key:value` lines,
//! `#`/`!` comments, and backslash line continuations. Values are not
//! unescaped beyond continuation handling.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Read a properties file into a sorted map.
pub fn read_properties(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading properties '{}'", path.display()))?;
    Ok(parse_properties(&content))
}

pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    let mut logical = String::new();

    for raw in content.lines() {
        let line = if logical.is_empty() {
            raw.trim()
        } else {
            raw.trim_start()
        };
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
        {
            continue;
        }
        if let Some(continued) = line.strip_suffix('\\') {
            logical.push_str(continued);
            continue;
        }
        logical.push_str(line);
        if let Some((key, value)) = split_entry(&logical) {
            props.insert(key, value);
        }
        logical.clear();
    }
    if !logical.is_empty() {
        if let Some((key, value)) = split_entry(&logical) {
            props.insert(key, value);
        }
    }

    props
}

// Keys may contain ':' (artifact keys are `group:artifact`), so '=' wins
// whenever it is present.
fn split_entry(line: &str) -> Option<(String, String)> {
    let idx = line.find('=').or_else(|| line.find(':'))?;
    let key = line[..idx].trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), line[idx + 1..].trim().to_string()))
}

/// Write a map as sorted `key=value` lines.
pub fn write_properties(props: &BTreeMap<String, String>, target: &Path) -> Result<()> {
    let mut out = Vec::new();
    for (key, value) in props {
        writeln!(out, "{key}={value}")?;
    }
    fs::write(target, out).with_context(|| format!("writing properties '{}'", target.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_artifact_versions() {
        let props = parse_properties(
            "# generated\n\
             org.x:y=org.x:y:2.0::jar\n\
             org.x:y::client = org.x:y:2.0:client:jar\n\
             \n\
             ! legacy comment\n",
        );
        assert_eq!(props.len(), 2);
        assert_eq!(props["org.x:y"], "org.x:y:2.0::jar");
        assert_eq!(props["org.x:y::client"], "org.x:y:2.0:client:jar");
    }

    #[test]
    fn joins_continuation_lines() {
        let props = parse_properties("list=a,\\\n    b,\\\n    c\nother=1\n");
        assert_eq!(props["list"], "a,b,c");
        assert_eq!(props["other"], "1");
    }

    #[test]
    fn colon_separator_without_equals() {
        let props = parse_properties("version: 1.0\n");
        assert_eq!(props["version"], "1.0");
    }

    #[test]
    fn write_then_read_preserves_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("versions.properties");
        let mut props = BTreeMap::new();
        props.insert("b:b".to_string(), "b:b:1::jar".to_string());
        props.insert("a:a".to_string(), "a:a:2::jar".to_string());

        write_properties(&props, &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "a:a=a:a:2::jar\nb:b=b:b:1::jar\n"
        );
        assert_eq!(read_properties(&path).unwrap(), props);
    }
}
