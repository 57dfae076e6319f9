//! `${name}` placeholder expansion for strings and copied files.
//!
//! Unresolved names are errors, never passed through.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::InstallError;

/// Source of values for `${name}` placeholders.
pub trait PropertyResolver {
    fn property(&self, name: &str) -> Option<&str>;
}

/// Replace every `${name}` in `text`.
pub fn substitute(text: &str, resolver: &dyn PropertyResolver) -> Result<String> {
    let bytes = substitute_bytes(text.as_bytes(), resolver)?;
    // Replacements are &str and the input is UTF-8, so the output is too.
    Ok(String::from_utf8(bytes)?)
}

/// Byte-level substitution; every byte outside a placeholder span is kept.
pub fn substitute_bytes(input: &[u8], resolver: &dyn PropertyResolver) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut pos = 0;

    while pos < input.len() {
        let Some(start) = find(&input[pos..], b"${").map(|i| pos + i) else {
            out.extend_from_slice(&input[pos..]);
            break;
        };
        out.extend_from_slice(&input[pos..start]);

        let body_start = start + 2;
        let end = input[body_start..]
            .iter()
            .position(|&b| matches!(b, b'}' | b'\n' | b'$' | b'{'))
            .map(|i| body_start + i);
        let end = match end {
            Some(end) if input[end] == b'}' => end,
            _ => {
                // Unterminated before the line ends or another placeholder starts.
                out.extend_from_slice(b"${");
                pos = body_start;
                continue;
            }
        };

        let name = std::str::from_utf8(&input[body_start..end])
            .context("property name is not valid UTF-8")?;
        let value = resolver
            .property(name)
            .ok_or_else(|| InstallError::UnresolvedProperty {
                name: name.to_string(),
            })?;
        out.extend_from_slice(value.as_bytes());
        pos = end + 1;
    }

    Ok(out)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Copy `src` to `dst` line by line, substituting placeholders.
///
/// Line terminators (including `\r\n`) are copied unchanged. `dst` is
/// overwritten.
pub fn copy_with_substitution(src: &Path, dst: &Path, resolver: &dyn PropertyResolver) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    let input = File::open(src).with_context(|| format!("opening '{}'", src.display()))?;
    let output = File::create(dst).with_context(|| format!("creating '{}'", dst.display()))?;

    let mut reader = BufReader::new(input);
    let mut writer = BufWriter::new(output);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("reading '{}'", src.display()))?;
        if n == 0 {
            break;
        }
        let replaced = substitute_bytes(&line, resolver)
            .with_context(|| format!("substituting properties in '{}'", src.display()))?;
        writer.write_all(&replaced)?;
    }
    writer
        .flush()
        .with_context(|| format!("writing '{}'", dst.display()))?;
    Ok(())
}
