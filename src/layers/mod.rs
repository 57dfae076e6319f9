//! `modules/layers.conf` merging.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::staging::ensure_dir;
use crate::versions::{read_properties, write_properties};

/// Path of the layers configuration, relative to the staged root.
pub const LAYERS_CONF: &str = "modules/layers.conf";

const LAYERS_KEY: &str = "layers";

/// Combines the layers configurations several packages contributed.
pub trait LayersConfMerger {
    /// `sources` are in contribution order; `target` is the staged file.
    fn merge(&self, sources: &[PathBuf], target: &Path) -> Result<()>;
}

/// Ordered union of every source's `layers=` list.
///
/// Layer names keep the position of their first appearance. Other keys are
/// carried over with later sources winning.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayerListMerger;

impl LayersConfMerger for LayerListMerger {
    fn merge(&self, sources: &[PathBuf], target: &Path) -> Result<()> {
        let mut layers: Vec<String> = Vec::new();
        let mut merged = BTreeMap::new();

        for source in sources {
            let props = read_properties(source)?;
            for (key, value) in props {
                if key != LAYERS_KEY {
                    merged.insert(key, value);
                    continue;
                }
                for layer in value.split(',').map(str::trim).filter(|l| !l.is_empty()) {
                    if !layers.iter().any(|known| known == layer) {
                        layers.push(layer.to_string());
                    }
                }
            }
        }

        debug!(sources = sources.len(), layers = ?layers, "merged layers.conf");
        if !layers.is_empty() {
            merged.insert(LAYERS_KEY.to_string(), layers.join(","));
        }
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        write_properties(&merged, target)
    }
}

/// Contributed layers.conf files, in contribution order.
#[derive(Debug, Default, Clone)]
pub struct LayersConfSources {
    sources: Vec<PathBuf>,
}

impl LayersConfSources {
    /// Record `root/modules/layers.conf` when it exists.
    pub fn collect_from(&mut self, root: &Path) {
        let candidate = root.join(LAYERS_CONF);
        if candidate.is_file() {
            self.sources.push(candidate);
        }
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Merge into the staged tree when two or more sources exist.
///
/// Returns whether a merge ran. A single source is left as staged.
pub fn merge_if_needed(
    merger: &dyn LayersConfMerger,
    sources: &LayersConfSources,
    staged: &Path,
) -> Result<bool> {
    if sources.len() < 2 {
        return Ok(false);
    }
    merger.merge(sources.as_slice(), &staged.join(LAYERS_CONF))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn contribute(root: &Path, content: &str) {
        fs::create_dir_all(root.join("modules")).unwrap();
        fs::write(root.join(LAYERS_CONF), content).unwrap();
    }

    #[test]
    fn union_keeps_first_appearance_order() {
        let temp = TempDir::new().unwrap();
        let (a, b, staged) = (
            temp.path().join("a"),
            temp.path().join("b"),
            temp.path().join("staged"),
        );
        contribute(&a, "layers=ee,web\n");
        contribute(&b, "layers=microprofile, ee\nopt=1\n");

        let mut sources = LayersConfSources::default();
        sources.collect_from(&a);
        sources.collect_from(&temp.path().join("missing"));
        sources.collect_from(&b);
        assert_eq!(sources.len(), 2);

        assert!(merge_if_needed(&LayerListMerger, &sources, &staged).unwrap());

        assert_eq!(
            fs::read_to_string(staged.join(LAYERS_CONF)).unwrap(),
            "layers=ee,web,microprofile\nopt=1\n"
        );
    }

    #[test]
    fn single_source_is_left_alone() {
        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("staged");
        contribute(&staged, "layers=only\n");

        let mut sources = LayersConfSources::default();
        sources.collect_from(&staged);

        assert!(!merge_if_needed(&LayerListMerger, &sources, &staged).unwrap());
        assert_eq!(
            fs::read_to_string(staged.join(LAYERS_CONF)).unwrap(),
            "layers=only\n"
        );
    }
}
