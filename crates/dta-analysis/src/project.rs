//! Projection of node distances onto source lines.
//!
//! Several ICFG nodes share one lower-level basic block (same file and
//! line); their vectors collapse with the element-wise minimum. File paths
//! are normalized against the project root, falling back to the bare file
//! name when the rewritten path does not exist there.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::{DistVec, NodeDistMap, Targets};

/// Relative file -> line -> collapsed distance vector.
///
/// `BTreeMap` keeps emission key-sorted so identical runs serialize
/// identically.
pub type LineTable = BTreeMap<String, BTreeMap<u32, DistVec>>;

/// Normalizes node file paths against the project root, with a cache.
pub struct PathNormalizer {
    root: PathBuf,
    cache: FxHashMap<String, Option<String>>,
}

impl PathNormalizer {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            cache: FxHashMap::default(),
        }
    }

    /// Strip leading `.`/`..` components; keep the stripped path if it
    /// names a file under the root, otherwise fall back to the base name.
    /// `None` when nothing usable remains.
    pub fn normalize(&mut self, file: &str) -> Option<String> {
        if file.is_empty() {
            return None;
        }
        if let Some(cached) = self.cache.get(file) {
            return cached.clone();
        }

        let chunks: Vec<&str> = file.split('/').collect();
        let mut start = 0;
        while start < chunks.len() && (chunks[start] == "." || chunks[start] == "..") {
            start += 1;
        }
        let result = if start >= chunks.len() {
            None
        } else {
            let stripped = chunks[start..].join("/");
            if self.root.join(&stripped).is_file() {
                Some(stripped)
            } else {
                Some(chunks[chunks.len() - 1].to_string())
            }
        };

        self.cache.insert(file.to_string(), result.clone());
        result
    }
}

/// Collapse a node-distance map onto (file, line) keys.
///
/// Nodes without a usable location (no file, or line 0) are dropped;
/// colliding lines merge with the element-wise minimum.
pub fn project_to_lines(
    map: &NodeDistMap,
    targets: &Targets,
    normalizer: &mut PathNormalizer,
) -> LineTable {
    let mut ids: Vec<_> = map.keys().copied().collect();
    ids.sort_unstable();

    let mut table = LineTable::new();
    for id in ids {
        let Some(loc) = targets.location_of(id) else {
            continue;
        };
        if loc.file.is_empty() || loc.line == 0 {
            continue;
        }
        let Some(file) = normalizer.normalize(&loc.file) else {
            continue;
        };
        let dists = &map[&id];
        table
            .entry(file)
            .or_default()
            .entry(loc.line)
            .and_modify(|slot| slot.merge_min(dists, 0))
            .or_insert_with(|| dists.clone());
    }
    table
}

/// Element-wise minimum of two line tables over the union of their keys.
pub fn merge_tables(a: &LineTable, b: &LineTable) -> LineTable {
    let mut merged = a.clone();
    for (file, lines) in b {
        let slot = merged.entry(file.clone()).or_default();
        for (line, dists) in lines {
            slot.entry(*line)
                .and_modify(|existing| existing.merge_min(dists, 0))
                .or_insert_with(|| dists.clone());
        }
    }
    merged
}

/// Per-target multiset of reached distances across a line table.
pub fn collect_samples(table: &LineTable, target_count: usize) -> Vec<Vec<u32>> {
    let mut samples = vec![Vec::new(); target_count];
    for lines in table.values() {
        for dists in lines.values() {
            for index in 0..target_count {
                let value = dists.get(index);
                if value >= 0 {
                    samples[index].push(value as u32);
                }
            }
        }
    }
    samples
}
