//! Target locations: parsing, validation, and resolution to ICFG nodes.

use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use tracing::{debug, info};

use dta_icfg::{Icfg, Location, NodeId, NodeKind};

use crate::{AnalysisError, Result, MAX_TARGETS};

/// A source-level target the fuzzer should steer toward.
///
/// The file is kept as path chunks because matching is suffix-based. The
/// weight is parsed and carried through but not consumed by the analysis.
#[derive(Clone, Debug)]
pub struct TargetLocation {
    pub chunks: Vec<String>,
    pub line: u32,
    pub weight: f64,
}

impl TargetLocation {
    pub fn new(file: &str, line: u32, weight: f64) -> Self {
        Self {
            chunks: file.split('/').map(str::to_string).collect(),
            line,
            weight,
        }
    }

    /// Parse the text form `path:line`, splitting at the last colon.
    pub fn parse(text: &str) -> Option<Self> {
        let (path, line) = text.rsplit_once(':')?;
        let path = path.trim();
        let line = line.trim().parse().ok()?;
        if path.is_empty() {
            return None;
        }
        Some(Self::new(path, line, 1.0))
    }

    /// Relaxed location match: equal line, equal last path component, and
    /// equal next-to-last component when both paths have one. Tolerates
    /// build-tree path rewrites.
    pub fn matches(&self, loc: &Location) -> bool {
        if self.line != loc.line {
            return false;
        }
        let theirs = loc.path_chunks();
        if theirs.is_empty() {
            return false;
        }
        let ours = &self.chunks;
        if ours.last().map(String::as_str) != theirs.last().copied() {
            return false;
        }
        if ours.len() >= 2 && theirs.len() >= 2 && ours[ours.len() - 2] != theirs[theirs.len() - 2]
        {
            return false;
        }
        true
    }

    /// The target's path as written, for diagnostics and root projection.
    pub fn display_path(&self) -> String {
        self.chunks.join("/")
    }
}

#[derive(Deserialize)]
struct TargetSpec {
    file: String,
    line: u32,
    #[serde(default = "default_weight")]
    weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Loaded targets plus their resolution against the graph.
pub struct Targets {
    locations: Vec<TargetLocation>,
    /// Per target, every node whose location matches it.
    nodes: Vec<FxHashSet<NodeId>>,
    /// Parsed location of every non-global node, memoized once.
    node_locations: FxHashMap<NodeId, Location>,
}

impl Targets {
    /// Read a target file, validate it against the project root, and
    /// resolve every target to its matching ICFG nodes.
    ///
    /// JSON files (by extension) hold an array of `{file, line}` objects;
    /// anything else is one `path:line` per non-empty line. A target whose
    /// source file is missing under the project root, or which matches no
    /// node, is fatal.
    pub fn load(path: &Path, icfg: &Icfg, project_root: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let locations = if path.extension().is_some_and(|e| e == "json") {
            let specs: Vec<TargetSpec> =
                serde_json::from_str(&text).map_err(|err| AnalysisError::InvalidTargetFile {
                    path: path.to_path_buf(),
                    detail: err.to_string(),
                })?;
            specs
                .into_iter()
                .map(|s| TargetLocation::new(&s.file, s.line, s.weight))
                .collect::<Vec<_>>()
        } else {
            let mut parsed = Vec::new();
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let target =
                    TargetLocation::parse(line).ok_or_else(|| AnalysisError::InvalidTargetLine {
                        path: path.to_path_buf(),
                        text: line.to_string(),
                    })?;
                parsed.push(target);
            }
            parsed
        };

        if locations.is_empty() {
            return Err(AnalysisError::NoTargets {
                path: path.to_path_buf(),
            });
        }
        if locations.len() > MAX_TARGETS {
            return Err(AnalysisError::TooManyTargets {
                path: path.to_path_buf(),
                count: locations.len(),
                max: MAX_TARGETS,
            });
        }

        for (index, target) in locations.iter().enumerate() {
            let source = project_root.join(target.display_path());
            if !source.is_file() {
                return Err(AnalysisError::TargetSourceMissing {
                    index,
                    path: source,
                });
            }
        }

        let mut targets = Self {
            nodes: vec![FxHashSet::default(); locations.len()],
            locations,
            node_locations: FxHashMap::default(),
        };
        targets.resolve(icfg)?;
        info!(
            path = %path.display(),
            count = targets.count(),
            "targets resolved"
        );
        Ok(targets)
    }

    /// Single scan over the graph: memoize every node location and collect
    /// the nodes matching each target.
    fn resolve(&mut self, icfg: &Icfg) -> Result<()> {
        for id in icfg.node_ids() {
            let node = icfg.node(id).expect("iterating known ids");
            if node.kind == NodeKind::Global {
                continue;
            }
            let loc = node
                .loc
                .as_deref()
                .map(Location::parse)
                .unwrap_or_default();
            for (index, target) in self.locations.iter().enumerate() {
                if target.matches(&loc) {
                    self.nodes[index].insert(id);
                }
            }
            self.node_locations.insert(id, loc);
        }

        for (index, matched) in self.nodes.iter().enumerate() {
            if matched.is_empty() {
                return Err(AnalysisError::TargetUnresolved {
                    index,
                    target: format!(
                        "{}:{}",
                        self.locations[index].display_path(),
                        self.locations[index].line
                    ),
                });
            }
            debug!(index, nodes = matched.len(), "target match set");
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.locations.len()
    }

    pub fn locations(&self) -> &[TargetLocation] {
        &self.locations
    }

    /// Whether `id` is a matching node for target `index`.
    pub fn is_target_node(&self, index: usize, id: NodeId) -> bool {
        self.nodes[index].contains(&id)
    }

    /// Matching nodes of target `index`, ascending.
    pub fn nodes_sorted(&self, index: usize) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes[index].iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Memoized location of a node; `None` only for the global node or
    /// ids foreign to the graph.
    pub fn location_of(&self, id: NodeId) -> Option<&Location> {
        self.node_locations.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_form() {
        let t = TargetLocation::parse("src/parse/lex.c:42").unwrap();
        assert_eq!(t.chunks, vec!["src", "parse", "lex.c"]);
        assert_eq!(t.line, 42);
        assert_eq!(t.weight, 1.0);

        assert!(TargetLocation::parse("no-colon").is_none());
        assert!(TargetLocation::parse(":12").is_none());
        assert!(TargetLocation::parse("a.c:x").is_none());
    }

    #[test]
    fn test_match_requires_line() {
        let t = TargetLocation::new("a/b.c", 10, 1.0);
        assert!(t.matches(&Location::new("a/b.c", 10, 0)));
        assert!(!t.matches(&Location::new("a/b.c", 11, 0)));
    }

    #[test]
    fn test_match_suffix_rule() {
        let t = TargetLocation::new("src/util/log.c", 7, 1.0);
        // Same last two components, different prefix.
        assert!(t.matches(&Location::new("/build/x/src/util/log.c", 7, 0)));
        // Different next-to-last component.
        assert!(!t.matches(&Location::new("other/log.c", 7, 0)));
        // Bare filename on the node side: only the last component compares.
        assert!(t.matches(&Location::new("log.c", 7, 0)));
        assert!(!t.matches(&Location::new("", 7, 0)));
    }

    #[test]
    fn test_match_single_chunk_target() {
        let t = TargetLocation::new("log.c", 3, 1.0);
        assert!(t.matches(&Location::new("deep/nested/log.c", 3, 0)));
        assert!(!t.matches(&Location::new("deep/nested/other.c", 3, 0)));
    }
}
