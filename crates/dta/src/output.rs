//! JSON and dot artifact writers.
//!
//! All JSON objects are built over `BTreeMap` so emission is key-sorted
//! and re-runs on identical inputs produce identical files.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use dta_analysis::{CallDistMap, LineTable, SimpleCallGraph, Targets};
use dta_icfg::Icfg;

use crate::{Error, Result};

#[derive(Serialize)]
struct CallDistanceFile {
    #[serde(rename = "TargetNodes")]
    target_nodes: Vec<Vec<u32>>,
    #[serde(rename = "CallDistances")]
    call_distances: BTreeMap<String, (u32, Vec<i32>)>,
}

/// Write the per-function call records plus the resolved target nodes.
pub fn write_call_distances(
    path: &Path,
    targets: &Targets,
    records: &CallDistMap,
) -> Result<()> {
    let file = CallDistanceFile {
        target_nodes: (0..targets.count())
            .map(|index| targets.nodes_sorted(index))
            .collect(),
        call_distances: records
            .iter()
            .map(|(name, record)| {
                (
                    name.clone(),
                    (record.intra_exit, record.dists.values().to_vec()),
                )
            })
            .collect(),
    };
    write_json(path, &file)
}

/// Write a (file, line)-keyed distance table.
pub fn write_line_table(path: &Path, table: &LineTable) -> Result<()> {
    let mut root: BTreeMap<&str, BTreeMap<String, &[i32]>> = BTreeMap::new();
    for (file, lines) in table {
        let slot = root.entry(file.as_str()).or_default();
        for (line, dists) in lines {
            slot.insert(line.to_string(), dists.values());
        }
    }
    write_json(path, &root)
}

/// One target's distribution summary.
#[derive(Serialize)]
pub struct TargetSummary {
    #[serde(rename = "Method")]
    pub method: &'static str,
    #[serde(rename = "Start")]
    pub start: u32,
    #[serde(rename = "Quantile")]
    pub quantile: Vec<f64>,
}

#[derive(Serialize)]
struct TargetInfoFile<'a> {
    #[serde(rename = "TargetCount")]
    target_count: usize,
    #[serde(rename = "TargetInfo")]
    target_info: &'a [TargetSummary],
}

/// Write the per-target quantile summaries.
pub fn write_target_info(path: &Path, summaries: &[TargetSummary]) -> Result<()> {
    write_json(
        path,
        &TargetInfoFile {
            target_count: summaries.len(),
            target_info: summaries,
        },
    )
}

/// Write the simplified call graph as dot, nodes and edges sorted by
/// function name.
pub fn write_simple_callgraph(
    path: &Path,
    icfg: &Icfg,
    graph: &SimpleCallGraph,
) -> Result<()> {
    let name_of = |entry| {
        icfg.node(entry)
            .map(|n| n.function.as_str())
            .unwrap_or_default()
    };
    let mut names: Vec<&str> = graph
        .entries_sorted()
        .into_iter()
        .map(name_of)
        .collect();
    names.sort_unstable();

    let mut edges: Vec<(&str, &str)> = Vec::new();
    for entry in graph.entries_sorted() {
        for callee in graph.callees_sorted(entry) {
            edges.push((name_of(entry), name_of(callee)));
        }
    }
    edges.sort_unstable();

    let mut text = String::from("digraph \"Simple Call Graph\" {\n");
    for name in names {
        text.push_str(&format!("    \"{name}\";\n"));
    }
    for (caller, callee) in edges {
        text.push_str(&format!("    \"{caller}\" -> \"{callee}\";\n"));
    }
    text.push_str("}\n");

    std::fs::write(path, text).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "wrote call graph");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let map_err = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::create(path).map_err(map_err)?;
    serde_json::to_writer_pretty(&mut file, value)
        .map_err(|err| map_err(std::io::Error::other(err)))?;
    file.write_all(b"\n").map_err(map_err)?;
    info!(path = %path.display(), "wrote artifact");
    Ok(())
}
