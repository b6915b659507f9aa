//! Analysis pipeline - ICFG → distances → artifacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use dta_analysis::{
    back_propagate, collect_samples, compute_block_distances, merge_tables, project_to_lines,
    ForwardPass, PathNormalizer, SimpleCallGraph, Targets,
};
use dta_icfg::load_icfg;
use dta_pool::WorkerPool;
use dta_stats::{empirical_quantile, GammaDistrib};

use crate::output::{
    write_call_distances, write_line_table, write_simple_callgraph, write_target_info,
    TargetSummary,
};
use crate::{
    Error, Result, BT_BB_DIST_FILE, CALL_DIST_FILE, DF_BB_DIST_FILE, FINAL_BB_DIST_FILE,
    PRE_BLOCK_DIST_FILE, PROJECT_ROOT_ENV, SIMPLE_CG_FILE, TARGET_INFO_FILE,
};

/// What to analyze and which artifacts to emit.
#[derive(Clone, Debug)]
pub struct AnalyzerOptions {
    /// Processed-ICFG dot file from the pointer-analysis step.
    pub graph: PathBuf,
    /// Target location file; required for any distance artifact.
    pub targets: Option<PathBuf>,
    /// Output directory for all artifacts.
    pub output_dir: PathBuf,
    /// Project root; falls back to the environment.
    pub project_root: Option<PathBuf>,
    /// Dump the simplified call graph.
    pub dump_callgraph: bool,
    /// Dump per-function call distances.
    pub dump_call_distances: bool,
    /// Dump block distances before back-propagation.
    pub dump_pre_distances: bool,
    /// Dump the basic-block distance files and the target info.
    pub dump_bb_distances: bool,
    /// Summarize with a fitted gamma distribution instead of the
    /// empirical frequency.
    pub use_distribution: bool,
    /// Fit the gamma distribution by the method of moments.
    pub use_moments: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            graph: PathBuf::new(),
            targets: None,
            output_dir: PathBuf::from("."),
            project_root: None,
            dump_callgraph: false,
            dump_call_distances: false,
            dump_pre_distances: false,
            dump_bb_distances: true,
            use_distribution: false,
            use_moments: false,
        }
    }
}

impl AnalyzerOptions {
    fn wants_distances(&self) -> bool {
        self.dump_call_distances || self.dump_pre_distances || self.dump_bb_distances
    }
}

/// Run the pipeline; later stages are skipped when no remaining artifact
/// needs them.
pub fn run(options: &AnalyzerOptions) -> Result<()> {
    if !options.dump_callgraph && !options.wants_distances() {
        return Err(Error::Config("nothing to do".into()));
    }
    if !options.output_dir.is_dir() {
        return Err(Error::Config(format!(
            "output directory '{}' does not exist",
            options.output_dir.display()
        )));
    }

    let icfg = Arc::new(load_icfg(&options.graph)?);
    info!(nodes = icfg.len(), "ICFG loaded");
    let graph = SimpleCallGraph::build(&icfg)?;

    if options.dump_callgraph {
        write_simple_callgraph(&options.output_dir.join(SIMPLE_CG_FILE), &icfg, &graph)?;
    }
    if !options.wants_distances() {
        return Ok(());
    }

    let root = resolve_project_root(options)?;
    let target_path = options.targets.as_deref().ok_or_else(|| {
        Error::Config("no target file specified for distance computation".into())
    })?;
    let targets = Arc::new(Targets::load(target_path, &icfg, &root)?);

    let records = Arc::new(ForwardPass::run(&icfg, &targets, &graph)?);
    if options.dump_call_distances {
        write_call_distances(
            &options.output_dir.join(CALL_DIST_FILE),
            &targets,
            &records,
        )?;
    }
    if !options.dump_pre_distances && !options.dump_bb_distances {
        return Ok(());
    }

    let pool = WorkerPool::new();
    let forward = compute_block_distances(&icfg, &targets, &records, &graph, &pool)?;
    pool.shutdown();

    let mut normalizer = PathNormalizer::new(&root);
    if options.dump_pre_distances {
        let table = project_to_lines(&forward, &targets, &mut normalizer);
        write_line_table(&options.output_dir.join(PRE_BLOCK_DIST_FILE), &table)?;
    }
    if !options.dump_bb_distances {
        return Ok(());
    }

    let finals = back_propagate(&icfg, &targets, &graph, &records, forward)?;
    let df_table = project_to_lines(&finals.df, &targets, &mut normalizer);
    let bt_table = project_to_lines(&finals.bt, &targets, &mut normalizer);
    let final_table = merge_tables(&df_table, &bt_table);
    write_line_table(&options.output_dir.join(DF_BB_DIST_FILE), &df_table)?;
    write_line_table(&options.output_dir.join(BT_BB_DIST_FILE), &bt_table)?;
    write_line_table(&options.output_dir.join(FINAL_BB_DIST_FILE), &final_table)?;

    let summaries = summarize_targets(options, &df_table, targets.count())?;
    write_target_info(&options.output_dir.join(TARGET_INFO_FILE), &summaries)?;
    Ok(())
}

fn resolve_project_root(options: &AnalyzerOptions) -> Result<PathBuf> {
    let root = match &options.project_root {
        Some(root) => root.clone(),
        None => std::env::var_os(PROJECT_ROOT_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| {
                Error::Config(format!(
                    "no project root: pass --root or set {PROJECT_ROOT_ENV}"
                ))
            })?,
    };
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "project root '{}' is not a directory",
            root.display()
        )));
    }
    Ok(root)
}

/// Per-target distribution summaries over the df basic-block samples.
fn summarize_targets(
    options: &AnalyzerOptions,
    df_table: &dta_analysis::LineTable,
    target_count: usize,
) -> Result<Vec<TargetSummary>> {
    let samples = collect_samples(df_table, target_count);
    let mut summaries = Vec::with_capacity(target_count);
    for data in &samples {
        let summary = if options.use_distribution {
            let fit = GammaDistrib::estimate(data, !options.use_moments)?;
            let start = data.iter().copied().min().unwrap_or(0);
            let end = data.iter().copied().max().unwrap_or(0);
            TargetSummary {
                method: "Estimation",
                start,
                quantile: fit.cdf_quantile(start, end)?,
            }
        } else {
            let (start, quantile) = empirical_quantile(data)?;
            TargetSummary {
                method: "Frequency",
                start,
                quantile,
            }
        };
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Convenience wrapper used by tests: run with explicit paths.
pub fn analyze(graph: &Path, targets: &Path, output: &Path, root: &Path) -> Result<()> {
    run(&AnalyzerOptions {
        graph: graph.to_path_buf(),
        targets: Some(targets.to_path_buf()),
        output_dir: output.to_path_buf(),
        project_root: Some(root.to_path_buf()),
        ..AnalyzerOptions::default()
    })
}
