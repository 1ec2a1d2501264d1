/// メトリクス×イテレーション評価 CLI
///
/// 学習済みの決定株アンサンブル（JSON）と JSONL データセットを受け取り、
/// チェックポイントごとのメトリクス値をタブ区切りで出力する。
///
/// 使い方:
///   # 単一データセット、RMSE と AUC を 10 イテレーションおきに評価
///   plot_metrics --model model.json --data eval.jsonl \
///     --metric RMSE --metric AUC --step 10
///
///   # 複数 part（スピルなしのフル経路）+ 部分統計の書き出し
///   plot_metrics --model model.json --data part0.jsonl --data part1.jsonl \
///     --metric AUC --stats-out partial_stats.tsv
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;

use ensplot_core::{
    Auc, DatasetPart, Metric, MetricsPlotCalcer, PlotParams, QueryRmse, Rmse, SnapshotConfig,
};
use tools::gbm::{StumpEnsemble, load_dataset_part};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(about = "metric-by-iteration evaluation of a stump ensemble")]
struct Cli {
    /// Model file (JSON stump ensemble)
    #[arg(long)]
    model: PathBuf,

    /// Dataset files (JSONL, can be repeated; multiple files enable the
    /// multi-part full path for non-additive metrics)
    #[arg(long = "data", required = true, num_args = 1)]
    data: Vec<PathBuf>,

    /// First iteration to evaluate
    #[arg(long, default_value_t = 0)]
    first: u32,

    /// Evaluation end (exclusive); 0 means the whole ensemble
    #[arg(long, default_value_t = 0)]
    last: u32,

    /// Evaluation period (iterations between checkpoints)
    #[arg(long, default_value_t = 1)]
    step: u32,

    /// Checkpoints per non-additive processing window
    #[arg(long, default_value_t = 50)]
    process_step: usize,

    /// Metric names (RMSE / QueryRMSE / AUC, can be repeated)
    #[arg(long = "metric", required = true)]
    metrics: Vec<String>,

    /// Scratch directory for prediction snapshots
    #[arg(long, default_value = "ensplot_tmp")]
    tmp_dir: PathBuf,

    /// Snapshot memory budget in MiB (larger windows spill to disk)
    #[arg(long)]
    memory_budget_mb: Option<u64>,

    /// Output TSV path (default: stdout)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write merge-ready partial statistics to this TSV before finalization
    #[arg(long)]
    stats_out: Option<PathBuf>,
}

fn metric_by_name(name: &str) -> Result<Arc<dyn Metric>> {
    match name.to_ascii_uppercase().as_str() {
        "RMSE" => Ok(Arc::new(Rmse)),
        "QUERYRMSE" => Ok(Arc::new(QueryRmse)),
        "AUC" => Ok(Arc::new(Auc)),
        _ => bail!("unknown metric '{name}' (supported: RMSE, QueryRMSE, AUC)"),
    }
}

fn write_scores(
    out: &mut dyn Write,
    checkpoints: &[u32],
    descriptions: &[String],
    scores: &[Vec<f64>],
) -> Result<()> {
    write!(out, "iter")?;
    for d in descriptions {
        write!(out, "\t{d}")?;
    }
    writeln!(out)?;
    for (slot, &iter) in checkpoints.iter().enumerate() {
        write!(out, "{iter}")?;
        for row in scores {
            write!(out, "\t{}", row[slot])?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    let model = StumpEnsemble::load(&cli.model)?;
    let parts: Vec<DatasetPart> = cli
        .data
        .iter()
        .map(load_dataset_part)
        .collect::<Result<_>>()?;
    let part_refs: Vec<&DatasetPart> = parts.iter().collect();

    let metrics: Vec<Arc<dyn Metric>> = cli
        .metrics
        .iter()
        .map(|name| metric_by_name(name))
        .collect::<Result<_>>()?;

    let mut config = SnapshotConfig::new(&cli.tmp_dir);
    if let Some(mb) = cli.memory_budget_mb {
        config = config.with_memory_budget(mb << 20);
    }
    let params = PlotParams {
        first: cli.first,
        last: cli.last,
        step: cli.step,
        process_step: cli.process_step,
    };
    let mut calcer = MetricsPlotCalcer::new(&model, &metrics, &params, config)?;
    log::info!(
        "evaluating {} metrics at {} checkpoints over {} dataset part(s)",
        metrics.len(),
        calcer.checkpoints().len(),
        parts.len()
    );

    if !calcer.metrics().additive().is_empty() {
        for part in &parts {
            calcer.process_additive(part)?;
        }
    }
    if calcer.has_non_additive_metrics() {
        if parts.len() > 1 {
            // 全 part が揃っているのでスピルなしのフル経路
            calcer.compute_non_additive_full(&part_refs)?;
        } else {
            while !calcer.all_iterations_processed() {
                calcer.process_non_additive_window(&parts[0])?;
                calcer.finish_window()?;
            }
        }
    }

    if let Some(path) = &cli.stats_out {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        calcer.write_partial_stats(&mut out)?;
        out.flush()?;
        log::info!("wrote partial stats to {}", path.display());
    }

    let checkpoints = calcer.checkpoints().to_vec();
    let descriptions = calcer.metrics().descriptions();
    let scores = calcer.score_matrix();
    match &cli.out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            write_scores(&mut out, &checkpoints, &descriptions, &scores)?;
            out.flush()?;
            log::info!("wrote scores to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            write_scores(&mut stdout.lock(), &checkpoints, &descriptions, &scores)?;
        }
    }
    Ok(())
}
