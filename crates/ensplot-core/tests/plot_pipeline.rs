//! パイプライン全体の結合テスト
//!
//! 合成 applier（決定的な擬似モデル）で、増分 advance + スピル / replay の
//! 結果がチェックポイントごとのフル再計算と一致することを確認する。

use std::sync::Arc;

use ensplot_core::{
    Applier, Auc, DatasetPart, EvalResult, Metric, MetricsPlotCalcer, PlotParams, Rmse,
    SnapshotConfig,
};

/// 決定的な合成アンサンブル
///
/// ツリー t は文書の先頭特徴量 x に対して `sin(t+1) * (x + 0.3) / (dim+1)`
/// を出力次元ごとに加算する。part の切り方に依存しない。
struct SyntheticApplier {
    dim: usize,
    trees: u32,
}

impl SyntheticApplier {
    fn contribution(&self, tree: u32, x: f32, dim: usize) -> f64 {
        ((tree + 1) as f64).sin() * (x as f64 + 0.3) / (dim as f64 + 1.0)
    }
}

impl Applier for SyntheticApplier {
    fn output_dimension(&self) -> usize {
        self.dim
    }

    fn tree_count(&self) -> u32 {
        self.trees
    }

    fn apply_range(
        &self,
        part: &DatasetPart,
        tree_begin: u32,
        tree_end: u32,
    ) -> EvalResult<Vec<Vec<f64>>> {
        let mut delta = vec![vec![0.0; part.doc_count()]; self.dim];
        for (i, row) in part.features().iter().enumerate() {
            for t in tree_begin..tree_end {
                for (d, out) in delta.iter_mut().enumerate() {
                    out[i] += self.contribution(t, row[0], d);
                }
            }
        }
        Ok(delta)
    }
}

fn make_part(features: &[f32], targets: &[f32], weights: &[f32]) -> DatasetPart {
    DatasetPart::new(
        features.iter().map(|&x| vec![x]).collect(),
        targets.to_vec(),
        Some(weights.to_vec()),
        vec![],
        None,
    )
    .unwrap()
}

fn sample_part() -> DatasetPart {
    make_part(
        &[0.1, 0.9, 0.4, 0.7, 0.2, 0.8],
        &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
        &[1.0, 2.0, 1.0, 0.5, 1.5, 1.0],
    )
}

/// チェックポイントごとのフル再計算でスコア行列を求める
fn direct_scores(
    applier: &SyntheticApplier,
    metrics: &[Arc<dyn Metric>],
    parts: &[&DatasetPart],
    checkpoints: &[u32],
) -> Vec<Vec<f64>> {
    let targets: Vec<f32> = parts.iter().flat_map(|p| p.targets().to_vec()).collect();
    let weights: Vec<f32> = parts.iter().flat_map(|p| p.weights().to_vec()).collect();
    let doc_count = targets.len();

    let mut scores = vec![vec![0.0; checkpoints.len()]; metrics.len()];
    for (slot, &c) in checkpoints.iter().enumerate() {
        let mut approx = vec![vec![0.0; doc_count]; applier.output_dimension()];
        let mut start = 0;
        for part in parts {
            let delta = applier.apply_range(part, 0, c + 1).unwrap();
            for (dst, src) in approx.iter_mut().zip(&delta) {
                for (i, v) in src.iter().enumerate() {
                    dst[start + i] += v;
                }
            }
            start += part.doc_count();
        }
        for (m, metric) in metrics.iter().enumerate() {
            let acc = metric.eval(&approx, &targets, &weights, &[], 0, doc_count);
            scores[m][slot] = metric.final_value(&acc);
        }
    }
    scores
}

fn assert_matrix_close(a: &[Vec<f64>], b: &[Vec<f64>], tol: f64) {
    assert_eq!(a.len(), b.len());
    for (ra, rb) in a.iter().zip(b) {
        assert_eq!(ra.len(), rb.len());
        for (x, y) in ra.iter().zip(rb) {
            assert!((x - y).abs() <= tol, "matrix mismatch: {x} vs {y}");
        }
    }
}

fn run_windowed(
    applier: &SyntheticApplier,
    metrics: &[Arc<dyn Metric>],
    part: &DatasetPart,
    params: &PlotParams,
    config: SnapshotConfig,
) -> Vec<Vec<f64>> {
    let mut calcer = MetricsPlotCalcer::new(applier, metrics, params, config).unwrap();
    calcer.process_additive(part).unwrap();
    while !calcer.all_iterations_processed() {
        calcer.process_non_additive_window(part).unwrap();
        calcer.finish_window().unwrap();
    }
    calcer.score_matrix()
}

#[test]
fn windowed_spill_matches_direct_recompute() {
    let applier = SyntheticApplier { dim: 1, trees: 10 };
    let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(Rmse), Arc::new(Auc)];
    let part = sample_part();
    let params = PlotParams {
        first: 0,
        last: 10,
        step: 3,
        process_step: 2,
    };

    let tmp = tempfile::tempdir().unwrap();
    // 予算 0 でファイルバッキングを強制し、スピル経路を通す
    let config = SnapshotConfig::new(tmp.path().join("scratch")).with_memory_budget(0);
    let scores = run_windowed(&applier, &metrics, &part, &params, config);

    let expected = direct_scores(&applier, &metrics, &[&part], &[0, 3, 6, 9]);
    assert_matrix_close(&scores, &expected, 1e-9);

    // 全スナップショット消費後はスクラッチディレクトリも残らない
    assert!(!tmp.path().join("scratch").exists());
}

#[test]
fn memory_backend_matches_file_backend() {
    let applier = SyntheticApplier { dim: 2, trees: 8 };
    let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(Auc)];
    let part = sample_part();
    let params = PlotParams {
        first: 0,
        last: 8,
        step: 2,
        process_step: 2,
    };

    let tmp = tempfile::tempdir().unwrap();
    let file_scores = run_windowed(
        &applier,
        &metrics,
        &part,
        &params,
        SnapshotConfig::new(tmp.path().join("a")).with_memory_budget(0),
    );
    let mem_scores = run_windowed(
        &applier,
        &metrics,
        &part,
        &params,
        SnapshotConfig::new(tmp.path().join("b")),
    );
    assert_matrix_close(&file_scores, &mem_scores, 0.0);
}

#[test]
fn resume_equals_uninterrupted() {
    let applier = SyntheticApplier { dim: 1, trees: 12 };
    let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(Auc)];
    let part = sample_part();
    let tmp = tempfile::tempdir().unwrap();

    // ウィンドウ 1 チェックポイントずつ（毎回再開）
    let interrupted = run_windowed(
        &applier,
        &metrics,
        &part,
        &PlotParams {
            first: 0,
            last: 12,
            step: 5,
            process_step: 1,
        },
        SnapshotConfig::new(tmp.path().join("a")).with_memory_budget(0),
    );
    // 全チェックポイントを 1 ウィンドウで
    let straight = run_windowed(
        &applier,
        &metrics,
        &part,
        &PlotParams {
            first: 0,
            last: 12,
            step: 5,
            process_step: 100,
        },
        SnapshotConfig::new(tmp.path().join("b")).with_memory_budget(0),
    );
    assert_matrix_close(&interrupted, &straight, 1e-12);
}

#[test]
fn additive_chunk_order_is_irrelevant() {
    let applier = SyntheticApplier { dim: 1, trees: 6 };
    let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(Rmse)];
    let a = make_part(&[0.1, 0.9, 0.4], &[0.0, 1.0, 0.0], &[1.0, 2.0, 1.0]);
    let b = make_part(&[0.7, 0.2, 0.8], &[1.0, 0.0, 1.0], &[0.5, 1.5, 1.0]);
    let params = PlotParams {
        first: 0,
        last: 6,
        step: 2,
        process_step: 4,
    };
    let tmp = tempfile::tempdir().unwrap();

    let mut forward =
        MetricsPlotCalcer::new(&applier, &metrics, &params, SnapshotConfig::new(tmp.path()))
            .unwrap();
    forward.process_additive(&a).unwrap();
    forward.process_additive(&b).unwrap();

    let mut backward =
        MetricsPlotCalcer::new(&applier, &metrics, &params, SnapshotConfig::new(tmp.path()))
            .unwrap();
    backward.process_additive(&b).unwrap();
    backward.process_additive(&a).unwrap();

    assert_matrix_close(&forward.score_matrix(), &backward.score_matrix(), 1e-12);

    // 単一チャンクで処理した場合とも一致する
    let whole = sample_part();
    let mut single =
        MetricsPlotCalcer::new(&applier, &metrics, &params, SnapshotConfig::new(tmp.path()))
            .unwrap();
    single.process_additive(&whole).unwrap();
    assert_matrix_close(&forward.score_matrix(), &single.score_matrix(), 1e-9);
}

#[test]
fn multi_part_full_path_matches_windowed_single_part() {
    let applier = SyntheticApplier { dim: 1, trees: 9 };
    let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(Rmse), Arc::new(Auc)];
    let a = make_part(&[0.1, 0.9, 0.4], &[0.0, 1.0, 0.0], &[1.0, 2.0, 1.0]);
    let b = make_part(&[0.7, 0.2, 0.8], &[1.0, 0.0, 1.0], &[0.5, 1.5, 1.0]);
    let params = PlotParams {
        first: 0,
        last: 9,
        step: 4,
        process_step: 8,
    };
    let tmp = tempfile::tempdir().unwrap();

    let mut full =
        MetricsPlotCalcer::new(&applier, &metrics, &params, SnapshotConfig::new(tmp.path()))
            .unwrap();
    full.process_additive(&a).unwrap();
    full.process_additive(&b).unwrap();
    full.compute_non_additive_full(&[&a, &b]).unwrap();

    let whole = sample_part();
    let windowed = run_windowed(
        &applier,
        &metrics,
        &whole,
        &params,
        SnapshotConfig::new(tmp.path().join("w")).with_memory_budget(0),
    );
    assert_matrix_close(&full.score_matrix(), &windowed, 1e-9);
}

#[test]
fn multi_part_windowed_feed_matches_direct() {
    // ウィンドウごとに複数 part を feed 順に流す経路
    let applier = SyntheticApplier { dim: 1, trees: 7 };
    let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(Auc)];
    let a = make_part(&[0.1, 0.9, 0.4], &[0.0, 1.0, 0.0], &[1.0, 2.0, 1.0]);
    let b = make_part(&[0.7, 0.2, 0.8], &[1.0, 0.0, 1.0], &[0.5, 1.5, 1.0]);
    let params = PlotParams {
        first: 0,
        last: 7,
        step: 2,
        process_step: 2,
    };
    let tmp = tempfile::tempdir().unwrap();

    let mut calcer = MetricsPlotCalcer::new(
        &applier,
        &metrics,
        &params,
        SnapshotConfig::new(tmp.path().join("scratch")).with_memory_budget(0),
    )
    .unwrap();
    while !calcer.all_iterations_processed() {
        calcer.process_non_additive_window(&a).unwrap();
        calcer.process_non_additive_window(&b).unwrap();
        calcer.finish_window().unwrap();
    }

    let expected = direct_scores(&applier, &metrics, &[&a, &b], calcer.checkpoints());
    assert_matrix_close(&calcer.score_matrix(), &expected, 1e-9);
}

#[test]
fn baseline_seeds_first_checkpoint() {
    let applier = SyntheticApplier { dim: 1, trees: 4 };
    let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(Rmse)];
    let baseline = vec![vec![0.5, -0.5, 0.25]];
    let part = DatasetPart::new(
        vec![vec![0.1], vec![0.9], vec![0.4]],
        vec![0.0, 1.0, 0.0],
        None,
        vec![],
        Some(baseline.clone()),
    )
    .unwrap();
    let params = PlotParams {
        first: 0,
        last: 4,
        step: 1,
        process_step: 4,
    };
    let tmp = tempfile::tempdir().unwrap();

    let mut calcer =
        MetricsPlotCalcer::new(&applier, &metrics, &params, SnapshotConfig::new(tmp.path()))
            .unwrap();
    calcer.process_additive(&part).unwrap();
    let scores = calcer.score_matrix();

    // 手計算: ベースライン + ツリー [0, c+1) の寄与
    let targets = part.targets().to_vec();
    let weights = part.weights().to_vec();
    for (slot, &c) in calcer.checkpoints().to_vec().iter().enumerate() {
        let delta = applier.apply_range(&part, 0, c + 1).unwrap();
        let approx: Vec<f64> = baseline[0]
            .iter()
            .zip(&delta[0])
            .map(|(b, d)| b + d)
            .collect();
        let acc = Rmse.eval(&[approx], &targets, &weights, &[], 0, 3);
        let expected = Rmse.final_value(&acc);
        assert!((scores[0][slot] - expected).abs() < 1e-12);
    }
}

#[test]
fn partial_stats_dump_shape() {
    let applier = SyntheticApplier { dim: 1, trees: 6 };
    let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(Rmse), Arc::new(Auc)];
    let part = sample_part();
    let params = PlotParams {
        first: 0,
        last: 6,
        step: 2,
        process_step: 8,
    };
    let tmp = tempfile::tempdir().unwrap();
    let config = SnapshotConfig::new(tmp.path().join("scratch"));

    let mut calcer = MetricsPlotCalcer::new(&applier, &metrics, &params, config).unwrap();
    calcer.process_additive(&part).unwrap();
    calcer.process_non_additive_window(&part).unwrap();
    calcer.finish_window().unwrap();

    let mut out = Vec::new();
    calcer.write_partial_stats(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "metric\titeration\tstats");
    // (メトリクス 2) × (チェックポイント 4) + ヘッダ
    assert_eq!(lines.len(), 1 + 2 * calcer.checkpoints().len());
    assert!(lines[1].starts_with("RMSE\t0\t"));
}
