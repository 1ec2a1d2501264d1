//! メトリクス×イテレーション評価の本体
//!
//! チェックポイント列に沿って予測を増分的に進め、加法メトリクスは
//! その場で評価・マージ、非加法メトリクスはスナップショット経由の
//! 二段階（produce → replay）で評価する。
//!
//! 状態遷移:
//! `Idle → ProducingAdditive* → [ProducingSnapshots → ConsumingNonAdditive]* → Finalized`
//!
//! - [`MetricsPlotCalcer::process_additive`]: チャンクを全チェックポイント
//!   分 advance し、加法メトリクスをインライン評価する。
//! - [`MetricsPlotCalcer::process_non_additive_window`]: 未処理の
//!   チェックポイントウィンドウを produce し、スロットごとに永続化する。
//! - [`MetricsPlotCalcer::finish_window`]: ウィンドウを replay して
//!   非加法メトリクスを評価し、再開点を準備する。
//! - [`MetricsPlotCalcer::compute_non_additive_full`]: 全 part が最初から
//!   揃っている場合のスピルなし経路。

use std::io::{self, Write};
use std::sync::Arc;

use crate::applier::Applier;
use crate::approx::ApproxBuffer;
use crate::dataset::{self, DatasetPart};
use crate::error::{EvalError, EvalResult};
use crate::metric::{Accumulator, ClassifiedMetrics, ErrorType, Metric};
use crate::schedule::CheckpointSchedule;
use crate::snapshot::{SnapshotConfig, SnapshotReader, SnapshotStore, open_store};

/// 評価範囲の指定
#[derive(Debug, Clone)]
pub struct PlotParams {
    /// 最初に評価するイテレーション
    pub first: u32,
    /// 評価終端（exclusive）。0 はツリー総数まで。
    pub last: u32,
    /// 評価間隔
    pub step: u32,
    /// 1 ウィンドウで処理するチェックポイント数
    pub process_step: usize,
}

enum ProceedMode {
    Additive,
    Snapshot,
}

/// メトリクス×イテレーション評価器
pub struct MetricsPlotCalcer<'a, A: Applier> {
    applier: &'a A,
    schedule: CheckpointSchedule,
    metrics: ClassifiedMetrics,
    additive_plots: Vec<Vec<Accumulator>>,
    non_additive_plots: Vec<Vec<Accumulator>>,
    processed_count: usize,
    process_step: usize,
    snapshot_config: SnapshotConfig,
    store: Option<Box<dyn SnapshotStore>>,
    resume: Option<Box<dyn SnapshotReader>>,
    /// 非加法評価用の連結ターゲット / 重み（最初のウィンドウで構築）
    working_targets: Vec<f32>,
    working_weights: Vec<f32>,
    dim: usize,
}

impl<'a, A: Applier> MetricsPlotCalcer<'a, A> {
    /// 評価器を構築する
    ///
    /// チェックポイント範囲はモデルのツリー数でクランプされる。
    pub fn new(
        applier: &'a A,
        metrics: &[Arc<dyn Metric>],
        params: &PlotParams,
        snapshot_config: SnapshotConfig,
    ) -> EvalResult<Self> {
        let dim = applier.output_dimension();
        if dim == 0 {
            return Err(EvalError::ZeroOutputDimension);
        }
        let schedule = CheckpointSchedule::for_model(
            params.first,
            params.last,
            params.step,
            applier.tree_count(),
        )?;
        let metrics = ClassifiedMetrics::new(metrics)?;
        let additive_plots = vec![vec![Accumulator::new(); schedule.len()]; metrics.additive().len()];
        let non_additive_plots =
            vec![vec![Accumulator::new(); schedule.len()]; metrics.non_additive().len()];
        let process_step = params.process_step.max(1);
        Ok(Self {
            applier,
            schedule,
            metrics,
            additive_plots,
            non_additive_plots,
            processed_count: 0,
            process_step,
            snapshot_config,
            store: None,
            resume: None,
            working_targets: Vec::new(),
            working_weights: Vec::new(),
            dim,
        })
    }

    /// チェックポイント列
    pub fn checkpoints(&self) -> &[u32] {
        self.schedule.points()
    }

    /// 分類済みメトリクス
    pub fn metrics(&self) -> &ClassifiedMetrics {
        &self.metrics
    }

    pub fn has_non_additive_metrics(&self) -> bool {
        self.metrics.has_non_additive()
    }

    /// 非加法ウィンドウが全チェックポイントを消費したか
    pub fn all_iterations_processed(&self) -> bool {
        self.processed_count == self.schedule.len()
    }

    /// 加法メトリクス向けにチャンクを処理する
    ///
    /// 全チェックポイントを 1 パスで advance し、各チェックポイントで
    /// 加法メトリクスを評価してマージする。スナップショットには触れない。
    pub fn process_additive(&mut self, part: &DatasetPart) -> EvalResult<&mut Self> {
        self.proceed(part, 0, self.schedule.len(), ProceedMode::Additive)?;
        Ok(self)
    }

    /// 非加法メトリクス向けに次ウィンドウを produce する
    ///
    /// 最初のウィンドウでは feed された part のターゲット / 重みを
    /// 作業セットに連結する。各チェックポイントの予測行列は
    /// スナップショットストアに永続化される。
    pub fn process_non_additive_window(&mut self, part: &DatasetPart) -> EvalResult<&mut Self> {
        if self.processed_count == 0 {
            let new_size = self.working_targets.len() + part.doc_count();
            self.working_targets.reserve(new_size);
            self.working_weights.reserve(new_size);
            self.working_targets.extend_from_slice(part.targets());
            self.working_weights.extend_from_slice(part.weights());
        }
        if self.store.is_none() {
            let slots = self.process_step.min(self.schedule.len());
            self.store = Some(open_store(
                &self.snapshot_config,
                self.dim,
                part.doc_count(),
                slots,
            ));
        }
        let begin = self.processed_count;
        let end = (self.processed_count + self.process_step).min(self.schedule.len());
        self.proceed(part, begin, end, ProceedMode::Snapshot)?;
        Ok(self)
    }

    /// produce 済みウィンドウを replay して非加法メトリクスを評価する
    ///
    /// 最終ウィンドウなら末尾スナップショットも破棄し、そうでなければ
    /// 末尾スロットに再開リーダーを開いて次ウィンドウのシードにする。
    pub fn finish_window(&mut self) -> EvalResult<&mut Self> {
        let begin = self.processed_count;
        let end = (self.processed_count + self.process_step).min(self.schedule.len());
        if begin == end {
            log::warn!("finish_window called with no produced window");
            return Ok(self);
        }
        // 前ウィンドウの再開リーダーはこのウィンドウの produce で消費済み
        self.resume = None;
        self.compute_non_additive(begin, end)?;
        self.processed_count = end;
        if self.all_iterations_processed() {
            self.store_mut()?.discard(end - 1)?;
        } else {
            self.resume = Some(self.store_mut()?.resume_reader(end - 1)?);
        }
        Ok(self)
    }

    /// 全 part が最初から揃っている場合のスピルなし非加法評価
    ///
    /// チェックポイントごとに全 part の増分を開始オフセットへ合成し、
    /// その場で非加法メトリクスを評価する。ディスクは使わない。
    pub fn compute_non_additive_full(&mut self, parts: &[&DatasetPart]) -> EvalResult<&mut Self> {
        let targets = dataset::concat_targets(parts);
        let weights = dataset::concat_weights(parts);
        let starts = dataset::start_doc_indices(parts);

        let mut buffer = ApproxBuffer::for_parts(self.dim, parts, true)?;
        let mut tree_begin = 0u32;
        for slot in 0..self.schedule.len() {
            let tree_end = self.schedule.point(slot) + 1;
            for (part_idx, part) in parts.iter().enumerate() {
                let delta = self.applier.apply_range(part, tree_begin, tree_end)?;
                debug_assert_eq!(delta.len(), self.dim);
                buffer.append(&delta, starts[part_idx]);
            }
            for (m, metric) in self.metrics.non_additive().iter().enumerate() {
                self.non_additive_plots[m][slot] =
                    metric.eval(buffer.rows(), &targets, &weights, &[], 0, targets.len());
            }
            tree_begin = tree_end;
        }
        self.processed_count = self.schedule.len();
        Ok(self)
    }

    /// 最終スコア行列 `[元メトリクススロット][チェックポイント]`
    pub fn score_matrix(&self) -> Vec<Vec<f64>> {
        let mut scores = vec![vec![0.0; self.schedule.len()]; self.metrics.total()];
        for slot in 0..self.schedule.len() {
            for (m, metric) in self.metrics.additive().iter().enumerate() {
                scores[self.metrics.additive_slots()[m]][slot] =
                    metric.final_value(&self.additive_plots[m][slot]);
            }
            for (m, metric) in self.metrics.non_additive().iter().enumerate() {
                scores[self.metrics.non_additive_slots()[m]][slot] =
                    metric.final_value(&self.non_additive_plots[m][slot]);
            }
        }
        scores
    }

    /// 確定前のアキュムレータをタブ区切りで書き出す
    ///
    /// 1 行 = (チェックポイント, メトリクス)。stats はマージ可能な
    /// 生の部分統計で、外部シンクが別実行の結果と合成できる。
    pub fn write_partial_stats(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "metric\titeration\tstats")?;
        for slot in 0..self.schedule.len() {
            let iteration = self.schedule.point(slot);
            for (m, metric) in self.metrics.additive().iter().enumerate() {
                Self::write_stats_line(
                    out,
                    &metric.description(),
                    iteration,
                    &self.additive_plots[m][slot],
                )?;
            }
            for (m, metric) in self.metrics.non_additive().iter().enumerate() {
                Self::write_stats_line(
                    out,
                    &metric.description(),
                    iteration,
                    &self.non_additive_plots[m][slot],
                )?;
            }
        }
        Ok(())
    }

    fn write_stats_line(
        out: &mut dyn Write,
        description: &str,
        iteration: u32,
        acc: &Accumulator,
    ) -> io::Result<()> {
        write!(out, "{description}\t{iteration}")?;
        for s in &acc.stats {
            write!(out, "\t{s}")?;
        }
        writeln!(out)
    }

    fn store_mut(&mut self) -> EvalResult<&mut Box<dyn SnapshotStore>> {
        self.store.as_mut().ok_or(EvalError::MissingSnapshot {
            slot: self.processed_count,
        })
    }

    /// チャンクをチェックポイント範囲 `[begin_slot, end_slot)` だけ進める
    ///
    /// 再開時（begin_slot > 0）はゼロ / ベースライン初期化の代わりに
    /// 再開リーダーから前ウィンドウ末尾の予測を読み込み、ツリー範囲は
    /// スナップショットが含む末尾の次から始める。
    fn proceed(
        &mut self,
        part: &DatasetPart,
        begin_slot: usize,
        end_slot: usize,
        mode: ProceedMode,
    ) -> EvalResult<()> {
        let mut buffer = ApproxBuffer::for_parts(self.dim, &[part], begin_slot == 0)?;

        let mut tree_begin = if begin_slot == 0 {
            0
        } else {
            let reader = self
                .resume
                .as_mut()
                .ok_or(EvalError::ResumeMissing { slot: begin_slot })?;
            reader.read_block(&mut buffer)?;
            // スナップショットはツリー [0, point(begin_slot-1) + 1) を含む
            self.schedule.point(begin_slot - 1) + 1
        };

        for slot in begin_slot..end_slot {
            let tree_end = self.schedule.point(slot) + 1;
            log::debug!(
                "advance slot={slot} trees=[{tree_begin}, {tree_end}) docs={}",
                part.doc_count()
            );
            let delta = self.applier.apply_range(part, tree_begin, tree_end)?;
            debug_assert_eq!(delta.len(), self.dim);
            buffer.append(&delta, 0);

            match mode {
                ProceedMode::Additive => self.eval_additive(buffer.rows(), part, slot),
                ProceedMode::Snapshot => {
                    let rows = buffer.rows();
                    // borrow の都合で store_mut を経由しない
                    let store = self.store.as_mut().ok_or(EvalError::MissingSnapshot { slot })?;
                    store.persist(slot, rows)?;
                }
            }
            tree_begin = tree_end;
        }
        Ok(())
    }

    fn eval_additive(&mut self, rows: &[Vec<f64>], part: &DatasetPart, slot: usize) {
        let doc_count = part.doc_count();
        let group_count = part.groups().len();
        for (m, metric) in self.metrics.additive().iter().enumerate() {
            let end = match metric.error_type() {
                ErrorType::PerObject => doc_count,
                ErrorType::Querywise | ErrorType::Pairwise => group_count,
            };
            let acc = metric.eval(
                rows,
                part.targets(),
                part.weights(),
                part.groups(),
                0,
                end,
            );
            self.additive_plots[m][slot].merge(&acc);
        }
    }

    /// ウィンドウ `[begin_slot, end_slot)` の replay
    ///
    /// 各スロットを一度だけ reload して全非加法メトリクスを評価し、
    /// ひとつ前のスロットを破棄する。末尾スロットの処遇は
    /// [`Self::finish_window`] が決める。
    fn compute_non_additive(&mut self, begin_slot: usize, end_slot: usize) -> EvalResult<()> {
        let doc_count = self.working_targets.len();
        for slot in begin_slot..end_slot {
            let rows = {
                let store = self.store.as_mut().ok_or(EvalError::MissingSnapshot { slot })?;
                store.reload(slot, self.dim, doc_count)?
            };
            for (m, metric) in self.metrics.non_additive().iter().enumerate() {
                self.non_additive_plots[m][slot] = metric.eval(
                    &rows,
                    &self.working_targets,
                    &self.working_weights,
                    &[],
                    0,
                    doc_count,
                );
            }
            if slot != 0 {
                self.store_mut()?.discard(slot - 1)?;
            }
        }
        Ok(())
    }
}
