//! 組み込みメトリクス
//!
//! tools バイナリとテストが使う最小セット。
//!
//! - [`Rmse`]: 加法・PerObject
//! - [`QueryRmse`]: 加法・Querywise（クエリごとに最適な定数シフトを控除）
//! - [`Auc`]: 非加法・PerObject（重み付きペア一致率、同点は 0.5）

use super::{Accumulator, ErrorType, Metric};
use crate::dataset::GroupBounds;

/// 重み付き RMSE
///
/// stats = `[Σ w·(approx − target)², Σ w]`、確定値は `sqrt(s0 / s1)`。
#[derive(Debug, Default)]
pub struct Rmse;

impl Metric for Rmse {
    fn description(&self) -> String {
        "RMSE".to_string()
    }

    fn is_additive(&self) -> bool {
        true
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::PerObject
    }

    fn eval(
        &self,
        approx: &[Vec<f64>],
        targets: &[f32],
        weights: &[f32],
        _groups: &[GroupBounds],
        begin: usize,
        end: usize,
    ) -> Accumulator {
        let row = &approx[0];
        let mut err = 0.0;
        let mut weight = 0.0;
        for i in begin..end {
            let w = weights[i] as f64;
            let d = row[i] - targets[i] as f64;
            err += w * d * d;
            weight += w;
        }
        Accumulator {
            stats: vec![err, weight],
        }
    }

    fn final_value(&self, acc: &Accumulator) -> f64 {
        if acc.stats[1] > 0.0 {
            (acc.stats[0] / acc.stats[1]).sqrt()
        } else {
            0.0
        }
    }
}

/// クエリ単位 RMSE
///
/// クエリごとに重み付き平均残差（最適な定数シフト）を差し引いてから
/// 二乗誤差を取る。ランキング系データでのスケール不定性を吸収する。
#[derive(Debug, Default)]
pub struct QueryRmse;

impl Metric for QueryRmse {
    fn description(&self) -> String {
        "QueryRMSE".to_string()
    }

    fn is_additive(&self) -> bool {
        true
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::Querywise
    }

    fn eval(
        &self,
        approx: &[Vec<f64>],
        targets: &[f32],
        weights: &[f32],
        groups: &[GroupBounds],
        begin: usize,
        end: usize,
    ) -> Accumulator {
        let row = &approx[0];
        let mut err = 0.0;
        let mut weight = 0.0;
        for g in &groups[begin..end] {
            let mut sum_w = 0.0;
            let mut sum_residual = 0.0;
            for i in g.begin..g.end {
                let w = weights[i] as f64;
                sum_w += w;
                sum_residual += w * (targets[i] as f64 - row[i]);
            }
            if sum_w == 0.0 {
                continue;
            }
            let shift = sum_residual / sum_w;
            for i in g.begin..g.end {
                let w = weights[i] as f64;
                let d = targets[i] as f64 - row[i] - shift;
                err += w * d * d;
            }
            weight += sum_w;
        }
        Accumulator {
            stats: vec![err, weight],
        }
    }

    fn final_value(&self, acc: &Accumulator) -> f64 {
        if acc.stats[1] > 0.0 {
            (acc.stats[0] / acc.stats[1]).sqrt()
        } else {
            0.0
        }
    }
}

/// 重み付き AUC
///
/// 正例 (target > 0.5) と負例の全ペアについて、予測値の順位一致を
/// 重み積で集計する。同点ペアは 0.5。ソート 1 回 + 累積和の掃引で
/// O(n log n)。全文書の予測ベクトルを要求するため非加法。
#[derive(Debug, Default)]
pub struct Auc;

impl Metric for Auc {
    fn description(&self) -> String {
        "AUC".to_string()
    }

    fn is_additive(&self) -> bool {
        false
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::PerObject
    }

    fn eval(
        &self,
        approx: &[Vec<f64>],
        targets: &[f32],
        weights: &[f32],
        _groups: &[GroupBounds],
        begin: usize,
        end: usize,
    ) -> Accumulator {
        let row = &approx[0];
        let mut docs: Vec<(f64, f64, bool)> = (begin..end)
            .map(|i| (row[i], weights[i] as f64, targets[i] > 0.5))
            .collect();
        docs.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut concordant = 0.0;
        let mut cum_neg = 0.0;
        let mut pos_total = 0.0;
        let mut neg_total = 0.0;

        let mut i = 0;
        while i < docs.len() {
            // 予測値が同点のブロックをまとめて処理する
            let mut j = i;
            let mut tie_pos = 0.0;
            let mut tie_neg = 0.0;
            while j < docs.len() && docs[j].0 == docs[i].0 {
                if docs[j].2 {
                    tie_pos += docs[j].1;
                } else {
                    tie_neg += docs[j].1;
                }
                j += 1;
            }
            concordant += tie_pos * cum_neg + 0.5 * tie_pos * tie_neg;
            cum_neg += tie_neg;
            pos_total += tie_pos;
            neg_total += tie_neg;
            i = j;
        }

        Accumulator {
            stats: vec![concordant, pos_total * neg_total],
        }
    }

    fn final_value(&self, acc: &Accumulator) -> f64 {
        if acc.stats[1] > 0.0 {
            acc.stats[0] / acc.stats[1]
        } else {
            0.0
        }
    }
}
