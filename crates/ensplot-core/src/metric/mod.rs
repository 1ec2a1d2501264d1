//! メトリクスインターフェース
//!
//! メトリクス本体の数値定義はエンジンの関心外で、trait の向こう側にある。
//! エンジンが依存するのは加法性フラグ・エラー型・評価とマージの契約のみ。
//!
//! - 加法メトリクス: チャンクごとの部分結果を [`Accumulator::merge`] で
//!   合成でき、マージは結合的・可換（チャンク処理順に依存しない）。
//! - 非加法メトリクス: 全文書の予測ベクトルを一度に要求する。

mod builtin;
mod classify;

pub use builtin::{Auc, QueryRmse, Rmse};
pub use classify::ClassifiedMetrics;

use crate::dataset::GroupBounds;

/// メトリクスの評価単位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// 文書単位
    PerObject,
    /// クエリ（グループ）単位
    Querywise,
    /// ペア単位
    Pairwise,
}

/// マージ可能な部分評価結果
///
/// 中身の意味はメトリクス実装が決める。マージは要素ごとの加算で、
/// 結合的・可換。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    pub stats: Vec<f64>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 要素ごとに加算する。長さが異なる場合は長い方に合わせる。
    pub fn merge(&mut self, other: &Accumulator) {
        if self.stats.len() < other.stats.len() {
            self.stats.resize(other.stats.len(), 0.0);
        }
        for (dst, src) in self.stats.iter_mut().zip(&other.stats) {
            *dst += *src;
        }
    }
}

/// 評価メトリクス
///
/// `eval` の `begin..end` は、PerObject なら文書範囲、Querywise / Pairwise
/// なら `groups` のグループ範囲を指す。
pub trait Metric: Send + Sync {
    /// 表示名（結果行列の行ラベル）
    fn description(&self) -> String;

    /// チャンク分割評価の部分結果をマージで合成できるか
    fn is_additive(&self) -> bool;

    /// 評価単位
    fn error_type(&self) -> ErrorType;

    /// `approx[dim][doc]` に対する部分評価
    fn eval(
        &self,
        approx: &[Vec<f64>],
        targets: &[f32],
        weights: &[f32],
        groups: &[GroupBounds],
        begin: usize,
        end: usize,
    ) -> Accumulator;

    /// アキュムレータをスカラーに確定する
    fn final_value(&self, acc: &Accumulator) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_elementwise_and_resizing() {
        let mut a = Accumulator { stats: vec![1.0, 2.0] };
        let b = Accumulator {
            stats: vec![10.0, 20.0, 30.0],
        };
        a.merge(&b);
        assert_eq!(a.stats, vec![11.0, 22.0, 30.0]);
    }

    #[test]
    fn merge_is_order_insensitive() {
        let parts = [
            Accumulator { stats: vec![1.0, 4.0] },
            Accumulator { stats: vec![2.0, 5.0] },
            Accumulator { stats: vec![3.0, 6.0] },
        ];
        let mut forward = Accumulator::new();
        for p in &parts {
            forward.merge(p);
        }
        let mut backward = Accumulator::new();
        for p in parts.iter().rev() {
            backward.merge(p);
        }
        assert_eq!(forward, backward);
    }
}
