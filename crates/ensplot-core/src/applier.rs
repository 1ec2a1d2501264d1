//! モデル適用カーネルとの境界
//!
//! アンサンブルの推論本体はエンジンの外にある。エンジンが要求するのは
//! 「ツリー範囲 `[begin, end)` を 1 part に適用した生スコア増分」だけで、
//! これを前回チェックポイントとの差分として積み上げる。

use crate::dataset::DatasetPart;
use crate::error::EvalResult;

/// アンサンブル適用カーネル
pub trait Applier: Send + Sync {
    /// モデル出力次元
    fn output_dimension(&self) -> usize;

    /// アンサンブルの総ツリー数
    fn tree_count(&self) -> u32;

    /// ツリー範囲 `[tree_begin, tree_end)` の生スコア増分を返す
    ///
    /// 戻り値の形状は `[output_dimension][part.doc_count()]`。
    fn apply_range(
        &self,
        part: &DatasetPart,
        tree_begin: u32,
        tree_end: u32,
    ) -> EvalResult<Vec<Vec<f64>>>;
}
