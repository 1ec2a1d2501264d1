//! チェックポイント計画
//!
//! 評価対象となるイテレーション（= ツリーインデックス）列を
//! `(first, last, step)` から構築する。最終イテレーション `last - 1` は
//! 必ず含まれる。構築後は不変。

use crate::error::{EvalError, EvalResult};

/// 評価対象イテレーションの列
///
/// 不変条件: 狭義単調増加、先頭は `first`、末尾は `last - 1`。
#[derive(Debug, Clone)]
pub struct CheckpointSchedule {
    points: Vec<u32>,
}

impl CheckpointSchedule {
    /// `{first, first+step, ...} < last` を生成し、末尾が `last - 1` で
    /// なければ追加する
    pub fn new(first: u32, last: u32, step: u32) -> EvalResult<Self> {
        if first >= last || step == 0 {
            return Err(EvalError::InvalidCheckpointRange { first, last, step });
        }
        let mut points: Vec<u32> = (first..last).step_by(step as usize).collect();
        if points.last() != Some(&(last - 1)) {
            points.push(last - 1);
        }
        Ok(Self { points })
    }

    /// モデルのツリー数で範囲をクランプして構築する
    ///
    /// - `last == 0` はツリー総数まで評価する指定として扱う
    /// - `step` が評価範囲より大きい場合は範囲幅に丸める
    pub fn for_model(first: u32, last: u32, step: u32, tree_count: u32) -> EvalResult<Self> {
        let last = if last == 0 {
            tree_count
        } else {
            last.min(tree_count)
        };
        if first >= last {
            return Err(EvalError::InvalidCheckpointRange { first, last, step });
        }
        let step = if step > last - first {
            last - first
        } else {
            step
        };
        Self::new(first, last, step)
    }

    /// チェックポイント数
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// `new` が空列を返すことはないが、慣例として提供する
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 全チェックポイント
    pub fn points(&self) -> &[u32] {
        &self.points
    }

    /// スロット番号からイテレーションを引く
    pub fn point(&self, slot: usize) -> u32 {
        self.points[slot]
    }
}
