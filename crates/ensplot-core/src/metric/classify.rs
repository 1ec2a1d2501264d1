//! メトリクス分類
//!
//! 呼び出し側の並び順を保ったまま加法 / 非加法グループに分割する。
//! グループ内インデックス → 元スロットの対応は結果行列の組み立てで使う。
//! 加法性とエラー型の分岐はここで一度だけ解決し、評価ループでは
//! 再判定しない。

use std::sync::Arc;

use super::{ErrorType, Metric};
use crate::error::{EvalError, EvalResult};

/// 加法 / 非加法に分類済みのメトリクス集合
pub struct ClassifiedMetrics {
    additive: Vec<Arc<dyn Metric>>,
    additive_slots: Vec<usize>,
    non_additive: Vec<Arc<dyn Metric>>,
    non_additive_slots: Vec<usize>,
}

impl std::fmt::Debug for ClassifiedMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifiedMetrics")
            .field("additive", &self.descriptions())
            .field("additive_slots", &self.additive_slots)
            .field("non_additive_slots", &self.non_additive_slots)
            .finish()
    }
}

impl ClassifiedMetrics {
    /// 分類する
    ///
    /// 非加法かつ Querywise / Pairwise の組み合わせは ConfigurationError。
    pub fn new(metrics: &[Arc<dyn Metric>]) -> EvalResult<Self> {
        let mut additive = Vec::new();
        let mut additive_slots = Vec::new();
        let mut non_additive = Vec::new();
        let mut non_additive_slots = Vec::new();

        for (slot, metric) in metrics.iter().enumerate() {
            if metric.is_additive() {
                additive.push(Arc::clone(metric));
                additive_slots.push(slot);
            } else {
                if metric.error_type() != ErrorType::PerObject {
                    return Err(EvalError::NonAdditiveErrorType {
                        description: metric.description(),
                        error_type: metric.error_type(),
                    });
                }
                non_additive.push(Arc::clone(metric));
                non_additive_slots.push(slot);
            }
        }

        Ok(Self {
            additive,
            additive_slots,
            non_additive,
            non_additive_slots,
        })
    }

    pub fn additive(&self) -> &[Arc<dyn Metric>] {
        &self.additive
    }

    pub fn additive_slots(&self) -> &[usize] {
        &self.additive_slots
    }

    pub fn non_additive(&self) -> &[Arc<dyn Metric>] {
        &self.non_additive
    }

    pub fn non_additive_slots(&self) -> &[usize] {
        &self.non_additive_slots
    }

    /// 元のメトリクス総数
    pub fn total(&self) -> usize {
        self.additive.len() + self.non_additive.len()
    }

    pub fn has_non_additive(&self) -> bool {
        !self.non_additive.is_empty()
    }

    /// 元スロット順の表示名
    pub fn descriptions(&self) -> Vec<String> {
        let mut out = vec![String::new(); self.total()];
        for (i, &slot) in self.additive_slots.iter().enumerate() {
            out[slot] = self.additive[i].description();
        }
        for (i, &slot) in self.non_additive_slots.iter().enumerate() {
            out[slot] = self.non_additive[i].description();
        }
        out
    }
}
