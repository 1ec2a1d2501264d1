//! データセット表現
//!
//! 評価対象データの 1 チャンク（part）。モデル適用用の特徴量行列は
//! エンジン側からは不透明で、[`crate::applier::Applier`] 実装だけが読む。

use crate::error::{EvalError, EvalResult};

/// グループ（クエリ）の文書範囲 `[begin, end)`
///
/// Querywise / Pairwise メトリクスの評価単位。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupBounds {
    pub begin: usize,
    pub end: usize,
}

/// データセットの 1 part
#[derive(Debug, Clone)]
pub struct DatasetPart {
    /// 文書ごとの特徴量行（applier 専用、空も可）
    features: Vec<Vec<f32>>,
    targets: Vec<f32>,
    weights: Vec<f32>,
    groups: Vec<GroupBounds>,
    /// 次元ごとのベースライン予測 `[dim][doc]`
    baseline: Option<Vec<Vec<f64>>>,
}

impl DatasetPart {
    /// part を構築する
    ///
    /// `weights` を省略した場合は全文書 1.0。長さ不一致・範囲外グループは
    /// ConfigurationError。
    pub fn new(
        features: Vec<Vec<f32>>,
        targets: Vec<f32>,
        weights: Option<Vec<f32>>,
        groups: Vec<GroupBounds>,
        baseline: Option<Vec<Vec<f64>>>,
    ) -> EvalResult<Self> {
        let doc_count = targets.len();
        if !features.is_empty() && features.len() != doc_count {
            return Err(EvalError::InvalidPart {
                reason: format!(
                    "feature rows ({}) do not match target count ({doc_count})",
                    features.len()
                ),
            });
        }
        let weights = match weights {
            Some(w) => {
                if w.len() != doc_count {
                    return Err(EvalError::InvalidPart {
                        reason: format!(
                            "weight count ({}) does not match target count ({doc_count})",
                            w.len()
                        ),
                    });
                }
                w
            }
            None => vec![1.0; doc_count],
        };
        for (i, g) in groups.iter().enumerate() {
            if g.begin >= g.end || g.end > doc_count {
                return Err(EvalError::InvalidPart {
                    reason: format!(
                        "group {i} [{}, {}) out of range for {doc_count} documents",
                        g.begin, g.end
                    ),
                });
            }
        }
        if let Some(rows) = &baseline {
            if let Some(row) = rows.iter().find(|row| row.len() != doc_count) {
                return Err(EvalError::InvalidPart {
                    reason: format!(
                        "baseline row length ({}) does not match document count ({doc_count})",
                        row.len()
                    ),
                });
            }
        }
        Ok(Self {
            features,
            targets,
            weights,
            groups,
            baseline,
        })
    }

    /// 文書数
    pub fn doc_count(&self) -> usize {
        self.targets.len()
    }

    pub fn features(&self) -> &[Vec<f32>] {
        &self.features
    }

    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn groups(&self) -> &[GroupBounds] {
        &self.groups
    }

    pub fn baseline(&self) -> Option<&[Vec<f64>]> {
        self.baseline.as_deref()
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }
}

/// 全 part の文書数合計
pub fn total_doc_count(parts: &[&DatasetPart]) -> usize {
    parts.iter().map(|p| p.doc_count()).sum()
}

/// 全 part のターゲットを feed 順に連結する
pub fn concat_targets(parts: &[&DatasetPart]) -> Vec<f32> {
    let mut out = Vec::with_capacity(total_doc_count(parts));
    for part in parts {
        out.extend_from_slice(part.targets());
    }
    out
}

/// 全 part の重みを feed 順に連結する
pub fn concat_weights(parts: &[&DatasetPart]) -> Vec<f32> {
    let mut out = Vec::with_capacity(total_doc_count(parts));
    for part in parts {
        out.extend_from_slice(part.weights());
    }
    out
}

/// 各 part の開始文書インデックス
pub fn start_doc_indices(parts: &[&DatasetPart]) -> Vec<usize> {
    let mut out = Vec::with_capacity(parts.len());
    let mut start = 0;
    for part in parts {
        out.push(start);
        start += part.doc_count();
    }
    out
}
