//! 近似（予測）バッファ
//!
//! チェックポイントごとに applier の増分を加算して進める
//! `[dim][doc]` の実行中予測行列。所有者は常に 1 フェーズのみ:
//! advance 中はこのバッファ、永続化後はスナップショットストア、
//! 非加法評価中は一時的な再読込バッファが持つ。

use rayon::prelude::*;

use crate::dataset::DatasetPart;
use crate::error::{EvalError, EvalResult};

/// 実行中の予測行列
#[derive(Debug)]
pub struct ApproxBuffer {
    values: Vec<Vec<f64>>,
}

impl ApproxBuffer {
    /// part 列からバッファを初期化する
    ///
    /// `use_baseline` が真で part がベースラインを持つ場合はそれで
    /// シードし、持たない場合はゼロ初期化する。part 間でベースラインの
    /// 有無が食い違う場合は ConfigurationError。ツリー 0 以外からの
    /// 再開時はベースラインを使わない（スナップショットが既に含む）。
    pub fn for_parts(
        dim: usize,
        parts: &[&DatasetPart],
        use_baseline: bool,
    ) -> EvalResult<Self> {
        if dim == 0 {
            return Err(EvalError::ZeroOutputDimension);
        }
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); dim];
        if parts.is_empty() {
            return Ok(Self { values });
        }

        let has_baseline = use_baseline && parts[0].has_baseline();
        if use_baseline {
            for (idx, part) in parts.iter().enumerate().skip(1) {
                if part.has_baseline() != has_baseline {
                    return Err(EvalError::BaselineMismatch {
                        part: idx,
                        first_has_baseline: has_baseline,
                    });
                }
            }
        }

        let doc_count: usize = parts.iter().map(|p| p.doc_count()).sum();
        for (d, row) in values.iter_mut().enumerate() {
            if has_baseline {
                row.reserve(doc_count);
                for part in parts {
                    match part.baseline().and_then(|b| b.get(d)) {
                        Some(base_row) => row.extend_from_slice(base_row),
                        // ベースライン次元数がモデル出力次元に満たない part
                        None => {
                            return Err(EvalError::InvalidPart {
                                reason: format!(
                                    "baseline is missing output dimension {d}"
                                ),
                            });
                        }
                    }
                }
            } else {
                row.resize(doc_count, 0.0);
            }
        }
        Ok(Self { values })
    }

    /// 出力次元数
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// 文書数
    pub fn doc_count(&self) -> usize {
        self.values.first().map_or(0, |row| row.len())
    }

    /// 予測行列への参照
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// スナップショット再読込用の可変参照
    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<f64>] {
        &mut self.values
    }

    /// 増分 `delta[dim][n]` を `start_doc` から要素ごとに加算する
    ///
    /// 文書軸で並列化する。文書ごとの加算は独立なので join 以外の
    /// 同期は不要。増分の適用順そのものは呼び出し側が保証する。
    pub fn append(&mut self, delta: &[Vec<f64>], start_doc: usize) {
        for (dst, src) in self.values.iter_mut().zip(delta) {
            dst[start_doc..start_doc + src.len()]
                .par_iter_mut()
                .zip(src.par_iter())
                .for_each(|(d, s)| *d += *s);
        }
    }

    /// 行列の所有権ごと取り出す
    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.values
    }
}
