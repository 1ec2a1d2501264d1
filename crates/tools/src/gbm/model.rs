//! 決定株アンサンブルモデル
//!
//! 1 ツリー = 1 つの決定株（単一特徴量のしきい値分岐）。JSON 形式:
//!
//! ```json
//! {
//!   "output_dimension": 1,
//!   "trees": [
//!     { "feature": 0, "threshold": 0.5, "left": [-0.1], "right": [0.2] }
//!   ]
//! }
//! ```
//!
//! `left` / `right` は出力次元ごとの葉値。

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ensplot_core::{Applier, DatasetPart, EvalError, EvalResult};

/// 決定株 1 本
#[derive(Debug, Clone, Deserialize)]
pub struct Stump {
    pub feature: usize,
    pub threshold: f32,
    /// `x[feature] <= threshold` のときの葉値（次元ごと）
    pub left: Vec<f64>,
    /// `x[feature] > threshold` のときの葉値（次元ごと）
    pub right: Vec<f64>,
}

/// 決定株アンサンブル
#[derive(Debug, Deserialize)]
pub struct StumpEnsemble {
    output_dimension: usize,
    trees: Vec<Stump>,
}

impl StumpEnsemble {
    /// JSON ファイルから読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
        let model: StumpEnsemble = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse model {}", path.as_ref().display()))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.output_dimension == 0 {
            bail!("model output_dimension must be positive");
        }
        for (i, tree) in self.trees.iter().enumerate() {
            if tree.left.len() != self.output_dimension || tree.right.len() != self.output_dimension
            {
                bail!(
                    "tree {i}: leaf value dimension ({}/{}) does not match output_dimension ({})",
                    tree.left.len(),
                    tree.right.len(),
                    self.output_dimension
                );
            }
        }
        Ok(())
    }

    pub fn trees(&self) -> &[Stump] {
        &self.trees
    }
}

impl Applier for StumpEnsemble {
    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn tree_count(&self) -> u32 {
        self.trees.len() as u32
    }

    fn apply_range(
        &self,
        part: &DatasetPart,
        tree_begin: u32,
        tree_end: u32,
    ) -> EvalResult<Vec<Vec<f64>>> {
        let mut delta = vec![vec![0.0; part.doc_count()]; self.output_dimension];
        for (i, row) in part.features().iter().enumerate() {
            for tree in &self.trees[tree_begin as usize..tree_end as usize] {
                let x = row.get(tree.feature).copied().ok_or_else(|| {
                    EvalError::InvalidPart {
                        reason: format!(
                            "document {i} has {} features but the model needs feature {}",
                            row.len(),
                            tree.feature
                        ),
                    }
                })?;
                let leaf = if x <= tree.threshold {
                    &tree.left
                } else {
                    &tree.right
                };
                for (out, v) in delta.iter_mut().zip(leaf) {
                    out[i] += *v;
                }
            }
        }
        Ok(delta)
    }
}
