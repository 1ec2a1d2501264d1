//! 勾配ブースティング風のデモ用モデル / データセット
//!
//! - [`model::StumpEnsemble`]: JSON で与える決定株アンサンブル
//!   （[`ensplot_core::Applier`] 実装）
//! - [`dataset::load_dataset_part`]: JSONL の 1 ファイルを
//!   [`ensplot_core::DatasetPart`] に読み込む

pub mod dataset;
pub mod model;

pub use dataset::load_dataset_part;
pub use model::StumpEnsemble;
