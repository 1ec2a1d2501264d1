//! ensplot の周辺ツール
//!
//! エンジン本体（ensplot-core）の外部協力者にあたる実装を集める:
//! スタンプアンサンブルの applier と JSONL データセットローダ。

pub mod gbm;
