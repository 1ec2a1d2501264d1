//! ensplot-core
//!
//! 加法アンサンブルモデルのチェックポイント列に対して、複数メトリクスの
//! スコア行列（メトリクス×イテレーション）を省メモリで計算するエンジン。
//!
//! - 連続するチェックポイント間で部分予測を再利用する（増分 advance）
//! - メトリクスを加法 / 非加法に分類し、加法はチャンクごとの部分結果の
//!   マージ、非加法はスナップショット経由の二段階評価で扱う
//! - 非加法向けの予測スナップショットはメモリ / ファイルの差し替え可能な
//!   バッキングに退避し、ウィンドウ単位で replay する
//!
//! モデル推論カーネル（[`applier::Applier`]）とメトリクス本体
//! （[`metric::Metric`]）は trait の向こう側にある外部協力者。

pub mod applier;
pub mod approx;
pub mod dataset;
pub mod error;
pub mod metric;
pub mod plot;
pub mod schedule;
pub mod snapshot;

pub use applier::Applier;
pub use approx::ApproxBuffer;
pub use dataset::{DatasetPart, GroupBounds};
pub use error::{ErrorClass, EvalError, EvalResult};
pub use metric::{Accumulator, Auc, ClassifiedMetrics, ErrorType, Metric, QueryRmse, Rmse};
pub use plot::{MetricsPlotCalcer, PlotParams};
pub use schedule::CheckpointSchedule;
pub use snapshot::{
    DEFAULT_MEMORY_BUDGET, FileSnapshotStore, MemorySnapshotStore, SnapshotConfig, SnapshotReader,
    SnapshotStore, open_store,
};
