//! 評価エンジンのエラー型
//!
//! エラーは 3 区分（[`ErrorClass`]）に分類される。
//!
//! - Configuration: 呼び出し側の指定ミス。即時 fatal、リトライ不可。
//! - Resource: スクラッチディレクトリ / スナップショットファイルへの
//!   アクセス失敗。環境起因のため自動リトライはしない。
//! - Consistency: 内部不変条件の破れ（未保存スロットの reload 等）。

use std::io;
use std::path::PathBuf;

use crate::metric::ErrorType;

/// エラーの大分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Resource,
    Consistency,
}

/// 評価エンジンのエラー
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// チェックポイント範囲の指定が不正
    #[error("invalid checkpoint range: first={first}, last={last}, step={step}")]
    InvalidCheckpointRange { first: u32, last: u32, step: u32 },

    /// 非加法メトリクスは PerObject のみサポート
    #[error("non-additive metric '{description}' has error type {error_type:?}; \
             only per-object non-additive metrics are supported")]
    NonAdditiveErrorType {
        description: String,
        error_type: ErrorType,
    },

    /// データセット part 間でベースラインの有無が食い違う
    #[error("inconsistent baseline specification between dataset parts: \
             part 0 baseline present = {first_has_baseline}, part {part} disagrees")]
    BaselineMismatch {
        part: usize,
        first_has_baseline: bool,
    },

    /// モデル出力次元が 0
    #[error("model output dimension must be positive")]
    ZeroOutputDimension,

    /// データセット part の形状が不正（長さ不一致・範囲外グループ等）
    #[error("invalid dataset part: {reason}")]
    InvalidPart { reason: String },

    /// スクラッチディレクトリの作成失敗
    #[error("failed to create scratch directory {path}: {source}")]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// スナップショットファイルの I/O 失敗
    #[error("snapshot I/O failed at {path}: {source}")]
    SnapshotIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 保存されていないスロットの reload / 二重 discard
    #[error("snapshot for checkpoint slot {slot} was never persisted or already discarded")]
    MissingSnapshot { slot: usize },

    /// スナップショットの文書数が期待値と一致しない
    #[error("snapshot for checkpoint slot {slot} holds {actual_docs} documents, \
             expected {expected_docs}")]
    SnapshotSizeMismatch {
        slot: usize,
        expected_docs: usize,
        actual_docs: usize,
    },

    /// 再開リーダーが開かれていないのに途中スロットから advance が要求された
    #[error("resume requested at checkpoint slot {slot} but no resume reader is open")]
    ResumeMissing { slot: usize },
}

impl EvalError {
    /// エラーの大分類を返す
    pub fn class(&self) -> ErrorClass {
        match self {
            EvalError::InvalidCheckpointRange { .. }
            | EvalError::NonAdditiveErrorType { .. }
            | EvalError::BaselineMismatch { .. }
            | EvalError::ZeroOutputDimension
            | EvalError::InvalidPart { .. } => ErrorClass::Configuration,
            EvalError::ScratchDir { .. } | EvalError::SnapshotIo { .. } => ErrorClass::Resource,
            EvalError::MissingSnapshot { .. }
            | EvalError::SnapshotSizeMismatch { .. }
            | EvalError::ResumeMissing { .. } => ErrorClass::Consistency,
        }
    }
}

/// 評価エンジン共通の Result
pub type EvalResult<T> = Result<T, EvalError>;
