//! 予測スナップショットストア
//!
//! 非加法メトリクスの二段階評価（produce → replay）のために、
//! チェックポイントごとの予測行列をスロット単位で保管する。
//!
//! バッキングは差し替え可能で、ウィンドウ全体が収まるならメモリ、
//! 収まらないならファイル（f64 LE の文書メジャー形式）を
//! [`open_store`] のサイズヒューリスティックで選ぶ。
//!
//! ファイル形式: 文書ごとに全次元の f64 を little-endian で並べる。
//! 複数 part を feed した場合は feed 順に追記される。
//!
//! 契約: 各スロットは single-writer / single-reader。生産中は追記のみ、
//! 消費は read-once-then-delete。未保存スロットの reload や discard 後の
//! アクセスは Consistency エラー。

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::approx::ApproxBuffer;
use crate::error::{EvalError, EvalResult};

/// スナップショットの逐次リーダー
///
/// 再開シード用。1 回の `read_block` で渡されたバッファの文書数ぶんを
/// 読み進める。part を feed した順と同じ順で呼ぶこと。
pub trait SnapshotReader {
    fn read_block(&mut self, out: &mut ApproxBuffer) -> EvalResult<()>;
}

/// スロット単位のスナップショット保管
pub trait SnapshotStore {
    /// 行列を文書メジャーで追記する
    fn persist(&mut self, slot: usize, rows: &[Vec<f64>]) -> EvalResult<()>;

    /// 行列全体を読み戻す（ロスレス）
    fn reload(&mut self, slot: usize, dim: usize, doc_count: usize) -> EvalResult<Vec<Vec<f64>>>;

    /// 次ウィンドウの再開シード用リーダーを開く
    fn resume_reader(&mut self, slot: usize) -> EvalResult<Box<dyn SnapshotReader>>;

    /// スロットを破棄する
    fn discard(&mut self, slot: usize) -> EvalResult<()>;
}

/// ストア設定
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    dir: PathBuf,
    memory_budget_bytes: u64,
}

/// メモリバッキングを選ぶ既定の上限（256 MiB）
pub const DEFAULT_MEMORY_BUDGET: u64 = 256 << 20;

impl SnapshotConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET,
        }
    }

    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// サイズヒューリスティックでバッキングを選んでストアを開く
///
/// `dim × doc_count × slot_count × 8` バイトが予算内ならメモリ、
/// 超えるならファイル。doc_count はウィンドウ開始時点の見積もりで、
/// 後続 part の追記で多少超えても構わない（予算は目安）。
pub fn open_store(
    config: &SnapshotConfig,
    dim: usize,
    doc_count: usize,
    slot_count: usize,
) -> Box<dyn SnapshotStore> {
    let bytes = (dim as u64) * (doc_count as u64) * (slot_count as u64) * 8;
    if bytes <= config.memory_budget_bytes {
        log::debug!("snapshot store: memory backend ({bytes} bytes for {slot_count} slots)");
        Box::new(MemorySnapshotStore::new())
    } else {
        log::debug!(
            "snapshot store: file backend at {} ({bytes} bytes for {slot_count} slots)",
            config.dir.display()
        );
        Box::new(FileSnapshotStore::new(config.dir.clone()))
    }
}

// ---------------------------------------------------------------------------
// ファイルバッキング
// ---------------------------------------------------------------------------

/// ファイルバッキングのストア
///
/// スクラッチディレクトリは初回 persist 時に作成し、この実行が作成した
/// 場合のみ drop 時に（空なら）削除する。ファイル名は実行ごとの乱数タグ
/// 付きで衝突を避ける。
pub struct FileSnapshotStore {
    dir: PathBuf,
    created_dir: bool,
    run_tag: String,
    files: Vec<Option<PathBuf>>,
}

impl FileSnapshotStore {
    pub fn new(dir: PathBuf) -> Self {
        let run_tag = format!("{:016x}", rand::rng().random::<u64>());
        Self {
            dir,
            created_dir: false,
            run_tag,
            files: Vec::new(),
        }
    }

    /// persist 用: スロットのパスを（必要なら作って）返す
    fn path_for_write(&mut self, slot: usize) -> EvalResult<PathBuf> {
        if self.files.len() <= slot {
            self.files.resize(slot + 1, None);
        }
        if self.files[slot].is_none() {
            if !self.dir.exists() {
                fs::create_dir_all(&self.dir).map_err(|e| EvalError::ScratchDir {
                    path: self.dir.clone(),
                    source: e,
                })?;
                self.created_dir = true;
            }
            let path = self.dir.join(format!("{}_approx_{slot}.tmp", self.run_tag));
            if path.exists() {
                log::info!("path already exists, overwriting: {}", path.display());
                fs::remove_file(&path).map_err(|e| EvalError::SnapshotIo {
                    path: path.clone(),
                    source: e,
                })?;
            }
            self.files[slot] = Some(path);
        }
        // 直前で Some にしているので到達可能
        Ok(self.files[slot].clone().unwrap_or_default())
    }

    /// reload / resume / discard 用: 保存済みスロットのパスを返す
    fn path_for_read(&self, slot: usize) -> EvalResult<&PathBuf> {
        self.files
            .get(slot)
            .and_then(|p| p.as_ref())
            .ok_or(EvalError::MissingSnapshot { slot })
    }

    fn open_for_read(&self, slot: usize) -> EvalResult<(PathBuf, File)> {
        let path = self.path_for_read(slot)?.clone();
        match File::open(&path) {
            Ok(f) => Ok((path, f)),
            // 外部から消された = 順序違反の discard とみなす
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EvalError::MissingSnapshot { slot })
            }
            Err(e) => Err(EvalError::SnapshotIo { path, source: e }),
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn persist(&mut self, slot: usize, rows: &[Vec<f64>]) -> EvalResult<()> {
        let path = self.path_for_write(slot)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EvalError::SnapshotIo {
                path: path.clone(),
                source: e,
            })?;
        let mut out = BufWriter::new(file);
        let doc_count = rows.first().map_or(0, |row| row.len());
        for i in 0..doc_count {
            for row in rows {
                out.write_all(&row[i].to_le_bytes())
                    .map_err(|e| EvalError::SnapshotIo {
                        path: path.clone(),
                        source: e,
                    })?;
            }
        }
        out.flush().map_err(|e| EvalError::SnapshotIo {
            path: path.clone(),
            source: e,
        })
    }

    fn reload(&mut self, slot: usize, dim: usize, doc_count: usize) -> EvalResult<Vec<Vec<f64>>> {
        let (path, file) = self.open_for_read(slot)?;
        let expected_len = (dim * doc_count * 8) as u64;
        let actual_len = file
            .metadata()
            .map_err(|e| EvalError::SnapshotIo {
                path: path.clone(),
                source: e,
            })?
            .len();
        if actual_len != expected_len {
            return Err(EvalError::SnapshotSizeMismatch {
                slot,
                expected_docs: doc_count,
                actual_docs: (actual_len / (dim as u64 * 8)) as usize,
            });
        }

        let mut reader = BufReader::new(file);
        let mut rows = vec![vec![0.0f64; doc_count]; dim];
        let mut buf = [0u8; 8];
        for i in 0..doc_count {
            for row in rows.iter_mut() {
                reader
                    .read_exact(&mut buf)
                    .map_err(|e| EvalError::SnapshotIo {
                        path: path.clone(),
                        source: e,
                    })?;
                row[i] = f64::from_le_bytes(buf);
            }
        }
        Ok(rows)
    }

    fn resume_reader(&mut self, slot: usize) -> EvalResult<Box<dyn SnapshotReader>> {
        let (path, file) = self.open_for_read(slot)?;
        Ok(Box::new(FileResumeReader {
            slot,
            path,
            reader: BufReader::new(file),
            docs_read: 0,
        }))
    }

    fn discard(&mut self, slot: usize) -> EvalResult<()> {
        let path = self.path_for_read(slot)?.clone();
        match fs::remove_file(&path) {
            Ok(()) => {
                self.files[slot] = None;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EvalError::MissingSnapshot { slot })
            }
            Err(e) => Err(EvalError::SnapshotIo { path, source: e }),
        }
    }
}

impl Drop for FileSnapshotStore {
    fn drop(&mut self) {
        // この実行が作ったディレクトリのみ、空の場合に限って片付ける
        if self.created_dir {
            let _ = fs::remove_dir(&self.dir);
        }
    }
}

struct FileResumeReader {
    slot: usize,
    path: PathBuf,
    reader: BufReader<File>,
    docs_read: usize,
}

impl SnapshotReader for FileResumeReader {
    fn read_block(&mut self, out: &mut ApproxBuffer) -> EvalResult<()> {
        let dim = out.dim();
        let doc_count = out.doc_count();
        let rows = out.rows_mut();
        let mut buf = [0u8; 8];
        for i in 0..doc_count {
            for row in rows.iter_mut().take(dim) {
                match self.reader.read_exact(&mut buf) {
                    Ok(()) => row[i] = f64::from_le_bytes(buf),
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        return Err(EvalError::SnapshotSizeMismatch {
                            slot: self.slot,
                            expected_docs: self.docs_read + doc_count,
                            actual_docs: self.docs_read + i,
                        });
                    }
                    Err(e) => {
                        return Err(EvalError::SnapshotIo {
                            path: self.path.clone(),
                            source: e,
                        });
                    }
                }
            }
        }
        self.docs_read += doc_count;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// メモリバッキング
// ---------------------------------------------------------------------------

/// メモリバッキングのストア（小規模データセット向け）
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slots: Vec<Option<Vec<Vec<f64>>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn persist(&mut self, slot: usize, rows: &[Vec<f64>]) -> EvalResult<()> {
        if self.slots.len() <= slot {
            self.slots.resize(slot + 1, None);
        }
        match &mut self.slots[slot] {
            Some(stored) => {
                // 追記: 後続 part の列を feed 順に連結する
                for (dst, src) in stored.iter_mut().zip(rows) {
                    dst.extend_from_slice(src);
                }
            }
            empty => *empty = Some(rows.to_vec()),
        }
        Ok(())
    }

    fn reload(&mut self, slot: usize, _dim: usize, doc_count: usize) -> EvalResult<Vec<Vec<f64>>> {
        let stored = self
            .slots
            .get(slot)
            .and_then(|s| s.as_ref())
            .ok_or(EvalError::MissingSnapshot { slot })?;
        let actual_docs = stored.first().map_or(0, |row| row.len());
        if actual_docs != doc_count {
            return Err(EvalError::SnapshotSizeMismatch {
                slot,
                expected_docs: doc_count,
                actual_docs,
            });
        }
        Ok(stored.clone())
    }

    fn resume_reader(&mut self, slot: usize) -> EvalResult<Box<dyn SnapshotReader>> {
        let stored = self
            .slots
            .get(slot)
            .and_then(|s| s.as_ref())
            .ok_or(EvalError::MissingSnapshot { slot })?;
        Ok(Box::new(MemoryResumeReader {
            slot,
            data: stored.clone(),
            cursor: 0,
        }))
    }

    fn discard(&mut self, slot: usize) -> EvalResult<()> {
        match self.slots.get_mut(slot) {
            Some(stored @ Some(_)) => {
                *stored = None;
                Ok(())
            }
            _ => Err(EvalError::MissingSnapshot { slot }),
        }
    }
}

struct MemoryResumeReader {
    slot: usize,
    data: Vec<Vec<f64>>,
    cursor: usize,
}

impl SnapshotReader for MemoryResumeReader {
    fn read_block(&mut self, out: &mut ApproxBuffer) -> EvalResult<()> {
        let doc_count = out.doc_count();
        let available = self.data.first().map_or(0, |row| row.len());
        if self.cursor + doc_count > available {
            return Err(EvalError::SnapshotSizeMismatch {
                slot: self.slot,
                expected_docs: self.cursor + doc_count,
                actual_docs: available,
            });
        }
        for (dst, src) in out.rows_mut().iter_mut().zip(&self.data) {
            dst.copy_from_slice(&src[self.cursor..self.cursor + doc_count]);
        }
        self.cursor += doc_count;
        Ok(())
    }
}
