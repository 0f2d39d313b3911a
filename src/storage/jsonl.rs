//! JSONL 文件存储后端
//!
//! `analyses.jsonl` 与 `errors.jsonl` 只追加，每行一条记录。
//! 读取时逐行解析，损坏的行跳过。记录数在打开时按行统计一次，
//! 之后随写入递增，健康检查不必重新解析文件。

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::models::analysis::{AnalysisRecord, ErrorRecord};
use crate::storage::repository::AnalysisRepository;

const ANALYSES_FILE: &str = "analyses.jsonl";
const ERRORS_FILE: &str = "errors.jsonl";

#[derive(Debug)]
pub struct JsonlRepository {
    dir: PathBuf,
    write_lock: Mutex<()>,
    analyses_count: AtomicU64,
}

impl JsonlRepository {
    /// 打开（必要时创建）数据目录
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::Storage(format!("无法创建数据目录 {}: {}", dir.display(), e))
        })?;
        let existing = count_lines(&dir.join(ANALYSES_FILE)).await?;
        debug!(
            "JSONL storage at {} ({} analyses)",
            dir.display(),
            existing
        );
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
            analyses_count: AtomicU64::new(existing),
        })
    }

    async fn append<T: Serialize>(&self, file: &str, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .await
            .map_err(|e| AppError::Storage(format!("打开 {} 失败: {}", file, e)))?;
        handle
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::Storage(format!("写入 {} 失败: {}", file, e)))?;
        handle.flush().await?;
        Ok(())
    }

    async fn read_all<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "读取 {} 失败: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(raw
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(no, line)| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping corrupt line {} in {}: {}", no + 1, file, e);
                    None
                }
            })
            .collect())
    }
}

/// 非空行数，不解析内容
async fn count_lines(path: &std::path::Path) -> Result<u64> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(raw
            .split(|b| *b == b'\n')
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .count() as u64),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(AppError::Storage(format!(
            "读取 {} 失败: {}",
            path.display(),
            e
        ))),
    }
}

#[async_trait]
impl AnalysisRepository for JsonlRepository {
    async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        self.append(ANALYSES_FILE, record).await?;
        self.analyses_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn insert_error(&self, record: &ErrorRecord) -> Result<()> {
        self.append(ERRORS_FILE, record).await
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>> {
        let records: Vec<AnalysisRecord> = self.read_all(ANALYSES_FILE).await?;
        Ok(records.into_iter().find(|r| r.id == id))
    }

    async fn list_analyses(&self, limit: usize) -> Result<Vec<AnalysisRecord>> {
        let records: Vec<AnalysisRecord> = self.read_all(ANALYSES_FILE).await?;
        Ok(records.into_iter().rev().take(limit).collect())
    }

    async fn list_errors(&self, limit: usize) -> Result<Vec<ErrorRecord>> {
        let records: Vec<ErrorRecord> = self.read_all(ERRORS_FILE).await?;
        Ok(records.into_iter().rev().take(limit).collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.analyses_count.load(Ordering::Relaxed))
    }

    fn backend(&self) -> &'static str {
        "jsonl"
    }
}
