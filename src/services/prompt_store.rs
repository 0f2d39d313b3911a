//! 基于文件的提示词存储
//!
//! 主提示词（PROMPT_PATH）用于抽取调用，快速提示词（QUICK_PROMPT_PATH）用于单次调用分析。
//! 文件缺失或为空时回退到默认提示词。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::config::DataConfig;
use crate::error::{AppError, Result};

/// 提示词种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    Active,
    Quick,
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptKind::Active => write!(f, "active"),
            PromptKind::Quick => write!(f, "quick"),
        }
    }
}

/// 提示词来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptSource {
    File,
    Fallback,
}

/// 文件提示词存储
#[derive(Debug)]
pub struct PromptStore {
    active_path: PathBuf,
    quick_path: PathBuf,
    fallback: String,
    version: AtomicU64,
    write_lock: Mutex<()>,
}

impl PromptStore {
    pub fn new(active_path: PathBuf, quick_path: PathBuf, fallback: String) -> Self {
        Self {
            active_path,
            quick_path,
            fallback,
            version: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(
            config.prompt_path.clone(),
            config.quick_prompt_path.clone(),
            config.default_system_prompt.clone(),
        )
    }

    pub fn path(&self, kind: PromptKind) -> &Path {
        match kind {
            PromptKind::Active => &self.active_path,
            PromptKind::Quick => &self.quick_path,
        }
    }

    /// 读取提示词，失败时回退
    pub async fn get(&self, kind: PromptKind) -> String {
        match self.read_file(kind).await {
            Some(text) => text,
            None => self.fallback.clone(),
        }
    }

    /// 当前提示词来源
    pub async fn source(&self, kind: PromptKind) -> PromptSource {
        if self.read_file(kind).await.is_some() {
            PromptSource::File
        } else {
            PromptSource::Fallback
        }
    }

    /// 写入提示词，返回本进程内的版本号
    pub async fn set(&self, kind: PromptKind, text: &str) -> Result<u64> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("system_prompt 不能为空".into()));
        }

        let path = self.path(kind);
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, format!("{}\n", text.trim_end())).await?;

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Updated {} prompt at {} (version {})",
            kind,
            path.display(),
            version
        );
        Ok(version)
    }

    async fn read_file(&self, kind: PromptKind) -> Option<String> {
        let path = self.path(kind);
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    debug!("{} prompt file {} is empty", kind, path.display());
                    None
                } else {
                    Some(text.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read {} prompt {}: {}", kind, path.display(), e);
                None
            }
        }
    }
}
