//! 存储工厂模块
//!
//! 根据配置创建相应的存储实例。

use std::sync::Arc;
use tracing::info;

use crate::config::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::storage::jsonl::JsonlRepository;
use crate::storage::memory::MemoryRepository;
use crate::storage::repository::AnalysisRepository;

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Jsonl,
}

impl std::str::FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "jsonl" | "file" => Ok(StorageBackend::Jsonl),
            other => Err(AppError::Config(format!("未知的存储后端: {}", other))),
        }
    }
}

/// 存储工厂
pub struct StorageFactory;

impl StorageFactory {
    /// 根据配置创建存储实例
    pub async fn create(config: &StorageConfig) -> Result<Arc<dyn AnalysisRepository>> {
        let backend: StorageBackend = config.backend.parse()?;
        let repository: Arc<dyn AnalysisRepository> = match backend {
            StorageBackend::Memory => {
                Arc::new(MemoryRepository::with_capacity(config.memory_capacity))
            }
            StorageBackend::Jsonl => Arc::new(JsonlRepository::open(&config.data_dir).await?),
        };
        info!("Analysis storage backend: {}", repository.backend());
        Ok(repository)
    }
}
