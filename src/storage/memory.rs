//! 内存存储后端
//!
//! 进程退出即丢失，适合开发与测试。分析记录与错误记录各自保留最近
//! `capacity` 条，超出时淘汰最旧的记录。

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::VecDeque;

use crate::error::Result;
use crate::models::analysis::{AnalysisRecord, ErrorRecord};
use crate::storage::repository::AnalysisRepository;

/// 默认保留条数
pub const DEFAULT_MEMORY_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct MemoryRepository {
    analyses: RwLock<VecDeque<AnalysisRecord>>,
    errors: RwLock<VecDeque<ErrorRecord>>,
    capacity: usize,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 容量至少为 1
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            analyses: RwLock::new(VecDeque::new()),
            errors: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
    while queue.len() >= capacity {
        queue.pop_front();
    }
    queue.push_back(item);
}

#[async_trait]
impl AnalysisRepository for MemoryRepository {
    async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        push_bounded(&mut self.analyses.write(), record.clone(), self.capacity);
        Ok(())
    }

    async fn insert_error(&self, record: &ErrorRecord) -> Result<()> {
        push_bounded(&mut self.errors.write(), record.clone(), self.capacity);
        Ok(())
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>> {
        Ok(self.analyses.read().iter().find(|r| r.id == id).cloned())
    }

    async fn list_analyses(&self, limit: usize) -> Result<Vec<AnalysisRecord>> {
        Ok(self.analyses.read().iter().rev().take(limit).cloned().collect())
    }

    async fn list_errors(&self, limit: usize) -> Result<Vec<ErrorRecord>> {
        Ok(self.errors.read().iter().rev().take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.analyses.read().len() as u64)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::AnalysisMode;

    #[tokio::test]
    async fn test_insert_get_list() {
        let repo = MemoryRepository::new();
        let first = AnalysisRecord::new(AnalysisMode::Full);
        let second = AnalysisRecord::new(AnalysisMode::Quick);
        repo.insert_analysis(&first).await.unwrap();
        repo.insert_analysis(&second).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(
            repo.get_analysis(&first.id).await.unwrap().unwrap().mode,
            AnalysisMode::Full
        );
        assert!(repo.get_analysis("missing").await.unwrap().is_none());

        let recent = repo.list_analyses(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, second.id);
    }

    #[tokio::test]
    async fn test_errors_newest_first() {
        let repo = MemoryRepository::new();
        repo.insert_error(&ErrorRecord::new("probe", "boom", None))
            .await
            .unwrap();
        repo.insert_error(&ErrorRecord::new("extract", "bang", Some("R-1".into())))
            .await
            .unwrap();

        let errors = repo.list_errors(10).await.unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].stage, "extract");
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oldest_records_are_evicted() {
        let repo = MemoryRepository::with_capacity(2);
        let records: Vec<AnalysisRecord> = (0..3)
            .map(|_| AnalysisRecord::new(AnalysisMode::Quick))
            .collect();
        for record in &records {
            repo.insert_analysis(record).await.unwrap();
        }
        for stage in ["probe", "extract", "quick"] {
            repo.insert_error(&ErrorRecord::new(stage, "boom", None))
                .await
                .unwrap();
        }

        assert_eq!(repo.count().await.unwrap(), 2);
        assert!(repo.get_analysis(&records[0].id).await.unwrap().is_none());
        let recent = repo.list_analyses(10).await.unwrap();
        assert_eq!(recent[0].id, records[2].id);
        assert_eq!(recent[1].id, records[1].id);

        let errors = repo.list_errors(10).await.unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].stage, "extract");
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        assert_eq!(MemoryRepository::with_capacity(0).capacity(), 1);
        assert_eq!(MemoryRepository::new().capacity(), DEFAULT_MEMORY_CAPACITY);
    }
}
