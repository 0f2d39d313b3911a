use async_trait::async_trait;

use crate::error::Result;
use crate::models::analysis::{AnalysisRecord, ErrorRecord};

/// 分析记录仓储 trait
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// 保存一次成功的分析
    async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()>;

    /// 保存一次失败
    async fn insert_error(&self, record: &ErrorRecord) -> Result<()>;

    /// 根据 ID 获取分析记录
    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>>;

    /// 最近的分析记录，新的在前
    async fn list_analyses(&self, limit: usize) -> Result<Vec<AnalysisRecord>>;

    /// 最近的失败记录，新的在前
    async fn list_errors(&self, limit: usize) -> Result<Vec<ErrorRecord>>;
    /// 分析记录数量；健康检查每次都会调用，实现应避免遍历全部记录
    /// 分析记录数量
    async fn count(&self) -> Result<u64>;

    /// 后端名称
    fn backend(&self) -> &'static str;
}
