//! 分析记录 DTO
//!
//! 定义记录查询与场所档案重载的数据结构。

use serde::{Deserialize, Serialize};

use crate::models::analysis::AnalysisRecord;

/// 默认返回条数
pub const DEFAULT_LIST_LIMIT: usize = 20;
/// 单次最多返回条数
pub const MAX_LIST_LIMIT: usize = 200;

/// 记录列表查询参数
#[derive(Debug, Default, Deserialize)]
pub struct ListAnalysesParams {
    pub limit: Option<usize>,
}

impl ListAnalysesParams {
    /// 规整到 1..=200，缺省 20
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// 记录列表响应
#[derive(Debug, Serialize)]
pub struct AnalysisListResponse {
    pub items: Vec<AnalysisRecord>,
    pub limit: usize,
    /// 记录总数
    pub total: u64,
}

/// 场所档案重载响应
#[derive(Debug, Serialize)]
pub struct VenueReloadResponse {
    pub profiles: usize,
}
