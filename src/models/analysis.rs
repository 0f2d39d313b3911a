//! 分析记录数据模型
//!
//! 包括模型 token 用量、服务端校验结果，以及持久化的分析记录与错误记录。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::services::qr::ZatcaInvoice;

/// 模型 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
    }

    /// 合并两次调用的用量；任一方为空时直接取另一方
    pub fn merge(self, other: Usage) -> Usage {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Usage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

impl std::iter::Sum for Usage {
    fn sum<I: Iterator<Item = Usage>>(iter: I) -> Self {
        iter.fold(Usage::default(), Usage::merge)
    }
}

/// 服务端校验结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// 欺诈分 (0-100)
    #[serde(rename = "fraudScore")]
    pub fraud_score: u8,
    /// 置信分 (0-100)
    #[serde(rename = "confidenceScore")]
    pub confidence_score: u8,
    /// 各项检查结果
    pub checks: Map<String, Value>,
    /// 问题列表
    #[serde(default)]
    pub issues: Vec<String>,
}

impl ValidationReport {
    /// 响应中的简要说明
    pub fn summary(&self) -> &'static str {
        if self.issues.is_empty() {
            "Checks passed."
        } else {
            "See issues list."
        }
    }
}

/// 分析模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// 探测 + 抽取两次调用
    Full,
    /// 单次调用
    Quick,
}

/// 探测调用得到的商户与地址
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub merchant: String,
    pub address: String,
}

/// 分析记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub mode: AnalysisMode,
    pub reference: Option<String>,
    pub filename: Option<String>,
    pub probe: Option<ProbeResult>,
    pub profile_matched: bool,
    pub profile_name: Option<String>,
    /// 模型原始输出
    pub extracted_raw: String,
    /// 规整后的抽取结果
    pub extracted_parsed: Value,
    pub validation: Option<ValidationReport>,
    pub usage: Usage,
    pub qr: Option<ZatcaInvoice>,
}

impl AnalysisRecord {
    pub fn new(mode: AnalysisMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            mode,
            reference: None,
            filename: None,
            probe: None,
            profile_matched: false,
            profile_name: None,
            extracted_raw: String::new(),
            extracted_parsed: Value::Null,
            validation: None,
            usage: Usage::default(),
            qr: None,
        }
    }
}

/// 失败阶段记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// 失败阶段：probe / extract / quick / reason
    pub stage: String,
    pub error: String,
    pub reference: Option<String>,
}

impl ErrorRecord {
    pub fn new(stage: &str, error: impl ToString, reference: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            stage: stage.to_string(),
            error: error.to_string(),
            reference,
        }
    }
}
