//! 票据分析 DTO
//!
//! 定义分析接口的请求和响应数据结构。

use serde::{Deserialize, Serialize};

use crate::models::analysis::{Usage, ValidationReport};
use crate::models::receipt::ExtractedData;
use crate::services::analyzer::{AnalysisOutcome, ProfileSummary, QuickOutcome};
use crate::services::qr::ZatcaInvoice;

/// 上传分析的查询参数
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeQuery {
    /// 调用方的业务单号
    pub reference: Option<String>,
}

/// base64 分析请求
#[derive(Debug, Deserialize)]
pub struct AnalyzeBase64Request {
    /// base64 编码的票据图片，可带 `data:image/...;base64,` 前缀
    pub image_base64: String,
    #[serde(default)]
    pub reference: Option<String>,
}

/// 完整分析响应
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub id: String,
    pub data: ExtractedData,
    pub validation: ValidationReport,
    pub reason: String,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<ZatcaInvoice>,
}

impl From<AnalysisOutcome> for AnalyzeResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        Self {
            id: outcome.id,
            data: outcome.data,
            validation: outcome.validation,
            reason: outcome.reason,
            usage: outcome.usage,
            profile: outcome.profile,
            qr: outcome.qr,
        }
    }
}

/// 快速分析响应
#[derive(Debug, Serialize)]
pub struct QuickAnalyzeResponse {
    pub id: String,
    pub data: ExtractedData,
}

impl From<QuickOutcome> for QuickAnalyzeResponse {
    fn from(outcome: QuickOutcome) -> Self {
        Self {
            id: outcome.id,
            data: outcome.data,
        }
    }
}
