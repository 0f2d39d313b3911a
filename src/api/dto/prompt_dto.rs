//! 提示词 DTO

use serde::{Deserialize, Serialize};

use crate::services::prompt_store::{PromptKind, PromptSource};

/// 设置提示词请求
#[derive(Debug, Deserialize)]
pub struct SetPromptRequest {
    pub system_prompt: String,
}

/// 提示词内容
#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub kind: PromptKind,
    pub system_prompt: String,
    /// 来自文件还是默认提示词
    pub source: PromptSource,
}

/// 设置提示词响应
#[derive(Debug, Serialize)]
pub struct SetPromptResponse {
    pub message: String,
    pub version: u64,
}
