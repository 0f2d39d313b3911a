//! OpenAI 兼容的多模态对话客户端
//!
//! `ChatModel` 是分析流程与模型服务之间的接缝，生产环境使用 `OpenAiClient`，
//! 测试中可替换为桩实现。

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::config::OpenAiConfig;
use crate::error::{AppError, Result};
use crate::models::analysis::Usage;

/// 消息内容片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// 消息内容：纯文本或多段内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// 对话消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// 文本指令 + 图片
    pub fn user_with_image(text: Option<&str>, image_data_url: String) -> Self {
        let mut parts = Vec::with_capacity(2);
        if let Some(text) = text {
            parts.push(ContentPart::Text {
                text: text.to_string(),
            });
        }
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image_data_url,
            },
        });
        Self {
            role: "user".into(),
            content: MessageContent::Parts(parts),
        }
    }

    /// 消息中的文本（图片片段忽略）
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// 对话请求
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// 部分模型不支持 temperature，None 时不发送
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// 要求模型返回 JSON 对象
    pub json_mode: bool,
}

impl ChatRequest {
    /// 确定性 JSON 输出请求
    pub fn json(model: &str, messages: Vec<ChatMessage>, max_tokens: Option<u32>) -> Self {
        Self {
            model: model.to_string(),
            messages,
            temperature: Some(0.0),
            max_tokens,
            json_mode: true,
        }
    }

    fn to_body(&self) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.messages,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = self.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if self.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

/// 模型返回
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Usage,
}

/// 对话模型接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion>;
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 兼容 HTTP 客户端
pub struct OpenAiClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion> {
        let url = format!("{}/chat/completions", self.base_url);
        let started = Instant::now();

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request.to_body())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(
                "Chat completion failed: model={} status={}",
                request.model, status
            );
            return Err(AppError::Upstream(format!(
                "status {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let body: CompletionResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let usage = body.usage.unwrap_or_default();

        debug!(
            "Chat completion: model={} tokens={} elapsed_ms={}",
            request.model,
            usage.total_tokens,
            started.elapsed().as_millis()
        );

        Ok(ChatCompletion { content, usage })
    }
}
