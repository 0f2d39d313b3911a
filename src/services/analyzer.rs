//! 票据分析流程
//!
//! 完整分析：图片压缩 → 二维码 → 探测调用（商户/地址）→ 场所档案匹配 →
//! 带档案提示的抽取调用 → 本地校验 → 可选的说明调用 → 记录。
//! 快速分析：快速提示词 + 单次调用，模型自带评分，服务端补齐。

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::config::OpenAiConfig;
use crate::error::{AppError, Result};
use crate::models::analysis::{
    AnalysisMode, AnalysisRecord, ErrorRecord, ProbeResult, Usage, ValidationReport,
};
use crate::models::receipt::{ExtractedData, coerce_text, parse_json_object};
use crate::models::venue::VenueProfile;
use crate::observability::AppMetrics;
use crate::services::image::{
    DEFAULT_JPEG_QUALITY, DEFAULT_MAX_SIDE, data_url, to_base64_optimized,
};
use crate::services::llm_client::{ChatCompletion, ChatMessage, ChatModel, ChatRequest};
use crate::services::prompt_store::{PromptKind, PromptStore};
use crate::services::qr::{self, ZatcaInvoice};
use crate::services::validators::{Validator, merge_model_scores};
use crate::services::venue_matcher::{VenueIndex, VenueMatch};
use crate::storage::AnalysisRepository;

const PROBE_SYSTEM: &str =
    "Read the receipt image and extract ONLY merchant and address as JSON. No prose.";
const PROBE_INSTRUCTION: &str = "Return ONLY this JSON with two keys and nothing else:\n\
    {\"m\": \"merchant name or null\", \"a\": \"merchant address or null\"}";
const EXTRACT_INSTRUCTION: &str =
    "Extract the required fields. Return ONLY valid JSON under a single top-level object.";
const REASON_INSTRUCTION: &str = "You are given extracted receipt fields (JSON) and code-side \
    validation results. Write a concise explanation of the fraudScore/confidence, and state key \
    mismatches if any. Return a JSON with keys: reason (string).";
const PROFILE_CONTEXT_HEADER: &str =
    "\n\n---\nCONTEXT VENUE PROFILE (for hints only; do not overwrite image values):\n";
const PROBE_MAX_CHARS: usize = 200;
const PROBE_MAX_TOKENS: u32 = 100;

/// 分析流程中与模型相关的设置
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    /// 快速分析模型
    pub quick_model: String,
    /// 探测与抽取模型
    pub extract_model: String,
    pub reason_model: String,
    pub max_tokens_extract: u32,
    pub max_tokens_reason: u32,
    pub reason_enabled: bool,
    pub image_max_side: u32,
    pub image_quality: u8,
}

impl AnalyzerSettings {
    pub fn from_config(config: &OpenAiConfig) -> Self {
        Self {
            quick_model: config.model.clone(),
            extract_model: config.model_extract.clone(),
            reason_model: config.model_reason.clone(),
            max_tokens_extract: config.max_output_tokens_extract,
            max_tokens_reason: config.max_output_tokens_reason,
            reason_enabled: config.reason_enabled,
            image_max_side: DEFAULT_MAX_SIDE,
            image_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self::from_config(&OpenAiConfig::default())
    }
}

/// 上传的票据图片
#[derive(Debug, Clone, Default)]
pub struct ReceiptImage {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub reference: Option<String>,
}

/// 命中档案摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub name: Option<String>,
    pub score: f64,
    pub exact: bool,
}

impl From<&VenueMatch> for ProfileSummary {
    fn from(found: &VenueMatch) -> Self {
        Self {
            name: found.profile.display_name(),
            score: (found.score * 10.0).round() / 10.0,
            exact: found.exact,
        }
    }
}

/// 完整分析结果
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub id: String,
    pub data: ExtractedData,
    pub validation: ValidationReport,
    pub reason: String,
    pub usage: Usage,
    pub profile: Option<ProfileSummary>,
    pub qr: Option<ZatcaInvoice>,
}

/// 快速分析结果
#[derive(Debug, Clone)]
pub struct QuickOutcome {
    pub id: String,
    /// 含 fraudScore / confidentScore / reason
    pub data: ExtractedData,
}

/// 票据分析器
pub struct Analyzer {
    model: Arc<dyn ChatModel>,
    prompts: Arc<PromptStore>,
    venues: Arc<RwLock<VenueIndex>>,
    repository: Arc<dyn AnalysisRepository>,
    validator: Validator,
    settings: AnalyzerSettings,
    metrics: Arc<AppMetrics>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("settings", &self.settings)
            .field("repository", &self.repository.backend())
            .finish()
    }
}

impl Analyzer {
    pub fn new(
        model: Arc<dyn ChatModel>,
        prompts: Arc<PromptStore>,
        venues: Arc<RwLock<VenueIndex>>,
        repository: Arc<dyn AnalysisRepository>,
        validator: Validator,
        settings: AnalyzerSettings,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            model,
            prompts,
            venues,
            repository,
            validator,
            settings,
            metrics,
        }
    }

    /// 当前档案数量
    pub async fn venue_count(&self) -> usize {
        self.venues.read().await.len()
    }

    /// 重新加载场所档案；加载失败时保留旧索引
    pub async fn reload_venues(&self, path: &Path, threshold: f64) -> Result<usize> {
        let index = VenueIndex::load(path, threshold).await?;
        let count = index.len();
        *self.venues.write().await = index;
        info!("Venue profiles reloaded: {}", count);
        Ok(count)
    }

    /// 完整的两次调用分析
    pub async fn analyze(&self, upload: ReceiptImage) -> Result<AnalysisOutcome> {
        let started = Instant::now();
        let reference = upload.reference.clone();
        let (image_b64, qr) = self.prepare_image(upload.bytes).await?;
        let image_url = data_url(&image_b64);

        // 第一次调用：只取商户与地址
        let probe_request = ChatRequest::json(
            &self.settings.extract_model,
            vec![
                ChatMessage::system(PROBE_SYSTEM),
                ChatMessage::user_with_image(Some(PROBE_INSTRUCTION), image_url.clone()),
            ],
            Some(PROBE_MAX_TOKENS),
        );
        let probe_completion = self.call("probe", reference.as_deref(), probe_request).await?;
        let probe = parse_probe(&probe_completion.content);
        debug!(
            "Probe result: merchant={:?} address={:?}",
            probe.merchant, probe.address
        );

        let venue = self
            .venues
            .read()
            .await
            .find_best(&probe.merchant, &probe.address);
        if let Some(found) = &venue {
            debug!(
                "Venue profile matched: {:?} score={:.1} exact={}",
                found.profile.display_name(),
                found.score,
                found.exact
            );
        }

        // 第二次调用：带档案提示的抽取
        let base_prompt = self.prompts.get(PromptKind::Active).await;
        let system_prompt =
            build_system_prompt(&base_prompt, venue.as_ref().map(|v| v.profile.as_ref()));
        let extract_request = ChatRequest::json(
            &self.settings.extract_model,
            vec![
                ChatMessage::system(system_prompt.clone()),
                ChatMessage::user_with_image(Some(EXTRACT_INSTRUCTION), image_url),
            ],
            Some(self.settings.max_tokens_extract),
        );
        let extract_completion = self
            .call("extract", reference.as_deref(), extract_request)
            .await?;

        let data = ExtractedData::from_model_text(&extract_completion.content);
        if data.is_empty() {
            warn!(
                "Extraction returned no receipt fields (reference={:?})",
                reference
            );
        }
        let validation = self.validator.validate(&data, venue.as_ref(), qr.as_ref());

        let mut usage = probe_completion.usage.merge(extract_completion.usage);
        let reason = if self.settings.reason_enabled {
            let (reason, reason_usage) = self
                .narrative_reason(&system_prompt, &data, &validation, reference.as_deref())
                .await;
            usage = usage.merge(reason_usage);
            reason
        } else {
            validation.summary().to_string()
        };

        let mut record = AnalysisRecord::new(AnalysisMode::Full);
        record.reference = reference;
        record.filename = upload.filename;
        record.probe = Some(probe);
        record.profile_matched = venue.is_some();
        record.profile_name = venue.as_ref().and_then(|v| v.profile.display_name());
        record.extracted_raw = extract_completion.content;
        record.extracted_parsed = serde_json::to_value(&data)?;
        record.validation = Some(validation.clone());
        record.usage = usage;
        record.qr = qr.clone();
        self.persist(&record).await;

        self.metrics
            .record_analysis(AnalysisMode::Full, venue.is_some(), qr.is_some(), usage);
        info!(
            "Analysis {} done: fraud={} confidence={} tokens={} elapsed_ms={}",
            record.id,
            validation.fraud_score,
            validation.confidence_score,
            usage.total_tokens,
            started.elapsed().as_millis()
        );

        Ok(AnalysisOutcome {
            id: record.id,
            data,
            validation,
            reason,
            usage,
            profile: venue.as_ref().map(ProfileSummary::from),
            qr,
        })
    }

    /// 单次调用的快速分析
    pub async fn analyze_quick(&self, upload: ReceiptImage) -> Result<QuickOutcome> {
        let reference = upload.reference.clone();
        let (image_b64, qr) = self.prepare_image(upload.bytes).await?;

        let system_prompt = self.prompts.get(PromptKind::Quick).await;
        // 部分模型不接受 temperature，这里不指定
        let request = ChatRequest {
            model: self.settings.quick_model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user_with_image(None, data_url(&image_b64)),
            ],
            temperature: None,
            max_tokens: None,
            json_mode: false,
        };
        let completion = self.call("quick", reference.as_deref(), request).await?;

        let mut data = parse_quick_output(&completion.content);
        let report = self.validator.validate(&data, None, qr.as_ref());
        merge_model_scores(&mut data.extra, &report);

        let mut record = AnalysisRecord::new(AnalysisMode::Quick);
        record.reference = reference;
        record.filename = upload.filename;
        record.extracted_raw = completion.content;
        record.extracted_parsed = serde_json::to_value(&data)?;
        record.validation = Some(report);
        record.usage = completion.usage;
        record.qr = qr.clone();
        self.persist(&record).await;

        self.metrics
            .record_analysis(AnalysisMode::Quick, false, qr.is_some(), completion.usage);
        debug!("Quick analysis {} done", record.id);

        Ok(QuickOutcome {
            id: record.id,
            data,
        })
    }

    async fn prepare_image(&self, bytes: Vec<u8>) -> Result<(String, Option<ZatcaInvoice>)> {
        if bytes.is_empty() {
            return Err(AppError::Validation("Empty file.".into()));
        }
        let (max_side, quality) = (self.settings.image_max_side, self.settings.image_quality);

        // 图片解码与二维码识别都是 CPU 密集操作
        tokio::task::spawn_blocking(move || {
            let b64 = to_base64_optimized(&bytes, max_side, quality)?;
            let qr = qr::decode_from_image(&bytes);
            Ok::<_, AppError>((b64, qr))
        })
        .await
        .map_err(|e| AppError::Internal(format!("图片处理任务失败: {}", e)))?
    }

    /// 调用模型；失败时记录失败阶段并统一为上游错误
    async fn call(
        &self,
        stage: &str,
        reference: Option<&str>,
        request: ChatRequest,
    ) -> Result<ChatCompletion> {
        match self.model.complete(request).await {
            Ok(completion) => Ok(completion),
            Err(e) => {
                error!("Model call failed at stage {}: {}", stage, e);
                self.metrics.record_upstream_error();
                self.record_error(stage, &e, reference).await;
                Err(match e {
                    AppError::Upstream(_) | AppError::Timeout(_) => e,
                    other => AppError::Upstream(other.to_string()),
                })
            }
        }
    }

    /// 说明调用失败不影响主流程，回退到校验摘要
    async fn narrative_reason(
        &self,
        system_prompt: &str,
        data: &ExtractedData,
        validation: &ValidationReport,
        reference: Option<&str>,
    ) -> (String, Usage) {
        let extracted = serde_json::to_string(data).unwrap_or_default();
        let checks = serde_json::to_string(validation).unwrap_or_default();
        let request = ChatRequest::json(
            &self.settings.reason_model,
            vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(REASON_INSTRUCTION),
                ChatMessage::user(format!("EXTRACTED=```json\n{}\n```", extracted)),
                ChatMessage::user(format!("VALIDATION=```json\n{}\n```", checks)),
            ],
            Some(self.settings.max_tokens_reason),
        );

        match self.model.complete(request).await {
            Ok(completion) => {
                let reason = parse_json_object(&completion.content)
                    .ok()
                    .and_then(|v| v.get("reason").cloned())
                    .and_then(coerce_text)
                    .unwrap_or_else(|| validation.summary().to_string());
                (reason, completion.usage)
            }
            Err(e) => {
                warn!("Reason call failed, using summary: {}", e);
                self.metrics.record_upstream_error();
                self.record_error("reason", &e, reference).await;
                (validation.summary().to_string(), Usage::default())
            }
        }
    }

    async fn record_error(&self, stage: &str, err: &AppError, reference: Option<&str>) {
        let record = ErrorRecord::new(stage, err, reference.map(str::to_string));
        if let Err(e) = self.repository.insert_error(&record).await {
            warn!("Failed to store error record: {}", e);
        }
    }

    async fn persist(&self, record: &AnalysisRecord) {
        if let Err(e) = self.repository.insert_analysis(record).await {
            warn!("Failed to store analysis {}: {}", record.id, e);
            self.metrics.record_error();
        }
    }
}

/// 拼接抽取系统提示词；命中档案时附加精简提示
pub fn build_system_prompt(base_prompt: &str, profile: Option<&VenueProfile>) -> String {
    let mut prompt = base_prompt.trim().to_string();
    if let Some(profile) = profile {
        let slim = json!({
            "ExtractionHints": profile.slim_hints(),
            "MerchantName_Keyword": profile.merchant_name_keyword,
            "MerchantAddress_Keyword": profile.merchant_address_keyword,
            "SpendingRange": profile.spending_range,
        });
        prompt.push_str(PROFILE_CONTEXT_HEADER);
        prompt.push_str(&slim.to_string());
    }
    prompt
}

/// 解析探测调用输出，失败时为空
pub fn parse_probe(content: &str) -> ProbeResult {
    let Ok(Value::Object(mut object)) = parse_json_object(content) else {
        return ProbeResult::default();
    };
    let mut guess = |key: &str| {
        object
            .remove(key)
            .and_then(coerce_text)
            .map(|s| s.chars().take(PROBE_MAX_CHARS).collect::<String>())
            .unwrap_or_default()
    };
    ProbeResult {
        merchant: guess("m"),
        address: guess("a"),
    }
}

/// 快速分析要求 `data` 根对象，否则返回全空结果并附带原因
pub fn parse_quick_output(content: &str) -> ExtractedData {
    let detail = match parse_json_object(content) {
        Ok(Value::Object(mut root)) => match root.remove("data") {
            Some(Value::Object(data)) => return ExtractedData::from_model_object(data),
            Some(_) => "'data' root is not an object.".to_string(),
            None => "Missing 'data' root.".to_string(),
        },
        Ok(_) => "Top-level value is not an object.".to_string(),
        Err(e) => e.to_string(),
    };

    let mut extra = Map::new();
    extra.insert("fraudScore".into(), json!(0));
    extra.insert("confidentScore".into(), json!(0));
    extra.insert(
        "reason".into(),
        json!(format!("Model returned non-JSON or invalid format. {}", detail)),
    );
    ExtractedData {
        extra,
        ..Default::default()
    }
}
