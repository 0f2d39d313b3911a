use axum::{
    Json,
    extract::{Multipart, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::analyze_dto::*},
    error::AppError,
    services::{analyzer::ReceiptImage, image::guess_extension},
};

/// 快速分析优先读取 `image` 字段
const QUICK_FIELDS: &[&str] = &["image", "file"];
/// 完整分析优先读取 `file` 字段
const FULL_FIELDS: &[&str] = &["file", "image"];

/// 单次调用分析
pub async fn analyze_quick(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeQuery>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut upload = read_upload(multipart, QUICK_FIELDS).await?;
    upload.reference = params.reference;
    debug!(
        "Quick analysis: filename={:?} bytes={}",
        upload.filename,
        upload.bytes.len()
    );

    let outcome = state.analyzer.analyze_quick(upload).await?;
    Ok(Json(QuickAnalyzeResponse::from(outcome)))
}

/// 两次调用的完整分析
pub async fn analyze_image(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeQuery>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut upload = read_upload(multipart, FULL_FIELDS).await?;
    upload.reference = params.reference;
    debug!(
        "Full analysis: filename={:?} bytes={} reference={:?}",
        upload.filename,
        upload.bytes.len(),
        upload.reference
    );

    let outcome = state.analyzer.analyze(upload).await?;
    Ok(Json(AnalyzeResponse::from(outcome)))
}

/// base64 图片的完整分析
pub async fn analyze_base64(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeBase64Request>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = decode_image_base64(&request.image_base64)?;
    debug!(
        "Full analysis from base64: bytes={} reference={:?}",
        bytes.len(),
        request.reference
    );

    let upload = ReceiptImage {
        bytes,
        filename: None,
        reference: request.reference,
    };
    let outcome = state.analyzer.analyze(upload).await?;
    Ok(Json(AnalyzeResponse::from(outcome)))
}

/// 读取第一个可用的文件字段；按 `fields` 顺序优先
async fn read_upload(mut multipart: Multipart, fields: &[&str]) -> Result<ReceiptImage, AppError> {
    let mut found: Option<(usize, ReceiptImage)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(rank) = field
            .name()
            .and_then(|name| fields.iter().position(|f| *f == name))
        else {
            continue;
        };
        if found.as_ref().is_some_and(|(best, _)| *best <= rank) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload{}", guess_extension(content_type.as_deref())));
        let bytes = field.bytes().await.map_err(multipart_error)?;

        found = Some((
            rank,
            ReceiptImage {
                bytes: bytes.to_vec(),
                filename: Some(filename),
                reference: None,
            },
        ));
    }

    found.map(|(_, upload)| upload).ok_or_else(|| {
        AppError::Validation(format!("缺少上传文件字段: {}", fields.join(" / ")))
    })
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::Validation(format!("无效的 multipart 请求: {}", e.body_text()))
    }
}

/// 解码 base64 图片，兼容 data URL
fn decode_image_base64(raw: &str) -> Result<Vec<u8>, AppError> {
    let payload = match raw.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => raw,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(AppError::Validation("Empty file.".into()));
    }
    STANDARD
        .decode(compact)
        .map_err(|e| AppError::Validation(format!("image_base64 不是有效的 base64: {}", e)))
}
