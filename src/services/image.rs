//! 图片预处理
//!
//! 上传的图片先缩放、重新压缩为 JPEG，再以 base64 data URL 发送给模型，
//! 大幅降低视觉输入的 token 消耗。

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use std::io::Cursor;

use crate::error::{AppError, Result};

/// 最长边上限（像素）
pub const DEFAULT_MAX_SIDE: u32 = 1400;
/// JPEG 压缩质量
pub const DEFAULT_JPEG_QUALITY: u8 = 82;

/// 缩放并压缩图片，返回 base64 编码的 JPEG
pub fn to_base64_optimized(raw: &[u8], max_side: u32, quality: u8) -> Result<String> {
    if raw.is_empty() {
        return Err(AppError::Validation("Empty file.".into()));
    }

    let img = image::load_from_memory(raw)?;
    let mut rgb = img.to_rgb8();

    let (w, h) = rgb.dimensions();
    let longest = w.max(h);
    if longest > max_side {
        let scale = max_side as f64 / longest as f64;
        let new_w = ((w as f64 * scale) as u32).max(1);
        let new_h = ((h as f64 * scale) as u32).max(1);
        rgb = image::imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);
    }

    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| AppError::Internal(format!("JPEG 编码失败: {}", e)))?;

    Ok(STANDARD.encode(buf.into_inner()))
}

/// 构造模型可识别的图片 data URL
pub fn data_url(b64_jpeg: &str) -> String {
    format!("data:image/jpeg;base64,{}", b64_jpeg)
}

/// 根据 Content-Type 推断文件扩展名
pub fn guess_extension(content_type: Option<&str>) -> &'static str {
    let Some(ct) = content_type else {
        return ".bin";
    };
    let ct = ct.to_ascii_lowercase();
    if ct.contains("jpeg") || ct.contains("jpg") {
        ".jpg"
    } else if ct.contains("png") {
        ".png"
    } else if ct.contains("webp") {
        ".webp"
    } else if ct.contains("tiff") || ct.contains("tif") {
        ".tif"
    } else if ct.contains("bmp") {
        ".bmp"
    } else {
        ".bin"
    }
}
