//! ZATCA 电子发票二维码解析
//!
//! 沙特电子发票二维码内容为 base64 编码的 TLV 序列：
//! 1 卖方名称、2 增值税号、3 时间戳、4 含税总额、5 增值税额。

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::models::receipt::parse_amount;

/// 二维码中解出的发票信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZatcaInvoice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_amount: Option<f64>,
    /// 内容本身是 JSON 时原样保存
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl ZatcaInvoice {
    fn is_empty(&self) -> bool {
        self.seller.is_none()
            && self.vat.is_none()
            && self.timestamp.is_none()
            && self.total.is_none()
            && self.vat_amount.is_none()
            && self.json.is_none()
    }
}

/// 从图片中识别第一个二维码并解析；任何失败都返回 None
pub fn decode_from_image(raw: &[u8]) -> Option<ZatcaInvoice> {
    let gray = image::load_from_memory(raw).ok()?.to_luma8();
    let (w, h) = (gray.width() as usize, gray.height() as usize);

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
        gray.get_pixel(x as u32, y as u32).0[0]
    });
    let grids = prepared.detect_grids();
    let grid = grids.first()?;

    match grid.decode() {
        Ok((_meta, content)) => decode_payload(&content),
        Err(e) => {
            debug!("QR grid found but could not be decoded: {:?}", e);
            None
        }
    }
}

/// 解析二维码文本内容
pub fn decode_payload(content: &str) -> Option<ZatcaInvoice> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    if content.starts_with('{') {
        let json: Value = serde_json::from_str(content).ok()?;
        return Some(ZatcaInvoice {
            json: Some(json),
            ..Default::default()
        });
    }

    let bytes = STANDARD.decode(content).ok()?;
    let invoice = decode_tlv(&bytes);
    (!invoice.is_empty()).then_some(invoice)
}

/// 读取 TLV 序列，遇到截断的条目即停止
pub fn decode_tlv(data: &[u8]) -> ZatcaInvoice {
    let mut out = ZatcaInvoice::default();
    let mut i = 0;

    while i + 2 <= data.len() {
        let tag = data[i];
        let len = data[i + 1] as usize;
        i += 2;
        if i + len > data.len() {
            break;
        }
        let value = String::from_utf8_lossy(&data[i..i + len]).into_owned();
        i += len;

        match tag {
            1 => out.seller = Some(value),
            2 => out.vat = Some(value),
            3 => out.timestamp = Some(value),
            4 => out.total = parse_amount(&value),
            5 => out.vat_amount = parse_amount(&value),
            _ => {}
        }
    }

    out
}
