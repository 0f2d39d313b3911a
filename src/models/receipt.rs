//! 票据抽取数据模型
//!
//! 模型返回的字段在这里被规整：空值字符串置空、数字字符串转数字、日期统一格式。

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 视为空值的字符串（比较前先 trim + 小写）
pub const NULL_STRINGS: &[&str] = &[
    "", "null", "none", "nil", "n/a", "na", "—", "-", "غير متوفر", "غير موجود",
];

/// 日期输出格式
pub const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

/// 依次尝试的日期格式，bool 表示是否包含时间
const DATE_FORMATS: &[(&str, bool)] = &[
    ("%d/%m/%Y %I:%M %p", true),
    ("%d/%m/%Y %H:%M", true),
    ("%Y/%m/%d %I:%M:%S %p", true),
    ("%Y/%m/%d %H:%M:%S", true),
    ("%Y/%m/%d %H:%M", true),
    ("%d/%m/%Y", false),
    ("%Y/%m/%d", false),
    ("%d-%m-%Y %H:%M", true),
    ("%d-%m-%Y", false),
    ("%Y-%m-%d %H:%M:%S", true),
    ("%Y-%m-%d", false),
];

/// 票据抽取结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(rename = "MerchantName")]
    pub merchant_name: Option<String>,

    #[serde(rename = "MerchantAddress")]
    pub merchant_address: Option<String>,

    /// 统一为 `YYYY-MM-DD HH:MM`，无法解析时保留原文
    #[serde(rename = "TransactionDate")]
    pub transaction_date: Option<String>,

    #[serde(rename = "StoreID")]
    pub store_id: Option<String>,

    #[serde(rename = "InvoiceId")]
    pub invoice_id: Option<String>,

    /// 商业登记号
    #[serde(rename = "CR")]
    pub cr: Option<String>,

    /// 税号
    #[serde(rename = "TaxID")]
    pub tax_id: Option<String>,

    #[serde(rename = "Subtotal")]
    pub subtotal: Option<f64>,

    #[serde(rename = "Tax")]
    pub tax: Option<f64>,

    #[serde(rename = "Total")]
    pub total: Option<f64>,

    /// 模型返回的其它字段，原样透传
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtractedData {
    /// 从模型返回的 JSON 对象构建并规整
    pub fn from_model_object(mut object: Map<String, Value>) -> Self {
        let mut take_text = |key: &str| object.remove(key).and_then(coerce_text);

        let merchant_name = take_text("MerchantName");
        let merchant_address = take_text("MerchantAddress");
        let transaction_date = take_text("TransactionDate").and_then(|d| norm_date(&d));
        let store_id = take_text("StoreID");
        let invoice_id = take_text("InvoiceId");
        let cr = take_text("CR");
        let tax_id = take_text("TaxID");

        let subtotal = object.remove("Subtotal").and_then(|v| coerce_number(&v));
        let tax = object.remove("Tax").and_then(|v| coerce_number(&v));
        let total = object.remove("Total").and_then(|v| coerce_number(&v));

        Self {
            merchant_name,
            merchant_address,
            transaction_date,
            store_id,
            invoice_id,
            cr,
            tax_id,
            subtotal,
            tax,
            total,
            extra: object,
        }
    }

    /// 解析模型输出文本：优先取 `data` 对象，否则取整个对象；无法解析时为空
    pub fn from_model_text(text: &str) -> Self {
        let object = match parse_json_object(text) {
            Ok(Value::Object(mut root)) => match root.remove("data") {
                Some(Value::Object(data)) => data,
                Some(other) => {
                    root.insert("data".into(), other);
                    root
                }
                None => root,
            },
            _ => Map::new(),
        };
        Self::from_model_object(object)
    }

    /// 是否没有任何核心字段
    pub fn is_empty(&self) -> bool {
        self.merchant_name.is_none()
            && self.merchant_address.is_none()
            && self.transaction_date.is_none()
            && self.subtotal.is_none()
            && self.tax.is_none()
            && self.total.is_none()
    }
}

/// 解析模型输出中的 JSON；整体解析失败时取第一个 `{` 到最后一个 `}` 之间的片段，
/// 兼容被 Markdown 代码块包裹的输出
pub fn parse_json_object(text: &str) -> serde_json::Result<Value> {
    let text = text.trim();
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(e) => match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&text[start..=end]),
            _ => Err(e),
        },
    }
}

/// 将阿拉伯-印度数字转换为 ASCII 数字
pub fn translate_arabic_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => {
                char::from(b'0' + (c as u32 - 0x0660) as u8)
            }
            other => other,
        })
        .collect()
}

/// 空值字符串判定
pub fn is_nullish(s: &str) -> bool {
    let lowered = s.trim().to_lowercase();
    NULL_STRINGS.contains(&lowered.as_str())
}

/// 文本字段规整：null / 空值字符串 -> None，数字转为字符串
pub fn coerce_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if is_nullish(&s) => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// 数值字段规整，去掉千分位和货币单位
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// 解析金额字符串，如 "1,150.00 SAR" 或 "١٥٠"
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned = translate_arabic_digits(&raw.replace(',', "").replace("SAR", ""));
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// 日期规整为 `YYYY-MM-DD HH:MM`，无法识别时原样返回
pub fn norm_date(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    let s = translate_arabic_digits(raw.trim()).replace("  ", " ");

    for (format, has_time) in DATE_FORMATS {
        if let Some(dt) = parse_with(&s, format, *has_time) {
            return Some(dt.format(DATE_OUTPUT_FORMAT).to_string());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.naive_local().format(DATE_OUTPUT_FORMAT).to_string());
    }

    let iso_like = s.replace('T', " ").replace('Z', "");
    let iso_like = iso_like.split('.').next().unwrap_or_default().trim();
    for (format, has_time) in [
        ("%Y-%m-%d %H:%M:%S%:z", true),
        ("%Y-%m-%d %H:%M:%S", true),
        ("%Y-%m-%d %H:%M", true),
        ("%Y-%m-%d", false),
    ] {
        if let Some(dt) = parse_with(iso_like, format, has_time) {
            return Some(dt.format(DATE_OUTPUT_FORMAT).to_string());
        }
    }

    Some(s)
}

fn parse_with(s: &str, format: &str, has_time: bool) -> Option<NaiveDateTime> {
    if has_time {
        if format.ends_with("%:z") {
            return DateTime::parse_from_str(s, format)
                .ok()
                .map(|dt| dt.naive_local());
        }
        NaiveDateTime::parse_from_str(s, format).ok()
    } else {
        NaiveDate::parse_from_str(s, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("12/03/2024 07:45 PM", "2024-03-12 19:45")]
    #[case("12/03/2024 19:45", "2024-03-12 19:45")]
    #[case("2024/03/12 07:45:10 AM", "2024-03-12 07:45")]
    #[case("2024/03/12 19:45:10", "2024-03-12 19:45")]
    #[case("12/03/2024", "2024-03-12 00:00")]
    #[case("12-03-2024 08:05", "2024-03-12 08:05")]
    #[case("2024-03-12", "2024-03-12 00:00")]
    #[case("2024-03-12T10:20:30Z", "2024-03-12 10:20")]
    #[case("2024-03-12T10:20:30.123Z", "2024-03-12 10:20")]
    #[case("2024-03-12T10:20:30+03:00", "2024-03-12 10:20")]
    #[case("١٢/٠٣/٢٠٢٤", "2024-03-12 00:00")]
    fn test_norm_date(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(norm_date(input).as_deref(), Some(expected));
    }

    #[test]
    fn test_norm_date_unparseable_kept() {
        assert_eq!(norm_date("Ramadan 5th").as_deref(), Some("Ramadan 5th"));
        assert_eq!(norm_date("   "), None);
    }

    #[rstest]
    #[case(json!(115.5), Some(115.5))]
    #[case(json!("1,150.00"), Some(1150.0))]
    #[case(json!("SAR 23.00"), Some(23.0))]
    #[case(json!("١٥٠"), Some(150.0))]
    #[case(json!("abc"), None)]
    #[case(json!(null), None)]
    #[case(json!(true), None)]
    fn test_coerce_number(#[case] input: Value, #[case] expected: Option<f64>) {
        assert_eq!(coerce_number(&input), expected);
    }

    #[test]
    fn test_nullish_strings() {
        assert!(is_nullish(" N/A "));
        assert!(is_nullish("null"));
        assert!(is_nullish("غير متوفر"));
        assert!(!is_nullish("Starbucks"));
        assert_eq!(coerce_text(json!("none")), None);
        assert_eq!(coerce_text(json!(310)), Some("310".to_string()));
    }

    #[test]
    fn test_from_model_text_inside_code_fence() {
        let text = "```json\n{\"data\": {\"MerchantName\": \"Kudu\", \"Total\": 30}}\n```";
        let data = ExtractedData::from_model_text(text);
        assert_eq!(data.merchant_name.as_deref(), Some("Kudu"));
        assert_eq!(data.total, Some(30.0));
        assert!(ExtractedData::from_model_text("no json here").is_empty());
    }

    #[test]
    fn test_from_model_text_with_data_root() {
        let text = r#"{"data": {
            "MerchantName": "Al Baik",
            "MerchantAddress": "n/a",
            "TransactionDate": "05/01/2024 01:30 PM",
            "Subtotal": "100.00",
            "Tax": 15,
            "Total": "115.00 SAR",
            "fraudScore": 10
        }}"#;
        let data = ExtractedData::from_model_text(text);
        assert_eq!(data.merchant_name.as_deref(), Some("Al Baik"));
        assert_eq!(data.merchant_address, None);
        assert_eq!(data.transaction_date.as_deref(), Some("2024-01-05 13:30"));
        assert_eq!(data.subtotal, Some(100.0));
        assert_eq!(data.tax, Some(15.0));
        assert_eq!(data.total, Some(115.0));
        assert_eq!(data.extra.get("fraudScore"), Some(&json!(10)));
    }

    #[test]
    fn test_from_model_text_flat_and_invalid() {
        let flat = ExtractedData::from_model_text(r#"{"Total": 42}"#);
        assert_eq!(flat.total, Some(42.0));

        let invalid = ExtractedData::from_model_text("I cannot read this receipt");
        assert!(invalid.is_empty());
        assert!(invalid.extra.is_empty());
    }

    #[test]
    fn test_serialize_uses_wire_names() {
        let data = ExtractedData {
            merchant_name: Some("Jarir".into()),
            total: Some(10.0),
            ..Default::default()
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["MerchantName"], json!("Jarir"));
        assert_eq!(value["Total"], json!(10.0));
        assert_eq!(value["TaxID"], Value::Null);
    }
}
