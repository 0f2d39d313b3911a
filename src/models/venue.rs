//! 场所档案数据模型
//!
//! 档案来自 VENUE_PROFILES_PATH 指向的 JSON 数组，字段名沿用数据文件中的写法。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 写入抽取提示词的提示字段白名单
pub const SLIM_HINT_KEYS: &[&str] = &[
    "Language",
    "Total_Label",
    "Subtotal_Label",
    "Tax_Label",
    "CR_Label",
    "TaxID_Label",
    "Date_Label",
    "Time_Label",
    "Date_Format",
    "Time_Format",
    "InvoiceId_Label",
    "StoreID_Label",
    "MerchantName_Keyword",
    "MerchantAddress_Keyword",
];

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));
static ALIAS_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[|,/]").expect("valid regex"));

/// 关键字：单个字符串或列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Keywords {
    One(String),
    Many(Vec<Value>),
    Other(Value),
}

impl Keywords {
    /// 可用于匹配的字符串候选，列表中的非字符串项被忽略
    pub fn candidates(&self) -> Vec<String> {
        match self {
            Keywords::One(s) => vec![s.clone()],
            Keywords::Many(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Keywords::Other(Value::Null) => Vec::new(),
            Keywords::Other(v) => vec![v.to_string()],
        }
    }

    /// 别名拆分：字符串按 `|` `,` `/` 切分，列表逐项取值
    fn alias_parts(&self) -> Vec<String> {
        match self {
            Keywords::One(s) => ALIAS_SPLIT_RE
                .split(s)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            Keywords::Many(items) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|t| !t.is_empty())
                .collect(),
            Keywords::Other(_) => Vec::new(),
        }
    }
}

/// 场所档案
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueProfile {
    #[serde(
        rename = "MerchantName_Keyword",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub merchant_name_keyword: Option<Keywords>,

    #[serde(
        rename = "MerchantAddress_Keyword",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub merchant_address_keyword: Option<Keywords>,

    #[serde(rename = "TenantName", default, skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<Keywords>,

    #[serde(rename = "Brand", default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<Keywords>,

    #[serde(rename = "Aliases", default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Keywords>,

    /// 抽取提示（标签名、日期格式等）
    #[serde(
        rename = "ExtractionHints",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub extraction_hints: Option<Map<String, Value>>,

    /// 消费区间，如 "50-300"、[50, 300] 或 {"min": 50, "max": 300}
    #[serde(
        rename = "Spending Range (SAR)",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub spending_range: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VenueProfile {
    pub fn merchant_keywords(&self) -> Vec<String> {
        self.merchant_name_keyword
            .as_ref()
            .map(Keywords::candidates)
            .unwrap_or_default()
    }

    pub fn address_keywords(&self) -> Vec<String> {
        self.merchant_address_keyword
            .as_ref()
            .map(Keywords::candidates)
            .unwrap_or_default()
    }

    /// 所有可精确匹配的名称（商户关键字、租户名、品牌、别名）
    pub fn alias_names(&self) -> Vec<String> {
        let mut names: Vec<String> = [
            &self.merchant_name_keyword,
            &self.tenant_name,
            &self.brand,
            &self.aliases,
        ]
        .into_iter()
        .flatten()
        .flat_map(Keywords::alias_parts)
        .collect();
        names.sort();
        names.dedup();
        names
    }

    /// 展示名称
    pub fn display_name(&self) -> Option<String> {
        self.merchant_keywords()
            .into_iter()
            .next()
            .or_else(|| self.tenant_name.as_ref()?.candidates().into_iter().next())
    }

    /// 过滤后的抽取提示：只保留白名单字段且值为真
    pub fn slim_hints(&self) -> Map<String, Value> {
        self.extraction_hints
            .iter()
            .flatten()
            .filter(|(k, v)| SLIM_HINT_KEYS.contains(&k.as_str()) && is_truthy(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// 解析消费区间 (min, max)
    pub fn spending_bounds(&self) -> Option<(f64, f64)> {
        let (a, b) = match self.spending_range.as_ref()? {
            Value::String(s) => {
                let mut numbers = AMOUNT_RE
                    .find_iter(&s.replace(',', ""))
                    .filter_map(|m| m.as_str().parse::<f64>().ok())
                    .collect::<Vec<_>>()
                    .into_iter();
                (numbers.next()?, numbers.next()?)
            }
            Value::Array(items) if items.len() >= 2 => (items[0].as_f64()?, items[1].as_f64()?),
            Value::Object(map) => (map.get("min")?.as_f64()?, map.get("max")?.as_f64()?),
            _ => return None,
        };
        Some(if a <= b { (a, b) } else { (b, a) })
    }
}

/// 近似 JSON 值的“真值”语义：null、false、0、空串、空集合为假
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
