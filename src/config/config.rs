use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// 默认系统提示词（提示词文件缺失或为空时使用）
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a Professional Receipt & Invoice Analyzer. Return STRICT JSON only.";

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            max_request_size: 10 * 1024 * 1024,
        }
    }
}

/// 数据文件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// 主提示词文件（PROMPT_PATH）
    pub prompt_path: PathBuf,
    /// 快速分析提示词文件（QUICK_PROMPT_PATH）
    pub quick_prompt_path: PathBuf,
    /// 场所档案 JSON 文件（VENUE_PROFILES_PATH）
    pub venue_profiles_path: PathBuf,
    /// 提示词回退文本（DEFAULT_SYSTEM_PROMPT）
    pub default_system_prompt: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            prompt_path: PathBuf::from("data/prompt.txt"),
            quick_prompt_path: PathBuf::from("data/quick_prompt.txt"),
            venue_profiles_path: PathBuf::from("data/venue_profiles.json"),
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

/// OpenAI 兼容模型配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API 密钥
    pub api_key: String,
    /// API 基础地址
    pub base_url: String,
    /// 快速分析模型
    pub model: String,
    /// 字段抽取模型（探测调用与抽取调用）
    pub model_extract: String,
    /// 说明生成模型
    pub model_reason: String,
    /// 抽取调用输出 token 上限
    pub max_output_tokens_extract: u32,
    /// 说明调用输出 token 上限
    pub max_output_tokens_reason: u32,
    /// 是否额外调用模型生成评分说明
    pub reason_enabled: bool,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            model_extract: "gpt-4o-mini".into(),
            model_reason: "gpt-4o-mini".into(),
            max_output_tokens_extract: 600,
            max_output_tokens_reason: 400,
            reason_enabled: false,
            timeout_secs: 60,
        }
    }
}

/// 校验规则配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Subtotal + Tax 与 Total 的允许误差
    pub sum_tolerance: f64,
    /// 增值税税率
    pub vat_rate: f64,
    /// 增值税绝对误差下限
    pub vat_abs_tolerance: f64,
    /// 增值税相对误差（相对 Subtotal）
    pub vat_rel_tolerance: f64,
    /// 商户名称匹配阈值（0-100）
    pub merchant_match_threshold: f64,
    /// 地址匹配阈值（0-100）
    pub address_match_threshold: f64,
    /// 场所档案匹配阈值（0-100）
    pub profile_match_threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            sum_tolerance: 0.05,
            vat_rate: 0.15,
            vat_abs_tolerance: 0.5,
            vat_rel_tolerance: 0.02,
            merchant_match_threshold: 70.0,
            address_match_threshold: 60.0,
            profile_match_threshold: 55.0,
        }
    }
}

/// 安全配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 逗号分隔的 API 密钥列表（API_KEYS）
    #[serde(deserialize_with = "lenient_string")]
    pub api_keys: String,
    /// 兼容旧版的单个密钥（SCAN_API_KEY）
    #[serde(deserialize_with = "lenient_optional_string")]
    pub scan_api_key: Option<String>,
    /// 允许的 CORS 来源（CORS_ALLOWED_ORIGINS），"*" 表示全部
    pub cors_allowed_origins: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_keys: String::new(),
            scan_api_key: None,
            cors_allowed_origins: "*".into(),
        }
    }
}

impl SecurityConfig {
    /// 汇总所有有效密钥
    pub fn api_key_set(&self) -> HashSet<String> {
        let mut keys: HashSet<String> = parse_csv(&self.api_keys).into_iter().collect();
        if let Some(single) = self.scan_api_key.as_deref() {
            let single = single.trim();
            if !single.is_empty() {
                keys.insert(single.to_string());
            }
        }
        keys
    }

    /// CORS 来源列表；`None` 表示允许任意来源
    pub fn cors_origins(&self) -> Option<Vec<String>> {
        let raw = self.cors_allowed_origins.trim();
        if raw == "*" {
            None
        } else {
            Some(parse_csv(raw))
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 存储后端: "memory" 或 "jsonl"
    pub backend: String,
    /// jsonl 后端的数据目录
    pub data_dir: PathBuf,
    /// memory 后端保留的最大记录数
    pub memory_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            data_dir: PathBuf::from("./data/analyses"),
            memory_capacity: 1000,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            log_dir: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据文件配置
    pub data: DataConfig,
    /// 模型配置
    pub openai: OpenAiConfig,
    /// 校验规则配置
    pub validation: ValidationConfig,
    /// 安全配置
    pub security: SecurityConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            data: DataConfig::default(),
            openai: OpenAiConfig::default(),
            validation: ValidationConfig::default(),
            security: SecurityConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            app_name: "scan-invoice".into(),
            environment: "production".into(),
        }
    }
}

impl AppConfig {
    /// 监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 环境变量中的纯数字密钥会被解析为数字，这里统一还原为字符串
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::UInt(u) => u.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(String::from)
}

fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Scalar>::deserialize(deserializer).map(|v| v.map(String::from))
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_container_contract() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.data.prompt_path, PathBuf::from("data/prompt.txt"));
        assert_eq!(
            config.data.quick_prompt_path,
            PathBuf::from("data/quick_prompt.txt")
        );
        assert_eq!(
            config.data.venue_profiles_path,
            PathBuf::from("data/venue_profiles.json")
        );
    }

    #[test]
    fn test_api_key_set_merges_sources() {
        let security = SecurityConfig {
            api_keys: " alpha, beta ,,".into(),
            scan_api_key: Some(" legacy ".into()),
            ..SecurityConfig::default()
        };
        let keys = security.api_key_set();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains("alpha"));
        assert!(keys.contains("beta"));
        assert!(keys.contains("legacy"));
    }

    #[test]
    fn test_cors_origins() {
        let mut security = SecurityConfig::default();
        assert!(security.cors_origins().is_none());

        security.cors_allowed_origins = "http://localhost:3000, https://myapp.com".into();
        assert_eq!(
            security.cors_origins().unwrap(),
            vec!["http://localhost:3000", "https://myapp.com"]
        );
    }
}
