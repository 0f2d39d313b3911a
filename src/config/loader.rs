use crate::config::config::AppConfig;
use crate::storage::factory::StorageBackend;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::PathBuf;

/// 部署时使用的普通环境变量名与配置键的对应关系
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("prompt_path", "data.prompt_path"),
    ("quick_prompt_path", "data.quick_prompt_path"),
    ("venue_profiles_path", "data.venue_profiles_path"),
    ("default_system_prompt", "data.default_system_prompt"),
    ("openai_api_key", "openai.api_key"),
    ("openai_base_url", "openai.base_url"),
    ("openai_model", "openai.model"),
    ("openai_model_extract", "openai.model_extract"),
    ("openai_model_reason", "openai.model_reason"),
    ("max_output_tokens_extract", "openai.max_output_tokens_extract"),
    ("max_output_tokens_reason", "openai.max_output_tokens_reason"),
    ("api_keys", "security.api_keys"),
    ("scan_api_key", "security.scan_api_key"),
    ("cors_allowed_origins", "security.cors_allowed_origins"),
    ("host", "server.host"),
    ("port", "server.port"),
];

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 优先级（后者覆盖前者）：
    /// 1. 内置默认值
    /// 2. ./config.toml
    /// 3. `SCAN_INVOICE_<SECTION>__<KEY>` 环境变量
    /// 4. 部署约定的普通环境变量（PROMPT_PATH、OPENAI_API_KEY 等）
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::figment(default_config_path()).extract()
    }

    /// 从指定路径加载配置
    pub fn load_from(path: PathBuf) -> Result<AppConfig, figment::Error> {
        Self::figment(path).extract()
    }

    fn figment(path: PathBuf) -> Figment {
        let legacy_names: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(name, _)| *name).collect();

        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SCAN_INVOICE_").split("__"))
            .merge(Env::raw().only(&legacy_names).map(|key| {
                let name = key.as_str().to_ascii_lowercase();
                LEGACY_ENV_KEYS
                    .iter()
                    .find(|(legacy, _)| *legacy == name)
                    .map(|(_, target)| target.to_string())
                    .unwrap_or(name)
                    .into()
            }))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.openai.api_key.trim().is_empty() {
            return Err(ConfigValidationError::MissingOpenAiKey);
        }

        if config.openai.base_url.trim().is_empty() {
            return Err(ConfigValidationError::InvalidPath("openai.base_url".into()));
        }

        for (name, path) in [
            ("data.prompt_path", &config.data.prompt_path),
            ("data.quick_prompt_path", &config.data.quick_prompt_path),
            ("data.venue_profiles_path", &config.data.venue_profiles_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigValidationError::InvalidPath(name.into()));
            }
        }

        let v = &config.validation;
        for (name, value) in [
            ("merchant_match_threshold", v.merchant_match_threshold),
            ("address_match_threshold", v.address_match_threshold),
            ("profile_match_threshold", v.profile_match_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigValidationError::InvalidThreshold(name.into()));
            }
        }

        if config.storage.backend.parse::<StorageBackend>().is_err() {
            return Err(ConfigValidationError::UnknownStorageBackend(
                config.storage.backend.clone(),
            ));
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("OPENAI_API_KEY 未配置")]
    MissingOpenAiKey,

    #[error("阈值必须在 0 到 100 之间: {0}")]
    InvalidThreshold(String),

    #[error("未知的存储后端: {0}")]
    UnknownStorageBackend(String),

    #[error("配置路径无效: {0}")]
    InvalidPath(String),
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_load_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = ConfigLoader::load()?;
            assert_eq!(config.server.port, 8000);
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.data.prompt_path, PathBuf::from("data/prompt.txt"));
            Ok(())
        });
    }

    #[test]
    fn test_legacy_env_names_override_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [data]
                prompt_path = "from-file/prompt.txt"

                [openai]
                model_extract = "file-model"
                "#,
            )?;
            jail.set_env("PROMPT_PATH", "env/prompt.txt");
            jail.set_env("QUICK_PROMPT_PATH", "env/quick.txt");
            jail.set_env("VENUE_PROFILES_PATH", "env/venues.json");
            jail.set_env("API_KEYS", "12345");
            jail.set_env("MAX_OUTPUT_TOKENS_EXTRACT", "900");

            let config = ConfigLoader::load()?;
            assert_eq!(config.data.prompt_path, PathBuf::from("env/prompt.txt"));
            assert_eq!(config.data.quick_prompt_path, PathBuf::from("env/quick.txt"));
            assert_eq!(
                config.data.venue_profiles_path,
                PathBuf::from("env/venues.json")
            );
            assert_eq!(config.openai.model_extract, "file-model");
            assert_eq!(config.openai.max_output_tokens_extract, 900);
            assert!(config.security.api_key_set().contains("12345"));
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_env_nested_keys() {
        Jail::expect_with(|jail| {
            jail.set_env("SCAN_INVOICE_STORAGE__BACKEND", "jsonl");
            jail.set_env("SCAN_INVOICE_VALIDATION__SUM_TOLERANCE", "1.0");
            jail.set_env("SCAN_INVOICE_STORAGE__MEMORY_CAPACITY", "50");

            let config = ConfigLoader::load()?;
            assert_eq!(config.storage.backend, "jsonl");
            assert_eq!(config.validation.sum_tolerance, 1.0);
            assert_eq!(config.storage.memory_capacity, 50);
            Ok(())
        });
    }

    #[test]
    fn test_validate() {
        let mut config = AppConfig::default();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::MissingOpenAiKey)
        ));

        config.openai.api_key = "sk-test".into();
        assert!(ConfigLoader::validate(&config).is_ok());

        config.storage.backend = "mongo".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::UnknownStorageBackend(_))
        ));

        config.storage.backend = "memory".into();
        config.validation.profile_match_threshold = 120.0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::InvalidThreshold(_))
        ));

        config.validation.profile_match_threshold = 55.0;
        config.server.port = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::InvalidPort)
        ));
    }
}
