use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::Result;
use crate::observability::AppMetrics;
use crate::security::auth::ApiKeyAuth;
use crate::services::analyzer::{Analyzer, AnalyzerSettings};
use crate::services::llm_client::{ChatModel, OpenAiClient};
use crate::services::prompt_store::PromptStore;
use crate::services::validators::Validator;
use crate::services::venue_matcher::VenueIndex;
use crate::storage::{AnalysisRepository, StorageFactory};

/// Application state containing all shared services and security components
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<AppConfig>,
    /// Full and quick analysis pipelines
    pub analyzer: Arc<Analyzer>,
    /// File backed system prompts
    pub prompt_store: Arc<PromptStore>,
    /// Analysis and error records
    pub repository: Arc<dyn AnalysisRepository>,
    /// API key authenticator
    pub authenticator: Arc<ApiKeyAuth>,
    /// Prometheus counters
    pub metrics: Arc<AppMetrics>,
    pub started_at: DateTime<Utc>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("app_name", &self.config.app_name)
            .field("analyzer", &self.analyzer)
            .field("prompt_store", &self.prompt_store)
            .field("repository", &self.repository.backend())
            .field("auth_enabled", &self.authenticator.is_enabled())
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl AppState {
    /// Create new application state from already built parts
    pub fn new(
        config: AppConfig,
        model: Arc<dyn ChatModel>,
        venues: VenueIndex,
        repository: Arc<dyn AnalysisRepository>,
    ) -> Self {
        let metrics = Arc::new(AppMetrics::default());
        let prompt_store = Arc::new(PromptStore::from_config(&config.data));
        let analyzer = Analyzer::new(
            model,
            prompt_store.clone(),
            Arc::new(RwLock::new(venues)),
            repository.clone(),
            Validator::new(config.validation.clone()),
            AnalyzerSettings::from_config(&config.openai),
            metrics.clone(),
        );
        let authenticator = ApiKeyAuth::from_config(&config.security);

        Self {
            config: Arc::new(config),
            analyzer: Arc::new(analyzer),
            prompt_store,
            repository,
            authenticator: Arc::new(authenticator),
            metrics,
            started_at: Utc::now(),
        }
    }

    /// Build every component described by the configuration
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiClient::new(&config.openai)?);
        info!(
            "Model client ready: base_url={} extract={} quick={}",
            config.openai.base_url, config.openai.model_extract, config.openai.model
        );

        let venues = VenueIndex::load(
            &config.data.venue_profiles_path,
            config.validation.profile_match_threshold,
        )
        .await?;
        let repository = StorageFactory::create(&config.storage).await?;

        let state = Self::new(config, model, venues, repository);
        if state.authenticator.is_enabled() {
            info!(
                "API key authentication enabled ({} keys)",
                state.authenticator.key_count()
            );
        } else {
            warn!("No API keys configured, authentication is disabled");
        }
        Ok(state)
    }

    /// Uptime in seconds
    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
