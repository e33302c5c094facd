//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use specsum_chat::{Endpoints, LLMConfig, ProviderService, SummarizationService};
use specsum_core::SpecSumConfig;
use specsum_runtime::{DocumentSessions, PipelineError, SummaryPipeline};
use tracing::info;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: SpecSumConfig,
    pub llm_config: Arc<RwLock<LLMConfig>>,
    pub endpoints: Endpoints,
    pub pipeline: SummaryPipeline,
    pub sessions: DocumentSessions,
}

impl AppState {
    pub fn new(config: SpecSumConfig) -> Result<Self, PipelineError> {
        let llm_config = LLMConfig::load(&config.data_paths.llm_config_file);
        let llm_config = Arc::new(RwLock::new(llm_config));
        let endpoints = Endpoints::default();
        let service = Arc::new(ProviderService::with_endpoints(
            llm_config.clone(),
            endpoints.clone(),
        ));
        Self::with_service(config, llm_config, endpoints, service)
    }

    /// Build state around an arbitrary summarization backend.
    pub fn with_service(
        config: SpecSumConfig,
        llm_config: Arc<RwLock<LLMConfig>>,
        endpoints: Endpoints,
        service: Arc<dyn SummarizationService>,
    ) -> Result<Self, PipelineError> {
        let pipeline = SummaryPipeline::new(service, config.chunking, &config.pipeline)?;
        let sessions = DocumentSessions::new(
            Duration::from_secs(config.session_ttl_minutes * 60),
            config.max_sessions,
        );
        Ok(Self {
            config,
            llm_config,
            endpoints,
            pipeline,
            sessions,
        })
    }
}

/// Periodically drop expired document sessions.
pub fn start_session_reaper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = state.sessions.purge_expired();
            if purged > 0 {
                info!("Expired {} document sessions", purged);
            }
        }
    });
}
