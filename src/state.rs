//! Application state: the performance tracker, prompts, generation settings
//! and the optional text generator.
//!
//! State is built once at startup and shared behind an `Arc`. The tracker is
//! owned here (not a global), so tests build isolated instances with
//! `with_generator`.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{load_agent_config_from_env, AgentConfig, GenerationSettings, Prompts};
use crate::error::{AppError, UpstreamError};
use crate::llm::{GenerationRequest, TextGenerator};
use crate::openai::OpenAI;
use crate::tracker::PerformanceTracker;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<PerformanceTracker>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub prompts: Prompts,
    pub generation: GenerationSettings,
}

impl AppState {
    /// Build state from env: load config, init the tracker and the OpenAI client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let generator: Option<Arc<dyn TextGenerator>> = match OpenAI::from_env() {
            Some(oa) => {
                info!(target: "ibprep_backend", base_url = %oa.base_url, model = %oa.model, timeout = ?oa.timeout, "OpenAI enabled.");
                Some(Arc::new(oa))
            }
            None => {
                warn!(target: "ibprep_backend", "OpenAI disabled (no OPENAI_API_KEY). Generating endpoints will report upstream unavailable.");
                None
            }
        };

        Self::from_parts(cfg, generator)
    }

    /// State with an explicit generator and default config.
    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self::from_parts(AgentConfig::default(), Some(generator))
    }

    pub fn from_parts(cfg: AgentConfig, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        info!(
            target: "ibprep_backend",
            max_tokens = cfg.generation.max_tokens,
            temperature = cfg.generation.temperature,
            policy = ?cfg.tracker,
            generator = ?generator.as_ref().map(|g| g.describe()),
            "Application state ready"
        );
        Self {
            tracker: Arc::new(PerformanceTracker::new(cfg.tracker)),
            generator,
            prompts: cfg.prompts,
            generation: cfg.generation,
        }
    }

    /// Run one upstream generation with the configured budget and temperature.
    pub async fn generate(&self, system: &str, user: String) -> Result<String, AppError> {
        let generator = self.generator.as_ref().ok_or_else(|| {
            AppError::from(UpstreamError::new("text generation is not configured (OPENAI_API_KEY unset)"))
        })?;
        let request = GenerationRequest::new(system, user, &self.generation);
        generator.generate(&request).await.map_err(|e| {
            warn!(target: "ibprep_backend", generator = %generator.describe(), status = ?e.status, "Generation failed");
            AppError::from(e)
        })
    }

    /// Label of the configured generator (e.g. `openai:gpt-4o-mini`), if any.
    pub fn generator_label(&self) -> Option<String> {
        self.generator.as_ref().map(|g| g.describe())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct Named;

    #[async_trait]
    impl TextGenerator for Named {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, UpstreamError> {
            Err(UpstreamError::new("down").with_status(503))
        }

        fn describe(&self) -> String {
            "named:v1".into()
        }
    }

    #[tokio::test]
    async fn generator_label_and_failure_mapping() {
        let state = AppState::with_generator(Arc::new(Named));
        assert_eq!(state.generator_label().as_deref(), Some("named:v1"));
        let err = state.generate("sys", "user".into()).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable { .. }));

        let bare = AppState::from_parts(AgentConfig::default(), None);
        assert_eq!(bare.generator_label(), None);
    }
}
